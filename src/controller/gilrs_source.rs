//! gilrs-backed device source
//!
//! Translates gilrs gamepads into standard-layout snapshots: 17 buttons in W3C
//! standard order and four stick axes with Y pointing down.

use crate::controller::snapshot::{
    ButtonSnapshot, DeviceEvent, DeviceInfo, DeviceSnapshot, DeviceSource, STANDARD_MAPPING,
};
use crate::error::GamepadError;
use crate::haptics::VibrationEffect;
use gilrs::ff::{BaseEffect, BaseEffectType, Effect, EffectBuilder, Replay, Ticks};
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs, MappingSource};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Standard layout, indexed by hardware button index
const STANDARD_BUTTONS: [Button; 17] = [
    Button::South,
    Button::East,
    Button::West,
    Button::North,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger2,
    Button::Select,
    Button::Start,
    Button::LeftThumb,
    Button::RightThumb,
    Button::DPadUp,
    Button::DPadDown,
    Button::DPadLeft,
    Button::DPadRight,
    Button::Mode,
];

/// Stick axes with the sign to apply (gilrs reports Y up, the standard layout Y down)
const STANDARD_AXES: [(Axis, f32); 4] = [
    (Axis::LeftStickX, 1.0),
    (Axis::LeftStickY, -1.0),
    (Axis::RightStickX, 1.0),
    (Axis::RightStickY, -1.0),
];

pub struct GilrsSource {
    gilrs: Gilrs,

    // Effects stop when dropped, so the last one per device is kept alive here
    effects: HashMap<usize, Effect>,
}

impl GilrsSource {
    pub fn new() -> Result<Self, GamepadError> {
        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(gilrs::Error::NotImplemented(_)) => {
                debug!("gilrs has no backend for this platform");
                return Err(GamepadError::UnsupportedEnvironment(
                    "no gamepad backend for this platform".to_string(),
                ));
            }
            Err(e) => {
                debug!("Failed to initialize gilrs: {}", e);
                return Err(GamepadError::UnsupportedEnvironment(e.to_string()));
            }
        };

        for (id, gamepad) in gilrs.gamepads() {
            info!(
                "  [{}] Name: {}, Mapping: {:?}",
                usize::from(id),
                gamepad.name(),
                gamepad.mapping_source()
            );
        }

        Ok(Self {
            gilrs,
            effects: HashMap::new(),
        })
    }

    fn gamepad_id(&self, index: usize) -> Option<GamepadId> {
        self.gilrs
            .gamepads()
            .map(|(id, _)| id)
            .find(|id| usize::from(*id) == index)
    }
}

fn mapping_name(gamepad: &Gamepad<'_>) -> String {
    match gamepad.mapping_source() {
        MappingSource::None => String::new(),
        _ => STANDARD_MAPPING.to_string(),
    }
}

fn snapshot(id: GamepadId, gamepad: &Gamepad<'_>) -> DeviceSnapshot {
    let buttons = STANDARD_BUTTONS
        .iter()
        .map(|&button| {
            let pressed = gamepad.is_pressed(button);
            let value = gamepad
                .button_data(button)
                .map(|data| data.value())
                .unwrap_or(if pressed { 1.0 } else { 0.0 });
            ButtonSnapshot { pressed, value }
        })
        .collect();

    let axes = STANDARD_AXES
        .iter()
        .map(|&(axis, sign)| gamepad.value(axis) * sign)
        .collect();

    DeviceSnapshot {
        index: usize::from(id),
        name: gamepad.name().to_string(),
        mapping: mapping_name(gamepad),
        buttons,
        axes,
    }
}

impl DeviceSource for GilrsSource {
    fn name(&self) -> &str {
        "gilrs"
    }

    fn poll_events(&mut self) -> Vec<DeviceEvent> {
        let mut events = Vec::new();

        // Draining the queue is also what keeps gilrs' cached button/axis state current
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            let index = usize::from(id);
            match event {
                EventType::Connected => {
                    let gamepad = self.gilrs.gamepad(id);
                    info!("Controller {} connected: {}", index, gamepad.name());
                    events.push(DeviceEvent::Connected(DeviceInfo {
                        index,
                        name: gamepad.name().to_string(),
                        mapping: mapping_name(&gamepad),
                    }));
                }
                EventType::Disconnected => {
                    warn!("Controller {} disconnected", index);
                    self.effects.remove(&index);
                    events.push(DeviceEvent::Disconnected { index });
                }
                _ => {}
            }
        }

        events
    }

    fn snapshots(&self) -> Vec<DeviceSnapshot> {
        let mut snapshots: Vec<DeviceSnapshot> = self
            .gilrs
            .gamepads()
            .map(|(id, gamepad)| snapshot(id, &gamepad))
            .collect();
        snapshots.sort_by_key(|snapshot| snapshot.index);
        snapshots
    }

    fn vibrate(&mut self, index: usize, effect: &VibrationEffect) -> Result<(), GamepadError> {
        let id = self
            .gamepad_id(index)
            .ok_or_else(|| GamepadError::Haptics(format!("no connected device {}", index)))?;

        if !self.gilrs.gamepad(id).is_ff_supported() {
            debug!("Device {} has no force feedback, skipping vibration", index);
            return Ok(());
        }

        let scheduling = Replay {
            after: Ticks::from_ms(effect.start_delay_ms),
            play_for: Ticks::from_ms(effect.duration_ms),
            with_delay: Ticks::from_ms(0),
        };

        let rumble = EffectBuilder::new()
            .add_effect(BaseEffect {
                kind: BaseEffectType::Strong {
                    magnitude: effect.strong_u16(),
                },
                scheduling,
                ..Default::default()
            })
            .add_effect(BaseEffect {
                kind: BaseEffectType::Weak {
                    magnitude: effect.weak_u16(),
                },
                scheduling,
                ..Default::default()
            })
            .gamepads(&[id])
            .finish(&mut self.gilrs)
            .map_err(|e| GamepadError::Haptics(e.to_string()))?;

        rumble
            .play()
            .map_err(|e| GamepadError::Haptics(e.to_string()))?;
        debug!(
            "Playing {}ms rumble on device {}",
            effect.duration_ms, index
        );
        self.effects.insert(index, rumble);
        Ok(())
    }
}
