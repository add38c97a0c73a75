//! In-memory device source
//!
//! Scriptable stand-in for real hardware, used by tests and headless hosts. Clones
//! share state: hand one clone to the [`Gamepad`](crate::Gamepad) and keep another
//! to press buttons, move sticks and plug devices in and out.

use crate::controller::snapshot::{
    ButtonSnapshot, DeviceEvent, DeviceSnapshot, DeviceSource, STANDARD_MAPPING,
};
use crate::error::GamepadError;
use crate::haptics::VibrationEffect;
use crate::mapping::BUTTON_NAMES;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::debug;

const STICK_AXES: usize = 4;

#[derive(Debug, Default)]
struct VirtualState {
    devices: BTreeMap<usize, DeviceSnapshot>,
    pending: Vec<DeviceEvent>,
    vibrations: Vec<(usize, VibrationEffect)>,
}

#[derive(Debug, Clone, Default)]
pub struct VirtualSource {
    state: Rc<RefCell<VirtualState>>,
}

impl VirtualSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plugs in a standard-layout device at `index`
    pub fn connect(&self, index: usize, name: &str) {
        self.connect_with_mapping(index, name, STANDARD_MAPPING);
    }

    pub fn connect_with_mapping(&self, index: usize, name: &str, mapping: &str) {
        let snapshot = DeviceSnapshot::new(index, name, mapping, BUTTON_NAMES.len(), STICK_AXES);
        let mut state = self.state.borrow_mut();
        state
            .pending
            .push(DeviceEvent::Connected(snapshot.info()));
        state.devices.insert(index, snapshot);
        debug!("Virtual device {} connected", index);
    }

    pub fn disconnect(&self, index: usize) {
        let mut state = self.state.borrow_mut();
        if state.devices.remove(&index).is_some() {
            state.pending.push(DeviceEvent::Disconnected { index });
            debug!("Virtual device {} disconnected", index);
        }
    }

    pub fn set_button(&self, index: usize, button: usize, pressed: bool) {
        if let Some(device) = self.state.borrow_mut().devices.get_mut(&index) {
            if let Some(slot) = device.buttons.get_mut(button) {
                *slot = if pressed {
                    ButtonSnapshot::pressed()
                } else {
                    ButtonSnapshot::released()
                };
            }
        }
    }

    pub fn press(&self, index: usize, button: usize) {
        self.set_button(index, button, true);
    }

    pub fn release(&self, index: usize, button: usize) {
        self.set_button(index, button, false);
    }

    pub fn set_axis(&self, index: usize, axis: usize, value: f32) {
        if let Some(device) = self.state.borrow_mut().devices.get_mut(&index) {
            if let Some(slot) = device.axes.get_mut(axis) {
                *slot = value.clamp(-1.0, 1.0);
            }
        }
    }

    /// Every effect played so far, oldest first
    pub fn vibrations(&self) -> Vec<(usize, VibrationEffect)> {
        self.state.borrow().vibrations.clone()
    }
}

impl DeviceSource for VirtualSource {
    fn name(&self) -> &str {
        "virtual"
    }

    fn poll_events(&mut self) -> Vec<DeviceEvent> {
        std::mem::take(&mut self.state.borrow_mut().pending)
    }

    fn snapshots(&self) -> Vec<DeviceSnapshot> {
        self.state.borrow().devices.values().cloned().collect()
    }

    fn vibrate(&mut self, index: usize, effect: &VibrationEffect) -> Result<(), GamepadError> {
        let mut state = self.state.borrow_mut();
        if !state.devices.contains_key(&index) {
            return Err(GamepadError::Haptics(format!(
                "no connected device {}",
                index
            )));
        }
        state.vibrations.push((index, *effect));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_devices_and_events() {
        let script = VirtualSource::new();
        let mut source = script.clone();

        script.connect(0, "pad one");
        script.press(0, 3);
        script.set_axis(0, 1, 2.0);

        assert_eq!(source.poll_events().len(), 1);
        assert!(source.poll_events().is_empty());

        let snapshots = source.snapshots();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].buttons[3].pressed);
        assert_eq!(snapshots[0].axes[1], 1.0);
    }

    #[test]
    fn snapshots_are_ordered_by_index() {
        let script = VirtualSource::new();
        script.connect(5, "late");
        script.connect(1, "early");
        let indices: Vec<usize> = script.snapshots().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 5]);
    }

    #[test]
    fn disconnect_reports_index() {
        let script = VirtualSource::new();
        let mut source = script.clone();
        script.connect(2, "pad");
        source.poll_events();
        script.disconnect(2);
        script.disconnect(2);
        assert_eq!(
            source.poll_events(),
            vec![DeviceEvent::Disconnected { index: 2 }]
        );
    }

    #[test]
    fn vibration_requires_connected_device() {
        let mut source = VirtualSource::new();
        assert!(source.vibrate(0, &VibrationEffect::default()).is_err());
        source.connect(0, "pad");
        source.vibrate(0, &VibrationEffect::default()).unwrap();
        assert_eq!(source.vibrations().len(), 1);
    }
}
