//! Input poller - per-frame edge detection and hold-repeat dispatch
//!
//! Once per frame the poller walks every connected device, assigns player slots by
//! position, and compares each button (and each stick direction) with what it
//! remembers from earlier frames:
//!
//! ```text
//! pressed, not held   ──► fire "pressed", arm with initial_timeout
//! pressed, held       ──► fire "pressed" again if repeat and the armed delay passed,
//!                         re-arm with repeat_timeout
//! released, held      ──► forget hold, fire "released"
//! released, not held  ──► nothing
//! ```
//!
//! A button is only armed when a "pressed" listener actually fired for it, so a
//! release without a recorded press never dispatches.

use crate::config::GamepadOptions;
use crate::controller::connection::ConnectionTracker;
use crate::controller::snapshot::{DeviceEvent, DeviceSnapshot};
use crate::error::GamepadError;
use crate::mapping::{self, Action, PlayerSlot};
use crate::registry::{GamepadEvent, ListenerEntry, ListenerRegistry};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, trace};

const TICK_CHANNEL_CAPACITY: usize = 16;

/// Sent once per frame, before any listener runs
#[derive(Clone, Debug, Serialize)]
pub struct InputTick {
    pub frame: u64,
    pub at: DateTime<Local>,
    pub devices: Vec<DeviceSnapshot>,
}

/// Counters since the poller was created
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollStats {
    pub frames: u64,
    pub dispatched: u64,
    pub failures: u64,
}

#[derive(Clone, Copy, Debug)]
struct Hold {
    fired_at: Instant,
    // Time that must pass after `fired_at` before the next repeat
    delay: Duration,
}

/// Buttons currently armed for repeat, per player slot
#[derive(Debug, Default)]
pub struct HoldingState {
    players: HashMap<PlayerSlot, HashMap<String, Hold>>,
}

impl HoldingState {
    pub fn is_held(&self, player: PlayerSlot, button: &str) -> bool {
        self.get(player, button).is_some()
    }

    fn get(&self, player: PlayerSlot, button: &str) -> Option<Hold> {
        self.players
            .get(&player)
            .and_then(|buttons| buttons.get(button))
            .copied()
    }

    fn arm(&mut self, player: PlayerSlot, button: &str, now: Instant, delay: Duration) {
        self.players.entry(player).or_default().insert(
            button.to_string(),
            Hold {
                fired_at: now,
                delay,
            },
        );
    }

    /// Forgets a hold; true if there was one
    fn release(&mut self, player: PlayerSlot, button: &str) -> bool {
        let Some(buttons) = self.players.get_mut(&player) else {
            return false;
        };
        let removed = buttons.remove(button).is_some();
        if buttons.is_empty() {
            self.players.remove(&player);
        }
        removed
    }

    /// Forgets every hold of a player; returns how many were dropped
    pub fn clear_player(&mut self, player: PlayerSlot) -> usize {
        self.players
            .remove(&player)
            .map(|buttons| buttons.len())
            .unwrap_or(0)
    }

    pub fn held_buttons(&self, player: PlayerSlot) -> Vec<String> {
        let mut held: Vec<String> = self
            .players
            .get(&player)
            .map(|buttons| buttons.keys().cloned().collect())
            .unwrap_or_default();
        held.sort();
        held
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

pub struct InputPoller {
    options: GamepadOptions,
    registry: Rc<RefCell<ListenerRegistry>>,
    holding: HoldingState,
    connection: ConnectionTracker,

    // Device index per player slot as of the last frame
    assignment: BTreeMap<PlayerSlot, usize>,

    ticks: broadcast::Sender<InputTick>,
    stats: PollStats,
}

impl InputPoller {
    pub fn new(options: GamepadOptions, registry: Rc<RefCell<ListenerRegistry>>) -> Self {
        debug!("Creating input poller with options: {:?}", options);
        let (ticks, _) = broadcast::channel(TICK_CHANNEL_CAPACITY);
        Self {
            options,
            registry,
            holding: HoldingState::default(),
            connection: ConnectionTracker::new(),
            assignment: BTreeMap::new(),
            ticks,
            stats: PollStats::default(),
        }
    }

    pub fn options(&self) -> &GamepadOptions {
        &self.options
    }

    pub fn connection(&self) -> &ConnectionTracker {
        &self.connection
    }

    pub fn holding(&self) -> &HoldingState {
        &self.holding
    }

    pub fn stats(&self) -> PollStats {
        self.stats
    }

    pub fn subscribe_ticks(&self) -> broadcast::Receiver<InputTick> {
        self.ticks.subscribe()
    }

    /// Device index currently mapped to a slot
    pub fn device_for(&self, player: PlayerSlot) -> Option<usize> {
        self.assignment.get(&player).copied()
    }

    pub fn handle_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Connected(info) => self.connection.on_connected(info),
            DeviceEvent::Disconnected { index } => {
                let slots: Vec<PlayerSlot> = self
                    .assignment
                    .iter()
                    .filter(|(_, device)| **device == index)
                    .map(|(slot, _)| *slot)
                    .collect();
                for slot in slots {
                    let cleared = self.holding.clear_player(slot);
                    self.assignment.remove(&slot);
                    debug!(
                        "Device {} left {}, cleared {} held button(s)",
                        index, slot, cleared
                    );
                }
                self.connection.on_disconnected(index);
            }
        }
    }

    /// Runs one frame against the given snapshots
    ///
    /// `devices` must be ordered by device index; the first eight become
    /// `player-1`..`player-8`.
    pub fn poll(&mut self, devices: &[DeviceSnapshot], now: Instant) {
        self.stats.frames += 1;
        let _ = self.ticks.send(InputTick {
            frame: self.stats.frames,
            at: Local::now(),
            devices: devices.to_vec(),
        });

        self.connection.sync(devices);
        self.assign_slots(devices);

        // Local copy so names can be borrowed while `self` is mutated
        let button_mapping = self.options.button_mapping.clone();

        for (position, device) in devices.iter().enumerate() {
            let Some(player) = PlayerSlot::from_position(position) else {
                trace!("Ignoring device {} beyond the last player slot", device.index);
                continue;
            };

            for (index, button) in device.buttons.iter().enumerate() {
                let Some(name) = button_mapping.get(index) else {
                    continue;
                };
                if button.pressed {
                    self.press(player, name, device, now);
                } else {
                    self.release(player, name, device);
                }
            }

            for (axis, &value) in device.axes.iter().enumerate() {
                let Some([positive, negative]) = mapping::axis_names(axis) else {
                    continue;
                };
                if value.abs() >= self.options.threshold {
                    let (active, opposite) = if value > 0.0 {
                        (positive, negative)
                    } else {
                        (negative, positive)
                    };
                    // A stick flipped past center in one frame releases the old side first
                    self.release(player, opposite, device);
                    self.press(player, active, device, now);
                } else {
                    self.release(player, positive, device);
                    self.release(player, negative, device);
                }
            }
        }
    }

    fn assign_slots(&mut self, devices: &[DeviceSnapshot]) {
        let next: BTreeMap<PlayerSlot, usize> = devices
            .iter()
            .enumerate()
            .filter_map(|(position, device)| {
                PlayerSlot::from_position(position).map(|slot| (slot, device.index))
            })
            .collect();

        for slot in PlayerSlot::all() {
            if self.assignment.get(&slot) != next.get(&slot) {
                let cleared = self.holding.clear_player(slot);
                if cleared > 0 {
                    debug!("{} changed device, cleared {} held button(s)", slot, cleared);
                }
            }
        }

        self.assignment = next;
    }

    fn active(&self, player: PlayerSlot, action: Action, button: &str) -> Option<ListenerEntry> {
        self.registry
            .borrow()
            .active_listener(player, action, button)
    }

    fn press(&mut self, player: PlayerSlot, button: &str, device: &DeviceSnapshot, now: Instant) {
        let Some(entry) = self.active(player, Action::Pressed, button) else {
            return;
        };

        let hold = self.holding.get(player, button);
        let initial = hold.is_none();
        let due = match hold {
            None => true,
            Some(hold) => entry.repeat && now.saturating_duration_since(hold.fired_at) >= hold.delay,
        };
        if !due {
            return;
        }

        let delay = if initial {
            self.options.initial_timeout()
        } else {
            self.options.repeat_timeout()
        };
        self.holding.arm(player, button, now, delay);

        trace!("{} {} pressed (repeat: {})", player, button, !initial);
        self.dispatch(
            &entry,
            &GamepadEvent {
                player,
                action: Action::Pressed,
                button,
                repeated: !initial,
                device,
            },
        );
    }

    fn release(&mut self, player: PlayerSlot, button: &str, device: &DeviceSnapshot) {
        if !self.holding.release(player, button) {
            return;
        }
        trace!("{} {} released", player, button);

        let Some(entry) = self.active(player, Action::Released, button) else {
            return;
        };
        self.dispatch(
            &entry,
            &GamepadEvent {
                player,
                action: Action::Released,
                button,
                repeated: false,
                device,
            },
        );
    }

    /// Invokes one listener, isolating errors and panics
    fn dispatch(&mut self, entry: &ListenerEntry, event: &GamepadEvent<'_>) {
        self.stats.dispatched += 1;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry.callback.call(event)));
        let reason = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(report)) => format!("{:#}", report),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };

        self.stats.failures += 1;
        let failure = GamepadError::CallbackFailed {
            player: event.player.to_string(),
            button: event.button.to_string(),
            reason,
        };
        error!("{}", failure);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::snapshot::{ButtonSnapshot, DeviceInfo, STANDARD_MAPPING};
    use crate::registry::Callback;
    use std::cell::Cell;
    use color_eyre::eyre::eyre;

    const A: usize = 0;

    fn p(n: u8) -> PlayerSlot {
        PlayerSlot::new(n).unwrap()
    }

    fn pad(index: usize) -> DeviceSnapshot {
        DeviceSnapshot::new(index, "test pad", STANDARD_MAPPING, 17, 4)
    }

    fn with_button(mut device: DeviceSnapshot, button: usize, pressed: bool) -> DeviceSnapshot {
        device.buttons[button] = if pressed {
            ButtonSnapshot::pressed()
        } else {
            ButtonSnapshot::released()
        };
        device
    }

    fn ms(base: Instant, offset: u64) -> Instant {
        base + Duration::from_millis(offset)
    }

    struct Harness {
        registry: Rc<RefCell<ListenerRegistry>>,
        poller: InputPoller,
    }

    impl Harness {
        fn new(options: GamepadOptions) -> Self {
            let registry = Rc::new(RefCell::new(ListenerRegistry::new()));
            let poller = InputPoller::new(options, registry.clone());
            Self { registry, poller }
        }

        /// Registers a counting listener and returns its counter
        fn count(&self, player: PlayerSlot, action: Action, button: &str, repeat: bool) -> Rc<Cell<u32>> {
            let hits = Rc::new(Cell::new(0));
            let seen = hits.clone();
            self.registry.borrow_mut().add_listener(
                player,
                action,
                button,
                repeat,
                Callback::new(move |_| {
                    seen.set(seen.get() + 1);
                    Ok(())
                }),
            );
            hits
        }
    }

    #[test]
    fn press_edge_fires_once_without_repeat() {
        let mut h = Harness::new(GamepadOptions::default());
        let hits = h.count(p(1), Action::Pressed, "button-a", false);
        let t0 = Instant::now();
        let held = with_button(pad(0), A, true);

        for offset in [0, 16, 500, 5000] {
            h.poller.poll(&[held.clone()], ms(t0, offset));
        }
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn repeat_uses_initial_then_repeat_timeout() {
        let mut h = Harness::new(GamepadOptions {
            initial_timeout_ms: 500,
            repeat_timeout_ms: 200,
            ..Default::default()
        });
        let fired_at = Rc::new(RefCell::new(Vec::new()));
        let log = fired_at.clone();
        let t0 = Instant::now();
        let held = with_button(pad(0), A, true);

        // Frame times are recorded through a shared clock cell
        let clock = Rc::new(Cell::new(0u64));
        let now = clock.clone();
        h.registry.borrow_mut().add_listener(
            p(1),
            Action::Pressed,
            "button-a",
            true,
            Callback::new(move |_| {
                log.borrow_mut().push(now.get());
                Ok(())
            }),
        );

        for offset in (0..=1000).step_by(50) {
            clock.set(offset);
            h.poller.poll(&[held.clone()], ms(t0, offset));
        }
        assert_eq!(*fired_at.borrow(), vec![0, 500, 700, 900]);
    }

    #[test]
    fn repeat_tolerates_frame_jitter() {
        let mut h = Harness::new(GamepadOptions {
            initial_timeout_ms: 200,
            repeat_timeout_ms: 200,
            ..Default::default()
        });
        let hits = h.count(p(1), Action::Pressed, "button-a", true);
        let t0 = Instant::now();
        let held = with_button(pad(0), A, true);

        for offset in [0, 199, 213, 399, 430] {
            h.poller.poll(&[held.clone()], ms(t0, offset));
        }
        // 0 initial, 213 first repeat, 430 second repeat (213 + 200 <= 430)
        assert_eq!(hits.get(), 3);
    }

    #[test]
    fn release_fires_after_press_only() {
        let mut h = Harness::new(GamepadOptions::default());
        let pressed = h.count(p(1), Action::Pressed, "button-b", false);
        let released = h.count(p(1), Action::Released, "button-b", false);
        let t0 = Instant::now();

        h.poller.poll(&[pad(0)], t0);
        assert_eq!(released.get(), 0);

        h.poller.poll(&[with_button(pad(0), 1, true)], ms(t0, 16));
        h.poller.poll(&[with_button(pad(0), 1, false)], ms(t0, 32));
        h.poller.poll(&[pad(0)], ms(t0, 48));

        assert_eq!(pressed.get(), 1);
        assert_eq!(released.get(), 1);
        assert!(h.poller.holding().is_empty());
    }

    #[test]
    fn release_without_pressed_listener_is_silent() {
        let mut h = Harness::new(GamepadOptions::default());
        let released = h.count(p(1), Action::Released, "button-x", false);
        let t0 = Instant::now();
        h.poller.poll(&[with_button(pad(0), 2, true)], t0);
        h.poller.poll(&[pad(0)], ms(t0, 16));
        assert_eq!(released.get(), 0);
    }

    #[test]
    fn rearm_after_release() {
        let mut h = Harness::new(GamepadOptions::default());
        let hits = h.count(p(1), Action::Pressed, "button-a", false);
        let t0 = Instant::now();
        let held = with_button(pad(0), A, true);
        h.poller.poll(&[held.clone()], t0);
        h.poller.poll(&[pad(0)], ms(t0, 16));
        h.poller.poll(&[held], ms(t0, 32));
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn axis_crossing_threshold_acts_as_button() {
        let mut h = Harness::new(GamepadOptions::default());
        let pressed = h.count(p(1), Action::Pressed, "left-analog-right", false);
        let released = h.count(p(1), Action::Released, "left-analog-right", false);
        let t0 = Instant::now();

        let mut device = pad(0);
        device.axes[0] = 0.6;
        h.poller.poll(&[device.clone()], t0);
        device.axes[0] = 0.3;
        h.poller.poll(&[device], ms(t0, 16));

        assert_eq!(pressed.get(), 1);
        assert_eq!(released.get(), 1);
    }

    #[test]
    fn axis_flip_releases_opposite_direction() {
        let mut h = Harness::new(GamepadOptions::default());
        let _up = h.count(p(1), Action::Pressed, "left-analog-up", false);
        let up_released = h.count(p(1), Action::Released, "left-analog-up", false);
        let down = h.count(p(1), Action::Pressed, "left-analog-down", false);
        let t0 = Instant::now();

        let mut device = pad(0);
        device.axes[1] = -0.9;
        h.poller.poll(&[device.clone()], t0);
        device.axes[1] = 0.9;
        h.poller.poll(&[device], ms(t0, 16));

        assert_eq!(up_released.get(), 1);
        assert_eq!(down.get(), 1);
        assert_eq!(
            h.poller.holding().held_buttons(p(1)),
            vec!["left-analog-down".to_string()]
        );
    }

    #[test]
    fn axis_below_threshold_does_not_press() {
        let mut h = Harness::new(GamepadOptions {
            threshold: 0.8,
            ..Default::default()
        });
        let hits = h.count(p(1), Action::Pressed, "right-analog-left", false);
        let mut device = pad(0);
        device.axes[2] = -0.7;
        h.poller.poll(&[device], Instant::now());
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn axis_threshold_boundary_is_inclusive() {
        let mut h = Harness::new(GamepadOptions::default());
        let right_pressed = h.count(p(1), Action::Pressed, "left-analog-right", false);
        let right_released = h.count(p(1), Action::Released, "left-analog-right", false);
        let left_pressed = h.count(p(1), Action::Pressed, "left-analog-left", false);
        let left_released = h.count(p(1), Action::Released, "left-analog-left", false);
        let t0 = Instant::now();

        for (offset, value) in [(0, 0.5), (16, 0.4999), (32, -0.5), (48, -0.4999)] {
            let mut device = pad(0);
            device.axes[0] = value;
            h.poller.poll(&[device], ms(t0, offset));

            match offset {
                0 => assert_eq!((right_pressed.get(), right_released.get()), (1, 0)),
                16 => assert_eq!((right_pressed.get(), right_released.get()), (1, 1)),
                32 => assert_eq!((left_pressed.get(), left_released.get()), (1, 0)),
                _ => assert_eq!((left_pressed.get(), left_released.get()), (1, 1)),
            }
        }
        assert_eq!((right_pressed.get(), right_released.get()), (1, 1));
    }

    #[test]
    fn player_slots_do_not_cross_fire() {
        let mut h = Harness::new(GamepadOptions::default());
        let counters: Vec<Rc<Cell<u32>>> = PlayerSlot::all()
            .map(|slot| h.count(slot, Action::Pressed, "button-start", false))
            .collect();

        let mut devices: Vec<DeviceSnapshot> = (0..8).map(pad).collect();
        devices[5] = with_button(devices[5].clone(), 9, true);
        h.poller.poll(&devices, Instant::now());

        for (position, counter) in counters.iter().enumerate() {
            let expected = if position == 5 { 1 } else { 0 };
            assert_eq!(counter.get(), expected, "player-{}", position + 1);
        }
    }

    #[test]
    fn devices_beyond_eighth_are_ignored() {
        let mut h = Harness::new(GamepadOptions::default());
        let hits = h.count(p(8), Action::Pressed, "button-a", false);
        let mut devices: Vec<DeviceSnapshot> = (0..9).map(pad).collect();
        devices[8] = with_button(devices[8].clone(), A, true);
        h.poller.poll(&devices, Instant::now());
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn disconnect_clears_holding_for_slot() {
        let mut h = Harness::new(GamepadOptions::default());
        let hits = h.count(p(1), Action::Pressed, "button-a", true);
        let t0 = Instant::now();
        let held = with_button(pad(0), A, true);

        h.poller.handle_device_event(DeviceEvent::Connected(held.info()));
        h.poller.poll(&[held.clone()], t0);
        assert!(h.poller.holding().is_held(p(1), "button-a"));

        h.poller
            .handle_device_event(DeviceEvent::Disconnected { index: 0 });
        assert!(!h.poller.holding().is_held(p(1), "button-a"));
        assert!(!h.poller.connection().is_connected());

        // Reconnected at the same slot: the first frame is an initial press again
        h.poller.handle_device_event(DeviceEvent::Connected(DeviceInfo {
            index: 0,
            name: "test pad".to_string(),
            mapping: STANDARD_MAPPING.to_string(),
        }));
        h.poller.poll(&[held], ms(t0, 20));
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn slot_reassignment_drops_stale_holds() {
        let mut h = Harness::new(GamepadOptions::default());
        let _hits = h.count(p(1), Action::Pressed, "button-a", false);
        let t0 = Instant::now();

        h.poller.poll(&[with_button(pad(0), A, true), pad(1)], t0);
        assert_eq!(h.poller.device_for(p(1)), Some(0));

        // Device 0 vanished without an event; device 1 moves up to player-1
        h.poller.poll(&[pad(1)], ms(t0, 16));
        assert_eq!(h.poller.device_for(p(1)), Some(1));
        assert!(h.poller.holding().is_empty());
    }

    #[test]
    fn tick_is_broadcast_without_listeners() {
        let mut h = Harness::new(GamepadOptions::default());
        let mut ticks = h.poller.subscribe_ticks();
        h.poller.poll(&[], Instant::now());
        h.poller.poll(&[pad(0)], Instant::now());

        let first = ticks.try_recv().unwrap();
        let second = ticks.try_recv().unwrap();
        assert_eq!(first.frame, 1);
        assert!(first.devices.is_empty());
        assert_eq!(second.devices.len(), 1);
        assert_eq!(h.poller.stats().frames, 2);
    }

    #[test]
    fn failing_listener_does_not_stop_frame() {
        let mut h = Harness::new(GamepadOptions::default());
        h.registry.borrow_mut().add_listener(
            p(1),
            Action::Pressed,
            "button-a",
            false,
            Callback::new(|_| Err(eyre!("listener broke"))),
        );
        h.registry.borrow_mut().add_listener(
            p(1),
            Action::Pressed,
            "button-b",
            false,
            Callback::new(|_| panic!("listener exploded")),
        );
        let survivor = h.count(p(1), Action::Pressed, "button-x", false);

        let mut device = with_button(pad(0), 0, true);
        device = with_button(device, 1, true);
        device = with_button(device, 2, true);
        h.poller.poll(&[device], Instant::now());

        assert_eq!(survivor.get(), 1);
        let stats = h.poller.stats();
        assert_eq!(stats.dispatched, 3);
        assert_eq!(stats.failures, 2);
    }

    #[test]
    fn listener_can_unregister_itself() {
        let mut h = Harness::new(GamepadOptions::default());
        let registry = h.registry.clone();
        let hits = Rc::new(Cell::new(0));
        let seen = hits.clone();
        let slot: Rc<RefCell<Option<Callback>>> = Rc::new(RefCell::new(None));
        let me = slot.clone();

        let callback = Callback::new(move |event| {
            seen.set(seen.get() + 1);
            if let Some(own) = me.borrow().as_ref() {
                registry
                    .borrow_mut()
                    .remove_listener(event.player, event.action, event.button, own);
            }
            Ok(())
        });
        *slot.borrow_mut() = Some(callback.clone());
        h.registry
            .borrow_mut()
            .add_listener(p(1), Action::Pressed, "button-a", true, callback);

        let t0 = Instant::now();
        let held = with_button(pad(0), A, true);
        h.poller.poll(&[held.clone()], t0);
        h.poller.poll(&[held], ms(t0, 1000));

        assert_eq!(hits.get(), 1);
        assert!(h.registry.borrow().is_empty());
    }

    #[test]
    fn custom_button_mapping_renames_indices() {
        let mut options = GamepadOptions::default();
        options.button_mapping.swap(0, 1);
        let mut h = Harness::new(options);
        let hits = h.count(p(1), Action::Pressed, "button-b", false);
        h.poller.poll(&[with_button(pad(0), 0, true)], Instant::now());
        assert_eq!(hits.get(), 1);
    }
}
