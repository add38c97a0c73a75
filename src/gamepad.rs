//! The owned gamepad instance
//!
//! [`Gamepad`] ties a device source, the listener registry, the poller and the frame
//! loop together. Hosts construct one explicitly and pass it around; separate
//! instances share nothing.
//!
//! When the device source can't be created the instance is built in a disabled
//! state: the failure is logged once, every registration is a no-op and
//! [`Gamepad::start`] returns a loop that never ticks.

use crate::binding::{BindingKey, BindingTarget, Modifiers};
use crate::config::GamepadOptions;
use crate::controller::frame_loop::{FrameFn, FrameLoop, Idle, Running};
use crate::controller::gilrs_source::GilrsSource;
use crate::controller::poller::{InputPoller, InputTick, PollStats};
use crate::controller::snapshot::{DeviceInfo, DeviceSource};
use crate::error::GamepadError;
use crate::haptics::VibrationEffect;
use crate::mapping::{Action, PlayerSlot};
use crate::registry::{Callback, ListenerRegistry};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

struct Shared {
    options: GamepadOptions,
    registry: Rc<RefCell<ListenerRegistry>>,
    poller: RefCell<InputPoller>,
    source: RefCell<Box<dyn DeviceSource>>,

    // Token of the loop started last; a live token means a loop is running
    running: RefCell<Option<CancellationToken>>,

    // Cached so they can be handed out while a frame holds the poller
    connected: watch::Receiver<bool>,
    devices: watch::Receiver<Vec<DeviceInfo>>,
    ticks: broadcast::Receiver<InputTick>,
}

impl Shared {
    fn tick(&self, now: Instant) -> PollStats {
        let Ok(mut poller) = self.poller.try_borrow_mut() else {
            warn!("Frame requested from inside a listener, skipping");
            return PollStats::default();
        };

        // The source borrow ends here so listeners can vibrate
        let (events, snapshots) = {
            let mut source = self.source.borrow_mut();
            (source.poll_events(), source.snapshots())
        };

        for event in events {
            poller.handle_device_event(event);
        }
        poller.poll(&snapshots, now);
        poller.stats()
    }

    fn vibrate(&self, device_index: usize, effect: &VibrationEffect) -> Result<(), GamepadError> {
        if !self.options.vibration_enabled() {
            debug!(
                "Vibration disabled, not vibrating device {}",
                device_index
            );
            return Ok(());
        }
        self.source.borrow_mut().vibrate(device_index, effect)
    }
}

pub struct Gamepad {
    shared: Option<Rc<Shared>>,
    options: GamepadOptions,
}

impl Gamepad {
    /// Builds an instance over a device source
    ///
    /// Invalid options are logged and replaced by defaults. An `Err` source yields a
    /// disabled instance.
    pub fn new<S>(options: GamepadOptions, source: Result<S, GamepadError>) -> Self
    where
        S: DeviceSource + 'static,
    {
        let options = match options.validate() {
            Ok(()) => options,
            Err(e) => {
                error!("Invalid gamepad options, using defaults: {}", e);
                GamepadOptions::default()
            }
        };

        let source = match source {
            Ok(source) => source,
            Err(e) => {
                error!("{}", e);
                return Self {
                    shared: None,
                    options,
                };
            }
        };

        info!("Creating gamepad instance on {} source", source.name());
        let registry = Rc::new(RefCell::new(ListenerRegistry::new()));
        let poller = InputPoller::new(options.clone(), registry.clone());
        let connected = poller.connection().subscribe();
        let devices = poller.connection().subscribe_devices();
        let ticks = poller.subscribe_ticks();

        Self {
            shared: Some(Rc::new(Shared {
                options: options.clone(),
                registry,
                poller: RefCell::new(poller),
                source: RefCell::new(Box::new(source)),
                running: RefCell::new(None),
                connected,
                devices,
                ticks,
            })),
            options,
        }
    }

    /// Instance backed by the platform's controllers through gilrs
    pub fn with_gilrs(options: GamepadOptions) -> Self {
        Self::new(options, GilrsSource::new())
    }

    /// False when the input API was unavailable at construction
    pub fn is_enabled(&self) -> bool {
        self.shared.is_some()
    }

    pub fn options(&self) -> &GamepadOptions {
        &self.options
    }

    /// Registers a listener for a player slot given by name (`player-1`..`player-8`)
    ///
    /// Unknown slots are logged and ignored.
    pub fn add_listener(
        &self,
        player: &str,
        action: Action,
        button: &str,
        repeat: bool,
        callback: Callback,
    ) {
        let Some(shared) = &self.shared else {
            return;
        };
        match player.parse::<PlayerSlot>() {
            Ok(slot) => shared
                .registry
                .borrow_mut()
                .add_listener(slot, action, button, repeat, callback),
            Err(e) => warn!("{}, listener for {} not added", e, button),
        }
    }

    /// Removes every entry at the key registered with `callback`
    pub fn remove_listener(&self, player: &str, action: Action, button: &str, callback: &Callback) {
        let Some(shared) = &self.shared else {
            return;
        };
        match player.parse::<PlayerSlot>() {
            Ok(slot) => {
                shared
                    .registry
                    .borrow_mut()
                    .remove_listener(slot, action, button, callback);
            }
            Err(e) => warn!("{}, listener for {} not removed", e, button),
        }
    }

    /// Registers a declarative binding
    ///
    /// The error is also logged, so UI layers may ignore it.
    pub fn bind(
        &self,
        key: &str,
        modifiers: Modifiers,
        target: &BindingTarget,
    ) -> Result<(), GamepadError> {
        let Some(shared) = &self.shared else {
            return Ok(());
        };
        let (parsed, callback) = self
            .resolve_binding(key, target)
            .inspect_err(|e| log_rejected(e, key, "bound"))?;

        let mut registry = shared.registry.borrow_mut();
        for button in &parsed.buttons {
            registry.add_listener(
                parsed.player,
                modifiers.action(),
                button,
                modifiers.repeat,
                callback.clone(),
            );
        }
        Ok(())
    }

    /// Reverses [`bind`](Self::bind) for the same key, modifiers and target
    pub fn unbind(
        &self,
        key: &str,
        modifiers: Modifiers,
        target: &BindingTarget,
    ) -> Result<(), GamepadError> {
        let Some(shared) = &self.shared else {
            return Ok(());
        };
        let (parsed, callback) = self
            .resolve_binding(key, target)
            .inspect_err(|e| log_rejected(e, key, "unbound"))?;

        let mut registry = shared.registry.borrow_mut();
        for button in &parsed.buttons {
            registry.remove_listener(parsed.player, modifiers.action(), button, &callback);
        }
        Ok(())
    }

    fn resolve_binding(
        &self,
        key: &str,
        target: &BindingTarget,
    ) -> Result<(BindingKey, Callback), GamepadError> {
        let parsed = BindingKey::parse(key, &self.options)?;
        let callback = target.resolve(key)?;
        Ok((parsed, callback))
    }

    /// Binds a rumble on the device that triggered `key`
    ///
    /// Returns the generated callback; pass it to [`unbind`](Self::unbind) as
    /// `BindingTarget::handler` to remove the binding.
    pub fn bind_vibration(
        &self,
        key: &str,
        modifiers: Modifiers,
        duration_ms: u32,
    ) -> Result<Callback, GamepadError> {
        let weak: Weak<Shared> = self
            .shared
            .as_ref()
            .map(Rc::downgrade)
            .unwrap_or_default();

        let effect = VibrationEffect::with_duration(duration_ms);
        let callback = Callback::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.vibrate(event.device.index, &effect)?;
            }
            Ok(())
        });

        self.bind(key, modifiers, &BindingTarget::handler(callback.clone()))?;
        Ok(callback)
    }

    /// Plays a rumble effect if vibration is enabled
    pub fn vibrate(&self, device_index: usize, effect: &VibrationEffect) -> Result<(), GamepadError> {
        match &self.shared {
            Some(shared) => shared.vibrate(device_index, effect),
            None => Ok(()),
        }
    }

    /// True while at least one controller is connected
    pub fn connected(&self) -> watch::Receiver<bool> {
        match &self.shared {
            Some(shared) => shared.connected.clone(),
            None => watch::channel(false).1,
        }
    }

    pub fn device_list(&self) -> watch::Receiver<Vec<DeviceInfo>> {
        match &self.shared {
            Some(shared) => shared.devices.clone(),
            None => watch::channel(Vec::new()).1,
        }
    }

    /// One [`InputTick`] per frame, sent before any listener runs
    pub fn subscribe_ticks(&self) -> broadcast::Receiver<InputTick> {
        match &self.shared {
            Some(shared) => shared.ticks.resubscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Runs a single frame at `now`
    ///
    /// For hosts that drive frames themselves instead of calling [`start`](Self::start).
    pub fn tick_at(&self, now: Instant) -> PollStats {
        match &self.shared {
            Some(shared) => shared.tick(now),
            None => PollStats::default(),
        }
    }

    pub fn stats(&self) -> PollStats {
        match &self.shared {
            Some(shared) => shared
                .poller
                .try_borrow()
                .map(|poller| poller.stats())
                .unwrap_or_default(),
            None => PollStats::default(),
        }
    }

    /// Spawns the frame loop on the current `LocalSet`
    ///
    /// Fails with [`GamepadError::AlreadyRunning`] while a loop started earlier is
    /// still live. A disabled instance returns a loop that is cancelled up front and
    /// never spawned, so it needs no `LocalSet`.
    pub fn start(&self) -> Result<FrameLoop<Running>, GamepadError> {
        let Some(shared) = &self.shared else {
            debug!("Gamepad disabled, frame loop will not tick");
            return Ok(FrameLoop::<Idle>::create(
                self.options.poll_interval(),
                Rc::new(|_| PollStats::default()),
            )
            .into_cancelled());
        };

        let mut running = shared.running.borrow_mut();
        if running.as_ref().is_some_and(|token| !token.is_cancelled()) {
            warn!("Frame loop already running");
            return Err(GamepadError::AlreadyRunning);
        }

        let weak = Rc::downgrade(shared);
        let frame: FrameFn = Rc::new(move |now| match weak.upgrade() {
            Some(shared) => shared.tick(now),
            None => PollStats::default(),
        });

        let frame_loop = FrameLoop::<Idle>::create(shared.options.poll_interval(), frame);
        *running = Some(frame_loop.token());
        Ok(frame_loop.start())
    }
}

fn log_rejected(e: &GamepadError, key: &str, verb: &str) {
    match e {
        GamepadError::UnknownPlayerSlot(_) => warn!("{}, '{}' was not {}", e, key, verb),
        GamepadError::InvalidBinding { reason, .. } => {
            error!("Invalid binding. '{}' was not {}: {}", key, verb, reason)
        }
        _ => error!("'{}' was not {}: {}", key, verb, e),
    }
}
