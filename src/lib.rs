//! padbind - gamepad bindings for UI hosts
//!
//! Polls connected controllers once per frame, detects press and release edges
//! (including stick directions as synthetic buttons), applies hold-repeat timing
//! and dispatches to listeners keyed by player slot, action and button name.
//!
//! ```text
//! DeviceSource ──► InputPoller ──► ListenerRegistry ──► your callbacks
//!                       ▲
//!                  FrameLoop (tokio LocalSet) or Gamepad::tick_at
//! ```

pub mod binding;
pub mod config;
pub mod controller;
pub mod error;
pub mod gamepad;
pub mod haptics;
pub mod mapping;
pub mod registry;

pub use binding::{BindingKey, BindingTarget, Modifiers};
pub use config::GamepadOptions;
pub use controller::{
    DeviceInfo, DeviceSnapshot, DeviceSource, FrameLoop, GilrsSource, InputTick, PollStats,
    VirtualSource,
};
pub use error::GamepadError;
pub use gamepad::Gamepad;
pub use haptics::VibrationEffect;
pub use mapping::{Action, PlayerSlot};
pub use registry::{Callback, GamepadEvent, ListenerRegistry};
