//! Controller subsystem for gamepad input handling
//!
//! Splits device access from input interpretation:
//!
//! 1. [`snapshot`] - Device snapshots and the [`DeviceSource`] seam
//! 2. [`gilrs_source`] / [`virtual_source`] - Real and scripted device sources
//! 3. [`poller`] - Edge detection, hold-repeat and listener dispatch
//! 4. [`connection`] - Observable connection state
//! 5. [`frame_loop`] - Cancellable repeating task that drives the poller
//!
//! # Architecture
//!
//! ```text
//! DeviceSource ──► InputPoller ──► ListenerRegistry ──► callbacks
//!  (snapshots)        │   │
//!                     │   └──► broadcast<InputTick>
//!                     └──► ConnectionTracker ──► watch<bool>, watch<Vec<DeviceInfo>>
//! ```
//!
//! Everything runs on one thread. The frame loop is spawned with
//! `tokio::task::spawn_local`, so callbacks may capture `Rc` state.

pub mod connection;
pub mod frame_loop;
pub mod gilrs_source;
pub mod poller;
pub mod snapshot;
pub mod virtual_source;

pub use connection::ConnectionTracker;
pub use frame_loop::{FrameLoop, Idle, Running, Stopped};
pub use gilrs_source::GilrsSource;
pub use poller::{HoldingState, InputPoller, InputTick, PollStats};
pub use snapshot::{
    ButtonSnapshot, DeviceEvent, DeviceInfo, DeviceSnapshot, DeviceSource, STANDARD_MAPPING,
};
pub use virtual_source::VirtualSource;
