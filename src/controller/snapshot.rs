//! Device snapshots and the source they are read from
//!
//! A [`DeviceSource`] is the poller's only window onto hardware. Once per frame the
//! poller drains its connect/disconnect events and then reads one
//! [`DeviceSnapshot`] per connected device. Snapshots are plain owned data; nothing
//! holds on to the source while listeners run.

use crate::error::GamepadError;
use crate::haptics::VibrationEffect;
use serde::{Deserialize, Serialize};

/// Mapping profile name reported by devices using the standard layout
pub const STANDARD_MAPPING: &str = "standard";

/// State of a single button
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ButtonSnapshot {
    pub pressed: bool,
    /// Analog value 0.0-1.0 (1.0 or 0.0 for digital buttons)
    pub value: f32,
}

impl ButtonSnapshot {
    pub fn pressed() -> Self {
        Self {
            pressed: true,
            value: 1.0,
        }
    }

    pub fn released() -> Self {
        Self::default()
    }
}

/// Read-only view of one connected device at a point in time
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Stable device index assigned by the source
    pub index: usize,
    pub name: String,
    /// Mapping profile (`"standard"` for the standard layout)
    pub mapping: String,
    pub buttons: Vec<ButtonSnapshot>,
    /// Axis values in -1.0..1.0, positive right/down
    pub axes: Vec<f32>,
}

impl DeviceSnapshot {
    /// All buttons released, all axes centered
    pub fn new(index: usize, name: &str, mapping: &str, buttons: usize, axes: usize) -> Self {
        Self {
            index,
            name: name.to_string(),
            mapping: mapping.to_string(),
            buttons: vec![ButtonSnapshot::default(); buttons],
            axes: vec![0.0; axes],
        }
    }

    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            index: self.index,
            name: self.name.clone(),
            mapping: self.mapping.clone(),
        }
    }
}

/// Identity of a device without its input state
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub mapping: String,
}

impl DeviceInfo {
    pub fn is_standard(&self) -> bool {
        self.mapping == STANDARD_MAPPING
    }
}

/// Connect/disconnect notification carrying the device index
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceEvent {
    Connected(DeviceInfo),
    Disconnected { index: usize },
}

/// Anything that can report connected controllers
pub trait DeviceSource {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Connect/disconnect events since the last call, oldest first
    fn poll_events(&mut self) -> Vec<DeviceEvent>;

    /// One snapshot per connected device, ordered by device index
    fn snapshots(&self) -> Vec<DeviceSnapshot>;

    /// Plays a rumble effect on a device
    fn vibrate(&mut self, index: usize, effect: &VibrationEffect) -> Result<(), GamepadError>;
}
