//! Dual-rumble vibration effects

use serde::{Deserialize, Serialize};

/// Duration used by vibration bindings that don't specify one
pub const DEFAULT_VIBRATION_MS: u32 = 200;

/// Dual-rumble effect parameters
///
/// Magnitudes are 0.0-1.0 and are clamped when handed to a device.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VibrationEffect {
    pub start_delay_ms: u32,
    pub duration_ms: u32,
    /// High-frequency (small) motor
    pub weak_magnitude: f32,
    /// Low-frequency (large) motor
    pub strong_magnitude: f32,
}

impl Default for VibrationEffect {
    fn default() -> Self {
        Self {
            start_delay_ms: 0,
            duration_ms: DEFAULT_VIBRATION_MS,
            weak_magnitude: 0.1,
            strong_magnitude: 0.1,
        }
    }
}

impl VibrationEffect {
    /// Default effect with a different duration
    pub fn with_duration(duration_ms: u32) -> Self {
        Self {
            duration_ms,
            ..Default::default()
        }
    }

    pub fn weak_u16(&self) -> u16 {
        magnitude_to_u16(self.weak_magnitude)
    }

    pub fn strong_u16(&self) -> u16 {
        magnitude_to_u16(self.strong_magnitude)
    }
}

fn magnitude_to_u16(magnitude: f32) -> u16 {
    (magnitude.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16
}
