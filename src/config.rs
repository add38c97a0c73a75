//! Recognized options for the gamepad poller
//!
//! Options are plain serde data so hosts can keep them in a TOML file next to the
//! rest of their settings. Every field has a default; a file only needs the keys it
//! wants to change.

use crate::error::GamepadError;
use crate::mapping;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "padbind";
const CONFIG_FILE: &str = "options.toml";

/// Poller configuration
///
/// # Examples
///
/// ```rust
/// use padbind::config::GamepadOptions;
///
/// // Slow first repeat, quick cadence afterwards (menu scrolling)
/// let options = GamepadOptions {
///     initial_timeout_ms: 500,
///     repeat_timeout_ms: 100,
///     ..Default::default()
/// };
/// assert!(options.validate().is_ok());
/// ```
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct GamepadOptions {
    /// Axis magnitude that counts as a press (0.0-1.0]
    pub threshold: f32,

    /// Delay before the first repeat of a held button, in milliseconds
    pub initial_timeout_ms: u64,

    /// Delay between subsequent repeats, in milliseconds
    pub repeat_timeout_ms: u64,

    /// Button names indexed by hardware button index
    pub button_mapping: Vec<String>,

    pub controller_vibration: bool,

    pub mobile_vibration: bool,

    /// Fixed tick of the frame loop, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for GamepadOptions {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            initial_timeout_ms: 200,
            repeat_timeout_ms: 200,
            button_mapping: mapping::default_button_mapping(),
            controller_vibration: true,
            mobile_vibration: false,
            poll_interval_ms: 16, // ~60 frames per second
        }
    }
}

impl GamepadOptions {
    pub fn initial_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_timeout_ms)
    }

    pub fn repeat_timeout(&self) -> Duration {
        Duration::from_millis(self.repeat_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Name bound to hardware button `index`, if the mapping covers it
    pub fn button_name(&self, index: usize) -> Option<&str> {
        self.button_mapping.get(index).map(String::as_str)
    }

    /// Hardware index for a configured button name
    pub fn resolve_button(&self, name: &str) -> Option<usize> {
        self.button_mapping.iter().position(|candidate| candidate == name)
    }

    /// Vibration is allowed when either flag is set
    pub fn vibration_enabled(&self) -> bool {
        self.controller_vibration || self.mobile_vibration
    }

    pub fn validate(&self) -> Result<(), GamepadError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(GamepadError::Config(format!(
                "threshold must be within (0, 1], got {}",
                self.threshold
            )));
        }
        if self.repeat_timeout_ms == 0 {
            return Err(GamepadError::Config(
                "repeat_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(GamepadError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.button_mapping.is_empty() {
            return Err(GamepadError::Config(
                "button_mapping must name at least one button".to_string(),
            ));
        }
        if self.button_mapping.len() != mapping::BUTTON_NAMES.len() {
            warn!(
                "button_mapping has {} entries, the standard layout has {}",
                self.button_mapping.len(),
                mapping::BUTTON_NAMES.len()
            );
        }

        let mut seen = HashSet::new();
        for name in &self.button_mapping {
            if !seen.insert(name.as_str()) {
                return Err(GamepadError::Config(format!(
                    "button_mapping contains '{}' twice",
                    name
                )));
            }
        }

        Ok(())
    }

    /// `<config dir>/padbind/options.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self, GamepadError> {
        debug!("Loading gamepad options from {}", path.display());
        let content = fs::read_to_string(path)?;
        let options: GamepadOptions = toml::from_str(&content)?;
        options.validate()?;
        info!("Loaded gamepad options from {}", path.display());
        Ok(options)
    }

    pub fn save(&self, path: &Path) -> Result<(), GamepadError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        info!("Saved gamepad options to {}", path.display());
        Ok(())
    }

    /// Options from the default path, or defaults when missing or unreadable
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            warn!("No configuration directory available, using default options");
            return Self::default();
        };

        if !path.exists() {
            debug!("No options file at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load(&path) {
            Ok(options) => options,
            Err(e) => {
                warn!("Ignoring options file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}
