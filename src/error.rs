//! Error definitions for padbind
//!
//! Nothing in here is fatal to the host. Every variant maps to one of two outcomes:
//! the whole feature goes inactive, or a single binding/listener is ignored.

use thiserror::Error;

/// Error types for the gamepad integration layer
#[derive(Debug, Error)]
pub enum GamepadError {
    /// The input device API could not be initialized
    ///
    /// Logged once; the poller never starts and registrations become no-ops.
    #[error("Gamepad input is not supported in this environment: {0}")]
    UnsupportedEnvironment(String),

    /// A binding request was malformed (missing key, conflicting handler/expression)
    #[error("Invalid binding. '{key}' was not bound: {reason}")]
    InvalidBinding { key: String, reason: String },

    /// Registration or removal named a slot outside `player-1`..`player-8`
    #[error("Unknown player slot: {0}")]
    UnknownPlayerSlot(String),

    /// A listener callback returned an error or panicked during dispatch
    #[error("Listener for {player}/{button} failed: {reason}")]
    CallbackFailed {
        player: String,
        button: String,
        reason: String,
    },

    /// Option values out of range or inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse options: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    #[error("Failed to serialize options: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Force feedback could not be played on the device
    #[error("Haptics error: {0}")]
    Haptics(String),

    /// `start()` was called while a frame loop is still running
    #[error("Frame loop is already running")]
    AlreadyRunning,
}
