//! Binding adapter
//!
//! Turns declarative bindings (`"player-2:button-a+button-b"` plus modifiers plus a
//! target) into registry calls. A UI layer calls [`Gamepad::bind`](crate::Gamepad::bind)
//! when an element mounts and [`Gamepad::unbind`](crate::Gamepad::unbind) with the same
//! arguments when it unmounts.

use crate::config::GamepadOptions;
use crate::error::GamepadError;
use crate::mapping::{self, Action, PlayerSlot};
use crate::registry::Callback;

const PLAYER_SEPARATOR: char = ':';
const BUTTON_SEPARATOR: char = '+';

/// Binding flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// React to the release edge instead of the press edge
    pub released: bool,
    /// Fire again while held (press bindings only)
    pub repeat: bool,
}

impl Modifiers {
    pub fn pressed() -> Self {
        Self::default()
    }

    pub fn released() -> Self {
        Self {
            released: true,
            repeat: false,
        }
    }

    pub fn repeating() -> Self {
        Self {
            released: false,
            repeat: true,
        }
    }

    pub fn action(&self) -> Action {
        if self.released {
            Action::Released
        } else {
            Action::Pressed
        }
    }
}

/// What a binding calls
///
/// `handler` wins when present. Without a handler and without an inline
/// `expression`, the element's own handler is used. An expression without a handler
/// can't be evaluated here and makes the binding invalid.
#[derive(Debug, Clone, Default)]
pub struct BindingTarget {
    pub handler: Option<Callback>,
    pub expression: Option<String>,
    pub element_handler: Option<Callback>,
}

impl BindingTarget {
    pub fn handler(callback: Callback) -> Self {
        Self {
            handler: Some(callback),
            ..Default::default()
        }
    }

    /// Binding that falls back to the element's own handler
    pub fn element(callback: Callback) -> Self {
        Self {
            element_handler: Some(callback),
            ..Default::default()
        }
    }

    pub fn resolve(&self, key: &str) -> Result<Callback, GamepadError> {
        match (&self.handler, &self.expression, &self.element_handler) {
            (Some(handler), _, _) => Ok(handler.clone()),
            (None, None, Some(element)) => Ok(element.clone()),
            (None, Some(expression), _) => Err(invalid(
                key,
                format!("expression '{}' is not a callback", expression),
            )),
            (None, None, None) => Err(invalid(key, "no callback to bind")),
        }
    }
}

/// A parsed binding key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingKey {
    pub player: PlayerSlot,
    pub buttons: Vec<String>,
}

impl BindingKey {
    /// Parses `player-N:button[+button...]` or a bare `button[+button...]` (player-1)
    ///
    /// Button names are checked against the configured mapping and the axis tables.
    pub fn parse(key: &str, options: &GamepadOptions) -> Result<Self, GamepadError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(invalid(key, "missing key"));
        }

        let (player, buttons) = match key.split_once(PLAYER_SEPARATOR) {
            Some((player, buttons)) => (player.trim().parse::<PlayerSlot>()?, buttons),
            None => (PlayerSlot::ONE, key),
        };

        let buttons: Vec<String> = buttons
            .split(BUTTON_SEPARATOR)
            .map(str::trim)
            .map(str::to_string)
            .collect();

        for button in &buttons {
            if button.is_empty() {
                return Err(invalid(key, "empty button name"));
            }
            if !is_bindable(button, options) {
                return Err(invalid(key, format!("unknown button '{}'", button)));
            }
        }

        Ok(Self { player, buttons })
    }
}

fn is_bindable(button: &str, options: &GamepadOptions) -> bool {
    options.resolve_button(button).is_some()
        || mapping::POSITIVE_AXIS_NAMES.contains(&button)
        || mapping::NEGATIVE_AXIS_NAMES.contains(&button)
}

fn invalid(key: &str, reason: impl Into<String>) -> GamepadError {
    GamepadError::InvalidBinding {
        key: key.to_string(),
        reason: reason.into(),
    }
}
