//! Naming layer between hardware indices and the names bindings use.
//!
//! Buttons are addressed by their position in the standard layout and translated
//! through the configured `button_mapping`. Axes become synthetic buttons: each of the
//! four stick axes has a positive and a negative name, so a stick pushed right
//! reads as `left-analog-right` and can be bound like any other button.

pub mod names;
pub mod player;

pub use names::{
    axis_name, axis_names, default_button_mapping, resolve_button,
    BUTTON_NAMES, NEGATIVE_AXIS_NAMES, POSITIVE_AXIS_NAMES,
};
pub use player::{PlayerSlot, MAX_PLAYERS};

use std::fmt::{self, Display};

/// Which edge a listener reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Pressed,
    Released,
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Pressed => write!(f, "pressed"),
            Action::Released => write!(f, "released"),
        }
    }
}
