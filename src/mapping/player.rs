//! Player slots (`player-1`..`player-8`)

use crate::error::GamepadError;
use std::fmt::{self, Display};
use std::str::FromStr;

/// Number of recognized player slots
pub const MAX_PLAYERS: usize = 8;

/// Logical player identifier, assigned to devices by connection order
///
/// Holds the 1-based slot number; construction is only possible for `1..=8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerSlot(u8);

impl PlayerSlot {
    pub const ONE: PlayerSlot = PlayerSlot(1);

    /// Slot from its 1-based number
    pub fn new(number: u8) -> Option<Self> {
        (1..=MAX_PLAYERS as u8)
            .contains(&number)
            .then_some(Self(number))
    }

    /// Slot for the device at `position` in the ordered device list
    pub fn from_position(position: usize) -> Option<Self> {
        let number = u8::try_from(position.checked_add(1)?).ok()?;
        Self::new(number)
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = PlayerSlot> {
        (1..=MAX_PLAYERS as u8).map(PlayerSlot)
    }
}

impl Display for PlayerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player-{}", self.0)
    }
}

impl FromStr for PlayerSlot {
    type Err = GamepadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlayerSlot::all()
            .find(|slot| slot.to_string() == s)
            .ok_or_else(|| GamepadError::UnknownPlayerSlot(s.to_string()))
    }
}
