//! Listener registry keyed by (player slot, action, button name)
//!
//! Each key holds an ordered stack of listeners. The most recently added entry is
//! the active one, which models mount order in a UI tree: the element mounted last
//! takes the button, and unmounting it hands the button back to whatever was
//! registered before.

use crate::controller::snapshot::DeviceSnapshot;
use crate::mapping::{Action, PlayerSlot};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// What a listener receives when it fires
#[derive(Debug, Clone, Copy)]
pub struct GamepadEvent<'a> {
    pub player: PlayerSlot,
    pub action: Action,
    pub button: &'a str,
    /// True for hold-repeat fires, false for the initial edge
    pub repeated: bool,
    pub device: &'a DeviceSnapshot,
}

type ListenerFn = dyn Fn(&GamepadEvent<'_>) -> color_eyre::Result<()>;

/// Shared handle to a listener function
///
/// Clones point at the same function; removal compares handles by identity, so
/// keep the clone you registered with if you want to unregister later.
#[derive(Clone)]
pub struct Callback(Rc<ListenerFn>);

impl Callback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&GamepadEvent<'_>) -> color_eyre::Result<()> + 'static,
    {
        Self(Rc::new(f))
    }

    /// Identity comparison
    pub fn same_as(&self, other: &Callback) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn call(&self, event: &GamepadEvent<'_>) -> color_eyre::Result<()> {
        (self.0)(event)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// One registration
#[derive(Debug, Clone)]
pub struct ListenerEntry {
    pub action: Action,
    pub button: String,
    pub repeat: bool,
    pub callback: Callback,
}

type ButtonListeners = HashMap<String, Vec<ListenerEntry>>;

#[derive(Debug, Default)]
pub struct ListenerRegistry {
    players: HashMap<PlayerSlot, HashMap<Action, ButtonListeners>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a listener onto the stack for (player, action, button)
    pub fn add_listener(
        &mut self,
        player: PlayerSlot,
        action: Action,
        button: &str,
        repeat: bool,
        callback: Callback,
    ) {
        debug!(
            "Adding {} listener for {}/{} (repeat: {})",
            action, player, button, repeat
        );
        self.players
            .entry(player)
            .or_default()
            .entry(action)
            .or_default()
            .entry(button.to_string())
            .or_default()
            .push(ListenerEntry {
                action,
                button: button.to_string(),
                repeat,
                callback,
            });
    }

    /// Drops every entry at the key whose callback is `callback`
    ///
    /// Empty containers are removed rather than left behind. Returns the number of
    /// entries removed.
    pub fn remove_listener(
        &mut self,
        player: PlayerSlot,
        action: Action,
        button: &str,
        callback: &Callback,
    ) -> usize {
        let Some(actions) = self.players.get_mut(&player) else {
            return 0;
        };
        let Some(buttons) = actions.get_mut(&action) else {
            return 0;
        };
        let Some(entries) = buttons.get_mut(button) else {
            return 0;
        };

        let before = entries.len();
        entries.retain(|entry| !entry.callback.same_as(callback));
        let removed = before - entries.len();

        if entries.is_empty() {
            buttons.remove(button);
        }
        if buttons.is_empty() {
            actions.remove(&action);
        }
        if actions.is_empty() {
            self.players.remove(&player);
        }

        debug!(
            "Removed {} {} listener(s) for {}/{}",
            removed, action, player, button
        );
        removed
    }

    /// Most recently added entry at the key
    ///
    /// Returned by value so the caller can invoke it without holding a borrow on
    /// the registry; the callback may add or remove listeners while it runs.
    pub fn active_listener(
        &self,
        player: PlayerSlot,
        action: Action,
        button: &str,
    ) -> Option<ListenerEntry> {
        self.listeners(player, action, button).last().cloned()
    }

    /// The whole stack at a key, oldest first
    pub fn listeners(&self, player: PlayerSlot, action: Action, button: &str) -> &[ListenerEntry] {
        self.players
            .get(&player)
            .and_then(|actions| actions.get(&action))
            .and_then(|buttons| buttons.get(button))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_player(&self, player: PlayerSlot) -> bool {
        self.players.contains_key(&player)
    }

    /// Total number of registered entries
    pub fn len(&self) -> usize {
        self.players
            .values()
            .flat_map(|actions| actions.values())
            .flat_map(|buttons| buttons.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
