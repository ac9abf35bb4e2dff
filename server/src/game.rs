//! Canonical record of the round.
//!
//! Pure data: no I/O and no phase or role legality checks. The coordinator is
//! the only caller and decides when each mutation is allowed.

use shared::{words_match, PlayerStatus, Snapshot, MAX_LIVES};
use std::collections::{BTreeMap, HashMap};

/// A hint waiting for someone to attempt a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingHint {
    pub giver: String,
    pub public_hint: String,
    pub intended_word: String,
}

/// An open connection attempt and the guesses recorded for it so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionWindow {
    pub requester: String,
    pub guesses: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct GameState {
    secret: String,
    prefix: String,
    lives: u32,
    active_player: Option<String>,
    readiness: BTreeMap<String, bool>,
    pending_hint: Option<PendingHint>,
    connection: Option<ConnectionWindow>,
    history: Vec<String>,
    game_over: bool,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    pub fn new() -> Self {
        Self {
            secret: String::new(),
            prefix: String::new(),
            lives: MAX_LIVES,
            active_player: None,
            readiness: BTreeMap::new(),
            pending_hint: None,
            connection: None,
            history: Vec::new(),
            game_over: false,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn set_secret(&mut self, secret: &str) {
        self.secret = secret.trim().to_string();
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn lives(&self) -> u32 {
        self.lives
    }

    pub fn active_player(&self) -> Option<&str> {
        self.active_player.as_deref()
    }

    pub fn set_active_player(&mut self, player: Option<String>) {
        self.active_player = player;
    }

    pub fn is_defender(&self, name: &str) -> bool {
        self.active_player.as_deref() == Some(name)
    }

    pub fn reveal_initial_prefix(&mut self) {
        self.prefix = self.secret.chars().take(1).collect();
    }

    /// Extends the prefix by one character of the secret, if any remain.
    pub fn reveal_next_letter(&mut self) {
        let revealed = self.prefix.chars().count();
        if revealed < self.secret.chars().count() {
            self.prefix = self.secret.chars().take(revealed + 1).collect();
        }
    }

    pub fn is_secret_fully_revealed(&self) -> bool {
        !self.secret.is_empty() && words_match(&self.secret, Some(&self.prefix))
    }

    pub fn reset_lives(&mut self) {
        self.lives = MAX_LIVES;
    }

    pub fn lose_life(&mut self) {
        self.lives = self.lives.saturating_sub(1);
    }

    pub fn pending_hint(&self) -> Option<&PendingHint> {
        self.pending_hint.as_ref()
    }

    pub fn set_pending_hint(&mut self, giver: &str, public_hint: &str, intended_word: &str) {
        self.pending_hint = Some(PendingHint {
            giver: giver.to_string(),
            public_hint: public_hint.to_string(),
            intended_word: intended_word.to_string(),
        });
    }

    pub fn clear_pending_hint(&mut self) {
        self.pending_hint = None;
    }

    pub fn is_hint_active(&self) -> bool {
        self.pending_hint.is_some()
    }

    pub fn is_hint_phase_allowed(&self) -> bool {
        !self.game_over && !self.secret.is_empty()
    }

    pub fn connection(&self) -> Option<&ConnectionWindow> {
        self.connection.as_ref()
    }

    /// Opens a window for `requester`, dropping any stale guesses.
    pub fn open_connection(&mut self, requester: &str) {
        self.connection = Some(ConnectionWindow {
            requester: requester.to_string(),
            guesses: HashMap::new(),
        });
    }

    pub fn is_connection_window_open(&self) -> bool {
        self.connection.is_some()
    }

    pub fn put_guess(&mut self, player: &str, guess: &str) {
        if let Some(window) = self.connection.as_mut() {
            window.guesses.insert(player.to_string(), guess.to_string());
        }
    }

    /// Forgets a guess, as if `player` had never submitted one.
    pub fn drop_guess(&mut self, player: &str) {
        if let Some(window) = self.connection.as_mut() {
            window.guesses.remove(player);
        }
    }

    pub fn guess_of(&self, player: &str) -> Option<&str> {
        self.connection
            .as_ref()
            .and_then(|window| window.guesses.get(player))
            .map(String::as_str)
    }

    pub fn requester(&self) -> Option<&str> {
        self.connection
            .as_ref()
            .map(|window| window.requester.as_str())
    }

    /// True once both the Defender and the requester have guessed.
    pub fn is_connection_ready_to_resolve(&self) -> bool {
        match (&self.connection, &self.active_player) {
            (Some(window), Some(defender)) => {
                window.guesses.contains_key(defender)
                    && window.guesses.contains_key(&window.requester)
            }
            _ => false,
        }
    }

    pub fn clear_connection(&mut self) {
        self.connection = None;
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn set_game_over(&mut self, over: bool) {
        self.game_over = over;
    }

    pub fn add_history(&mut self, line: impl Into<String>) {
        self.history.push(line.into());
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn add_player(&mut self, name: &str) {
        self.readiness.insert(name.to_string(), false);
    }

    pub fn remove_player(&mut self, name: &str) {
        self.readiness.remove(name);
    }

    pub fn set_ready(&mut self, name: &str, ready: bool) {
        if let Some(flag) = self.readiness.get_mut(name) {
            *flag = ready;
        }
    }

    pub fn is_ready(&self, name: &str) -> bool {
        self.readiness.get(name).copied().unwrap_or(false)
    }

    pub fn readiness(&self) -> &BTreeMap<String, bool> {
        &self.readiness
    }

    pub fn all_ready(&self) -> bool {
        self.readiness.values().all(|ready| *ready)
    }

    pub fn player_count(&self) -> usize {
        self.readiness.len()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            prefix: self.prefix.clone(),
            lives: self.lives,
            defender: self.active_player.clone(),
            players: self
                .readiness
                .iter()
                .map(|(name, ready)| PlayerStatus {
                    name: name.clone(),
                    ready: *ready,
                })
                .collect(),
            history: self.history.clone(),
        }
    }
}
