//! Text rendering of server messages for the terminal.

use shared::{Role, ServerMessage, Snapshot};

/// Turns server messages into printable lines. State updates arrive after
/// every change, so the renderer remembers the last one and only prints what
/// is new: changed status and history lines not seen before.
#[derive(Debug, Default)]
pub struct Renderer {
    own_name: Option<String>,
    last_snapshot: Option<Snapshot>,
    history_seen: usize,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn own_name(&self) -> Option<&str> {
        self.own_name.as_deref()
    }

    /// Forgets the previous session's state, e.g. after a reconnect.
    pub fn reset(&mut self) {
        self.last_snapshot = None;
        self.history_seen = 0;
    }

    pub fn render(&mut self, message: &ServerMessage) -> Vec<String> {
        match message {
            ServerMessage::Joined { name } => {
                self.own_name = Some(name.clone());
                vec![format!("Joined as {}. Type 'ready' when you are.", name)]
            }
            ServerMessage::PlayerJoined { name } => vec![format!("+ {} joined", name)],
            ServerMessage::PlayerLeft { name } => vec![format!("- {} left", name)],
            ServerMessage::PlayerReady { name } => vec![format!("{} is ready", name)],
            ServerMessage::RolesAssigned { defender } => {
                if self.own_name.as_deref() == Some(defender.as_str()) {
                    vec!["You are the Defender (A). Choose a secret with 'secret <word>'.".to_string()]
                } else {
                    vec![format!(
                        "{} is the Defender (A). You are an Attacker (B).",
                        defender
                    )]
                }
            }
            ServerMessage::Info { msg } => vec![format!("[info] {}", msg)],
            ServerMessage::Error { msg } => vec![format!("[error] {}", msg)],
            ServerMessage::HintStarted { giver, hint, time } => vec![format!(
                "{} hints: \"{}\" ({}s to connect)",
                giver, hint, time
            )],
            ServerMessage::HintTimeout { giver } => {
                vec![format!("{}'s hint expired", giver)]
            }
            ServerMessage::ConnectionWindow { requester, time } => {
                let mut lines = vec![format!(
                    "{} is connecting! {}s to submit guesses",
                    requester, time
                )];
                if self.is_defender() || self.own_name.as_deref() == Some(requester.as_str()) {
                    lines.push("Submit yours with 'guess <word>'.".to_string());
                }
                lines
            }
            ServerMessage::ConnectionSuccess { new_prefix, lives } => vec![format!(
                "Connection! The word starts with {} (lives reset to {})",
                new_prefix, lives
            )],
            ServerMessage::ConnectionFailed { msg } => vec![msg.clone()],
            ServerMessage::LifeLost { remaining } => {
                vec![format!("Intercepted! Defender lives left: {}", remaining)]
            }
            ServerMessage::GameOver { winner, msg } => {
                let side = match winner {
                    Role::Defender => "Defender (A)",
                    Role::Attacker => "Attackers (B)",
                };
                vec![format!("GAME OVER: {} win. {}", side, msg)]
            }
            ServerMessage::Pong => vec!["pong".to_string()],
            ServerMessage::StateUpdate(snapshot) => self.render_snapshot(snapshot),
        }
    }

    fn is_defender(&self) -> bool {
        match (&self.own_name, &self.last_snapshot) {
            (Some(name), Some(snapshot)) => snapshot.defender.as_deref() == Some(name.as_str()),
            _ => false,
        }
    }

    fn render_snapshot(&mut self, snapshot: &Snapshot) -> Vec<String> {
        let mut lines = Vec::new();

        let status_changed = match &self.last_snapshot {
            Some(last) => {
                last.prefix != snapshot.prefix
                    || last.lives != snapshot.lives
                    || last.defender != snapshot.defender
                    || last.players != snapshot.players
            }
            None => true,
        };
        if status_changed {
            lines.push(self.status_line(snapshot));
        }

        if snapshot.history.len() < self.history_seen {
            self.history_seen = 0;
        }
        for line in &snapshot.history[self.history_seen..] {
            lines.push(format!("  | {}", line));
        }
        self.history_seen = snapshot.history.len();

        self.last_snapshot = Some(snapshot.clone());
        lines
    }

    fn status_line(&self, snapshot: &Snapshot) -> String {
        let word = if snapshot.prefix.is_empty() {
            "?".to_string()
        } else {
            format!("{}...", snapshot.prefix)
        };
        let players: Vec<String> = snapshot
            .players
            .iter()
            .map(|player| {
                let you = if self.own_name.as_deref() == Some(player.name.as_str()) {
                    " (You)"
                } else {
                    ""
                };
                let state = if player.ready { "ready" } else { "waiting" };
                format!("{}{} [{}]", player.name, you, state)
            })
            .collect();

        format!(
            "Word: {}  Lives: {}  Defender: {}  Players: {}",
            word,
            snapshot.lives,
            snapshot.defender.as_deref().unwrap_or("-"),
            players.join(", ")
        )
    }
}
