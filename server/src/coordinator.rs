//! The game's state machine.
//!
//! The coordinator owns the round state, the connection registry and the timer
//! scheduler. It is driven by exactly one task (the server loop), so every
//! command and every timer callback is applied one at a time: validate, mutate,
//! schedule, broadcast. Phases are implied by the state:
//!
//! | phase            | condition                                       |
//! |------------------|-------------------------------------------------|
//! | lobby            | no Defender                                     |
//! | secret pending   | Defender assigned, secret empty                 |
//! | hint phase       | secret set, no pending hint                     |
//! | hint open        | pending hint, no connection window              |
//! | connection open  | pending hint and connection window              |
//! | game over        | terminal flag set                               |

use crate::config::ServerConfig;
use crate::error::GameError;
use crate::game::GameState;
use crate::registry::{ConnId, PlayerSender, Registry};
use crate::timers::{TimerEvent, TimerScheduler, TimerToken};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use shared::{words_match, ClientMessage, Frame, Role, ServerMessage, MIN_PLAYERS};
use tokio::sync::mpsc;

pub struct Coordinator {
    state: GameState,
    registry: Registry,
    timers: TimerScheduler,
    rng: StdRng,
    max_connections: usize,
}

impl Coordinator {
    pub fn new(config: &ServerConfig, timer_tx: mpsc::UnboundedSender<TimerEvent>) -> Self {
        Self::with_rng(config, timer_tx, StdRng::from_entropy())
    }

    /// Deterministic Defender selection, for tests and replays.
    pub fn with_seed(
        config: &ServerConfig,
        timer_tx: mpsc::UnboundedSender<TimerEvent>,
        seed: u64,
    ) -> Self {
        Self::with_rng(config, timer_tx, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        config: &ServerConfig,
        timer_tx: mpsc::UnboundedSender<TimerEvent>,
        rng: StdRng,
    ) -> Self {
        Self {
            state: GameState::new(),
            registry: Registry::new(),
            timers: TimerScheduler::new(
                timer_tx,
                config.game.hint_timeout(),
                config.game.connection_window(),
            ),
            rng,
            max_connections: config.limits.max_connections,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn timers(&self) -> &TimerScheduler {
        &self.timers
    }

    // ---- transport events ----

    /// Registers a freshly accepted socket. Refused connections get an
    /// `ERROR` and their queue is dropped, which closes the socket.
    pub fn connection_opened(&mut self, id: ConnId, sender: PlayerSender) -> bool {
        if self.registry.len() >= self.max_connections {
            warn!("Rejecting connection {}: server full", id);
            let _ = sender.try_send(ServerMessage::error("Server full").encode());
            return false;
        }
        self.registry.add_connection(id, sender);
        true
    }

    pub fn connection_closed(&mut self, id: ConnId) {
        self.drop_connection(id);
        self.reap_evicted();
    }

    pub fn handle_frame(&mut self, id: ConnId, frame: &Frame) {
        match ClientMessage::from_frame(frame) {
            Ok(message) => self.handle_message(id, message),
            Err(err) => {
                debug!("Protocol error from connection {}: {}", id, err);
                self.registry.send_to_conn(id, &ServerMessage::error(&err));
            }
        }
        self.reap_evicted();
    }

    pub fn handle_message(&mut self, id: ConnId, message: ClientMessage) {
        let type_name = message.type_name();
        let result = match message {
            ClientMessage::Join { name } => self.join(id, &name),
            other => match self.registry.name_of(id).map(str::to_string) {
                Some(name) => self.dispatch(id, &name, other),
                None => Err(GameError::NotJoined),
            },
        };
        if let Err(err) = result {
            debug!("Rejected {} from connection {}: {}", type_name, id, err);
            self.registry.send_to_conn(id, &ServerMessage::error(&err));
        }
    }

    fn dispatch(&mut self, id: ConnId, name: &str, message: ClientMessage) -> Result<(), GameError> {
        match message {
            ClientMessage::Join { name } => self.join(id, &name),
            ClientMessage::SetSecret { secret } => self.set_secret(name, &secret),
            ClientMessage::Ready => self.ready(name),
            ClientMessage::StartHint { hint, intended } => self.start_hint(name, &hint, &intended),
            ClientMessage::Connect => self.request_connect(name),
            ClientMessage::SubmitGuess { guess } => self.submit_guess(name, &guess),
            ClientMessage::Ping => {
                self.registry.send_to_conn(id, &ServerMessage::Pong);
                Ok(())
            }
        }
    }

    pub fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::HintExpired { giver, token } => self.on_hint_timeout(&giver, token),
            TimerEvent::ConnectionExpired { token } => self.on_connection_timeout(token),
        }
        self.reap_evicted();
    }

    /// Cancels both timers and refuses to arm new ones.
    pub fn shutdown(&mut self) {
        info!("Coordinator shutting down");
        self.timers.shutdown();
    }

    // ---- commands ----

    pub fn join(&mut self, id: ConnId, name: &str) -> Result<(), GameError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GameError::EmptyName);
        }
        self.registry.bind_name(id, name)?;
        self.state.add_player(name);
        info!("{} joined ({} players)", name, self.registry.player_count());

        self.registry.broadcast(&ServerMessage::PlayerJoined {
            name: name.to_string(),
        });
        self.broadcast_state();
        self.registry.send_to_conn(
            id,
            &ServerMessage::Joined {
                name: name.to_string(),
            },
        );
        Ok(())
    }

    pub fn ready(&mut self, name: &str) -> Result<(), GameError> {
        self.state.set_ready(name, true);
        self.registry.broadcast(&ServerMessage::PlayerReady {
            name: name.to_string(),
        });

        if self.registry.player_count() < MIN_PLAYERS {
            self.registry.broadcast(&ServerMessage::info(format!(
                "Need at least {} ready players to start ({} connected)",
                MIN_PLAYERS,
                self.registry.player_count()
            )));
        } else {
            self.try_assign_roles();
        }

        self.broadcast_state();
        Ok(())
    }

    pub fn set_secret(&mut self, setter: &str, secret: &str) -> Result<(), GameError> {
        if self.state.is_game_over() {
            return Err(GameError::GameOver);
        }
        let defender = self
            .state
            .active_player()
            .ok_or(GameError::RolesNotAssigned)?;
        if defender != setter {
            return Err(GameError::NotDefender);
        }
        if !self.state.secret().is_empty() {
            return Err(GameError::SecretAlreadySet);
        }
        if secret.trim().is_empty() {
            return Err(GameError::EmptySecret);
        }

        self.state.set_secret(secret);
        self.state.set_active_player(Some(setter.to_string()));
        self.state.reveal_initial_prefix();
        self.state.reset_lives();
        let line = format!(
            "{} set a {}-letter secret word. First letter: {}",
            setter,
            self.state.secret().chars().count(),
            self.state.prefix()
        );
        info!("{}", line);
        self.state.add_history(line);

        self.broadcast_state();
        Ok(())
    }

    pub fn start_hint(&mut self, giver: &str, hint: &str, intended: &str) -> Result<(), GameError> {
        if !self.state.is_hint_phase_allowed() {
            return Err(if self.state.is_game_over() {
                GameError::GameOver
            } else {
                GameError::SecretNotSet
            });
        }
        if self.state.is_defender(giver) {
            return Err(GameError::DefenderCannotHint);
        }
        if self.state.is_hint_active() {
            return Err(GameError::HintAlreadyPending);
        }

        self.state.set_pending_hint(giver, hint, intended);
        // The intended word stays out of the log; the Defender reads it too.
        self.state.add_history(format!("{} gave a hint: {}", giver, hint));
        info!("{} started a hint", giver);

        self.registry.broadcast(&ServerMessage::HintStarted {
            giver: giver.to_string(),
            hint: hint.to_string(),
            time: self.timers.hint_timeout().as_secs(),
        });
        self.timers.schedule_hint_timeout(giver);
        self.broadcast_state();
        Ok(())
    }

    pub fn request_connect(&mut self, requester: &str) -> Result<(), GameError> {
        if self.state.is_game_over() {
            return Err(GameError::GameOver);
        }
        let giver = self
            .state
            .pending_hint()
            .map(|hint| hint.giver.clone())
            .ok_or(GameError::NoActiveHint)?;
        if self.state.is_connection_window_open() {
            return Err(GameError::ConnectionAlreadyOpen);
        }
        if self.state.is_defender(requester) {
            return Err(GameError::DefenderCannotConnect);
        }
        if giver == requester {
            return Err(GameError::OwnHint);
        }

        self.state.open_connection(requester);
        self.state.add_history(format!(
            "{} is connecting on {}'s hint",
            requester, giver
        ));
        info!("{} opened a connection window", requester);

        // The hint is now settled by the window, not by its own timeout.
        self.timers.cancel_hint_timeout();
        self.registry.broadcast(&ServerMessage::ConnectionWindow {
            requester: requester.to_string(),
            time: self.timers.connection_window().as_secs(),
        });
        self.timers.schedule_connection_window();
        self.broadcast_state();
        Ok(())
    }

    pub fn submit_guess(&mut self, who: &str, guess: &str) -> Result<(), GameError> {
        let requester = self
            .state
            .requester()
            .map(str::to_string)
            .ok_or(GameError::NoConnectionWindow)?;
        if !self.state.is_defender(who) && requester != who {
            return Err(GameError::NotInConnection);
        }

        self.state.put_guess(who, guess.trim());
        self.state.add_history(format!("{} submitted a guess", who));
        debug!("{} submitted a guess", who);
        self.broadcast_state();

        if self.state.is_connection_ready_to_resolve() {
            self.timers.cancel_connection_timer();
            self.resolve_connection();
        }
        Ok(())
    }

    /// Settles the open connection window. First matching rule wins:
    /// direct win, Defender interception, successful connection, failure.
    pub fn resolve_connection(&mut self) {
        self.timers.cancel_connection_timer();
        self.timers.cancel_hint_timeout();

        let Some(hint) = self.state.pending_hint().cloned() else {
            warn!("Resolving a connection without a pending hint");
            self.state.clear_connection();
            self.broadcast_state();
            return;
        };
        let requester = self.state.requester().unwrap_or_default().to_string();
        let requester_guess = self.state.guess_of(&requester).map(str::to_string);
        let defender_guess = self
            .state
            .active_player()
            .and_then(|defender| self.state.guess_of(defender))
            .map(str::to_string);
        let secret = self.state.secret().to_string();
        let intended = hint.intended_word.as_str();

        if words_match(&secret, Some(intended)) || words_match(&secret, requester_guess.as_deref())
        {
            self.state.add_history(format!(
                "{} and {} connected on the secret word itself",
                hint.giver, requester
            ));
            self.end_game(
                Role::Attacker,
                format!("Attackers found the secret word: {}", secret),
            );
        } else if words_match(intended, defender_guess.as_deref()) {
            self.state.lose_life();
            let remaining = self.state.lives();
            self.state.add_history(format!(
                "The Defender intercepted {}'s connection ({} lives left)",
                requester, remaining
            ));
            info!("Defender intercepted, {} lives left", remaining);
            self.registry
                .broadcast(&ServerMessage::LifeLost { remaining });
            if remaining == 0 {
                self.end_game(
                    Role::Defender,
                    format!("The Defender held the secret word: {}", secret),
                );
            }
        } else if words_match(intended, requester_guess.as_deref()) {
            self.state.reveal_next_letter();
            self.state.reset_lives();
            let new_prefix = self.state.prefix().to_string();
            self.state.add_history(format!(
                "{} and {} connected on \"{}\". Revealed: {}",
                hint.giver, requester, intended, new_prefix
            ));
            info!("Connection succeeded, prefix now {}", new_prefix);
            self.registry.broadcast(&ServerMessage::ConnectionSuccess {
                new_prefix,
                lives: self.state.lives(),
            });
            if self.state.is_secret_fully_revealed() {
                self.end_game(
                    Role::Attacker,
                    format!("The secret word was fully revealed: {}", secret),
                );
            }
        } else {
            self.state
                .add_history(format!("{}'s connection attempt failed", requester));
            info!("Connection by {} failed", requester);
            self.registry.broadcast(&ServerMessage::ConnectionFailed {
                msg: "Connection failed".to_string(),
            });
        }

        self.state.clear_pending_hint();
        self.state.clear_connection();
        self.broadcast_state();
    }

    // ---- timer callbacks ----

    pub fn on_hint_timeout(&mut self, giver: &str, token: TimerToken) {
        if !self.timers.claim_hint(token) {
            debug!("Ignoring stale hint timeout {}", token);
            return;
        }
        let still_pending = self
            .state
            .pending_hint()
            .is_some_and(|hint| hint.giver == giver);
        if !still_pending || self.state.is_connection_window_open() {
            return;
        }

        info!("Hint from {} timed out", giver);
        self.state
            .add_history(format!("Hint timeout has expired for {}", giver));
        self.registry.broadcast(&ServerMessage::HintTimeout {
            giver: giver.to_string(),
        });
        self.state.clear_pending_hint();
        self.broadcast_state();
    }

    pub fn on_connection_timeout(&mut self, token: TimerToken) {
        if !self.timers.claim_connection(token) {
            debug!("Ignoring stale connection timeout {}", token);
            return;
        }
        if !self.state.is_connection_window_open() {
            return;
        }
        info!("Connection window timed out");
        self.resolve_connection();
    }

    // ---- internals ----

    fn try_assign_roles(&mut self) -> bool {
        if self.state.is_game_over()
            || self.state.active_player().is_some()
            || self.registry.player_count() < MIN_PLAYERS
            || !self.state.all_ready()
        {
            return false;
        }

        let players = self.registry.player_names();
        let Some(defender) = players.choose(&mut self.rng).cloned() else {
            return false;
        };
        self.state.set_active_player(Some(defender.clone()));
        self.state
            .add_history(format!("Roles assigned: {} is the Defender (A)", defender));
        self.state
            .add_history("Everyone else is an Attacker (B)".to_string());
        info!("{} drawn as Defender among {} players", defender, players.len());

        self.registry.broadcast(&ServerMessage::RolesAssigned {
            defender: defender.clone(),
        });
        self.registry.send_to(
            &defender,
            &ServerMessage::info("You are the Defender. Set the secret word."),
        );
        true
    }

    fn end_game(&mut self, winner: Role, msg: String) {
        self.state.set_game_over(true);
        self.timers.cancel_hint_timeout();
        self.timers.cancel_connection_timer();
        self.state.add_history(format!("Game over: {}", msg));
        info!("Game over, winner {}: {}", winner, msg);
        self.registry
            .broadcast(&ServerMessage::GameOver { winner, msg });
    }

    fn broadcast_state(&mut self) {
        let snapshot = self.state.snapshot();
        self.registry
            .broadcast(&ServerMessage::StateUpdate(snapshot));
    }

    fn drop_connection(&mut self, id: ConnId) {
        let Some(connection) = self.registry.remove_connection(id) else {
            return;
        };
        let Some(name) = connection.name else {
            return;
        };
        self.state.remove_player(&name);
        info!("{} left ({} players)", name, self.registry.player_count());

        self.registry
            .broadcast(&ServerMessage::PlayerLeft { name: name.clone() });
        self.cleanup_after_departure(&name);
        self.broadcast_state();
    }

    /// Releases whatever the departed player was holding up.
    fn cleanup_after_departure(&mut self, name: &str) {
        if self.state.is_game_over() {
            return;
        }

        if self.state.is_defender(name) {
            if self.state.secret().is_empty() {
                self.state.set_active_player(None);
                self.state.add_history(format!(
                    "Defender {} left before choosing a secret",
                    name
                ));
                self.try_assign_roles();
            } else {
                self.state.clear_pending_hint();
                self.state.clear_connection();
                self.state
                    .add_history(format!("Defender {} left the game", name));
                self.end_game(Role::Attacker, "The Defender left the game".to_string());
            }
            return;
        }

        if self.state.requester() == Some(name) {
            self.state.add_history(format!(
                "{} left during their connection attempt",
                name
            ));
            self.state.drop_guess(name);
            self.resolve_connection();
            return;
        }

        let gave_pending_hint = self
            .state
            .pending_hint()
            .is_some_and(|hint| hint.giver == name);
        if gave_pending_hint && !self.state.is_connection_window_open() {
            self.timers.cancel_hint_timeout();
            self.state.clear_pending_hint();
            self.state
                .add_history(format!("{} left; their hint was withdrawn", name));
            self.registry.broadcast(&ServerMessage::info(format!(
                "{} left, hint withdrawn",
                name
            )));
        }
    }

    fn reap_evicted(&mut self) {
        loop {
            let evicted = self.registry.take_evicted();
            if evicted.is_empty() {
                break;
            }
            for id in evicted {
                warn!("Dropping connection {} after failed send", id);
                self.drop_connection(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{parse_frame, Snapshot, MAX_LIVES};
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    struct Table {
        coordinator: Coordinator,
        inboxes: HashMap<String, mpsc::Receiver<String>>,
        ids: HashMap<String, ConnId>,
        timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
        next_id: ConnId,
    }

    impl Table {
        fn new() -> Self {
            let (timer_tx, timer_rx) = mpsc::unbounded_channel();
            Self {
                coordinator: Coordinator::with_seed(&ServerConfig::default(), timer_tx, 7),
                inboxes: HashMap::new(),
                ids: HashMap::new(),
                timer_rx,
                next_id: 1,
            }
        }

        fn join(&mut self, name: &str) -> ConnId {
            let id = self.next_id;
            self.next_id += 1;
            let (tx, rx) = mpsc::channel(1024);
            assert!(self.coordinator.connection_opened(id, tx));
            self.coordinator.join(id, name).unwrap();
            self.inboxes.insert(name.to_string(), rx);
            self.ids.insert(name.to_string(), id);
            id
        }

        fn leave(&mut self, name: &str) {
            let id = self.ids[name];
            self.coordinator.connection_closed(id);
        }

        fn send(&mut self, name: &str, message: ClientMessage) {
            let id = self.ids[name];
            self.coordinator.handle_message(id, message);
        }

        fn drain(&mut self, name: &str) -> Vec<ServerMessage> {
            let rx = self.inboxes.get_mut(name).unwrap();
            let mut messages = Vec::new();
            while let Ok(text) = rx.try_recv() {
                let frame = parse_frame(&text).unwrap();
                messages.push(ServerMessage::from_frame(&frame).unwrap());
            }
            messages
        }

        fn drain_all(&mut self) {
            let names: Vec<String> = self.inboxes.keys().cloned().collect();
            for name in names {
                self.drain(&name);
            }
        }

        fn last_snapshot(&mut self, name: &str) -> Snapshot {
            self.drain(name)
                .into_iter()
                .filter_map(|m| match m {
                    ServerMessage::StateUpdate(s) => Some(s),
                    _ => None,
                })
                .last()
                .unwrap()
        }

        fn state(&self) -> &GameState {
            self.coordinator.state()
        }

        /// Three ready players. Returns (defender, giver, requester).
        fn seated(&mut self) -> (String, String, String) {
            for name in ["alice", "bob", "carol"] {
                self.join(name);
            }
            for name in ["alice", "bob", "carol"] {
                self.send(name, ClientMessage::Ready);
            }
            let defender = self.state().active_player().unwrap().to_string();
            let mut attackers = ["alice", "bob", "carol"]
                .into_iter()
                .filter(|n| *n != defender)
                .map(str::to_string);
            let giver = attackers.next().unwrap();
            let requester = attackers.next().unwrap();
            self.drain_all();
            (defender, giver, requester)
        }

        /// Seated table with `secret` set and a hint for `intended` open.
        fn connecting(&mut self, secret: &str, intended: &str) -> (String, String, String) {
            let (defender, giver, requester) = self.seated();
            self.coordinator.set_secret(&defender, secret).unwrap();
            self.coordinator.start_hint(&giver, "clue", intended).unwrap();
            self.coordinator.request_connect(&requester).unwrap();
            self.drain_all();
            (defender, giver, requester)
        }

        fn assert_invariants(&self) {
            let state = self.state();
            assert!(state.lives() <= MAX_LIVES);
            assert!(state.secret().starts_with(state.prefix()));
            if state.is_connection_window_open() {
                assert!(state.is_hint_active());
            }
            let keys: Vec<String> = state.readiness().keys().cloned().collect();
            assert_eq!(keys, self.coordinator.registry().player_names());
        }
    }

    fn has(messages: &[ServerMessage], pred: impl Fn(&ServerMessage) -> bool) -> bool {
        messages.iter().any(pred)
    }

    #[test]
    fn test_join_broadcasts_and_acknowledges() {
        let mut table = Table::new();
        table.join("alice");
        let messages = table.drain("alice");

        assert_eq!(
            messages[0],
            ServerMessage::PlayerJoined {
                name: "alice".to_string()
            }
        );
        assert!(matches!(messages[1], ServerMessage::StateUpdate(_)));
        assert_eq!(
            messages[2],
            ServerMessage::Joined {
                name: "alice".to_string()
            }
        );
        assert!(!table.state().is_ready("alice"));
        table.assert_invariants();
    }

    #[test]
    fn test_commands_before_join_are_rejected() {
        let mut table = Table::new();
        let (tx, mut rx) = mpsc::channel(8);
        table.coordinator.connection_opened(42, tx);

        table.coordinator.handle_message(42, ClientMessage::Ready);
        table.coordinator.handle_message(42, ClientMessage::Ping);

        for _ in 0..2 {
            let text = rx.try_recv().unwrap();
            assert_eq!(text, "TYPE:ERROR\nMSG:Register (JOIN) first");
        }
        assert_eq!(table.state().player_count(), 0);
    }

    #[test]
    fn test_protocol_errors_reply_to_sender_only() {
        let mut table = Table::new();
        table.join("alice");
        table.join("bob");
        table.drain_all();

        let id = table.ids["alice"];
        table
            .coordinator
            .handle_frame(id, &parse_frame("TYPE:WHATEVER").unwrap());
        table
            .coordinator
            .handle_frame(id, &parse_frame("NAME:x").unwrap());

        assert_eq!(
            table.drain("alice"),
            vec![
                ServerMessage::error("Unknown TYPE WHATEVER"),
                ServerMessage::error("Missing TYPE"),
            ]
        );
        assert!(table.drain("bob").is_empty());
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut table = Table::new();
        table.join("alice");
        let (tx, mut rx) = mpsc::channel(8);
        table.coordinator.connection_opened(99, tx);
        table.coordinator.handle_message(
            99,
            ClientMessage::Join {
                name: " alice ".to_string(),
            },
        );

        assert_eq!(
            rx.try_recv().unwrap(),
            "TYPE:ERROR\nMSG:Name alice is already taken"
        );
        assert_eq!(table.state().player_count(), 1);
    }

    #[test]
    fn test_ping() {
        let mut table = Table::new();
        table.join("alice");
        table.drain_all();
        table.send("alice", ClientMessage::Ping);
        assert_eq!(table.drain("alice"), vec![ServerMessage::Pong]);
    }

    #[test]
    fn test_readiness_gate() {
        let mut table = Table::new();
        table.join("alice");
        table.join("bob");
        table.send("alice", ClientMessage::Ready);
        table.send("bob", ClientMessage::Ready);

        let messages = table.drain("alice");
        assert!(has(&messages, |m| matches!(
            m,
            ServerMessage::Info { msg } if msg.starts_with("Need at least 3")
        )));
        assert!(table.state().active_player().is_none());

        table.join("carol");
        table.send("carol", ClientMessage::Ready);

        let defender = table.state().active_player().unwrap().to_string();
        assert!(["alice", "bob", "carol"].contains(&defender.as_str()));
        let messages = table.drain("bob");
        assert!(has(&messages, |m| *m
            == ServerMessage::RolesAssigned {
                defender: defender.clone()
            }));
        let snapshot = table.last_snapshot("carol");
        assert_eq!(snapshot.defender.as_deref(), Some(defender.as_str()));
        table.assert_invariants();
    }

    #[test]
    fn test_roles_wait_for_everyone() {
        let mut table = Table::new();
        for name in ["alice", "bob", "carol", "dave"] {
            table.join(name);
        }
        for name in ["alice", "bob", "carol"] {
            table.send(name, ClientMessage::Ready);
        }
        assert!(table.state().active_player().is_none());
        table.send("dave", ClientMessage::Ready);
        assert!(table.state().active_player().is_some());
    }

    #[test]
    fn test_set_secret_rules() {
        let mut table = Table::new();
        table.join("alice");
        assert_eq!(
            table.coordinator.set_secret("alice", "apple"),
            Err(GameError::RolesNotAssigned)
        );
        table.leave("alice");

        let (defender, giver, _) = table.seated();
        assert_eq!(
            table.coordinator.set_secret(&giver, "apple"),
            Err(GameError::NotDefender)
        );
        assert_eq!(
            table.coordinator.set_secret(&defender, "  "),
            Err(GameError::EmptySecret)
        );
        assert_ok!(table.coordinator.set_secret(&defender, "Apple"));
        assert_eq!(table.state().prefix(), "A");
        assert_eq!(table.state().lives(), MAX_LIVES);
        assert_eq!(
            table.coordinator.set_secret(&defender, "pear"),
            Err(GameError::SecretAlreadySet)
        );
        assert!(table
            .state()
            .history()
            .iter()
            .all(|line| !line.contains("Apple")));
    }

    #[tokio::test]
    async fn test_hint_rules() {
        let mut table = Table::new();
        let (defender, giver, requester) = table.seated();

        assert_eq!(
            table.coordinator.start_hint(&giver, "fruit", "apple"),
            Err(GameError::SecretNotSet)
        );
        table.coordinator.set_secret(&defender, "APPLE").unwrap();
        assert_eq!(
            table.coordinator.start_hint(&defender, "fruit", "apple"),
            Err(GameError::DefenderCannotHint)
        );

        assert_ok!(table.coordinator.start_hint(&giver, "fruit", "apricot"));
        assert!(table.coordinator.timers().is_hint_pending());
        let messages = table.drain(&defender);
        assert!(has(&messages, |m| *m
            == ServerMessage::HintStarted {
                giver: giver.clone(),
                hint: "fruit".to_string(),
                time: 120
            }));
        assert!(table
            .state()
            .history()
            .iter()
            .all(|line| !line.contains("apricot")));

        assert_eq!(
            table.coordinator.start_hint(&requester, "other", "apex"),
            Err(GameError::HintAlreadyPending)
        );
    }

    #[tokio::test]
    async fn test_connect_rules() {
        let mut table = Table::new();
        let (defender, giver, requester) = table.seated();
        table.coordinator.set_secret(&defender, "apple").unwrap();

        assert_eq!(
            table.coordinator.request_connect(&requester),
            Err(GameError::NoActiveHint)
        );
        table.coordinator.start_hint(&giver, "clue", "apex").unwrap();
        assert_eq!(
            table.coordinator.request_connect(&defender),
            Err(GameError::DefenderCannotConnect)
        );
        assert_eq!(
            table.coordinator.request_connect(&giver),
            Err(GameError::OwnHint)
        );

        assert_ok!(table.coordinator.request_connect(&requester));
        assert!(table.coordinator.timers().is_connection_pending());
        assert!(!table.coordinator.timers().is_hint_pending());
        let messages = table.drain(&giver);
        assert!(has(&messages, |m| *m
            == ServerMessage::ConnectionWindow {
                requester: requester.clone(),
                time: 10
            }));
        assert_eq!(
            table.coordinator.request_connect(&requester),
            Err(GameError::ConnectionAlreadyOpen)
        );
        table.assert_invariants();
    }

    #[tokio::test]
    async fn test_guess_rules() {
        let mut table = Table::new();
        let (defender, giver, requester) = table.seated();
        table.coordinator.set_secret(&defender, "apple").unwrap();
        assert_eq!(
            table.coordinator.submit_guess(&requester, "apex"),
            Err(GameError::NoConnectionWindow)
        );

        table.coordinator.start_hint(&giver, "clue", "apex").unwrap();
        table.coordinator.request_connect(&requester).unwrap();
        assert_eq!(
            table.coordinator.submit_guess(&giver, "apex"),
            Err(GameError::NotInConnection)
        );

        assert_ok!(table.coordinator.submit_guess(&requester, "apex"));
        assert!(table.state().is_connection_window_open());
        assert_eq!(
            table.state().history().last().unwrap(),
            &format!("{} submitted a guess", requester)
        );
    }

    #[tokio::test]
    async fn test_direct_win_on_intended_word() {
        let mut table = Table::new();
        let (defender, _giver, requester) = table.connecting("APPLE", "apple");

        table.coordinator.submit_guess(&defender, "apple").unwrap();
        table.coordinator.submit_guess(&requester, "banana").unwrap();

        assert!(table.state().is_game_over());
        let messages = table.drain(&defender);
        assert!(has(&messages, |m| matches!(
            m,
            ServerMessage::GameOver {
                winner: Role::Attacker,
                ..
            }
        )));
        assert!(!table.state().is_hint_active());
        assert!(!table.state().is_connection_window_open());
        assert!(!table.coordinator.timers().is_connection_pending());
    }

    #[tokio::test]
    async fn test_direct_win_on_requester_guess() {
        let mut table = Table::new();
        let (defender, _giver, requester) = table.connecting("APPLE", "apex");

        table.coordinator.submit_guess(&defender, "apex").unwrap();
        table.coordinator.submit_guess(&requester, "Apple").unwrap();

        assert!(table.state().is_game_over());
        assert_eq!(table.state().lives(), MAX_LIVES);
    }

    #[tokio::test]
    async fn test_interceptions_until_defender_wins() {
        let mut table = Table::new();
        let (defender, giver, requester) = table.seated();
        table.coordinator.set_secret(&defender, "APPLE").unwrap();

        for expected in (0..MAX_LIVES).rev() {
            table.coordinator.start_hint(&giver, "clue", "APE").unwrap();
            table.coordinator.request_connect(&requester).unwrap();
            table.coordinator.submit_guess(&defender, "ape").unwrap();
            table.coordinator.submit_guess(&requester, "ape").unwrap();

            assert_eq!(table.state().lives(), expected);
            assert_eq!(table.state().prefix(), "A");
            let messages = table.drain(&giver);
            assert!(has(&messages, |m| *m
                == ServerMessage::LifeLost {
                    remaining: expected
                }));
            table.assert_invariants();
        }

        assert!(table.state().is_game_over());
        assert_err!(table.coordinator.request_connect(&requester));
        assert_eq!(
            table.coordinator.start_hint(&giver, "clue", "x"),
            Err(GameError::GameOver)
        );
        let history = table.state().history();
        assert!(history.last().unwrap().starts_with("Game over"));
    }

    #[tokio::test]
    async fn test_successful_connection_reveals_letter() {
        let mut table = Table::new();
        let (defender, giver, requester) = table.seated();
        table.coordinator.set_secret(&defender, "APPLE").unwrap();

        // Lose a life first so the reset is observable.
        table.coordinator.start_hint(&giver, "clue", "ant").unwrap();
        table.coordinator.request_connect(&requester).unwrap();
        table.coordinator.submit_guess(&defender, "ant").unwrap();
        table.coordinator.submit_guess(&requester, "ant").unwrap();
        assert_eq!(table.state().lives(), MAX_LIVES - 1);

        table.coordinator.start_hint(&giver, "clue", "AP").unwrap();
        table.coordinator.request_connect(&requester).unwrap();
        table.drain_all();
        table.coordinator.submit_guess(&defender, "apex").unwrap();
        table.coordinator.submit_guess(&requester, "ap").unwrap();

        assert_eq!(table.state().prefix(), "AP");
        assert_eq!(table.state().lives(), MAX_LIVES);
        assert!(!table.state().is_game_over());
        let messages = table.drain(&giver);
        assert!(has(&messages, |m| *m
            == ServerMessage::ConnectionSuccess {
                new_prefix: "AP".to_string(),
                lives: MAX_LIVES
            }));
    }

    #[tokio::test]
    async fn test_full_reveal_ends_game() {
        let mut table = Table::new();
        let (defender, giver, requester) = table.seated();
        table.coordinator.set_secret(&defender, "at").unwrap();

        table.coordinator.start_hint(&giver, "clue", "ax").unwrap();
        table.coordinator.request_connect(&requester).unwrap();
        table.coordinator.submit_guess(&defender, "ab").unwrap();
        table.coordinator.submit_guess(&requester, "ax").unwrap();

        assert_eq!(table.state().prefix(), "at");
        assert!(table.state().is_game_over());
        let messages = table.drain(&requester);
        assert!(has(&messages, |m| matches!(
            m,
            ServerMessage::GameOver {
                winner: Role::Attacker,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_failed_connection_costs_nothing() {
        let mut table = Table::new();
        let (defender, _giver, requester) = table.connecting("APPLE", "apex");

        table.coordinator.submit_guess(&defender, "ant").unwrap();
        table.coordinator.submit_guess(&requester, "axe").unwrap();

        assert_eq!(table.state().lives(), MAX_LIVES);
        assert_eq!(table.state().prefix(), "A");
        assert!(!table.state().is_hint_active());
        let messages = table.drain(&requester);
        assert!(has(&messages, |m| matches!(
            m,
            ServerMessage::ConnectionFailed { .. }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_timeout_without_guesses() {
        let mut table = Table::new();
        let (defender, _giver, _requester) = table.connecting("APPLE", "apex");

        tokio::time::sleep(Duration::from_secs(10)).await;
        let event = table.timer_rx.recv().await.unwrap();
        assert!(matches!(event, TimerEvent::ConnectionExpired { .. }));
        table.coordinator.handle_timer(event);

        assert!(!table.state().is_connection_window_open());
        assert!(!table.state().is_hint_active());
        assert_eq!(table.state().lives(), MAX_LIVES);
        let messages = table.drain(&defender);
        assert!(has(&messages, |m| matches!(
            m,
            ServerMessage::ConnectionFailed { .. }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_timeout_with_only_defender_guess() {
        let mut table = Table::new();
        let (defender, _giver, _requester) = table.connecting("APPLE", "apex");
        table.coordinator.submit_guess(&defender, "APEX").unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        let event = table.timer_rx.recv().await.unwrap();
        table.coordinator.handle_timer(event);

        assert_eq!(table.state().lives(), MAX_LIVES - 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_timeout_with_only_requester_guess() {
        let mut table = Table::new();
        let (_defender, _giver, requester) = table.connecting("APPLE", "AP");
        assert_ok!(table.coordinator.submit_guess(&requester, "ap"));
        assert!(table.state().is_connection_window_open());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let event = table.timer_rx.recv().await.unwrap();
        table.coordinator.handle_timer(event);

        assert_eq!(table.state().prefix(), "AP");
        assert_eq!(table.state().lives(), MAX_LIVES);
        assert!(!table.state().is_game_over());
        table.assert_invariants();
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolved_window_ignores_late_timer() {
        let mut table = Table::new();
        let (defender, giver, requester) = table.connecting("APPLE", "apex");
        table.coordinator.submit_guess(&defender, "x").unwrap();
        table.coordinator.submit_guess(&requester, "y").unwrap();

        table.coordinator.start_hint(&giver, "again", "ant").unwrap();
        table.coordinator.request_connect(&requester).unwrap();

        // A stale event from the first window must not close the second.
        table
            .coordinator
            .handle_timer(TimerEvent::ConnectionExpired { token: 0 });
        assert!(table.state().is_connection_window_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hint_timeout_clears_hint() {
        let mut table = Table::new();
        let (defender, giver, _requester) = table.seated();
        table.coordinator.set_secret(&defender, "APPLE").unwrap();
        table.coordinator.start_hint(&giver, "clue", "apex").unwrap();
        table.drain_all();

        tokio::time::sleep(Duration::from_secs(120)).await;
        let event = table.timer_rx.recv().await.unwrap();
        table.coordinator.handle_timer(event);

        assert!(!table.state().is_hint_active());
        let messages = table.drain(&defender);
        assert!(has(&messages, |m| *m
            == ServerMessage::HintTimeout {
                giver: giver.clone()
            }));
        assert!(table
            .state()
            .history()
            .contains(&format!("Hint timeout has expired for {}", giver)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hint_timer_does_not_fire_during_connection() {
        let mut table = Table::new();
        table.connecting("APPLE", "apex");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(table.timer_rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_secs(6)).await;
        let event = table.timer_rx.recv().await.unwrap();
        assert!(matches!(event, TimerEvent::ConnectionExpired { .. }));
        table.coordinator.handle_timer(event);

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert!(table.timer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_defender_leaving_mid_round_ends_game() {
        let mut table = Table::new();
        let (defender, giver, _requester) = table.connecting("APPLE", "apex");
        table.leave(&defender);

        assert!(table.state().is_game_over());
        assert!(!table.state().is_connection_window_open());
        assert!(!table.coordinator.timers().is_connection_pending());
        let messages = table.drain(&giver);
        assert!(has(&messages, |m| *m
            == ServerMessage::PlayerLeft {
                name: defender.clone()
            }));
        assert!(has(&messages, |m| matches!(
            m,
            ServerMessage::GameOver {
                winner: Role::Attacker,
                ..
            }
        )));
        table.assert_invariants();
    }

    #[test]
    fn test_defender_leaving_before_secret_redraws() {
        let mut table = Table::new();
        for name in ["alice", "bob", "carol", "dave"] {
            table.join(name);
            table.send(name, ClientMessage::Ready);
        }
        let first = table.state().active_player().unwrap().to_string();

        table.leave(&first);
        let second = table.state().active_player().unwrap().to_string();
        assert_ne!(first, second);
        assert!(!table.state().is_game_over());
        table.assert_invariants();
    }

    #[tokio::test]
    async fn test_requester_leaving_resolves_window() {
        let mut table = Table::new();
        let (defender, _giver, requester) = table.connecting("APPLE", "apex");
        table.coordinator.submit_guess(&defender, "apex").unwrap();
        table.leave(&requester);

        assert!(!table.state().is_connection_window_open());
        assert_eq!(table.state().lives(), MAX_LIVES - 1);
        table.assert_invariants();
    }

    #[tokio::test]
    async fn test_departed_requester_guess_is_ignored() {
        let mut table = Table::new();
        let (_defender, _giver, requester) = table.connecting("APPLE", "apex");
        table.coordinator.submit_guess(&requester, "apex").unwrap();
        table.leave(&requester);

        assert!(!table.state().is_connection_window_open());
        assert!(!table.state().is_hint_active());
        assert_eq!(table.state().prefix(), "A");
        assert_eq!(table.state().lives(), MAX_LIVES);
        table.assert_invariants();
    }

    #[tokio::test]
    async fn test_departed_requester_cannot_win_with_secret() {
        let mut table = Table::new();
        let (_defender, _giver, requester) = table.connecting("APPLE", "apex");
        table.coordinator.submit_guess(&requester, "apple").unwrap();
        table.leave(&requester);

        assert!(!table.state().is_game_over());
        assert_eq!(table.state().prefix(), "A");
        table.assert_invariants();
    }

    #[tokio::test]
    async fn test_giver_leaving_withdraws_hint() {
        let mut table = Table::new();
        let (defender, giver, _requester) = table.seated();
        table.coordinator.set_secret(&defender, "APPLE").unwrap();
        table.coordinator.start_hint(&giver, "clue", "apex").unwrap();
        table.leave(&giver);

        assert!(!table.state().is_hint_active());
        assert!(!table.coordinator.timers().is_hint_pending());
        table.assert_invariants();
    }

    #[test]
    fn test_slow_client_is_evicted() {
        let mut table = Table::new();
        table.join("alice");
        let (tx, _rx) = mpsc::channel(1);
        table.coordinator.connection_opened(50, tx);
        table.coordinator.join(50, "slow").unwrap();
        table.coordinator.connection_closed(999);

        // JOIN alone queues three frames into a one-slot queue.
        table.send("alice", ClientMessage::Ready);
        assert!(!table.coordinator.registry().is_player("slow"));
        assert!(!table.state().readiness().contains_key("slow"));
        let messages = table.drain("alice");
        assert!(has(&messages, |m| *m
            == ServerMessage::PlayerLeft {
                name: "slow".to_string()
            }));
        table.assert_invariants();
    }

    #[test]
    fn test_server_full() {
        let (timer_tx, _timer_rx) = mpsc::unbounded_channel();
        let mut config = ServerConfig::default();
        config.limits.max_connections = 1;
        let mut coordinator = Coordinator::new(&config, timer_tx);

        let (tx1, _rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        assert!(coordinator.connection_opened(1, tx1));
        assert!(!coordinator.connection_opened(2, tx2));
        assert_eq!(rx2.try_recv().unwrap(), "TYPE:ERROR\nMSG:Server full");
        assert_eq!(coordinator.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_timers() {
        let mut table = Table::new();
        table.connecting("APPLE", "apex");
        table.coordinator.shutdown();
        assert!(!table.coordinator.timers().is_connection_pending());
        assert!(!table.coordinator.timers().is_hint_pending());
    }
}
