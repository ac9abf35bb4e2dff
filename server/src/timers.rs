//! Hint and connection-window timeouts.
//!
//! Each kind has at most one outstanding task. A task sleeps for its budget and
//! then posts a [`TimerEvent`] to the server loop; it never touches game state
//! itself. Every schedule hands out a fresh token, and the coordinator only
//! acts on an event whose token is still the current one, so a timer that was
//! cancelled (or replaced) after it had already fired is ignored.

use log::debug;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub type TimerToken = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    HintExpired { giver: String, token: TimerToken },
    ConnectionExpired { token: TimerToken },
}

#[derive(Debug)]
struct PendingTimer {
    token: TimerToken,
    handle: JoinHandle<()>,
}

impl PendingTimer {
    fn cancel(self) {
        self.handle.abort();
    }
}

pub struct TimerScheduler {
    tx: mpsc::UnboundedSender<TimerEvent>,
    hint_timeout: Duration,
    connection_window: Duration,
    next_token: TimerToken,
    hint: Option<PendingTimer>,
    connection: Option<PendingTimer>,
    shut_down: bool,
}

impl TimerScheduler {
    pub fn new(
        tx: mpsc::UnboundedSender<TimerEvent>,
        hint_timeout: Duration,
        connection_window: Duration,
    ) -> Self {
        Self {
            tx,
            hint_timeout,
            connection_window,
            next_token: 1,
            hint: None,
            connection: None,
            shut_down: false,
        }
    }

    pub fn hint_timeout(&self) -> Duration {
        self.hint_timeout
    }

    pub fn connection_window(&self) -> Duration {
        self.connection_window
    }

    /// Arms the hint timeout, replacing any outstanding one.
    pub fn schedule_hint_timeout(&mut self, giver: &str) -> Option<TimerToken> {
        if self.shut_down {
            return None;
        }
        self.cancel_hint_timeout();
        let token = self.alloc_token();
        let event = TimerEvent::HintExpired {
            giver: giver.to_string(),
            token,
        };
        let handle = self.spawn(self.hint_timeout, event);
        self.hint = Some(PendingTimer { token, handle });
        debug!("Hint timeout {} armed for {}", token, giver);
        Some(token)
    }

    /// Arms the connection-window timeout, replacing any outstanding one.
    pub fn schedule_connection_window(&mut self) -> Option<TimerToken> {
        if self.shut_down {
            return None;
        }
        self.cancel_connection_timer();
        let token = self.alloc_token();
        let handle = self.spawn(
            self.connection_window,
            TimerEvent::ConnectionExpired { token },
        );
        self.connection = Some(PendingTimer { token, handle });
        debug!("Connection timeout {} armed", token);
        Some(token)
    }

    pub fn cancel_hint_timeout(&mut self) {
        if let Some(timer) = self.hint.take() {
            debug!("Hint timeout {} cancelled", timer.token);
            timer.cancel();
        }
    }

    pub fn cancel_connection_timer(&mut self) {
        if let Some(timer) = self.connection.take() {
            debug!("Connection timeout {} cancelled", timer.token);
            timer.cancel();
        }
    }

    /// Claims a fired hint timeout. Returns false for stale tokens.
    pub fn claim_hint(&mut self, token: TimerToken) -> bool {
        match &self.hint {
            Some(timer) if timer.token == token => {
                self.hint = None;
                true
            }
            _ => false,
        }
    }

    /// Claims a fired connection timeout. Returns false for stale tokens.
    pub fn claim_connection(&mut self, token: TimerToken) -> bool {
        match &self.connection {
            Some(timer) if timer.token == token => {
                self.connection = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_hint_pending(&self) -> bool {
        self.hint.is_some()
    }

    pub fn is_connection_pending(&self) -> bool {
        self.connection.is_some()
    }

    pub fn shutdown(&mut self) {
        self.cancel_hint_timeout();
        self.cancel_connection_timer();
        self.shut_down = true;
    }

    fn alloc_token(&mut self) -> TimerToken {
        let token = self.next_token;
        self.next_token += 1;
        token
    }

    fn spawn(&self, delay: Duration, event: TimerEvent) -> JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The server loop is gone during shutdown; nothing left to notify.
            let _ = tx.send(event);
        })
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        self.cancel_hint_timeout();
        self.cancel_connection_timer();
    }
}
