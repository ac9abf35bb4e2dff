//! Connection registry: who is connected, under which name, and how to reach them.
//!
//! Every accepted socket gets a server-assigned connection id and a bounded
//! outbound channel drained by its writer task. A connection becomes a player
//! once it JOINs under a display name. Sends never block: a connection whose
//! queue is full (or whose writer is gone) is marked as evicted and handed back
//! to the coordinator through [`Registry::take_evicted`].

use crate::error::GameError;
use log::{debug, info, warn};
use shared::ServerMessage;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

pub type ConnId = u32;

/// Outbound queue of encoded frames for one connection.
pub type PlayerSender = mpsc::Sender<String>;

#[derive(Debug)]
pub struct Connection {
    pub id: ConnId,
    pub name: Option<String>,
    pub connected_at: Instant,
    sender: PlayerSender,
    evicted: bool,
}

impl Connection {
    pub fn new(id: ConnId, sender: PlayerSender) -> Self {
        Self {
            id,
            name: None,
            connected_at: Instant::now(),
            sender,
            evicted: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    connections: HashMap<ConnId, Connection>,
    /// Joined players by display name.
    players: BTreeMap<String, ConnId>,
    evicted: Vec<ConnId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_connection(&mut self, id: ConnId, sender: PlayerSender) {
        debug!("Connection {} registered", id);
        self.connections.insert(id, Connection::new(id, sender));
    }

    /// Drops the connection and its player binding. Dropping the sender closes
    /// the outbound queue, which ends the connection's writer task.
    pub fn remove_connection(&mut self, id: ConnId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        if let Some(name) = &connection.name {
            if self.players.get(name) == Some(&id) {
                self.players.remove(name);
            }
        }
        debug!(
            "Connection {} removed after {:?}",
            id,
            connection.connected_at.elapsed()
        );
        Some(connection)
    }

    /// Binds a display name to a connection.
    pub fn bind_name(&mut self, id: ConnId, name: &str) -> Result<(), GameError> {
        let connection = self.connections.get(&id).ok_or(GameError::NotJoined)?;
        if let Some(existing) = &connection.name {
            return Err(GameError::AlreadyJoined(existing.clone()));
        }
        if self.players.contains_key(name) {
            return Err(GameError::NameTaken(name.to_string()));
        }
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.name = Some(name.to_string());
        }
        self.players.insert(name.to_string(), id);
        info!("Connection {} joined as {}", id, name);
        Ok(())
    }

    pub fn name_of(&self, id: ConnId) -> Option<&str> {
        self.connections.get(&id).and_then(|c| c.name.as_deref())
    }

    pub fn conn_of(&self, name: &str) -> Option<ConnId> {
        self.players.get(name).copied()
    }

    pub fn is_player(&self, name: &str) -> bool {
        self.players.contains_key(name)
    }

    /// Joined player names in sorted order.
    pub fn player_names(&self) -> Vec<String> {
        self.players.keys().cloned().collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn send_to_conn(&mut self, id: ConnId, message: &ServerMessage) {
        let text = message.encode();
        self.deliver(id, text);
    }

    /// Sends to a joined player. Unknown names are ignored.
    pub fn send_to(&mut self, name: &str, message: &ServerMessage) {
        if let Some(id) = self.conn_of(name) {
            self.send_to_conn(id, message);
        }
    }

    /// Sends to every joined player.
    pub fn broadcast(&mut self, message: &ServerMessage) {
        let text = message.encode();
        debug!("[Broadcast] {}", text.replace('\n', "||"));
        let ids: Vec<ConnId> = self.players.values().copied().collect();
        for id in ids {
            self.deliver(id, text.clone());
        }
    }

    /// Connections that failed a send since the last call.
    pub fn take_evicted(&mut self) -> Vec<ConnId> {
        std::mem::take(&mut self.evicted)
    }

    fn deliver(&mut self, id: ConnId, text: String) {
        let Some(connection) = self.connections.get_mut(&id) else {
            return;
        };
        if connection.evicted {
            return;
        }
        match connection.sender.try_send(text) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Outbound queue full for connection {} ({}), evicting",
                    id,
                    connection.name.as_deref().unwrap_or("unjoined")
                );
                connection.evicted = true;
                self.evicted.push(id);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Outbound queue closed for connection {}", id);
                connection.evicted = true;
                self.evicted.push(id);
            }
        }
    }
}
