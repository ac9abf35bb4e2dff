//! # Contact Game Server Library
//!
//! This library provides the authoritative server for Contact, a multiplayer
//! word-guessing game played over TCP. One player, the Defender, picks a
//! secret word and reveals only its first letter. The other players, the
//! Attackers, give each other hints about words that share the revealed
//! prefix and try to "connect" on the same word before the Defender can
//! intercept it.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Game State
//! The server holds the only copy of the secret, the revealed prefix, the
//! Defender's lives, the pending hint and the open connection window. Clients
//! receive a `STATE_UPDATE` snapshot after every change and never see the
//! secret or a hint's intended word.
//!
//! ### Client Management
//! Handles the complete lifecycle of a connection:
//! - Registration under a unique display name (`JOIN`)
//! - Readiness tracking and random Defender selection
//! - Disconnection cleanup that never leaves the round stuck
//! - Eviction of clients too slow to drain their outbound queue
//!
//! ### Round Timing
//! A pending hint expires after the hint timeout; an open connection window is
//! resolved after the connection window, whether or not every guess is in.
//!
//! ## Architecture Design
//!
//! ### Single-Owner Event Loop
//! Socket tasks and timer tasks never touch game state. They post events to the
//! main loop, which applies them to the coordinator one at a time. Each command
//! runs to completion (validate, mutate, schedule, broadcast) before the next
//! event is looked at, so broadcasts follow the order of state changes.
//!
//! ### Line-Oriented Protocol
//! Messages are blocks of `KEY:VALUE` lines ending with a blank line. The codec
//! lives in the `shared` crate so that the client uses the same encoder.
//!
//! ## Module Organization
//!
//! ### Config Module (`config`)
//! TOML configuration with defaults for every field, plus validation.
//!
//! ### Coordinator Module (`coordinator`)
//! The state machine: command validation, connection resolution, timeout
//! handling and disconnect cleanup.
//!
//! ### Error Module (`error`)
//! Rejection reasons sent back to clients and configuration failures.
//!
//! ### Game Module (`game`)
//! The round record itself, with no rules attached.
//!
//! ### Network Module (`network`)
//! TCP accept loop, per-connection reader and writer tasks, main loop.
//!
//! ### Registry Module (`registry`)
//! Connections, names, and non-blocking delivery to each player.
//!
//! ### Timers Module (`timers`)
//! Cancellable hint and connection-window timeouts.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = ServerConfig::default();
//!     config.listen_addr = "0.0.0.0:5000".to_string();
//!
//!     // Runs until a ServerEvent::Shutdown arrives on server.handle()
//!     let server = Server::bind(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod game;
pub mod network;
pub mod registry;
pub mod timers;
