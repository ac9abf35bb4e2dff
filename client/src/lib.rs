//! # Contact Terminal Client
//!
//! A line-oriented client for the Contact word game. Commands typed on stdin
//! are encoded as protocol frames and sent to the server; every message the
//! server sends back is decoded and printed as text.
//!
//! ## Module Organization
//!
//! ### Input Module (`input`)
//! Parses one stdin line into a [`input::Command`]: a protocol message to
//! send, or a local action such as `help` and `quit`.
//!
//! ### Display Module (`display`)
//! Renders server messages as terminal lines. Full state snapshots arrive
//! after every change, so the renderer prints only what changed since the
//! previous one.
//!
//! ### Network Module (`network`)
//! Owns the TCP connection. Reads frames from the server, writes frames for
//! user commands, and with `--reconnect` keeps retrying every two seconds
//! after a dropped connection, re-joining under the same name.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::input::Command;
//! use client::network::{Client, ClientConfig};
//! use shared::ClientMessage;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = ClientConfig::new("127.0.0.1:5000");
//!     config.name = Some("alice".to_string());
//!
//!     let (output_tx, mut output_rx) = mpsc::unbounded_channel();
//!     let (command_tx, command_rx) = mpsc::channel(16);
//!     tokio::spawn(async move {
//!         while let Some(line) = output_rx.recv().await {
//!             println!("{}", line);
//!         }
//!     });
//!
//!     command_tx.send(Command::Send(ClientMessage::Ready)).await?;
//!     Client::new(config, output_tx).run(command_rx).await
//! }
//! ```

pub mod display;
pub mod input;
pub mod network;
