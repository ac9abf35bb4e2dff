//! Server network layer: TCP accept loop, per-connection reader and writer
//! tasks, and the main loop that feeds the coordinator.

use crate::config::ServerConfig;
use crate::coordinator::Coordinator;
use crate::registry::{ConnId, PlayerSender};
use crate::timers::TimerEvent;
use log::{debug, error, info, warn};
use shared::{Frame, FrameAssembler};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        conn_id: ConnId,
        sender: PlayerSender,
    },
    FrameReceived {
        conn_id: ConnId,
        frame: Frame,
    },
    Disconnected {
        conn_id: ConnId,
    },
    Shutdown,
}

/// Main server: owns the listener and the coordinator
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    player_buffer: usize,
    coordinator: Coordinator,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerEvent>,
    server_rx: mpsc::UnboundedReceiver<ServerEvent>,
    timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        config.validate()?;
        let listener = TcpListener::bind(config.socket_addr()?).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            local_addr,
            player_buffer: config.limits.player_buffer,
            coordinator: Coordinator::new(&config, timer_tx),
            server_tx,
            server_rx,
            timer_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle for stopping a running server with [`ServerEvent::Shutdown`].
    pub fn handle(&self) -> mpsc::UnboundedSender<ServerEvent> {
        self.server_tx.clone()
    }

    /// Spawns the task that accepts sockets and starts their I/O tasks
    fn spawn_acceptor(
        listener: TcpListener,
        server_tx: mpsc::UnboundedSender<ServerEvent>,
        player_buffer: usize,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut next_conn_id: ConnId = 1;

            loop {
                match listener.accept().await {
                    Ok((socket, addr)) => {
                        let conn_id = next_conn_id;
                        next_conn_id = next_conn_id.wrapping_add(1);
                        info!("Connection {} accepted from {}", conn_id, addr);

                        let (sender, outbound) = mpsc::channel(player_buffer);
                        // Registered before any frame from this socket can arrive.
                        if server_tx
                            .send(ServerEvent::Connected { conn_id, sender })
                            .is_err()
                        {
                            break;
                        }
                        tokio::spawn(handle_connection(
                            socket,
                            conn_id,
                            outbound,
                            server_tx.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Main server loop. Every event is applied to the coordinator in arrival
    /// order, so game state is never touched concurrently.
    pub async fn run(self) -> std::io::Result<()> {
        let Server {
            listener,
            player_buffer,
            mut coordinator,
            server_tx,
            mut server_rx,
            mut timer_rx,
            ..
        } = self;

        let acceptor = Self::spawn_acceptor(listener, server_tx, player_buffer);
        info!("Server started successfully");

        loop {
            tokio::select! {
                event = server_rx.recv() => {
                    match event {
                        Some(ServerEvent::Connected { conn_id, sender }) => {
                            coordinator.connection_opened(conn_id, sender);
                        }
                        Some(ServerEvent::FrameReceived { conn_id, frame }) => {
                            coordinator.handle_frame(conn_id, &frame);
                        }
                        Some(ServerEvent::Disconnected { conn_id }) => {
                            info!("Connection {} closed", conn_id);
                            coordinator.connection_closed(conn_id);
                        }
                        Some(ServerEvent::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                }
                Some(event) = timer_rx.recv() => {
                    coordinator.handle_timer(event);
                }
            }
        }

        coordinator.shutdown();
        acceptor.abort();
        Ok(())
    }
}

/// Drives one socket: frames read from it go to the main loop, frames queued
/// for it are written back. Either side ending closes the connection.
async fn handle_connection(
    socket: TcpStream,
    conn_id: ConnId,
    mut outbound: mpsc::Receiver<String>,
    server_tx: mpsc::UnboundedSender<ServerEvent>,
) {
    let (read_half, mut write_half) = socket.into_split();

    let mut writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            let mut block = text.into_bytes();
            block.extend_from_slice(b"\n\n");
            if let Err(e) = write_half.write_all(&block).await {
                debug!("Write to connection {} failed: {}", conn_id, e);
                break;
            }
        }
    });

    let mut lines = BufReader::new(read_half).lines();
    let mut assembler = FrameAssembler::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if let Some(frame) = assembler.push_line(&line) {
                            if server_tx.send(ServerEvent::FrameReceived { conn_id, frame }).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        if let Some(frame) = assembler.finish() {
                            let _ = server_tx.send(ServerEvent::FrameReceived { conn_id, frame });
                        }
                        break;
                    }
                    Err(e) => {
                        warn!("Read from connection {} failed: {}", conn_id, e);
                        break;
                    }
                }
            }
            _ = &mut writer => {
                debug!("Writer for connection {} finished", conn_id);
                break;
            }
        }
    }

    writer.abort();
    let _ = server_tx.send(ServerEvent::Disconnected { conn_id });
}
