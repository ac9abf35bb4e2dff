use crate::display::Renderer;
use crate::input::{Command, HELP};
use log::{debug, info, warn};
use shared::{ClientMessage, Frame, FrameAssembler, ServerMessage};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::sleep;

pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: String,
    /// Joined automatically on connect when set.
    pub name: Option<String>,
    pub reconnect: bool,
    pub reconnect_delay: Duration,
}

impl ClientConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            name: None,
            reconnect: false,
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Quit,
    Disconnected,
}

/// Terminal client. Rendered lines go to `output`; the binary prints them.
pub struct Client {
    config: ClientConfig,
    renderer: Renderer,
    output: mpsc::UnboundedSender<String>,
}

impl Client {
    pub fn new(config: ClientConfig, output: mpsc::UnboundedSender<String>) -> Self {
        Client {
            config,
            renderer: Renderer::new(),
            output,
        }
    }

    fn emit(&self, line: impl Into<String>) {
        let _ = self.output.send(line.into());
    }

    /// Name to (re)join under: the one the server confirmed, else the
    /// configured one.
    fn join_name(&self) -> Option<String> {
        self.renderer
            .own_name()
            .map(str::to_string)
            .or_else(|| self.config.name.clone())
    }

    /// Connects and runs sessions until the user quits. With `reconnect` set,
    /// a lost or refused connection is retried and the player re-joins.
    pub async fn run(
        &mut self,
        mut commands: mpsc::Receiver<Command>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        loop {
            let stream = match TcpStream::connect(&self.config.server).await {
                Ok(stream) => stream,
                Err(e) if self.config.reconnect => {
                    warn!("Connect to {} failed: {}", self.config.server, e);
                    sleep(self.config.reconnect_delay).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            info!("Connected to {}", self.config.server);

            match self.session(stream, &mut commands).await {
                SessionEnd::Quit => return Ok(()),
                SessionEnd::Disconnected if self.config.reconnect => {
                    self.emit("Connection lost, reconnecting...");
                    self.renderer.reset();
                    sleep(self.config.reconnect_delay).await;
                }
                SessionEnd::Disconnected => {
                    self.emit("Disconnected from server");
                    return Ok(());
                }
            }
        }
    }

    /// Runs one connection until the server goes away or the user quits.
    pub async fn session(
        &mut self,
        stream: TcpStream,
        commands: &mut mpsc::Receiver<Command>,
    ) -> SessionEnd {
        let (read_half, mut write_half) = stream.into_split();

        if let Some(name) = self.join_name() {
            if let Err(e) = send_message(&mut write_half, &ClientMessage::Join { name }).await {
                warn!("Error sending JOIN: {}", e);
                return SessionEnd::Disconnected;
            }
        }

        let mut lines = BufReader::new(read_half).lines();
        let mut assembler = FrameAssembler::new();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if let Some(frame) = assembler.push_line(&line) {
                                self.handle_frame(&frame);
                            }
                        }
                        Ok(None) => return SessionEnd::Disconnected,
                        Err(e) => {
                            warn!("Error reading from server: {}", e);
                            return SessionEnd::Disconnected;
                        }
                    }
                }
                command = commands.recv() => {
                    match command {
                        Some(Command::Send(message)) => {
                            if let Err(e) = send_message(&mut write_half, &message).await {
                                warn!("Error sending {}: {}", message.type_name(), e);
                                return SessionEnd::Disconnected;
                            }
                        }
                        Some(Command::Help) => self.emit(HELP),
                        Some(Command::Quit) | None => return SessionEnd::Quit,
                    }
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: &Frame) {
        match ServerMessage::from_frame(frame) {
            Ok(message) => {
                debug!("Received {}", message.type_name());
                for line in self.renderer.render(&message) {
                    self.emit(line);
                }
            }
            Err(e) => warn!("Unreadable message from server: {}", e),
        }
    }
}

async fn send_message(writer: &mut OwnedWriteHalf, message: &ClientMessage) -> std::io::Result<()> {
    let mut block = message.encode().into_bytes();
    block.extend_from_slice(b"\n\n");
    writer.write_all(&block).await
}
