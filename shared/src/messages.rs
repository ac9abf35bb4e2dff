use crate::frame::Frame;
use crate::Role;
use std::fmt;
use thiserror::Error;

/// Reasons a frame could not be decoded into a typed message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Missing TYPE")]
    MissingType,
    #[error("Missing {0}")]
    MissingField(&'static str),
    #[error("Unknown TYPE {0}")]
    UnknownType(String),
    #[error("Invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },
    #[error("Malformed STATE_UPDATE: {0}")]
    MalformedSnapshot(&'static str),
}

/// Client to server commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Join { name: String },
    SetSecret { secret: String },
    Ready,
    StartHint { hint: String, intended: String },
    Connect,
    SubmitGuess { guess: String },
    Ping,
}

impl ClientMessage {
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "JOIN",
            ClientMessage::SetSecret { .. } => "SET_SECRET",
            ClientMessage::Ready => "READY",
            ClientMessage::StartHint { .. } => "START_HINT",
            ClientMessage::Connect => "CONNECT",
            ClientMessage::SubmitGuess { .. } => "SUBMIT_GUESS",
            ClientMessage::Ping => "PING",
        }
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        let message_type = frame.message_type().ok_or(ProtocolError::MissingType)?;
        let message = match message_type {
            "JOIN" => ClientMessage::Join {
                name: required(frame, "NAME")?,
            },
            "SET_SECRET" => ClientMessage::SetSecret {
                secret: required(frame, "SECRET")?,
            },
            "READY" => ClientMessage::Ready,
            "START_HINT" => ClientMessage::StartHint {
                hint: required(frame, "HINT")?,
                intended: required(frame, "INTENDED")?,
            },
            "CONNECT" => ClientMessage::Connect,
            "SUBMIT_GUESS" => ClientMessage::SubmitGuess {
                guess: required(frame, "GUESS")?,
            },
            "PING" => ClientMessage::Ping,
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        };
        Ok(message)
    }

    pub fn to_frame(&self) -> Frame {
        let mut frame = Frame::new();
        frame.push(format!("TYPE:{}", self.type_name()));
        match self {
            ClientMessage::Join { name } => frame.push(format!("NAME:{}", single_line(name))),
            ClientMessage::SetSecret { secret } => {
                frame.push(format!("SECRET:{}", single_line(secret)))
            }
            ClientMessage::StartHint { hint, intended } => {
                frame.push(format!("HINT:{}", single_line(hint)));
                frame.push(format!("INTENDED:{}", single_line(intended)));
            }
            ClientMessage::SubmitGuess { guess } => {
                frame.push(format!("GUESS:{}", single_line(guess)))
            }
            ClientMessage::Ready | ClientMessage::Connect | ClientMessage::Ping => {}
        }
        frame
    }

    pub fn encode(&self) -> String {
        self.to_frame().to_text()
    }
}

/// Readiness row of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerStatus {
    pub name: String,
    pub ready: bool,
}

/// Full public view of the round, broadcast after every change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub prefix: String,
    pub lives: u32,
    pub defender: Option<String>,
    pub players: Vec<PlayerStatus>,
    pub history: Vec<String>,
}

/// Server to client messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Joined { name: String },
    PlayerJoined { name: String },
    PlayerLeft { name: String },
    PlayerReady { name: String },
    RolesAssigned { defender: String },
    Info { msg: String },
    Error { msg: String },
    HintStarted { giver: String, hint: String, time: u64 },
    HintTimeout { giver: String },
    ConnectionWindow { requester: String, time: u64 },
    ConnectionSuccess { new_prefix: String, lives: u32 },
    ConnectionFailed { msg: String },
    LifeLost { remaining: u32 },
    GameOver { winner: Role, msg: String },
    Pong,
    StateUpdate(Snapshot),
}

impl ServerMessage {
    pub fn error(msg: impl fmt::Display) -> Self {
        ServerMessage::Error {
            msg: msg.to_string(),
        }
    }

    pub fn info(msg: impl Into<String>) -> Self {
        ServerMessage::Info { msg: msg.into() }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ServerMessage::Joined { .. } => "JOINED",
            ServerMessage::PlayerJoined { .. } => "PLAYER_JOINED",
            ServerMessage::PlayerLeft { .. } => "PLAYER_LEFT",
            ServerMessage::PlayerReady { .. } => "PLAYER_READY",
            ServerMessage::RolesAssigned { .. } => "ROLES_ASSIGNED",
            ServerMessage::Info { .. } => "INFO",
            ServerMessage::Error { .. } => "ERROR",
            ServerMessage::HintStarted { .. } => "HINT_STARTED",
            ServerMessage::HintTimeout { .. } => "HINT_TIMEOUT",
            ServerMessage::ConnectionWindow { .. } => "CONNECTION_WINDOW",
            ServerMessage::ConnectionSuccess { .. } => "CONNECTION_SUCCESS",
            ServerMessage::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ServerMessage::LifeLost { .. } => "LIFE_LOST",
            ServerMessage::GameOver { .. } => "GAME_OVER",
            ServerMessage::Pong => "PONG",
            ServerMessage::StateUpdate(_) => "STATE_UPDATE",
        }
    }

    pub fn to_frame(&self) -> Frame {
        let mut frame = Frame::new();
        frame.push(format!("TYPE:{}", self.type_name()));
        match self {
            ServerMessage::Joined { name }
            | ServerMessage::PlayerJoined { name }
            | ServerMessage::PlayerLeft { name }
            | ServerMessage::PlayerReady { name } => {
                frame.push(format!("NAME:{}", single_line(name)));
            }
            ServerMessage::RolesAssigned { defender } => {
                frame.push(format!("A:{}", single_line(defender)));
            }
            ServerMessage::Info { msg }
            | ServerMessage::Error { msg }
            | ServerMessage::ConnectionFailed { msg } => {
                frame.push(format!("MSG:{}", single_line(msg)));
            }
            ServerMessage::HintStarted { giver, hint, time } => {
                frame.push(format!("GIVER:{}", single_line(giver)));
                frame.push(format!("HINT:{}", single_line(hint)));
                frame.push(format!("TIME:{}", time));
            }
            ServerMessage::HintTimeout { giver } => {
                frame.push(format!("GIVER:{}", single_line(giver)));
            }
            ServerMessage::ConnectionWindow { requester, time } => {
                frame.push(format!("B2:{}", single_line(requester)));
                frame.push(format!("TIME:{}", time));
            }
            ServerMessage::ConnectionSuccess { new_prefix, lives } => {
                frame.push(format!("NEW_PREFIX:{}", single_line(new_prefix)));
                frame.push(format!("LIVES:{}", lives));
            }
            ServerMessage::LifeLost { remaining } => {
                frame.push(format!("REMAINING:{}", remaining));
            }
            ServerMessage::GameOver { winner, msg } => {
                frame.push(format!("WINNER:{}", winner));
                frame.push(format!("MSG:{}", single_line(msg)));
            }
            ServerMessage::Pong => {}
            ServerMessage::StateUpdate(snapshot) => push_snapshot(&mut frame, snapshot),
        }
        frame
    }

    pub fn encode(&self) -> String {
        self.to_frame().to_text()
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        let message_type = frame.message_type().ok_or(ProtocolError::MissingType)?;
        let message = match message_type {
            "JOINED" => ServerMessage::Joined {
                name: field(frame, "NAME")?,
            },
            "PLAYER_JOINED" => ServerMessage::PlayerJoined {
                name: field(frame, "NAME")?,
            },
            "PLAYER_LEFT" => ServerMessage::PlayerLeft {
                name: field(frame, "NAME")?,
            },
            "PLAYER_READY" => ServerMessage::PlayerReady {
                name: field(frame, "NAME")?,
            },
            "ROLES_ASSIGNED" => ServerMessage::RolesAssigned {
                defender: field(frame, "A")?,
            },
            "INFO" => ServerMessage::Info {
                msg: field(frame, "MSG")?,
            },
            "ERROR" => ServerMessage::Error {
                msg: field(frame, "MSG")?,
            },
            "HINT_STARTED" => ServerMessage::HintStarted {
                giver: field(frame, "GIVER")?,
                hint: field(frame, "HINT")?,
                time: number(frame, "TIME")?,
            },
            "HINT_TIMEOUT" => ServerMessage::HintTimeout {
                giver: field(frame, "GIVER")?,
            },
            "CONNECTION_WINDOW" => ServerMessage::ConnectionWindow {
                requester: field(frame, "B2")?,
                time: number(frame, "TIME")?,
            },
            "CONNECTION_SUCCESS" => ServerMessage::ConnectionSuccess {
                new_prefix: field(frame, "NEW_PREFIX")?,
                lives: number(frame, "LIVES")?,
            },
            "CONNECTION_FAILED" => ServerMessage::ConnectionFailed {
                msg: field(frame, "MSG")?,
            },
            "LIFE_LOST" => ServerMessage::LifeLost {
                remaining: number(frame, "REMAINING")?,
            },
            "GAME_OVER" => {
                let raw = field(frame, "WINNER")?;
                let winner = raw.parse().map_err(|_| ProtocolError::InvalidField {
                    field: "WINNER",
                    value: raw.clone(),
                })?;
                ServerMessage::GameOver {
                    winner,
                    msg: field(frame, "MSG")?,
                }
            }
            "PONG" => ServerMessage::Pong,
            "STATE_UPDATE" => ServerMessage::StateUpdate(parse_snapshot(frame)?),
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        };
        Ok(message)
    }
}

const PLAYERS_START: &str = "PLAYERS_START";
const PLAYERS_END: &str = "PLAYERS_END";
const HISTORY_START: &str = "HISTORY_START";
const HISTORY_END: &str = "HISTORY_END";
const READY_MARKER: &str = ":READY:";

fn push_snapshot(frame: &mut Frame, snapshot: &Snapshot) {
    frame.push(format!("PREFIX:{}", single_line(&snapshot.prefix)));
    frame.push(format!("LIVES:{}", snapshot.lives));
    frame.push(format!(
        "A:{}",
        single_line(snapshot.defender.as_deref().unwrap_or(""))
    ));
    frame.push(PLAYERS_START);
    for player in &snapshot.players {
        frame.push(format!(
            "PLAYER:{}{}{}",
            single_line(&player.name),
            READY_MARKER,
            player.ready
        ));
    }
    frame.push(PLAYERS_END);
    frame.push(HISTORY_START);
    for line in &snapshot.history {
        let line = single_line(line);
        // A blank line would end the frame early.
        if line.trim().is_empty() {
            continue;
        }
        frame.push(line);
    }
    frame.push(HISTORY_END);
}

#[derive(PartialEq)]
enum Section {
    Header,
    Players,
    History,
    Done,
}

fn parse_snapshot(frame: &Frame) -> Result<Snapshot, ProtocolError> {
    let mut snapshot = Snapshot::default();
    let mut section = Section::Header;
    let mut saw_lives = false;

    for line in frame.lines() {
        match section {
            Section::Header => {
                if line.trim() == PLAYERS_START {
                    section = Section::Players;
                    continue;
                }
                if let Some((key, value)) = crate::frame::split_key_value(line) {
                    match key {
                        "PREFIX" => snapshot.prefix = value.to_string(),
                        "LIVES" => {
                            snapshot.lives =
                                value.parse().map_err(|_| ProtocolError::InvalidField {
                                    field: "LIVES",
                                    value: value.to_string(),
                                })?;
                            saw_lives = true;
                        }
                        "A" if !value.is_empty() => snapshot.defender = Some(value.to_string()),
                        _ => {}
                    }
                }
            }
            Section::Players => {
                if line.trim() == PLAYERS_END {
                    section = Section::Done;
                    continue;
                }
                snapshot.players.push(parse_player_line(line)?);
            }
            Section::Done => {
                if line.trim() == HISTORY_START {
                    section = Section::History;
                }
            }
            Section::History => {
                if line.trim() == HISTORY_END {
                    section = Section::Done;
                    continue;
                }
                snapshot.history.push(line.clone());
            }
        }
    }

    if !saw_lives {
        return Err(ProtocolError::MissingField("LIVES"));
    }
    match section {
        Section::Players => Err(ProtocolError::MalformedSnapshot("unterminated player list")),
        Section::History => Err(ProtocolError::MalformedSnapshot("unterminated history")),
        Section::Header => Err(ProtocolError::MalformedSnapshot("missing player list")),
        Section::Done => Ok(snapshot),
    }
}

fn parse_player_line(line: &str) -> Result<PlayerStatus, ProtocolError> {
    let rest = line
        .strip_prefix("PLAYER:")
        .ok_or(ProtocolError::MalformedSnapshot("expected PLAYER line"))?;
    let idx = rest
        .rfind(READY_MARKER)
        .ok_or(ProtocolError::MalformedSnapshot("PLAYER line without READY"))?;
    let flag = rest[idx + READY_MARKER.len()..].trim();
    let ready = flag.parse().map_err(|_| ProtocolError::InvalidField {
        field: "READY",
        value: flag.to_string(),
    })?;
    Ok(PlayerStatus {
        name: rest[..idx].to_string(),
        ready,
    })
}

fn required(frame: &Frame, key: &'static str) -> Result<String, ProtocolError> {
    frame
        .get_non_blank(key)
        .map(str::to_string)
        .ok_or(ProtocolError::MissingField(key))
}

fn field(frame: &Frame, key: &'static str) -> Result<String, ProtocolError> {
    frame
        .get(key)
        .map(str::to_string)
        .ok_or(ProtocolError::MissingField(key))
}

fn number<T: std::str::FromStr>(frame: &Frame, key: &'static str) -> Result<T, ProtocolError> {
    let raw = frame.get(key).ok_or(ProtocolError::MissingField(key))?;
    raw.parse().map_err(|_| ProtocolError::InvalidField {
        field: key,
        value: raw.to_string(),
    })
}

/// Flattens embedded line breaks so a value cannot split or end a frame.
pub fn single_line(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\r', '\n'], " ")
}
