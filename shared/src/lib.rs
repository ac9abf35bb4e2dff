use std::fmt;
use std::str::FromStr;

mod frame;
mod messages;

pub use frame::{parse_frame, split_key_value, Frame, FrameAssembler};
pub use messages::{single_line, ClientMessage, PlayerStatus, ProtocolError, ServerMessage, Snapshot};

pub const MAX_LIVES: u32 = 5;
pub const MIN_PLAYERS: usize = 3;
pub const DEFAULT_HINT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CONNECTION_WINDOW_SECS: u64 = 10;
pub const DEFAULT_PORT: u16 = 5000;

/// Side of the table. The Defender owns the secret; everyone else attacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Defender,
    Attacker,
}

impl Role {
    pub fn code(&self) -> &'static str {
        match self {
            Role::Defender => "A",
            Role::Attacker => "B",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" => Ok(Role::Defender),
            "B" => Ok(Role::Attacker),
            _ => Err(()),
        }
    }
}

/// Case-insensitive word comparison used for every secret/guess check.
/// A missing guess never matches.
pub fn words_match(a: &str, b: Option<&str>) -> bool {
    match b {
        Some(b) => a.to_lowercase() == b.to_lowercase(),
        None => false,
    }
}
