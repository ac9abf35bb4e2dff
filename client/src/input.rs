//! Terminal command parsing.
//!
//! Each stdin line is one command. The first word selects it, the rest are
//! its arguments:
//!
//! ```text
//! join <name>              register under a display name
//! ready                    mark yourself ready
//! secret <word>            set the secret word (Defender only)
//! hint <word> <clue...>    give a clue for <word>; the clue may contain spaces
//! connect                  attempt a connection on the pending hint
//! guess <word>             submit your guess for the open window
//! ping                     check the server is alive
//! help                     list the commands
//! quit                     leave
//! ```

use shared::ClientMessage;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(ClientMessage),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Unknown command '{0}', type 'help' for a list")]
    UnknownCommand(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &str = "\
Commands:
  join <name>            register under a display name
  ready                  mark yourself ready
  secret <word>          set the secret word (Defender only)
  hint <word> <clue...>  give a clue for <word>
  connect                connect on the pending hint
  guess <word>           submit your guess
  ping                   check the server is alive
  quit                   leave";

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_lowercase().as_str() {
        "join" => Command::Send(ClientMessage::Join {
            name: single_argument(rest, "join <name>")?,
        }),
        "ready" => Command::Send(ClientMessage::Ready),
        "secret" => Command::Send(ClientMessage::SetSecret {
            secret: single_argument(rest, "secret <word>")?,
        }),
        "hint" => {
            let (intended, hint) = rest
                .split_once(char::is_whitespace)
                .map(|(word, clue)| (word.trim(), clue.trim()))
                .filter(|(word, clue)| !word.is_empty() && !clue.is_empty())
                .ok_or(InputError::Usage("hint <word> <clue...>"))?;
            Command::Send(ClientMessage::StartHint {
                hint: hint.to_string(),
                intended: intended.to_string(),
            })
        }
        "connect" => Command::Send(ClientMessage::Connect),
        "guess" => Command::Send(ClientMessage::SubmitGuess {
            guess: single_argument(rest, "guess <word>")?,
        }),
        "ping" => Command::Send(ClientMessage::Ping),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(InputError::UnknownCommand(other.to_string())),
    };

    Ok(Some(command))
}

fn single_argument(rest: &str, usage: &'static str) -> Result<String, InputError> {
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        return Err(InputError::Usage(usage));
    }
    Ok(rest.to_string())
}
