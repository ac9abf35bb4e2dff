use thiserror::Error;

/// A command the coordinator refused. The display text is sent back to the
/// sender as the `MSG` of an `ERROR` reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Register (JOIN) first")]
    NotJoined,
    #[error("Already joined as {0}")]
    AlreadyJoined(String),
    #[error("Name {0} is already taken")]
    NameTaken(String),
    #[error("Missing NAME")]
    EmptyName,

    #[error("Roles have not been assigned yet")]
    RolesNotAssigned,
    #[error("Only the Defender can set the secret")]
    NotDefender,
    #[error("The secret has already been set")]
    SecretAlreadySet,
    #[error("Missing SECRET")]
    EmptySecret,
    #[error("The game is over")]
    GameOver,

    #[error("No secret has been set yet")]
    SecretNotSet,
    #[error("The Defender cannot give hints")]
    DefenderCannotHint,
    #[error("A hint is already pending")]
    HintAlreadyPending,

    #[error("No hint is active")]
    NoActiveHint,
    #[error("A connection window is already open")]
    ConnectionAlreadyOpen,
    #[error("The Defender cannot request a connection")]
    DefenderCannotConnect,
    #[error("You cannot connect to your own hint")]
    OwnHint,

    #[error("No connection window is open")]
    NoConnectionWindow,
    #[error("Only the Defender and the requester can guess")]
    NotInConnection,
}

/// Failure to load or validate the server configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("listen_addr {0} is not a valid socket address")]
    InvalidAddress(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}
