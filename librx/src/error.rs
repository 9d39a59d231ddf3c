//! Error types for the rx runtime

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RxError>;

#[derive(Error, Debug)]
pub enum RxError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Missing required option 'app' for component '{0}'")]
    MissingApp(String),

    #[error("No actions declared for store '{0}'")]
    NoActionsDeclared(String),

    #[error("Action '{0}' is declared more than once")]
    DuplicateAction(String),

    #[error("Undeclared action type '{kind}' (declared: {declared})")]
    UnknownAction { kind: String, declared: String },

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Middleware is already registered")]
    DuplicateMiddleware,

    #[error("Unknown event '{event}' for {owner} (known: {known})")]
    UnknownEvent {
        event: String,
        owner: String,
        known: String,
    },

    #[error("Superseded by action {latest}")]
    Superseded { latest: u64 },

    #[error("Aborted: {0}")]
    Aborted(String),

    #[error("Render error in {component}: {message}")]
    Render {
        component: String,
        message: String,
        /// Element the embedding application should render the message into
        target: Option<String>,
    },

    #[error("Instance has been destroyed")]
    Destroyed,

    #[error("Action handler failed: {0}")]
    Handler(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RxError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        if self.is_configuration() {
            2
        } else {
            1
        }
    }

    /// Programming mistakes in the embedding application, as opposed to
    /// conditions that arise while actions are in flight.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RxError::Config(_)
                | RxError::MissingApp(_)
                | RxError::NoActionsDeclared(_)
                | RxError::DuplicateAction(_)
                | RxError::UnknownAction { .. }
                | RxError::InvalidAction(_)
                | RxError::DuplicateMiddleware
                | RxError::UnknownEvent { .. }
                | RxError::Json(_)
        )
    }

    /// Stale results are not failures: the action that started the work is
    /// no longer the latest one.
    pub fn is_stale(&self) -> bool {
        matches!(self, RxError::Superseded { .. } | RxError::Aborted(_))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
