//! Error types for Socialcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SocialcastError>;

#[derive(Error, Debug)]
pub enum SocialcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl SocialcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SocialcastError::InvalidInput(_) | SocialcastError::NotFound(_) => 3,
            SocialcastError::Platform(PlatformError::Authentication(_))
            | SocialcastError::Platform(PlatformError::SessionUnavailable(_)) => 2,
            SocialcastError::Platform(_) => 1,
            SocialcastError::Config(_) => 1,
            SocialcastError::Database(_) => 1,
        }
    }

    /// Whether this error came from acquiring a platform session
    pub fn is_session_unavailable(&self) -> bool {
        matches!(
            self,
            SocialcastError::Platform(PlatformError::SessionUnavailable(_))
        )
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

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),
}
