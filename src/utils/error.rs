use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Metrics exporter error: {0}")]
    Metrics(String),

    #[error("Scheduler is not running")]
    SchedulerUnavailable,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AppError {
    pub fn navigation(message: impl Into<String>) -> Self {
        AppError::Navigation(message.into())
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
