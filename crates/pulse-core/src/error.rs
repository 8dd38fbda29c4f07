use thiserror::Error;

#[derive(Debug, Error)]
pub enum PulseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Inbound queue full, dropped event seq={seq}")]
    QueueFull { seq: u64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PulseError {
    /// Short error code string used in HTTP error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            PulseError::Config(_) => "CONFIG_ERROR",
            PulseError::Input(_) => "INPUT_ERROR",
            PulseError::Storage(_) => "STORAGE_ERROR",
            PulseError::Model(_) => "MODEL_ERROR",
            PulseError::Transport(_) => "TRANSPORT_ERROR",
            PulseError::QueueFull { .. } => "QUEUE_FULL",
            PulseError::Serialization(_) => "SERIALIZATION_ERROR",
            PulseError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, PulseError>;
