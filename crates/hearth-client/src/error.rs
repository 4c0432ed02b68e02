use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Local storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request failed with status {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("Image upload failed: {0}")]
    Upload(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Message has neither text nor image")]
    EmptyMessage,

    #[error("No sender profile; sign in first")]
    NotSignedIn,

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl ClientError {
    /// Server-side and transport failures worth retrying as-is.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(_) | ClientError::WebSocket(_) | ClientError::Upload(_) => true,
            ClientError::Remote { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
