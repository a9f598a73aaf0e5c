use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("You must provide a server address to connect to")]
    MissingServerAddress,

    #[error("Dial {addr:?}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid result: expected an integer count, got {0}")]
    InvalidResult(String),

    #[error("Call cancelled")]
    Cancelled,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Session closed")]
    SessionClosed,

    #[error("Failed to read input: {0}")]
    InputRead(#[source] std::io::Error),

    #[error("Input closed")]
    InputClosed,
}

impl ClientError {
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        ClientError::Rpc {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_message(msg: impl Into<String>) -> Self {
        ClientError::InvalidMessageFormat(msg.into())
    }

    /// Whether the error leaves the session (or the input) unusable.
    ///
    /// Server-reported errors and malformed results only affect the call
    /// that produced them.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ClientError::Rpc { .. }
                | ClientError::InvalidResult(_)
                | ClientError::InvalidMessageFormat(_)
                | ClientError::Serialization(_)
        )
    }
}
