use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("No codec implementation available for {codec}")]
    NoCodecAvailable { codec: String },

    #[error("No software-only codec implementation available for {codec}")]
    NoSoftwareCodecAvailable { codec: String },

    #[error("Codec runtime failure: {0}")]
    CodecRuntime(String),

    #[error("Muxer error: {0}")]
    Mux(String),

    #[error("{track} encoder loop did not stop within {timeout_ms}ms")]
    TeardownTimeout { track: String, timeout_ms: u64 },

    #[error("Invalid pipeline state: expected {expected}, found {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RecordError>;
