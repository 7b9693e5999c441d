use thiserror::Error;
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,
    #[error("window length must be greater than zero seconds")]
    InvalidWindow,
    #[error("at least one channel must be configured")]
    NoChannels,
    #[error("unknown channel `{0}`")]
    UnknownChannel(String),
    #[error("channel `{0}` is configured more than once")]
    DuplicateChannel(String),
    #[error("band `{name}` has an empty range {low_hz}..{high_hz} Hz")]
    InvalidBand { name: String, low_hz: f64, high_hz: f64 },
    #[error("{what} reaches {freq_hz} Hz, above the {nyquist_hz} Hz Nyquist limit")]
    AboveNyquist {
        what: String,
        freq_hz: f64,
        nyquist_hz: f64,
    },
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("channel `{channel}` contains non-finite samples")]
    NonFinite { channel: String },
    #[error("sample source failed: {0}")]
    Source(String),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}
impl EngineError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        EngineError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
