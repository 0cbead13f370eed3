use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("message serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("random source unavailable: {0}")]
    Random(getrandom::Error),

    #[error("cipher setup failed")]
    Cipher,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("envelope has no nonce")]
    MissingNonce,

    #[error("envelope has no payload")]
    MissingPayload,

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("nonce must be 16 bytes, got {0}")]
    NonceLength(usize),

    #[error("bad padding (wrong password?)")]
    Padding,

    #[error("invalid message content: {0}")]
    Content(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("relay request timed out")]
    Timeout,

    #[error("relay request failed: {0}")]
    Request(String),

    #[error("relay answered with status {0}")]
    Status(u16),

    #[error("relay refused the request: {0}")]
    Rejected(String),

    #[error("malformed relay response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("no sensor reading available yet")]
    Unavailable,

    #[error("sensor reading is {age_ms} ms old (limit {limit_ms} ms)")]
    Stale { age_ms: i64, limit_ms: u64 },

    #[error("invalid sensor reading: {0}")]
    Invalid(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required value: {0}")]
    Missing(&'static str),

    #[error("unknown timezone {0:?}")]
    Timezone(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed json in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("invalid interval {begin}-{end}")]
    InvalidInterval { begin: i32, end: i32 },

    #[error("invalid temperature {0}")]
    InvalidTemperature(f64),

    #[error(transparent)]
    Sync(#[from] SyncError),
}
