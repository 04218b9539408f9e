//! Error types for the session crate.

use shared_types::{AbiError, ParseError};

/// Failure reported by a wallet, chain or host collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request rejected by user: {0}")]
    Rejected(String),

    #[error("wallet unavailable: {0}")]
    Unavailable(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unsupported by wallet: {0}")]
    Unsupported(&'static str),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("transaction reverted: {0}")]
    Reverted(String),
}

impl From<ParseError> for ClientError {
    fn from(err: ParseError) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<AbiError> for ClientError {
    fn from(err: AbiError) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

/// Failure of the local key-value cache.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("cache i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache file is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt cache entry {key}: {value:?}")]
    Corrupt { key: String, value: String },
}

/// Failure loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

/// User-facing error kinds. Each one ends up as a transient notice and leaves
/// the daily gate untouched.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("wallet connection failed: {0}")]
    Connection(ClientError),

    #[error("could not switch to chain {chain}: {source}")]
    ChainSwitch { chain: u64, source: ClientError },

    #[error("transaction failed: {0}")]
    Submission(ClientError),

    #[error("reading points failed: {0}")]
    Read(ClientError),

    #[error("host initialization failed: {0}")]
    Host(ClientError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The runtime behind a `SessionHandle` has shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("session runtime has stopped")]
pub struct RuntimeClosed;
