// shared/src/lib.rs

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("job {0} does not implement fetch")]
    FetchNotImplemented(String),
    #[error(
        "unable to generate cache key due to unhashable args or kwargs ({0}) - \
         implement your own key generation method to avoid this problem"
    )]
    UnhashableInput(String),
    #[error("unable to save data of type {type_name} to cache (key '{key}')")]
    CacheWriteVerification { key: String, type_name: String },
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("unknown job type: {0}")]
    UnknownJobType(String),
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("store: {0}")]
    Store(String),
    #[error("protocol: {0}")]
    Protocol(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Store-level time to live, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TtlMs(pub u64);

impl TtlMs {
    pub fn from_secs(secs: u64) -> Self {
        TtlMs(secs.saturating_mul(1000))
    }

    pub fn as_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.0)
    }
}

impl From<std::time::Duration> for TtlMs {
    fn from(value: std::time::Duration) -> Self {
        TtlMs(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }
}

pub mod config;
