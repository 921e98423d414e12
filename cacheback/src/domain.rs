use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Keyword arguments, ordered by name.
pub type Kwargs = BTreeMap<String, Value>;

/// Options handed through to the dispatcher untouched (e.g. `queue`, `countdown`).
pub type TaskOptions = BTreeMap<String, Value>;

/// Memcache's maximum expiration, used as the default store TTL (30 days).
pub const MAX_CACHE_TTL_SECS: u64 = 2_592_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryStatus {
    Fresh,
    /// A refresh has been dispatched for this key.
    Queued,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryStatus::Fresh => f.write_str("FRESH"),
            EntryStatus::Queued => f.write_str("QUEUED"),
        }
    }
}

/// What the backing store holds for every key: `(expiry, status, payload)`.
///
/// `payload` is `None` for placeholders written before the first fetch completes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Seconds since the epoch after which the entry is stale.
    pub expiry: f64,
    pub status: EntryStatus,
    pub payload: Option<Value>,
}

impl CacheEntry {
    pub fn new(expiry: f64, status: EntryStatus, payload: Option<Value>) -> Self {
        Self {
            expiry,
            status,
            payload,
        }
    }

    pub fn is_stale_at(&self, now: f64) -> bool {
        now - self.expiry > 0.0
    }
}

/// Prepared positional and keyword arguments of a single call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(args: Vec<Value>, kwargs: Kwargs) -> Self {
        Self { args, kwargs }
    }

    /// Append a positional argument.
    pub fn arg<T: Serialize>(mut self, value: T) -> Result<Self> {
        self.args.push(encode_arg(&value)?);
        Ok(self)
    }

    /// Add (or replace) a keyword argument.
    pub fn kwarg<T: Serialize>(mut self, name: impl Into<String>, value: T) -> Result<Self> {
        self.kwargs.insert(name.into(), encode_arg(&value)?);
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

fn encode_arg<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::UnhashableInput(e.to_string()))
}

/// Per job type configuration. Immutable once the job is built.
#[derive(Clone, Debug)]
pub struct JobConfig {
    /// How long a fetched result is considered fresh.
    pub lifetime: Duration,
    /// Window during which no new refresh is dispatched for a single key.
    pub refresh_timeout: Duration,
    /// Store-level TTL. Past it the store forgets the entry and `get` sees a miss.
    pub cache_ttl: Duration,
    pub fetch_on_miss: bool,
    pub fetch_on_stale_threshold: Option<Duration>,
    pub task_options: TaskOptions,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(600),
            refresh_timeout: Duration::from_secs(60),
            cache_ttl: Duration::from_secs(MAX_CACHE_TTL_SECS),
            fetch_on_miss: true,
            fetch_on_stale_threshold: None,
            task_options: TaskOptions::new(),
        }
    }
}

impl JobConfig {
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_refresh_timeout(mut self, refresh_timeout: Duration) -> Self {
        self.refresh_timeout = refresh_timeout;
        self
    }

    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    pub fn with_fetch_on_miss(mut self, fetch_on_miss: bool) -> Self {
        self.fetch_on_miss = fetch_on_miss;
        self
    }

    pub fn with_fetch_on_stale_threshold(mut self, threshold: Duration) -> Self {
        self.fetch_on_stale_threshold = Some(threshold);
        self
    }

    pub fn with_task_option(mut self, name: impl Into<String>, value: Value) -> Self {
        self.task_options.insert(name.into(), value);
        self
    }
}

/// Enough to rebuild a job in another execution context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_type: String,
    #[serde(default)]
    pub ctor_args: Vec<Value>,
    #[serde(default)]
    pub ctor_kwargs: Kwargs,
}

impl JobDescriptor {
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            ctor_args: Vec::new(),
            ctor_kwargs: Kwargs::new(),
        }
    }
}

/// Unit of work submitted to a [`Dispatcher`](crate::ports::Dispatcher).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefreshTask {
    pub descriptor: JobDescriptor,
    pub call: CallArgs,
    #[serde(default)]
    pub options: TaskOptions,
}

pub mod response {
    #[derive(Clone, Debug)]
    pub struct PutResponse {
        pub created: bool,
        pub message: String,
    }

    impl PutResponse {
        pub fn new(created: bool, message: impl Into<String>) -> Self {
            Self {
                created,
                message: message.into(),
            }
        }
    }

    #[derive(Clone, Debug)]
    pub struct DeleteResponse {
        pub deleted: bool,
    }

    impl DeleteResponse {
        pub fn new(deleted: bool) -> Self {
            Self { deleted }
        }
    }
}
