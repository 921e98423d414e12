//! The `Job` contract and the runner that applies it to a cache entry.

pub mod cached_job;

pub use cached_job::{CacheContext, CachedJob};

use crate::domain::{CallArgs, EntryStatus, JobConfig, Kwargs};
use crate::key::build_key;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{Error, Result};

/// A cached read job.
///
/// Implementors provide `config` and `fetch`; every other method is an
/// extension point with the default behaviour described on it.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Stable identifier used for cache keys and to rebuild the job on a worker.
    const JOB_TYPE: &'static str;

    type Output: Serialize + DeserializeOwned + Send + Sync + 'static;

    fn config(&self) -> &JobConfig;

    /// Compute the value. This is where the expensive work goes.
    async fn fetch(&self, _call: &CallArgs) -> Result<Self::Output> {
        Err(Error::FetchNotImplemented(Self::JOB_TYPE.to_string()))
    }

    /// Override when arguments cannot be canonically encoded as-is.
    fn key(&self, call: &CallArgs) -> Result<String> {
        build_key(Self::JOB_TYPE, call)
    }

    /// Value returned for a miss whose refresh was deferred.
    fn empty(&self) -> Option<Self::Output> {
        None
    }

    /// Timestamp after which a freshly fetched result is stale.
    fn expiry(&self, now: f64, _call: &CallArgs) -> f64 {
        now + self.config().lifetime.as_secs_f64()
    }

    /// Timestamp until which no further refresh is dispatched for the key.
    fn timeout(&self, now: f64, _call: &CallArgs) -> f64 {
        now + self.config().refresh_timeout.as_secs_f64()
    }

    fn should_fetch_synchronously_on_miss(&self, _call: &CallArgs) -> bool {
        self.config().fetch_on_miss
    }

    /// `delta` is how many seconds past its expiry the entry is.
    fn should_fetch_synchronously_on_stale(&self, delta: f64, _call: &CallArgs) -> bool {
        let config = self.config();
        match config.fetch_on_stale_threshold {
            None => false,
            Some(threshold) => delta > threshold.as_secs_f64() - config.lifetime.as_secs_f64(),
        }
    }

    fn got_miss(
        &self,
        fetched: Option<Self::Output>,
        _is_async: bool,
        _raw: &CallArgs,
    ) -> Option<Self::Output> {
        fetched
    }

    fn got_hit(
        &self,
        fetched: Option<Self::Output>,
        _status: EntryStatus,
        _raw: &CallArgs,
    ) -> Option<Self::Output> {
        fetched
    }

    fn got_stale(
        &self,
        fetched: Option<Self::Output>,
        _is_async: bool,
        _raw: &CallArgs,
    ) -> Option<Self::Output> {
        fetched
    }

    fn prepare_args(&self, args: Vec<Value>) -> Vec<Value> {
        args
    }

    fn prepare_kwargs(&self, kwargs: Kwargs) -> Kwargs {
        kwargs
    }

    /// Arguments needed to rebuild this job in another execution context.
    fn constructor_args(&self) -> Vec<Value> {
        Vec::new()
    }

    fn constructor_kwargs(&self) -> Kwargs {
        Kwargs::new()
    }
}

/// Type-erased view of a bound job, used by workers.
#[async_trait]
pub trait RefreshJob: Send + Sync + 'static {
    fn job_type(&self) -> &'static str;

    /// Fetch synchronously and store the result as fresh.
    async fn run_refresh(&self, call: &CallArgs) -> Result<()>;
}
