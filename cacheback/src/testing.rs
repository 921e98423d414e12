//! Jobs, stores and dispatchers shared by the unit tests.

use crate::domain::response::{DeleteResponse, PutResponse};
use crate::domain::{CacheEntry, CallArgs, JobConfig, Kwargs, RefreshTask};
use crate::job::Job;
use crate::ports::{CacheStore, Dispatcher};
use async_trait::async_trait;
use serde_json::Value;
use shared::{Error, Result, TtlMs};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Returns `"{label}{first arg}#{n}"` where `n` counts fetches.
#[derive(Debug, Default)]
pub struct CountingJob {
    config: JobConfig,
    label: Option<String>,
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl CountingJob {
    pub fn new(config: JobConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_from_now_on(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Job for CountingJob {
    const JOB_TYPE: &'static str = "tests.CountingJob";
    type Output = String;

    fn config(&self) -> &JobConfig {
        &self.config
    }

    async fn fetch(&self, call: &CallArgs) -> Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Internal("upstream unavailable".to_string()));
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let arg = call
            .args
            .first()
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(format!("{}{}#{}", self.label.as_deref().unwrap_or(""), arg, n))
    }

    fn constructor_kwargs(&self) -> Kwargs {
        let mut kwargs = Kwargs::new();
        if let Some(label) = &self.label {
            kwargs.insert("label".to_string(), Value::from(label.as_str()));
        }
        kwargs
    }
}

/// Leaves `fetch` to the default.
#[derive(Debug, Default)]
pub struct UnimplementedJob {
    config: JobConfig,
}

impl Job for UnimplementedJob {
    const JOB_TYPE: &'static str = "tests.UnimplementedJob";
    type Output = String;

    fn config(&self) -> &JobConfig {
        &self.config
    }
}

#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    tasks: Mutex<Vec<RefreshTask>>,
}

impl RecordingDispatcher {
    pub fn tasks(&self) -> Vec<RefreshTask> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, task: RefreshTask) -> Result<()> {
        self.tasks.lock().unwrap().push(task);
        Ok(())
    }
}

/// Behaves like an unreachable broker.
#[derive(Debug, Default)]
pub struct FailingDispatcher;

#[async_trait]
impl Dispatcher for FailingDispatcher {
    async fn dispatch(&self, _task: RefreshTask) -> Result<()> {
        Err(Error::Dispatch("connection refused".to_string()))
    }
}

/// Accepts every write and keeps nothing.
#[derive(Debug, Default)]
pub struct DroppingStore;

#[async_trait]
impl CacheStore<String, CacheEntry> for DroppingStore {
    async fn get(&self, _key: &String) -> Result<Option<CacheEntry>> {
        Ok(None)
    }

    async fn put(
        &self,
        _key: String,
        _val: CacheEntry,
        _ttl: Option<TtlMs>,
    ) -> Result<PutResponse> {
        Ok(PutResponse::new(true, "Successfully inserted"))
    }

    async fn delete(&self, _key: &String) -> Result<DeleteResponse> {
        Ok(DeleteResponse::new(false))
    }
}
