use super::{Job, RefreshJob};
use crate::clock::{Clock, SystemClock};
use crate::domain::{CacheEntry, CallArgs, EntryStatus, JobDescriptor, RefreshTask};
use crate::events::{CacheEvent, HitEvent, KeyEvent, LookupEvent};
use crate::ports::{Dispatcher, EntryStore};
use crate::tasks::queue;
use async_trait::async_trait;
use serde_json::Value;
use shared::config::Settings;
use shared::{Error, Result, TtlMs};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error};

/// Collaborators shared by every job bound in a process.
#[derive(Clone)]
pub struct CacheContext {
    store: Arc<EntryStore>,
    dispatcher: Arc<dyn Dispatcher>,
    clock: Arc<dyn Clock>,
    verify_cache_write: bool,
    event_broadcaster: Option<broadcast::Sender<CacheEvent>>,
}

impl CacheContext {
    pub fn new(store: Arc<EntryStore>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            clock: Arc::new(SystemClock),
            verify_cache_write: true,
            event_broadcaster: None,
        }
    }

    /// Context over `store` with an in-process refresh queue sized by `settings`.
    ///
    /// The receiver goes to a [`Worker`](crate::tasks::Worker).
    pub fn from_settings(
        settings: &Settings,
        store: Arc<EntryStore>,
    ) -> (Self, mpsc::Receiver<RefreshTask>) {
        let (dispatcher, receiver) = queue(settings.queue_capacity);
        let ctx = Self::new(store, Arc::new(dispatcher))
            .with_verify_cache_write(settings.verify_cache_write);
        (ctx, receiver)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_verify_cache_write(mut self, verify: bool) -> Self {
        self.verify_cache_write = verify;
        self
    }

    pub fn with_event_broadcaster(mut self, broadcaster: broadcast::Sender<CacheEvent>) -> Self {
        self.event_broadcaster = Some(broadcaster);
        self
    }

    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl Debug for CacheContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheContext")
            .field("verify_cache_write", &self.verify_cache_write)
            .field("events", &self.event_broadcaster.is_some())
            .finish()
    }
}

/// A job bound to a store and a dispatcher. This is what application code calls.
///
/// Holds no per-key state; one instance per job type can be shared freely.
pub struct CachedJob<J: Job> {
    job: Arc<J>,
    ctx: CacheContext,
}

impl<J: Job> Clone for CachedJob<J> {
    fn clone(&self) -> Self {
        Self {
            job: self.job.clone(),
            ctx: self.ctx.clone(),
        }
    }
}

impl<J: Job> CachedJob<J> {
    pub fn new(job: J, ctx: CacheContext) -> Self {
        Self {
            job: Arc::new(job),
            ctx,
        }
    }

    pub fn job(&self) -> &J {
        &self.job
    }

    /// Return the value for `raw`, using the cache where possible.
    pub async fn get(&self, raw: CallArgs) -> Result<Option<J::Output>> {
        let call = self.prepare(&raw);
        let key = self.job.key(&call)?;

        let Some(entry) = self.ctx.store.get(&key).await? else {
            return self.on_miss(&key, &call, &raw).await;
        };

        let now = self.ctx.clock.now();
        let delta = now - entry.expiry;
        if delta > 0.0 {
            return self.on_stale(&key, entry, delta, &call, &raw).await;
        }

        debug!(
            "Job {} with key '{}' - cache HIT ({})",
            J::JOB_TYPE,
            key,
            entry.status
        );
        self.emit(CacheEvent::Hit(HitEvent {
            job_type: J::JOB_TYPE.to_string(),
            key,
            status: entry.status,
            timestamp: now,
        }));
        let fetched = decode_payload::<J::Output>(entry.payload)?;
        Ok(self.job.got_hit(fetched, entry.status, &raw))
    }

    async fn on_miss(
        &self,
        key: &str,
        call: &CallArgs,
        raw: &CallArgs,
    ) -> Result<Option<J::Output>> {
        if self.job.should_fetch_synchronously_on_miss(call) {
            debug!(
                "Job {} with key '{}' - cache MISS - running synchronous refresh",
                J::JOB_TYPE,
                key
            );
            self.emit_lookup(key, false, CacheEvent::Miss);
            let fetched = self.refresh(call).await?;
            return Ok(self.job.got_miss(Some(fetched), false, raw));
        }

        debug!(
            "Job {} with key '{}' - cache MISS - triggering async refresh and returning empty result",
            J::JOB_TYPE,
            key
        );
        // The placeholder goes in before dispatching so concurrent callers see QUEUED.
        let empty = self.job.empty();
        let payload = match &empty {
            Some(value) => Some(serde_json::to_value(value)?),
            None => None,
        };
        let timeout = self.job.timeout(self.ctx.clock.now(), call);
        self.cache_set(key, timeout, EntryStatus::Queued, payload)
            .await?;
        self.emit_lookup(key, true, CacheEvent::Miss);
        self.async_refresh(call).await;
        Ok(self.job.got_miss(empty, true, raw))
    }

    async fn on_stale(
        &self,
        key: &str,
        entry: CacheEntry,
        delta: f64,
        call: &CallArgs,
        raw: &CallArgs,
    ) -> Result<Option<J::Output>> {
        if self.job.should_fetch_synchronously_on_stale(delta, call) {
            debug!(
                "Job {} with key '{}' - STALE cache hit - running synchronous refresh",
                J::JOB_TYPE,
                key
            );
            self.emit_lookup(key, false, CacheEvent::Stale);
            let fetched = self.refresh(call).await?;
            return Ok(self.job.got_stale(Some(fetched), false, raw));
        }

        debug!(
            "Job {} with key '{}' - STALE cache hit - triggering async refresh and returning stale result",
            J::JOB_TYPE,
            key
        );
        // Re-stamp with the refresh timeout rather than deleting, so a refresh
        // that never completes cannot leave the key without a value.
        let timeout = self.job.timeout(self.ctx.clock.now(), call);
        self.cache_set(key, timeout, EntryStatus::Queued, entry.payload.clone())
            .await?;
        self.emit_lookup(key, true, CacheEvent::Stale);
        self.async_refresh(call).await;
        let fetched = decode_payload::<J::Output>(entry.payload)?;
        Ok(self.job.got_stale(fetched, true, raw))
    }

    /// Mark the entry for `raw` as queued and trigger a background refresh.
    ///
    /// The payload is kept, so readers keep getting the old value meanwhile.
    pub async fn invalidate(&self, raw: CallArgs) -> Result<()> {
        let call = self.prepare(&raw);
        let key = self.job.key(&call)?;

        if let Some(entry) = self.ctx.store.get(&key).await? {
            let timeout = self.job.timeout(self.ctx.clock.now(), &call);
            self.cache_set(&key, timeout, EntryStatus::Queued, entry.payload)
                .await?;
            self.emit(CacheEvent::Invalidated(self.key_event(&key)));
            self.async_refresh(&call).await;
        }
        Ok(())
    }

    /// Remove the entry for `raw`. The next `get` takes the miss path.
    pub async fn delete(&self, raw: CallArgs) -> Result<()> {
        let call = self.prepare(&raw);
        let key = self.job.key(&call)?;

        if self.ctx.store.get(&key).await?.is_some() {
            self.ctx.store.delete(&key).await?;
            self.emit(CacheEvent::Deleted(self.key_event(&key)));
        }
        Ok(())
    }

    /// Fetch synchronously and store the result as fresh. `call` must already be prepared.
    pub async fn refresh(&self, call: &CallArgs) -> Result<J::Output> {
        let result = self.job.fetch(call).await?;
        let key = self.job.key(call)?;
        let expiry = self.job.expiry(self.ctx.clock.now(), call);
        let payload = serde_json::to_value(&result)?;

        self.cache_set(&key, expiry, EntryStatus::Fresh, Some(payload))
            .await?;
        self.emit(CacheEvent::Refreshed(self.key_event(&key)));
        Ok(result)
    }

    /// Write `(expiry, status, payload)` under `key` with the job's store TTL.
    pub async fn cache_set(
        &self,
        key: &str,
        expiry: f64,
        status: EntryStatus,
        payload: Option<Value>,
    ) -> Result<()> {
        // JSON-backed stores cannot tell `null` from no payload.
        let payload = payload.filter(|value| !value.is_null());
        let has_payload = payload.is_some();
        let entry = CacheEntry::new(expiry, status, payload);
        let ttl = TtlMs::from(self.job.config().cache_ttl);
        self.ctx.store.put(key.to_string(), entry, Some(ttl)).await?;

        // Some stores drop values silently (e.g. memcache over its size limit).
        if self.ctx.verify_cache_write && has_payload {
            let persisted = self
                .ctx
                .store
                .get(&key.to_string())
                .await?
                .and_then(|entry| entry.payload);
            if persisted.is_none() {
                return Err(Error::CacheWriteVerification {
                    key: key.to_string(),
                    type_name: std::any::type_name::<J::Output>().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Hand a refresh to the dispatcher, refreshing inline if that fails.
    ///
    /// Never fails: the caller already has a value to return.
    pub async fn async_refresh(&self, call: &CallArgs) {
        let task = RefreshTask {
            descriptor: self.descriptor(),
            call: call.clone(),
            options: self.job.config().task_options.clone(),
        };

        let Err(e) = self.ctx.dispatcher.dispatch(task).await else {
            return;
        };

        error!(
            "Unable to trigger task asynchronously for job {} - failing over to synchronous refresh: {}",
            J::JOB_TYPE,
            e
        );
        match self.refresh(call).await {
            Ok(_) => debug!("Failover synchronous refresh completed successfully"),
            Err(e) => error!("Unable to refresh data synchronously: {}", e),
        }
    }

    pub fn key(&self, raw: &CallArgs) -> Result<String> {
        self.job.key(&self.prepare(raw))
    }

    pub fn descriptor(&self) -> JobDescriptor {
        JobDescriptor {
            job_type: J::JOB_TYPE.to_string(),
            ctor_args: self.job.constructor_args(),
            ctor_kwargs: self.job.constructor_kwargs(),
        }
    }

    fn prepare(&self, raw: &CallArgs) -> CallArgs {
        CallArgs::from_parts(
            self.job.prepare_args(raw.args.clone()),
            self.job.prepare_kwargs(raw.kwargs.clone()),
        )
    }

    fn key_event(&self, key: &str) -> KeyEvent {
        KeyEvent {
            job_type: J::JOB_TYPE.to_string(),
            key: key.to_string(),
            timestamp: self.ctx.clock.now(),
        }
    }

    fn emit_lookup(&self, key: &str, is_async: bool, variant: fn(LookupEvent) -> CacheEvent) {
        self.emit(variant(LookupEvent {
            job_type: J::JOB_TYPE.to_string(),
            key: key.to_string(),
            is_async,
            timestamp: self.ctx.clock.now(),
        }));
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(ref broadcaster) = self.ctx.event_broadcaster {
            let kind = event.kind();
            if broadcaster.send(event).is_err() {
                debug!("No subscribers for {} event on job {}", kind, J::JOB_TYPE);
            }
        }
    }
}

#[async_trait]
impl<J: Job> RefreshJob for CachedJob<J> {
    fn job_type(&self) -> &'static str {
        J::JOB_TYPE
    }

    async fn run_refresh(&self, call: &CallArgs) -> Result<()> {
        self.refresh(call).await.map(|_| ())
    }
}

impl<J: Job> Debug for CachedJob<J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedJob")
            .field("job_type", &J::JOB_TYPE)
            .field("ctx", &self.ctx)
            .finish()
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(payload: Option<Value>) -> Result<Option<T>> {
    payload
        .map(serde_json::from_value)
        .transpose()
        .map_err(Error::from)
}
