//! In-process refresh queue.
//!
//! [`QueueDispatcher`] is the sending half, [`Worker`] drains the queue and
//! runs each refresh on its own tokio task.

use crate::domain::RefreshTask;
use crate::ports::Dispatcher;
use crate::registry::JobRegistry;
use async_trait::async_trait;
use shared::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Task option holding a delay, in seconds, before the refresh runs.
pub const COUNTDOWN_OPTION: &str = "countdown";

/// Create a bounded queue and its dispatcher.
pub fn queue(capacity: usize) -> (QueueDispatcher, mpsc::Receiver<RefreshTask>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (QueueDispatcher { sender }, receiver)
}

#[derive(Clone, Debug)]
pub struct QueueDispatcher {
    sender: mpsc::Sender<RefreshTask>,
}

#[async_trait]
impl Dispatcher for QueueDispatcher {
    async fn dispatch(&self, task: RefreshTask) -> Result<()> {
        let job_type = task.descriptor.job_type.clone();
        self.sender.try_send(task).map_err(|e| match e {
            TrySendError::Full(_) => Error::Dispatch("refresh queue is full".to_string()),
            TrySendError::Closed(_) => {
                Error::Dispatch("refresh worker is not running".to_string())
            }
        })?;
        debug!("Queued refresh for job {}", job_type);
        Ok(())
    }
}

#[derive(Debug)]
pub struct Worker {
    registry: Arc<JobRegistry>,
}

impl Worker {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }

    /// Rebuild the job described by `task` and refresh it.
    pub async fn execute(&self, task: RefreshTask) -> Result<()> {
        if let Some(delay) = countdown(&task) {
            tokio::time::sleep(delay).await;
        }

        let job = self.registry.resolve(&task.descriptor)?;
        job.run_refresh(&task.call).await?;
        debug!("Refreshed job {}", job.job_type());
        Ok(())
    }

    /// Drain `receiver` until `shutdown` is cancelled or the queue closes.
    ///
    /// The registry's own context holds a dispatcher, so the queue does not
    /// close on its own while this worker is alive; cancel `shutdown` to stop.
    /// Refreshes already spawned are left to finish.
    pub async fn run(
        self: Arc<Self>,
        mut receiver: mpsc::Receiver<RefreshTask>,
        shutdown: CancellationToken,
    ) {
        info!("Refresh worker started");
        loop {
            let task = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Refresh worker shutting down");
                    return;
                }
                task = receiver.recv() => match task {
                    Some(task) => task,
                    None => break,
                },
            };

            let worker = Arc::clone(&self);
            tokio::spawn(async move {
                let job_type = task.descriptor.job_type.clone();
                if let Err(e) = worker.execute(task).await {
                    error!("Refresh of job {} failed: {}", job_type, e);
                }
            });
        }
        info!("Refresh queue closed, worker stopping");
    }
}

fn countdown(task: &RefreshTask) -> Option<Duration> {
    task.options
        .get(COUNTDOWN_OPTION)
        .and_then(serde_json::Value::as_f64)
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CacheEntry, CallArgs, EntryStatus, JobConfig, JobDescriptor};
    use crate::job::{CacheContext, CachedJob, Job};
    use crate::memory::MemoryStore;
    use crate::ports::CacheStore;
    use crate::testing::{CountingJob, RecordingDispatcher};
    use serde_json::Value;

    fn task(job_type: &str, arg: &str) -> RefreshTask {
        RefreshTask {
            descriptor: JobDescriptor::new(job_type),
            call: CallArgs::new().arg(arg).unwrap(),
            options: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_full_queue_rejects_dispatch() {
        let (dispatcher, _receiver) = queue(1);
        dispatcher
            .dispatch(task(CountingJob::JOB_TYPE, "a"))
            .await
            .unwrap();

        let result = dispatcher.dispatch(task(CountingJob::JOB_TYPE, "b")).await;
        assert!(matches!(result, Err(Error::Dispatch(_))));
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_dispatch() {
        let (dispatcher, receiver) = queue(4);
        drop(receiver);

        let result = dispatcher.dispatch(task(CountingJob::JOB_TYPE, "a")).await;
        assert!(matches!(result, Err(Error::Dispatch(_))));
    }

    #[tokio::test]
    async fn test_execute_unknown_job_fails() {
        let (dispatcher, _receiver) = queue(4);
        let store: Arc<MemoryStore<String, CacheEntry>> = Arc::new(MemoryStore::new());
        let registry = JobRegistry::new(CacheContext::new(store, Arc::new(dispatcher)));
        let worker = Worker::new(Arc::new(registry));

        let result = worker.execute(task("tests.Missing", "a")).await;
        assert!(matches!(result, Err(Error::UnknownJobType(_))));
    }

    #[test]
    fn test_countdown_option_is_parsed() {
        let mut delayed = task(CountingJob::JOB_TYPE, "a");
        assert_eq!(countdown(&delayed), None);

        delayed
            .options
            .insert(COUNTDOWN_OPTION.to_string(), Value::from(1.5));
        assert_eq!(countdown(&delayed), Some(Duration::from_millis(1500)));

        delayed
            .options
            .insert(COUNTDOWN_OPTION.to_string(), Value::from(-3));
        assert_eq!(countdown(&delayed), None);
    }

    #[tokio::test]
    async fn test_worker_completes_deferred_miss() {
        let (dispatcher, receiver) = queue(16);
        let store: Arc<MemoryStore<String, CacheEntry>> = Arc::new(MemoryStore::new());
        let ctx = CacheContext::new(store.clone(), Arc::new(dispatcher));

        let mut registry = JobRegistry::new(ctx.clone());
        registry.register(|_: &JobDescriptor| {
            Ok(CountingJob::new(JobConfig::default().with_fetch_on_miss(false)))
        });
        let worker = Arc::new(Worker::new(Arc::new(registry)));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(receiver, shutdown.clone()));

        let job = CachedJob::new(
            CountingJob::new(JobConfig::default().with_fetch_on_miss(false)),
            ctx,
        );
        let call = CallArgs::new().arg("a").unwrap();
        assert_eq!(job.get(call.clone()).await.unwrap(), None);

        let key = job.key(&call).unwrap();
        let mut refreshed = None;
        for _ in 0..100 {
            match store.get(&key).await.unwrap() {
                Some(entry) if entry.status == EntryStatus::Fresh => {
                    refreshed = Some(entry);
                    break;
                }
                _ => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }

        let entry = refreshed.expect("worker never refreshed the entry");
        assert_eq!(entry.payload, Some(Value::from("a#1")));
        assert_eq!(job.get(call).await.unwrap(), Some("a#1".to_string()));

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown_while_registry_holds_sender() {
        let (dispatcher, receiver) = queue(4);
        let store: Arc<MemoryStore<String, CacheEntry>> = Arc::new(MemoryStore::new());
        let ctx = CacheContext::new(store, Arc::new(dispatcher));
        let registry = JobRegistry::new(ctx.clone());
        drop(ctx);

        let worker = Arc::new(Worker::new(Arc::new(registry)));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker.run(receiver, shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .expect("worker did not stop after shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_worker_stops_when_queue_closes() {
        let (dispatcher, receiver) = queue(4);
        let store: Arc<MemoryStore<String, CacheEntry>> = Arc::new(MemoryStore::new());
        let registry = JobRegistry::new(CacheContext::new(
            store,
            Arc::new(RecordingDispatcher::default()),
        ));
        drop(dispatcher);

        let worker = Arc::new(Worker::new(Arc::new(registry)));
        tokio::time::timeout(
            Duration::from_millis(500),
            worker.run(receiver, CancellationToken::new()),
        )
        .await
        .expect("worker did not stop after the queue closed");
    }
}
