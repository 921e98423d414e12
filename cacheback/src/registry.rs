use crate::domain::JobDescriptor;
use crate::job::{CacheContext, CachedJob, Job, RefreshJob};
use shared::{Error, Result};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

type Factory = Arc<dyn Fn(&JobDescriptor) -> Result<Arc<dyn RefreshJob>> + Send + Sync>;

/// Maps job-type identifiers to factories so a worker can rebuild a job from
/// a [`JobDescriptor`]. Populate it once at process start.
#[derive(Clone)]
pub struct JobRegistry {
    ctx: CacheContext,
    factories: HashMap<&'static str, Factory>,
}

impl JobRegistry {
    pub fn new(ctx: CacheContext) -> Self {
        Self {
            ctx,
            factories: HashMap::new(),
        }
    }

    /// Register `J`. The factory receives the descriptor's constructor arguments.
    pub fn register<J, F>(&mut self, build: F) -> &mut Self
    where
        J: Job,
        F: Fn(&JobDescriptor) -> Result<J> + Send + Sync + 'static,
    {
        let ctx = self.ctx.clone();
        let factory: Factory = Arc::new(move |descriptor: &JobDescriptor| {
            let job = build(descriptor)?;
            Ok(Arc::new(CachedJob::new(job, ctx.clone())) as Arc<dyn RefreshJob>)
        });

        if self.factories.insert(J::JOB_TYPE, factory).is_some() {
            tracing::warn!("Job type {} registered twice, keeping the latest", J::JOB_TYPE);
        }
        self
    }

    pub fn resolve(&self, descriptor: &JobDescriptor) -> Result<Arc<dyn RefreshJob>> {
        let factory = self
            .factories
            .get(descriptor.job_type.as_str())
            .ok_or_else(|| Error::UnknownJobType(descriptor.job_type.clone()))?;
        factory(descriptor)
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.factories.contains_key(job_type)
    }

    pub fn job_types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self.factories.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

impl Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}
