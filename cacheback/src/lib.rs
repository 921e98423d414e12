//! Read-through cache with deduplicated background refresh.
//!
//! A [`Job`] describes how to compute a value and how long it stays fresh.
//! Binding it to a [`CacheContext`] gives a [`CachedJob`] whose `get` serves
//! fresh hits directly, serves stale hits while a refresh runs elsewhere, and
//! decides per policy whether a miss blocks on `fetch` or returns a placeholder.
//! Entries are `(expiry, status, payload)` triples; the `QUEUED` status with a
//! short `refresh_timeout` expiry keeps concurrent callers from dispatching the
//! same refresh over and over.

pub mod clock;
pub mod domain;
pub mod events;
pub mod job;
pub mod key;
pub mod memory;
pub mod ports;
pub mod registry;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{CacheEntry, CallArgs, EntryStatus, JobConfig, JobDescriptor, Kwargs, RefreshTask};
pub use events::CacheEvent;
pub use job::{CacheContext, CachedJob, Job, RefreshJob};
pub use memory::MemoryStore;
pub use ports::{CacheStore, Dispatcher, EntryStore};
pub use registry::JobRegistry;
pub use tasks::{QueueDispatcher, Worker};
