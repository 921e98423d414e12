use crate::domain::EntryStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheEvent {
    Miss(LookupEvent),
    Hit(HitEvent),
    Stale(LookupEvent),
    Refreshed(KeyEvent),
    Invalidated(KeyEvent),
    Deleted(KeyEvent),
}

impl CacheEvent {
    pub fn job_type(&self) -> &str {
        match self {
            CacheEvent::Miss(e) | CacheEvent::Stale(e) => &e.job_type,
            CacheEvent::Hit(e) => &e.job_type,
            CacheEvent::Refreshed(e) | CacheEvent::Invalidated(e) | CacheEvent::Deleted(e) => {
                &e.job_type
            }
        }
    }

    pub fn key(&self) -> &str {
        match self {
            CacheEvent::Miss(e) | CacheEvent::Stale(e) => &e.key,
            CacheEvent::Hit(e) => &e.key,
            CacheEvent::Refreshed(e) | CacheEvent::Invalidated(e) | CacheEvent::Deleted(e) => {
                &e.key
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CacheEvent::Miss(_) => "miss",
            CacheEvent::Hit(_) => "hit",
            CacheEvent::Stale(_) => "stale",
            CacheEvent::Refreshed(_) => "refreshed",
            CacheEvent::Invalidated(_) => "invalidated",
            CacheEvent::Deleted(_) => "deleted",
        }
    }
}

/// Miss or stale lookup. `is_async` is false when the caller waited for a fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupEvent {
    pub job_type: String,
    pub key: String,
    pub is_async: bool,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitEvent {
    pub job_type: String,
    pub key: String,
    pub status: EntryStatus,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub job_type: String,
    pub key: String,
    pub timestamp: f64,
}
