use std::str::FromStr;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Moka,
    Sled,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "moka" | "memory" => Ok(StoreBackend::Moka),
            "sled" | "disk" => Ok(StoreBackend::Sled),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    /// Read every non-empty write back and fail loudly if it did not persist.
    pub verify_cache_write: bool,
    /// Capacity of the in-process refresh queue.
    pub queue_capacity: usize,
    pub store: StoreBackend,
    pub data_dir: String,
    pub store_host: String,
    pub store_port: u16,
    pub store_max_entries: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            verify_cache_write: true,
            queue_capacity: Self::DEFAULT_QUEUE_CAPACITY,
            store: StoreBackend::Moka,
            data_dir: Self::DEFAULT_DATA_DIR.to_string(),
            store_host: Self::DEFAULT_STORE_HOST.to_string(),
            store_port: Self::DEFAULT_STORE_PORT,
            store_max_entries: None,
        }
    }
}

impl Settings {
    const DEFAULT_QUEUE_CAPACITY: usize = 1024;
    const DEFAULT_DATA_DIR: &str = "./data";
    const DEFAULT_STORE_HOST: &str = "127.0.0.1";
    const DEFAULT_STORE_PORT: u16 = 5600;

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            verify_cache_write: parse_or(
                &lookup,
                "CACHEBACK_VERIFY_CACHE_WRITE",
                defaults.verify_cache_write,
            ),
            queue_capacity: parse_or(&lookup, "CACHEBACK_QUEUE_CAPACITY", defaults.queue_capacity),
            store: parse_or(&lookup, "CACHEBACK_STORE", defaults.store),
            data_dir: lookup("CACHEBACK_DATA_DIR").unwrap_or(defaults.data_dir),
            store_host: lookup("CACHEBACK_STORE_HOST").unwrap_or(defaults.store_host),
            store_port: parse_or(&lookup, "CACHEBACK_STORE_PORT", defaults.store_port),
            store_max_entries: lookup("CACHEBACK_STORE_MAX_ENTRIES").and_then(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map_err(|e| warn!("Ignoring CACHEBACK_STORE_MAX_ENTRIES={}: {}", raw, e))
                    .ok()
            }),
        }
    }

    pub fn store_addr(&self) -> String {
        format!("{}:{}", self.store_host, self.store_port)
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(e) => {
                warn!("Invalid value for {} ({}): {}, using default", name, raw, e);
                default
            }
        },
        None => default,
    }
}
