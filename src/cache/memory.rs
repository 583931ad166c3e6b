//! In-memory cache with background expiry.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::{Cache, CacheConfig, DEFAULT_CLEANUP_INTERVAL};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Bytes,
    /// `None` for lifetimes too long to represent; such entries never expire.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        !matches!(self.expires_at, Some(expires_at) if now >= expires_at)
    }
}

type Entries = Arc<RwLock<HashMap<String, CacheEntry>>>;

struct Sweeper {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Process-local expiring cache.
///
/// Entries live in a map behind a single read/write lock. A background task
/// removes expired entries every cleanup interval; reads check expiry
/// themselves, so the sweep only bounds memory. The task is started when the
/// cache is created inside a Tokio runtime and stops on [`Cache::close`] or
/// drop.
///
/// # Example
///
/// ```no_run
/// use lcsc_client::cache::{Cache, MemoryCache};
/// use std::time::Duration;
///
/// # async fn demo() {
/// let cache = MemoryCache::new(Duration::from_secs(300));
/// cache.set("GET:USD:product/detail?productCode=C8734", "{}".into(), Duration::ZERO).await;
/// assert!(cache.get("GET:USD:product/detail?productCode=C8734").await.is_some());
/// cache.close().await;
/// # }
/// ```
pub struct MemoryCache {
    entries: Entries,
    default_ttl: Duration,
    cleanup_interval: Duration,
    sweeper: Mutex<Option<Sweeper>>,
    closed: AtomicBool,
}

impl MemoryCache {
    /// Creates a cache with the given default lifetime, sweeping every minute.
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_cleanup_interval(default_ttl, DEFAULT_CLEANUP_INTERVAL)
    }

    /// Creates a cache from a config.
    pub fn with_config(config: &CacheConfig) -> Self {
        Self::with_cleanup_interval(config.default_ttl, config.cleanup_interval)
    }

    /// Creates a cache with an explicit sweep interval.
    pub fn with_cleanup_interval(default_ttl: Duration, cleanup_interval: Duration) -> Self {
        let entries: Entries = Arc::new(RwLock::new(HashMap::new()));
        let sweeper = spawn_sweeper(Arc::clone(&entries), cleanup_interval);

        Self {
            entries,
            default_ttl,
            cleanup_interval,
            sweeper: Mutex::new(sweeper),
            closed: AtomicBool::new(false),
        }
    }

    /// Lifetime used for `set` calls with a zero TTL.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns true if a background sweep is running.
    pub fn has_sweeper(&self) -> bool {
        self.sweeper.lock().is_some()
    }

    /// Returns true once [`Cache::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Removes every expired entry now, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        purge(&self.entries)
    }

    fn stop_sweeper(&self) -> Option<JoinHandle<()>> {
        let sweeper = self.sweeper.lock().take()?;
        // The receiver is gone if the task already exited.
        let _ = sweeper.shutdown.send(());
        Some(sweeper.handle)
    }
}

fn purge(entries: &Entries) -> usize {
    let now = Instant::now();
    let mut map = entries.write();
    let before = map.len();
    map.retain(|_, entry| entry.is_live(now));
    before - map.len()
}

fn spawn_sweeper(entries: Entries, interval: Duration) -> Option<Sweeper> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        debug!("No Tokio runtime; cache expiry sweep disabled");
        return None;
    };

    let Some(first_tick) = Instant::now().checked_add(interval) else {
        debug!(?interval, "Cleanup interval out of range; cache expiry sweep disabled");
        return None;
    };

    let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();
    let handle = runtime.spawn(async move {
        let mut ticker = tokio::time::interval_at(first_tick, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {
                    let removed = purge(&entries);
                    if removed > 0 {
                        debug!(removed, "Swept expired cache entries");
                    }
                }
            }
        }
    });

    Some(Sweeper { shutdown, handle })
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        {
            let map = self.entries.read();
            match map.get(key) {
                Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: drop it unless a concurrent set replaced it meanwhile.
        let mut map = self.entries.write();
        if map.get(key).is_some_and(|entry| !entry.is_live(now)) {
            map.remove(key);
        }
        None
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        let entry = CacheEntry {
            value,
            expires_at: Instant::now().checked_add(ttl),
        };
        self.entries.write().insert(key.to_string(), entry);
    }

    async fn delete(&self, key: &str) {
        self.entries.write().remove(key);
    }

    async fn clear(&self) {
        self.entries.write().clear();
    }

    async fn size(&self) -> usize {
        self.entries.read().len()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(handle) = self.stop_sweeper() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Cache sweep task ended abnormally");
            }
        }
    }
}

impl Drop for MemoryCache {
    fn drop(&mut self) {
        if let Some(handle) = self.stop_sweeper() {
            handle.abort();
        }
    }
}

impl fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.entries.read().len())
            .field("default_ttl", &self.default_ttl)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("closed", &self.is_closed())
            .finish()
    }
}
