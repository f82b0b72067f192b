use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;

use crate::backend::limiter_backend::validate_limit_args;
use crate::backend::LimiterBackend;
use crate::clock::{Clock, MonotonicClock};
use crate::settings::LimiterSettings;
use crate::{Decision, LimiterError};

/// One fixed-window counter.
#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: u64,
    expires_at_ms: u64,
}

/// Configuration for [`InMemoryLimiterBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBackendConfig {
    /// How often the reaper removes expired counters.
    pub cleanup_interval: Duration,
    /// Upper bound on the number of stored keys.
    pub max_keys: usize,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        let settings = LimiterSettings::global();
        Self {
            cleanup_interval: Duration::from_secs(settings.cleanup_interval_seconds),
            max_keys: settings.max_keys,
        }
    }
}

impl MemoryBackendConfig {
    fn validate(&self) -> Result<(), LimiterError> {
        if self.max_keys == 0 {
            return Err(LimiterError::Config(
                "max_keys must be at least 1".to_string(),
            ));
        }
        if self.cleanup_interval.is_zero() {
            return Err(LimiterError::Config(
                "cleanup_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Backend statistics for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBackendStats {
    /// Number of stored keys, expired or not.
    pub total_keys: usize,
    /// Number of keys whose window is still live.
    pub total_entries: usize,
}

struct Reaper {
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

/// Fixed-window rate limiter keeping its counters in process memory.
///
/// Windows are aligned to multiples of `window_ms` on the backend's
/// monotonic clock, so a counter resets at the window boundary rather than
/// `window_ms` after its first hit.
///
/// # Concurrency
///
/// Per-key mutation is serialized by the map's shard locks; the increment
/// happens entirely under the lock, so a cancelled `check_limit` call never
/// leaves a half-applied count. Between different keys no ordering is
/// guaranteed.
///
/// # Memory
///
/// Expired counters are removed by a reaper thread every
/// `cleanup_interval`. Inserting a new key at `max_keys` first sweeps
/// expired entries inline and then, if the map is still full, evicts the
/// entry closest to expiry.
///
/// # Examples
///
/// ```
/// use phragma::backend::{InMemoryLimiterBackend, LimiterBackend, MemoryBackendConfig};
///
/// # async fn demo() -> Result<(), phragma::LimiterError> {
/// let backend = InMemoryLimiterBackend::new(MemoryBackendConfig::default())?;
/// backend.connect().await?;
///
/// let decision = backend.check_limit("user:1", 3, 1_000).await?;
/// assert!(decision.is_admitted());
///
/// backend.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct InMemoryLimiterBackend {
    entries: Arc<DashMap<String, CounterEntry>>,
    clock: Arc<dyn Clock>,
    connected: AtomicBool,
    config: Mutex<MemoryBackendConfig>,
    reaper: Mutex<Option<Reaper>>,
}

impl InMemoryLimiterBackend {
    pub fn new(config: MemoryBackendConfig) -> Result<Self, LimiterError> {
        config.validate()?;

        Ok(Self {
            entries: Arc::new(DashMap::new()),
            clock: Arc::new(MonotonicClock::default()),
            connected: AtomicBool::new(false),
            config: Mutex::new(config),
            reaper: Mutex::new(None),
        })
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Reinitialize with `config` unless it matches the current one.
    pub async fn reconnect(&self, config: MemoryBackendConfig) -> Result<(), LimiterError> {
        config.validate()?;

        if self.is_connected() && *self.config.lock() == config {
            return Ok(());
        }

        self.disconnect().await?;
        *self.config.lock() = config;
        self.connect().await
    }

    /// Current key and live-entry counts.
    pub fn stats(&self) -> MemoryBackendStats {
        let now = self.clock.now_millis();
        let total_entries = self
            .entries
            .iter()
            .filter(|e| e.value().expires_at_ms > now)
            .count();

        MemoryBackendStats {
            total_keys: self.entries.len(),
            total_entries,
        }
    }

    /// Drop the counter for `key`, reporting whether it existed.
    pub fn clear_key(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop all counters.
    pub fn clear_all(&self) {
        self.entries.clear();
    }

    fn spawn_reaper(&self) -> Result<(), LimiterError> {
        // The slot lock also serializes concurrent connects, so at most one
        // reaper exists per backend instance.
        let mut slot = self.reaper.lock();
        if slot.is_some() {
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let entries = Arc::clone(&self.entries);
        let clock = Arc::clone(&self.clock);
        let interval = self.config.lock().cleanup_interval;

        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("phragma-reaper".to_string())
            .spawn(move || {
                while !thread_stop.load(Ordering::Acquire) {
                    thread::park_timeout(interval);
                    if thread_stop.load(Ordering::Acquire) {
                        break;
                    }
                    reap(&entries, clock.now_millis());
                }
            })
            .map_err(|e| LimiterError::Config(format!("failed to spawn reaper thread: {e}")))?;

        *slot = Some(Reaper { stop, handle });
        Ok(())
    }

    fn stop_reaper(&self) {
        if let Some(reaper) = self.reaper.lock().take() {
            reaper.stop.store(true, Ordering::Release);
            reaper.handle.thread().unpark();
            let _ = reaper.handle.join();
        }
    }

    /// Inline removal of expired entries, used by the capacity guard.
    fn sweep_expired(&self, now: u64) {
        reap(&self.entries, now);
    }

    /// Evict the entry with the earliest expiry.
    fn evict_earliest(&self) {
        let earliest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().expires_at_ms)
            .map(|e| e.key().clone());

        if let Some(key) = earliest {
            self.entries.remove(&key);
            tracing::warn!(key = %key, "key capacity reached, evicted earliest-expiry counter");
        }
    }
}

fn window_end(now: u64, window_ms: u64) -> u64 {
    now - now % window_ms + window_ms
}

fn reap(entries: &DashMap<String, CounterEntry>, now: u64) {
    // Snapshot the expired keys first so no shard lock is held while
    // deleting; each removal re-checks expiry under its own lock.
    let expired: Vec<String> = entries
        .iter()
        .filter(|e| e.value().expires_at_ms <= now)
        .map(|e| e.key().clone())
        .collect();

    let mut removed = 0usize;
    for key in &expired {
        if entries
            .remove_if(key, |_, entry| entry.expires_at_ms <= now)
            .is_some()
        {
            removed += 1;
        }
    }

    if removed > 0 {
        tracing::debug!(removed, remaining = entries.len(), "reaped expired counters");
    }
}

#[async_trait]
impl LimiterBackend for InMemoryLimiterBackend {
    async fn connect(&self) -> Result<(), LimiterError> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }

        self.spawn_reaper()?;
        self.connected.store(true, Ordering::Release);

        let config = self.config.lock();
        tracing::debug!(
            cleanup_interval_ms = config.cleanup_interval.as_millis() as u64,
            max_keys = config.max_keys,
            "in-memory backend connected"
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LimiterError> {
        self.connected.store(false, Ordering::Release);
        self.stop_reaper();
        self.entries.clear();
        tracing::debug!("in-memory backend disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn check_limit(
        &self,
        key: &str,
        times: u64,
        window_ms: u64,
    ) -> Result<Decision, LimiterError> {
        if !self.is_connected() {
            return Err(LimiterError::NotConnected);
        }
        validate_limit_args(times, window_ms)?;

        let now = self.clock.now_millis();
        let max_keys = self.config.lock().max_keys;

        // Capacity guard: a new key may not push the map past max_keys.
        if !self.entries.contains_key(key) && self.entries.len() >= max_keys {
            self.sweep_expired(now);
            if self.entries.len() >= max_keys {
                self.evict_earliest();
            }
        }

        let decision = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.expires_at_ms <= now {
                    *entry = CounterEntry {
                        count: 1,
                        expires_at_ms: window_end(now, window_ms),
                    };
                    Decision::admitted(1)
                } else {
                    entry.count += 1;
                    if entry.count > times {
                        Decision::rejected(entry.expires_at_ms - now, entry.count)
                    } else {
                        Decision::admitted(entry.count)
                    }
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CounterEntry {
                    count: 1,
                    expires_at_ms: window_end(now, window_ms),
                });
                Decision::admitted(1)
            }
        };

        Ok(decision)
    } // end method check_limit
}

impl Drop for InMemoryLimiterBackend {
    fn drop(&mut self) {
        self.stop_reaper();
    }
}
