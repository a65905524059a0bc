//! Keyed delayed-callback registry.
//!
//! # Responsibilities
//! - Schedule a callback under a key, replacing any live entry for that key
//! - Cancel single keys or every key matching a pattern
//! - Report active entries by age
//! - Force-cancel entries older than `max_age` on a periodic sweep
//! - Cancel everything on shutdown
//!
//! # Design Decisions
//! - Each registration carries a generation number. A fired task only runs
//!   its callback if it still owns the key, so a replaced or cleared entry
//!   can never fire even if its abort raced with the timer
//! - The entry leaves the registry before the callback body starts, which
//!   lets the callback register under its own key again
//! - Callback errors and panics are caught and logged; the task ends there
//! - Spawned tasks hold a `Weak` to the registry so a dropped manager is not
//!   kept alive by its own timers

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::FutureExt;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::TimeoutManagerConfig;
use crate::logging::hooks::panic_message;
use crate::logging::EventLogger;
use crate::timeouts::TimeoutError;

pub const CONTEXT: &str = "TIMEOUT_MANAGER";

const ONE_MINUTE: Duration = Duration::from_secs(60);
const FIVE_MINUTES: Duration = Duration::from_secs(5 * 60);
const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

/// One scheduled callback. The task handle is owned by the entry alone.
struct TimeoutEntry {
    created_at: Instant,
    description: Option<String>,
    generation: u64,
    handle: JoinHandle<()>,
}

/// Active entry counts per age bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgeBuckets {
    #[serde(rename = "<1min")]
    pub under_one_minute: usize,
    #[serde(rename = "1-5min")]
    pub one_to_five_minutes: usize,
    #[serde(rename = "5-15min")]
    pub five_to_fifteen_minutes: usize,
    #[serde(rename = ">15min")]
    pub over_fifteen_minutes: usize,
}

impl AgeBuckets {
    fn add(&mut self, age: Duration) {
        if age < ONE_MINUTE {
            self.under_one_minute += 1;
        } else if age < FIVE_MINUTES {
            self.one_to_five_minutes += 1;
        } else if age < FIFTEEN_MINUTES {
            self.five_to_fifteen_minutes += 1;
        } else {
            self.over_fifteen_minutes += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OldestTimeout {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub age_ms: u64,
}

/// Read-only snapshot of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutStats {
    pub active: usize,
    pub by_age: AgeBuckets,
    pub oldest: Option<OldestTimeout>,
}

/// Shared handle to the timeout registry.
#[derive(Clone)]
pub struct TimeoutManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    entries: DashMap<String, TimeoutEntry>,
    next_generation: AtomicU64,
    logger: EventLogger,
    sweep_interval: Duration,
    max_age: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl TimeoutManager {
    pub fn new(config: &TimeoutManagerConfig, logger: EventLogger) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                entries: DashMap::new(),
                next_generation: AtomicU64::new(0),
                logger,
                sweep_interval: config.sweep_interval(),
                max_age: config.max_age(),
                sweeper: Mutex::new(None),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Run `callback` after `delay` unless the key is cleared or replaced first.
    ///
    /// A live entry under `key` is cancelled before the new one is stored;
    /// its callback will not run. Must be called from within a Tokio runtime.
    /// Registrations after [`shutdown`](Self::shutdown) are refused with a warning.
    pub fn create_timeout<F, Fut, E>(
        &self,
        key: impl Into<String>,
        callback: F,
        delay: Duration,
        description: Option<&str>,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let key = key.into();
        if self.inner.stopped.load(Ordering::Acquire) {
            self.inner.logger.warn(
                "Timeout registered after shutdown, ignoring",
                Some(json!({ "key": key, "description": description })),
                Some(CONTEXT),
            );
            return;
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let description = description.map(str::to_string);

        // The shard lock is held from spawn to insert, so the task cannot
        // observe the key before its own entry is stored.
        let replaced = match self.inner.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let handle = self.spawn_timer(key.clone(), generation, delay, description.clone(), callback);
                let previous = occupied.insert(TimeoutEntry {
                    created_at: Instant::now(),
                    description: description.clone(),
                    generation,
                    handle,
                });
                previous.handle.abort();
                true
            }
            Entry::Vacant(vacant) => {
                let handle = self.spawn_timer(key.clone(), generation, delay, description.clone(), callback);
                vacant.insert(TimeoutEntry {
                    created_at: Instant::now(),
                    description: description.clone(),
                    generation,
                    handle,
                });
                false
            }
        };

        self.inner.logger.debug(
            if replaced { "Timeout replaced" } else { "Timeout created" },
            Some(json!({
                "key": key,
                "delayMs": duration_ms(delay),
                "description": description,
            })),
            Some(CONTEXT),
        );
    }

    fn spawn_timer<F, Fut, E>(
        &self,
        key: String,
        generation: u64,
        delay: Duration,
        description: Option<String>,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let registry: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            time::sleep(delay).await;

            let logger = {
                let Some(inner) = registry.upgrade() else {
                    return;
                };
                let owned = inner
                    .entries
                    .remove_if(&key, |_, entry| entry.generation == generation)
                    .is_some();
                if !owned {
                    return;
                }
                inner.logger.clone()
            };

            let outcome = AssertUnwindSafe(async move { callback().await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => logger.error(
                    "Timeout callback failed",
                    Some(json!({
                        "key": key,
                        "description": description,
                        "error": { "message": e.to_string() },
                    })),
                    Some(CONTEXT),
                ),
                Err(payload) => logger.error(
                    "Timeout callback panicked",
                    Some(json!({
                        "key": key,
                        "description": description,
                        "error": { "name": "panic", "message": panic_message(payload.as_ref()) },
                    })),
                    Some(CONTEXT),
                ),
            }
        })
    }

    /// Cancel and remove `key`. Returns whether an entry existed.
    pub fn clear_timeout(&self, key: &str) -> bool {
        match self.inner.entries.remove(key) {
            Some((_, entry)) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every key matching the regular expression `pattern`.
    pub fn clear_timeouts_matching(&self, pattern: &str) -> Result<usize, TimeoutError> {
        let matcher = Regex::new(pattern).map_err(|source| TimeoutError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;

        let mut cleared = 0;
        self.inner.entries.retain(|key, entry| {
            if matcher.is_match(key) {
                entry.handle.abort();
                cleared += 1;
                false
            } else {
                true
            }
        });

        if cleared > 0 {
            self.inner.logger.debug(
                "Timeouts cleared by pattern",
                Some(json!({ "pattern": pattern, "cleared": cleared })),
                Some(CONTEXT),
            );
        }
        Ok(cleared)
    }

    pub fn active_count(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn stats(&self) -> TimeoutStats {
        let now = Instant::now();
        let mut stats = TimeoutStats::default();
        let mut oldest: Option<(Duration, OldestTimeout)> = None;

        for entry in self.inner.entries.iter() {
            let age = now.saturating_duration_since(entry.created_at);
            stats.active += 1;
            stats.by_age.add(age);

            if oldest.as_ref().map_or(true, |(max, _)| age > *max) {
                oldest = Some((
                    age,
                    OldestTimeout {
                        key: entry.key().clone(),
                        description: entry.description.clone(),
                        age_ms: duration_ms(age),
                    },
                ));
            }
        }

        stats.oldest = oldest.map(|(_, entry)| entry);
        stats
    }

    /// Force-cancel entries older than `max_age`. Returns how many were cancelled.
    pub fn sweep_stale(&self) -> usize {
        self.inner.sweep_stale()
    }

    /// Start the periodic sweep. Calling it again, or after shutdown, does nothing.
    pub fn start(&self) {
        if self.inner.stopped.load(Ordering::Acquire) {
            return;
        }
        let mut sweeper = self.inner.lock_sweeper();
        if sweeper.is_some() {
            return;
        }

        let registry = Arc::downgrade(&self.inner);
        let period = self.inner.sweep_interval.max(Duration::from_millis(1));
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match registry.upgrade() {
                    Some(inner) => {
                        inner.sweep_stale();
                    }
                    None => break,
                }
            }
        }));

        self.inner.logger.debug(
            "Timeout sweep started",
            Some(json!({
                "intervalMs": duration_ms(period),
                "maxAgeMs": duration_ms(self.inner.max_age),
            })),
            Some(CONTEXT),
        );
    }

    /// Stop the sweep and cancel every entry. Only the first call does any work;
    /// it returns the number of entries cancelled.
    pub fn shutdown(&self) -> usize {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return 0;
        }

        if let Some(sweeper) = self.inner.lock_sweeper().take() {
            sweeper.abort();
        }
        let cancelled = self.inner.cancel_all();

        self.inner.logger.info(
            "Timeout manager stopped",
            Some(json!({ "cancelled": cancelled })),
            Some(CONTEXT),
        );
        cancelled
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }
}

impl ManagerInner {
    fn sweep_stale(&self) -> usize {
        let now = Instant::now();
        let stale: Vec<(String, u64)> = self
            .entries
            .iter()
            .filter(|entry| now.saturating_duration_since(entry.created_at) > self.max_age)
            .map(|entry| (entry.key().clone(), entry.generation))
            .collect();

        let mut cancelled = 0;
        for (key, generation) in stale {
            let Some((_, entry)) = self
                .entries
                .remove_if(&key, |_, entry| entry.generation == generation)
            else {
                continue;
            };
            entry.handle.abort();
            cancelled += 1;

            self.logger.warn(
                "Stale timeout force-cancelled",
                Some(json!({
                    "key": key,
                    "description": entry.description,
                    "ageMs": duration_ms(now.saturating_duration_since(entry.created_at)),
                    "maxAgeMs": duration_ms(self.max_age),
                })),
                Some(CONTEXT),
            );
        }

        if cancelled > 0 {
            self.logger.info(
                "Stale timeout sweep finished",
                Some(json!({ "cancelled": cancelled, "remaining": self.entries.len() })),
                Some(CONTEXT),
            );
        }
        cancelled
    }

    fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        self.entries.retain(|_, entry| {
            entry.handle.abort();
            cancelled += 1;
            false
        });
        cancelled
    }

    fn lock_sweeper(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.sweeper.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if let Some(sweeper) = self.lock_sweeper().take() {
            sweeper.abort();
        }
        for entry in self.entries.iter() {
            entry.handle.abort();
        }
    }
}

impl fmt::Debug for TimeoutManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutManager")
            .field("active", &self.inner.entries.len())
            .field("max_age", &self.inner.max_age)
            .field("stopped", &self.inner.stopped.load(Ordering::Relaxed))
            .finish()
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
