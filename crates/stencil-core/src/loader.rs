//! Component loader with single-flight caching
//!
//! Each key moves through `Absent -> Pending -> Resolved`, or back to
//! `Absent` when its load fails. A pending slot holds a subscription to the
//! in-flight load; attaching another caller is a receiver clone, so the
//! resolver runs at most once per key no matter how many callers wait.
//!
//! Resolution runs on a spawned task: a load nobody awaits still settles.
//! Every flight has an id drawn from a monotonic clock. When a flight
//! settles it only writes back if its slot is still its own, so a key
//! cleared mid-flight is never resurrected by the stale result.
//!
//! The cache lock is never held across an `.await`.

use crate::component::{Component, ComponentResolver};
use crate::error::{PreloadFailure, Result, TemplateError};
use crate::key::{Device, TemplateKey};
use crate::registry::{RegistryCell, TemplateQuery};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Per-call load options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Resolve again as if nothing were cached
    ///
    /// The result still populates the cache, first resolution wins: a key
    /// that is already resolved when the bypass finishes keeps its cached
    /// component, and the bypassing caller receives its own fresh one.
    pub bypass_cache: bool,
}

impl LoadOptions {
    pub fn bypass() -> Self {
        Self { bypass_cache: true }
    }
}

/// Outcome of a batch preload that did not fail outright
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreloadReport {
    pub loaded: Vec<TemplateKey>,
    pub failures: Vec<PreloadFailure>,
}

impl PreloadReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

type Outcome = Option<Result<Arc<Component>>>;

enum Slot {
    Pending {
        flight: u64,
        outcome: watch::Receiver<Outcome>,
    },
    Resolved {
        component: Arc<Component>,
        last_used: u64,
    },
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<TemplateKey, Slot>,
    clock: u64,
    cleared_at: HashMap<TemplateKey, u64>,
    cleared_all_at: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn cleared_since(&self, key: &TemplateKey, flight: u64) -> bool {
        let mark = self
            .cleared_at
            .get(key)
            .copied()
            .unwrap_or(0)
            .max(self.cleared_all_at);
        mark > flight
    }

    fn owns(&self, key: &TemplateKey, flight: u64) -> bool {
        matches!(self.slots.get(key), Some(Slot::Pending { flight: f, .. }) if *f == flight)
    }

    fn evict_over(&mut self, max_cached: Option<usize>) {
        let Some(max) = max_cached else {
            return;
        };
        loop {
            let resolved: Vec<(&TemplateKey, u64)> = self
                .slots
                .iter()
                .filter_map(|(key, slot)| match slot {
                    Slot::Resolved { last_used, .. } => Some((key, *last_used)),
                    Slot::Pending { .. } => None,
                })
                .collect();
            if resolved.len() <= max {
                return;
            }
            let Some(oldest) = resolved
                .into_iter()
                .min_by_key(|(_, last_used)| *last_used)
                .map(|(key, _)| key.clone())
            else {
                return;
            };
            debug!("Evicting least recently used template {}", oldest);
            self.slots.remove(&oldest);
        }
    }
}

/// Resolves and caches components for registry keys
pub struct Loader<R> {
    registry: Arc<RegistryCell>,
    resolver: Arc<R>,
    state: Arc<Mutex<CacheState>>,
    max_cached: Option<usize>,
}

impl<R> Clone for Loader<R> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            resolver: Arc::clone(&self.resolver),
            state: Arc::clone(&self.state),
            max_cached: self.max_cached,
        }
    }
}

fn lock(state: &Mutex<CacheState>) -> MutexGuard<'_, CacheState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases a flight's pending slot when its task is dropped unsettled
///
/// Happens when the runtime that spawned the flight shuts down mid-load.
struct FlightGuard {
    shared: Arc<Mutex<CacheState>>,
    key: TemplateKey,
    flight: u64,
    settled: bool,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = lock(&self.shared);
        if state.owns(&self.key, self.flight) {
            state.slots.remove(&self.key);
            debug!("Abandoned flight {} for {}", self.flight, self.key);
        }
    }
}

impl<R: ComponentResolver> Loader<R> {
    pub fn new(registry: Arc<RegistryCell>, resolver: Arc<R>) -> Self {
        Self {
            registry,
            resolver,
            state: Arc::new(Mutex::new(CacheState::default())),
            max_cached: None,
        }
    }

    /// Keep at most `max` resolved components, evicting least recently used
    pub fn with_max_cached(mut self, max: Option<usize>) -> Self {
        self.max_cached = max;
        self
    }

    pub async fn load(
        &self,
        category: &str,
        device: Device,
        name: &str,
        options: LoadOptions,
    ) -> Result<Arc<Component>> {
        let key = TemplateKey::new(category, device, name)?;
        self.load_key(&key, options).await
    }

    pub async fn load_key(&self, key: &TemplateKey, options: LoadOptions) -> Result<Arc<Component>> {
        let outcome = {
            let mut state = lock(&self.state);
            let now = state.tick();
            if options.bypass_cache {
                self.start_flight(&mut state, key, true)?
            } else {
                match state.slots.get_mut(key) {
                    Some(Slot::Resolved {
                        component,
                        last_used,
                    }) => {
                        *last_used = now;
                        return Ok(Arc::clone(component));
                    }
                    Some(Slot::Pending { outcome, .. }) => {
                        debug!("Joining in-flight load of {}", key);
                        outcome.clone()
                    }
                    None => self.start_flight(&mut state, key, false)?,
                }
            }
        };
        Self::wait(outcome, key).await
    }

    /// Load and discard, warming the cache
    pub async fn preload(&self, category: &str, device: Device, name: &str) -> Result<()> {
        self.load(category, device, name, LoadOptions::default())
            .await
            .map(|_| ())
    }

    /// Preload every key concurrently
    ///
    /// Individual failures are logged and collected in the report. The batch
    /// only fails when every member failed; an empty batch succeeds.
    pub async fn preload_batch(&self, keys: &[TemplateKey]) -> Result<PreloadReport> {
        let mut tasks = JoinSet::new();
        for (idx, key) in keys.iter().cloned().enumerate() {
            let loader = self.clone();
            tasks.spawn(async move {
                let result = loader.load_key(&key, LoadOptions::default()).await;
                (idx, key, result)
            });
        }

        let mut settled: Vec<Option<(TemplateKey, Result<Arc<Component>>)>> =
            (0..keys.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, key, result)) => settled[idx] = Some((key, result)),
                Err(e) => warn!("Preload task aborted: {}", e),
            }
        }

        let mut report = PreloadReport::default();
        for (idx, slot) in settled.into_iter().enumerate() {
            match slot {
                Some((key, Ok(_))) => report.loaded.push(key),
                Some((key, Err(error))) => {
                    warn!("Preload of {} failed: {}", key, error);
                    report.failures.push(PreloadFailure {
                        key: key.to_string(),
                        error,
                    });
                }
                None => {
                    let key = keys[idx].to_string();
                    report.failures.push(PreloadFailure {
                        error: TemplateError::LoadFailed {
                            key: key.clone(),
                            message: "preload task aborted".to_string(),
                        },
                        key,
                    });
                }
            }
        }

        if !keys.is_empty() && report.loaded.is_empty() {
            return Err(TemplateError::BatchFailed {
                failures: report.failures,
            });
        }
        Ok(report)
    }

    /// Preload every registry entry matching `query`
    pub async fn preload_by_filter(&self, query: &TemplateQuery) -> Result<PreloadReport> {
        let keys: Vec<TemplateKey> = self
            .registry
            .current()
            .query(query)
            .iter()
            .map(|entry| entry.key.clone())
            .collect();
        self.preload_batch(&keys).await
    }

    /// Drop matching cache entries; `None` matches anything
    ///
    /// In-flight loads keep running for their current callers but will not
    /// repopulate a cleared key. The registry is untouched.
    pub fn clear_cache(&self, category: Option<&str>, device: Option<Device>, name: Option<&str>) -> usize {
        let mut state = lock(&self.state);
        let mark = state.tick();

        if category.is_none() && device.is_none() && name.is_none() {
            let removed = state.slots.len();
            state.slots.clear();
            state.cleared_at.clear();
            state.cleared_all_at = mark;
            debug!("Cleared loader cache ({} entries)", removed);
            return removed;
        }

        let matching: Vec<TemplateKey> = state
            .slots
            .keys()
            .filter(|key| {
                category.map_or(true, |c| key.category() == c)
                    && device.map_or(true, |d| key.device() == d)
                    && name.map_or(true, |n| key.name() == n)
            })
            .cloned()
            .collect();
        for key in &matching {
            state.slots.remove(key);
            state.cleared_at.insert(key.clone(), mark);
        }
        debug!("Cleared {} loader cache entries", matching.len());
        matching.len()
    }

    pub fn loaded_count(&self) -> usize {
        lock(&self.state)
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Resolved { .. }))
            .count()
    }

    pub fn loading_count(&self) -> usize {
        lock(&self.state)
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Pending { .. }))
            .count()
    }

    /// Keys with a resolved component, sorted
    pub fn loaded_keys(&self) -> Vec<TemplateKey> {
        let mut keys: Vec<TemplateKey> = lock(&self.state)
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Resolved { .. }))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn is_loaded(&self, key: &TemplateKey) -> bool {
        matches!(lock(&self.state).slots.get(key), Some(Slot::Resolved { .. }))
    }

    /// Register a flight and spawn its resolution
    ///
    /// A bypass flight only claims the slot when the key is absent.
    fn start_flight(
        &self,
        state: &mut CacheState,
        key: &TemplateKey,
        bypass: bool,
    ) -> Result<watch::Receiver<Outcome>> {
        let entry = self
            .registry
            .current()
            .get(key)
            .ok_or_else(|| TemplateError::TemplateNotFound {
                key: key.to_string(),
            })?;

        let flight = state.tick();
        let (tx, rx) = watch::channel(None);
        if !state.slots.contains_key(key) {
            state.slots.insert(
                key.clone(),
                Slot::Pending {
                    flight,
                    outcome: rx.clone(),
                },
            );
        }
        debug!("Loading {} (flight {}, bypass {})", key, flight, bypass);

        let resolver = Arc::clone(&self.resolver);
        let shared = Arc::clone(&self.state);
        let max_cached = self.max_cached;
        let key = key.clone();
        let mut guard = FlightGuard {
            shared: Arc::clone(&shared),
            key: key.clone(),
            flight,
            settled: false,
        };
        tokio::spawn(async move {
            let _ = &guard;
            let task_key = key.clone();
            let loadable = entry.metadata.loadable.clone();
            let resolved = tokio::spawn(async move { resolver.resolve(&task_key, &loadable).await }).await;
            let outcome = match resolved {
                Ok(Ok(component)) => Ok(component),
                Ok(Err(e)) => Err(TemplateError::LoadFailed {
                    key: key.to_string(),
                    message: format!("{:#}", e),
                }),
                Err(e) => Err(TemplateError::LoadFailed {
                    key: key.to_string(),
                    message: format!("resolver task aborted: {}", e),
                }),
            };
            Self::settle(&shared, &key, flight, bypass, &outcome, max_cached);
            guard.settled = true;
            // Receivers may all be gone; the cache write above is what matters then
            let _ = tx.send(Some(outcome));
        });

        Ok(rx)
    }

    fn settle(
        shared: &Mutex<CacheState>,
        key: &TemplateKey,
        flight: u64,
        bypass: bool,
        outcome: &Result<Arc<Component>>,
        max_cached: Option<usize>,
    ) {
        let mut state = lock(shared);
        let owned = state.owns(key, flight);

        match outcome {
            Ok(component) => {
                let promote = if owned {
                    true
                } else if bypass && !state.cleared_since(key, flight) {
                    !matches!(state.slots.get(key), Some(Slot::Resolved { .. }))
                } else {
                    false
                };

                if promote {
                    let now = state.tick();
                    state.slots.insert(
                        key.clone(),
                        Slot::Resolved {
                            component: Arc::clone(component),
                            last_used: now,
                        },
                    );
                    debug!("Loaded {} (flight {})", key, flight);
                    state.evict_over(max_cached);
                } else {
                    debug!("Discarding result of superseded flight {} for {}", flight, key);
                }
            }
            Err(error) => {
                if owned {
                    state.slots.remove(key);
                }
                debug!("Load of {} failed (flight {}): {}", key, flight, error);
            }
        }
    }

    async fn wait(mut outcome: watch::Receiver<Outcome>, key: &TemplateKey) -> Result<Arc<Component>> {
        let aborted = || TemplateError::LoadFailed {
            key: key.to_string(),
            message: "load abandoned before settling".to_string(),
        };
        let settled = outcome
            .wait_for(Option::is_some)
            .await
            .map_err(|_| aborted())?;
        match settled.as_ref() {
            Some(result) => result.clone(),
            None => Err(aborted()),
        }
    }
}
