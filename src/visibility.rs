//! Sentinel visibility tracking for infinite scroll.
//!
//! The render pass reports how much of each sentinel row is on screen to an
//! [`IntersectionObserver`]; a [`VisibilityTrigger`] registered for that
//! sentinel runs its callback when the sentinel crosses into view.
//!
//! A callback returns whether it accepted the event. Returning `false`
//! leaves the observation armed, so the next report while the sentinel is
//! still visible fires again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

type Callback = Arc<dyn Fn() -> bool + Send + Sync>;

/// Identifies a sentinel element across render passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SentinelId(pub &'static str);

#[derive(Debug, Clone, Copy)]
pub struct TriggerOptions {
    /// When false the trigger is created inert and never observes.
    pub has_more: bool,
    /// Visible fraction in (0, 1] that counts as "in view".
    pub threshold: f32,
}

impl Default for TriggerOptions {
    fn default() -> Self {
        Self {
            has_more: true,
            threshold: 1.0,
        }
    }
}

struct Observation {
    sentinel: SentinelId,
    threshold: f32,
    intersecting: bool,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    next_key: u64,
    observations: HashMap<u64, Observation>,
}

/// Collects visibility reports and dispatches transitions to triggers.
#[derive(Default)]
pub struct IntersectionObserver {
    registry: Mutex<Registry>,
}

impl IntersectionObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record that `visible_ratio` of `sentinel` is on screen.
    ///
    /// Each observation fires only on a transition from below its threshold
    /// to at-or-above it, in registration order. Returns the number of
    /// callbacks run.
    pub fn report(&self, sentinel: SentinelId, visible_ratio: f32) -> usize {
        let mut entered: Vec<(u64, Callback)> = {
            let mut registry = self.lock();
            registry
                .observations
                .iter_mut()
                .filter(|(_, o)| o.sentinel == sentinel)
                .filter_map(|(&key, o)| {
                    let now = visible_ratio >= o.threshold;
                    let entered = now && !o.intersecting;
                    o.intersecting = now;
                    entered.then(|| (key, Arc::clone(&o.callback)))
                })
                .collect()
        };
        entered.sort_unstable_by_key(|(key, _)| *key);

        // Callbacks run unlocked so they may cancel or start triggers; an
        // observation cancelled earlier in this batch is skipped.
        let mut fired = 0;
        for (key, callback) in entered {
            if !self.lock().observations.contains_key(&key) {
                continue;
            }
            fired += 1;
            if !callback() {
                if let Some(observation) = self.lock().observations.get_mut(&key) {
                    observation.intersecting = false;
                }
                tracing::debug!(
                    sentinel = sentinel.0,
                    key,
                    "Sentinel event refused, staying armed"
                );
            }
        }
        if fired > 0 {
            tracing::trace!(sentinel = sentinel.0, fired, "Sentinel entered view");
        }
        fired
    }

    /// Number of active observations.
    pub fn observed_count(&self) -> usize {
        self.lock().observations.len()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle for one sentinel observation. Dropping it cancels the observation.
pub struct VisibilityTrigger {
    observer: Weak<IntersectionObserver>,
    key: Option<u64>,
}

impl VisibilityTrigger {
    /// Begin observing `sentinel`, running `on_visible` each time it enters
    /// view. Returns an inert trigger when `options.has_more` is false.
    ///
    /// `on_visible` returns `false` to leave the observation armed.
    pub fn start<F>(
        observer: &Arc<IntersectionObserver>,
        sentinel: SentinelId,
        on_visible: F,
        options: TriggerOptions,
    ) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        if !options.has_more {
            tracing::debug!(sentinel = sentinel.0, "Nothing more to load, not observing");
            return Self {
                observer: Weak::new(),
                key: None,
            };
        }

        let mut registry = observer.lock();
        let key = registry.next_key;
        registry.next_key += 1;
        registry.observations.insert(
            key,
            Observation {
                sentinel,
                threshold: options.threshold,
                intersecting: false,
                callback: Arc::new(on_visible),
            },
        );
        tracing::debug!(sentinel = sentinel.0, key, "Observing sentinel");

        Self {
            observer: Arc::downgrade(observer),
            key: Some(key),
        }
    }

    pub fn is_active(&self) -> bool {
        match (self.key, self.observer.upgrade()) {
            (Some(key), Some(observer)) => observer.lock().observations.contains_key(&key),
            _ => false,
        }
    }

    /// Forget the last reported visibility so a sentinel that is still on
    /// screen fires again at the next report.
    pub fn rearm(&self) {
        if let (Some(key), Some(observer)) = (self.key, self.observer.upgrade()) {
            if let Some(observation) = observer.lock().observations.get_mut(&key) {
                observation.intersecting = false;
            }
        }
    }

    /// Stop observing. Idempotent.
    pub fn cancel(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        if let Some(observer) = self.observer.upgrade() {
            observer.lock().observations.remove(&key);
            tracing::debug!(key, "Stopped observing sentinel");
        }
    }
}

impl Drop for VisibilityTrigger {
    fn drop(&mut self) {
        self.cancel();
    }
}
