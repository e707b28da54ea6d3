//! Reactive Runtime
//!
//! The runtime is the registry that connects sources (signals, memos) with
//! the computations that read them (memos, watchers). It is the dependency
//! engine the scheduler sits on top of, and it only offers two services to
//! the rest of the crate:
//!
//! 1. Recording that the running computation read a source.
//! 2. Fanning a source change out to every live subscriber of that source.
//!
//! What a subscriber does when notified (mark itself dirty, run inline,
//! enqueue a job) is entirely up to its [`Reactive`] implementation.
//!
//! # Thread Safety
//!
//! The registry is process-wide and lives in concurrent maps so signals can
//! be shared across threads. Notification never holds a map guard while a
//! subscriber runs, so subscribers are free to read, write and re-subscribe.

use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use indexmap::IndexSet;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::subscriber::{SourceId, SubscriberId};

/// A trait for computations that can be notified when dependencies change.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this computation.
    fn subscriber_id(&self) -> SubscriberId;

    /// Called when one of the sources this computation read has changed.
    fn notify(&self);
}

/// Handle to a registered reactive computation.
///
/// Dropping this handle unregisters the computation from the runtime.
#[derive(Debug)]
pub struct ReactiveHandle {
    subscriber_id: SubscriberId,
}

impl ReactiveHandle {
    /// The subscriber this handle keeps registered.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.subscriber_id);
    }
}

/// The global reactive runtime.
pub struct Runtime;

// Maps subscriber IDs to weak references so the registry never keeps a
// computation alive on its own.
static REGISTRY: OnceLock<DashMap<SubscriberId, Weak<dyn Reactive>>> = OnceLock::new();
static SOURCE_SUBSCRIBERS: OnceLock<DashMap<SourceId, IndexSet<SubscriberId>>> = OnceLock::new();
static SUBSCRIBER_SOURCES: OnceLock<DashMap<SubscriberId, SmallVec<[SourceId; 4]>>> =
    OnceLock::new();

fn registry() -> &'static DashMap<SubscriberId, Weak<dyn Reactive>> {
    REGISTRY.get_or_init(DashMap::new)
}

fn source_subscribers() -> &'static DashMap<SourceId, IndexSet<SubscriberId>> {
    SOURCE_SUBSCRIBERS.get_or_init(DashMap::new)
}

fn subscriber_sources() -> &'static DashMap<SubscriberId, SmallVec<[SourceId; 4]>> {
    SUBSCRIBER_SOURCES.get_or_init(DashMap::new)
}

impl Runtime {
    /// Register a reactive computation with the runtime.
    ///
    /// Returns a handle that unregisters the computation when dropped.
    pub fn register<R>(reactive: &Arc<R>) -> ReactiveHandle
    where
        R: Reactive + 'static,
    {
        let id = reactive.subscriber_id();
        let weak: Weak<R> = Arc::downgrade(reactive);
        let weak: Weak<dyn Reactive> = weak;
        registry().insert(id, weak);

        ReactiveHandle { subscriber_id: id }
    }

    /// Unregister a computation and drop all of its dependency edges.
    fn unregister(id: SubscriberId) {
        registry().remove(&id);
        Self::clear_dependencies(id);
    }

    /// Whether a subscriber is currently registered.
    pub fn is_registered(id: SubscriberId) -> bool {
        registry().contains_key(&id)
    }

    /// Record a read of `source` by the running computation, if any.
    pub fn track_read(source: SourceId) {
        if let Some(subscriber_id) = ReactiveContext::current_subscriber() {
            ReactiveContext::track_dependency(source);
            Self::add_dependency(source, subscriber_id);
        }
    }

    /// Record that a subscriber depends on a source.
    pub fn add_dependency(source: SourceId, subscriber_id: SubscriberId) {
        let inserted = source_subscribers()
            .entry(source)
            .or_default()
            .insert(subscriber_id);

        if inserted {
            subscriber_sources()
                .entry(subscriber_id)
                .or_default()
                .push(source);
        }
    }

    /// Remove all dependencies for a subscriber.
    ///
    /// Called before re-running a computation to clear stale dependencies.
    pub fn clear_dependencies(subscriber_id: SubscriberId) {
        let Some((_, sources)) = subscriber_sources().remove(&subscriber_id) else {
            return;
        };

        for source in sources {
            let now_empty = match source_subscribers().get_mut(&source) {
                Some(mut subscribers) => {
                    subscribers.shift_remove(&subscriber_id);
                    subscribers.is_empty()
                }
                None => false,
            };
            if now_empty {
                source_subscribers().remove_if(&source, |_, subscribers| subscribers.is_empty());
            }
        }
    }

    /// Notify all subscribers that a source changed.
    ///
    /// Subscribers are notified in the order they first subscribed. The set
    /// is snapshotted up front: computations that subscribe while the
    /// fan-out is running are not notified for this change.
    pub fn notify_source_change(source: SourceId) {
        let subscriber_ids: Vec<SubscriberId> = match source_subscribers().get(&source) {
            Some(subscribers) => subscribers.iter().copied().collect(),
            None => return,
        };

        let targets: Vec<Arc<dyn Reactive>> = subscriber_ids
            .iter()
            .filter_map(|id| registry().get(id).and_then(|weak| weak.upgrade()))
            .collect();

        for target in targets {
            target.notify();
        }
    }

    /// Number of subscribers currently depending on `source`.
    pub fn subscriber_count(source: SourceId) -> usize {
        source_subscribers()
            .get(&source)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }

    /// Number of sources `subscriber_id` currently depends on.
    pub fn dependency_count(subscriber_id: SubscriberId) -> usize {
        subscriber_sources()
            .get(&subscriber_id)
            .map(|sources| sources.len())
            .unwrap_or(0)
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a tracking context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}
