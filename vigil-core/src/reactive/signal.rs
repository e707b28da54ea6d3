//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/watch getter),
//!    the runtime registers that context as a subscriber.
//!
//! 2. When a signal's value changes, the runtime notifies every
//!    subscriber. Writing an equal value is not a change.
//!
//! 3. Each subscriber decides how to react: memos mark themselves dirty,
//!    watchers hand a job to the scheduler or run inline.
//!
//! # Thread Safety
//!
//! Signals are designed to be thread-safe. The value is protected by a
//! RwLock and the lock is never held while subscribers run.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::runtime::Runtime;
use super::subscriber::SourceId;

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Unique identifier for this signal.
    id: SourceId,

    /// The current value, shared between clones.
    value: Arc<RwLock<T>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            id: SourceId::new(),
            value: Arc::new(RwLock::new(value)),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        Runtime::track_read(self.id);
        self.value.read().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.value.read().clone()
    }

    /// Run `f` on the current value (tracked).
    ///
    /// `f` sees a snapshot taken before it runs, so it may write this signal.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let value = self.get();
        f(&value)
    }

    /// Set a new value and notify subscribers, whether or not it changed.
    pub fn set_and_notify(&self, value: T) {
        *self.value.write() = value;
        Runtime::notify_source_change(self.id);
    }

    /// Notify subscribers without touching the value.
    pub fn trigger(&self) {
        Runtime::notify_source_change(self.id);
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.id)
    }
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Set a new value. Subscribers are notified only if it differs from
    /// the current one.
    pub fn set(&self, value: T) {
        let changed = {
            let mut current = self.value.write();
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        };
        if changed {
            Runtime::notify_source_change(self.id);
        }
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.value.read();
            f(&guard)
        };
        self.set(new_value);
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Memo, ReactiveContext, SubscriberId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
    }

    #[test]
    fn tracked_read_registers_subscriber() {
        let signal = Signal::new(String::from("a"));
        let reader = SubscriberId::new();

        {
            let _ctx = ReactiveContext::enter(reader);
            assert_eq!(signal.with(|s| s.len()), 1);
        }
        assert_eq!(signal.subscriber_count(), 1);

        // Untracked reads never subscribe.
        let other = SubscriberId::new();
        {
            let _ctx = ReactiveContext::enter(other);
            signal.get_untracked();
        }
        assert_eq!(signal.subscriber_count(), 1);

        Runtime::clear_dependencies(reader);
    }

    #[test]
    fn equal_write_does_not_notify() {
        let signal = Signal::new(3);
        let computations = Arc::new(AtomicUsize::new(0));
        let tripled = {
            let signal = signal.clone();
            let computations = computations.clone();
            Memo::new(move || {
                computations.fetch_add(1, Ordering::SeqCst);
                signal.get() * 3
            })
        };
        assert_eq!(tripled.get(), 9);

        signal.set(3);
        signal.update(|v| *v);
        assert_eq!(tripled.get(), 9);
        assert_eq!(computations.load(Ordering::SeqCst), 1);

        signal.set_and_notify(3);
        assert_eq!(tripled.get(), 9);
        assert_eq!(computations.load(Ordering::SeqCst), 2);

        signal.trigger();
        assert_eq!(tripled.get(), 9);
        assert_eq!(computations.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn with_may_write_the_same_signal() {
        let signal = Signal::new(1);
        let seen = signal.with(|v| {
            signal.set(v + 1);
            *v
        });
        assert_eq!(seen, 1);
        assert_eq!(signal.get(), 2);
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = Signal::new(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }
}
