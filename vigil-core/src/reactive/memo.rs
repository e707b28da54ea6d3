//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result.
//!
//! 2. When accessed again, if no dependencies have changed, returns cached value.
//!
//! 3. When a dependency changes, the runtime notifies the memo. A clean memo
//!    turns dirty and forwards the notification to its own subscribers, so a
//!    watcher reading the memo is scheduled exactly like a watcher reading
//!    the underlying signals.
//!
//! 4. On next access, a dirty memo recomputes.
//!
//! The computation is never run while any memo lock is held, so memos can
//! read other memos freely.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::runtime::{Reactive, ReactiveHandle, Runtime};
use super::subscriber::{SourceId, SubscriberId};
use crate::error::{Result, VigilError};

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// The memo needs to recompute before its value can be read.
    Dirty,
}

type Compute<T> = dyn Fn() -> T + Send + Sync;
type Setter<T> = dyn Fn(T) + Send + Sync;

struct MemoInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Identity of the memo when it is read as a source.
    source_id: SourceId,

    /// Identity of the memo when it reads other sources.
    subscriber_id: SubscriberId,

    compute: Box<Compute<T>>,
    setter: Option<Box<Setter<T>>>,

    /// The cached value (None if never computed).
    value: RwLock<Option<T>>,
    state: RwLock<MemoState>,
}

impl<T> Reactive for MemoInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn notify(&self) {
        let became_dirty = {
            let mut state = self.state.write();
            let was_clean = *state == MemoState::Clean;
            *state = MemoState::Dirty;
            was_clean
        };

        // Only the clean -> dirty edge propagates; a dirty memo has already
        // told its subscribers.
        if became_dirty {
            Runtime::notify_source_change(self.source_id);
        }
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// Clones share the cache. The memo stays registered with the runtime until
/// the last clone is dropped.
pub struct Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<MemoInner<T>>,
    registration: Arc<ReactiveHandle>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new read-only memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(Box::new(compute), None)
    }

    /// Create a memo that also accepts writes, forwarded to `set`.
    pub fn writable<F, S>(compute: F, set: S) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        Self::build(Box::new(compute), Some(Box::new(set)))
    }

    fn build(compute: Box<Compute<T>>, setter: Option<Box<Setter<T>>>) -> Self {
        let inner = Arc::new(MemoInner {
            source_id: SourceId::new(),
            subscriber_id: SubscriberId::new(),
            compute,
            setter,
            value: RwLock::new(None),
            state: RwLock::new(MemoState::Dirty),
        });
        let registration = Arc::new(Runtime::register(&inner));

        Self {
            inner,
            registration,
        }
    }

    /// Get the memo's identity as a source.
    pub fn id(&self) -> SourceId {
        self.inner.source_id
    }

    /// Get the subscriber ID for this memo.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.registration.subscriber_id()
    }

    /// Get the current value, recomputing if necessary.
    pub fn get(&self) -> T {
        Runtime::track_read(self.inner.source_id);

        if *self.inner.state.read() == MemoState::Clean {
            if let Some(value) = self.inner.value.read().as_ref() {
                return value.clone();
            }
        }

        self.recompute()
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        super::context::untracked(|| self.get())
    }

    /// Write through the memo's setter.
    pub fn set(&self, value: T) -> Result<()> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => {
                tracing::warn!(memo = ?self.inner.source_id, "write to read-only memo ignored");
                Err(VigilError::ReadOnlyComputed)
            }
        }
    }

    /// Whether the memo accepts writes.
    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// Force the next read to recompute.
    pub fn mark_dirty(&self) {
        *self.inner.state.write() = MemoState::Dirty;
    }

    /// Run the computation within this memo's reactive context.
    fn recompute(&self) -> T {
        Runtime::clear_dependencies(self.inner.subscriber_id);

        let new_value = {
            let _ctx = ReactiveContext::enter(self.inner.subscriber_id);
            (self.inner.compute)()
        };

        *self.inner.value.write() = Some(new_value.clone());
        *self.inner.state.write() = MemoState::Clean;

        new_value
    }

    /// Get the current dirty state.
    pub fn state(&self) -> MemoState {
        *self.inner.state.read()
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Number of sources read during the last computation.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.subscriber_id)
    }

    /// Number of computations currently reading this memo.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.source_id)
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            registration: Arc::clone(&self.registration),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.source_id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
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
    use crate::reactive::Signal;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn memo_computes_on_first_access() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let memo = Memo::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert!(!memo.has_value());
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        assert_eq!(memo.get(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(memo.has_value());
    }

    #[test]
    fn memo_caches_value_when_clean() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let memo = Memo::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert_eq!(memo.get(), 42);
        assert_eq!(memo.get(), 42);
        assert_eq!(memo.get(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn memo_recomputes_after_signal_change() {
        let a = Signal::new(1);
        let b = Signal::new(2);

        let sum = Memo::new({
            let a = a.clone();
            let b = b.clone();
            move || a.get() + b.get()
        });

        assert_eq!(sum.get(), 3);
        assert_eq!(sum.state(), MemoState::Clean);
        assert_eq!(sum.dependency_count(), 2);

        a.set(10);
        assert_eq!(sum.state(), MemoState::Dirty);
        assert_eq!(sum.get(), 12);
        assert_eq!(sum.state(), MemoState::Clean);
    }

    #[test]
    fn memo_chain_propagates_dirtiness() {
        let base = Signal::new(5);
        let doubled = Memo::new({
            let base = base.clone();
            move || base.get() * 2
        });
        let plus_ten = Memo::new({
            let doubled = doubled.clone();
            move || doubled.get() + 10
        });

        assert_eq!(plus_ten.get(), 20);

        base.set(10);
        assert_eq!(doubled.state(), MemoState::Dirty);
        assert_eq!(plus_ten.state(), MemoState::Dirty);
        assert_eq!(plus_ten.get(), 30);
    }

    #[test]
    fn read_only_memo_rejects_writes() {
        let memo = Memo::new(|| 1);
        assert!(!memo.is_writable());
        assert_eq!(memo.set(2), Err(VigilError::ReadOnlyComputed));
    }

    #[test]
    fn writable_memo_forwards_to_setter() {
        let celsius = Signal::new(0.0_f64);
        let fahrenheit = Memo::writable(
            {
                let celsius = celsius.clone();
                move || celsius.get() * 9.0 / 5.0 + 32.0
            },
            {
                let celsius = celsius.clone();
                move |f: f64| celsius.set((f - 32.0) * 5.0 / 9.0)
            },
        );

        assert_eq!(fahrenheit.get(), 32.0);
        fahrenheit.set(212.0).unwrap();
        assert_eq!(celsius.get(), 100.0);
        assert_eq!(fahrenheit.get(), 212.0);
    }

    #[test]
    fn memo_clone_shares_state() {
        let memo1 = Memo::new(|| 42);
        assert_eq!(memo1.get(), 42);

        let memo2 = memo1.clone();
        assert_eq!(memo1.id(), memo2.id());
        assert!(memo2.has_value());

        memo1.mark_dirty();
        assert_eq!(memo2.state(), MemoState::Dirty);
    }
}
