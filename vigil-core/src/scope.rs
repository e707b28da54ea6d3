//! Effect Scopes
//!
//! An [`EffectScope`] collects the watches created on behalf of one owner
//! (typically one reactive object) so they can be stopped together.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, VigilError};
use crate::scheduler::Scheduler;
use crate::watch::{self, WatchHandle, WatchOptions, WatchSource};

struct ScopeInner {
    scheduler: Scheduler,
    active: AtomicBool,
    handles: Mutex<Vec<WatchHandle>>,
}

impl ScopeInner {
    fn stop(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let handles = std::mem::take(&mut *self.handles.lock());
        tracing::debug!(watches = handles.len(), "effect scope stopped");
        for handle in &handles {
            handle.stop();
        }
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A group of watches stopped as one.
///
/// Clones share the group. The scope stops when [`stop`](Self::stop) is
/// called or the last clone is dropped.
#[derive(Clone)]
pub struct EffectScope {
    inner: Arc<ScopeInner>,
}

impl EffectScope {
    /// An empty, active scope whose watches use `scheduler`.
    pub fn new(scheduler: &Scheduler) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                scheduler: scheduler.clone(),
                active: AtomicBool::new(true),
                handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Create a callback watch owned by this scope.
    pub fn watch<S, F>(&self, source: S, callback: F, options: WatchOptions) -> Result<()>
    where
        S: WatchSource,
        F: Fn(&S::Value, Option<&S::Value>) + Send + Sync + 'static,
    {
        self.ensure_active()?;
        self.adopt(watch::watch(self.scheduler(), source, callback, options))
    }

    /// Create an effect owned by this scope.
    pub fn watch_effect<F>(&self, flush: watch::FlushMode, effect: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.ensure_active()?;
        self.adopt(watch::watch_effect_with(self.scheduler(), flush, effect))
    }

    /// Take ownership of an existing watch.
    ///
    /// A stopped scope stops the handle and reports [`VigilError::ScopeStopped`].
    pub fn adopt(&self, handle: WatchHandle) -> Result<()> {
        let mut handles = self.inner.handles.lock();
        if !self.is_active() {
            drop(handles);
            handle.stop();
            return Err(VigilError::ScopeStopped);
        }
        handles.push(handle);
        Ok(())
    }

    /// Stop every watch in the scope. Idempotent.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Number of watches the scope owns.
    pub fn len(&self) -> usize {
        self.inner.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(VigilError::ScopeStopped)
        }
    }
}

impl fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScope")
            .field("active", &self.is_active())
            .field("watches", &self.len())
            .finish()
    }
}
