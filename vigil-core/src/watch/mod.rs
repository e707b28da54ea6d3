//! Watch Binding
//!
//! Connects the dependency engine to the scheduler. A watch subscribes to
//! whatever its source (or effect) reads and, when any of it changes, runs
//! according to its [`FlushMode`]:
//!
//! | Mode   | First run                     | Later runs                    |
//! |--------|-------------------------------|-------------------------------|
//! | `Sync` | inline, at creation           | inline, inside the write      |
//! | `Pre`  | inline, at creation           | main queue, next flush        |
//! | `Post` | inline (callback watches) or post queue (effects) | post-flush queue |
//!
//! Two shapes exist:
//!
//! - **Effects** ([`watch_effect`] and friends): a tracked function that
//!   re-runs as a whole. Their jobs may not re-queue themselves.
//! - **Callback watches** ([`watch`]): a tracked [`WatchSource`] plus an
//!   untracked callback that receives the new and previous value and only
//!   fires when the value changed. Their jobs may re-queue themselves, so a
//!   callback that writes its own source is observed in the same flush.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use vigil_core::reactive::Signal;
//! use vigil_core::scheduler::Scheduler;
//! use vigil_core::watch::{watch, WatchOptions};
//!
//! let scheduler = Scheduler::new();
//! let count = Signal::new(0);
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let _handle = watch(&scheduler, count.clone(), {
//!     let seen = seen.clone();
//!     move |new: &i32, old: Option<&i32>| seen.lock().unwrap().push((*new, old.copied()))
//! }, WatchOptions::default());
//!
//! count.set(1);
//! count.set(2);
//! assert!(seen.lock().unwrap().is_empty());
//!
//! scheduler.flush();
//! assert_eq!(*seen.lock().unwrap(), vec![(2, Some(0))]);
//! ```

mod source;
mod watcher;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use source::{getter, Getter, WatchSource};

use crate::scheduler::{JobRef, Scheduler};
use watcher::{CallbackRunner, EffectRunner, RunMode, Watcher};

/// When a triggered watch runs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Batched on the main queue.
    #[default]
    Pre,
    /// Batched on the post-flush queue, after every main-queue job.
    Post,
    /// Inline, in the call stack of the write.
    Sync,
}

/// Options for [`watch`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    pub flush: FlushMode,
    /// Fire the callback once at creation, with no previous value.
    pub immediate: bool,
    /// Stop the watch after the callback fires the first time.
    pub once: bool,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flush(mut self, flush: FlushMode) -> Self {
        self.flush = flush;
        self
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }
}

impl From<FlushMode> for WatchOptions {
    fn from(flush: FlushMode) -> Self {
        Self::new().flush(flush)
    }
}

/// Controls a running watch.
///
/// Dropping the handle stops the watch.
#[must_use = "dropping a WatchHandle stops the watch"]
pub struct WatchHandle {
    watcher: Arc<Watcher>,
}

impl WatchHandle {
    /// Stop the watch for good. Idempotent.
    ///
    /// A job already sitting in a queue still runs, as a no-op.
    pub fn stop(&self) {
        self.watcher.stop();
    }

    /// Suspend the watch. Triggers that arrive while paused are remembered
    /// and replayed once by [`resume`](Self::resume).
    pub fn pause(&self) {
        self.watcher.pause();
    }

    pub fn resume(&self) {
        self.watcher.resume();
    }

    pub fn is_active(&self) -> bool {
        self.watcher.is_active()
    }

    pub fn is_paused(&self) -> bool {
        self.watcher.is_paused()
    }

    pub fn flush_mode(&self) -> FlushMode {
        self.watcher.flush_mode()
    }

    /// The job the watch queues when triggered.
    pub fn job(&self) -> JobRef {
        Arc::clone(self.watcher.job())
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.watcher.stop();
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("watcher", &self.watcher)
            .finish()
    }
}

/// Watch `source` and call `callback(new, previous)` whenever its value
/// changes.
///
/// The source is read once at creation to collect dependencies. With
/// `immediate` the callback also fires then, with no previous value.
pub fn watch<S, F>(
    scheduler: &Scheduler,
    source: S,
    callback: F,
    options: WatchOptions,
) -> WatchHandle
where
    S: WatchSource,
    F: Fn(&S::Value, Option<&S::Value>) + Send + Sync + 'static,
{
    let watcher = Watcher::spawn(
        scheduler,
        options.flush,
        options.once,
        true,
        Box::new(CallbackRunner::new(source, callback)),
    );

    let mode = if options.immediate {
        RunMode::Immediate
    } else {
        RunMode::Prime
    };
    watcher.run(mode);

    WatchHandle { watcher }
}

/// Run `effect` now and again (batched on the main queue) whenever
/// anything it read changes.
pub fn watch_effect<F>(scheduler: &Scheduler, effect: F) -> WatchHandle
where
    F: Fn() + Send + Sync + 'static,
{
    watch_effect_with(scheduler, FlushMode::Pre, effect)
}

/// Like [`watch_effect`], but every run, including the first, happens on
/// the post-flush queue.
pub fn watch_post_effect<F>(scheduler: &Scheduler, effect: F) -> WatchHandle
where
    F: Fn() + Send + Sync + 'static,
{
    watch_effect_with(scheduler, FlushMode::Post, effect)
}

/// Like [`watch_effect`], but re-runs inline inside the triggering write.
pub fn watch_sync_effect<F>(scheduler: &Scheduler, effect: F) -> WatchHandle
where
    F: Fn() + Send + Sync + 'static,
{
    watch_effect_with(scheduler, FlushMode::Sync, effect)
}

/// An effect with an explicit flush mode.
pub fn watch_effect_with<F>(scheduler: &Scheduler, flush: FlushMode, effect: F) -> WatchHandle
where
    F: Fn() + Send + Sync + 'static,
{
    let watcher = Watcher::spawn(
        scheduler,
        flush,
        false,
        false,
        Box::new(EffectRunner::new(effect)),
    );

    match flush {
        FlushMode::Post => watcher.schedule_post(),
        FlushMode::Pre | FlushMode::Sync => watcher.run(RunMode::Prime),
    }

    WatchHandle { watcher }
}
