//! Watcher internals.
//!
//! A watcher is the subscriber the runtime notifies. It owns exactly one
//! job for its whole lifetime and decides, per [`FlushMode`], whether a
//! notification runs inline or goes through the scheduler.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::source::WatchSource;
use super::FlushMode;
use crate::reactive::{untracked, Reactive, ReactiveContext, ReactiveHandle, Runtime, SubscriberId};
use crate::scheduler::{Job, JobRef, Scheduler};

/// Why the watcher body is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RunMode {
    /// First run of a callback watch: collect dependencies and remember the
    /// value, no callback.
    Prime,
    /// First run of an `immediate` callback watch: the callback fires with
    /// no previous value.
    Immediate,
    /// A dependency changed.
    Triggered,
}

/// The body of a watcher.
pub(super) trait Runner: Send + Sync {
    /// Run once. Returns whether a user callback fired.
    fn run(&self, subscriber: SubscriberId, mode: RunMode) -> bool;
}

/// Re-collect `subscriber`'s dependencies while running `f`.
fn tracked<R>(subscriber: SubscriberId, f: impl FnOnce() -> R) -> R {
    Runtime::clear_dependencies(subscriber);
    let _ctx = ReactiveContext::enter(subscriber);
    f()
}

/// A bare effect: the tracked function is the whole body.
pub(super) struct EffectRunner<F> {
    effect: F,
}

impl<F> EffectRunner<F> {
    pub(super) fn new(effect: F) -> Self {
        Self { effect }
    }
}

impl<F> Runner for EffectRunner<F>
where
    F: Fn() + Send + Sync + 'static,
{
    fn run(&self, subscriber: SubscriberId, _mode: RunMode) -> bool {
        tracked(subscriber, &self.effect);
        true
    }
}

/// A source plus a callback fired when the source's value changes.
pub(super) struct CallbackRunner<S, C>
where
    S: WatchSource,
{
    source: S,
    callback: C,
    previous: Mutex<Option<S::Value>>,
}

impl<S, C> CallbackRunner<S, C>
where
    S: WatchSource,
{
    pub(super) fn new(source: S, callback: C) -> Self {
        Self {
            source,
            callback,
            previous: Mutex::new(None),
        }
    }
}

impl<S, C> Runner for CallbackRunner<S, C>
where
    S: WatchSource,
    C: Fn(&S::Value, Option<&S::Value>) + Send + Sync + 'static,
{
    fn run(&self, subscriber: SubscriberId, mode: RunMode) -> bool {
        let current = tracked(subscriber, || self.source.read());

        // Stored before the callback runs: a sync watch re-entered by its
        // own callback must compare against this value.
        let previous = self.previous.lock().replace(current.clone());

        match mode {
            RunMode::Prime => false,
            RunMode::Triggered if previous.as_ref() == Some(&current) => false,
            RunMode::Immediate | RunMode::Triggered => {
                untracked(|| (self.callback)(&current, previous.as_ref()));
                true
            }
        }
    }
}

pub(super) struct Watcher {
    subscriber_id: SubscriberId,
    scheduler: Scheduler,
    flush: FlushMode,
    once: bool,
    job: JobRef,
    runner: Box<dyn Runner>,
    active: AtomicBool,
    paused: AtomicBool,
    /// A trigger arrived while paused.
    pending: AtomicBool,
    /// The body is on the stack.
    running: AtomicBool,
    registration: Mutex<Option<ReactiveHandle>>,
}

impl Watcher {
    /// Build and register a watcher. Nothing runs yet.
    pub(super) fn spawn(
        scheduler: &Scheduler,
        flush: FlushMode,
        once: bool,
        allow_recurse: bool,
        runner: Box<dyn Runner>,
    ) -> Arc<Self> {
        let watcher = Arc::new_cyclic(|weak: &Weak<Watcher>| {
            let weak = weak.clone();
            let job = Job::new(move || {
                if let Some(watcher) = weak.upgrade() {
                    watcher.run(RunMode::Triggered);
                }
            })
            .allow_recurse(allow_recurse)
            .into_ref();

            Watcher {
                subscriber_id: SubscriberId::new(),
                scheduler: scheduler.clone(),
                flush,
                once,
                job,
                runner,
                active: AtomicBool::new(true),
                paused: AtomicBool::new(false),
                pending: AtomicBool::new(false),
                running: AtomicBool::new(false),
                registration: Mutex::new(None),
            }
        });

        let registration = Runtime::register(&watcher);
        *watcher.registration.lock() = Some(registration);
        tracing::trace!(watcher = ?watcher.subscriber_id, flush = ?flush, "watcher armed");
        watcher
    }

    pub(super) fn job(&self) -> &JobRef {
        &self.job
    }

    pub(super) fn flush_mode(&self) -> FlushMode {
        self.flush
    }

    /// Run the body now, unless stopped or paused.
    pub(super) fn run(&self, mode: RunMode) {
        if !self.is_active() {
            return;
        }
        if self.is_paused() {
            self.pending.store(true, Ordering::Release);
            return;
        }

        let fired = {
            let _running = RunningGuard::enter(&self.running);
            self.runner.run(self.subscriber_id, mode)
        };

        if fired && self.once {
            self.stop();
        }
        // Stopped from inside its own body: drop what the body just tracked.
        if !self.is_active() {
            Runtime::clear_dependencies(self.subscriber_id);
        }
    }

    /// React to a dependency change according to the flush mode.
    fn trigger(&self) {
        if !self.is_active() {
            return;
        }
        if self.is_paused() {
            self.pending.store(true, Ordering::Release);
            return;
        }
        // Writes made by the body itself are not a reason to run it again,
        // unless the job opted into recursion.
        if self.running.load(Ordering::Acquire) && !self.job.allows_recurse() {
            tracing::trace!(watcher = ?self.subscriber_id, "trigger ignored while running");
            return;
        }

        match self.flush {
            FlushMode::Sync => self.run(RunMode::Triggered),
            FlushMode::Pre => self.scheduler.enqueue(&self.job),
            FlushMode::Post => self.scheduler.enqueue_post(Arc::clone(&self.job)),
        }
    }

    /// Queue the watcher's job on the post-flush queue.
    pub(super) fn schedule_post(&self) {
        self.scheduler.enqueue_post(Arc::clone(&self.job));
    }

    pub(super) fn stop(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let registration = self.registration.lock().take();
        drop(registration);
        tracing::trace!(watcher = ?self.subscriber_id, "watcher stopped");
    }

    pub(super) fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub(super) fn resume(&self) {
        if !self.paused.swap(false, Ordering::AcqRel) {
            return;
        }
        if self.pending.swap(false, Ordering::AcqRel) {
            self.trigger();
        }
    }

    pub(super) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(super) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

/// Marks a watcher as running and restores the previous state on drop, so a
/// panicking body does not leave the flag set.
struct RunningGuard<'a> {
    flag: &'a AtomicBool,
    previous: bool,
}

impl<'a> RunningGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        let previous = flag.swap(true, Ordering::AcqRel);
        Self { flag, previous }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::Release);
    }
}

impl Reactive for Watcher {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn notify(&self) {
        self.trigger();
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("subscriber_id", &self.subscriber_id)
            .field("flush", &self.flush)
            .field("once", &self.once)
            .field("active", &self.is_active())
            .field("paused", &self.is_paused())
            .field("running", &self.running.load(Ordering::Acquire))
            .field("job", &self.job.key())
            .finish()
    }
}
