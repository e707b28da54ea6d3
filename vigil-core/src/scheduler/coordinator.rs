//! Flush Coordinator
//!
//! [`Scheduler`] ties the queues, the flush ticket and the tick driver
//! together. It is a handle: clones share the same queues, and every
//! producer (watchers, hosts, tests) is given one explicitly.
//!
//! # Flush
//!
//! A flush repeats passes until both queues are empty:
//!
//! 1. Drain the main queue by index, letting jobs append more jobs.
//! 2. Release the main queue (clearing flags of anything left unvisited).
//! 3. Drain the post-flush queue.
//! 4. If either queue was refilled, go again with the same recursion
//!    counters; otherwise settle the ticket.
//!
//! Job callbacks run with no scheduler lock held, so they may enqueue,
//! read `next_tick`, or write signals freely.
//!
//! # Failures
//!
//! A panicking job does not wedge the scheduler. The unwind is caught, the
//! queues are cleaned up, the post queue still drains, the ticket still
//! settles, and then the first panic is resumed out of `flush`.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::{Mutex, MutexGuard};

use super::driver::{ManualDriver, TickDriver};
use super::guard::{RecursionGuard, Verdict};
use super::job::JobRef;
use super::queue::{JobQueues, PostDrain, PostJobs};
use super::ticket::{FlushTicket, NextTick};
use crate::config::SchedulerConfig;

type PanicPayload = Box<dyn Any + Send + 'static>;

/// Counters describing one call to [`Scheduler::flush`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushStats {
    /// Main + post passes performed.
    pub passes: usize,
    /// Main-queue jobs that ran.
    pub jobs_run: usize,
    /// Post-queue jobs that ran.
    pub post_jobs_run: usize,
    /// Occurrences skipped by the recursion guard.
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct State {
    queues: JobQueues,
    ticket: Option<FlushTicket>,
}

struct Inner {
    config: SchedulerConfig,
    state: Mutex<State>,
    flushing: AtomicBool,
    driver: Box<dyn TickDriver>,
}

/// The effect scheduler.
///
/// Cheap to clone; all clones share one set of queues.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

/// Resets the `flushing` flag however the flush exits, unless the flush
/// already released it.
struct FlushingGuard<'a> {
    flag: &'a AtomicBool,
    armed: bool,
}

impl<'a> FlushingGuard<'a> {
    fn new(flag: &'a AtomicBool) -> Self {
        Self { flag, armed: true }
    }

    /// Clear the flag now. Call with the state lock held.
    fn release(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.armed = false;
    }
}

impl Drop for FlushingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(false, Ordering::Release);
        }
    }
}

impl Scheduler {
    /// A scheduler with the default configuration that the host flushes
    /// manually.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default(), ManualDriver)
    }

    /// A scheduler with the default configuration and the given driver.
    pub fn with_driver<D: TickDriver>(driver: D) -> Self {
        Self::with_config(SchedulerConfig::default(), driver)
    }

    /// A fully configured scheduler.
    pub fn with_config<D: TickDriver>(config: SchedulerConfig, driver: D) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State::default()),
                flushing: AtomicBool::new(false),
                driver: Box::new(driver),
            }),
        }
    }

    /// The scheduler's configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock()
    }

    // ------------------------------------------------------------------
    // Producers
    // ------------------------------------------------------------------

    /// Queue a job on the main queue.
    ///
    /// No-op if the job is already queued. Otherwise the job is added and a
    /// flush is requested.
    pub fn enqueue(&self, job: &JobRef) {
        if !job.try_mark_queued() {
            tracing::trace!(job = ?job.key(), "job already queued");
            return;
        }

        self.state().queues.push_main(Arc::clone(job));
        tracing::trace!(job = ?job.key(), "job queued");
        self.request_flush();
    }

    /// Queue work on the post-flush queue.
    ///
    /// Accepts a single job (de-duplicated by its `queued` flag) or a batch
    /// (appended as is). A follow-up job queued while a post drain is
    /// running is placed right after the job currently executing.
    pub fn enqueue_post(&self, jobs: impl Into<PostJobs>) {
        let added = self.state().queues.push_post(jobs.into());
        if !added {
            tracing::trace!("post job already queued");
        }
        self.request_flush();
    }

    /// Make sure exactly one flush is pending.
    fn request_flush(&self) {
        let requested = {
            let mut state = self.state();
            if state.ticket.is_none() {
                state.ticket = Some(FlushTicket::new());
                true
            } else {
                false
            }
        };

        if requested {
            tracing::trace!("flush requested");
            self.inner.driver.request_tick(self.clone());
        }
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// A future that resolves once the currently pending flush completes,
    /// or immediately when nothing is pending.
    pub fn next_tick(&self) -> NextTick {
        NextTick::new(self.state().ticket.clone())
    }

    /// Like [`next_tick`](Self::next_tick), then runs `f` and yields its
    /// result.
    pub fn next_tick_then<F, R>(&self, f: F) -> impl Future<Output = R>
    where
        F: FnOnce() -> R,
    {
        self.next_tick().map(move |()| f())
    }

    /// Whether a flush is pending or running.
    pub fn has_pending(&self) -> bool {
        self.state().ticket.is_some()
    }

    /// Whether a flush is currently running.
    pub fn is_flushing(&self) -> bool {
        self.inner.flushing.load(Ordering::Acquire)
    }

    /// Number of jobs waiting in the main queue.
    pub fn queued_len(&self) -> usize {
        self.state().queues.main_len()
    }

    /// Number of jobs waiting in the post-flush pending list.
    pub fn queued_post_len(&self) -> usize {
        self.state().queues.pending_post_len()
    }

    // ------------------------------------------------------------------
    // Draining
    // ------------------------------------------------------------------

    /// Run everything that is queued, then settle the pending ticket.
    ///
    /// Calling `flush` from inside a running flush does nothing.
    ///
    /// # Panics
    ///
    /// Resumes the first panic raised by a job, after the queues have been
    /// cleaned up and the ticket settled.
    pub fn flush(&self) -> FlushStats {
        if self.inner.flushing.swap(true, Ordering::AcqRel) {
            tracing::trace!("flush already running");
            return FlushStats::default();
        }
        let mut flushing = FlushingGuard::new(&self.inner.flushing);

        let mut guard = RecursionGuard::new(self.inner.config.recursion_limit);
        let mut stats = FlushStats::default();
        let mut failure: Option<PanicPayload> = None;

        tracing::debug!(
            main = self.queued_len(),
            post = self.queued_post_len(),
            "flush started"
        );

        let ticket = loop {
            stats.passes += 1;

            let main = panic::catch_unwind(AssertUnwindSafe(|| {
                self.drain_main(&mut guard, &mut stats)
            }));
            let abandoned = self.state().queues.finish_main();
            if let Err(payload) = main {
                tracing::warn!(abandoned, "main queue job panicked");
                failure.get_or_insert(payload);
            }

            if let Err(payload) = self.drain_post(&mut guard, &mut stats) {
                failure.get_or_insert(payload);
            }

            // The ticket and the flag go together under the lock: an enqueue
            // that misses this ticket must find the scheduler free to flush.
            let mut state = self.state();
            if state.queues.is_idle() {
                flushing.release();
                break state.ticket.take();
            }
        };

        if let Some(ticket) = ticket {
            ticket.settle();
        }
        tracing::debug!(?stats, "flush finished");

        if let Some(payload) = failure {
            panic::resume_unwind(payload);
        }
        stats
    }

    /// Drain only the post-flush queue.
    ///
    /// Hosts call this to run post work at a point of their choosing. Called
    /// from inside a running post drain, it appends the pending jobs to the
    /// active list and returns; the outer drain runs them.
    ///
    /// # Panics
    ///
    /// Resumes a panic raised by a post job after the active list has been
    /// released.
    pub fn flush_post(&self) -> FlushStats {
        let mut guard = RecursionGuard::new(self.inner.config.recursion_limit);
        let mut stats = FlushStats::default();
        if let Err(payload) = self.drain_post(&mut guard, &mut stats) {
            panic::resume_unwind(payload);
        }
        stats
    }

    fn drain_main(&self, guard: &mut RecursionGuard, stats: &mut FlushStats) {
        self.state().queues.begin_main();

        loop {
            let next = self.state().queues.current_main();
            let Some(job) = next else {
                break;
            };

            if Self::run_job(&job, guard, stats) {
                stats.jobs_run += 1;
            }
            self.state().queues.advance_main();
        }
    }

    fn drain_post(
        &self,
        guard: &mut RecursionGuard,
        stats: &mut FlushStats,
    ) -> Result<(), PanicPayload> {
        let begun = self.state().queues.begin_post();
        if begun != PostDrain::Started {
            return Ok(());
        }

        let walk = panic::catch_unwind(AssertUnwindSafe(|| loop {
            let next = self.state().queues.current_post();
            let Some(job) = next else {
                break;
            };

            if Self::run_job(&job, guard, stats) {
                stats.post_jobs_run += 1;
            }
            self.state().queues.advance_post();
        }));

        let abandoned = self.state().queues.finish_post();
        walk.map_err(|payload| {
            tracing::warn!(abandoned, "post-flush job panicked");
            payload
        })
    }

    /// Run one queued occurrence. Returns whether the callback ran.
    fn run_job(job: &JobRef, guard: &mut RecursionGuard, stats: &mut FlushStats) -> bool {
        if guard.check(job) == Verdict::Skip {
            job.clear_queued();
            stats.skipped += 1;
            return false;
        }

        let allow_recurse = job.allows_recurse();
        if allow_recurse {
            job.clear_queued();
        }

        tracing::trace!(job = ?job.key(), "running job");
        job.run();

        if !allow_recurse {
            job.clear_queued();
        }
        true
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .field("queued", &state.queues.main_len())
            .field("queued_post", &state.queues.pending_post_len())
            .field("pending", &state.ticket.is_some())
            .field("flushing", &self.is_flushing())
            .finish()
    }
}
