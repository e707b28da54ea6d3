//! Jobs
//!
//! A job is the unit the scheduler queues: a callback plus the bookkeeping
//! the queues need. Watchers create one job when they are armed and reuse
//! it for their whole lifetime; one-shot post jobs are created per call.
//!
//! The `queued` flag is what keeps a job from occupying two queue slots.
//! `allow_recurse` decides when the drain loop clears that flag: before the
//! callback runs (so the callback may re-queue its own job) or after it.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

const QUEUED: u8 = 1 << 0;
const ALLOW_RECURSE: u8 = 1 << 2;

/// Shared reference to a job. Queues hold these, never the job itself.
pub type JobRef = Arc<Job>;

/// Identity of a job, used for de-duplication and recursion counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey(u64);

impl JobKey {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

type Callback = dyn Fn() + Send + Sync;

/// A schedulable unit of work.
pub struct Job {
    key: JobKey,

    /// Optional ordering key. Lower ids run first among queued jobs.
    id: Option<u32>,

    /// Post jobs only: when a post drain is running, insert this job right
    /// after the job currently executing instead of deferring it.
    follow_up: bool,

    flags: AtomicU8,
    callback: Box<Callback>,
}

impl Job {
    /// Create a job with no ordering id that may not re-queue itself.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            key: JobKey::next(),
            id: None,
            follow_up: false,
            flags: AtomicU8::new(0),
            callback: Box::new(callback),
        }
    }

    /// Create a post job that jumps ahead of the rest of the running post
    /// batch.
    ///
    /// This is the one exception to FIFO ordering in the post queue. Outside
    /// of a post drain it behaves like an ordinary post job.
    pub fn follow_up<F>(callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            follow_up: true,
            ..Self::new(callback)
        }
    }

    /// Attach an ordering id.
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    /// Allow (or forbid) the job to re-queue itself while it runs.
    pub fn allow_recurse(self, allow: bool) -> Self {
        self.set_allow_recurse(allow);
        self
    }

    /// Wrap the job for sharing with the scheduler.
    pub fn into_ref(self) -> JobRef {
        Arc::new(self)
    }

    /// The job's identity.
    pub fn key(&self) -> JobKey {
        self.key
    }

    /// The job's ordering id, if any.
    pub fn id(&self) -> Option<u32> {
        self.id
    }

    /// Whether this is a follow-up post job.
    pub fn is_follow_up(&self) -> bool {
        self.follow_up
    }

    /// Whether the job currently sits in a queue.
    pub fn is_queued(&self) -> bool {
        self.flags.load(Ordering::Acquire) & QUEUED != 0
    }

    /// Whether the job may re-queue itself while running.
    pub fn allows_recurse(&self) -> bool {
        self.flags.load(Ordering::Acquire) & ALLOW_RECURSE != 0
    }

    /// Change the recursion permission after construction.
    pub fn set_allow_recurse(&self, allow: bool) {
        if allow {
            self.flags.fetch_or(ALLOW_RECURSE, Ordering::AcqRel);
        } else {
            self.flags.fetch_and(!ALLOW_RECURSE, Ordering::AcqRel);
        }
    }

    /// Set the queued flag. Returns `false` if it was already set.
    pub(crate) fn try_mark_queued(&self) -> bool {
        self.flags.fetch_or(QUEUED, Ordering::AcqRel) & QUEUED == 0
    }

    pub(crate) fn clear_queued(&self) {
        self.flags.fetch_and(!QUEUED, Ordering::AcqRel);
    }

    /// Invoke the callback directly, bypassing the queues.
    pub fn run(&self) {
        (self.callback)();
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("follow_up", &self.follow_up)
            .field("queued", &self.is_queued())
            .field("allow_recurse", &self.allows_recurse())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn queued_flag_is_set_once() {
        let job = Job::new(|| {});
        assert!(!job.is_queued());

        assert!(job.try_mark_queued());
        assert!(!job.try_mark_queued());
        assert!(job.is_queued());

        job.clear_queued();
        assert!(!job.is_queued());
    }

    #[test]
    fn recurse_flag_is_independent_of_queued() {
        let job = Job::new(|| {}).allow_recurse(true);
        assert!(job.allows_recurse());

        job.try_mark_queued();
        job.set_allow_recurse(false);
        assert!(!job.allows_recurse());
        assert!(job.is_queued());
    }

    #[test]
    fn builder_sets_metadata() {
        let job = Job::follow_up(|| {}).with_id(7);
        assert!(job.is_follow_up());
        assert_eq!(job.id(), Some(7));
        assert_ne!(job.key(), Job::new(|| {}).key());
    }

    #[test]
    fn run_invokes_callback() {
        let hits = Arc::new(AtomicUsize::new(0));
        let job = Job::new({
            let hits = hits.clone();
            move || {
                hits.fetch_add(1, Ordering::SeqCst);
            }
        });

        job.run();
        job.run();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
