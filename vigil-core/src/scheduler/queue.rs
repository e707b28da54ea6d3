//! Job Queues
//!
//! Two queues feed a flush:
//!
//! - The main queue holds pre-phase work. It is drained by index over a live
//!   vector so jobs appended while draining still run in the same pass.
//! - The post-flush queue holds work that must wait until the main queue is
//!   empty. New post jobs land in a pending list; a drain moves the pending
//!   list into an active list and walks that instead, so jobs queued during
//!   the walk wait for the next post drain.
//!
//! This module is pure bookkeeping. It never runs a callback; the
//! coordinator reads one job at a time out of it, releases its lock, and
//! runs the job.

use indexmap::IndexMap;

use super::job::{JobKey, JobRef};

/// Jobs handed to [`Scheduler::enqueue_post`](super::Scheduler::enqueue_post).
#[derive(Debug, Clone)]
pub enum PostJobs {
    /// One job, de-duplicated through its `queued` flag.
    Single(JobRef),
    /// A group fired together. The caller guarantees the jobs are distinct,
    /// so no `queued` check is made on the way in.
    Batch(Vec<JobRef>),
}

impl From<JobRef> for PostJobs {
    fn from(job: JobRef) -> Self {
        PostJobs::Single(job)
    }
}

impl From<Vec<JobRef>> for PostJobs {
    fn from(jobs: Vec<JobRef>) -> Self {
        PostJobs::Batch(jobs)
    }
}

/// Result of starting a post drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PostDrain {
    /// Nothing was pending.
    Empty,
    /// A drain is already walking the active list; the pending jobs were
    /// appended to it and the caller must not start a second walk.
    Joined,
    /// The caller owns a fresh active list and must walk it.
    Started,
}

#[derive(Debug, Default)]
pub(crate) struct JobQueues {
    main: Vec<JobRef>,
    /// Index of the main job being run, `None` outside a main drain.
    flush_index: Option<usize>,

    pending_post: Vec<JobRef>,
    active_post: Option<Vec<JobRef>>,
    post_index: usize,
}

impl JobQueues {
    /// Whether both queues are empty.
    pub(crate) fn is_idle(&self) -> bool {
        self.main.is_empty() && self.pending_post.is_empty()
    }

    pub(crate) fn main_len(&self) -> usize {
        self.main.len()
    }

    pub(crate) fn pending_post_len(&self) -> usize {
        self.pending_post.len()
    }

    // ------------------------------------------------------------------
    // Main queue
    // ------------------------------------------------------------------

    /// Insert a job the caller has already marked queued.
    ///
    /// Jobs without an id go to the tail. A job with an id goes before the
    /// first not-yet-run job whose id is larger, id-less jobs counting as
    /// larger than any id.
    pub(crate) fn push_main(&mut self, job: JobRef) {
        let Some(id) = job.id() else {
            self.main.push(job);
            return;
        };

        let start = self.flush_index.map_or(0, |index| index + 1).min(self.main.len());
        let position = self.main[start..]
            .iter()
            .position(|queued| queued.id().map_or(true, |other| other > id))
            .map_or(self.main.len(), |offset| start + offset);
        self.main.insert(position, job);
    }

    pub(crate) fn begin_main(&mut self) {
        self.flush_index = Some(0);
    }

    /// The main job under the cursor, if the cursor is still in range.
    pub(crate) fn current_main(&self) -> Option<JobRef> {
        self.flush_index
            .and_then(|index| self.main.get(index))
            .cloned()
    }

    pub(crate) fn advance_main(&mut self) {
        if let Some(index) = self.flush_index.as_mut() {
            *index += 1;
        }
    }

    /// Close a main drain, successful or not.
    ///
    /// Clears the `queued` flag of every job from the cursor onward (the job
    /// that failed and everything after it), empties the queue and resets
    /// the cursor. Returns how many jobs were abandoned.
    pub(crate) fn finish_main(&mut self) -> usize {
        let start = self.flush_index.unwrap_or(0).min(self.main.len());
        let abandoned = self.main.len() - start;
        for job in &self.main[start..] {
            job.clear_queued();
        }
        self.flush_index = None;
        self.main.clear();
        abandoned
    }

    // ------------------------------------------------------------------
    // Post-flush queue
    // ------------------------------------------------------------------

    /// Add post work. Returns `false` if a single job was already queued.
    pub(crate) fn push_post(&mut self, jobs: PostJobs) -> bool {
        match jobs {
            PostJobs::Single(job) => {
                if job.is_follow_up() {
                    if let Some(active) = self.active_post.as_mut() {
                        let at = (self.post_index + 1).min(active.len());
                        active.insert(at, job);
                        return true;
                    }
                }
                if !job.try_mark_queued() {
                    return false;
                }
                self.pending_post.push(job);
                true
            }
            PostJobs::Batch(jobs) => {
                self.pending_post.extend(jobs);
                true
            }
        }
    }

    /// Move the pending list into the active list.
    pub(crate) fn begin_post(&mut self) -> PostDrain {
        if self.pending_post.is_empty() {
            return PostDrain::Empty;
        }

        let mut deduped: IndexMap<JobKey, JobRef> = IndexMap::with_capacity(self.pending_post.len());
        for job in self.pending_post.drain(..) {
            deduped.entry(job.key()).or_insert(job);
        }
        let mut deduped: Vec<JobRef> = deduped.into_values().collect();

        if let Some(active) = self.active_post.as_mut() {
            active.extend(deduped);
            return PostDrain::Joined;
        }

        deduped.sort_by_key(|job| job.id().unwrap_or(u32::MAX));
        self.active_post = Some(deduped);
        self.post_index = 0;
        PostDrain::Started
    }

    /// The post job under the cursor.
    pub(crate) fn current_post(&self) -> Option<JobRef> {
        self.active_post
            .as_ref()
            .and_then(|active| active.get(self.post_index))
            .cloned()
    }

    pub(crate) fn advance_post(&mut self) {
        self.post_index += 1;
    }

    /// Drop the active list. Jobs the walk never reached get their `queued`
    /// flag cleared, which only happens when a post job panicked.
    pub(crate) fn finish_post(&mut self) -> usize {
        let abandoned = match self.active_post.take() {
            Some(active) => {
                let start = self.post_index.min(active.len());
                for job in &active[start..] {
                    job.clear_queued();
                }
                active.len() - start
            }
            None => 0,
        };
        self.post_index = 0;
        abandoned
    }
}
