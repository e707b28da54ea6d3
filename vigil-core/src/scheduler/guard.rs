//! Recursion Guard
//!
//! Counts how often each job ran during one flush. A job that keeps
//! re-queueing itself (directly or through a cycle of watchers) is skipped
//! once it passes the ceiling, so a runaway cycle shows up as a warning
//! instead of a hung process. The guard is not a cycle detector: legitimate
//! self-triggering still depends on `allow_recurse` and sane dependencies.

use std::collections::HashMap;

use super::job::{Job, JobKey};

/// What the drain loop should do with a job occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Run,
    Skip,
}

/// Per-flush execution counters.
#[derive(Debug)]
pub(crate) struct RecursionGuard {
    limit: Option<usize>,
    counts: HashMap<JobKey, usize>,
}

impl RecursionGuard {
    /// A guard with the given ceiling. `None` disables counting.
    pub(crate) fn new(limit: Option<usize>) -> Self {
        Self {
            limit,
            counts: HashMap::new(),
        }
    }

    /// Count one occurrence of `job` and decide whether it may run.
    pub(crate) fn check(&mut self, job: &Job) -> Verdict {
        let Some(limit) = self.limit else {
            return Verdict::Run;
        };

        let count = self.counts.entry(job.key()).or_insert(0);
        *count += 1;

        if *count <= limit {
            return Verdict::Run;
        }

        if *count == limit + 1 {
            tracing::warn!(
                job = ?job.key(),
                limit,
                "maximum recursive updates exceeded: a reactive job is likely \
                 mutating its own dependencies and re-triggering itself"
            );
        }
        Verdict::Skip
    }

    /// How many times `job` has been counted in this flush.
    #[cfg(test)]
    pub(crate) fn count(&self, job: &Job) -> usize {
        self.counts.get(&job.key()).copied().unwrap_or(0)
    }
}
