//! Effect Scheduler
//!
//! Batches reactive work so that a burst of writes results in one orderly
//! round of effect execution.
//!
//! # Key Concepts
//!
//! - **Job**: a callback with scheduling metadata. A job is queued at most
//!   once at a time.
//! - **Main queue**: pre-phase work, run first, in enqueue order (or id
//!   order when jobs carry ids).
//! - **Post-flush queue**: work that must observe the settled state, run
//!   after the main queue empties.
//! - **Flush**: drains both queues until neither refills.
//! - **Tick**: whatever the host's [`TickDriver`] considers "after the
//!   current synchronous work".
//!
//! # Example
//!
//! ```rust
//! use vigil_core::scheduler::{Job, Scheduler};
//!
//! let scheduler = Scheduler::new();
//! let job = Job::new(|| println!("ran")).into_ref();
//!
//! scheduler.enqueue(&job);
//! scheduler.enqueue(&job); // already queued: ignored
//!
//! let stats = scheduler.flush();
//! assert_eq!(stats.jobs_run, 1);
//! ```

mod coordinator;
mod driver;
mod guard;
mod job;
mod queue;
mod ticket;

pub use coordinator::{FlushStats, Scheduler};
pub use driver::{ManualDriver, TickDriver, TokioDriver};
pub use job::{Job, JobKey, JobRef};
pub use queue::PostJobs;
pub use ticket::{FlushTicket, NextTick};
