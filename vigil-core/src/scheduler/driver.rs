//! Tick Drivers
//!
//! The scheduler does not own an event loop. When the first job of a burst
//! is queued it asks its driver to run [`Scheduler::flush`] "on the next
//! tick": after the code that is queueing work right now has returned.
//! What a tick is depends on the host, so the driver is a trait.

use std::fmt;

use tokio::runtime::Handle;

use super::Scheduler;
use crate::error::{Result, VigilError};

/// Decides when a requested flush actually runs.
pub trait TickDriver: Send + Sync + 'static {
    /// Arrange for `scheduler.flush()` to be called once the current burst
    /// of synchronous work has finished.
    ///
    /// Called at most once per flush ticket.
    fn request_tick(&self, scheduler: Scheduler);
}

/// Leaves flushing to the host, which calls [`Scheduler::flush`] from its
/// own loop (or a test calls it directly).
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualDriver;

impl TickDriver for ManualDriver {
    fn request_tick(&self, _scheduler: Scheduler) {
        tracing::trace!("flush requested; waiting for the host to flush");
    }
}

/// Flushes from a task on a tokio runtime.
///
/// The task yields once before flushing, so everything the caller queues
/// before its own next `.await` lands in the same flush. On a multi-thread
/// runtime the flush may run on another worker; the scheduler still never
/// runs two drains at once.
#[derive(Clone)]
pub struct TokioDriver {
    handle: Handle,
}

impl TokioDriver {
    /// Drive flushes on the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Drive flushes on the runtime the caller is running inside.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| VigilError::NoRuntime)
    }
}

impl fmt::Debug for TokioDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioDriver")
            .field("runtime", &self.handle.runtime_flavor())
            .finish()
    }
}

impl TickDriver for TokioDriver {
    fn request_tick(&self, scheduler: Scheduler) {
        self.handle.spawn(async move {
            tokio::task::yield_now().await;
            scheduler.flush();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokio_driver_needs_a_runtime() {
        assert_eq!(TokioDriver::current().err(), Some(VigilError::NoRuntime));
    }

    #[tokio::test]
    async fn tokio_driver_is_available_inside_a_runtime() {
        assert!(TokioDriver::current().is_ok());
    }
}
