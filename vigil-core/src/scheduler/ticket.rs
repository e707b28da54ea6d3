//! Flush Tickets
//!
//! A ticket stands for "the next time both queues have fully drained". The
//! scheduler holds at most one. Every enqueue that finds no ticket creates
//! one and asks the driver for a tick; later enqueues reuse it. The ticket
//! settles when a flush leaves both queues empty, waking everything that
//! awaited [`NextTick`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct TicketState {
    settled: bool,
    wakers: Vec<Waker>,
}

/// Shared completion signal for one pending flush.
#[derive(Debug, Clone, Default)]
pub struct FlushTicket {
    state: Arc<Mutex<TicketState>>,
}

impl FlushTicket {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Whether the flush this ticket stands for has completed.
    pub fn is_settled(&self) -> bool {
        self.state.lock().settled
    }

    /// Mark the ticket settled and wake every waiter.
    pub(crate) fn settle(&self) {
        let wakers = {
            let mut state = self.state.lock();
            state.settled = true;
            std::mem::take(&mut state.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }

    fn poll_settled(&self, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.state.lock();
        if state.settled {
            return Poll::Ready(());
        }
        if !state.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

/// Future returned by [`Scheduler::next_tick`](super::Scheduler::next_tick).
///
/// Resolves once the flush that was pending when it was created has
/// finished, or immediately if nothing was pending.
#[derive(Debug, Clone)]
#[must_use = "futures do nothing unless polled"]
pub struct NextTick {
    ticket: Option<FlushTicket>,
}

impl NextTick {
    pub(crate) fn new(ticket: Option<FlushTicket>) -> Self {
        Self { ticket }
    }

    /// Whether awaiting this future would complete without waiting.
    pub fn is_ready(&self) -> bool {
        self.ticket.as_ref().map_or(true, FlushTicket::is_settled)
    }
}

impl Future for NextTick {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match &self.ticket {
            Some(ticket) => ticket.poll_settled(cx),
            None => Poll::Ready(()),
        }
    }
}
