//! Reactive Primitives
//!
//! This module implements the dependency engine the scheduler consumes:
//! signals, memos, and the runtime that wires them to their readers.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or a watch getter), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, all dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changed since the last read.
//!
//! ## Subscribers
//!
//! Anything implementing [`Reactive`] can be registered with the
//! [`Runtime`] and notified. Watchers (see [`crate::watch`]) are the
//! subscribers that turn a notification into scheduled work.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a source is read, we check if there is an active
//! tracking context and, if so, register the dependency.

mod context;
mod memo;
mod runtime;
mod signal;
mod subscriber;

pub use context::{untracked, ReactiveContext};
pub use memo::{Memo, MemoState};
pub use runtime::{Reactive, ReactiveHandle, Runtime};
pub use signal::Signal;
pub use subscriber::{SourceId, SubscriberId};
