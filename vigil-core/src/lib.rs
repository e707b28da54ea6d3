//! Vigil Core
//!
//! This crate provides the runtime for the Vigil reactive state layer: the
//! pieces a binding layer needs to turn annotated object members into
//! reactive fields, derived values and side effects.
//!
//! It implements:
//!
//! - A small dependency engine (signals, memos, subscriber registry)
//! - The effect scheduler (main queue, post-flush queue, flush tickets,
//!   recursion guard)
//! - Watch bindings with sync, pre and post timing
//! - Effect scopes and per-object administration
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Reactive primitives and dependency tracking
//! - `scheduler`: Job queues and the flush loop
//! - `watch`: Subscriptions that turn source changes into scheduled jobs
//! - `scope`: Groups of watches stopped together
//! - `object`: Member-role bookkeeping for one reactive object
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use vigil_core::reactive::{Memo, Signal};
//! use vigil_core::scheduler::Scheduler;
//! use vigil_core::watch::{watch_effect, watch_post_effect};
//!
//! let scheduler = Scheduler::new();
//! let log = Arc::new(Mutex::new(Vec::new()));
//!
//! let count = Signal::new(1);
//! let doubled = {
//!     let count = count.clone();
//!     Memo::new(move || count.get() * 2)
//! };
//!
//! let _render = watch_effect(&scheduler, {
//!     let log = log.clone();
//!     move || log.lock().unwrap().push(format!("render {}", doubled.get()))
//! });
//! let _after = watch_post_effect(&scheduler, {
//!     let (log, count) = (log.clone(), count.clone());
//!     move || log.lock().unwrap().push(format!("after {}", count.get()))
//! });
//!
//! count.set(2);
//! count.set(3);
//! scheduler.flush();
//!
//! assert_eq!(
//!     *log.lock().unwrap(),
//!     vec!["render 2", "render 6", "after 3"]
//! );
//! ```

pub mod config;
pub mod error;
pub mod object;
pub mod reactive;
pub mod scheduler;
pub mod scope;
pub mod watch;

pub use config::SchedulerConfig;
pub use error::{Result, VigilError};
pub use object::{MemberRole, ReactiveObject};
pub use scheduler::{FlushStats, Job, JobRef, PostJobs, Scheduler};
pub use scope::EffectScope;
pub use watch::{
    getter, watch, watch_effect, watch_effect_with, watch_post_effect, watch_sync_effect,
    FlushMode, WatchHandle, WatchOptions, WatchSource,
};
