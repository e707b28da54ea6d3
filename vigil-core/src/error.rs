//! Error types for the Vigil runtime.
//!
//! Only recoverable conditions live here. A job that panics is not an error
//! value: the scheduler cleans up its queues and lets the panic continue.

use thiserror::Error;

use crate::object::MemberRole;

/// Errors reported by the binding layer and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VigilError {
    /// A member was already bound with a different role.
    #[error("member `{key}` is already bound as {existing}, cannot bind it as {requested}")]
    RoleConflict {
        key: String,
        existing: MemberRole,
        requested: MemberRole,
    },

    /// A watch referred to a member that does not exist.
    #[error("watch source `{0}` is not defined on the object")]
    UnknownMember(String),

    /// A watch referred to a member that is not an observable value.
    #[error("watch source `{0}` is not observable")]
    NotObservable(String),

    /// A member holds a value of a different type than requested.
    #[error("member `{key}` does not hold a value of type `{expected}`")]
    TypeMismatch { key: String, expected: &'static str },

    /// A write was attempted on a memo that has no setter.
    #[error("write failed: computed value is read-only")]
    ReadOnlyComputed,

    /// A watch was added to a scope that has already been stopped.
    #[error("effect scope has been stopped")]
    ScopeStopped,

    /// The tokio driver was created outside of a tokio runtime.
    #[error("no tokio runtime is available to drive the scheduler")]
    NoRuntime,
}

/// Convenience alias used across the crate.
pub type Result<T, E = VigilError> = std::result::Result<T, E>;
