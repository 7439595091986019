//! The controller-wide error enumeration.
//!
//! Every adapter trait and the lifecycle engine return `Result<_,
//! ControllerError>`. There is deliberately one flat enum rather than a
//! hierarchy per component: the point (per the source system's checked
//! exceptions) is a single place a caller can match on to decide whether an
//! error is a precondition failure, an infrastructure failure, or fatal.

use thiserror::Error;

/// Errors raised by the metadata store, resource coordinator, topic
/// manager, mastership controller, and store lifecycle engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// This node is not the authoritative leader for the cluster. Not
    /// retryable at this node -- the caller should consult discovery.
    #[error("not leader for cluster '{cluster}'")]
    NotLeader { cluster: String },

    /// A store, version, resource, or topic does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A store, version, resource, or topic already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A precondition was violated: current-version mismatch, reads/writes
    /// still enabled, hybrid vs. incremental-push conflict, partition-count
    /// change on a hybrid store, and similar invariant checks.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The resource coordinator (cluster manager) adapter is unreachable.
    /// Retryable at the caller.
    #[error("coordinator unavailable: {0}")]
    CoordinatorUnavailable(String),

    /// The topic manager (message bus) adapter is unreachable. Retryable
    /// at the caller.
    #[error("topic manager unavailable: {0}")]
    TopicManagerUnavailable(String),

    /// The metadata store is unreachable. Retryable at the caller.
    #[error("metadata store unavailable: {0}")]
    MetadataUnavailable(String),

    /// A compare-and-set write lost a race. Callers retry internally up to
    /// a bounded number of attempts before surfacing a fatal error.
    #[error("concurrent update to '{0}', retry")]
    ConcurrentUpdate(String),

    /// A candidate schema is incompatible with an existing registered
    /// schema for the store.
    #[error("schema incompatible for store '{store}': {reason}")]
    SchemaIncompatible { store: String, reason: String },

    /// Mastership could not be acquired before the configured join
    /// timeout elapsed.
    #[error("join timeout acquiring mastership for cluster '{cluster}'")]
    JoinTimeout { cluster: String },

    /// An invariant that must never be violated was violated (e.g. a
    /// regression of `largest_used_version_number`). Always a bug, never
    /// expected to be retried.
    #[error("fatal invariant violation: {0}")]
    Fatal(String),
}

impl ControllerError {
    /// `true` for errors the caller may reasonably retry (infrastructure
    /// failures and lost CAS races); `false` for precondition failures and
    /// fatal invariant violations.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ControllerError::CoordinatorUnavailable(_)
                | ControllerError::TopicManagerUnavailable(_)
                | ControllerError::MetadataUnavailable(_)
                | ControllerError::ConcurrentUpdate(_)
        )
    }
}
