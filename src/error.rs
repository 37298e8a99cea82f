//! Crate-wide error surface.
//!
//! `spark-core` (the teacher repo) defines a single `SparkError` struct with
//! a stable string code plus builder methods (`with_cause`, `with_trace`, ...)
//! because it targets `no_std` and cannot rely on `std::error::Error` or an
//! enum-based source chain ergonomically. `kernel-core` targets `std`, and the
//! spec's error kinds (§7) are a closed, named set rather than an open string
//! namespace, so the idiomatic shape here is a `thiserror` enum: one variant
//! per kind, each carrying exactly the context spec §7 calls for.

use std::sync::Arc;

use crate::facet::FacetKind;

/// The crate's single error type. Every fallible public API returns
/// `KernelResult<T> = Result<T, KernelError>`.
#[derive(Debug, thiserror::Error, Clone)]
pub enum KernelError {
    /// Malformed `scheme://seg/seg` URI.
    #[error("malformed path `{0}`")]
    Path(String),

    /// No subsystem or route matched the given path.
    #[error("no route for path `{0}`")]
    NoRoute(String),

    /// An operation required a facet kind that is not installed.
    #[error("subsystem is missing required facet `{0}`")]
    MissingFacet(FacetKind),

    /// A facet failed to satisfy a named contract.
    #[error("facet failed contract `{contract}`: missing {missing:?}")]
    Contract {
        contract: String,
        missing: Vec<String>,
    },

    /// A hook or facet declared a dependency with no provider in the build.
    #[error("dependency `{0}` has no provider in this build")]
    MissingDep(FacetKind),

    /// The facet dependency graph contains a cycle.
    #[error("cyclic dependency among facets: {0:?}")]
    Cycle(Vec<FacetKind>),

    /// A bounded queue with `reject` overflow policy is full.
    #[error("bounded queue is full")]
    QueueFull,

    /// A request's deadline elapsed before a response arrived.
    #[error("request timed out")]
    Timeout,

    /// A request or subsystem was explicitly cancelled.
    #[error("request was cancelled")]
    Cancelled,

    /// A reader/writer/granter check denied the operation.
    #[error("permission denied")]
    Permission,

    /// A PKR or credential has expired.
    #[error("identity or credential has expired")]
    Expired,

    /// A hook kind, route pattern, or contract name conflicts with an
    /// existing registration that does not permit overwrite.
    #[error("duplicate `{0}`")]
    Duplicate(String),

    /// Catch-all for a handler- or user-supplied error surfaced through the
    /// kernel's `Result` machinery; carries the original cause for
    /// `tracing`/log consumption without forcing every handler error into
    /// one of the structural kinds above.
    #[error("handler error: {0}")]
    Handler(Arc<str>),
}

impl KernelError {
    /// Wrap an arbitrary handler-produced error as a [`KernelError::Handler`].
    pub fn handler(msg: impl Into<Arc<str>>) -> Self {
        KernelError::Handler(msg.into())
    }
}

/// Standard result alias used on every fallible kernel API.
pub type KernelResult<T> = Result<T, KernelError>;
