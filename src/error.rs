//! Error types shared by the whole crate.
//!
//! Caller errors (`SignatureMismatch`, `IncompatibleInterface`, `NameClash`,
//! `InvalidInstantiation`, `UnsupportedGroundRequirement` and the builder
//! refinements) are detected before any mutation is committed. A
//! `ConsistencyViolation` always denotes a defect in this crate.

use crate::arena::{NodeId, RootId, SiteId};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type BigraphResult<T> = Result<T, BigraphError>;

/// Errors raised by bigraph construction, algebra, matching and rewriting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BigraphError {
    /// Operands were built over different signatures.
    #[error("signature mismatch: `{left}` vs `{right}`")]
    SignatureMismatch { left: String, right: String },

    /// Face sizes or name sets do not line up.
    #[error("incompatible interface: {0}")]
    IncompatibleInterface(String),

    /// Names that must be disjoint (or fresh) are not.
    #[error("name clash on {}", .0.join(", "))]
    NameClash(Vec<String>),

    #[error("invalid instantiation: {0}")]
    InvalidInstantiation(String),

    /// Matching was asked for on an agent that has sites or inner names.
    #[error("the agent must be ground (no sites and no inner names)")]
    UnsupportedGroundRequirement,

    #[error("consistency violation: {0}")]
    ConsistencyViolation(#[from] Inconsistency),

    #[error("control `{0}` is not part of the signature")]
    UnknownControl(String),

    /// More handles than ports were supplied to `add_node`.
    #[error("control `{control}` has arity {arity} but {given} handles were given")]
    ArityMismatch {
        control: String,
        arity: usize,
        given: usize,
    },

    /// A stale or foreign identifier was passed in.
    #[error("unknown {kind} `{id}`")]
    UnknownEntity { kind: &'static str, id: String },

    #[error("no name `{0}` on this face")]
    UnknownName(String),

    #[error("root {0} is not empty")]
    NonEmptyRoot(RootId),
}

/// A broken structural invariant, as reported by the consistency checker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Inconsistency {
    #[error("{child} records parent {recorded} but is listed under {actual}")]
    ParentMismatch {
        child: String,
        recorded: String,
        actual: String,
    },

    /// The place graph is not a forest.
    #[error("{0} is reachable more than once")]
    Revisited(String),

    #[error("node {node} has {ports} ports but its control has arity {arity}")]
    PortCount {
        node: NodeId,
        ports: usize,
        arity: usize,
    },

    #[error("control `{control}` of node {node} does not belong to the signature")]
    ForeignControl { node: NodeId, control: String },

    /// A point refers to a handle that does not list it.
    #[error("{point} is linked to {handle} which does not record it")]
    UnrecordedPoint { point: String, handle: String },

    #[error("{handle} records {point} which does not refer back to it")]
    StrayPoint { handle: String, point: String },

    #[error("{0} refers to a dead entity")]
    Dangling(String),

    #[error("site {0} is not reachable from any root")]
    UnreachableSite(SiteId),

    #[error("{0} is not reachable from any root")]
    UnreachableNode(NodeId),

    #[error("edge {0} has no points")]
    IdleEdge(String),

    #[error("name index out of sync for `{0}`")]
    NameIndex(String),
}
