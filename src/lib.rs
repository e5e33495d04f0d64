/// Detections, their identity key and node payloads
pub mod detection;

/// Great-circle distance used for gating
pub mod distance;

/// Synthetic detection generators for demos, benches and tests
pub mod examples;

/// Confirmed track export and restoration of a run from exported tracks
pub mod export;

/// Association of new detections with open branches
pub mod gating;

/// Missed-detection placeholders
pub mod lookahead;

pub mod prelude;

/// Conflict resolution strategies
pub mod pruning;

/// Path scoring
pub mod scoring;

/// Frame orchestration, configuration and checkpoints
pub mod tracker;

/// Hypothesis forest
pub mod tree;

use thiserror::Error;
use tree::NodeId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Errors {
    #[error("Node {0} does not exist in the forest.")]
    MissingNode(NodeId),
    #[error("Node {child} is not a child of node {parent}.")]
    MissingChild { parent: NodeId, child: NodeId },
    #[error("Node {0} is not in the root set.")]
    MissingRoot(NodeId),
    #[error("Node {0} is final, its children cannot be changed.")]
    FinalNode(NodeId),
    #[error("Node {0} is a sentinel and cannot have children.")]
    SentinelParent(NodeId),
    #[error("Node {0} is already attached to a parent or the root set.")]
    AlreadyAttached(NodeId),
    #[error("Conflict group has no members.")]
    EmptyConflictGroup,
    #[error("Forest invariant is broken: {0}")]
    BrokenInvariant(String),
    #[error("Gating distance must be a positive finite number of kilometers, got {0}.")]
    InvalidGateDistance(f64),
    #[error("Detection {ordinal} of frame `{frame}` has malformed geometry.")]
    MalformedDetection { frame: String, ordinal: usize },
    #[error("Unknown pruning mode `{0}`, expected `child` or `parent`.")]
    UnknownPruneMode(String),
    #[error("The tracker failed on a previous frame and refuses to continue.")]
    Poisoned,
}

pub(crate) const EPS: f64 = 0.00001;
