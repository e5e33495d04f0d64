pub use crate::detection::{Detection, DetectionKey, Payload};
pub use crate::export::{confirmed_tracks, restore, ConfirmedTrack};
pub use crate::lookahead::ClosestMiss;
pub use crate::pruning::conflict::{Claim, ConflictGroup, ConflictGroups};
pub use crate::pruning::{PruneMode, PruneReport, Pruner};
pub use crate::scoring::Scorer;
pub use crate::tracker::builder::MhtBuilder;
pub use crate::tracker::checkpoint::Checkpoint;
pub use crate::tracker::correction::{Correction, CorrectionHook};
pub use crate::tracker::{
    Frame, FrameReport, MhtOptions, MultiHypothesisTracker, DEFAULT_GATE_DIST_KM,
    DEFAULT_PRUNE_DEPTH,
};
pub use crate::tree::{Forest, HypothesisNode, NodeId};
