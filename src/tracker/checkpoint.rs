use crate::lookahead::ClosestMiss;
use crate::tree::Forest;

/// Everything needed to continue a run from where it stopped.
///
/// The bundle is produced by [MultiHypothesisTracker::checkpoint](crate::tracker::MultiHypothesisTracker::checkpoint)
/// or by [restore](crate::export::restore) and handed back through
/// [MhtBuilder::resume](crate::tracker::builder::MhtBuilder::resume). How it is persisted is up to
/// the caller.
///
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// Root set with every tree
    pub forest: Forest,
    /// Depth of the next frame to process
    pub start_depth: usize,
    pub prune_depth: usize,
    pub gate_dist: f64,
    /// Closest detections recorded for missed branches
    pub closest: Vec<ClosestMiss>,
    /// Identifiers of the processed frames, indexed by depth
    pub timesteps: Vec<String>,
}
