use crate::detection::{Detection, DetectionKey};
use crate::pruning::conflict::ConflictGroups;
use crate::tree::Forest;
use anyhow::Result;

/// Replacement of one detection of the current frame
///
#[derive(Debug, Clone)]
pub struct Correction {
    /// Detection to withdraw, every hypothesis claiming it is removed
    pub replaces: DetectionKey,
    /// Detections gated in its place
    pub detections: Vec<Detection>,
}

impl Correction {
    pub fn new(replaces: DetectionKey, detections: Vec<Detection>) -> Self {
        Self {
            replaces,
            detections,
        }
    }
}

/// External step run after a frame is gated.
///
/// It receives the conflict groups of the frame and may split ambiguous detections, e.g. one that
/// [looks like a merge](crate::pruning::conflict::ConflictGroup::looks_like_merge) of two objects.
/// Returned replacements are labeled and gated by the tracker, they do not need timestep nor
/// ordinal.
///
pub trait CorrectionHook: Send {
    fn correct(
        &mut self,
        depth: usize,
        forest: &Forest,
        groups: &ConflictGroups,
    ) -> Result<Vec<Correction>>;
}

impl<F> CorrectionHook for F
where
    F: FnMut(usize, &Forest, &ConflictGroups) -> Result<Vec<Correction>> + Send,
{
    fn correct(
        &mut self,
        depth: usize,
        forest: &Forest,
        groups: &ConflictGroups,
    ) -> Result<Vec<Correction>> {
        self(depth, forest, groups)
    }
}
