use crate::detection::Detection;
use crate::export::{confirmed_tracks, ConfirmedTrack};
use crate::gating::{Gated, GatingEngine};
use crate::lookahead::{ClosestMiss, LookaheadExtension};
use crate::pruning::conflict::ConflictGroups;
use crate::pruning::{PruneMode, PruneReport, Pruner};
use crate::scoring::{ScoreMemo, Scorer};
use crate::tracker::builder::BoundsFilter;
use crate::tracker::checkpoint::Checkpoint;
use crate::tracker::correction::CorrectionHook;
use crate::tree::{Forest, NodeId};
use crate::Errors;
use anyhow::Result;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Instant;

/// Tracker builder
pub mod builder;

/// Resumable run state
pub mod checkpoint;

/// External replacement of ambiguous detections
pub mod correction;

pub const DEFAULT_GATE_DIST_KM: f64 = 150.0;
pub const DEFAULT_PRUNE_DEPTH: usize = 2;

/// Tracker parameters
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MhtOptions {
    /// Maximal association distance in kilometers
    pub gate_dist: f64,
    /// Number of frames the pruning lags behind the newest frame
    pub prune_depth: usize,
    pub prune_mode: PruneMode,
    /// Allow a branch to survive one frame without a detection
    pub lookahead: bool,
}

impl Default for MhtOptions {
    fn default() -> Self {
        Self {
            gate_dist: DEFAULT_GATE_DIST_KM,
            prune_depth: DEFAULT_PRUNE_DEPTH,
            prune_mode: PruneMode::default(),
            lookahead: true,
        }
    }
}

/// Detections observed at one timestep
///
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Timestep identifier, e.g. the date of the observation
    pub id: String,
    pub detections: Vec<Detection>,
}

impl Frame {
    pub fn new(id: impl Into<String>, detections: Vec<Detection>) -> Self {
        Self {
            id: id.into(),
            detections,
        }
    }
}

/// What processing one frame did to the forest
///
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub depth: usize,
    /// Detections that passed the bounds filter
    pub accepted: usize,
    /// Detections rejected by the bounds filter
    pub filtered: usize,
    /// Detections that started a new track
    pub rooted: usize,
    /// Hypotheses created under open branches
    pub extended: usize,
    /// Corrections applied
    pub corrected: usize,
    /// Missed-detection placeholders created
    pub placeholders: usize,
    /// Outcome of the lagged pruning pass, if one ran
    pub pruned: Option<PruneReport>,
}

/// Frame orchestrator.
///
/// Every frame goes through the same steps:
/// 1. detections are checked, labeled with `(timestep, ordinal)` and passed through the bounds
///    filter;
/// 2. they are gated against the open branches of the previous depth;
/// 3. the correction hook, if any, may replace ambiguous detections;
/// 4. open branches that found nothing get a placeholder;
/// 5. the depth `prune_depth` frames back is pruned.
///
/// A frame is either applied completely or not at all. Malformed input is rejected before the
/// forest is touched. Any other failure leaves the forest in an unknown state, so the tracker
/// refuses every later frame with [Errors::Poisoned](Errors::Poisoned).
///
pub struct MultiHypothesisTracker {
    options: MhtOptions,
    gating: GatingEngine,
    scorer: Scorer,
    lookahead: LookaheadExtension,
    forest: Forest,
    depth: usize,
    closest: Vec<ClosestMiss>,
    timesteps: Vec<String>,
    bounds: Option<BoundsFilter>,
    correction: Option<Box<dyn CorrectionHook>>,
    poisoned: bool,
}

impl MultiHypothesisTracker {
    pub(crate) fn new(
        options: MhtOptions,
        bounds: Option<BoundsFilter>,
        correction: Option<Box<dyn CorrectionHook>>,
    ) -> Result<Self> {
        Ok(Self {
            gating: GatingEngine::new(options.gate_dist)?,
            scorer: Scorer::new(options.gate_dist),
            lookahead: LookaheadExtension::new(options.gate_dist),
            options,
            forest: Forest::new(),
            depth: 0,
            closest: Vec::default(),
            timesteps: Vec::default(),
            bounds,
            correction,
            poisoned: false,
        })
    }

    pub(crate) fn resume(&mut self, checkpoint: Checkpoint) {
        info!(
            "Resuming at depth {} with {} roots",
            checkpoint.start_depth,
            checkpoint.forest.roots().len()
        );
        self.forest = checkpoint.forest;
        self.depth = checkpoint.start_depth;
        self.closest = checkpoint.closest;
        self.timesteps = checkpoint.timesteps;
    }

    pub fn options(&self) -> &MhtOptions {
        &self.options
    }

    /// Depth the next frame will be processed at
    ///
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn timesteps(&self) -> &[String] {
        &self.timesteps
    }

    pub fn closest(&self) -> &[ClosestMiss] {
        &self.closest
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Processes the next frame.
    ///
    /// A frame is applied entirely or not at all. When processing fails, the forest and the
    /// closest-miss log are restored to their state before the frame and the tracker is poisoned:
    /// further frames are refused, while the checkpoint and the confirmed tracks stay usable.
    ///
    pub fn add_frame(&mut self, frame: Frame) -> Result<FrameReport> {
        if self.poisoned {
            return Err(Errors::Poisoned.into());
        }
        if let Some(pos) = frame.detections.iter().position(|d| !d.is_well_formed()) {
            return Err(Errors::MalformedDetection {
                frame: frame.id,
                ordinal: pos + 1,
            }
            .into());
        }

        let started = Instant::now();
        let id = frame.id.clone();
        let forest = self.forest.clone();
        let closest = self.closest.len();
        match self.apply(frame) {
            Ok(report) => {
                info!(
                    "Frame `{}` at depth {}: {} detections, {} roots, {} extensions, {} placeholders, {} nodes live, took {:?}",
                    id,
                    report.depth,
                    report.accepted,
                    report.rooted,
                    report.extended,
                    report.placeholders,
                    self.forest.len(),
                    started.elapsed()
                );
                Ok(report)
            }
            Err(e) => {
                error!("Frame `{}` failed, the tracker is poisoned: {}", id, e);
                self.forest = forest;
                self.closest.truncate(closest);
                self.poisoned = true;
                Err(e)
            }
        }
    }

    /// Processes a sequence of frames, indexed by depth.
    ///
    /// Frames already covered by a resumed run are skipped.
    ///
    pub fn run<I>(&mut self, frames: I) -> Result<Vec<FrameReport>>
    where
        I: IntoIterator<Item = Frame>,
    {
        let start = self.depth;
        frames
            .into_iter()
            .skip(start)
            .map(|frame| self.add_frame(frame))
            .collect()
    }

    fn apply(&mut self, frame: Frame) -> Result<FrameReport> {
        let t = self.depth;
        let Frame { id, detections } = frame;
        let total = detections.len();
        let mut detections = self.admit(detections, t, 1);
        let mut report = FrameReport {
            depth: t,
            accepted: detections.len(),
            filtered: total - detections.len(),
            ..Default::default()
        };

        let parents = self.open_parents(t)?;
        self.gate_all(&detections, &parents, t, &mut report)?;

        if t > 0 && self.correction.is_some() {
            self.correct(t, &parents, total + 1, &mut detections, &mut report)?;
        }

        if self.options.lookahead {
            report.placeholders = self
                .lookahead
                .extend(&mut self.forest, &parents, &detections, &mut self.closest)?
                .len();
        }

        if t >= self.options.prune_depth {
            let depth = t - self.options.prune_depth;
            report.pruned = Some(
                self.options
                    .prune_mode
                    .prune(&mut self.forest, depth, &self.scorer)?,
            );
        }

        if cfg!(debug_assertions) {
            self.forest.validate()?;
        }

        self.timesteps.truncate(t);
        self.timesteps.push(id);
        self.depth += 1;
        Ok(report)
    }

    /// Labels the detections and drops the ones outside the bounds
    ///
    fn admit(&self, detections: Vec<Detection>, t: usize, first: usize) -> Vec<Arc<Detection>> {
        detections
            .into_iter()
            .enumerate()
            .map(|(i, d)| d.labeled(t, first + i))
            .filter(|d| self.bounds.as_ref().map(|b| b(d)).unwrap_or(true))
            .map(Arc::new)
            .collect()
    }

    /// Branches of the previous depth that are still undecided
    ///
    fn open_parents(&self, t: usize) -> Result<Vec<NodeId>> {
        if t == 0 {
            return Ok(Vec::default());
        }
        let mut parents = Vec::default();
        for id in self.forest.nodes_at_depth(t - 1) {
            if !self.forest.node(id)?.is_final() {
                parents.push(id);
            }
        }
        Ok(parents)
    }

    fn gate_all(
        &mut self,
        detections: &[Arc<Detection>],
        parents: &[NodeId],
        t: usize,
        report: &mut FrameReport,
    ) -> Result<()> {
        let plan = self.gating.plan(&self.forest, detections, parents)?;
        for (detection, associations) in detections.iter().zip(plan) {
            match self
                .gating
                .attach(&mut self.forest, detection.clone(), &associations, t)?
            {
                Gated::Rooted(_) => report.rooted += 1,
                Gated::Extended(nodes) => report.extended += nodes.len(),
            }
        }
        Ok(())
    }

    /// Runs the correction hook over the freshly gated frame and applies what it returns
    ///
    fn correct(
        &mut self,
        t: usize,
        parents: &[NodeId],
        mut next_ordinal: usize,
        detections: &mut Vec<Arc<Detection>>,
        report: &mut FrameReport,
    ) -> Result<()> {
        self.scorer
            .refresh(&mut self.forest, t, &mut ScoreMemo::new())?;
        let groups = ConflictGroups::collect(&self.forest, t)?;
        let corrections = match self.correction.as_mut() {
            Some(hook) => hook.correct(t, &self.forest, &groups)?,
            None => return Ok(()),
        };

        for correction in corrections {
            let group = match groups.by_key(&correction.replaces) {
                Some(group) => group,
                None => {
                    warn!(
                        "Correction dropped, detection {} is not in the frame",
                        correction.replaces
                    );
                    continue;
                }
            };
            if correction.detections.iter().any(|d| !d.is_well_formed()) {
                warn!(
                    "Correction of {} dropped, a replacement has malformed geometry",
                    correction.replaces
                );
                continue;
            }

            for claim in group.live(&self.forest) {
                self.forest.discard(claim.node)?;
            }
            detections.retain(|d| d.key() != correction.replaces);

            let count = correction.detections.len();
            let replacements = self.admit(correction.detections, t, next_ordinal);
            next_ordinal += count;
            report.accepted += replacements.len();
            report.filtered += count - replacements.len();
            self.gate_all(&replacements, parents, t, report)?;
            detections.extend(replacements);
            report.corrected += 1;
        }
        Ok(())
    }

    /// Tracks that are no longer subject to pruning
    ///
    pub fn confirmed_tracks(&self) -> Vec<ConfirmedTrack> {
        confirmed_tracks(&self.forest, &self.timesteps, self.options.prune_depth)
    }

    /// Snapshot of the run that can be handed to [MhtBuilder::resume](builder::MhtBuilder::resume)
    ///
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            forest: self.forest.clone(),
            start_depth: self.depth,
            prune_depth: self.options.prune_depth,
            gate_dist: self.options.gate_dist,
            closest: self.closest.clone(),
            timesteps: self.timesteps.clone(),
        }
    }

    pub fn into_checkpoint(self) -> Checkpoint {
        Checkpoint {
            forest: self.forest,
            start_depth: self.depth,
            prune_depth: self.options.prune_depth,
            gate_dist: self.options.gate_dist,
            closest: self.closest,
            timesteps: self.timesteps,
        }
    }
}
