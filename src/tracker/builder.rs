use crate::detection::Detection;
use crate::pruning::PruneMode;
use crate::tracker::checkpoint::Checkpoint;
use crate::tracker::correction::CorrectionHook;
use crate::tracker::{MhtOptions, MultiHypothesisTracker};
use anyhow::Result;

/// Predicate deciding whether a detection enters gating
///
pub type BoundsFilter = Box<dyn Fn(&Detection) -> bool + Send + Sync>;

/// Builder for [MultiHypothesisTracker](MultiHypothesisTracker)
///
/// Every setter may be called once. Unset parameters take the [MhtOptions](MhtOptions) defaults.
///
#[derive(Default)]
pub struct MhtBuilder {
    gate_dist: Option<f64>,
    prune_depth: Option<usize>,
    prune_mode: Option<PruneMode>,
    lookahead: Option<bool>,
    bounds: Option<BoundsFilter>,
    correction: Option<Box<dyn CorrectionHook>>,
    resume: Option<Checkpoint>,
}

impl MhtBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximal association distance in kilometers
    ///
    pub fn gate_dist(mut self, gate_dist: f64) -> Self {
        assert!(
            self.gate_dist.is_none(),
            "The method `gate_dist` must be called once."
        );
        self.gate_dist = Some(gate_dist);
        self
    }

    /// Sets how many frames the pruning lags behind the newest one
    ///
    pub fn prune_depth(mut self, prune_depth: usize) -> Self {
        assert!(
            self.prune_depth.is_none(),
            "The method `prune_depth` must be called once."
        );
        self.prune_depth = Some(prune_depth);
        self
    }

    pub fn prune_mode(mut self, prune_mode: PruneMode) -> Self {
        assert!(
            self.prune_mode.is_none(),
            "The method `prune_mode` must be called once."
        );
        self.prune_mode = Some(prune_mode);
        self
    }

    /// Enables or disables missed-detection placeholders
    ///
    pub fn lookahead(mut self, lookahead: bool) -> Self {
        assert!(
            self.lookahead.is_none(),
            "The method `lookahead` must be called once."
        );
        self.lookahead = Some(lookahead);
        self
    }

    /// Sets the predicate detections must satisfy to be tracked
    ///
    pub fn bounds<F>(mut self, bounds: F) -> Self
    where
        F: Fn(&Detection) -> bool + Send + Sync + 'static,
    {
        assert!(
            self.bounds.is_none(),
            "The method `bounds` must be called once."
        );
        self.bounds = Some(Box::new(bounds));
        self
    }

    /// Sets the step that may replace ambiguous detections after gating
    ///
    pub fn correction<H>(mut self, hook: H) -> Self
    where
        H: CorrectionHook + 'static,
    {
        assert!(
            self.correction.is_none(),
            "The method `correction` must be called once."
        );
        self.correction = Some(Box::new(hook));
        self
    }

    /// Continues a previous run.
    ///
    /// The gating distance and the prune depth of the checkpoint take precedence over the values
    /// set on the builder.
    ///
    pub fn resume(mut self, checkpoint: Checkpoint) -> Self {
        assert!(
            self.resume.is_none(),
            "The method `resume` must be called once."
        );
        self.resume = Some(checkpoint);
        self
    }

    /// Builds the tracker, the gating distance is validated
    ///
    pub fn build(self) -> Result<MultiHypothesisTracker> {
        let defaults = MhtOptions::default();
        let mut options = MhtOptions {
            gate_dist: self.gate_dist.unwrap_or(defaults.gate_dist),
            prune_depth: self.prune_depth.unwrap_or(defaults.prune_depth),
            prune_mode: self.prune_mode.unwrap_or(defaults.prune_mode),
            lookahead: self.lookahead.unwrap_or(defaults.lookahead),
        };
        if let Some(checkpoint) = &self.resume {
            options.gate_dist = checkpoint.gate_dist;
            options.prune_depth = checkpoint.prune_depth;
        }
        let mut tracker = MultiHypothesisTracker::new(options, self.bounds, self.correction)?;
        if let Some(checkpoint) = self.resume {
            tracker.resume(checkpoint);
        }
        Ok(tracker)
    }
}
