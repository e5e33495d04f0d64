use crate::detection::Detection;
use crate::tree::{Forest, HypothesisNode, NodeId};
use anyhow::Result;
use itertools::Itertools;
use log::debug;
use std::sync::Arc;

/// Closest detection of the frame a branch missed, kept for later inspection of lost tracks
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestMiss {
    pub lat: f64,
    pub lon: f64,
    /// Distance from the missed branch in kilometers
    pub distance: f64,
}

impl ClosestMiss {
    /// Entry of a frame without detections: no position, infinitely far
    ///
    pub fn nothing() -> Self {
        Self {
            lat: 0.0,
            lon: 0.0,
            distance: f64::INFINITY,
        }
    }

    pub fn is_nothing(&self) -> bool {
        self.distance == f64::INFINITY
    }
}

/// Lets a branch survive exactly one frame without a matching detection.
///
#[derive(Debug, Clone, Copy)]
pub struct LookaheadExtension {
    gate_dist: f64,
}

impl LookaheadExtension {
    pub fn new(gate_dist: f64) -> Self {
        Self { gate_dist }
    }

    /// Whether `parent` found no real continuation and may get a placeholder
    ///
    fn needs_placeholder(forest: &Forest, parent: NodeId) -> Result<bool> {
        let node = forest.node(parent)?;
        if node.is_missing() || node.is_final() || node.is_sentinel() {
            return Ok(false);
        }
        Ok(match node.children() {
            [only] => forest.node(*only)?.payload().is_end(),
            _ => false,
        })
    }

    /// Adds a placeholder under every open parent whose only child is `END`.
    ///
    /// The placeholder repeats the parent's detection, is associated at `gate_dist` and gets an
    /// `END` child. A placeholder never gets a placeholder of its own. For every placeholder the
    /// closest detection of `frame` is appended to `closest` and the parent remembers its index.
    /// An empty frame records [ClosestMiss::nothing](ClosestMiss::nothing).
    ///
    /// # Returns
    /// The created placeholders
    ///
    pub fn extend(
        &self,
        forest: &mut Forest,
        parents: &[NodeId],
        frame: &[Arc<Detection>],
        closest: &mut Vec<ClosestMiss>,
    ) -> Result<Vec<NodeId>> {
        let mut created = Vec::default();
        for parent in parents {
            if !Self::needs_placeholder(forest, *parent)? {
                continue;
            }
            let node = forest.node(*parent)?;
            let detection = match node.detection_ref() {
                Some(d) => d.clone(),
                None => continue,
            };
            let depth = node.origin_depth() + 1;

            let placeholder = forest.insert(HypothesisNode::missing(
                detection.clone(),
                depth,
                self.gate_dist,
            ));
            forest.add_end(placeholder)?;
            forest.add_child(*parent, placeholder)?;
            created.push(placeholder);

            let miss = frame
                .iter()
                .map(|d| ClosestMiss {
                    lat: d.lat(),
                    lon: d.lon(),
                    distance: detection.distance_to(d),
                })
                .min_by(|a, b| a.distance.total_cmp(&b.distance))
                .unwrap_or_else(ClosestMiss::nothing);
            closest.push(miss);
            forest.set_closest(*parent, closest.len() - 1)?;
        }

        if !created.is_empty() {
            debug!(
                "Placeholders added: {}",
                created.iter().map(|id| id.to_string()).join(", ")
            );
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use crate::detection::Detection;
    use crate::gating::GatingEngine;
    use crate::lookahead::{ClosestMiss, LookaheadExtension};
    use crate::tree::Forest;
    use anyhow::Result;
    use std::sync::Arc;

    fn det(lat: f64, lon: f64, t: usize) -> Arc<Detection> {
        Arc::new(Detection::new(lat, lon).labeled(t, 1))
    }

    #[test]
    fn one_missed_frame_only() -> Result<()> {
        let gating = GatingEngine::new(150.0)?;
        let lookahead = LookaheadExtension::new(150.0);
        let mut forest = Forest::new();
        let mut closest = Vec::default();

        let root = gating.gate(&mut forest, det(0.0, 0.0, 0), &[], 0)?.nodes()[0];

        // frame 1: only a far detection
        let far = det(0.0, 20.0, 1);
        gating.gate(&mut forest, far.clone(), &[root], 1)?;
        let created = lookahead.extend(&mut forest, &[root], &[far], &mut closest)?;
        assert_eq!(created.len(), 1);
        let miss = created[0];
        let node = forest.node(miss)?;
        assert!(node.is_missing());
        assert_eq!(node.origin_depth(), 1);
        assert!((node.association_distance() - 150.0).abs() < f64::EPSILON);
        assert!(node.detection_ref().unwrap().same_object(&det(0.0, 0.0, 0)));
        assert_eq!(forest.node(root)?.closest(), Some(0));
        assert_eq!(closest.len(), 1);
        assert!((closest[0].lon - 20.0).abs() < f64::EPSILON);

        // frame 2: nothing at all
        let parents = forest.nodes_at_depth(1);
        assert_eq!(parents.len(), 2);
        assert!(parents.contains(&miss));
        let created = lookahead.extend(&mut forest, &parents, &[], &mut closest)?;
        // the far detection started its own track and may miss one frame, the placeholder may not
        assert_eq!(created.len(), 1);
        assert_ne!(forest.node(created[0])?.parent(), Some(miss));
        // the far track missed a frame without detections
        assert_eq!(closest.len(), 2);
        assert!(closest[1].is_nothing());
        assert_eq!(forest.node(miss)?.closest(), None);
        assert_eq!(forest.node(miss)?.children().len(), 1);
        forest.validate()?;
        Ok(())
    }

    #[test]
    fn continued_branch_gets_nothing() -> Result<()> {
        let gating = GatingEngine::new(150.0)?;
        let lookahead = LookaheadExtension::new(150.0);
        let mut forest = Forest::new();
        let mut closest = Vec::default();
        let root = gating.gate(&mut forest, det(0.0, 0.0, 0), &[], 0)?.nodes()[0];
        let next = det(0.0, 0.1, 1);
        gating.gate(&mut forest, next.clone(), &[root], 1)?;
        let created = lookahead.extend(&mut forest, &[root], &[next], &mut closest)?;
        assert!(created.is_empty());
        assert!(closest.is_empty());
        assert_eq!(forest.node(root)?.closest(), None);
        Ok(())
    }

    #[test]
    fn empty_frame_is_recorded() -> Result<()> {
        let gating = GatingEngine::new(150.0)?;
        let lookahead = LookaheadExtension::new(150.0);
        let mut forest = Forest::new();
        let mut closest = vec![ClosestMiss {
            lat: 1.0,
            lon: 1.0,
            distance: 10.0,
        }];
        let root = gating.gate(&mut forest, det(0.0, 0.0, 0), &[], 0)?.nodes()[0];
        let created = lookahead.extend(&mut forest, &[root], &[], &mut closest)?;
        assert_eq!(created.len(), 1);
        assert_eq!(closest.len(), 2);
        assert_eq!(closest[1], ClosestMiss::nothing());
        assert!(closest[1].distance.is_infinite());
        assert!(!closest[0].is_nothing());
        assert_eq!(forest.node(root)?.closest(), Some(1));
        Ok(())
    }
}
