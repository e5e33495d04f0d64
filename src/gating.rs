use crate::detection::Detection;
use crate::tree::{Forest, HypothesisNode, NodeId};
use crate::Errors;
use anyhow::Result;
use log::debug;
use rayon::prelude::*;
use std::sync::Arc;

/// Candidate link between an open branch and a new detection
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Association {
    pub parent: NodeId,
    /// Great-circle distance in kilometers
    pub distance: f64,
}

/// Result of gating one detection
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gated {
    /// New hypotheses, one per parent the detection gated to, in parent order
    Extended(Vec<NodeId>),
    /// The detection gated nowhere and started a new track
    Rooted(NodeId),
}

impl Gated {
    pub fn nodes(&self) -> Vec<NodeId> {
        match self {
            Gated::Extended(nodes) => nodes.clone(),
            Gated::Rooted(root) => vec![*root],
        }
    }
}

/// Proposes the open branches a new detection may continue.
///
#[derive(Debug, Clone, Copy)]
pub struct GatingEngine {
    gate_dist: f64,
}

impl GatingEngine {
    /// Creates the engine
    ///
    /// # Parameters
    /// * `gate_dist` - maximal association distance in kilometers
    ///
    pub fn new(gate_dist: f64) -> Result<Self> {
        if !(gate_dist.is_finite() && gate_dist > 0.0) {
            return Err(Errors::InvalidGateDistance(gate_dist).into());
        }
        Ok(Self { gate_dist })
    }

    pub fn gate_dist(&self) -> f64 {
        self.gate_dist
    }

    /// Every parent within `gate_dist` of `detection`, in the order of `parents`
    ///
    /// Sentinel parents never associate.
    ///
    pub fn associate(
        &self,
        forest: &Forest,
        detection: &Detection,
        parents: &[NodeId],
    ) -> Result<Vec<Association>> {
        let mut associations = Vec::default();
        for parent in parents {
            let node = forest.node(*parent)?;
            if let Some(prev) = node.detection_ref() {
                let distance = prev.distance_to(detection);
                if distance <= self.gate_dist {
                    associations.push(Association {
                        parent: *parent,
                        distance,
                    });
                }
            }
        }
        Ok(associations)
    }

    /// Associations for a whole frame.
    ///
    /// The forest is only read, so the detections are evaluated in parallel. The output keeps the
    /// order of `detections`.
    ///
    pub fn plan(
        &self,
        forest: &Forest,
        detections: &[Arc<Detection>],
        parents: &[NodeId],
    ) -> Result<Vec<Vec<Association>>> {
        detections
            .par_iter()
            .map(|d| self.associate(forest, d, parents))
            .collect()
    }

    /// Materializes the associations of one detection.
    ///
    /// Every association yields a distinct node carrying the shared detection, and every new node
    /// immediately gets an `END` child. Without associations the detection becomes a new root.
    ///
    pub fn attach(
        &self,
        forest: &mut Forest,
        detection: Arc<Detection>,
        associations: &[Association],
        depth: usize,
    ) -> Result<Gated> {
        if associations.is_empty() {
            let root = forest.insert(HypothesisNode::detection(detection, depth, 0.0));
            forest.add_end(root)?;
            forest.push_root(root)?;
            debug!("Detection rooted as {}", root);
            return Ok(Gated::Rooted(root));
        }

        let mut nodes = Vec::with_capacity(associations.len());
        for a in associations {
            let node = forest.insert(HypothesisNode::detection(
                detection.clone(),
                depth,
                a.distance,
            ));
            forest.add_end(node)?;
            forest.add_child(a.parent, node)?;
            nodes.push(node);
        }
        debug!(
            "Detection {} extends {} branches",
            detection,
            associations.len()
        );
        Ok(Gated::Extended(nodes))
    }

    /// [associate](GatingEngine::associate) followed by [attach](GatingEngine::attach)
    ///
    pub fn gate(
        &self,
        forest: &mut Forest,
        detection: Arc<Detection>,
        parents: &[NodeId],
        depth: usize,
    ) -> Result<Gated> {
        let associations = self.associate(forest, &detection, parents)?;
        self.attach(forest, detection, &associations, depth)
    }
}

#[cfg(test)]
mod tests {
    use crate::detection::Detection;
    use crate::gating::{Gated, GatingEngine};
    use crate::tree::Forest;
    use crate::Errors;
    use anyhow::Result;
    use std::sync::Arc;

    fn det(lat: f64, lon: f64, t: usize) -> Arc<Detection> {
        Arc::new(Detection::new(lat, lon).labeled(t, 1))
    }

    #[test]
    fn invalid_gate() {
        for g in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let e = GatingEngine::new(g).unwrap_err().downcast::<Errors>().unwrap();
            assert!(matches!(e, Errors::InvalidGateDistance(_)));
        }
    }

    #[test]
    fn one_degree_gates_two_does_not() -> Result<()> {
        let gating = GatingEngine::new(150.0)?;
        let mut forest = Forest::new();
        let root = match gating.gate(&mut forest, det(0.0, 0.0, 0), &[], 0)? {
            Gated::Rooted(root) => root,
            g => panic!("unexpected {:?}", g),
        };
        assert_eq!(forest.roots(), &[root]);

        let near = gating.associate(&forest, &det(0.0, 1.0, 1), &[root])?;
        assert_eq!(near.len(), 1);
        assert!(near[0].distance > 111.0 && near[0].distance < 112.0);

        let far = gating.associate(&forest, &det(0.0, 2.0, 1), &[root])?;
        assert!(far.is_empty());

        let g = gating.gate(&mut forest, det(0.0, 1.0, 1), &[root], 1)?;
        let child = match g {
            Gated::Extended(nodes) => nodes[0],
            g => panic!("unexpected {:?}", g),
        };
        let node = forest.node(child)?;
        assert_eq!(node.origin_depth(), 1);
        assert!(node.association_distance() > 111.0);
        assert_eq!(node.children().len(), 1);
        assert!(forest.node(node.children()[0])?.payload().is_end());

        let g = gating.gate(&mut forest, det(0.0, 2.0, 1), &[root], 1)?;
        assert!(matches!(g, Gated::Rooted(_)));
        assert_eq!(forest.roots().len(), 2);
        forest.validate()?;
        Ok(())
    }

    #[test]
    fn fan_out() -> Result<()> {
        let gating = GatingEngine::new(150.0)?;
        let mut forest = Forest::new();
        let p1 = gating.gate(&mut forest, det(0.0, 0.0, 0), &[], 0)?.nodes()[0];
        let p2 = gating.gate(&mut forest, det(0.0, 1.0, 0), &[], 0)?.nodes()[0];

        let shared = det(0.0, 0.5, 1);
        let nodes = gating.gate(&mut forest, shared.clone(), &[p1, p2], 1)?.nodes();
        assert_eq!(nodes.len(), 2);
        assert_ne!(nodes[0], nodes[1]);
        assert_eq!(forest.node(nodes[0])?.parent(), Some(p1));
        assert_eq!(forest.node(nodes[1])?.parent(), Some(p2));
        let d0 = forest.node(nodes[0])?.detection_ref().unwrap();
        let d1 = forest.node(nodes[1])?.detection_ref().unwrap();
        assert_eq!(d0, d1);
        assert!(d0.same_object(&shared));
        forest.validate()?;
        Ok(())
    }

    #[test]
    fn plan_keeps_frame_order() -> Result<()> {
        let gating = GatingEngine::new(150.0)?;
        let mut forest = Forest::new();
        let p1 = gating.gate(&mut forest, det(0.0, 0.0, 0), &[], 0)?.nodes()[0];
        let p2 = gating.gate(&mut forest, det(0.0, 10.0, 0), &[], 0)?.nodes()[0];
        let frame = vec![det(0.0, 10.5, 1), det(0.0, 50.0, 1), det(0.0, 0.5, 1)];
        let plan = gating.plan(&forest, &frame, &[p1, p2])?;
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].len(), 1);
        assert_eq!(plan[0][0].parent, p2);
        assert!(plan[1].is_empty());
        assert_eq!(plan[2][0].parent, p1);
        Ok(())
    }
}
