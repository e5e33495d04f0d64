use crate::detection::{Detection, DetectionKey};
use crate::tree::{Forest, NodeId};
use crate::Errors;
use anyhow::Result;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// One hypothesis claiming a detection: the `(score, parent, child)` triple.
///
/// Claims are totally ordered: the higher cumulative score is greater, ties go to the claim whose
/// parent was created first (roots come last), then to the earlier created child.
///
#[derive(Debug, Clone, Copy)]
pub struct Claim {
    pub node: NodeId,
    pub parent: Option<NodeId>,
    pub score: f64,
    seq: u64,
    parent_seq: Option<u64>,
}

impl Claim {
    pub fn of(forest: &Forest, node: NodeId) -> Result<Self> {
        let n = forest.node(node)?;
        let parent_seq = match n.parent() {
            Some(p) => Some(forest.node(p)?.seq()),
            None => None,
        };
        Ok(Self {
            node,
            parent: n.parent(),
            score: n.cumulative_score(),
            seq: n.seq(),
            parent_seq,
        })
    }

    /// The hypothesis still hangs where it hung when the claim was taken
    ///
    pub fn is_live(&self, forest: &Forest) -> bool {
        match forest.get(self.node) {
            Some(n) if n.parent() == self.parent => {
                self.parent.is_some() || forest.is_root(self.node)
            }
            _ => false,
        }
    }

    /// The parent already decided its branch, the claim cannot be removed
    ///
    pub fn is_locked(&self, forest: &Forest) -> bool {
        self.parent
            .and_then(|p| forest.get(p))
            .map(|p| p.is_final())
            .unwrap_or(false)
    }
}

impl Ord for Claim {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| {
                let parent_rank = |c: &Claim| c.parent_seq.unwrap_or(u64::MAX);
                parent_rank(other).cmp(&parent_rank(self))
            })
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Claim {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Claim {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Claim {}

/// All hypotheses, across parents, that represent the same logical detection
///
#[derive(Debug, Clone)]
pub struct ConflictGroup {
    key: DetectionKey,
    detection: Arc<Detection>,
    claims: Vec<Claim>,
}

impl ConflictGroup {
    pub fn key(&self) -> DetectionKey {
        self.key
    }

    pub fn detection(&self) -> &Arc<Detection> {
        &self.detection
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Highest claim of the group, an empty group is an internal error
    ///
    pub fn best(&self) -> Result<&Claim> {
        self.claims
            .iter()
            .max()
            .ok_or_else(|| Errors::EmptyConflictGroup.into())
    }

    /// Claims that still hang where they were collected
    ///
    pub fn live(&self, forest: &Forest) -> Vec<Claim> {
        self.claims
            .iter()
            .filter(|c| c.is_live(forest))
            .copied()
            .collect()
    }

    /// Whether the detection looks like several objects merged by under-segmentation.
    ///
    /// It does when more than one hypothesis claims it and it is not smaller than
    /// `area_coeff` times the surface area of any of the detections it continues.
    ///
    pub fn looks_like_merge(&self, forest: &Forest, area_coeff: f64) -> Result<bool> {
        if self.claims.len() < 2 {
            return Ok(false);
        }
        for claim in &self.claims {
            let parent = match claim.parent {
                Some(p) => forest.node(p)?,
                None => continue,
            };
            if let Some(prev) = parent.detection_ref() {
                if area_coeff * prev.surface_area() > self.detection.surface_area() {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

/// Conflict groups of one depth, rebuilt from scratch on every pass.
///
/// Groups keep the order their detections were first met in: parents in
/// [nodes_at_depth](Forest::nodes_at_depth) order with their children in insertion order, then
/// the roots created at that depth.
///
#[derive(Debug, Clone, Default)]
pub struct ConflictGroups {
    depth: usize,
    groups: Vec<ConflictGroup>,
    by_key: HashMap<DetectionKey, usize>,
    by_node: HashMap<NodeId, usize>,
}

impl ConflictGroups {
    /// Groups the real children of every node at `depth - 1` and every root created at `depth`
    ///
    /// Claims carry the current `cumulative_score`, it must be refreshed beforehand.
    ///
    pub fn collect(forest: &Forest, depth: usize) -> Result<Self> {
        let mut groups = Self {
            depth,
            ..Default::default()
        };
        if depth > 0 {
            for parent in forest.nodes_at_depth(depth - 1) {
                for child in forest.node(parent)?.children() {
                    groups.push(forest, *child)?;
                }
            }
        }
        for root in forest.roots_at_depth(depth) {
            groups.push(forest, root)?;
        }
        Ok(groups)
    }

    fn push(&mut self, forest: &Forest, node: NodeId) -> Result<()> {
        let detection = match forest.node(node)?.detection_ref() {
            Some(d) => d.clone(),
            None => return Ok(()),
        };
        let key = detection.key();
        let claim = Claim::of(forest, node)?;
        let index = match self.by_key.get(&key) {
            Some(index) => *index,
            None => {
                self.groups.push(ConflictGroup {
                    key,
                    detection,
                    claims: Vec::default(),
                });
                self.by_key.insert(key, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        self.groups[index].claims.push(claim);
        self.by_node.insert(node, index);
        Ok(())
    }

    /// Takes a fresh claim for `node` after it moved, e.g. when it was re-rooted
    ///
    pub(crate) fn rebind(&mut self, forest: &Forest, node: NodeId) -> Result<()> {
        let index = match self.by_node.get(&node) {
            Some(index) => *index,
            None => return Ok(()),
        };
        let fresh = Claim::of(forest, node)?;
        if let Some(claim) = self.groups[index]
            .claims
            .iter_mut()
            .find(|c| c.node == node)
        {
            *claim = fresh;
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConflictGroup> {
        self.groups.iter()
    }

    pub fn get(&self, index: usize) -> Option<&ConflictGroup> {
        self.groups.get(index)
    }

    pub fn by_key(&self, key: &DetectionKey) -> Option<&ConflictGroup> {
        self.by_key.get(key).map(|i| &self.groups[*i])
    }

    /// Index of the group `node` was collected into
    ///
    pub fn index_of(&self, node: NodeId) -> Option<usize> {
        self.by_node.get(&node).copied()
    }
}
