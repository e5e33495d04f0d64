use crate::tree::{Forest, HypothesisNode, NodeId};
use anyhow::Result;
use std::collections::HashMap;

/// Memo of the best continuation of every visited subtree.
///
/// Entries stay valid while the subtree below the node is unchanged. After a structural change
/// the node and all its ancestors must be [invalidated](ScoreMemo::invalidate).
///
#[derive(Debug, Default, Clone)]
pub struct ScoreMemo {
    best: HashMap<NodeId, f64>,
}

impl ScoreMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<f64> {
        self.best.get(&id).copied()
    }

    /// Drops the entries of `id` and of every ancestor of `id`
    ///
    pub fn invalidate(&mut self, forest: &Forest, id: NodeId) {
        let mut current = Some(id);
        while let Some(id) = current {
            self.best.remove(&id);
            current = forest.get(id).and_then(|n| n.parent());
        }
    }

    pub fn clear(&mut self) {
        self.best.clear();
    }
}

/// Path quality computed from association distances.
///
/// Every interior node of a path contributes `gate_dist - association_distance`, so a tight
/// association is rewarded and a placeholder (associated at exactly `gate_dist`) is neutral.
///
#[derive(Debug, Clone, Copy)]
pub struct Scorer {
    gate_dist: f64,
}

impl Scorer {
    pub fn new(gate_dist: f64) -> Self {
        Self { gate_dist }
    }

    pub fn gate_dist(&self) -> f64 {
        self.gate_dist
    }

    /// Contribution of one interior node
    ///
    pub fn gain(&self, node: &HypothesisNode) -> f64 {
        self.gate_dist - node.association_distance()
    }

    /// Score of a path: the sum of gains over the nodes between the first and the last one
    ///
    pub fn path_score(&self, forest: &Forest, path: &[NodeId]) -> Result<f64> {
        if path.len() <= 2 {
            return Ok(0.0);
        }
        path[1..path.len() - 1]
            .iter()
            .try_fold(0.0, |acc, id| Ok(acc + self.gain(forest.node(*id)?)))
    }

    /// Maximal [path_score](Scorer::path_score) over all the paths from `id` down to a leaf
    ///
    /// Computed bottom-up with an explicit stack, results are kept in `memo`.
    ///
    pub fn best_continuation(
        &self,
        forest: &Forest,
        id: NodeId,
        memo: &mut ScoreMemo,
    ) -> Result<f64> {
        if let Some(best) = memo.get(id) {
            return Ok(best);
        }

        let mut stack = vec![(id, false)];
        while let Some((current, expanded)) = stack.pop() {
            if memo.get(current).is_some() {
                continue;
            }
            let node = forest.node(current)?;
            if !expanded {
                stack.push((current, true));
                stack.extend(
                    node.children()
                        .iter()
                        .filter(|c| memo.get(**c).is_none())
                        .map(|c| (*c, false)),
                );
                continue;
            }

            let mut best = 0.0_f64;
            for (n, c) in node.children().iter().enumerate() {
                let child = forest.node(*c)?;
                let through = if child.is_leaf() {
                    0.0
                } else {
                    self.gain(child) + memo.get(*c).unwrap_or_default()
                };
                if n == 0 || through > best {
                    best = through;
                }
            }
            memo.best.insert(current, best);
        }
        Ok(memo.get(id).unwrap_or_default())
    }

    /// Best score of the paths that leave a parent through `child`
    ///
    pub fn score_via(&self, forest: &Forest, child: NodeId, memo: &mut ScoreMemo) -> Result<f64> {
        let node = forest.node(child)?;
        if node.is_leaf() {
            return Ok(0.0);
        }
        Ok(self.gain(node) + self.best_continuation(forest, child, memo)?)
    }

    /// Recomputes `cumulative_score` for the hypotheses created at `depth`.
    ///
    /// A child of a node at `depth - 1` gets its parent's score plus its own best continuation,
    /// a root created at `depth` gets its best continuation. Nothing above `depth` is touched,
    /// those scores were fixed by earlier passes.
    ///
    pub fn refresh(&self, forest: &mut Forest, depth: usize, memo: &mut ScoreMemo) -> Result<()> {
        let mut updates = Vec::default();
        if depth > 0 {
            for parent in forest.nodes_at_depth(depth - 1) {
                let p = forest.node(parent)?;
                for child in p.children() {
                    if forest.node(*child)?.is_sentinel() {
                        continue;
                    }
                    let best = self.best_continuation(forest, *child, memo)?;
                    updates.push((*child, p.cumulative_score() + best));
                }
            }
        }
        for root in forest.roots_at_depth(depth) {
            let best = self.best_continuation(forest, root, memo)?;
            updates.push((root, best));
        }

        for (id, score) in updates {
            forest.set_cumulative_score(id, score)?;
        }
        Ok(())
    }
}
