use crate::tree::{Forest, NodeId};
use std::collections::VecDeque;

/// Lazy breadth-first enumeration of root-to-leaf paths.
///
/// Children are expanded in insertion order, so the sequence is deterministic for a given forest.
/// The iterator borrows the forest, it cannot observe structural changes.
///
pub struct Tracks<'a> {
    forest: &'a Forest,
    pending: VecDeque<Vec<NodeId>>,
}

impl<'a> Iterator for Tracks<'a> {
    type Item = Vec<NodeId>;

    fn next(&mut self) -> Option<Self::Item> {
        let forest = self.forest;
        while let Some(path) = self.pending.pop_front() {
            let last = *path.last()?;
            let children = match forest.get(last) {
                Some(node) => node.children(),
                None => continue,
            };
            if children.is_empty() {
                return Some(path);
            }
            for child in children {
                let mut extended = path.clone();
                extended.push(*child);
                self.pending.push_back(extended);
            }
        }
        None
    }
}

impl Forest {
    /// Enumerates every path from `start` to a leaf
    ///
    pub fn tracks(&self, start: NodeId) -> Tracks<'_> {
        let mut pending = VecDeque::new();
        if self.contains(start) {
            pending.push_back(vec![start]);
        }
        Tracks {
            forest: self,
            pending,
        }
    }

    /// Every real (non-sentinel) node across the forest created at `depth`.
    ///
    /// Each tree is walked breadth-first from its root and the walk does not descend below a node
    /// whose `origin_depth` is at least `depth`. Nodes are returned root by root, in child order.
    ///
    pub fn nodes_at_depth(&self, depth: usize) -> Vec<NodeId> {
        let mut found = Vec::default();
        for root in &self.roots {
            let mut queue = VecDeque::from([*root]);
            while let Some(id) = queue.pop_front() {
                let node = match self.get(id) {
                    Some(node) => node,
                    None => continue,
                };
                if node.is_sentinel() || node.origin_depth() > depth {
                    continue;
                }
                if node.origin_depth() == depth {
                    found.push(id);
                } else {
                    queue.extend(node.children().iter().copied());
                }
            }
        }
        found
    }

    /// Roots created at `depth`
    ///
    pub fn roots_at_depth(&self, depth: usize) -> Vec<NodeId> {
        self.roots
            .iter()
            .filter(|r| {
                self.get(**r)
                    .map(|n| n.origin_depth() == depth)
                    .unwrap_or(false)
            })
            .copied()
            .collect()
    }
}

#[cfg(test)]
impl Forest {
    /// Every track of every root, in root order
    ///
    pub(crate) fn tracks_snapshot(&self) -> Vec<Vec<NodeId>> {
        self.roots
            .iter()
            .flat_map(|r| self.tracks(*r).collect::<Vec<_>>())
            .collect()
    }
}
