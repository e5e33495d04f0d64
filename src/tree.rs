use crate::detection::{Detection, Payload};
use crate::Errors;
use anyhow::Result;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Breadth-first track enumeration and depth lookups
pub mod traversal;

/// Handle of a node stored in a [Forest](Forest).
///
/// Handles are generational: once the node is removed, the handle never resolves again even if the
/// slot is reused by a new node.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Node of the hypothesis tree.
///
/// A node is exclusively owned by its parent (or by the root set). Children keep insertion order,
/// which is the order the traversals and the tie-breaking rules rely on.
///
#[derive(Debug, Clone)]
pub struct HypothesisNode {
    payload: Payload,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    origin_depth: usize,
    cumulative_score: f64,
    association_distance: f64,
    is_missing: bool,
    is_final: bool,
    seq: u64,
    closest: Option<usize>,
}

impl HypothesisNode {
    fn with_payload(payload: Payload, origin_depth: usize, association_distance: f64) -> Self {
        Self {
            payload,
            children: Vec::default(),
            parent: None,
            origin_depth,
            cumulative_score: 0.0,
            association_distance,
            is_missing: false,
            is_final: false,
            seq: 0,
            closest: None,
        }
    }

    /// Real hypothesis carrying `detection`
    ///
    /// # Parameters
    /// * `detection` - detection the hypothesis claims
    /// * `origin_depth` - timestep the node is created at
    /// * `association_distance` - gating distance to the parent, `0.0` for roots
    ///
    pub fn detection(
        detection: Arc<Detection>,
        origin_depth: usize,
        association_distance: f64,
    ) -> Self {
        Self::with_payload(
            Payload::Detection(detection),
            origin_depth,
            association_distance,
        )
    }

    /// Placeholder standing in for one undetected frame; it repeats the parent's detection
    ///
    pub fn missing(detection: Arc<Detection>, origin_depth: usize, gate_dist: f64) -> Self {
        let mut node = Self::detection(detection, origin_depth, gate_dist);
        node.is_missing = true;
        node
    }

    pub fn end(origin_depth: usize) -> Self {
        Self::with_payload(Payload::End, origin_depth, 0.0)
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn detection_ref(&self) -> Option<&Arc<Detection>> {
        self.payload.detection()
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn origin_depth(&self) -> usize {
        self.origin_depth
    }

    pub fn cumulative_score(&self) -> f64 {
        self.cumulative_score
    }

    pub fn association_distance(&self) -> f64 {
        self.association_distance
    }

    pub fn is_missing(&self) -> bool {
        self.is_missing
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn is_sentinel(&self) -> bool {
        self.payload.is_sentinel()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Creation sequence number, unique inside a forest
    ///
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Index into the closest-miss accumulator when a placeholder was added under this node
    ///
    pub fn closest(&self) -> Option<usize> {
        self.closest
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<HypothesisNode>,
}

/// Arena that owns every hypothesis node together with the ordered root set.
///
/// All structural changes go through the forest so the ownership stays tree-shaped: a node is
/// attached to at most one parent or to the root set, never both.
///
#[derive(Debug, Clone, Default)]
pub struct Forest {
    slots: Vec<Slot>,
    free: Vec<usize>,
    roots: Vec<NodeId>,
    next_seq: u64,
    live: usize,
}

impl Forest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes, sentinels included
    ///
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.roots.contains(&id)
    }

    /// Places a detached node into the arena and returns its handle
    ///
    pub fn insert(&mut self, mut node: HypothesisNode) -> NodeId {
        node.seq = self.next_seq;
        node.parent = None;
        node.children.clear();
        self.next_seq += 1;
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index: self.slots.len() - 1,
                generation: 0,
            }
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&HypothesisNode> {
        self.slots
            .get(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
    }

    /// Same as [get](Forest::get) but a stale handle is an error
    ///
    pub fn node(&self, id: NodeId) -> Result<&HypothesisNode> {
        self.get(id).ok_or_else(|| Errors::MissingNode(id).into())
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut HypothesisNode> {
        self.slots
            .get_mut(id.index)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
            .ok_or_else(|| Errors::MissingNode(id).into())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn set_cumulative_score(&mut self, id: NodeId, score: f64) -> Result<()> {
        self.node_mut(id)?.cumulative_score = score;
        Ok(())
    }

    pub(crate) fn set_closest(&mut self, id: NodeId, closest: usize) -> Result<()> {
        self.node_mut(id)?.closest = Some(closest);
        Ok(())
    }

    pub(crate) fn restore_node_state(
        &mut self,
        id: NodeId,
        cumulative_score: f64,
        closest: Option<usize>,
    ) -> Result<()> {
        let node = self.node_mut(id)?;
        node.cumulative_score = cumulative_score;
        node.closest = closest;
        Ok(())
    }

    fn ensure_detached(&self, id: NodeId) -> Result<()> {
        if self.node(id)?.parent.is_some() || self.is_root(id) {
            return Err(Errors::AlreadyAttached(id).into());
        }
        Ok(())
    }

    /// Appends a detached node to the root set
    ///
    pub fn push_root(&mut self, id: NodeId) -> Result<()> {
        self.ensure_detached(id)?;
        self.roots.push(id);
        Ok(())
    }

    /// Removes a root and drops its whole tree
    ///
    pub fn remove_root(&mut self, id: NodeId) -> Result<()> {
        let pos = self
            .roots
            .iter()
            .position(|r| *r == id)
            .ok_or(Errors::MissingRoot(id))?;
        self.roots.remove(pos);
        self.drop_subtree(id);
        Ok(())
    }

    /// Appends `child` to the children of `parent`
    ///
    /// The parent must not be final nor a sentinel, the child must be detached.
    ///
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let p = self.node(parent)?;
        if p.is_final {
            return Err(Errors::FinalNode(parent).into());
        }
        if p.is_sentinel() {
            return Err(Errors::SentinelParent(parent).into());
        }
        self.ensure_detached(child)?;
        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        Ok(())
    }

    /// Creates an `END` sentinel under `parent` at the parent's depth
    ///
    pub fn add_end(&mut self, parent: NodeId) -> Result<NodeId> {
        let depth = self.node(parent)?.origin_depth;
        let end = self.insert(HypothesisNode::end(depth));
        self.add_child(parent, end)?;
        Ok(end)
    }

    /// Removes `child` from `parent` and drops the child's subtree
    ///
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.detach_child(parent, child)?;
        self.drop_subtree(child);
        Ok(())
    }

    /// Removes `child` from `parent` keeping the child's subtree alive as a detached tree
    ///
    pub fn detach_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let p = self.node_mut(parent)?;
        if p.is_final {
            return Err(Errors::FinalNode(parent).into());
        }
        let pos = p
            .children
            .iter()
            .position(|c| *c == child)
            .ok_or(Errors::MissingChild { parent, child })?;
        p.children.remove(pos);
        self.node_mut(child)?.parent = None;
        Ok(())
    }

    /// Moves `child` and its subtree from `parent` to the root set.
    ///
    /// A root has no association, its distance is reset to `0.0`.
    ///
    pub fn reroot(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.detach_child(parent, child)?;
        self.push_root(child)?;
        self.node_mut(child)?.association_distance = 0.0;
        Ok(())
    }

    /// Removes a node from wherever it hangs: its parent or the root set
    ///
    pub fn discard(&mut self, id: NodeId) -> Result<()> {
        match self.node(id)?.parent {
            Some(parent) => self.remove_child(parent, id),
            None => self.remove_root(id),
        }
    }

    /// Permanently decides the branch at `parent`: `child` becomes its only child
    ///
    /// Every other child is dropped together with its subtree and the parent is marked final.
    ///
    pub fn collapse_to(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let p = self.node(parent)?;
        if p.is_final {
            return Err(Errors::FinalNode(parent).into());
        }
        if !p.children.contains(&child) {
            return Err(Errors::MissingChild { parent, child }.into());
        }
        let dropped = p
            .children
            .iter()
            .filter(|c| **c != child)
            .copied()
            .collect::<Vec<_>>();
        let p = self.node_mut(parent)?;
        p.children = vec![child];
        p.is_final = true;
        for id in dropped {
            self.drop_subtree(id);
        }
        Ok(())
    }

    fn drop_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let slot = match self.slots.get_mut(id.index) {
                Some(slot) if slot.generation == id.generation => slot,
                _ => continue,
            };
            if let Some(node) = slot.node.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index);
                self.live -= 1;
                stack.extend(node.children);
            }
        }
    }

    /// Checks the forest is well formed:
    /// * every node reachable from the root set is reached exactly once and parent links agree;
    /// * sentinels are leaves;
    /// * a final node has exactly one child, any other real node has exactly one `END` child;
    /// * `origin_depth` never decreases from parent to child;
    /// * no live node is unreachable.
    ///
    pub fn validate(&self) -> Result<()> {
        let broken = |msg: String| -> anyhow::Error { Errors::BrokenInvariant(msg).into() };
        let mut seen = HashSet::new();
        let mut stack = Vec::default();
        for root in &self.roots {
            if self.node(*root)?.parent.is_some() {
                return Err(broken(format!("root {} has a parent", root)));
            }
            stack.push(*root);
        }

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                return Err(broken(format!("node {} is reachable twice", id)));
            }
            let node = self.node(id)?;
            if node.is_sentinel() {
                if !node.children.is_empty() {
                    return Err(broken(format!("sentinel {} has children", id)));
                }
                continue;
            }
            let ends = node
                .children
                .iter()
                .map(|c| self.node(*c).map(|n| n.payload.is_end()))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .filter(|e| *e)
                .count();
            if node.is_final {
                if node.children.len() != 1 {
                    return Err(broken(format!(
                        "final node {} has {} children",
                        id,
                        node.children.len()
                    )));
                }
            } else if ends != 1 {
                return Err(broken(format!("node {} has {} END children", id, ends)));
            }
            for c in &node.children {
                let child = self.node(*c)?;
                if child.parent != Some(id) {
                    return Err(broken(format!("node {} does not point to parent {}", c, id)));
                }
                if child.origin_depth < node.origin_depth {
                    return Err(broken(format!("node {} is older than parent {}", c, id)));
                }
                stack.push(*c);
            }
        }

        if seen.len() != self.live {
            return Err(broken(format!(
                "{} live nodes but {} reachable",
                self.live,
                seen.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::detection::Detection;
    use crate::tree::{Forest, HypothesisNode, NodeId};
    use crate::Errors;
    use anyhow::Result;
    use std::sync::Arc;

    fn det(lat: f64, lon: f64, t: usize) -> Arc<Detection> {
        Arc::new(Detection::new(lat, lon).labeled(t, 1))
    }

    fn rooted(forest: &mut Forest) -> Result<NodeId> {
        let root = forest.insert(HypothesisNode::detection(det(0.0, 0.0, 0), 0, 0.0));
        forest.add_end(root)?;
        forest.push_root(root)?;
        Ok(root)
    }

    fn err_of(r: Result<()>) -> Errors {
        r.unwrap_err().downcast::<Errors>().unwrap()
    }

    #[test]
    fn add_and_remove() -> Result<()> {
        let mut forest = Forest::new();
        let root = rooted(&mut forest)?;
        let child = forest.insert(HypothesisNode::detection(det(0.0, 0.1, 1), 1, 10.0));
        forest.add_end(child)?;
        forest.add_child(root, child)?;
        assert_eq!(forest.len(), 4);
        assert_eq!(forest.node(child)?.parent(), Some(root));
        forest.validate()?;

        forest.remove_child(root, child)?;
        assert_eq!(forest.len(), 2);
        assert!(!forest.contains(child));
        forest.validate()?;

        assert!(matches!(
            err_of(forest.remove_child(root, child)),
            Errors::MissingChild { .. }
        ));
        assert!(matches!(err_of(forest.discard(child)), Errors::MissingNode(_)));
        Ok(())
    }

    #[test]
    fn remove_missing_child_fails() -> Result<()> {
        let mut forest = Forest::new();
        let root = rooted(&mut forest)?;
        let other = rooted(&mut forest)?;
        assert!(matches!(
            err_of(forest.remove_child(root, other)),
            Errors::MissingChild { .. }
        ));
        Ok(())
    }

    #[test]
    fn attach_twice_fails() -> Result<()> {
        let mut forest = Forest::new();
        let root = rooted(&mut forest)?;
        let other = rooted(&mut forest)?;
        assert!(matches!(
            err_of(forest.add_child(root, other)),
            Errors::AlreadyAttached(_)
        ));
        let end = forest.node(root)?.children()[0];
        let n = forest.insert(HypothesisNode::end(0));
        assert!(matches!(
            err_of(forest.add_child(end, n)),
            Errors::SentinelParent(_)
        ));
        Ok(())
    }

    #[test]
    fn collapse_is_final() -> Result<()> {
        let mut forest = Forest::new();
        let root = rooted(&mut forest)?;
        let a = forest.insert(HypothesisNode::detection(det(0.0, 0.1, 1), 1, 10.0));
        forest.add_end(a)?;
        forest.add_child(root, a)?;
        let b = forest.insert(HypothesisNode::detection(det(0.0, 0.2, 1), 1, 20.0));
        forest.add_end(b)?;
        forest.add_child(root, b)?;
        assert_eq!(forest.len(), 6);

        forest.collapse_to(root, a)?;
        assert!(forest.node(root)?.is_final());
        assert_eq!(forest.node(root)?.children(), &[a]);
        assert!(!forest.contains(b));
        assert_eq!(forest.len(), 3);
        forest.validate()?;

        assert!(matches!(
            err_of(forest.collapse_to(root, a)),
            Errors::FinalNode(_)
        ));
        let c = forest.insert(HypothesisNode::detection(det(0.0, 0.3, 1), 1, 20.0));
        assert!(matches!(
            err_of(forest.add_child(root, c)),
            Errors::FinalNode(_)
        ));
        assert!(matches!(
            err_of(forest.remove_child(root, a)),
            Errors::FinalNode(_)
        ));
        Ok(())
    }

    #[test]
    fn collapse_requires_child() -> Result<()> {
        let mut forest = Forest::new();
        let root = rooted(&mut forest)?;
        let other = rooted(&mut forest)?;
        assert!(matches!(
            err_of(forest.collapse_to(root, other)),
            Errors::MissingChild { .. }
        ));
        assert!(!forest.node(root)?.is_final());
        Ok(())
    }

    #[test]
    fn stale_handles() -> Result<()> {
        let mut forest = Forest::new();
        let root = rooted(&mut forest)?;
        forest.remove_root(root)?;
        assert!(forest.is_empty());
        assert!(forest.roots().is_empty());

        let reused = rooted(&mut forest)?;
        assert!(forest.get(root).is_none());
        assert!(forest.get(reused).is_some());
        assert!(forest.node(reused)?.seq() > 0);
        assert!(matches!(
            err_of(forest.remove_root(root)),
            Errors::MissingRoot(_)
        ));
        Ok(())
    }

    #[test]
    fn detach_keeps_subtree() -> Result<()> {
        let mut forest = Forest::new();
        let root = rooted(&mut forest)?;
        let child = forest.insert(HypothesisNode::detection(det(0.0, 0.1, 1), 1, 10.0));
        forest.add_end(child)?;
        forest.add_child(root, child)?;
        forest.detach_child(root, child)?;
        forest.push_root(child)?;
        assert_eq!(forest.roots(), &[root, child]);
        assert_eq!(forest.node(child)?.children().len(), 1);
        forest.validate()?;

        forest.discard(child)?;
        assert_eq!(forest.roots(), &[root]);
        assert_eq!(forest.len(), 2);
        Ok(())
    }

    #[test]
    fn reroot_clears_association() -> Result<()> {
        let mut forest = Forest::new();
        let root = rooted(&mut forest)?;
        let child = forest.insert(HypothesisNode::detection(det(0.0, 0.1, 1), 1, 10.0));
        forest.add_end(child)?;
        forest.add_child(root, child)?;
        forest.reroot(root, child)?;
        assert_eq!(forest.roots(), &[root, child]);
        assert_eq!(forest.node(child)?.parent(), None);
        assert_eq!(forest.node(child)?.association_distance(), 0.0);
        assert_eq!(forest.node(child)?.origin_depth(), 1);
        forest.validate()?;

        assert!(matches!(
            err_of(forest.reroot(root, child)),
            Errors::MissingChild { .. }
        ));
        Ok(())
    }

    #[test]
    fn validate_detects_missing_end() -> Result<()> {
        let mut forest = Forest::new();
        let root = forest.insert(HypothesisNode::detection(det(0.0, 0.0, 0), 0, 0.0));
        forest.push_root(root)?;
        assert!(matches!(
            err_of(forest.validate()),
            Errors::BrokenInvariant(_)
        ));
        forest.add_end(root)?;
        forest.validate()?;

        let orphan = forest.insert(HypothesisNode::end(0));
        assert!(forest.get(orphan).is_some());
        assert!(matches!(
            err_of(forest.validate()),
            Errors::BrokenInvariant(_)
        ));
        Ok(())
    }
}
