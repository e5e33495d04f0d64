use crate::pruning::child::ChildPruner;
use crate::pruning::conflict::ConflictGroups;
use crate::pruning::parent::ParentPruner;
use crate::scoring::{ScoreMemo, Scorer};
use crate::tree::{Forest, NodeId};
use crate::Errors;
use anyhow::Result;
use log::debug;
use std::fmt;
use std::str::FromStr;

/// Conflict groups and claims
pub mod conflict;

/// Best claim per conflict group wins
pub mod child;

/// Best path per parent wins
pub mod parent;

/// What a pruning pass did
///
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneReport {
    pub depth: usize,
    /// Conflict groups inspected
    pub groups: usize,
    /// Parents whose branch was decided
    pub collapsed: usize,
    /// Real hypotheses removed, subtrees not counted
    pub removed: usize,
    /// Hypotheses moved to the root set because nothing else claimed their detection
    pub rerooted: usize,
}

/// Conflict resolution at a fixed depth
///
pub trait Pruner {
    /// Resolves the hypotheses created at `depth`
    ///
    /// Cumulative scores of the hypotheses at `depth` are refreshed first. At depth `0` nothing
    /// else happens.
    ///
    fn prune(&self, forest: &mut Forest, depth: usize, scorer: &Scorer) -> Result<PruneReport>;
}

/// Pruning strategy selector
///
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PruneMode {
    /// Keep the best hypothesis of every conflict group
    Child,
    /// Keep the best path of every parent
    #[default]
    Parent,
}

impl Pruner for PruneMode {
    fn prune(&self, forest: &mut Forest, depth: usize, scorer: &Scorer) -> Result<PruneReport> {
        match self {
            PruneMode::Child => ChildPruner.prune(forest, depth, scorer),
            PruneMode::Parent => ParentPruner.prune(forest, depth, scorer),
        }
    }
}

impl FromStr for PruneMode {
    type Err = Errors;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "child" | "prune" => Ok(PruneMode::Child),
            "parent" | "prune_parent" => Ok(PruneMode::Parent),
            _ => Err(Errors::UnknownPruneMode(s.to_string())),
        }
    }
}

impl fmt::Display for PruneMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PruneMode::Child => write!(f, "child"),
            PruneMode::Parent => write!(f, "parent"),
        }
    }
}

/// Shared first step of both strategies: refreshed scores and fresh conflict groups.
///
/// `None` at depth `0`, where there is nothing to resolve yet.
///
pub(crate) fn prepare(
    forest: &mut Forest,
    depth: usize,
    scorer: &Scorer,
) -> Result<Option<(ScoreMemo, ConflictGroups)>> {
    let mut memo = ScoreMemo::new();
    scorer.refresh(forest, depth, &mut memo)?;
    if depth == 0 {
        return Ok(None);
    }
    let groups = ConflictGroups::collect(forest, depth)?;
    Ok(Some((memo, groups)))
}

/// Collapses `parent` onto `winner`.
///
/// Siblings of the winner that are the last live claim of their detection are moved to the root
/// set with their subtree instead of being dropped, so no detection disappears from the forest.
/// Placeholders are always dropped, they repeat a detection that lives on in their parent.
///
pub(crate) fn decide(
    forest: &mut Forest,
    groups: &mut ConflictGroups,
    parent: NodeId,
    winner: NodeId,
    scorer: &Scorer,
    memo: &mut ScoreMemo,
    report: &mut PruneReport,
) -> Result<()> {
    let siblings = forest
        .node(parent)?
        .children()
        .iter()
        .filter(|c| **c != winner)
        .copied()
        .collect::<Vec<_>>();

    for sibling in siblings {
        let node = forest.node(sibling)?;
        if node.is_sentinel() {
            continue;
        }
        if node.is_missing() {
            report.removed += 1;
            continue;
        }
        let contested = match groups.index_of(sibling).and_then(|i| groups.get(i)) {
            Some(group) => group
                .live(forest)
                .iter()
                .any(|c| c.node != sibling),
            None => false,
        };
        if contested {
            report.removed += 1;
            continue;
        }
        forest.reroot(parent, sibling)?;
        let score = scorer.best_continuation(forest, sibling, memo)?;
        forest.set_cumulative_score(sibling, score)?;
        groups.rebind(forest, sibling)?;
        report.rerooted += 1;
        debug!("Hypothesis {} re-rooted", sibling);
    }

    forest.collapse_to(parent, winner)?;
    memo.invalidate(forest, parent);
    report.collapsed += 1;
    debug!("Parent {} decided on {}", parent, winner);
    Ok(())
}

/// Removes the hypothesis of a losing claim from its parent or from the root set
///
pub(crate) fn eliminate(
    forest: &mut Forest,
    node: NodeId,
    memo: &mut ScoreMemo,
    report: &mut PruneReport,
) -> Result<()> {
    let parent = forest.node(node)?.parent();
    forest.discard(node)?;
    if let Some(parent) = parent {
        memo.invalidate(forest, parent);
    }
    report.removed += 1;
    debug!("Hypothesis {} eliminated", node);
    Ok(())
}
