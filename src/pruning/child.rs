use crate::pruning::conflict::Claim;
use crate::pruning::{decide, eliminate, prepare, PruneReport, Pruner};
use crate::scoring::Scorer;
use crate::tree::Forest;
use crate::Errors;
use anyhow::Result;
use itertools::Itertools;
use log::debug;

/// Keeps the single best claim of every conflict group.
///
/// Groups are resolved from the most confident one down:
/// 1. claims that no longer hang where they were collected are ignored;
/// 2. a claim under a final parent is locked and wins, otherwise the greatest claim wins;
/// 3. every other unlocked claim is removed with its subtree;
/// 4. the winner's parent, unless already final, collapses onto the winner.
///
#[derive(Debug, Default, Clone, Copy)]
pub struct ChildPruner;

impl Pruner for ChildPruner {
    fn prune(&self, forest: &mut Forest, depth: usize, scorer: &Scorer) -> Result<PruneReport> {
        let mut report = PruneReport {
            depth,
            ..Default::default()
        };
        let (mut memo, mut groups) = match prepare(forest, depth, scorer)? {
            Some(prepared) => prepared,
            None => return Ok(report),
        };
        report.groups = groups.len();

        let bests = groups
            .iter()
            .map(|g| g.best().copied())
            .collect::<Result<Vec<_>>>()?;
        let order = (0..groups.len())
            .sorted_by(|a, b| bests[*b].cmp(&bests[*a]))
            .collect::<Vec<_>>();

        for index in order {
            let group = groups.get(index).ok_or(Errors::EmptyConflictGroup)?;
            let live = group.live(forest);
            if live.is_empty() {
                debug!("Group {} has no live claims left", group.key());
                continue;
            }

            let winner: Claim = live
                .iter()
                .filter(|c| c.is_locked(forest))
                .max()
                .or_else(|| live.iter().max())
                .copied()
                .ok_or(Errors::EmptyConflictGroup)?;
            debug!(
                "Group {}: {} live claims, winner {} with score {}",
                group.key(),
                live.len(),
                winner.node,
                winner.score
            );

            for claim in &live {
                if claim.node != winner.node && !claim.is_locked(forest) {
                    eliminate(forest, claim.node, &mut memo, &mut report)?;
                }
            }

            if let Some(parent) = winner.parent {
                if !forest.node(parent)?.is_final() {
                    decide(
                        forest,
                        &mut groups,
                        parent,
                        winner.node,
                        scorer,
                        &mut memo,
                        &mut report,
                    )?;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use crate::detection::Detection;
    use crate::gating::GatingEngine;
    use crate::pruning::child::ChildPruner;
    use crate::pruning::Pruner;
    use crate::scoring::Scorer;
    use crate::tree::{Forest, NodeId};
    use anyhow::Result;
    use std::sync::Arc;

    fn det(lon: f64, t: usize) -> Arc<Detection> {
        Arc::new(Detection::new(0.0, lon).labeled(t, 1))
    }

    fn gate(
        forest: &mut Forest,
        g: &GatingEngine,
        lon: f64,
        t: usize,
        parents: &[NodeId],
    ) -> Result<Vec<NodeId>> {
        Ok(g.gate(forest, det(lon, t), parents, t)?.nodes())
    }

    #[test]
    fn closest_parent_takes_the_detection() -> Result<()> {
        let g = GatingEngine::new(150.0)?;
        let scorer = Scorer::new(150.0);
        let mut forest = Forest::new();
        let p1 = gate(&mut forest, &g, 0.0, 0, &[])?[0];
        let p2 = gate(&mut forest, &g, 1.0, 0, &[])?[0];

        // 0.8 degrees from p1, 0.2 from p2
        let claims = gate(&mut forest, &g, 0.8, 1, &[p1, p2])?;
        assert_eq!(claims.len(), 2);

        // one frame of lag: the parents are scored with the new frame attached
        ChildPruner.prune(&mut forest, 0, &scorer)?;
        assert!(forest.node(p2)?.cumulative_score() > forest.node(p1)?.cumulative_score());

        let report = ChildPruner.prune(&mut forest, 1, &scorer)?;
        assert_eq!(report.groups, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(report.collapsed, 1);
        assert!(forest.contains(claims[1]));
        assert!(!forest.contains(claims[0]));
        assert!(forest.node(p2)?.is_final());
        assert_eq!(forest.node(p2)?.children(), &[claims[1]]);
        assert!(!forest.node(p1)?.is_final());
        assert_eq!(forest.node(p1)?.children().len(), 1);
        forest.validate()?;
        Ok(())
    }

    #[test]
    fn decided_parent_keeps_its_claim() -> Result<()> {
        let g = GatingEngine::new(150.0)?;
        let scorer = Scorer::new(150.0);
        let mut forest = Forest::new();
        let p1 = gate(&mut forest, &g, 0.0, 0, &[])?[0];
        let p2 = gate(&mut forest, &g, 1.0, 0, &[])?[0];
        let claims = gate(&mut forest, &g, 0.8, 1, &[p1, p2])?;
        ChildPruner.prune(&mut forest, 0, &scorer)?;
        assert!(forest.node(p2)?.cumulative_score() > forest.node(p1)?.cumulative_score());
        // p1 is already decided on the weaker claim
        forest.collapse_to(p1, claims[0])?;

        let report = ChildPruner.prune(&mut forest, 1, &scorer)?;
        assert_eq!(report.groups, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(report.collapsed, 0);
        assert_eq!(forest.node(p1)?.children(), &[claims[0]]);
        assert!(!forest.contains(claims[1]));
        assert!(!forest.node(p2)?.is_final());
        assert_eq!(forest.node(p2)?.children().len(), 1);
        forest.validate()?;
        Ok(())
    }

    #[test]
    fn lonely_sibling_is_rerooted() -> Result<()> {
        let g = GatingEngine::new(150.0)?;
        let scorer = Scorer::new(150.0);
        let mut forest = Forest::new();
        let p = gate(&mut forest, &g, 0.0, 0, &[])?[0];
        let near = gate(&mut forest, &g, 0.1, 1, &[p])?[0];
        let far = gate(&mut forest, &g, -1.0, 1, &[p])?[0];

        let report = ChildPruner.prune(&mut forest, 1, &scorer)?;
        assert_eq!(report.groups, 2);
        assert_eq!(report.rerooted, 1);
        assert_eq!(forest.node(p)?.children(), &[near]);
        assert!(forest.is_root(far));
        assert_eq!(forest.node(far)?.parent(), None);
        // a root has no association
        assert!(forest.node(far)?.association_distance().abs() < crate::EPS);
        forest.validate()?;
        Ok(())
    }

    #[test]
    fn roots_lose_to_continuations() -> Result<()> {
        let g = GatingEngine::new(150.0)?;
        let scorer = Scorer::new(150.0);
        let mut forest = Forest::new();
        let p = gate(&mut forest, &g, 0.0, 0, &[])?[0];
        let cont = gate(&mut forest, &g, 0.1, 1, &[p])?[0];
        // a duplicate of the same logical detection that started a track of its own
        let dup = gate(&mut forest, &g, 0.1, 1, &[])?[0];

        let report = ChildPruner.prune(&mut forest, 1, &scorer)?;
        assert_eq!(report.groups, 1);
        assert!(forest.contains(cont));
        assert!(!forest.contains(dup));
        assert_eq!(forest.roots(), &[p]);
        forest.validate()?;
        Ok(())
    }

    #[test]
    fn idempotent() -> Result<()> {
        let g = GatingEngine::new(150.0)?;
        let scorer = Scorer::new(150.0);
        let mut forest = Forest::new();
        let p1 = gate(&mut forest, &g, 0.0, 0, &[])?[0];
        let p2 = gate(&mut forest, &g, 1.0, 0, &[])?[0];
        gate(&mut forest, &g, 0.2, 1, &[p1, p2])?;
        gate(&mut forest, &g, 0.9, 1, &[p1, p2])?;
        gate(&mut forest, &g, 0.5, 1, &[p1, p2])?;
        gate(&mut forest, &g, 9.0, 1, &[p1, p2])?;

        ChildPruner.prune(&mut forest, 1, &scorer)?;
        forest.validate()?;
        let before = forest.tracks_snapshot();
        let report = ChildPruner.prune(&mut forest, 1, &scorer)?;
        assert_eq!(report.removed, 0);
        assert_eq!(report.collapsed, 0);
        assert_eq!(report.rerooted, 0);
        assert_eq!(before, forest.tracks_snapshot());
        forest.validate()?;
        Ok(())
    }
}
