use crate::pruning::{decide, eliminate, prepare, PruneReport, Pruner};
use crate::scoring::Scorer;
use crate::tree::Forest;
use anyhow::Result;
use log::debug;

/// Decides every open parent at `depth - 1` on its best path.
///
/// For each parent with more than one child, in depth order:
/// 1. the child on the best-scoring path wins, ties go to the earliest child (the `END` sentinel);
/// 2. the parent collapses onto it;
/// 3. every other live claim of the winner's detection is removed, except those hanging off
///    parents that are already final.
///
#[derive(Debug, Default, Clone, Copy)]
pub struct ParentPruner;

impl Pruner for ParentPruner {
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

        for parent in forest.nodes_at_depth(depth - 1) {
            let node = forest.node(parent)?;
            if node.is_final() || node.children().len() <= 1 {
                continue;
            }

            let children = node.children().to_vec();
            let mut winner = children[0];
            let mut best = scorer.score_via(forest, winner, &mut memo)?;
            for child in &children[1..] {
                let score = scorer.score_via(forest, *child, &mut memo)?;
                if score > best {
                    best = score;
                    winner = *child;
                }
            }
            debug!("Parent {} best path via {} scores {}", parent, winner, best);

            decide(
                forest,
                &mut groups,
                parent,
                winner,
                scorer,
                &mut memo,
                &mut report,
            )?;

            let key = match forest.node(winner)?.detection_ref() {
                Some(d) => d.key(),
                None => continue,
            };
            let rivals = match groups.by_key(&key) {
                Some(group) => group.live(forest),
                None => continue,
            };
            for claim in rivals {
                if claim.node == winner || claim.is_locked(forest) {
                    continue;
                }
                eliminate(forest, claim.node, &mut memo, &mut report)?;
            }
        }
        Ok(report)
    }
}
