use crate::detection::Detection;
use crate::tracker::checkpoint::Checkpoint;
use crate::tree::{Forest, HypothesisNode, NodeId};
use crate::Errors;
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;

/// Root-to-leaf path that pruning will not change anymore
///
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedTrack {
    /// Depth of the first detection
    pub start_depth: usize,
    /// Identifier of the timestep at `start_depth`
    pub start_timestep: Option<String>,
    pub detections: Vec<Arc<Detection>>,
    /// Cumulative score of every node
    pub scores: Vec<f64>,
    /// Association distance of every node, `0` for the first one
    pub distances: Vec<f64>,
    /// Whether the node is a missed-detection placeholder
    pub missing: Vec<bool>,
}

impl ConfirmedTrack {
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    fn check(&self) -> Result<()> {
        let n = self.detections.len();
        if self.scores.len() != n || self.distances.len() != n || self.missing.len() != n {
            return Err(Errors::BrokenInvariant(format!(
                "track starting at {} has {} detections but {} scores, {} distances, {} flags",
                self.start_depth,
                n,
                self.scores.len(),
                self.distances.len(),
                self.missing.len()
            ))
            .into());
        }
        Ok(())
    }
}

/// Confirmed part of every track in the forest.
///
/// Each path is cut before the trailing `prune_depth` timesteps, which may still be revised by
/// pruning. Paths that start inside that window are skipped. Sentinels are stripped and a path
/// prefix shared by several paths is exported once, in first-seen order.
///
pub fn confirmed_tracks(
    forest: &Forest,
    timesteps: &[String],
    prune_depth: usize,
) -> Vec<ConfirmedTrack> {
    let mut seen = HashSet::new();
    let mut tracks = Vec::default();
    for root in forest.roots() {
        for path in forest.tracks(*root) {
            let start_depth = match forest.get(path[0]) {
                Some(node) => node.origin_depth(),
                None => continue,
            };
            let end = timesteps.len() as isize - prune_depth as isize - start_depth as isize;
            if end <= 0 {
                continue;
            }
            let sure = path
                .into_iter()
                .take(end as usize)
                .filter(|id| forest.get(*id).map(|n| !n.is_sentinel()).unwrap_or(false))
                .collect::<Vec<NodeId>>();
            if sure.is_empty() || !seen.insert(sure.clone()) {
                continue;
            }

            let mut track = ConfirmedTrack {
                start_depth,
                start_timestep: timesteps.get(start_depth).cloned(),
                detections: Vec::with_capacity(sure.len()),
                scores: Vec::with_capacity(sure.len()),
                distances: Vec::with_capacity(sure.len()),
                missing: Vec::with_capacity(sure.len()),
            };
            for node in sure.iter().filter_map(|id| forest.get(*id)) {
                if let Some(d) = node.detection_ref() {
                    track.detections.push(d.clone());
                    track.scores.push(node.cumulative_score());
                    track.distances.push(node.association_distance());
                    track.missing.push(node.is_missing());
                }
            }
            tracks.push(track);
        }
    }
    tracks
}

/// Rebuilds a resumable run from exported tracks.
///
/// Every track becomes a chain of final nodes keeping its scores, distances and missing flags.
/// The run restarts at `timesteps.len() - prune_depth`: the last node of a track stays open when
/// it lies at the depth right before the restart or later, otherwise it is closed onto `END`.
///
pub fn restore(
    tracks: &[ConfirmedTrack],
    timesteps: Vec<String>,
    prune_depth: usize,
    gate_dist: f64,
) -> Result<Checkpoint> {
    if !(gate_dist.is_finite() && gate_dist > 0.0) {
        return Err(Errors::InvalidGateDistance(gate_dist).into());
    }
    let start_depth = timesteps.len().saturating_sub(prune_depth);
    let mut forest = Forest::new();

    for track in tracks {
        track.check()?;
        let mut last: Option<NodeId> = None;
        for (j, detection) in track.detections.iter().enumerate() {
            let depth = track.start_depth + j;
            let node = if track.missing[j] {
                HypothesisNode::missing(detection.clone(), depth, track.distances[j])
            } else {
                HypothesisNode::detection(detection.clone(), depth, track.distances[j])
            };
            let id = forest.insert(node);
            forest.restore_node_state(id, track.scores[j], None)?;
            match last {
                Some(parent) => {
                    forest.add_child(parent, id)?;
                    forest.collapse_to(parent, id)?;
                }
                None => forest.push_root(id)?,
            }
            last = Some(id);
        }

        if let Some(last) = last {
            let end = forest.add_end(last)?;
            if forest.node(last)?.origin_depth() + 1 < start_depth {
                forest.collapse_to(last, end)?;
            }
        }
    }

    forest.validate()?;
    Ok(Checkpoint {
        forest,
        start_depth,
        prune_depth,
        gate_dist,
        closest: Vec::default(),
        timesteps,
    })
}

#[cfg(test)]
mod tests {
    use crate::detection::Detection;
    use crate::export::{confirmed_tracks, restore};
    use crate::gating::GatingEngine;
    use crate::tree::Forest;
    use crate::Errors;
    use anyhow::Result;
    use std::sync::Arc;

    fn timesteps(n: usize) -> Vec<String> {
        (0..n).map(|t| format!("2001-01-{:02}", t + 1)).collect()
    }

    // a forked forest: root -> a -> {b, c}, plus a late root r at depth 2
    fn forked() -> Result<Forest> {
        let g = GatingEngine::new(150.0)?;
        let mut forest = Forest::new();
        let det = |lon: f64, t: usize| Arc::new(Detection::new(0.0, lon).labeled(t, 1));
        let root = g.gate(&mut forest, det(0.0, 0), &[], 0)?.nodes()[0];
        let a = g.gate(&mut forest, det(0.1, 1), &[root], 1)?.nodes()[0];
        forest.collapse_to(root, a)?;
        g.gate(&mut forest, det(0.2, 2), &[a], 2)?;
        g.gate(&mut forest, det(0.3, 2), &[a], 2)?;
        g.gate(&mut forest, det(50.0, 2), &[a], 2)?;
        Ok(forest)
    }

    #[test]
    fn trailing_frames_are_cut() -> Result<()> {
        let forest = forked()?;

        // 3 timesteps, 1 kept back: the fork at depth 2 is not confirmed yet and collapses into
        // one track, the late root starts inside the window
        let tracks = confirmed_tracks(&forest, &timesteps(3), 1);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].len(), 2);
        assert_eq!(tracks[0].start_depth, 0);
        assert_eq!(tracks[0].start_timestep.as_deref(), Some("2001-01-01"));
        assert_eq!(tracks[0].missing, vec![false, false]);
        assert!((tracks[0].distances[1] - 11.119).abs() < 0.01);

        // nothing kept back: the path closed by `a`'s END is exported on its own
        let tracks = confirmed_tracks(&forest, &timesteps(3), 0);
        assert_eq!(tracks.len(), 4);
        assert_eq!(tracks.iter().filter(|t| t.len() == 3).count(), 2);
        assert_eq!(tracks.iter().filter(|t| t.start_depth == 2).count(), 1);

        assert!(confirmed_tracks(&forest, &timesteps(3), 3).is_empty());
        Ok(())
    }

    #[test]
    fn restored_forest_resumes_open_tails_only() -> Result<()> {
        let forest = forked()?;
        let tracks = confirmed_tracks(&forest, &timesteps(3), 0);
        // restart at depth 2: tails from depth 1 on stay open, interior nodes are final
        let checkpoint = restore(&tracks, timesteps(4), 2, 150.0)?;
        assert_eq!(checkpoint.start_depth, 2);
        assert_eq!(checkpoint.prune_depth, 2);
        let restored = &checkpoint.forest;
        assert_eq!(restored.roots().len(), tracks.len());

        let open = restored.nodes_at_depth(1);
        let open = open
            .iter()
            .filter(|id| !restored.node(**id).unwrap().is_final())
            .count();
        assert_eq!(open, 1);
        let tails = restored.nodes_at_depth(2);
        assert_eq!(tails.len(), 3);
        for id in tails {
            assert!(!restored.node(id)?.is_final());
        }

        let again = confirmed_tracks(restored, &timesteps(3), 0);
        assert_eq!(again.len(), tracks.len());
        for (a, b) in again.iter().zip(tracks.iter()) {
            assert_eq!(a.scores, b.scores);
            assert_eq!(a.detections, b.detections);
        }
        Ok(())
    }

    #[test]
    fn inconsistent_track_is_rejected() {
        let mut track = confirmed_tracks(&forked().unwrap(), &timesteps(3), 1).remove(0);
        track.scores.pop();
        let err = restore(&[track], timesteps(3), 1, 150.0).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<Errors>(),
            Some(Errors::BrokenInvariant(_))
        ));
    }
}
