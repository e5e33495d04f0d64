use anyhow::Result;
use mht::examples::{frames, grid};
use mht::prelude::*;

fn main() -> Result<()> {
    env_logger::init();

    // 12 eddies three degrees apart, drifting up to 0.15 degrees a day
    let starts = grid(3, 4, 3.0);
    let frames = frames(&starts, 0.15, 30);

    let mut tracker = MhtBuilder::new()
        .gate_dist(DEFAULT_GATE_DIST_KM)
        .prune_depth(2)
        .prune_mode("parent".parse()?)
        .lookahead(true)
        .bounds(|d: &Detection| d.lat().abs() < 60.0)
        .build()?;

    for frame in frames {
        let report = tracker.add_frame(frame)?;
        if let Some(pruned) = report.pruned {
            eprintln!(
                "Depth {}: {} groups, {} decided, {} removed, {} re-rooted",
                pruned.depth, pruned.groups, pruned.collapsed, pruned.removed, pruned.rerooted
            );
        }
    }

    let tracks = tracker.confirmed_tracks();
    eprintln!("Confirmed tracks: {}", tracks.len());
    for t in tracks.iter().filter(|t| t.len() > 1) {
        eprintln!(
            "From {} ({} steps, {} missed): {}",
            t.start_timestep.as_deref().unwrap_or("?"),
            t.len(),
            t.missing.iter().filter(|m| **m).count(),
            t.detections
                .iter()
                .map(|d| format!("({:.2}, {:.2})", d.lat(), d.lon()))
                .collect::<Vec<_>>()
                .join(" -> ")
        );
    }
    Ok(())
}
