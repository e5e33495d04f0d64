use anyhow::Result;
use mht::examples::{frames, grid};
use mht::prelude::*;

fn main() -> Result<()> {
    env_logger::init();

    let frames = frames(&grid(2, 2, 5.0), 0.1, 20);
    let prune_depth = 2;

    // first half of the run, then only the confirmed tracks are kept
    let mut first = MhtBuilder::new().prune_depth(prune_depth).build()?;
    first.run(frames[..10].to_vec())?;
    let exported = first.confirmed_tracks();
    let timesteps = first.timesteps().to_vec();
    eprintln!(
        "Exported {} tracks over {} timesteps",
        exported.len(),
        timesteps.len()
    );

    let checkpoint = restore(&exported, timesteps, prune_depth, DEFAULT_GATE_DIST_KM)?;
    eprintln!("Restarting at depth {}", checkpoint.start_depth);

    // the frames inside the unconfirmed window are processed again
    let mut resumed = MhtBuilder::new().resume(checkpoint).build()?;
    let reports = resumed.run(frames)?;
    eprintln!("Processed {} more frames", reports.len());

    for t in resumed.confirmed_tracks() {
        eprintln!(
            "Track from depth {}: {} detections, final score {:.1}",
            t.start_depth,
            t.len(),
            t.scores.last().copied().unwrap_or_default()
        );
    }
    Ok(())
}
