//! Graph file inspector.
//!
//! Loads a graph JSON file, reports what the model derived from it, and runs
//! one cluster layout pass so malformed exports and layout regressions show
//! up without a GPU attached.

use std::process::ExitCode;

use constellate::graph::GraphModel;
use constellate::layout::{compute, LayoutKind, LayoutParams};

fn main() -> ExitCode {
    env_logger::init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: constellate <graph.json>");
        return ExitCode::FAILURE;
    };

    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) => {
            eprintln!("cannot read {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let model = match GraphModel::load(&raw) {
        Ok(model) => model,
        Err(err) => {
            eprintln!("cannot load {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let cross_linked = model.cross_linked().len();
    log::info!(
        "loaded {} channels, {} blocks, {} edges ({} cross-linked)",
        model.channels().len(),
        model.blocks().len(),
        model.edges().len(),
        cross_linked
    );

    println!("channels: {}", model.channels().len());
    println!("blocks:   {}", model.blocks().len());
    println!("edges:    {}", model.edges().len());
    println!("cross-linked blocks: {cross_linked}");
    println!("timeline entries:    {}", model.timeline().len());

    let layout = compute(LayoutKind::Cluster, &model, &LayoutParams::default());
    let max_extent = layout
        .block_positions
        .iter()
        .chain(layout.channel_positions.iter())
        .map(|p| p.length())
        .fold(0.0_f32, f32::max);
    println!("cluster layout extent: {max_extent:.1}");

    ExitCode::SUCCESS
}
