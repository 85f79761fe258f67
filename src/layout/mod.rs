//! Layout algorithms: pure functions from a graph model to target positions.
//!
//! Each algorithm maps the model to one position per channel and per block,
//! with no state shared between calls; the animator in [`animator`] owns the
//! transition from the currently committed positions to a computed target.

pub mod animator;

use std::f32::consts::TAU;

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::graph::GraphModel;

pub use animator::LayoutEngine;

/// Golden angle in radians, used for even spherical distributions.
const GOLDEN_ANGLE: f32 = 2.399_963_2;

/// Target positions for every channel and block, indexed by model index.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub channel_positions: Vec<Vec3>,
    pub block_positions: Vec<Vec3>,
}

/// Tuning knobs shared by the algorithms. `seed` makes the jitter applied to
/// cross-linked blocks reproducible.
#[derive(Debug, Clone)]
pub struct LayoutParams {
    /// Radius of the channel hub distribution.
    pub channel_radius: f32,
    /// Base orbit distance of a block around its owning channel.
    pub block_orbit: f32,
    /// Upper bound on the random offset applied to cross-linked blocks.
    pub jitter: f32,
    /// Distance between consecutive timeline slots.
    pub timeline_spacing: f32,
    pub seed: u64,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            channel_radius: 60.0,
            block_orbit: 9.0,
            jitter: 2.5,
            timeline_spacing: 1.8,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    /// Blocks gathered around their channels (the default view).
    Cluster,
    /// All blocks on one sphere, channels on an inner ring.
    Shell,
    /// Blocks ordered along an axis by connection time.
    Timeline,
}

pub fn compute(kind: LayoutKind, model: &GraphModel, params: &LayoutParams) -> Layout {
    match kind {
        LayoutKind::Cluster => cluster(model, params),
        LayoutKind::Shell => shell(model, params),
        LayoutKind::Timeline => timeline(model, params),
    }
}

/// Point `i` of `n` on a unit sphere, golden-angle spiral.
fn fibonacci_sphere(i: usize, n: usize) -> Vec3 {
    let n = n.max(1) as f32;
    let y = 1.0 - 2.0 * (i as f32 + 0.5) / n;
    let r = (1.0 - y * y).max(0.0).sqrt();
    let theta = i as f32 * GOLDEN_ANGLE;
    Vec3::new(r * theta.cos(), y, r * theta.sin())
}

/// Deterministic direction for the `k`-th block orbiting a channel. The
/// counter drives both the winding angle and the latitude so consecutive
/// blocks spread over the whole shell.
fn orbit_direction(k: usize) -> Vec3 {
    let phi = k as f32 * GOLDEN_ANGLE;
    let y = -0.9 + 1.8 * ((k as f32 * 0.618_034) % 1.0);
    let r = (1.0 - y * y).max(0.0).sqrt();
    Vec3::new(r * phi.cos(), y, r * phi.sin())
}

/// The cluster layout distinguishes three membership cases: orphaned blocks
/// sit at the origin, single-membership blocks orbit their channel on a
/// deterministic shell (spacing driven by a per-channel counter that
/// increments in block-list order), and cross-linked blocks sit at the
/// centroid of their channels plus a jitter offset bounded by
/// `params.jitter`.
fn cluster(model: &GraphModel, params: &LayoutParams) -> Layout {
    let channel_count = model.channels().len();
    let channel_positions: Vec<Vec3> = (0..channel_count)
        .map(|i| fibonacci_sphere(i, channel_count) * params.channel_radius)
        .collect();

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut counters = vec![0usize; channel_count];

    let block_positions = model
        .blocks()
        .iter()
        .map(|block| {
            let owners: Vec<usize> = block
                .channels
                .iter()
                .filter_map(|id| model.channel_index(id))
                .collect();
            match owners.as_slice() {
                [] => Vec3::ZERO,
                [channel] => {
                    let k = counters[*channel];
                    counters[*channel] += 1;
                    let radius = params.block_orbit * (1.0 + 0.18 * (k as f32).sqrt());
                    channel_positions[*channel] + orbit_direction(k) * radius
                }
                many => {
                    let centroid = many
                        .iter()
                        .map(|&c| channel_positions[c])
                        .sum::<Vec3>()
                        / many.len() as f32;
                    centroid + jitter_offset(&mut rng, params.jitter)
                }
            }
        })
        .collect();

    Layout {
        channel_positions,
        block_positions,
    }
}

/// Random offset with magnitude strictly bounded by `bound`.
fn jitter_offset(rng: &mut StdRng, bound: f32) -> Vec3 {
    if bound <= 0.0 {
        return Vec3::ZERO;
    }
    let theta = rng.random_range(0.0..TAU);
    let y: f32 = rng.random_range(-1.0..1.0);
    let r = (1.0 - y * y).max(0.0).sqrt();
    let direction = Vec3::new(r * theta.cos(), y, r * theta.sin());
    direction * rng.random_range(0.0..bound)
}

/// Every block on one index-ordered sphere, channels on an inner ring.
fn shell(model: &GraphModel, params: &LayoutParams) -> Layout {
    let channel_count = model.channels().len();
    let block_count = model.blocks().len();
    let ring_radius = params.channel_radius * 0.5;
    let shell_radius = params.channel_radius * 1.4;

    let channel_positions = (0..channel_count)
        .map(|i| {
            let angle = i as f32 / channel_count.max(1) as f32 * TAU;
            Vec3::new(angle.cos() * ring_radius, 0.0, angle.sin() * ring_radius)
        })
        .collect();
    let block_positions = (0..block_count)
        .map(|i| fibonacci_sphere(i, block_count) * shell_radius)
        .collect();

    Layout {
        channel_positions,
        block_positions,
    }
}

/// Blocks strung along the x axis by their rank in the model's time-sorted
/// list, with a slight golden-angle corkscrew so co-timed blocks stay
/// distinguishable. Undated blocks are gathered past the recent end.
fn timeline(model: &GraphModel, params: &LayoutParams) -> Layout {
    let spacing = params.timeline_spacing;
    let spread = params.block_orbit * 0.6;
    let dated = model.timeline().len();
    let half = dated as f32 * spacing * 0.5;

    let mut slot_of = std::collections::HashMap::new();
    for (rank, (_, id)) in model.timeline().iter().enumerate() {
        if let Some(index) = model.block_index(id) {
            slot_of.entry(index).or_insert(rank);
        }
    }

    let mut undated = 0usize;
    let block_positions = (0..model.blocks().len())
        .map(|i| {
            let slot = match slot_of.get(&i) {
                Some(&rank) => rank,
                None => {
                    undated += 1;
                    dated + undated - 1
                }
            };
            let angle = slot as f32 * GOLDEN_ANGLE;
            Vec3::new(
                slot as f32 * spacing - half,
                angle.cos() * spread,
                angle.sin() * spread,
            )
        })
        .collect();

    // channels hover in a line above the axis
    let channel_count = model.channels().len();
    let channel_positions = (0..channel_count)
        .map(|i| {
            let x = if channel_count > 1 {
                (i as f32 / (channel_count - 1) as f32) * 2.0 * half - half
            } else {
                0.0
            };
            Vec3::new(x, params.channel_radius * 0.4, 0.0)
        })
        .collect();

    Layout {
        channel_positions,
        block_positions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LoadOptions;
    use serde_json::json;

    /// 3 channels, 5 blocks; D belongs to channels 1 and 2, E is orphaned.
    fn sample_model() -> GraphModel {
        let doc = json!({
            "meta": {
                "sortedTimestamps": [[100, "bl-b"], [200, "bl-a"], [300, "bl-d"]]
            },
            "elements": {
                "nodes": [
                    { "data": { "id": "ch-1", "type": "channel", "label": "One" } },
                    { "data": { "id": "ch-2", "type": "channel", "label": "Two" } },
                    { "data": { "id": "ch-3", "type": "channel", "label": "Three" } },
                    { "data": { "id": "bl-a", "type": "block", "label": "A" } },
                    { "data": { "id": "bl-b", "type": "block", "label": "B" } },
                    { "data": { "id": "bl-c", "type": "block", "label": "C" } },
                    { "data": { "id": "bl-d", "type": "block", "label": "D" } },
                    { "data": { "id": "bl-e", "type": "block", "label": "E" } }
                ],
                "edges": [
                    { "data": { "source": "ch-1", "target": "bl-a" } },
                    { "data": { "source": "ch-1", "target": "bl-b" } },
                    { "data": { "source": "ch-3", "target": "bl-c" } },
                    { "data": { "source": "ch-1", "target": "bl-d" } },
                    { "data": { "source": "ch-2", "target": "bl-d" } }
                ]
            }
        });
        GraphModel::load_value(doc, &LoadOptions::default()).unwrap()
    }

    #[test]
    fn cluster_is_deterministic() {
        let model = sample_model();
        let params = LayoutParams::default();
        let a = compute(LayoutKind::Cluster, &model, &params);
        let b = compute(LayoutKind::Cluster, &model, &params);
        assert_eq!(a, b);
    }

    #[test]
    fn cluster_places_orphans_at_origin() {
        let model = sample_model();
        let layout = cluster(&model, &LayoutParams::default());
        let e = model.block_index("bl-e").unwrap();
        assert_eq!(layout.block_positions[e], Vec3::ZERO);
    }

    #[test]
    fn cluster_orbits_single_membership_blocks() {
        let model = sample_model();
        let params = LayoutParams::default();
        let layout = cluster(&model, &params);
        let a = model.block_index("bl-a").unwrap();
        let b = model.block_index("bl-b").unwrap();
        let ch1 = model.channel_index("ch-1").unwrap();
        let hub = layout.channel_positions[ch1];

        let da = layout.block_positions[a].distance(hub);
        assert!(da >= params.block_orbit * 0.99 && da <= params.block_orbit * 2.0);
        // the per-channel counter separates consecutive blocks
        assert!(layout.block_positions[a].distance(layout.block_positions[b]) > 1.0);
    }

    #[test]
    fn cluster_centers_cross_linked_blocks_within_jitter() {
        let model = sample_model();
        let params = LayoutParams::default();
        let layout = cluster(&model, &params);
        let d = model.block_index("bl-d").unwrap();
        let ch1 = model.channel_index("ch-1").unwrap();
        let ch2 = model.channel_index("ch-2").unwrap();
        let midpoint = (layout.channel_positions[ch1] + layout.channel_positions[ch2]) / 2.0;
        assert!(layout.block_positions[d].distance(midpoint) <= params.jitter);
    }

    #[test]
    fn channel_positions_sit_on_the_configured_radius() {
        let model = sample_model();
        let params = LayoutParams::default();
        let layout = cluster(&model, &params);
        for p in &layout.channel_positions {
            assert!((p.length() - params.channel_radius).abs() < 1e-3);
        }
    }

    #[test]
    fn shell_puts_blocks_on_one_sphere() {
        let model = sample_model();
        let params = LayoutParams::default();
        let layout = shell(&model, &params);
        let radius = params.channel_radius * 1.4;
        for p in &layout.block_positions {
            assert!((p.length() - radius).abs() < 1e-3);
        }
    }

    #[test]
    fn timeline_orders_blocks_by_rank() {
        let model = sample_model();
        let layout = timeline(&model, &LayoutParams::default());
        let a = model.block_index("bl-a").unwrap();
        let b = model.block_index("bl-b").unwrap();
        let d = model.block_index("bl-d").unwrap();
        let e = model.block_index("bl-e").unwrap();
        // b (t=100) before a (t=200) before d (t=300); undated e past the end
        assert!(layout.block_positions[b].x < layout.block_positions[a].x);
        assert!(layout.block_positions[a].x < layout.block_positions[d].x);
        assert!(layout.block_positions[e].x > layout.block_positions[d].x);
    }

    #[test]
    fn layouts_cover_every_index() {
        let model = sample_model();
        let params = LayoutParams::default();
        for kind in [LayoutKind::Cluster, LayoutKind::Shell, LayoutKind::Timeline] {
            let layout = compute(kind, &model, &params);
            assert_eq!(layout.channel_positions.len(), model.channels().len());
            assert_eq!(layout.block_positions.len(), model.blocks().len());
        }
    }
}
