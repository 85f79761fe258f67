//! Batched membership-edge attributes.
//!
//! The primary edge set is fixed at load: one segment per membership edge,
//! drawn in a single batched line-list call. Only attribute values change at
//! runtime. Endpoints are not tracked incrementally; `update_positions`
//! re-derives all of them from the node store's committed positions after a
//! layout change. A separate constellation sub-layer holds transient
//! block-to-block segments (tag-similarity links) and is replaced wholesale.

use std::collections::HashSet;

use crate::graph::{Color, GraphModel};
use crate::render::node_store::InstancedNodeStore;

/// Alpha applied to edges whose target block is faded out.
pub const FADED_EDGE_ALPHA: f32 = 0.04;

#[derive(Debug)]
pub struct EdgeStore {
    /// (channel index, block index) per edge, fixed at construction.
    edges: Vec<(usize, usize)>,
    /// Two xyz endpoints per edge.
    endpoints: Vec<f32>,
    /// One rgb per edge, applied to both endpoints when drawn.
    colors: Vec<f32>,
    original_colors: Vec<f32>,
    alphas: Vec<f32>,

    constellation: Vec<(usize, usize)>,
    constellation_endpoints: Vec<f32>,
    constellation_color: Color,

    endpoint_generation: u64,
    color_generation: u64,
    constellation_generation: u64,
}

impl EdgeStore {
    /// Builds the fixed edge list from the model. Each edge takes its
    /// channel's display color.
    pub fn new(model: &GraphModel) -> Self {
        let edges = model.edges().to_vec();
        let mut colors = Vec::with_capacity(edges.len() * 3);
        for &(channel, _) in &edges {
            colors.extend_from_slice(&model.channels()[channel].color);
        }
        let alphas = vec![1.0; edges.len()];

        Self {
            endpoints: vec![0.0; edges.len() * 6],
            original_colors: colors.clone(),
            colors,
            alphas,
            edges,
            constellation: Vec::new(),
            constellation_endpoints: Vec::new(),
            constellation_color: [1.0; 3],
            endpoint_generation: 0,
            color_generation: 0,
            constellation_generation: 0,
        }
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Re-derives every endpoint (primary and constellation) from the node
    /// store's committed positions. Called once after a layout change, not
    /// per attribute write.
    pub fn update_positions(&mut self, nodes: &InstancedNodeStore) {
        for (i, &(channel, block)) in self.edges.iter().enumerate() {
            let from = nodes.channel_position(channel);
            let to = nodes.get_position(block);
            self.endpoints[i * 6..i * 6 + 3].copy_from_slice(&from.to_array());
            self.endpoints[i * 6 + 3..i * 6 + 6].copy_from_slice(&to.to_array());
        }
        for (i, &(a, b)) in self.constellation.iter().enumerate() {
            let from = nodes.get_position(a);
            let to = nodes.get_position(b);
            self.constellation_endpoints[i * 6..i * 6 + 3].copy_from_slice(&from.to_array());
            self.constellation_endpoints[i * 6 + 3..i * 6 + 6].copy_from_slice(&to.to_array());
        }
        self.endpoint_generation += 1;
    }

    /// Dims every edge whose target block is not in `visible`; edges into
    /// visible blocks get full alpha back.
    pub fn fade_edges_except(&mut self, visible: &HashSet<usize>) {
        for (i, &(_, block)) in self.edges.iter().enumerate() {
            self.alphas[i] = if visible.contains(&block) {
                1.0
            } else {
                FADED_EDGE_ALPHA
            };
        }
        self.color_generation += 1;
    }

    /// Restores every edge's original color and full alpha.
    pub fn reset_colors(&mut self) {
        self.colors.copy_from_slice(&self.original_colors);
        self.alphas.fill(1.0);
        self.color_generation += 1;
    }

    /// Overrides specific edges with a highlight color at full alpha, e.g.
    /// the edges along a found path. Out-of-range indices are ignored.
    pub fn highlight_edges(&mut self, indices: &[usize], color: Color) {
        for &i in indices {
            if i < self.edges.len() {
                self.colors[i * 3..i * 3 + 3].copy_from_slice(&color);
                self.alphas[i] = 1.0;
            }
        }
        self.color_generation += 1;
    }

    /// Edge indices whose endpoints both appear in the given node id path,
    /// for feeding `highlight_edges` from a `shortest_path` result.
    pub fn edges_along(&self, path: &[(usize, usize)]) -> Vec<usize> {
        let wanted: HashSet<(usize, usize)> = path.iter().copied().collect();
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, e)| wanted.contains(e))
            .map(|(i, _)| i)
            .collect()
    }

    /// Replaces the transient constellation layer with block-to-block
    /// segments. Pairs with out-of-range indices are dropped. Endpoints are
    /// derived immediately from committed positions.
    pub fn set_constellation_edges(
        &mut self,
        pairs: &[(usize, usize)],
        color: Color,
        nodes: &InstancedNodeStore,
    ) {
        let count = nodes.block_count();
        self.constellation = pairs
            .iter()
            .copied()
            .filter(|&(a, b)| a < count && b < count)
            .collect();
        self.constellation_endpoints = vec![0.0; self.constellation.len() * 6];
        for (i, &(a, b)) in self.constellation.iter().enumerate() {
            let from = nodes.get_position(a);
            let to = nodes.get_position(b);
            self.constellation_endpoints[i * 6..i * 6 + 3].copy_from_slice(&from.to_array());
            self.constellation_endpoints[i * 6 + 3..i * 6 + 6].copy_from_slice(&to.to_array());
        }
        self.constellation_color = color;
        self.constellation_generation += 1;
    }

    pub fn clear_constellation(&mut self) {
        self.constellation.clear();
        self.constellation_endpoints.clear();
        self.constellation_generation += 1;
    }

    // Committed views for the GPU sync layer.

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub fn endpoints(&self) -> &[f32] {
        &self.endpoints
    }

    pub fn colors(&self) -> &[f32] {
        &self.colors
    }

    pub fn alphas(&self) -> &[f32] {
        &self.alphas
    }

    pub fn constellation_count(&self) -> usize {
        self.constellation.len()
    }

    pub fn constellation_endpoints(&self) -> &[f32] {
        &self.constellation_endpoints
    }

    pub fn constellation_color(&self) -> Color {
        self.constellation_color
    }

    pub fn endpoint_generation(&self) -> u64 {
        self.endpoint_generation
    }

    pub fn color_generation(&self) -> u64 {
        self.color_generation
    }

    pub fn constellation_generation(&self) -> u64 {
        self.constellation_generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphModel, LoadOptions};
    use glam::Vec3;
    use serde_json::json;

    fn fixtures() -> (GraphModel, InstancedNodeStore, EdgeStore) {
        let doc = json!({
            "meta": {},
            "elements": {
                "nodes": [
                    { "data": { "id": "ch-1", "type": "channel", "label": "One" } },
                    { "data": { "id": "ch-2", "type": "channel", "label": "Two" } },
                    { "data": { "id": "bl-a", "type": "block", "label": "A" } },
                    { "data": { "id": "bl-b", "type": "block", "label": "B" } }
                ],
                "edges": [
                    { "data": { "source": "ch-1", "target": "bl-a" } },
                    { "data": { "source": "ch-2", "target": "bl-b" } },
                    { "data": { "source": "ch-2", "target": "bl-a" } }
                ]
            }
        });
        let model = GraphModel::load_value(doc, &LoadOptions::default()).unwrap();
        let nodes = InstancedNodeStore::new(&model);
        let edges = EdgeStore::new(&model);
        (model, nodes, edges)
    }

    #[test]
    fn endpoints_follow_committed_positions() {
        let (_, mut nodes, mut edges) = fixtures();
        nodes.set_channel_position(0, Vec3::new(1.0, 0.0, 0.0));
        nodes.set_position(0, Vec3::new(0.0, 2.0, 0.0));
        edges.update_positions(&nodes);
        // nothing committed yet, endpoints still at origin
        assert_eq!(&edges.endpoints()[0..6], &[0.0; 6]);

        nodes.commit_positions();
        edges.update_positions(&nodes);
        assert_eq!(&edges.endpoints()[0..3], &[1.0, 0.0, 0.0]);
        assert_eq!(&edges.endpoints()[3..6], &[0.0, 2.0, 0.0]);
    }

    #[test]
    fn fade_targets_blocks_not_edges() {
        let (model, _, mut edges) = fixtures();
        let a = model.block_index("bl-a").unwrap();
        edges.fade_edges_except(&HashSet::from([a]));
        // edges 0 and 2 target bl-a, edge 1 targets bl-b
        assert_eq!(edges.alphas(), &[1.0, FADED_EDGE_ALPHA, 1.0]);
    }

    #[test]
    fn highlight_and_reset() {
        let (_, _, mut edges) = fixtures();
        let originals = edges.colors().to_vec();
        edges.fade_edges_except(&HashSet::new());
        edges.highlight_edges(&[1, 99], [1.0, 1.0, 1.0]);
        assert_eq!(&edges.colors()[3..6], &[1.0, 1.0, 1.0]);
        assert_eq!(edges.alphas()[1], 1.0);

        edges.reset_colors();
        assert_eq!(edges.colors(), originals.as_slice());
        assert!(edges.alphas().iter().all(|&a| a == 1.0));
    }

    #[test]
    fn edges_along_path() {
        let (model, _, edges) = fixtures();
        let a = model.block_index("bl-a").unwrap();
        // ch-1 -> bl-a and ch-2 -> bl-a
        let hits = edges.edges_along(&[(0, a), (1, a)]);
        assert_eq!(hits, vec![0, 2]);
    }

    #[test]
    fn constellation_is_fully_replaceable() {
        let (_, mut nodes, mut edges) = fixtures();
        nodes.set_position(0, Vec3::X);
        nodes.set_position(1, Vec3::Y);
        nodes.commit_positions();

        edges.set_constellation_edges(&[(0, 1), (5, 0)], [0.9, 0.9, 0.2], &nodes);
        assert_eq!(edges.constellation_count(), 1); // out-of-range pair dropped
        assert_eq!(&edges.constellation_endpoints()[0..3], &[1.0, 0.0, 0.0]);
        assert_eq!(&edges.constellation_endpoints()[3..6], &[0.0, 1.0, 0.0]);

        edges.set_constellation_edges(&[(1, 0)], [0.2, 0.9, 0.9], &nodes);
        assert_eq!(edges.constellation_count(), 1);
        assert_eq!(&edges.constellation_endpoints()[0..3], &[0.0, 1.0, 0.0]);

        edges.clear_constellation();
        assert_eq!(edges.constellation_count(), 0);
    }

    #[test]
    fn edge_count_is_fixed() {
        let (_, _, mut edges) = fixtures();
        let count = edges.edge_count();
        edges.fade_edges_except(&HashSet::new());
        edges.reset_colors();
        edges.highlight_edges(&[0], [1.0; 3]);
        assert_eq!(edges.edge_count(), count);
    }
}
