//! Orchestration layer tying the model, stores, layout, and picking together.
//!
//! Buffer ownership is by convention: exactly one visual mode drives the
//! mutating store APIs in any frame. The convention is made structural here —
//! `ActiveMode` is a tagged enum and `set_mode` is the only place that writes
//! mode-driven attributes, so two features can never fight over the same
//! index within a frame.

use std::collections::HashSet;

use glam::Mat4;

use crate::graph::{Color, GraphModel};
use crate::layout::{compute, LayoutEngine, LayoutKind, LayoutParams};
use crate::render::edge_store::EdgeStore;
use crate::render::gpu::GraphRenderer;
use crate::render::node_store::InstancedNodeStore;
use crate::render::picking::{PickingSystem, NO_HIT};

const PATH_HIGHLIGHT: Color = [1.0, 1.0, 1.0];
const CONSTELLATION_COLOR: Color = [0.95, 0.85, 0.35];
/// Cap on constellation links shown for one selection.
const SIMILAR_LIMIT: usize = 12;
/// Default layout transition length.
pub const TRANSITION_MS: f32 = 900.0;

/// The one visual mode currently driving render attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveMode {
    /// Everything visible at rest.
    Explore,
    /// Only blocks matching a search term stay prominent.
    Search { term: String },
    /// Only blocks carrying a tag stay prominent.
    TagFilter { tag: String },
    /// Highlights the shortest path between two node ids.
    Path { from: String, to: String },
    /// Chronological strip layout.
    Timeline,
}

/// Owns the full engine state and exposes the interaction surface the UI
/// layer consumes: mode switching, hover/selection, layout transitions, and
/// the per-frame tick.
pub struct Engine {
    model: GraphModel,
    nodes: InstancedNodeStore,
    edges: EdgeStore,
    layout_engine: LayoutEngine,
    picking: PickingSystem,
    renderer: GraphRenderer,
    params: LayoutParams,
    channel_colors: Vec<f32>,
    mode: ActiveMode,
    hovered: i32,
    selected: i32,
}

impl Engine {
    /// Builds stores for the model and snaps to the cluster layout.
    pub fn new(model: GraphModel) -> Self {
        Self::with_params(model, LayoutParams::default())
    }

    pub fn with_params(model: GraphModel, params: LayoutParams) -> Self {
        let mut nodes = InstancedNodeStore::new(&model);
        let mut edges = EdgeStore::new(&model);
        let mut layout_engine = LayoutEngine::new();

        let initial = compute(LayoutKind::Cluster, &model, &params);
        layout_engine.apply_immediate(&initial, &mut nodes, &mut edges);

        let channel_colors = model
            .channels()
            .iter()
            .flat_map(|c| c.color)
            .collect();

        Self {
            model,
            nodes,
            edges,
            layout_engine,
            picking: PickingSystem::new(),
            renderer: GraphRenderer::new(),
            params,
            channel_colors,
            mode: ActiveMode::Explore,
            hovered: NO_HIT,
            selected: NO_HIT,
        }
    }

    pub fn model(&self) -> &GraphModel {
        &self.model
    }

    pub fn nodes(&self) -> &InstancedNodeStore {
        &self.nodes
    }

    pub fn edges(&self) -> &EdgeStore {
        &self.edges
    }

    pub fn mode(&self) -> &ActiveMode {
        &self.mode
    }

    pub fn hovered(&self) -> i32 {
        self.hovered
    }

    pub fn selected(&self) -> i32 {
        self.selected
    }

    pub fn is_animating(&self) -> bool {
        self.layout_engine.is_animating()
    }

    pub fn picking_mut(&mut self) -> &mut PickingSystem {
        &mut self.picking
    }

    /// Switches the active visual mode: first restores neutral attributes,
    /// then applies the new mode's fades and highlights, then commits once.
    pub fn set_mode(&mut self, mode: ActiveMode) {
        // undo whatever the previous mode staged
        self.nodes.reset_attributes();
        self.edges.reset_colors();
        self.edges.clear_constellation();
        self.selected = NO_HIT;

        match &mode {
            ActiveMode::Explore => {
                self.transition_to(LayoutKind::Cluster, TRANSITION_MS);
            }
            ActiveMode::Search { term } => {
                let visible: HashSet<usize> = self.model.search(term).into_iter().collect();
                self.nodes.fade_all_except(&visible);
                self.edges.fade_edges_except(&visible);
            }
            ActiveMode::TagFilter { tag } => {
                let visible: HashSet<usize> =
                    self.model.blocks_with_tag(tag).into_iter().collect();
                self.nodes.fade_all_except(&visible);
                self.edges.fade_edges_except(&visible);
            }
            ActiveMode::Path { from, to } => {
                self.apply_path(from, to);
            }
            ActiveMode::Timeline => {
                self.transition_to(LayoutKind::Timeline, TRANSITION_MS);
            }
        }

        self.nodes.commit_attributes();
        self.mode = mode;
    }

    fn apply_path(&mut self, from: &str, to: &str) {
        let path = self.model.shortest_path(from, to);
        if path.is_empty() {
            // nothing reachable: fade the whole scene to signal the miss
            self.nodes.fade_all_except(&HashSet::new());
            self.edges.fade_edges_except(&HashSet::new());
            return;
        }

        let visible: HashSet<usize> = path
            .iter()
            .filter_map(|id| self.model.block_index(id))
            .collect();
        self.nodes.fade_all_except(&visible);
        self.edges.fade_edges_except(&visible);

        // hop pairs -> (channel index, block index) regardless of direction
        let hops: Vec<(usize, usize)> = path
            .windows(2)
            .filter_map(|pair| {
                let (a, b) = (&pair[0], &pair[1]);
                match (self.model.channel_index(a), self.model.block_index(b)) {
                    (Some(c), Some(bl)) => Some((c, bl)),
                    _ => match (self.model.channel_index(b), self.model.block_index(a)) {
                        (Some(c), Some(bl)) => Some((c, bl)),
                        _ => None,
                    },
                }
            })
            .collect();
        let along = self.edges.edges_along(&hops);
        self.edges.highlight_edges(&along, PATH_HIGHLIGHT);
    }

    /// Animated transition to a computed layout.
    pub fn transition_to(&mut self, kind: LayoutKind, duration_ms: f32) {
        let layout = compute(kind, &self.model, &self.params);
        self.layout_engine
            .animate_to(layout, duration_ms, &self.nodes, None);
    }

    /// Selects a block and strings constellation links to its most similar
    /// blocks (shared tags). `NO_HIT` clears the selection.
    pub fn select(&mut self, block_index: i32) {
        self.selected = block_index;
        if block_index < 0 {
            self.edges.clear_constellation();
            return;
        }
        let index = block_index as usize;
        let pairs: Vec<(usize, usize)> = self
            .model
            .similar_blocks(index)
            .into_iter()
            .take(SIMILAR_LIMIT)
            .map(|(other, _)| (index, other))
            .collect();
        if pairs.is_empty() {
            self.edges.clear_constellation();
        } else {
            self.edges
                .set_constellation_edges(&pairs, CONSTELLATION_COLOR, &self.nodes);
        }
    }

    /// Records a hover hit coming from the picking pass (or [`NO_HIT`]).
    pub fn set_hover(&mut self, hit: i32) {
        self.hovered = if hit >= 0 && (hit as usize) < self.nodes.block_count() {
            hit
        } else {
            NO_HIT
        };
    }

    /// Runs the GPU pick for the current cursor and records the hover.
    /// Callers should throttle this to pointer-move rates; the readback is a
    /// synchronous round-trip.
    pub fn pick(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, view_proj: Mat4) -> i32 {
        let hit = match self.renderer.pick_geometry() {
            Some(geometry) => self.picking.pick(device, queue, &geometry, view_proj),
            None => NO_HIT,
        };
        self.set_hover(hit);
        self.hovered
    }

    /// Per-frame tick: steps any layout transition. Attribute commits happen
    /// where the writes happen (`set_mode`), so an idle frame uploads
    /// nothing.
    pub fn frame(&mut self, dt_ms: f32) {
        self.layout_engine
            .advance(dt_ms, &mut self.nodes, &mut self.edges);
    }

    /// Creates GPU pipelines for rendering and picking.
    pub fn initialize_gpu(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) {
        self.renderer
            .initialize(device, format, &self.nodes, &self.edges);
        self.picking.initialize(device);
    }

    /// Uploads committed store state; cheap when nothing changed.
    pub fn sync_gpu(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        self.renderer
            .sync(device, queue, &self.nodes, &self.edges, &self.channel_colors);
    }

    pub fn set_view_proj(&self, queue: &wgpu::Queue, view_proj: Mat4) {
        self.renderer.set_view_proj(queue, view_proj);
    }

    pub fn draw(&self, rpass: &mut wgpu::RenderPass<'_>) {
        self.renderer.draw(rpass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LoadOptions;
    use crate::render::node_store::FADED_OPACITY;
    use serde_json::json;

    fn engine() -> Engine {
        let doc = json!({
            "meta": {
                "searchIndex": { "red": ["bl-a"] },
                "autoTagIndex": { "photo": ["bl-a", "bl-b"] }
            },
            "elements": {
                "nodes": [
                    { "data": { "id": "ch-1", "type": "channel", "label": "One" } },
                    { "data": { "id": "ch-2", "type": "channel", "label": "Two" } },
                    { "data": { "id": "bl-a", "type": "block", "label": "A", "autoTags": ["photo"] } },
                    { "data": { "id": "bl-b", "type": "block", "label": "B", "autoTags": ["photo"] } },
                    { "data": { "id": "bl-c", "type": "block", "label": "C" } }
                ],
                "edges": [
                    { "data": { "source": "ch-1", "target": "bl-a" } },
                    { "data": { "source": "ch-1", "target": "bl-b" } },
                    { "data": { "source": "ch-2", "target": "bl-b" } },
                    { "data": { "source": "ch-2", "target": "bl-c" } }
                ]
            }
        });
        let model = GraphModel::load_value(doc, &LoadOptions::default()).unwrap();
        Engine::new(model)
    }

    #[test]
    fn starts_in_explore_with_layout_applied() {
        let engine = engine();
        assert_eq!(*engine.mode(), ActiveMode::Explore);
        // cluster layout was applied immediately, so positions are committed
        assert!(engine.nodes().get_position(0).length() > 0.0);
        assert_eq!(engine.hovered(), NO_HIT);
    }

    #[test]
    fn search_mode_fades_non_matches() {
        let mut engine = engine();
        engine.set_mode(ActiveMode::Search {
            term: "red".into(),
        });
        let a = engine.model().block_index("bl-a").unwrap();
        let b = engine.model().block_index("bl-b").unwrap();
        assert_eq!(engine.nodes().opacity(a), 1.0);
        assert_eq!(engine.nodes().opacity(b), FADED_OPACITY);
    }

    #[test]
    fn mode_switch_restores_previous_fades() {
        let mut engine = engine();
        engine.set_mode(ActiveMode::Search {
            term: "red".into(),
        });
        engine.set_mode(ActiveMode::TagFilter {
            tag: "photo".into(),
        });
        let b = engine.model().block_index("bl-b").unwrap();
        let c = engine.model().block_index("bl-c").unwrap();
        // b was faded by search, but the tag filter includes it again
        assert_eq!(engine.nodes().opacity(b), 1.0);
        assert_eq!(engine.nodes().opacity(c), FADED_OPACITY);
    }

    #[test]
    fn path_mode_highlights_hops() {
        let mut engine = engine();
        engine.set_mode(ActiveMode::Path {
            from: "bl-a".into(),
            to: "bl-c".into(),
        });
        // bl-a - ch-1 - bl-b - ch-2 - bl-c: all three blocks visible
        for id in ["bl-a", "bl-b", "bl-c"] {
            let i = engine.model().block_index(id).unwrap();
            assert_eq!(engine.nodes().opacity(i), 1.0);
        }
        // the four traversed edges are highlighted white
        let highlighted = engine
            .edges()
            .colors()
            .chunks(3)
            .filter(|c| *c == [1.0, 1.0, 1.0])
            .count();
        assert_eq!(highlighted, 4);
    }

    #[test]
    fn unreachable_path_fades_everything() {
        let mut engine = engine();
        engine.set_mode(ActiveMode::Path {
            from: "bl-a".into(),
            to: "nope".into(),
        });
        for i in 0..engine.nodes().block_count() {
            assert_eq!(engine.nodes().opacity(i), FADED_OPACITY);
        }
    }

    #[test]
    fn selection_drives_constellation() {
        let mut engine = engine();
        let a = engine.model().block_index("bl-a").unwrap();
        engine.select(a as i32);
        assert_eq!(engine.selected(), a as i32);
        assert_eq!(engine.edges().constellation_count(), 1); // bl-b shares "photo"

        engine.select(NO_HIT);
        assert_eq!(engine.edges().constellation_count(), 0);
    }

    #[test]
    fn mode_switch_clears_selection() {
        let mut engine = engine();
        let a = engine.model().block_index("bl-a").unwrap();
        engine.select(a as i32);
        assert_eq!(engine.edges().constellation_count(), 1);

        engine.set_mode(ActiveMode::TagFilter {
            tag: "photo".into(),
        });
        assert_eq!(engine.selected(), NO_HIT);
        assert_eq!(engine.edges().constellation_count(), 0);
    }

    #[test]
    fn timeline_mode_starts_a_transition() {
        let mut engine = engine();
        engine.set_mode(ActiveMode::Timeline);
        assert!(engine.is_animating());
        let before = engine.nodes().get_position(0);
        engine.frame(TRANSITION_MS * 2.0);
        assert!(!engine.is_animating());
        assert_ne!(engine.nodes().get_position(0), before);
    }

    #[test]
    fn hover_is_bounds_checked() {
        let mut engine = engine();
        engine.set_hover(1);
        assert_eq!(engine.hovered(), 1);
        engine.set_hover(999);
        assert_eq!(engine.hovered(), NO_HIT);
        engine.set_hover(-5);
        assert_eq!(engine.hovered(), NO_HIT);
    }
}
