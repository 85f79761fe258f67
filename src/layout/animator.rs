//! Layout transition animator.
//!
//! Single-slot state machine: Idle -> Animating -> Idle. Starting a new
//! transition while one is in flight cancels it — the old completion
//! callback is dropped unfired and the new animation starts from whatever
//! (possibly partially interpolated) positions are committed right now.
//! There is no queue of pending transitions.

use glam::Vec3;

use crate::layout::Layout;
use crate::render::edge_store::EdgeStore;
use crate::render::node_store::InstancedNodeStore;

type CompleteFn = Box<dyn FnOnce()>;

/// Cubic ease-out: fast start, settling finish. `t` is clamped to [0, 1].
pub fn ease_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

struct Animation {
    start_channels: Vec<Vec3>,
    start_blocks: Vec<Vec3>,
    target: Layout,
    duration_ms: f32,
    elapsed_ms: f32,
    on_complete: Option<CompleteFn>,
}

enum State {
    Idle,
    Animating(Animation),
}

/// Owns the one in-flight layout transition and steps it once per frame.
pub struct LayoutEngine {
    state: State,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutEngine {
    pub fn new() -> Self {
        Self { state: State::Idle }
    }

    pub fn is_animating(&self) -> bool {
        matches!(self.state, State::Animating(_))
    }

    /// Snaps every channel and block position to the layout with no
    /// interpolation, cancelling any in-flight animation. Used at first load.
    pub fn apply_immediate(
        &mut self,
        layout: &Layout,
        nodes: &mut InstancedNodeStore,
        edges: &mut EdgeStore,
    ) {
        self.state = State::Idle;
        write_layout(layout, nodes);
        nodes.commit_positions();
        edges.update_positions(nodes);
    }

    /// Begins interpolating from the currently committed positions toward
    /// `layout` over `duration_ms`. `on_complete` fires exactly once, when
    /// the transition finishes; a cancelled transition's callback never
    /// fires.
    pub fn animate_to(
        &mut self,
        layout: Layout,
        duration_ms: f32,
        nodes: &InstancedNodeStore,
        on_complete: Option<CompleteFn>,
    ) {
        let start_channels = (0..nodes.channel_count())
            .map(|i| nodes.channel_position(i))
            .collect();
        let start_blocks = (0..nodes.block_count())
            .map(|i| nodes.get_position(i))
            .collect();
        // assigning over an Animating state drops the old callback, which is
        // the cancel semantics
        self.state = State::Animating(Animation {
            start_channels,
            start_blocks,
            target: layout,
            duration_ms,
            elapsed_ms: 0.0,
            on_complete,
        });
    }

    /// Steps the in-flight animation by `dt_ms`. No-op when idle. A
    /// non-positive duration completes on the first step.
    pub fn advance(&mut self, dt_ms: f32, nodes: &mut InstancedNodeStore, edges: &mut EdgeStore) {
        let State::Animating(animation) = &mut self.state else {
            return;
        };

        animation.elapsed_ms += dt_ms.max(0.0);
        let t = if animation.duration_ms <= 0.0 {
            1.0
        } else {
            (animation.elapsed_ms / animation.duration_ms).min(1.0)
        };
        let ease = ease_out_cubic(t);

        // land exactly on the target, not on a lerp rounding of it
        let done = t >= 1.0;
        for (i, target) in animation.target.channel_positions.iter().enumerate() {
            if done {
                nodes.set_channel_position(i, *target);
            } else if let Some(start) = animation.start_channels.get(i) {
                nodes.set_channel_position(i, start.lerp(*target, ease));
            }
        }
        for (i, target) in animation.target.block_positions.iter().enumerate() {
            if done {
                nodes.set_position(i, *target);
            } else if let Some(start) = animation.start_blocks.get(i) {
                nodes.set_position(i, start.lerp(*target, ease));
            }
        }
        nodes.commit_positions();
        edges.update_positions(nodes);

        if t >= 1.0 {
            let callback = animation.on_complete.take();
            self.state = State::Idle;
            if let Some(callback) = callback {
                callback();
            }
        }
    }
}

fn write_layout(layout: &Layout, nodes: &mut InstancedNodeStore) {
    for (i, p) in layout.channel_positions.iter().enumerate() {
        nodes.set_channel_position(i, *p);
    }
    for (i, p) in layout.block_positions.iter().enumerate() {
        nodes.set_position(i, *p);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphModel, LoadOptions};
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn fixtures() -> (InstancedNodeStore, EdgeStore) {
        let doc = json!({
            "meta": {},
            "elements": {
                "nodes": [
                    { "data": { "id": "ch-1", "type": "channel", "label": "One" } },
                    { "data": { "id": "bl-a", "type": "block", "label": "A" } },
                    { "data": { "id": "bl-b", "type": "block", "label": "B" } }
                ],
                "edges": [
                    { "data": { "source": "ch-1", "target": "bl-a" } },
                    { "data": { "source": "ch-1", "target": "bl-b" } }
                ]
            }
        });
        let model = GraphModel::load_value(doc, &LoadOptions::default()).unwrap();
        (InstancedNodeStore::new(&model), EdgeStore::new(&model))
    }

    fn layout(x: f32) -> Layout {
        Layout {
            channel_positions: vec![Vec3::new(x, 1.0, 0.0)],
            block_positions: vec![Vec3::new(x, 0.0, 0.0), Vec3::new(x, -1.0, 0.0)],
        }
    }

    #[test]
    fn ease_endpoints() {
        assert_eq!(ease_out_cubic(0.0), 0.0);
        assert_eq!(ease_out_cubic(1.0), 1.0);
        assert_eq!(ease_out_cubic(2.0), 1.0);
        assert!(ease_out_cubic(0.5) > 0.5, "ease-out front-loads movement");
    }

    #[test]
    fn apply_immediate_snaps_and_updates_edges() {
        let (mut nodes, mut edges) = fixtures();
        let mut engine = LayoutEngine::new();
        engine.apply_immediate(&layout(10.0), &mut nodes, &mut edges);
        assert_eq!(nodes.get_position(0), Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(nodes.channel_position(0), Vec3::new(10.0, 1.0, 0.0));
        assert_eq!(&edges.endpoints()[0..3], &[10.0, 1.0, 0.0]);
        assert!(!engine.is_animating());
    }

    #[test]
    fn animation_hits_exact_endpoints() {
        let (mut nodes, mut edges) = fixtures();
        let mut engine = LayoutEngine::new();
        engine.apply_immediate(&layout(0.0), &mut nodes, &mut edges);

        engine.animate_to(layout(10.0), 100.0, &nodes, None);
        // t = 0: still at the start
        engine.advance(0.0, &mut nodes, &mut edges);
        assert_eq!(nodes.get_position(0), Vec3::ZERO);
        assert!(engine.is_animating());

        engine.advance(50.0, &mut nodes, &mut edges);
        let mid = nodes.get_position(0).x;
        assert!(mid > 0.0 && mid < 10.0);

        engine.advance(100.0, &mut nodes, &mut edges);
        assert_eq!(nodes.get_position(0), Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(nodes.channel_position(0), Vec3::new(10.0, 1.0, 0.0));
        assert!(!engine.is_animating());
    }

    #[test]
    fn restart_interpolates_from_current_positions() {
        let (mut nodes, mut edges) = fixtures();
        let mut engine = LayoutEngine::new();
        engine.apply_immediate(&layout(0.0), &mut nodes, &mut edges);

        engine.animate_to(layout(10.0), 100.0, &nodes, None);
        engine.advance(50.0, &mut nodes, &mut edges);
        let partial = nodes.get_position(0);
        assert!(partial.x > 0.0 && partial.x < 10.0);

        // restart toward a different target: start is the partial position
        engine.animate_to(layout(-10.0), 100.0, &nodes, None);
        engine.advance(0.0, &mut nodes, &mut edges);
        assert_eq!(nodes.get_position(0), partial);

        engine.advance(200.0, &mut nodes, &mut edges);
        assert_eq!(nodes.get_position(0), Vec3::new(-10.0, 0.0, 0.0));
    }

    #[test]
    fn completion_fires_once_and_cancel_never_fires() {
        let (mut nodes, mut edges) = fixtures();
        let mut engine = LayoutEngine::new();
        engine.apply_immediate(&layout(0.0), &mut nodes, &mut edges);

        let fired = Rc::new(Cell::new(0));
        let f = fired.clone();
        engine.animate_to(layout(5.0), 100.0, &nodes, Some(Box::new(move || {
            f.set(f.get() + 1);
        })));
        engine.advance(150.0, &mut nodes, &mut edges);
        engine.advance(16.0, &mut nodes, &mut edges);
        assert_eq!(fired.get(), 1);

        // a cancelled animation's callback is dropped unfired
        let cancelled = Rc::new(Cell::new(0));
        let c = cancelled.clone();
        engine.animate_to(layout(1.0), 100.0, &nodes, Some(Box::new(move || {
            c.set(c.get() + 1);
        })));
        engine.animate_to(layout(2.0), 100.0, &nodes, None);
        engine.advance(500.0, &mut nodes, &mut edges);
        assert_eq!(cancelled.get(), 0);
    }

    #[test]
    fn zero_duration_snaps_on_first_step() {
        let (mut nodes, mut edges) = fixtures();
        let mut engine = LayoutEngine::new();
        engine.animate_to(layout(3.0), 0.0, &nodes, None);
        engine.advance(0.0, &mut nodes, &mut edges);
        assert_eq!(nodes.get_position(0), Vec3::new(3.0, 0.0, 0.0));
        assert!(!engine.is_animating());
    }
}
