//! Per-node instance attributes as flat, GPU-shaped buffers.
//!
//! Every block owns one slot in each buffer, keyed by its model index. All
//! setters write to a staging copy; nothing becomes visible to readers or to
//! the GPU sync layer until the matching `commit_*` call copies staging over
//! the committed buffers and bumps a generation counter. That batches uploads
//! to once per frame no matter how many attributes a mode touches.

use std::collections::HashSet;

use glam::Vec3;

use crate::graph::{Color, GraphModel};

/// Opacity applied to blocks outside the visible set of a fade.
pub const FADED_OPACITY: f32 = 0.08;
/// Scale multiplier applied to blocks outside the visible set of a fade.
pub const FADED_SCALE: f32 = 0.35;

/// Flat attribute and position buffers for all block instances, plus the
/// channel hub positions, which follow the same staged/committed contract so
/// the layout engine can treat both uniformly.
#[derive(Debug)]
pub struct InstancedNodeStore {
    block_count: usize,
    channel_count: usize,

    staged_colors: Vec<f32>,
    committed_colors: Vec<f32>,
    original_colors: Vec<f32>,

    staged_opacity: Vec<f32>,
    committed_opacity: Vec<f32>,
    original_opacity: Vec<f32>,

    staged_scale: Vec<f32>,
    committed_scale: Vec<f32>,
    original_scale: Vec<f32>,

    /// Constant `index + 1` per block; 0 is reserved for "no hit".
    pick_ids: Vec<u32>,

    staged_positions: Vec<f32>,
    committed_positions: Vec<f32>,

    staged_channel_positions: Vec<f32>,
    committed_channel_positions: Vec<f32>,

    attr_generation: u64,
    pos_generation: u64,
}

impl InstancedNodeStore {
    /// Sizes every buffer to the model and seeds colors from the blocks'
    /// inherited channel colors. The seeded values are also kept as the
    /// originals that `reset_attributes` restores.
    pub fn new(model: &GraphModel) -> Self {
        let block_count = model.blocks().len();
        let channel_count = model.channels().len();

        let mut colors = Vec::with_capacity(block_count * 3);
        for block in model.blocks() {
            colors.extend_from_slice(&block.color);
        }
        let opacity = vec![1.0; block_count];
        let scale = vec![1.0; block_count];
        let pick_ids = (0..block_count).map(|i| i as u32 + 1).collect();

        Self {
            block_count,
            channel_count,
            staged_colors: colors.clone(),
            committed_colors: colors.clone(),
            original_colors: colors,
            staged_opacity: opacity.clone(),
            committed_opacity: opacity.clone(),
            original_opacity: opacity,
            staged_scale: scale.clone(),
            committed_scale: scale.clone(),
            original_scale: scale,
            pick_ids,
            staged_positions: vec![0.0; block_count * 3],
            committed_positions: vec![0.0; block_count * 3],
            staged_channel_positions: vec![0.0; channel_count * 3],
            committed_channel_positions: vec![0.0; channel_count * 3],
            attr_generation: 0,
            pos_generation: 0,
        }
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    // Setters run every frame, so out-of-range indices no-op instead of
    // panicking; a throw here would stop rendering entirely.

    pub fn set_color(&mut self, index: usize, color: Color) {
        if index < self.block_count {
            self.staged_colors[index * 3..index * 3 + 3].copy_from_slice(&color);
        }
    }

    pub fn set_opacity(&mut self, index: usize, opacity: f32) {
        if let Some(slot) = self.staged_opacity.get_mut(index) {
            *slot = opacity;
        }
    }

    pub fn set_scale(&mut self, index: usize, scale: f32) {
        if let Some(slot) = self.staged_scale.get_mut(index) {
            *slot = scale;
        }
    }

    pub fn set_position(&mut self, index: usize, position: Vec3) {
        if index < self.block_count {
            self.staged_positions[index * 3..index * 3 + 3].copy_from_slice(&position.to_array());
        }
    }

    pub fn set_channel_position(&mut self, index: usize, position: Vec3) {
        if index < self.channel_count {
            self.staged_channel_positions[index * 3..index * 3 + 3]
                .copy_from_slice(&position.to_array());
        }
    }

    // Committed reads: what the GPU (and the UI layer) currently sees.

    pub fn color(&self, index: usize) -> Color {
        if index < self.block_count {
            let c = &self.committed_colors[index * 3..index * 3 + 3];
            [c[0], c[1], c[2]]
        } else {
            [0.0; 3]
        }
    }

    pub fn opacity(&self, index: usize) -> f32 {
        self.committed_opacity.get(index).copied().unwrap_or(0.0)
    }

    pub fn scale(&self, index: usize) -> f32 {
        self.committed_scale.get(index).copied().unwrap_or(0.0)
    }

    pub fn get_position(&self, index: usize) -> Vec3 {
        if index < self.block_count {
            let p = &self.committed_positions[index * 3..index * 3 + 3];
            Vec3::new(p[0], p[1], p[2])
        } else {
            Vec3::ZERO
        }
    }

    pub fn channel_position(&self, index: usize) -> Vec3 {
        if index < self.channel_count {
            let p = &self.committed_channel_positions[index * 3..index * 3 + 3];
            Vec3::new(p[0], p[1], p[2])
        } else {
            Vec3::ZERO
        }
    }

    /// Publishes staged color/opacity/scale writes.
    pub fn commit_attributes(&mut self) {
        self.committed_colors.copy_from_slice(&self.staged_colors);
        self.committed_opacity.copy_from_slice(&self.staged_opacity);
        self.committed_scale.copy_from_slice(&self.staged_scale);
        self.attr_generation += 1;
    }

    /// Publishes staged block and channel position writes.
    pub fn commit_positions(&mut self) {
        self.committed_positions
            .copy_from_slice(&self.staged_positions);
        self.committed_channel_positions
            .copy_from_slice(&self.staged_channel_positions);
        self.pos_generation += 1;
    }

    /// Stages the original color/opacity/scale for every block. Takes effect
    /// on the next `commit_attributes`, like any other attribute write.
    pub fn reset_attributes(&mut self) {
        self.staged_colors.copy_from_slice(&self.original_colors);
        self.staged_opacity.copy_from_slice(&self.original_opacity);
        self.staged_scale.copy_from_slice(&self.original_scale);
    }

    /// Stages faded opacity/scale for every block not in `visible`, and the
    /// original values for those in it. An empty set fades everything; the
    /// full index range is equivalent to `reset_attributes`.
    pub fn fade_all_except(&mut self, visible: &HashSet<usize>) {
        for i in 0..self.block_count {
            if visible.contains(&i) {
                self.staged_opacity[i] = self.original_opacity[i];
                self.staged_scale[i] = self.original_scale[i];
            } else {
                self.staged_opacity[i] = FADED_OPACITY;
                self.staged_scale[i] = self.original_scale[i] * FADED_SCALE;
            }
        }
    }

    // Flat committed buffers and generations, consumed by the GPU sync layer.

    pub fn colors(&self) -> &[f32] {
        &self.committed_colors
    }

    pub fn opacities(&self) -> &[f32] {
        &self.committed_opacity
    }

    pub fn scales(&self) -> &[f32] {
        &self.committed_scale
    }

    pub fn pick_ids(&self) -> &[u32] {
        &self.pick_ids
    }

    pub fn positions(&self) -> &[f32] {
        &self.committed_positions
    }

    pub fn channel_positions(&self) -> &[f32] {
        &self.committed_channel_positions
    }

    pub fn attr_generation(&self) -> u64 {
        self.attr_generation
    }

    pub fn pos_generation(&self) -> u64 {
        self.pos_generation
    }
}
