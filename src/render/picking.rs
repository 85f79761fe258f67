//! GPU color picking.
//!
//! A second, invisible copy of the instanced node geometry encodes each
//! block's pick id (`index + 1`) as a base-256 RGB triple. Picking renders
//! that geometry into an offscreen 1x1 target through a pick matrix that maps
//! the cursor's screen pixel onto the whole target, then reads the single
//! pixel back and decodes it. Cost is one tiny render pass regardless of how
//! many instances exist.
//!
//! The readback is a synchronous GPU round-trip, the one place a frame can
//! stall; callers are expected to throttle pick() to pointer-move rates
//! (around 30/s) rather than every frame.

use std::mem;
use std::sync::mpsc;

use glam::{Mat4, Vec4};
use wgpu::util::DeviceExt;

/// Returned when nothing is under the cursor or picking is unavailable.
pub const NO_HIT: i32 = -1;

/// Encodes a pick id as a base-256 RGB triple; supports ids up to 2^24 - 1.
pub fn encode_pick_id(id: u32) -> [u8; 3] {
    [(id >> 16) as u8, (id >> 8) as u8, id as u8]
}

/// Inverse of [`encode_pick_id`].
pub fn decode_pick_id(rgb: [u8; 3]) -> u32 {
    ((rgb[0] as u32) << 16) | ((rgb[1] as u32) << 8) | rgb[2] as u32
}

/// Pick id as normalized floats for the per-instance color attribute.
pub fn pick_id_color(id: u32) -> [f32; 3] {
    let [r, g, b] = encode_pick_id(id);
    [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]
}

/// Clip-space transform that maps the NDC point `(ndc_x, ndc_y)` to the
/// origin and blows its screen pixel up to the full viewport, so rendering
/// into a 1x1 target sees exactly that pixel.
pub fn pick_matrix(ndc_x: f32, ndc_y: f32, screen_w: f32, screen_h: f32) -> Mat4 {
    let sx = screen_w.max(1.0);
    let sy = screen_h.max(1.0);
    Mat4::from_cols(
        Vec4::new(sx, 0.0, 0.0, 0.0),
        Vec4::new(0.0, sy, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(-sx * ndc_x, -sy * ndc_y, 0.0, 1.0),
    )
}

/// Borrowed handles to the instanced geometry the pick pass re-renders.
/// Produced by the graph renderer so transforms always match the visible
/// node pass.
pub struct PickGeometry<'a> {
    pub mesh_vertices: &'a wgpu::Buffer,
    pub mesh_indices: &'a wgpu::Buffer,
    pub index_count: u32,
    pub instance_positions: &'a wgpu::Buffer,
    pub instance_scales: &'a wgpu::Buffer,
    pub instance_pick_colors: &'a wgpu::Buffer,
    pub instance_count: u32,
}

struct PickPass {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    target_view: wgpu::TextureView,
    target: wgpu::Texture,
    readback: wgpu::Buffer,
}

/// Answers "which block is under the cursor" in constant time.
///
/// GPU resources are optional: before `initialize`, or after an
/// infrastructure failure, every pick degrades to [`NO_HIT`] with a one-shot
/// warning instead of erroring, since it runs on every pointer move.
pub struct PickingSystem {
    cursor: Option<(f32, f32)>,
    screen_size: (f32, f32),
    gpu: Option<PickPass>,
    warned: bool,
}

impl Default for PickingSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl PickingSystem {
    pub fn new() -> Self {
        Self {
            cursor: None,
            screen_size: (1.0, 1.0),
            gpu: None,
            warned: false,
        }
    }

    /// Cursor position in normalized device coordinates, [-1, 1] each axis.
    pub fn set_cursor(&mut self, ndc_x: f32, ndc_y: f32) {
        self.cursor = Some((ndc_x, ndc_y));
    }

    pub fn clear_cursor(&mut self) {
        self.cursor = None;
    }

    /// Screen size in pixels, used to size the pick matrix.
    pub fn set_screen_size(&mut self, width: f32, height: f32) {
        self.screen_size = (width, height);
    }

    pub fn is_ready(&self) -> bool {
        self.gpu.is_some()
    }

    /// Creates the offscreen target, readback buffer, and material-only
    /// pipeline. Call once when a device becomes available.
    pub fn initialize(&mut self, device: &wgpu::Device) {
        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Pick Target"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        // One row of one pixel, padded to the 256-byte copy alignment.
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Pick Readback"),
            size: 256,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Pick Uniform Buffer"),
            contents: bytemuck::cast_slice(&Mat4::IDENTITY.to_cols_array()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Pick Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Pick Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Pick Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/pick.wgsl").into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Pick Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Pick Pipeline"),
            layout: Some(&pipeline_layout),
            cache: None,
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[
                    // slot 0: shared icosahedron mesh
                    wgpu::VertexBufferLayout {
                        array_stride: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 0,
                            format: wgpu::VertexFormat::Float32x3,
                        }],
                    },
                    // slot 1: per-instance position
                    wgpu::VertexBufferLayout {
                        array_stride: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &[wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 1,
                            format: wgpu::VertexFormat::Float32x3,
                        }],
                    },
                    // slot 2: per-instance scale
                    wgpu::VertexBufferLayout {
                        array_stride: mem::size_of::<f32>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &[wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 2,
                            format: wgpu::VertexFormat::Float32,
                        }],
                    },
                    // slot 3: per-instance pick color
                    wgpu::VertexBufferLayout {
                        array_stride: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &[wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 3,
                            format: wgpu::VertexFormat::Float32x3,
                        }],
                    },
                ],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        self.gpu = Some(PickPass {
            pipeline,
            uniform_buffer,
            bind_group,
            target_view,
            target,
            readback,
        });
    }

    /// Renders the pick geometry for the current cursor pixel and decodes the
    /// hit. Returns the block index under the cursor or [`NO_HIT`].
    pub fn pick(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        geometry: &PickGeometry<'_>,
        view_proj: Mat4,
    ) -> i32 {
        let Some((cx, cy)) = self.cursor else {
            return NO_HIT;
        };
        if self.gpu.is_none() {
            self.warn_degraded();
            return NO_HIT;
        }
        if geometry.instance_count == 0 {
            return NO_HIT;
        }

        let pick_proj = pick_matrix(cx, cy, self.screen_size.0, self.screen_size.1) * view_proj;
        let pixel = self
            .gpu
            .as_ref()
            .and_then(|pass| Self::render_and_read(pass, device, queue, geometry, pick_proj));
        match pixel {
            Some(pixel) => Self::hit_for_pixel(pixel),
            None => {
                // Readback failed; drop GPU picking rather than failing every
                // pointer move from here on.
                self.gpu = None;
                self.warn_degraded();
                NO_HIT
            }
        }
    }

    fn render_and_read(
        pass: &PickPass,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        geometry: &PickGeometry<'_>,
        pick_proj: Mat4,
    ) -> Option<[u8; 4]> {
        queue.write_buffer(
            &pass.uniform_buffer,
            0,
            bytemuck::cast_slice(&pick_proj.to_cols_array()),
        );

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Pick Encoder"),
        });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Pick Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &pass.target_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rpass.set_pipeline(&pass.pipeline);
            rpass.set_bind_group(0, &pass.bind_group, &[]);
            rpass.set_vertex_buffer(0, geometry.mesh_vertices.slice(..));
            rpass.set_vertex_buffer(1, geometry.instance_positions.slice(..));
            rpass.set_vertex_buffer(2, geometry.instance_scales.slice(..));
            rpass.set_vertex_buffer(3, geometry.instance_pick_colors.slice(..));
            rpass.set_index_buffer(geometry.mesh_indices.slice(..), wgpu::IndexFormat::Uint16);
            rpass.draw_indexed(0..geometry.index_count, 0, 0..geometry.instance_count);
        }
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &pass.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &pass.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(256),
                    rows_per_image: None,
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(Some(encoder.finish()));

        let slice = pass.readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = device.poll(wgpu::PollType::Wait);

        match rx.recv() {
            Ok(Ok(())) => {
                let data = slice.get_mapped_range();
                let pixel = [data[0], data[1], data[2], data[3]];
                drop(data);
                pass.readback.unmap();
                Some(pixel)
            }
            _ => None,
        }
    }

    /// Decodes a read-back RGBA pixel into a block index. Id 0 (the clear
    /// color) means nothing was under the cursor.
    fn hit_for_pixel(pixel: [u8; 4]) -> i32 {
        let id = decode_pick_id([pixel[0], pixel[1], pixel[2]]);
        if id == 0 {
            NO_HIT
        } else {
            (id - 1) as i32
        }
    }

    fn warn_degraded(&mut self) {
        if !self.warned {
            log::warn!("GPU picking unavailable, hover hit-testing disabled");
            self.warned = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_id_round_trip() {
        for id in [0u32, 1, 2, 255, 256, 257, 65535, 65536, 0x00ff_ffff] {
            assert_eq!(decode_pick_id(encode_pick_id(id)), id);
        }
    }

    #[test]
    fn black_pixel_means_no_hit() {
        assert_eq!(decode_pick_id([0, 0, 0]), 0);
        assert_eq!(PickingSystem::hit_for_pixel([0, 0, 0, 255]), NO_HIT);
        assert_eq!(PickingSystem::hit_for_pixel([0, 0, 1, 255]), 0);
        assert_eq!(PickingSystem::hit_for_pixel([0, 1, 0, 255]), 255);
    }

    #[test]
    fn pick_colors_quantize_exactly() {
        // 8-bit normalized colors must survive the float round trip so the
        // readback decodes to the exact id
        for id in [1u32, 77, 255, 300, 70000] {
            let c = pick_id_color(id);
            let bytes = [
                (c[0] * 255.0).round() as u8,
                (c[1] * 255.0).round() as u8,
                (c[2] * 255.0).round() as u8,
            ];
            assert_eq!(decode_pick_id(bytes), id);
        }
    }

    #[test]
    fn pick_matrix_centers_cursor() {
        let m = pick_matrix(0.25, -0.5, 800.0, 600.0);
        let p = m * Vec4::new(0.25, -0.5, 0.3, 1.0);
        assert!(p.x.abs() < 1e-5 && p.y.abs() < 1e-5);
        // a point one pixel away lands outside the clip volume
        let off = m * Vec4::new(0.25 + 2.0 / 800.0, -0.5, 0.3, 1.0);
        assert!(off.x > 1.0);
    }

    #[test]
    fn starts_degraded() {
        let picking = PickingSystem::new();
        assert!(!picking.is_ready());
    }
}
