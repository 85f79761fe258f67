//! wgpu pipelines and buffer synchronization for the graph scene.
//!
//! The renderer never creates a device; it is initialized from an externally
//! owned `wgpu::Device` and holds its GPU objects as `Option` fields until
//! then. `sync` compares the stores' generation counters against the last
//! uploaded ones and re-uploads only buffers that actually changed, so a
//! frame with no committed writes costs nothing on the transfer queue.

use std::mem;

use glam::Mat4;
use wgpu::util::DeviceExt;

use crate::render::edge_store::EdgeStore;
use crate::render::node_store::InstancedNodeStore;
use crate::render::picking::{pick_id_color, PickGeometry};

/// Uniform scale for channel hub geometry.
const CHANNEL_SCALE: f32 = 2.6;
/// Alpha for constellation segments.
const CONSTELLATION_ALPHA: f32 = 0.85;

/// Floats per edge-shader vertex: xyz, rgb, alpha.
const EDGE_VERTEX_FLOATS: usize = 7;

/// Unit icosahedron as (vertices, triangle indices). The shared mesh for
/// every block instance and channel hub.
pub fn icosahedron() -> (Vec<[f32; 3]>, Vec<u16>) {
    let t = (1.0 + 5.0_f32.sqrt()) / 2.0;
    let raw = [
        [-1.0, t, 0.0],
        [1.0, t, 0.0],
        [-1.0, -t, 0.0],
        [1.0, -t, 0.0],
        [0.0, -1.0, t],
        [0.0, 1.0, t],
        [0.0, -1.0, -t],
        [0.0, 1.0, -t],
        [t, 0.0, -1.0],
        [t, 0.0, 1.0],
        [-t, 0.0, -1.0],
        [-t, 0.0, 1.0],
    ];
    let len = (1.0 + t * t).sqrt();
    let vertices = raw.map(|[x, y, z]| [x / len, y / len, z / len]).to_vec();
    let indices = vec![
        0, 11, 5, 0, 5, 1, 0, 1, 7, 0, 7, 10, 0, 10, 11, //
        1, 5, 9, 5, 11, 4, 11, 10, 2, 10, 7, 6, 7, 1, 8, //
        3, 9, 4, 3, 4, 2, 3, 2, 6, 3, 6, 8, 3, 8, 9, //
        4, 9, 5, 2, 4, 11, 6, 2, 10, 8, 6, 7, 9, 8, 1,
    ];
    (vertices, indices)
}

/// Interleaves an edge endpoint/color/alpha set into line-list vertex data.
pub fn edge_vertex_data(endpoints: &[f32], colors: &[f32], alphas: &[f32]) -> Vec<f32> {
    let count = alphas.len();
    let mut data = Vec::with_capacity(count * 2 * EDGE_VERTEX_FLOATS);
    for i in 0..count {
        for endpoint in 0..2 {
            let p = i * 6 + endpoint * 3;
            data.extend_from_slice(&endpoints[p..p + 3]);
            data.extend_from_slice(&colors[i * 3..i * 3 + 3]);
            data.push(alphas[i]);
        }
    }
    data
}

struct GpuState {
    node_pipeline: wgpu::RenderPipeline,
    edge_pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,

    mesh_vertices: wgpu::Buffer,
    mesh_indices: wgpu::Buffer,
    index_count: u32,

    block_positions: wgpu::Buffer,
    block_scales: wgpu::Buffer,
    block_colors: wgpu::Buffer,
    block_opacities: wgpu::Buffer,
    block_pick_colors: wgpu::Buffer,
    block_count: u32,

    channel_positions: wgpu::Buffer,
    channel_scales: wgpu::Buffer,
    channel_colors: wgpu::Buffer,
    channel_opacities: wgpu::Buffer,
    channel_count: u32,

    edge_vertices: wgpu::Buffer,
    edge_vertex_count: u32,
    constellation_vertices: Option<wgpu::Buffer>,
    constellation_vertex_count: u32,
}

/// Scene renderer: one instanced draw for all blocks, one small draw per
/// channel hub, one batched line-list draw for edges plus the constellation
/// overlay.
pub struct GraphRenderer {
    gpu: Option<GpuState>,
    synced_attr_generation: Option<u64>,
    synced_pos_generation: Option<u64>,
    synced_edge_generation: Option<(u64, u64)>,
    synced_constellation_generation: Option<(u64, u64)>,
}

impl Default for GraphRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphRenderer {
    pub fn new() -> Self {
        Self {
            gpu: None,
            synced_attr_generation: None,
            synced_pos_generation: None,
            synced_edge_generation: None,
            synced_constellation_generation: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.gpu.is_some()
    }

    /// Creates pipelines and allocates every fixed-size buffer. Instance
    /// buffer contents are uploaded on the first `sync`.
    pub fn initialize(
        &mut self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        nodes: &InstancedNodeStore,
        edges: &EdgeStore,
    ) {
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Graph Uniform Buffer"),
            contents: bytemuck::cast_slice(&Mat4::IDENTITY.to_cols_array()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Graph Bind Group Layout"),
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
            label: Some("Graph Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Graph Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let node_pipeline = Self::create_node_pipeline(device, &pipeline_layout, format);
        let edge_pipeline = Self::create_edge_pipeline(device, &pipeline_layout, format);

        let (vertices, indices) = icosahedron();
        let mesh_vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Node Mesh Vertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let mesh_indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Node Mesh Indices"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let instance_buffer = |label: &str, floats: usize| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: (floats.max(1) * mem::size_of::<f32>()) as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };

        let block_count = nodes.block_count();
        let channel_count = nodes.channel_count();

        let pick_colors: Vec<[f32; 3]> = nodes.pick_ids().iter().map(|&id| pick_id_color(id)).collect();
        let block_pick_colors = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Block Pick Colors"),
            contents: bytemuck::cast_slice(&pick_colors),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let channel_scales = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Channel Scales"),
            contents: bytemuck::cast_slice(&vec![CHANNEL_SCALE; channel_count.max(1)]),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let channel_opacities = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Channel Opacities"),
            contents: bytemuck::cast_slice(&vec![1.0_f32; channel_count.max(1)]),
            usage: wgpu::BufferUsages::VERTEX,
        });

        self.gpu = Some(GpuState {
            node_pipeline,
            edge_pipeline,
            uniform_buffer,
            bind_group,
            mesh_vertices,
            mesh_indices,
            index_count: indices.len() as u32,
            block_positions: instance_buffer("Block Positions", block_count * 3),
            block_scales: instance_buffer("Block Scales", block_count),
            block_colors: instance_buffer("Block Colors", block_count * 3),
            block_opacities: instance_buffer("Block Opacities", block_count),
            block_pick_colors,
            block_count: block_count as u32,
            channel_positions: instance_buffer("Channel Positions", channel_count * 3),
            channel_scales,
            channel_colors: instance_buffer("Channel Colors", channel_count * 3),
            channel_opacities,
            channel_count: channel_count as u32,
            edge_vertices: instance_buffer(
                "Edge Vertices",
                edges.edge_count() * 2 * EDGE_VERTEX_FLOATS,
            ),
            edge_vertex_count: (edges.edge_count() * 2) as u32,
            constellation_vertices: None,
            constellation_vertex_count: 0,
        });

        // force full upload on the next sync
        self.synced_attr_generation = None;
        self.synced_pos_generation = None;
        self.synced_edge_generation = None;
        self.synced_constellation_generation = None;
    }

    /// Uploads the committed state of both stores, skipping buffers whose
    /// generation has not moved since the previous sync. Channel colors ride
    /// along with attribute uploads.
    pub fn sync(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        nodes: &InstancedNodeStore,
        edges: &EdgeStore,
        channel_colors: &[f32],
    ) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };

        if self.synced_attr_generation != Some(nodes.attr_generation()) {
            queue.write_buffer(&gpu.block_colors, 0, bytemuck::cast_slice(nodes.colors()));
            queue.write_buffer(
                &gpu.block_opacities,
                0,
                bytemuck::cast_slice(nodes.opacities()),
            );
            queue.write_buffer(&gpu.block_scales, 0, bytemuck::cast_slice(nodes.scales()));
            queue.write_buffer(&gpu.channel_colors, 0, bytemuck::cast_slice(channel_colors));
            self.synced_attr_generation = Some(nodes.attr_generation());
        }

        if self.synced_pos_generation != Some(nodes.pos_generation()) {
            queue.write_buffer(
                &gpu.block_positions,
                0,
                bytemuck::cast_slice(nodes.positions()),
            );
            queue.write_buffer(
                &gpu.channel_positions,
                0,
                bytemuck::cast_slice(nodes.channel_positions()),
            );
            self.synced_pos_generation = Some(nodes.pos_generation());
        }

        let edge_generation = (edges.endpoint_generation(), edges.color_generation());
        if self.synced_edge_generation != Some(edge_generation) {
            let data = edge_vertex_data(edges.endpoints(), edges.colors(), edges.alphas());
            if !data.is_empty() {
                queue.write_buffer(&gpu.edge_vertices, 0, bytemuck::cast_slice(&data));
            }
            self.synced_edge_generation = Some(edge_generation);
        }

        let constellation_generation =
            (edges.constellation_generation(), edges.endpoint_generation());
        if self.synced_constellation_generation != Some(constellation_generation) {
            let count = edges.constellation_count();
            if count == 0 {
                gpu.constellation_vertices = None;
                gpu.constellation_vertex_count = 0;
            } else {
                let color = edges.constellation_color();
                let colors: Vec<f32> = color.iter().copied().cycle().take(count * 3).collect();
                let alphas = vec![CONSTELLATION_ALPHA; count];
                let data = edge_vertex_data(edges.constellation_endpoints(), &colors, &alphas);
                // replaced wholesale, so a fresh buffer is simpler than
                // tracking capacity
                gpu.constellation_vertices =
                    Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Constellation Vertices"),
                        contents: bytemuck::cast_slice(&data),
                        usage: wgpu::BufferUsages::VERTEX,
                    }));
                gpu.constellation_vertex_count = (count * 2) as u32;
            }
            self.synced_constellation_generation = Some(constellation_generation);
        }
    }

    pub fn set_view_proj(&self, queue: &wgpu::Queue, view_proj: Mat4) {
        if let Some(gpu) = &self.gpu {
            queue.write_buffer(
                &gpu.uniform_buffer,
                0,
                bytemuck::cast_slice(&view_proj.to_cols_array()),
            );
        }
    }

    /// Issues all scene draws into an externally begun render pass: edges
    /// and constellation first, then block instances, then channel hubs as
    /// distinct draws.
    pub fn draw(&self, rpass: &mut wgpu::RenderPass<'_>) {
        let Some(gpu) = &self.gpu else {
            return;
        };

        rpass.set_bind_group(0, &gpu.bind_group, &[]);

        rpass.set_pipeline(&gpu.edge_pipeline);
        if gpu.edge_vertex_count > 0 {
            rpass.set_vertex_buffer(0, gpu.edge_vertices.slice(..));
            rpass.draw(0..gpu.edge_vertex_count, 0..1);
        }
        if let (Some(buffer), count @ 1..) =
            (&gpu.constellation_vertices, gpu.constellation_vertex_count)
        {
            rpass.set_vertex_buffer(0, buffer.slice(..));
            rpass.draw(0..count, 0..1);
        }

        rpass.set_pipeline(&gpu.node_pipeline);
        rpass.set_index_buffer(gpu.mesh_indices.slice(..), wgpu::IndexFormat::Uint16);
        rpass.set_vertex_buffer(0, gpu.mesh_vertices.slice(..));

        if gpu.block_count > 0 {
            rpass.set_vertex_buffer(1, gpu.block_positions.slice(..));
            rpass.set_vertex_buffer(2, gpu.block_scales.slice(..));
            rpass.set_vertex_buffer(3, gpu.block_colors.slice(..));
            rpass.set_vertex_buffer(4, gpu.block_opacities.slice(..));
            rpass.draw_indexed(0..gpu.index_count, 0, 0..gpu.block_count);
        }

        if gpu.channel_count > 0 {
            rpass.set_vertex_buffer(1, gpu.channel_positions.slice(..));
            rpass.set_vertex_buffer(2, gpu.channel_scales.slice(..));
            rpass.set_vertex_buffer(3, gpu.channel_colors.slice(..));
            rpass.set_vertex_buffer(4, gpu.channel_opacities.slice(..));
            for i in 0..gpu.channel_count {
                rpass.draw_indexed(0..gpu.index_count, 0, i..i + 1);
            }
        }
    }

    /// Geometry handles for the pick pass; `None` until initialized.
    pub fn pick_geometry(&self) -> Option<PickGeometry<'_>> {
        self.gpu.as_ref().map(|gpu| PickGeometry {
            mesh_vertices: &gpu.mesh_vertices,
            mesh_indices: &gpu.mesh_indices,
            index_count: gpu.index_count,
            instance_positions: &gpu.block_positions,
            instance_scales: &gpu.block_scales,
            instance_pick_colors: &gpu.block_pick_colors,
            instance_count: gpu.block_count,
        })
    }

    fn create_node_pipeline(
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        format: wgpu::TextureFormat,
    ) -> wgpu::RenderPipeline {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Node Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/node.wgsl").into()),
        });

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Node Pipeline"),
            layout: Some(layout),
            cache: None,
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 0,
                            format: wgpu::VertexFormat::Float32x3,
                        }],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &[wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 1,
                            format: wgpu::VertexFormat::Float32x3,
                        }],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: mem::size_of::<f32>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &[wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 2,
                            format: wgpu::VertexFormat::Float32,
                        }],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &[wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 3,
                            format: wgpu::VertexFormat::Float32x3,
                        }],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: mem::size_of::<f32>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &[wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 4,
                            format: wgpu::VertexFormat::Float32,
                        }],
                    },
                ],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
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
        })
    }

    fn create_edge_pipeline(
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        format: wgpu::TextureFormat,
    ) -> wgpu::RenderPipeline {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Edge Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/edge.wgsl").into()),
        });

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Edge Pipeline"),
            layout: Some(layout),
            cache: None,
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: (EDGE_VERTEX_FLOATS * mem::size_of::<f32>())
                        as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[
                        wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 0,
                            format: wgpu::VertexFormat::Float32x3,
                        },
                        wgpu::VertexAttribute {
                            offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                            shader_location: 1,
                            format: wgpu::VertexFormat::Float32x3,
                        },
                        wgpu::VertexAttribute {
                            offset: mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                            shader_location: 2,
                            format: wgpu::VertexFormat::Float32,
                        },
                    ],
                }],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        })
    }
}
