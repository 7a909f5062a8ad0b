//! The opaque render driver: one indirect draw per unique mesh.

use std::{mem, num::NonZeroU64};

use glam::{Mat4, Vec3};
use massif::{
    util::bind_merge::{BindGroupBuilder, BindGroupLayoutBuilder},
    GeometryPool,
};
use massif_types::{Handedness, INDIRECT_COMMAND_SIZE, INSTANCE_ID_SIZE, TRANSFORM_SIZE, VERTEX_SIZE};
use wgpu::{
    BindGroup, BindGroupLayout, BindingType, Buffer, BufferBindingType, BufferDescriptor,
    BufferUsages, ColorTargetState, ColorWrites, CompareFunction, DepthBiasState,
    DepthStencilState, Device, Face, FragmentState, FrontFace, IndexFormat, MultisampleState,
    PipelineLayoutDescriptor, PolygonMode, PrimitiveState, PrimitiveTopology, Queue, RenderPass,
    RenderPipeline, RenderPipelineDescriptor, ShaderModuleDescriptor, ShaderSource, ShaderStages,
    StencilState, TextureFormat, VertexAttribute, VertexBufferLayout, VertexState, VertexStepMode,
};

use crate::shaders::OPAQUE_SHADER;

/// Depth format of the opaque pass. Reversed-Z: cleared to 0.0, compared
/// with `GreaterEqual`. The projection matrix must match (see
/// `massif::camera`).
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Depth clear value for [`DEPTH_FORMAT`].
pub const DEPTH_CLEAR: f32 = 0.0;

const VERTEX_ATTRIBUTES: [VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

/// Host mirror of the render shader's uniform block.
#[repr(C, align(16))]
#[derive(Debug, Copy, Clone)]
struct FrameUniforms {
    view_proj: Mat4,
    camera_position: Vec3,
    selected_id: u32,
    time: f32,
    _padding: [u32; 3],
}

unsafe impl bytemuck::Pod for FrameUniforms {}
unsafe impl bytemuck::Zeroable for FrameUniforms {}

/// Per-frame inputs of the opaque pass.
#[derive(Debug, Copy, Clone)]
pub struct FrameParams {
    pub view_proj: Mat4,
    pub camera_position: Vec3,
    pub time: f32,
    /// Identifier to highlight, or `u32::MAX` for none.
    pub selected_id: u32,
}

pub struct OpaqueRoutine {
    pipeline: RenderPipeline,
    uniform_buffer: Buffer,
    bind_group: BindGroup,
}

impl OpaqueRoutine {
    pub fn new(
        device: &Device,
        pool: &GeometryPool,
        surface_format: TextureFormat,
        handedness: Handedness,
    ) -> Self {
        profiling::scope!("OpaqueRoutine::new");

        let module = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("opaque sm"),
            source: ShaderSource::Wgsl(OPAQUE_SHADER.into()),
        });

        let bgl = Self::create_bind_group_layout(device);

        let pll = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("opaque pll"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("opaque pipeline"),
            layout: Some(&pll),
            vertex: VertexState {
                module: &module,
                entry_point: "vs_main",
                buffers: &[VertexBufferLayout {
                    array_stride: VERTEX_SIZE as u64,
                    step_mode: VertexStepMode::Vertex,
                    attributes: &VERTEX_ATTRIBUTES,
                }],
            },
            primitive: PrimitiveState {
                topology: PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: match handedness {
                    Handedness::Left => FrontFace::Cw,
                    Handedness::Right => FrontFace::Ccw,
                },
                cull_mode: Some(Face::Back),
                unclipped_depth: false,
                polygon_mode: PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: Some(DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: CompareFunction::GreaterEqual,
                stencil: StencilState::default(),
                bias: DepthBiasState::default(),
            }),
            multisample: MultisampleState::default(),
            fragment: Some(FragmentState {
                module: &module,
                entry_point: "fs_main",
                targets: &[Some(ColorTargetState {
                    format: surface_format,
                    blend: None,
                    write_mask: ColorWrites::all(),
                })],
            }),
            multiview: None,
        });

        let uniform_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("frame uniforms"),
            size: mem::size_of::<FrameUniforms>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let buffers = pool.buffers();
        let bind_group = BindGroupBuilder::new()
            .append_buffer(&uniform_buffer)
            .append_buffer(&buffers.transform)
            .append_buffer(&buffers.instance_id)
            .append_buffer(&buffers.remap)
            .build(device, Some("opaque bg"), &bgl);

        Self {
            pipeline,
            uniform_buffer,
            bind_group,
        }
    }

    fn create_bind_group_layout(device: &Device) -> BindGroupLayout {
        let storage = |min_size: u64| BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(min_size),
        };

        BindGroupLayoutBuilder::new()
            .append(
                ShaderStages::VERTEX_FRAGMENT,
                BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(mem::size_of::<FrameUniforms>() as u64),
                },
                None,
            )
            .append(ShaderStages::VERTEX, storage(TRANSFORM_SIZE as u64), None)
            .append(ShaderStages::VERTEX, storage(INSTANCE_ID_SIZE as u64), None)
            .append(ShaderStages::VERTEX, storage(4), None)
            .build(device, Some("opaque bgl"))
    }

    pub fn write_uniforms(&self, queue: &Queue, params: &FrameParams) {
        let uniforms = FrameUniforms {
            view_proj: params.view_proj,
            camera_position: params.camera_position,
            selected_id: params.selected_id,
            time: params.time,
            _padding: [0; 3],
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    /// Issues one indirect draw per command. The caller owns the render
    /// pass; the command buffer was filled by this frame's cull dispatch.
    pub fn draw<'rpass>(&'rpass self, rpass: &mut RenderPass<'rpass>, pool: &'rpass GeometryPool) {
        profiling::scope!("OpaqueRoutine::draw");

        let buffers = pool.buffers();

        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.bind_group, &[]);
        rpass.set_vertex_buffer(0, buffers.vertex.slice(..));
        rpass.set_index_buffer(buffers.index.slice(..), IndexFormat::Uint32);

        for i in 0..pool.draw_command_count() {
            rpass.draw_indexed_indirect(&buffers.indirect, i as u64 * INDIRECT_COMMAND_SIZE as u64);
        }
    }
}

#[cfg(test)]
mod test {
    use std::mem::size_of;

    use super::FrameUniforms;

    #[test]
    fn uniform_block_is_96_bytes() {
        assert_eq!(size_of::<FrameUniforms>(), 96);
    }
}
