//! The compute culling driver.

use std::{mem, num::NonZeroU64};

use glam::Mat4;
use massif::{
    util::{bind_merge::{BindGroupBuilder, BindGroupLayoutBuilder}, frustum::Frustum, math::round_up_div},
    GeometryPool,
};
use massif_types::{INDIRECT_COMMAND_SIZE, TRANSFORM_SIZE};
use wgpu::{
    BindGroup, BindGroupLayout, BindingType, Buffer, BufferBindingType, BufferDescriptor,
    BufferUsages, CommandEncoder, ComputePassDescriptor, ComputePipeline,
    ComputePipelineDescriptor, Device, PipelineLayoutDescriptor, Queue, ShaderModuleDescriptor,
    ShaderSource, ShaderStages,
};

use crate::shaders::CULL_SHADER;

/// Thread count of both cull kernels. Dispatch sizes are rounded up to it.
pub const WORKGROUP_SIZE: u32 = 64;

/// Host mirror of the cull shader's uniform block.
#[repr(C, align(16))]
#[derive(Debug, Copy, Clone)]
struct CullingUniforms {
    frustum: Frustum,
    total_instances: u32,
    draw_command_count: u32,
    _pad0: u32,
    _pad1: u32,
}

unsafe impl bytemuck::Pod for CullingUniforms {}
unsafe impl bytemuck::Zeroable for CullingUniforms {}

/// Records the per-frame reset and cull dispatches.
///
/// Both kernels share one bind group over the pool's buffers; since those
/// buffers never reallocate, the bind group is built once here and reused
/// every frame.
pub struct InstanceCuller {
    reset_pipeline: ComputePipeline,
    cull_pipeline: ComputePipeline,
    uniform_buffer: Buffer,
    bind_group: BindGroup,
}

impl InstanceCuller {
    pub fn new(device: &Device, pool: &GeometryPool) -> Self {
        profiling::scope!("InstanceCuller::new");

        let module = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("instance cull sm"),
            source: ShaderSource::Wgsl(CULL_SHADER.into()),
        });

        let bgl = Self::create_bind_group_layout(device);

        let pll = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("instance cull pll"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let reset_pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("reset counts pipeline"),
            layout: Some(&pll),
            module: &module,
            entry_point: "reset_counts",
        });

        let cull_pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("cull instances pipeline"),
            layout: Some(&pll),
            module: &module,
            entry_point: "cull_instances",
        });

        let uniform_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("culling uniforms"),
            size: mem::size_of::<CullingUniforms>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let buffers = pool.buffers();
        let bind_group = BindGroupBuilder::new()
            .append_buffer(&uniform_buffer)
            .append_buffer(&buffers.transform)
            .append_buffer(&buffers.indirect)
            .append_buffer(&buffers.remap)
            .append_buffer(&buffers.instance_command)
            .append_buffer(&buffers.command_base)
            .append_buffer(&buffers.bounds)
            .build(device, Some("instance cull bg"), &bgl);

        Self {
            reset_pipeline,
            cull_pipeline,
            uniform_buffer,
            bind_group,
        }
    }

    fn create_bind_group_layout(device: &Device) -> BindGroupLayout {
        let storage = |read_only: bool, min_size: u64| BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(min_size),
        };

        BindGroupLayoutBuilder::new()
            .append(
                ShaderStages::COMPUTE,
                BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(mem::size_of::<CullingUniforms>() as u64),
                },
                None,
            )
            .append(ShaderStages::COMPUTE, storage(true, TRANSFORM_SIZE as u64), None)
            .append(
                ShaderStages::COMPUTE,
                storage(false, INDIRECT_COMMAND_SIZE as u64),
                None,
            )
            .append(ShaderStages::COMPUTE, storage(false, 4), None)
            .append(ShaderStages::COMPUTE, storage(true, 4), None)
            .append(ShaderStages::COMPUTE, storage(true, 4), None)
            .append(ShaderStages::COMPUTE, storage(true, 16), None)
            .build(device, Some("instance cull bgl"))
    }

    /// Uploads the frame's frustum and records both dispatches on the given
    /// encoder. With an unfinalized or empty pool this records nothing.
    ///
    /// The planes are extracted from the full view-projection matrix, so
    /// they are world-space: the kernel tests world-space spheres without
    /// touching the view matrix.
    pub fn cull(
        &self,
        queue: &Queue,
        encoder: &mut CommandEncoder,
        pool: &GeometryPool,
        view_proj: Mat4,
    ) {
        profiling::scope!("InstanceCuller::cull");

        let total_instances = pool.instance_count();
        let draw_command_count = pool.draw_command_count();
        if !pool.is_finalized() || total_instances == 0 || draw_command_count == 0 {
            return;
        }

        let uniforms = CullingUniforms {
            frustum: Frustum::from_matrix(view_proj),
            total_instances,
            draw_command_count,
            _pad0: 0,
            _pad1: 0,
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let mut cpass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("instance culling"),
            timestamp_writes: None,
        });

        cpass.set_bind_group(0, &self.bind_group, &[]);

        cpass.set_pipeline(&self.reset_pipeline);
        cpass.dispatch_workgroups(round_up_div(draw_command_count, WORKGROUP_SIZE), 1, 1);

        cpass.set_pipeline(&self.cull_pipeline);
        cpass.dispatch_workgroups(round_up_div(total_instances, WORKGROUP_SIZE), 1, 1);
    }
}
