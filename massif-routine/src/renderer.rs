//! The per-frame entry point: cull then draw on one encoder.

use std::sync::Arc;

use glam::{Mat4, UVec2, Vec3};
use massif::GeometryPool;
use massif_types::Handedness;
use wgpu::{
    Color, CommandEncoderDescriptor, Device, Extent3d, LoadOp, Operations, Queue,
    RenderPassColorAttachment, RenderPassDepthStencilAttachment, RenderPassDescriptor, StoreOp,
    Texture, TextureDescriptor, TextureDimension, TextureFormat, TextureUsages, TextureView,
    TextureViewDescriptor,
};

use crate::{
    culling::InstanceCuller,
    opaque::{FrameParams, OpaqueRoutine, DEPTH_CLEAR, DEPTH_FORMAT},
};

/// Owned depth attachment, recreated on resize.
struct DepthTarget {
    // Kept alive for the lifetime of the view.
    _texture: Texture,
    view: TextureView,
    size: UVec2,
}

impl DepthTarget {
    fn new(device: &Device, size: UVec2) -> Self {
        let texture = device.create_texture(&TextureDescriptor {
            label: Some("scene depth target"),
            size: Extent3d {
                width: size.x.max(1),
                height: size.y.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        Self {
            view: texture.create_view(&TextureViewDescriptor::default()),
            _texture: texture,
            size,
        }
    }
}

/// Drives one frame over a finalized [`GeometryPool`]: uploads the frame
/// uniforms, records the reset and cull dispatches and the opaque render
/// pass on a single encoder, and submits.
///
/// One encoder is the synchronization story: the device sequence-enforces
/// the storage writes of the cull pass against the indirect and storage
/// reads of the render pass, so no explicit barriers or fences appear here.
pub struct SceneRenderer {
    device: Arc<Device>,
    queue: Arc<Queue>,
    culler: InstanceCuller,
    opaque: OpaqueRoutine,
    depth: DepthTarget,
    selected_id: u32,
}

impl SceneRenderer {
    pub fn new(
        device: Arc<Device>,
        queue: Arc<Queue>,
        pool: &GeometryPool,
        surface_format: TextureFormat,
        handedness: Handedness,
        size: UVec2,
    ) -> Self {
        profiling::scope!("SceneRenderer::new");

        let culler = InstanceCuller::new(&device, pool);
        let opaque = OpaqueRoutine::new(&device, pool, surface_format, handedness);
        let depth = DepthTarget::new(&device, size);

        Self {
            device,
            queue,
            culler,
            opaque,
            depth,
            selected_id: u32::MAX,
        }
    }

    pub fn resize(&mut self, size: UVec2) {
        if size != self.depth.size {
            self.depth = DepthTarget::new(&self.device, size);
        }
    }

    /// Sets the identifier to highlight in subsequent frames.
    pub fn set_selected(&mut self, id: Option<u32>) {
        self.selected_id = id.unwrap_or(u32::MAX);
    }

    /// Renders one frame into `target`.
    ///
    /// A no-op unless the pool is finalized with at least one instance and
    /// one draw command; calling this earlier is a collaborator bug, not an
    /// error, and is reported through the log.
    pub fn render(
        &mut self,
        pool: &GeometryPool,
        target: &TextureView,
        view_proj: Mat4,
        camera_position: Vec3,
        time: f32,
    ) {
        profiling::scope!("SceneRenderer::render");

        if !pool.is_finalized() {
            log::warn!("render called before the geometry pool was finalized; skipping frame");
            return;
        }
        if pool.instance_count() == 0 || pool.draw_command_count() == 0 {
            return;
        }

        self.opaque.write_uniforms(
            &self.queue,
            &FrameParams {
                view_proj,
                camera_position,
                time,
                selected_id: self.selected_id,
            },
        );

        let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("scene frame encoder"),
        });

        self.culler.cull(&self.queue, &mut encoder, pool, view_proj);

        {
            let mut rpass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("opaque pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(Color::BLACK),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(Operations {
                        load: LoadOp::Clear(DEPTH_CLEAR),
                        store: StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.opaque.draw(&mut rpass, pool);
        }

        self.queue.submit(Some(encoder.finish()));
    }
}
