//! The geometry pool: every persistent GPU buffer of the core, plus the
//! append/finalize protocol that fills them.

use std::sync::Arc;

use glam::{Mat4, Vec3};
use massif_types::{
    DrawIndexedIndirect, InstanceId, MeshAtlasEntry, MeshData, MeshValidationError, INDEX_SIZE,
    INSTANCE_ID_SIZE, TRANSFORM_SIZE, VERTEX_SIZE,
};
use thiserror::Error;
use wgpu::{Buffer, BufferDescriptor, BufferUsages, Device, Queue};

use crate::{options::CapacityConfig, util::frustum::BoundingSphere};

mod finalize;

use finalize::{build_remap, Segment};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("vertex atlas full: {requested} vertices requested, {available} slots available")]
    VertexCapacityExceeded { requested: u32, available: u32 },
    #[error("index atlas full: {requested} indices requested, {available} slots available")]
    IndexCapacityExceeded { requested: u32, available: u32 },
    #[error("instance buffers full: {requested} instances requested, {available} slots available")]
    InstanceCapacityExceeded { requested: u32, available: u32 },
    #[error("draw command table full: all {max_commands} slots in use")]
    CommandCapacityExceeded { max_commands: u32 },
    #[error(transparent)]
    InvalidMesh(#[from] MeshValidationError),
}

/// Load-time vs render-time. The transition is one-way, via
/// [`GeometryPool::finalize`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PoolPhase {
    Loading,
    Finalized,
}

/// The persistent device buffers. Created once, never reallocated.
///
/// Collaborator shaders may bind any of these read-only; during a frame the
/// only GPU writers are the cull kernels, which touch `indirect`
/// (`instance_count` fields) and `remap`.
pub struct PoolBuffers {
    /// Interleaved position+normal vertices, 24 byte stride.
    pub vertex: Buffer,
    /// u32 indices, local to each mesh's vertex range.
    pub index: Buffer,
    /// Column-major 4x4 instance transforms, 64 byte stride.
    pub transform: Buffer,
    /// Per-instance identifiers, padded to a 16 byte stride.
    pub instance_id: Buffer,
    /// One 20 byte indirect draw command per unique mesh.
    pub indirect: Buffer,
    /// u32 per remap slot: hardware instance slot -> absolute instance index.
    pub remap: Buffer,
    /// u32 per instance: owning draw command.
    pub instance_command: Buffer,
    /// u32 per command: start of its remap region.
    pub command_base: Buffer,
    /// Local bounding sphere per command, `vec4` of center + radius.
    pub bounds: Buffer,
    /// One u32 scalar per instance, reserved for collaborators (ghost
    /// effects, clash annotations). The core allocates it and never touches
    /// it again.
    pub instance_state: Buffer,
}

/// Owns the shared geometry atlas and all per-instance state.
///
/// During the load phase, [`append_mesh`](Self::append_mesh) fills the
/// atlas, [`append_instances`](Self::append_instances) fills the instance
/// buffers and [`record_command_instances`](Self::record_command_instances)
/// accumulates which instances belong to which command. A final
/// [`finalize`](Self::finalize) lays out the remap buffer and uploads the
/// indirect draw table; afterwards the pool is immutable from the host.
pub struct GeometryPool {
    device: Arc<Device>,
    queue: Arc<Queue>,
    config: CapacityConfig,

    buffers: PoolBuffers,

    commands: Vec<DrawIndexedIndirect>,
    bounds: Vec<BoundingSphere>,
    segments: Vec<Segment>,

    vertex_cursor: u32,
    index_cursor: u32,
    instance_cursor: u32,

    phase: PoolPhase,
}

impl GeometryPool {
    pub fn new(device: Arc<Device>, queue: Arc<Queue>, config: CapacityConfig) -> Self {
        profiling::scope!("GeometryPool::new");

        let storage = BufferUsages::STORAGE | BufferUsages::COPY_DST;
        let create = |label: &str, size: u64, usage: BufferUsages| {
            device.create_buffer(&BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            })
        };

        let buffers = PoolBuffers {
            vertex: create(
                "vertex atlas",
                config.vertex_atlas_bytes(),
                BufferUsages::VERTEX | BufferUsages::COPY_DST,
            ),
            index: create(
                "index atlas",
                config.index_atlas_bytes(),
                BufferUsages::INDEX | BufferUsages::COPY_DST,
            ),
            transform: create("instance transforms", config.transform_bytes(), storage),
            instance_id: create("instance identifiers", config.instance_id_bytes(), storage),
            indirect: create(
                "indirect draw commands",
                config.indirect_bytes(),
                BufferUsages::INDIRECT | BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
            ),
            remap: create(
                "instance remap",
                config.remap_bytes(),
                storage | BufferUsages::COPY_SRC,
            ),
            instance_command: create(
                "instance to command map",
                config.max_instances as u64 * 4,
                storage,
            ),
            command_base: create("command base offsets", config.max_commands as u64 * 4, storage),
            bounds: create("mesh bounding spheres", config.max_commands as u64 * 16, storage),
            instance_state: create("instance state", config.max_instances as u64 * 4, storage),
        };

        log::debug!(
            "created geometry pool: {} vertices, {} indices, {} instances, {} commands",
            config.max_vertices,
            config.max_indices,
            config.max_instances,
            config.max_commands
        );

        Self {
            device,
            queue,
            config,
            buffers,
            commands: Vec::new(),
            bounds: Vec::new(),
            segments: Vec::new(),
            vertex_cursor: 0,
            index_cursor: 0,
            instance_cursor: 0,
            phase: PoolPhase::Loading,
        }
    }

    /// Appends a unique mesh into the shared vertex/index atlases and
    /// allocates its draw command slot.
    ///
    /// The command is created with a zero instance count; instances attach
    /// to it through [`record_command_instances`](Self::record_command_instances).
    /// On any error nothing has been written.
    pub fn append_mesh(&mut self, mesh: &MeshData) -> Result<MeshAtlasEntry, PoolError> {
        profiling::scope!("GeometryPool::append_mesh");

        assert_eq!(
            self.phase,
            PoolPhase::Loading,
            "meshes can only be appended during the load phase"
        );

        mesh.validate()?;

        let vertex_count = mesh.vertex_count();
        let index_count = mesh.index_count();

        // Every capacity check happens before the first write, so a failed
        // append leaves no partial state behind.
        if self.commands.len() as u32 >= self.config.max_commands {
            return Err(PoolError::CommandCapacityExceeded {
                max_commands: self.config.max_commands,
            });
        }
        if vertex_count > self.config.max_vertices - self.vertex_cursor {
            return Err(PoolError::VertexCapacityExceeded {
                requested: vertex_count,
                available: self.config.max_vertices - self.vertex_cursor,
            });
        }
        if index_count > self.config.max_indices - self.index_cursor {
            return Err(PoolError::IndexCapacityExceeded {
                requested: index_count,
                available: self.config.max_indices - self.index_cursor,
            });
        }

        self.queue.write_buffer(
            &self.buffers.vertex,
            self.vertex_cursor as u64 * VERTEX_SIZE as u64,
            bytemuck::cast_slice(&mesh.vertices),
        );
        self.queue.write_buffer(
            &self.buffers.index,
            self.index_cursor as u64 * INDEX_SIZE as u64,
            bytemuck::cast_slice(&mesh.indices),
        );

        let positions: Vec<Vec3> = mesh
            .vertices
            .iter()
            .map(|v| Vec3::from(v.position))
            .collect();

        let entry = MeshAtlasEntry {
            command_index: self.commands.len() as u32,
            base_vertex: self.vertex_cursor,
            first_index: self.index_cursor,
            index_count,
        };

        self.commands.push(DrawIndexedIndirect {
            index_count,
            instance_count: 0,
            first_index: entry.first_index,
            base_vertex: entry.base_vertex,
            first_instance: 0,
        });
        self.bounds.push(BoundingSphere::from_points(&positions));

        self.vertex_cursor += vertex_count;
        self.index_cursor += index_count;

        log::trace!(
            "appended mesh {}: {} vertices at {}, {} indices at {}",
            entry.command_index,
            vertex_count,
            entry.base_vertex,
            index_count,
            entry.first_index
        );

        Ok(entry)
    }

    /// Appends a batch of instances, returning the index of the first one.
    ///
    /// Instance records are dense and never move; the returned index stays
    /// valid for the pool's whole lifetime.
    pub fn append_instances(&mut self, transforms: &[Mat4], ids: &[u32]) -> Result<u32, PoolError> {
        profiling::scope!("GeometryPool::append_instances");

        assert_eq!(
            self.phase,
            PoolPhase::Loading,
            "instances can only be appended during the load phase"
        );
        assert_eq!(
            transforms.len(),
            ids.len(),
            "every instance transform needs exactly one identifier"
        );
        assert!(!transforms.is_empty(), "cannot append an empty instance batch");

        let count = transforms.len() as u32;
        if count > self.config.max_instances - self.instance_cursor {
            return Err(PoolError::InstanceCapacityExceeded {
                requested: count,
                available: self.config.max_instances - self.instance_cursor,
            });
        }

        self.queue.write_buffer(
            &self.buffers.transform,
            self.instance_cursor as u64 * TRANSFORM_SIZE as u64,
            bytemuck::cast_slice(transforms),
        );

        let id_records: Vec<InstanceId> = ids.iter().map(|&id| InstanceId::new(id)).collect();
        self.queue.write_buffer(
            &self.buffers.instance_id,
            self.instance_cursor as u64 * INSTANCE_ID_SIZE as u64,
            bytemuck::cast_slice(&id_records),
        );

        let start = self.instance_cursor;
        self.instance_cursor += count;

        Ok(start)
    }

    /// Records that instances `[first_instance, first_instance + count)`
    /// belong to `command_index`. Segments from different input chunks may
    /// target the same command; nothing is visible in the remap buffer
    /// until [`finalize`](Self::finalize).
    pub fn record_command_instances(&mut self, command_index: u32, first_instance: u32, count: u32) {
        assert_eq!(
            self.phase,
            PoolPhase::Loading,
            "segments can only be recorded during the load phase"
        );
        assert!(
            (command_index as usize) < self.commands.len(),
            "segment references draw command {command_index} which does not exist"
        );
        assert!(count > 0, "cannot record an empty segment");
        assert!(
            first_instance + count <= self.instance_cursor,
            "segment references instances that have not been appended"
        );

        self.segments.push(Segment {
            command: command_index,
            first_instance,
            count,
        });
    }

    /// Compacts the recorded segments into one contiguous remap region per
    /// command and uploads the remap buffer, the full indirect draw table
    /// and the culling side tables in one burst.
    ///
    /// With nothing recorded this logs a warning and the pool stays in the
    /// load phase. Calling it again after success is a no-op.
    pub fn finalize(&mut self) {
        profiling::scope!("GeometryPool::finalize");

        if self.phase == PoolPhase::Finalized {
            return;
        }
        if self.segments.is_empty() {
            log::warn!("finalize called with no recorded instance segments; pool stays in the load phase");
            return;
        }

        let plan = build_remap(self.commands.len(), self.instance_cursor as usize, &self.segments);
        debug_assert_eq!(
            plan.remap.len(),
            self.instance_cursor as usize,
            "recorded segments must cover every appended instance exactly once"
        );

        for ((command, &base), &count) in self
            .commands
            .iter_mut()
            .zip(&plan.command_bases)
            .zip(&plan.command_counts)
        {
            command.first_instance = base;
            command.instance_count = count;
        }

        self.queue.write_buffer(
            &self.buffers.remap,
            0,
            bytemuck::cast_slice(&plan.remap),
        );
        self.queue
            .write_buffer(&self.buffers.indirect, 0, bytemuck::cast_slice(&self.commands));
        self.queue.write_buffer(
            &self.buffers.instance_command,
            0,
            bytemuck::cast_slice(&plan.instance_commands),
        );
        self.queue.write_buffer(
            &self.buffers.command_base,
            0,
            bytemuck::cast_slice(&plan.command_bases),
        );
        self.queue
            .write_buffer(&self.buffers.bounds, 0, bytemuck::cast_slice(&self.bounds));

        self.phase = PoolPhase::Finalized;

        log::info!(
            "geometry pool finalized: {} draw commands, {} instances, {} vertices, {} indices",
            self.commands.len(),
            self.instance_cursor,
            self.vertex_cursor,
            self.index_cursor
        );
    }

    pub fn phase(&self) -> PoolPhase {
        self.phase
    }

    pub fn is_finalized(&self) -> bool {
        self.phase == PoolPhase::Finalized
    }

    pub fn draw_command_count(&self) -> u32 {
        self.commands.len() as u32
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_cursor
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_cursor
    }

    pub fn index_count(&self) -> u32 {
        self.index_cursor
    }

    /// Host mirror of the indirect draw table. After finalization the
    /// `instance_count` fields hold the finalized region sizes, which are
    /// the per-frame upper bounds for the cull output.
    pub fn commands(&self) -> &[DrawIndexedIndirect] {
        &self.commands
    }

    /// Host mirror of the per-command local bounding spheres.
    pub fn mesh_bounds(&self) -> &[BoundingSphere] {
        &self.bounds
    }

    pub fn buffers(&self) -> &PoolBuffers {
        &self.buffers
    }

    pub fn config(&self) -> &CapacityConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// Eagerly releases every device buffer. Dropping the pool does the
    /// same thing lazily; this exists for device-loss teardown paths.
    pub fn dispose(self) {
        let PoolBuffers {
            vertex,
            index,
            transform,
            instance_id,
            indirect,
            remap,
            instance_command,
            command_base,
            bounds,
            instance_state,
        } = self.buffers;

        for buffer in [
            vertex,
            index,
            transform,
            instance_id,
            indirect,
            remap,
            instance_command,
            command_base,
            bounds,
            instance_state,
        ] {
            buffer.destroy();
        }
    }
}
