//! Data contracts shared by the massif crates.
//!
//! Everything in here is either a byte-exact mirror of a GPU buffer element
//! or a host-side handle into those buffers. The strides are load-bearing:
//! shaders index these buffers as fixed-stride arrays, so a change to any
//! `#[repr(C)]` struct below is a change to the wire format.

use glam::Vec3;
use thiserror::Error;

/// Stride of one interleaved vertex in the vertex atlas.
pub const VERTEX_SIZE: usize = 24;
/// Stride of one index in the index atlas.
pub const INDEX_SIZE: usize = 4;
/// Stride of one instance transform (column-major 4x4).
pub const TRANSFORM_SIZE: usize = 64;
/// Stride of one instance identifier record.
pub const INSTANCE_ID_SIZE: usize = 16;
/// Stride of one indirect draw command.
pub const INDIRECT_COMMAND_SIZE: usize = 20;
/// Stride of one remap entry.
pub const REMAP_ENTRY_SIZE: usize = 4;

/// Winding convention of the input geometry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

/// One interleaved vertex: position followed by normal.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

unsafe impl bytemuck::Pod for Vertex {}
unsafe impl bytemuck::Zeroable for Vertex {}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
        }
    }
}

/// The arguments of one `draw_indexed_indirect` call, in buffer layout.
///
/// `index_count`, `first_index` and `base_vertex` are fixed at mesh append
/// time. `first_instance` and `instance_count` are written at finalization;
/// afterwards only `instance_count` changes, and only by the cull kernel.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DrawIndexedIndirect {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: u32,
    pub first_instance: u32,
}

unsafe impl bytemuck::Pod for DrawIndexedIndirect {}
unsafe impl bytemuck::Zeroable for DrawIndexedIndirect {}

/// One per-instance identifier record.
///
/// The padding keeps the stride at 16 bytes, which is what the shader-side
/// `array<vec4<u32>>` binding expects. Do not collapse this to a bare `u32`.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct InstanceId {
    pub id: u32,
    _padding: [u32; 3],
}

unsafe impl bytemuck::Pod for InstanceId {}
unsafe impl bytemuck::Zeroable for InstanceId {}

impl InstanceId {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            _padding: [0; 3],
        }
    }
}

/// Host-side handle to a mesh that has been appended into the atlas.
///
/// Instances referencing the mesh are recorded against `command_index`;
/// the remaining fields locate the geometry inside the shared buffers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MeshAtlasEntry {
    pub command_index: u32,
    pub base_vertex: u32,
    pub first_index: u32,
    pub index_count: u32,
}

/// Error returned when a [`MeshData`] fails validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MeshValidationError {
    #[error("mesh has no vertices")]
    ZeroVertices,
    #[error("mesh has no indices")]
    ZeroIndices,
    #[error("index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: u32 },
}

/// An indexed triangle mesh in atlas-ready form.
///
/// Indices are local: they address into this mesh's own vertex list, and the
/// draw command's `base_vertex` supplies the absolute offset at draw time.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Checks the invariants the atlas relies on: non-empty vertex and index
    /// lists, and every index in range.
    pub fn validate(&self) -> Result<(), MeshValidationError> {
        if self.vertices.is_empty() {
            return Err(MeshValidationError::ZeroVertices);
        }
        if self.indices.is_empty() {
            return Err(MeshValidationError::ZeroIndices);
        }
        let vertex_count = self.vertices.len() as u32;
        if let Some(&index) = self.indices.iter().find(|&&i| i >= vertex_count) {
            return Err(MeshValidationError::IndexOutOfRange {
                index,
                vertex_count,
            });
        }
        Ok(())
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}
