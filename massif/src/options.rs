use massif_types::{
    INDIRECT_COMMAND_SIZE, INDEX_SIZE, INSTANCE_ID_SIZE, REMAP_ENTRY_SIZE, TRANSFORM_SIZE,
    VERTEX_SIZE,
};

/// Fixed capacities of every pool buffer, chosen once at startup.
///
/// There is no runtime growth: an append past any of these limits is
/// rejected. Sizing is a deployment decision, so this is a config struct
/// rather than a set of constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityConfig {
    pub max_vertices: u32,
    pub max_indices: u32,
    pub max_instances: u32,
    pub max_commands: u32,
}

impl Default for CapacityConfig {
    /// 4M vertices (96 MB), 8M indices (32 MB), 1M instances (64 MB of
    /// transforms), 4096 unique meshes.
    fn default() -> Self {
        Self {
            max_vertices: 1 << 22,
            max_indices: 1 << 23,
            max_instances: 1 << 20,
            max_commands: 1 << 12,
        }
    }
}

impl CapacityConfig {
    pub fn vertex_atlas_bytes(&self) -> u64 {
        self.max_vertices as u64 * VERTEX_SIZE as u64
    }

    pub fn index_atlas_bytes(&self) -> u64 {
        self.max_indices as u64 * INDEX_SIZE as u64
    }

    pub fn transform_bytes(&self) -> u64 {
        self.max_instances as u64 * TRANSFORM_SIZE as u64
    }

    pub fn instance_id_bytes(&self) -> u64 {
        self.max_instances as u64 * INSTANCE_ID_SIZE as u64
    }

    pub fn indirect_bytes(&self) -> u64 {
        self.max_commands as u64 * INDIRECT_COMMAND_SIZE as u64
    }

    pub fn remap_bytes(&self) -> u64 {
        self.max_instances as u64 * REMAP_ENTRY_SIZE as u64
    }
}
