//! Cross-chunk mesh deduplication.
//!
//! Input tilesets repeat the same unique mesh across many chunks. The atlas
//! itself only appends; this cache sits in front of it and guarantees that
//! one fingerprint always resolves to one [`MeshAtlasEntry`], so instances
//! from every chunk land on the same draw command. That shared command is
//! why the pool supports non-contiguous instance sets per command.

use massif_types::{MeshAtlasEntry, MeshData};

use crate::{
    pool::{GeometryPool, PoolError},
    util::typedefs::FastHashMap,
};

#[derive(Default)]
pub struct MeshDedupCache {
    entries: FastHashMap<u64, MeshAtlasEntry>,
}

impl MeshDedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing entry for `fingerprint`, or appends `mesh` into
    /// the pool and caches the new entry.
    ///
    /// The fingerprint is computed by the caller (the tile parser hashes
    /// dequantized geometry); the cache only promises fingerprint
    /// stability, not content comparison.
    pub fn get_or_append(
        &mut self,
        pool: &mut GeometryPool,
        fingerprint: u64,
        mesh: &MeshData,
    ) -> Result<MeshAtlasEntry, PoolError> {
        if let Some(&entry) = self.entries.get(&fingerprint) {
            return Ok(entry);
        }

        let entry = pool.append_mesh(mesh)?;
        self.entries.insert(fingerprint, entry);
        Ok(entry)
    }

    pub fn get(&self, fingerprint: u64) -> Option<MeshAtlasEntry> {
        self.entries.get(&fingerprint).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
