//! Remap layout construction: turns the segments recorded during ingest
//! into one contiguous remap region per draw command.

/// A pending run of instances recorded against one draw command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Segment {
    pub command: u32,
    pub first_instance: u32,
    pub count: u32,
}

/// Everything `finalize` uploads, computed on the host.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct RemapPlan {
    /// Instance index per remap slot; length equals the total instance count.
    pub remap: Vec<u32>,
    /// Owning command per instance index.
    pub instance_commands: Vec<u32>,
    /// Start of each command's remap region.
    pub command_bases: Vec<u32>,
    /// Size of each command's remap region.
    pub command_counts: Vec<u32>,
}

/// Buckets segments by command, then walks commands in ascending index
/// order writing each command's instances (segments in recording order)
/// into consecutive remap slots. Both orders are fixed, so the layout is a
/// deterministic function of the recorded trace.
pub(crate) fn build_remap(
    command_count: usize,
    instance_count: usize,
    segments: &[Segment],
) -> RemapPlan {
    let mut buckets: Vec<Vec<Segment>> = vec![Vec::new(); command_count];
    for segment in segments {
        buckets[segment.command as usize].push(*segment);
    }

    let mut remap = Vec::with_capacity(instance_count);
    let mut instance_commands = vec![0_u32; instance_count];
    let mut command_bases = Vec::with_capacity(command_count);
    let mut command_counts = Vec::with_capacity(command_count);

    let mut cursor = 0_u32;
    for (command, bucket) in buckets.iter().enumerate() {
        command_bases.push(cursor);

        let mut written = 0_u32;
        for segment in bucket {
            for offset in 0..segment.count {
                let instance = segment.first_instance + offset;
                remap.push(instance);
                instance_commands[instance as usize] = command as u32;
                written += 1;
            }
        }

        command_counts.push(written);
        cursor += written;
    }

    RemapPlan {
        remap,
        instance_commands,
        command_bases,
        command_counts,
    }
}
