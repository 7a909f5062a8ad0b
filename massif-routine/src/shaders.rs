//! WGSL sources, embedded at compile time.

pub(crate) const CULL_SHADER: &str = include_str!("../shaders/cull.wgsl");
pub(crate) const OPAQUE_SHADER: &str = include_str!("../shaders/opaque.wgsl");
