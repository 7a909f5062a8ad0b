//! Per-frame drivers for the massif geometry pool.
//!
//! [`InstanceCuller`] records the two compute dispatches that reset and
//! refill the indirect draw table each frame; [`OpaqueRoutine`] issues one
//! indirect draw per unique mesh; [`SceneRenderer`] ties both together on a
//! single command encoder so the device's submission ordering is the only
//! synchronization needed between culling and drawing.

mod culling;
mod opaque;
mod renderer;
mod shaders;

pub use culling::*;
pub use opaque::*;
pub use renderer::*;
