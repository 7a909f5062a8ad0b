//! Core of a GPU-driven renderer for very large static instanced scenes.
//!
//! The design target is millions of instances drawn from a few thousand
//! unique meshes with a handful of indirect draw commands per frame and no
//! per-instance CPU work. All per-instance state lives in fixed-capacity
//! GPU buffers owned by the [`GeometryPool`]; frustum culling runs entirely
//! on the GPU (see the `massif-routine` crate for the per-frame drivers).
//!
//! The pool has two phases. During loading, collaborators append unique
//! meshes and batches of instances and record which draw command each batch
//! belongs to. A one-way [`GeometryPool::finalize`] call then compacts the
//! recorded segments so every command owns a contiguous region of the remap
//! buffer, and uploads the indirect draw table. Only after that may frames
//! be rendered.

mod camera;
mod dedup;
mod options;
mod pool;
mod setup;
pub mod util;

pub use camera::*;
pub use dedup::*;
pub use options::*;
pub use pool::*;
pub use setup::*;

pub use massif_types as types;
