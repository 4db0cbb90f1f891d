//! # Rendering
//!
//! Everything between voxel data and the GPU: the vertex format, the meshers
//! and the collaborator traits through which the terrain uploads and draws
//! chunk meshes.
//!
//! ## Key Components
//!
//! * `meshing` - Dense and octree greedy meshers
//! * `gpu` - Upload, completion-token and draw seams plus a headless backend
//! * `wgpu_backend` - Native implementation of the seams (not on wasm)

pub mod gpu;
pub mod meshing;
pub mod vertex;

#[cfg(not(target_family = "wasm"))]
pub mod wgpu_backend;

pub use gpu::{
    CompletionToken, DrawRecorder, DrawTarget, FenceGate, HeadlessBuffers, HeadlessFence,
    HeadlessUploader, UploadContext,
};
pub use vertex::Vertex;
