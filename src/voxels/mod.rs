//! # Voxel Data
//!
//! Storage formats for voxel content, shared by the meshers and the terrain.
//!
//! * **Material / Palette**: RGBA materials addressed by one-byte indices
//! * **Matrix**: dense grid, one index per cell
//! * **Octree**: sparse encoding of a matrix with uniform regions collapsed
//! * **qb**: reader for single-matrix Qubicle Binary files

pub mod material;
pub mod matrix;
pub mod octree;
pub mod qb;

pub use material::{Material, MaterialIndex, Palette, EMPTY, PALETTE_SIZE};
pub use matrix::Matrix;
pub use octree::{Octree, OctreeVoxel};
