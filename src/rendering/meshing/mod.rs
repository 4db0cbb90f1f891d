//! # Meshing
//!
//! Surface extraction from voxel data.
//!
//! ## Key Components
//!
//! * [`greedy_matrix`] - Greedy meshing of a dense [`Matrix`]
//! * [`greedy_octree`] - Level-of-detail greedy meshing of an [`Octree`]
//! * [`MeshData`] - Vertices plus opaque and transparent index ranges
//! * [`MesherKind`] - Selects one of the two meshers for terrain chunks

pub mod face;
pub mod greedy;
pub mod mesh;
pub mod octree_greedy;

use serde::{Deserialize, Serialize};

use crate::voxels::{Matrix, Octree};

pub use greedy::greedy_matrix;
pub use mesh::{MeshData, MeshRanges};
pub use octree_greedy::greedy_octree;

/// The mesher used to polygonize terrain chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MesherKind {
    /// Greedy meshing of the dense chunk grid.
    #[default]
    Dense,
    /// Octree conversion followed by depth-limited greedy meshing.
    Octree,
}

impl MesherKind {
    /// Meshes one chunk grid.
    ///
    /// # Arguments
    /// * `matrix` - The chunk's voxels
    /// * `voxel_size` - World edge length of one cell
    /// * `detail_limit` - Octree depth limit, ignored by the dense mesher
    /// * `generate_borders` - Whether faces on the grid's outer planes are emitted
    pub fn mesh(
        self,
        matrix: &Matrix,
        voxel_size: f32,
        detail_limit: u32,
        generate_borders: bool,
    ) -> MeshData {
        match self {
            MesherKind::Dense => greedy_matrix(matrix, voxel_size, generate_borders),
            MesherKind::Octree => {
                let octree = Octree::from_matrix(matrix);
                let root_size = voxel_size * octree.width as f32;
                greedy_octree(&octree, root_size, detail_limit, generate_borders)
            }
        }
    }
}
