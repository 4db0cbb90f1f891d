//! # Sparse Voxel Octree
//!
//! The octree stores the same content as a [`Matrix`] with uniform regions
//! collapsed into single leaves.
//!
//! ## Layout
//! Nodes live in one flat array. Node `0` is the root, covering a cube whose
//! side is the smallest power of two that fits the source grid. A node with
//! `child == 0` is a leaf; otherwise `child` is the index of the first of its
//! 8 contiguous children, ordered by octant code `4a + 2b + c` where `a`, `b`
//! and `c` select the upper half along x, y and z.
//!
//! An internal node's `material` mirrors its first child. It is only a hint
//! for coarse rendering and never decides visibility.

use cgmath::Vector3;

use super::material::{MaterialIndex, Palette, EMPTY};
use super::matrix::Matrix;

/// Index of the root node.
pub const ROOT: usize = 0;

/// Octant code for the half selected along each axis (0 = lower, 1 = upper).
pub fn octant(a: usize, b: usize, c: usize) -> usize {
    4 * a + 2 * b + c
}

/// Half selected along `axis` (0 = x, 1 = y, 2 = z) by an octant code.
pub fn octant_bit(octant: usize, axis: usize) -> usize {
    (octant >> (2 - axis)) & 1
}

/// Returns `octant` with the half along `axis` replaced by `bit`.
pub fn with_octant_bit(octant: usize, axis: usize, bit: usize) -> usize {
    let shift = 2 - axis;
    (octant & !(1 << shift)) | ((bit & 1) << shift)
}

/// One octree node.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct OctreeVoxel {
    /// Material index in the octree palette.
    pub material: MaterialIndex,
    /// Index of the first child, `0` for leaves.
    pub child: u32,
}

impl OctreeVoxel {
    pub fn is_leaf(&self) -> bool {
        self.child == 0
    }
}

/// A sparse voxel octree with a shared palette.
#[derive(Clone, Debug, PartialEq)]
pub struct Octree {
    pub palette: Palette,
    pub voxels: Vec<OctreeVoxel>,
    /// Side of the root cube in cells, always a power of two.
    pub width: u32,
}

impl Octree {
    /// Smallest power of two that is at least `dimension` (and at least 1).
    pub fn root_width_for(dimension: u32) -> u32 {
        dimension.max(1).next_power_of_two()
    }

    /// Builds an octree from a dense grid.
    ///
    /// Children are visited in fixed `a, b, c` order so the resulting index
    /// layout is identical across runs. A uniform grid collapses to a single
    /// root leaf.
    pub fn from_matrix(matrix: &Matrix) -> Octree {
        let width = Self::root_width_for(matrix.max_dimension());
        let mut octree = Octree {
            palette: matrix.palette.clone(),
            voxels: vec![OctreeVoxel::default()],
            width,
        };
        octree.build(matrix, ROOT, Vector3::new(0, 0, 0), width);
        octree
    }

    /// Material shared by every cell of the cube at `origin` with side
    /// `width`, or `None` if the cube is not uniform.
    fn uniform_material(matrix: &Matrix, origin: Vector3<i64>, width: u32) -> Option<MaterialIndex> {
        if width == 1 {
            return Some(matrix.get(origin.x, origin.y, origin.z));
        }

        let half = (width / 2) as i64;
        let mut shared = None;
        for a in 0..2 {
            for b in 0..2 {
                for c in 0..2 {
                    let corner = origin + Vector3::new(a * half, b * half, c * half);
                    let material = Self::uniform_material(matrix, corner, width / 2)?;
                    match shared {
                        None => shared = Some(material),
                        Some(previous) if previous != material => return None,
                        Some(_) => {}
                    }
                }
            }
        }
        shared
    }

    fn build(&mut self, matrix: &Matrix, index: usize, origin: Vector3<i64>, width: u32) {
        if let Some(material) = Self::uniform_material(matrix, origin, width) {
            self.voxels[index] = OctreeVoxel { material, child: 0 };
            return;
        }

        let first_child = self.voxels.len();
        self.voxels.resize(first_child + 8, OctreeVoxel::default());

        let half = (width / 2) as i64;
        for a in 0..2usize {
            for b in 0..2usize {
                for c in 0..2usize {
                    let corner =
                        origin + Vector3::new(a as i64 * half, b as i64 * half, c as i64 * half);
                    self.build(matrix, first_child + octant(a, b, c), corner, width / 2);
                }
            }
        }

        self.voxels[index] = OctreeVoxel {
            material: self.voxels[first_child].material,
            child: first_child as u32,
        };
    }

    /// Index of the child of `index` in `octant`, or `None` for leaves.
    pub fn child(&self, index: usize, octant: usize) -> Option<usize> {
        let node = self.voxels[index];
        (!node.is_leaf()).then(|| node.child as usize + octant)
    }

    /// Material of the leaf containing cell `(x, y, z)`. Cells outside the
    /// root cube are air.
    pub fn leaf_at(&self, x: u32, y: u32, z: u32) -> MaterialIndex {
        if x >= self.width || y >= self.width || z >= self.width {
            return EMPTY;
        }

        let mut index = ROOT;
        let mut half = self.width / 2;
        let (mut x, mut y, mut z) = (x, y, z);
        loop {
            let node = self.voxels[index];
            if node.is_leaf() {
                return node.material;
            }
            let a = (x >= half) as usize;
            let b = (y >= half) as usize;
            let c = (z >= half) as usize;
            x -= a as u32 * half;
            y -= b as u32 * half;
            z -= c as u32 * half;
            index = node.child as usize + octant(a, b, c);
            half /= 2;
        }
    }

    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        self.voxels.iter().filter(|voxel| voxel.is_leaf()).count()
    }
}
