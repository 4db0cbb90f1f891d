//! # Dense Voxel Grids
//!
//! A `Matrix` is a flat array of material indices with its own palette.
//! Cells are stored x-major: the cell `(x, y, z)` lives at
//! `x * size.y * size.z + y * size.z + z`.

use cgmath::Vector3;

use crate::error::VoxelError;

use super::material::{MaterialIndex, Palette, EMPTY};

/// Largest grid, in cells, accepted from untrusted sizes.
pub const MAX_VOLUME: usize = 1 << 30;

/// A dense 3D grid of material indices.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    /// Extent of the grid in cells.
    pub size: Vector3<u32>,
    /// One material index per cell, x-major.
    pub voxels: Vec<MaterialIndex>,
    pub palette: Palette,
}

impl Matrix {
    /// Creates a grid of the given size filled with empty cells.
    ///
    /// The size must fit in memory. Sizes read from files go through
    /// [`Matrix::try_new`].
    pub fn new(size: Vector3<u32>, palette: Palette) -> Self {
        Matrix {
            size,
            voxels: vec![EMPTY; Self::volume_of(size).unwrap_or(usize::MAX)],
            palette,
        }
    }

    /// Creates an empty grid, rejecting sizes above [`MAX_VOLUME`] cells.
    pub fn try_new(size: Vector3<u32>, palette: Palette) -> Result<Self, VoxelError> {
        match Self::volume_of(size) {
            Some(volume) if volume <= MAX_VOLUME => Ok(Matrix {
                size,
                voxels: vec![EMPTY; volume],
                palette,
            }),
            _ => Err(VoxelError::TooLarge {
                x: size.x,
                y: size.y,
                z: size.z,
            }),
        }
    }

    /// Wraps existing voxel data, checking that it matches `size`.
    pub fn from_voxels(
        size: Vector3<u32>,
        voxels: Vec<MaterialIndex>,
        palette: Palette,
    ) -> Result<Self, VoxelError> {
        if Self::volume_of(size) != Some(voxels.len()) {
            return Err(VoxelError::SizeMismatch {
                x: size.x,
                y: size.y,
                z: size.z,
                actual: voxels.len(),
            });
        }
        Ok(Matrix {
            size,
            voxels,
            palette,
        })
    }

    /// Creates a grid by evaluating `material_at` for every cell in storage
    /// order.
    pub fn from_fn<F>(size: Vector3<u32>, palette: Palette, mut material_at: F) -> Self
    where
        F: FnMut(u32, u32, u32) -> MaterialIndex,
    {
        let mut voxels = Vec::with_capacity(Self::volume_of(size).unwrap_or(0));
        for x in 0..size.x {
            for y in 0..size.y {
                for z in 0..size.z {
                    voxels.push(material_at(x, y, z));
                }
            }
        }
        Matrix {
            size,
            voxels,
            palette,
        }
    }

    fn volume_of(size: Vector3<u32>) -> Option<usize> {
        (size.x as usize)
            .checked_mul(size.y as usize)?
            .checked_mul(size.z as usize)
    }

    /// Number of cells in the grid.
    pub fn volume(&self) -> usize {
        self.voxels.len()
    }

    /// Largest extent along any axis.
    pub fn max_dimension(&self) -> u32 {
        self.size.x.max(self.size.y).max(self.size.z)
    }

    pub fn contains(&self, x: i64, y: i64, z: i64) -> bool {
        x >= 0
            && y >= 0
            && z >= 0
            && x < self.size.x as i64
            && y < self.size.y as i64
            && z < self.size.z as i64
    }

    /// Flat storage index of an in-bounds cell.
    pub fn index(&self, x: u32, y: u32, z: u32) -> usize {
        (x as usize * self.size.y as usize + y as usize) * self.size.z as usize + z as usize
    }

    /// Material index at `(x, y, z)`. Reads outside the grid return air.
    pub fn get(&self, x: i64, y: i64, z: i64) -> MaterialIndex {
        if self.contains(x, y, z) {
            self.voxels[self.index(x as u32, y as u32, z as u32)]
        } else {
            EMPTY
        }
    }

    /// Writes a cell. Writes outside the grid are ignored.
    pub fn set(&mut self, x: u32, y: u32, z: u32, material: MaterialIndex) {
        if self.contains(x as i64, y as i64, z as i64) {
            let index = self.index(x, y, z);
            self.voxels[index] = material;
        }
    }
}
