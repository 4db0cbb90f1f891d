//! CPU-side mesh data produced by the meshers.
//!
//! Opaque and transparent quads share one vertex buffer, opaque vertices
//! first. The index buffer holds the opaque indices followed by the
//! transparent ones, so each category can be drawn as one contiguous range.

use std::ops::Range;

use cgmath::Vector3;

use crate::rendering::vertex::Vertex;
use crate::voxels::Palette;

use super::face::Quad;

/// Index ranges of a combined index buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshRanges {
    pub opaque: Range<u32>,
    pub transparent: Range<u32>,
}

impl MeshRanges {
    pub fn index_count(&self) -> u32 {
        self.transparent.end
    }

    pub fn is_empty(&self) -> bool {
        self.index_count() == 0
    }
}

/// Geometry of one meshed voxel region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    /// Indices of opaque quads into `vertices`.
    pub opaque_indices: Vec<u32>,
    /// Indices of transparent quads into `vertices`, already offset past the
    /// opaque vertices.
    pub transparent_indices: Vec<u32>,
}

impl MeshData {
    pub fn is_empty(&self) -> bool {
        self.opaque_indices.is_empty() && self.transparent_indices.is_empty()
    }

    pub fn quad_count(&self) -> usize {
        (self.opaque_indices.len() + self.transparent_indices.len()) / 6
    }

    pub fn ranges(&self) -> MeshRanges {
        let opaque = self.opaque_indices.len() as u32;
        let transparent = self.transparent_indices.len() as u32;
        MeshRanges {
            opaque: 0..opaque,
            transparent: opaque..opaque + transparent,
        }
    }

    /// Opaque indices followed by transparent indices, as uploaded.
    pub fn combined_indices(&self) -> Vec<u32> {
        let mut indices = Vec::with_capacity(self.opaque_indices.len() + self.transparent_indices.len());
        indices.extend_from_slice(&self.opaque_indices);
        indices.extend_from_slice(&self.transparent_indices);
        indices
    }
}

#[derive(Default)]
struct Bucket {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

/// Accumulates quads, sorting them into opaque and transparent buckets.
pub struct MeshBuilder<'a> {
    palette: &'a Palette,
    /// World size of one grid unit.
    unit: f32,
    opaque: Bucket,
    transparent: Bucket,
}

impl<'a> MeshBuilder<'a> {
    pub fn new(palette: &'a Palette, unit: f32) -> Self {
        MeshBuilder {
            palette,
            unit,
            opaque: Bucket::default(),
            transparent: Bucket::default(),
        }
    }

    pub fn push(&mut self, quad: &Quad) {
        let material = self.palette.get(quad.material);
        let bucket = if material.is_opaque() {
            &mut self.opaque
        } else {
            &mut self.transparent
        };

        let base = bucket.vertices.len() as u32;
        let normal = quad.normal();
        for corner in quad.corners() {
            let position = Vector3::new(corner.x as f32, corner.y as f32, corner.z as f32) * self.unit;
            bucket.vertices.push(Vertex::new(position, normal, material.color));
        }
        bucket.indices.extend_from_slice(&quad.indices(base));
    }

    pub fn finish(self) -> MeshData {
        let Bucket {
            mut vertices,
            indices: opaque_indices,
        } = self.opaque;

        let offset = vertices.len() as u32;
        let transparent_indices = self
            .transparent
            .indices
            .iter()
            .map(|index| index + offset)
            .collect();
        vertices.extend(self.transparent.vertices);

        MeshData {
            vertices,
            opaque_indices,
            transparent_indices,
        }
    }
}
