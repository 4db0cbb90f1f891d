//! Level-of-detail greedy meshing of sparse octrees.
//!
//! The octree is walked from the root, descending until a leaf is reached or
//! the detail limit cuts the recursion off. Each node reached this way is
//! drawn as a solid cube of its (possibly hint) material.
//!
//! Face visibility is decided against the adjacent node found by walking the
//! ancestor path: siblings are looked up directly, otherwise the parent's
//! neighbor is resolved first and then descended with the crossed axis
//! mirrored. A neighbor that is still subdivided always gets the face, so the
//! coarse side of a depth transition closes the seam on its own.
//!
//! Emitted faces are rasterized into per-plane masks at the finest drawn
//! resolution and merged exactly like the dense mesher does.

use std::collections::BTreeMap;

use cgmath::Vector3;
use log::trace;
use web_time::Instant;

use crate::voxels::octree::{octant, octant_bit, with_octant_bit, ROOT};
use crate::voxels::{MaterialIndex, Octree, EMPTY};

use super::face::{plane_axes, Quad};
use super::greedy::{merge_mask, visible_material};
use super::mesh::{MeshBuilder, MeshData};

/// One step of the path from the root to the current node.
#[derive(Debug, Clone, Copy)]
struct Step {
    parent: usize,
    octant: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Neighbor {
    /// Outside the root cube.
    Border,
    Node { index: usize, depth: u32 },
}

/// Node adjacent to the node at the end of `path` along `axis`, in the
/// direction of `sign`. The result is never deeper than the node itself.
fn find_neighbor(octree: &Octree, path: &[Step], axis: usize, sign: i32) -> Neighbor {
    let Some((last, ancestors)) = path.split_last() else {
        return Neighbor::Border;
    };

    let bit = octant_bit(last.octant, axis) as i32 + sign;
    if (0..=1).contains(&bit) {
        return Neighbor::Node {
            index: octree.voxels[last.parent].child as usize
                + with_octant_bit(last.octant, axis, bit as usize),
            depth: path.len() as u32,
        };
    }

    match find_neighbor(octree, ancestors, axis, sign) {
        Neighbor::Border => Neighbor::Border,
        Neighbor::Node { index, depth } => {
            let mirrored = with_octant_bit(last.octant, axis, 1 - octant_bit(last.octant, axis));
            match octree.child(index, mirrored) {
                Some(child) => Neighbor::Node {
                    index: child,
                    depth: depth + 1,
                },
                None => Neighbor::Node { index, depth },
            }
        }
    }
}

/// Face plane identified by `(axis, back_face, plane coordinate)`.
type LayerKey = (usize, bool, i64);

struct OctreeMesher<'a> {
    octree: &'a Octree,
    max_depth: u32,
    resolution: i64,
    generate_borders: bool,
    layers: BTreeMap<LayerKey, Vec<MaterialIndex>>,
}

impl OctreeMesher<'_> {
    fn is_subdivided(&self, index: usize, depth: u32) -> bool {
        !self.octree.voxels[index].is_leaf() && depth < self.max_depth
    }

    fn visit(&mut self, path: &mut Vec<Step>, index: usize, origin: Vector3<i64>, size: i64) {
        let depth = path.len() as u32;
        if self.is_subdivided(index, depth) {
            let half = size / 2;
            let first_child = self.octree.voxels[index].child as usize;
            for a in 0..2 {
                for b in 0..2 {
                    for c in 0..2 {
                        let code = octant(a, b, c);
                        let corner = origin + Vector3::new(a as i64, b as i64, c as i64) * half;
                        path.push(Step {
                            parent: index,
                            octant: code,
                        });
                        self.visit(path, first_child + code, corner, half);
                        path.pop();
                    }
                }
            }
            return;
        }

        let octree = self.octree;
        let palette = &octree.palette;
        let material = visible_material(palette, octree.voxels[index].material);
        if material == EMPTY {
            return;
        }

        for axis in 0..3 {
            for sign in [-1, 1] {
                let visible = match find_neighbor(octree, path, axis, sign) {
                    Neighbor::Border => self.generate_borders,
                    Neighbor::Node { index, depth } if self.is_subdivided(index, depth) => true,
                    Neighbor::Node { index, .. } => {
                        let other = visible_material(palette, octree.voxels[index].material);
                        other != material && !palette.is_opaque(other)
                    }
                };
                if visible {
                    self.rasterize(axis, sign, origin, size, material);
                }
            }
        }
    }

    fn rasterize(&mut self, axis: usize, sign: i32, origin: Vector3<i64>, size: i64, material: MaterialIndex) {
        let (u, v) = plane_axes(axis);
        let back_face = sign < 0;
        let plane = if back_face {
            origin[axis]
        } else {
            origin[axis] + size
        };

        let resolution = self.resolution;
        let mask = self
            .layers
            .entry((axis, back_face, plane))
            .or_insert_with(|| vec![EMPTY; (resolution * resolution) as usize]);
        for j in origin[v]..origin[v] + size {
            for i in origin[u]..origin[u] + size {
                mask[(j * resolution + i) as usize] = material;
            }
        }
    }
}

/// Generates a greedy mesh for an octree, drawn at most `detail_limit`
/// levels below the root.
///
/// # Arguments
/// * `octree` - The octree to mesh
/// * `root_size` - World edge length of the root cube
/// * `detail_limit` - Maximum depth to descend; deeper content is drawn with
///   the material hint of the node at the limit
/// * `generate_borders` - Whether faces on the root cube's surface are emitted
///
/// # Returns
/// Vertices relative to the root cube's minimum corner plus opaque and
/// transparent index lists sharing that vertex buffer.
pub fn greedy_octree(
    octree: &Octree,
    root_size: f32,
    detail_limit: u32,
    generate_borders: bool,
) -> MeshData {
    let start = Instant::now();
    let max_depth = detail_limit.min(octree.width.max(1).trailing_zeros());
    let resolution = 1i64 << max_depth;

    let mut mesher = OctreeMesher {
        octree,
        max_depth,
        resolution,
        generate_borders,
        layers: BTreeMap::new(),
    };
    mesher.visit(&mut Vec::new(), ROOT, Vector3::new(0, 0, 0), resolution);

    let mut builder = MeshBuilder::new(&octree.palette, root_size / resolution as f32);
    let size = resolution as usize;
    for ((axis, back_face, plane), mut mask) in mesher.layers {
        let (u, v) = plane_axes(axis);
        merge_mask(&mut mask, size, size, |i, j, width, height, material| {
            let mut origin = Vector3::new(0, 0, 0);
            origin[axis] = plane;
            origin[u] = i as i64;
            origin[v] = j as i64;
            builder.push(&Quad {
                origin,
                axis,
                width: width as i64,
                height: height as i64,
                back_face,
                material,
            });
        });
    }

    let mesh = builder.finish();
    trace!(
        "Greedy meshed octree ({} nodes, {} leaves, depth limit {}) into {} quads in {:?}",
        octree.voxels.len(),
        octree.leaf_count(),
        max_depth,
        mesh.quad_count(),
        start.elapsed()
    );
    mesh
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::rendering::meshing::greedy::greedy_matrix;
    use crate::voxels::{Material, Matrix, Palette};

    fn palette() -> Palette {
        Palette::from_materials(&[
            Material::rgb(120, 120, 120),
            Material::rgb(90, 60, 30),
            Material::rgba(40, 80, 200, 100),
        ])
    }

    /// Unit faces covered by a mesh as `(axis, normal sign, plane, u, v)`.
    fn unit_faces(mesh: &MeshData, unit: f32) -> HashSet<(usize, i32, i64, i64, i64)> {
        let mut faces = HashSet::new();
        for quad in mesh
            .opaque_indices
            .chunks(6)
            .chain(mesh.transparent_indices.chunks(6))
        {
            let corners: Vec<[f32; 3]> = quad
                .iter()
                .map(|index| mesh.vertices[*index as usize].position)
                .collect();
            let normal = mesh.vertices[quad[0] as usize].normal;
            let axis = (0..3).find(|axis| normal[*axis] != 0.0).unwrap();
            let sign = normal[axis].signum() as i32;
            let (u, v) = plane_axes(axis);
            let cell = |position: f32| (position / unit).round() as i64;
            let min = |a: usize| corners.iter().map(|c| cell(c[a])).min().unwrap();
            let max = |a: usize| corners.iter().map(|c| cell(c[a])).max().unwrap();
            for i in min(u)..max(u) {
                for j in min(v)..max(v) {
                    faces.insert((axis, sign, min(axis), i, j));
                }
            }
        }
        faces
    }

    fn hollow_corner_grid() -> Matrix {
        Matrix::from_fn(Vector3::new(4, 4, 4), palette(), |x, y, z| {
            ((x, y, z) != (0, 0, 0)) as u8
        })
    }

    #[test]
    fn coarse_side_closes_depth_transition() {
        let octree = Octree::from_matrix(&hollow_corner_grid());
        let mesh = greedy_octree(&octree, 4.0, 8, false);

        // Three unit faces around the hole, three 2x2 faces where the coarse
        // octants meet the subdivided one.
        assert_eq!(mesh.quad_count(), 6);
        let faces = unit_faces(&mesh, 1.0);
        assert_eq!(faces.len(), 3 + 3 * 4);
        assert!(faces.contains(&(0, -1, 1, 0, 0)));
        assert!(faces.contains(&(0, -1, 2, 1, 1)));

        let dense = greedy_matrix(&hollow_corner_grid(), 1.0, false);
        assert_eq!(dense.quad_count(), 3);
    }

    #[test]
    fn detail_limit_zero_draws_root_cube() {
        let matrix = Matrix::from_fn(Vector3::new(4, 4, 4), palette(), |x, y, z| {
            ((x, y, z) != (3, 3, 3)) as u8
        });
        let octree = Octree::from_matrix(&matrix);
        let mesh = greedy_octree(&octree, 8.0, 0, true);

        assert_eq!(mesh.quad_count(), 6);
        for vertex in &mesh.vertices {
            assert!(vertex.position.iter().all(|p| *p == 0.0 || *p == 8.0));
        }
    }

    #[test]
    fn detail_limit_uses_material_hint() {
        // At depth 1 the octant holding the hole is drawn with its first
        // child's material, which is air.
        let octree = Octree::from_matrix(&hollow_corner_grid());
        let mesh = greedy_octree(&octree, 4.0, 1, false);
        assert_eq!(mesh.quad_count(), 3);
        let faces = unit_faces(&mesh, 2.0);
        assert_eq!(
            faces,
            HashSet::from([(0, -1, 1, 0, 0), (1, -1, 1, 0, 0), (2, -1, 1, 0, 0)])
        );
    }

    #[test]
    fn checkerboard_matches_dense_mesh() {
        let matrix = Matrix::from_fn(Vector3::new(2, 2, 2), palette(), |x, y, z| {
            1 + ((x + y + z) % 2) as u8
        });
        let octree = Octree::from_matrix(&matrix);
        let sparse = unit_faces(&greedy_octree(&octree, 2.0, 8, true), 1.0);
        let dense = unit_faces(&greedy_matrix(&matrix, 1.0, true), 1.0);
        assert_eq!(sparse.len(), 24);
        assert_eq!(sparse, dense);
    }

    #[test]
    fn every_dense_face_is_covered() {
        let mut rng = fastrand::Rng::with_seed(99);
        for _ in 0..10 {
            let block = 1 << rng.u32(0..3);
            let seeds: Vec<u8> = (0..512).map(|_| rng.u8(0..3)).collect();
            let matrix = Matrix::from_fn(Vector3::new(8, 8, 8), palette(), |x, y, z| {
                seeds[((x / block * 8 + y / block) * 8 + z / block) as usize]
            });
            let octree = Octree::from_matrix(&matrix);
            for generate_borders in [true, false] {
                let sparse = unit_faces(&greedy_octree(&octree, 8.0, 8, generate_borders), 1.0);
                let dense = unit_faces(&greedy_matrix(&matrix, 1.0, generate_borders), 1.0);
                assert!(dense.is_subset(&sparse));
            }
        }
    }

    #[test]
    fn neighbor_resolution_mirrors_across_parents() {
        let octree = Octree::from_matrix(&hollow_corner_grid());
        // Octant 0 of the root is subdivided; its child at octant 4 is cell
        // (1, 0, 0). Going +x leaves the parent and lands on the coarse root
        // octant 4.
        let path = [
            Step {
                parent: ROOT,
                octant: 0,
            },
            Step {
                parent: 1,
                octant: 4,
            },
        ];
        assert_eq!(
            find_neighbor(&octree, &path, 0, 1),
            Neighbor::Node { index: 5, depth: 1 }
        );
        assert_eq!(
            find_neighbor(&octree, &path, 0, -1),
            Neighbor::Node { index: 9, depth: 2 }
        );
        assert_eq!(find_neighbor(&octree, &path[..1], 0, -1), Neighbor::Border);
    }
}
