//! Greedy meshing of dense voxel grids.
//!
//! For each axis and each face direction, the grid is swept plane by plane.
//! Every plane gets a 2D mask holding the material to draw on each cell of
//! that plane (or [`EMPTY`] where the face is hidden), and the mask is merged
//! into maximal same-material rectangles, one quad each.

use cgmath::Vector3;
use log::trace;
use web_time::Instant;

use crate::voxels::{MaterialIndex, Matrix, Palette, EMPTY};

use super::face::{plane_axes, Quad};
use super::mesh::{MeshBuilder, MeshData};

/// Index with palette-empty materials folded into [`EMPTY`].
pub(super) fn visible_material(palette: &Palette, index: MaterialIndex) -> MaterialIndex {
    if palette.is_empty(index) {
        EMPTY
    } else {
        index
    }
}

/// Material drawn on a face between `near` (the cell below the plane) and
/// `far` (the cell above it).
///
/// The face is hidden when both sides are opaque or both sides hold the same
/// material. Otherwise the front face carries `near`'s material and the back
/// face carries `far`'s; a side that is empty draws nothing.
pub(super) fn face_material(
    palette: &Palette,
    near: MaterialIndex,
    far: MaterialIndex,
    back_face: bool,
) -> MaterialIndex {
    let near = visible_material(palette, near);
    let far = visible_material(palette, far);
    if near == far || (palette.is_opaque(near) && palette.is_opaque(far)) {
        return EMPTY;
    }

    if back_face {
        far
    } else {
        near
    }
}

/// Merges a `size_u` x `size_v` mask into maximal rectangles.
///
/// For each non-empty cell in row order the run is grown along `u` while
/// the material matches, then along `v` while every cell of the next row
/// matches. `emit` receives `(i, j, width, height, material)` and the
/// consumed cells are cleared.
pub(super) fn merge_mask<F>(mask: &mut [MaterialIndex], size_u: usize, size_v: usize, mut emit: F)
where
    F: FnMut(usize, usize, usize, usize, MaterialIndex),
{
    let mut n = 0;
    for j in 0..size_v {
        let mut i = 0;
        while i < size_u {
            let material = mask[n];
            if material == EMPTY {
                i += 1;
                n += 1;
                continue;
            }

            let mut width = 1;
            while i + width < size_u && mask[n + width] == material {
                width += 1;
            }

            let mut height = 1;
            'grow: while j + height < size_v {
                for k in 0..width {
                    if mask[n + k + height * size_u] != material {
                        break 'grow;
                    }
                }
                height += 1;
            }

            emit(i, j, width, height, material);

            for l in 0..height {
                for k in 0..width {
                    mask[n + k + l * size_u] = EMPTY;
                }
            }

            i += width;
            n += width;
        }
    }
}

/// Generates a greedy mesh for a dense grid.
///
/// # Arguments
/// * `matrix` - The voxel grid to mesh
/// * `voxel_size` - World edge length of one cell
/// * `generate_borders` - Whether faces on the outer planes of the grid are
///   emitted (cells outside the grid count as air)
///
/// # Returns
/// Vertices relative to the grid's minimum corner plus opaque and
/// transparent index lists sharing that vertex buffer.
pub fn greedy_matrix(matrix: &Matrix, voxel_size: f32, generate_borders: bool) -> MeshData {
    let start = Instant::now();
    let palette = &matrix.palette;
    let size = Vector3::new(
        matrix.size.x as i64,
        matrix.size.y as i64,
        matrix.size.z as i64,
    );

    let mut builder = MeshBuilder::new(palette, voxel_size);
    let mut mask = Vec::new();

    for back_face in [false, true] {
        for d in 0..3 {
            let (u, v) = plane_axes(d);
            let (size_u, size_v) = (size[u] as usize, size[v] as usize);
            mask.clear();
            mask.resize(size_u * size_v, EMPTY);

            let mut q = Vector3::new(0, 0, 0);
            q[d] = 1;

            // Plane `p` separates cell `p` from cell `p + 1`; the first and last
            // planes are the grid's outer borders.
            for plane in -1..size[d] {
                if !generate_borders && (plane < 0 || plane == size[d] - 1) {
                    continue;
                }

                let mut x = Vector3::new(0, 0, 0);
                x[d] = plane;
                let mut n = 0;
                for j in 0..size_v as i64 {
                    x[v] = j;
                    for i in 0..size_u as i64 {
                        x[u] = i;
                        let far = x + q;
                        mask[n] = face_material(
                            palette,
                            matrix.get(x.x, x.y, x.z),
                            matrix.get(far.x, far.y, far.z),
                            back_face,
                        );
                        n += 1;
                    }
                }

                merge_mask(&mut mask, size_u, size_v, |i, j, width, height, material| {
                    let mut origin = Vector3::new(0, 0, 0);
                    origin[d] = plane + 1;
                    origin[u] = i as i64;
                    origin[v] = j as i64;
                    builder.push(&Quad {
                        origin,
                        axis: d,
                        width: width as i64,
                        height: height as i64,
                        back_face,
                        material,
                    });
                });
            }
        }
    }

    let mesh = builder.finish();
    trace!(
        "Greedy meshed {}x{}x{} grid into {} quads in {:?}",
        size.x,
        size.y,
        size.z,
        mesh.quad_count(),
        start.elapsed()
    );
    mesh
}
