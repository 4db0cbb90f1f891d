use cgmath::Vector3;

use crate::voxels::MaterialIndex;

/// Axes spanning the plane perpendicular to `axis`, in sweep order.
pub fn plane_axes(axis: usize) -> (usize, usize) {
    ((axis + 1) % 3, (axis + 2) % 3)
}

/// A rectangular face produced by a greedy merge.
///
/// The quad lies in the plane `origin[axis]` and spans `width` cells along
/// the first plane axis and `height` cells along the second one (see
/// [`plane_axes`]). Front faces point towards `+axis`, back faces towards
/// `-axis`. Coordinates are in mesher grid units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quad {
    pub origin: Vector3<i64>,
    pub axis: usize,
    pub width: i64,
    pub height: i64,
    pub back_face: bool,
    pub material: MaterialIndex,
}

impl Quad {
    /// Corner positions in grid units, counter-clockwise when seen from the
    /// `+axis` side: origin, origin + du, origin + du + dv, origin + dv.
    pub fn corners(&self) -> [Vector3<i64>; 4] {
        let (u, v) = plane_axes(self.axis);
        let mut du = Vector3::new(0, 0, 0);
        let mut dv = Vector3::new(0, 0, 0);
        du[u] = self.width;
        dv[v] = self.height;

        [
            self.origin,
            self.origin + du,
            self.origin + du + dv,
            self.origin + dv,
        ]
    }

    pub fn normal(&self) -> Vector3<f32> {
        let mut normal = Vector3::new(0.0, 0.0, 0.0);
        normal[self.axis] = if self.back_face { -1.0 } else { 1.0 };
        normal
    }

    /// Triangle indices for the quad's vertices starting at `base`, wound so
    /// that the triangles face along [`Quad::normal`].
    pub fn indices(&self, base: u32) -> [u32; 6] {
        if self.back_face {
            [base, base + 2, base + 1, base + 3, base + 2, base]
        } else {
            [base, base + 1, base + 2, base + 2, base + 3, base]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::InnerSpace;

    fn triangle_normal(corners: &[Vector3<i64>; 4], a: u32, b: u32, c: u32) -> Vector3<f32> {
        let p = |i: u32| corners[i as usize].cast::<f32>().unwrap();
        (p(b) - p(a)).cross(p(c) - p(a))
    }

    #[test]
    fn winding_matches_normal_on_every_axis() {
        for axis in 0..3 {
            for back_face in [false, true] {
                let quad = Quad {
                    origin: Vector3::new(1, 2, 3),
                    axis,
                    width: 2,
                    height: 3,
                    back_face,
                    material: 1,
                };
                let corners = quad.corners();
                let indices = quad.indices(0);
                for triangle in indices.chunks(3) {
                    let normal = triangle_normal(&corners, triangle[0], triangle[1], triangle[2]);
                    assert!(
                        normal.dot(quad.normal()) > 0.0,
                        "axis {axis}, back face {back_face}"
                    );
                }
            }
        }
    }

    #[test]
    fn corners_span_width_and_height() {
        let quad = Quad {
            origin: Vector3::new(4, 0, 0),
            axis: 0,
            width: 2,
            height: 3,
            back_face: false,
            material: 1,
        };
        let corners = quad.corners();
        assert_eq!(corners[2], Vector3::new(4, 2, 3));
    }
}
