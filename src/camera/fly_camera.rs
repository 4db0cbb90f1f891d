//! # Fly Camera
//!
//! A free-flying first-person camera with a perspective projection.
//!
//! Positions are kept in double precision. View and frustum math run in
//! single precision relative to the camera, so precision does not degrade
//! far away from the world origin.

use std::f32::consts::FRAC_PI_2;

use cgmath::*;

use super::Camera;

/// Transformation matrix to convert from OpenGL's coordinate system to WGPU's.
///
/// Maps clip-space depth from `[-1, 1]` to `[0, 1]`.
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Safe limit for pitch to prevent gimbal lock
const SAFE_FRAC_PI_2: f32 = FRAC_PI_2 - 0.0001;

/// Represents a camera's projection matrix and related parameters.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
    /// Aspect ratio (width / height)
    aspect: f32,
    /// Vertical field of view in radians
    fovy: Rad<f32>,
    /// Near clipping plane distance
    znear: f32,
    /// Far clipping plane distance
    zfar: f32,
}

impl Projection {
    /// Creates a new projection with the given parameters.
    ///
    /// # Arguments
    /// * `width` - Viewport width in pixels
    /// * `height` - Viewport height in pixels
    /// * `fovy` - Vertical field of view (can be any type convertible to `Rad<f32>`)
    /// * `znear` - Near clipping plane distance
    /// * `zfar` - Far clipping plane distance
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    /// Updates the projection's aspect ratio for viewport resizing.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    /// Perspective projection combined with the OpenGL to WGPU depth remap.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// The six clip planes of a view-projection matrix.
///
/// Each plane is `(a, b, c, d)` with the inside satisfying
/// `a*x + b*y + c*z + d >= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Vector4<f32>; 6],
}

impl Frustum {
    /// Extracts the planes of `view_proj`, which must map depth to `[0, 1]`.
    pub fn from_matrix(view_proj: &Matrix4<f32>) -> Self {
        let row = |i: usize| {
            Vector4::new(
                view_proj.x[i],
                view_proj.y[i],
                view_proj.z[i],
                view_proj.w[i],
            )
        };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        Frustum {
            planes: [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2],
        }
    }

    /// Conservative test of an axis-aligned cube against every plane.
    pub fn intersects_cube(&self, center: Vector3<f32>, half_extent: f32) -> bool {
        self.planes.iter().all(|plane| {
            let normal = plane.truncate();
            let radius = half_extent * (normal.x.abs() + normal.y.abs() + normal.z.abs());
            normal.dot(center) + plane.w >= -radius
        })
    }
}

/// A first-person camera flying freely through the terrain.
#[derive(Debug, Clone)]
pub struct FlyCamera {
    /// The camera's position in world space
    pub position: Point3<f64>,
    /// Horizontal rotation (around Y axis) in radians
    pub yaw: Rad<f32>,
    /// Vertical rotation (around X axis) in radians
    pub pitch: Rad<f32>,
    pub projection: Projection,
    frustum: Frustum,
}

impl FlyCamera {
    /// Creates a new camera with the specified position and orientation.
    ///
    /// # Arguments
    /// * `position` - Initial position of the camera in world space
    /// * `yaw` - Initial yaw; zero looks along `+x`
    /// * `pitch` - Initial pitch; zero is level
    /// * `projection` - Perspective settings
    pub fn new<Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(
        position: Point3<f64>,
        yaw: Y,
        pitch: P,
        projection: Projection,
    ) -> Self {
        let mut camera = FlyCamera {
            position,
            yaw: yaw.into(),
            pitch: pitch.into(),
            projection,
            frustum: Frustum::from_matrix(&Matrix4::identity()),
        };
        camera.refresh_frustum();
        camera
    }

    /// Normalized viewing direction.
    pub fn forward(&self) -> Vector3<f32> {
        let (yaw_sin, yaw_cos) = self.yaw.0.sin_cos();
        let (pitch_sin, pitch_cos) = self.pitch.0.sin_cos();
        Vector3::new(pitch_cos * yaw_cos, pitch_sin, pitch_cos * yaw_sin).normalize()
    }

    /// View matrix with the camera at the origin.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(Point3::origin(), self.forward(), Vector3::unit_y())
    }

    /// View-projection matrix for geometry given relative to the camera.
    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection.calc_matrix() * self.calc_matrix()
    }

    fn refresh_frustum(&mut self) {
        self.frustum = Frustum::from_matrix(&self.view_projection());
    }

    /// Moves the camera along its horizontal forward and right axes and the
    /// world up axis.
    pub fn fly(&mut self, forward: f64, right: f64, up: f64) {
        let (yaw_sin, yaw_cos) = self.yaw.0.sin_cos();
        let (yaw_sin, yaw_cos) = (yaw_sin as f64, yaw_cos as f64);
        self.position += Vector3::new(yaw_cos, 0.0, yaw_sin) * forward;
        self.position += Vector3::new(-yaw_sin, 0.0, yaw_cos) * right;
        self.position.y += up;
    }

    /// Rotates the camera, clamping pitch short of straight up or down.
    pub fn turn<Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(&mut self, yaw: Y, pitch: P) {
        self.yaw += yaw.into();
        self.pitch += pitch.into();

        if self.pitch < -Rad(SAFE_FRAC_PI_2) {
            self.pitch = -Rad(SAFE_FRAC_PI_2);
        } else if self.pitch > Rad(SAFE_FRAC_PI_2) {
            self.pitch = Rad(SAFE_FRAC_PI_2);
        }
        self.refresh_frustum();
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.projection.resize(width, height);
        self.refresh_frustum();
    }
}

impl Camera for FlyCamera {
    fn position(&self) -> Point3<f64> {
        self.position
    }

    fn intersects_frustum(&self, center: Point3<f64>, half_extent: f64) -> bool {
        let relative = center - self.position;
        self.frustum.intersects_cube(
            Vector3::new(relative.x as f32, relative.y as f32, relative.z as f32),
            half_extent as f32,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_at(position: Point3<f64>) -> FlyCamera {
        FlyCamera::new(
            position,
            Deg(0.0),
            Deg(0.0),
            Projection::new(800, 600, Deg(60.0), 0.1, 1000.0),
        )
    }

    #[test]
    fn cube_ahead_is_visible_and_behind_is_not() {
        let camera = camera_at(Point3::new(0.0, 0.0, 0.0));
        assert!(camera.intersects_frustum(Point3::new(20.0, 0.0, 0.0), 1.0));
        assert!(!camera.intersects_frustum(Point3::new(-20.0, 0.0, 0.0), 1.0));
        assert!(!camera.intersects_frustum(Point3::new(2000.0, 0.0, 0.0), 1.0));
    }

    #[test]
    fn cube_around_camera_is_visible() {
        let camera = camera_at(Point3::new(5.0, 5.0, 5.0));
        assert!(camera.intersects_frustum(Point3::new(5.0, 5.0, 5.0), 0.5));
        assert!(camera.intersects_frustum(Point3::new(0.0, 0.0, 0.0), 100.0));
    }

    #[test]
    fn far_from_origin_keeps_precision() {
        let camera = camera_at(Point3::new(1.0e9, 0.0, 0.0));
        assert!(camera.intersects_frustum(Point3::new(1.0e9 + 10.0, 0.0, 0.0), 0.5));
        assert!(!camera.intersects_frustum(Point3::new(1.0e9 - 10.0, 0.0, 0.0), 0.5));
    }

    #[test]
    fn turning_updates_the_frustum() {
        let mut camera = camera_at(Point3::new(0.0, 0.0, 0.0));
        let behind = Point3::new(-20.0, 0.0, 0.0);
        assert!(!camera.intersects_frustum(behind, 1.0));
        camera.turn(Deg(180.0), Deg(0.0));
        assert!(camera.intersects_frustum(behind, 1.0));
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = camera_at(Point3::new(0.0, 0.0, 0.0));
        camera.turn(Deg(0.0), Deg(120.0));
        assert!(camera.pitch.0 < FRAC_PI_2);
        camera.fly(1.0, 0.0, 2.0);
        assert!((camera.position.x - 1.0).abs() < 1e-9);
        assert_eq!(camera.position.y, 2.0);
    }
}
