//! # Camera
//!
//! The terrain reads exactly two things from a camera: where it is and
//! whether a cube is inside its view frustum. Both go through the [`Camera`]
//! trait, and a [`FrameContext`] carries the camera plus per-frame flags into
//! `update` and `draw` explicitly.
//!
//! ## Key Components
//! - `Camera`: the two queries the terrain consumes
//! - `FlyCamera`: free-flying perspective camera with frustum culling
//! - `Projection`: perspective projection settings
//! - `PointCamera`: a position without a frustum, sees everything

pub mod fly_camera;

use cgmath::Point3;

pub use fly_camera::{FlyCamera, Frustum, Projection};

/// The camera queries consumed by the terrain.
pub trait Camera {
    /// Camera position in world space.
    fn position(&self) -> Point3<f64>;

    /// Returns `true` if the axis-aligned cube at `center` with the given
    /// half edge length may be visible.
    fn intersects_frustum(&self, center: Point3<f64>, half_extent: f64) -> bool;
}

/// A camera with a position and no frustum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointCamera {
    pub position: Point3<f64>,
}

impl PointCamera {
    pub fn new(position: Point3<f64>) -> Self {
        PointCamera { position }
    }
}

impl Camera for PointCamera {
    fn position(&self) -> Point3<f64> {
        self.position
    }

    fn intersects_frustum(&self, _center: Point3<f64>, _half_extent: f64) -> bool {
        true
    }
}

/// Debug switches read while drawing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderFlags {
    pub wireframe: bool,
    pub debug: bool,
}

/// Per-frame state handed to the terrain.
pub struct FrameContext<'a, C: Camera + ?Sized> {
    pub camera: &'a C,
    pub flags: RenderFlags,
}

impl<'a, C: Camera + ?Sized> FrameContext<'a, C> {
    pub fn new(camera: &'a C) -> Self {
        FrameContext {
            camera,
            flags: RenderFlags::default(),
        }
    }

    pub fn with_flags(camera: &'a C, flags: RenderFlags) -> Self {
        FrameContext { camera, flags }
    }
}
