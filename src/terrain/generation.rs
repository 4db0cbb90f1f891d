//! # Terrain Generation
//!
//! The terrain core decides where and at which resolution voxels are needed.
//! What those voxels contain is up to a [`TerrainGenerator`], called from the
//! background worker only.
//!
//! ## Strategies
//! - `NoiseGenerator`: Perlin height field with stone, dirt, grass and water
//! - `LayeredGenerator`: flat world of stone, dirt and a grass top layer

use cgmath::Point3;
use noise::{NoiseFn, Perlin};

use crate::voxels::{Material, MaterialIndex, Palette, EMPTY};

/// Fills chunk regions with materials.
///
/// Both functions must be pure functions of their arguments. They run on the
/// generation thread and must not reach back into main-thread state.
pub trait TerrainGenerator: Send + Sync + 'static {
    /// Material of the cell whose minimum corner is at `position`, for a
    /// chunk at depth `level`.
    fn generate_material(&self, position: Point3<f64>, level: u32) -> MaterialIndex;

    /// Fills the palette of the chunk centered at `center`.
    fn generate_palette(&self, center: Point3<f64>, level: u32, palette: &mut Palette);
}

/// Palette slot of stone.
pub const STONE: MaterialIndex = 1;
/// Palette slot of dirt.
pub const DIRT: MaterialIndex = 2;
/// Palette slot of grass.
pub const GRASS: MaterialIndex = 3;
/// Palette slot of water.
pub const WATER: MaterialIndex = 4;

fn natural_palette(palette: &mut Palette) {
    palette.set(STONE, Material::rgb(125, 125, 130));
    palette.set(DIRT, Material::rgb(121, 85, 58));
    palette.set(GRASS, Material::rgb(86, 160, 60));
    palette.set(WATER, Material::rgba(40, 90, 200, 160));
}

/// Height-field terrain sampled from 2D Perlin noise.
#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    perlin: Perlin,
    /// Horizontal frequency of the height field.
    pub frequency: f64,
    /// Peak deviation of the surface from `base_height`.
    pub amplitude: f64,
    pub base_height: f64,
    /// Air below this height is filled with water.
    pub sea_level: f64,
    /// Thickness of the dirt layer under the grass.
    pub dirt_depth: f64,
}

impl NoiseGenerator {
    pub fn new(seed: u32) -> Self {
        NoiseGenerator {
            perlin: Perlin::new(seed),
            frequency: 0.01,
            amplitude: 24.0,
            base_height: 0.0,
            sea_level: -6.0,
            dirt_depth: 4.0,
        }
    }

    /// Surface height at the horizontal position `(x, z)`.
    pub fn height(&self, x: f64, z: f64) -> f64 {
        self.base_height + self.amplitude * self.perlin.get([x * self.frequency, z * self.frequency])
    }
}

impl TerrainGenerator for NoiseGenerator {
    fn generate_material(&self, position: Point3<f64>, _level: u32) -> MaterialIndex {
        let height = self.height(position.x, position.z);
        if position.y >= height {
            return if position.y < self.sea_level { WATER } else { EMPTY };
        }

        let depth = height - position.y;
        if depth <= 1.0 && position.y >= self.sea_level {
            GRASS
        } else if depth <= self.dirt_depth {
            DIRT
        } else {
            STONE
        }
    }

    fn generate_palette(&self, _center: Point3<f64>, _level: u32, palette: &mut Palette) {
        natural_palette(palette);
    }
}

/// Flat world: air above `surface`, one unit of grass, then dirt, then stone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayeredGenerator {
    pub surface: f64,
    pub dirt_depth: f64,
}

impl LayeredGenerator {
    pub fn new(surface: f64, dirt_depth: f64) -> Self {
        LayeredGenerator {
            surface,
            dirt_depth,
        }
    }
}

impl Default for LayeredGenerator {
    fn default() -> Self {
        Self::new(0.0, 16.0)
    }
}

impl TerrainGenerator for LayeredGenerator {
    fn generate_material(&self, position: Point3<f64>, _level: u32) -> MaterialIndex {
        let depth = self.surface - position.y;
        if depth <= 0.0 {
            EMPTY
        } else if depth <= 1.0 {
            GRASS
        } else if depth <= self.dirt_depth {
            DIRT
        } else {
            STONE
        }
    }

    fn generate_palette(&self, _center: Point3<f64>, _level: u32, palette: &mut Palette) {
        natural_palette(palette);
    }
}
