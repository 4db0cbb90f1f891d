//! # Materials and Palettes
//!
//! A voxel stores a one-byte material index; the palette maps that index to
//! an RGBA color. Alpha carries meaning:
//! - `0`: empty (air). Index `0` is always empty, whatever the palette says.
//! - `1..=254`: transparent, drawn in the transparent index range
//! - `255`: opaque

/// The integer type used for material indices in voxel grids.
pub type MaterialIndex = u8;

/// Number of entries in a palette.
pub const PALETTE_SIZE: usize = 256;

/// Material index reserved for empty space.
pub const EMPTY: MaterialIndex = 0;

/// An RGBA voxel material.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Material {
    pub color: [u8; 4],
}

impl Material {
    /// The empty material, fully transparent black.
    pub const AIR: Material = Material { color: [0, 0, 0, 0] };

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Material {
            color: [r, g, b, a],
        }
    }

    /// An opaque material.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }

    pub fn alpha(&self) -> u8 {
        self.color[3]
    }

    pub fn is_empty(&self) -> bool {
        self.alpha() == 0
    }

    pub fn is_opaque(&self) -> bool {
        self.alpha() == 255
    }

    /// Visible but see-through.
    pub fn is_transparent(&self) -> bool {
        !self.is_empty() && !self.is_opaque()
    }
}

/// A fixed table of 256 materials addressed by [`MaterialIndex`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    materials: [Material; PALETTE_SIZE],
}

impl Default for Palette {
    fn default() -> Self {
        Palette {
            materials: [Material::AIR; PALETTE_SIZE],
        }
    }
}

impl Palette {
    /// Builds a palette whose entries `1..` are taken from `materials`.
    ///
    /// Entries beyond index 255 are ignored.
    pub fn from_materials(materials: &[Material]) -> Self {
        let mut palette = Palette::default();
        for (index, material) in materials.iter().take(PALETTE_SIZE - 1).enumerate() {
            palette.materials[index + 1] = *material;
        }
        palette
    }

    pub fn get(&self, index: MaterialIndex) -> &Material {
        &self.materials[index as usize]
    }

    /// Sets the material at `index`. Writes to the empty index are ignored.
    pub fn set(&mut self, index: MaterialIndex, material: Material) {
        if index != EMPTY {
            self.materials[index as usize] = material;
        }
    }

    /// Returns `true` if a voxel with this index should be treated as air.
    pub fn is_empty(&self, index: MaterialIndex) -> bool {
        index == EMPTY || self.get(index).is_empty()
    }

    pub fn is_opaque(&self, index: MaterialIndex) -> bool {
        index != EMPTY && self.get(index).is_opaque()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        self.materials.iter()
    }
}
