//! # Qubicle Binary Reader
//!
//! Reads single-matrix `.qb` files into a [`Matrix`]. Only the uncompressed
//! encoding is supported; compressed files are rejected with
//! [`VoxelError::UnsupportedEncoding`] instead of being misread.
//!
//! Header fields are read big-endian. Voxel colors are deduplicated into the
//! palette starting at index 1, and fully transparent voxels stay empty.

use std::io::Read;

use cgmath::Vector3;
use log::debug;

use crate::error::VoxelError;

use super::material::{Material, MaterialIndex, Palette, PALETTE_SIZE};
use super::matrix::Matrix;

const SUPPORTED_VERSION: [u8; 4] = [1, 1, 0, 0];

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, VoxelError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_be_bytes(bytes))
}

/// Reads one `.qb` matrix.
pub fn read_qb<R: Read>(reader: &mut R) -> Result<Matrix, VoxelError> {
    let mut version = [0u8; 4];
    reader.read_exact(&mut version)?;
    if version != SUPPORTED_VERSION {
        return Err(VoxelError::UnsupportedVersion(version));
    }

    let color_format = read_u32(reader)?;
    let _z_axis_orientation = read_u32(reader)?;
    let compressed = read_u32(reader)?;
    let _visibility_mask_encoded = read_u32(reader)?;
    let matrix_count = read_u32(reader)?;
    if matrix_count != 1 {
        return Err(VoxelError::MatrixCount(matrix_count));
    }

    let mut name_length = [0u8; 1];
    reader.read_exact(&mut name_length)?;
    let mut name = vec![0u8; name_length[0] as usize];
    reader.read_exact(&mut name)?;

    let size = Vector3::new(read_u32(reader)?, read_u32(reader)?, read_u32(reader)?);
    let _position = Vector3::new(read_u32(reader)?, read_u32(reader)?, read_u32(reader)?);

    if compressed != 0 {
        return Err(VoxelError::UnsupportedEncoding("run-length compressed QB matrix"));
    }

    debug!(
        "Reading QB matrix {:?} of size {}x{}x{}",
        String::from_utf8_lossy(&name),
        size.x,
        size.y,
        size.z
    );

    let mut matrix = Matrix::try_new(size, Palette::default())?;
    let mut colors: Vec<[u8; 3]> = Vec::new();

    for z in 0..size.z {
        for y in 0..size.y {
            for x in 0..size.x {
                let mut color = [0u8; 4];
                reader.read_exact(&mut color)?;
                if color[3] == 0 {
                    continue;
                }
                if color_format != 0 {
                    color.swap(0, 2);
                }

                let rgb = [color[0], color[1], color[2]];
                let material = match colors.iter().position(|known| *known == rgb) {
                    Some(position) => position + 1,
                    None => {
                        if colors.len() + 1 >= PALETTE_SIZE {
                            return Err(VoxelError::PaletteFull);
                        }
                        colors.push(rgb);
                        matrix.palette.set(
                            colors.len() as MaterialIndex,
                            Material::rgb(rgb[0], rgb[1], rgb[2]),
                        );
                        colors.len()
                    }
                };
                matrix.set(x, y, z, material as MaterialIndex);
            }
        }
    }

    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(compressed: u32, size: [u32; 3]) -> Vec<u8> {
        let mut bytes = SUPPORTED_VERSION.to_vec();
        for field in [0u32, 0, compressed, 0, 1] {
            bytes.extend_from_slice(&field.to_be_bytes());
        }
        bytes.push(4);
        bytes.extend_from_slice(b"rock");
        for field in size.iter().chain([0u32, 0, 0].iter()) {
            bytes.extend_from_slice(&field.to_be_bytes());
        }
        bytes
    }

    #[test]
    fn reads_uncompressed_matrix() {
        let mut bytes = header(0, [2, 1, 1]);
        bytes.extend_from_slice(&[255, 0, 0, 255]);
        bytes.extend_from_slice(&[0, 0, 0, 0]);

        let matrix = read_qb(&mut bytes.as_slice()).unwrap();
        assert_eq!(matrix.size, Vector3::new(2, 1, 1));
        assert_eq!(matrix.get(0, 0, 0), 1);
        assert_eq!(matrix.get(1, 0, 0), 0);
        assert_eq!(*matrix.palette.get(1), Material::rgb(255, 0, 0));
    }

    #[test]
    fn repeated_colors_share_a_palette_entry() {
        let mut bytes = header(0, [3, 1, 1]);
        bytes.extend_from_slice(&[10, 20, 30, 255]);
        bytes.extend_from_slice(&[40, 50, 60, 255]);
        bytes.extend_from_slice(&[10, 20, 30, 255]);

        let matrix = read_qb(&mut bytes.as_slice()).unwrap();
        assert_eq!(matrix.voxels, vec![1, 2, 1]);
    }

    #[test]
    fn compressed_matrix_fails_loudly() {
        let bytes = header(1, [2, 2, 2]);
        let result = read_qb(&mut bytes.as_slice());
        assert!(matches!(result, Err(VoxelError::UnsupportedEncoding(_))));
    }

    #[test]
    fn oversized_matrix_is_rejected_before_allocating() {
        let bytes = header(0, [u32::MAX; 3]);
        assert!(matches!(
            read_qb(&mut bytes.as_slice()),
            Err(VoxelError::TooLarge { .. })
        ));
    }

    #[test]
    fn truncated_data_is_an_io_error() {
        let mut bytes = header(0, [2, 2, 2]);
        bytes.extend_from_slice(&[1, 2, 3, 255]);
        assert!(matches!(
            read_qb(&mut bytes.as_slice()),
            Err(VoxelError::Io(_))
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = header(0, [1, 1, 1]);
        bytes[1] = 7;
        assert!(matches!(
            read_qb(&mut bytes.as_slice()),
            Err(VoxelError::UnsupportedVersion(_))
        ));
    }
}
