//! Vertex data structures and layouts for terrain rendering.
//!
//! Every mesher emits the same vertex format: a position relative to the
//! chunk's minimum corner, the face normal and the material color.

use cgmath::Vector3;

/// A vertex of a terrain mesh.
///
/// # Memory Layout
/// - Position: 3x f32 (12 bytes)
/// - Normal: 3x f32 (12 bytes)
/// - Color: 4x u8, normalized in the shader (4 bytes)
///
/// Total size: 28 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [u8; 4],
}

impl Vertex {
    pub fn new(position: Vector3<f32>, normal: Vector3<f32>, color: [u8; 4]) -> Self {
        Vertex {
            position: position.into(),
            normal: normal.into(),
            color,
        }
    }

    /// Returns the vertex buffer layout description for the shader pipeline.
    ///
    /// # Shader Attributes
    /// - `location = 0`: position (vec3<f32>)
    /// - `location = 1`: normal (vec3<f32>)
    /// - `location = 2`: color (vec4<f32>, from unorm8x4)
    #[cfg(not(target_family = "wasm"))]
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Unorm8x4,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 28);
        let vertex = Vertex::new(
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(0.0, -1.0, 0.0),
            [1, 2, 3, 4],
        );
        let bytes: &[u8] = bytemuck::bytes_of(&vertex);
        assert_eq!(&bytes[24..], &[1, 2, 3, 4]);
    }

    #[cfg(not(target_family = "wasm"))]
    #[test]
    fn buffer_layout_matches_field_offsets() {
        let layout = Vertex::desc();
        assert_eq!(layout.array_stride, 28);
        let offsets: Vec<u64> = layout.attributes.iter().map(|attribute| attribute.offset).collect();
        assert_eq!(
            offsets,
            vec![
                std::mem::offset_of!(Vertex, position) as u64,
                std::mem::offset_of!(Vertex, normal) as u64,
                std::mem::offset_of!(Vertex, color) as u64,
            ]
        );
        let locations: Vec<u32> = layout.attributes.iter().map(|attribute| attribute.shader_location).collect();
        assert_eq!(locations, vec![0, 1, 2]);
    }
}
