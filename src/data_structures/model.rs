//! Vertex and instance types plus the per-mesh GPU record.
//!
//! The engine draws everything with one of two fixed vertex layouts (see
//! [`VertexLayout`](crate::pipelines::VertexLayout)):
//! - 3D geometry: [`ModelVertex`] (48 bytes) + [`Instance`] (96 bytes)
//! - HUD text: [`Vertex2D`] (16 bytes) + [`CharInstance`] (8 bytes)
//!
//! All of them are `#[repr(C)]` and [`bytemuck::Pod`] so they can be copied
//! into GPU buffers and out of the binary mesh format without conversion.

use crate::{data_structures::slots::PipelineId, device::GraphicsDevice};

/// Describes how a vertex type is laid out in a GPU vertex buffer.
pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

/// Packed mesh vertex, identical to the vertex records of the binary mesh format.
///
/// `data` is free-form per-vertex payload for shaders. Normals and tangents
/// are signed-normalised bytes, uvs unsigned-normalised shorts and bone
/// weights unsigned-normalised bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub data: [u32; 4],
    pub position: [f32; 3],
    pub normal: [i8; 4],
    pub tangent: [i8; 4],
    pub uv: [u16; 2],
    pub bone_weights: [u8; 4],
    pub bone_indices: [u8; 4],
}

impl ModelVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 7] = wgpu::vertex_attr_array![
        0 => Uint32x4,
        1 => Float32x3,
        2 => Snorm8x4,
        3 => Snorm8x4,
        4 => Unorm16x2,
        5 => Unorm8x4,
        6 => Uint8x4
    ];

    /// A vertex with only position, normal and uv set.
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        let snorm = |v: f32| (v.clamp(-1.0, 1.0) * 127.0).round() as i8;
        let unorm = |v: f32| (v.clamp(0.0, 1.0) * 65535.0).round() as u16;
        Self {
            position,
            normal: [snorm(normal[0]), snorm(normal[1]), snorm(normal[2]), 0],
            uv: [unorm(uv[0]), unorm(uv[1])],
            ..Default::default()
        }
    }
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Per-instance data of 3D meshes.
///
/// The transform is a column-major model matrix. `animation` and `frame`
/// select a bone animation clip and the (fractional) frame within it, and
/// `atlas_uv` offsets the mesh uvs into a texture atlas.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Instance {
    pub transform: [[f32; 4]; 4],
    pub data: [u32; 3],
    pub norms: [u16; 4],
    pub animation: u32,
    pub frame: f32,
    pub atlas_uv: [u16; 2],
}

impl Instance {
    // Locations continue after the seven vertex attributes.
    const ATTRIBS: [wgpu::VertexAttribute; 9] = wgpu::vertex_attr_array![
        7 => Float32x4,
        8 => Float32x4,
        9 => Float32x4,
        10 => Float32x4,
        11 => Uint32x3,
        12 => Unorm16x4,
        13 => Uint32,
        14 => Float32,
        15 => Unorm16x2
    ];

    pub fn new(transform: cgmath::Matrix4<f32>) -> Self {
        Self {
            transform: transform.into(),
            ..Default::default()
        }
    }

    pub fn from_position(position: cgmath::Vector3<f32>) -> Self {
        Self::new(cgmath::Matrix4::from_translation(position))
    }
}

impl Default for Instance {
    fn default() -> Self {
        use cgmath::SquareMatrix;
        Self {
            transform: cgmath::Matrix4::identity().into(),
            data: [0; 3],
            norms: [0; 4],
            animation: 0,
            frame: 0.0,
            atlas_uv: [0; 2],
        }
    }
}

impl Vertex for Instance {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Instance>() as wgpu::BufferAddress,
            // Switch from one instance to the next only after all vertices of a mesh were drawn
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Screen-space vertex used by the HUD pipeline. Positions and uvs are in 0..1
/// of one character cell.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex2D {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl Vertex2D {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    /// The two triangles of one character cell.
    pub fn quad() -> ([Vertex2D; 4], [u32; 6]) {
        let v = |x: f32, y: f32| Vertex2D {
            position: [x, y],
            uv: [x, y],
        };
        (
            [v(0.0, 0.0), v(1.0, 0.0), v(1.0, 1.0), v(0.0, 1.0)],
            [0, 1, 2, 0, 2, 3],
        )
    }
}

impl Vertex for Vertex2D {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex2D>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// One character of HUD text: the cell it occupies and the glyph drawn into it.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CharInstance {
    pub cell: i32,
    pub glyph: i32,
}

impl CharInstance {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![2 => Sint32, 3 => Sint32];

    /// Lays out `text` row-major starting at `first_cell`.
    pub fn from_text(text: &str, first_cell: i32) -> Vec<CharInstance> {
        text.bytes()
            .enumerate()
            .map(|(i, byte)| CharInstance {
                cell: first_cell + i as i32,
                glyph: byte as i32,
            })
            .collect()
    }
}

impl Vertex for CharInstance {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<CharInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Skinning matrices attached to a mesh: `frame_count` frames of `bone_count`
/// column-major 4x4 matrices each.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneData {
    pub bone_count: u32,
    pub frame_count: u32,
    pub frames: Vec<[f32; 16]>,
}

impl BoneData {
    pub fn matrix(&self, frame: u32, bone: u32) -> Option<&[f32; 16]> {
        if frame >= self.frame_count || bone >= self.bone_count {
            return None;
        }
        self.frames.get((frame * self.bone_count + bone) as usize)
    }
}

/// GPU buffers and counts of one mesh.
///
/// `instances` is the CPU-side instance source: uploaded once for static
/// pipelines and re-uploaded on every draw for pipelines with dynamic instances.
#[derive(Debug)]
pub struct MeshRecord<D: GraphicsDevice> {
    pub(crate) pipeline: PipelineId,
    pub(crate) vertex_buffer: D::Buffer,
    pub(crate) index_buffer: D::Buffer,
    pub(crate) instance_buffer: D::Buffer,
    pub(crate) vertex_count: u32,
    pub(crate) index_count: u32,
    pub(crate) instance_count: u32,
    pub(crate) instance_capacity: usize,
    pub(crate) instances: Vec<u8>,
    pub(crate) bones: Option<BoneData>,
}

impl<D: GraphicsDevice> MeshRecord<D> {
    pub fn pipeline(&self) -> PipelineId {
        self.pipeline
    }

    pub fn vertex_buffer(&self) -> &D::Buffer {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> &D::Buffer {
        &self.index_buffer
    }

    pub fn instance_buffer(&self) -> &D::Buffer {
        &self.instance_buffer
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// Size of the GPU instance buffer in bytes. Fixed at creation.
    pub fn instance_capacity(&self) -> usize {
        self.instance_capacity
    }

    pub fn instance_bytes(&self) -> &[u8] {
        &self.instances
    }

    pub fn bone_data(&self) -> Option<&BoneData> {
        self.bones.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_match_the_packed_formats() {
        assert_eq!(std::mem::size_of::<ModelVertex>(), 48);
        assert_eq!(std::mem::size_of::<Instance>(), 96);
        assert_eq!(std::mem::size_of::<Vertex2D>(), 16);
        assert_eq!(std::mem::size_of::<CharInstance>(), 8);
    }

    #[test]
    fn instance_attribute_offsets() {
        let offsets: Vec<u64> = Instance::desc().attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 16, 32, 48, 64, 76, 84, 88, 92]);
        let locations: Vec<u32> = Instance::desc()
            .attributes
            .iter()
            .map(|a| a.shader_location)
            .collect();
        assert_eq!(locations, (7..=15).collect::<Vec<_>>());
    }

    #[test]
    fn vertex_attribute_offsets() {
        let offsets: Vec<u64> = ModelVertex::desc()
            .attributes
            .iter()
            .map(|a| a.offset)
            .collect();
        assert_eq!(offsets, vec![0, 16, 28, 32, 36, 40, 44]);
    }

    #[test]
    fn default_instance_is_identity() {
        let instance = Instance::default();
        assert_eq!(instance.transform[0], [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(instance.transform[3], [0.0, 0.0, 0.0, 1.0]);
        let moved = Instance::from_position(cgmath::Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(moved.transform[3], [1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn text_becomes_consecutive_cells() {
        let chars = CharInstance::from_text("Hi", 10);
        assert_eq!(
            chars,
            vec![
                CharInstance { cell: 10, glyph: 'H' as i32 },
                CharInstance { cell: 11, glyph: 'i' as i32 },
            ]
        );
    }

    #[test]
    fn bone_matrix_lookup_is_bounds_checked() {
        let bones = BoneData {
            bone_count: 2,
            frame_count: 2,
            frames: (0..4).map(|i| [i as f32; 16]).collect(),
        };
        assert_eq!(bones.matrix(1, 0).map(|m| m[0]), Some(2.0));
        assert!(bones.matrix(2, 0).is_none());
        assert!(bones.matrix(0, 2).is_none());
    }
}
