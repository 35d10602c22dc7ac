//! Meshes: creation, instance updates, bone data and the binary mesh format.
//!
//! The binary mesh format is little endian:
//!
//! - header: seven `u32` (vertex count, index count, bone count, frame count,
//!   vertex array offset, index array offset, bone frame array offset)
//! - vertex array: packed 48 byte [`ModelVertex`] records
//! - index array: `u32`
//! - bone frames: `frame count × bone count` column-major `f32` 4×4 matrices

use std::path::Path;

use crate::{
    context::Context,
    data_structures::{
        model::{BoneData, MeshRecord, ModelVertex},
        slots::{MeshId, PipelineId, SlotKind},
    },
    device::{BufferKind, GraphicsDevice},
    error::EngineError,
    platform::Platform,
};

pub const MAX_BONES: u32 = 64;
pub const MAX_BONE_FRAMES: u32 = 32;

const HEADER_LEN: usize = 7 * 4;
const MATRIX_LEN: usize = 16 * 4;

/// Raw data for [`Context::create_mesh`].
///
/// Vertex and instance bytes must be whole multiples of the pipeline's vertex
/// and instance strides.
#[derive(Debug, Clone, Copy)]
pub struct MeshSource<'a> {
    pub vertices: &'a [u8],
    pub indices: &'a [u32],
    pub instances: &'a [u8],
    /// Minimum size of the instance buffer in instances. The buffer never
    /// grows after creation, so reserve room here for instances added later.
    pub instance_capacity: usize,
}

impl<'a> MeshSource<'a> {
    pub fn new<V: bytemuck::Pod, I: bytemuck::Pod>(
        vertices: &'a [V],
        indices: &'a [u32],
        instances: &'a [I],
    ) -> Self {
        Self::from_bytes(
            bytemuck::cast_slice(vertices),
            indices,
            bytemuck::cast_slice(instances),
        )
    }

    pub fn from_bytes(vertices: &'a [u8], indices: &'a [u32], instances: &'a [u8]) -> Self {
        Self {
            vertices,
            indices,
            instances,
            instance_capacity: 0,
        }
    }

    pub fn with_instance_capacity(mut self, instances: usize) -> Self {
        self.instance_capacity = instances;
        self
    }
}

/// A parsed binary mesh file.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshFile {
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
    pub bone_count: u32,
    pub frame_count: u32,
    pub bone_frames: Vec<[f32; 16]>,
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn section<'a>(
    bytes: &'a [u8],
    what: &str,
    offset: u32,
    count: usize,
    stride: usize,
) -> Result<&'a [u8], EngineError> {
    if count == 0 {
        return Ok(&[]);
    }
    let start = offset as usize;
    count
        .checked_mul(stride)
        .and_then(|len| start.checked_add(len))
        .filter(|end| *end <= bytes.len())
        .map(|end| &bytes[start..end])
        .ok_or_else(|| {
            EngineError::MalformedAsset(format!(
                "{what} array ({count} x {stride} bytes at offset {offset}) lies outside the {} byte mesh file",
                bytes.len()
            ))
        })
}

impl MeshFile {
    pub fn parse(bytes: &[u8]) -> Result<Self, EngineError> {
        if bytes.len() < HEADER_LEN {
            return Err(EngineError::MalformedAsset(format!(
                "mesh file of {} bytes is shorter than its {HEADER_LEN} byte header",
                bytes.len()
            )));
        }
        let header: [u32; 7] = std::array::from_fn(|i| read_u32(bytes, i * 4));
        let [vertex_count, index_count, bone_count, frame_count, vertex_offset, index_offset, bones_offset] =
            header;

        if bone_count > MAX_BONES || frame_count > MAX_BONE_FRAMES {
            return Err(EngineError::MalformedAsset(format!(
                "{bone_count} bones x {frame_count} frames exceed the limit of {MAX_BONES} x {MAX_BONE_FRAMES}"
            )));
        }

        let stride = std::mem::size_of::<ModelVertex>();
        let vertices: Vec<ModelVertex> = section(bytes, "vertex", vertex_offset, vertex_count as usize, stride)?
            .chunks_exact(stride)
            .map(bytemuck::pod_read_unaligned::<ModelVertex>)
            .collect();
        let indices: Vec<u32> = section(bytes, "index", index_offset, index_count as usize, 4)?
            .chunks_exact(4)
            .map(|chunk| read_u32(chunk, 0))
            .collect();
        let bone_frames: Vec<[f32; 16]> = section(
            bytes,
            "bone frame",
            bones_offset,
            (bone_count * frame_count) as usize,
            MATRIX_LEN,
        )?
        .chunks_exact(MATRIX_LEN)
        .map(|matrix| std::array::from_fn(|i| f32::from_bits(read_u32(matrix, i * 4))))
        .collect();

        if let Some(index) = indices.iter().find(|index| **index >= vertex_count) {
            return Err(EngineError::MalformedAsset(format!(
                "index {index} is out of range for {vertex_count} vertices"
            )));
        }

        Ok(Self {
            vertices,
            indices,
            bone_count,
            frame_count,
            bone_frames,
        })
    }

    /// The file's geometry together with caller-provided instance data.
    pub fn source<'a>(&'a self, instances: &'a [u8]) -> MeshSource<'a> {
        MeshSource::from_bytes(bytemuck::cast_slice(&self.vertices), &self.indices, instances)
    }
}

fn check_stride(what: &'static str, len: usize, stride: usize) -> Result<(), EngineError> {
    if len % stride != 0 {
        return Err(EngineError::StrideMismatch { what, len, stride });
    }
    Ok(())
}

/// Size in bytes of an instance buffer holding `data_len` bytes of instances
/// and room for at least `reserved` instances. Draws count instances in `u32`.
fn instance_buffer_len(data_len: usize, reserved: usize, stride: usize) -> Result<usize, EngineError> {
    if reserved > u32::MAX as usize {
        return Err(EngineError::MalformedAsset(format!(
            "cannot reserve room for {reserved} instances"
        )));
    }
    let reserved_len = reserved.checked_mul(stride).ok_or_else(|| {
        EngineError::MalformedAsset(format!("{reserved} instances of {stride} bytes overflow the instance buffer"))
    })?;
    Ok(data_len.max(reserved_len))
}

impl<D: GraphicsDevice> Context<D> {
    /// Upload a mesh and attach it to `pipeline`.
    ///
    /// The pipeline is checked before any slot or buffer is allocated. Each
    /// of the three buffers is sized to its data (the instance buffer to at
    /// least `source.instance_capacity` instances) and filled once.
    pub fn create_mesh(&mut self, pipeline: PipelineId, source: MeshSource<'_>) -> Result<MeshId, EngineError> {
        let layout = self.pipeline_record(pipeline)?.options.layout;
        let vertex_stride = layout.vertex_stride();
        let instance_stride = layout.instance_stride();
        check_stride("vertex data", source.vertices.len(), vertex_stride)?;
        check_stride("instance data", source.instances.len(), instance_stride)?;
        let vertex_count = source.vertices.len() / vertex_stride;
        if let Some(index) = source.indices.iter().find(|&&index| index as usize >= vertex_count) {
            log::error!("Cannot create mesh for {pipeline}: index {index} out of range");
            return Err(EngineError::MalformedAsset(format!(
                "index {index} is out of range for {vertex_count} vertices"
            )));
        }
        let instance_capacity = instance_buffer_len(source.instances.len(), source.instance_capacity, instance_stride)
            .inspect_err(|err| log::error!("Cannot create mesh for {pipeline}: {err}"))?;

        let slot = self
            .meshes
            .reserve()
            .inspect_err(|err| log::error!("Cannot create mesh for {pipeline}: {err}"))?;
        let mut instance_contents = source.instances.to_vec();
        instance_contents.resize(instance_capacity, 0);

        let vertex_buffer = self.device.create_buffer(
            &format!("mesh {slot} vertices"),
            BufferKind::Vertex,
            source.vertices,
        );
        let index_buffer = self.device.create_buffer(
            &format!("mesh {slot} indices"),
            BufferKind::Index,
            bytemuck::cast_slice(source.indices),
        );
        let instance_buffer = self.device.create_buffer(
            &format!("mesh {slot} instances"),
            BufferKind::Vertex,
            &instance_contents,
        );

        let record = MeshRecord {
            pipeline,
            vertex_buffer,
            index_buffer,
            instance_buffer,
            vertex_count: vertex_count as u32,
            index_count: source.indices.len() as u32,
            instance_count: (source.instances.len() / instance_stride) as u32,
            instance_capacity,
            instances: source.instances.to_vec(),
            bones: None,
        };
        log::info!(
            "Created mesh {slot} for {pipeline}: {} vertices, {} indices, {} instances",
            record.vertex_count,
            record.index_count,
            record.instance_count
        );
        self.meshes.fill(slot, record);
        let id = MeshId(slot);
        self.pipeline_record_mut(pipeline)?.meshes.push(id);
        Ok(id)
    }

    /// Load a binary mesh file through `platform` and create a mesh from it.
    /// Bone frames in the file are attached as bone data.
    pub fn create_mesh_from_file<P: Platform>(
        &mut self,
        platform: &P,
        pipeline: PipelineId,
        path: &Path,
        instances: &[u8],
    ) -> Result<MeshId, EngineError> {
        let file = platform
            .map_file(path)
            .inspect_err(|err| log::error!("Could not load mesh {}: {err:#}", path.display()))?;
        let parsed = MeshFile::parse(&file);
        platform.unmap_file(file);
        let mesh = parsed.inspect_err(|err| log::error!("Could not load mesh {}: {err}", path.display()))?;

        let id = self.create_mesh(pipeline, mesh.source(instances))?;
        if mesh.bone_count > 0 && mesh.frame_count > 0 {
            self.set_bone_data(id, &mesh.bone_frames, mesh.bone_count, mesh.frame_count)?;
        }
        Ok(id)
    }

    /// Replace the mesh's instance data.
    ///
    /// The GPU buffer keeps the size it was created with; more data than fits
    /// is rejected. Static pipelines upload the data right away, dynamic
    /// pipelines on their next draw.
    pub fn set_instances(&mut self, mesh: MeshId, bytes: &[u8]) -> Result<(), EngineError> {
        let record = self.meshes.get_mut(mesh.0).ok_or(EngineError::InvalidId {
            kind: SlotKind::Mesh,
            id: mesh.0,
        })?;
        let pipeline = self
            .pipelines
            .get(record.pipeline.0)
            .ok_or(EngineError::InvalidId {
                kind: SlotKind::Pipeline,
                id: record.pipeline.0,
            })?;
        let stride = pipeline.options.layout.instance_stride();
        check_stride("instance data", bytes.len(), stride)?;
        if bytes.len() > record.instance_capacity {
            return Err(EngineError::InstanceCapacity {
                mesh: mesh.0,
                requested: bytes.len(),
                capacity: record.instance_capacity,
            });
        }

        record.instances.clear();
        record.instances.extend_from_slice(bytes);
        record.instance_count = (bytes.len() / stride) as u32;
        if !pipeline.options.dynamic_instances {
            self.device.write_buffer(&record.instance_buffer, 0, bytes);
        }
        Ok(())
    }

    pub fn set_instances_from<T: bytemuck::Pod>(&mut self, mesh: MeshId, instances: &[T]) -> Result<(), EngineError> {
        self.set_instances(mesh, bytemuck::cast_slice(instances))
    }

    /// Attach `frame_count` frames of `bone_count` matrices to a mesh.
    ///
    /// Zero bones and frames detach any previous bone data. No GPU resource
    /// is created; shaders that skin meshes read the data through uniforms.
    pub fn set_bone_data(
        &mut self,
        mesh: MeshId,
        frames: &[[f32; 16]],
        bone_count: u32,
        frame_count: u32,
    ) -> Result<(), EngineError> {
        if bone_count > MAX_BONES || frame_count > MAX_BONE_FRAMES {
            return Err(EngineError::BoneData(format!(
                "{bone_count} bones x {frame_count} frames exceed the limit of {MAX_BONES} x {MAX_BONE_FRAMES}"
            )));
        }
        let expected = (bone_count * frame_count) as usize;
        if frames.len() != expected {
            return Err(EngineError::BoneData(format!(
                "expected {expected} matrices for {bone_count} bones x {frame_count} frames, got {}",
                frames.len()
            )));
        }
        let record = self.meshes.get_mut(mesh.0).ok_or(EngineError::InvalidId {
            kind: SlotKind::Mesh,
            id: mesh.0,
        })?;
        record.bones = (expected > 0).then(|| BoneData {
            bone_count,
            frame_count,
            frames: frames.to_vec(),
        });
        Ok(())
    }
}
