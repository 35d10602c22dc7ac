//! A [`GraphicsDevice`] without a GPU.
//!
//! [`HeadlessDevice`] hands out numbered handles, keeps the current contents
//! of every buffer and appends each write, submission, wait and present to a
//! call log. Tests drive a full [`Context`](crate::context::Context) with it
//! and assert on exactly what would have reached the GPU.

use std::collections::HashMap;

use crate::{
    device::{BufferKind, GraphicsDevice, PipelineDescriptor},
    error::EngineError,
    pipelines::VertexLayout,
    render::RenderCommand,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessBuffer {
    pub id: u32,
    pub kind: BufferKind,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessTexture {
    pub id: u32,
    pub width: u32,
    pub height: u32,
}

/// A bind group together with a snapshot of what it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadlessBindGroup {
    Uniform { id: u32, buffer: u32 },
    /// Texture ids in binding order (binding 1 first).
    Textures { id: u32, textures: Vec<u32> },
}

impl HeadlessBindGroup {
    pub fn id(&self) -> u32 {
        match self {
            HeadlessBindGroup::Uniform { id, .. } | HeadlessBindGroup::Textures { id, .. } => *id,
        }
    }

    pub fn texture_ids(&self) -> &[u32] {
        match self {
            HeadlessBindGroup::Textures { textures, .. } => textures.as_slice(),
            HeadlessBindGroup::Uniform { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessPipeline {
    pub id: u32,
    pub label: String,
    pub layout: VertexLayout,
    pub alpha_blending: bool,
}

#[derive(Debug)]
pub struct HeadlessFrame {
    pub index: u64,
}

/// One recorded device call.
#[derive(Debug, Clone)]
pub enum DeviceCall {
    BufferWrite { buffer: u32, offset: u64, data: Vec<u8> },
    Submit { frame: u64, commands: Vec<RenderCommand<HeadlessDevice>> },
    WaitIdle,
    Present { frame: u64 },
}

#[derive(Debug)]
pub struct HeadlessDevice {
    next_id: u32,
    buffers: HashMap<u32, Vec<u8>>,
    calls: Vec<DeviceCall>,
    default_texture: HeadlessTexture,
    failing_acquires: u32,
    failing_pipeline: Option<String>,
    frames_acquired: u64,
    max_texture_dimension: u32,
    size: (u32, u32),
}

impl HeadlessDevice {
    /// wgpu's default `max_texture_dimension_2d`.
    pub const MAX_TEXTURE_DIMENSION: u32 = 8192;

    pub fn new(width: u32, height: u32) -> Self {
        Self {
            // 0 is the default texture
            next_id: 1,
            buffers: HashMap::new(),
            calls: Vec::new(),
            default_texture: HeadlessTexture {
                id: 0,
                width: 1,
                height: 1,
            },
            failing_acquires: 0,
            failing_pipeline: None,
            frames_acquired: 0,
            max_texture_dimension: Self::MAX_TEXTURE_DIMENSION,
            size: (width.max(1), height.max(1)),
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Make the next surface acquisition fail, as a minimised window would.
    pub fn fail_next_acquire(&mut self) {
        self.failing_acquires += 1;
    }

    /// Make the next pipeline creation fail the way a shader rejected by
    /// device validation would.
    pub fn fail_next_pipeline(&mut self, reason: &str) {
        self.failing_pipeline = Some(reason.to_string());
    }

    pub fn set_max_texture_dimension(&mut self, max: u32) {
        self.max_texture_dimension = max;
    }

    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Current contents of `buffer`.
    pub fn buffer_contents(&self, buffer: &HeadlessBuffer) -> Option<&[u8]> {
        self.buffers.get(&buffer.id).map(Vec::as_slice)
    }

    /// Every write to `buffer`, oldest first.
    pub fn writes_to(&self, buffer: &HeadlessBuffer) -> Vec<&[u8]> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                DeviceCall::BufferWrite { buffer: id, data, .. } if *id == buffer.id => {
                    Some(data.as_slice())
                }
                _ => None,
            })
            .collect()
    }

    /// Command lists of all submissions, oldest first.
    pub fn submissions(&self) -> Vec<&[RenderCommand<HeadlessDevice>]> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                DeviceCall::Submit { commands, .. } => Some(commands.as_slice()),
                _ => None,
            })
            .collect()
    }

    pub fn presented_frames(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, DeviceCall::Present { .. }))
            .count()
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

impl GraphicsDevice for HeadlessDevice {
    type Buffer = HeadlessBuffer;
    type Texture = HeadlessTexture;
    type BindGroup = HeadlessBindGroup;
    type Pipeline = HeadlessPipeline;
    type Frame = HeadlessFrame;

    fn create_pipeline(&mut self, desc: &PipelineDescriptor<'_>) -> Result<Self::Pipeline, EngineError> {
        if let Some(reason) = self.failing_pipeline.take() {
            return Err(EngineError::Asset(anyhow::anyhow!(
                "Pipeline {} was rejected by the device: {reason}",
                desc.label
            )));
        }
        Ok(HeadlessPipeline {
            id: self.next_id(),
            label: desc.label.to_string(),
            layout: desc.layout,
            alpha_blending: desc.alpha_blending,
        })
    }

    fn create_buffer(&mut self, _label: &str, kind: BufferKind, contents: &[u8]) -> Self::Buffer {
        let id = self.next_id();
        self.buffers.insert(id, contents.to_vec());
        HeadlessBuffer {
            id,
            kind,
            size: contents.len() as u64,
        }
    }

    fn write_buffer(&mut self, buffer: &Self::Buffer, offset: u64, data: &[u8]) {
        let Some(contents) = self.buffers.get_mut(&buffer.id) else {
            log::error!("Write to unknown buffer {}", buffer.id);
            return;
        };
        let range = usize::try_from(offset)
            .ok()
            .and_then(|start| start.checked_add(data.len()).map(|end| start..end))
            .filter(|range| range.end <= contents.len());
        let Some(range) = range else {
            log::error!(
                "Write of {} bytes at offset {offset} overflows buffer {} of {} bytes",
                data.len(),
                buffer.id,
                contents.len()
            );
            return;
        };
        contents[range].copy_from_slice(data);
        self.calls.push(DeviceCall::BufferWrite {
            buffer: buffer.id,
            offset,
            data: data.to_vec(),
        });
    }

    fn create_texture(&mut self, label: &str, image: &image::RgbaImage) -> Result<Self::Texture, EngineError> {
        let max = self.max_texture_dimension;
        let (width, height) = image.dimensions();
        if width > max || height > max {
            return Err(EngineError::Asset(anyhow::anyhow!(
                "{label} is {width}x{height} but the device allows at most {max}x{max}"
            )));
        }
        Ok(HeadlessTexture {
            id: self.next_id(),
            width,
            height,
        })
    }

    fn default_texture(&self) -> &Self::Texture {
        &self.default_texture
    }

    fn create_uniform_bind_group(&mut self, _label: &str, buffer: &Self::Buffer) -> Self::BindGroup {
        HeadlessBindGroup::Uniform {
            id: self.next_id(),
            buffer: buffer.id,
        }
    }

    fn create_texture_bind_group(&mut self, _label: &str, textures: &[&Self::Texture]) -> Self::BindGroup {
        HeadlessBindGroup::Textures {
            id: self.next_id(),
            textures: textures.iter().map(|texture| texture.id).collect(),
        }
    }

    fn acquire_frame(&mut self) -> Result<Self::Frame, EngineError> {
        if self.failing_acquires > 0 {
            self.failing_acquires -= 1;
            return Err(EngineError::SurfaceUnavailable("timeout".to_string()));
        }
        self.frames_acquired += 1;
        Ok(HeadlessFrame {
            index: self.frames_acquired,
        })
    }

    fn submit(&mut self, frame: &Self::Frame, commands: &[RenderCommand<Self>], _clear_colour: wgpu::Color) {
        self.calls.push(DeviceCall::Submit {
            frame: frame.index,
            commands: commands.to_vec(),
        });
    }

    fn wait_for_submitted_work(&mut self) -> Result<(), EngineError> {
        self.calls.push(DeviceCall::WaitIdle);
        Ok(())
    }

    fn present(&mut self, frame: Self::Frame) {
        self.calls.push(DeviceCall::Present { frame: frame.index });
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = (width, height);
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }
}
