//! The seam between the engine and the GPU.
//!
//! Everything the [`Context`](crate::context::Context) needs from a graphics
//! API goes through [`GraphicsDevice`]. Two implementations ship with the crate:
//!
//! - [`WgpuDevice`]: the real thing, backed by a `wgpu` device, queue and
//!   window surface
//! - [`HeadlessDevice`]: keeps buffer contents in memory and records every
//!   write, submission and present; used by tests and GPU-less tools
//!
//! Draws are not issued directly. The frame orchestrator records a list of
//! [`RenderCommand`]s and hands it to [`GraphicsDevice::submit`] at the end of
//! the frame, which replays it into a single render pass.

use std::fmt;

use crate::{error::EngineError, pipelines::VertexLayout, render::RenderCommand};

mod gpu;
pub mod headless;

pub use gpu::{WgpuDevice, WgpuFrame};
pub use headless::HeadlessDevice;

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Per-vertex or per-instance attributes.
    Vertex,
    /// `u32` indices.
    Index,
    Uniform,
}

/// Everything a device needs to build a render pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PipelineDescriptor<'a> {
    pub label: &'a str,
    /// WGSL source with `vs_main` and `fs_main` entry points.
    pub shader: &'a str,
    pub layout: VertexLayout,
    pub alpha_blending: bool,
}

pub trait GraphicsDevice: Sized {
    type Buffer: Clone + fmt::Debug;
    type Texture: Clone + fmt::Debug;
    type BindGroup: Clone + fmt::Debug;
    type Pipeline: Clone + fmt::Debug;
    /// The acquired surface image of one frame.
    type Frame;

    /// Compile `desc.shader` into a pipeline using the shared bind group
    /// layouts: group 0 is the uniform block, group 1 the sampler followed by
    /// the texture slots. Shaders the device rejects are asset errors.
    fn create_pipeline(&mut self, desc: &PipelineDescriptor<'_>) -> Result<Self::Pipeline, EngineError>;

    /// Create a buffer sized exactly to `contents` and fill it.
    fn create_buffer(&mut self, label: &str, kind: BufferKind, contents: &[u8]) -> Self::Buffer;

    fn write_buffer(&mut self, buffer: &Self::Buffer, offset: u64, data: &[u8]);

    /// Upload `image` as an RGBA8 texture. Images larger than the device's
    /// 2D texture limit, or rejected by its validation, are asset errors.
    fn create_texture(&mut self, label: &str, image: &image::RgbaImage) -> Result<Self::Texture, EngineError>;

    /// The 1×1 texture bound to every unused texture slot.
    fn default_texture(&self) -> &Self::Texture;

    fn create_uniform_bind_group(&mut self, label: &str, buffer: &Self::Buffer) -> Self::BindGroup;

    /// Bind the shared sampler at binding 0 and `textures` at bindings 1..=N.
    fn create_texture_bind_group(&mut self, label: &str, textures: &[&Self::Texture]) -> Self::BindGroup;

    fn acquire_frame(&mut self) -> Result<Self::Frame, EngineError>;

    /// Replay `commands` into one render pass targeting `frame` and submit it.
    fn submit(&mut self, frame: &Self::Frame, commands: &[RenderCommand<Self>], clear_colour: wgpu::Color);

    /// Block until everything submitted so far has finished on the GPU.
    fn wait_for_submitted_work(&mut self) -> Result<(), EngineError>;

    fn present(&mut self, frame: Self::Frame);

    fn resize(&mut self, width: u32, height: u32);

    fn size(&self) -> (u32, u32);
}
