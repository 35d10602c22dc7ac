//! Pipeline descriptions and per-pipeline GPU state.
//!
//! Every pipeline shares the same two bind group shapes:
//! - group 0: one uniform buffer holding the pipeline's [`UniformBlock`]
//! - group 1: one filtering sampler (binding 0) followed by the texture
//!   slots (bindings 1..=N)
//!
//! Only the vertex layout, blending and instance upload policy vary, see
//! [`PipelineOptions`]. The built-in shaders ([`ShaderSource::standard`] and
//! [`ShaderSource::hud`]) follow these conventions and can serve as templates.

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
};

use anyhow::Context as _;

use crate::{
    data_structures::{
        model::{CharInstance, Instance, ModelVertex, Vertex, Vertex2D},
        slots::MeshId,
        uniforms::UniformBlock,
    },
    device::GraphicsDevice,
    resources::load_string_blocking,
};

pub mod layouts;

/// The closed set of vertex layouts a pipeline can draw with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexLayout {
    /// [`ModelVertex`] + [`Instance`].
    #[default]
    Standard3d,
    /// [`Vertex2D`] + [`CharInstance`].
    Hud2d,
}

impl VertexLayout {
    pub fn vertex_stride(self) -> usize {
        match self {
            VertexLayout::Standard3d => std::mem::size_of::<ModelVertex>(),
            VertexLayout::Hud2d => std::mem::size_of::<Vertex2D>(),
        }
    }

    pub fn instance_stride(self) -> usize {
        match self {
            VertexLayout::Standard3d => std::mem::size_of::<Instance>(),
            VertexLayout::Hud2d => std::mem::size_of::<CharInstance>(),
        }
    }

    /// Vertex buffer layouts for slot 0 (vertices) and slot 1 (instances).
    pub fn buffers(self) -> [wgpu::VertexBufferLayout<'static>; 2] {
        match self {
            VertexLayout::Standard3d => [ModelVertex::desc(), Instance::desc()],
            VertexLayout::Hud2d => [Vertex2D::desc(), CharInstance::desc()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineOptions {
    pub layout: VertexLayout,
    /// Blend with `src_alpha / one_minus_src_alpha` instead of replacing.
    pub alpha_blending: bool,
    /// Re-upload every mesh's instance data on each draw instead of only
    /// when [`set_instances`](crate::context::Context::set_instances) is called.
    pub dynamic_instances: bool,
}

impl PipelineOptions {
    /// Opaque 3D geometry with static instances.
    pub fn standard() -> Self {
        Self::default()
    }

    /// Blended HUD text whose characters change every frame.
    pub fn hud() -> Self {
        Self {
            layout: VertexLayout::Hud2d,
            alpha_blending: true,
            dynamic_instances: true,
        }
    }

    pub fn with_alpha_blending(mut self, alpha_blending: bool) -> Self {
        self.alpha_blending = alpha_blending;
        self
    }

    pub fn with_dynamic_instances(mut self, dynamic_instances: bool) -> Self {
        self.dynamic_instances = dynamic_instances;
        self
    }
}

/// Where a pipeline's WGSL comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderSource {
    Wgsl(Cow<'static, str>),
    File(PathBuf),
}

impl ShaderSource {
    pub fn standard() -> Self {
        ShaderSource::Wgsl(Cow::Borrowed(include_str!("standard.wgsl")))
    }

    pub fn hud() -> Self {
        ShaderSource::Wgsl(Cow::Borrowed(include_str!("hud.wgsl")))
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        ShaderSource::File(path.as_ref().to_path_buf())
    }

    /// Read the source. Missing, unreadable and empty files are errors.
    pub fn load(&self) -> anyhow::Result<Cow<'_, str>> {
        let source = match self {
            ShaderSource::Wgsl(source) => Cow::Borrowed(source.as_ref()),
            ShaderSource::File(path) => Cow::Owned(load_string_blocking(path).context("Could not load shader")?),
        };
        if source.trim().is_empty() {
            anyhow::bail!("Shader {} is empty", self.name());
        }
        Ok(source)
    }

    pub fn name(&self) -> String {
        match self {
            ShaderSource::Wgsl(_) => "<inline wgsl>".to_string(),
            ShaderSource::File(path) => path.display().to_string(),
        }
    }
}

/// GPU state of one pipeline slot.
#[derive(Debug)]
pub struct PipelineRecord<D: GraphicsDevice> {
    pub(crate) label: String,
    pub(crate) pipeline: D::Pipeline,
    pub(crate) options: PipelineOptions,
    pub(crate) uniforms: UniformBlock,
    pub(crate) uniform_buffer: D::Buffer,
    pub(crate) uniform_bind_group: D::BindGroup,
    /// Textures added so far, in slot order. Never longer than the configured maximum.
    pub(crate) textures: Vec<D::Texture>,
    pub(crate) texture_bind_group: D::BindGroup,
    /// Owned meshes in creation order.
    pub(crate) meshes: Vec<MeshId>,
}

impl<D: GraphicsDevice> PipelineRecord<D> {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pipeline(&self) -> &D::Pipeline {
        &self.pipeline
    }

    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    pub fn uniforms(&self) -> &UniformBlock {
        &self.uniforms
    }

    pub fn uniform_buffer(&self) -> &D::Buffer {
        &self.uniform_buffer
    }

    pub fn uniform_bind_group(&self) -> &D::BindGroup {
        &self.uniform_bind_group
    }

    pub fn textures(&self) -> &[D::Texture] {
        &self.textures
    }

    pub fn texture_bind_group(&self) -> &D::BindGroup {
        &self.texture_bind_group
    }

    pub fn meshes(&self) -> &[MeshId] {
        &self.meshes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_strides() {
        assert_eq!(VertexLayout::Standard3d.vertex_stride(), 48);
        assert_eq!(VertexLayout::Standard3d.instance_stride(), 96);
        assert_eq!(VertexLayout::Hud2d.vertex_stride(), 16);
        assert_eq!(VertexLayout::Hud2d.instance_stride(), 8);
        let [vertices, instances] = VertexLayout::Hud2d.buffers();
        assert_eq!(vertices.array_stride, 16);
        assert_eq!(instances.step_mode, wgpu::VertexStepMode::Instance);
    }

    #[test]
    fn builtin_shaders_have_both_entry_points() {
        for shader in [ShaderSource::standard(), ShaderSource::hud()] {
            let source = shader.load().unwrap();
            assert!(source.contains("fn vs_main"));
            assert!(source.contains("fn fs_main"));
        }
    }

    #[test]
    fn missing_shader_file_is_an_error() {
        let shader = ShaderSource::file("does/not/exist.wgsl");
        let err = shader.load().unwrap_err();
        assert!(format!("{err:#}").contains("does/not/exist.wgsl"));
    }

    #[test]
    fn empty_shader_is_an_error() {
        let shader = ShaderSource::Wgsl(Cow::Borrowed("  \n"));
        assert!(shader.load().is_err());
    }
}
