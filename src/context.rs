//! The engine context.
//!
//! [`Context`] is the single owner of the graphics device and every slot
//! table. There are no globals: all resource and frame operations are
//! methods on the context (see [`resources`](crate::resources) and
//! [`render`](crate::render) for most of them).

use std::sync::Arc;

use winit::window::Window;

use crate::{
    config::RendererConfig,
    data_structures::{
        model::MeshRecord,
        slots::{MeshId, PipelineId, SlotArena, SlotKind},
    },
    device::{GraphicsDevice, HeadlessDevice, WgpuDevice},
    error::EngineError,
    pipelines::PipelineRecord,
    render::{ActiveFrame, Viewport},
};

pub struct Context<D: GraphicsDevice = WgpuDevice> {
    pub(crate) device: D,
    pub(crate) config: RendererConfig,
    pub(crate) pipelines: SlotArena<PipelineRecord<D>>,
    pub(crate) meshes: SlotArena<MeshRecord<D>>,
    pub(crate) frame: Option<ActiveFrame<D>>,
    pub(crate) frames_rendered: u64,
}

impl<D: GraphicsDevice> Context<D> {
    pub fn new(device: D, config: RendererConfig) -> Result<Self, EngineError> {
        config.validate()?;
        log::info!(
            "Creating context with {} pipeline and {} mesh slots",
            config.max_pipelines,
            config.max_meshes
        );
        Ok(Self {
            device,
            pipelines: SlotArena::with_capacity(SlotKind::Pipeline, config.max_pipelines),
            meshes: SlotArena::with_capacity(SlotKind::Mesh, config.max_meshes),
            config,
            frame: None,
            frames_rendered: 0,
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn pipeline(&self, id: PipelineId) -> Option<&PipelineRecord<D>> {
        self.pipelines.get(id.0)
    }

    pub fn mesh(&self, id: MeshId) -> Option<&MeshRecord<D>> {
        self.meshes.get(id.0)
    }

    /// Live pipelines in slot order, which is also the order [`render_frame`](Self::render_frame) draws them in.
    pub fn pipeline_ids(&self) -> Vec<PipelineId> {
        self.pipelines.ids().into_iter().map(PipelineId).collect()
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Restrict drawing to `viewport` from the next frame on. `None` draws to
    /// the whole surface. An invalid viewport leaves the current one in place.
    ///
    /// Each frame draws to the part of the viewport that lies on the surface
    /// at that time, so the viewport may outlast a shrinking resize.
    pub fn set_viewport(&mut self, viewport: Option<Viewport>) -> Result<(), EngineError> {
        if let Some(viewport) = viewport {
            viewport.validate()?;
        }
        self.config.viewport = viewport;
        Ok(())
    }

    pub fn set_clear_colour(&mut self, clear_colour: wgpu::Color) {
        self.config.clear_colour = clear_colour;
    }

    pub fn set_gpu_timing(&mut self, gpu_timing: bool) {
        self.config.gpu_timing = gpu_timing;
    }

    /// Reconfigure the surface and depth target. Zero sizes (minimised
    /// windows) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            log::debug!("Ignoring resize to {width}x{height}");
            return;
        }
        self.device.resize(width, height);
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.device.size()
    }

    pub(crate) fn pipeline_record(&self, id: PipelineId) -> Result<&PipelineRecord<D>, EngineError> {
        self.pipelines.get(id.0).ok_or(EngineError::InvalidId {
            kind: SlotKind::Pipeline,
            id: id.0,
        })
    }

    pub(crate) fn pipeline_record_mut(&mut self, id: PipelineId) -> Result<&mut PipelineRecord<D>, EngineError> {
        self.pipelines.get_mut(id.0).ok_or(EngineError::InvalidId {
            kind: SlotKind::Pipeline,
            id: id.0,
        })
    }
}

impl Context<WgpuDevice> {
    /// Set up a GPU device for `window` and wrap it in a context.
    pub async fn with_window(window: Arc<Window>, config: RendererConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let device = WgpuDevice::new(window, &config)
            .await
            .map_err(|err| EngineError::Device(format!("{err:#}")))?;
        Self::new(device, config)
    }
}

impl Context<HeadlessDevice> {
    /// A context without a GPU, recording everything it would have sent to one.
    pub fn headless(config: RendererConfig) -> Result<Self, EngineError> {
        Self::new(HeadlessDevice::default(), config)
    }
}
