//! Frame orchestration.
//!
//! A frame moves through `Idle -> Recording -> Idle`:
//!
//! 1. [`Context::start_frame`] acquires the next surface image and opens a
//!    command list for it
//! 2. [`Context::draw_pipeline`] uploads the pipeline's uniform block and
//!    records one indexed instanced draw per mesh of that pipeline
//! 3. [`Context::end_frame`] submits the recorded commands, optionally waits
//!    for the GPU and presents
//!
//! Commands are recorded as plain [`RenderCommand`] values and replayed into a
//! single render pass by the [`GraphicsDevice`] at submit time, so no render
//! pass borrows outlive a single call.
//!
//! # Key types
//!
//! - [`RenderCommand<D>`] is one recorded render pass operation
//! - [`FrameStats`] holds the CPU (and optionally GPU) timings of a frame
//! - [`Viewport`] is the region of the surface drawn into
//!

use std::{fmt, ops::Range};

use instant::Instant;

use crate::{
    context::Context,
    data_structures::slots::{PipelineId, SlotKind},
    device::GraphicsDevice,
    error::EngineError,
};

/// One recorded render pass operation.
///
/// # Variants
///
/// - `SetViewport` restricts drawing to a part of the surface
/// - `SetPipeline` selects the pipeline for following draws
/// - `SetBindGroup` binds the uniform (0) or texture (1) group
/// - `SetVertexBuffer` binds mesh vertices (slot 0) or instances (slot 1)
/// - `SetIndexBuffer` binds `u32` indices
/// - `DrawIndexed` issues one instanced draw
///
pub enum RenderCommand<D: GraphicsDevice> {
    SetViewport(Viewport),
    SetPipeline(D::Pipeline),
    SetBindGroup { index: u32, bind_group: D::BindGroup },
    SetVertexBuffer { slot: u32, buffer: D::Buffer },
    SetIndexBuffer(D::Buffer),
    DrawIndexed { indices: Range<u32>, instances: Range<u32> },
}

// Derives would put a `D: Clone`/`D: Debug` bound on the device itself.
impl<D: GraphicsDevice> Clone for RenderCommand<D> {
    fn clone(&self) -> Self {
        match self {
            RenderCommand::SetViewport(viewport) => RenderCommand::SetViewport(*viewport),
            RenderCommand::SetPipeline(pipeline) => RenderCommand::SetPipeline(pipeline.clone()),
            RenderCommand::SetBindGroup { index, bind_group } => RenderCommand::SetBindGroup {
                index: *index,
                bind_group: bind_group.clone(),
            },
            RenderCommand::SetVertexBuffer { slot, buffer } => RenderCommand::SetVertexBuffer {
                slot: *slot,
                buffer: buffer.clone(),
            },
            RenderCommand::SetIndexBuffer(buffer) => RenderCommand::SetIndexBuffer(buffer.clone()),
            RenderCommand::DrawIndexed { indices, instances } => RenderCommand::DrawIndexed {
                indices: indices.clone(),
                instances: instances.clone(),
            },
        }
    }
}

impl<D: GraphicsDevice> fmt::Debug for RenderCommand<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderCommand::SetViewport(viewport) => f.debug_tuple("SetViewport").field(viewport).finish(),
            RenderCommand::SetPipeline(pipeline) => f.debug_tuple("SetPipeline").field(pipeline).finish(),
            RenderCommand::SetBindGroup { index, bind_group } => f
                .debug_struct("SetBindGroup")
                .field("index", index)
                .field("bind_group", bind_group)
                .finish(),
            RenderCommand::SetVertexBuffer { slot, buffer } => f
                .debug_struct("SetVertexBuffer")
                .field("slot", slot)
                .field("buffer", buffer)
                .finish(),
            RenderCommand::SetIndexBuffer(buffer) => f.debug_tuple("SetIndexBuffer").field(buffer).finish(),
            RenderCommand::DrawIndexed { indices, instances } => f
                .debug_struct("DrawIndexed")
                .field("indices", indices)
                .field("instances", instances)
                .finish(),
        }
    }
}

/// Region of the surface in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// The largest centred region of `surface` with the given aspect ratio
    /// (width / height). The remaining bars keep the clear colour.
    pub fn letterbox(surface: (u32, u32), aspect: f32) -> Self {
        let (surface_w, surface_h) = (surface.0 as f32, surface.1 as f32);
        if surface_h <= 0.0 || aspect <= 0.0 {
            return Self::new(0.0, 0.0, surface_w, surface_h);
        }
        if surface_w / surface_h > aspect {
            let width = surface_h * aspect;
            Self::new((surface_w - width) / 2.0, 0.0, width, surface_h)
        } else {
            let height = surface_w / aspect;
            Self::new(0.0, (surface_h - height) / 2.0, surface_w, height)
        }
    }

    /// A viewport needs a finite, non-negative origin and a positive size.
    pub fn validate(&self) -> Result<(), EngineError> {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|value| value.is_finite());
        if !finite || self.x < 0.0 || self.y < 0.0 || self.width <= 0.0 || self.height <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "viewport must have a non-negative origin and a positive size, got {self:?}"
            )));
        }
        Ok(())
    }

    /// The part of the viewport that lies on a surface of the given size, or
    /// `None` if the two do not overlap.
    pub fn clamped_to(&self, surface: (u32, u32)) -> Option<Self> {
        let x = self.x.max(0.0);
        let y = self.y.max(0.0);
        let right = (self.x + self.width).min(surface.0 as f32);
        let bottom = (self.y + self.height).min(surface.1 as f32);
        (right > x && bottom > y).then(|| Self::new(x, y, right - x, bottom - y))
    }
}

/// Timings of one frame in milliseconds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// Waiting for the surface image.
    pub acquire_ms: f64,
    /// Uniform and dynamic instance uploads.
    pub upload_ms: f64,
    /// Between the acquired image and `end_frame`, uploads included.
    pub record_ms: f64,
    pub submit_ms: f64,
    /// Only measured with [`RendererConfig::gpu_timing`](crate::config::RendererConfig::gpu_timing).
    pub gpu_wait_ms: Option<f64>,
    /// `start_frame` to the end of `end_frame`.
    pub cpu_ms: f64,
    pub draw_calls: u32,
}

pub(crate) struct ActiveFrame<D: GraphicsDevice> {
    frame: D::Frame,
    commands: Vec<RenderCommand<D>>,
    started: Instant,
    acquire_ms: f64,
    upload_ms: f64,
    draw_calls: u32,
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

impl<D: GraphicsDevice> Context<D> {
    /// Acquire the next surface image and start recording.
    ///
    /// If the surface is unavailable (minimised window, timeout, outdated
    /// swapchain) the frame is skipped: the context stays idle and the
    /// returned error is [recoverable](EngineError::is_recoverable).
    pub fn start_frame(&mut self) -> Result<(), EngineError> {
        if self.frame.is_some() {
            return Err(EngineError::FrameInProgress);
        }
        let started = Instant::now();
        let frame = self
            .device
            .acquire_frame()
            .inspect_err(|err| log::warn!("Skipping frame: {err}"))?;
        let acquire_ms = elapsed_ms(started);

        let mut commands = Vec::new();
        if let Some(viewport) = self.config.viewport {
            let surface = self.device.size();
            match viewport.clamped_to(surface) {
                Some(visible) => {
                    if visible != viewport {
                        log::debug!("Viewport {viewport:?} clamped to {visible:?} on a {surface:?} surface");
                    }
                    commands.push(RenderCommand::SetViewport(visible));
                }
                None => log::warn!("Viewport {viewport:?} is outside the {surface:?} surface; drawing to all of it"),
            }
        }
        self.frame = Some(ActiveFrame {
            frame,
            commands,
            started,
            acquire_ms,
            upload_ms: 0.0,
            draw_calls: 0,
        });
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.frame.is_some()
    }

    /// Record the draws of every mesh owned by `id`.
    ///
    /// Uploads the pipeline's whole uniform block first. Pipelines with
    /// dynamic instances also re-upload each mesh's instance data. Meshes
    /// without indices or instances are skipped.
    pub fn draw_pipeline(&mut self, id: PipelineId) -> Result<(), EngineError> {
        let Some(active) = self.frame.as_mut() else {
            log::warn!("Cannot draw {id}: no frame is being recorded");
            return Err(EngineError::NoActiveFrame);
        };
        let Some(pipeline) = self.pipelines.get(id.0) else {
            log::warn!("Cannot draw {id}: it does not exist (anymore)");
            return Err(EngineError::InvalidId {
                kind: SlotKind::Pipeline,
                id: id.0,
            });
        };

        let upload_start = Instant::now();
        self.device
            .write_buffer(&pipeline.uniform_buffer, 0, pipeline.uniforms.as_bytes());
        let mut upload_ms = elapsed_ms(upload_start);

        active.commands.push(RenderCommand::SetBindGroup {
            index: 0,
            bind_group: pipeline.uniform_bind_group.clone(),
        });
        active.commands.push(RenderCommand::SetBindGroup {
            index: 1,
            bind_group: pipeline.texture_bind_group.clone(),
        });
        active
            .commands
            .push(RenderCommand::SetPipeline(pipeline.pipeline.clone()));

        for mesh_id in &pipeline.meshes {
            let Some(mesh) = self.meshes.get(mesh_id.0) else {
                continue;
            };
            if pipeline.options.dynamic_instances && !mesh.instances.is_empty() {
                let upload_start = Instant::now();
                self.device
                    .write_buffer(&mesh.instance_buffer, 0, &mesh.instances);
                upload_ms += elapsed_ms(upload_start);
            }
            if mesh.index_count == 0 || mesh.instance_count == 0 {
                log::warn!(
                    "Skipping {mesh_id}: you attempted to render something with {} indices and {} instances",
                    mesh.index_count,
                    mesh.instance_count
                );
                continue;
            }
            active.commands.push(RenderCommand::SetVertexBuffer {
                slot: 0,
                buffer: mesh.vertex_buffer.clone(),
            });
            active.commands.push(RenderCommand::SetVertexBuffer {
                slot: 1,
                buffer: mesh.instance_buffer.clone(),
            });
            active
                .commands
                .push(RenderCommand::SetIndexBuffer(mesh.index_buffer.clone()));
            active.commands.push(RenderCommand::DrawIndexed {
                indices: 0..mesh.index_count,
                instances: 0..mesh.instance_count,
            });
            active.draw_calls += 1;
        }
        active.upload_ms += upload_ms;
        Ok(())
    }

    /// Submit the recorded commands and present the frame.
    pub fn end_frame(&mut self) -> Result<FrameStats, EngineError> {
        let Some(active) = self.frame.take() else {
            log::warn!("end_frame called without start_frame");
            return Err(EngineError::NoActiveFrame);
        };
        let record_ms = elapsed_ms(active.started) - active.acquire_ms;

        let submit_start = Instant::now();
        self.device
            .submit(&active.frame, &active.commands, self.config.clear_colour);
        let submit_ms = elapsed_ms(submit_start);

        let gpu_wait_ms = if self.config.gpu_timing {
            match self.wait_for_gpu() {
                Ok(ms) => Some(ms),
                Err(err) => {
                    log::warn!("GPU timing unavailable for this frame: {err}");
                    None
                }
            }
        } else {
            None
        };

        self.device.present(active.frame);
        self.frames_rendered += 1;

        Ok(FrameStats {
            acquire_ms: active.acquire_ms,
            upload_ms: active.upload_ms,
            record_ms,
            submit_ms,
            gpu_wait_ms,
            cpu_ms: elapsed_ms(active.started),
            draw_calls: active.draw_calls,
        })
    }

    /// Drop the frame being recorded without submitting anything.
    pub fn abandon_frame(&mut self) {
        if self.frame.take().is_some() {
            log::warn!("Abandoned the current frame");
        }
    }

    /// Draw every live pipeline in slot order as one frame.
    pub fn render_frame(&mut self) -> Result<FrameStats, EngineError> {
        self.start_frame()?;
        for id in self.pipelines.ids() {
            if let Err(err) = self.draw_pipeline(PipelineId(id)) {
                self.abandon_frame();
                return Err(err);
            }
        }
        self.end_frame()
    }

    /// Block until the GPU finished all submitted work. Returns the time
    /// waited in milliseconds.
    pub fn wait_for_gpu(&mut self) -> Result<f64, EngineError> {
        let start = Instant::now();
        self.device.wait_for_submitted_work()?;
        Ok(elapsed_ms(start))
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }
}
