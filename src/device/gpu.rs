use std::{iter, sync::Arc, time::Duration};

use anyhow::Context as _;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    config::RendererConfig,
    data_structures::texture::{self, Texture},
    device::{BufferKind, GraphicsDevice, PipelineDescriptor},
    error::EngineError,
    pipelines::layouts,
    render::RenderCommand,
};

/// How long [`GraphicsDevice::wait_for_submitted_work`] waits before giving up.
const GPU_WAIT_TIMEOUT: Duration = Duration::from_secs(3);

/// [`GraphicsDevice`] backed by a `wgpu` device rendering into a window surface.
#[derive(Debug)]
pub struct WgpuDevice {
    #[allow(unused)]
    pub(crate) window: Arc<Window>,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    depth_texture: Texture,
    default_texture: Texture,
    sampler: wgpu::Sampler,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
}

/// The surface image of one frame and the view rendered into it.
#[derive(Debug)]
pub struct WgpuFrame {
    surface_texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

impl WgpuDevice {
    pub async fn new(window: Arc<Window>, renderer: &RendererConfig) -> anyhow::Result<Self> {
        let size = window.inner_size();

        // The instance is a handle to our GPU
        // BackendBit::PRIMARY => Vulkan + Metal + DX12 + Browser WebGPU
        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("Could not create a surface for the window")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: renderer.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("No suitable GPU adapter found")?;
        log::info!("Using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("slot-ngin device"),
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features, so if
                // we're building for the web we'll have to disable some.
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                ..Default::default()
            })
            .await
            .context("Could not acquire a GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        // Shaders write linear colour and rely on an Srgb surface for the conversion.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("The surface reports no supported formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_texture =
            Texture::create_depth_texture(&device, [config.width, config.height], "depth_texture");
        let default_texture = Texture::create_default_texture(&device, &queue);
        let sampler = texture::create_default_sampler(&device);
        let uniform_layout = layouts::uniform_layout(&device, renderer.uniform_capacity as u64);
        let texture_layout = layouts::texture_layout(&device, renderer.max_textures as u32);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Render Pipeline Layout"),
            bind_group_layouts: &[Some(&uniform_layout), Some(&texture_layout)],
            ..Default::default()
        });

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            depth_texture,
            default_texture,
            sampler,
            uniform_layout,
            texture_layout,
            pipeline_layout,
        })
    }

    /// [`new`](Self::new) for callers without an async runtime.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new_blocking(window: Arc<Window>, renderer: &RendererConfig) -> anyhow::Result<Self> {
        futures::executor::block_on(Self::new(window, renderer))
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Run `create` inside a validation error scope. A captured validation
    /// error becomes an asset error instead of reaching the uncaptured-error
    /// handler.
    fn validated<T>(&self, what: &str, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T, EngineError> {
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        match futures::executor::block_on(scope.pop()) {
            None => Ok(value),
            Some(err) => {
                log::error!("{what} was rejected by the GPU: {err}");
                Err(EngineError::Asset(anyhow::anyhow!("{what} was rejected by the GPU: {err}")))
            }
        }
    }
}

impl GraphicsDevice for WgpuDevice {
    type Buffer = wgpu::Buffer;
    type Texture = Texture;
    type BindGroup = wgpu::BindGroup;
    type Pipeline = wgpu::RenderPipeline;
    type Frame = WgpuFrame;

    fn create_pipeline(&mut self, desc: &PipelineDescriptor<'_>) -> Result<Self::Pipeline, EngineError> {
        let shader = wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(desc.shader.into()),
        };
        let buffers = desc.layout.buffers();
        self.validated(&format!("Pipeline {}", desc.label), |device| {
            layouts::mk_render_pipeline(
                device,
                &self.pipeline_layout,
                self.config.format,
                Some(layouts::blend_state(desc.alpha_blending)),
                layouts::depth_format(),
                &buffers,
                shader,
                desc.label,
            )
        })
    }

    fn create_buffer(&mut self, label: &str, kind: BufferKind, contents: &[u8]) -> Self::Buffer {
        let usage = match kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
            BufferKind::Uniform => wgpu::BufferUsages::UNIFORM,
        };
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: usage | wgpu::BufferUsages::COPY_DST,
            })
    }

    fn write_buffer(&mut self, buffer: &Self::Buffer, offset: u64, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.queue.write_buffer(buffer, offset, data);
    }

    fn create_texture(&mut self, label: &str, image: &image::RgbaImage) -> Result<Self::Texture, EngineError> {
        let max = self.device.limits().max_texture_dimension_2d;
        let (width, height) = image.dimensions();
        if width > max || height > max {
            return Err(EngineError::Asset(anyhow::anyhow!(
                "{label} is {width}x{height} but the device allows at most {max}x{max}"
            )));
        }
        self.validated(label, |device| {
            Texture::from_rgba(device, &self.queue, image, Some(label))
        })
    }

    fn default_texture(&self) -> &Self::Texture {
        &self.default_texture
    }

    fn create_uniform_bind_group(&mut self, label: &str, buffer: &Self::Buffer) -> Self::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some(label),
        })
    }

    fn create_texture_bind_group(&mut self, label: &str, textures: &[&Self::Texture]) -> Self::BindGroup {
        let sampler = wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        };
        let views = textures
            .iter()
            .enumerate()
            .map(|(slot, texture)| wgpu::BindGroupEntry {
                binding: slot as u32 + 1,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
        let entries: Vec<_> = iter::once(sampler).chain(views).collect();

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.texture_layout,
            entries: &entries,
            label: Some(label),
        })
    }

    fn acquire_frame(&mut self) -> Result<Self::Frame, EngineError> {
        let surface_texture = match self.surface.get_current_texture() {
            wgpu::CurrentSurfaceTexture::Success(surface_texture) => surface_texture,
            wgpu::CurrentSurfaceTexture::Suboptimal(surface_texture) => {
                // Still drawable; the next frame gets a matching swapchain.
                self.surface.configure(&self.device, &self.config);
                surface_texture
            }
            wgpu::CurrentSurfaceTexture::Timeout => {
                return Err(EngineError::SurfaceUnavailable("timeout".to_string()));
            }
            wgpu::CurrentSurfaceTexture::Occluded => {
                return Err(EngineError::SurfaceUnavailable("window is occluded".to_string()));
            }
            wgpu::CurrentSurfaceTexture::Outdated | wgpu::CurrentSurfaceTexture::Lost => {
                self.surface.configure(&self.device, &self.config);
                return Err(EngineError::SurfaceUnavailable("surface is outdated".to_string()));
            }
            wgpu::CurrentSurfaceTexture::Validation => {
                return Err(EngineError::SurfaceUnavailable("surface validation error".to_string()));
            }
        };
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuFrame {
            surface_texture,
            view,
        })
    }

    fn submit(&mut self, frame: &Self::Frame, commands: &[RenderCommand<Self>], clear_colour: wgpu::Color) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            for command in commands {
                match command {
                    RenderCommand::SetViewport(viewport) => render_pass.set_viewport(
                        viewport.x,
                        viewport.y,
                        viewport.width,
                        viewport.height,
                        0.0,
                        1.0,
                    ),
                    RenderCommand::SetPipeline(pipeline) => render_pass.set_pipeline(pipeline),
                    RenderCommand::SetBindGroup { index, bind_group } => {
                        render_pass.set_bind_group(*index, bind_group, &[])
                    }
                    RenderCommand::SetVertexBuffer { slot, buffer } => {
                        render_pass.set_vertex_buffer(*slot, buffer.slice(..))
                    }
                    RenderCommand::SetIndexBuffer(buffer) => {
                        render_pass.set_index_buffer(buffer.slice(..), wgpu::IndexFormat::Uint32)
                    }
                    RenderCommand::DrawIndexed { indices, instances } => {
                        render_pass.draw_indexed(indices.clone(), 0, instances.clone())
                    }
                }
            }
        }
        self.queue.submit(iter::once(encoder.finish()));
    }

    fn wait_for_submitted_work(&mut self) -> Result<(), EngineError> {
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        self.queue.on_submitted_work_done(move || {
            // The receiver only disappears when the wait below already failed.
            let _ = tx.send(());
        });
        #[cfg(target_arch = "wasm32")]
        {
            self.device
                .poll(wgpu::PollType::Poll)
                .map_err(|err| EngineError::Device(err.to_string()))?;
            // The browser resolves the queue asynchronously; blocking here would deadlock.
            drop(rx);
            Ok(())
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            self.device
                .poll(wgpu::PollType::Wait {
                    submission_index: None,
                    timeout: Some(GPU_WAIT_TIMEOUT),
                })
                .map_err(|err| EngineError::Device(err.to_string()))?;
            futures::executor::block_on(rx.receive())
                .ok_or_else(|| EngineError::Device("work-done signal was dropped".to_string()))
        }
    }

    fn present(&mut self, frame: Self::Frame) {
        let WgpuFrame {
            surface_texture,
            view,
        } = frame;
        drop(view);
        surface_texture.present();
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.depth_texture =
            Texture::create_depth_texture(&self.device, [width, height], "depth_texture");
    }

    fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}
