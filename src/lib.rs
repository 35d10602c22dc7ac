//! slot-ngin
//!
//! A small instancing-oriented rendering core for native and WASM targets.
//! Pipelines, meshes and textures live in fixed-capacity slot tables owned by
//! one explicit [`Context`]; each pipeline carries its own uniform block that
//! is packed on the CPU and uploaded wholesale whenever the pipeline is drawn.
//! A frame is recorded as a plain command list and replayed into a single
//! render pass, which also lets the whole engine run against a recording
//! [`HeadlessDevice`](device::HeadlessDevice) without a GPU.
//!
//! High-level modules
//! - `config`: capacities and frame options ([`RendererConfig`])
//! - `context`: the engine context that owns the device and all slot tables
//! - `data_structures`: slot arena, uniform blocks, vertex formats, textures
//! - `device`: the [`GraphicsDevice`](device::GraphicsDevice) seam and its wgpu/headless backends
//! - `error`: [`EngineError`] and its [`ErrorKind`] classification
//! - `pipelines`: pipeline options, vertex layouts and the built-in shaders
//! - `platform`: file mapping, clock and input services of the host
//! - `render`: frame orchestration (start, draw per pipeline, end)
//! - `resources`: creation of pipelines, meshes, textures and uniforms
//!

pub mod config;
pub mod context;
pub mod data_structures;
pub mod device;
pub mod error;
pub mod pipelines;
pub mod platform;
pub mod render;
pub mod resources;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use config::RendererConfig;
pub use context::Context;
pub use data_structures::slots::{MeshId, PipelineId};
pub use error::{EngineError, ErrorKind};
pub use pipelines::{PipelineOptions, ShaderSource, VertexLayout};
pub use render::{FrameStats, Viewport};
pub use resources::{mesh::MeshSource, texture::TextureSource};
pub use wgpu;
pub use winit;

/// Install the logger: `env_logger` natively (configure with `RUST_LOG`),
/// the browser console on wasm32. Calling it more than once is harmless.
pub fn init_logger() {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            log::debug!("Logger already initialised: {e}");
        }
    }
    #[cfg(target_arch = "wasm32")]
    {
        std::panic::set_hook(Box::new(|info| log::error!("{info}")));
        if console_log::init_with_level(log::Level::Info).is_err() {
            log::debug!("Logger already initialised");
        }
    }
}
