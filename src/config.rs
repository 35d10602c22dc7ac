//! Renderer configuration.
//!
//! [`RendererConfig`] fixes every capacity the engine allocates up front
//! (slot tables, uniform blocks, texture slots) together with a few frame
//! options. Start from `Default` and override with the builder methods:
//!
//! ```
//! use slot_ngin::config::RendererConfig;
//!
//! let config = RendererConfig::default()
//!     .with_max_pipelines(4)
//!     .with_gpu_timing(true);
//! assert!(config.validate().is_ok());
//! ```

use crate::{data_structures::uniforms::DEFAULT_UNIFORM_CAPACITY, error::EngineError, render::Viewport};

/// Largest uniform block a pipeline may own (the WebGL2 uniform block limit).
pub const MAX_UNIFORM_CAPACITY: usize = 16 * 1024;
/// Upper bound for texture slots per pipeline, the default WGPU limit of
/// sampled textures per shader stage.
pub const MAX_TEXTURE_SLOTS: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    pub max_pipelines: usize,
    pub max_meshes: usize,
    /// Size in bytes of every pipeline's uniform block. Multiple of 16.
    pub uniform_capacity: usize,
    /// Texture slots per pipeline (bindings 1..=N of bind group 1).
    pub max_textures: usize,
    /// Block after each submit until the GPU finished the frame and report
    /// the wait in [`FrameStats::gpu_wait_ms`](crate::render::FrameStats::gpu_wait_ms).
    pub gpu_timing: bool,
    pub clear_colour: wgpu::Color,
    pub viewport: Option<Viewport>,
    pub power_preference: wgpu::PowerPreference,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_pipelines: 8,
            max_meshes: 1024,
            uniform_capacity: DEFAULT_UNIFORM_CAPACITY,
            max_textures: 4,
            gpu_timing: false,
            clear_colour: wgpu::Color {
                r: 0.1,
                g: 0.2,
                b: 0.3,
                a: 1.0,
            },
            viewport: None,
            power_preference: wgpu::PowerPreference::default(),
        }
    }
}

impl RendererConfig {
    pub fn with_max_pipelines(mut self, max_pipelines: usize) -> Self {
        self.max_pipelines = max_pipelines;
        self
    }

    pub fn with_max_meshes(mut self, max_meshes: usize) -> Self {
        self.max_meshes = max_meshes;
        self
    }

    pub fn with_uniform_capacity(mut self, uniform_capacity: usize) -> Self {
        self.uniform_capacity = uniform_capacity;
        self
    }

    pub fn with_max_textures(mut self, max_textures: usize) -> Self {
        self.max_textures = max_textures;
        self
    }

    pub fn with_gpu_timing(mut self, gpu_timing: bool) -> Self {
        self.gpu_timing = gpu_timing;
        self
    }

    pub fn with_clear_colour(mut self, clear_colour: wgpu::Color) -> Self {
        self.clear_colour = clear_colour;
        self
    }

    pub fn with_viewport(mut self, viewport: Option<Viewport>) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn with_power_preference(mut self, power_preference: wgpu::PowerPreference) -> Self {
        self.power_preference = power_preference;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_pipelines == 0 || self.max_pipelines > u32::MAX as usize {
            return Err(EngineError::InvalidConfig(format!(
                "max_pipelines must be positive, got {}",
                self.max_pipelines
            )));
        }
        if self.max_meshes == 0 || self.max_meshes > u32::MAX as usize {
            return Err(EngineError::InvalidConfig(format!(
                "max_meshes must be positive, got {}",
                self.max_meshes
            )));
        }
        if self.uniform_capacity == 0
            || self.uniform_capacity % 16 != 0
            || self.uniform_capacity > MAX_UNIFORM_CAPACITY
        {
            return Err(EngineError::InvalidConfig(format!(
                "uniform_capacity must be a non-zero multiple of 16 up to {MAX_UNIFORM_CAPACITY}, got {}",
                self.uniform_capacity
            )));
        }
        if !(1..=MAX_TEXTURE_SLOTS).contains(&self.max_textures) {
            return Err(EngineError::InvalidConfig(format!(
                "max_textures must be within 1..={MAX_TEXTURE_SLOTS}, got {}",
                self.max_textures
            )));
        }
        if let Some(viewport) = self.viewport {
            viewport.validate()?;
        }
        Ok(())
    }
}
