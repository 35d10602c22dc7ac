//! Resource creation: pipelines, meshes, textures and uniforms.
//!
//! All GPU resources are created through the [`Context`] and live in its
//! fixed-capacity slot tables. Creating a pipeline reserves its slot first and
//! gives it back if the shader cannot be loaded, so a failed creation never
//! leaks capacity.
//!
//! The async [`load_string`] / [`load_binary`] helpers read from `./assets`
//! natively and from `<origin>/assets` in the browser, for callers that want
//! to preload files before handing their contents to the context.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::{
    context::Context,
    data_structures::{
        slots::{MeshId, PipelineId, SlotKind},
        uniforms::UniformBlock,
    },
    device::{BufferKind, GraphicsDevice, PipelineDescriptor},
    error::EngineError,
    pipelines::{PipelineOptions, PipelineRecord, ShaderSource},
};

pub mod mesh;
pub mod texture;

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    let window = web_sys::window().context("No browser window available")?;
    let origin = window
        .location()
        .origin()
        .map_err(|_| anyhow::anyhow!("Could not read the page origin"))?;
    let base = reqwest::Url::parse(&format!("{origin}/assets/"))?;
    Ok(base.join(file_name)?)
}

/// Where native builds look for `file_name`.
pub fn asset_path(file_name: &str) -> PathBuf {
    Path::new("./").join("assets").join(file_name)
}

pub async fn load_string(file_name: &str) -> anyhow::Result<String> {
    #[cfg(target_arch = "wasm32")]
    let txt = {
        let url = format_url(file_name)?;
        reqwest::get(url).await?.text().await?
    };
    #[cfg(not(target_arch = "wasm32"))]
    let txt = {
        let path = asset_path(file_name);
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Could not read {}", path.display()))?
    };

    Ok(txt)
}

pub async fn load_binary(file_name: &str) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(file_name)?;
        reqwest::get(url).await?.bytes().await?.to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        let path = asset_path(file_name);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Could not read {}", path.display()))?
    };

    Ok(data)
}

/// Blocking read of a file path as given (no `assets` prefix).
pub fn load_binary_blocking(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Could not read {}", path.display()))
}

/// Blocking UTF-8 read of a file path as given (no `assets` prefix).
pub fn load_string_blocking(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))
}

fn check_entry_points(source: &str) -> anyhow::Result<()> {
    for entry_point in ["vs_main", "fs_main"] {
        if !source.contains(&format!("fn {entry_point}")) {
            anyhow::bail!("Shader has no `{entry_point}` entry point");
        }
    }
    Ok(())
}

impl<D: GraphicsDevice> Context<D> {
    /// Compile a pipeline and give it an empty uniform block and texture set.
    ///
    /// # Arguments
    ///
    /// * `label` names the pipeline in logs and GPU debug labels
    /// * `shader` is inline WGSL or a file; a missing, unreadable or empty
    ///   shader fails with an asset error and frees the slot again
    /// * `options` picks vertex layout, blending and instance upload policy
    pub fn create_pipeline(
        &mut self,
        label: &str,
        shader: ShaderSource,
        options: PipelineOptions,
    ) -> Result<PipelineId, EngineError> {
        let slot = self
            .pipelines
            .reserve()
            .inspect_err(|err| log::error!("Cannot create pipeline {label}: {err}"))?;
        match self.build_pipeline(label, &shader, options) {
            Ok(record) => {
                self.pipelines.fill(slot, record);
                log::info!("Created pipeline {label} in slot {slot}");
                Ok(PipelineId(slot))
            }
            Err(err) => {
                self.pipelines.release(slot);
                log::error!("Could not create pipeline {label} from {}: {err}", shader.name());
                Err(err)
            }
        }
    }

    fn build_pipeline(
        &mut self,
        label: &str,
        shader: &ShaderSource,
        options: PipelineOptions,
    ) -> Result<PipelineRecord<D>, EngineError> {
        let source = shader.load()?;
        check_entry_points(&source)?;
        let pipeline = self.device.create_pipeline(&PipelineDescriptor {
            label,
            shader: &source,
            layout: options.layout,
            alpha_blending: options.alpha_blending,
        })?;

        let uniforms = UniformBlock::new(self.config.uniform_capacity);
        let uniform_buffer = self.device.create_buffer(
            &format!("{label} uniform buffer"),
            BufferKind::Uniform,
            uniforms.as_bytes(),
        );
        let uniform_bind_group = self
            .device
            .create_uniform_bind_group(&format!("{label} uniform bind group"), &uniform_buffer);
        let texture_bind_group =
            texture::texture_bind_group(&mut self.device, label, &[], self.config.max_textures);

        Ok(PipelineRecord {
            label: label.to_string(),
            pipeline,
            options,
            uniforms,
            uniform_buffer,
            uniform_bind_group,
            textures: Vec::new(),
            texture_bind_group,
            meshes: Vec::new(),
        })
    }

    /// Release a pipeline slot. Fails while the pipeline still owns meshes.
    pub fn destroy_pipeline(&mut self, id: PipelineId) -> Result<(), EngineError> {
        let record = self.pipeline_record(id)?;
        if !record.meshes.is_empty() {
            return Err(EngineError::PipelineInUse {
                pipeline: id.0,
                meshes: record.meshes.len(),
            });
        }
        if let Some(record) = self.pipelines.release(id.0) {
            log::info!("Destroyed pipeline {}", record.label);
        }
        Ok(())
    }

    /// Release a mesh slot and remove the mesh from its pipeline.
    pub fn destroy_mesh(&mut self, id: MeshId) -> Result<(), EngineError> {
        let record = self.meshes.release(id.0).ok_or(EngineError::InvalidId {
            kind: SlotKind::Mesh,
            id: id.0,
        })?;
        if let Some(pipeline) = self.pipelines.get_mut(record.pipeline.0) {
            pipeline.meshes.retain(|mesh| *mesh != id);
        }
        log::info!("Destroyed {id}");
        Ok(())
    }

    /// Append `bytes` to the pipeline's uniform block and return their offset.
    ///
    /// Values of up to 4 bytes are 4-aligned, up to 8 bytes 8-aligned and
    /// everything larger 16-aligned. Fails without changing the block when
    /// the value does not fit.
    pub fn add_uniform(&mut self, pipeline: PipelineId, bytes: &[u8]) -> Result<usize, EngineError> {
        self.pipeline_record_mut(pipeline)?
            .uniforms
            .register(bytes)
            .inspect_err(|err| log::warn!("Cannot add uniform to {pipeline}: {err}"))
    }

    pub fn add_uniform_value<T: bytemuck::Pod>(
        &mut self,
        pipeline: PipelineId,
        value: &T,
    ) -> Result<usize, EngineError> {
        self.add_uniform(pipeline, bytemuck::bytes_of(value))
    }

    /// Overwrite a registered uniform. The change reaches the GPU with the
    /// next draw of the pipeline.
    pub fn set_uniform(&mut self, pipeline: PipelineId, offset: usize, bytes: &[u8]) -> Result<(), EngineError> {
        self.pipeline_record_mut(pipeline)?.uniforms.update(offset, bytes)
    }

    pub fn set_uniform_value<T: bytemuck::Pod>(
        &mut self,
        pipeline: PipelineId,
        offset: usize,
        value: &T,
    ) -> Result<(), EngineError> {
        self.set_uniform(pipeline, offset, bytemuck::bytes_of(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_points_are_required() {
        assert!(check_entry_points("fn vs_main() {} fn fs_main() {}").is_ok());
        let err = check_entry_points("fn vs_main() {}").unwrap_err();
        assert!(err.to_string().contains("fs_main"));
    }

    #[test]
    fn asset_paths_live_under_assets() {
        assert_eq!(asset_path("cube.mesh"), Path::new("./assets/cube.mesh"));
    }

    #[test]
    fn blocking_string_load_names_the_file() {
        let path = std::env::temp_dir().join(format!("slot-ngin-text-{}.wgsl", std::process::id()));
        std::fs::write(&path, "fn vs_main() {}").unwrap();
        assert_eq!(load_string_blocking(&path).unwrap(), "fn vs_main() {}");
        std::fs::remove_file(&path).unwrap();

        let err = load_string_blocking(&path).unwrap_err();
        assert!(format!("{err:#}").contains(&path.display().to_string()));
    }

    #[tokio::test]
    async fn missing_assets_name_the_file() {
        let err = load_binary("definitely-missing.bin").await.unwrap_err();
        assert!(format!("{err:#}").contains("definitely-missing.bin"));
    }
}
