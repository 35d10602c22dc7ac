//! Texture decoding and per-pipeline texture slots.
//!
//! A pipeline has a fixed number of texture slots (bindings 1..=N of bind
//! group 1). Unused slots are filled with the device's default texture, so
//! the bind group always has the same shape and can be rebuilt wholesale
//! whenever a texture is added.

use std::path::Path;

use anyhow::Context as _;
use image::ImageFormat;

use crate::{
    context::Context,
    data_structures::slots::{PipelineId, SlotKind},
    device::GraphicsDevice,
    error::EngineError,
    resources::load_binary_blocking,
};

/// Size of the `{width: i32, height: i32}` header of the binary texture format.
pub const BINARY_TEXTURE_HEADER_LEN: usize = 8;

/// Where a texture's pixels come from.
#[derive(Debug, Clone, Copy)]
pub enum TextureSource<'a> {
    /// Tightly packed RGBA8 rows.
    Rgba {
        width: u32,
        height: u32,
        pixels: &'a [u8],
    },
    /// The engine's binary texture format: little-endian `i32` width and
    /// height followed by RGBA8 pixels.
    Binary(&'a [u8]),
    /// Any image file format the `image` crate understands. Without a format
    /// hint the format is guessed from the bytes.
    Encoded {
        bytes: &'a [u8],
        format: Option<&'a str>,
    },
    /// A file: `.tex` files are read as the binary format, everything else is
    /// decoded by extension.
    File(&'a Path),
}

impl TextureSource<'_> {
    pub fn decode(&self) -> anyhow::Result<image::RgbaImage> {
        match *self {
            TextureSource::Rgba {
                width,
                height,
                pixels,
            } => rgba_image(width, height, pixels),
            TextureSource::Binary(bytes) => parse_binary_texture(bytes),
            TextureSource::Encoded { bytes, format } => decode_encoded(bytes, format),
            TextureSource::File(path) => {
                let bytes = load_binary_blocking(path)?;
                let extension = path.extension().and_then(|ext| ext.to_str());
                let decoded = match extension {
                    Some("tex") => parse_binary_texture(&bytes),
                    _ => decode_encoded(&bytes, extension),
                };
                decoded.with_context(|| format!("Could not decode {}", path.display()))
            }
        }
    }

    pub fn name(&self) -> String {
        match self {
            TextureSource::Rgba { width, height, .. } => format!("<rgba {width}x{height}>"),
            TextureSource::Binary(bytes) => format!("<binary texture, {} bytes>", bytes.len()),
            TextureSource::Encoded { format, .. } => {
                format!("<encoded {}>", format.unwrap_or("image"))
            }
            TextureSource::File(path) => path.display().to_string(),
        }
    }
}

fn rgba_image(width: u32, height: u32, pixels: &[u8]) -> anyhow::Result<image::RgbaImage> {
    if width == 0 || height == 0 {
        anyhow::bail!("Texture has an empty size of {width}x{height}");
    }
    let expected = width as usize * height as usize * 4;
    if pixels.len() != expected {
        anyhow::bail!(
            "A {width}x{height} RGBA texture needs {expected} bytes but got {}",
            pixels.len()
        );
    }
    image::RgbaImage::from_raw(width, height, pixels.to_vec())
        .context("Pixel buffer does not match the texture size")
}

/// Read the engine's binary texture format.
pub fn parse_binary_texture(bytes: &[u8]) -> anyhow::Result<image::RgbaImage> {
    let Some((header, pixels)) = bytes.split_first_chunk::<BINARY_TEXTURE_HEADER_LEN>() else {
        anyhow::bail!("Binary texture of {} bytes is shorter than its header", bytes.len());
    };
    let width = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let height = i32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if width <= 0 || height <= 0 {
        anyhow::bail!("Binary texture has an invalid size of {width}x{height}");
    }
    rgba_image(width as u32, height as u32, pixels)
}

fn decode_encoded(bytes: &[u8], format: Option<&str>) -> anyhow::Result<image::RgbaImage> {
    let img = match format {
        None => image::load_from_memory(bytes)?,
        Some(fmt) => {
            let format = ImageFormat::from_extension(fmt)
                .with_context(|| format!("Unknown image format {fmt}"))?;
            image::load_from_memory_with_format(bytes, format)?
        }
    };
    let rgba = img.to_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        anyhow::bail!("Decoded image is empty");
    }
    Ok(rgba)
}

/// Bind `textures` to the first slots and the default texture to the rest.
pub(crate) fn texture_bind_group<D: GraphicsDevice>(
    device: &mut D,
    label: &str,
    textures: &[D::Texture],
    slots: usize,
) -> D::BindGroup {
    let default = device.default_texture().clone();
    let bound: Vec<&D::Texture> = (0..slots)
        .map(|slot| textures.get(slot).unwrap_or(&default))
        .collect();
    device.create_texture_bind_group(&format!("{label} texture bind group"), &bound)
}

impl<D: GraphicsDevice> Context<D> {
    /// Decode and upload a texture into the next free slot of `pipeline`.
    ///
    /// Returns the slot index (0 for binding 1). When every slot is taken
    /// the call fails before decoding and the bound textures stay as they are.
    pub fn add_texture(&mut self, pipeline: PipelineId, source: TextureSource<'_>) -> Result<usize, EngineError> {
        let max = self.config.max_textures;
        let record = self.pipeline_record(pipeline)?;
        let slot = record.textures.len();
        if slot >= max {
            log::warn!("Cannot add {} to {pipeline}: all {max} texture slots are taken", source.name());
            return Err(EngineError::TextureSlotsFull {
                pipeline: pipeline.0,
                max,
            });
        }
        let label = format!("{} texture {slot}", record.label);

        let image = source
            .decode()
            .inspect_err(|err| log::error!("Could not load texture {}: {err:#}", source.name()))?;
        let texture = self
            .device
            .create_texture(&label, &image)
            .inspect_err(|err| log::error!("Could not upload texture {}: {err:#}", source.name()))?;
        self.pipeline_record_mut(pipeline)?.textures.push(texture);
        self.rebuild_texture_bindings(pipeline)?;

        log::info!(
            "Added {}x{} texture {} to {pipeline} in slot {slot}",
            image.width(),
            image.height(),
            source.name()
        );
        Ok(slot)
    }

    /// Rebuild bind group 1 of `pipeline` from its current textures.
    pub fn rebuild_texture_bindings(&mut self, pipeline: PipelineId) -> Result<(), EngineError> {
        let slots = self.config.max_textures;
        let record = self
            .pipelines
            .get_mut(pipeline.0)
            .ok_or(EngineError::InvalidId {
                kind: SlotKind::Pipeline,
                id: pipeline.0,
            })?;
        record.texture_bind_group =
            texture_bind_group(&mut self.device, &record.label, &record.textures, slots);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_texture(width: i32, height: i32, pixels: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes.extend_from_slice(pixels);
        bytes
    }

    #[test]
    fn parses_binary_texture() {
        let pixels: Vec<u8> = (0..16).collect();
        let image = parse_binary_texture(&binary_texture(2, 2, &pixels)).unwrap();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(1, 0).0, [4, 5, 6, 7]);
    }

    #[test]
    fn rejects_truncated_binary_texture() {
        assert!(parse_binary_texture(&[1, 0, 0]).is_err());
        let err = parse_binary_texture(&binary_texture(2, 2, &[0; 12])).unwrap_err();
        assert!(err.to_string().contains("needs 16 bytes"));
    }

    #[test]
    fn rejects_negative_binary_dimensions() {
        assert!(parse_binary_texture(&binary_texture(-1, 2, &[])).is_err());
        assert!(parse_binary_texture(&binary_texture(0, 0, &[])).is_err());
    }

    #[test]
    fn decodes_encoded_png() {
        let image = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(image)
            .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let decoded = TextureSource::Encoded {
            bytes: &png,
            format: Some("png"),
        }
        .decode()
        .unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(2, 1).0, [10, 20, 30, 255]);
    }

    #[test]
    fn unknown_format_hint_is_an_error() {
        let source = TextureSource::Encoded {
            bytes: &[0, 1, 2],
            format: Some("nope"),
        };
        assert!(source.decode().is_err());
    }

    #[test]
    fn raw_rgba_must_match_dimensions() {
        let source = TextureSource::Rgba {
            width: 2,
            height: 1,
            pixels: &[0; 4],
        };
        assert!(source.decode().is_err());
    }
}
