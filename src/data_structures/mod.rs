//! Engine data models: slot tables, uniform blocks, vertex formats and textures.

pub mod model;
pub mod slots;
pub mod texture;
pub mod uniforms;
