//! Engine error type.
//!
//! Every fallible engine operation returns [`EngineError`]. Errors are grouped
//! into four [`ErrorKind`]s so callers can decide whether to skip a frame,
//! report a broken asset or fix their own code without matching on every
//! variant.

use crate::data_structures::slots::{SlotId, SlotKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A fixed-capacity table or buffer is full.
    Capacity,
    /// A shader, texture or mesh could not be loaded or parsed.
    Asset,
    /// The surface or device is temporarily unusable. Skip the frame and retry.
    Transient,
    /// The caller passed a bad id or called an operation in the wrong state.
    Usage,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no free {kind} slot left (capacity {capacity})")]
    SlotsExhausted { kind: SlotKind, capacity: usize },

    #[error("uniform block full: {size} bytes at offset {offset} exceed the capacity of {capacity} bytes")]
    UniformCapacity {
        offset: usize,
        size: usize,
        capacity: usize,
    },

    #[error("uniform update {offset}..{end} is outside the registered range 0..{registered}")]
    UniformOutOfRange {
        offset: usize,
        end: usize,
        registered: usize,
    },

    #[error("all {max} texture slots of pipeline {pipeline} are taken")]
    TextureSlotsFull { pipeline: SlotId, max: usize },

    #[error("{requested} bytes of instance data exceed the {capacity} byte instance buffer of mesh {mesh}")]
    InstanceCapacity {
        mesh: SlotId,
        requested: usize,
        capacity: usize,
    },

    #[error("invalid {kind} id {id}")]
    InvalidId { kind: SlotKind, id: SlotId },

    #[error("pipeline {pipeline} still owns {meshes} mesh(es)")]
    PipelineInUse { pipeline: SlotId, meshes: usize },

    #[error("{what} of {len} bytes is not a multiple of the {stride} byte stride")]
    StrideMismatch {
        what: &'static str,
        len: usize,
        stride: usize,
    },

    #[error("invalid bone data: {0}")]
    BoneData(String),

    #[error("a frame is already being recorded")]
    FrameInProgress,

    #[error("no frame is being recorded")]
    NoActiveFrame,

    #[error("surface unavailable: {0}")]
    SurfaceUnavailable(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("asset error: {0:#}")]
    Asset(#[from] anyhow::Error),

    #[error("malformed asset: {0}")]
    MalformedAsset(String),

    #[error("invalid renderer configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::SlotsExhausted { .. }
            | EngineError::UniformCapacity { .. }
            | EngineError::TextureSlotsFull { .. }
            | EngineError::InstanceCapacity { .. } => ErrorKind::Capacity,
            EngineError::Asset(_) | EngineError::MalformedAsset(_) => ErrorKind::Asset,
            EngineError::SurfaceUnavailable(_) | EngineError::Device(_) => ErrorKind::Transient,
            EngineError::UniformOutOfRange { .. }
            | EngineError::InvalidId { .. }
            | EngineError::PipelineInUse { .. }
            | EngineError::StrideMismatch { .. }
            | EngineError::BoneData(_)
            | EngineError::FrameInProgress
            | EngineError::NoActiveFrame
            | EngineError::InvalidConfig(_) => ErrorKind::Usage,
        }
    }

    /// True when retrying on the next frame may succeed.
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_errors_are_recoverable() {
        let err = EngineError::SurfaceUnavailable("timeout".into());
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.is_recoverable());
    }

    #[test]
    fn asset_errors_keep_their_context_chain() {
        let inner = anyhow::anyhow!("file not found").context("loading shader.wgsl");
        let err = EngineError::from(inner);
        assert_eq!(err.kind(), ErrorKind::Asset);
        assert!(!err.is_recoverable());
        let message = err.to_string();
        assert!(message.contains("loading shader.wgsl"));
        assert!(message.contains("file not found"));
    }

    #[test]
    fn capacity_errors_are_classified() {
        let err = EngineError::UniformCapacity {
            offset: 1024,
            size: 4,
            capacity: 1024,
        };
        assert_eq!(err.kind(), ErrorKind::Capacity);
    }
}
