//! Per-pipeline uniform shadow buffer.
//!
//! Each pipeline owns one [`UniformBlock`]: a fixed-size CPU byte buffer that
//! mirrors the pipeline's GPU uniform buffer. Values are registered once with
//! a bump allocator and later overwritten in place; the whole block is
//! uploaded every time the pipeline is drawn.

use crate::error::EngineError;

/// Default uniform block size in bytes.
pub const DEFAULT_UNIFORM_CAPACITY: usize = 1024;

/// Alignment class of a uniform value: 4 bytes for scalars, 8 for two-component
/// vectors and 16 for everything larger.
pub fn uniform_alignment(size: usize) -> usize {
    match size {
        0..=4 => 4,
        5..=8 => 8,
        _ => 16,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlock {
    data: Vec<u8>,
    cursor: usize,
}

impl UniformBlock {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// End of the last registered value. Everything past it is unused.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The full shadow buffer, including never-registered trailing bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Appends `bytes` at the next offset aligned for their size.
    ///
    /// Returns the offset to pass to [`update`](Self::update) later. Fails
    /// without touching the buffer when the value would not fit.
    pub fn register(&mut self, bytes: &[u8]) -> Result<usize, EngineError> {
        let size = bytes.len();
        let align = uniform_alignment(size);
        let offset = (self.cursor + align - 1) & !(align - 1);
        let end = offset
            .checked_add(size)
            .filter(|end| *end <= self.capacity())
            .ok_or(EngineError::UniformCapacity {
                offset,
                size,
                capacity: self.capacity(),
            })?;
        self.data[offset..end].copy_from_slice(bytes);
        self.cursor = end;
        Ok(offset)
    }

    /// Overwrites a previously registered region.
    pub fn update(&mut self, offset: usize, bytes: &[u8]) -> Result<(), EngineError> {
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= self.cursor)
            .ok_or(EngineError::UniformOutOfRange {
                offset,
                end: offset.saturating_add(bytes.len()),
                registered: self.cursor,
            })?;
        self.data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    pub fn register_value<T: bytemuck::Pod>(&mut self, value: &T) -> Result<usize, EngineError> {
        self.register(bytemuck::bytes_of(value))
    }

    pub fn update_value<T: bytemuck::Pod>(
        &mut self,
        offset: usize,
        value: &T,
    ) -> Result<(), EngineError> {
        self.update(offset, bytemuck::bytes_of(value))
    }
}

impl Default for UniformBlock {
    fn default() -> Self {
        Self::new(DEFAULT_UNIFORM_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_then_vec4_lands_on_sixteen() {
        let mut block = UniformBlock::default();
        let a = block.register_value(&1.5f32).unwrap();
        let b = block.register_value(&[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 16);
        assert_eq!(block.cursor(), 32);
        assert_eq!(&block.as_bytes()[16..20], &1.0f32.to_le_bytes());
    }

    #[test]
    fn offsets_are_monotonic_and_aligned() {
        let mut block = UniformBlock::new(256);
        let sizes = [4usize, 8, 4, 12, 64, 2, 8, 16, 1];
        let mut previous = 0;
        for size in sizes {
            let offset = block.register(&vec![0xAB; size]).unwrap();
            assert!(offset >= previous);
            assert_eq!(offset % uniform_alignment(size), 0);
            previous = offset + size;
        }
        assert_eq!(block.cursor(), previous);
    }

    #[test]
    fn alignment_classes() {
        assert_eq!(uniform_alignment(1), 4);
        assert_eq!(uniform_alignment(4), 4);
        assert_eq!(uniform_alignment(6), 8);
        assert_eq!(uniform_alignment(8), 8);
        assert_eq!(uniform_alignment(12), 16);
        assert_eq!(uniform_alignment(64), 16);
    }

    #[test]
    fn overflow_leaves_block_untouched() {
        let mut block = UniformBlock::new(32);
        block.register(&[1; 16]).unwrap();
        block.register(&[2; 12]).unwrap();
        let before = block.clone();

        let err = block.register(&[3; 8]).unwrap_err();
        assert!(matches!(
            err,
            EngineError::UniformCapacity {
                offset: 32,
                size: 8,
                capacity: 32
            }
        ));
        assert_eq!(block, before);
    }

    #[test]
    fn value_filling_the_block_exactly_fits() {
        let mut block = UniformBlock::new(64);
        block.register(&[0; 4]).unwrap();
        assert_eq!(block.register(&[7; 48]).unwrap(), 16);
        assert_eq!(block.cursor(), 64);
        assert!(block.register(&[0; 1]).is_err());
    }

    #[test]
    fn update_rewrites_in_place() {
        let mut block = UniformBlock::default();
        let offset = block.register_value(&[0u32; 4]).unwrap();
        block.update_value(offset + 4, &9u32).unwrap();
        assert_eq!(&block.as_bytes()[4..8], &9u32.to_le_bytes());
        assert_eq!(block.cursor(), 16);
    }

    #[test]
    fn update_past_cursor_is_rejected() {
        let mut block = UniformBlock::default();
        block.register_value(&0f32).unwrap();
        let err = block.update_value(4, &1f32).unwrap_err();
        assert!(matches!(
            err,
            EngineError::UniformOutOfRange {
                offset: 4,
                end: 8,
                registered: 4
            }
        ));
        assert!(block.update(0, &[0; 8]).is_err());
    }
}
