//! Services the engine needs from the host: file access, a clock, sleeping
//! and input polling.
//!
//! The window and event loop stay with the application; [`Platform`] is the
//! narrow interface the engine and the game loop use instead.

use std::{
    ops::Deref,
    path::{Path, PathBuf},
};

use instant::Instant;

use crate::resources::load_binary_blocking;

/// The complete contents of a file, released with [`Platform::unmap_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedFile {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl MappedFile {
    pub fn new(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Deref for MappedFile {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

pub trait Platform {
    fn map_file(&self, path: &Path) -> anyhow::Result<MappedFile>;

    fn unmap_file(&self, file: MappedFile) {
        drop(file);
    }

    /// Milliseconds since the platform was created.
    fn current_time_ms(&self) -> f64;

    fn sleep_ms(&self, ms: f64);

    /// Process pending input. Returns `false` once the user asked to quit.
    fn poll_inputs(&mut self) -> bool;
}

/// [`Platform`] for native builds. Relative paths are resolved against `root`.
#[derive(Debug)]
pub struct DesktopPlatform {
    root: PathBuf,
    started: Instant,
    quit_requested: bool,
}

impl DesktopPlatform {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            started: Instant::now(),
            quit_requested: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Make the next [`poll_inputs`](Platform::poll_inputs) report a quit,
    /// e.g. from a window close event.
    pub fn request_quit(&mut self) {
        self.quit_requested = true;
    }
}

impl Default for DesktopPlatform {
    fn default() -> Self {
        Self::new(Path::new("./").join("assets"))
    }
}

impl Platform for DesktopPlatform {
    fn map_file(&self, path: &Path) -> anyhow::Result<MappedFile> {
        let full_path = self.root.join(path);
        let bytes = load_binary_blocking(&full_path)?;
        log::debug!("Mapped {} ({} bytes)", full_path.display(), bytes.len());
        Ok(MappedFile::new(full_path, bytes))
    }

    fn current_time_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    fn sleep_ms(&self, ms: f64) {
        if ms > 0.0 {
            std::thread::sleep(std::time::Duration::from_secs_f64(ms / 1000.0));
        }
    }

    fn poll_inputs(&mut self) -> bool {
        !self.quit_requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_files_relative_to_root() {
        let dir = std::env::temp_dir().join(format!("slot-ngin-platform-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("data.bin"), [1u8, 2, 3]).unwrap();

        let platform = DesktopPlatform::new(&dir);
        let file = platform.map_file(Path::new("data.bin")).unwrap();
        assert_eq!(&*file, &[1, 2, 3]);
        assert_eq!(file.path(), dir.join("data.bin"));
        platform.unmap_file(file);

        assert!(platform.map_file(Path::new("missing.bin")).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn clock_advances_and_quit_is_reported() {
        let mut platform = DesktopPlatform::default();
        let before = platform.current_time_ms();
        platform.sleep_ms(2.0);
        assert!(platform.current_time_ms() > before);

        assert!(platform.poll_inputs());
        platform.request_quit();
        assert!(!platform.poll_inputs());
    }
}
