use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::Array2;

use crate::error::{CcdError, Result};
use crate::frame::PixelData;
use crate::header::Header;

use super::FrameStore;

/// Frames held in memory, keyed by path. Useful for tests and for
/// embedding the engine without touching the filesystem.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<PathBuf, (Header, PixelData)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, header: Header, data: Array2<f32>) {
        self.lock()
            .insert(path.into(), (header, PixelData::Frame(data)));
    }

    /// Header and pixels stored at `path`, if any.
    pub fn get(&self, path: &Path) -> Option<(Header, PixelData)> {
        self.lock().get(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    /// Stored paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, (Header, PixelData)>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn not_found(path: &Path) -> CcdError {
    CcdError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not in memory store", path.display()),
    ))
}

impl FrameStore for MemoryStore {
    fn read_header(&self, path: &Path) -> Result<Header> {
        self.lock()
            .get(path)
            .map(|(h, _)| h.clone())
            .ok_or_else(|| not_found(path))
    }

    fn read_array(&self, path: &Path) -> Result<Array2<f32>> {
        match self.lock().get(path) {
            Some((_, PixelData::Frame(a))) => Ok(a.clone()),
            Some((_, PixelData::Cube(_))) => Err(CcdError::InvalidFits(format!(
                "{} holds a cube, not a 2-D image",
                path.display()
            ))),
            None => Err(not_found(path)),
        }
    }

    fn write(&self, path: &Path, data: &PixelData, header: Option<&Header>) -> Result<()> {
        let header = header.cloned().unwrap_or_default();
        self.lock()
            .insert(path.to_path_buf(), (header, data.clone()));
        Ok(())
    }
}
