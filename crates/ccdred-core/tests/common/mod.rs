#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ndarray::Array2;

use ccdred_core::frame::PixelData;
use ccdred_core::header::{Header, HeaderValue};
use ccdred_core::io::{FitsStore, FrameStore, MemoryStore};

/// A (rows, cols) frame filled with `value`.
pub fn constant(rows: usize, cols: usize, value: f32) -> Array2<f32> {
    Array2::from_elem((rows, cols), value)
}

/// Header with the given keyword/value cards, in order.
pub fn header(cards: &[(&str, HeaderValue)]) -> Header {
    let mut h = Header::new();
    for (key, value) in cards {
        h.insert(key, value.clone());
    }
    h
}

/// Header with string-valued cards.
pub fn str_header(cards: &[(&str, &str)]) -> Header {
    let mut h = Header::new();
    for (key, value) in cards {
        h.insert(key, *value);
    }
    h
}

/// Insert `count` constant frames under `<prefix>_<i>.fits` and return their paths.
pub fn add_frames(
    store: &MemoryStore,
    prefix: &str,
    count: usize,
    hdr: &Header,
    data: &Array2<f32>,
) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = PathBuf::from(format!("{prefix}_{i}.fits"));
            store.insert(&path, hdr.clone(), data.clone());
            path
        })
        .collect()
}

/// Write a FITS file into `dir` and return its path.
pub fn write_fits(dir: &Path, name: &str, hdr: &Header, data: Array2<f32>) -> PathBuf {
    let path = dir.join(name);
    FitsStore
        .write(&path, &PixelData::Frame(data), Some(hdr))
        .unwrap();
    path
}

/// Frame data stored at `path`, panicking if it is missing or a cube.
pub fn stored_frame(store: &MemoryStore, path: &Path) -> Array2<f32> {
    match store.get(path) {
        Some((_, PixelData::Frame(a))) => a,
        Some((_, PixelData::Cube(_))) => panic!("{} holds a cube", path.display()),
        None => panic!("{} was not written", path.display()),
    }
}
