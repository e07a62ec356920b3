pub mod fits;
pub mod memory;
pub mod region;

use std::path::Path;

use ndarray::Array2;

use crate::error::Result;
use crate::frame::PixelData;
use crate::header::Header;

pub use fits::FitsStore;
pub use memory::MemoryStore;

/// Access to frame headers and pixels.
///
/// Implementations must be shareable across the group worker pool.
pub trait FrameStore: Send + Sync {
    fn read_header(&self, path: &Path) -> Result<Header>;

    /// Pixels as f32, shape = (rows, cols).
    fn read_array(&self, path: &Path) -> Result<Array2<f32>>;

    fn write(&self, path: &Path, data: &PixelData, header: Option<&Header>) -> Result<()>;
}
