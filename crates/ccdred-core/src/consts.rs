/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Default number of row strips checked by the frame validator.
pub const DEFAULT_STRIP_COUNT: usize = 100;

/// Validation window for bias and dark frames (near-zero signal expected).
pub const BIAS_DARK_BOUNDS: (f64, f64) = (0.0, 2000.0);

/// Validation window for flats: well exposed but below saturation.
pub const FLAT_BOUNDS: (f64, f64) = (10_000.0, 55_000.0);

/// Full 16-bit detector range, used for object frames.
pub const FULL_RANGE_BOUNDS: (f64, f64) = (0.0, 65_535.0);

/// Default sigma for the bad-pixel mask clipping.
pub const DEFAULT_MASK_SIGMA: f32 = 3.0;

/// Default number of clipping passes for the bad-pixel mask.
pub const DEFAULT_MASK_ITERATIONS: usize = 5;

/// FITS logical record size in bytes.
pub const FITS_BLOCK_SIZE: usize = 2880;

/// FITS header card length in bytes.
pub const FITS_CARD_SIZE: usize = 80;

/// Longest quoted string that fits one card with both quotes.
pub const FITS_STRING_WIDTH: usize = 68;

/// Maximum text carried by one HISTORY card.
pub const FITS_HISTORY_WIDTH: usize = 72;

/// File extensions treated as FITS when expanding input directories.
pub const FITS_EXTENSIONS: [&str; 3] = ["fits", "fit", "fts"];
