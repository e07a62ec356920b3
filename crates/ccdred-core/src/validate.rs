use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CcdError, Result};

/// Open interval a strip mean must fall in.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationBounds {
    pub min: f64,
    pub max: f64,
}

impl ValidationBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Both ends are exclusive.
    pub fn contains(&self, value: f64) -> bool {
        self.min < value && value < self.max
    }
}

impl From<(f64, f64)> for ValidationBounds {
    fn from((min, max): (f64, f64)) -> Self {
        Self { min, max }
    }
}

/// Row ranges of `strip_count` contiguous strips covering `rows` rows.
///
/// The first `rows % n` strips get one extra row. The count is clamped to
/// `1..=rows` so no strip is empty.
pub fn strip_ranges(rows: usize, strip_count: usize) -> Vec<(usize, usize)> {
    let n = strip_count.clamp(1, rows.max(1));
    let base = rows / n;
    let extra = rows % n;
    let mut start = 0;
    (0..n)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = (start, start + len);
            start += len;
            range
        })
        .collect()
}

/// Fail with [`CcdError::SaturationRejection`] on the first strip whose mean
/// is outside `bounds`.
pub fn check_strips(data: &Array2<f32>, strip_count: usize, bounds: ValidationBounds) -> Result<()> {
    let (rows, cols) = data.dim();
    for (strip, (start, end)) in strip_ranges(rows, strip_count).into_iter().enumerate() {
        let count = (end - start) * cols;
        let sum: f64 = data
            .slice_axis(Axis(0), (start..end).into())
            .iter()
            .map(|&v| v as f64)
            .sum();
        // An empty array has no meaningful mean; NaN fails the bounds test.
        let mean = if count == 0 { f64::NAN } else { sum / count as f64 };
        if !bounds.contains(mean) {
            return Err(CcdError::SaturationRejection {
                strip,
                mean,
                min: bounds.min,
                max: bounds.max,
            });
        }
    }
    Ok(())
}

/// True when every strip mean lies strictly inside `bounds`.
pub fn is_valid(data: &Array2<f32>, strip_count: usize, bounds: ValidationBounds) -> bool {
    match check_strips(data, strip_count, bounds) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Frame rejected");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ranges_cover_rows() {
        let ranges = strip_ranges(10, 3);
        assert_eq!(ranges, vec![(0, 4), (4, 7), (7, 10)]);
    }

    #[test]
    fn test_strip_count_clamped_to_rows() {
        assert_eq!(strip_ranges(2, 100).len(), 2);
        assert_eq!(strip_ranges(5, 0).len(), 1);
    }
}
