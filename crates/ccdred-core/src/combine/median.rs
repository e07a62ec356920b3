use ndarray::{Array2, Axis};
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// Per-pixel median of a batch of equally shaped arrays.
///
/// Uses `select_nth_unstable` for O(n) median without full sort. Rows are
/// processed in parallel for images of at least `PARALLEL_PIXEL_THRESHOLD`
/// pixels. An even count yields the mean of the two middle values.
pub(crate) fn median_combine(batch: &[Array2<f32>]) -> Array2<f32> {
    let (h, w) = batch[0].dim();
    let n = batch.len();
    let mut result = Array2::<f32>::zeros((h, w));

    let fill_row = |row: usize, out: &mut [f32]| {
        let mut pixel_values = vec![0.0f32; n];
        for (col, value) in out.iter_mut().enumerate() {
            for (i, data) in batch.iter().enumerate() {
                pixel_values[i] = data[[row, col]];
            }
            *value = compute_median(&mut pixel_values);
        }
    };

    if h * w >= PARALLEL_PIXEL_THRESHOLD && n > 1 {
        result
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, mut out)| {
                if let Some(slice) = out.as_slice_mut() {
                    fill_row(row, slice);
                }
            });
    } else {
        for (row, mut out) in result.axis_iter_mut(Axis(0)).enumerate() {
            if let Some(slice) = out.as_slice_mut() {
                fill_row(row, slice);
            }
        }
    }
    result
}

fn compute_median(pixel_values: &mut [f32]) -> f32 {
    let n = pixel_values.len();
    if n == 1 {
        pixel_values[0]
    } else if n % 2 == 1 {
        let mid = n / 2;
        *pixel_values
            .select_nth_unstable_by(mid, |a, b| a.total_cmp(b))
            .1
    } else {
        let mid = n / 2;
        pixel_values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
        pixel_values[..mid].select_nth_unstable_by(mid - 1, |a, b| a.total_cmp(b));
        (pixel_values[mid - 1] + pixel_values[mid]) / 2.0
    }
}
