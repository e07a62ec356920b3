use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{DEFAULT_MASK_ITERATIONS, DEFAULT_MASK_SIGMA};

/// Parameters for the sigma-clipped bad-pixel mask.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaskParams {
    /// Values farther than `sigma` standard deviations from the median are flagged.
    pub sigma: f32,
    /// Maximum number of clipping passes.
    pub iterations: usize,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_MASK_SIGMA,
            iterations: DEFAULT_MASK_ITERATIONS,
        }
    }
}

/// Flag pixels outside the sigma-clipped window of `data`.
///
/// Each pass computes the median and standard deviation of the pixels still
/// accepted and rejects those outside median +/- sigma*stddev. Stops early
/// when a pass rejects nothing.
pub fn bad_pixel_mask(data: &Array2<f32>, params: &MaskParams) -> Array2<bool> {
    let values: Vec<f32> = data.iter().copied().collect();
    let mut accepted = vec![true; values.len()];

    for pass in 0..params.iterations {
        let Some((center, stddev)) = median_stddev(&values, &accepted) else {
            break;
        };
        let lo = center - params.sigma * stddev;
        let hi = center + params.sigma * stddev;
        let mut changed = 0usize;
        for (keep, &v) in accepted.iter_mut().zip(&values) {
            if *keep && (v < lo || v > hi) {
                *keep = false;
                changed += 1;
            }
        }
        debug!(pass, center, stddev, rejected = changed, "Mask clipping pass");
        if changed == 0 {
            break;
        }
    }

    let mut mask = Array2::from_elem(data.dim(), false);
    for (flag, keep) in mask.iter_mut().zip(accepted) {
        *flag = !keep;
    }
    mask
}

fn median_stddev(values: &[f32], accepted: &[bool]) -> Option<(f32, f32)> {
    let mut kept: Vec<f32> = values
        .iter()
        .zip(accepted)
        .filter(|(_, &keep)| keep)
        .map(|(&v, _)| v)
        .collect();
    if kept.is_empty() {
        return None;
    }
    let n = kept.len();
    let mean = kept.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
    let var = kept
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;

    let mid = n / 2;
    kept.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    let median = if n % 2 == 1 {
        kept[mid]
    } else {
        let upper = kept[mid];
        let lower = kept[..mid]
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        (lower + upper) / 2.0
    };
    Some((median, var.sqrt() as f32))
}
