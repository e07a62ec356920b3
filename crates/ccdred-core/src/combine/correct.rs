use ndarray::Array2;

use crate::error::{CcdError, Result};
use crate::frame::ResolvedCorrections;

/// Subtract bias, subtract dark, divide by flat, in that order.
///
/// The input is never modified: the first step writes into a fresh f32
/// array and later steps update that copy.
pub fn apply_corrections(
    data: &Array2<f32>,
    corrections: &ResolvedCorrections,
    label: &str,
) -> Result<Array2<f32>> {
    let mut out = data.to_owned();
    if let Some(bias) = &corrections.bias {
        ensure_master_shape(&out, bias, "bias", label)?;
        out -= &**bias;
    }
    if let Some(dark) = &corrections.dark {
        ensure_master_shape(&out, dark, "dark", label)?;
        out -= &**dark;
    }
    if let Some(flat) = &corrections.flat {
        ensure_master_shape(&out, flat, "flat", label)?;
        out /= &**flat;
    }
    Ok(out)
}

/// Divide `data` by its own mean so its mean becomes 1.0.
pub fn normalize(mut data: Array2<f32>, label: &str) -> Result<Array2<f32>> {
    let mean = mean_f64(&data);
    if mean == 0.0 || !mean.is_finite() {
        return Err(CcdError::ZeroMean {
            source_name: label.to_string(),
        });
    }
    let scale = mean as f32;
    data.mapv_inplace(|v| v / scale);
    Ok(data)
}

/// Mean accumulated in f64 to keep large frames accurate.
pub fn mean_f64(data: &Array2<f32>) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    data.iter().map(|&v| v as f64).sum::<f64>() / data.len() as f64
}

fn ensure_master_shape(
    frame: &Array2<f32>,
    master: &Array2<f32>,
    role: &'static str,
    label: &str,
) -> Result<()> {
    if frame.dim() != master.dim() {
        return Err(CcdError::MasterShapeMismatch {
            master: role,
            master_shape: master.dim(),
            frame_shape: frame.dim(),
            source_name: label.to_string(),
        });
    }
    Ok(())
}
