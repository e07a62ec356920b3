pub mod correct;
mod mean;
mod median;

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::consts::DEFAULT_STRIP_COUNT;
use crate::error::{CcdError, Result};
use crate::frame::{
    ArraySource, CorrectionSet, MasterFrame, PixelData, ProductKind, Provenance,
    ResolvedCorrections,
};
use crate::io::FrameStore;
use crate::naming::{describe_correction, history_line};
use crate::validate::{check_strips, ValidationBounds};

use self::correct::{apply_corrections, normalize};
use self::mean::StreamingMean;
use self::median::median_combine;

/// How a batch is reduced along the stack axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMethod {
    #[default]
    Median,
    Average,
    /// No reduction: the corrected batch is returned as a cube.
    Cube,
}

impl fmt::Display for CombineMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Median => write!(f, "median"),
            Self::Average => write!(f, "average"),
            Self::Cube => write!(f, "cube"),
        }
    }
}

impl FromStr for CombineMethod {
    type Err = CcdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "median" => Ok(Self::Median),
            "average" | "mean" => Ok(Self::Average),
            "cube" => Ok(Self::Cube),
            _ => Err(CcdError::UnknownMethod(s.to_string())),
        }
    }
}

/// Parameters of one combination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CombineParams {
    pub method: CombineMethod,
    /// Divide every corrected array by its own mean before stacking.
    pub normalize: bool,
    pub bounds: ValidationBounds,
    pub strip_count: usize,
}

impl Default for CombineParams {
    fn default() -> Self {
        Self::for_product(ProductKind::Clean)
    }
}

impl CombineParams {
    /// Defaults used for each product: flats are normalized and validated
    /// against a high window, bias and dark against a low one.
    pub fn for_product(product: ProductKind) -> Self {
        let bounds = match product {
            ProductKind::Bias | ProductKind::Dark => crate::consts::BIAS_DARK_BOUNDS,
            ProductKind::Flat => crate::consts::FLAT_BOUNDS,
            ProductKind::Clean => crate::consts::FULL_RANGE_BOUNDS,
        };
        Self {
            method: CombineMethod::Median,
            normalize: product == ProductKind::Flat,
            bounds: bounds.into(),
            strip_count: DEFAULT_STRIP_COUNT,
        }
    }
}

/// Result of [`combine`].
#[derive(Clone, Debug)]
pub struct Combination {
    pub data: PixelData,
    /// Number of arrays that passed validation.
    pub used: usize,
    /// Labels of the arrays dropped by validation.
    pub rejected: Vec<String>,
}

enum Accumulator {
    Median(Vec<Array2<f32>>),
    Average(Option<StreamingMean>),
    Cube { buffer: Vec<f32>, count: usize },
}

impl Accumulator {
    fn new(method: CombineMethod) -> Self {
        match method {
            CombineMethod::Median => Self::Median(Vec::new()),
            CombineMethod::Average => Self::Average(None),
            CombineMethod::Cube => Self::Cube {
                buffer: Vec::new(),
                count: 0,
            },
        }
    }

    fn push(&mut self, data: Array2<f32>) {
        match self {
            Self::Median(batch) => batch.push(data),
            Self::Average(acc) => acc
                .get_or_insert_with(|| StreamingMean::new(data.dim()))
                .add(&data),
            Self::Cube { buffer, count } => {
                buffer.extend(data.iter().copied());
                *count += 1;
            }
        }
    }

    fn finish(self, shape: (usize, usize)) -> Result<Option<PixelData>> {
        let (h, w) = shape;
        let data = match self {
            Self::Median(batch) if batch.is_empty() => None,
            Self::Median(batch) => Some(PixelData::Frame(median_combine(&batch))),
            Self::Average(acc) => acc.and_then(StreamingMean::finalize).map(PixelData::Frame),
            Self::Cube { count: 0, .. } => None,
            Self::Cube { buffer, count: 1 } => {
                Some(PixelData::Frame(Array2::from_shape_vec((h, w), buffer)?))
            }
            Self::Cube { buffer, count } => {
                Some(PixelData::Cube(Array3::from_shape_vec((count, h, w), buffer)?))
            }
        };
        Ok(data)
    }
}

/// Validate, correct and reduce `inputs` into one array (or a cube).
pub fn combine(
    inputs: &[ArraySource],
    corrections: &CorrectionSet,
    params: &CombineParams,
    store: &dyn FrameStore,
) -> Result<Combination> {
    combine_with_token(inputs, corrections, params, store, &CancelToken::new())
}

/// [`combine`] checking `token` before each input is loaded.
///
/// Inputs are loaded one at a time; each raw array is dropped as soon as its
/// corrected copy exists, so the resident set is the corrected batch plus
/// the array in flight. Masters are read only once a first input passes
/// validation.
pub fn combine_with_token(
    inputs: &[ArraySource],
    corrections: &CorrectionSet,
    params: &CombineParams,
    store: &dyn FrameStore,
    token: &CancelToken,
) -> Result<Combination> {
    let empty = || CcdError::EmptyCombination {
        group: format!("{} input(s)", inputs.len()),
    };
    if inputs.is_empty() {
        return Err(empty());
    }

    let mut resolved: Option<ResolvedCorrections> = None;
    let mut shape: Option<(usize, usize)> = None;
    let mut rejected = Vec::new();
    let mut used = 0usize;
    let mut acc = Accumulator::new(params.method);

    for (i, source) in inputs.iter().enumerate() {
        token.check()?;
        let label = source.label(i);
        let raw = source.resolve(store)?;

        if let Err(e) = check_strips(&raw, params.strip_count, params.bounds) {
            warn!(source = %label, error = %e, "Dropping frame");
            rejected.push(label);
            continue;
        }

        match shape {
            Some(expected) if expected != raw.dim() => {
                return Err(CcdError::ShapeMismatch {
                    expected,
                    found: raw.dim(),
                    source_name: label,
                });
            }
            Some(_) => {}
            None => shape = Some(raw.dim()),
        }

        let masters = match resolved.take() {
            Some(r) => r,
            None => corrections.load(store)?,
        };
        let corrected = apply_corrections(&raw, &masters, &label)?;
        resolved = Some(masters);
        drop(raw);

        let corrected = if params.normalize {
            normalize(corrected, &label)?
        } else {
            corrected
        };
        debug!(source = %label, "Corrected");
        acc.push(corrected);
        used += 1;
    }

    let Some(shape) = shape else {
        return Err(empty());
    };
    let data = acc.finish(shape)?.ok_or_else(empty)?;

    info!(
        method = %params.method,
        used,
        rejected = rejected.len(),
        shape = ?data.shape(),
        "Combined"
    );
    Ok(Combination {
        data,
        used,
        rejected,
    })
}

/// Combine `inputs` into an in-memory master usable as a correction later.
pub fn build_master(
    inputs: &[ArraySource],
    corrections: &CorrectionSet,
    params: &CombineParams,
    product: ProductKind,
    store: &dyn FrameStore,
) -> Result<MasterFrame> {
    if params.method == CombineMethod::Cube {
        return Err(CcdError::Config(
            "master frames need the median or average method".into(),
        ));
    }
    let resolved = corrections.load(store)?;
    let steps = resolved.steps();
    let combination = combine(inputs, &resolved.into_set(), params, store)?;
    let text = describe_correction(
        product,
        params.method,
        combination.used,
        &steps,
        params.normalize,
    );
    let data = combination
        .data
        .into_frame()
        .ok_or_else(|| CcdError::Config("master combination produced a cube".into()))?;
    Ok(MasterFrame {
        data: std::sync::Arc::new(data),
        provenance: Provenance {
            product,
            frame_count: combination.used,
            method: params.method,
            history: vec![history_line(&text)],
        },
    })
}
