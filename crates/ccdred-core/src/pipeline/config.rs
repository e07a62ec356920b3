use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::combine::{CombineMethod, CombineParams};
use crate::consts::DEFAULT_STRIP_COUNT;
use crate::error::{CcdError, Result};
use crate::frame::{ArraySource, CorrectionSet, ProductKind};
use crate::mask::MaskParams;
use crate::validate::ValidationBounds;

/// One output per group, or one output per frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    #[default]
    Batch,
    PerFrame,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Batch => write!(f, "Batch"),
            Self::PerFrame => write!(f, "Per Frame"),
        }
    }
}

/// Where the output header comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderMode {
    /// Copy the header of the (first) contributing frame.
    #[default]
    Source,
    /// Regenerate it from the per-instrument template.
    Template,
    /// Structural keywords only, no provenance.
    None,
}

impl fmt::Display for HeaderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "Source"),
            Self::Template => write!(f, "Template"),
            Self::None => write!(f, "None"),
        }
    }
}

/// Master calibration files applied to every group.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectionPaths {
    pub bias: Option<PathBuf>,
    pub dark: Option<PathBuf>,
    pub flat: Option<PathBuf>,
}

impl CorrectionPaths {
    pub fn to_set(&self) -> CorrectionSet {
        CorrectionSet {
            bias: self.bias.clone().map(ArraySource::File),
            dark: self.dark.clone().map(ArraySource::File),
            flat: self.flat.clone().map(ArraySource::File),
        }
    }
}

fn default_strip_count() -> usize {
    DEFAULT_STRIP_COUNT
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

/// Configuration of one pipeline run. Unset options fall back to the
/// product's defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub product: ProductKind,
    /// Header keywords that define a group.
    #[serde(default)]
    pub keys: Vec<String>,
    pub method: Option<CombineMethod>,
    pub normalize: Option<bool>,
    #[serde(default = "default_strip_count")]
    pub strip_count: usize,
    pub output_mode: Option<OutputMode>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub header: HeaderMode,
    /// Template file used when `header = "template"`.
    pub template: Option<PathBuf>,
    /// Group worker count; 0 uses one per core.
    #[serde(default)]
    pub threads: usize,
    pub group_timeout_secs: Option<u64>,
    pub bounds: Option<ValidationBounds>,
    #[serde(default)]
    pub corrections: CorrectionPaths,
    /// Write a bad-pixel region table next to each single-frame output.
    pub mask: Option<MaskParams>,
}

impl PipelineConfig {
    pub fn for_product(product: ProductKind) -> Self {
        Self {
            product,
            keys: Vec::new(),
            method: None,
            normalize: None,
            bounds: None,
            strip_count: DEFAULT_STRIP_COUNT,
            output_mode: None,
            output_dir: default_output_dir(),
            header: HeaderMode::Source,
            template: None,
            corrections: CorrectionPaths::default(),
            mask: None,
            threads: 0,
            group_timeout_secs: None,
        }
    }

    /// Masters are medians; object frames are kept as cubes.
    pub fn effective_method(&self) -> CombineMethod {
        self.method.unwrap_or(match self.product {
            ProductKind::Clean => CombineMethod::Cube,
            _ => CombineMethod::Median,
        })
    }

    /// Object frames are written one per input unless configured otherwise.
    pub fn effective_output_mode(&self) -> OutputMode {
        self.output_mode.unwrap_or(match self.product {
            ProductKind::Clean => OutputMode::PerFrame,
            _ => OutputMode::Batch,
        })
    }

    pub fn combine_params(&self) -> CombineParams {
        let defaults = CombineParams::for_product(self.product);
        CombineParams {
            method: self.effective_method(),
            normalize: self.normalize.unwrap_or(defaults.normalize),
            bounds: self.bounds.unwrap_or(defaults.bounds),
            strip_count: self.strip_count,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let bounds = self.combine_params().bounds;
        if bounds.min >= bounds.max {
            return Err(CcdError::Config(format!(
                "validation window ({}, {}) is empty",
                bounds.min, bounds.max
            )));
        }
        if let Some(key) = self.keys.iter().find(|k| k.trim().is_empty()) {
            return Err(CcdError::Config(format!("blank grouping keyword {key:?}")));
        }
        if self.group_timeout_secs == Some(0) {
            return Err(CcdError::Config("group timeout must be positive".into()));
        }
        Ok(())
    }
}
