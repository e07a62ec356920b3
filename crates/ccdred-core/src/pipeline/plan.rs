use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::consts::FITS_EXTENSIONS;
use crate::error::{CcdError, Result};
use crate::frame::ProductKind;

use super::config::{CorrectionPaths, PipelineConfig};
use super::orchestrator::run_pipeline_reported;
use super::types::{NoOpReporter, ProgressReporter, RunSummary};

/// One stage of a reduction: a product built from its own inputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: Option<String>,
    /// Files or directories; directories contribute their FITS files.
    pub inputs: Vec<PathBuf>,
    pub config: PipelineConfig,
}

impl StageConfig {
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.config.product.tag().to_string())
    }
}

/// Stages run in order; later stages may use earlier outputs as masters.
///
/// ```toml
/// [[stage]]
/// name = "bias"
/// inputs = ["raw/bias"]
///
/// [stage.config]
/// product = "bias"
/// keys = ["CCDSUM"]
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReductionPlan {
    #[serde(rename = "stage", default)]
    pub stages: Vec<StageConfig>,
}

impl ReductionPlan {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| CcdError::Config(format!("invalid plan: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CcdError::Config(format!("cannot encode plan: {e}")))
    }

    /// Bias, dark, flat and object stages chained through their outputs.
    pub fn example() -> Self {
        let keys = |ks: &[&str]| ks.iter().map(|k| k.to_string()).collect::<Vec<_>>();
        let out = PathBuf::from("reduced");
        let mbias = out.join("MBIAS_CCDSUM-1-1.fits");
        let mdark = out.join("MDARK_CCDSUM-1-1_EXPTIME-60.fits");
        let mflat = out.join("MFLAT_CCDSUM-1-1_FILTER-R.fits");

        let stage = |name: &str,
                     product: ProductKind,
                     input: &str,
                     ks: &[&str],
                     corrections: CorrectionPaths| {
            let mut config = PipelineConfig::for_product(product);
            config.keys = keys(ks);
            config.output_dir = out.clone();
            config.corrections = corrections;
            StageConfig {
                name: Some(name.to_string()),
                inputs: vec![PathBuf::from(input)],
                config,
            }
        };

        Self {
            stages: vec![
                stage(
                    "bias",
                    ProductKind::Bias,
                    "raw/bias",
                    &["CCDSUM"],
                    CorrectionPaths::default(),
                ),
                stage(
                    "dark",
                    ProductKind::Dark,
                    "raw/dark",
                    &["CCDSUM", "EXPTIME"],
                    CorrectionPaths {
                        bias: Some(mbias.clone()),
                        ..Default::default()
                    },
                ),
                stage(
                    "flat",
                    ProductKind::Flat,
                    "raw/flat",
                    &["CCDSUM", "FILTER"],
                    CorrectionPaths {
                        bias: Some(mbias.clone()),
                        dark: Some(mdark.clone()),
                        flat: None,
                    },
                ),
                stage(
                    "science",
                    ProductKind::Clean,
                    "raw/science",
                    &["CCDSUM", "FILTER", "OBJECT"],
                    CorrectionPaths {
                        bias: Some(mbias),
                        dark: Some(mdark),
                        flat: Some(mflat),
                    },
                ),
            ],
        }
    }
}

/// Expand directories into their FITS files (sorted by name); files pass through.
pub fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_fits_path(p))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

pub fn is_fits_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| FITS_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Run every stage in order. Stops at the first stage that cannot run at
/// all; group failures inside a stage are reported and the plan continues.
pub fn run_plan(plan: &ReductionPlan) -> Result<Vec<(String, RunSummary)>> {
    run_plan_reported(plan, Arc::new(NoOpReporter))
}

pub fn run_plan_reported(
    plan: &ReductionPlan,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<Vec<(String, RunSummary)>> {
    let mut results = Vec::with_capacity(plan.stages.len());
    for (i, stage) in plan.stages.iter().enumerate() {
        let label = stage.label();
        let files = expand_inputs(&stage.inputs)?;
        info!(stage = %label, index = i + 1, of = plan.stages.len(), files = files.len(), "Running stage");
        let summary = run_pipeline_reported(&stage.config, &files, Arc::clone(&reporter))?;
        results.push((label, summary));
    }
    Ok(results)
}
