use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use ccdred_core::combine::{CombineMethod, CombineParams};
use ccdred_core::frame::ProductKind;
use ccdred_core::mask::MaskParams;
use ccdred_core::pipeline::{
    expand_inputs, run_pipeline_reported, HeaderMode, OutputMode, PipelineConfig,
};
use ccdred_core::validate::ValidationBounds;
use tracing::debug;

use crate::progress::BarReporter;

#[derive(Args)]
pub struct CalibrateArgs {
    /// Input FITS files or directories
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Run config file (TOML); command-line options are ignored
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Header keywords that define a group (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub keys: Vec<String>,

    /// Combination method: median, average or cube
    #[arg(short, long)]
    pub method: Option<String>,

    /// Master bias to subtract
    #[arg(long)]
    pub bias: Option<PathBuf>,

    /// Master dark to subtract
    #[arg(long)]
    pub dark: Option<PathBuf>,

    /// Master flat to divide by
    #[arg(long)]
    pub flat: Option<PathBuf>,

    /// Divide each frame by its mean before combining
    #[arg(long, conflicts_with = "no_normalize")]
    pub normalize: bool,

    /// Never normalize, even for flats
    #[arg(long)]
    pub no_normalize: bool,

    /// Lower bound of the accepted strip mean (exclusive)
    #[arg(long)]
    pub min: Option<f64>,

    /// Upper bound of the accepted strip mean (exclusive)
    #[arg(long)]
    pub max: Option<f64>,

    /// Number of horizontal strips checked per frame
    #[arg(long, default_value = "100")]
    pub strips: usize,

    /// Write one output per input frame
    #[arg(long, conflicts_with = "batch")]
    pub per_frame: bool,

    /// Write one output per group
    #[arg(long)]
    pub batch: bool,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Groups processed concurrently (0 = one per core)
    #[arg(short = 'j', long, default_value = "0")]
    pub threads: usize,

    /// Per-group time limit in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Regenerate output headers from this instrument template (TOML)
    #[arg(long, conflicts_with = "no_header")]
    pub template: Option<PathBuf>,

    /// Write structural keywords only
    #[arg(long)]
    pub no_header: bool,

    /// Write a bad-pixel region table next to each output
    #[arg(long)]
    pub mask: bool,
}

pub fn run(product: ProductKind, args: &CalibrateArgs) -> Result<bool> {
    let config = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        let config: PipelineConfig = toml::from_str(&contents).context("Invalid run config")?;
        if config.product != product {
            bail!(
                "Config {} builds {} but the command builds {}",
                config_path.display(),
                config.product,
                product
            );
        }
        config
    } else {
        build_config_from_args(product, args)?
    };

    debug!(?config, "Run config");

    let files = expand_inputs(&args.files).context("Failed to list inputs")?;
    if files.is_empty() {
        bail!("No FITS files found in the given inputs");
    }

    crate::summary::print_run_header(&config, files.len());

    let summary = run_pipeline_reported(&config, &files, Arc::new(BarReporter::new()))
        .with_context(|| format!("{product} run failed"))?;

    crate::summary::print_run_summary(&summary);
    Ok(summary.is_success())
}

fn build_config_from_args(product: ProductKind, args: &CalibrateArgs) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::for_product(product);
    config.keys = args.keys.clone();
    config.method = args
        .method
        .as_deref()
        .map(str::parse::<CombineMethod>)
        .transpose()?;
    config.normalize = match (args.normalize, args.no_normalize) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    };

    if args.min.is_some() || args.max.is_some() {
        let defaults = CombineParams::for_product(product).bounds;
        config.bounds = Some(ValidationBounds {
            min: args.min.unwrap_or(defaults.min),
            max: args.max.unwrap_or(defaults.max),
        });
    }
    config.strip_count = args.strips;

    config.output_mode = if args.per_frame {
        Some(OutputMode::PerFrame)
    } else if args.batch {
        Some(OutputMode::Batch)
    } else {
        None
    };
    config.output_dir = args.output_dir.clone();
    config.threads = args.threads;
    config.group_timeout_secs = args.timeout;

    if let Some(ref template) = args.template {
        config.header = HeaderMode::Template;
        config.template = Some(template.clone());
    } else if args.no_header {
        config.header = HeaderMode::None;
    }

    config.corrections.bias = args.bias.clone();
    config.corrections.dark = args.dark.clone();
    config.corrections.flat = args.flat.clone();

    if args.mask {
        config.mask = Some(MaskParams::default());
    }
    Ok(config)
}
