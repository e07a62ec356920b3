use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::combine::{combine_with_token, CombineMethod, CombineParams, Combination};
use crate::error::{CcdError, Result};
use crate::frame::{ArraySource, CorrectionSet, Frame, PixelData, ProductKind};
use crate::group::{group_frames, FrameGroups, GroupKey};
use crate::header::Header;
use crate::io::region::write_region;
use crate::io::{FitsStore, FrameStore};
use crate::mask::bad_pixel_mask;
use crate::naming::{describe_correction, history_line, DefaultNamer, OutputNamer};
use crate::template::{HeaderTemplate, TemplateSet};

use super::config::{CorrectionPaths, HeaderMode, OutputMode, PipelineConfig};
use super::types::{GroupReport, NoOpReporter, PipelineStage, ProgressReporter, RunSummary};

/// One group and the paths its outputs will be written to.
struct GroupPlan {
    key: GroupKey,
    label: String,
    frames: Vec<Frame>,
    outputs: Vec<PathBuf>,
}

/// Per-run state shared read-only by the group workers.
struct RunContext<'r> {
    config: &'r PipelineConfig,
    params: CombineParams,
    masters: CorrectionSet,
    steps: Vec<&'static str>,
    template: Option<&'r dyn HeaderTemplate>,
    done: AtomicUsize,
}

/// Groups frames and writes one calibrated product per group (or per frame).
///
/// Holds no state between runs; everything a run needs comes from its
/// [`PipelineConfig`] and arguments.
pub struct CalibrationPipeline<'a> {
    store: &'a dyn FrameStore,
    namer: &'a dyn OutputNamer,
    template: Option<&'a dyn HeaderTemplate>,
    reporter: Arc<dyn ProgressReporter>,
    token: CancelToken,
}

impl<'a> CalibrationPipeline<'a> {
    pub fn new(store: &'a dyn FrameStore, namer: &'a dyn OutputNamer) -> Self {
        Self {
            store,
            namer,
            template: None,
            reporter: Arc::new(NoOpReporter),
            token: CancelToken::new(),
        }
    }

    /// Template used when the config asks for regenerated headers.
    pub fn with_template(mut self, template: &'a dyn HeaderTemplate) -> Self {
        self.template = Some(template);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Parent token for every group; cancelling it stops all groups at
    /// their next input.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.token = token;
        self
    }

    /// Run one product over `filenames`.
    ///
    /// Returns `Err` only for problems that affect the whole run (bad
    /// configuration, unreadable masters, colliding output names). Failures
    /// inside a group are recorded in its [`GroupReport`].
    pub fn run(
        &self,
        config: &PipelineConfig,
        filenames: &[PathBuf],
        corrections: &CorrectionSet,
    ) -> Result<RunSummary> {
        config.validate()?;

        let loaded_template;
        let template: Option<&dyn HeaderTemplate> = match (config.header, self.template) {
            (HeaderMode::Template, Some(t)) => Some(t),
            (HeaderMode::Template, None) => {
                let path = config.template.as_ref().ok_or_else(|| {
                    CcdError::Config("header = \"template\" needs a template file".into())
                })?;
                loaded_template = TemplateSet::load(path)?;
                Some(&loaded_template)
            }
            _ => None,
        };

        info!(
            product = %config.product,
            files = filenames.len(),
            keys = ?config.keys,
            "Starting run"
        );

        // Headers
        self.reporter
            .begin_stage(PipelineStage::ReadingHeaders, Some(filenames.len()));
        let mut unassigned = Vec::new();
        let mut frames = Vec::with_capacity(filenames.len());
        for (i, path) in filenames.iter().enumerate() {
            match Frame::open(self.store, path) {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read header");
                    unassigned.push((path.clone(), e.to_string()));
                }
            }
            self.reporter.advance(i + 1);
        }
        self.reporter.finish_stage();

        // Grouping
        self.reporter.begin_stage(PipelineStage::Grouping, None);
        let groups = group_frames(frames, &config.keys);
        unassigned.extend(
            groups
                .unassigned()
                .iter()
                .map(|(p, e)| (p.clone(), e.to_string())),
        );
        let plans = self.plan_outputs(config, &groups)?;
        info!(groups = plans.len(), unassigned = unassigned.len(), "Grouped frames");
        self.reporter.finish_stage();

        // Masters, read once and shared by all groups
        self.reporter.begin_stage(PipelineStage::LoadingCorrections, None);
        let resolved = corrections.load(self.store)?;
        let steps = resolved.steps();
        self.reporter.finish_stage();

        let ctx = RunContext {
            config,
            params: config.combine_params(),
            masters: resolved.into_set(),
            steps,
            template,
            done: AtomicUsize::new(0),
        };

        self.reporter
            .begin_stage(PipelineStage::Combining, Some(plans.len()));
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()
            .map_err(|e| CcdError::Config(format!("cannot start worker pool: {e}")))?;
        let reports: Vec<GroupReport> = pool.install(|| {
            plans
                .par_iter()
                .map(|plan| self.process_group(&ctx, plan))
                .collect()
        });
        self.reporter.finish_stage();

        let summary = RunSummary {
            product: config.product,
            groups: reports,
            unassigned,
        };
        info!(
            product = %config.product,
            written = summary.written().len(),
            failed_groups = summary.failures().len(),
            "Run complete"
        );
        Ok(summary)
    }

    /// Name every output up front and refuse plans where two outputs collide.
    fn plan_outputs(
        &self,
        config: &PipelineConfig,
        groups: &FrameGroups,
    ) -> Result<Vec<GroupPlan>> {
        let keywords = groups.keywords();
        let mut seen = HashSet::new();
        let mut plans = Vec::with_capacity(groups.len());

        for (key, members) in groups.iter() {
            let outputs: Vec<PathBuf> = match config.effective_output_mode() {
                OutputMode::Batch => {
                    vec![self
                        .namer
                        .output_path(config.product, keywords, key, None)]
                }
                OutputMode::PerFrame => (0..members.len())
                    .map(|i| self.namer.output_path(config.product, keywords, key, Some(i)))
                    .collect(),
            };
            for path in &outputs {
                if !seen.insert(path.clone()) {
                    return Err(CcdError::OutputCollision(path.clone()));
                }
            }
            plans.push(GroupPlan {
                key: key.clone(),
                label: groups.describe(key),
                frames: members.to_vec(),
                outputs,
            });
        }
        Ok(plans)
    }

    fn process_group(&self, ctx: &RunContext<'_>, plan: &GroupPlan) -> GroupReport {
        let timeout = ctx.config.group_timeout_secs.map(Duration::from_secs);
        let token = self.token.child(timeout);
        info!(group = %plan.label, key = %plan.key, frames = plan.frames.len(), "Combining group");

        let mut report = GroupReport {
            label: plan.label.clone(),
            frame_count: plan.frames.len(),
            written: Vec::new(),
            rejected: Vec::new(),
            errors: Vec::new(),
        };

        match ctx.config.effective_output_mode() {
            OutputMode::Batch => {
                let output = &plan.outputs[0];
                let result =
                    self.combine_and_write(ctx, &plan.label, &plan.frames, output, &ctx.params, &token);
                record(&mut report, &plan.label, output, result);
            }
            OutputMode::PerFrame => {
                let params = CombineParams {
                    method: CombineMethod::Cube,
                    ..ctx.params.clone()
                };
                for (frame, output) in plan.frames.iter().zip(&plan.outputs) {
                    let label = frame.path.display().to_string();
                    let result = self.combine_and_write(
                        ctx,
                        &label,
                        std::slice::from_ref(frame),
                        output,
                        &params,
                        &token,
                    );
                    record(&mut report, &label, output, result);
                }
            }
        }

        let done = ctx.done.fetch_add(1, Ordering::Relaxed) + 1;
        self.reporter.advance(done);
        report
    }

    fn combine_and_write(
        &self,
        ctx: &RunContext<'_>,
        label: &str,
        members: &[Frame],
        output: &Path,
        params: &CombineParams,
        token: &CancelToken,
    ) -> Result<Combination> {
        let inputs: Vec<ArraySource> = members
            .iter()
            .map(|f| ArraySource::File(f.path.clone()))
            .collect();
        let combination = combine_with_token(&inputs, &ctx.masters, params, self.store, token)
            .map_err(|e| match e {
                CcdError::EmptyCombination { .. } => CcdError::EmptyCombination {
                    group: label.to_string(),
                },
                other => other,
            })?;
        token.check()?;

        let header = self.output_header(ctx, &members[0].header, params, combination.used)?;
        self.store.write(output, &combination.data, header.as_ref())?;

        if let (Some(mask_params), PixelData::Frame(data)) = (&ctx.config.mask, &combination.data)
        {
            let mask = bad_pixel_mask(data, mask_params);
            let region = self.namer.mask_path(output);
            let flagged = write_region(&mask, &region)?;
            info!(path = %region.display(), flagged, "Wrote bad-pixel region");
        }
        Ok(combination)
    }

    fn output_header(
        &self,
        ctx: &RunContext<'_>,
        source: &Header,
        params: &CombineParams,
        used: usize,
    ) -> Result<Option<Header>> {
        let mut header = match (ctx.config.header, ctx.template) {
            (HeaderMode::None, _) => return Ok(None),
            (HeaderMode::Template, Some(t)) => t.render(source)?,
            (HeaderMode::Template, None) => {
                return Err(CcdError::Config("no header template available".into()));
            }
            (HeaderMode::Source, _) => source.clone(),
        };
        let product = ctx.config.product;
        header.insert("PRODUCT", product.tag());
        header.insert("NCOMBINE", used as i64);
        header.insert("COMBMETH", params.method.to_string());
        header.add_history(history_line(&describe_correction(
            product,
            params.method,
            used,
            &ctx.steps,
            params.normalize,
        )));
        Ok(Some(header))
    }
}

fn record(report: &mut GroupReport, label: &str, output: &Path, result: Result<Combination>) {
    match result {
        Ok(combination) => {
            report.rejected.extend(combination.rejected);
            report.written.push(output.to_path_buf());
        }
        Err(e) => {
            warn!(group = label, error = %e, "Output not written");
            report.errors.push(format!("{label}: {e}"));
        }
    }
}

/// Run `config` over `filenames` with FITS files on disk, naming outputs in
/// `config.output_dir` and applying the masters named in `config.corrections`.
pub fn run_pipeline(config: &PipelineConfig, filenames: &[PathBuf]) -> Result<RunSummary> {
    run_pipeline_reported(config, filenames, Arc::new(NoOpReporter))
}

/// [`run_pipeline`] with a progress reporter.
pub fn run_pipeline_reported(
    config: &PipelineConfig,
    filenames: &[PathBuf],
    reporter: Arc<dyn ProgressReporter>,
) -> Result<RunSummary> {
    let store = FitsStore;
    let namer = DefaultNamer::new(&config.output_dir);
    CalibrationPipeline::new(&store, &namer)
        .with_reporter(reporter)
        .run(config, filenames, &config.corrections.to_set())
}

fn product_config(product: ProductKind, keys: &[&str], output_dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::for_product(product);
    config.keys = keys.iter().map(|k| k.to_string()).collect();
    config.output_dir = output_dir.to_path_buf();
    config
}

/// Median-combine bias frames per group into `MBIAS_*.fits`.
pub fn master_bias(filenames: &[PathBuf], keys: &[&str], output_dir: &Path) -> Result<RunSummary> {
    run_pipeline(&product_config(ProductKind::Bias, keys, output_dir), filenames)
}

/// Bias-subtract and median-combine dark frames per group into `MDARK_*.fits`.
pub fn master_dark(
    filenames: &[PathBuf],
    keys: &[&str],
    bias: Option<&Path>,
    output_dir: &Path,
) -> Result<RunSummary> {
    let mut config = product_config(ProductKind::Dark, keys, output_dir);
    config.corrections.bias = bias.map(Path::to_path_buf);
    run_pipeline(&config, filenames)
}

/// Correct, normalize and median-combine flat frames per group into `MFLAT_*.fits`.
pub fn master_flat(
    filenames: &[PathBuf],
    keys: &[&str],
    bias: Option<&Path>,
    dark: Option<&Path>,
    output_dir: &Path,
) -> Result<RunSummary> {
    let mut config = product_config(ProductKind::Flat, keys, output_dir);
    config.corrections.bias = bias.map(Path::to_path_buf);
    config.corrections.dark = dark.map(Path::to_path_buf);
    run_pipeline(&config, filenames)
}

/// Apply `corrections` to object frames, one `CLEAN_*_NNN.fits` per input.
pub fn correct_images(
    filenames: &[PathBuf],
    keys: &[&str],
    corrections: CorrectionPaths,
    output_dir: &Path,
) -> Result<RunSummary> {
    let mut config = product_config(ProductKind::Clean, keys, output_dir);
    config.corrections = corrections;
    run_pipeline(&config, filenames)
}
