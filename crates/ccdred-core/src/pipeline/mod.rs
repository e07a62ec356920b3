pub mod config;
mod orchestrator;
mod plan;
mod types;

pub use config::{CorrectionPaths, HeaderMode, OutputMode, PipelineConfig};
pub use orchestrator::{
    correct_images, master_bias, master_dark, master_flat, run_pipeline, run_pipeline_reported,
    CalibrationPipeline,
};
pub use plan::{
    expand_inputs, is_fits_path, run_plan, run_plan_reported, ReductionPlan, StageConfig,
};
pub use types::{GroupReport, NoOpReporter, PipelineStage, ProgressReporter, RunSummary};
