use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use ccdred_core::pipeline::{run_plan_reported, ReductionPlan};

use crate::progress::BarReporter;

#[derive(Args)]
pub struct RunArgs {
    /// Reduction plan (TOML)
    #[arg(short, long)]
    pub plan: PathBuf,
}

pub fn run(args: &RunArgs) -> Result<bool> {
    let plan = ReductionPlan::load(&args.plan)
        .with_context(|| format!("Failed to load plan {}", args.plan.display()))?;

    println!("Reduction plan: {} stage(s)", plan.stages.len());
    for stage in &plan.stages {
        println!(
            "  {:<12}{} from {} input(s)",
            stage.label(),
            stage.config.product,
            stage.inputs.len()
        );
    }

    let results = run_plan_reported(&plan, Arc::new(BarReporter::new()))?;

    let mut ok = true;
    for (label, summary) in &results {
        crate::summary::print_stage_title(label);
        crate::summary::print_run_summary(summary);
        ok &= summary.is_success();
    }
    Ok(ok)
}
