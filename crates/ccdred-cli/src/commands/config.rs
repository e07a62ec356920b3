use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ccdred_core::pipeline::ReductionPlan;

#[derive(Args)]
pub struct ConfigArgs {
    /// Write the plan to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print or save a default bias, dark, flat and science plan as TOML.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let toml_str = ReductionPlan::example().to_toml_string()?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &toml_str)
            .with_context(|| format!("Failed to write plan to {}", path.display()))?;
        println!("Default plan saved to {}", path.display());
    } else {
        print!("{}", toml_str);
    }

    Ok(())
}
