mod commands;
mod progress;
mod summary;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ccdred_core::frame::ProductKind;

#[derive(Parser)]
#[command(name = "ccdred", about = "CCD frame reduction: master bias, dark, flat and cleaned frames")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Combine bias frames into master biases
    Bias(commands::calibrate::CalibrateArgs),
    /// Combine dark frames into master darks
    Dark(commands::calibrate::CalibrateArgs),
    /// Combine flat frames into normalized master flats
    Flat(commands::calibrate::CalibrateArgs),
    /// Apply master frames to object frames
    Clean(commands::calibrate::CalibrateArgs),
    /// Run a multi-stage reduction plan
    Run(commands::pipeline::RunArgs),
    /// Print header keywords and the groups they form
    Sort(commands::sort::SortArgs),
    /// Print a default reduction plan
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let ok = match &cli.command {
        Commands::Bias(args) => commands::calibrate::run(ProductKind::Bias, args)?,
        Commands::Dark(args) => commands::calibrate::run(ProductKind::Dark, args)?,
        Commands::Flat(args) => commands::calibrate::run(ProductKind::Flat, args)?,
        Commands::Clean(args) => commands::calibrate::run(ProductKind::Clean, args)?,
        Commands::Run(args) => commands::pipeline::run(args)?,
        Commands::Sort(args) => commands::sort::run(args).map(|()| true)?,
        Commands::Config(args) => commands::config::run(args).map(|()| true)?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
