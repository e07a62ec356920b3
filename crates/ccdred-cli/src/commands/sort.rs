use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ccdred_core::frame::Frame;
use ccdred_core::group::group_frames;
use ccdred_core::io::FitsStore;
use ccdred_core::pipeline::expand_inputs;

#[derive(Args)]
pub struct SortArgs {
    /// Input FITS files or directories
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Keywords to show and group by (comma-separated)
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub keys: Vec<String>,
}

/// Print one row of keyword values per file, then the groups they form.
pub fn run(args: &SortArgs) -> Result<()> {
    let store = FitsStore;
    let files = expand_inputs(&args.files).context("Failed to list inputs")?;

    let mut frames = Vec::with_capacity(files.len());
    let mut rows = Vec::with_capacity(files.len());
    for path in &files {
        let name = path.display().to_string();
        match Frame::open(&store, path) {
            Ok(frame) => {
                let values: Vec<String> = args
                    .keys
                    .iter()
                    .map(|k| {
                        frame
                            .header
                            .get(k)
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "-".into())
                    })
                    .collect();
                rows.push((name, values));
                frames.push(frame);
            }
            Err(e) => rows.push((name, vec![format!("<{e}>")])),
        }
    }

    let mut widths: Vec<usize> = args.keys.iter().map(|k| k.len()).collect();
    let name_width = rows.iter().map(|(n, _)| n.len()).max().unwrap_or(4).max(4);
    for (_, values) in &rows {
        for (w, v) in widths.iter_mut().zip(values) {
            *w = (*w).max(v.len());
        }
    }

    print!("{:<name_width$}", "FILE");
    for (key, w) in args.keys.iter().zip(widths.iter().copied()) {
        print!("  {:<w$}", key.to_uppercase());
    }
    println!();
    for (name, values) in &rows {
        print!("{name:<name_width$}");
        for (value, w) in values.iter().zip(widths.iter().copied()) {
            print!("  {value:<w$}");
        }
        println!();
    }

    let groups = group_frames(frames, &args.keys);
    println!();
    println!("{} group(s)", groups.len());
    for (key, members) in groups.iter() {
        println!("  {:<40}{} frame(s)", groups.describe(key), members.len());
    }
    for (path, err) in groups.unassigned() {
        println!("  unassigned: {} ({err})", path.display());
    }
    Ok(())
}
