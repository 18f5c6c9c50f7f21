use argh::FromArgs;
use std::path::PathBuf;

use splatpipe::clean::{clean_colmap_dir, CleanConfig};

#[derive(FromArgs)]
/// Remove outlier cameras and stray points from a COLMAP reconstruction
struct Args {
    /// directory with the COLMAP text or binary files
    #[argh(option, short = 'i')]
    input_dir: PathBuf,

    /// directory for the cleaned text files
    #[argh(option, short = 'o')]
    output_dir: PathBuf,

    /// JSON file with the clean parameters
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// reference point cloud (.ply), overrides the config
    #[argh(option, short = 'r')]
    reference: Option<PathBuf>,

    /// use this fixed camera distance threshold instead of the statistical one
    #[argh(option)]
    fixed_threshold: Option<f64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => CleanConfig::from_json_file(path)?,
        None => CleanConfig::default(),
    };
    if let Some(reference) = args.reference {
        config.reference_ply = Some(reference);
    }
    if let Some(threshold) = args.fixed_threshold {
        config.outlier_threshold_auto = false;
        config.outlier_threshold_fixed = threshold;
    }

    let report = clean_colmap_dir(&args.input_dir, &args.output_dir, &config)?;
    log::info!(
        "kept {} of {} images and {} of {} points",
        report.reconcile.images_after,
        report.reconcile.images_before,
        report.reconcile.points_after,
        report.reconcile.points_before
    );

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
