use std::{
    collections::BTreeSet,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use serde::Serialize;
use splatpipe_3d::io::{
    colmap::{
        write_cameras_txt, write_images_txt, write_points3d_txt, BinaryRecord, BinaryRecords,
        ColmapCamera, ColmapError, ColmapFormat, ColmapImage, ColmapPoint3d, TextRecord,
        TextRecords,
    },
    ply::{read_ply_binary, PlyError},
};

use crate::{
    filter::{analyze_cameras, filter_points3d, CameraAnalysis, PointFilterStats, ProximityIndex},
    reconcile::{reconcile, ReconcileStats, ReferenceIntegrityError},
    CleanConfig, ConfigError,
};

/// Error types for the clean step.
#[derive(Debug, thiserror::Error)]
pub enum CleanError {
    /// Failed to read a COLMAP file
    #[error(transparent)]
    Colmap(#[from] ColmapError),

    /// Failed to read the reference point cloud
    #[error(transparent)]
    Ply(#[from] PlyError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Reconciliation produced a dangling reference
    #[error(transparent)]
    ReferenceIntegrity(#[from] ReferenceIntegrityError),

    /// Failed to write an output file
    #[error("Failed to write output file")]
    Io(#[from] std::io::Error),

    /// The input directory holds neither the text nor the binary COLMAP files
    #[error("No COLMAP reconstruction found in {}", .0.display())]
    NoColmapData(PathBuf),
}

/// How the camera outlier threshold was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    /// Statistical threshold.
    Auto,
    /// Configured fixed threshold, auto mode disabled.
    Fixed,
    /// Configured fixed threshold because the statistics were unreliable.
    Fallback,
}

/// Summary of a clean run.
#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    /// Extension of the input layout, `txt` or `bin`.
    pub input_format: &'static str,
    /// Number of cameras copied through.
    pub cameras: usize,
    /// Camera position statistics.
    pub camera_analysis: CameraAnalysis,
    /// How the threshold was chosen.
    pub threshold_mode: ThresholdMode,
    /// Camera distance threshold applied.
    pub threshold_used: f64,
    /// Why the statistical threshold was not trusted, if it was not.
    pub reliability_warning: Option<String>,
    /// Names of the removed images.
    pub outliers: Vec<String>,
    /// Reference point cloud used, if any.
    pub reference_ply: Option<PathBuf>,
    /// Proximity filter counts, `None` without a reference cloud.
    pub point_filter: Option<PointFilterStats>,
    /// Reconciliation counts.
    pub reconcile: ReconcileStats,
    /// Link to the input `images/` folder created in the output directory, if any.
    pub images_link: Option<PathBuf>,
}

fn open_records<T>(
    dir: &Path,
    stem: &str,
    format: ColmapFormat,
) -> Result<Box<dyn Iterator<Item = Result<T, ColmapError>>>, ColmapError>
where
    T: TextRecord + BinaryRecord + 'static,
{
    let path = dir.join(format!("{stem}.{}", format.extension()));
    let records: Box<dyn Iterator<Item = Result<T, ColmapError>>> = match format {
        ColmapFormat::Text => Box::new(TextRecords::<_, T>::open(path)?),
        ColmapFormat::Binary => Box::new(BinaryRecords::<_, T>::open(path)?),
    };
    Ok(records)
}

/// The reference cloud named by the config, else the first `*.ply` of `input_dir` by name.
///
/// A configured path is returned even when it does not exist, so opening it fails instead of
/// silently picking another cloud from the directory.
pub fn find_reference_ply(
    input_dir: impl AsRef<Path>,
    config: &CleanConfig,
) -> Result<Option<PathBuf>, std::io::Error> {
    if let Some(path) = &config.reference_ply {
        return Ok(Some(path.clone()));
    }

    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(input_dir)? {
        let path = entry?.path();
        let is_ply = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("ply"));
        if is_ply && path.is_file() {
            candidates.push(path);
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

/// Link `input_dir/images` into `output_dir` so the cleaned reconstruction still finds its
/// photographs.
///
/// Nothing is done when the source folder is missing or `output_dir/images` already exists.
/// Returns the created link.
pub fn link_images_dir(
    input_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
) -> Result<Option<PathBuf>, std::io::Error> {
    let source = input_dir.as_ref().join("images");
    let target = output_dir.as_ref().join("images");

    // symlink_metadata also sees dangling links
    if !source.is_dir() || target.symlink_metadata().is_ok() {
        return Ok(None);
    }
    let source = std::fs::canonicalize(source)?;

    #[cfg(unix)]
    std::os::unix::fs::symlink(&source, &target)?;
    #[cfg(windows)]
    std::os::windows::fs::symlink_dir(&source, &target)?;
    #[cfg(not(any(unix, windows)))]
    {
        log::warn!("cannot link {} on this platform", source.display());
        return Ok(None);
    }

    log::info!("linked {} -> {}", target.display(), source.display());
    Ok(Some(target))
}

/// Clean a COLMAP reconstruction against a reference point cloud.
///
/// Removes the outlier cameras and the 3D points far from the reference cloud, then writes a
/// consistent text reconstruction to `output_dir`. The outputs are only put in place once the
/// whole reconstruction has been read and reconciled; on error `output_dir` is left untouched.
///
/// # Arguments
///
/// * `input_dir` - Directory with `cameras`, `images` and `points3D` in text or binary layout.
/// * `output_dir` - Directory for the cleaned text files, created if missing. May equal
///   `input_dir`.
/// * `config` - Clean parameters.
pub fn clean_colmap_dir(
    input_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &CleanConfig,
) -> Result<CleanReport, CleanError> {
    let input_dir = input_dir.as_ref();
    let output_dir = output_dir.as_ref();
    config.validate()?;

    let format = ColmapFormat::detect(input_dir)
        .ok_or_else(|| CleanError::NoColmapData(input_dir.to_path_buf()))?;
    log::info!("cleaning {:?} COLMAP data in {}", format, input_dir.display());

    let cameras = open_records::<ColmapCamera>(input_dir, "cameras", format)?
        .collect::<Result<Vec<_>, _>>()?;
    let images = open_records::<ColmapImage>(input_dir, "images", format)?
        .collect::<Result<Vec<_>, _>>()?;

    let camera_analysis = analyze_cameras(
        &images,
        config.dispersion_multiplier,
        config.min_cameras,
    );
    log::info!(
        "{} cameras, center {:?}, dispersion {:.4}",
        camera_analysis.len(),
        camera_analysis.center,
        camera_analysis.dispersion
    );

    let (threshold_mode, threshold_used, reliability_warning) = if !config.outlier_threshold_auto
    {
        (ThresholdMode::Fixed, config.outlier_threshold_fixed, None)
    } else {
        match camera_analysis.trusted_threshold() {
            Ok(threshold) => (ThresholdMode::Auto, threshold, None),
            Err(warning) => {
                log::warn!(
                    "{}, falling back to the fixed threshold {}",
                    warning,
                    config.outlier_threshold_fixed
                );
                (
                    ThresholdMode::Fallback,
                    config.outlier_threshold_fixed,
                    Some(warning.to_string()),
                )
            }
        }
    };

    let kept_image_ids = camera_analysis.kept_image_ids(threshold_used);
    let outliers = camera_analysis
        .outliers(threshold_used)
        .map(|camera| {
            log::info!(
                "removing camera {} at distance {:.4} (threshold {:.4})",
                camera.name,
                camera.distance,
                threshold_used
            );
            camera.name.clone()
        })
        .collect::<Vec<_>>();

    let reference_ply = find_reference_ply(input_dir, config)?;
    let points3d = open_records::<ColmapPoint3d>(input_dir, "points3D", format)?;
    let (points, point_filter) = match &reference_ply {
        Some(path) => {
            log::info!("reading reference point cloud {}", path.display());
            let reference = read_ply_binary(path)?;
            let index = ProximityIndex::build(&reference, &config.axis_transform());
            let (points, stats) =
                filter_points3d(&index, points3d, config.proximity_threshold)?;
            (points, Some(stats))
        }
        None => {
            log::warn!("no reference point cloud found, keeping every 3D point");
            (points3d.collect::<Result<Vec<_>, _>>()?, None)
        }
    };
    let kept_point_ids: BTreeSet<u64> = points.iter().map(|point| point.point3d_id).collect();

    let reconciled = reconcile(images, points, &kept_image_ids, &kept_point_ids)?;

    std::fs::create_dir_all(output_dir)?;
    write_outputs(output_dir, &cameras, &reconciled.images, &reconciled.points)?;
    log::info!("wrote cleaned reconstruction to {}", output_dir.display());

    let images_link = link_images_dir(input_dir, output_dir)?;

    Ok(CleanReport {
        input_format: format.extension(),
        cameras: cameras.len(),
        camera_analysis,
        threshold_mode,
        threshold_used,
        reliability_warning,
        outliers,
        reference_ply,
        point_filter,
        reconcile: reconciled.stats,
        images_link,
    })
}

fn write_outputs(
    output_dir: &Path,
    cameras: &[ColmapCamera],
    images: &[ColmapImage],
    points: &[ColmapPoint3d],
) -> Result<(), CleanError> {
    let targets = ["cameras.txt", "images.txt", "points3D.txt"].map(|name| output_dir.join(name));
    let temps = targets.clone().map(|target| target.with_extension("txt.tmp"));

    if let Err(e) = write_temps(&temps, cameras, images, points) {
        for temp in &temps {
            let _ = std::fs::remove_file(temp);
        }
        return Err(e.into());
    }

    replace_outputs(&temps, &targets)?;
    Ok(())
}

/// Move the written temp files over the targets, all or nothing.
///
/// Existing targets are moved aside first; if any rename fails they are restored and the temp
/// files removed.
fn replace_outputs(temps: &[PathBuf; 3], targets: &[PathBuf; 3]) -> Result<(), std::io::Error> {
    let backups = targets.clone().map(|target| target.with_extension("txt.bak"));
    let mut backed_up = [false; 3];
    let mut placed = [false; 3];

    if let Err(e) = move_into_place(temps, targets, &backups, &mut backed_up, &mut placed) {
        for (i, target) in targets.iter().enumerate() {
            if placed[i] {
                let _ = std::fs::remove_file(target);
            }
            if backed_up[i] {
                let _ = std::fs::rename(&backups[i], target);
            }
            let _ = std::fs::remove_file(&temps[i]);
        }
        return Err(e);
    }

    for (backup, was_backed_up) in backups.iter().zip(backed_up) {
        if was_backed_up {
            if let Err(e) = std::fs::remove_file(backup) {
                log::warn!("could not remove {}: {}", backup.display(), e);
            }
        }
    }
    Ok(())
}

fn move_into_place(
    temps: &[PathBuf; 3],
    targets: &[PathBuf; 3],
    backups: &[PathBuf; 3],
    backed_up: &mut [bool; 3],
    placed: &mut [bool; 3],
) -> Result<(), std::io::Error> {
    for ((target, backup), flag) in targets.iter().zip(backups).zip(backed_up.iter_mut()) {
        if target.exists() {
            std::fs::rename(target, backup)?;
            *flag = true;
        }
    }
    for ((temp, target), flag) in temps.iter().zip(targets).zip(placed.iter_mut()) {
        std::fs::rename(temp, target)?;
        *flag = true;
    }
    Ok(())
}

fn write_temps(
    temps: &[PathBuf; 3],
    cameras: &[ColmapCamera],
    images: &[ColmapImage],
    points: &[ColmapPoint3d],
) -> Result<(), ColmapError> {
    write_cameras_txt(BufWriter::new(File::create(&temps[0])?), cameras)?;
    write_images_txt(BufWriter::new(File::create(&temps[1])?), images)?;
    write_points3d_txt(BufWriter::new(File::create(&temps[2])?), points)?;
    Ok(())
}
