use std::collections::BTreeSet;

use serde::Serialize;
use splatpipe_3d::{io::colmap::ColmapImage, pointcloud::PointCloud};

/// The camera statistics are not trustworthy; a fixed threshold should be used instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StatisticalReliabilityWarning {
    /// Too few cameras for a meaningful dispersion.
    #[error("only {count} cameras, at least {minimum} needed for a reliable outlier threshold")]
    TooFewCameras {
        /// Number of cameras analyzed.
        count: usize,
        /// Configured minimum.
        minimum: usize,
    },

    /// The cameras share a position, so every threshold collapses to zero.
    #[error("camera positions have zero dispersion")]
    DegenerateDispersion,
}

/// Distance of one camera from the center of all cameras.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraDistance {
    /// Image id
    pub image_id: u32,
    /// Image name
    pub name: String,
    /// Translation of the pose
    pub translation: [f64; 3],
    /// Euclidean distance from the center
    pub distance: f64,
}

/// Position statistics of a set of camera poses.
///
/// The center is the per-axis median of the translations and the dispersion is the median
/// distance from that center, so a minority of far-away poses moves neither.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraAnalysis {
    /// Per-axis median of the translations.
    pub center: [f64; 3],
    /// Median distance from the center.
    pub dispersion: f64,
    /// `multiplier * dispersion`.
    pub threshold: f64,
    /// Per-axis minimum and maximum of the translations.
    pub bounds: Option<([f64; 3], [f64; 3])>,
    /// Every camera with its distance, in input order.
    pub cameras: Vec<CameraDistance>,
    min_cameras: usize,
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    match values.len() % 2 {
        0 => (values[mid - 1] + values[mid]) / 2.0,
        _ => values[mid],
    }
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

/// Compute the camera position statistics.
///
/// # Arguments
///
/// * `images` - The posed images.
/// * `multiplier` - Cameras farther than `multiplier * dispersion` are outliers.
/// * `min_cameras` - With fewer cameras the threshold is reported as unreliable.
pub fn analyze_cameras<'a>(
    images: impl IntoIterator<Item = &'a ColmapImage>,
    multiplier: f64,
    min_cameras: usize,
) -> CameraAnalysis {
    let mut cameras = images
        .into_iter()
        .map(|image| CameraDistance {
            image_id: image.image_id,
            name: image.name.clone(),
            translation: image.translation,
            distance: 0.0,
        })
        .collect::<Vec<_>>();

    let mut axis = Vec::with_capacity(cameras.len());
    let center: [f64; 3] = std::array::from_fn(|i| {
        axis.clear();
        axis.extend(cameras.iter().map(|c| c.translation[i]));
        median(&mut axis)
    });

    for camera in cameras.iter_mut() {
        camera.distance = distance(&camera.translation, &center);
    }

    let mut distances = cameras.iter().map(|c| c.distance).collect::<Vec<_>>();
    let dispersion = median(&mut distances);
    let bounds = PointCloud::new(cameras.iter().map(|c| c.translation).collect(), None, None)
        .bounds();

    CameraAnalysis {
        center,
        dispersion,
        threshold: multiplier * dispersion,
        bounds,
        cameras,
        min_cameras,
    }
}

impl CameraAnalysis {
    /// Number of cameras analyzed.
    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    /// Whether no camera was analyzed.
    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    /// The statistical threshold, or the reason it should not be trusted.
    pub fn trusted_threshold(&self) -> Result<f64, StatisticalReliabilityWarning> {
        if self.cameras.len() < self.min_cameras {
            return Err(StatisticalReliabilityWarning::TooFewCameras {
                count: self.cameras.len(),
                minimum: self.min_cameras,
            });
        }
        if !(self.dispersion.is_finite() && self.dispersion > 0.0) {
            return Err(StatisticalReliabilityWarning::DegenerateDispersion);
        }
        Ok(self.threshold)
    }

    /// Cameras strictly farther than `threshold` from the center.
    pub fn outliers(&self, threshold: f64) -> impl Iterator<Item = &CameraDistance> + '_ {
        self.cameras.iter().filter(move |c| c.distance > threshold)
    }

    /// Ids of the images within `threshold` of the center.
    pub fn kept_image_ids(&self, threshold: f64) -> BTreeSet<u32> {
        self.cameras
            .iter()
            .filter(|c| c.distance <= threshold)
            .map(|c| c.image_id)
            .collect()
    }
}
