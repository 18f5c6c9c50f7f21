use std::collections::BTreeSet;

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use serde::Serialize;
use splatpipe_3d::{
    io::colmap::{ColmapError, ColmapPoint3d},
    pointcloud::PointCloud,
    transforms::AxisTransform,
};

/// Exact nearest-neighbor index over a reference point cloud, in COLMAP coordinates.
///
/// The axis transform is applied once, while building; queries take COLMAP positions as-is.
pub struct ProximityIndex {
    kdtree: Option<ImmutableKdTree<f64, u32, 3, 32>>,
    len: usize,
    bounds: Option<([f64; 3], [f64; 3])>,
}

impl ProximityIndex {
    /// Build the index from a reference cloud in its own convention.
    ///
    /// # Arguments
    ///
    /// * `reference` - The reference cloud, e.g. a hand-cleaned export.
    /// * `transform` - Mapping from the reference convention into COLMAP coordinates.
    pub fn build(reference: &PointCloud, transform: &AxisTransform) -> Self {
        let points = transform.apply_all(reference.points());
        let bounds = PointCloud::new(points.clone(), None, None).bounds();

        // kiddo needs at least one point to build a tree
        let kdtree = (!points.is_empty()).then(|| ImmutableKdTree::new_from_slice(&points));

        log::debug!(
            "built proximity index over {} reference points, bounds {:?}",
            points.len(),
            bounds
        );

        Self {
            kdtree,
            len: points.len(),
            bounds,
        }
    }

    /// Number of reference points.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the reference cloud was empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bounds of the reference points in COLMAP coordinates.
    pub fn bounds(&self) -> Option<([f64; 3], [f64; 3])> {
        self.bounds
    }

    /// Distance from `point` to its nearest reference point, `None` for an empty index.
    pub fn nearest_distance(&self, point: &[f64; 3]) -> Option<f64> {
        let kdtree = self.kdtree.as_ref()?;
        let nn = kdtree.nearest_one::<kiddo::SquaredEuclidean>(point);
        Some(nn.distance.sqrt())
    }

    /// Whether some reference point lies within `threshold` of `point`.
    pub fn is_near(&self, point: &[f64; 3], threshold: f64) -> bool {
        let Some(kdtree) = self.kdtree.as_ref() else {
            return false;
        };
        // compare squared distances to avoid a sqrt per query
        let nn = kdtree.nearest_one::<kiddo::SquaredEuclidean>(point);
        nn.distance <= threshold * threshold
    }

    /// Ids of the points within `threshold` of the reference cloud.
    pub fn kept_point_ids<'a>(
        &self,
        points: impl IntoIterator<Item = &'a ColmapPoint3d>,
        threshold: f64,
    ) -> BTreeSet<u64> {
        points
            .into_iter()
            .filter(|point| self.is_near(&point.xyz, threshold))
            .map(|point| point.point3d_id)
            .collect()
    }
}

/// Counts gathered while filtering a point stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PointFilterStats {
    /// Number of reference points in the index.
    pub reference_points: usize,
    /// Bounds of the reference points in COLMAP coordinates.
    pub reference_bounds: Option<([f64; 3], [f64; 3])>,
    /// Distance threshold used.
    pub threshold: f64,
    /// Points read.
    pub points_before: usize,
    /// Points kept.
    pub points_after: usize,
}

/// Stream 3D points through the index, keeping only the points near the reference cloud.
///
/// Only the survivors are held in memory. The first read error aborts the filter.
pub fn filter_points3d<I>(
    index: &ProximityIndex,
    points: I,
    threshold: f64,
) -> Result<(Vec<ColmapPoint3d>, PointFilterStats), ColmapError>
where
    I: IntoIterator<Item = Result<ColmapPoint3d, ColmapError>>,
{
    if index.is_empty() {
        log::warn!("reference point cloud is empty, every 3D point will be removed");
    }

    let mut stats = PointFilterStats {
        reference_points: index.len(),
        reference_bounds: index.bounds(),
        threshold,
        ..Default::default()
    };

    let mut kept = Vec::new();
    for point in points {
        let point = point?;
        stats.points_before += 1;
        if index.is_near(&point.xyz, threshold) {
            kept.push(point);
        }
    }
    stats.points_after = kept.len();

    log::info!(
        "proximity filter kept {} of {} points (threshold {})",
        stats.points_after,
        stats.points_before,
        threshold
    );

    Ok((kept, stats))
}
