use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use splatpipe_3d::io::colmap::{ColmapImage, ColmapPoint3d, ColmapTrackElement};

/// A reconciled dataset references something that does not exist.
///
/// Reconciliation never produces these from bad input; seeing one means a logic defect.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReferenceIntegrityError {
    /// Point ids are not `0..N` in order.
    #[error("point at position {position} has id {found}, ids must be contiguous from 0")]
    NonContiguousIds {
        /// Index in the point sequence.
        position: usize,
        /// Id found there.
        found: u64,
    },

    /// An observation references a point that is not in the point set.
    #[error("image {image_id} observation {point2d_idx} references missing point {point3d_id}")]
    DanglingObservation {
        /// Image holding the observation.
        image_id: u32,
        /// Index of the observation.
        point2d_idx: usize,
        /// Missing point id.
        point3d_id: u64,
    },

    /// A track references an image that is not in the image set.
    #[error("point {point3d_id} track references missing image {image_id}")]
    DanglingTrackImage {
        /// Point holding the track.
        point3d_id: u64,
        /// Missing image id.
        image_id: u32,
    },

    /// A track references an observation that does not observe the point.
    #[error(
        "point {point3d_id} track references observation {point2d_idx} of image {image_id}, which does not observe it"
    )]
    DanglingTrackObservation {
        /// Point holding the track.
        point3d_id: u64,
        /// Image referenced by the track.
        image_id: u32,
        /// Observation index referenced by the track.
        point2d_idx: u32,
    },
}

/// Contiguous renumbering of the surviving 3D points.
///
/// New ids are assigned in ascending order of the original ids, starting at 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointRenumbering {
    new_ids: BTreeMap<u64, u64>,
}

impl PointRenumbering {
    /// Build the renumbering from the complete set of surviving ids.
    pub fn from_kept_ids(kept: impl IntoIterator<Item = u64>) -> Self {
        let kept = kept.into_iter().collect::<BTreeSet<_>>();
        Self {
            new_ids: kept.into_iter().zip(0u64..).collect(),
        }
    }

    /// New id of an original point, `None` if the point was removed.
    #[inline]
    pub fn get(&self, original: u64) -> Option<u64> {
        self.new_ids.get(&original).copied()
    }

    /// Number of surviving points.
    pub fn len(&self) -> usize {
        self.new_ids.len()
    }

    /// Whether no point survived.
    pub fn is_empty(&self) -> bool {
        self.new_ids.is_empty()
    }

    /// `(original, new)` pairs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.new_ids.iter().map(|(k, v)| (*k, *v))
    }
}

/// Counts gathered while reconciling.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileStats {
    /// Images before reconciliation.
    pub images_before: usize,
    /// Images kept.
    pub images_after: usize,
    /// Points before reconciliation.
    pub points_before: usize,
    /// Points kept.
    pub points_after: usize,
    /// Observations referencing a 3D point, before.
    pub observations_before: usize,
    /// Observations referencing a 3D point, after.
    pub observations_after: usize,
    /// Observations dropped from kept images because their point was removed.
    pub observations_dropped: usize,
    /// Track elements dropped from kept points.
    pub track_elements_dropped: usize,
}

/// Result of [`reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    /// Original to new point ids.
    pub renumbering: PointRenumbering,
    /// Kept images, in input order, observations rewritten.
    pub images: Vec<ColmapImage>,
    /// Kept points, ordered by new id, tracks rewritten.
    pub points: Vec<ColmapPoint3d>,
    /// Counts.
    pub stats: ReconcileStats,
}

/// Rewrite images and points so that they only reference each other's survivors.
///
/// The renumbering is computed from the complete surviving point set before any rewriting, and
/// every rewrite is a lookup into it. Observations of removed points are dropped from their
/// image, which shifts the 2D indices; track elements are remapped to the shifted indices.
/// Observations without a 3D point are kept.
///
/// # Arguments
///
/// * `images` - All images.
/// * `points` - All points, or any superset of the kept ones.
/// * `kept_image_ids` - Images that survived the camera outlier removal.
/// * `kept_point_ids` - Points that survived the proximity filter.
pub fn reconcile(
    images: Vec<ColmapImage>,
    points: Vec<ColmapPoint3d>,
    kept_image_ids: &BTreeSet<u32>,
    kept_point_ids: &BTreeSet<u64>,
) -> Result<Reconciled, ReferenceIntegrityError> {
    let mut stats = ReconcileStats {
        images_before: images.len(),
        points_before: points.len(),
        observations_before: images
            .iter()
            .flat_map(|image| image.points2d.iter())
            .filter(|p| p.point3d_id.is_some())
            .count(),
        ..Default::default()
    };

    let renumbering = PointRenumbering::from_kept_ids(
        points
            .iter()
            .map(|point| point.point3d_id)
            .filter(|id| kept_point_ids.contains(id)),
    );

    // old 2D index -> new 2D index, per kept image
    let mut index_maps: HashMap<u32, Vec<Option<u32>>> = HashMap::new();
    let mut kept_images = Vec::with_capacity(kept_image_ids.len());

    for mut image in images {
        if !kept_image_ids.contains(&image.image_id) {
            continue;
        }

        let mut index_map = Vec::with_capacity(image.points2d.len());
        let mut points2d = Vec::with_capacity(image.points2d.len());
        for mut point2d in image.points2d {
            let keep = match point2d.point3d_id {
                None => true,
                Some(id) => match renumbering.get(id) {
                    Some(new_id) => {
                        point2d.point3d_id = Some(new_id);
                        true
                    }
                    None => false,
                },
            };
            if keep {
                index_map.push(Some(points2d.len() as u32));
                points2d.push(point2d);
            } else {
                index_map.push(None);
                stats.observations_dropped += 1;
            }
        }

        image.points2d = points2d;
        index_maps.insert(image.image_id, index_map);
        kept_images.push(image);
    }

    let image_slots = kept_images
        .iter()
        .enumerate()
        .map(|(slot, image)| (image.image_id, slot))
        .collect::<HashMap<_, _>>();

    let mut kept_points = points
        .into_iter()
        .filter_map(|point| {
            renumbering
                .get(point.point3d_id)
                .map(|new_id| (new_id, point))
        })
        .collect::<Vec<_>>();
    kept_points.sort_by_key(|(new_id, _)| *new_id);
    kept_points.dedup_by_key(|(new_id, _)| *new_id);

    let kept_points = kept_points
        .into_iter()
        .map(|(new_id, mut point)| {
            let track_len = point.track.len();
            point.track = point
                .track
                .into_iter()
                .filter_map(|element| {
                    let new_idx = index_maps
                        .get(&element.image_id)?
                        .get(element.point2d_idx as usize)
                        .copied()
                        .flatten()?;
                    let slot = *image_slots.get(&element.image_id)?;
                    // the observation must still point back at this point
                    let observes = kept_images[slot].points2d[new_idx as usize].point3d_id
                        == Some(new_id);
                    observes.then_some(ColmapTrackElement {
                        image_id: element.image_id,
                        point2d_idx: new_idx,
                    })
                })
                .collect();
            stats.track_elements_dropped += track_len - point.track.len();
            point.point3d_id = new_id;
            point
        })
        .collect::<Vec<_>>();

    stats.images_after = kept_images.len();
    stats.points_after = kept_points.len();
    stats.observations_after = kept_images
        .iter()
        .flat_map(|image| image.points2d.iter())
        .filter(|p| p.point3d_id.is_some())
        .count();

    verify_references(&kept_images, &kept_points)?;

    log::info!(
        "reconciled {} of {} images and {} of {} points, dropped {} observations and {} track elements",
        stats.images_after,
        stats.images_before,
        stats.points_after,
        stats.points_before,
        stats.observations_dropped,
        stats.track_elements_dropped
    );

    Ok(Reconciled {
        renumbering,
        images: kept_images,
        points: kept_points,
        stats,
    })
}

/// Check that point ids are `0..N` in order and that every observation and track element
/// resolves.
pub fn verify_references(
    images: &[ColmapImage],
    points: &[ColmapPoint3d],
) -> Result<(), ReferenceIntegrityError> {
    for (position, point) in points.iter().enumerate() {
        if point.point3d_id != position as u64 {
            return Err(ReferenceIntegrityError::NonContiguousIds {
                position,
                found: point.point3d_id,
            });
        }
    }

    for image in images {
        for (point2d_idx, point2d) in image.points2d.iter().enumerate() {
            if let Some(point3d_id) = point2d.point3d_id {
                if point3d_id >= points.len() as u64 {
                    return Err(ReferenceIntegrityError::DanglingObservation {
                        image_id: image.image_id,
                        point2d_idx,
                        point3d_id,
                    });
                }
            }
        }
    }

    let images_by_id = images
        .iter()
        .map(|image| (image.image_id, image))
        .collect::<HashMap<_, _>>();

    for point in points {
        for element in &point.track {
            let image = images_by_id.get(&element.image_id).ok_or(
                ReferenceIntegrityError::DanglingTrackImage {
                    point3d_id: point.point3d_id,
                    image_id: element.image_id,
                },
            )?;
            let observes = image
                .points2d
                .get(element.point2d_idx as usize)
                .is_some_and(|p| p.point3d_id == Some(point.point3d_id));
            if !observes {
                return Err(ReferenceIntegrityError::DanglingTrackObservation {
                    point3d_id: point.point3d_id,
                    image_id: element.image_id,
                    point2d_idx: element.point2d_idx,
                });
            }
        }
    }

    Ok(())
}
