/// Represents a Colmap camera model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraModelId {
    /// Simple pinhole camera model
    SimplePinhole = 0,
    /// Pinhole camera model
    Pinhole = 1,
    /// Simplified radial camera model
    SimpleRadial = 2,
    /// Radial camera model
    Radial = 3,
    /// OpenCV camera model
    OpenCV = 4,
    /// OpenCV fisheye camera model
    OpenCVFisheye = 5,
    /// Full OpenCV camera model
    FullOpenCV = 6,
    /// Field of view camera model
    FOV = 7,
    /// Simple radial fisheye camera model
    SimpleRadialFisheye = 8,
    /// Radial fisheye camera model
    RadialFisheye = 9,
    /// Thin prism fisheye camera model
    ThinPrismFisheye = 10,
}

impl CameraModelId {
    const ALL: [CameraModelId; 11] = [
        CameraModelId::SimplePinhole,
        CameraModelId::Pinhole,
        CameraModelId::SimpleRadial,
        CameraModelId::Radial,
        CameraModelId::OpenCV,
        CameraModelId::OpenCVFisheye,
        CameraModelId::FullOpenCV,
        CameraModelId::FOV,
        CameraModelId::SimpleRadialFisheye,
        CameraModelId::RadialFisheye,
        CameraModelId::ThinPrismFisheye,
    ];

    /// Look up a model by the name used in `cameras.txt`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|model| model.name() == name)
    }

    /// Look up a model by the numeric id used in `cameras.bin`.
    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|model| *model as i32 == id)
    }

    /// The name used in `cameras.txt`.
    pub fn name(&self) -> &'static str {
        match self {
            CameraModelId::SimplePinhole => "SIMPLE_PINHOLE",
            CameraModelId::Pinhole => "PINHOLE",
            CameraModelId::SimpleRadial => "SIMPLE_RADIAL",
            CameraModelId::Radial => "RADIAL",
            CameraModelId::OpenCV => "OPENCV",
            CameraModelId::OpenCVFisheye => "OPENCV_FISHEYE",
            CameraModelId::FullOpenCV => "FULL_OPENCV",
            CameraModelId::FOV => "FOV",
            CameraModelId::SimpleRadialFisheye => "SIMPLE_RADIAL_FISHEYE",
            CameraModelId::RadialFisheye => "RADIAL_FISHEYE",
            CameraModelId::ThinPrismFisheye => "THIN_PRISM_FISHEYE",
        }
    }

    /// Number of intrinsic parameters the model carries.
    pub fn num_params(&self) -> usize {
        match self {
            CameraModelId::SimplePinhole => 3,
            CameraModelId::Pinhole
            | CameraModelId::SimpleRadial
            | CameraModelId::SimpleRadialFisheye => 4,
            CameraModelId::Radial | CameraModelId::FOV | CameraModelId::RadialFisheye => 5,
            CameraModelId::OpenCV | CameraModelId::OpenCVFisheye => 8,
            CameraModelId::FullOpenCV | CameraModelId::ThinPrismFisheye => 12,
        }
    }
}

/// Represents a camera in the Colmap system.
#[derive(Debug, Clone, PartialEq)]
pub struct ColmapCamera {
    /// Camera id
    pub camera_id: u32,
    /// Camera model id
    pub model_id: CameraModelId,
    /// Image width
    pub width: usize,
    /// Image height
    pub height: usize,
    /// Camera parameters
    pub params: Vec<f64>,
}

/// A 2D keypoint of an image, optionally observing a 3D point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColmapPoint2d {
    /// Pixel coordinates
    pub xy: [f64; 2],
    /// Observed 3D point, `None` when the file stores `-1`.
    pub point3d_id: Option<u64>,
}

/// Represents an image in the Colmap system.
#[derive(Debug, Clone, PartialEq)]
pub struct ColmapImage {
    /// Image id
    pub image_id: u32,
    /// Rotation
    pub rotation: [f64; 4], // qw, qx, qy, qz
    /// Translation
    pub translation: [f64; 3], // x, y, z
    /// Camera id
    pub camera_id: u32,
    /// Image name
    pub name: String,
    /// Points2d
    pub points2d: Vec<ColmapPoint2d>,
}

/// One element of a 3D point track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColmapTrackElement {
    /// Image observing the point
    pub image_id: u32,
    /// Index into that image's `points2d`
    pub point2d_idx: u32,
}

/// Represents a 3D point in the Colmap system.
#[derive(Debug, Clone, PartialEq)]
pub struct ColmapPoint3d {
    /// Point3d id
    pub point3d_id: u64,
    /// x, y, z coordinates
    pub xyz: [f64; 3],
    /// rgb color
    pub rgb: [u8; 3],
    /// Error
    pub error: f64,
    /// Track
    pub track: Vec<ColmapTrackElement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_model_lookup() {
        for model in CameraModelId::ALL {
            assert_eq!(CameraModelId::from_name(model.name()), Some(model));
            assert_eq!(CameraModelId::from_id(model as i32), Some(model));
        }
        assert_eq!(CameraModelId::from_name("PINHOLE").map(|m| m.num_params()), Some(4));
        assert_eq!(CameraModelId::from_name("pinhole"), None);
        assert_eq!(CameraModelId::from_id(11), None);
    }
}
