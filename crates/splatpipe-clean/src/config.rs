use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use splatpipe_3d::transforms::AxisTransform;

/// Error types for the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("Failed to read config file")]
    Io(#[from] std::io::Error),

    /// Failed to parse the config file
    #[error("Failed to parse config file")]
    Json(#[from] serde_json::Error),

    /// A value is out of range
    #[error("Invalid config value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Parameters of the COLMAP clean step.
///
/// Every field has a default, so a config file only needs the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanConfig {
    /// Use the statistical camera threshold when it is reliable.
    pub outlier_threshold_auto: bool,
    /// Camera distance threshold used when auto mode is off or the statistics are unreliable.
    pub outlier_threshold_fixed: f64,
    /// Cameras farther than `dispersion_multiplier * dispersion` from the center are outliers.
    pub dispersion_multiplier: f64,
    /// With fewer cameras than this the statistical threshold is not trusted.
    pub min_cameras: usize,
    /// Points farther than this from every reference point are removed.
    pub proximity_threshold: f64,
    /// Row-major mapping from the reference cloud convention into COLMAP coordinates.
    pub coordinate_transform: [f64; 9],
    /// Reference point cloud; when unset the first `*.ply` of the input directory is used.
    pub reference_ply: Option<PathBuf>,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            outlier_threshold_auto: true,
            outlier_threshold_fixed: 100.0,
            dispersion_multiplier: 2.5,
            min_cameras: 10,
            proximity_threshold: 0.001,
            coordinate_transform: [1.0, 0.0, 0.0, 0.0, 0.0, -1.0, 0.0, 1.0, 0.0],
            reference_ply: None,
        }
    }
}

impl CleanConfig {
    /// Load and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: CleanConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every threshold is finite and in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_negative = |field: &'static str, value: f64| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("expected a finite non-negative number, got {value}"),
                })
            }
        };

        non_negative("outlier_threshold_fixed", self.outlier_threshold_fixed)?;
        non_negative("proximity_threshold", self.proximity_threshold)?;

        if !(self.dispersion_multiplier.is_finite() && self.dispersion_multiplier > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "dispersion_multiplier",
                reason: format!(
                    "expected a finite positive number, got {}",
                    self.dispersion_multiplier
                ),
            });
        }

        if self.coordinate_transform.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::InvalidValue {
                field: "coordinate_transform",
                reason: "all nine values must be finite".to_string(),
            });
        }

        Ok(())
    }

    /// The configured reference-to-COLMAP mapping.
    pub fn axis_transform(&self) -> AxisTransform {
        AxisTransform::from_row_major(self.coordinate_transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() -> Result<(), ConfigError> {
        let config = CleanConfig::default();
        config.validate()?;
        assert_eq!(config.min_cameras, 10);
        assert_eq!(config.axis_transform(), AxisTransform::Z_UP_TO_COLMAP);
        Ok(())
    }

    #[test]
    fn test_partial_json_keeps_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("clean.json");
        std::fs::write(
            &path,
            r#"{ "proximity_threshold": 0.05, "min_cameras": 3, "reference_ply": "ref.ply" }"#,
        )?;

        let config = CleanConfig::from_json_file(&path)?;
        assert_eq!(config.proximity_threshold, 0.05);
        assert_eq!(config.min_cameras, 3);
        assert_eq!(config.reference_ply, Some(PathBuf::from("ref.ply")));
        assert_eq!(config.dispersion_multiplier, 2.5);
        assert!(config.outlier_threshold_auto);
        Ok(())
    }

    #[test]
    fn test_invalid_values() {
        let config = CleanConfig {
            proximity_threshold: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "proximity_threshold",
                ..
            })
        ));

        let config = CleanConfig {
            dispersion_multiplier: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CleanConfig {
            outlier_threshold_fixed: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("clean.json");
        std::fs::write(&path, "{ \"min_cameras\": \"ten\" }")?;
        assert!(matches!(
            CleanConfig::from_json_file(&path),
            Err(ConfigError::Json(_))
        ));
        Ok(())
    }
}
