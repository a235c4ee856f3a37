//! Migration settings, loadable from TOML.
//!
//! ```toml
//! linear_tolerance = 1e-6
//! angular_tolerance = 1e-9
//! bbox_tolerance = 1e-6
//! validate = true
//! validate_binders = true
//! segments = 32
//! ```
//!
//! Every key is optional.

use crate::error::ConfigError;
use bodyplace_math::Tolerance;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for one migration pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationConfig {
    /// Translation below which a body placement counts as identity (mm).
    pub linear_tolerance: f64,
    /// Rotation angle below which a body placement counts as identity (rad).
    pub angular_tolerance: f64,
    /// Largest allowed bounding-box change after recompute (mm).
    pub bbox_tolerance: f64,
    /// Compare bounds after the transitions. The pass is recomputed and
    /// rolled back on new kernel failures either way.
    pub validate: bool,
    /// Include bound binder shapes in the comparison.
    pub validate_binders: bool,
    /// Circular resolution of the reference kernel.
    pub segments: u32,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            linear_tolerance: Tolerance::DEFAULT.linear,
            angular_tolerance: Tolerance::DEFAULT.angular,
            bbox_tolerance: 1e-6,
            validate: true,
            validate_binders: true,
            segments: 32,
        }
    }
}

impl MigrationConfig {
    /// Parse and check a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: MigrationConfig = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Identity tolerance for body placements.
    pub fn tolerance(&self) -> Tolerance {
        Tolerance {
            linear: self.linear_tolerance,
            angular: self.angular_tolerance,
        }
    }

    fn check(&self) -> Result<(), ConfigError> {
        let positive = [
            ("linear_tolerance", self.linear_tolerance),
            ("angular_tolerance", self.angular_tolerance),
            ("bbox_tolerance", self.bbox_tolerance),
        ];
        for (key, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid {
                    key,
                    message: format!("must be a positive number, got {value}"),
                });
            }
        }
        if self.segments < 4 {
            return Err(ConfigError::Invalid {
                key: "segments",
                message: format!("must be at least 4, got {}", self.segments),
            });
        }
        Ok(())
    }
}
