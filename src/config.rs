//! Layout configuration
//!
//! [`LayoutConfig`] is a plain value handed to the layout engine at
//! construction. It can be loaded from YAML or JSON; missing keys take their
//! defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of optimization iterations per tick
pub const DEFAULT_ITERATIONS_PER_FRAME: u32 = 20;

/// Default bound on line-search trials per iteration
pub const DEFAULT_SEARCH_ITERATIONS: u32 = 5;

/// Default number of stable iterations before the line search freezes
pub const DEFAULT_SWITCH_TO_MANUAL_AFTER: u32 = 250;

/// Default per-particle charge (repulsion strength)
pub const DEFAULT_REPULSION_FORCE: f32 = 50.0;

/// Default spring constant for links
pub const DEFAULT_SPRING_TENSION: f32 = 0.1;

/// Default sufficient-decrease constant
pub const DEFAULT_C1: f64 = 0.1;

/// Default curvature constant
pub const DEFAULT_C2: f64 = 0.9;

/// Default step length for the fixed and adaptive strategies
pub const DEFAULT_STEP_SIZE: f32 = 0.5;

/// Default multiplier from link rest length to layout units
pub const DEFAULT_LINK_REST_LENGTH_SCALE: f32 = 100.0;

/// Default particle mass
pub const DEFAULT_PARTICLE_MASS: f32 = 1.0;

/// Default rest-length stretch applied per new incident link
pub const DEFAULT_STRETCH_FACTOR: f32 = 1.1;

/// Default radius of the shell unpositioned nodes are scattered on
pub const DEFAULT_INITIAL_RADIUS: f32 = 1000.0;

/// Errors that can occur while loading or validating a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse failure
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parse failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The file extension is not a known config format
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// A value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Step-length control strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StepMode {
    /// Constant step, every trial accepted
    #[default]
    Fixed,
    /// Wolfe-condition line search that freezes once the step settles
    Auto,
    /// Momentum-style multiplicative adaptation
    Wolfram,
}

/// Which compute backend evaluates the kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Sequential CPU loops
    Scalar,
    /// Data-parallel CPU kernels (rayon)
    #[default]
    Parallel,
    /// wgpu compute shaders (requires the `gpu` feature)
    Gpu,
}

/// Configuration for the layout engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Optimization iterations per tick
    pub iterations_per_frame: u32,
    /// Maximum line-search trials per iteration
    pub search_iterations: u32,
    /// Stable iterations before the line search freezes the step
    pub switch_to_manual_after: u32,
    /// Step-length control strategy
    pub step_mode: StepMode,
    /// Per-particle charge
    pub repulsion_force: f32,
    /// Spring constant for links
    pub spring_tension: f32,
    /// Wolfe sufficient-decrease constant
    pub c1: f64,
    /// Wolfe curvature constant
    pub c2: f64,
    /// Initial step length for fixed and adaptive strategies
    pub step_size: f32,
    /// Multiplier applied to every link rest length
    pub link_rest_length_scale: f32,
    /// Mass given to every particle
    pub particle_mass: f32,
    /// Stretch applied to existing links when a new link is added at a node
    pub stretch_factor: f32,
    /// Radius of the shell unpositioned nodes start on
    pub initial_radius: f32,
    /// Compute backend
    pub backend: BackendKind,
    /// Seed for initial placement (random when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            iterations_per_frame: DEFAULT_ITERATIONS_PER_FRAME,
            search_iterations: DEFAULT_SEARCH_ITERATIONS,
            switch_to_manual_after: DEFAULT_SWITCH_TO_MANUAL_AFTER,
            step_mode: StepMode::default(),
            repulsion_force: DEFAULT_REPULSION_FORCE,
            spring_tension: DEFAULT_SPRING_TENSION,
            c1: DEFAULT_C1,
            c2: DEFAULT_C2,
            step_size: DEFAULT_STEP_SIZE,
            link_rest_length_scale: DEFAULT_LINK_REST_LENGTH_SCALE,
            particle_mass: DEFAULT_PARTICLE_MASS,
            stretch_factor: DEFAULT_STRETCH_FACTOR,
            initial_radius: DEFAULT_INITIAL_RADIUS,
            backend: BackendKind::default(),
            seed: None,
        }
    }
}

impl LayoutConfig {
    /// Load a configuration from a `.yaml`, `.yml` or `.json` file
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;

        let text = fs::read_to_string(path)?;
        let config: Self = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&text)?,
            "json" => serde_json::from_str(&text)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> ConfigResult<()> {
        if self.iterations_per_frame == 0 {
            return Err(ConfigError::Invalid(
                "iterations_per_frame must be at least 1".to_string(),
            ));
        }
        if self.search_iterations == 0 {
            return Err(ConfigError::Invalid(
                "search_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.c1 > 0.0 && self.c1 < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "c1 must lie in (0, 1), got {}",
                self.c1
            )));
        }
        if !(self.c2 > self.c1 && self.c2 < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "c2 must lie in (c1, 1), got {}",
                self.c2
            )));
        }
        if !(self.stretch_factor > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "stretch_factor must be positive, got {}",
                self.stretch_factor
            )));
        }
        let floats = [
            ("repulsion_force", self.repulsion_force),
            ("spring_tension", self.spring_tension),
            ("step_size", self.step_size),
            ("link_rest_length_scale", self.link_rest_length_scale),
            ("particle_mass", self.particle_mass),
            ("initial_radius", self.initial_radius),
        ];
        if let Some((name, value)) = floats.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "{name} must be finite, got {value}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = LayoutConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.step_mode, StepMode::Fixed);
        assert_eq!(config.search_iterations, 5);
        assert_eq!(config.c1, 0.1);
        assert_eq!(config.c2, 0.9);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: LayoutConfig =
            serde_yaml::from_str("step_mode: auto\nspring_tension: 0.5\nseed: 7\n").unwrap();
        assert_eq!(config.step_mode, StepMode::Auto);
        assert_eq!(config.spring_tension, 0.5);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.iterations_per_frame, DEFAULT_ITERATIONS_PER_FRAME);
    }

    #[test]
    fn loads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        fs::write(&path, r#"{"step_mode": "wolfram", "backend": "scalar"}"#).unwrap();

        let config = LayoutConfig::from_path(&path).unwrap();
        assert_eq!(config.step_mode, StepMode::Wolfram);
        assert_eq!(config.backend, BackendKind::Scalar);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.toml");
        fs::write(&path, "").unwrap();

        assert!(matches!(
            LayoutConfig::from_path(&path),
            Err(ConfigError::UnsupportedFormat(ext)) if ext == "toml"
        ));
    }

    #[test]
    fn rejects_bad_wolfe_constants() {
        let config = LayoutConfig {
            c1: 0.95,
            c2: 0.9,
            ..LayoutConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_search_iterations() {
        let config = LayoutConfig {
            search_iterations: 0,
            ..LayoutConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration: search_iterations must be at least 1"
        );
    }

    #[test]
    fn invalid_values_in_file_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.yaml");
        fs::write(&path, "iterations_per_frame: 0\n").unwrap();
        assert!(matches!(
            LayoutConfig::from_path(&path),
            Err(ConfigError::Invalid(_))
        ));
    }
}
