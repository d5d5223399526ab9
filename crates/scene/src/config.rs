use crate::clock::{MAX_TICK_RATE, MIN_TICK_RATE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors from loading or validating a demo configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("instance count must be greater than zero")]
    ZeroInstances,
    #[error("tick rate must be between 1 and 10000 steps per second (got {0})")]
    InvalidTickRate(f64),
    #[error("window size must be non-zero (got {width}x{height})")]
    ZeroWindow { width: u32, height: u32 },
}

/// Everything the demo needs to start. Missing YAML fields take the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub instance_count: usize,
    /// Seed for instance placement. `None` draws one from the OS.
    pub seed: Option<u64>,
    /// Fixed logic steps per second.
    pub tick_rate: f64,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Camera orbit speed in degrees per second.
    pub orbit_speed: f32,
    pub clear_color: [f64; 4],
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            instance_count: 50_000,
            seed: None,
            tick_rate: 60.0,
            vertex_shader: PathBuf::from("shaders/cube.vert.wgsl"),
            fragment_shader: PathBuf::from("shaders/cube.frag.wgsl"),
            width: 1280,
            height: 720,
            orbit_speed: 10.0,
            clear_color: [0.1, 0.1, 0.15, 1.0],
        }
    }
}

impl DemoConfig {
    /// Load a YAML config file. The result is validated before it is returned.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&data)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance_count == 0 {
            return Err(ConfigError::ZeroInstances);
        }
        if !(MIN_TICK_RATE..=MAX_TICK_RATE).contains(&self.tick_rate) {
            return Err(ConfigError::InvalidTickRate(self.tick_rate));
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::ZeroWindow {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}
