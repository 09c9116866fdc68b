//! # Engine Configuration
//!
//! All tunables of the engine in one serializable struct. Every field has a
//! default, so a config file only needs to name what it changes:
//!
//! ```json
//! { "world": { "size_x": 256, "size_z": 256 }, "worker_count": 2 }
//! ```

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    engine_state::voxels::{
        chunk::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE},
        world::MAX_WORLD_HEIGHT,
    },
    error::ConfigError,
};

/// Environment variable holding the path of a JSON config file.
pub const CONFIG_PATH_ENV: &str = "VOXEL_ENGINE_CONFIG";

/// The method used to fill a freshly created world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum GenerationMethod {
    /// Rolling terrain sampled from 2D Perlin noise.
    Perlin {
        seed: u32,
        scale: f64,
        base_height: i32,
        amplitude: i32,
    },
    /// Every column filled up to the same height.
    Flat { height: i32 },
    /// Nothing but air.
    Empty,
}

impl Default for GenerationMethod {
    fn default() -> Self {
        GenerationMethod::Perlin {
            seed: 0,
            scale: 0.02,
            base_height: 24,
            amplitude: 12,
        }
    }
}

/// Dimensions and contents of the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub size_x: i32,
    pub size_y: i32,
    pub size_z: i32,
    pub chunk_size: i32,
    pub generation: GenerationMethod,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            size_x: 128,
            size_y: 64,
            size_z: 128,
            chunk_size: DEFAULT_CHUNK_SIZE,
            generation: GenerationMethod::default(),
        }
    }
}

/// Chunk culling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityConfig {
    /// Clip-space bound a chunk corner must fall within. Slightly above 1 so that
    /// chunks hanging partially off screen still count.
    pub threshold: f32,
    /// World-space height at which chunk corners are projected.
    pub reference_height: f32,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            threshold: 1.2,
            reference_height: 0.0,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub world: WorldConfig,
    pub visibility: VisibilityConfig,
    /// Number of mesh worker threads. `0` picks the available parallelism.
    pub worker_count: usize,
    /// Force the single-threaded inline scheduler even where threads exist.
    pub force_inline_scheduler: bool,
}

impl EngineConfig {
    /// Parses and validates a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Loads the file named by `VOXEL_ENGINE_CONFIG`, or the defaults when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path),
            Err(_) => Ok(Self::default()),
        }
    }

    /// The number of workers to spawn, resolving `0` to the machine's parallelism.
    pub fn resolved_worker_count(&self) -> usize {
        if self.worker_count > 0 {
            return self.worker_count;
        }
        std::thread::available_parallelism()
            .map(|parallelism| parallelism.get().saturating_sub(1).max(1))
            .unwrap_or(4)
    }

    /// Rejects values no engine component can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let world = &self.world;
        if !(1..=MAX_WORLD_HEIGHT).contains(&world.size_y) {
            return Err(ConfigError::Invalid(format!(
                "world.size_y must be within 1..={MAX_WORLD_HEIGHT}"
            )));
        }
        if !(1..=MAX_CHUNK_SIZE).contains(&world.chunk_size) {
            return Err(ConfigError::Invalid(format!(
                "world.chunk_size must be within 1..={MAX_CHUNK_SIZE}"
            )));
        }
        if world.size_x <= 0
            || world.size_z <= 0
            || world.size_x % world.chunk_size != 0
            || world.size_z % world.chunk_size != 0
        {
            return Err(ConfigError::Invalid(
                "world.size_x and world.size_z must be positive multiples of world.chunk_size".to_string(),
            ));
        }
        if !(self.visibility.threshold > 0.0) {
            return Err(ConfigError::Invalid(
                "visibility.threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineConfig, GenerationMethod};
    use crate::error::ConfigError;

    #[test]
    fn empty_object_yields_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.world.chunk_size, 16);
    }

    #[test]
    fn partial_config_overrides_named_fields() {
        let config = EngineConfig::from_json_str(
            r#"{
                "world": { "size_x": 32, "size_z": 64, "generation": { "method": "flat", "height": 5 } },
                "worker_count": 2
            }"#,
        )
        .unwrap();
        assert_eq!(config.world.size_x, 32);
        assert_eq!(config.world.size_y, 64);
        assert_eq!(config.world.generation, GenerationMethod::Flat { height: 5 });
        assert_eq!(config.resolved_worker_count(), 2);
    }

    #[test]
    fn uneven_world_is_rejected() {
        let result = EngineConfig::from_json_str(r#"{ "world": { "size_x": 30 } }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn oversized_chunks_and_empty_worlds_are_rejected() {
        for json in [
            r#"{ "world": { "size_x": 128, "size_z": 128, "chunk_size": 128 } }"#,
            r#"{ "world": { "size_x": 0 } }"#,
            r#"{ "world": { "size_z": -16 } }"#,
        ] {
            let result = EngineConfig::from_json_str(json);
            assert!(matches!(result, Err(ConfigError::Invalid(_))), "accepted {json}");
        }
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let result = EngineConfig::from_json_str("{ world: ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
