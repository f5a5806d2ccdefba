//! # Pool Configuration
//!
//! Sizing parameters for both pools, loaded once from TOML.
//!
//! ```toml
//! [region]
//! growth_granule = 4096
//!
//! [chunk]
//! chunk_capacity = 32768
//! ```
//!
//! Missing tables or keys fall back to the defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};

/// Default growth granule of a region pool buffer, in bytes.
pub const DEFAULT_GROWTH_GRANULE: u64 = 4096;

/// Default capacity of a single chunk pool chunk, in bytes.
pub const DEFAULT_CHUNK_CAPACITY: usize = 32 * 1024;

/// Region pool sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionPoolConfig {
    /// Minimum number of bytes the buffer grows by.
    pub growth_granule: u64,
}

impl Default for RegionPoolConfig {
    fn default() -> Self {
        Self {
            growth_granule: DEFAULT_GROWTH_GRANULE,
        }
    }
}

/// Chunk pool sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkPoolConfig {
    /// Fixed capacity of every chunk.
    pub chunk_capacity: usize,
}

impl Default for ChunkPoolConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
        }
    }
}

/// Combined configuration for both pool kinds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Region pool settings.
    pub region: RegionPoolConfig,
    /// Chunk pool settings.
    pub chunk: ChunkPoolConfig,
}

impl PoolConfig {
    /// Parses and validates a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the text is not valid TOML
    /// for this schema, or if any size is zero.
    pub fn from_toml_str(text: &str) -> PoolResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| PoolError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Io`] if the file cannot be read, or
    /// [`PoolError::InvalidConfig`] if its contents are invalid.
    pub fn from_file(path: impl AsRef<Path>) -> PoolResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Serializes the configuration back to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if serialization fails.
    pub fn to_toml_string(&self) -> PoolResult<String> {
        toml::to_string(self).map_err(|e| PoolError::InvalidConfig(e.to_string()))
    }

    /// Checks that every size is usable.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] naming the offending key.
    pub fn validate(&self) -> PoolResult<()> {
        if self.region.growth_granule == 0 {
            return Err(PoolError::InvalidConfig(
                "region.growth_granule must be greater than zero".into(),
            ));
        }
        if self.chunk.chunk_capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "chunk.chunk_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let config = PoolConfig::from_toml_str("").unwrap();
        assert_eq!(config, PoolConfig::default());
        assert_eq!(config.region.growth_granule, DEFAULT_GROWTH_GRANULE);
        assert_eq!(config.chunk.chunk_capacity, DEFAULT_CHUNK_CAPACITY);
    }

    #[test]
    fn test_partial_override() {
        let config = PoolConfig::from_toml_str("[region]\ngrowth_granule = 16\n").unwrap();
        assert_eq!(config.region.growth_granule, 16);
        assert_eq!(config.chunk.chunk_capacity, DEFAULT_CHUNK_CAPACITY);
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let err = PoolConfig::from_toml_str("[chunk]\nchunk_capacity = 0\n").unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let err = PoolConfig::from_toml_str("[region\n").unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = PoolConfig::default();
        config.chunk.chunk_capacity = 1024;
        let text = config.to_toml_string().unwrap();
        assert_eq!(PoolConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir()
            .join(format!("reservoir_config_{}.toml", std::process::id()));
        std::fs::write(&path, "[region]\ngrowth_granule = 512\n").unwrap();

        let config = PoolConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.region.growth_granule, 512);

        assert!(matches!(
            PoolConfig::from_file(&path),
            Err(PoolError::Io(_))
        ));
    }
}
