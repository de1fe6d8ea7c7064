use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use campus_memories_core::{Coordinate, Viewport, CAMPUS_CENTER, DEFAULT_STORAGE_KEY, DEFAULT_ZOOM};
use serde::Deserialize;
use time::UtcOffset;

const MAX_ZOOM: u8 = 19;

/// Optional YAML settings; every field falls back to the built-in default.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub storage_key: String,
    pub map: MapConfig,
    /// Fixed offset for popup dates; the system's local offset when unset.
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MapConfig {
    pub center: Coordinate,
    pub zoom: u8,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            map: MapConfig::default(),
            utc_offset_minutes: None,
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self { center: CAMPUS_CENTER, zoom: DEFAULT_ZOOM }
    }
}

impl AppConfig {
    /// Read the config file at `path`, or the defaults when no path is given.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read, is not valid YAML for
    /// this schema, or holds out-of-range values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let body = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::parse(&body)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    fn parse(body: &str) -> Result<Self> {
        let config = if body.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str::<Self>(body)?
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.storage_key.trim().is_empty() {
            return Err(anyhow!("storage_key must not be empty"));
        }
        let center = self.map.center;
        if !center.is_finite() || !(-90.0..=90.0).contains(&center.lat) {
            return Err(anyhow!("map.center must be a valid coordinate, got {center}"));
        }
        if self.map.zoom > MAX_ZOOM {
            return Err(anyhow!("map.zoom must be <= {MAX_ZOOM}, got {}", self.map.zoom));
        }
        self.fixed_offset()?;
        Ok(())
    }

    /// The configured popup-date offset, if any.
    ///
    /// # Errors
    /// Returns an error when `utc_offset_minutes` is outside what a UTC offset
    /// can express.
    pub fn fixed_offset(&self) -> Result<Option<UtcOffset>> {
        let Some(minutes) = self.utc_offset_minutes else {
            return Ok(None);
        };
        let offset = minutes
            .checked_mul(60)
            .and_then(|seconds| UtcOffset::from_whole_seconds(seconds).ok())
            .ok_or_else(|| anyhow!("utc_offset_minutes is out of range, got {minutes}"))?;
        Ok(Some(offset))
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        Viewport { center: self.map.center, zoom: self.map.zoom }
    }
}
