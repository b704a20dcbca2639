// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::Deserialize;

use super::error::ConfigError;

const DEFAULT_SILENT_THRESHOLD: i64 = 65536;
const MAX_DECIMATION_SHIFT: u32 = 16;
const DEFAULT_DECIMATION_SHIFTS: [u32; 6] = [2, 4, 6, 8, 10, 12];

/// A YAML representation of the storage engine configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct EngineConfig {
    /// Directory for temp sample files (default: the system temp directory).
    temp_dir: Option<PathBuf>,

    /// Cleared regions longer than this many frames become silent stakes
    /// (default: 65536).
    silent_threshold: Option<i64>,

    /// Channel count of each temp file for new trails, e.g. `[2, 1]`. When
    /// unset every trail keeps all channels in one file.
    channel_groups: Option<Vec<usize>>,

    /// Overview cache settings.
    decimation: Option<DecimationConfig>,
}

/// Overview cache settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct DecimationConfig {
    /// Decimation level shifts, finest first (default: 2, 4, 6, 8, 10, 12).
    shifts: Option<Vec<u32>>,
}

impl DecimationConfig {
    /// Fails unless the shifts increase and stay at or below 16.
    pub fn new(shifts: Vec<u32>) -> Result<DecimationConfig, ConfigError> {
        let config = DecimationConfig {
            shifts: Some(shifts),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut previous = None;
        for shift in self.shifts() {
            if shift > MAX_DECIMATION_SHIFT || previous.is_some_and(|p| shift <= p) {
                return Err(ConfigError::InvalidShift { shift });
            }
            previous = Some(shift);
        }
        Ok(())
    }

    /// Returns the level shifts.
    pub fn shifts(&self) -> Vec<u32> {
        self.shifts
            .clone()
            .unwrap_or_else(|| DEFAULT_DECIMATION_SHIFTS.to_vec())
    }
}

impl EngineConfig {
    /// Parse an engine configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<EngineConfig, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<EngineConfig>()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values serde can't check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(groups) = &self.channel_groups {
            if groups.is_empty() || groups.contains(&0) {
                return Err(ConfigError::InvalidChannelGroups(groups.clone()));
            }
        }
        self.decimation().validate()
    }

    /// Returns a copy of the configuration that writes temp files into `dir`.
    pub fn with_temp_dir(mut self, dir: &Path) -> EngineConfig {
        self.temp_dir = Some(dir.to_path_buf());
        self
    }

    /// Returns a copy of the configuration with a different silent stake
    /// threshold.
    pub fn with_silent_threshold(mut self, frames: i64) -> EngineConfig {
        self.silent_threshold = Some(frames);
        self
    }

    /// Returns a copy of the configuration with different overview levels.
    pub fn with_decimation(mut self, decimation: DecimationConfig) -> EngineConfig {
        self.decimation = Some(decimation);
        self
    }

    /// Returns the temp file directory, if one is configured.
    pub fn temp_dir(&self) -> Option<&Path> {
        self.temp_dir.as_deref()
    }

    /// Returns the silent stake threshold (default: 65536 frames).
    pub fn silent_threshold(&self) -> i64 {
        self.silent_threshold.unwrap_or(DEFAULT_SILENT_THRESHOLD)
    }

    /// Returns the channel groups for new trails, if configured.
    pub fn channel_groups(&self) -> Option<&[usize]> {
        self.channel_groups.as_deref()
    }

    /// Returns the overview cache settings.
    pub fn decimation(&self) -> DecimationConfig {
        self.decimation.clone().unwrap_or_default()
    }
}
