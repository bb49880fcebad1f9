//! Pipeline configuration: sample grid, filter constants, control defaults.
//!
//! Two presets mirror the two front ends: the desktop widget plots `[0, 2]`
//! and filters at 500 Hz, the browser page plots `[0, 2π]` and filters at
//! 100 Hz with a wider default noise variance.
//! Everything can be overridden from a JSON file.

use crate::error::{ConfigError, Result};
use crate::filters::FilterStage;
use crate::types::{ControlState, SampleGrid, SignalParameters};
use clap::ValueEnum;
use log::info;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;

pub const DEFAULT_SAMPLES: usize = 1000;
pub const BUTTERWORTH_ORDER: usize = 4;
pub const BUTTERWORTH_CUTOFF_HZ: f64 = 3.0;
pub const DESKTOP_SAMPLE_RATE_HZ: f64 = 500.0;
pub const BROWSER_SAMPLE_RATE_HZ: f64 = 100.0;
pub const MOVING_AVERAGE_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Slider widget variant: grid [0, 2], fs = 500 Hz, noise variance 0.1
    Desktop,
    /// Browser variant: grid [0, 2π], fs = 100 Hz, noise variance 0.2
    Browser,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ButterworthConfig {
    pub order: usize,
    pub cutoff_hz: f64,
    pub sample_rate_hz: f64,
}

impl Default for ButterworthConfig {
    fn default() -> Self {
        Self {
            order: BUTTERWORTH_ORDER,
            cutoff_hz: BUTTERWORTH_CUTOFF_HZ,
            sample_rate_hz: DESKTOP_SAMPLE_RATE_HZ,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovingAverageConfig {
    pub window: usize,
}

impl Default for MovingAverageConfig {
    fn default() -> Self {
        Self {
            window: MOVING_AVERAGE_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub grid: SampleGrid,
    pub butterworth: ButterworthConfig,
    pub moving_average: MovingAverageConfig,
    /// State restored by a reset and used for the first frame
    pub defaults: ControlState,
    /// Largest change of noise mean/variance that still reuses the cached
    /// noise vector. 0 means exact comparison.
    pub noise_tolerance: f64,
    /// Fixed seed for reproducible noise; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::preset(Preset::Desktop)
    }
}

impl PipelineConfig {
    pub fn preset(preset: Preset) -> Self {
        match preset {
            Preset::Desktop => Self {
                grid: SampleGrid {
                    samples: DEFAULT_SAMPLES,
                    start: 0.0,
                    end: 2.0,
                },
                butterworth: ButterworthConfig::default(),
                moving_average: MovingAverageConfig::default(),
                defaults: ControlState::with_params(SignalParameters::default()),
                noise_tolerance: 0.0,
                seed: None,
            },
            Preset::Browser => Self {
                grid: SampleGrid {
                    samples: DEFAULT_SAMPLES,
                    start: 0.0,
                    end: 2.0 * PI,
                },
                butterworth: ButterworthConfig {
                    sample_rate_hz: BROWSER_SAMPLE_RATE_HZ,
                    ..ButterworthConfig::default()
                },
                moving_average: MovingAverageConfig::default(),
                defaults: ControlState::with_params(SignalParameters {
                    noise_variance: 0.2,
                    ..SignalParameters::default()
                }),
                noise_tolerance: 0.0,
                seed: None,
            },
        }
    }

    /// Load from a JSON file. Missing fields take the desktop preset's values.
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        info!("Loaded pipeline config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> std::result::Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Pipeline config saved to {:?}", path);
        Ok(())
    }

    /// Check that the grid, both filters and the default state are usable, and
    /// that the grid is long enough for both filters.
    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        FilterStage::from_config(&self.butterworth, &self.moving_average)?.check_len(self.grid.samples)?;
        self.defaults.params.validate()?;
        Ok(())
    }
}
