use std::{path::Path, time::Duration};

use anyhow::{ensure, Result};
use serde::Deserialize;

use crate::store::repr::DATA_FILE_HEADER_SIZE;

#[cfg(test)]
#[test]
fn load_example_config() {
    let settings = StoreConfig::from_toml_str(include_str!("../config.example.toml")).unwrap();
    println!("{settings:?}");
    assert_eq!(settings, StoreConfig::default());
}

#[cfg(test)]
#[test]
fn missing_sections_use_defaults() {
    let settings = StoreConfig::from_toml_str("[gate]\nfault_budget_ms = 10\n").unwrap();
    assert_eq!(settings.gate.fault_budget(), Duration::from_millis(10));
    assert_eq!(settings.files, FilesConfig::default());
    assert_eq!(settings.residency, ResidencyConfig::default());
}

#[cfg(test)]
#[test]
fn impossible_sizes_are_rejected() {
    for bad in [
        "[files]\ninitial_file_size = 4096\n",
        "[files]\ninitial_file_size = 1073741824\nmax_file_size = 536870912\n",
        "[extents]\npage_size = 3000\n",
        "[extents]\nmin_extent_size = 6000\n",
        "[extents]\nmin_extent_size = 8192\nmax_extent_size = 4096\n",
        "[files]\nmax_file_size = 1048576\n",
    ] {
        assert!(StoreConfig::from_toml_str(bad).is_err(), "accepted {bad:?}");
    }
}

pub fn open(path: &Path) -> Result<StoreConfig> {
    let config_file = std::fs::read_to_string(path)?;
    StoreConfig::from_toml_str(&config_file)
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// backing file sizing
    pub files: FilesConfig,
    /// extent sizing
    pub extents: ExtentConfig,
    /// the residency estimator
    pub residency: ResidencyConfig,
    /// the access gate
    pub gate: GateConfig,
}

impl StoreConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(s, config::FileFormat::Toml))
            .build()?
            .try_deserialize::<Self>()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.files.validate()?;
        self.extents.validate(&self.files)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilesConfig {
    /// size of file 0. each following file doubles, up to `max_file_size`
    pub initial_file_size: i32,
    pub max_file_size: i32,
    /// keep each database's files in their own subdirectory
    pub directory_per_db: bool,
    /// create the next file on disk as soon as one is added
    pub preallocate_next: bool,
}

impl FilesConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.initial_file_size > DATA_FILE_HEADER_SIZE,
            "initial_file_size must be larger than the {} byte file header",
            DATA_FILE_HEADER_SIZE
        );
        ensure!(
            self.initial_file_size <= self.max_file_size,
            "initial_file_size must not be larger than max_file_size"
        );
        Ok(())
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            initial_file_size: 64 * 1024 * 1024,
            max_file_size: 0x7ff0_0000,
            directory_per_db: false,
            preallocate_next: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExtentConfig {
    pub min_extent_size: i32,
    pub max_extent_size: i32,
    /// extents are always a multiple of this
    pub page_size: i32,
}

impl Default for ExtentConfig {
    fn default() -> Self {
        Self {
            min_extent_size: 0x1000,
            max_extent_size: 0x4000_0000,
            page_size: 0x1000,
        }
    }
}

impl ExtentConfig {
    /// errors on a configuration that could never produce a valid extent
    pub fn validate(&self, files: &FilesConfig) -> Result<()> {
        ensure!(
            self.page_size > 0 && (self.page_size as u32).is_power_of_two(),
            "page_size must be a power of two"
        );
        ensure!(
            self.min_extent_size > 0 && self.min_extent_size % self.page_size == 0,
            "min_extent_size must be a positive multiple of page_size"
        );
        ensure!(
            self.max_extent_size % self.page_size == 0,
            "max_extent_size must be a multiple of page_size"
        );
        ensure!(
            self.min_extent_size <= self.max_extent_size,
            "min_extent_size must not be larger than max_extent_size"
        );
        ensure!(
            (self.max_extent_size as i64) + (DATA_FILE_HEADER_SIZE as i64)
                <= files.max_file_size as i64,
            "max_extent_size must fit in the largest data file"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResidencyConfig {
    /// when off, every access is assumed to be in memory
    pub tracking_enabled: bool,
    /// independently locked shards
    pub shards: usize,
    /// time slices per shard
    pub slices: usize,
    /// slots per slice
    pub slice_size: usize,
    /// longest probe sequence on insert/lookup
    pub max_chain: usize,
    /// how long a slice is current before it is rotated out
    pub rotate_after_secs: u64,
    /// the rotation clock is only checked every this many calls
    pub sample_every: u32,
    /// known good lookups only scan `slices / known_good_divisor` slices
    pub known_good_divisor: usize,
}

impl Default for ResidencyConfig {
    fn default() -> Self {
        Self {
            tracking_enabled: true,
            shards: 128,
            slices: 10,
            slice_size: 1024,
            max_chain: 20,
            rotate_after_secs: 90,
            sample_every: 2048,
            known_good_divisor: 2,
        }
    }
}

impl ResidencyConfig {
    pub fn rotate_after(&self) -> Duration {
        Duration::from_secs(self.rotate_after_secs)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    /// operations running longer than this accept a possible stall instead of restarting
    pub fault_budget_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            fault_budget_ms: 50,
        }
    }
}

impl GateConfig {
    pub fn fault_budget(&self) -> Duration {
        Duration::from_millis(self.fault_budget_ms)
    }
}
