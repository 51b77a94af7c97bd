use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{
    projection::SimulationParameters,
    region::{Geometry, Region},
    upstream::UpstreamConfig,
};

fn default_log_level() -> String {
    "info".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// One planning run: where, what to plant, and how to reach the upstreams.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    /// Seeds every simulated figure. Omit for a fresh draw on each run.
    #[serde(default)]
    pub seed: Option<u64>,
    pub region: ScenarioRegion,
    #[serde(default)]
    pub simulation: SimulationParameters,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioRegion {
    #[serde(default)]
    pub name: Option<String>,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        scenario
            .region
            .geometry
            .validate()
            .with_context(|| format!("Invalid region in {}", path.display()))?;
        scenario
            .simulation
            .validate()
            .with_context(|| format!("Invalid simulation parameters in {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    pub fn build_region(&self) -> Result<Region> {
        Region::new(self.region.name.clone(), self.region.geometry.clone())
            .with_context(|| format!("Scenario '{}' has an invalid region", self.name))
    }

    /// Apply command-line overrides on top of the scenario's parameters.
    pub fn parameters(&self, timeline: Option<u32>, intensity: Option<f64>) -> SimulationParameters {
        let mut params = self.simulation.clone();
        if let Some(timeline) = timeline {
            params.timeline = timeline;
        }
        if let Some(intensity) = intensity {
            params.intensity = intensity;
        }
        params
    }
}
