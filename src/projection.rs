//! Forestation impact projection.
//!
//! [`project`] evaluates a fixed set of linear formulas at five-year steps.
//! Nothing carries over between steps, so the output is a pure function of the
//! parameters and the region's starting conditions.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const BASE_YEAR: i32 = 2025;
pub const STEP_YEARS: u32 = 5;
pub const MAX_TIMELINE_YEARS: u32 = 100;
pub const MIN_INTENSITY: f64 = 1.0;
pub const MAX_INTENSITY: f64 = 10.0;

const FOREST_COVERAGE_CAP: f64 = 70.0;
const BIODIVERSITY_BASE: f64 = 0.3;
const BIODIVERSITY_CAP: f64 = 0.9;
const WATER_QUALITY_BASE: f64 = 60.0;
const WATER_QUALITY_CAP: f64 = 95.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReforestationMethod {
    #[serde(alias = "Natural regeneration")]
    NaturalRegeneration,
    #[serde(alias = "Assisted regeneration")]
    AssistedRegeneration,
    #[serde(alias = "Agroforestry")]
    Agroforestry,
    #[serde(alias = "Monoculture plantation")]
    MonoculturePlantation,
    #[serde(alias = "Mixed plantation")]
    MixedPlantation,
}

impl fmt::Display for ReforestationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReforestationMethod::NaturalRegeneration => "Natural regeneration",
            ReforestationMethod::AssistedRegeneration => "Assisted regeneration",
            ReforestationMethod::Agroforestry => "Agroforestry",
            ReforestationMethod::MonoculturePlantation => "Monoculture plantation",
            ReforestationMethod::MixedPlantation => "Mixed plantation",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterStrategy {
    #[serde(alias = "Rainwater harvesting")]
    RainwaterHarvesting,
    #[serde(alias = "Drip irrigation")]
    DripIrrigation,
    #[serde(alias = "Swales")]
    Swales,
    #[serde(alias = "Retention ponds")]
    RetentionPonds,
    #[serde(alias = "None")]
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterManagement {
    pub strategy: WaterStrategy,
    pub coverage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloraSelection {
    #[serde(default)]
    pub trees: Vec<String>,
    #[serde(default)]
    pub shrubs: Vec<String>,
    #[serde(default)]
    pub ground_cover: Vec<String>,
    #[serde(default)]
    pub wildlife: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    pub method: ReforestationMethod,
    #[serde(default)]
    pub flora: FloraSelection,
    pub water_management: WaterManagement,
    pub timeline: u32,
    pub intensity: f64,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            method: ReforestationMethod::MixedPlantation,
            flora: FloraSelection {
                trees: vec!["Oak".into(), "Pine".into(), "Maple".into()],
                shrubs: vec!["Lavender".into(), "Rosemary".into()],
                ground_cover: vec!["Clover".into(), "Native grasses".into()],
                wildlife: vec!["Birds".into(), "Bees".into(), "Butterflies".into()],
            },
            water_management: WaterManagement {
                strategy: WaterStrategy::DripIrrigation,
                coverage: 80.0,
            },
            timeline: 30,
            intensity: 5.0,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParameterError {
    #[error("intensity must be between 1 and 10, got {0}")]
    Intensity(f64),
    #[error("timeline must be at most 100 years, got {0}")]
    Timeline(u32),
    #[error("water management coverage must be between 0 and 100, got {0}")]
    Coverage(f64),
}

impl SimulationParameters {
    pub fn validate(&self) -> Result<(), ParameterError> {
        if !(MIN_INTENSITY..=MAX_INTENSITY).contains(&self.intensity) {
            return Err(ParameterError::Intensity(self.intensity));
        }
        if self.timeline > MAX_TIMELINE_YEARS {
            return Err(ParameterError::Timeline(self.timeline));
        }
        if !(0.0..=100.0).contains(&self.water_management.coverage) {
            return Err(ParameterError::Coverage(self.water_management.coverage));
        }
        Ok(())
    }
}

/// Starting conditions taken from the region's land profile and climate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialConditions {
    pub forest_coverage: f64,
    pub temperature: f64,
    pub rainfall: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationSnapshot {
    pub year: i32,
    pub forest_coverage: f64,
    pub temperature_average: f64,
    pub rainfall_annual: f64,
    pub biodiversity_index: f64,
    pub carbon_sequestration: f64,
    pub water_quality: f64,
}

/// Timelines beyond [`MAX_TIMELINE_YEARS`] are clamped to it, so this never
/// fails even for parameters that skipped [`SimulationParameters::validate`].
pub fn project(params: &SimulationParameters, initial: &InitialConditions) -> Vec<SimulationSnapshot> {
    let timeline = params.timeline.min(MAX_TIMELINE_YEARS);
    let intensity = params.intensity;

    (0..=timeline)
        .step_by(STEP_YEARS as usize)
        .map(|year| {
            // A zero-length timeline only has the starting point.
            let progress = if timeline == 0 {
                0.0
            } else {
                year as f64 / timeline as f64
            };
            SimulationSnapshot {
                year: BASE_YEAR + year as i32,
                forest_coverage: (initial.forest_coverage + intensity * progress * 20.0)
                    .min(FOREST_COVERAGE_CAP),
                temperature_average: initial.temperature - progress * intensity * 0.5,
                rainfall_annual: initial.rainfall * (1.0 + progress * intensity * 0.1),
                biodiversity_index: (BIODIVERSITY_BASE + progress * intensity * 0.1)
                    .min(BIODIVERSITY_CAP),
                carbon_sequestration: year as f64 * intensity * 1000.0,
                water_quality: (WATER_QUALITY_BASE + progress * intensity * 10.0)
                    .min(WATER_QUALITY_CAP),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionSummary {
    pub year: i32,
    pub forest_coverage: f64,
    /// Relative change against the first snapshot, in percent.
    pub forest_coverage_change_pct: Option<f64>,
    /// Absolute change in degrees.
    pub temperature_change: f64,
    pub rainfall_change_pct: Option<f64>,
    pub biodiversity_index: f64,
    pub carbon_sequestration: f64,
    pub water_quality: f64,
}

/// Compare `year` (or the final snapshot) with the starting snapshot.
pub fn summarize(snapshots: &[SimulationSnapshot], year: Option<i32>) -> Option<ProjectionSummary> {
    let initial = snapshots.first()?;
    let current = match year {
        Some(year) => snapshots.iter().find(|s| s.year == year)?,
        None => snapshots.last()?,
    };
    Some(ProjectionSummary {
        year: current.year,
        forest_coverage: current.forest_coverage,
        forest_coverage_change_pct: relative_change(initial.forest_coverage, current.forest_coverage),
        temperature_change: current.temperature_average - initial.temperature_average,
        rainfall_change_pct: relative_change(initial.rainfall_annual, current.rainfall_annual),
        biodiversity_index: current.biodiversity_index,
        carbon_sequestration: current.carbon_sequestration,
        water_quality: current.water_quality,
    })
}

fn relative_change(from: f64, to: f64) -> Option<f64> {
    (from != 0.0).then(|| (to - from) / from * 100.0)
}
