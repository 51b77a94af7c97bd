//! Soil, land-cover and water-access classification.
//!
//! [`normalize`] is the single entry point: it buckets raw soil readings into
//! tiers, classifies precipitation from the climate snapshot and attaches the
//! sampled water-access figures.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::climate::ClimateSnapshot;

/// Soil properties requested from the soil upstream.
pub const SOIL_PROPERTIES: [&str; 7] = ["clay", "sand", "silt", "phh2o", "soc", "nitrogen", "cec"];
/// Depth bands requested from the soil upstream. Only the first is read.
pub const SOIL_DEPTHS: [&str; 3] = ["0-5cm", "5-15cm", "15-30cm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl Tier {
    fn from_thresholds(value: f64, medium_above: f64, high_above: f64) -> Self {
        if value > high_above {
            Tier::High
        } else if value > medium_above {
            Tier::Medium
        } else {
            Tier::Low
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Tier::Low => "Low",
            Tier::Medium => "Medium",
            Tier::High => "High",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoilKind {
    Clay,
    Sandy,
}

impl fmt::Display for SoilKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoilKind::Clay => f.write_str("Clay"),
            SoilKind::Sandy => f.write_str("Sandy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrecipitationTier {
    #[serde(rename = "Very Low")]
    VeryLow,
    Low,
    Moderate,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl PrecipitationTier {
    pub fn from_annual_mm(annual: f64) -> Self {
        if annual > 2000.0 {
            PrecipitationTier::VeryHigh
        } else if annual > 1500.0 {
            PrecipitationTier::High
        } else if annual > 1000.0 {
            PrecipitationTier::Moderate
        } else if annual > 500.0 {
            PrecipitationTier::Low
        } else {
            PrecipitationTier::VeryLow
        }
    }
}

impl fmt::Display for PrecipitationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PrecipitationTier::VeryLow => "Very Low",
            PrecipitationTier::Low => "Low",
            PrecipitationTier::Moderate => "Moderate",
            PrecipitationTier::High => "High",
            PrecipitationTier::VeryHigh => "Very High",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SoilGridsResponse {
    pub properties: SoilGridsProperties,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SoilGridsProperties {
    #[serde(default)]
    pub layers: Vec<SoilLayer>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SoilLayer {
    pub name: String,
    #[serde(default)]
    pub depths: Vec<SoilDepth>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SoilDepth {
    pub label: String,
    pub values: SoilDepthValues,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SoilDepthValues {
    pub mean: Option<f64>,
}

/// First-depth-band soil readings. `None` means the upstream had no value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SoilSample {
    pub clay: Option<f64>,
    pub sand: Option<f64>,
    pub nitrogen: Option<f64>,
    pub phh2o: Option<f64>,
    pub cec: Option<f64>,
}

impl SoilSample {
    /// Substituted when the soil upstream cannot be reached.
    pub const FALLBACK: SoilSample = SoilSample {
        clay: Some(30.0),
        sand: Some(40.0),
        nitrogen: Some(35.0),
        phh2o: Some(7.0),
        cec: Some(15.0),
    };

    pub fn from_response(response: &SoilGridsResponse) -> Self {
        let first_mean = |property: &str| {
            response
                .properties
                .layers
                .iter()
                .find(|layer| layer.name == property)
                .and_then(|layer| layer.depths.first())
                .and_then(|depth| depth.values.mean)
        };
        Self {
            clay: first_mean("clay"),
            sand: first_mean("sand"),
            nitrogen: first_mean("nitrogen"),
            phh2o: first_mean("phh2o"),
            cec: first_mean("cec"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandComposition {
    pub forest: f64,
    pub grassland: f64,
    pub desert: f64,
    pub water: f64,
    pub urban: f64,
    pub agricultural: f64,
}

impl LandComposition {
    /// Stand-in for a land-cover dataset: percentages are drawn from `rng`.
    pub fn simulate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut draw = |span: f64, floor: f64| rng.gen::<f64>() * span + floor;
        Self {
            forest: draw(30.0, 10.0),
            grassland: draw(25.0, 15.0),
            desert: draw(10.0, 0.0),
            water: draw(15.0, 0.0),
            urban: draw(20.0, 0.0),
            agricultural: draw(20.0, 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Nutrients {
    pub nitrogen: Tier,
    pub phosphorus: Tier,
    pub potassium: Tier,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoilProfile {
    #[serde(rename = "type")]
    pub kind: SoilKind,
    pub ph: f64,
    pub fertility: Tier,
    pub nutrients: Nutrients,
}

impl SoilProfile {
    pub fn classify(sample: &SoilSample) -> Self {
        let clay = sample.clay.unwrap_or(0.0);
        let sand = sample.sand.unwrap_or(0.0);
        let nitrogen = sample.nitrogen.unwrap_or(0.0);
        let ph = sample.phh2o.unwrap_or(7.0);
        let cec = sample.cec.unwrap_or(0.0);

        let nitrogen_tier = Tier::from_thresholds(nitrogen, 25.0, 50.0);
        Self {
            kind: if clay > sand {
                SoilKind::Clay
            } else {
                SoilKind::Sandy
            },
            ph,
            fertility: nitrogen_tier,
            nutrients: Nutrients {
                nitrogen: nitrogen_tier,
                // No phosphorus source is wired up yet.
                phosphorus: Tier::Medium,
                potassium: Tier::from_thresholds(cec, 10.0, 20.0),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaterQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceWaterKind {
    River,
    Lake,
    Stream,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Seasonality {
    Seasonal,
    Perennial,
    Intermittent,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Groundwater {
    pub depth_m: f64,
    pub quality: WaterQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceWater {
    pub distance_km: f64,
    #[serde(rename = "type")]
    pub kind: SurfaceWaterKind,
    pub seasonality: Seasonality,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaterAccess {
    pub groundwater: Groundwater,
    pub surface_water: SurfaceWater,
    pub precipitation: PrecipitationTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandProfile {
    pub composition: LandComposition,
    pub soil: SoilProfile,
    pub water_access: WaterAccess,
}

/// Derive a [`LandProfile`] from a region's climate, soil and land-cover data.
///
/// Groundwater depth and surface-water distance have no upstream and are drawn
/// from `rng`; everything else is a deterministic function of the inputs.
pub fn normalize<R: Rng + ?Sized>(
    climate: &ClimateSnapshot,
    soil: &SoilSample,
    composition: LandComposition,
    rng: &mut R,
) -> LandProfile {
    let depth_m = (rng.gen::<f64>() * 100.0 + 20.0).round();
    let distance_km = (rng.gen::<f64>() * 10.0).round();

    LandProfile {
        composition,
        soil: SoilProfile::classify(soil),
        water_access: WaterAccess {
            groundwater: Groundwater {
                depth_m,
                quality: WaterQuality::Good,
            },
            surface_water: SurfaceWater {
                distance_km,
                kind: SurfaceWaterKind::River,
                seasonality: Seasonality::Perennial,
            },
            precipitation: PrecipitationTier::from_annual_mm(climate.rainfall.annual),
        },
    }
}
