//! Weather forecast payloads and their aggregation into a [`ClimateSnapshot`].
//!
//! The forecast upstream returns raw hourly and daily sample series; every
//! statistic shown for a region is computed here rather than upstream.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hourly variables requested from the forecast upstream.
pub const HOURLY_VARIABLES: &str =
    "temperature_2m,relativehumidity_2m,precipitation,cloudcover,direct_radiation,windspeed_10m";
/// Daily variables requested from the forecast upstream.
pub const DAILY_VARIABLES: &str =
    "temperature_2m_max,temperature_2m_min,precipitation_sum,windspeed_10m_max";
pub const PAST_DAYS: u32 = 30;
pub const FORECAST_DAYS: u32 = 16;

const HISTORY_HOURS: usize = 24;
const MONTHS: usize = 12;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ForecastResponse {
    pub hourly: HourlySeries,
    pub daily: DailySeries,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HourlySeries {
    #[serde(default)]
    pub temperature_2m: Vec<f64>,
    #[serde(default)]
    pub relativehumidity_2m: Vec<f64>,
    #[serde(default)]
    pub precipitation: Vec<f64>,
    #[serde(default)]
    pub direct_radiation: Vec<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DailySeries {
    #[serde(default)]
    pub temperature_2m_max: Vec<f64>,
    #[serde(default)]
    pub temperature_2m_min: Vec<f64>,
    #[serde(default)]
    pub precipitation_sum: Vec<f64>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ClimateError {
    #[error("forecast series '{0}' is empty")]
    EmptySeries(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RainfallTrend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub current: f64,
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub history: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rainfall {
    pub annual: f64,
    pub monthly: Vec<f64>,
    pub trend: RainfallTrend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Humidity {
    pub average: f64,
    pub morning: f64,
    pub afternoon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UvIndex {
    pub average: f64,
    pub peak: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pollutants {
    pub pm25: f64,
    pub pm10: f64,
    pub o3: f64,
    pub no2: f64,
    pub so2: f64,
    pub co: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQuality {
    pub aqi: f64,
    pub pollutants: Pollutants,
}

impl AirQuality {
    /// No air-quality upstream exists yet; figures are drawn from `rng`.
    pub fn simulate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut draw = |span: f64, floor: f64| (rng.gen::<f64>() * span + floor).round();
        let aqi = draw(50.0, 30.0);
        let pollutants = Pollutants {
            pm25: draw(20.0, 5.0),
            pm10: draw(30.0, 10.0),
            o3: draw(40.0, 20.0),
            no2: draw(30.0, 10.0),
            so2: draw(20.0, 5.0),
            co: draw(10.0, 2.0),
        };
        Self { aqi, pollutants }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateSnapshot {
    pub temperature: Temperature,
    pub rainfall: Rainfall,
    pub humidity: Humidity,
    pub uv_index: UvIndex,
    pub air_quality: AirQuality,
}

impl ClimateSnapshot {
    pub fn from_forecast<R: Rng + ?Sized>(
        forecast: &ForecastResponse,
        rng: &mut R,
    ) -> Result<Self, ClimateError> {
        let hourly = &forecast.hourly;
        let daily = &forecast.daily;

        let hourly_temp = non_empty(&hourly.temperature_2m, "hourly.temperature_2m")?;
        let daily_max = non_empty(&daily.temperature_2m_max, "daily.temperature_2m_max")?;
        let daily_min = non_empty(&daily.temperature_2m_min, "daily.temperature_2m_min")?;
        let precip = non_empty(&daily.precipitation_sum, "daily.precipitation_sum")?;
        let humidity = non_empty(&hourly.relativehumidity_2m, "hourly.relativehumidity_2m")?;
        let radiation = non_empty(&hourly.direct_radiation, "hourly.direct_radiation")?;

        // Average of the daily maxima, not of daily means.
        let temperature = Temperature {
            current: hourly_temp[0],
            min: daily_min.iter().copied().fold(f64::INFINITY, f64::min),
            max: daily_max.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            average: mean(daily_max),
            history: hourly_temp.iter().take(HISTORY_HOURS).copied().collect(),
        };

        let first = precip[0];
        let last = precip[precip.len() - 1];
        let trend = if last > first {
            RainfallTrend::Increasing
        } else if last < first {
            RainfallTrend::Decreasing
        } else {
            RainfallTrend::Stable
        };
        let rainfall = Rainfall {
            annual: precip.iter().sum::<f64>() * 365.0 / precip.len() as f64,
            monthly: vec![mean(precip) * 30.0; MONTHS],
            trend,
        };

        let humidity = Humidity {
            average: mean(humidity),
            morning: window_sum(humidity, 6, 12) / 6.0,
            afternoon: window_sum(humidity, 12, 18) / 6.0,
        };

        let uv_index = UvIndex {
            average: mean(radiation) / 100.0,
            peak: radiation.iter().copied().fold(f64::NEG_INFINITY, f64::max) / 100.0,
        };

        Ok(Self {
            temperature,
            rainfall,
            humidity,
            uv_index,
            air_quality: AirQuality::simulate(rng),
        })
    }
}

fn non_empty<'a>(series: &'a [f64], name: &'static str) -> Result<&'a [f64], ClimateError> {
    if series.is_empty() {
        Err(ClimateError::EmptySeries(name))
    } else {
        Ok(series)
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn window_sum(values: &[f64], start: usize, end: usize) -> f64 {
    values
        .get(start..end.min(values.len()))
        .map(|window| window.iter().sum())
        .unwrap_or(0.0)
}
