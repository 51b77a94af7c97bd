//! Upstream datasets and the concurrent region fetch.
//!
//! A region fetch issues the forecast, species-occurrence and soil requests
//! together and joins on all three. Forecast and occurrence failures fail the
//! whole fetch; a soil failure is logged and replaced by
//! [`SoilSample::FALLBACK`]. Land cover has no upstream yet and is sampled.

use std::{
    collections::BTreeSet,
    fs,
    future::Future,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    climate::{self, ClimateError, ClimateSnapshot, ForecastResponse},
    land::{self, LandComposition, LandProfile, SoilGridsResponse, SoilSample},
    region::{BoundingBox, Coordinates, Region},
    rng::{RngManager, AIR_QUALITY_STREAM, LAND_COVER_STREAM, WATER_ACCESS_STREAM},
};

const OCCURRENCE_PAGE_LIMIT: u32 = 300;

fn default_weather_url() -> String {
    "https://api.open-meteo.com/v1".to_string()
}

fn default_biodiversity_url() -> String {
    "https://api.gbif.org/v1".to_string()
}

fn default_soil_url() -> String {
    "https://rest.isric.org/soilgrids/v2.0".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_weather_url")]
    pub weather_url: String,
    #[serde(default = "default_biodiversity_url")]
    pub biodiversity_url: String,
    #[serde(default = "default_soil_url")]
    pub soil_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            weather_url: default_weather_url(),
            biodiversity_url: default_biodiversity_url(),
            soil_url: default_soil_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{dataset} request timed out")]
    Timeout { dataset: &'static str },
    #[error("{dataset} request failed with status {status}")]
    Status { dataset: &'static str, status: u16 },
    #[error("{dataset} request failed: {source}")]
    Transport {
        dataset: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{dataset} payload could not be decoded: {message}")]
    Decode {
        dataset: &'static str,
        message: String,
    },
    #[error("fixture {path} could not be read: {source}")]
    Fixture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Climate(#[from] ClimateError),
}

impl FetchError {
    fn from_reqwest(dataset: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout { dataset }
        } else if let Some(status) = err.status() {
            FetchError::Status {
                dataset,
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            FetchError::Decode {
                dataset,
                message: err.to_string(),
            }
        } else {
            FetchError::Transport {
                dataset,
                source: err,
            }
        }
    }

    /// Client-side errors and undecodable payloads will not improve on retry.
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            FetchError::Decode { .. } | FetchError::Fixture { .. } | FetchError::Climate(_) => {
                false
            }
        }
    }
}

/// Species occurrences found inside a region's bounding box.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceSummary {
    pub count: u64,
    pub end_of_records: bool,
    pub species: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OccurrencePage {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    end_of_records: bool,
    #[serde(default)]
    results: Vec<OccurrenceRecord>,
}

#[derive(Debug, Deserialize)]
struct OccurrenceRecord {
    species: Option<String>,
}

impl OccurrencePage {
    fn into_summary(self) -> OccurrenceSummary {
        let species: BTreeSet<String> = self
            .results
            .into_iter()
            .filter_map(|record| record.species)
            .collect();
        OccurrenceSummary {
            count: self.count,
            end_of_records: self.end_of_records,
            species: species.into_iter().collect(),
        }
    }
}

/// Raw payloads for one region, before any normalization.
#[derive(Debug, Clone)]
pub struct RegionPayloads {
    pub forecast: ForecastResponse,
    pub occurrences: OccurrenceSummary,
    pub soil: SoilSample,
    pub soil_fallback_used: bool,
}

/// Everything the dashboard shows about a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionData {
    pub climate: ClimateSnapshot,
    pub biodiversity: OccurrenceSummary,
    pub land: LandProfile,
    /// Set when the soil upstream failed and `land.soil` was classified from
    /// [`SoilSample::FALLBACK`].
    pub soil_fallback: bool,
}

pub trait DataSource {
    fn forecast(
        &self,
        point: Coordinates,
    ) -> impl Future<Output = Result<ForecastResponse, FetchError>> + Send;

    fn occurrences(
        &self,
        bbox: BoundingBox,
    ) -> impl Future<Output = Result<OccurrenceSummary, FetchError>> + Send;

    fn soil(&self, point: Coordinates) -> impl Future<Output = Result<SoilSample, FetchError>> + Send;
}

pub struct HttpSource {
    client: reqwest::Client,
    config: UpstreamConfig,
}

impl HttpSource {
    pub fn new(config: UpstreamConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| FetchError::from_reqwest("client", err))?;
        Ok(Self { client, config })
    }

    async fn get_json<T, Q>(&self, dataset: &'static str, url: &str, query: &Q) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized + Sync,
    {
        let client = &self.client;
        with_retry(dataset, self.config.max_retries, self.config.backoff_ms, move || async move {
            debug!(dataset, url, "requesting upstream");
            let response = client
                .get(url)
                .query(query)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(|err| FetchError::from_reqwest(dataset, err))?;
            response
                .json::<T>()
                .await
                .map_err(|err| FetchError::from_reqwest(dataset, err))
        })
        .await
    }
}

impl DataSource for HttpSource {
    async fn forecast(&self, point: Coordinates) -> Result<ForecastResponse, FetchError> {
        let url = format!("{}/forecast", self.config.weather_url);
        let query = [
            ("latitude", point.lat.to_string()),
            ("longitude", point.lng.to_string()),
            ("hourly", climate::HOURLY_VARIABLES.to_string()),
            ("daily", climate::DAILY_VARIABLES.to_string()),
            ("timezone", "auto".to_string()),
            ("past_days", climate::PAST_DAYS.to_string()),
            ("forecast_days", climate::FORECAST_DAYS.to_string()),
        ];
        self.get_json("forecast", &url, &query[..]).await
    }

    async fn occurrences(&self, bbox: BoundingBox) -> Result<OccurrenceSummary, FetchError> {
        let url = format!("{}/occurrence/search", self.config.biodiversity_url);
        let query = [
            ("decimalLongitude", format!("{},{}", bbox.west, bbox.east)),
            ("decimalLatitude", format!("{},{}", bbox.south, bbox.north)),
            ("limit", OCCURRENCE_PAGE_LIMIT.to_string()),
        ];
        let page: OccurrencePage = self.get_json("biodiversity", &url, &query[..]).await?;
        Ok(page.into_summary())
    }

    async fn soil(&self, point: Coordinates) -> Result<SoilSample, FetchError> {
        let url = format!("{}/properties/query", self.config.soil_url);
        let mut query = vec![
            ("lat", point.lat.to_string()),
            ("lon", point.lng.to_string()),
            ("value", "mean".to_string()),
        ];
        query.extend(land::SOIL_PROPERTIES.iter().map(|p| ("property", p.to_string())));
        query.extend(land::SOIL_DEPTHS.iter().map(|d| ("depth", d.to_string())));
        let response: SoilGridsResponse = self.get_json("soil", &url, &query[..]).await?;
        Ok(SoilSample::from_response(&response))
    }
}

/// Serves recorded upstream payloads from a directory.
///
/// Expects `forecast.json`, `occurrences.json` and `soil.json`. A missing
/// soil file behaves like an unreachable soil upstream.
pub struct FixtureSource {
    dir: PathBuf,
}

impl FixtureSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn read<T: DeserializeOwned>(&self, dataset: &'static str, file: &str) -> Result<T, FetchError> {
        let path = self.dir.join(file);
        let data = fs::read_to_string(&path).map_err(|source| FetchError::Fixture {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|err| FetchError::Decode {
            dataset,
            message: format!("{}: {err}", path.display()),
        })
    }
}

impl DataSource for FixtureSource {
    async fn forecast(&self, _point: Coordinates) -> Result<ForecastResponse, FetchError> {
        self.read("forecast", "forecast.json")
    }

    async fn occurrences(&self, _bbox: BoundingBox) -> Result<OccurrenceSummary, FetchError> {
        let page: OccurrencePage = self.read("biodiversity", "occurrences.json")?;
        Ok(page.into_summary())
    }

    async fn soil(&self, _point: Coordinates) -> Result<SoilSample, FetchError> {
        let response: SoilGridsResponse = self.read("soil", "soil.json")?;
        Ok(SoilSample::from_response(&response))
    }
}

/// Run `attempt` until it succeeds, fails permanently, or retries run out.
pub async fn with_retry<T, F, Fut>(
    dataset: &'static str,
    max_retries: u32,
    backoff_ms: u64,
    mut attempt: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut tries = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if tries < max_retries && err.is_retryable() => {
                let delay = Duration::from_millis(backoff_ms.saturating_mul(1 << tries.min(16)));
                warn!(dataset, attempt = tries + 1, ?delay, error = %err, "upstream call failed, retrying");
                tokio::time::sleep(delay).await;
                tries += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Fetch all upstream payloads for `region` concurrently.
pub async fn fetch_payloads<S: DataSource>(
    source: &S,
    region: &Region,
) -> Result<RegionPayloads, FetchError> {
    let point = region.geometry.query_point();
    let bbox = region.geometry.bounding_box();
    info!(region = %region.id, kind = region.geometry.kind(), "fetching region data");

    let soil = async {
        match source.soil(point).await {
            Ok(sample) => (sample, false),
            Err(err) => {
                warn!(region = %region.id, error = %err, "soil upstream unavailable, using fallback sample");
                (SoilSample::FALLBACK, true)
            }
        }
    };
    let (upstream, (soil, soil_fallback_used)) = tokio::join!(
        async { tokio::try_join!(source.forecast(point), source.occurrences(bbox)) },
        soil
    );
    let (forecast, occurrences) = upstream?;

    Ok(RegionPayloads {
        forecast,
        occurrences,
        soil,
        soil_fallback_used,
    })
}

/// Turn fetched payloads into [`RegionData`], drawing simulated figures from `rng`.
pub fn assemble(payloads: RegionPayloads, rng: &mut RngManager) -> Result<RegionData, FetchError> {
    let climate =
        ClimateSnapshot::from_forecast(&payloads.forecast, &mut rng.stream(AIR_QUALITY_STREAM))?;
    let composition = LandComposition::simulate(&mut rng.stream(LAND_COVER_STREAM));
    let land = land::normalize(
        &climate,
        &payloads.soil,
        composition,
        &mut rng.stream(WATER_ACCESS_STREAM),
    );
    Ok(RegionData {
        climate,
        biodiversity: payloads.occurrences,
        land,
        soil_fallback: payloads.soil_fallback_used,
    })
}

/// Fetch and normalize everything for `region`.
pub async fn fetch_region<S: DataSource>(
    source: &S,
    region: &Region,
    rng: &mut RngManager,
) -> Result<RegionData, FetchError> {
    let payloads = fetch_payloads(source, region).await?;
    assemble(payloads, rng)
}
