use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{net::TcpListener, sync::broadcast};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{info, warn};

use crate::{
    climate::ClimateSnapshot,
    land::LandProfile,
    projection::SimulationParameters,
    region::{Geometry, GeometryError, Region},
    rng::RngManager,
    session::{ProjectionRun, Session, SessionError},
    upstream::{self, DataSource, FetchError, RegionData},
};

pub struct AppState<S> {
    source: S,
    seed: u64,
    session: Mutex<Session>,
    broadcaster: broadcast::Sender<SessionEvent>,
}

impl<S> AppState<S> {
    /// `seed` keys the simulated figures of every region fetched through this state.
    pub fn new(source: S, seed: u64) -> Self {
        let (broadcaster, _) = broadcast::channel(128);
        Self {
            source,
            seed,
            session: Mutex::new(Session::new()),
            broadcaster,
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().expect("session lock poisoned")
    }

    fn publish(&self, kind: EventKind, region_id: Option<&str>) {
        let event = SessionEvent {
            kind,
            region_id: region_id.map(str::to_string),
            at: Utc::now(),
        };
        // No subscribers is not an error.
        let _ = self.broadcaster.send(event);
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
enum EventKind {
    RegionSelected,
    RegionLoaded,
    RegionFailed,
    RegionCleared,
    SimulationCompleted,
}

impl EventKind {
    fn as_str(self) -> &'static str {
        match self {
            EventKind::RegionSelected => "region_selected",
            EventKind::RegionLoaded => "region_loaded",
            EventKind::RegionFailed => "region_failed",
            EventKind::RegionCleared => "region_cleared",
            EventKind::SimulationCompleted => "simulation_completed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct SessionEvent {
    kind: EventKind,
    region_id: Option<String>,
    at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegionRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub geometry: Geometry,
}

#[derive(Debug, Serialize)]
pub struct RegionResponse {
    pub region: Region,
    pub data: RegionData,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("{0} not available")]
    NotFound(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Geometry(_) | ApiError::Session(SessionError::Parameters(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Session(_) => StatusCode::CONFLICT,
            ApiError::Fetch(FetchError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Fetch(_) => StatusCode::BAD_GATEWAY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub struct WebServerConfig {
    pub host: String,
    pub port: u16,
}

pub fn router<S>(state: Arc<AppState<S>>) -> Router
where
    S: DataSource + Send + Sync + 'static,
{
    Router::new()
        .route("/api/health", get(health))
        .route(
            "/api/region",
            get(current_region::<S>)
                .post(select_region::<S>)
                .delete(clear_region::<S>),
        )
        .route("/api/climate", get(climate::<S>))
        .route("/api/land", get(land::<S>))
        .route(
            "/api/simulation",
            get(current_simulation::<S>).post(run_simulation::<S>),
        )
        .route("/api/state", get(session_state::<S>))
        .route("/api/events", get(stream_events::<S>))
        .with_state(state)
}

pub async fn run<S>(config: WebServerConfig, state: Arc<AppState<S>>) -> Result<()>
where
    S: DataSource + Send + Sync + 'static,
{
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("reforest API listening on http://{addr} (Ctrl+C to stop)");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("interrupt received, draining API connections"),
        Err(err) => warn!(error = %err, "could not listen for interrupt, stopping API"),
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn select_region<S>(
    State(state): State<Arc<AppState<S>>>,
    Json(request): Json<RegionRequest>,
) -> Result<Json<RegionResponse>, ApiError>
where
    S: DataSource + Send + Sync + 'static,
{
    let region = Region::new(request.name, request.geometry)?;
    let region_id = region.id.clone();
    state.session().select_region(region.clone());
    state.publish(EventKind::RegionSelected, Some(&region_id));

    let payloads = match upstream::fetch_payloads(&state.source, &region).await {
        Ok(payloads) => payloads,
        Err(err) => {
            warn!(region = %region_id, error = %err, "region fetch failed");
            state.session().fetch_failed(&region_id);
            state.publish(EventKind::RegionFailed, Some(&region_id));
            return Err(err.into());
        }
    };

    let mut rng = RngManager::for_region(state.seed, &region);
    let data = match upstream::assemble(payloads, &mut rng) {
        Ok(data) => data,
        Err(err) => {
            state.session().fetch_failed(&region_id);
            state.publish(EventKind::RegionFailed, Some(&region_id));
            return Err(err.into());
        }
    };

    state.session().apply_region_data(&region_id, data.clone())?;
    state.publish(EventKind::RegionLoaded, Some(&region_id));
    Ok(Json(RegionResponse { region, data }))
}

async fn current_region<S>(State(state): State<Arc<AppState<S>>>) -> Result<Json<Region>, ApiError> {
    let session = state.session();
    let region = session.region().cloned().ok_or(ApiError::NotFound("region"))?;
    Ok(Json(region))
}

async fn clear_region<S>(State(state): State<Arc<AppState<S>>>) -> StatusCode {
    state.session().clear_region();
    state.publish(EventKind::RegionCleared, None);
    StatusCode::NO_CONTENT
}

async fn climate<S>(State(state): State<Arc<AppState<S>>>) -> Result<Json<ClimateSnapshot>, ApiError> {
    let session = state.session();
    let data = session.data().ok_or(ApiError::NotFound("climate data"))?;
    Ok(Json(data.climate.clone()))
}

async fn land<S>(State(state): State<Arc<AppState<S>>>) -> Result<Json<LandProfile>, ApiError> {
    let session = state.session();
    let data = session.data().ok_or(ApiError::NotFound("land data"))?;
    Ok(Json(data.land))
}

async fn run_simulation<S>(
    State(state): State<Arc<AppState<S>>>,
    Json(parameters): Json<SimulationParameters>,
) -> Result<Json<ProjectionRun>, ApiError> {
    let (run, region_id) = {
        let mut session = state.session();
        session.set_parameters(parameters)?;
        let run = session.run_simulation()?.clone();
        (run, session.region().map(|r| r.id.clone()))
    };
    state.publish(EventKind::SimulationCompleted, region_id.as_deref());
    Ok(Json(run))
}

async fn current_simulation<S>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<ProjectionRun>, ApiError> {
    let session = state.session();
    let run = session.projection().cloned().ok_or(ApiError::NotFound("simulation"))?;
    Ok(Json(run))
}

async fn session_state<S>(State(state): State<Arc<AppState<S>>>) -> Json<Session> {
    Json(state.session().clone())
}

async fn stream_events<S>(
    State(state): State<Arc<AppState<S>>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.broadcaster.subscribe();
    // Lagged subscribers skip the dropped events; the next /api/state read resyncs them.
    let stream = BroadcastStream::new(rx).filter_map(|msg| {
        let event = msg.ok()?;
        Event::default()
            .event(event.kind.as_str())
            .json_data(&event)
            .ok()
            .map(Ok)
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(2))
            .text("keep-alive"),
    )
}
