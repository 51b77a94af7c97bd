use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use approx::assert_relative_eq;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use reforest::{
    climate,
    land::{SOIL_DEPTHS, SOIL_PROPERTIES},
    region::{Coordinates, Geometry, Region},
    upstream::{fetch_payloads, DataSource, FetchError, HttpSource, UpstreamConfig},
};
use tokio::net::TcpListener;

type Pairs = Vec<(String, String)>;

#[derive(Clone, Default)]
struct Recorder {
    queries: Arc<Mutex<HashMap<&'static str, Pairs>>>,
}

impl Recorder {
    fn record(&self, dataset: &'static str, pairs: Pairs) {
        self.queries
            .lock()
            .expect("recorder lock poisoned")
            .insert(dataset, pairs);
    }

    fn values(&self, dataset: &str, key: &str) -> Vec<String> {
        let queries = self.queries.lock().expect("recorder lock poisoned");
        queries
            .get(dataset)
            .map(|pairs| {
                pairs
                    .iter()
                    .filter(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn single(&self, dataset: &str, key: &str) -> String {
        let values = self.values(dataset, key);
        assert_eq!(values.len(), 1, "{dataset} sent {key} {values:?}");
        values[0].clone()
    }
}

fn fixture(file: &str) -> impl IntoResponse {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures/basin")
        .join(file);
    let body = fs::read_to_string(path).expect("fixture exists");
    ([(header::CONTENT_TYPE, "application/json")], body)
}

async fn forecast(State(rec): State<Recorder>, Query(pairs): Query<Pairs>) -> impl IntoResponse {
    rec.record("forecast", pairs);
    fixture("forecast.json")
}

async fn occurrences(State(rec): State<Recorder>, Query(pairs): Query<Pairs>) -> impl IntoResponse {
    rec.record("biodiversity", pairs);
    fixture("occurrences.json")
}

async fn soil(State(rec): State<Recorder>, Query(pairs): Query<Pairs>) -> impl IntoResponse {
    rec.record("soil", pairs);
    fixture("soil.json")
}

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
    let addr = listener.local_addr().expect("stub address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub server");
    });
    format!("http://{addr}")
}

fn config(base: &str, timeout_secs: u64, max_retries: u32) -> UpstreamConfig {
    UpstreamConfig {
        weather_url: base.to_string(),
        biodiversity_url: base.to_string(),
        soil_url: base.to_string(),
        timeout_secs,
        max_retries,
        backoff_ms: 1,
    }
}

fn rectangle() -> Region {
    Region::with_id(
        "region-http".into(),
        None,
        Geometry::Rectangle {
            south_west: Coordinates::new(-3.2, -60.1),
            north_east: Coordinates::new(-3.0, -59.9),
        },
    )
}

#[tokio::test]
async fn requests_carry_the_upstream_query_shapes() {
    let rec = Recorder::default();
    let base = serve(
        Router::new()
            .route("/forecast", get(forecast))
            .route("/occurrence/search", get(occurrences))
            .route("/properties/query", get(soil))
            .with_state(rec.clone()),
    )
    .await;
    let source = HttpSource::new(config(&base, 5, 0)).expect("client builds");

    let payloads = fetch_payloads(&source, &rectangle())
        .await
        .expect("stub serves every dataset");
    assert!(!payloads.soil_fallback_used);
    assert_eq!(payloads.soil.clay, Some(35.0));
    assert_eq!(payloads.occurrences.count, 48_213);
    assert_eq!(payloads.forecast.daily.temperature_2m_max.len(), 7);

    assert_eq!(rec.single("forecast", "hourly"), climate::HOURLY_VARIABLES);
    assert_eq!(rec.single("forecast", "daily"), climate::DAILY_VARIABLES);
    assert_eq!(rec.single("forecast", "timezone"), "auto");
    assert_eq!(rec.single("forecast", "past_days"), "30");
    assert_eq!(rec.single("forecast", "forecast_days"), "16");
    let lat: f64 = rec.single("forecast", "latitude").parse().expect("numeric latitude");
    let lng: f64 = rec.single("forecast", "longitude").parse().expect("numeric longitude");
    assert_relative_eq!(lat, -3.1, epsilon = 1e-9);
    assert_relative_eq!(lng, -60.0, epsilon = 1e-9);

    assert_eq!(rec.single("biodiversity", "decimalLongitude"), "-60.1,-59.9");
    assert_eq!(rec.single("biodiversity", "decimalLatitude"), "-3.2,-3");
    assert_eq!(rec.single("biodiversity", "limit"), "300");

    assert_eq!(rec.values("soil", "property"), SOIL_PROPERTIES.to_vec());
    assert_eq!(rec.values("soil", "depth"), SOIL_DEPTHS.to_vec());
    assert_eq!(rec.single("soil", "value"), "mean");
}

struct Failing {
    status: StatusCode,
    body: &'static str,
    delay: Duration,
    hits: AtomicU32,
}

async fn failing(State(stub): State<Arc<Failing>>) -> impl IntoResponse {
    stub.hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(stub.delay).await;
    (stub.status, stub.body)
}

async fn failing_forecast(
    status: StatusCode,
    body: &'static str,
    delay: Duration,
    timeout_secs: u64,
    max_retries: u32,
) -> (Result<climate::ForecastResponse, FetchError>, u32) {
    let stub = Arc::new(Failing {
        status,
        body,
        delay,
        hits: AtomicU32::new(0),
    });
    let base = serve(
        Router::new()
            .route("/forecast", get(failing))
            .with_state(stub.clone()),
    )
    .await;
    let source = HttpSource::new(config(&base, timeout_secs, max_retries)).expect("client builds");
    let result = source.forecast(Coordinates::new(0.0, 0.0)).await;
    (result, stub.hits.load(Ordering::SeqCst))
}

#[tokio::test]
async fn server_errors_are_retried_then_reported() {
    let (result, hits) =
        failing_forecast(StatusCode::SERVICE_UNAVAILABLE, "busy", Duration::ZERO, 5, 2).await;
    assert!(matches!(
        result,
        Err(FetchError::Status {
            dataset: "forecast",
            status: 503
        })
    ));
    assert_eq!(hits, 3);
}

#[tokio::test]
async fn client_errors_fail_without_retry() {
    let (result, hits) = failing_forecast(StatusCode::NOT_FOUND, "", Duration::ZERO, 5, 2).await;
    assert!(matches!(
        result,
        Err(FetchError::Status {
            dataset: "forecast",
            status: 404
        })
    ));
    assert_eq!(hits, 1);
}

#[tokio::test]
async fn malformed_payload_is_a_decode_error() {
    let (result, hits) = failing_forecast(StatusCode::OK, "not json", Duration::ZERO, 5, 2).await;
    assert!(matches!(
        result,
        Err(FetchError::Decode {
            dataset: "forecast",
            ..
        })
    ));
    assert_eq!(hits, 1, "undecodable payloads are not retried");
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let (result, _) =
        failing_forecast(StatusCode::OK, "{}", Duration::from_secs(3), 1, 0).await;
    assert!(matches!(
        result,
        Err(FetchError::Timeout { dataset: "forecast" })
    ));
}
