//! Driver Monitoring API Server
//!
//! REST API for the driver alert pipeline:
//! - `POST/GET /driver-alerts` alert ingestion and query
//! - `/sessions/:driver_id` live monitoring sessions fed with landmark frames
//! - `/health` and Prometheus `/metrics`

use alerting::BroadcastNotifier;
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, patch, post, put},
    Json, Router,
};
use cloud_sync::MqttNotifier;
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod error;
mod routes;
pub mod settings;
pub mod state;

pub use error::ApiError;
pub use settings::{LoggingSettings, Settings};
pub use state::{AppState, Notifier, SharedState, Store};

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub metrics: SystemMetrics,
}

/// System metrics
#[derive(Debug, Serialize)]
pub struct SystemMetrics {
    pub alert_count: usize,
    pub active_sessions: usize,
}

/// Create the application router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route(
            "/driver-alerts",
            get(routes::alerts::get_alerts).post(routes::alerts::create_alert),
        )
        .route("/driver-alerts/:id/resolve", patch(routes::alerts::resolve_alert))
        .route(
            "/drivers/:driver_id",
            get(routes::drivers::get_driver).put(routes::drivers::put_driver),
        )
        .route("/sessions", get(routes::sessions::list_sessions))
        .route(
            "/sessions/:driver_id",
            post(routes::sessions::start_session).delete(routes::sessions::stop_session),
        )
        .route("/sessions/:driver_id/frames", post(routes::sessions::submit_frame))
        .route("/sessions/:driver_id/trip", put(routes::sessions::update_trip))
        .route("/sessions/:driver_id/state", get(routes::sessions::session_state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let state = state.read().await;
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        metrics: SystemMetrics {
            alert_count: state.repository.alert_count(),
            active_sessions: state.sessions.session_count(),
        },
    })
}

/// Prometheus scrape endpoint
async fn metrics_handler(State(state): State<SharedState>) -> Result<String, ApiError> {
    let state = state.read().await;
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .ok_or_else(|| ApiError::Unavailable("Metrics exporter not installed".to_string()))
}

/// Initialize logging
pub fn init_logging(settings: &LoggingSettings) -> Result<(), SetGlobalDefaultError> {
    let level = settings.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if settings.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    }
}

/// Select the real-time transport from settings
pub async fn build_notifier(settings: &Settings) -> anyhow::Result<Notifier> {
    Ok(match &settings.mqtt {
        Some(mqtt) => Notifier::Mqtt(MqttNotifier::connect(mqtt.clone()).await?),
        None => Notifier::Broadcast(BroadcastNotifier::default()),
    })
}

/// Run the server until Ctrl-C
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let notifier = build_notifier(&settings).await?;
    let metrics = PrometheusBuilder::new().install_recorder()?;
    let state = AppState::new(&settings, notifier)?.with_metrics(metrics).shared();
    let app = create_router(state.clone());

    info!("Starting API server on {}", settings.server.addr);

    let listener = tokio::net::TcpListener::bind(&settings.server.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let sessions = state.read().await.sessions.clone();
    for summary in sessions.stop_all().await {
        info!(
            driver = %summary.driver_id,
            alerts = summary.alerts_raised,
            "Session closed at shutdown"
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::{AlertStore, Persisted};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use dms::{Alert, AlertType, DriverState, Episode, TripContext};
    use landmarks::{LandmarkFrame, Point2};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn test_state() -> SharedState {
        let mut settings = Settings::default();
        settings.dms.layout = landmarks::LandmarkLayout::compact();
        AppState::new(&settings, Notifier::Broadcast(BroadcastNotifier::default()))
            .unwrap()
            .shared()
    }

    async fn send(state: &SharedState, request: Request<Body>) -> (StatusCode, Value) {
        let response = create_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let state = test_state();
        let (status, body) = send(&state, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["metrics"]["alert_count"], 0);
    }

    #[tokio::test]
    async fn test_metrics_without_exporter() {
        let state = test_state();
        let (status, _) = send(&state, get("/metrics")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_create_then_duplicate_alert() {
        let state = test_state();
        let alert = json!({
            "driverId": "drv-1",
            "alertType": "alarm",
            "timestamp": "2024-05-01T08:30:00Z",
            "driverState": "sleeping",
            "eyeClosedDuration": 5.1,
            "busId": "bus-9",
            "episodeId": "0b6c1c6e-8f0e-4c55-9a43-2f6b1a6f0f11"
        });

        let (status, created) = send(&state, post_json("/driver-alerts", &alert)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["created"], true);

        let (status, existing) = send(&state, post_json("/driver-alerts", &alert)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(existing["id"], created["id"]);
        assert_eq!(existing["created"], false);
    }

    #[tokio::test]
    async fn test_missing_fields_rejected() {
        let state = test_state();
        let (status, body) = send(
            &state,
            post_json("/driver-alerts", &json!({"driverId": "drv-1", "alertType": "warning"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("timestamp"));

        let (status, _) = send(
            &state,
            post_json(
                "/driver-alerts",
                &json!({
                    "driverId": "drv-1",
                    "alertType": "nap",
                    "timestamp": "2024-05-01T08:30:00Z"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_internal_alert_type_names_rejected() {
        let state = test_state();
        for alert_type in ["critical", "drowsiness_critical"] {
            let alert = json!({
                "driverId": "drv-1",
                "alertType": alert_type,
                "timestamp": "2024-05-01T08:30:00Z"
            });
            let (status, _) = send(&state, post_json("/driver-alerts", &alert)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{alert_type}");
        }
        assert_eq!(state.read().await.repository.alert_count(), 0);
    }

    #[test]
    fn test_submissions_counted_by_status() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        metrics::with_local_recorder(&recorder, || {
            runtime.block_on(async {
                let state = test_state();
                let alert = json!({
                    "driverId": "drv-1",
                    "alertType": "warning",
                    "timestamp": "2024-05-01T08:30:00Z",
                    "episodeId": "0b6c1c6e-8f0e-4c55-9a43-2f6b1a6f0f11"
                });
                send(&state, post_json("/driver-alerts", &alert)).await;
                send(&state, post_json("/driver-alerts", &alert)).await;
                send(&state, post_json("/driver-alerts", &json!({"driverId": "drv-1"}))).await;
            })
        });

        let rendered = handle.render();
        assert!(rendered.contains(r#"dms_alert_submissions_total{status="201"} 1"#), "{rendered}");
        assert!(rendered.contains(r#"dms_alert_submissions_total{status="200"} 1"#), "{rendered}");
        assert!(rendered.contains(r#"dms_alert_submissions_total{status="400"} 1"#), "{rendered}");
    }

    #[tokio::test]
    async fn test_remote_store_forwards_to_backend() {
        let backend = test_state();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(backend.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut settings = Settings::default();
        settings.dms.layout = landmarks::LandmarkLayout::compact();
        settings.storage.remote_url = Some(format!("http://{addr}/"));
        let edge = AppState::new(&settings, Notifier::Broadcast(BroadcastNotifier::default()))
            .unwrap();
        let store = edge.sessions.dispatcher().store();
        assert!(matches!(store, Store::Remote(_)));

        let episode = Episode {
            id: Uuid::new_v4(),
            driver_id: "drv-7".into(),
            started_at_ms: 0,
            last_seen_closed_at_ms: 3000,
            continuous_closed_ms: 3000,
            warning_fired: true,
            critical_fired: false,
            resolved: false,
            end: None,
        };
        let alert = Alert::for_episode(
            AlertType::Warning,
            &episode,
            DriverState::Sleeping,
            3000,
            &TripContext::default(),
        );

        let first = store.persist(&alert).await.unwrap();
        let second = store.persist(&alert).await.unwrap();
        assert!(first.is_created());
        assert_eq!(second, Persisted::Existing(first.id()));
        assert_eq!(backend.read().await.repository.alert_count(), 1);
        assert_eq!(edge.repository.alert_count(), 0);
    }

    #[test]
    fn test_local_store_by_default() {
        let state = test_state();
        let state = state.try_read().unwrap();
        assert!(matches!(state.sessions.dispatcher().store(), Store::Local(_)));
    }

    #[tokio::test]
    async fn test_query_newest_first_with_identity() {
        let state = test_state();
        let put = Request::builder()
            .method("PUT")
            .uri("/drivers/drv-1")
            .header("content-type", "application/json")
            .body(Body::from(json!({"name": "Chidi Okafor"}).to_string()))
            .unwrap();
        let (status, _) = send(&state, put).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        for (minute, alert_type) in [(10, "warning"), (12, "alarm"), (11, "tension")] {
            let alert = json!({
                "driverId": "drv-1",
                "alertType": alert_type,
                "timestamp": format!("2024-05-01T08:{minute}:00Z"),
                "driverState": "sleeping"
            });
            let (status, _) = send(&state, post_json("/driver-alerts", &alert)).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = send(&state, get("/driver-alerts?driverId=drv-1&limit=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["data"][0]["alertType"], "drowsiness_critical");
        assert_eq!(body["data"][0]["severity"], "critical");
        assert_eq!(body["data"][1]["alertType"], "tension_detected");
        assert_eq!(body["data"][1]["severity"], "high");
        assert_eq!(body["data"][0]["driver"]["name"], "Chidi Okafor");

        let (_, body) = send(&state, get("/driver-alerts?alertType=warning")).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["alertType"], "drowsiness_warning");
    }

    #[tokio::test]
    async fn test_resolve_alert() {
        let state = test_state();
        let alert = json!({
            "driverId": "drv-1",
            "alertType": "sleeping",
            "timestamp": "2024-05-01T08:30:00Z"
        });
        let (_, created) = send(&state, post_json("/driver-alerts", &alert)).await;
        let id = created["id"].as_str().unwrap().to_string();

        let request = Request::builder()
            .method("PATCH")
            .uri(format!("/driver-alerts/{id}/resolve"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resolved"], true);
        assert_eq!(body["severity"], "critical");
    }

    fn open_eyes_frame(timestamp_ms: u64) -> Value {
        let eye = |x: f32| {
            vec![
                Point2::new(x, 100.0),
                Point2::new(x + 6.0, 97.0),
                Point2::new(x + 14.0, 97.0),
                Point2::new(x + 20.0, 100.0),
                Point2::new(x + 14.0, 103.0),
                Point2::new(x + 6.0, 103.0),
            ]
        };
        let mut points = eye(100.0);
        points.extend(eye(160.0));
        points.extend([
            Point2::new(140.0, 130.0),
            Point2::new(120.0, 160.0),
            Point2::new(160.0, 160.0),
        ]);
        serde_json::to_value(LandmarkFrame::new(timestamp_ms, 0, points)).unwrap()
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let state = test_state();

        let (status, body) =
            send(&state, post_json("/sessions/drv-2", &json!({"busId": "bus-1"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["trip"]["busId"], "bus-1");

        let (status, _) = send(&state, post_json("/sessions/drv-2", &json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) =
            send(&state, post_json("/sessions/drv-2/frames", &open_eyes_frame(0))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["outcome"], "accepted");

        let mut latest = Value::Null;
        for _ in 0..20 {
            tokio::task::yield_now().await;
            let (status, body) = send(&state, get("/sessions/drv-2/state")).await;
            assert_eq!(status, StatusCode::OK);
            if !body.is_null() {
                latest = body;
                break;
            }
        }
        assert_eq!(latest["status"], "processed");
        assert_eq!(latest["driverState"], "active");

        let request = Request::builder()
            .method("DELETE")
            .uri("/sessions/drv-2")
            .body(Body::empty())
            .unwrap();
        let (status, summary) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["framesProcessed"], 1);

        let (status, _) = send(&state, get("/sessions/drv-2/state")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_frame_for_unknown_session() {
        let state = test_state();
        let (status, _) =
            send(&state, post_json("/sessions/nobody/frames", &open_eyes_frame(0))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
