//! Control plane: alarm CRUD, manual trigger/stop, the request-response
//! telemetry endpoint, delay statistics and a status snapshot.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, patch, post};
use axum::Router;
use rumqttc::{AsyncClient, QoS};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::state::SharedState;
use crate::store::SharedStore;
use wakemat_proto::{Command, SensorReport};

// ---------------------------------------------------------------------------
// Shared handler state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub shared: SharedState,
    pub store: SharedStore,
    pub mqtt: AsyncClient,
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AlarmDraft {
    time: String,
    #[serde(default)]
    weekdays: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct AlarmPatch {
    time: Option<String>,
    weekdays: Option<Vec<u8>>,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/alarms", get(list_alarms).post(create_alarm))
        .route(
            "/alarms/{id}",
            get(get_alarm).put(update_alarm).delete(delete_alarm),
        )
        .route("/alarms/{id}/toggle", patch(toggle_alarm))
        .route("/trigger_alarm", post(trigger_alarm))
        .route("/stop_alarm", post(stop_alarm))
        .route("/sensor_data", post(sensor_data))
        .route("/delay", get(average_delay))
        .route("/status", get(status))
        .with_state(state)
}

fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"message": "alarm not found"})),
    )
}

fn invalid(message: String) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({"message": message})),
    )
}

// -- alarm CRUD --------------------------------------------------------------

async fn list_alarms(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.store.read().await;
    Json(store.list().to_vec())
}

async fn get_alarm(State(state): State<AppState>, Path(id): Path<u32>) -> impl IntoResponse {
    let store = state.store.read().await;
    match store.get(id) {
        Some(alarm) => Json(json!({"alarm": alarm})).into_response(),
        None => not_found().into_response(),
    }
}

async fn create_alarm(
    State(state): State<AppState>,
    Json(draft): Json<AlarmDraft>,
) -> impl IntoResponse {
    let mut store = state.store.write().await;
    match store.add(draft.time, draft.weekdays) {
        Ok(alarm) => {
            info!(id = alarm.id, time = %alarm.time, "alarm created");
            (StatusCode::CREATED, Json(json!({"alarm": alarm}))).into_response()
        }
        Err(e) => invalid(e.to_string()).into_response(),
    }
}

async fn update_alarm(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(patch): Json<AlarmPatch>,
) -> impl IntoResponse {
    let mut store = state.store.write().await;
    match store.update(id, patch.time, patch.weekdays) {
        Ok(Some(alarm)) => Json(json!({"alarm": alarm})).into_response(),
        Ok(None) => not_found().into_response(),
        Err(e) => invalid(e.to_string()).into_response(),
    }
}

async fn toggle_alarm(State(state): State<AppState>, Path(id): Path<u32>) -> impl IntoResponse {
    let mut store = state.store.write().await;
    match store.toggle(id) {
        Some(alarm) => Json(json!({"alarm": alarm})).into_response(),
        None => not_found().into_response(),
    }
}

async fn delete_alarm(State(state): State<AppState>, Path(id): Path<u32>) -> impl IntoResponse {
    let mut store = state.store.write().await;
    if store.remove(id) {
        Json(json!({"message": "alarm deleted"})).into_response()
    } else {
        not_found().into_response()
    }
}

// -- manual trigger / stop ----------------------------------------------------

async fn trigger_alarm(State(state): State<AppState>) -> impl IntoResponse {
    publish_command(&state, Command::TriggerAlarm, true).await
}

async fn stop_alarm(State(state): State<AppState>) -> impl IntoResponse {
    publish_command(&state, Command::StopAlarm, false).await
}

async fn publish_command(
    state: &AppState,
    cmd: Command,
    triggered: bool,
) -> (StatusCode, Json<serde_json::Value>) {
    let result = state
        .mqtt
        .publish(cmd.topic(), QoS::AtLeastOnce, false, cmd.to_payload())
        .await;

    let mut st = state.shared.write().await;
    match result {
        Ok(()) => {
            st.alarm_triggered = triggered;
            let detail = if triggered {
                "triggered manually"
            } else {
                "stopped manually"
            };
            st.record_alarm(detail.to_string());
            (StatusCode::OK, Json(json!({"message": detail})))
        }
        Err(e) => {
            error!("command publish failed: {e}");
            st.record_error(format!("command publish failed: {e}"));
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"message": "failed to reach the node"})),
            )
        }
    }
}

// -- telemetry (request-response mode) ----------------------------------------

/// The node POSTs here in request-response mode; missing fields are
/// rejected by the JSON extractor with a 422 before we ever run.
async fn sensor_data(
    State(state): State<AppState>,
    Json(report): Json<SensorReport>,
) -> impl IntoResponse {
    let mut st = state.shared.write().await;
    st.record_sensor(report);
    StatusCode::OK
}

// -- stats ---------------------------------------------------------------------

async fn average_delay(State(state): State<AppState>) -> impl IntoResponse {
    let st = state.shared.read().await;
    Json(json!({"delay": st.delay.average_ms}))
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let st = state.shared.read().await;
    Json(st.to_status())
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(state: AppState, port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind web port");

    info!(%addr, "control plane listening");

    axum::serve(listener, router(state))
        .await
        .expect("web server error");
}

// ===========================================================================
// Tests
// ===========================================================================
