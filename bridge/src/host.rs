use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lighting_bridge_common::{
    BridgeConfig, BridgeError, ConnectionState, DeviceChange, DeviceRegistry, DeviceRequest,
    ThermostatContext, ThermostatMode,
};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::{broadcast::error::RecvError, Mutex},
};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::session::{self, BridgeHandle};

#[derive(Clone)]
struct AppState {
    bridge: BridgeHandle,
}

/// Persisted thermostat settings, keyed by device address.
#[derive(Clone)]
struct ContextStore {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct SessionView {
    state: ConnectionState,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = load_config().await?;

    let store = ContextStore::new();
    let contexts = store.load().await.unwrap_or_else(|err| {
        warn!("failed to load thermostat contexts: {err:#}");
        HashMap::new()
    });

    let registry =
        DeviceRegistry::discover(&config, &contexts).context("invalid lighting table")?;
    info!(devices = registry.len(), "lighting table loaded");

    let (bridge, session_task) = session::spawn(&config, registry);
    spawn_change_loop(bridge.subscribe(), store);

    let app = router(AppState { bridge });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind bridge server at {addr}"))?;

    info!("bridge listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    session_task.abort();
    info!("bridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn load_config() -> anyhow::Result<BridgeConfig> {
    let path = std::env::var("LIGHTING_BRIDGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./config.json"));

    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read bridge config {}", path.display()))?;
    let mut config = BridgeConfig::from_json(&raw)
        .with_context(|| format!("failed to load bridge config {}", path.display()))?;

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

fn apply_env_overrides(config: &mut BridgeConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("CONTROLLER_HOST").filter(|host| !host.trim().is_empty()) {
        config.host = host;
    }
    if let Some(port) = var("CONTROLLER_PORT").and_then(|value| value.parse::<u16>().ok()) {
        config.port = port;
    }
    if let Some(port) = var("BRIDGE_HTTP_PORT").and_then(|value| value.parse::<u16>().ok()) {
        config.http_port = port;
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/devices", get(handle_get_devices))
        .route("/api/session", get(handle_get_session))
        .route("/api/thermostat/mode", post(handle_set_mode))
        .route("/api/thermostat/target", post(handle_set_target))
        .route("/api/dimmer/level", post(handle_set_level))
        .route("/api/switch", post(handle_set_switch))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn spawn_change_loop(
    mut changes: tokio::sync::broadcast::Receiver<DeviceChange>,
    store: ContextStore,
) {
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(DeviceChange::Settings { address, context }) => {
                    if let Err(err) = store.save(&address, context).await {
                        warn!(%address, "failed to persist thermostat context: {err:#}");
                    }
                }
                Ok(change) => info!(address = change.address(), ?change, "device changed"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "device change listener fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn handle_get_devices(State(state): State<AppState>) -> Response {
    match state.bridge.devices().await {
        Ok(devices) => Json(devices).into_response(),
        Err(err) => bridge_error_response(&err),
    }
}

async fn handle_get_session(State(state): State<AppState>) -> Response {
    match state.bridge.connection_state().await {
        Ok(state) => Json(SessionView { state }).into_response(),
        Err(err) => bridge_error_response(&err),
    }
}

async fn handle_set_mode(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    submit(&state, mode_request(&params)).await
}

async fn handle_set_target(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    submit(&state, target_request(&params)).await
}

async fn handle_set_level(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    submit(&state, level_request(&params)).await
}

async fn handle_set_switch(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    submit(&state, switch_request(&params)).await
}

async fn submit(state: &AppState, request: Result<DeviceRequest, String>) -> Response {
    let request = match request {
        Ok(request) => request,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, &message),
    };

    debug!(?request, "control request");
    match state.bridge.request(request).await {
        Ok(status) => Json(status).into_response(),
        Err(err) => bridge_error_response(&err),
    }
}

fn mode_request(params: &HashMap<String, String>) -> Result<DeviceRequest, String> {
    let address = param(params, "address")?;
    let mode = ThermostatMode::parse(param(params, "value")?)
        .ok_or_else(|| "Invalid mode. Use 'HEAT' or 'OFF'".to_string())?;
    Ok(DeviceRequest::SetMode {
        address: address.to_string(),
        mode,
    })
}

fn target_request(params: &HashMap<String, String>) -> Result<DeviceRequest, String> {
    let address = param(params, "address")?;
    let value = param(params, "value")?
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| "Invalid temperature value".to_string())?;
    Ok(DeviceRequest::SetSetpoint {
        address: address.to_string(),
        value,
    })
}

fn level_request(params: &HashMap<String, String>) -> Result<DeviceRequest, String> {
    let address = param(params, "address")?;
    let level = param(params, "value")?
        .parse::<u8>()
        .ok()
        .filter(|level| *level <= 100)
        .ok_or_else(|| "Invalid level (0-100)".to_string())?;
    Ok(DeviceRequest::SetLevel {
        address: address.to_string(),
        level,
    })
}

fn switch_request(params: &HashMap<String, String>) -> Result<DeviceRequest, String> {
    let address = param(params, "address")?;
    let on = match param(params, "value")?.to_ascii_lowercase().as_str() {
        "on" => true,
        "off" => false,
        _ => return Err("Invalid switch value. Use 'on' or 'off'".to_string()),
    };
    Ok(DeviceRequest::SetOn {
        address: address.to_string(),
        on,
    })
}

fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> Result<&'a str, String> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| format!("Missing '{name}' parameter"))
}

fn bridge_error_status(err: &BridgeError) -> StatusCode {
    match err {
        BridgeError::UnknownDevice { .. } => StatusCode::NOT_FOUND,
        BridgeError::InvalidValue(_) => StatusCode::BAD_REQUEST,
        BridgeError::SessionClosed => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn bridge_error_response(err: &BridgeError) -> Response {
    error_response(bridge_error_status(err), &err.to_string())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

impl ContextStore {
    fn new() -> Self {
        let data_dir = std::env::var("LIGHTING_BRIDGE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.lighting-bridge"));
        Self::at(data_dir.join("contexts.json"))
    }

    fn at(path: PathBuf) -> Self {
        Self {
            path: Arc::new(path),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load(&self) -> anyhow::Result<HashMap<String, ThermostatContext>> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    async fn save(&self, address: &str, context: ThermostatContext) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut contexts = self.read().await?;
        contexts.insert(address.to_string(), context);

        let path = self.path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(&contexts)?;
        tokio::fs::write(path, payload)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    async fn read(&self) -> anyhow::Result<HashMap<String, ThermostatContext>> {
        match tokio::fs::read(self.path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(err.into()),
        }
    }
}
