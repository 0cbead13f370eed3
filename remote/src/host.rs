use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::oneshot};
use tracing::{info, warn};

use relaystat_common::{
    error::RemoteError, ConfigStore, DweetRelay, Interval, Remote, RemoteConfig, Runner,
    StatusPoller, SyncClient,
};

#[derive(Clone)]
struct AppState {
    remote: Remote<DweetRelay>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct CommandSent {
    id: String,
}

#[derive(Debug, Deserialize)]
struct OnParams {
    temp: Option<f64>,
    hours: Option<u32>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let path = std::env::var("RELAYSTAT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.relaystat/remote.json"));
    let store = ConfigStore::new(path);

    let mut config: RemoteConfig = store
        .load()
        .await
        .context("cannot read remote configuration")?
        .with_context(|| format!("no configuration found at {}", store.path().display()))?;
    config.sanitize();
    let zone = config.validate().context("invalid remote configuration")?;

    let relay = DweetRelay::new(
        config.relay_url.clone(),
        Duration::from_secs(config.request_timeout_s),
    )
    .context("failed to build relay client")?;
    let sync = SyncClient::new(relay, config.thingid.clone(), &config.password, config.validator());
    let remote = Remote::new(sync, zone, config.override_hours);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let poller = Runner::new(StatusPoller::new(remote.clone()))
        .with_tick(Duration::from_secs(config.poll_status_every_s));
    let poller = tokio::spawn(poller.run_until(async move {
        let _ = stop_rx.await;
    }));

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/on", post(handle_turn_on))
        .route("/api/off", post(handle_turn_off))
        .route("/api/schedule", put(handle_put_schedule))
        .route("/api/cancel", post(handle_cancel))
        .with_state(AppState { remote });

    let port = std::env::var("RELAYSTAT_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(config.http_port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind remote server at {addr}"))?;

    info!("remote for {} listening on http://{addr}", config.thingid);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = stop_tx.send(());
    poller
        .await
        .context("status poller panicked")?
        .context("status poller failed")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.remote.view().await)
}

async fn handle_turn_on(
    State(state): State<AppState>,
    Query(params): Query<OnParams>,
) -> impl IntoResponse {
    command_response(state.remote.turn_on(params.temp, params.hours, Utc::now()).await)
}

async fn handle_turn_off(State(state): State<AppState>) -> impl IntoResponse {
    command_response(state.remote.turn_off(Utc::now()).await)
}

async fn handle_put_schedule(
    State(state): State<AppState>,
    Json(program): Json<Vec<Interval>>,
) -> impl IntoResponse {
    command_response(state.remote.set_schedule(program, Utc::now()).await)
}

async fn handle_cancel(State(state): State<AppState>) -> impl IntoResponse {
    command_response(state.remote.cancel_override(Utc::now()).await)
}

fn command_response(result: Result<String, RemoteError>) -> axum::response::Response {
    match result {
        Ok(id) => (StatusCode::ACCEPTED, Json(CommandSent { id })).into_response(),
        Err(err @ (RemoteError::InvalidInterval { .. } | RemoteError::InvalidTemperature(_))) => {
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
        Err(err) => {
            warn!("failed to send command: {err}");
            error_response(StatusCode::BAD_GATEWAY, &err.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
