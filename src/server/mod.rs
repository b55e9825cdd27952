//! HTTP front end: the web API, health probe, webhook route, and static
//! file serving.
//!
//! Handlers validate the caller-supplied id at this boundary and call the
//! ledger under `spawn_blocking` (backend saves are blocking I/O). Backend
//! trouble never shows up here; "already claimed" is a plain 400, matching
//! what the web front end expects.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

use crate::bot::{self, BotClient, Update};
use crate::config::Config;
use crate::core::UserId;
use crate::ledger::Ledger;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    /// Present when the webhook transport is active.
    pub bot: Option<Arc<BotClient>>,
}

pub fn router(cfg: &Config, state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let api = Router::new()
        .route("/api/user", get(get_user))
        .route("/api/checkin", get(checkin).post(checkin))
        .route("/api/share", get(share).post(share))
        .layer(cors);

    let mut app = Router::new()
        .merge(api)
        .route("/bot", post(webhook))
        .route("/health", get(health))
        .with_state(state);

    if let Some(dir) = &cfg.static_dir
        && dir.is_dir()
    {
        app = app.fallback_service(ServeDir::new(dir));
    }
    app
}

pub async fn run(cfg: &Config, state: AppState) -> std::io::Result<()> {
    let app = router(cfg, state);
    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    info!("listening on {}", cfg.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install ctrl-c handler: {e}");
    }
}

#[derive(Deserialize)]
struct UserQuery {
    #[serde(default)]
    id: Option<String>,
}

fn parse_id(query: &UserQuery) -> Result<UserId, Response> {
    let Some(raw) = query.id.as_deref() else {
        return Err((StatusCode::BAD_REQUEST, "Missing user ID").into_response());
    };
    raw.parse::<i64>()
        .map(UserId)
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid user ID").into_response())
}

async fn health() -> &'static str {
    "OK"
}

async fn get_user(State(state): State<AppState>, Query(query): Query<UserQuery>) -> Response {
    let id = match parse_id(&query) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.ledger.user(id) {
        Some(record) => axum::Json(record).into_response(),
        None => (StatusCode::NOT_FOUND, "User not found").into_response(),
    }
}

async fn checkin(State(state): State<AppState>, Query(query): Query<UserQuery>) -> Response {
    claim(state, query, Kind::Daily).await
}

async fn share(State(state): State<AppState>, Query(query): Query<UserQuery>) -> Response {
    claim(state, query, Kind::Share).await
}

#[derive(Clone, Copy)]
enum Kind {
    Daily,
    Share,
}

async fn claim(state: AppState, query: UserQuery, kind: Kind) -> Response {
    let id = match parse_id(&query) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    // The web front end has no display name to offer; first-time records
    // are created with an empty one.
    let ledger = state.ledger.clone();
    let joined = tokio::task::spawn_blocking(move || match kind {
        Kind::Daily => ledger.claim_daily(id, ""),
        Kind::Share => ledger.claim_share(id, ""),
    })
    .await;
    let outcome = match joined {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("claim task failed: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if !outcome.claimed {
        return (StatusCode::BAD_REQUEST, "Already claimed today").into_response();
    }
    let message = match kind {
        Kind::Daily => "Daily check-in successful",
        Kind::Share => "Share reward claimed successfully",
    };
    axum::Json(serde_json::json!({
        "success": true,
        "dots": outcome.dots,
        "message": message,
    }))
    .into_response()
}

/// Telegram webhook transport: one update per POST.
///
/// Always answers 200; a failed reply send is our problem to log, not
/// Telegram's to retry.
async fn webhook(State(state): State<AppState>, body: axum::Json<Update>) -> StatusCode {
    let Some(bot) = state.bot.clone() else {
        return StatusCode::OK;
    };
    let ledger = state.ledger.clone();
    let update = body.0;
    let sent = tokio::task::spawn_blocking(move || {
        if let Some(reply) = bot::dispatch(&ledger, &update) {
            return bot.send_message(reply.chat_id, &reply.text);
        }
        Ok(())
    })
    .await;
    match sent {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("failed to send webhook reply: {e}"),
        Err(e) => tracing::error!("webhook task failed: {e}"),
    }
    StatusCode::OK
}
