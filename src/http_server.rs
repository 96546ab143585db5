use crate::auth;
use crate::dispatch;
use crate::error::HookError;
use crate::payload::{self, Route};
use crate::registry::SharedRegistry;
use crate::sink::MessageSink;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Everything a push request needs. Cloned into every handler.
#[derive(Clone)]
pub struct ServerState {
    pub registry: SharedRegistry,
    pub sink: Arc<dyn MessageSink>,
    pub enabled: Arc<AtomicBool>,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route(
            "/push/misskey/{slug}",
            post(push_main).head(accept_head).get(method_not_allowed),
        )
        .route(
            "/push/misskey/{slug}/follow",
            post(push_follow).head(accept_head).get(method_not_allowed),
        )
        .route(
            "/push/misskey/{slug}/abuse",
            post(push_abuse).head(accept_head).get(method_not_allowed),
        )
        .with_state(state)
}

/// Bind `bind` and serve in the background. Returns the bound address.
pub async fn start(state: ServerState, bind: &str) -> Result<SocketAddr, String> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| format!("failed to bind HTTP server on {bind}: {e}"))?;

    let addr = listener
        .local_addr()
        .map_err(|e| format!("failed to read bound address: {e}"))?;
    info!(%addr, "HTTP server bound");

    let app = router(state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "HTTP server error");
        }
    });

    Ok(addr)
}

async fn accept_head() -> impl IntoResponse {
    (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")])
}

async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(serde_json::json!({ "error": "Method Not Allowed" })),
    )
}

async fn push_main(
    Path(slug): Path<String>,
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, HookError> {
    handle_push(Route::Main, &slug, &state, &headers, &body).await
}

async fn push_follow(
    Path(slug): Path<String>,
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, HookError> {
    handle_push(Route::Follow, &slug, &state, &headers, &body).await
}

async fn push_abuse(
    Path(slug): Path<String>,
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, HookError> {
    handle_push(Route::Abuse, &slug, &state, &headers, &body).await
}

async fn handle_push(
    route: Route,
    slug: &str,
    state: &ServerState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<StatusCode, HookError> {
    let result = process(route, slug, state, headers, body).await;
    if let Err(e) = &result {
        warn!(slug, route = route.as_str(), status = e.status().as_u16(), error = %e, "rejected webhook");
    }
    result
}

async fn process(
    route: Route,
    slug: &str,
    state: &ServerState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<StatusCode, HookError> {
    if !state.enabled.load(Ordering::Relaxed) {
        return Err(HookError::Disabled);
    }

    // Authenticate before the body is looked at.
    let registry = state.registry.snapshot().await;
    let source = auth::authenticate(&registry, slug, auth::extract_secret(headers))?;

    let envelope = payload::decode(route, body)?;
    dispatch::dispatch(&envelope, source, state.sink.as_ref()).await?;

    Ok(StatusCode::OK)
}
