use misskey_webhook_bridge::config::{Config, SourceConfig};
use misskey_webhook_bridge::display;
use misskey_webhook_bridge::http_server::{self, ServerState};
use misskey_webhook_bridge::registry::{SharedRegistry, SourceRegistry};
use misskey_webhook_bridge::rpc::{
    Request, Response, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND, OPERATION_FAILED,
    PARSE_ERROR,
};
use misskey_webhook_bridge::sink::{HttpSink, MessageSink};
use misskey_webhook_bridge::store::ConfigStore;
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// ─── Shared app state ────────────────────────────────────────────────────────

struct AppState {
    store: ConfigStore,
    config: Config,
    /// Snapshot served to the HTTP server; swapped on reconfiguration.
    registry: SharedRegistry,
    enabled: Arc<AtomicBool>,
    port: Option<u16>,
    base_url: String,
}

impl AppState {
    fn new(data_dir: PathBuf) -> Self {
        Self {
            store: ConfigStore::new(data_dir),
            config: Config::default(),
            registry: SharedRegistry::default(),
            enabled: Arc::new(AtomicBool::new(true)),
            port: None,
            base_url: String::new(),
        }
    }

    fn public_base_url(&self) -> &str {
        self.config.public_url.as_deref().unwrap_or(&self.base_url)
    }
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // stdout carries the JSON-RPC protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("misskey_webhook_bridge=info")),
        )
        .init();

    let state = Arc::new(RwLock::new(AppState::new(PathBuf::from("."))));
    let handle = tokio::runtime::Handle::current();

    // Host requests are read on a blocking thread and answered in order.
    let stdin_loop = tokio::task::spawn_blocking(move || {
        let stdin = io::stdin();
        let mut out = io::stdout().lock();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let request: Request = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    let resp = Response::error(json!(0), PARSE_ERROR, format!("Parse error: {e}"));
                    emit_line(&mut out, &resp);
                    continue;
                }
            };

            let response = handle.block_on(handle_request(&request, &state));
            emit_line(&mut out, &response);
            if request.method == "shutdown" {
                break;
            }
        }
    });

    if let Err(e) = stdin_loop.await {
        error!(error = %e, "stdin loop terminated abnormally");
    }
}

fn emit_line(out: &mut impl Write, resp: &Response) {
    match serde_json::to_string(resp) {
        Ok(line) => {
            let _ = writeln!(out, "{line}");
            let _ = out.flush();
        }
        Err(e) => error!(error = %e, "failed to serialize response"),
    }
}

// ─── Request dispatch ────────────────────────────────────────────────────────

async fn handle_request(req: &Request, state: &Arc<RwLock<AppState>>) -> Response {
    let id = req.id.clone();
    let result = match req.method.as_str() {
        "initialize" => handle_initialize(req, state).await,
        "shutdown" => handle_shutdown(state).await,
        "execute" => return handle_execute(req, state).await,
        _ => Err((METHOD_NOT_FOUND, format!("Unknown method: {}", req.method))),
    };
    match result {
        Ok(value) => Response::result(id, value),
        Err((code, message)) => Response::error(id, code, message),
    }
}

type MethodResult = Result<Value, (i64, String)>;

async fn handle_initialize(req: &Request, state: &Arc<RwLock<AppState>>) -> MethodResult {
    if state.read().await.port.is_some() {
        return Err((INVALID_PARAMS, "already initialized".to_string()));
    }

    let data_dir = req
        .param_str("data_dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let store = ConfigStore::new(data_dir);
    let config = match store.load() {
        Ok(Some(config)) => {
            // A persisted configuration must be valid before anything is served.
            config.validate().map_err(|e| (INVALID_PARAMS, e.to_string()))?;
            config
        }
        Ok(None) => {
            let config = Config::default();
            warn!(
                path = %store.path().display(),
                "no configuration found, writing defaults; no source accepts webhooks until its secret is changed"
            );
            if let Err(e) = store.save(&config) {
                warn!(error = %e, "failed to write default configuration");
            }
            config
        }
        Err(e) => return Err((INTERNAL_ERROR, e.to_string())),
    };

    let sink: Arc<dyn MessageSink> = Arc::new(
        HttpSink::new(&config.sink)
            .map_err(|e| (INTERNAL_ERROR, format!("sink setup failed: {e}")))?,
    );

    let mut st = state.write().await;
    // Held across the bind so a concurrent initialize cannot start a second server.
    if st.port.is_some() {
        return Err((INVALID_PARAMS, "already initialized".to_string()));
    }
    st.registry
        .replace(SourceRegistry::new(config.sources.clone()))
        .await;

    let server_state = ServerState {
        registry: st.registry.clone(),
        sink,
        enabled: st.enabled.clone(),
    };
    let addr = http_server::start(server_state, &config.bind)
        .await
        .map_err(|e| (INTERNAL_ERROR, format!("HTTP server failed: {e}")))?;

    let base_url = format!("http://{addr}");
    info!(%base_url, sources = config.sources.len(), "bridge initialized");

    st.store = store;
    st.config = config;
    st.port = Some(addr.port());
    st.base_url = base_url;

    Ok(json!({ "ready": true, "port": addr.port() }))
}

async fn handle_shutdown(state: &Arc<RwLock<AppState>>) -> MethodResult {
    let st = state.read().await;
    if st.port.is_some() {
        if let Err(e) = st.store.save(&st.config) {
            warn!(error = %e, "failed to persist configuration on shutdown");
        }
    }
    Ok(json!({}))
}

// ─── Execute handler ─────────────────────────────────────────────────────────

async fn handle_execute(req: &Request, state: &Arc<RwLock<AppState>>) -> Response {
    let operation = req.params.get("operation").and_then(Value::as_str).unwrap_or("");
    let input = req.params.get("input").cloned().unwrap_or_else(|| json!({}));

    let result = match operation {
        "get_server_info" => op_get_server_info(state).await,
        "list_sources" => op_list_sources(state).await,
        "update_sources" => op_update_sources(&input, state).await,
        "set_enabled" => op_set_enabled(&input, state).await,
        "get_display" => op_get_display(state).await,
        _ => Err(format!("Unknown operation: {operation}")),
    };

    match result {
        Ok(data) => Response::operation(req.id.clone(), data),
        Err(msg) => Response::error(req.id.clone(), OPERATION_FAILED, msg),
    }
}

// ─── Operations ──────────────────────────────────────────────────────────────

async fn op_get_server_info(state: &Arc<RwLock<AppState>>) -> Result<Value, String> {
    let st = state.read().await;
    let port = st.port.ok_or("server not initialized")?;
    Ok(json!({
        "port": port,
        "base_url": st.public_base_url(),
        "source_count": st.registry.snapshot().await.len(),
        "enabled": st.enabled.load(Ordering::Relaxed),
    }))
}

async fn op_list_sources(state: &Arc<RwLock<AppState>>) -> Result<Value, String> {
    let st = state.read().await;
    let base_url = st.public_base_url();
    let items: Vec<Value> = st
        .registry
        .snapshot()
        .await
        .sources()
        .iter()
        .map(|s| {
            json!({
                "slug": s.slug,
                "name": s.name,
                "priority": s.priority,
                "url": display::push_url(base_url, &s.slug),
            })
        })
        .collect();
    Ok(json!({ "sources": items, "count": items.len() }))
}

/// Replace the source list. Nothing changes unless every source is valid
/// and the new configuration has been written.
async fn op_update_sources(input: &Value, state: &Arc<RwLock<AppState>>) -> Result<Value, String> {
    let sources: Vec<SourceConfig> = input
        .get("sources")
        .cloned()
        .ok_or("missing required field: sources")
        .and_then(|v| serde_json::from_value(v).map_err(|_| "invalid field: sources"))?;

    let mut st = state.write().await;
    let updated = st
        .registry
        .commit_sources(&st.store, &st.config, sources)
        .await
        .map_err(|e| e.to_string())?;
    st.config = updated;
    info!(count = st.config.sources.len(), "sources updated");

    Ok(json!({ "count": st.config.sources.len() }))
}

async fn op_set_enabled(input: &Value, state: &Arc<RwLock<AppState>>) -> Result<Value, String> {
    let enabled = input
        .get("enabled")
        .and_then(Value::as_bool)
        .ok_or("missing required field: enabled")?;

    let st = state.read().await;
    st.enabled.store(enabled, Ordering::Relaxed);
    info!(enabled, "bridge state changed");
    Ok(json!({ "enabled": enabled }))
}

async fn op_get_display(state: &Arc<RwLock<AppState>>) -> Result<Value, String> {
    let st = state.read().await;
    let page = display::render_display(
        st.enabled.load(Ordering::Relaxed),
        st.public_base_url(),
        st.registry.snapshot().await.sources(),
    );
    Ok(json!({ "markdown": page }))
}
