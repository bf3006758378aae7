use crate::error::{BundleError, InitializationError};
use crate::{Dictionary, RenderedEntry, SearchOutcome};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn};

type SharedState = Arc<AppState>;
const MAX_PAGE_SIZE: usize = 200;

pub struct AppState {
    pub dict: Arc<Dictionary>,
    pub base_url: String,
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub base_url: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            base_url: "http://127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn serve(dict: Arc<Dictionary>, config: WebConfig) -> Result<(), WebError> {
    let state = Arc::new(AppState {
        dict,
        base_url: config.base_url.clone(),
    });
    let router = build_router(state);
    info!(addr = %config.addr, base = %config.base_url, "Binding HTTP listener");
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<InitializationError> for ApiError {
    fn from(value: InitializationError) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: value.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/entry/entry/:form", get(entry_html))
        .route("/api/entry/:form", get(api_entry))
        .route("/api/search", get(api_search))
        .route("/assets/gaiji/:file", get(glyph))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let cache = state.dict.cache();
    Json(json!({
        "status": "ok",
        "initialized": cache.is_initialized(),
        "initializing": cache.is_initializing(),
    }))
}

async fn home(State(state): State<SharedState>) -> impl IntoResponse {
    let recent: String = state
        .dict
        .history()
        .keywords()
        .iter()
        .map(|keyword| format!("<li>{}</li>", escape(keyword.as_str())))
        .collect();
    Html(page(
        "Dingfubao",
        &format!(
            "<form action=\"/api/search\"><input name=\"q\" autofocus><button>Search</button></form>\
             <h2>Recent searches</h2><ul>{recent}</ul>"
        ),
        &state.base_url,
    ))
}

async fn entry_html(
    State(state): State<SharedState>,
    Path(form): Path<String>,
) -> Result<Response, ApiError> {
    let entry = state.dict.lookup(&form).await?;
    let status = if entry.found {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    let body = format!(
        "<h1>{}</h1><div id=\"entry-container\">{}</div>",
        escape(entry.form.as_str()),
        entry.html
    );
    Ok((status, Html(page(&form, &body, &state.base_url))).into_response())
}

async fn api_entry(
    State(state): State<SharedState>,
    Path(form): Path<String>,
) -> Result<Json<RenderedEntry>, ApiError> {
    let entry = state.dict.lookup(&form).await?;
    if !entry.found {
        return Err(ApiError::not_found(format!("no entry for {form:?}")));
    }
    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
    page: Option<usize>,
    size: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SearchHitPayload {
    form: String,
    href: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SearchResponsePayload {
    keyword: String,
    page: usize,
    page_size: usize,
    total: usize,
    more: bool,
    results: Vec<SearchHitPayload>,
}

async fn api_search(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponsePayload>, ApiError> {
    let keyword = params.q.trim();
    if keyword.is_empty() {
        return Err(ApiError::bad_request("query parameter `q` cannot be empty"));
    }
    let page = params.page.unwrap_or(1).max(1);

    let mut session = state.dict.search_session();
    if let Some(size) = params.size {
        session = session.with_page_size(size.min(MAX_PAGE_SIZE));
    }
    let total = match session.search(keyword).await? {
        SearchOutcome::Ready { total } => total,
        other => return Err(ApiError::bad_request(format!("search not run: {other:?}"))),
    };
    if let Err(err) = state.dict.save_history().await {
        warn!(error = %err, "failed to persist search history");
    }

    let mut rows = Vec::new();
    for _ in 0..page {
        rows = session.load_page().unwrap_or_default();
    }
    let config = state.dict.cache().config();
    Ok(Json(SearchResponsePayload {
        keyword: keyword.to_string(),
        page,
        page_size: session.page_size(),
        total,
        more: session.has_more(),
        results: rows
            .into_iter()
            .map(|entry| SearchHitPayload {
                href: config.entry_link(&entry.form),
                form: entry.form,
            })
            .collect(),
    }))
}

async fn glyph(
    State(state): State<SharedState>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    let id = file
        .strip_suffix(".png")
        .filter(|id| !id.is_empty() && !id.contains('/'))
        .ok_or_else(|| ApiError::not_found(format!("no glyph {file:?}")))?;
    match state.dict.cache().glyph(id).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response()),
        Err(BundleError::MemberNotFound(_)) => Err(ApiError::not_found(format!("no glyph {id:?}"))),
        Err(err) => Err(ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }),
    }
}

fn page(title: &str, body: &str, base_url: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"zh-Hant\"><head><meta charset=\"utf-8\">\
         <title>{}</title><link rel=\"canonical\" href=\"{}\"></head>\
         <body><main>{body}</main></body></html>",
        escape(title),
        escape(base_url),
    )
}
