//! REST API over the stream service.

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use shared::config::ServerConfig;
use shared::models::ApiResponse;
use std::sync::Arc;
use stream_resolver::StreamService;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

const DEFAULT_KIND: &str = "sub";
const DEFAULT_SERVER: &str = "HD-1";

type SharedService = Arc<StreamService>;

#[derive(Debug, Deserialize)]
struct ServersQuery {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    server: Option<String>,
}

/// Build the router with every endpoint
pub fn router(service: SharedService, enable_cors: bool) -> Router {
    let router = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/servers", get(servers))
        .route("/api/stream", get(stream))
        .with_state(service);

    if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    }
}

/// Serve the API until Ctrl-C
pub async fn serve(service: SharedService, settings: &ServerConfig) -> Result<()> {
    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(address = %addr, cors = settings.enable_cors, "REST API listening");

    axum::serve(listener, router(service, settings.enable_cors))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("REST API server failed")
}

async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "name": "hianime",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health",
            "servers": "/api/servers?id={anime-slug}::ep={episode}",
            "stream": "/api/stream?id={anime-slug}::ep={episode}&type={sub|dub}&server={name}",
        },
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn servers(State(service): State<SharedService>, Query(query): Query<ServersQuery>) -> Response {
    let Some(id) = required(query.id) else {
        return failure(StatusCode::BAD_REQUEST, "missing required parameter: id");
    };

    match service.servers(&id).await {
        Ok(servers) => Json(ApiResponse::ok(servers)).into_response(),
        Err(e) => {
            error!(episode = %id, error = %e, "Server listing failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

async fn stream(State(service): State<SharedService>, Query(query): Query<StreamQuery>) -> Response {
    let Some(id) = required(query.id) else {
        return failure(StatusCode::BAD_REQUEST, "missing required parameter: id");
    };
    let kind = required(query.kind).unwrap_or_else(|| DEFAULT_KIND.to_string());
    let server = required(query.server).unwrap_or_else(|| DEFAULT_SERVER.to_string());

    match service.stream(&id, &kind, &server).await {
        Ok(descriptor) => Json(ApiResponse::ok(descriptor)).into_response(),
        Err(e) => {
            error!(episode = %id, server = %server, kind = %kind, error = %e, "Stream resolution failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn required(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::failure(message))).into_response()
}
