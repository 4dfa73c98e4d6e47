//! HTTP server wrapper.
//!
//! Exposes the tool registry over plain JSON HTTP alongside a proper MCP
//! streamable endpoint:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | List all registered tools with schemas |
//! | `POST` | `/tools/{name}` | Call a tool by name |
//! | `*`    | `/mcp` | MCP streamable HTTP endpoint |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! When `server.auth_key` is configured, every request except `/health`
//! must carry it as a bearer token. Comparison is constant-time.
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients and cross-origin MCP tool calls.

use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpService,
};
use rmcp::ServiceExt;

use crate::client::ArenaClient;
use crate::config::Config;
use crate::mcp::McpBridge;
use crate::tools::{ToolContext, ToolRegistry};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    ctx: ToolContext,
    tools: Arc<ToolRegistry>,
}

fn build_context(config: &Config) -> anyhow::Result<ToolContext> {
    let client = Arc::new(ArenaClient::new(config.api.clone())?);
    Ok(ToolContext::new(Arc::new(config.clone()), client))
}

/// Serves the MCP bridge over stdio. Used by `arena-mcp serve stdio`, the
/// transport most MCP clients launch directly.
pub async fn run_stdio_server(config: &Config) -> anyhow::Result<()> {
    let ctx = build_context(config)?;
    let tools = Arc::new(ToolRegistry::with_builtins());
    let bridge = McpBridge::new(ctx, tools);

    let service = bridge.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;
    Ok(())
}

/// Starts the HTTP server. Runs until the process is terminated.
pub async fn run_http_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let ctx = build_context(config)?;
    let tools = Arc::new(ToolRegistry::with_builtins());

    let state = AppState {
        ctx: ctx.clone(),
        tools: tools.clone(),
    };

    let bridge = McpBridge::new(ctx, tools);
    let mcp_service = StreamableHttpService::new(
        move || Ok(bridge.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let auth_key = Arc::new(config.server.auth_key.clone());
    let app = Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/{name}", post(handle_tool_call))
        .nest_service("/mcp", mcp_service)
        .layer(axum::middleware::from_fn_with_state(
            auth_key,
            require_bearer,
        ))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    info!("arena-mcp server listening on http://{bind_addr}");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Auth ============

/// Layered over every route except `/health`. A configured key must match
/// the request's bearer token; comparison is constant-time.
async fn require_bearer(
    State(auth_key): State<Arc<Option<String>>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = auth_key.as_ref() else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let ok = presented
        .map(|p| p.as_bytes().ct_eq(expected.as_bytes()).into())
        .unwrap_or(false);

    if ok {
        next.run(request).await
    } else {
        AppError {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized".to_string(),
            message: "missing or invalid bearer key".to_string(),
        }
        .into_response()
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// Inspects tool execution errors and maps them to the most appropriate
/// HTTP status code. Tool errors are already human-readable messages, so
/// the mapping keys off their stable phrasing.
fn classify_tool_error(tool_name: &str, err: anyhow::Error) -> AppError {
    let msg = err.to_string();
    let full = format!("{tool_name}: {msg}");

    let (status, code) = if msg.contains("nothing found") || msg.contains("not found") {
        (StatusCode::NOT_FOUND, "not_found")
    } else if msg.contains("token was rejected") {
        (StatusCode::UNAUTHORIZED, "upstream_unauthorized")
    } else if msg.contains("permission") {
        (StatusCode::FORBIDDEN, "forbidden")
    } else if msg.contains("rate-limited") {
        (StatusCode::TOO_MANY_REQUESTS, "rate_limited")
    } else if msg.contains("multiple channels") {
        (StatusCode::CONFLICT, "ambiguous")
    } else if msg.contains("required") || msg.contains("must be") {
        (StatusCode::BAD_REQUEST, "bad_request")
    } else if msg.contains("could not reach") || msg.contains("server error") {
        (StatusCode::BAD_GATEWAY, "upstream_error")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "tool_error")
    };

    AppError {
        status,
        code: code.to_string(),
        message: full,
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    write: bool,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let tools = state
        .tools
        .tools()
        .iter()
        .map(|t| ToolInfo {
            name: t.name().to_string(),
            description: t.description().to_string(),
            write: t.is_write(),
            parameters: t.parameters_schema(),
        })
        .collect();
    Json(ToolListResponse { tools })
}

// ============ POST /tools/{name} ============

async fn handle_tool_call(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tool = state
        .tools
        .find(&name)
        .ok_or_else(|| not_found(format!("no tool registered with name: {name}")))?;

    if !params.is_object() {
        return Err(bad_request("parameters must be a JSON object"));
    }

    let result = tool
        .execute(params, &state.ctx)
        .await
        .map_err(|e| classify_tool_error(&name, e))?;

    Ok(Json(serde_json::json!({ "result": result })))
}
