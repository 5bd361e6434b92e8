use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::AppState;
use crate::dispatch::format_error;
use crate::error::{ErrorCode, ServerError};
use crate::mcp::ToolCallResult;
use crate::sanitize::{sanitize_str, MAX_ARGUMENT_LENGTH};
use crate::types::{IdentifierKind, ToolRequest};

/// Body of `POST /tools/call`
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallResponse {
    pub result: String,
    pub tool: String,
    pub request_id: String,
    /// Seconds
    pub execution_time: f64,
    pub timestamp: String,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// Body of `GET /search/{kind}/{id}`
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub kind: String,
    pub query: String,
    pub tool: String,
    pub request_id: String,
    pub execution_time: f64,
    pub timestamp: String,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Parsed registry records when the result block is JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub result: String,
}

fn status_for(result: &ToolCallResult) -> StatusCode {
    match result.error_code {
        Some(code) => {
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
        None => StatusCode::OK,
    }
}

fn error_code_str(result: &ToolCallResult) -> Option<String> {
    result.error_code.map(|code| code.as_str().to_string())
}

pub(super) async fn root(State(state): State<AppState>) -> Json<Value> {
    let dispatcher = &state.dispatcher;
    let catalog = dispatcher.catalog();
    Json(json!({
        "name": catalog.server_name,
        "version": env!("CARGO_PKG_VERSION"),
        "catalog_version": catalog.version,
        "mode": dispatcher.context().mode.as_str(),
        "started_at": state.started_at.to_rfc3339(),
        "tools": catalog.len(),
        "endpoints": {
            "health": "GET /health",
            "tools": "GET /tools",
            "call_tool": "POST /tools/call",
            "search_nip": "GET /search/nip/{nip}",
            "search_krs": "GET /search/krs/{krs}",
            "search_regon": "GET /search/regon/{regon}"
        }
    }))
}

pub(super) async fn health(State(state): State<AppState>) -> Response {
    let report = state.dispatcher.health().report().await;
    let status = StatusCode::from_u16(report.status.http_status_code())
        .unwrap_or(StatusCode::SERVICE_UNAVAILABLE);
    let mut body = json!(report);
    if let Some(object) = body.as_object_mut() {
        object.insert(
            "mode".to_string(),
            json!(state.dispatcher.context().mode.as_str()),
        );
        object.insert(
            "initialized".to_string(),
            json!(state.dispatcher.is_initialized()),
        );
    }
    (status, Json(body)).into_response()
}

pub(super) async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    let catalog = state.dispatcher.catalog();
    Json(json!({
        "tools": catalog.tools,
        "count": catalog.len(),
        "catalog": catalog.source,
    }))
}

pub(super) async fn call_tool(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let started = Instant::now();
    let request_id = Uuid::new_v4().to_string();

    let request = match body
        .map_err(|e| ServerError::validation(format!("Invalid request body: {}", e.body_text())))
        .and_then(|Json(value)| ToolRequest::from_params(&value))
    {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(request_id = %request_id, "Rejected tool call: {}", e);
            let production = state.dispatcher.is_production();
            let response = ToolCallResponse {
                result: format_error(&e, None, production),
                tool: String::new(),
                request_id,
                execution_time: started.elapsed().as_secs_f64(),
                timestamp: Utc::now().to_rfc3339(),
                is_error: true,
                error_code: Some(ErrorCode::Validation.as_str().to_string()),
            };
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    let tool = sanitize_str(&request.name, MAX_ARGUMENT_LENGTH);
    tracing::info!(request_id = %request_id, tool = %tool, "HTTP tool call");
    let result = state.dispatcher.dispatch(request).await;

    let response = ToolCallResponse {
        result: result.text_content(),
        tool,
        request_id,
        execution_time: started.elapsed().as_secs_f64(),
        timestamp: Utc::now().to_rfc3339(),
        is_error: result.is_error(),
        error_code: error_code_str(&result),
    };
    (status_for(&result), Json(response)).into_response()
}

pub(super) async fn search(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Response {
    let started = Instant::now();
    let request_id = Uuid::new_v4().to_string();

    let kind: IdentifierKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "request_id": request_id,
                    "is_error": true,
                    "error_code": e.code().as_str(),
                    "result": format_error(&e, None, state.dispatcher.is_production()),
                })),
            )
                .into_response();
        }
    };

    let tool = kind.search_tool();
    let request = ToolRequest::new(tool.as_str(), json!({ kind.argument(): id.clone() }));
    let result = state.dispatcher.dispatch(request).await;

    let text = result.text_content();
    let data = if result.is_error() {
        None
    } else {
        serde_json::from_str::<Value>(&text).ok()
    };
    let response = SearchResponse {
        kind: kind.label().to_string(),
        query: sanitize_str(&id, MAX_ARGUMENT_LENGTH),
        tool: tool.as_str().to_string(),
        request_id,
        execution_time: started.elapsed().as_secs_f64(),
        timestamp: Utc::now().to_rfc3339(),
        is_error: result.is_error(),
        error_code: error_code_str(&result),
        data,
        result: text,
    };
    (status_for(&result), Json(response)).into_response()
}
