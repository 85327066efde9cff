//! The call endpoint.
//!
//! Routing is by the `cmd` query parameter: `exec` and `upload` are built
//! in, other names go to the application's
//! [`CommandRegistry`](crate::commands::CommandRegistry). Call-level failures
//! travel inside the batch response; only transport problems produce an
//! error status here.

use amf_runtime::{AdapterRequest, DispatchOutcome, RawResponse};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use serde::Deserialize;
use serde_json::json;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{debug, error};

use crate::commands::CommandContext;
use crate::server::AppState;

/// Body of a request with an unknown `cmd`.
pub const REQUEST_ERROR: &str = "request error";
/// Body of a request whose batch could not be decoded.
pub const PARAMETER_FORMAT_ERROR: &str = "parameter format error";
/// Body of a request that failed for infrastructure reasons.
pub const SERVER_ERROR: &str = "server error";

/// Query string of the call endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct RemoteQuery {
    /// `exec`, `upload`, a registered command, or absent for static assets.
    pub cmd: Option<String>,
    /// Call batch JSON of an upload request.
    pub params: Option<String>,
}

/// `ANY <remotePath>`
pub(crate) async fn remote_handler(
    State(state): State<AppState>,
    Query(query): Query<RemoteQuery>,
    request: Request,
) -> Response {
    match query.cmd.as_deref() {
        None | Some("") => serve_static(&state, request).await,
        Some("exec") => {
            counter!("amf_http_requests_total", "cmd" => "exec").increment(1);
            exec(&state, request).await
        }
        Some("upload") => {
            counter!("amf_http_requests_total", "cmd" => "upload").increment(1);
            upload(&state, query.params.as_deref(), request).await
        }
        Some(other) => match state.commands.get(other) {
            Some(handler) => {
                counter!("amf_http_requests_total", "cmd" => "custom").increment(1);
                let ctx = CommandContext {
                    dispatcher: state.dispatcher.clone(),
                };
                handler.handle(request, &ctx).await
            }
            None => {
                counter!("amf_http_requests_total", "cmd" => "unknown").increment(1);
                debug!(cmd = %other, "unknown command");
                error_response(StatusCode::OK, REQUEST_ERROR)
            }
        },
    }
}

/// Requests outside every route.
pub(crate) async fn static_fallback(State(state): State<AppState>, request: Request) -> Response {
    serve_static(&state, request).await
}

async fn serve_static(state: &AppState, request: Request) -> Response {
    let Some(root) = state.config.root_path.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match ServeDir::new(root).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

async fn exec(state: &AppState, request: Request) -> Response {
    let body = match read_body(request, state.config.max_json_bytes).await {
        Ok(body) => body,
        Err(response) => return response,
    };
    match serde_json::from_slice::<AdapterRequest>(&body) {
        Ok(batch) => dispatch(state, batch, None).await,
        Err(e) => {
            debug!(error = %e, "malformed call batch");
            error_response(StatusCode::BAD_REQUEST, PARAMETER_FORMAT_ERROR)
        }
    }
}

async fn upload(state: &AppState, params: Option<&str>, request: Request) -> Response {
    let batch = match params.map(serde_json::from_str::<AdapterRequest>) {
        Some(Ok(batch)) => batch,
        Some(Err(e)) => {
            debug!(error = %e, "malformed upload params");
            return error_response(StatusCode::BAD_REQUEST, PARAMETER_FORMAT_ERROR);
        }
        None => {
            debug!("upload without params");
            return error_response(StatusCode::BAD_REQUEST, PARAMETER_FORMAT_ERROR);
        }
    };
    match read_body(request, state.config.max_upload_bytes).await {
        Ok(body) => dispatch(state, batch, Some(body)).await,
        Err(response) => response,
    }
}

async fn read_body(request: Request, limit: usize) -> Result<Bytes, Response> {
    axum::body::to_bytes(request.into_body(), limit)
        .await
        .map_err(|e| {
            debug!(error = %e, limit, "request body rejected");
            error_response(StatusCode::PAYLOAD_TOO_LARGE, REQUEST_ERROR)
        })
}

async fn dispatch(state: &AppState, batch: AdapterRequest, upload: Option<Bytes>) -> Response {
    match state.dispatcher.execute(batch, upload).await {
        Ok(DispatchOutcome::Json(response)) => Json(response).into_response(),
        Ok(DispatchOutcome::Custom(raw)) => raw_response(raw),
        Err(e) => {
            counter!("amf_http_failures_total").increment(1);
            error!(error = %e, "call batch failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, SERVER_ERROR)
        }
    }
}

fn raw_response(raw: RawResponse) -> Response {
    let status = StatusCode::from_u16(raw.status).unwrap_or(StatusCode::OK);
    let content_type = HeaderValue::from_str(&raw.content_type)
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));
    (status, [(header::CONTENT_TYPE, content_type)], raw.body).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_response_keeps_status_and_type() {
        let response = raw_response(RawResponse {
            status: 201,
            content_type: "text/csv".into(),
            body: Bytes::from_static(b"a,b"),
        });
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
    }

    #[test]
    fn raw_response_sanitizes_bad_values() {
        let response = raw_response(RawResponse {
            status: 42,
            content_type: "bad\nvalue".into(),
            body: Bytes::new(),
        });
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
    }
}
