//! HTTP request handling.
//!
//! Every method and path is accepted. A request must carry a JSON
//! `EventList`; its items are delivered as one batch to the bound
//! processing function.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes, HttpBody as _};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use dike_core::{Context, EventList, ProcessFn};
use serde::{Deserialize, Serialize};
use tracing::{error, info_span, trace, Instrument, Span};

use crate::config::WebhookConfig;

/// Returned when the request carries no body at all.
pub const NIL_BODY: &str = "received nil body";

/// Returned when the decoded envelope is not an `EventList`.
pub const NOT_EVENT_LIST: &str = "Received an HTTP request that was not an EventList";

/// JSON body of every webhook response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    /// Set on success.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Set on failure.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl WebhookResponse {
    /// The success response, `{"message":"OK"}`.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            message: "OK".to_string(),
            error: String::new(),
        }
    }

    /// A failure response.
    #[must_use]
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            message: String::new(),
            error: error.into(),
        }
    }
}

/// Shared state of the request handler.
#[derive(Debug, Clone)]
pub struct ReceiverState {
    process: ProcessFn,
    span: Span,
    read_timeout: Duration,
    max_body_bytes: usize,
}

impl ReceiverState {
    /// Creates handler state bound to `process`.
    #[must_use]
    pub fn new(process: ProcessFn, span: Span, config: &WebhookConfig) -> Self {
        Self {
            process,
            span,
            read_timeout: config.read_timeout(),
            max_body_bytes: config.max_body_bytes,
        }
    }
}

/// Builds the router serving every method on every path.
pub fn router(state: ReceiverState) -> Router {
    Router::new()
        .route("/", any(receive))
        .fallback(receive)
        .with_state(Arc::new(state))
}

async fn receive(State(state): State<Arc<ReceiverState>>, request: Request) -> Response {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.to_string());

    let span = info_span!(
        parent: &state.span,
        "request",
        method = %request.method(),
        remote_addr = %remote_addr,
        uri = %request.uri(),
        headers = ?request.headers(),
    );

    handle(&state, request.into_body()).instrument(span).await
}

async fn handle(state: &ReceiverState, body: Body) -> Response {
    trace!("Received Request");

    if body.is_end_stream() {
        trace!("{NIL_BODY}");
        return respond(StatusCode::BAD_REQUEST, WebhookResponse::error(NIL_BODY));
    }

    let bytes = match read_body(state, body).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "could not read request body");
            return respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                WebhookResponse::error(format!("error reading HTTP body: {e}")),
            );
        }
    };

    // A literal `null` decodes to an empty envelope, which the kind check rejects.
    let list = match serde_json::from_slice::<Option<EventList>>(&bytes) {
        Ok(list) => list.unwrap_or_default(),
        Err(e) => {
            error!(error = %e, "could not decode audit events");
            return respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                WebhookResponse::error(format!("error decoding audit events: {e}")),
            );
        }
    };

    if !list.is_event_list() {
        error!(kind = %list.kind, "{NOT_EVENT_LIST}");
        return respond(StatusCode::BAD_REQUEST, WebhookResponse::error(NOT_EVENT_LIST));
    }

    let batch = list.into_batch();
    let events = batch.len();

    // Cancelled once the request completes or the connection goes away.
    let ctx = Context::background();
    let _request_done = ctx.drop_guard();

    if let Err(e) = state.process.call(ctx.clone(), batch).await {
        error!(error = %e, events, "While processing audit events");
        return respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            WebhookResponse::error(format!("While processing audit event: {e}")),
        );
    }

    trace!(events, "audit events processed");
    respond(StatusCode::OK, WebhookResponse::ok())
}

async fn read_body(state: &ReceiverState, body: Body) -> Result<Bytes, String> {
    match tokio::time::timeout(
        state.read_timeout,
        axum::body::to_bytes(body, state.max_body_bytes),
    )
    .await
    {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {:?}", state.read_timeout)),
    }
}

fn respond(status: StatusCode, body: WebhookResponse) -> Response {
    (status, Json(body)).into_response()
}
