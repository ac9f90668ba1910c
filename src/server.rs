//! HTTP transport.
//!
//! Thin axum glue: every request, whatever its method or path, goes through
//! one fallback handler that converts it into an [`InboundRequest`], runs the
//! dispatcher, records the transaction, and writes the rendered response.

use crate::dispatcher::{Dispatcher, InboundRequest, RenderedResponse};
use crate::matcher::EndpointTable;
use crate::shutdown::Shutdown;
use crate::transaction::{Transaction, TransactionLogger};
use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Request bodies are buffered up to this size for the transaction log.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Application state injected into the handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub logger: Arc<TransactionLogger>,
}

/// Build the router that sends every request to the dispatcher.
pub fn router(state: AppState) -> Router {
    Router::new().fallback(handle_request).with_state(state)
}

/// Standalone mock HTTP server.
pub struct MockServer {
    state: AppState,
    shutdown: Shutdown,
}

impl MockServer {
    pub fn new(table: EndpointTable, logger: TransactionLogger, shutdown: Shutdown) -> Self {
        let dispatcher = Dispatcher::new(Arc::new(table), shutdown.clone());
        Self {
            state: AppState {
                dispatcher,
                logger: Arc::new(logger),
            },
            shutdown,
        }
    }

    /// Serve until the listener fails or shutdown is triggered.
    ///
    /// Shutdown does not drain: requests still waiting out a delay are
    /// abandoned and the call returns immediately.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        info!(
            address = %addr,
            endpoints = self.state.dispatcher.table().len(),
            "HTTP server starting"
        );

        let app = router(self.state).into_make_service_with_connect_info::<SocketAddr>();
        let serve = axum::serve(listener, app).into_future();

        tokio::select! {
            result = serve => result?,
            _ = self.shutdown.wait() => {
                info!("HTTP server stopping without draining in-flight requests");
            }
        }

        info!("HTTP server stopped");
        Ok(())
    }
}

async fn handle_request(State(state): State<AppState>, request: Request<Body>) -> Response {
    let origin = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Request body unreadable, logging without it");
            Bytes::new()
        }
    };

    let inbound = InboundRequest {
        origin,
        method: parts.method.as_str().to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
        body,
    };

    match state.dispatcher.dispatch(&inbound).await {
        Ok(dispatch) => {
            state
                .logger
                .record(&Transaction::completed(&inbound, &dispatch));
            into_http_response(dispatch.response)
        }
        Err(_) => {
            state.logger.record(&Transaction::cancelled(&inbound));
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// Convert a rendered response into an HTTP response.
pub fn into_http_response(rendered: RenderedResponse) -> Response {
    let status = StatusCode::from_u16(rendered.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let headers = rendered.headers();

    let mut response = Response::new(Body::from(rendered.body));
    *response.status_mut() = status;
    for (name, value) in headers {
        if let Ok(value) = HeaderValue::from_str(&value) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}
