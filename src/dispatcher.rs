//! Request dispatcher.
//!
//! Maps an inbound request to exactly one rendered response: the matched
//! rule's payload, or the fixed 404 sentinel. The configured delay is the
//! only suspension point and is abandoned as soon as shutdown is triggered.

use crate::config::EndpointRule;
use crate::error::DelayCancelled;
use crate::matcher::EndpointTable;
use crate::shutdown::Shutdown;
use axum::body::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Content type of every response that carries a body.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Body of the sentinel response for unmatched requests.
pub const NOT_FOUND_BODY: &str = r#"{"error":"endpoint not found"}"#;

/// An inbound request as seen by the dispatcher and the transaction log.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// Peer address of the connection, when the transport knows it
    pub origin: Option<SocketAddr>,
    pub method: String,
    /// Path exactly as received, without the query string
    pub path: String,
    /// Raw query string, without the leading `?`
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_origin(mut self, origin: SocketAddr) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn is_head(&self) -> bool {
        self.method == "HEAD"
    }
}

/// Transport-independent response produced by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedResponse {
    pub status: u16,
    /// `None` for 204 responses
    pub content_type: Option<&'static str>,
    /// Length of the body a GET would return; `None` for 204 responses
    pub content_length: Option<usize>,
    /// Empty for 204 and HEAD responses
    pub body: Bytes,
}

impl RenderedResponse {
    fn json(status: u16, body: Bytes) -> Self {
        Self {
            status,
            content_type: Some(JSON_CONTENT_TYPE),
            content_length: Some(body.len()),
            body,
        }
    }

    fn no_content() -> Self {
        Self {
            status: 204,
            content_type: None,
            content_length: None,
            body: Bytes::new(),
        }
    }

    /// The fixed response for requests that match no rule.
    pub fn not_found() -> Self {
        Self::json(404, Bytes::from_static(NOT_FOUND_BODY.as_bytes()))
    }

    /// Drop the body but keep the headers computed from it.
    fn headers_only(mut self) -> Self {
        self.body = Bytes::new();
        self
    }

    /// Render the response configured by `rule` for a request using `method`.
    pub fn for_rule(rule: &EndpointRule, method: &str) -> Self {
        if rule.status == 204 {
            return Self::no_content();
        }

        let response = Self::json(rule.status, rule.payload.encoded().clone());
        if method == "HEAD" {
            response.headers_only()
        } else {
            response
        }
    }

    /// Header pairs the transport should send.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::with_capacity(2);
        if let Some(content_type) = self.content_type {
            headers.push(("content-type", content_type.to_string()));
        }
        if let Some(length) = self.content_length {
            headers.push(("content-length", length.to_string()));
        }
        headers
    }
}

/// Outcome of dispatching one request.
#[derive(Debug, Clone)]
pub struct Dispatch<'a> {
    pub response: RenderedResponse,
    /// The rule that produced the response; `None` for the 404 sentinel
    pub rule: Option<&'a EndpointRule>,
    /// Time actually spent in the injected delay
    pub delayed: Duration,
}

/// Dispatches requests against an immutable endpoint table.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    table: Arc<EndpointTable>,
    shutdown: Shutdown,
}

impl Dispatcher {
    pub fn new(table: Arc<EndpointTable>, shutdown: Shutdown) -> Self {
        Self { table, shutdown }
    }

    pub fn table(&self) -> &EndpointTable {
        &self.table
    }

    /// Match `request`, wait out the rule's delay, and render the response.
    ///
    /// Fails only when shutdown interrupts the delay.
    pub async fn dispatch(&self, request: &InboundRequest) -> Result<Dispatch<'_>, DelayCancelled> {
        let Some(rule) = self.table.resolve(&request.method, &request.path) else {
            let response = RenderedResponse::not_found();
            let response = if request.is_head() {
                response.headers_only()
            } else {
                response
            };
            return Ok(Dispatch {
                response,
                rule: None,
                delayed: Duration::ZERO,
            });
        };

        let delayed = self.delay(rule).await?;

        Ok(Dispatch {
            response: RenderedResponse::for_rule(rule, &request.method),
            rule: Some(rule),
            delayed,
        })
    }

    async fn delay(&self, rule: &EndpointRule) -> Result<Duration, DelayCancelled> {
        if rule.delay.is_zero() {
            return Ok(Duration::ZERO);
        }

        debug!(
            method = %rule.method,
            path = %rule.path,
            delay_ms = rule.delay_ms(),
            "Applying delay"
        );

        let started = Instant::now();
        tokio::select! {
            biased;
            _ = self.shutdown.wait() => Err(DelayCancelled),
            _ = tokio::time::sleep(rule.delay) => Ok(started.elapsed()),
        }
    }
}
