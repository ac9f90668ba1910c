//! Transaction logging.
//!
//! Writes one human-readable block per request: what arrived, then what was
//! returned. Logging never affects the response; sink failures are reported
//! through `tracing` and dropped.

use crate::config::EndpointRule;
use crate::dispatcher::{Dispatch, InboundRequest, RenderedResponse};
use chrono::{SecondsFormat, Utc};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

const RULE_WIDTH: usize = 70;

/// One request/response pair, borrowed from the handler that owns it.
#[derive(Debug, Clone, Copy)]
pub struct Transaction<'a> {
    pub request: &'a InboundRequest,
    pub outcome: Outcome<'a>,
}

/// What the dispatcher decided for a request.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    /// A rule matched and its response was rendered
    Matched {
        rule: &'a EndpointRule,
        response: &'a RenderedResponse,
        delayed: Duration,
    },
    /// No rule matched; the 404 sentinel was rendered
    NotFound { response: &'a RenderedResponse },
    /// Shutdown interrupted the delay; nothing was rendered
    Cancelled,
}

impl<'a> Transaction<'a> {
    pub fn completed(request: &'a InboundRequest, dispatch: &'a Dispatch<'a>) -> Self {
        let outcome = match dispatch.rule {
            Some(rule) => Outcome::Matched {
                rule,
                response: &dispatch.response,
                delayed: dispatch.delayed,
            },
            None => Outcome::NotFound {
                response: &dispatch.response,
            },
        };
        Self { request, outcome }
    }

    pub fn cancelled(request: &'a InboundRequest) -> Self {
        Self {
            request,
            outcome: Outcome::Cancelled,
        }
    }

    /// Status sent to the client, if any.
    pub fn status(&self) -> Option<u16> {
        match self.outcome {
            Outcome::Matched { response, .. } | Outcome::NotFound { response } => {
                Some(response.status)
            }
            Outcome::Cancelled => None,
        }
    }
}

/// Observer that records every transaction to a text sink.
pub struct TransactionLogger {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl TransactionLogger {
    /// Log to standard output.
    pub fn stdout() -> Self {
        Self::with_writer(io::stdout())
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Mutex::new(Box::new(writer)),
        }
    }

    /// Record a transaction. Never fails.
    pub fn record(&self, transaction: &Transaction<'_>) {
        let request = transaction.request;
        debug!(
            method = %request.method,
            path = %request.path,
            status = ?transaction.status(),
            matched = matches!(transaction.outcome, Outcome::Matched { .. }),
            "Transaction"
        );

        let block = render_block(transaction);
        if let Err(e) = self.write_block(&block) {
            warn!(error = %e, "Failed to write transaction log");
        }
    }

    fn write_block(&self, block: &str) -> io::Result<()> {
        let mut sink = self
            .sink
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sink.write_all(block.as_bytes())?;
        sink.flush()
    }
}

impl std::fmt::Debug for TransactionLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionLogger").finish_non_exhaustive()
    }
}

/// Format the text block for one transaction.
pub fn render_block(transaction: &Transaction<'_>) -> String {
    let request = transaction.request;
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "{}", "~".repeat(RULE_WIDTH));
    let origin = request
        .origin
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let _ = writeln!(
        out,
        "[{}] Connection received on localhost {}",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        origin
    );

    match request.query.as_deref().filter(|q| !q.is_empty()) {
        Some(query) => {
            let _ = writeln!(out, "{} {}?{} HTTP/1.1", request.method, request.path, query);
            for (key, value) in parse_query_string(query) {
                let _ = writeln!(out, "  query: {} = {}", key, value);
            }
        }
        None => {
            let _ = writeln!(out, "{} {} HTTP/1.1", request.method, request.path);
        }
    }

    for (name, value) in &request.headers {
        let _ = writeln!(out, "{:<12} {}", name, value);
    }

    if !request.body.is_empty() {
        out.push('\n');
        let _ = writeln!(out, "{}", describe_body(&request.body));
    }

    out.push('\n');
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
    out.push('\n');

    match transaction.outcome {
        Outcome::Matched { rule, delayed, .. } => {
            let _ = writeln!(out, "Response: {} {}", rule.method, rule.path);
            let _ = writeln!(out, " - status:         {}", rule.status);
            let _ = writeln!(out, " - {}", rule.payload.summary());
            let _ = writeln!(out, " - delay_ms:       {}", rule.delay_ms());
            if !delayed.is_zero() {
                let _ = writeln!(out, " - waited_ms:      {}", delayed.as_millis());
            }
        }
        Outcome::NotFound { response } => {
            let _ = writeln!(
                out,
                "Response: {} (no match for {} {})",
                response.status, request.method, request.path
            );
        }
        Outcome::Cancelled => {
            let _ = writeln!(
                out,
                "Response: none (delay cancelled by shutdown for {} {})",
                request.method, request.path
            );
        }
    }

    out
}

/// Pretty-print JSON bodies, fall back to lossy UTF-8 text.
fn describe_body(body: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned()),
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    }
}

/// Parse a query string into ordered key-value pairs.
pub fn parse_query_string(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((key, value)) => (urlencoding_decode(key), urlencoding_decode(value)),
            None => (urlencoding_decode(part), String::new()),
        })
        .collect()
}

/// Form-style URL decoding: `%XX` escapes and `+` as space.
fn urlencoding_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                {
                    Some(byte) => {
                        decoded.push(byte);
                        i += 3;
                    }
                    None => {
                        decoded.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                decoded.push(b' ');
                i += 1;
            }
            other => {
                decoded.push(other);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::matcher::tests::make_rule;
    use crate::matcher::EndpointTable;
    use crate::shutdown::Shutdown;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn dispatcher() -> Dispatcher {
        let table = EndpointTable::from_rules(vec![make_rule(0, "POST", "/api/users", 201)]).unwrap();
        Dispatcher::new(Arc::new(table), Shutdown::new())
    }

    #[tokio::test]
    async fn test_matched_block() {
        let dispatcher = dispatcher();
        let request = InboundRequest::new("POST", "/api/users")
            .with_origin("127.0.0.1:54321".parse().unwrap())
            .with_query("source=test")
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"Ada"}"#);
        let dispatch = dispatcher.dispatch(&request).await.unwrap();

        let buffer = SharedBuffer::default();
        let logger = TransactionLogger::with_writer(buffer.clone());
        logger.record(&Transaction::completed(&request, &dispatch));

        let block = buffer.contents();
        assert!(block.starts_with(&"~".repeat(RULE_WIDTH)));
        assert!(block.contains("Connection received on localhost 127.0.0.1:54321"));
        assert!(block.contains("POST /api/users?source=test HTTP/1.1"));
        assert!(block.contains("query: source = test"));
        assert!(block.contains("content-type"));
        assert!(block.contains("\"name\": \"Ada\""));
        assert!(block.contains(&"-".repeat(RULE_WIDTH)));
        assert!(block.contains("Response: POST /api/users"));
        assert!(block.contains(" - status:         201"));
        assert!(block.contains(r#" - payload_inline: {"rule":0}"#));
        assert!(block.contains(" - delay_ms:       0"));
    }

    #[tokio::test]
    async fn test_not_found_block() {
        let dispatcher = dispatcher();
        let request = InboundRequest::new("GET", "/nope");
        let dispatch = dispatcher.dispatch(&request).await.unwrap();

        let block = render_block(&Transaction::completed(&request, &dispatch));
        assert!(block.contains("Connection received on localhost unknown"));
        assert!(block.contains("Response: 404 (no match for GET /nope)"));
    }

    #[test]
    fn test_cancelled_block() {
        let request = InboundRequest::new("GET", "/slow");
        let transaction = Transaction::cancelled(&request);
        assert_eq!(transaction.status(), None);
        assert!(render_block(&transaction).contains("delay cancelled by shutdown for GET /slow"));
    }

    #[test]
    fn test_plain_text_body() {
        let request = InboundRequest::new("PUT", "/raw").with_body("not json at all");
        let block = render_block(&Transaction::cancelled(&request));
        assert!(block.contains("not json at all"));
    }

    #[test]
    fn test_sink_failure_is_swallowed() {
        let logger = TransactionLogger::with_writer(BrokenSink);
        let request = InboundRequest::new("GET", "/");
        logger.record(&Transaction::cancelled(&request));
    }

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("foo=bar&baz=qux");
        assert_eq!(
            params,
            vec![
                ("foo".to_string(), "bar".to_string()),
                ("baz".to_string(), "qux".to_string())
            ]
        );

        let params = parse_query_string("name=John%20Doe&city=S%C3%A3o+Paulo&flag");
        assert_eq!(params[0].1, "John Doe");
        assert_eq!(params[1].1, "São Paulo");
        assert_eq!(params[2], ("flag".to_string(), String::new()));
    }

    #[test]
    fn test_malformed_escape_kept() {
        assert_eq!(urlencoding_decode("100%"), "100%");
        assert_eq!(urlencoding_decode("%zz"), "%zz");
    }
}
