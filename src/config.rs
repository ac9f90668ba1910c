//! Configuration for the mock server.
//!
//! Reads the JSON endpoint file, validates every entry, and resolves payload
//! files into [`EndpointRule`]s. Validation is eager: a configuration that
//! loads successfully never fails at request time.
//!
//! ```json
//! {
//!   "endpoints": [
//!     {"method": "GET", "path": "/health", "status": 200,
//!      "payload_inline": {"status": "healthy"}, "delay_ms": 0},
//!     {"method": "GET", "path": "/api/users", "status": 200,
//!      "payload_file": "payloads/users.json", "delay_ms": 150}
//!   ]
//! }
//! ```
//!
//! `payload_file` paths are resolved relative to the process working directory.

use crate::error::ConfigError;
use crate::matcher::EndpointTable;
use axum::body::Bytes;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Keys understood inside an endpoint entry.
const KNOWN_FIELDS: [&str; 6] = [
    "method",
    "path",
    "status",
    "delay_ms",
    "payload_inline",
    "payload_file",
];

/// Inline payloads longer than this are truncated in log summaries.
const SUMMARY_MAX_CHARS: usize = 50;

/// Top-level shape of the configuration document.
#[derive(Debug, Deserialize)]
struct ConfigDocument {
    endpoints: Vec<Value>,
}

/// Where a payload came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    /// `payload_inline` literal in the configuration file
    Inline,
    /// `payload_file` reference, as written in the configuration
    File(PathBuf),
}

/// A resolved response payload.
///
/// The JSON value is checked to be an object or array and serialized once,
/// so requests only ever clone the encoded bytes.
#[derive(Debug, Clone)]
pub struct Payload {
    value: Value,
    encoded: Bytes,
    source: PayloadSource,
}

impl Payload {
    fn new(value: Value, source: PayloadSource) -> Self {
        let encoded = Bytes::from(value.to_string());
        Self {
            value,
            encoded,
            source,
        }
    }

    #[cfg(test)]
    pub(crate) fn inline(value: Value) -> Self {
        Self::new(value, PayloadSource::Inline)
    }

    /// The parsed JSON value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Compact JSON serialization of the value.
    pub fn encoded(&self) -> &Bytes {
        &self.encoded
    }

    pub fn source(&self) -> &PayloadSource {
        &self.source
    }

    /// One-line description used by the transaction log.
    pub fn summary(&self) -> String {
        match &self.source {
            PayloadSource::Inline => {
                let compact = self.value.to_string();
                if compact.chars().count() > SUMMARY_MAX_CHARS {
                    let head: String = compact.chars().take(SUMMARY_MAX_CHARS - 3).collect();
                    format!("payload_inline: {}...", head)
                } else {
                    format!("payload_inline: {}", compact)
                }
            }
            PayloadSource::File(path) => format!("payload_file:   {}", path.display()),
        }
    }
}

/// One configured mock behavior.
#[derive(Debug, Clone)]
pub struct EndpointRule {
    /// Position of the entry in the configuration file
    pub index: usize,
    /// HTTP method, exactly as configured
    pub method: String,
    /// Literal request path
    pub path: String,
    /// Response status code (100-599)
    pub status: u16,
    /// Response body
    pub payload: Payload,
    /// Injected latency before responding
    pub delay: Duration,
}

impl EndpointRule {
    /// Configured delay in milliseconds.
    pub fn delay_ms(&self) -> u64 {
        self.delay.as_millis() as u64
    }
}

/// Load the configuration file and build the immutable endpoint table.
pub fn load(path: &Path) -> Result<EndpointTable, ConfigError> {
    info!(path = %path.display(), "Loading configuration");
    let rules = read_rules(path)?;
    EndpointTable::from_rules(rules)
}

/// Summary printed by validate-only mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub config_path: PathBuf,
    pub endpoint_count: usize,
    pub payload_files: usize,
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "✓ Configuration file '{}' is valid",
            self.config_path.display()
        )?;
        writeln!(f, "✓ Found {} endpoint(s)", self.endpoint_count)?;
        write!(
            f,
            "✓ All payload files exist ({} referenced)",
            self.payload_files
        )
    }
}

/// Run every load-time check without building a table for serving.
pub fn validate_only(path: &Path) -> Result<ValidationReport, ConfigError> {
    let table = EndpointTable::from_rules(read_rules(path)?)?;

    let payload_files = table
        .rules()
        .iter()
        .filter(|rule| matches!(rule.payload.source(), PayloadSource::File(_)))
        .count();

    Ok(ValidationReport {
        config_path: path.to_path_buf(),
        endpoint_count: table.len(),
        payload_files,
    })
}

fn read_rules(path: &Path) -> Result<Vec<EndpointRule>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let document: Value = serde_json::from_str(&content).map_err(|e| ConfigError::Unreadable {
        path: path.to_path_buf(),
        reason: format!("invalid JSON: {}", e),
    })?;

    let document = ConfigDocument::deserialize(document).map_err(|e| ConfigError::Malformed {
        reason: e.to_string(),
    })?;

    if document.endpoints.is_empty() {
        return Err(ConfigError::Malformed {
            reason: "at least one endpoint must be configured".to_string(),
        });
    }

    let rules = document
        .endpoints
        .iter()
        .enumerate()
        .map(|(index, entry)| parse_endpoint(index, entry))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(endpoints = rules.len(), "Configuration validated");
    Ok(rules)
}

fn parse_endpoint(index: usize, entry: &Value) -> Result<EndpointRule, ConfigError> {
    let fields = entry.as_object().ok_or_else(|| ConfigError::Malformed {
        reason: format!(
            "endpoint {} must be a JSON object, got {}",
            index,
            json_kind(entry)
        ),
    })?;

    for key in fields.keys() {
        if !KNOWN_FIELDS.contains(&key.as_str()) {
            warn!(index, field = %key, "Ignoring unknown endpoint field");
        }
    }

    let method = required_string(fields, index, "method")?;
    if method != method.to_uppercase() || !method.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(invalid(
            index,
            "method",
            format!("HTTP method must be uppercase, got: {}", method),
        ));
    }

    let path = required_string(fields, index, "path")?;
    let status = parse_status(fields, index)?;
    let delay = parse_delay(fields, index)?;
    let payload = parse_payload(fields, index)?;

    Ok(EndpointRule {
        index,
        method,
        path,
        status,
        payload,
        delay,
    })
}

fn invalid(index: usize, field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::EndpointInvalid {
        index,
        field,
        reason: reason.into(),
    }
}

fn required_string(
    fields: &Map<String, Value>,
    index: usize,
    field: &'static str,
) -> Result<String, ConfigError> {
    match fields.get(field) {
        None | Some(Value::Null) => Err(invalid(index, field, "field is required")),
        Some(Value::String(s)) if s.is_empty() => Err(invalid(index, field, "must not be empty")),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(invalid(
            index,
            field,
            format!("expected a string, got {}", json_kind(other)),
        )),
    }
}

fn parse_status(fields: &Map<String, Value>, index: usize) -> Result<u16, ConfigError> {
    let value = match fields.get("status") {
        None | Some(Value::Null) => return Err(invalid(index, "status", "field is required")),
        Some(value) => value,
    };

    let code = value.as_i64().ok_or_else(|| {
        invalid(
            index,
            "status",
            format!("expected an integer, got {}", value),
        )
    })?;

    if !(100..=599).contains(&code) {
        return Err(invalid(
            index,
            "status",
            format!("HTTP status code must be between 100-599, got: {}", code),
        ));
    }

    if code < 200 {
        warn!(
            index,
            status = code,
            "1xx status cannot be sent as a final response; clients will see an error"
        );
    }

    Ok(code as u16)
}

fn parse_delay(fields: &Map<String, Value>, index: usize) -> Result<Duration, ConfigError> {
    let value = match fields.get("delay_ms") {
        None | Some(Value::Null) => return Err(invalid(index, "delay_ms", "field is required")),
        Some(value) => value,
    };

    match value.as_u64() {
        Some(ms) => Ok(Duration::from_millis(ms)),
        None => match value.as_i64() {
            Some(negative) => Err(invalid(
                index,
                "delay_ms",
                format!("Delay must be non-negative, got: {}", negative),
            )),
            None => Err(invalid(
                index,
                "delay_ms",
                format!("expected a non-negative integer, got {}", value),
            )),
        },
    }
}

fn parse_payload(fields: &Map<String, Value>, index: usize) -> Result<Payload, ConfigError> {
    let inline = fields.get("payload_inline").filter(|v| !v.is_null());
    let file = fields.get("payload_file").filter(|v| !v.is_null());

    match (inline, file) {
        (Some(_), Some(_)) => Err(ConfigError::PayloadAmbiguous { index }),
        (None, None) => Err(ConfigError::PayloadMissing { index }),
        (Some(value), None) => {
            if !is_container(value) {
                return Err(ConfigError::PayloadKindInvalid {
                    index,
                    kind: json_kind(value),
                });
            }
            Ok(Payload::new(value.clone(), PayloadSource::Inline))
        }
        (None, Some(Value::String(reference))) if !reference.is_empty() => {
            read_payload_file(index, PathBuf::from(reference))
        }
        (None, Some(Value::String(_))) => Err(invalid(index, "payload_file", "must not be empty")),
        (None, Some(other)) => Err(invalid(
            index,
            "payload_file",
            format!("expected a file path string, got {}", json_kind(other)),
        )),
    }
}

fn read_payload_file(index: usize, path: PathBuf) -> Result<Payload, ConfigError> {
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => {
            let reason = if e.kind() == ErrorKind::NotFound {
                "file not found".to_string()
            } else {
                format!("could not read file: {}", e)
            };
            return Err(ConfigError::PayloadFileError {
                index,
                path,
                reason,
            });
        }
    };

    let value: Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            return Err(ConfigError::PayloadFileError {
                index,
                path,
                reason: format!("invalid JSON: {}", e),
            })
        }
    };

    if !is_container(&value) {
        return Err(ConfigError::PayloadFileError {
            index,
            reason: format!(
                "top-level value must be a JSON object or array, got {}",
                json_kind(&value)
            ),
            path,
        });
    }

    debug!(index, path = %path.display(), "Resolved payload file");
    Ok(Payload::new(value, PayloadSource::File(path)))
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
