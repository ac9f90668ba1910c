//! Zentinel HTTP Mock
//!
//! A standalone HTTP server that answers exact (method, path) pairs with
//! pre-configured JSON responses. Used as a stand-in backend for integration
//! and end-to-end tests.
//!
//! # Features
//!
//! - **Exact Matching**: Method and path compared byte-for-byte, no patterns
//! - **Static Payloads**: Inline JSON or JSON files resolved at startup
//! - **Latency Simulation**: Fixed per-endpoint delay, cancelled on shutdown
//! - **HTTP Semantics**: 204 responses carry no body, HEAD mirrors GET headers
//! - **Transaction Log**: One readable block per request and its outcome
//!
//! # Example Configuration
//!
//! ```json
//! {
//!   "endpoints": [
//!     {
//!       "method": "GET",
//!       "path": "/health",
//!       "status": 200,
//!       "payload_inline": {"status": "healthy"},
//!       "delay_ms": 0
//!     },
//!     {
//!       "method": "DELETE",
//!       "path": "/api/sessions",
//!       "status": 204,
//!       "payload_inline": {},
//!       "delay_ms": 50
//!     }
//!   ]
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod matcher;
pub mod server;
pub mod shutdown;
pub mod transaction;

pub use config::{EndpointRule, ValidationReport};
pub use dispatcher::{Dispatcher, InboundRequest, RenderedResponse};
pub use error::{ConfigError, DelayCancelled};
pub use matcher::EndpointTable;
pub use server::MockServer;
pub use shutdown::{listen_for_signals, Shutdown};
pub use transaction::TransactionLogger;
