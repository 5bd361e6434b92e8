//! REGON MCP - Polish business registry over the Model Context Protocol
//!
//! Exposes REGON/NIP/KRS lookups from the GUS BIR 1.1 service as MCP tools,
//! over JSON-RPC on stdio or a small REST API.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod http;
pub mod mcp;
pub mod retry;
pub mod sanitize;
pub mod types;
pub mod upstream;
pub mod validate;

pub use config::{Mode, ServerArgs, ServerConfig};
pub use dispatch::{format_error, Dispatcher, ServerContext};
pub use error::{ErrorCode, Result, ServerError};
pub use health::{HealthChecker, Probe};
pub use retry::RetryPolicy;
pub use types::*;
pub use upstream::{BirClient, RegistryClient, SearchQuery};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
