//! Upstream registry client
//!
//! The dispatcher only sees [`RegistryClient`]. [`BirClient`] talks to the
//! GUS BIR 1.1 service; tests plug in their own implementations.

mod bir;

pub use bir::{BirClient, BirEnvironment, PRODUCTION_URL, TEST_URL};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A registry search by one or many identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    Nip(String),
    Regon(String),
    Krs(String),
    Nips(Vec<String>),
    Regons9(Vec<String>),
    Krss(Vec<String>),
}

impl SearchQuery {
    /// BIR search parameter name and its value (multiples comma-joined)
    pub fn parameter(&self) -> (&'static str, String) {
        match self {
            SearchQuery::Nip(v) => ("Nip", v.clone()),
            SearchQuery::Regon(v) => ("Regon", v.clone()),
            SearchQuery::Krs(v) => ("Krs", v.clone()),
            SearchQuery::Nips(v) => ("Nipy", v.join(",")),
            SearchQuery::Regons9(v) => ("Regony9zn", v.join(",")),
            SearchQuery::Krss(v) => ("Krsy", v.join(",")),
        }
    }

    /// Number of identifiers in the query
    pub fn len(&self) -> usize {
        match self {
            SearchQuery::Nip(_) | SearchQuery::Regon(_) | SearchQuery::Krs(_) => 1,
            SearchQuery::Nips(v) | SearchQuery::Regons9(v) | SearchQuery::Krss(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Capabilities the server needs from the business registry.
///
/// Every method may be slow or fail; callers wrap them in a retry policy.
/// Searches and reports return an empty list when nothing matched.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Open a session with the given key
    async fn authenticate(&self, api_key: &str) -> Result<()>;

    /// Service status code (1 = available) and message
    async fn service_status(&self) -> Result<(i64, String)>;

    /// Date of the registry data snapshot
    async fn data_status(&self) -> Result<Value>;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Value>>;

    async fn full_report(&self, regon: &str, report_name: &str) -> Result<Vec<Value>>;

    /// Code and message of the last error in the current session (0 = none)
    async fn last_error(&self) -> Result<(i64, String)>;

    /// Names of the operations the service offers
    async fn operations(&self) -> Result<Vec<String>>;
}
