//! Shared test doubles

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use regon_mcp::config::{Mode, ServerConfig};
use regon_mcp::mcp::ToolCatalog;
use regon_mcp::{
    Dispatcher, RegistryClient, Result, RetryPolicy, SearchQuery, ServerContext, ServerError,
};

/// Registry stub that records every call
#[derive(Default)]
pub struct StubRegistry {
    pub calls: AtomicUsize,
    pub auth_calls: AtomicUsize,
    pub searches: Mutex<Vec<SearchQuery>>,
    /// Records returned by searches and reports
    pub records: Mutex<Vec<Value>>,
    /// Number of upcoming calls (any method) that fail with a network error
    pub failures_left: AtomicUsize,
    /// Fail authentication with an API error
    pub reject_auth: bool,
    /// Time authentication takes before answering
    pub auth_delay: Duration,
    pub service_code: i64,
}

impl StubRegistry {
    pub fn new() -> Self {
        Self {
            service_code: 1,
            ..Default::default()
        }
    }

    pub fn with_records(records: Vec<Value>) -> Self {
        let stub = Self::new();
        *stub.records.lock() = records;
        stub
    }

    pub fn failing(times: usize) -> Self {
        let stub = Self::new();
        stub.failures_left.store(times, Ordering::SeqCst);
        stub
    }

    pub fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(ServerError::network("connection reset by peer"));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryClient for StubRegistry {
    async fn authenticate(&self, _api_key: &str) -> Result<()> {
        self.enter()?;
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if !self.auth_delay.is_zero() {
            tokio::time::sleep(self.auth_delay).await;
        }
        if self.reject_auth {
            return Err(ServerError::api("Authentication failed: invalid key"));
        }
        Ok(())
    }

    async fn service_status(&self) -> Result<(i64, String)> {
        self.enter()?;
        let message = if self.service_code == 1 {
            "Usługa dostępna"
        } else {
            "Usługa niedostępna"
        };
        Ok((self.service_code, message.to_string()))
    }

    async fn data_status(&self) -> Result<Value> {
        self.enter()?;
        Ok(json!({"StanDanych": "2024-05-20"}))
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Value>> {
        self.enter()?;
        self.searches.lock().push(query.clone());
        Ok(self.records.lock().clone())
    }

    async fn full_report(&self, _regon: &str, _report_name: &str) -> Result<Vec<Value>> {
        self.enter()?;
        Ok(self.records.lock().clone())
    }

    async fn last_error(&self) -> Result<(i64, String)> {
        self.enter()?;
        Ok((0, String::new()))
    }

    async fn operations(&self) -> Result<Vec<String>> {
        self.enter()?;
        Ok(vec!["DaneSzukajPodmioty".to_string()])
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(1), 1.0)
}

pub fn config(mode: Mode) -> ServerConfig {
    ServerConfig {
        mode,
        ..ServerConfig::for_tests()
    }
}

pub fn dispatcher(stub: Arc<StubRegistry>) -> Dispatcher {
    dispatcher_in(Mode::Test, stub)
}

pub fn dispatcher_in(mode: Mode, stub: Arc<StubRegistry>) -> Dispatcher {
    let ctx = ServerContext::new(&config(mode), stub, ToolCatalog::builtin())
        .with_retry(fast_retry(), fast_retry());
    Dispatcher::new(ctx)
}

pub fn gus_record() -> Value {
    json!({
        "Regon": "000331501",
        "Nip": "5261040828",
        "Nazwa": "GŁÓWNY URZĄD STATYSTYCZNY",
        "Wojewodztwo": "MAZOWIECKIE",
        "Miejscowosc": "Warszawa",
        "Typ": "P"
    })
}
