//! Tool dispatcher
//!
//! Every tool call goes through [`Dispatcher::dispatch`]:
//!
//! 1. name check, sanitization of name and arguments
//! 2. routing and argument validation ([`ToolCall::parse`], no I/O)
//! 3. one-time upstream session setup, retried
//! 4. the upstream call, retried
//! 5. formatting into a [`ToolCallResult`]
//!
//! A failure at any step skips the rest and becomes a single error block.
//! Nothing past this boundary sees a `ServerError`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;

use crate::config::{Mode, ServerConfig};
use crate::error::{ErrorCode, Result, ServerError};
use crate::health::{HealthChecker, Probe};
use crate::mcp::{
    methods, InitializeResult, McpHandler, McpRequest, McpResponse, ToolCallResult, ToolCatalog,
};
use crate::retry::RetryPolicy;
use crate::sanitize::{sanitize_arguments, sanitize_str, MAX_TOOL_NAME_LENGTH};
use crate::types::{ToolCall, ToolRequest};
use crate::upstream::{RegistryClient, SearchQuery};

/// Service status code meaning "available"
const SERVICE_AVAILABLE: i64 = 1;

/// Dependencies of the dispatcher, built once by the process entry point
pub struct ServerContext {
    pub mode: Mode,
    api_key: String,
    pub client: Arc<dyn RegistryClient>,
    pub catalog: ToolCatalog,
    pub health: Arc<HealthChecker>,
    /// Policy for session setup
    pub init_retry: RetryPolicy,
    /// Policy for each upstream call
    pub call_retry: RetryPolicy,
}

impl ServerContext {
    pub fn new(config: &ServerConfig, client: Arc<dyn RegistryClient>, catalog: ToolCatalog) -> Self {
        Self {
            mode: config.mode,
            api_key: config.api_key.clone(),
            client,
            catalog,
            health: Arc::new(HealthChecker::new()),
            init_retry: RetryPolicy::network(),
            call_retry: RetryPolicy::network(),
        }
    }

    /// Override both retry policies
    pub fn with_retry(mut self, init_retry: RetryPolicy, call_retry: RetryPolicy) -> Self {
        self.init_retry = init_retry;
        self.call_retry = call_retry;
        self
    }

    pub fn with_health(mut self, health: Arc<HealthChecker>) -> Self {
        self.health = health;
        self
    }
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("mode", &self.mode)
            .field("catalog", &self.catalog.source)
            .field("init_retry", &self.init_retry)
            .field("call_retry", &self.call_retry)
            .finish()
    }
}

/// Upstream session shared by the dispatcher and the `regon_api` probe
struct Session {
    client: Arc<dyn RegistryClient>,
    api_key: String,
    mode: Mode,
    retry: RetryPolicy,
    ready: OnceCell<()>,
}

impl Session {
    /// Concurrent callers share a single attempt; a failure is not cached.
    async fn ensure(&self) -> Result<()> {
        self.ready
            .get_or_try_init(|| async {
                self.retry
                    .run("REGON API initialization", || self.open())
                    .await
            })
            .await?;
        Ok(())
    }

    async fn open(&self) -> Result<()> {
        self.client.authenticate(&self.api_key).await?;

        let (code, message) = self.client.service_status().await?;
        if code != SERVICE_AVAILABLE {
            return Err(ServerError::api(format!(
                "REGON service is not available: {}",
                message
            ))
            .with_detail("status_code", code));
        }

        tracing::info!(mode = %self.mode, "REGON API initialized, service status: {}", message);
        Ok(())
    }

    /// Open the session if needed, then check the live service status
    async fn probe(&self) -> Result<Value> {
        self.ensure().await?;
        let (code, message) = self.client.service_status().await?;
        if code != SERVICE_AVAILABLE {
            return Err(ServerError::api(format!(
                "REGON service status {}: {}",
                code, message
            )));
        }
        Ok(json!({
            "mode": self.mode.as_str(),
            "service_status": code,
            "message": message,
        }))
    }
}

/// Routes tool calls to the registry client
pub struct Dispatcher {
    ctx: ServerContext,
    session: Arc<Session>,
}

impl Dispatcher {
    /// Create a dispatcher and register its `tool_config` and `regon_api`
    /// health probes
    pub fn new(ctx: ServerContext) -> Self {
        let session = Arc::new(Session {
            client: ctx.client.clone(),
            api_key: ctx.api_key.clone(),
            mode: ctx.mode,
            retry: ctx.init_retry,
            ready: OnceCell::new(),
        });

        let summary = ctx.catalog.health_summary();
        ctx.health
            .register("tool_config", Probe::sync(move || Ok(summary.clone())));

        let probe_session = session.clone();
        ctx.health.register(
            "regon_api",
            Probe::from_async(move || {
                let session = probe_session.clone();
                async move { session.probe().await }
            }),
        );

        Self { ctx, session }
    }

    pub fn context(&self) -> &ServerContext {
        &self.ctx
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.ctx.catalog
    }

    pub fn health(&self) -> &Arc<HealthChecker> {
        &self.ctx.health
    }

    pub fn is_production(&self) -> bool {
        self.ctx.mode.is_production()
    }

    /// Whether the upstream session has been set up
    pub fn is_initialized(&self) -> bool {
        self.session.ready.initialized()
    }

    /// Call a tool by name with raw arguments.
    ///
    /// Missing or null arguments are treated as an empty object.
    pub async fn call_tool(&self, name: &str, arguments: Option<&Value>) -> ToolCallResult {
        let arguments = match arguments {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return self.error_result(
                    &ServerError::validation("Arguments must be a JSON object"),
                    None,
                )
            }
        };
        self.dispatch(ToolRequest {
            name: name.to_string(),
            arguments,
        })
        .await
    }

    /// Run the full pipeline for one request
    pub async fn dispatch(&self, request: ToolRequest) -> ToolCallResult {
        if request.name.trim().is_empty() {
            return self.error_result(
                &ServerError::validation("Tool name must be a non-empty string"),
                None,
            );
        }

        let name = sanitize_str(request.name.trim(), MAX_TOOL_NAME_LENGTH);
        let arguments = sanitize_arguments(&request.arguments);
        tracing::info!(
            tool = %name,
            keys = ?arguments.keys().collect::<Vec<_>>(),
            "Processing tool call"
        );
        let shown = Value::Object(arguments.clone());
        tracing::debug!(tool = %name, arguments = %shown, "Tool arguments");

        let call = match ToolCall::parse(&name, &arguments) {
            Ok(call) => call,
            Err(e) => return self.error_result(&e, None),
        };

        if let Err(e) = self.ensure_initialized().await {
            let err = ServerError::api(format!("Failed to initialize REGON API: {}", e));
            let err = e
                .details()
                .iter()
                .fold(err, |err, (k, v)| err.with_detail(k.clone(), v.clone()));
            return self.error_result(&err, None);
        }

        match self.execute(&call).await {
            Ok(result) => result,
            Err(e) => self.error_result(&e, Some(call.tool().context())),
        }
    }

    /// Open the upstream session if it is not open yet.
    ///
    /// Concurrent callers share a single attempt; a failure is not cached.
    pub async fn ensure_initialized(&self) -> Result<()> {
        self.session.ensure().await
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolCallResult> {
        let client = &self.ctx.client;
        let retry = &self.ctx.call_retry;
        let operation = call.tool().as_str();

        match call {
            ToolCall::SearchByNip { nip } => {
                tracing::debug!("Searching by NIP: {}", nip);
                self.search(
                    operation,
                    SearchQuery::Nip(nip.clone()),
                    "ℹ️ No data found for the specified NIP number.",
                )
                .await
            }
            ToolCall::SearchByRegon { regon } => {
                tracing::debug!("Searching by REGON: {}", regon);
                self.search(
                    operation,
                    SearchQuery::Regon(regon.clone()),
                    "ℹ️ No data found for the specified REGON number.",
                )
                .await
            }
            ToolCall::SearchByKrs { krs } => {
                tracing::debug!("Searching by KRS: {}", krs);
                self.search(
                    operation,
                    SearchQuery::Krs(krs.clone()),
                    "ℹ️ No data found for the specified KRS number.",
                )
                .await
            }
            ToolCall::SearchMultipleNips { nips } => {
                tracing::debug!("Searching multiple NIPs: {:?}", nips);
                self.search(
                    operation,
                    SearchQuery::Nips(nips.clone()),
                    "ℹ️ No data found for the specified NIP numbers.",
                )
                .await
            }
            ToolCall::SearchMultipleRegons9 { regons } => {
                tracing::debug!("Searching multiple REGONs: {:?}", regons);
                self.search(
                    operation,
                    SearchQuery::Regons9(regons.clone()),
                    "ℹ️ No data found for the specified REGON numbers.",
                )
                .await
            }
            ToolCall::SearchMultipleKrs { krs_numbers } => {
                tracing::debug!("Searching multiple KRS: {:?}", krs_numbers);
                self.search(
                    operation,
                    SearchQuery::Krss(krs_numbers.clone()),
                    "ℹ️ No data found for the specified KRS numbers.",
                )
                .await
            }
            ToolCall::GetFullReport { regon, report_name } => {
                tracing::debug!("Getting full report for REGON {}, report: {}", regon, report_name);
                let records = retry
                    .run(operation, || client.full_report(regon, report_name))
                    .await?;
                Ok(records_result(
                    records,
                    "ℹ️ No report data available for the specified parameters.",
                ))
            }
            ToolCall::GetServiceStatus => {
                let (code, message) = retry.run(operation, || client.service_status()).await?;
                Ok(ToolCallResult::text(format!(
                    "{} Service Status Code: {}\nStatus Message: {}",
                    status_emoji(code == SERVICE_AVAILABLE),
                    code,
                    message
                )))
            }
            ToolCall::GetDataStatus => {
                let status = retry.run(operation, || client.data_status()).await?;
                if is_empty_value(&status) {
                    return Ok(ToolCallResult::text(
                        "ℹ️ No data status information available.",
                    ));
                }
                Ok(ToolCallResult::json(&status))
            }
            ToolCall::GetLastErrorCode => {
                let (code, message) = retry.run(operation, || client.last_error()).await?;
                Ok(ToolCallResult::text(format!(
                    "{} Last Error Code: {}\nMessage: {}",
                    status_emoji(code == 0),
                    code,
                    message
                )))
            }
            ToolCall::GetLastErrorMessage => {
                let (code, message) = retry.run(operation, || client.last_error()).await?;
                Ok(ToolCallResult::text(format!(
                    "{} Last Error Message: {}",
                    status_emoji(code == 0),
                    message
                )))
            }
            ToolCall::GetSessionStatus => {
                let (code, message) = retry.run(operation, || client.service_status()).await?;
                Ok(ToolCallResult::text(format!(
                    "{} Session Status: {} (Code: {})",
                    status_emoji(code == SERVICE_AVAILABLE),
                    message,
                    code
                )))
            }
            ToolCall::GetAvailableOperations => {
                let operations = retry.run(operation, || client.operations()).await?;
                if operations.is_empty() {
                    return Ok(ToolCallResult::text(
                        "ℹ️ No operations information available.",
                    ));
                }
                Ok(ToolCallResult::json(&operations))
            }
        }
    }

    async fn search(
        &self,
        operation: &str,
        query: SearchQuery,
        empty_message: &str,
    ) -> Result<ToolCallResult> {
        let client = &self.ctx.client;
        let records = self
            .ctx
            .call_retry
            .run(operation, || client.search(&query))
            .await?;
        Ok(records_result(records, empty_message))
    }

    fn error_result(&self, err: &ServerError, context: Option<&str>) -> ToolCallResult {
        let text = format_error(err, context, self.is_production());
        tracing::error!(error_code = %err.code(), "Error response created: {}", text);
        ToolCallResult::error(err.code(), text)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("ctx", &self.ctx)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// Render an error as the text of a single response block.
///
/// Production mode hides raw upstream detail behind
/// [`ServerError::user_message`]; validation messages are always shown as is.
pub fn format_error(err: &ServerError, context: Option<&str>, production: bool) -> String {
    let code = err.code();
    let mut text = if production && code != ErrorCode::Validation {
        format!("❌ {}: {}", code, err.user_message())
    } else {
        let mut text = format!("❌ {}: {}", code, err.message());
        if !err.details().is_empty() {
            let details = serde_json::to_string_pretty(err.details()).unwrap_or_default();
            text.push_str("\nDetails: ");
            text.push_str(&details);
        }
        text
    };

    if let Some(context) = context.filter(|c| !c.is_empty()) {
        text = format!("{}\n{}", context, text);
    }
    text
}

fn status_emoji(ok: bool) -> &'static str {
    if ok {
        "🟢"
    } else {
        "🔴"
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn records_result(records: Vec<Value>, empty_message: &str) -> ToolCallResult {
    if records.is_empty() {
        ToolCallResult::text(empty_message)
    } else {
        ToolCallResult::json(&records)
    }
}

#[async_trait]
impl McpHandler for Dispatcher {
    async fn handle_request(&self, request: McpRequest) -> Option<McpResponse> {
        if request.is_notification() {
            tracing::debug!(method = %request.method, "Ignoring notification");
            return None;
        }

        match request.method.as_str() {
            methods::INITIALIZE => {
                let result =
                    InitializeResult::new(&self.ctx.catalog.server_name, &self.ctx.catalog.version);
                Some(McpResponse::success(request.id, json!(result)))
            }
            methods::PING => Some(McpResponse::success(request.id, json!({}))),
            methods::LIST_TOOLS => Some(McpResponse::success(
                request.id,
                json!({"tools": self.ctx.catalog.tools}),
            )),
            methods::CALL_TOOL => {
                let name = request
                    .params
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                let result = self.call_tool(name, request.params.get("arguments")).await;
                Some(McpResponse::success(request.id, json!(result)))
            }
            _ => Some(McpResponse::error(
                request.id,
                -32601,
                format!("Method not found: {}", request.method),
            )),
        }
    }
}
