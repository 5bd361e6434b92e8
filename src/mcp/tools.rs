//! MCP tool definitions for the REGON server

use serde::Serialize;
use serde_json::{json, Value};

use super::protocol::ToolDefinition;
use crate::config::{ToolConfigFile, ToolConfigLoader};
use crate::sanitize::{sanitize_str, MAX_DESCRIPTION_LENGTH, MAX_TOOL_NAME_LENGTH};
use crate::types::ToolName;

/// Version of the built-in catalog
pub const CATALOG_VERSION: &str = "1.1.0";

/// Server name announced when no tool configuration names one
pub const DEFAULT_SERVER_NAME: &str = "regon-mcp";

/// All tool definitions for the REGON server
pub const TOOL_DEFINITIONS: &[(&str, &str, &str)] = &[
    // Single lookups
    (
        "regon_search_by_nip",
        "Search for Polish companies by NIP (tax number)",
        r#"{
            "type": "object",
            "properties": {
                "nip": {"type": "string", "description": "10-digit NIP number (e.g., '7342867148')"}
            },
            "required": ["nip"],
            "additionalProperties": false
        }"#,
    ),
    (
        "regon_search_by_regon",
        "Search for Polish companies by REGON number",
        r#"{
            "type": "object",
            "properties": {
                "regon": {"type": "string", "description": "9-digit (main unit) or 14-digit (local unit) REGON number"}
            },
            "required": ["regon"],
            "additionalProperties": false
        }"#,
    ),
    (
        "regon_search_by_krs",
        "Search for Polish companies by KRS (court register) number",
        r#"{
            "type": "object",
            "properties": {
                "krs": {"type": "string", "description": "10-digit KRS number with leading zeros (e.g., '0000006865')"}
            },
            "required": ["krs"],
            "additionalProperties": false
        }"#,
    ),
    // Bulk lookups
    (
        "regon_search_multiple_nips",
        "Search for multiple Polish companies by NIP numbers (up to 20 per request)",
        r#"{
            "type": "object",
            "properties": {
                "nips": {"type": "array", "items": {"type": "string"}, "maxItems": 20, "description": "List of 10-digit NIP numbers"}
            },
            "required": ["nips"],
            "additionalProperties": false
        }"#,
    ),
    (
        "regon_search_multiple_regons9",
        "Search for multiple Polish companies by 9-digit REGON numbers (up to 20 per request)",
        r#"{
            "type": "object",
            "properties": {
                "regons": {"type": "array", "items": {"type": "string"}, "maxItems": 20, "description": "List of 9-digit REGON numbers"}
            },
            "required": ["regons"],
            "additionalProperties": false
        }"#,
    ),
    (
        "regon_search_multiple_krs",
        "Search for multiple Polish companies by KRS numbers (up to 20 per request)",
        r#"{
            "type": "object",
            "properties": {
                "krs_numbers": {"type": "array", "items": {"type": "string"}, "maxItems": 20, "description": "List of 10-digit KRS numbers"}
            },
            "required": ["krs_numbers"],
            "additionalProperties": false
        }"#,
    ),
    // Reports
    (
        "regon_get_full_report",
        "Get a detailed BIR 1.1 report for a company by REGON number",
        r#"{
            "type": "object",
            "properties": {
                "regon": {"type": "string", "description": "9 or 14-digit REGON number"},
                "report_name": {
                    "type": "string",
                    "enum": [
                        "BIR11OsFizycznaDaneOgolne",
                        "BIR11OsFizycznaDzialalnoscCeidg",
                        "BIR11OsFizycznaDzialalnoscRolnicza",
                        "BIR11OsFizycznaDzialalnoscPozostala",
                        "BIR11OsFizycznaListaJednLokalnych",
                        "BIR11JednLokalnaOsFizycznej",
                        "BIR11OsPrawna",
                        "BIR11OsPrawnaDzialalnoscSkreslona",
                        "BIR11OsPrawnaPkd",
                        "BIR11OsPrawnaListaJednLokalnych",
                        "BIR11JednLokalnaOsPrawnej",
                        "BIR11TypPodmiotu"
                    ],
                    "description": "Name of the BIR 1.1 report"
                }
            },
            "required": ["regon", "report_name"],
            "additionalProperties": false
        }"#,
    ),
    // Service status
    (
        "regon_get_service_status",
        "Check the status of the REGON service",
        r#"{"type": "object", "properties": {}, "additionalProperties": false}"#,
    ),
    (
        "regon_get_data_status",
        "Get the date of the most recent REGON data update",
        r#"{"type": "object", "properties": {}, "additionalProperties": false}"#,
    ),
    (
        "regon_get_last_error_code",
        "Get the code of the last error reported by the REGON service",
        r#"{"type": "object", "properties": {}, "additionalProperties": false}"#,
    ),
    (
        "regon_get_last_error_message",
        "Get the message of the last error reported by the REGON service",
        r#"{"type": "object", "properties": {}, "additionalProperties": false}"#,
    ),
    (
        "regon_get_session_status",
        "Check the status of the current REGON session",
        r#"{"type": "object", "properties": {}, "additionalProperties": false}"#,
    ),
    (
        "regon_get_available_operations",
        "List the operations offered by the REGON service",
        r#"{"type": "object", "properties": {}, "additionalProperties": false}"#,
    ),
];

/// Tools served when configuration loading fails
pub const FALLBACK_TOOLS: &[ToolName] = &[
    ToolName::SearchByNip,
    ToolName::SearchByRegon,
    ToolName::SearchByKrs,
    ToolName::GetServiceStatus,
];

/// Get all tool definitions as ToolDefinition structs
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    TOOL_DEFINITIONS
        .iter()
        .map(|(name, description, schema)| ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::from_str(schema).unwrap_or(json!({})),
        })
        .collect()
}

/// Built-in definitions for the fallback tool set
pub fn get_fallback_definitions() -> Vec<ToolDefinition> {
    get_tool_definitions()
        .into_iter()
        .filter(|def| FALLBACK_TOOLS.iter().any(|tool| tool.as_str() == def.name))
        .collect()
}

/// Where the served catalog came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CatalogSource {
    BuiltIn { version: String },
    Config { config_name: String, language: String },
    Fallback { error: String },
}

/// The tool list served by both transports
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    pub server_name: String,
    pub version: String,
    pub tools: Vec<ToolDefinition>,
    pub source: CatalogSource,
}

impl ToolCatalog {
    /// The full built-in catalog
    pub fn builtin() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.to_string(),
            version: CATALOG_VERSION.to_string(),
            tools: get_tool_definitions(),
            source: CatalogSource::BuiltIn {
                version: CATALOG_VERSION.to_string(),
            },
        }
    }

    /// The reduced catalog used after a configuration failure
    pub fn fallback(error: impl Into<String>) -> Self {
        Self {
            server_name: format!("{} (fallback)", DEFAULT_SERVER_NAME),
            version: CATALOG_VERSION.to_string(),
            tools: get_fallback_definitions(),
            source: CatalogSource::Fallback {
                error: error.into(),
            },
        }
    }

    /// Build a catalog from a loaded configuration file.
    ///
    /// Each entry must be an object with `name`, `description` and
    /// `inputSchema`, and must name a known tool; anything else is skipped.
    /// An entry replaces the built-in definition of the same tool. Zero valid
    /// entries yields the fallback catalog.
    pub fn from_config(config_name: &str, config: &ToolConfigFile) -> Self {
        let mut tools: Vec<ToolDefinition> = Vec::new();

        for (index, entry) in config.tools.iter().enumerate() {
            match parse_entry(entry) {
                Ok(def) => {
                    if tools.iter().any(|t| t.name == def.name) {
                        tracing::warn!("Skipping duplicate tool config: {}", def.name);
                        continue;
                    }
                    tools.push(def);
                }
                Err(reason) => {
                    tracing::warn!("Skipping tool config #{}: {}", index, reason);
                }
            }
        }

        if tools.is_empty() {
            tracing::error!(
                config = config_name,
                "No valid tools could be loaded from configuration"
            );
            return Self::fallback(format!(
                "No valid tools could be loaded from configuration '{}'",
                config_name
            ));
        }

        tracing::info!("Successfully loaded {} tools from configuration", tools.len());
        Self {
            server_name: config
                .name
                .as_deref()
                .map(|n| sanitize_str(n, MAX_TOOL_NAME_LENGTH))
                .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string()),
            version: config
                .version
                .clone()
                .unwrap_or_else(|| CATALOG_VERSION.to_string()),
            tools,
            source: CatalogSource::Config {
                config_name: config_name.to_string(),
                language: config
                    .language
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            },
        }
    }

    /// Resolve the catalog to serve. Never fails: with no configuration
    /// requested the built-in catalog is used, and any loading failure
    /// degrades to the fallback catalog.
    pub fn resolve(loader: &ToolConfigLoader, requested: Option<&str>) -> Self {
        let Some(name) = requested else {
            return Self::builtin();
        };
        match loader.load(name) {
            Ok((loaded, config)) => Self::from_config(&loaded, &config),
            Err(e) => {
                tracing::error!("Failed to load tool configuration: {}", e);
                tracing::warn!("Falling back to built-in tool definitions");
                Self::fallback(e.to_string())
            }
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, CatalogSource::Fallback { .. })
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Value reported by the `tool_config` health probe
    pub fn health_summary(&self) -> Value {
        match &self.source {
            CatalogSource::Fallback { error } => json!({
                "status": "fallback",
                "error": error,
                "tool_count": self.tools.len(),
            }),
            CatalogSource::Config {
                config_name,
                language,
            } => json!({
                "config_name": config_name,
                "language": language,
                "tool_count": self.tools.len(),
            }),
            CatalogSource::BuiltIn { version } => json!({
                "config_name": "builtin",
                "version": version,
                "tool_count": self.tools.len(),
            }),
        }
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn parse_entry(entry: &Value) -> std::result::Result<ToolDefinition, String> {
    let object = entry
        .as_object()
        .ok_or_else(|| "entry is not an object".to_string())?;

    let name = object
        .get("name")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| "missing name".to_string())?;
    let description = object
        .get("description")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| format!("incomplete tool config: {}", name))?;
    let input_schema = object
        .get("inputSchema")
        .filter(|schema| schema.is_object())
        .ok_or_else(|| format!("incomplete tool config: {}", name))?;

    let name = sanitize_str(name, MAX_TOOL_NAME_LENGTH);
    if name.parse::<ToolName>().is_err() {
        return Err(format!("unknown tool: {}", name));
    }

    Ok(ToolDefinition {
        name,
        description: sanitize_str(description, MAX_DESCRIPTION_LENGTH),
        input_schema: input_schema.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn config(tools: Value) -> ToolConfigFile {
        serde_json::from_value(json!({
            "name": "RegonAPI MCP Server",
            "version": "2.0.0",
            "language": "pl",
            "tools": tools
        }))
        .unwrap()
    }

    #[test]
    fn test_builtin_covers_every_tool() {
        let names: HashSet<String> = get_tool_definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names.len(), ToolName::ALL.len());
        for tool in ToolName::ALL {
            assert!(names.contains(tool.as_str()), "missing {}", tool);
        }
    }

    #[test]
    fn test_schemas_parse() {
        for (name, _, schema) in TOOL_DEFINITIONS {
            let parsed: Value = serde_json::from_str(schema).unwrap();
            assert_eq!(parsed["type"], "object", "{}", name);
        }
    }

    #[test]
    fn test_fallback_set() {
        let catalog = ToolCatalog::fallback("boom");
        assert!(catalog.is_fallback());
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.health_summary()["status"], "fallback");
    }

    #[test]
    fn test_from_config_skips_malformed_entries() {
        let catalog = ToolCatalog::from_config(
            "polish",
            &config(json!([
                {"name": "regon_search_by_nip", "description": "Szukaj po NIP", "inputSchema": {"type": "object"}},
                "not an object",
                {"name": "regon_search_by_krs", "inputSchema": {"type": "object"}},
                {"name": "regon_drop_tables", "description": "x", "inputSchema": {"type": "object"}},
                {"name": "regon_search_by_nip", "description": "duplicate", "inputSchema": {"type": "object"}}
            ])),
        );
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.tools[0].description, "Szukaj po NIP");
        assert_eq!(catalog.server_name, "RegonAPI MCP Server");
        assert_eq!(catalog.version, "2.0.0");
        assert_eq!(catalog.health_summary()["language"], "pl");
    }

    #[test]
    fn test_from_config_with_no_valid_tools_falls_back() {
        let catalog = ToolCatalog::from_config("empty", &config(json!([])));
        assert!(catalog.is_fallback());
        assert!(!catalog.is_empty());
    }

    #[test]
    fn test_description_is_bounded() {
        let long = "d".repeat(MAX_DESCRIPTION_LENGTH + 10);
        let catalog = ToolCatalog::from_config(
            "long",
            &config(json!([
                {"name": "regon_get_service_status", "description": long, "inputSchema": {"type": "object"}}
            ])),
        );
        assert_eq!(
            catalog.tools[0].description.chars().count(),
            MAX_DESCRIPTION_LENGTH + 3
        );
    }

    #[test]
    fn test_resolve_without_request_is_builtin() {
        let loader = ToolConfigLoader::new("/nonexistent/regon-config");
        let catalog = ToolCatalog::resolve(&loader, None);
        assert_eq!(catalog.len(), ToolName::ALL.len());
        assert!(!catalog.is_fallback());

        let catalog = ToolCatalog::resolve(&loader, Some("detailed"));
        assert!(catalog.is_fallback());
    }
}
