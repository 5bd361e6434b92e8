//! Core types: the closed tool set and typed tool arguments

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, ServerError};
use crate::validate::{validate, FieldType};

/// Upper bound on identifiers in a bulk search
pub const MAX_BULK_ITEMS: usize = 20;

/// Full reports available in BIR 1.1
pub const AVAILABLE_REPORTS: &[&str] = &[
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
    "BIR11TypPodmiotu",
];

/// Request envelope from a transport adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub name: String,
    /// Null or missing arguments normalize to an empty object
    #[serde(default, deserialize_with = "null_as_empty_object")]
    pub arguments: Map<String, Value>,
}

impl ToolRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Build from raw JSON-RPC / HTTP params, rejecting malformed envelopes
    pub fn from_params(params: &Value) -> Result<Self> {
        let name = match params.get("name") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            _ => {
                return Err(ServerError::validation(
                    "Tool name must be a non-empty string",
                ))
            }
        };
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(ServerError::validation("Arguments must be a JSON object")),
        };
        Ok(Self { name, arguments })
    }
}

fn null_as_empty_object<'de, D>(deserializer: D) -> std::result::Result<Map<String, Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// The closed set of tools this server exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolName {
    #[serde(rename = "regon_search_by_nip")]
    SearchByNip,
    #[serde(rename = "regon_search_by_regon")]
    SearchByRegon,
    #[serde(rename = "regon_search_by_krs")]
    SearchByKrs,
    #[serde(rename = "regon_search_multiple_nips")]
    SearchMultipleNips,
    #[serde(rename = "regon_search_multiple_regons9")]
    SearchMultipleRegons9,
    #[serde(rename = "regon_search_multiple_krs")]
    SearchMultipleKrs,
    #[serde(rename = "regon_get_full_report")]
    GetFullReport,
    #[serde(rename = "regon_get_service_status")]
    GetServiceStatus,
    #[serde(rename = "regon_get_data_status")]
    GetDataStatus,
    #[serde(rename = "regon_get_last_error_code")]
    GetLastErrorCode,
    #[serde(rename = "regon_get_last_error_message")]
    GetLastErrorMessage,
    #[serde(rename = "regon_get_session_status")]
    GetSessionStatus,
    #[serde(rename = "regon_get_available_operations")]
    GetAvailableOperations,
}

impl ToolName {
    pub const ALL: [ToolName; 13] = [
        ToolName::SearchByNip,
        ToolName::SearchByRegon,
        ToolName::SearchByKrs,
        ToolName::SearchMultipleNips,
        ToolName::SearchMultipleRegons9,
        ToolName::SearchMultipleKrs,
        ToolName::GetFullReport,
        ToolName::GetServiceStatus,
        ToolName::GetDataStatus,
        ToolName::GetLastErrorCode,
        ToolName::GetLastErrorMessage,
        ToolName::GetSessionStatus,
        ToolName::GetAvailableOperations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::SearchByNip => "regon_search_by_nip",
            ToolName::SearchByRegon => "regon_search_by_regon",
            ToolName::SearchByKrs => "regon_search_by_krs",
            ToolName::SearchMultipleNips => "regon_search_multiple_nips",
            ToolName::SearchMultipleRegons9 => "regon_search_multiple_regons9",
            ToolName::SearchMultipleKrs => "regon_search_multiple_krs",
            ToolName::GetFullReport => "regon_get_full_report",
            ToolName::GetServiceStatus => "regon_get_service_status",
            ToolName::GetDataStatus => "regon_get_data_status",
            ToolName::GetLastErrorCode => "regon_get_last_error_code",
            ToolName::GetLastErrorMessage => "regon_get_last_error_message",
            ToolName::GetSessionStatus => "regon_get_session_status",
            ToolName::GetAvailableOperations => "regon_get_available_operations",
        }
    }

    /// Operation label used to prefix upstream failures
    pub fn context(&self) -> &'static str {
        match self {
            ToolName::SearchByNip => "NIP search",
            ToolName::SearchByRegon => "REGON search",
            ToolName::SearchByKrs => "KRS search",
            ToolName::SearchMultipleNips => "Multiple NIP search",
            ToolName::SearchMultipleRegons9 => "Multiple REGON search",
            ToolName::SearchMultipleKrs => "Multiple KRS search",
            ToolName::GetFullReport => "Full report request",
            ToolName::GetServiceStatus => "Service status request",
            ToolName::GetDataStatus => "Data status request",
            ToolName::GetLastErrorCode => "Last error code request",
            ToolName::GetLastErrorMessage => "Last error message request",
            ToolName::GetSessionStatus => "Session status request",
            ToolName::GetAvailableOperations => "Available operations request",
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ToolName {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self> {
        ToolName::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| {
                ServerError::validation(format!("Unknown tool: {}", s)).with_detail("tool", s)
            })
    }
}

/// Kinds of registry identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Nip,
    Regon,
    Krs,
}

impl IdentifierKind {
    pub fn label(&self) -> &'static str {
        match self {
            IdentifierKind::Nip => "NIP",
            IdentifierKind::Regon => "REGON",
            IdentifierKind::Krs => "KRS",
        }
    }

    /// Accepted digit counts
    pub fn lengths(&self) -> &'static [usize] {
        match self {
            IdentifierKind::Nip | IdentifierKind::Krs => &[10],
            IdentifierKind::Regon => &[9, 14],
        }
    }

    /// Tool used for a single-identifier lookup of this kind
    pub fn search_tool(&self) -> ToolName {
        match self {
            IdentifierKind::Nip => ToolName::SearchByNip,
            IdentifierKind::Regon => ToolName::SearchByRegon,
            IdentifierKind::Krs => ToolName::SearchByKrs,
        }
    }

    /// Argument name carrying the identifier for [`IdentifierKind::search_tool`]
    pub fn argument(&self) -> &'static str {
        match self {
            IdentifierKind::Nip => "nip",
            IdentifierKind::Regon => "regon",
            IdentifierKind::Krs => "krs",
        }
    }

    fn shape_error(&self) -> ServerError {
        let message = match self {
            IdentifierKind::Nip => "NIP must be exactly 10 digits",
            IdentifierKind::Regon => "REGON must be 9 or 14 digits",
            IdentifierKind::Krs => "KRS must be exactly 10 digits",
        };
        ServerError::validation(message)
    }
}

impl std::str::FromStr for IdentifierKind {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "nip" => Ok(IdentifierKind::Nip),
            "regon" => Ok(IdentifierKind::Regon),
            "krs" => Ok(IdentifierKind::Krs),
            _ => Err(ServerError::validation(format!(
                "Unknown identifier kind: {}",
                s
            ))),
        }
    }
}

/// True when `value` is all ASCII digits with one of the given lengths
pub fn has_digit_shape(value: &str, lengths: &[usize]) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) && lengths.contains(&value.len())
}

/// Trim and check a single identifier
pub fn parse_identifier(kind: IdentifierKind, raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if has_digit_shape(trimmed, kind.lengths()) {
        Ok(trimmed.to_string())
    } else {
        Err(kind.shape_error())
    }
}

/// Filter a bulk identifier list.
///
/// More than [`MAX_BULK_ITEMS`] entries is an error. Malformed entries are
/// logged and skipped; an empty remainder is an error.
pub fn parse_identifier_batch(
    items: &[Value],
    lengths: &[usize],
    plural: &str,
    empty_message: &str,
) -> Result<Vec<String>> {
    if items.len() > MAX_BULK_ITEMS {
        return Err(ServerError::validation(format!(
            "Maximum {} {} allowed per request",
            MAX_BULK_ITEMS, plural
        ))
        .with_detail("limit", MAX_BULK_ITEMS)
        .with_detail("received", items.len()));
    }

    let mut valid = Vec::with_capacity(items.len());
    for item in items {
        let text = match item {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            other => {
                tracing::warn!("Skipping invalid {} entry: {}", plural, other);
                continue;
            }
        };
        if has_digit_shape(&text, lengths) {
            valid.push(text);
        } else {
            tracing::warn!("Skipping invalid {} entry: {}", plural, text);
        }
    }

    if valid.is_empty() {
        return Err(ServerError::validation(empty_message));
    }
    if valid.len() < items.len() {
        tracing::warn!(
            skipped = items.len() - valid.len(),
            kept = valid.len(),
            "Bulk search continues with valid {} only",
            plural
        );
    }
    Ok(valid)
}

/// A validated tool invocation with typed arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    SearchByNip { nip: String },
    SearchByRegon { regon: String },
    SearchByKrs { krs: String },
    SearchMultipleNips { nips: Vec<String> },
    SearchMultipleRegons9 { regons: Vec<String> },
    SearchMultipleKrs { krs_numbers: Vec<String> },
    GetFullReport { regon: String, report_name: String },
    GetServiceStatus,
    GetDataStatus,
    GetLastErrorCode,
    GetLastErrorMessage,
    GetSessionStatus,
    GetAvailableOperations,
}

impl ToolCall {
    /// Route a tool name and validate its arguments.
    ///
    /// Does no I/O: an `Err` here means the registry is never contacted.
    pub fn parse(name: &str, arguments: &Map<String, Value>) -> Result<Self> {
        let tool: ToolName = name.parse()?;
        Self::parse_tool(tool, arguments)
    }

    pub fn parse_tool(tool: ToolName, arguments: &Map<String, Value>) -> Result<Self> {
        let data = Value::Object(arguments.clone());
        let call = match tool {
            ToolName::SearchByNip => ToolCall::SearchByNip {
                nip: single(&data, "nip", IdentifierKind::Nip)?,
            },
            ToolName::SearchByRegon => ToolCall::SearchByRegon {
                regon: single(&data, "regon", IdentifierKind::Regon)?,
            },
            ToolName::SearchByKrs => ToolCall::SearchByKrs {
                krs: single(&data, "krs", IdentifierKind::Krs)?,
            },
            ToolName::SearchMultipleNips => ToolCall::SearchMultipleNips {
                nips: batch(&data, "nips", &[10], "NIPs", "No valid NIPs provided")?,
            },
            ToolName::SearchMultipleRegons9 => ToolCall::SearchMultipleRegons9 {
                regons: batch(
                    &data,
                    "regons",
                    &[9],
                    "REGONs",
                    "No valid 9-digit REGONs provided",
                )?,
            },
            ToolName::SearchMultipleKrs => ToolCall::SearchMultipleKrs {
                krs_numbers: batch(
                    &data,
                    "krs_numbers",
                    &[10],
                    "KRS numbers",
                    "No valid KRS numbers provided",
                )?,
            },
            ToolName::GetFullReport => {
                validate(
                    &data,
                    &["regon", "report_name"],
                    Some(&[
                        ("regon", FieldType::String),
                        ("report_name", FieldType::String),
                    ]),
                )?;
                let regon = parse_identifier(IdentifierKind::Regon, str_field(&data, "regon"))?;
                let report_name = str_field(&data, "report_name").trim().to_string();
                if !AVAILABLE_REPORTS.contains(&report_name.as_str()) {
                    return Err(ServerError::validation(format!(
                        "Invalid report name. Available: {}",
                        AVAILABLE_REPORTS.join(", ")
                    ))
                    .with_detail("report_name", report_name));
                }
                ToolCall::GetFullReport { regon, report_name }
            }
            ToolName::GetServiceStatus => ToolCall::GetServiceStatus,
            ToolName::GetDataStatus => ToolCall::GetDataStatus,
            ToolName::GetLastErrorCode => ToolCall::GetLastErrorCode,
            ToolName::GetLastErrorMessage => ToolCall::GetLastErrorMessage,
            ToolName::GetSessionStatus => ToolCall::GetSessionStatus,
            ToolName::GetAvailableOperations => ToolCall::GetAvailableOperations,
        };
        Ok(call)
    }

    pub fn tool(&self) -> ToolName {
        match self {
            ToolCall::SearchByNip { .. } => ToolName::SearchByNip,
            ToolCall::SearchByRegon { .. } => ToolName::SearchByRegon,
            ToolCall::SearchByKrs { .. } => ToolName::SearchByKrs,
            ToolCall::SearchMultipleNips { .. } => ToolName::SearchMultipleNips,
            ToolCall::SearchMultipleRegons9 { .. } => ToolName::SearchMultipleRegons9,
            ToolCall::SearchMultipleKrs { .. } => ToolName::SearchMultipleKrs,
            ToolCall::GetFullReport { .. } => ToolName::GetFullReport,
            ToolCall::GetServiceStatus => ToolName::GetServiceStatus,
            ToolCall::GetDataStatus => ToolName::GetDataStatus,
            ToolCall::GetLastErrorCode => ToolName::GetLastErrorCode,
            ToolCall::GetLastErrorMessage => ToolName::GetLastErrorMessage,
            ToolCall::GetSessionStatus => ToolName::GetSessionStatus,
            ToolCall::GetAvailableOperations => ToolName::GetAvailableOperations,
        }
    }
}

fn str_field<'a>(data: &'a Value, field: &str) -> &'a str {
    data.get(field).and_then(Value::as_str).unwrap_or_default()
}

fn single(data: &Value, field: &str, kind: IdentifierKind) -> Result<String> {
    validate(data, &[field], Some(&[(field, FieldType::String)]))?;
    parse_identifier(kind, str_field(data, field))
}

fn batch(
    data: &Value,
    field: &str,
    lengths: &[usize],
    plural: &str,
    empty_message: &str,
) -> Result<Vec<String>> {
    validate(data, &[field], Some(&[(field, FieldType::Array)]))?;
    let items = data
        .get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    parse_identifier_batch(items, lengths, plural, empty_message)
}
