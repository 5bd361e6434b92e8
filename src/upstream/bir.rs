//! GUS BIR 1.1 SOAP client

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::{json, Map, Value};

use super::{RegistryClient, SearchQuery};
use crate::error::{Result, ServerError};

pub const TEST_URL: &str = "https://wyszukiwarkaregontest.stat.gov.pl/wsBIR/UslugaBIRzewnPubl.svc";
pub const PRODUCTION_URL: &str =
    "https://wyszukiwarkaregon.stat.gov.pl/wsBIR/UslugaBIRzewnPubl.svc";

const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";
const PUBL_ACTION: &str = "http://CIS/BIR/PUBL/2014/07/IUslugaBIRzewnPubl";
const GET_VALUE_ACTION: &str = "http://CIS/BIR/2014/07/IUslugaBIR/GetValue";

/// Registry "entity not found" code inside a result record
const NOT_FOUND_CODE: &str = "4";

/// `KomunikatKod` after a call made without a live session
const SESSION_EXPIRED_CODE: i64 = 7;

const OPERATIONS: &[&str] = &[
    "Zaloguj",
    "Wyloguj",
    "DaneSzukajPodmioty",
    "DanePobierzPelnyRaport",
    "DanePobierzRaportZbiorczy",
    "GetValue",
];

static RESULT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(?:\w+:)?\w+Result>([^<]*)<").unwrap());
static RECORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<dane>(.*?)</dane>").unwrap());
static FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(\w+)>([^<]*)</\w+>|<(\w+)\s*/>").unwrap());

/// Which BIR deployment to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BirEnvironment {
    Test,
    Production,
}

impl BirEnvironment {
    pub fn url(&self) -> &'static str {
        match self {
            BirEnvironment::Test => TEST_URL,
            BirEnvironment::Production => PRODUCTION_URL,
        }
    }
}

/// BIR 1.1 client
pub struct BirClient {
    client: reqwest::Client,
    url: String,
    session: RwLock<Option<String>>,
    /// Key of the last successful login, for renewing an expired session
    api_key: RwLock<Option<String>>,
}

impl BirClient {
    pub fn new(environment: BirEnvironment, timeout: Duration) -> Result<Self> {
        Self::with_url(environment.url(), timeout)
    }

    /// Client for a custom endpoint
    pub fn with_url(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| {
                ServerError::configuration(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self {
            client,
            url: url.into(),
            session: RwLock::new(None),
            api_key: RwLock::new(None),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn has_session(&self) -> bool {
        self.session.read().is_some()
    }

    async fn call(&self, action: &str, body: &str) -> Result<String> {
        let envelope = envelope(&self.url, action, body);
        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(envelope);
        if let Some(sid) = self.session.read().clone() {
            request = request.header("sid", sid);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ServerError::api(format!("REGON service returned HTTP {}", status))
                .with_detail("status", status.as_u16()));
        }
        Ok(text)
    }

    async fn get_value(&self, parameter: &str) -> Result<String> {
        let body = format!(
            "<ns1:GetValue xmlns:ns1=\"http://CIS/BIR/2014/07\">\
             <ns1:pNazwaParametru>{}</ns1:pNazwaParametru></ns1:GetValue>",
            parameter
        );
        let response = self.call(GET_VALUE_ACTION, &body).await?;
        Ok(extract_result(&response).unwrap_or_default())
    }

    /// Run a search or report call.
    ///
    /// BIR answers with an empty result once the session has expired, so an
    /// empty answer is checked against `KomunikatKod`: an expired session is
    /// renewed and the call repeated once.
    async fn query(&self, action: &str, body: &str) -> Result<Vec<Value>> {
        let records = records_or_empty(&self.call(action, body).await?)?;
        if !records.is_empty() {
            return Ok(records);
        }

        let code = self.get_code("KomunikatKod").await?;
        if code != SESSION_EXPIRED_CODE {
            return Ok(records);
        }

        tracing::warn!("REGON session expired, logging in again");
        let api_key = self.api_key.read().clone().ok_or_else(|| {
            ServerError::api("REGON session expired and no API key is available")
                .with_detail("registry_code", code)
        })?;
        self.authenticate(&api_key).await?;
        records_or_empty(&self.call(action, body).await?)
    }

    async fn get_code(&self, parameter: &str) -> Result<i64> {
        let raw = self.get_value(parameter).await?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(0);
        }
        raw.parse().map_err(|_| {
            ServerError::api(format!("Unexpected value for {}: {}", parameter, raw))
        })
    }
}

impl std::fmt::Debug for BirClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BirClient")
            .field("url", &self.url)
            .field("has_session", &self.has_session())
            .finish()
    }
}

#[async_trait]
impl RegistryClient for BirClient {
    async fn authenticate(&self, api_key: &str) -> Result<()> {
        let body = format!(
            "<ns:Zaloguj><ns:pKluczUzytkownika>{}</ns:pKluczUzytkownika></ns:Zaloguj>",
            xml_escape(api_key)
        );
        let response = self.call(&format!("{}/Zaloguj", PUBL_ACTION), &body).await?;
        let sid = extract_result(&response).unwrap_or_default();
        if sid.trim().is_empty() {
            return Err(ServerError::api(
                "Authentication failed: the REGON service rejected the API key",
            ));
        }
        *self.session.write() = Some(sid.trim().to_string());
        *self.api_key.write() = Some(api_key.to_string());
        tracing::debug!("REGON session opened");
        Ok(())
    }

    async fn service_status(&self) -> Result<(i64, String)> {
        let code = self.get_code("StatusUslugi").await?;
        let message = self.get_value("KomunikatUslugi").await?;
        Ok((code, message))
    }

    async fn data_status(&self) -> Result<Value> {
        let date = self.get_value("StanDanych").await?;
        if date.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(json!({ "StanDanych": date }))
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Value>> {
        let (parameter, value) = query.parameter();
        let body = format!(
            "<ns:DaneSzukajPodmioty><ns:pParametryWyszukiwania>\
             <dat:{p}>{v}</dat:{p}></ns:pParametryWyszukiwania></ns:DaneSzukajPodmioty>",
            p = parameter,
            v = xml_escape(&value)
        );
        self.query(&format!("{}/DaneSzukajPodmioty", PUBL_ACTION), &body)
            .await
    }

    async fn full_report(&self, regon: &str, report_name: &str) -> Result<Vec<Value>> {
        let body = format!(
            "<ns:DanePobierzPelnyRaport><ns:pRegon>{}</ns:pRegon>\
             <ns:pNazwaRaportu>{}</ns:pNazwaRaportu></ns:DanePobierzPelnyRaport>",
            xml_escape(regon),
            xml_escape(report_name)
        );
        self.query(&format!("{}/DanePobierzPelnyRaport", PUBL_ACTION), &body)
            .await
    }

    async fn last_error(&self) -> Result<(i64, String)> {
        let code = self.get_code("KomunikatKod").await?;
        let message = self.get_value("KomunikatTresc").await?;
        Ok((code, message))
    }

    async fn operations(&self) -> Result<Vec<String>> {
        Ok(OPERATIONS.iter().map(|op| op.to_string()).collect())
    }
}

fn envelope(url: &str, action: &str, body: &str) -> String {
    format!(
        "<soap:Envelope xmlns:soap=\"http://www.w3.org/2003/05/soap-envelope\" \
         xmlns:ns=\"http://CIS/BIR/PUBL/2014/07\" \
         xmlns:dat=\"http://CIS/BIR/PUBL/2014/07/DataContract\">\
         <soap:Header xmlns:wsa=\"http://www.w3.org/2005/08/addressing\">\
         <wsa:To>{}</wsa:To><wsa:Action>{}</wsa:Action></soap:Header>\
         <soap:Body>{}</soap:Body></soap:Envelope>",
        url, action, body
    )
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn xml_unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#xD;", "\r")
        .replace("&#13;", "\r")
        .replace("&amp;", "&")
}

/// Unescaped text of the `...Result` element, if any
fn extract_result(response: &str) -> Option<String> {
    RESULT_RE
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| xml_unescape(m.as_str()))
}

/// Flat `<dane>` records of a result document
fn parse_records(document: &str) -> Vec<Value> {
    RECORD_RE
        .captures_iter(document)
        .filter_map(|c| c.get(1))
        .map(|record| {
            let mut fields = Map::new();
            for field in FIELD_RE.captures_iter(record.as_str()) {
                if let (Some(name), Some(value)) = (field.get(1), field.get(2)) {
                    fields.insert(
                        name.as_str().to_string(),
                        Value::String(xml_unescape(value.as_str()).trim().to_string()),
                    );
                } else if let Some(name) = field.get(3) {
                    fields.insert(name.as_str().to_string(), Value::String(String::new()));
                }
            }
            Value::Object(fields)
        })
        .collect()
}

/// Decode a search/report response, mapping the registry's error records
fn records_or_empty(response: &str) -> Result<Vec<Value>> {
    let document = match extract_result(response) {
        Some(doc) if !doc.trim().is_empty() => doc,
        _ => return Ok(Vec::new()),
    };
    let records = parse_records(&document);

    if let [only] = records.as_slice() {
        if let Some(code) = only.get("ErrorCode").and_then(Value::as_str) {
            if code == NOT_FOUND_CODE {
                return Ok(Vec::new());
            }
            let message = only
                .get("ErrorMessageEn")
                .or_else(|| only.get("ErrorMessagePl"))
                .and_then(Value::as_str)
                .unwrap_or("unknown registry error");
            return Err(ServerError::api(format!("REGON service error {}: {}", code, message))
                .with_detail("registry_code", code));
        }
    }
    Ok(records)
}
