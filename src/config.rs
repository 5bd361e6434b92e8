//! Server configuration: CLI/env arguments, logging, credentials and tool
//! configuration files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Result, ServerError};
use crate::sanitize::{sanitize_str, MAX_API_KEY_LENGTH};
use crate::upstream::BirEnvironment;

/// Public key for the GUS test environment
pub const PUBLIC_TEST_API_KEY: &str = "abcde12345abcde12345";

/// Tool configuration used when the requested one does not exist
pub const DEFAULT_TOOLS_CONFIG: &str = "detailed";

/// Operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Test,
    Production,
}

impl Mode {
    pub fn from_production_flag(production: bool) -> Self {
        if production {
            Mode::Production
        } else {
            Mode::Test
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Mode::Production)
    }

    pub fn environment(&self) -> BirEnvironment {
        match self {
            Mode::Test => BirEnvironment::Test,
            Mode::Production => BirEnvironment::Production,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Test => "test",
            Mode::Production => "production",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    #[value(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    /// `EnvFilter` directive for this level
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Arguments shared by both binaries
#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Use the production REGON service (requires API_KEY)
    #[arg(long, env = "REGON_PRODUCTION")]
    pub production: bool,

    /// Log level (RUST_LOG takes precedence when set)
    #[arg(
        long,
        env = "LOG_LEVEL",
        value_enum,
        ignore_case = true,
        default_value = "info"
    )]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Tool configuration name (loads <config-dir>/tools_<name>.json)
    #[arg(long, env = "TOOLS_CONFIG")]
    pub tools_config: Option<String>,

    /// Directory holding tool configuration files
    #[arg(long, env = "REGON_CONFIG_DIR", default_value = "config")]
    pub config_dir: String,

    /// Production API key
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Test environment API key
    #[arg(long, env = "TEST_API_KEY", hide_env_values = true)]
    pub test_api_key: Option<String>,

    /// Upstream request timeout in seconds
    #[arg(long, env = "REGON_TIMEOUT_SECS", default_value = "30")]
    pub timeout_secs: u64,
}

impl ServerArgs {
    pub fn mode(&self) -> Mode {
        Mode::from_production_flag(self.production)
    }

    /// Resolve the arguments into a server configuration.
    ///
    /// Fails when the mode requires credentials that are not available.
    pub fn into_config(self) -> Result<ServerConfig> {
        let mode = self.mode();
        let api_key = resolve_api_key(
            mode,
            self.api_key.as_deref(),
            self.test_api_key.as_deref(),
        )?;
        Ok(ServerConfig {
            mode,
            api_key,
            tools_config: self.tools_config.filter(|name| !name.trim().is_empty()),
            config_dir: PathBuf::from(shellexpand::tilde(&self.config_dir).to_string()),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
        })
    }
}

/// Resolved server configuration
#[derive(Clone)]
pub struct ServerConfig {
    pub mode: Mode,
    pub api_key: String,
    pub tools_config: Option<String>,
    pub config_dir: PathBuf,
    pub timeout: Duration,
}

impl ServerConfig {
    /// Test-mode configuration with the public key, no tool configuration
    pub fn for_tests() -> Self {
        Self {
            mode: Mode::Test,
            api_key: PUBLIC_TEST_API_KEY.to_string(),
            tools_config: None,
            config_dir: PathBuf::from("config"),
            timeout: Duration::from_secs(30),
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("mode", &self.mode)
            .field("api_key", &"<redacted>")
            .field("tools_config", &self.tools_config)
            .field("config_dir", &self.config_dir)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Pick the API key for the given mode.
///
/// Production prefers `api_key` and falls back to `test_api_key` with a
/// warning; without either it is a configuration error. Test mode prefers
/// `test_api_key`, then `api_key`, then the public test key.
pub fn resolve_api_key(
    mode: Mode,
    api_key: Option<&str>,
    test_api_key: Option<&str>,
) -> Result<String> {
    let api_key = api_key.map(str::trim).filter(|k| !k.is_empty());
    let test_api_key = test_api_key.map(str::trim).filter(|k| !k.is_empty());

    let key = match mode {
        Mode::Production => match (api_key, test_api_key) {
            (Some(key), _) => key.to_string(),
            (None, Some(key)) => {
                tracing::warn!("API_KEY not set in production mode, using TEST_API_KEY");
                key.to_string()
            }
            (None, None) => {
                return Err(ServerError::configuration(
                    "Production mode requires API_KEY environment variable",
                )
                .with_detail("mode", mode.as_str()))
            }
        },
        Mode::Test => match (test_api_key, api_key) {
            (Some(key), _) => key.to_string(),
            (None, Some(key)) => {
                tracing::info!("TEST_API_KEY not set, using API_KEY in test mode");
                key.to_string()
            }
            (None, None) => {
                tracing::warn!("No API key configured, using the public test key");
                PUBLIC_TEST_API_KEY.to_string()
            }
        },
    };
    Ok(sanitize_str(&key, MAX_API_KEY_LENGTH))
}

/// Install the global tracing subscriber.
///
/// Output goes to stderr so the stdio transport keeps stdout for protocol
/// messages. `RUST_LOG` overrides `level` when set.
pub fn init_logging(level: LogLevel, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));

    let (text, json) = match format {
        LogFormat::Text => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    // A subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .try_init();
}

/// A tool entry as it appears in a configuration file.
///
/// Fields stay untyped so malformed entries can be skipped one by one.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolConfigFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub tools: Vec<Value>,
}

/// Discovers and loads `tools_*.json` files from a directory
#[derive(Debug, Clone)]
pub struct ToolConfigLoader {
    dir: PathBuf,
    available: BTreeMap<String, PathBuf>,
}

impl ToolConfigLoader {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        let available = discover(&dir);
        tracing::info!(
            "Discovered tool configurations: {:?}",
            available.keys().collect::<Vec<_>>()
        );
        Self { dir, available }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names of the discovered configurations
    pub fn available(&self) -> Vec<String> {
        self.available.keys().cloned().collect()
    }

    /// Load the named configuration, falling back to [`DEFAULT_TOOLS_CONFIG`]
    /// when it does not exist. Returns the name actually loaded.
    pub fn load(&self, name: &str) -> Result<(String, ToolConfigFile)> {
        let (loaded_name, path) = match self.available.get(name) {
            Some(path) => (name.to_string(), path.clone()),
            None => {
                tracing::warn!(
                    "Config '{}' not found, falling back to '{}'",
                    name,
                    DEFAULT_TOOLS_CONFIG
                );
                let path = self.available.get(DEFAULT_TOOLS_CONFIG).ok_or_else(|| {
                    ServerError::configuration(format!(
                        "No tool configuration found for '{}' and no fallback available",
                        name
                    ))
                    .with_detail("config_dir", self.dir.display().to_string())
                })?;
                (DEFAULT_TOOLS_CONFIG.to_string(), path.clone())
            }
        };

        let raw = std::fs::read_to_string(&path).map_err(|e| {
            ServerError::configuration(format!(
                "Failed to read tool configuration {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: ToolConfigFile = serde_json::from_str(&raw).map_err(|e| {
            ServerError::configuration(format!(
                "Invalid JSON in tool configuration file {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::info!(
            config = %loaded_name,
            language = config.language.as_deref().unwrap_or("unknown"),
            tools = config.tools.len(),
            "Loaded tool configuration"
        );
        Ok((loaded_name, config))
    }
}

fn discover(dir: &Path) -> BTreeMap<String, PathBuf> {
    let mut configs = BTreeMap::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => {
            tracing::warn!("Config directory {} does not exist", dir.display());
            return configs;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(name) = file_name
            .strip_prefix("tools_")
            .and_then(|rest| rest.strip_suffix(".json"))
        {
            if !name.is_empty() {
                configs.insert(name.to_string(), path.clone());
            }
        }
    }
    configs
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::tempdir;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: ServerArgs,
    }

    #[test]
    fn test_production_requires_key() {
        let err = resolve_api_key(Mode::Production, None, None).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::Configuration);
        assert!(err.message().contains("API_KEY"));
    }

    #[test]
    fn test_production_falls_back_to_test_key() {
        let key = resolve_api_key(Mode::Production, Some("  "), Some("testkey")).unwrap();
        assert_eq!(key, "testkey");
        let key = resolve_api_key(Mode::Production, Some("prodkey"), Some("testkey")).unwrap();
        assert_eq!(key, "prodkey");
    }

    #[test]
    fn test_test_mode_key_order() {
        assert_eq!(
            resolve_api_key(Mode::Test, Some("prod"), Some("test")).unwrap(),
            "test"
        );
        assert_eq!(resolve_api_key(Mode::Test, Some("prod"), None).unwrap(), "prod");
        assert_eq!(
            resolve_api_key(Mode::Test, None, None).unwrap(),
            PUBLIC_TEST_API_KEY
        );
    }

    #[test]
    fn test_key_is_bounded() {
        let long = "k".repeat(300);
        let key = resolve_api_key(Mode::Test, None, Some(&long)).unwrap();
        assert_eq!(key.chars().count(), MAX_API_KEY_LENGTH + 3);
    }

    #[test]
    fn test_args_parse() {
        let cli = TestCli::try_parse_from([
            "regon-mcp",
            "--log-level",
            "DEBUG",
            "--tools-config",
            "minimal",
            "--test-api-key",
            "abc",
        ])
        .unwrap();
        assert_eq!(cli.args.log_level, LogLevel::Debug);
        assert_eq!(cli.args.mode(), Mode::Test);

        let config = cli.args.into_config().unwrap();
        assert_eq!(config.tools_config.as_deref(), Some("minimal"));
        assert_eq!(config.api_key, "abc");
        assert!(!format!("{:?}", config).contains("abc"));
    }

    #[test]
    fn test_warning_level_aliases() {
        let cli = TestCli::try_parse_from(["regon-mcp", "--log-level", "WARNING"]).unwrap();
        assert_eq!(cli.args.log_level.directive(), "warn");
    }

    #[test]
    fn test_loader_discovers_and_falls_back() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("tools_detailed.json"),
            r#"{"name": "REGON", "language": "en", "tools": []}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("other.json"), "{}").unwrap();

        let loader = ToolConfigLoader::new(dir.path());
        assert_eq!(loader.available(), vec!["detailed".to_string()]);

        let (name, config) = loader.load("polish").unwrap();
        assert_eq!(name, "detailed");
        assert_eq!(config.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_loader_errors() {
        let dir = tempdir().unwrap();
        let loader = ToolConfigLoader::new(dir.path().join("missing"));
        assert!(loader.load("detailed").is_err());

        std::fs::write(dir.path().join("tools_broken.json"), "{not json").unwrap();
        let loader = ToolConfigLoader::new(dir.path());
        let err = loader.load("broken").unwrap_err();
        assert!(err.message().contains("Invalid JSON"));
    }
}
