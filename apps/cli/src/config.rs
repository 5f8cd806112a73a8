//! CLI configuration loading and merging.
//!
//! Configuration precedence:
//! 1. CLI arguments (handled by clap)
//! 2. The TOML file passed with `--config`
//! 3. Library defaults (max message size, deadline, plaintext)

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tensorlink_core::ClientConfig;
use toml::{Table, Value};

/// Connection flags shared by every command.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct ConnectionArgs {
    /// Service host name or IP address
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Service port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Maximum message size in bytes (default 100 MiB)
    #[arg(long, global = true)]
    pub max_message_size: Option<usize>,

    /// Use TLS instead of plaintext
    #[arg(long, global = true)]
    pub tls: bool,

    /// Server name to verify when it differs from --host
    #[arg(long, global = true)]
    pub tls_domain: Option<String>,

    /// Deadline in seconds for each remote call
    #[arg(long = "deadline-secs", global = true)]
    pub default_deadline_secs: Option<u64>,
}

/// Optional `[predict]` section with model defaults.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
pub struct PredictDefaults {
    pub model: Option<String>,
    pub signature: Option<String>,
    pub input_name: Option<String>,
    pub version: Option<i64>,
}

/// Contents of a `--config` file.
///
/// Top-level keys are [`ClientConfig`] fields and may be partial, since flags
/// can fill in the rest.
#[derive(Debug, Default, Clone, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub predict: PredictDefaults,
    #[serde(flatten)]
    pub connection: Table,
}

impl FileConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid configuration file")
    }
}

/// Load the config file if one was given.
pub fn load(path: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    FileConfig::from_toml_str(&content)
}

fn integer<T: TryInto<i64>>(value: T) -> Value {
    Value::Integer(value.try_into().unwrap_or(i64::MAX))
}

/// Merge flags over the file into a client configuration.
pub fn resolve(args: &ConnectionArgs, file: &FileConfig) -> Result<ClientConfig> {
    let mut table = file.connection.clone();
    if let Some(host) = &args.host {
        table.insert("host".to_string(), Value::String(host.clone()));
    }
    if let Some(port) = args.port {
        table.insert("port".to_string(), integer(port));
    }
    if let Some(size) = args.max_message_size {
        table.insert("max_message_size".to_string(), integer(size));
    }
    if args.tls {
        table.insert("security".to_string(), Value::String("tls".to_string()));
    }
    if let Some(domain) = &args.tls_domain {
        table.insert("tls_domain".to_string(), Value::String(domain.clone()));
    }
    if let Some(secs) = args.default_deadline_secs {
        table.insert("default_deadline_ms".to_string(), integer(secs.saturating_mul(1000)));
    }

    if !table.contains_key("host") {
        bail!("No host configured. Pass --host or set `host` in the config file");
    }
    if !table.contains_key("port") {
        bail!("No port configured. Pass --port or set `port` in the config file");
    }

    let config: ClientConfig =
        Value::Table(table).try_into().context("Invalid connection settings")?;
    config.validate()?;
    Ok(config)
}
