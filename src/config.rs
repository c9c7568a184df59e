//! Configuration
//!
//! Settings are layered: built-in defaults, then an optional JSON file, then
//! `ROOMLINK_*` environment variables, then command-line flags. Later layers
//! win field by field.

use std::path::{Path, PathBuf};
use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::ids::MAX_ACTOR_ID;

/// Environment variable overriding the port.
pub const ENV_PORT: &str = "ROOMLINK_PORT";
/// Environment variable overriding the shared key.
pub const ENV_KEY: &str = "ROOMLINK_KEY";
/// Environment variable overriding the bind host (server) or address (client).
pub const ENV_HOST: &str = "ROOMLINK_HOST";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Config file is not valid JSON for this config.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },

    /// Environment variable holds an unusable value.
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Offending value
        value: String,
    },

    /// A setting is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn env_port<F>(lookup: &F) -> Result<Option<u16>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(ENV_PORT) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var: ENV_PORT, value }),
        None => Ok(None),
    }
}

fn system_env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

// =============================================================================
// SERVER
// =============================================================================

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Shared connect key.
    pub key: String,
    /// Dispatch and pose broadcast rate (Hz).
    pub tick_rate: u32,
    /// Maximum simultaneous connections.
    pub max_connections: usize,
    /// Per-peer outbound message queue length.
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 11010,
            key: "roomlink".to_string(),
            tick_rate: 20,
            max_connections: 1000,
            outbound_queue: 256,
        }
    }
}

/// Server command-line arguments.
///
/// CLI values override settings from the config file and environment.
#[derive(Parser, Debug, Default)]
#[command(name = "roomlink-server", version, about = "Room and object relay server")]
pub struct ServerArgs {
    /// Path to a JSON config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Bind host.
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Shared connect key.
    #[arg(long)]
    pub key: Option<String>,

    /// Tick rate (Hz).
    #[arg(long)]
    pub tick_rate: Option<u32>,

    /// Maximum simultaneous connections.
    #[arg(long)]
    pub max_connections: Option<usize>,
}

impl ServerConfig {
    /// Build the effective config from every layer.
    pub fn load(args: &ServerArgs) -> Result<Self, ConfigError> {
        Self::load_with_env(args, system_env)
    }

    /// `load` with an explicit environment lookup.
    pub fn load_with_env<F>(args: &ServerArgs, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &args.config {
            Some(path) => read_json(path)?,
            None => Self::default(),
        };
        config.apply_env(&lookup)?;
        config.apply_cli_overrides(args);
        config.validate()?;
        Ok(config)
    }

    /// Apply `ROOMLINK_*` variables.
    pub fn apply_env<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = env_port(lookup)? {
            self.port = port;
        }
        if let Some(key) = lookup(ENV_KEY) {
            self.key = key;
        }
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        Ok(())
    }

    /// Apply CLI overrides.
    pub fn apply_cli_overrides(&mut self, args: &ServerArgs) {
        if let Some(ref host) = args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(ref key) = args.key {
            self.key = key.clone();
        }
        if let Some(rate) = args.tick_rate {
            self.tick_rate = rate;
        }
        if let Some(max) = args.max_connections {
            self.max_connections = max;
        }
    }

    /// Reject unusable settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key.is_empty() {
            return Err(ConfigError::Invalid("key must not be empty".into()));
        }
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("tick_rate must be at least 1".into()));
        }
        if self.max_connections == 0 || self.max_connections > MAX_ACTOR_ID as usize {
            return Err(ConfigError::Invalid(format!(
                "max_connections must be in 1..={}",
                MAX_ACTOR_ID
            )));
        }
        if self.outbound_queue == 0 {
            return Err(ConfigError::Invalid("outbound_queue must be at least 1".into()));
        }
        Ok(())
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// Client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address.
    pub address: String,
    /// Server port.
    pub port: u16,
    /// Shared connect key.
    pub key: String,
    /// Dispatch and pose update rate (Hz).
    pub tick_rate: u32,
    /// Display name used when joining.
    pub user_name: String,
    /// Room to join.
    pub room: String,
    /// Outbound message queue length.
    pub outbound_queue: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 11010,
            key: "roomlink".to_string(),
            tick_rate: 20,
            user_name: "player".to_string(),
            room: "lobby".to_string(),
            outbound_queue: 256,
        }
    }
}

/// Client command-line arguments.
#[derive(Parser, Debug, Default)]
#[command(name = "roomlink-client", version, about = "Headless room client")]
pub struct ClientArgs {
    /// Path to a JSON config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Server address.
    #[arg(long)]
    pub address: Option<String>,

    /// Server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Shared connect key.
    #[arg(long)]
    pub key: Option<String>,

    /// Tick rate (Hz).
    #[arg(long)]
    pub tick_rate: Option<u32>,

    /// Display name.
    #[arg(long)]
    pub user: Option<String>,

    /// Room to join.
    #[arg(long)]
    pub room: Option<String>,
}

impl ClientConfig {
    /// Build the effective config from every layer.
    pub fn load(args: &ClientArgs) -> Result<Self, ConfigError> {
        Self::load_with_env(args, system_env)
    }

    /// `load` with an explicit environment lookup.
    pub fn load_with_env<F>(args: &ClientArgs, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &args.config {
            Some(path) => read_json(path)?,
            None => Self::default(),
        };
        config.apply_env(&lookup)?;
        config.apply_cli_overrides(args);
        config.validate()?;
        Ok(config)
    }

    /// Apply `ROOMLINK_*` variables.
    pub fn apply_env<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = env_port(lookup)? {
            self.port = port;
        }
        if let Some(key) = lookup(ENV_KEY) {
            self.key = key;
        }
        if let Some(address) = lookup(ENV_HOST) {
            self.address = address;
        }
        Ok(())
    }

    /// Apply CLI overrides.
    pub fn apply_cli_overrides(&mut self, args: &ClientArgs) {
        if let Some(ref address) = args.address {
            self.address = address.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(ref key) = args.key {
            self.key = key.clone();
        }
        if let Some(rate) = args.tick_rate {
            self.tick_rate = rate;
        }
        if let Some(ref user) = args.user {
            self.user_name = user.clone();
        }
        if let Some(ref room) = args.room {
            self.room = room.clone();
        }
    }

    /// Reject unusable settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must not be 0".into()));
        }
        if self.key.is_empty() {
            return Err(ConfigError::Invalid("key must not be empty".into()));
        }
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("tick_rate must be at least 1".into()));
        }
        if self.outbound_queue == 0 {
            return Err(ConfigError::Invalid("outbound_queue must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |var| map.get(var).cloned()
    }

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("roomlink-{}-{}.json", name, std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(ServerConfig::default().validate().is_ok());
        assert!(ClientConfig::default().validate().is_ok());
        assert_eq!(ServerConfig::default().port, 11010);
    }

    #[test]
    fn test_cli_override() {
        let mut config = ServerConfig::default();
        let args = ServerArgs {
            port: Some(9000),
            key: Some("LiteKey".to_string()),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.port, 9000);
        assert_eq!(config.key, "LiteKey");
        // Non-overridden fields retain defaults
        assert_eq!(config.tick_rate, 20);
    }

    #[test]
    fn test_env_then_cli_precedence() {
        let args = ServerArgs { port: Some(7000), ..Default::default() };
        let config = ServerConfig::load_with_env(
            &args,
            env(&[(ENV_PORT, "6000"), (ENV_KEY, "from-env")]),
        )
        .unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.key, "from-env");
    }

    #[test]
    fn test_bad_env_port() {
        let result = ServerConfig::load_with_env(&ServerArgs::default(), env(&[(ENV_PORT, "nope")]));
        assert!(matches!(result, Err(ConfigError::InvalidEnv { var: ENV_PORT, .. })));
    }

    #[test]
    fn test_file_layer_with_partial_fields() {
        let path = temp_file("server", r#"{ "port": 12000, "tick_rate": 30 }"#);
        let args = ServerArgs { config: Some(path.clone()), ..Default::default() };
        let config = ServerConfig::load_with_env(&args, env(&[])).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.port, 12000);
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.key, "roomlink");
    }

    #[test]
    fn test_missing_and_malformed_file() {
        let args = ServerArgs {
            config: Some(PathBuf::from("/definitely/not/here.json")),
            ..Default::default()
        };
        assert!(matches!(
            ServerConfig::load_with_env(&args, env(&[])),
            Err(ConfigError::Io { .. })
        ));

        let path = temp_file("broken", "{ port: ");
        let args = ClientArgs { config: Some(path.clone()), ..Default::default() };
        let result = ClientConfig::load_with_env(&args, env(&[]));
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validation() {
        let config = ServerConfig { tick_rate: 0, ..ServerConfig::default() };
        assert!(config.validate().is_err());
        let config = ServerConfig { key: String::new(), ..ServerConfig::default() };
        assert!(config.validate().is_err());
        let config = ServerConfig { max_connections: usize::MAX, ..ServerConfig::default() };
        assert!(config.validate().is_err());
        let config = ClientConfig { port: 0, ..ClientConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_client_layers() {
        let args = ClientArgs {
            user: Some("alice".to_string()),
            room: Some("R".to_string()),
            ..Default::default()
        };
        let config = ClientConfig::load_with_env(&args, env(&[(ENV_HOST, "10.0.0.5")])).unwrap();
        assert_eq!(config.address, "10.0.0.5");
        assert_eq!(config.user_name, "alice");
        assert_eq!(config.room, "R");
    }

    #[test]
    fn test_args_parse() {
        let args = ServerArgs::try_parse_from(["roomlink-server", "--port", "5000", "--key", "k"]).unwrap();
        assert_eq!(args.port, Some(5000));
        assert_eq!(args.key.as_deref(), Some("k"));
    }
}
