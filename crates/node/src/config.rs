//! Configuration management for the miner.
//!
//! This module handles loading configuration from:
//! - TOML files, with `${VAR}` environment references expanded
//! - Command-line overrides (applied after the file)
//! - Default values (fallbacks)

use alloy_primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use zkminer_chain::Wallet;
use zkminer_core::ProofRequest;

use crate::handler::{FallbackPolicy, HandlerConfig};
use crate::scheduler::SchedulerConfig;

/// Main configuration for the miner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chain and subnet configuration
    pub network: NetworkConfig,

    /// Hotkey configuration
    #[serde(default)]
    pub wallet: WalletConfig,

    /// Request listener configuration
    #[serde(default)]
    pub axon: AxonConfig,

    /// Proof backend configuration
    pub prover: ProverConfig,

    /// Maintenance loop configuration
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// Self-update configuration
    #[serde(default)]
    pub update: UpdateConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chain and subnet configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Chain RPC endpoint
    pub chain_endpoint: String,

    /// SubnetRegistry contract address
    pub registry: Address,

    /// Subnet this miner serves
    pub netuid: u16,
}

/// Hotkey configuration. Exactly one of the fields must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Hex private key (usually `${MINER_PRIVATE_KEY}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    /// Path to a file holding the hex private key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
}

/// Request listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxonConfig {
    /// Bind address
    #[serde(default = "default_axon_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_axon_port")]
    pub port: u16,
}

impl Default for AxonConfig {
    fn default() -> Self {
        Self {
            host: default_axon_host(),
            port: default_axon_port(),
        }
    }
}

/// Behaviour when a request carries no public inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackKind {
    /// Answer with an error marker
    #[default]
    Reject,
    /// Draw a random entry from `corpus_path`
    Corpus,
}

/// Proof backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProverConfig {
    /// Prover executable
    pub command: String,

    /// Argument templates (`{model}`, `{input}`, `{proof}`, `{dir}`)
    #[serde(default)]
    pub args: Vec<String>,

    /// Models the prover accepts (empty = any)
    #[serde(default)]
    pub models: Vec<String>,

    /// Model used when a request does not name one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Deadline for a single proof request in seconds
    #[serde(default = "default_proof_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of concurrent proof sessions
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Missing-input policy
    #[serde(default)]
    pub fallback: FallbackKind,

    /// JSON array of default requests, required for `fallback = "corpus"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_path: Option<String>,

    /// Parent directory for per-session scratch dirs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<String>,
}

/// Maintenance loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Delay between ticks in milliseconds.
    ///
    /// **Must be > 0** - Zero will cause a panic in tokio::time::interval.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Self-update check cadence, in ticks
    #[serde(default = "default_update_every_ticks")]
    pub update_every_ticks: u64,

    /// Roster refresh cadence, in ticks
    #[serde(default = "default_refresh_every_ticks")]
    pub refresh_every_ticks: u64,

    /// Blocks between weight assignments
    #[serde(default = "default_weights_interval_blocks")]
    pub weights_interval_blocks: u64,

    /// Upper bound for a single maintenance action (chain call, update check)
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,

    /// How long shutdown waits for in-flight requests
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            update_every_ticks: default_update_every_ticks(),
            refresh_every_ticks: default_refresh_every_ticks(),
            weights_interval_blocks: default_weights_interval_blocks(),
            action_timeout_secs: default_action_timeout_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

/// Self-update configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Check for and apply updates from the upstream branch
    #[serde(default)]
    pub auto_update: bool,

    /// Git checkout the miner runs from
    #[serde(default = "default_repo_dir")]
    pub repo_dir: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            auto_update: false,
            repo_dir: default_repo_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// `--netuid`
    pub netuid: Option<u16>,
    /// `--axon-port`
    pub axon_port: Option<u16>,
    /// `--auto-update`
    pub auto_update: Option<bool>,
    /// `--chain-endpoint`
    pub chain_endpoint: Option<String>,
    /// `--wallet` (key file path)
    pub wallet: Option<String>,
}

// Default value functions
fn default_axon_host() -> String {
    "0.0.0.0".to_string()
}

fn default_axon_port() -> u16 {
    8091
}

fn default_model() -> String {
    "default".to_string()
}

fn default_proof_timeout_secs() -> u64 {
    120
}

fn default_max_concurrent() -> usize {
    2
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_update_every_ticks() -> u64 {
    10
}

fn default_refresh_every_ticks() -> u64 {
    5
}

fn default_weights_interval_blocks() -> u64 {
    100
}

fn default_action_timeout_secs() -> u64 {
    60
}

fn default_drain_timeout_secs() -> u64 {
    30
}

fn default_repo_dir() -> String {
    ".".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    ///
    /// Environment variables can be referenced using `${VAR_NAME}` syntax,
    /// e.g. `private_key = "${MINER_PRIVATE_KEY}"`. References inside comments
    /// are left alone.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_file_with_overrides(path, &Overrides::default())
    }

    /// Load a TOML file, apply command-line overrides, then validate.
    pub fn from_file_with_overrides<P: AsRef<Path>>(path: P, overrides: &Overrides) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let expanded = expand_env_vars(&contents)?;

        let mut config: Config = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.apply_overrides(overrides);
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml).context("Failed to parse TOML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Replace file values with the ones given on the command line.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(netuid) = overrides.netuid {
            self.network.netuid = netuid;
        }
        if let Some(port) = overrides.axon_port {
            self.axon.port = port;
        }
        if let Some(auto_update) = overrides.auto_update {
            self.update.auto_update = auto_update;
        }
        if let Some(endpoint) = &overrides.chain_endpoint {
            self.network.chain_endpoint = endpoint.clone();
        }
        if let Some(key_file) = &overrides.wallet {
            self.wallet.key_file = Some(key_file.clone());
            self.wallet.private_key = None;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.network.chain_endpoint.trim().is_empty() {
            anyhow::bail!("Network chain_endpoint cannot be empty");
        }
        if self.network.registry.is_zero() {
            anyhow::bail!("Network registry must be a non-zero address");
        }

        match (&self.wallet.private_key, &self.wallet.key_file) {
            (Some(_), Some(_)) => {
                anyhow::bail!("Wallet private_key and key_file are mutually exclusive")
            }
            (None, None) => anyhow::bail!("Wallet requires either private_key or key_file"),
            (Some(key), None) if key.trim().is_empty() => {
                anyhow::bail!("Wallet private_key cannot be empty")
            }
            _ => {}
        }

        if self.axon.host.parse::<std::net::IpAddr>().is_err() {
            anyhow::bail!("Axon host must be an IP address (got '{}')", self.axon.host);
        }

        if self.prover.command.trim().is_empty() {
            anyhow::bail!("Prover command cannot be empty");
        }
        if self.prover.default_model.trim().is_empty() {
            anyhow::bail!("Prover default_model cannot be empty");
        }
        if self.prover.timeout_secs == 0 {
            anyhow::bail!("Prover timeout_secs must be > 0");
        }
        if self.prover.max_concurrent == 0 {
            anyhow::bail!("Prover max_concurrent must be > 0");
        }
        if self.prover.fallback == FallbackKind::Corpus && self.prover.corpus_path.is_none() {
            anyhow::bail!("Prover fallback = \"corpus\" requires corpus_path");
        }

        let m = &self.maintenance;
        if m.tick_interval_ms == 0 {
            anyhow::bail!("Maintenance tick_interval_ms must be > 0 (tokio interval cannot be zero)");
        }
        if m.update_every_ticks == 0 || m.refresh_every_ticks == 0 {
            anyhow::bail!("Maintenance update_every_ticks and refresh_every_ticks must be > 0");
        }
        if m.weights_interval_blocks == 0 {
            anyhow::bail!("Maintenance weights_interval_blocks must be > 0");
        }
        if m.action_timeout_secs == 0 {
            anyhow::bail!("Maintenance action_timeout_secs must be > 0");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Logging level must be one of: {} (got '{}')",
                valid_levels.join(", "),
                self.logging.level
            );
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!(
                "Logging format must be one of: {} (got '{}')",
                valid_formats.join(", "),
                self.logging.format
            );
        }

        Ok(())
    }

    /// Load the hotkey described by `[wallet]`.
    pub fn load_wallet(&self) -> Result<Wallet> {
        match (&self.wallet.private_key, &self.wallet.key_file) {
            (Some(key), None) => Wallet::from_hex(key).context("Invalid wallet private_key"),
            (None, Some(path)) => Wallet::from_key_file(path),
            _ => anyhow::bail!("Wallet requires exactly one of private_key or key_file"),
        }
    }

    /// Listener bind address.
    pub fn bind_addr(&self) -> Result<std::net::SocketAddr> {
        let ip: std::net::IpAddr = self
            .axon
            .host
            .parse()
            .with_context(|| format!("Invalid axon host: {}", self.axon.host))?;
        Ok(std::net::SocketAddr::new(ip, self.axon.port))
    }

    /// Request handler settings.
    pub fn handler_config(&self) -> HandlerConfig {
        HandlerConfig {
            default_model: self.prover.default_model.clone(),
            proof_timeout: Duration::from_secs(self.prover.timeout_secs),
            max_concurrent: self.prover.max_concurrent,
        }
    }

    /// Maintenance scheduler settings.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            netuid: self.network.netuid,
            update_every_ticks: self.maintenance.update_every_ticks,
            refresh_every_ticks: self.maintenance.refresh_every_ticks,
            weights_interval_blocks: self.maintenance.weights_interval_blocks,
            action_timeout: Duration::from_secs(self.maintenance.action_timeout_secs),
            auto_update: self.update.auto_update,
        }
    }

    /// Build the missing-input policy, reading the corpus file if needed.
    pub fn fallback_policy(&self) -> Result<FallbackPolicy> {
        match self.prover.fallback {
            FallbackKind::Reject => Ok(FallbackPolicy::Reject),
            FallbackKind::Corpus => {
                let path = self
                    .prover
                    .corpus_path
                    .as_deref()
                    .context("fallback = \"corpus\" requires corpus_path")?;
                load_corpus(path)
            }
        }
    }

    /// Scratch root for prover sessions.
    pub fn scratch_dir(&self) -> Option<PathBuf> {
        self.prover.scratch_dir.as_ref().map(PathBuf::from)
    }
}

/// Read a corpus file: a JSON array of requests, each carrying `public_inputs`.
pub fn load_corpus<P: AsRef<Path>>(path: P) -> Result<FallbackPolicy> {
    let path = path.as_ref();
    let contents = std::fs::read(path)
        .with_context(|| format!("Failed to read corpus file: {}", path.display()))?;
    let entries: Vec<ProofRequest> = serde_json::from_slice(&contents)
        .with_context(|| format!("Failed to parse corpus file: {}", path.display()))?;

    if entries.is_empty() {
        anyhow::bail!("Corpus file {} has no entries", path.display());
    }
    if let Some(pos) = entries.iter().position(|e| e.public_inputs.is_none()) {
        anyhow::bail!(
            "Corpus entry {} in {} has no public_inputs",
            pos,
            path.display()
        );
    }

    Ok(FallbackPolicy::Corpus(entries))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Basic,
    Literal,
    MultiBasic,
    MultiLiteral,
}

/// Expand `${VAR_NAME}` references with values from the environment.
///
/// References are expanded in values and inside every TOML string kind, but
/// not inside comments. An unset variable, an empty name, or a missing `}` is
/// an error.
fn expand_env_vars(input: &str) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    let mut quote = Quote::None;
    let mut in_comment = false;

    while let Some((pos, ch)) = chars.next() {
        if in_comment {
            if ch == '\n' {
                in_comment = false;
            }
            out.push(ch);
            continue;
        }

        match ch {
            '\\' if matches!(quote, Quote::Basic | Quote::MultiBasic) => {
                out.push(ch);
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
            }
            '"' | '\'' => {
                let triple = input[pos..].starts_with(if ch == '"' { "\"\"\"" } else { "'''" });
                let (single, multi) = if ch == '"' {
                    (Quote::Basic, Quote::MultiBasic)
                } else {
                    (Quote::Literal, Quote::MultiLiteral)
                };

                if triple && (quote == Quote::None || quote == multi) {
                    quote = if quote == multi { Quote::None } else { multi };
                    out.push_str(&input[pos..pos + 3]);
                    chars.next();
                    chars.next();
                } else if quote == Quote::None {
                    quote = single;
                    out.push(ch);
                } else if quote == single {
                    quote = Quote::None;
                    out.push(ch);
                } else {
                    out.push(ch);
                }
            }
            '#' if quote == Quote::None => {
                in_comment = true;
                out.push(ch);
            }
            '\n' => {
                // Single-line strings cannot span lines.
                if matches!(quote, Quote::Basic | Quote::Literal) {
                    quote = Quote::None;
                }
                out.push(ch);
            }
            '$' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }

                if !closed {
                    anyhow::bail!("Unclosed environment variable placeholder at position {}", pos);
                }
                if name.is_empty() {
                    anyhow::bail!("Empty environment variable name at position {}", pos);
                }

                let value = std::env::var(&name).with_context(|| {
                    format!(
                        "Environment variable '{}' is not set (referenced at position {})",
                        name, pos
                    )
                })?;
                out.push_str(&value);
            }
            _ => out.push(ch),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn example_toml() -> String {
        format!(
            r#"
[network]
chain_endpoint = "http://127.0.0.1:8545"
registry = "0x1111111111111111111111111111111111111111"
netuid = 2

[wallet]
private_key = "{KEY}"

[axon]
port = 9000

[prover]
command = "ezkl"
args = ["prove", "--witness", "{{input}}", "--proof-path", "{{proof}}"]
default_model = "sqrt"

[logging]
level = "info"
format = "json"
"#
        )
    }

    #[test]
    fn test_load_example_config() {
        let config = Config::from_toml_str(&example_toml()).unwrap();
        assert_eq!(config.network.netuid, 2);
        assert_eq!(config.axon.port, 9000);
        assert_eq!(config.axon.host, "0.0.0.0");
        assert_eq!(config.prover.args[2], "{input}");
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_default_values() {
        let config = Config::from_toml_str(&example_toml()).unwrap();
        assert_eq!(config.maintenance.tick_interval_ms, 1000);
        assert_eq!(config.maintenance.update_every_ticks, 10);
        assert_eq!(config.maintenance.refresh_every_ticks, 5);
        assert_eq!(config.maintenance.weights_interval_blocks, 100);
        assert_eq!(config.prover.timeout_secs, 120);
        assert_eq!(config.prover.max_concurrent, 2);
        assert_eq!(config.prover.fallback, FallbackKind::Reject);
        assert!(!config.update.auto_update);
    }

    #[test]
    fn test_validation_zero_registry() {
        let toml = example_toml().replace(
            "0x1111111111111111111111111111111111111111",
            "0x0000000000000000000000000000000000000000",
        );
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("registry"));
    }

    #[test]
    fn test_validation_wallet_requires_one_source() {
        let toml = example_toml().replace(&format!("private_key = \"{KEY}\""), "");
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("private_key or key_file"));

        let toml = example_toml().replace(
            &format!("private_key = \"{KEY}\""),
            &format!("private_key = \"{KEY}\"\nkey_file = \"/tmp/hotkey\""),
        );
        assert!(Config::from_toml_str(&toml).is_err());
    }

    #[test]
    fn test_validation_zero_tick_interval() {
        let toml = format!("{}\n[maintenance]\ntick_interval_ms = 0\n", example_toml());
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("tick_interval_ms"));
    }

    #[test]
    fn test_validation_corpus_requires_path() {
        let toml = example_toml().replace(
            "default_model = \"sqrt\"",
            "default_model = \"sqrt\"\nfallback = \"corpus\"",
        );
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("corpus_path"));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = Config::from_toml_str(&example_toml()).unwrap();
        config.apply_overrides(&Overrides {
            netuid: Some(9),
            axon_port: Some(7000),
            auto_update: Some(true),
            chain_endpoint: Some("http://node:8545".to_string()),
            wallet: Some("/keys/hotkey".to_string()),
        });

        assert_eq!(config.network.netuid, 9);
        assert_eq!(config.axon.port, 7000);
        assert!(config.update.auto_update);
        assert_eq!(config.network.chain_endpoint, "http://node:8545");
        assert_eq!(config.wallet.key_file.as_deref(), Some("/keys/hotkey"));
        assert!(config.wallet.private_key.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_load_wallet_from_private_key() {
        let config = Config::from_toml_str(&example_toml()).unwrap();
        let wallet = config.load_wallet().unwrap();
        assert_eq!(
            wallet.address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
                .parse::<Address>()
                .unwrap()
        );
    }

    #[test]
    fn test_from_file_expands_env_and_applies_overrides() {
        std::env::set_var("ZKMINER_TEST_KEY", KEY);
        let toml = example_toml().replace(KEY, "${ZKMINER_TEST_KEY}");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml.as_bytes()).unwrap();

        let config = Config::from_file_with_overrides(
            file.path(),
            &Overrides {
                axon_port: Some(1234),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(config.wallet.private_key.as_deref(), Some(KEY));
        assert_eq!(config.axon.port, 1234);
        assert_eq!(config.bind_addr().unwrap().port(), 1234);

        std::env::remove_var("ZKMINER_TEST_KEY");
    }

    #[test]
    fn test_load_corpus() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"[{"model_id":"sqrt","public_inputs":[16]},{"public_inputs":[25]}]"#)
            .unwrap();

        match load_corpus(file.path()).unwrap() {
            FallbackPolicy::Corpus(entries) => assert_eq!(entries.len(), 2),
            FallbackPolicy::Reject => panic!("expected corpus policy"),
        }
    }

    #[test]
    fn test_load_corpus_rejects_entry_without_inputs() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"[{"model_id":"sqrt"}]"#).unwrap();
        assert!(load_corpus(file.path()).is_err());

        let mut empty = tempfile::NamedTempFile::new().unwrap();
        empty.write_all(b"[]").unwrap();
        assert!(load_corpus(empty.path()).is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("ZKMINER_EXPAND_A", "alpha");
        let result = expand_env_vars("key = \"${ZKMINER_EXPAND_A}\"\nbare = ${ZKMINER_EXPAND_A}").unwrap();
        assert_eq!(result, "key = \"alpha\"\nbare = alpha");
        std::env::remove_var("ZKMINER_EXPAND_A");
    }

    #[test]
    fn test_expand_env_vars_errors() {
        assert!(expand_env_vars("key = \"${ZKMINER_DEFINITELY_UNSET}\"").is_err());
        assert!(expand_env_vars("key = \"${}\"").is_err());
        assert!(expand_env_vars("key = \"${UNCLOSED").is_err());
    }

    #[test]
    fn test_expand_env_vars_skips_comments_but_not_strings() {
        std::env::set_var("ZKMINER_EXPAND_B", "beta");
        let input = r#"
# example: key = "${NOT_EXPANDED}"
url = "https://host/#${ZKMINER_EXPAND_B}"  # trailing ${ALSO_NOT_EXPANDED}
lit = 'has # and ${ZKMINER_EXPAND_B}'
"#;
        let result = expand_env_vars(input).unwrap();
        assert!(result.contains("${NOT_EXPANDED}"));
        assert!(result.contains("https://host/#beta"));
        assert!(result.contains("${ALSO_NOT_EXPANDED}"));
        assert!(result.contains("'has # and beta'"));
        std::env::remove_var("ZKMINER_EXPAND_B");
    }

    #[test]
    fn test_expand_env_vars_multiline_strings() {
        let input = "description = '''\nIt's fine\n'''\n# Comment with ${UNDEFINED_VAR}\n";
        let result = expand_env_vars(input).unwrap();
        assert!(result.contains("It's fine"));
        assert!(result.contains("${UNDEFINED_VAR}"));

        let input = "text = \"\"\"\nsay \\\"hi\\\" # not a comment\n\"\"\"\n";
        assert_eq!(expand_env_vars(input).unwrap(), input);
    }
}
