//! Configuration for the proof generation service.
//!
//! Loaded from a TOML file. Values may reference environment variables with
//! `${VAR_NAME}`; references inside comments are left alone.

use anyhow::{Context, Result};
use proofgen_core::NetworkMode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network the anchors are tagged for
    #[serde(default)]
    pub network: NetworkConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Inbound work queue
    #[serde(default)]
    pub queue: QueueConfig,

    /// Fragment cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Proof expiry
    #[serde(default)]
    pub pruning: PruningConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// `mainnet` tags anchors `cal`/`btc`, `testnet` tags them `tcal`/`tbtc`
    #[serde(default)]
    pub mode: NetworkMode,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://proofgen.db")
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Work queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue name
    #[serde(default = "default_queue_name")]
    pub name: String,

    /// Maximum number of unacknowledged events in flight
    #[serde(default = "default_prefetch")]
    pub prefetch: usize,

    /// How often an empty queue is polled
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay between reconnect attempts
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            prefetch: default_prefetch(),
            poll_interval_ms: default_poll_interval_ms(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

impl QueueConfig {
    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reconnect delay as a duration.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// Fragment cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Consult the cache before the database
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Entry lifetime in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Entries kept before the oldest are evicted
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl_secs(),
            max_entries: default_cache_max_entries(),
        }
    }
}

/// Proof expiry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruningConfig {
    /// Minutes between pruning sweeps.
    ///
    /// **Must be > 0** - tokio::time::interval panics on a zero period.
    #[serde(default = "default_prune_interval_minutes")]
    pub interval_minutes: u64,

    /// Proofs older than this many minutes are deleted
    #[serde(default = "default_proof_expire_minutes")]
    pub proof_expire_minutes: u64,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_prune_interval_minutes(),
            proof_expire_minutes: default_proof_expire_minutes(),
        }
    }
}

impl PruningConfig {
    /// Sweep interval as a duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    /// Retention window as a duration.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.proof_expire_minutes * 60)
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

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_queue_name() -> String {
    "work.gen".to_string()
}

fn default_prefetch() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_cache_max_entries() -> usize {
    100_000
}

fn default_prune_interval_minutes() -> u64 {
    1
}

fn default_proof_expire_minutes() -> u64 {
    24 * 60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from a TOML file, expanding `${VAR}` references.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let expanded = expand_env_vars(&contents)?;

        let config: Config = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml).context("Failed to parse TOML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be > 0");
        }
        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot exceed max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.queue.name.trim().is_empty() {
            anyhow::bail!("Queue name cannot be empty");
        }
        if self.queue.prefetch == 0 {
            anyhow::bail!("Queue prefetch must be > 0");
        }
        if self.queue.poll_interval_ms == 0 {
            anyhow::bail!("Queue poll_interval_ms must be > 0");
        }
        if self.queue.reconnect_delay_secs == 0 {
            anyhow::bail!("Queue reconnect_delay_secs must be > 0");
        }

        if self.cache.enabled && self.cache.max_entries == 0 {
            anyhow::bail!("Cache max_entries must be > 0 when the cache is enabled");
        }

        if self.pruning.interval_minutes == 0 {
            anyhow::bail!("Pruning interval_minutes must be > 0 (tokio interval cannot be zero)");
        }
        if self.pruning.proof_expire_minutes == 0 {
            anyhow::bail!("Pruning proof_expire_minutes must be > 0");
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
}

/// Lexical position while scanning TOML for `${VAR}` references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Bare,
    Comment,
    Basic,
    Literal,
    MultiBasic,
    MultiLiteral,
}

/// Replace every `${VAR_NAME}` outside comments with the variable's value.
///
/// Quote tracking covers basic, literal and multi-line strings so that a `#`
/// inside a string is not mistaken for a comment.
fn expand_env_vars(input: &str) -> Result<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut state = Scan::Bare;
    let mut i = 0;

    let triple = |i: usize, q: char| chars.get(i..i + 3).is_some_and(|s| s.iter().all(|c| *c == q));

    while i < chars.len() {
        let ch = chars[i];

        match state {
            Scan::Comment => {
                if ch == '\n' {
                    state = Scan::Bare;
                }
                out.push(ch);
                i += 1;
                continue;
            }
            Scan::Bare if ch == '#' => {
                state = Scan::Comment;
                out.push(ch);
                i += 1;
                continue;
            }
            Scan::Bare if ch == '"' || ch == '\'' => {
                let (multi, single) = if ch == '"' {
                    (Scan::MultiBasic, Scan::Basic)
                } else {
                    (Scan::MultiLiteral, Scan::Literal)
                };
                if triple(i, ch) {
                    state = multi;
                    out.extend(&chars[i..i + 3]);
                    i += 3;
                } else {
                    state = single;
                    out.push(ch);
                    i += 1;
                }
                continue;
            }
            Scan::Basic | Scan::MultiBasic if ch == '\\' => {
                out.push(ch);
                if let Some(next) = chars.get(i + 1) {
                    out.push(*next);
                }
                i += 2;
                continue;
            }
            Scan::Basic if ch == '"' => state = Scan::Bare,
            Scan::Literal if ch == '\'' => state = Scan::Bare,
            Scan::MultiBasic | Scan::MultiLiteral => {
                let quote = if state == Scan::MultiBasic { '"' } else { '\'' };
                if triple(i, quote) {
                    state = Scan::Bare;
                    out.extend(&chars[i..i + 3]);
                    i += 3;
                    continue;
                }
            }
            _ => {}
        }

        if ch == '$' && chars.get(i + 1) == Some(&'{') {
            let start = i + 2;
            let Some(len) = chars[start..].iter().position(|c| *c == '}') else {
                anyhow::bail!("Unclosed environment variable placeholder at position {}", i);
            };
            let name: String = chars[start..start + len].iter().collect();
            if name.is_empty() {
                anyhow::bail!("Empty environment variable name at position {}", i);
            }
            let value = std::env::var(&name).with_context(|| {
                format!("Environment variable '{}' is not set (referenced at position {})", name, i)
            })?;
            out.push_str(&value);
            i = start + len + 1;
            continue;
        }

        out.push(ch);
        i += 1;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_example_config() {
        let toml = r#"
[network]
mode = "testnet"

[database]
url = "sqlite://proofgen.db"
max_connections = 5
min_connections = 1

[queue]
name = "work.gen"
prefetch = 4

[pruning]
interval_minutes = 1
proof_expire_minutes = 1440

[logging]
level = "info"
format = "json"
        "#;

        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.network.mode, NetworkMode::Testnet);
        assert_eq!(config.database.url, "sqlite://proofgen.db");
        assert_eq!(config.queue.prefetch, 4);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_default_values() {
        let toml = r#"
[database]
url = "sqlite://proofgen.db"
        "#;

        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.network.mode, NetworkMode::Mainnet);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.min_connections, 1);
        assert_eq!(config.queue.name, "work.gen");
        assert_eq!(config.queue.prefetch, 1);
        assert_eq!(config.queue.reconnect_delay(), Duration::from_secs(5));
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 86_400);
        assert_eq!(config.pruning.interval(), Duration::from_secs(60));
        assert_eq!(config.pruning.retention(), Duration::from_secs(86_400));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_validation_empty_database_url() {
        let toml = r#"
[database]
url = ""
        "#;

        let result = Config::from_toml_str(toml);
        assert!(result.unwrap_err().to_string().contains("Database URL"));
    }

    #[test]
    fn test_validation_zero_prefetch() {
        let toml = r#"
[database]
url = "sqlite://proofgen.db"

[queue]
prefetch = 0
        "#;

        let result = Config::from_toml_str(toml);
        assert!(result.unwrap_err().to_string().contains("prefetch"));
    }

    #[test]
    fn test_validation_zero_prune_interval() {
        let toml = r#"
[database]
url = "sqlite://proofgen.db"

[pruning]
interval_minutes = 0
        "#;

        let result = Config::from_toml_str(toml);
        assert!(result.unwrap_err().to_string().contains("interval_minutes"));
    }

    #[test]
    fn test_validation_min_exceeds_max_connections() {
        let toml = r#"
[database]
url = "sqlite://proofgen.db"
max_connections = 2
min_connections = 3
        "#;

        assert!(Config::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_validation_unknown_network_mode() {
        let toml = r#"
[network]
mode = "regtest"

[database]
url = "sqlite://proofgen.db"
        "#;

        assert!(Config::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_validation_log_format() {
        let toml = r#"
[database]
url = "sqlite://proofgen.db"

[logging]
format = "xml"
        "#;

        let result = Config::from_toml_str(toml);
        assert!(result.unwrap_err().to_string().contains("Logging format"));
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("PROOFGEN_TEST_DB", "sqlite://from-env.db");
        let expanded = expand_env_vars(r#"url = "${PROOFGEN_TEST_DB}""#).unwrap();
        assert_eq!(expanded, r#"url = "sqlite://from-env.db""#);
    }

    #[test]
    fn test_expand_env_vars_undefined() {
        let err = expand_env_vars("url = \"${PROOFGEN_TEST_UNDEFINED_VAR}\"").unwrap_err();
        assert!(err.to_string().contains("PROOFGEN_TEST_UNDEFINED_VAR"));
    }

    #[test]
    fn test_expand_env_vars_empty_and_unclosed() {
        assert!(expand_env_vars("url = \"${}\"").is_err());
        assert!(expand_env_vars("url = \"${OPEN").is_err());
    }

    #[test]
    fn test_expand_env_vars_ignore_comments() {
        let input = "# url = \"${PROOFGEN_TEST_NOT_SET}\"\nmode = \"mainnet\" # ${ALSO_NOT_SET}\n";
        assert_eq!(expand_env_vars(input).unwrap(), input);
    }

    #[test]
    fn test_expand_env_vars_hash_in_string() {
        std::env::set_var("PROOFGEN_TEST_NAME", "gen");
        let input = "name = \"work#${PROOFGEN_TEST_NAME}\" # trailing ${NOT_SET}";
        assert_eq!(
            expand_env_vars(input).unwrap(),
            "name = \"work#gen\" # trailing ${NOT_SET}"
        );
    }

    #[test]
    fn test_expand_env_vars_multiline_strings() {
        std::env::set_var("PROOFGEN_TEST_ML", "x");
        let input = "a = '''\n# not a comment ${PROOFGEN_TEST_ML}\n'''\nb = \"\"\"\"q\" ${PROOFGEN_TEST_ML}\"\"\"\n# ${NOT_SET}\n";
        let expanded = expand_env_vars(input).unwrap();
        assert!(expanded.contains("# not a comment x"));
        assert!(expanded.contains("\"q\" x"));
        assert!(expanded.ends_with("# ${NOT_SET}\n"));
    }

    #[test]
    fn test_config_from_file_with_env_vars() {
        std::env::set_var("PROOFGEN_TEST_FILE_DB", "sqlite://file.db");
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "# database url comes from ${{UNSET_IN_COMMENT}}\n[database]\nurl = \"${{PROOFGEN_TEST_FILE_DB}}\""
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.database.url, "sqlite://file.db");
    }
}
