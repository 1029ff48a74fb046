//! Configuration management
//!
//! Settings are resolved in this order (later wins):
//! 1. Built-in defaults
//! 2. `guestpilot.toml` in the working directory
//! 3. Environment variables
//!
//! Inside the TOML file, `${VAR_NAME}` is replaced by the value of the
//! environment variable before parsing.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Error;

/// Default config file name looked up by [`Config::load`]
pub const CONFIG_FILE_NAME: &str = "guestpilot.toml";

/// Prefix of environment variables holding credentials
pub const CREDENTIAL_ENV_PREFIX: &str = "GP_CREDENTIAL_";

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key
    #[serde(default)]
    pub api_key: String,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL (optional, for custom endpoints)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Maximum output tokens per model turn
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            base_url: None,
            max_tokens: default_max_tokens(),
        }
    }
}

/// Worker connection and per-method timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Path of the socket (or serial device node) the worker listens on
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Timeout of the health probe sent right after connecting
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Timeout for methods without a specific override
    #[serde(default = "default_call_timeout")]
    pub default_timeout_secs: u64,

    /// Timeout for screen capture
    #[serde(default = "default_observation_timeout")]
    pub observation_timeout_secs: u64,

    /// Timeout for typing long text
    #[serde(default = "default_text_entry_timeout")]
    pub text_entry_timeout_secs: u64,

    /// Timeout for shell commands
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Pause before retrying after an empty read
    #[serde(default = "default_idle_backoff")]
    pub idle_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            probe_timeout_secs: default_probe_timeout(),
            default_timeout_secs: default_call_timeout(),
            observation_timeout_secs: default_observation_timeout(),
            text_entry_timeout_secs: default_text_entry_timeout(),
            command_timeout_secs: default_command_timeout(),
            idle_backoff_ms: default_idle_backoff(),
        }
    }
}

/// Sub-worker runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Iteration bound of a single sub-worker loop
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Wall-clock limit for one sub-worker
    #[serde(default = "default_agent_timeout")]
    pub default_timeout_secs: u64,

    /// Concurrent waits when awaiting several sub-workers at once
    #[serde(default = "default_max_concurrent_waits")]
    pub max_concurrent_waits: usize,

    /// A final report shorter than this is always re-requested
    #[serde(default = "default_min_report_chars")]
    pub min_report_chars: usize,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            default_timeout_secs: default_agent_timeout(),
            max_concurrent_waits: default_max_concurrent_waits(),
            min_report_chars: default_min_report_chars(),
        }
    }
}

/// Side-effect policies
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Ask for approval before every shell command
    #[serde(default)]
    pub confirm_commands: bool,
}

/// Plugin tool (MCP) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// Path to MCP configuration file (JSON format)
    #[serde(default)]
    pub config_path: Option<String>,

    /// Whether MCP integration is enabled
    #[serde(default = "default_mcp_enabled")]
    pub enabled: bool,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            enabled: default_mcp_enabled(),
        }
    }
}

/// Main configuration for guestpilot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub agents: AgentsConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub mcp: McpConfig,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u64 {
    4096
}

fn default_socket_path() -> String {
    "/run/guestpilot/worker.sock".to_string()
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_call_timeout() -> u64 {
    30
}

fn default_observation_timeout() -> u64 {
    60
}

fn default_text_entry_timeout() -> u64 {
    300
}

fn default_command_timeout() -> u64 {
    90
}

fn default_idle_backoff() -> u64 {
    50
}

fn default_max_iterations() -> usize {
    10
}

fn default_agent_timeout() -> u64 {
    900
}

fn default_max_concurrent_waits() -> usize {
    8
}

fn default_min_report_chars() -> usize {
    40
}

fn default_mcp_enabled() -> bool {
    true
}

impl Config {
    /// Replace `${VAR_NAME}` with the value of the environment variable.
    ///
    /// Unset variables expand to an empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::with_capacity(value.len());
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Parse configuration from TOML text (after env expansion)
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded = Self::expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from a TOML file, then apply env overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&content)?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Load from `./guestpilot.toml` if present, otherwise from the environment
    pub fn load() -> crate::Result<Self> {
        if Path::new(CONFIG_FILE_NAME).exists() {
            return Self::from_toml_file(CONFIG_FILE_NAME);
        }
        Ok(Self::from_env())
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg
    }

    fn apply_env_overrides(&mut self) {
        if let Some(key) = non_empty_env("LLM_API_KEY") {
            self.llm.api_key = key;
        }
        if let Some(model) = non_empty_env("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(base_url) = non_empty_env("LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }

        if let Some(path) = non_empty_env("GP_WORKER_SOCKET") {
            self.worker.socket_path = path;
        }

        if let Some(n) = non_empty_env("GP_MAX_ITERATIONS").and_then(|v| v.parse().ok()) {
            self.agents.max_iterations = n;
        }

        if let Some(flag) = non_empty_env("GP_CONFIRM_COMMANDS") {
            self.policy.confirm_commands = parse_flag(&flag);
        }

        if let Some(path) = non_empty_env("MCP_CONFIG_PATH") {
            self.mcp.config_path = Some(path);
        }
        if let Some(flag) = non_empty_env("MCP_ENABLED") {
            self.mcp.enabled = parse_flag(&flag);
        }
    }

    /// Credentials supplied as `GP_CREDENTIAL_<NAME>` environment variables.
    ///
    /// Names are lowercased, so `GP_CREDENTIAL_GITHUB_TOKEN` becomes
    /// `github_token`.
    pub fn credentials_from_env() -> Vec<(String, String)> {
        std::env::vars()
            .filter_map(|(key, value)| {
                let name = key.strip_prefix(CREDENTIAL_ENV_PREFIX)?;
                if name.is_empty() || value.is_empty() {
                    return None;
                }
                Some((name.to_lowercase(), value))
            })
            .collect()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_flag(value: &str) -> bool {
    !matches!(value.to_lowercase().as_str(), "false" | "0" | "no" | "off")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert_eq!(config.default_timeout_secs, 30);
        assert_eq!(config.observation_timeout_secs, 60);
        assert_eq!(config.text_entry_timeout_secs, 300);
        assert_eq!(config.command_timeout_secs, 90);
    }

    #[test]
    fn test_agents_config_default() {
        let config = AgentsConfig::default();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.max_concurrent_waits, 8);
    }

    #[test]
    fn test_policy_config_default() {
        assert!(!PolicyConfig::default().confirm_commands);
    }

    #[test]
    fn test_expand_env_vars() {
        unsafe {
            std::env::set_var("GP_CONFIG_TEST_VAR", "test_value");
        }

        let result = Config::expand_env_vars("prefix_${GP_CONFIG_TEST_VAR}_suffix");
        assert_eq!(result, "prefix_test_value_suffix");

        let result = Config::expand_env_vars("prefix_${GP_NONEXISTENT_VAR}_suffix");
        assert_eq!(result, "prefix__suffix");

        unsafe {
            std::env::remove_var("GP_CONFIG_TEST_VAR");
        }
    }

    #[test]
    fn test_expand_env_vars_no_braces() {
        assert_eq!(Config::expand_env_vars("cost: $5"), "cost: $5");
    }

    #[test]
    fn test_toml_partial_sections() {
        let config = Config::from_toml_str(
            r#"
[llm]
model = "claude-test"

[worker]
socket_path = "/tmp/worker.sock"
command_timeout_secs = 120

[agents]
max_iterations = 4

[policy]
confirm_commands = true
"#,
        )
        .unwrap();

        assert_eq!(config.llm.model, "claude-test");
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.worker.socket_path, "/tmp/worker.sock");
        assert_eq!(config.worker.command_timeout_secs, 120);
        assert_eq!(config.worker.observation_timeout_secs, 60);
        assert_eq!(config.agents.max_iterations, 4);
        assert!(config.policy.confirm_commands);
        assert!(config.mcp.enabled);
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mcp]\nenabled = false\nconfig_path = \"/etc/mcp.json\"").unwrap();

        let config = Config::from_toml_file(file.path()).unwrap();
        assert_eq!(config.mcp.config_path.as_deref(), Some("/etc/mcp.json"));
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml_str("[worker\nsocket_path = 1").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("FALSE"));
        assert!(!parse_flag("off"));
    }

    #[test]
    fn test_credentials_from_env() {
        unsafe {
            std::env::set_var("GP_CREDENTIAL_TEST_PORTAL", "hunter2");
        }

        let creds = Config::credentials_from_env();
        assert!(creds.contains(&("test_portal".to_string(), "hunter2".to_string())));

        unsafe {
            std::env::remove_var("GP_CREDENTIAL_TEST_PORTAL");
        }
    }
}
