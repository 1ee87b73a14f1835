//! Typed configuration bundle.
//!
//! Loaded from a YAML file with `${VAR}` / `${VAR:default}` environment
//! substitution, then validated. Every section has serde defaults so a
//! minimal (or empty) file yields a runnable configuration.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::role::Role;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "d_system_name")]
    pub name: String,
    #[serde(default = "d_environment")]
    pub environment: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: d_system_name(),
            environment: d_environment(),
        }
    }
}

fn d_system_name() -> String {
    "colloquy".into()
}

fn d_environment() -> String {
    "development".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Consensus
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Timing knobs for the deliberation loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Termination budget; the run's wall-clock hard cap is
    /// `discussion_rounds × 10` seconds.
    #[serde(default = "d_discussion_rounds")]
    pub discussion_rounds: u32,
    /// Outer wall-clock cap for callers awaiting a terminal task status.
    #[serde(default = "d_specialist_timeout")]
    pub specialist_timeout_seconds: u64,
    /// Rolling-summary cadence.
    #[serde(default = "d_summary_interval")]
    pub summary_interval_seconds: u64,
    /// Sleep between agent loop iterations.
    #[serde(default = "d_tick_interval")]
    pub tick_interval_seconds: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            discussion_rounds: d_discussion_rounds(),
            specialist_timeout_seconds: d_specialist_timeout(),
            summary_interval_seconds: d_summary_interval(),
            tick_interval_seconds: d_tick_interval(),
        }
    }
}

fn d_discussion_rounds() -> u32 {
    3
}

fn d_specialist_timeout() -> u64 {
    300
}

fn d_summary_interval() -> u64 {
    10
}

fn d_tick_interval() -> u64 {
    2
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agents
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-role overrides. Everything defaults off; the role descriptor table
/// supplies built-in temperatures and token caps.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentRoleConfig {
    /// Replaces the built-in system prompt when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_file: Option<PathBuf>,
    /// 0 = role default.
    #[serde(default)]
    pub max_tokens: u32,
    /// Advisory cap on turns per run; the admission policy's hard cap of 3
    /// still binds.
    #[serde(default = "d_max_iterations")]
    pub max_iterations: u32,
    /// Model override for this role (e.g. a search-capable model for the
    /// WebSearcher).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

fn d_max_iterations() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentsConfig {
    #[serde(default)]
    pub divergent: AgentRoleConfig,
    #[serde(default)]
    pub convergent: AgentRoleConfig,
    #[serde(default)]
    pub critical: AgentRoleConfig,
    #[serde(default)]
    pub pragmatist: AgentRoleConfig,
    #[serde(default)]
    pub user_proxy: AgentRoleConfig,
    #[serde(default)]
    pub quantifier: AgentRoleConfig,
    #[serde(default)]
    pub summarizer: AgentRoleConfig,
    #[serde(default)]
    pub web_searcher: AgentRoleConfig,
    #[serde(default)]
    pub classifier: AgentRoleConfig,
}

impl AgentsConfig {
    pub fn for_role(&self, role: Role) -> &AgentRoleConfig {
        match role {
            Role::Divergent => &self.divergent,
            Role::Convergent => &self.convergent,
            Role::Critical => &self.critical,
            Role::Pragmatist => &self.pragmatist,
            Role::UserProxy => &self.user_proxy,
            Role::Quantifier => &self.quantifier,
            Role::Summarizer => &self.summarizer,
            Role::WebSearcher => &self.web_searcher,
            Role::Classifier => &self.classifier,
        }
    }

    /// Effective token cap for a role: config override, else role default.
    /// 0 means provider default (unlimited).
    pub fn max_tokens_for(&self, role: Role) -> u32 {
        let configured = self.for_role(role).max_tokens;
        if configured > 0 {
            configured
        } else {
            role.descriptor().default_max_tokens
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// OpenRouter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Usually supplied as `${OPENROUTER_API_KEY}`.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_timeout")]
    pub timeout_seconds: u64,
    /// Token-bucket capacity of the rate-limit coordinator.
    #[serde(default = "d_rpm")]
    pub requests_per_minute: u32,
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    /// Base delay for transient-error backoff; attempt n waits `n × delay`.
    #[serde(default = "d_retry_delay")]
    pub retry_delay_seconds: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: d_base_url(),
            model: d_model(),
            timeout_seconds: d_timeout(),
            requests_per_minute: d_rpm(),
            max_retries: d_max_retries(),
            retry_delay_seconds: d_retry_delay(),
        }
    }
}

fn d_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}

fn d_model() -> String {
    "anthropic/claude-3.5-sonnet".into()
}

fn d_timeout() -> u64 {
    300
}

fn d_rpm() -> u32 {
    20
}

fn d_max_retries() -> u32 {
    3
}

fn d_retry_delay() -> u64 {
    5
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Storage & logging
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `tasks.json` and `rate_limits.json`.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
        }
    }
}

fn d_state_path() -> PathBuf {
    PathBuf::from("./state")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "d_log_level")]
    pub level: String,
    /// `"json"` or `"pretty"`.
    #[serde(default = "d_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: d_log_level(),
            format: d_log_format(),
        }
    }
}

fn d_log_level() -> String {
    "info".into()
}

fn d_log_format() -> String {
    "json".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Loading
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Config {
    /// Load a YAML config file, substituting environment variables.
    ///
    /// A scalar of the exact form `${VAR}` is replaced by the variable's
    /// value (error if unset); `${VAR:default}` falls back to the default.
    pub fn load(path: &Path) -> Result<Config> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Config> {
        let mut value: serde_yaml::Value = serde_yaml::from_str(raw)
            .map_err(|e| Error::Config(format!("invalid YAML: {e}")))?;
        substitute_env(&mut value)?;
        serde_yaml::from_value(value).map_err(|e| Error::Config(format!("invalid config: {e}")))
    }
}

fn substitute_env(value: &mut serde_yaml::Value) -> Result<()> {
    match value {
        serde_yaml::Value::String(s) => {
            if let Some(spec) = s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
                let resolved = match spec.split_once(':') {
                    Some((name, default)) => {
                        std::env::var(name).unwrap_or_else(|_| default.to_string())
                    }
                    None => std::env::var(spec).map_err(|_| {
                        Error::Config(format!("environment variable {spec} is required but not set"))
                    })?,
                };
                *s = resolved;
            }
            Ok(())
        }
        serde_yaml::Value::Sequence(seq) => {
            for item in seq {
                substitute_env(item)?;
            }
            Ok(())
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                substitute_env(v)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let mut error = |field: &str, message: String| {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                field: field.into(),
                message,
            });
        };

        if self.consensus.discussion_rounds == 0 {
            error("consensus.discussion_rounds", "must be at least 1".into());
        }
        if self.consensus.tick_interval_seconds == 0 {
            error("consensus.tick_interval_seconds", "must be at least 1".into());
        }
        if self.consensus.summary_interval_seconds == 0 {
            error("consensus.summary_interval_seconds", "must be at least 1".into());
        }
        if self.openrouter.requests_per_minute == 0 {
            error("openrouter.requests_per_minute", "must be at least 1".into());
        }
        if self.openrouter.api_key.trim().is_empty() {
            error(
                "openrouter.api_key",
                "missing API key; set OPENROUTER_API_KEY".into(),
            );
        }

        // The token ladder Divergent ≥ Convergent ≥ Critical ≥ Classifier
        // bounds model usage per tick; flag inversions.
        let ladder = [
            Role::Divergent,
            Role::Convergent,
            Role::Critical,
            Role::Classifier,
        ];
        for pair in ladder.windows(2) {
            let (hi, lo) = (pair[0], pair[1]);
            let (hi_cap, lo_cap) = (self.agents.max_tokens_for(hi), self.agents.max_tokens_for(lo));
            if hi_cap != 0 && lo_cap != 0 && hi_cap < lo_cap {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Warning,
                    field: format!("agents.{}.max_tokens", hi.name().to_lowercase()),
                    message: format!(
                        "{} cap ({hi_cap}) below {} cap ({lo_cap})",
                        hi.name(),
                        lo.name()
                    ),
                });
            }
        }

        for role in crate::role::DELIBERATORS {
            if self.agents.for_role(role).max_iterations == 0 {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Warning,
                    field: format!("agents.{}.max_iterations", role.name().to_lowercase()),
                    message: "0 disables the agent entirely".into(),
                });
            }
        }

        issues
    }

    pub fn has_errors(&self) -> bool {
        self.validate()
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error)
    }
}
