//! Configuration management for Crane
//!
//! Supports environment variables, config files, and runtime overrides.
//! Every agent is described by a typed [`AgentConfig`] that is validated
//! when loaded; nothing falls back silently to empty prompts.
//!
//! Config file location: ~/.config/crane/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{CraneError, Result};
use crate::core::types::AgentRole;

/// Main configuration for Crane
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Conversation run parameters
    #[serde(default)]
    pub run: RunConfig,
    /// Durable storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Agents defined inline
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    /// Agents defined in their own TOML or JSON files
    #[serde(default)]
    pub agent_files: Vec<PathBuf>,
}

/// Parameters of one conversation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Attempts for the moderator and feedback agent before the run aborts
    /// Default: 5
    pub max_retries: usize,
    /// Number of subsequent review rounds per iteration
    /// Default: 2
    pub messages_per_iteration: usize,
    /// Per-iteration message quota for each reviewer
    /// Default: same as messages_per_iteration
    #[serde(default)]
    pub reviewer_message_quota: Option<usize>,
    /// Total iterations per conversation, the first included
    /// Default: 2
    pub max_iterations: usize,
    /// Label of the change under review, used to name the feedback record
    #[serde(default)]
    pub change_name: String,
    /// Role played by a human instead of a model
    #[serde(default)]
    pub human_role: Option<AgentRole>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_retries: env::var("CRANE_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            messages_per_iteration: env::var("CRANE_MESSAGES_PER_ITERATION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            reviewer_message_quota: None,
            max_iterations: 2,
            change_name: String::new(),
            human_role: None,
        }
    }
}

impl RunConfig {
    /// Effective per-iteration quota for each reviewer
    pub fn reviewer_quota(&self) -> usize {
        self.reviewer_message_quota
            .unwrap_or(self.messages_per_iteration)
    }
}

/// Durable storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for counters, transcripts and retrieval records
    pub base_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: env::var("CRANE_BASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("conversations")),
        }
    }
}

/// Model provider family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Chat-completion style endpoint
    OpenAI,
    /// Hosted text-generation inference endpoint
    HuggingFace,
}

impl ProviderType {
    /// Environment variable holding the credential when none is configured
    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "OPENAI_API_KEY",
            ProviderType::HuggingFace => "HUGGINGFACE_API_KEY",
        }
    }
}

/// Static configuration of one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Name used as message sender
    pub name: String,
    /// Role in the conversation
    pub role: AgentRole,
    /// Provider family
    pub provider: ProviderType,
    /// Full URL of the provider endpoint
    pub endpoint: String,
    /// Model identifier (required for openai)
    #[serde(default)]
    pub model: Option<String>,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// System-role context
    #[serde(default)]
    pub context: String,
    /// User-role instructions
    pub instructions: String,
    /// Instructions used when the moderator summarizes an iteration
    #[serde(default)]
    pub summarization_instructions: Option<String>,
    /// Upper bound on generated tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra attempts on transient provider errors
    #[serde(default = "default_request_retries")]
    pub request_retries: u32,
    /// Base wait between transient retries in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_request_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl AgentConfig {
    /// Minimal configuration, mostly for tests and programmatic setup
    pub fn new(
        name: impl Into<String>,
        role: AgentRole,
        provider: ProviderType,
        endpoint: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            provider,
            endpoint: endpoint.into(),
            model: None,
            api_key_env: None,
            context: String::new(),
            instructions: instructions.into(),
            summarization_instructions: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            request_retries: default_request_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }

    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Wait before the next transient retry
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Environment variable consulted for the API key
    pub fn api_key_var(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_key_env())
    }

    /// Resolve the API key from the environment
    pub fn api_key(&self) -> Option<String> {
        env::var(self.api_key_var()).ok().filter(|k| !k.is_empty())
    }

    /// Reject configurations that could only fail at call time
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(CraneError::config(format!("agent '{}': {}", self.name, msg)));

        if self.name.trim().is_empty() {
            return Err(CraneError::config("agent name must not be empty"));
        }
        if self.instructions.trim().is_empty() {
            return fail("instructions must not be empty");
        }
        if url::Url::parse(&self.endpoint).is_err() {
            return fail(&format!("invalid endpoint '{}'", self.endpoint));
        }
        if self.max_tokens == 0 {
            return fail("max_tokens must be greater than zero");
        }
        if self.timeout_secs == 0 {
            return fail("timeout_secs must be greater than zero");
        }
        if self.provider == ProviderType::OpenAI
            && self.model.as_deref().map_or(true, |m| m.trim().is_empty())
        {
            return fail("openai agents require a model");
        }
        if self.role == AgentRole::Moderator
            && self
                .summarization_instructions
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
        {
            return fail("the moderator requires summarization_instructions");
        }
        Ok(())
    }

    /// Load and validate an agent definition from a TOML or JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CraneError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: AgentConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };

        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("crane")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from `path` or the default location.
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_file);

        let mut config = Self::load_from_file(&path)?;
        config.apply_env_overrides();
        config.resolve_agent_files(path.parent())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file only
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CraneError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| CraneError::config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| CraneError::config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Environment variables win over values read from the file
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env::var("CRANE_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.run.max_retries = v;
        }
        if let Some(v) = env::var("CRANE_MESSAGES_PER_ITERATION")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.run.messages_per_iteration = v;
        }
        if let Ok(v) = env::var("CRANE_BASE_PATH") {
            self.storage.base_path = PathBuf::from(v);
        }
    }

    /// Read agent files, relative paths resolved against the config directory
    fn resolve_agent_files(&mut self, base: Option<&Path>) -> Result<()> {
        for file in std::mem::take(&mut self.agent_files) {
            let path = match base {
                Some(dir) if file.is_relative() => dir.join(&file),
                _ => file,
            };
            self.agents.push(AgentConfig::load(&path)?);
        }
        Ok(())
    }

    /// Check that the configured agents can form a conversation
    pub fn validate(&self) -> Result<()> {
        for agent in &self.agents {
            agent.validate()?;
        }

        let count = |role: AgentRole| self.agents.iter().filter(|a| a.role == role).count();

        if count(AgentRole::Moderator) != 1 {
            return Err(CraneError::config("exactly one moderator is required"));
        }
        if count(AgentRole::Reviewer) == 0 {
            return Err(CraneError::config("at least one reviewer is required"));
        }
        if count(AgentRole::Feedback) != 1 {
            return Err(CraneError::config("exactly one feedback agent is required"));
        }
        if self.run.max_retries == 0 {
            return Err(CraneError::config("max_retries must be greater than zero"));
        }
        if self.run.max_iterations == 0 {
            return Err(CraneError::config("max_iterations must be greater than zero"));
        }
        Ok(())
    }

    /// Agents with the given role, in configuration order
    pub fn agents_with_role(&self, role: AgentRole) -> impl Iterator<Item = &AgentConfig> {
        self.agents.iter().filter(move |a| a.role == role)
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config)
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moderator() -> AgentConfig {
        let mut cfg = AgentConfig::new(
            "moderator",
            AgentRole::Moderator,
            ProviderType::OpenAI,
            "https://api.openai.com/v1/chat/completions",
            "Moderate the review",
        );
        cfg.model = Some("gpt-4o-mini".into());
        cfg.summarization_instructions = Some("Summarize neutrally".into());
        cfg
    }

    fn reviewer(name: &str) -> AgentConfig {
        AgentConfig::new(
            name,
            AgentRole::Reviewer,
            ProviderType::HuggingFace,
            "https://api-inference.huggingface.co/models/distilgpt2",
            "Review the change",
        )
    }

    fn feedback() -> AgentConfig {
        AgentConfig::new(
            "feedback_agent",
            AgentRole::Feedback,
            ProviderType::HuggingFace,
            "https://api-inference.huggingface.co/models/distilgpt2",
            "Rewrite the change",
        )
    }

    #[test]
    fn test_default_run_config() {
        let run = RunConfig {
            reviewer_message_quota: None,
            ..RunConfig::default()
        };
        assert_eq!(run.max_iterations, 2);
        assert_eq!(run.reviewer_quota(), run.messages_per_iteration);
    }

    #[test]
    fn test_agent_validation() {
        assert!(moderator().validate().is_ok());
        assert!(reviewer("r1").validate().is_ok());

        let mut no_summary = moderator();
        no_summary.summarization_instructions = None;
        assert!(no_summary.validate().is_err());

        let mut no_model = moderator();
        no_model.model = None;
        assert!(no_model.validate().is_err());

        let mut bad_endpoint = reviewer("r1");
        bad_endpoint.endpoint = "not a url".into();
        assert!(bad_endpoint.validate().is_err());

        let mut empty = reviewer("r1");
        empty.instructions = "  ".into();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_config_requires_roles() {
        let mut config = Config::default();
        config.agents = vec![moderator(), reviewer("r1"), feedback()];
        assert!(config.validate().is_ok());

        config.agents = vec![moderator(), feedback()];
        assert!(config.validate().is_err());

        config.agents = vec![moderator(), moderator(), reviewer("r1"), feedback()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_agent_files() {
        let dir = tempfile::tempdir().unwrap();
        let reviewer_path = dir.path().join("reviewer_1.json");
        fs::write(
            &reviewer_path,
            serde_json::to_string(&reviewer("reviewer_1")).unwrap(),
        )
        .unwrap();

        let moderator_path = dir.path().join("moderator.toml");
        fs::write(&moderator_path, toml::to_string(&moderator()).unwrap()).unwrap();

        let config_path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.agents = vec![feedback()];
        config.agent_files = vec![PathBuf::from("reviewer_1.json"), PathBuf::from("moderator.toml")];
        fs::write(&config_path, toml::to_string(&config).unwrap()).unwrap();

        let loaded = Config::load(Some(&config_path)).unwrap();
        assert_eq!(loaded.agents.len(), 3);
        assert_eq!(loaded.agents_with_role(AgentRole::Reviewer).count(), 1);
        assert!(loaded.agent_files.is_empty());
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from_file(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn test_config_dir() {
        let dir = Config::config_dir();
        assert!(dir.to_string_lossy().contains("crane"));
    }
}
