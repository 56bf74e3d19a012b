//! Model-backed conversation participant
//!
//! An [`Agent`] pairs static configuration with per-turn prompt state.
//! `query` retries transient provider errors, bounds every attempt with the
//! configured timeout and records each failure in the agent's error log.

use std::sync::Arc;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::agent::error_log::ErrorLog;
use crate::core::{AgentConfig, AgentRole, CallError, Result, TokenUsage};
use crate::llm::{create_adapter, AgentPrompt, HttpTransport, ProviderAdapter, Transport};

/// One moderator, reviewer or feedback agent
pub struct Agent {
    /// Static configuration
    config: AgentConfig,
    /// Request shaping for the configured provider
    adapter: Arc<dyn ProviderAdapter>,
    /// Wire transport, shared between agents
    transport: Arc<dyn Transport>,
    /// Rolling context for the next call
    additional_context: String,
    /// Problem text for the next call
    input_problem: String,
    /// Messages contributed in the current iteration
    iteration_messages: usize,
    /// Failures recorded since the last drain
    error_log: ErrorLog,
    /// Tokens reported by the provider
    usage: TokenUsage,
}

impl Agent {
    /// Create an agent with explicit adapter and transport
    pub fn new(
        config: AgentConfig,
        adapter: Arc<dyn ProviderAdapter>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            adapter,
            transport,
            additional_context: String::new(),
            input_problem: String::new(),
            iteration_messages: 0,
            error_log: ErrorLog::new(),
            usage: TokenUsage::default(),
        })
    }

    /// Create an agent whose adapter follows its configured provider
    pub fn with_transport(config: AgentConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let adapter = create_adapter(&config);
        Self::new(config, adapter, transport)
    }

    /// Create an agent with its own HTTP transport
    pub fn from_config(config: AgentConfig) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
        Self::with_transport(config, transport)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn role(&self) -> AgentRole {
        self.config.role
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Replace the rolling context sent with the next call
    pub fn set_additional_context(&mut self, text: impl Into<String>) {
        self.additional_context = text.into();
    }

    pub fn additional_context(&self) -> &str {
        &self.additional_context
    }

    /// Replace the problem text sent with the next call
    pub fn set_input_problem(&mut self, text: impl Into<String>) {
        self.input_problem = text.into();
    }

    pub fn input_problem(&self) -> &str {
        &self.input_problem
    }

    pub fn iteration_messages(&self) -> usize {
        self.iteration_messages
    }

    pub fn increment_iteration_messages(&mut self) {
        self.iteration_messages += 1;
    }

    pub fn reset_iteration_messages(&mut self) {
        self.iteration_messages = 0;
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    /// Read and clear the agent's error log
    pub fn drain_errors(&mut self) -> Vec<String> {
        self.error_log.drain()
    }

    /// Tokens reported by the provider so far
    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    /// Query with the general instructions
    pub async fn query(&mut self) -> std::result::Result<String, CallError> {
        let instructions = self.config.instructions.clone();
        self.query_with(instructions).await
    }

    /// Query with the summarization instructions, falling back to the
    /// general ones for agents that have none
    pub async fn query_summarization(&mut self) -> std::result::Result<String, CallError> {
        let instructions = self
            .config
            .summarization_instructions
            .clone()
            .unwrap_or_else(|| self.config.instructions.clone());
        self.query_with(instructions).await
    }

    fn prompt(&self, instructions: String) -> AgentPrompt {
        AgentPrompt {
            model: self.config.model.clone(),
            context: self.config.context.clone(),
            additional_context: self.additional_context.clone(),
            input_problem: self.input_problem.clone(),
            instructions,
            max_tokens: self.config.max_tokens,
        }
    }

    /// Attempt loop: transient errors are retried up to `request_retries`
    /// times; fatal statuses, network errors and timeouts end it at once.
    async fn query_with(&mut self, instructions: String) -> std::result::Result<String, CallError> {
        let prompt = self.prompt(instructions);
        let request = self.adapter.build_request(&prompt);
        let per_call = self.config.timeout();
        let attempts = self.config.request_retries + 1;

        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!(agent = %self.config.name, provider = self.adapter.name(), attempt, "querying model");

            let response = match timeout(per_call, self.transport.send(&request)).await {
                Err(_) => {
                    let err = CallError::Timeout(per_call);
                    return Err(self.record(err));
                }
                Ok(Err(err)) => return Err(self.record(err)),
                Ok(Ok(response)) => response,
            };

            if response.is_success() {
                return match self.adapter.parse_response(&response.body, &prompt) {
                    Ok(parsed) => {
                        if let Some(ref usage) = parsed.usage {
                            self.usage.add(usage);
                        }
                        Ok(parsed.text)
                    }
                    Err(err) => Err(self.record(err)),
                };
            }

            let err = CallError::from_status(response.status, response.body);
            if !err.is_retryable() {
                return Err(self.record(err));
            }

            last_error = Some(self.record(err));
            if attempt < attempts {
                sleep(self.config.retry_delay() * attempt).await;
            }
        }

        Err(last_error.unwrap_or_else(|| CallError::Network("no request was sent".to_string())))
    }

    fn record(&mut self, err: CallError) -> CallError {
        warn!(agent = %self.config.name, error = %err, "model call failed");
        self.error_log.add(err.to_string());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProviderType;
    use crate::llm::{ProviderRequest, ProviderResponse};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays a fixed list of outcomes and records request bodies
    struct Scripted {
        outcomes: Mutex<VecDeque<std::result::Result<ProviderResponse, CallError>>>,
        sent: Mutex<Vec<serde_json::Value>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<std::result::Result<ProviderResponse, CallError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(
            &self,
            request: &ProviderRequest,
        ) -> std::result::Result<ProviderResponse, CallError> {
            self.sent.lock().unwrap().push(request.body.clone());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CallError::Network("script exhausted".into())))
        }
    }

    struct Stalled;

    #[async_trait]
    impl Transport for Stalled {
        async fn send(
            &self,
            _request: &ProviderRequest,
        ) -> std::result::Result<ProviderResponse, CallError> {
            sleep(Duration::from_secs(3600)).await;
            Err(CallError::Network("unreachable".into()))
        }
    }

    fn ok(text: &str) -> std::result::Result<ProviderResponse, CallError> {
        Ok(ProviderResponse {
            status: 200,
            body: serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": text}}],
                "usage": {"prompt_tokens": 4, "completion_tokens": 2, "total_tokens": 6}
            })
            .to_string(),
        })
    }

    fn status(code: u16) -> std::result::Result<ProviderResponse, CallError> {
        Ok(ProviderResponse {
            status: code,
            body: "error".into(),
        })
    }

    fn config(retries: u32) -> AgentConfig {
        let mut cfg = AgentConfig::new(
            "reviewer_1",
            AgentRole::Reviewer,
            ProviderType::OpenAI,
            "https://api.openai.com/v1/chat/completions",
            "Review the change.",
        );
        cfg.model = Some("gpt-4o-mini".into());
        cfg.request_retries = retries;
        cfg.retry_delay_ms = 0;
        cfg.timeout_secs = 1;
        cfg
    }

    #[tokio::test]
    async fn test_success_returns_text_and_usage() {
        let transport = Scripted::new(vec![ok("LGTM")]);
        let mut agent = Agent::with_transport(config(1), transport.clone()).unwrap();

        assert_eq!(agent.query().await.unwrap(), "LGTM");
        assert_eq!(agent.usage().total_tokens, 6);
        assert!(agent.error_log().is_empty());
        assert_eq!(transport.sent(), 1);
    }

    #[tokio::test]
    async fn test_transient_status_is_retried() {
        let transport = Scripted::new(vec![status(503), ok("second time")]);
        let mut agent = Agent::with_transport(config(1), transport.clone()).unwrap();

        assert_eq!(agent.query().await.unwrap(), "second time");
        assert_eq!(transport.sent(), 2);
        assert_eq!(agent.drain_errors().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_exhausts_retries() {
        let transport = Scripted::new(vec![status(503), status(503), status(503)]);
        let mut agent = Agent::with_transport(config(2), transport.clone()).unwrap();

        let err = agent.query().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(transport.sent(), 3);
        assert_eq!(agent.error_log().len(), 3);
    }

    #[tokio::test]
    async fn test_fatal_status_aborts_loop() {
        let transport = Scripted::new(vec![status(401), ok("never")]);
        let mut agent = Agent::with_transport(config(3), transport.clone()).unwrap();

        let err = agent.query().await.unwrap_err();
        assert_eq!(
            err,
            CallError::Fatal {
                status: 401,
                body: "error".into()
            }
        );
        assert_eq!(transport.sent(), 1);
    }

    #[tokio::test]
    async fn test_network_error_aborts_loop() {
        let transport = Scripted::new(vec![Err(CallError::Network("refused".into())), ok("never")]);
        let mut agent = Agent::with_transport(config(3), transport.clone()).unwrap();

        assert!(matches!(agent.query().await, Err(CallError::Network(_))));
        assert_eq!(transport.sent(), 1);
        assert_eq!(agent.drain_errors(), vec!["network error: refused".to_string()]);
        assert!(agent.error_log().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_aborts_loop() {
        let mut agent = Agent::with_transport(config(3), Arc::new(Stalled)).unwrap();
        let err = agent.query().await.unwrap_err();
        assert_eq!(err, CallError::Timeout(Duration::from_secs(1)));
        assert_eq!(agent.error_log().len(), 1);
    }

    #[tokio::test]
    async fn test_prompt_state_reaches_request() {
        let transport = Scripted::new(vec![ok("a")]);
        let mut agent = Agent::with_transport(config(0), transport.clone()).unwrap();
        agent.set_additional_context("history");
        agent.set_input_problem("the diff");
        agent.query().await.unwrap();

        let body = transport.sent.lock().unwrap()[0].clone();
        assert_eq!(body["messages"][0]["content"], "history");
        assert_eq!(body["messages"][1]["content"], "the diff\n\nReview the change.");
    }

    #[tokio::test]
    async fn test_summarization_uses_dedicated_instructions() {
        let transport = Scripted::new(vec![ok("digest")]);
        let mut cfg = config(0);
        cfg.role = AgentRole::Moderator;
        cfg.summarization_instructions = Some("Summarize neutrally.".into());
        let mut agent = Agent::with_transport(cfg, transport.clone()).unwrap();

        agent.query_summarization().await.unwrap();
        let body = transport.sent.lock().unwrap()[0].clone();
        assert_eq!(body["messages"][1]["content"], "Summarize neutrally.");
    }

    #[test]
    fn test_iteration_counter() {
        let mut agent = Agent::with_transport(config(0), Scripted::new(vec![])).unwrap();
        agent.increment_iteration_messages();
        agent.increment_iteration_messages();
        assert_eq!(agent.iteration_messages(), 2);
        agent.reset_iteration_messages();
        assert_eq!(agent.iteration_messages(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut cfg = config(0);
        cfg.model = None;
        assert!(Agent::with_transport(cfg, Scripted::new(vec![])).is_err());
    }
}
