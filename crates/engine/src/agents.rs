//! Role-specialized agents.
//!
//! Agents are stateless per call: they receive the question and a copy of
//! the discussion, and return plain strings. They hold no reference to the
//! shared state.

use std::sync::Arc;

use cq_domain::config::AgentsConfig;
use cq_domain::discussion::Contribution;
use cq_domain::error::{Error, Result};
use cq_domain::role::{Role, FINAL_SYNTHESIS_TEMPERATURE};
use cq_providers::traits::{GenerateRequest, LanguageModel};

use crate::prompts;
use crate::text::{clean_response, is_pass, parse_search_request};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What one deliberator turn produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Nothing new to add this turn.
    Pass,
    /// Cleaned contribution text.
    Contribution(String),
    /// Extracted search query.
    Search(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deliberator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Deliberator {
    role: Role,
    model: Arc<dyn LanguageModel>,
    system_prompt: String,
    temperature: f32,
    max_tokens: u32,
}

impl std::fmt::Debug for Deliberator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deliberator")
            .field("role", &self.role)
            .field("system_prompt", &self.system_prompt)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Deliberator {
    pub fn new(role: Role, model: Arc<dyn LanguageModel>, agents: &AgentsConfig) -> Result<Self> {
        Ok(Self {
            role,
            model,
            system_prompt: load_system_prompt(role, agents)?,
            temperature: role.descriptor().temperature,
            max_tokens: agents.max_tokens_for(role),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn name(&self) -> &'static str {
        self.role.name()
    }

    /// One turn: build the role prompt, call the model, classify the raw
    /// response as a search request, a pass, or a contribution.
    pub async fn take_turn(
        &self,
        user_input: &str,
        discussion: &[Contribution],
        context: Option<&str>,
    ) -> Result<Reply> {
        let prompt = prompts::deliberation_prompt(self.role, user_input, discussion, context);
        let req = GenerateRequest::new(prompt, self.temperature)
            .with_system(self.system_prompt.clone())
            .with_max_tokens(self.max_tokens);

        let raw = self.model.generate(req).await?;

        if let Some(query) = parse_search_request(&raw) {
            return Ok(Reply::Search(query));
        }

        let cleaned = clean_response(&raw);
        if is_pass(&cleaned) {
            Ok(Reply::Pass)
        } else {
            Ok(Reply::Contribution(cleaned))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Summarizer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Summarizer {
    model: Arc<dyn LanguageModel>,
    system_prompt: String,
    max_tokens: u32,
}

impl Summarizer {
    pub fn new(model: Arc<dyn LanguageModel>, agents: &AgentsConfig) -> Result<Self> {
        Ok(Self {
            model,
            system_prompt: load_system_prompt(Role::Summarizer, agents)?,
            max_tokens: agents.for_role(Role::Summarizer).max_tokens,
        })
    }

    /// Rolling summary of the discussion so far.
    pub async fn rolling(&self, user_input: &str, contributions: &[Contribution]) -> Result<String> {
        if contributions.is_empty() {
            return Ok("No contributions yet.".into());
        }
        let req = GenerateRequest::new(
            prompts::rolling_summary_prompt(user_input, contributions),
            Role::Summarizer.descriptor().temperature,
        )
        .with_system(self.system_prompt.clone())
        .with_max_tokens(self.max_tokens);
        self.model.generate(req).await
    }

    /// One-shot final synthesis over the complete discussion.
    pub async fn synthesis(
        &self,
        user_input: &str,
        contributions: &[Contribution],
        rolling_summary: &str,
    ) -> Result<String> {
        if contributions.is_empty() {
            return Ok("No discussion occurred.".into());
        }
        let req = GenerateRequest::new(
            prompts::final_synthesis_prompt(user_input, contributions, rolling_summary),
            FINAL_SYNTHESIS_TEMPERATURE,
        )
        .with_system(prompts::final_synthesis_system().to_string())
        .with_max_tokens(self.max_tokens);
        self.model.generate(req).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Web searcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct SearchAgent {
    model: Arc<dyn LanguageModel>,
    system_prompt: String,
    max_tokens: u32,
}

impl SearchAgent {
    pub fn new(model: Arc<dyn LanguageModel>, agents: &AgentsConfig) -> Result<Self> {
        Ok(Self {
            model,
            system_prompt: load_system_prompt(Role::WebSearcher, agents)?,
            max_tokens: agents.for_role(Role::WebSearcher).max_tokens,
        })
    }

    /// Run one search. Failures become an explanatory result body instead
    /// of propagating; the requesting agent decides what to make of it.
    pub async fn search(&self, query: &str, requester: &str) -> String {
        tracing::info!(requester, query, "web search");

        let req = GenerateRequest::new(
            prompts::web_search_prompt(query),
            Role::WebSearcher.descriptor().temperature,
        )
        .with_system(self.system_prompt.clone())
        .with_max_tokens(self.max_tokens);

        match self.model.generate(req).await {
            Ok(body) => format!("Search results for '{query}':\n{}", body.trim()),
            Err(e) => {
                tracing::warn!(requester, query, error = %e, "web search failed");
                format!("Search results for '{query}':\nWeb search failed: {e}")
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// System prompt loading
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn load_system_prompt(role: Role, agents: &AgentsConfig) -> Result<String> {
    match &agents.for_role(role).system_prompt_file {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("system prompt {}: {e}", path.display()))
        }),
        None => Ok(prompts::default_system_prompt(role).to_string()),
    }
}
