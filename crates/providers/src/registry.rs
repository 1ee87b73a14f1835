//! Role → model resolution.
//!
//! One default adapter serves every role unless the configuration names a
//! role-specific model (the WebSearcher typically points at a
//! search-capable one). Adapter instances are shared per distinct model id.

use std::collections::HashMap;
use std::sync::Arc;

use cq_domain::config::Config;
use cq_domain::error::Result;
use cq_domain::role::Role;

use crate::limiter::RateLimitCoordinator;
use crate::openrouter::OpenRouterModel;
use crate::traits::LanguageModel;

pub struct ModelRegistry {
    default: Arc<dyn LanguageModel>,
    per_role: HashMap<Role, Arc<dyn LanguageModel>>,
}

impl ModelRegistry {
    /// Build adapters for the configured default model plus every distinct
    /// per-role override.
    pub fn from_config(config: &Config, limiter: Arc<RateLimitCoordinator>) -> Result<Self> {
        let default: Arc<dyn LanguageModel> = Arc::new(OpenRouterModel::from_config(
            &config.openrouter,
            None,
            limiter.clone(),
        )?);

        let mut by_model: HashMap<String, Arc<dyn LanguageModel>> = HashMap::new();
        by_model.insert(config.openrouter.model.clone(), default.clone());

        let mut per_role = HashMap::new();
        let all_roles = [
            Role::Divergent,
            Role::Convergent,
            Role::Critical,
            Role::Pragmatist,
            Role::UserProxy,
            Role::Quantifier,
            Role::Summarizer,
            Role::WebSearcher,
            Role::Classifier,
        ];
        for role in all_roles {
            if let Some(model_id) = &config.agents.for_role(role).model {
                let adapter = match by_model.get(model_id) {
                    Some(existing) => existing.clone(),
                    None => {
                        let built: Arc<dyn LanguageModel> = Arc::new(OpenRouterModel::from_config(
                            &config.openrouter,
                            Some(model_id),
                            limiter.clone(),
                        )?);
                        by_model.insert(model_id.clone(), built.clone());
                        built
                    }
                };
                tracing::info!(role = %role, model = %model_id, "role uses model override");
                per_role.insert(role, adapter);
            }
        }

        Ok(Self { default, per_role })
    }

    /// Registry serving one fixed model for every role (tests).
    pub fn single(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            default: model,
            per_role: HashMap::new(),
        }
    }

    pub fn with_override(mut self, role: Role, model: Arc<dyn LanguageModel>) -> Self {
        self.per_role.insert(role, model);
        self
    }

    pub fn for_role(&self, role: Role) -> Arc<dyn LanguageModel> {
        self.per_role
            .get(&role)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    /// The model serving roles without an override.
    pub fn default_model(&self) -> Arc<dyn LanguageModel> {
        self.default.clone()
    }
}
