//! Complexity pre-filter.
//!
//! A one-shot, temperature-0 classification deciding whether a question
//! deserves a full multi-agent deliberation or a direct answer. Errors
//! default to [`Complexity::Complex`] so the deliberators handle anything
//! ambiguous.

use std::sync::Arc;

use crate::traits::{GenerateRequest, LanguageModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Complex,
}

pub struct Classifier {
    model: Arc<dyn LanguageModel>,
    max_tokens: u32,
}

impl Classifier {
    pub fn new(model: Arc<dyn LanguageModel>, max_tokens: u32) -> Self {
        Self {
            model,
            max_tokens: if max_tokens == 0 { 10 } else { max_tokens },
        }
    }

    /// Classify a question as SIMPLE or COMPLEX.
    pub async fn classify(&self, user_input: &str) -> Complexity {
        let req = GenerateRequest::new(classification_prompt(user_input, self.max_tokens), 0.0)
            .with_max_tokens(self.max_tokens);

        match self.model.generate(req).await {
            Ok(response) => {
                let decision = response.trim().to_uppercase();
                let complexity = if decision.contains("COMPLEX") {
                    Complexity::Complex
                } else {
                    Complexity::Simple
                };
                tracing::info!(
                    input = %truncate(user_input, 50),
                    decision = %truncate(&decision, 20),
                    ?complexity,
                    "classified question"
                );
                complexity
            }
            Err(e) => {
                // Fail-safe toward full deliberation.
                tracing::warn!(error = %e, "classification failed, defaulting to complex");
                Complexity::Complex
            }
        }
    }
}

fn classification_prompt(user_input: &str, max_tokens: u32) -> String {
    format!(
        r#"Your job is to classify this user question as SIMPLE or COMPLEX.

User Question: "{user_input}"

Classification Rules:

SIMPLE = Direct factual answer exists, no discussion needed
Examples:
- "what is 2+2?" → SIMPLE (basic math)
- "what's the capital of France?" → SIMPLE (factual lookup)
- "define recursion" → SIMPLE (definition)

COMPLEX = Requires analysis, trade-offs, multiple perspectives, or subjective judgment
Examples:
- "should I use microservices or monolith?" → COMPLEX (needs analysis)
- "what are the best practices for X?" → COMPLEX (needs discussion)
- "compare React vs Vue" → COMPLEX (needs multiple perspectives)

Answer with EXACTLY ONE WORD: SIMPLE or COMPLEX

Keep your response to approximately {max_tokens} tokens maximum.

Your classification:"#
    )
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
