use cq_domain::error::Result;
use cq_domain::stream::BoxStream;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic text generation request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// The user prompt.
    pub prompt: String,
    /// Optional system prompt.
    pub system: Option<String>,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f32,
    /// Upper bound on generated tokens. `None` or `Some(0)` lets the
    /// provider choose.
    pub max_tokens: Option<u32>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = if max_tokens == 0 { None } else { Some(max_tokens) };
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core capability trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every language-model adapter must implement.
///
/// `generate_stream` returns a finite, single-pass sequence of chunks whose
/// concatenation equals the non-streaming form. The deliberation loop uses
/// `generate` exclusively; streaming exists for end-user display transports.
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a full response.
    async fn generate(&self, req: GenerateRequest) -> Result<String>;

    /// Generate a response as a stream of text chunks.
    async fn generate_stream(
        &self,
        req: GenerateRequest,
    ) -> Result<BoxStream<'static, Result<String>>>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;

    /// The model this instance targets.
    fn model_id(&self) -> &str;
}
