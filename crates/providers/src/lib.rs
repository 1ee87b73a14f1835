//! Language-model capability and its adapters.
//!
//! The engine consumes the abstract [`traits::LanguageModel`]; the concrete
//! adapter here speaks the OpenRouter chat-completions API through a shared,
//! persisted rate-limit coordinator. The scripted stub model lives here too
//! so every downstream crate can test against the same capability surface.

pub mod classifier;
pub mod limiter;
pub mod openrouter;
pub mod registry;
mod sse;
pub mod stub;
pub mod traits;

pub use limiter::{PersistedLimit, RateLimitCoordinator, RateLimitStore};
pub use registry::ModelRegistry;
pub use traits::{GenerateRequest, LanguageModel};
