pub mod baseline_provider;
pub mod llm_factory;
pub mod llm_provider;
pub mod prompts;
pub mod summarizer;

// Cloud LLM providers
#[cfg(feature = "anthropic")]
pub mod anthropic_provider;
#[cfg(feature = "openai-llm")]
pub mod openai_llm_provider;

pub use baseline_provider::BaselineProvider;
pub use llm_factory::LLMProviderFactory;
pub use llm_provider::*;
pub use prompts::PromptTemplate;
pub use summarizer::{AuditSummarizer, SummaryError};
