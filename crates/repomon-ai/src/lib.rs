//! Text-generation gateway: a uniform, retrying interface over multiple
//! LLM backends, plus prompt template resolution.

pub mod error;
pub mod gateway;
pub mod generator;
pub mod models;
pub mod prompt;
pub mod providers;

pub use error::{GatewayError, Result};
pub use gateway::{build_generator, Gateway};
pub use generator::{GenerateRequest, ProviderConfig, TextGenerator};
pub use prompt::{substitute, PromptResolver, ReportKind};
