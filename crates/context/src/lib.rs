pub mod builder;
pub mod tokens;

pub use builder::{ContextBuilder, PromptMessage, PromptRole};
