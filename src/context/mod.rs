//! The compressed-context builder and its supporting quality/token
//! components.

mod builder;
mod quality;
mod tokenizer;

pub use builder::{CompressedContextBuilder, ContextFilter};
pub use tokenizer::TokenCounter;
