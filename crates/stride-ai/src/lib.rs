//! stride-ai: message model and chat model invocation
//!
//! Provides the conversation types shared by the agent graph and a
//! request/response interface to chat models that support tool calling.

pub mod error;
pub mod model;
pub mod providers;
pub mod types;

pub use error::{Error, Result};
pub use model::{ChatModel, RetryConfig};
pub use types::*;
