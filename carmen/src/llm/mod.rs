//! Clients for the external text-generation service.
//!
//! Every client implements [`LlmClient`]. [`RetryPolicy`] wraps any client
//! with the rate-limit backoff, auth short-circuit and per-call timeout
//! rules; [`ClientFactory`] builds and caches wrapped clients per provider.

mod client;
mod error;
mod factory;
#[cfg(feature = "http")]
mod http;
mod mock;
mod retry;
mod tokens;
mod types;

pub use client::LlmClient;
#[cfg(test)]
pub use client::MockLlmClient as AutoMockLlmClient;
pub use error::{ProviderError, RetryClass};
pub use factory::{ClientFactory, LlmConfig, LlmDefaults};
#[cfg(feature = "http")]
pub use http::OpenAiCompatClient;
pub use mock::{MockLlmClient, ScriptedCall, ScriptedLlmClient};
pub use retry::{BackoffStrategy, JitterStrategy, RetryConfig, RetryPolicy};
pub use tokens::estimate_tokens;
pub use types::{GenerateOptions, LlmResponse, ProviderConfig, TokenCount};
