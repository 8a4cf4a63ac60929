//! Speech-to-text adapters

mod openai;
mod rate_limiter;

pub use openai::{OpenAiTranscriber, DEFAULT_BASE_URL, DEFAULT_MODEL, MAX_API_FILE_BYTES};
pub use rate_limiter::RateLimiter;
