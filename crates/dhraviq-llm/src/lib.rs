pub mod gemini;
pub mod reliable;
pub mod retry;

pub mod mock;

pub use gemini::GeminiProvider;
pub use reliable::{ReliableConfig, ReliableProvider};
pub use retry::{RetryDecision, RetryPolicy, RetryState};
