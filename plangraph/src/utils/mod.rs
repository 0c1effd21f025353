//! Utility functions for timestamps and retries.

pub mod retry;
pub mod timestamps;

pub use retry::{with_retry, BackoffStrategy, JitterStrategy, RetryPolicy};
pub use timestamps::{expiry_after, format_millis, now_millis, EpochMillis};
