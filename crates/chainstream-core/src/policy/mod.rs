//! Request policies for upstream API calls.
//!
//! ```text
//! Request → [RequestThrottle] → [RetryPolicy] → [Transport]
//! ```

pub mod retry;
pub mod throttle;

pub use retry::{RetryConfig, RetryPolicy};
pub use throttle::{RequestThrottle, ThrottleConfig};
