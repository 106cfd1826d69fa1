//! Structured logging, request spans, and metrics.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{record_decode_step, record_request, record_request_failure};
pub use spans::{DecodeSpan, SpanExt};
