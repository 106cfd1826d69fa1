//! Span utilities for decode requests.

use tracing::{info_span, Span};
use uuid::Uuid;

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for speculative decode request spans.
pub struct DecodeSpan;

impl DecodeSpan {
    /// Span with empty `status`, `error.message`, `tokens_generated`,
    /// `decode_steps` and `mean_accept_length` fields, filled in on completion.
    pub fn new(request_id: &str, prompt_len: usize) -> Span {
        info_span!(
            "speculative_request",
            request_id = %request_id,
            prompt_len,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            tokens_generated = tracing::field::Empty,
            decode_steps = tracing::field::Empty,
            mean_accept_length = tracing::field::Empty,
        )
    }

    /// Fresh v4 request id.
    pub fn request_id() -> String {
        Uuid::new_v4().to_string()
    }
}
