//! Metrics recorded through the `metrics` facade.
//!
//! Nothing is exported unless the host installs a recorder.

use ::metrics::{counter, histogram};

/// One verified decode step.
pub fn record_decode_step(source: &'static str, drafted: usize, accepted: usize) {
    counter!("samd_decode_steps_total", "source" => source).increment(1);
    counter!("samd_draft_tokens_total").increment(drafted as u64);
    counter!("samd_accepted_tokens_total").increment(accepted as u64);
    histogram!("samd_accept_length").record(accepted as f64);
}

/// One finished request.
pub fn record_request(finish_reason: &'static str, tokens: usize) {
    counter!("samd_requests_total", "finish_reason" => finish_reason).increment(1);
    histogram!("samd_request_tokens").record(tokens as f64);
}

/// A request that ended in an error.
pub fn record_request_failure(reason: &'static str) {
    counter!("samd_request_failures_total", "reason" => reason).increment(1);
}
