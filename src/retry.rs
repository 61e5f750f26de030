//! Bounded retry with jittered exponential backoff, shared by the Tool
//! Executor and the LLM HTTP client — the only two places in the system
//! allowed to retry a network call (spec.md §7: "Retries are local to
//! the Tool Executor and the LLM HTTP client; agents above do not
//! retry").
//!
//! Retry only `429` and `408` and transient transport errors (timeouts,
//! connection failures); a generic `5xx` is a hard failure so downstream
//! incidents surface fast instead of being masked by silent retries.

use std::time::Duration;

use rand::Rng;
use reqwest::StatusCode;

pub const MAX_ATTEMPTS: u32 = 3;
pub const BASE_DELAY: Duration = Duration::from_millis(100);
pub const MAX_DELAY: Duration = Duration::from_secs(1);

/// `429` and `408` are retriable; everything else — including a
/// generic `5xx` — is a hard failure.
pub fn is_retriable_status(status: StatusCode) -> bool {
    status.as_u16() == 429 || status.as_u16() == 408
}

/// A connection error or a client-side timeout is transient and worth
/// retrying; anything else from `reqwest` (TLS, body decode, builder
/// errors) is not.
pub fn is_retriable_transport_error(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect()
}

/// Exponential backoff from [`BASE_DELAY`], doubling per attempt,
/// capped at [`MAX_DELAY`], with +/-10-20% jitter layered on top.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = BASE_DELAY.saturating_mul(1 << (attempt - 1)).min(MAX_DELAY);
    let jitter_frac = rand::thread_rng().gen_range(0.10..=0.20);
    let jitter = exp.mul_f64(jitter_frac);
    exp.saturating_sub(exp.mul_f64(0.10)).saturating_add(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_never_exceeds_cap_plus_jitter() {
        for attempt in 1..=5 {
            let d = backoff_delay(attempt);
            assert!(d <= MAX_DELAY + MAX_DELAY.mul_f64(0.20));
        }
    }

    #[test]
    fn is_retriable_status_is_429_and_408_only() {
        assert!(is_retriable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retriable_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_retriable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_retriable_status(StatusCode::BAD_GATEWAY));
    }
}
