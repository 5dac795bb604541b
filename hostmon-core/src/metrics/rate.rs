//! Per-second rates from cumulative interface counters.

use super::types::{CounterReading, RateSample};
use std::time::SystemTime;
use thiserror::Error;

/// Result of deriving a rate for one interface.
#[derive(Debug, Clone, PartialEq)]
pub enum RateOutcome {
    /// First observation of the interface; there is nothing to diff against.
    NoBaseline,
    Rate(RateSample),
}

impl RateOutcome {
    pub fn into_sample(self) -> Option<RateSample> {
        match self {
            Self::NoBaseline => None,
            Self::Rate(sample) => Some(sample),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum RateError {
    /// Elapsed time was zero, negative or not finite.
    #[error("invalid interval: elapsed {elapsed_secs}s is not positive")]
    InvalidInterval { elapsed_secs: f64 },
}

/// Signed seconds from `previous` to `current`; negative if the clock went backwards.
pub fn elapsed_between(previous: SystemTime, current: SystemTime) -> f64 {
    match current.duration_since(previous) {
        Ok(forward) => forward.as_secs_f64(),
        Err(backward) => -backward.duration().as_secs_f64(),
    }
}

/// Derive per-second rates for `current` against `previous`.
pub fn compute_rate(
    current: &CounterReading,
    previous: Option<&CounterReading>,
    elapsed_secs: f64,
) -> Result<RateOutcome, RateError> {
    let Some(previous) = previous else {
        return Ok(RateOutcome::NoBaseline);
    };

    if !elapsed_secs.is_finite() || elapsed_secs <= 0.0 {
        return Err(RateError::InvalidInterval { elapsed_secs });
    }

    let mut counter_reset = false;
    let mut per_sec = |now: u64, before: u64| -> f64 {
        if now < before {
            counter_reset = true;
            0.0
        } else {
            (now - before) as f64 / elapsed_secs
        }
    };

    let bytes_sent_per_sec = per_sec(current.bytes_sent, previous.bytes_sent);
    let bytes_received_per_sec = per_sec(current.bytes_received, previous.bytes_received);
    let packets_sent_per_sec = per_sec(current.packets_sent, previous.packets_sent);
    let packets_received_per_sec = per_sec(current.packets_received, previous.packets_received);
    let errors_in_per_sec = per_sec(current.errors_in, previous.errors_in);
    let errors_out_per_sec = per_sec(current.errors_out, previous.errors_out);

    Ok(RateOutcome::Rate(RateSample {
        bytes_sent_per_sec,
        bytes_received_per_sec,
        packets_sent_per_sec,
        packets_received_per_sec,
        errors_in_per_sec,
        errors_out_per_sec,
        elapsed_secs,
        counter_reset,
    }))
}
