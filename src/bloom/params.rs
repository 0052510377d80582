//! Sizing formulas for the visitor filter.
//!
//! For `n` expected insertions and a target false-positive rate `p`:
//!
//! - bits: `m = -n · ln(p) / (ln 2)²`
//! - hashes: `k = (m / n) · ln 2`
//! - expected rate after `n` insertions: `(1 - e^(-kn/m))^k`

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

use std::f64::consts::LN_2;

use crate::error::{MonitorError, Result};

const LN2_SQUARED: f64 = LN_2 * LN_2;

/// Smallest filter worth allocating (one word).
pub const MIN_BITS: usize = 64;

/// Largest filter `optimal_bit_count` will size (512 MiB of bits).
pub const MAX_BITS: u64 = 1 << 32;

/// Upper bound on hash functions; beyond this the extra probes cost more than they save.
pub const MAX_HASHES: u32 = 32;

/// Bits needed to hold `n` items at false-positive rate `fp_rate`.
pub fn optimal_bit_count(n: usize, fp_rate: f64) -> Result<usize> {
    validate(n, fp_rate)?;

    let m = (-(n as f64) * fp_rate.ln() / LN2_SQUARED).ceil();
    if !m.is_finite() || m > MAX_BITS as f64 || m > usize::MAX as f64 {
        return Err(MonitorError::InvalidFilterParams(format!(
            "{n} items at rate {fp_rate} needs {m:.0} bits, more than the {MAX_BITS} allowed"
        )));
    }

    Ok((m as usize).max(MIN_BITS))
}

/// Hash function count minimising the false-positive rate for `m` bits and `n` items.
pub fn optimal_hash_count(m: usize, n: usize) -> Result<u32> {
    if m == 0 || n == 0 {
        return Err(MonitorError::InvalidFilterParams(format!(
            "bits ({m}) and items ({n}) must both be non-zero"
        )));
    }

    let k = ((m as f64 / n as f64) * LN_2).round() as u32;
    Ok(k.clamp(1, MAX_HASHES))
}

/// False-positive rate expected once `n` distinct items have been inserted.
pub fn expected_fp_rate(m: usize, k: u32, n: usize) -> f64 {
    if m == 0 {
        return 1.0;
    }
    let exponent = -(f64::from(k) * n as f64) / m as f64;
    (1.0 - exponent.exp()).powi(k as i32)
}

/// False-positive rate implied by the fraction of bits already set.
pub fn fp_rate_from_fill(fill_ratio: f64, k: u32) -> f64 {
    fill_ratio.clamp(0.0, 1.0).powi(k as i32)
}

fn validate(n: usize, fp_rate: f64) -> Result<()> {
    if n == 0 {
        return Err(MonitorError::InvalidFilterParams(
            "expected insertions must be greater than zero".into(),
        ));
    }
    if !(fp_rate > 0.0 && fp_rate < 1.0) {
        return Err(MonitorError::InvalidFilterParams(format!(
            "false-positive rate {fp_rate} is outside (0, 1)"
        )));
    }
    Ok(())
}
