use crate::error::{ensure_non_negative, ensure_positive, Result};
use crate::feedback::required_v0;
use log::warn;
use serde::{Deserialize, Serialize};

/// Typical upper bound for a pacemaker output (V).
pub const MAX_SAFE_V0: f64 = 15.0;
/// Accepted pulse duration window (ms), measured at 3τ.
pub const PULSE_DURATION_MS: (f64, f64) = (0.5, 2.0);

/// Plausibility checks for one parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub tau_ms: f64,
    pub v_at_tau: f64,
    pub is_effective: bool,
    pub is_safe: bool,
    /// 3τ, by which ~95% of the charge has been released.
    pub pulse_duration_ms: f64,
    pub is_duration_ok: bool,
    pub overall_valid: bool,
}

pub fn validate_parameters(v0: f64, r: f64, c: f64, v_min: f64) -> Result<SafetyReport> {
    ensure_positive("r", r)?;
    ensure_positive("c", c)?;
    ensure_non_negative("v_min", v_min)?;

    let tau_ms = r * c * 1000.0;
    let v_at_tau = v0 * (-1.0_f64).exp();
    // Compared on V0 so a feedback-raised voltage of exactly `v_min·e` passes
    // regardless of rounding in `v_at_tau`.
    let is_effective = v0 >= required_v0(v_min);
    let is_safe = v0 <= MAX_SAFE_V0;
    let pulse_duration_ms = 3.0 * tau_ms;
    let is_duration_ok =
        (PULSE_DURATION_MS.0..=PULSE_DURATION_MS.1).contains(&pulse_duration_ms);
    let overall_valid = is_effective && is_safe && is_duration_ok;
    if !overall_valid {
        warn!(
            "parameters fail safety checks: effective={} safe={} duration_ok={} ({:.2} ms)",
            is_effective, is_safe, is_duration_ok, pulse_duration_ms
        );
    }
    Ok(SafetyReport {
        tau_ms,
        v_at_tau,
        is_effective,
        is_safe,
        pulse_duration_ms,
        is_duration_ok,
        overall_valid,
    })
}
