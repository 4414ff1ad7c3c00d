use crate::error::{ensure_non_negative, Result};
use std::f64::consts::E;

pub const DEFAULT_V_MIN: f64 = 1.0;

/// Smallest initial voltage whose discharge still reaches `v_min` at t = τ.
pub fn required_v0(v_min: f64) -> f64 {
    v_min * E
}

/// Raise `v0_target` so that `V(τ) >= v_min`; never lowers it.
///
/// `V(τ) = V0·e⁻¹` for every RC pair, so `r` and `c` drop out of the
/// threshold. They are still taken so callers can pass the beat's circuit.
pub fn adjust(v0_target: f64, _r: f64, _c: f64, v_min: f64) -> Result<f64> {
    ensure_non_negative("v_min", v_min)?;
    Ok(v0_target.max(required_v0(v_min)))
}
