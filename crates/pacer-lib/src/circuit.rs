use crate::error::{ensure_positive, Result};
use serde::{Deserialize, Serialize};

/// Electrical configuration of one beat: stored voltage (V), series
/// resistance of tissue plus electrode (Ω) and capacitance (F).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircuitParameters {
    v0: f64,
    r: f64,
    c: f64,
}

impl CircuitParameters {
    pub fn new(v0: f64, r: f64, c: f64) -> Result<Self> {
        ensure_positive("v0", v0)?;
        ensure_positive("r", r)?;
        ensure_positive("c", c)?;
        Ok(Self { v0, r, c })
    }

    pub fn v0(&self) -> f64 {
        self.v0
    }

    pub fn r(&self) -> f64 {
        self.r
    }

    pub fn c(&self) -> f64 {
        self.c
    }

    /// Time constant τ = R·C in seconds.
    pub fn tau(&self) -> f64 {
        self.r * self.c
    }
}

/// Convert a capacitance in microfarads to farads.
pub fn microfarads(c_uf: f64) -> f64 {
    c_uf * 1e-6
}
