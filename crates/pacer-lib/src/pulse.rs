use crate::circuit::CircuitParameters;
use crate::error::{ensure_positive, ModelError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_T_MAX: f64 = 0.05;
pub const DEFAULT_NUM_POINTS: usize = 200;

/// Sampling window shared by every pulse of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingWindow {
    /// Window length in seconds, inclusive of both endpoints.
    pub t_max: f64,
    pub num_points: usize,
}

impl Default for SamplingWindow {
    fn default() -> Self {
        Self {
            t_max: DEFAULT_T_MAX,
            num_points: DEFAULT_NUM_POINTS,
        }
    }
}

impl SamplingWindow {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("t_max", self.t_max)?;
        if self.num_points < 2 {
            return Err(ModelError::invalid(
                "num_points",
                format!("must be >= 2, got {}", self.num_points),
            ));
        }
        Ok(())
    }

    /// `num_points` evenly spaced values over `[0, t_max]`.
    pub fn times(&self) -> Vec<f64> {
        let step = self.t_max / (self.num_points - 1) as f64;
        let last = self.num_points - 1;
        (0..self.num_points)
            .map(|i| if i == last { self.t_max } else { i as f64 * step })
            .collect()
    }
}

/// One pulse evaluated on its local time axis (starting at 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseSample {
    pub tau: f64,
    pub time: Vec<f64>,
    pub voltage: Vec<f64>,
}

impl PulseSample {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// Closed-form discharge `V(t) = V0·exp(-t/τ)`, the solution of
/// `dq/dt + q/(RC) = 0` with `q(0) = C·V0`.
pub fn discharge_voltage(v0: f64, tau: f64, t: f64) -> f64 {
    v0 * (-t / tau).exp()
}

/// Evaluate one RC discharge pulse over `window`.
pub fn solve(v0: f64, r: f64, c: f64, window: SamplingWindow) -> Result<PulseSample> {
    let params = CircuitParameters::new(v0, r, c)?;
    solve_circuit(&params, window)
}

pub fn solve_circuit(params: &CircuitParameters, window: SamplingWindow) -> Result<PulseSample> {
    window.validate()?;
    let tau = params.tau();
    let time = window.times();
    let voltage = time
        .iter()
        .map(|&t| discharge_voltage(params.v0(), tau, t))
        .collect();
    Ok(PulseSample { tau, time, voltage })
}
