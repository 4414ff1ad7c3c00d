use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};

/// Power and energy dissipated in the tissue resistance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyMetrics {
    /// Instantaneous power per sample (W).
    pub power: Vec<f64>,
    /// Running energy integral (J).
    pub cumulative_energy: Vec<f64>,
    pub total_energy: f64,
    pub peak_power: f64,
    pub average_power: f64,
}

/// Scalar part of [`EnergyMetrics`], for reports that skip the series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergySummary {
    pub samples: usize,
    pub total_energy: f64,
    pub peak_power: f64,
    pub average_power: f64,
}

impl EnergyMetrics {
    pub fn summary(&self) -> EnergySummary {
        EnergySummary {
            samples: self.power.len(),
            total_energy: self.total_energy,
            peak_power: self.peak_power,
            average_power: self.average_power,
        }
    }
}

/// Per-sample step width: one-sided differences at the edges, central
/// differences inside. Safe for non-uniform and repeated time stamps.
pub fn gradient(time: &[f64]) -> Vec<f64> {
    let n = time.len();
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n)
            .map(|i| {
                if i == 0 {
                    time[1] - time[0]
                } else if i == n - 1 {
                    time[n - 1] - time[n - 2]
                } else {
                    (time[i + 1] - time[i - 1]) / 2.0
                }
            })
            .collect(),
    }
}

pub fn energy_metrics(
    time: &[f64],
    voltage: &[f64],
    resistance: &[f64],
) -> Result<EnergyMetrics> {
    if time.is_empty() {
        return Err(ModelError::EmptySeries);
    }
    for len in [voltage.len(), resistance.len()] {
        if len != time.len() {
            return Err(ModelError::LengthMismatch {
                expected: time.len(),
                actual: len,
            });
        }
    }
    if let Some(pos) = resistance.iter().position(|&r| r == 0.0) {
        return Err(ModelError::invalid(
            "resistance",
            format!("sample {pos} is zero"),
        ));
    }

    let power: Vec<f64> = voltage
        .iter()
        .zip(resistance)
        .map(|(v, r)| v * v / r)
        .collect();
    let dt = gradient(time);
    let mut acc = 0.0;
    let cumulative_energy: Vec<f64> = power
        .iter()
        .zip(&dt)
        .map(|(p, d)| {
            acc += p * d;
            acc
        })
        .collect();

    let total_energy = cumulative_energy.last().copied().unwrap_or(0.0);
    let peak_power = power.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let average_power = power.iter().sum::<f64>() / power.len() as f64;
    Ok(EnergyMetrics {
        power,
        cumulative_energy,
        total_energy,
        peak_power,
        average_power,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_matches_edges_and_centre() {
        let dt = gradient(&[0.0, 1.0, 3.0, 6.0]);
        assert_eq!(dt, vec![1.0, 1.5, 2.5, 3.0]);
        assert_eq!(gradient(&[2.0]), vec![0.0]);
    }

    #[test]
    fn constant_power_integrates_linearly() {
        let time = [0.0, 0.5, 1.0, 1.5, 2.0];
        let voltage = [2.0; 5];
        let resistance = [4.0; 5];
        let m = energy_metrics(&time, &voltage, &resistance).unwrap();
        assert!(m.power.iter().all(|&p| p == 1.0));
        assert_eq!(m.peak_power, 1.0);
        assert_eq!(m.average_power, 1.0);
        // dt = [0.5; 5] so the sum covers 2.5 s of a 2 s window.
        assert!((m.total_energy - 2.5).abs() < 1e-12);
        assert!(m.cumulative_energy.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn peak_power_is_at_pulse_onset() {
        let pulse = crate::pulse::solve(5.0, 500.0, 20e-6, Default::default()).unwrap();
        let r = vec![500.0; pulse.len()];
        let m = energy_metrics(&pulse.time, &pulse.voltage, &r).unwrap();
        assert!((m.peak_power - 25.0 / 500.0).abs() < 1e-12);
        // Full discharge releases C·V0²/2. The 5τ window holds nearly all of it and the
        // one-sided first step overshoots by about half a sample of peak power.
        let full = 0.5 * 20e-6 * 25.0;
        assert!((m.total_energy - full).abs() / full < 0.05);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert_eq!(energy_metrics(&[], &[], &[]), Err(ModelError::EmptySeries));
        assert!(matches!(
            energy_metrics(&[0.0, 1.0], &[1.0], &[1.0, 1.0]),
            Err(ModelError::LengthMismatch {
                expected: 2,
                actual: 1
            })
        ));
        assert!(matches!(
            energy_metrics(&[0.0, 1.0], &[1.0, 1.0], &[1.0, 0.0]),
            Err(ModelError::InvalidParameter {
                name: "resistance",
                ..
            })
        ));
    }

    #[test]
    fn summary_drops_series() {
        let m = energy_metrics(&[0.0, 1.0], &[1.0, 1.0], &[1.0, 1.0]).unwrap();
        let s = m.summary();
        assert_eq!(s.samples, 2);
        assert_eq!(s.total_energy, m.total_energy);
    }
}
