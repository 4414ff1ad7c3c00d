use crate::error::{ensure_non_negative, ensure_positive, ModelError, Result};
use crate::feedback::{adjust, DEFAULT_V_MIN};
use crate::metrics::{energy_metrics, EnergyMetrics};
use crate::pulse::{solve, SamplingWindow};
use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::ops::Range;

pub const DEFAULT_R_MIN: f64 = 300.0;
pub const DEFAULT_R_MAX: f64 = 1000.0;

/// Inclusive resistance bounds (Ω) sampled per beat in arrhythmia mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResistanceRange {
    pub min: f64,
    pub max: f64,
}

impl Default for ResistanceRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_R_MIN,
            max: DEFAULT_R_MAX,
        }
    }
}

impl ResistanceRange {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("r_min", self.min)?;
        ensure_positive("r_max", self.max)?;
        if self.min > self.max {
            return Err(ModelError::invalid(
                "r_min",
                format!("must not exceed r_max ({} > {})", self.min, self.max),
            ));
        }
        Ok(())
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        rng.gen_range(self.min..=self.max)
    }
}

/// Parameters of a multi-beat simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Requested initial voltage (V).
    pub v0_user: f64,
    /// Tissue resistance used when arrhythmia mode is off (Ω).
    pub r_base: f64,
    /// Capacitance (F).
    pub c: f64,
    pub num_beats: usize,
    /// Time between beat onsets (s).
    pub interval: f64,
    pub use_feedback: bool,
    /// Minimum effective voltage at t = τ (V).
    pub v_min: f64,
    /// Per-beat resistance bounds; `None` keeps `r_base` for every beat.
    pub arrhythmia: Option<ResistanceRange>,
    pub window: SamplingWindow,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            v0_user: 5.0,
            r_base: 500.0,
            c: 20e-6,
            num_beats: 5,
            interval: 1.0,
            use_feedback: false,
            v_min: DEFAULT_V_MIN,
            arrhythmia: None,
            window: SamplingWindow::default(),
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_positive("v0_user", self.v0_user)?;
        ensure_positive("r_base", self.r_base)?;
        ensure_positive("c", self.c)?;
        if self.num_beats < 1 {
            return Err(ModelError::invalid("num_beats", "must be >= 1"));
        }
        if self.num_beats.checked_mul(self.window.num_points).is_none() {
            return Err(ModelError::invalid(
                "num_beats",
                format!(
                    "{} beats of {} samples overflow the series length",
                    self.num_beats, self.window.num_points
                ),
            ));
        }
        ensure_non_negative("interval", self.interval)?;
        if self.use_feedback {
            ensure_non_negative("v_min", self.v_min)?;
        }
        if let Some(range) = &self.arrhythmia {
            range.validate()?;
        }
        self.window.validate()
    }
}

/// Half-open sample range `[start, end)` of one beat in the stitched series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatRecord {
    pub start: usize,
    pub end: usize,
    /// Global time of the beat's local t = 0.
    pub onset: f64,
    pub resistance: f64,
    pub applied_v0: f64,
}

impl BeatRecord {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn tau(&self, c: f64) -> f64 {
        self.resistance * c
    }
}

/// Borrowed view over the samples of a single beat.
#[derive(Debug, Clone, Copy)]
pub struct BeatView<'a> {
    pub index: usize,
    pub record: &'a BeatRecord,
    pub time: &'a [f64],
    pub voltage: &'a [f64],
    pub resistance: &'a [f64],
    pub applied_v0: &'a [f64],
}

impl BeatView<'_> {
    pub fn peak_voltage(&self) -> f64 {
        self.voltage.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn energy_metrics(&self) -> Result<EnergyMetrics> {
        energy_metrics(self.time, self.voltage, self.resistance)
    }
}

/// Stitched output of a simulation. The parallel series can only be built by
/// [`simulate`], which keeps every beat contiguous and equally wide.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    c: f64,
    time: Vec<f64>,
    voltage: Vec<f64>,
    resistance: Vec<f64>,
    applied_v0: Vec<f64>,
    beats: Vec<BeatRecord>,
}

impl SimulationResult {
    fn with_capacity(c: f64, samples: usize, beats: usize) -> Self {
        Self {
            c,
            time: Vec::with_capacity(samples),
            voltage: Vec::with_capacity(samples),
            resistance: Vec::with_capacity(samples),
            applied_v0: Vec::with_capacity(samples),
            beats: Vec::with_capacity(beats),
        }
    }

    fn push_beat(&mut self, time: &[f64], voltage: Vec<f64>, offset: f64, r: f64, v0: f64) {
        let start = self.time.len();
        let n = time.len();
        self.time.extend(time.iter().map(|t| t + offset));
        self.voltage.extend(voltage);
        self.resistance.extend(std::iter::repeat(r).take(n));
        self.applied_v0.extend(std::iter::repeat(v0).take(n));
        self.beats.push(BeatRecord {
            start,
            end: start + n,
            onset: offset,
            resistance: r,
            applied_v0: v0,
        });
    }

    pub fn capacitance(&self) -> f64 {
        self.c
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn voltage(&self) -> &[f64] {
        &self.voltage
    }

    pub fn resistance(&self) -> &[f64] {
        &self.resistance
    }

    pub fn applied_v0(&self) -> &[f64] {
        &self.applied_v0
    }

    pub fn beats(&self) -> &[BeatRecord] {
        &self.beats
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn num_beats(&self) -> usize {
        self.beats.len()
    }

    pub fn beat(&self, index: usize) -> Option<BeatView<'_>> {
        let record = self.beats.get(index)?;
        let range = record.range();
        Some(BeatView {
            index,
            record,
            time: &self.time[range.clone()],
            voltage: &self.voltage[range.clone()],
            resistance: &self.resistance[range.clone()],
            applied_v0: &self.applied_v0[range],
        })
    }

    pub fn iter_beats(&self) -> impl Iterator<Item = BeatView<'_>> + '_ {
        (0..self.beats.len()).filter_map(move |i| self.beat(i))
    }

    /// Beat that owns sample `index`.
    pub fn beat_of_sample(&self, index: usize) -> Option<usize> {
        self.beats.iter().position(|b| b.range().contains(&index))
    }

    pub fn energy_metrics(&self) -> Result<EnergyMetrics> {
        energy_metrics(&self.time, &self.voltage, &self.resistance)
    }
}

/// Run `config.num_beats` discharge pulses back to back.
///
/// `rng` is only consumed in arrhythmia mode, one draw per beat.
pub fn simulate<R: Rng + ?Sized>(
    config: &SimulationConfig,
    rng: &mut R,
) -> Result<SimulationResult> {
    config.validate()?;
    let width = config.window.num_points;
    let mut result =
        SimulationResult::with_capacity(config.c, config.num_beats * width, config.num_beats);
    let mut offset = 0.0;
    for beat in 0..config.num_beats {
        let r = match &config.arrhythmia {
            Some(range) => range.sample(rng),
            None => config.r_base,
        };
        let v0 = if config.use_feedback {
            let adjusted = adjust(config.v0_user, r, config.c, config.v_min)?;
            if adjusted > config.v0_user {
                debug!(
                    "beat {}: feedback raised v0 {:.3} -> {:.3} V",
                    beat, config.v0_user, adjusted
                );
            }
            adjusted
        } else {
            config.v0_user
        };
        let pulse = solve(v0, r, config.c, config.window)?;
        debug!(
            "beat {}: onset {:.3} s, R {:.1} Ω, V0 {:.3} V, tau {:.5} s",
            beat, offset, r, v0, pulse.tau
        );
        result.push_beat(&pulse.time, pulse.voltage, offset, r, v0);
        offset += config.interval;
    }
    info!(
        "simulated {} beats ({} samples, feedback {}, arrhythmia {})",
        result.num_beats(),
        result.len(),
        config.use_feedback,
        config.arrhythmia.is_some()
    );
    Ok(result)
}

pub fn simulate_seeded(config: &SimulationConfig, seed: u64) -> Result<SimulationResult> {
    let mut rng = StdRng::seed_from_u64(seed);
    simulate(config, &mut rng)
}

pub fn simulate_entropy(config: &SimulationConfig) -> Result<SimulationResult> {
    simulate(config, &mut rand::thread_rng())
}
