use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use log::info;
use pacer_lib::{
    microfarads, simulate, validate_parameters, EnergyMetrics, EnergySummary, ResistanceRange,
    SafetyReport, SamplingWindow, SimulationConfig, SimulationResult, DEFAULT_NUM_POINTS,
    DEFAULT_R_MAX, DEFAULT_R_MIN, DEFAULT_T_MAX, DEFAULT_V_MIN,
};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub const SAMPLES_FILE: &str = "samples.csv";
pub const BEATS_FILE: &str = "beats.tsv";
pub const MANIFEST_FILE: &str = "session.json";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SessionPreset {
    pub name: String,
    #[serde(default)]
    pub circuit: CircuitSpec,
    #[serde(default)]
    pub pacing: PacingSpec,
    #[serde(default)]
    pub feedback: FeedbackSpec,
    #[serde(default)]
    pub arrhythmia: ArrhythmiaSpec,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CircuitSpec {
    pub v0: f64,
    pub r: f64,
    pub c_uf: f64,
}

impl Default for CircuitSpec {
    fn default() -> Self {
        Self {
            v0: 5.0,
            r: 500.0,
            c_uf: 20.0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PacingSpec {
    pub num_beats: usize,
    pub interval_s: f64,
    pub t_max_s: f64,
    pub num_points: usize,
}

impl Default for PacingSpec {
    fn default() -> Self {
        Self {
            num_beats: 5,
            interval_s: 1.0,
            t_max_s: DEFAULT_T_MAX,
            num_points: DEFAULT_NUM_POINTS,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct FeedbackSpec {
    pub enabled: bool,
    pub v_min: f64,
}

impl Default for FeedbackSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            v_min: DEFAULT_V_MIN,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ArrhythmiaSpec {
    pub enabled: bool,
    pub r_min: f64,
    pub r_max: f64,
    pub seed: Option<u64>,
}

impl Default for ArrhythmiaSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            r_min: DEFAULT_R_MIN,
            r_max: DEFAULT_R_MAX,
            seed: None,
        }
    }
}

impl SessionPreset {
    pub fn to_config(&self) -> SimulationConfig {
        SimulationConfig {
            v0_user: self.circuit.v0,
            r_base: self.circuit.r,
            c: microfarads(self.circuit.c_uf),
            num_beats: self.pacing.num_beats,
            interval: self.pacing.interval_s,
            use_feedback: self.feedback.enabled,
            v_min: self.feedback.v_min,
            arrhythmia: self.arrhythmia.enabled.then_some(ResistanceRange {
                min: self.arrhythmia.r_min,
                max: self.arrhythmia.r_max,
            }),
            window: SamplingWindow {
                t_max: self.pacing.t_max_s,
                num_points: self.pacing.num_points,
            },
        }
    }

    pub fn seed(&self) -> u64 {
        self.arrhythmia.seed.unwrap_or(0)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SampleRow {
    pub time: f64,
    pub voltage: f64,
    pub resistance: f64,
    pub applied_v0: f64,
    pub power: f64,
    pub beat: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BeatRow {
    pub beat: usize,
    pub start: usize,
    pub end: usize,
    pub onset: f64,
    pub resistance: f64,
    pub applied_v0: f64,
    pub tau: f64,
    pub peak_voltage: f64,
    pub v_at_tau: f64,
    pub energy: f64,
    /// Safety checks on the voltage and resistance this beat actually used.
    pub effective: bool,
    pub safe: bool,
    pub duration_ok: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionManifest {
    pub name: String,
    pub preset: SessionPreset,
    pub seed: u64,
    pub total_beats: usize,
    pub total_samples: usize,
    pub energy: EnergySummary,
    /// Checks on the preset's own V0 and R, before feedback or arrhythmia.
    pub requested_safety: SafetyReport,
    /// Beats whose applied parameters pass every check.
    pub valid_beats: usize,
    pub start_time_unix: f64,
}

pub struct SessionBundle {
    pub samples: Vec<SampleRow>,
    pub beats: Vec<BeatRow>,
    pub manifest: SessionManifest,
}

pub fn read_preset(path: &Path) -> Result<SessionPreset> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read preset {}", path.display()))?;
    let preset: SessionPreset =
        toml::from_str(&contents).with_context(|| format!("parsing preset {}", path.display()))?;
    Ok(preset)
}

/// One row per sample of `result`, with power taken from `metrics`.
pub fn sample_rows(result: &SimulationResult, metrics: &EnergyMetrics) -> Vec<SampleRow> {
    let mut samples = Vec::with_capacity(result.len());
    for beat in result.iter_beats() {
        for (offset, i) in beat.record.range().enumerate() {
            samples.push(SampleRow {
                time: beat.time[offset],
                voltage: beat.voltage[offset],
                resistance: beat.resistance[offset],
                applied_v0: beat.applied_v0[offset],
                power: metrics.power[i],
                beat: beat.index + 1,
            });
        }
    }
    samples
}

pub fn run_session(preset: &SessionPreset) -> Result<SessionBundle> {
    let config = preset.to_config();
    let seed = preset.seed();
    let mut rng = StdRng::seed_from_u64(seed);
    let result = simulate(&config, &mut rng)
        .with_context(|| format!("simulating preset {}", preset.name))?;
    let metrics = result.energy_metrics().context("computing energy metrics")?;
    let requested_safety =
        validate_parameters(config.v0_user, config.r_base, config.c, config.v_min)
            .context("validating preset parameters")?;

    let samples = sample_rows(&result, &metrics);
    let mut beats = Vec::with_capacity(result.num_beats());
    for beat in result.iter_beats() {
        let record = beat.record;
        let energy = beat
            .energy_metrics()
            .with_context(|| format!("energy of beat {}", beat.index + 1))?
            .total_energy;
        let safety = validate_parameters(
            record.applied_v0,
            record.resistance,
            result.capacitance(),
            config.v_min,
        )
        .with_context(|| format!("validating beat {}", beat.index + 1))?;
        beats.push(BeatRow {
            beat: beat.index + 1,
            start: record.start,
            end: record.end,
            onset: record.onset,
            resistance: record.resistance,
            applied_v0: record.applied_v0,
            tau: record.tau(result.capacitance()),
            peak_voltage: beat.peak_voltage(),
            v_at_tau: safety.v_at_tau,
            energy,
            effective: safety.is_effective,
            safe: safety.is_safe,
            duration_ok: safety.is_duration_ok,
        });
    }

    let start_time = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_secs_f64())
        .unwrap_or(0.0);
    let valid_beats = beats
        .iter()
        .filter(|b| b.effective && b.safe && b.duration_ok)
        .count();
    let manifest = SessionManifest {
        name: preset.name.clone(),
        preset: preset.clone(),
        seed,
        total_beats: beats.len(),
        total_samples: samples.len(),
        energy: metrics.summary(),
        requested_safety,
        valid_beats,
        start_time_unix: start_time,
    };
    info!(
        "session {}: {} beats ({} valid), {:.3e} J total",
        manifest.name,
        manifest.total_beats,
        manifest.valid_beats,
        manifest.energy.total_energy
    );
    Ok(SessionBundle {
        samples,
        beats,
        manifest,
    })
}

/// Serialize `samples` as CSV with a header row.
pub fn write_samples<W: io::Write>(out: W, samples: &[SampleRow]) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(out);
    for sample in samples {
        writer.serialize(sample)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_samples_csv(path: &Path, samples: &[SampleRow]) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("creating samples {}", path.display()))?;
    write_samples(file, samples).with_context(|| format!("writing samples {}", path.display()))
}

pub fn read_samples_csv(path: &Path) -> Result<Vec<SampleRow>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("opening samples {}", path.display()))?;
    let mut samples = Vec::new();
    for (idx, row) in reader.deserialize::<SampleRow>().enumerate() {
        let row = row.with_context(|| format!("parsing sample row {}", idx + 1))?;
        samples.push(row);
    }
    Ok(samples)
}

pub fn write_beats_tsv(path: &Path, beats: &[BeatRow]) -> Result<()> {
    let file =
        fs::File::create(path).with_context(|| format!("creating beats {}", path.display()))?;
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_writer(file);
    for beat in beats {
        writer.serialize(beat)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_beats_tsv(path: &Path) -> Result<Vec<BeatRow>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(Trim::All)
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("opening beats {}", path.display()))?;
    let mut beats = Vec::new();
    for row in reader.deserialize::<BeatRow>() {
        let parsed = row.with_context(|| format!("parsing beats in {}", path.display()))?;
        beats.push(parsed);
    }
    Ok(beats)
}

pub fn write_manifest(path: &Path, manifest: &SessionManifest) -> Result<()> {
    let file =
        fs::File::create(path).with_context(|| format!("creating manifest {}", path.display()))?;
    serde_json::to_writer_pretty(file, manifest)
        .with_context(|| format!("writing manifest {}", path.display()))?;
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<SessionManifest> {
    let file =
        fs::File::open(path).with_context(|| format!("opening manifest {}", path.display()))?;
    let manifest = serde_json::from_reader::<_, SessionManifest>(file)
        .with_context(|| format!("parsing manifest {}", path.display()))?;
    Ok(manifest)
}

/// Write all three bundle files under `dir`, creating it if needed.
pub fn write_bundle(dir: &Path, bundle: &SessionBundle) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    write_samples_csv(&dir.join(SAMPLES_FILE), &bundle.samples)?;
    write_beats_tsv(&dir.join(BEATS_FILE), &bundle.beats)?;
    write_manifest(&dir.join(MANIFEST_FILE), &bundle.manifest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn preset(enabled: bool, seed: Option<u64>) -> SessionPreset {
        SessionPreset {
            name: "test".into(),
            circuit: CircuitSpec::default(),
            pacing: PacingSpec {
                num_beats: 3,
                ..PacingSpec::default()
            },
            feedback: FeedbackSpec {
                enabled: true,
                v_min: 1.0,
            },
            arrhythmia: ArrhythmiaSpec {
                enabled,
                seed,
                ..ArrhythmiaSpec::default()
            },
        }
    }

    #[test]
    fn preset_converts_units() {
        let config = preset(false, None).to_config();
        assert!((config.c - 20e-6).abs() < 1e-18);
        assert_eq!(config.num_beats, 3);
        assert!(config.arrhythmia.is_none());
        assert!(config.use_feedback);
    }

    #[test]
    fn bundle_has_one_row_per_sample_and_beat() {
        let bundle = run_session(&preset(false, None)).unwrap();
        assert_eq!(bundle.samples.len(), 600);
        assert_eq!(bundle.beats.len(), 3);
        assert_eq!(bundle.manifest.total_samples, 600);
        assert_eq!(bundle.beats[1].start, 200);
        assert_eq!(bundle.beats[1].end, 400);
        assert_eq!(bundle.beats[2].onset, 2.0);
        assert_eq!(bundle.samples[200].beat, 2);
        assert!((bundle.beats[0].tau - 0.01).abs() < 1e-12);
        assert!((bundle.beats[0].peak_voltage - 5.0).abs() < 1e-12);
        let per_beat: f64 = bundle.beats.iter().map(|b| b.energy).sum();
        assert!(per_beat > 0.0);
    }

    #[test]
    fn seed_makes_arrhythmia_reproducible() {
        let a = run_session(&preset(true, Some(7))).unwrap();
        let b = run_session(&preset(true, Some(7))).unwrap();
        let ra: Vec<f64> = a.beats.iter().map(|row| row.resistance).collect();
        let rb: Vec<f64> = b.beats.iter().map(|row| row.resistance).collect();
        assert_eq!(ra, rb);
        assert_eq!(a.manifest.seed, 7);
    }

    #[test]
    fn safety_follows_applied_beat_parameters() {
        let mut preset = preset(true, Some(42));
        preset.circuit.v0 = 2.0;
        preset.pacing.num_beats = 8;
        let bundle = run_session(&preset).unwrap();
        // The preset's own 2 V is too weak, but feedback lifts every beat.
        assert!(!bundle.manifest.requested_safety.is_effective);
        for row in &bundle.beats {
            assert!(row.effective, "beat {}", row.beat);
            assert!(row.safe);
            assert!(row.v_at_tau >= 1.0 - 1e-12);
            let report = validate_parameters(row.applied_v0, row.resistance, 20e-6, 1.0).unwrap();
            assert_eq!(row.duration_ok, report.is_duration_ok);
            assert!((row.tau * 1000.0 - report.tau_ms).abs() < 1e-9);
        }
        let valid = bundle
            .beats
            .iter()
            .filter(|b| b.effective && b.safe && b.duration_ok)
            .count();
        assert_eq!(bundle.manifest.valid_beats, valid);
    }

    #[test]
    fn short_pulses_are_all_valid() {
        let mut preset = preset(false, None);
        preset.circuit.c_uf = 1.0;
        let bundle = run_session(&preset).unwrap();
        assert_eq!(bundle.manifest.valid_beats, 3);
        assert!(bundle.manifest.requested_safety.overall_valid);
    }

    #[test]
    fn csv_rows_carry_power_and_beat() {
        let bundle = run_session(&preset(false, None)).unwrap();
        let mut buf = Vec::new();
        write_samples(&mut buf, &bundle.samples[..2]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("time,voltage,resistance,applied_v0,power,beat")
        );
        assert_eq!(lines.count(), 2);
    }

    #[test]
    fn manifest_write_error_names_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing/session.json");
        let bundle = run_session(&preset(false, None)).unwrap();
        let err = write_manifest(&path, &bundle.manifest).unwrap_err();
        assert!(format!("{:#}", err).contains("session.json"));
    }

    #[test]
    fn invalid_preset_is_reported() {
        let mut bad = preset(true, None);
        bad.arrhythmia.r_min = 2000.0;
        let err = run_session(&bad).err().unwrap();
        assert!(format!("{:#}", err).contains("r_min"));
    }

    #[test]
    fn writes_and_reads_bundle() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("sessions/test");
        let bundle = run_session(&preset(false, None)).unwrap();
        write_bundle(&out, &bundle).unwrap();

        let beats = read_beats_tsv(&out.join(BEATS_FILE)).unwrap();
        assert_eq!(beats.len(), 3);
        assert_eq!(beats[2].start, 400);
        assert!((beats[1].resistance - 500.0).abs() < 1e-9);
        let samples = read_samples_csv(&out.join(SAMPLES_FILE)).unwrap();
        assert_eq!(samples.len(), bundle.samples.len());
        assert_eq!(samples[0].beat, 1);
        let manifest = read_manifest(&out.join(MANIFEST_FILE)).unwrap();
        assert_eq!(manifest.name, "test");
        assert_eq!(manifest.total_beats, 3);
        assert_eq!(beats[0].effective, bundle.beats[0].effective);
    }

    #[test]
    fn parses_sparse_preset() {
        let preset: SessionPreset = toml::from_str(
            r#"
name = "sparse"
[arrhythmia]
enabled = true
seed = 11
"#,
        )
        .unwrap();
        assert_eq!(preset.circuit, CircuitSpec::default());
        assert_eq!(preset.arrhythmia.r_max, DEFAULT_R_MAX);
        assert_eq!(preset.seed(), 11);
    }
}
