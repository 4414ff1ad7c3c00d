use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{error::Error, fs, path::PathBuf};
use tempfile::tempdir;

#[test]
fn run_writes_bundle() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let out = temp.path().join("sessions/baseline");
    let mut cmd = cargo_bin_cmd!("pacer");
    cmd.args([
        "run",
        "--preset",
        &sample_path("test_data/baseline.toml"),
        "--out",
        out.to_str().expect("utf8 path"),
    ]);
    let stdout = cmd.assert().success().get_output().stdout.clone();
    let manifest: Value = serde_json::from_slice(&stdout)?;
    assert_eq!(manifest["name"], "baseline");
    assert_eq!(manifest["total_beats"], 3);
    assert_eq!(manifest["total_samples"], 600);

    let beats = fs::read_to_string(out.join("beats.tsv"))?;
    assert_eq!(beats.lines().count(), 4);
    assert!(beats.starts_with("beat\tstart\tend"));
    let samples = fs::read_to_string(out.join("samples.csv"))?;
    assert_eq!(samples.lines().count(), 601);
    let on_disk: Value = serde_json::from_str(&fs::read_to_string(out.join("session.json"))?)?;
    assert_eq!(on_disk["seed"], 0);
    Ok(())
}

#[test]
fn arrhythmia_preset_is_seeded() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let mut resistances = Vec::new();
    for run in ["a", "b"] {
        let out = temp.path().join(run);
        let mut cmd = cargo_bin_cmd!("pacer");
        cmd.args([
            "run",
            "--preset",
            &sample_path("test_data/arrhythmia.toml"),
            "--out",
            out.to_str().expect("utf8 path"),
        ]);
        cmd.assert().success();
        resistances.push(fs::read_to_string(out.join("beats.tsv"))?);
    }
    assert_eq!(resistances[0], resistances[1]);
    assert_eq!(resistances[0].lines().count(), 9);

    // Feedback lifts the preset's 2 V, so every beat reaches V_min at τ.
    let manifest: Value =
        serde_json::from_str(&fs::read_to_string(temp.path().join("a/session.json"))?)?;
    assert_eq!(manifest["requested_safety"]["is_effective"], false);
    let header: Vec<&str> = resistances[0]
        .lines()
        .next()
        .expect("header")
        .split('\t')
        .collect();
    let col = header
        .iter()
        .position(|&h| h == "effective")
        .expect("effective column");
    for row in resistances[0].lines().skip(1) {
        assert_eq!(row.split('\t').nth(col), Some("true"));
    }
    Ok(())
}

#[test]
fn missing_preset_fails() {
    let temp = tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("pacer");
    cmd.args([
        "run",
        "--preset",
        temp.path().join("nope.toml").to_str().unwrap(),
        "--out",
        temp.path().join("out").to_str().unwrap(),
    ]);
    cmd.assert().failure();
}

fn sample_path(relative: &str) -> String {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .join(relative);
    root.to_string_lossy().to_string()
}
