use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::{json, Value};
use std::{error::Error, f64::consts::PI, fs, path::Path};
use tempfile::tempdir;

const EXPERIMENT: &str = r#"
name = "motor imagery"
epoch_start = -0.2
epoch_end = 0.8

[device]
type = "eeg_headset"
sample_rate = 256.0
channels = ["Fp1", "Fp2", "C3", "C4", "P7", "P8", "O1", "O2"]

[[labels]]
code = 1
description = "Left"

[[labels]]
code = 2
description = "Right"
"#;

fn eegp(root: &Path, args: &[&str]) -> Result<Value, Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("eegp");
    cmd.arg("--root").arg(root).arg("--log-level").arg("warn").args(args);
    let output = cmd.assert().success().get_output().stdout.clone();
    Ok(serde_json::from_slice(&output)?)
}

/// 1000 samples at 256 Hz with the given `(code, sample)` stimuli.
fn write_payload(path: &Path, stimuli: &[(i64, usize)]) -> Result<(), Box<dyn Error>> {
    let samples: Vec<Vec<f64>> = (0..1000)
        .map(|t| {
            (0..8)
                .map(|c| (2.0 * PI * (5.0 + c as f64) * t as f64 / 256.0).sin())
                .collect()
        })
        .collect();
    let timestamps: Vec<f64> = (0..1000).map(|t| t as f64 / 256.0).collect();
    let stimuli: Vec<Value> = stimuli
        .iter()
        .map(|(code, sample)| json!([[code], *sample as f64 / 256.0]))
        .collect();
    let payload = json!({
        "dataInput": [samples],
        "timestamp": timestamps,
        "stimuli": stimuli,
    });
    fs::write(path, serde_json::to_vec(&payload)?)?;
    Ok(())
}

fn setup(root: &Path) -> Result<(u64, u64), Box<dyn Error>> {
    eegp(root, &["init"])?;
    let exp_file = root.join("experiment.toml");
    fs::write(&exp_file, EXPERIMENT)?;
    let exp = eegp(root, &["experiment-add", "--file", exp_file.to_str().unwrap()])?;
    let subject = eegp(root, &["subject-add", "--name", "Ada", "--surname", "Lovelace"])?;
    Ok((exp["id"].as_u64().unwrap(), subject["id"].as_u64().unwrap()))
}

fn ingest(root: &Path, exp: u64, subject: u64, payload: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("eegp");
    cmd.arg("--root").arg(root).args([
        "ingest",
        "--name",
        "R1",
        "--subject",
        &subject.to_string(),
        "--experiment",
        &exp.to_string(),
        "--payload",
        payload.to_str().unwrap(),
    ]);
    cmd
}

#[test]
fn record_goes_through_the_pipeline() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let root = dir.path();
    let (exp, subject) = setup(root)?;
    let payload = root.join("upload.json");
    write_payload(&payload, &[(1, 100), (2, 500)])?;

    let output = ingest(root, exp, subject, &payload).assert().success().get_output().stdout.clone();
    let record: Value = serde_json::from_slice(&output)?;
    assert_eq!(record["epochs"], "Left: 1, Right: 1");
    assert_eq!(record["events"], 2);
    assert_eq!(record["lineage"], "original");
    let id = record["id"].as_u64().unwrap().to_string();
    assert!(root.join(record["path"].as_str().unwrap()).exists());

    let steps = root.join("steps.json");
    fs::write(
        &steps,
        r#"[{"kind":"bandpass","low_freq":1,"high_freq":"40"},
            {"kind":"notch","freq":"50","filter_method":"iir","order":"3"}]"#,
    )?;
    let prepped = eegp(root, &["preprocess", "--records", &id, "--steps", steps.to_str().unwrap()])?;
    let trail = &prepped[0]["preprocessing"];
    assert_eq!(trail[0]["position"], 1);
    assert_eq!(trail[1]["position"], 2);
    assert_eq!(
        trail[1]["description"],
        "Method: IIR, 3th-order Butterworth filter, Frequency: 50Hz"
    );
    assert_eq!(prepped[0]["lineage"], "prep");

    let copy = eegp(root, &["copy", "--record", &id, "--name", "R2"])?;
    assert_eq!(copy["lineage"], "copied");
    let copy_id = copy["id"].as_u64().unwrap().to_string();

    let featured = eegp(
        root,
        &["features", "--records", &format!("{},{}", id, copy_id), "--feature", "psd"],
    )?;
    assert_eq!(featured[0]["lineage"], "prep | feature");
    assert_eq!(featured[1]["lineage"], "feature");
    assert_eq!(featured[0]["duration"], 0.0);

    let same = eegp(root, &["same-features", "--record", &id])?;
    assert_eq!(same.as_array().unwrap().len(), 1);
    assert_eq!(same[0]["name"], "R2");

    eegp(root, &["training-add", "--name", "set", "--records", &id])?;
    eegp(root, &["delete", "--record", &id])?;
    let listed = eegp(root, &["list", "--experiment", &exp.to_string()])?;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    Ok(())
}

#[test]
fn unknown_stimulus_code_creates_nothing() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let root = dir.path();
    let (exp, subject) = setup(root)?;
    let payload = root.join("upload.json");
    write_payload(&payload, &[(1, 100), (9, 500)])?;

    ingest(root, exp, subject, &payload).assert().failure();
    let listed = eegp(root, &["list"])?;
    assert!(listed.as_array().unwrap().is_empty());
    let csvs = fs::read_dir(root.join("csvs"))?.count();
    assert_eq!(csvs, 0);
    Ok(())
}

#[test]
fn plots_and_preview() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let root = dir.path();
    let (exp, subject) = setup(root)?;
    let payload = root.join("upload.json");
    write_payload(&payload, &[(1, 100), (2, 500)])?;
    let output = ingest(root, exp, subject, &payload).assert().success().get_output().stdout.clone();
    let record: Value = serde_json::from_slice(&output)?;
    let id = record["id"].as_u64().unwrap().to_string();

    let out = root.join("figures/epochs.png");
    eegp(
        root,
        &["plot", "epochs", "--record", &id, "--n-events", "2", "--out", out.to_str().unwrap()],
    )?;
    let png = fs::read(&out)?;
    assert_eq!(&png[1..4], b"PNG");

    let topo = eegp(
        root,
        &["plot", "topomap", "--record", &id, "--label", "Left", "--times", "0,0.1", "--extrapolate", "head"],
    )?;
    assert!(topo["img"].as_str().map_or(false, |s| !s.is_empty()));

    let preview = eegp(root, &["preview", "--record", &id, "--start", "0", "--duration", "1"])?;
    let series = preview.as_array().unwrap();
    assert_eq!(series.len(), 9);
    assert_eq!(series[0].as_array().unwrap().len(), 256);
    assert_eq!(series[8], json!([{ "x": 100, "stim": 1.0 }]));
    Ok(())
}
