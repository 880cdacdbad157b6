//! Raw capture payloads as uploaded by the acquisition client.
//!
//! A payload carries three parallel arrays: `dataInput` (blocks of samples,
//! one value per channel), `timestamp` (one per sample) and `stimuli`
//! (`[code, timestamp]` pairs, where `code` may be wrapped in an array).

use crate::{
    error::{Error, Result},
    experiment::{Experiment, MAX_HEADSET_CHANNELS},
    io::table::{Table, STIMULUS_COLUMN, TIMESTAMP_COLUMN},
};
use log::{debug, info};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadPayload {
    #[serde(rename = "dataInput")]
    pub data_input: Vec<Vec<Vec<f64>>>,
    pub timestamp: Vec<f64>,
    #[serde(default)]
    pub stimuli: Vec<StimulusEvent>,
}

/// One discrete marker: code plus the time it was emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StimulusEvent(pub StimulusCode, pub f64);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StimulusCode {
    Number(f64),
    List(Vec<f64>),
}

impl StimulusEvent {
    pub fn new(code: i64, timestamp: f64) -> Self {
        Self(StimulusCode::Number(code as f64), timestamp)
    }

    pub fn code(&self) -> Result<i64> {
        let raw = match &self.0 {
            StimulusCode::Number(value) => Some(*value),
            StimulusCode::List(values) => values.first().copied(),
        };
        match raw {
            Some(value) if value.is_finite() && value.fract() == 0.0 => Ok(value as i64),
            Some(value) => Err(Error::validation(format!(
                "stimulus code {} is not an integer",
                value
            ))),
            None => Err(Error::validation("stimulus event without a code")),
        }
    }

    pub fn timestamp(&self) -> f64 {
        self.1
    }
}

impl UploadPayload {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn n_samples(&self) -> usize {
        self.data_input.iter().map(Vec::len).sum()
    }

    /// Concatenate payloads in input order.
    pub fn merge(payloads: &[UploadPayload]) -> UploadPayload {
        let mut merged = UploadPayload::default();
        for payload in payloads {
            merged.data_input.extend(payload.data_input.iter().cloned());
            merged.timestamp.extend_from_slice(&payload.timestamp);
            merged.stimuli.extend(payload.stimuli.iter().cloned());
        }
        merged
    }
}

/// Reject the upload when any stimulus carries a code the experiment does
/// not define.
pub fn check_stimulus_codes(payloads: &[UploadPayload], experiment: &Experiment) -> Result<()> {
    for payload in payloads {
        for stimulus in &payload.stimuli {
            let code = stimulus.code()?;
            if !experiment.has_code(code) {
                return Err(Error::validation(format!(
                    "stimulus code {} at t={} matches none of the experiment labels",
                    code,
                    stimulus.timestamp()
                )));
            }
        }
    }
    Ok(())
}

/// Index of the sample closest in time to `t`; the first minimum wins.
pub fn nearest_sample(timestamps: &[f64], t: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, ts) in timestamps.iter().enumerate() {
        let diff = (ts - t).abs();
        match best {
            Some((_, best_diff)) if diff >= best_diff => {}
            _ => best = Some((idx, diff)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Build the headset table (`Timestamp`, channels, `Stimulus`) from uploads.
///
/// `time_correction` is added to every sample timestamp before stimuli are
/// aligned; stimulus times are taken as-is.
pub fn build_headset_table(
    payloads: &[UploadPayload],
    experiment: &Experiment,
    time_correction: f64,
) -> Result<Table> {
    experiment.device.ensure_supported()?;
    check_stimulus_codes(payloads, experiment)?;

    let merged = UploadPayload::merge(payloads);
    let width = experiment
        .device
        .channels_count()
        .min(MAX_HEADSET_CHANNELS);
    let n_samples = merged.n_samples();
    if n_samples == 0 {
        return Err(Error::validation("upload holds no samples"));
    }
    if merged.timestamp.len() != n_samples {
        return Err(Error::validation(format!(
            "{} timestamps for {} samples",
            merged.timestamp.len(),
            n_samples
        )));
    }

    let timestamps: Vec<f64> = merged
        .timestamp
        .iter()
        .map(|t| t + time_correction)
        .collect();

    let mut headers = vec![TIMESTAMP_COLUMN.to_string()];
    headers.extend(experiment.device.channels[..width].iter().cloned());
    headers.push(STIMULUS_COLUMN.to_string());
    let mut table = Table::new(headers);

    let samples = merged.data_input.iter().flat_map(|block| block.iter());
    for (idx, (sample, ts)) in samples.zip(&timestamps).enumerate() {
        if sample.len() < width {
            return Err(Error::validation(format!(
                "sample {} has {} values, expected {}",
                idx,
                sample.len(),
                width
            )));
        }
        let mut row = Vec::with_capacity(width + 2);
        row.push(*ts);
        row.extend_from_slice(&sample[..width]);
        row.push(0.0);
        table.push_row(row)?;
    }

    let stim_col = table.n_cols() - 1;
    for stimulus in &merged.stimuli {
        let code = stimulus.code()?;
        if let Some(idx) = nearest_sample(&timestamps, stimulus.timestamp()) {
            debug!(
                "stimulus {} at t={} aligned to sample {}",
                code,
                stimulus.timestamp(),
                idx
            );
            table.rows[idx][stim_col] = code as f64;
        }
    }
    info!(
        "built headset table: {} samples, {} channels, {} stimuli",
        n_samples,
        width,
        merged.stimuli.len()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::fixtures;

    fn payload(n: usize, channels: usize, fs: f64, stimuli: Vec<StimulusEvent>) -> UploadPayload {
        let block: Vec<Vec<f64>> = (0..n)
            .map(|t| (0..channels).map(|c| (t * 10 + c) as f64).collect())
            .collect();
        UploadPayload {
            data_input: vec![block],
            timestamp: (0..n).map(|t| t as f64 / fs).collect(),
            stimuli,
        }
    }

    #[test]
    fn parses_wrapped_and_bare_codes() {
        let json = br#"{"dataInput":[[[1,2]]],"timestamp":[0.0],"stimuli":[[[2],0.5],[1,0.7]]}"#;
        let payload = UploadPayload::from_json(json).unwrap();
        assert_eq!(payload.stimuli[0].code().unwrap(), 2);
        assert_eq!(payload.stimuli[1].code().unwrap(), 1);
        assert_eq!(payload.stimuli[1].timestamp(), 0.7);
    }

    #[test]
    fn nearest_sample_prefers_first_tie() {
        let ts = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(nearest_sample(&ts, 1.5), Some(1));
        assert_eq!(nearest_sample(&ts, 2.9), Some(3));
        assert_eq!(nearest_sample(&[], 2.9), None);
    }

    #[test]
    fn stamps_stimuli_and_truncates_channels() {
        let exp = fixtures::left_right(256.0);
        let stimuli = vec![
            StimulusEvent::new(1, 100.0 / 256.0 + 0.001),
            StimulusEvent::new(2, 500.0 / 256.0),
        ];
        let table = build_headset_table(&[payload(1000, 10, 256.0, stimuli)], &exp, 0.0).unwrap();
        assert_eq!(table.n_rows(), 1000);
        assert_eq!(table.n_cols(), 10);
        assert_eq!(table.headers[1], "Fp1");
        let stim = table.column(9);
        assert_eq!(stim[100], 1.0);
        assert_eq!(stim[500], 2.0);
        assert_eq!(stim.iter().filter(|v| **v != 0.0).count(), 2);
    }

    #[test]
    fn concatenates_payloads_in_order() {
        let exp = fixtures::left_right(100.0);
        let first = payload(5, 8, 100.0, vec![]);
        let mut second = payload(5, 8, 100.0, vec![StimulusEvent::new(1, 0.08)]);
        second.timestamp = (5..10).map(|t| t as f64 / 100.0).collect();
        let table = build_headset_table(&[first, second], &exp, 0.0).unwrap();
        assert_eq!(table.n_rows(), 10);
        assert_eq!(table.rows[5][1], 0.0);
        assert_eq!(table.rows[8][9], 1.0);
    }

    #[test]
    fn time_correction_shifts_samples_only() {
        let exp = fixtures::left_right(100.0);
        let p = payload(20, 8, 100.0, vec![StimulusEvent::new(2, 0.15)]);
        let table = build_headset_table(&[p], &exp, 0.05).unwrap();
        assert_eq!(table.rows[10][9], 2.0);
        assert!((table.rows[0][0] - 0.05).abs() < 1e-12);
    }

    #[test]
    fn rejects_unknown_codes_across_payloads() {
        let exp = fixtures::left_right(256.0);
        let good = payload(10, 8, 256.0, vec![]);
        let bad = payload(10, 8, 256.0, vec![StimulusEvent::new(7, 0.01)]);
        let err = build_headset_table(&[good, bad], &exp, 0.0).unwrap_err();
        assert!(matches!(err, Error::Validation(msg) if msg.contains("code 7")));
    }

    #[test]
    fn rejects_short_samples_and_timestamp_mismatch() {
        let exp = fixtures::left_right(256.0);
        let short = payload(4, 3, 256.0, vec![]);
        assert!(build_headset_table(&[short], &exp, 0.0).is_err());
        let mut skewed = payload(4, 8, 256.0, vec![]);
        skewed.timestamp.pop();
        assert!(build_headset_table(&[skewed], &exp, 0.0).is_err());
    }
}
