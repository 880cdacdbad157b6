//! Signal transforms applied to stored recordings.
//!
//! Each transform consumes a [`RawSignal`] and yields a new one together with
//! the audit entry describing it. Frequencies are carried as the text the
//! user typed so the audit trail repeats their input verbatim.

pub mod fir;
pub mod ica;
pub mod iir;
pub mod resample;

use crate::{
    error::{Error, Result},
    signal::RawSignal,
};
use log::{debug, info};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub use fir::FirPhase;
pub use ica::{Ica, IcaConfig, IcaMethod};

/// Width of a notch as a fraction of its centre frequency.
const NOTCH_WIDTH_RATIO: f64 = 1.0 / 200.0;
/// Transition band of FIR notches, Hz.
const NOTCH_TRANSITION: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMethod {
    #[default]
    Fir,
    Iir,
}

/// Audit kind of a preprocessing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreprocessingKind {
    Bandpass,
    Notch,
    Downsampling,
    #[serde(rename = "ICA")]
    Ica,
}

impl fmt::Display for PreprocessingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PreprocessingKind::Bandpass => "Bandpass",
            PreprocessingKind::Notch => "Notch",
            PreprocessingKind::Downsampling => "Downsampling",
            PreprocessingKind::Ica => "ICA",
        };
        f.write_str(name)
    }
}

/// Audit entry before the record assigns it a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDraft {
    pub kind: PreprocessingKind,
    pub description: String,
}

fn default_phase() -> String {
    "zero".to_string()
}

fn default_order() -> String {
    "4".to_string()
}

/// Accepts `"40"`, `40` or `40.5` and keeps the textual form.
fn text_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Int(value) => value.to_string(),
        Raw::Float(value) => value.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Transform {
    Bandpass {
        #[serde(default, deserialize_with = "text_or_number")]
        low_freq: String,
        #[serde(default, deserialize_with = "text_or_number")]
        high_freq: String,
        #[serde(default)]
        filter_method: FilterMethod,
        #[serde(default = "default_phase")]
        phase: String,
        #[serde(default = "default_order", deserialize_with = "text_or_number")]
        order: String,
    },
    Notch {
        #[serde(deserialize_with = "text_or_number")]
        freq: String,
        #[serde(default)]
        filter_method: FilterMethod,
        #[serde(default = "default_phase")]
        phase: String,
        #[serde(default = "default_order", deserialize_with = "text_or_number")]
        order: String,
    },
    Downsampling {
        #[serde(deserialize_with = "text_or_number")]
        freq_downsampling: String,
    },
}

/// `1st`, `2nd`, everything else `th`.
pub fn ordinal_suffix(order: &str) -> &'static str {
    match order {
        "1" => "st",
        "2" => "nd",
        _ => "th",
    }
}

fn parse_freq(name: &str, value: &str) -> Result<Option<f64>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let freq: f64 = value.parse().map_err(|_| {
        Error::invalid_frequency(format!("{} '{}' is not a number", name, value))
    })?;
    if !(freq.is_finite() && freq > 0.0) {
        return Err(Error::invalid_frequency(format!(
            "{} must be positive, got {}",
            name, value
        )));
    }
    Ok(Some(freq))
}

fn require_below_nyquist(name: &str, freq: f64, fs: f64) -> Result<()> {
    if freq >= fs / 2.0 {
        return Err(Error::invalid_frequency(format!(
            "{} {} Hz must be below Nyquist ({} Hz)",
            name,
            freq,
            fs / 2.0
        )));
    }
    Ok(())
}

fn parse_order(order: &str) -> Result<usize> {
    match order.trim().parse::<usize>() {
        Ok(n) if (1..=32).contains(&n) => Ok(n),
        _ => Err(Error::invalid_frequency(format!(
            "filter order '{}' must be an integer between 1 and 32",
            order
        ))),
    }
}

fn map_channels<F>(signal: &RawSignal, mut f: F) -> Result<Vec<Vec<f64>>>
where
    F: FnMut(&[f64]) -> Result<Vec<f64>>,
{
    let mut out = Vec::with_capacity(signal.n_channels());
    for (channel, row) in signal.channels.iter().zip(&signal.data) {
        let filtered = f(row)?;
        if filtered.iter().any(|v| !v.is_finite()) {
            return Err(Error::NumericInstability(format!(
                "filtering channel {} produced non-finite samples",
                channel.name
            )));
        }
        out.push(filtered);
    }
    Ok(out)
}

impl Transform {
    pub fn kind(&self) -> PreprocessingKind {
        match self {
            Transform::Bandpass { .. } => PreprocessingKind::Bandpass,
            Transform::Notch { .. } => PreprocessingKind::Notch,
            Transform::Downsampling { .. } => PreprocessingKind::Downsampling,
        }
    }

    /// Run the transform; the stimulus channel is carried through untouched
    /// except by resampling, which re-indexes it.
    pub fn apply(&self, signal: &RawSignal) -> Result<(RawSignal, StepDraft)> {
        signal.ensure_finite()?;
        let fs = signal.sfreq;
        let (out, description) = match self {
            Transform::Bandpass {
                low_freq,
                high_freq,
                filter_method,
                phase,
                order,
            } => {
                let low = parse_freq("low frequency", low_freq)?;
                let high = parse_freq("high frequency", high_freq)?;
                if low.is_none() && high.is_none() {
                    return Err(Error::invalid_frequency(
                        "at least one of low or high frequency is required",
                    ));
                }
                for (name, freq) in [("low frequency", low), ("high frequency", high)] {
                    if let Some(freq) = freq {
                        require_below_nyquist(name, freq, fs)?;
                    }
                }
                if let (Some(l), Some(h)) = (low, high) {
                    if l >= h {
                        return Err(Error::invalid_frequency(format!(
                            "low frequency {} Hz is not below high frequency {} Hz",
                            l, h
                        )));
                    }
                }
                let mut band = String::new();
                if low.is_some() {
                    band.push_str(&format!("Low Frequency: {}Hz ", low_freq.trim()));
                }
                if high.is_some() {
                    band.push_str(&format!("High Frequency: {}Hz ", high_freq.trim()));
                }
                match filter_method {
                    FilterMethod::Fir => {
                        let fir_phase = FirPhase::parse(phase)?;
                        let kernel = fir::design_bandpass(low, high, fs)?;
                        debug!("bandpass FIR kernel with {} taps", kernel.len());
                        let data = map_channels(signal, |x| fir::apply(x, &kernel, fir_phase))?;
                        (
                            signal.with_data(fs, data, signal.stim.clone()),
                            format!("Method: FIR, Phase: {}, {}", phase, band),
                        )
                    }
                    FilterMethod::Iir => {
                        let n = parse_order(order)?;
                        let sections = iir::design_butterworth(low, high, fs, n)?;
                        let data = map_channels(signal, |x| Ok(iir::filtfilt(&sections, x)))?;
                        (
                            signal.with_data(fs, data, signal.stim.clone()),
                            format!(
                                "Method: IIR, {}{}-order Butterworth filter, {}",
                                order.trim(),
                                ordinal_suffix(order.trim()),
                                band
                            ),
                        )
                    }
                }
            }
            Transform::Notch {
                freq,
                filter_method,
                phase,
                order,
            } => {
                let centre = parse_freq("notch frequency", freq)?.ok_or_else(|| {
                    Error::invalid_frequency("notch frequency is required")
                })?;
                require_below_nyquist("notch frequency", centre, fs)?;
                let width = centre * NOTCH_WIDTH_RATIO;
                match filter_method {
                    FilterMethod::Fir => {
                        let fir_phase = FirPhase::parse(phase)?;
                        let kernel = fir::design_bandstop(centre, width, NOTCH_TRANSITION, fs)?;
                        let data = map_channels(signal, |x| fir::apply(x, &kernel, fir_phase))?;
                        (
                            signal.with_data(fs, data, signal.stim.clone()),
                            format!("Method: FIR, Phase: {}, Frequency: {}Hz", phase, freq.trim()),
                        )
                    }
                    FilterMethod::Iir => {
                        let n = parse_order(order)?;
                        let sections = iir::design_notch(centre, width, fs, (n + 1) / 2)?;
                        let data = map_channels(signal, |x| Ok(iir::filtfilt(&sections, x)))?;
                        (
                            signal.with_data(fs, data, signal.stim.clone()),
                            format!(
                                "Method: IIR, {}{}-order Butterworth filter, Frequency: {}Hz",
                                order.trim(),
                                ordinal_suffix(order.trim()),
                                freq.trim()
                            ),
                        )
                    }
                }
            }
            Transform::Downsampling { freq_downsampling } => {
                let target = parse_freq("sample rate", freq_downsampling)?.ok_or_else(|| {
                    Error::invalid_frequency("target sample rate is required")
                })?;
                let ratio = target / fs;
                let data = map_channels(signal, |x| resample::resample(x, ratio))?;
                let stim = resample::reindex_stimulus(&signal.stim, ratio);
                (
                    signal.with_data(target, data, stim),
                    format!("Sample rate: {} Hz", freq_downsampling.trim()),
                )
            }
        };
        info!("applied {}: {}", self.kind(), description);
        Ok((
            out,
            StepDraft {
                kind: self.kind(),
                description,
            },
        ))
    }
}

/// Apply transforms in order, collecting one audit entry per transform.
pub fn apply_all(signal: &RawSignal, transforms: &[Transform]) -> Result<(RawSignal, Vec<StepDraft>)> {
    let mut current = signal.clone();
    let mut steps = Vec::with_capacity(transforms.len());
    for transform in transforms {
        let (next, step) = transform.apply(&current)?;
        current = next;
        steps.push(step);
    }
    Ok((current, steps))
}
