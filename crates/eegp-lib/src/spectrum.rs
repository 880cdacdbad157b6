use crate::error::{Error, Result};
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Default Welch segment length in samples.
pub const DEFAULT_SEGMENT: usize = 256;

/// One-sided power spectral density.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Psd {
    pub freqs: Vec<f64>,
    pub powers: Vec<f64>,
}

impl Psd {
    pub fn mean_power(&self) -> f64 {
        if self.powers.is_empty() {
            return 0.0;
        }
        self.powers.iter().sum::<f64>() / self.powers.len() as f64
    }

    /// Total power between `lo` (inclusive) and `hi` (exclusive).
    pub fn band_power(&self, lo: f64, hi: f64) -> f64 {
        self.freqs
            .iter()
            .zip(&self.powers)
            .filter(|(f, _)| **f >= lo && **f < hi)
            .map(|(_, p)| *p)
            .sum()
    }
}

/// Welch estimate with a Hann window and per-segment mean removal.
///
/// `n_per_seg` is clamped to the signal length; `step` is the hop between
/// segment starts (`n_per_seg` means no overlap).
pub fn welch(x: &[f64], fs: f64, n_per_seg: usize, step: usize) -> Result<Psd> {
    let n = x.len();
    if n == 0 {
        return Ok(Psd::default());
    }
    let window = n_per_seg.clamp(1, n);
    let step = step.max(1);
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(window);
    let window_func = hann(window);
    let norm: f64 = fs * window_func.iter().map(|w| w * w).sum::<f64>();
    let n_bins = window / 2 + 1;
    let freqs: Vec<f64> = (0..n_bins).map(|k| k as f64 * fs / window as f64).collect();
    let mut powers = vec![0.0; n_bins];

    let mut pos = 0;
    let mut segments = 0;
    while pos + window <= n {
        let slice = &x[pos..pos + window];
        let mean = slice.iter().sum::<f64>() / window as f64;
        let mut frame: Vec<f64> = slice
            .iter()
            .zip(window_func.iter())
            .map(|(v, w)| (v - mean) * w)
            .collect();
        let mut spectrum = r2c.make_output_vec();
        r2c.process(&mut frame, &mut spectrum)
            .map_err(|e| Error::NumericInstability(format!("fft failed: {}", e)))?;
        for (k, val) in spectrum.iter().enumerate() {
            let power = if k == 0 || (window % 2 == 0 && k == window / 2) {
                val.norm_sqr()
            } else {
                2.0 * val.norm_sqr()
            };
            powers[k] += if norm > 0.0 { power / norm } else { 0.0 };
        }
        segments += 1;
        pos += step;
    }
    if segments > 0 {
        for p in powers.iter_mut() {
            *p /= segments as f64;
        }
    }
    Ok(Psd { freqs, powers })
}

/// Welch with the default segment length and no overlap.
pub fn welch_default(x: &[f64], fs: f64) -> Result<Psd> {
    let seg = DEFAULT_SEGMENT.min(x.len());
    welch(x, fs, seg, seg)
}

/// Symmetric Hann window.
pub fn hann(size: usize) -> Vec<f64> {
    if size <= 1 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / (size - 1) as f64).cos()))
        .collect()
}
