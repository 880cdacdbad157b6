//! Butterworth and notch filters as cascaded second-order sections, run
//! forwards and backwards for zero phase.

use crate::error::{Error, Result};
use std::f64::consts::PI;

/// `H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Biquad {
    pub fn is_finite(&self) -> bool {
        [self.b0, self.b1, self.b2, self.a1, self.a2]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Direct Form II transposed over a whole buffer, starting from the
    /// steady state for a constant input equal to the first sample.
    fn run(&self, x: &mut [f64]) {
        let Some(&x0) = x.first() else {
            return;
        };
        let den = 1.0 + self.a1 + self.a2;
        let (mut z1, mut z2) = if den.abs() > f64::EPSILON {
            let y0 = (self.b0 + self.b1 + self.b2) / den * x0;
            (y0 - self.b0 * x0, self.b2 * x0 - self.a2 * y0)
        } else {
            (0.0, 0.0)
        };
        for sample in x.iter_mut() {
            let input = *sample;
            let output = self.b0 * input + z1;
            z1 = self.b1 * input - self.a1 * output + z2;
            z2 = self.b2 * input - self.a2 * output;
            *sample = output;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Low,
    High,
}

fn prewarp(freq: f64, fs: f64) -> f64 {
    (PI * freq / fs).tan()
}

fn butterworth_sections(cutoff: f64, fs: f64, order: usize, pass: Pass) -> Vec<Biquad> {
    let k = prewarp(cutoff, fs);
    let k2 = k * k;
    let mut sections = Vec::with_capacity((order + 1) / 2);
    for idx in 0..order / 2 {
        let theta = PI * (2 * idx + 1) as f64 / (2 * order) as f64;
        let q = 1.0 / (2.0 * theta.cos());
        let norm = 1.0 / (1.0 + k / q + k2);
        let (b0, b1, b2) = match pass {
            Pass::Low => (k2 * norm, 2.0 * k2 * norm, k2 * norm),
            Pass::High => (norm, -2.0 * norm, norm),
        };
        sections.push(Biquad {
            b0,
            b1,
            b2,
            a1: 2.0 * (k2 - 1.0) * norm,
            a2: (1.0 - k / q + k2) * norm,
        });
    }
    if order % 2 == 1 {
        let norm = 1.0 / (1.0 + k);
        let (b0, b1) = match pass {
            Pass::Low => (k * norm, k * norm),
            Pass::High => (norm, -norm),
        };
        sections.push(Biquad {
            b0,
            b1,
            b2: 0.0,
            a1: (k - 1.0) * norm,
            a2: 0.0,
        });
    }
    sections
}

/// Butterworth design; a band is a highpass at `low` cascaded with a lowpass
/// at `high`, each of the requested order.
pub fn design_butterworth(
    low: Option<f64>,
    high: Option<f64>,
    fs: f64,
    order: usize,
) -> Result<Vec<Biquad>> {
    if order == 0 {
        return Err(Error::invalid_frequency("filter order must be at least 1"));
    }
    let mut sections = Vec::new();
    if let Some(low) = low {
        sections.extend(butterworth_sections(low, fs, order, Pass::High));
    }
    if let Some(high) = high {
        sections.extend(butterworth_sections(high, fs, order, Pass::Low));
    }
    if sections.is_empty() {
        return Err(Error::invalid_frequency(
            "at least one of low or high frequency is required",
        ));
    }
    ensure_finite(&sections)?;
    Ok(sections)
}

/// `count` identical notch biquads centred on `freq` with bandwidth `width` Hz.
pub fn design_notch(freq: f64, width: f64, fs: f64, count: usize) -> Result<Vec<Biquad>> {
    let w0 = 2.0 * PI * freq / fs;
    let q = freq / width;
    let alpha = w0.sin() / (2.0 * q);
    let a0 = 1.0 + alpha;
    let section = Biquad {
        b0: 1.0 / a0,
        b1: -2.0 * w0.cos() / a0,
        b2: 1.0 / a0,
        a1: -2.0 * w0.cos() / a0,
        a2: (1.0 - alpha) / a0,
    };
    let sections = vec![section; count.max(1)];
    ensure_finite(&sections)?;
    Ok(sections)
}

fn ensure_finite(sections: &[Biquad]) -> Result<()> {
    if sections.iter().all(Biquad::is_finite) {
        Ok(())
    } else {
        Err(Error::NumericInstability(
            "filter design produced non-finite coefficients".into(),
        ))
    }
}

/// Zero-phase application: odd extension at both edges, then the cascade
/// forwards and backwards.
pub fn filtfilt(sections: &[Biquad], x: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }
    let pad = (3 * (2 * sections.len() + 1)).min(n - 1);
    let mut ext = Vec::with_capacity(n + 2 * pad);
    for i in (1..=pad).rev() {
        ext.push(2.0 * x[0] - x[i]);
    }
    ext.extend_from_slice(x);
    for i in 1..=pad {
        ext.push(2.0 * x[n - 1] - x[n - 1 - i]);
    }

    for section in sections {
        section.run(&mut ext);
    }
    ext.reverse();
    for section in sections {
        section.run(&mut ext);
    }
    ext.reverse();
    ext[pad..pad + n].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    fn rms(x: &[f64]) -> f64 {
        let mid = &x[x.len() / 4..3 * x.len() / 4];
        (mid.iter().map(|v| v * v).sum::<f64>() / mid.len() as f64).sqrt()
    }

    #[test]
    fn section_counts_follow_order() {
        assert_eq!(design_butterworth(None, Some(30.0), 256.0, 4).unwrap().len(), 2);
        assert_eq!(design_butterworth(None, Some(30.0), 256.0, 3).unwrap().len(), 2);
        assert_eq!(
            design_butterworth(Some(1.0), Some(30.0), 256.0, 1).unwrap().len(),
            2
        );
        assert!(design_butterworth(Some(1.0), None, 256.0, 0).is_err());
    }

    #[test]
    fn bandpass_passes_band_and_blocks_outside() {
        let fs = 256.0;
        let sections = design_butterworth(Some(8.0), Some(30.0), fs, 4).unwrap();
        let pass = filtfilt(&sections, &sine(15.0, fs, 4096));
        let low = filtfilt(&sections, &sine(1.0, fs, 4096));
        let high = filtfilt(&sections, &sine(90.0, fs, 4096));
        assert!((rms(&pass) - 0.5f64.sqrt()).abs() < 0.05);
        assert!(rms(&low) < 0.01);
        assert!(rms(&high) < 0.01);
    }

    #[test]
    fn lowpass_has_unit_dc_gain() {
        let sections = design_butterworth(None, Some(10.0), 100.0, 5).unwrap();
        let y = filtfilt(&sections, &vec![2.5; 300]);
        assert!(y.iter().all(|v| (v - 2.5).abs() < 1e-9));
    }

    #[test]
    fn notch_kills_the_centre_frequency() {
        let fs = 256.0;
        let sections = design_notch(50.0, 50.0 / 200.0, fs, 2).unwrap();
        let hum = filtfilt(&sections, &sine(50.0, fs, 8192));
        let keep = filtfilt(&sections, &sine(20.0, fs, 8192));
        assert!(rms(&hum) < 0.05, "{}", rms(&hum));
        assert!((rms(&keep) - 0.5f64.sqrt()).abs() < 0.02);
    }
}
