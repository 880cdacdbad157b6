//! Windowed-sinc FIR design and application.

use crate::error::{Error, Result};
use realfft::RealFftPlanner;
use std::f64::consts::PI;

/// How a designed FIR kernel is run over a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirPhase {
    /// Linear-phase kernel applied centred, group delay compensated.
    Zero,
    /// Kernel applied twice, forwards then backwards.
    ZeroDouble,
    /// Minimum-phase equivalent applied causally.
    Minimum,
}

impl FirPhase {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "zero" => Ok(Self::Zero),
            "zero-double" => Ok(Self::ZeroDouble),
            "minimum" => Ok(Self::Minimum),
            other => Err(Error::invalid_frequency(format!(
                "unknown FIR phase '{}', expected zero, zero-double or minimum",
                other
            ))),
        }
    }
}

/// Transition bandwidth used below a lower band edge.
pub fn low_transition(freq: f64) -> f64 {
    (0.25 * freq).max(2.0).min(freq)
}

/// Transition bandwidth used above an upper band edge.
pub fn high_transition(freq: f64, nyquist: f64) -> f64 {
    (0.25 * freq).max(2.0).min(nyquist - freq)
}

/// Kernel length for a transition band, rounded up to the next odd count.
pub fn kernel_length(transition: f64, fs: f64) -> usize {
    let n = (3.3 / transition * fs).ceil().max(1.0) as usize;
    if n % 2 == 0 {
        n + 1
    } else {
        n
    }
}

pub fn hamming(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Hamming-windowed lowpass kernel with unit DC gain; `cutoff` is the -6 dB point.
pub fn lowpass_kernel(cutoff: f64, fs: f64, taps: usize) -> Vec<f64> {
    let fc = cutoff / fs;
    let mid = (taps - 1) as f64 / 2.0;
    let window = hamming(taps);
    let mut h: Vec<f64> = window
        .iter()
        .enumerate()
        .map(|(i, w)| 2.0 * fc * sinc(2.0 * fc * (i as f64 - mid)) * w)
        .collect();
    let gain: f64 = h.iter().sum();
    if gain.abs() > f64::EPSILON {
        h.iter_mut().for_each(|v| *v /= gain);
    }
    h
}

fn spectral_inverse(mut h: Vec<f64>) -> Vec<f64> {
    h.iter_mut().for_each(|v| *v = -*v);
    let mid = h.len() / 2;
    h[mid] += 1.0;
    h
}

/// Band edges in Hz; `None` leaves that side open.
pub fn design_bandpass(low: Option<f64>, high: Option<f64>, fs: f64) -> Result<Vec<f64>> {
    let nyquist = fs / 2.0;
    let low_trans = low.map(low_transition);
    let high_trans = high.map(|f| high_transition(f, nyquist));
    let transition = match (low_trans, high_trans) {
        (Some(l), Some(h)) => l.min(h),
        (Some(l), None) => l,
        (None, Some(h)) => h,
        (None, None) => {
            return Err(Error::invalid_frequency(
                "at least one of low or high frequency is required",
            ))
        }
    };
    if !(transition > 0.0) {
        return Err(Error::invalid_frequency(format!(
            "transition bandwidth {} Hz is not positive",
            transition
        )));
    }
    let taps = kernel_length(transition, fs);

    let highpass = low
        .zip(low_trans)
        .map(|(f, t)| spectral_inverse(lowpass_kernel(f - t / 2.0, fs, taps)));
    let lowpass = high
        .zip(high_trans)
        .map(|(f, t)| lowpass_kernel(f + t / 2.0, fs, taps));

    let kernel = match (highpass, lowpass) {
        (Some(hp), Some(lp)) => {
            // Band = lowpass(high) - lowpass(low) = lp + hp - delta.
            let mut k: Vec<f64> = lp.iter().zip(&hp).map(|(a, b)| a + b).collect();
            k[taps / 2] -= 1.0;
            k
        }
        (Some(hp), None) => hp,
        (None, Some(lp)) => lp,
        (None, None) => unreachable!("checked above"),
    };
    Ok(kernel)
}

/// Band-stop of `width` Hz centred on `freq` with the given transition band.
pub fn design_bandstop(freq: f64, width: f64, transition: f64, fs: f64) -> Result<Vec<f64>> {
    let lower = freq - width / 2.0 - transition / 2.0;
    let upper = freq + width / 2.0 + transition / 2.0;
    if lower <= 0.0 || upper >= fs / 2.0 {
        return Err(Error::invalid_frequency(format!(
            "notch at {} Hz does not fit between 0 Hz and Nyquist ({} Hz)",
            freq,
            fs / 2.0
        )));
    }
    let taps = kernel_length(transition, fs);
    let lp = lowpass_kernel(lower, fs, taps);
    let hp = spectral_inverse(lowpass_kernel(upper, fs, taps));
    Ok(lp.iter().zip(&hp).map(|(a, b)| a + b).collect())
}

/// Index into `x` after mirroring out-of-range positions about the edges.
pub(crate) fn reflect_index(j: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let mut j = j.rem_euclid(period);
    if j >= n as isize {
        j = period - j;
    }
    j as usize
}

fn fft_error(e: realfft::FftError) -> Error {
    Error::NumericInstability(format!("fft failed: {}", e))
}

/// `y[i] = Σ h[k] x[i + offset - k]`, edges extended by reflection.
fn convolve(x: &[f64], h: &[f64], offset: isize) -> Result<Vec<f64>> {
    let n = x.len();
    let taps = h.len();
    let lo = offset - (taps as isize - 1);
    let extended: Vec<f64> = (0..n + taps - 1)
        .map(|m| x[reflect_index(lo + m as isize, n)])
        .collect();
    let full = convolve_full(&extended, h)?;
    Ok(full[taps - 1..taps - 1 + n].to_vec())
}

/// Causal run where samples before the start mirror the beginning.
fn convolve_causal(x: &[f64], h: &[f64]) -> Result<Vec<f64>> {
    convolve(x, h, 0)
}

pub fn apply(x: &[f64], kernel: &[f64], phase: FirPhase) -> Result<Vec<f64>> {
    if x.is_empty() || kernel.is_empty() {
        return Ok(x.to_vec());
    }
    let delay = (kernel.len() / 2) as isize;
    match phase {
        FirPhase::Zero => convolve(x, kernel, delay),
        FirPhase::ZeroDouble => {
            let once = convolve(x, kernel, delay)?;
            let reversed: Vec<f64> = once.into_iter().rev().collect();
            let mut out = convolve(&reversed, kernel, delay)?;
            out.reverse();
            Ok(out)
        }
        FirPhase::Minimum => {
            let squared = convolve_full(kernel, kernel)?;
            convolve_causal(x, &minimum_phase(&squared)?)
        }
    }
}

/// Full linear convolution through the real FFT.
fn convolve_full(a: &[f64], b: &[f64]) -> Result<Vec<f64>> {
    if a.is_empty() || b.is_empty() {
        return Ok(Vec::new());
    }
    let len = a.len() + b.len() - 1;
    let n_fft = len.next_power_of_two().max(2);
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(n_fft);
    let c2r = planner.plan_fft_inverse(n_fft);

    let mut buf = vec![0.0; n_fft];
    buf[..a.len()].copy_from_slice(a);
    let mut fa = r2c.make_output_vec();
    r2c.process(&mut buf, &mut fa).map_err(fft_error)?;

    buf.iter_mut().for_each(|v| *v = 0.0);
    buf[..b.len()].copy_from_slice(b);
    let mut fb = r2c.make_output_vec();
    r2c.process(&mut buf, &mut fb).map_err(fft_error)?;

    for (x, y) in fa.iter_mut().zip(&fb) {
        *x = *x * *y;
    }
    let last = fa.len() - 1;
    fa[0].im = 0.0;
    fa[last].im = 0.0;
    let mut out = c2r.make_output_vec();
    c2r.process(&mut fa, &mut out).map_err(fft_error)?;
    let scale = 1.0 / n_fft as f64;
    out.truncate(len);
    out.iter_mut().for_each(|v| *v *= scale);
    Ok(out)
}

/// Homomorphic minimum-phase conversion of a linear-phase kernel.
///
/// The magnitude of the result approximates the square root of the input's,
/// so callers pass a self-convolved kernel to keep the original response.
pub fn minimum_phase(h: &[f64]) -> Result<Vec<f64>> {
    // Generous padding keeps cepstral aliasing negligible.
    let n_fft = (200 * h.len().saturating_sub(1)).next_power_of_two().max(16);
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(n_fft);
    let c2r = planner.plan_fft_inverse(n_fft);

    let mut buf = vec![0.0; n_fft];
    buf[..h.len()].copy_from_slice(h);
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut buf, &mut spectrum).map_err(fft_error)?;

    let mags: Vec<f64> = spectrum.iter().map(|c| c.norm()).collect();
    let floor = mags
        .iter()
        .copied()
        .filter(|m| *m > 0.0)
        .fold(f64::INFINITY, f64::min);
    let floor = if floor.is_finite() { floor * 1e-7 } else { 1e-12 };
    for (bin, mag) in spectrum.iter_mut().zip(&mags) {
        bin.re = 0.5 * (mag + floor).ln();
        bin.im = 0.0;
    }
    let mut cepstrum = c2r.make_output_vec();
    c2r.process(&mut spectrum, &mut cepstrum).map_err(fft_error)?;
    let scale = 1.0 / n_fft as f64;

    // Fold the real cepstrum onto positive quefrencies.
    let stop = (h.len() + 1) / 2;
    for (i, value) in cepstrum.iter_mut().enumerate() {
        let w = if i == 0 || (h.len() % 2 == 1 && i == stop) {
            1.0
        } else if i < stop {
            2.0
        } else {
            0.0
        };
        *value *= w * scale;
    }

    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut cepstrum, &mut spectrum).map_err(fft_error)?;
    let last = spectrum.len() - 1;
    for (k, bin) in spectrum.iter_mut().enumerate() {
        let magnitude = bin.re.exp();
        bin.re = magnitude * bin.im.cos();
        bin.im = if k == 0 || k == last {
            0.0
        } else {
            magnitude * bin.im.sin()
        };
    }
    let mut out = c2r.make_output_vec();
    c2r.process(&mut spectrum, &mut out).map_err(fft_error)?;
    let n_out = h.len() / 2 + 1;
    Ok(out.into_iter().take(n_out).map(|v| v * scale).collect())
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
        (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
    }

    fn middle(x: &[f64]) -> &[f64] {
        &x[x.len() / 4..3 * x.len() / 4]
    }

    #[test]
    fn transition_rules() {
        assert_eq!(low_transition(1.0), 1.0);
        assert_eq!(low_transition(20.0), 5.0);
        assert_eq!(high_transition(40.0, 128.0), 10.0);
        assert_eq!(high_transition(127.0, 128.0), 1.0);
        assert_eq!(kernel_length(2.0, 256.0) % 2, 1);
    }

    #[test]
    fn bandpass_keeps_passband_and_rejects_drift() {
        let fs = 256.0;
        let kernel = design_bandpass(Some(8.0), Some(30.0), fs).unwrap();
        let pass = apply(&sine(15.0, fs, 2048), &kernel, FirPhase::Zero).unwrap();
        let stop = apply(&sine(1.0, fs, 2048), &kernel, FirPhase::Zero).unwrap();
        assert!((rms(middle(&pass)) - 0.5f64.sqrt()).abs() < 0.05);
        assert!(rms(middle(&stop)) < 0.05);
    }

    #[test]
    fn zero_phase_does_not_shift() {
        let fs = 256.0;
        let kernel = design_bandpass(None, Some(40.0), fs).unwrap();
        let x = sine(5.0, fs, 1024);
        let y = apply(&x, &kernel, FirPhase::Zero).unwrap();
        for i in 300..700 {
            assert!((x[i] - y[i]).abs() < 0.02, "sample {i}");
        }
    }

    #[test]
    fn bandstop_removes_line_noise() {
        let fs = 256.0;
        let kernel = design_bandstop(50.0, 0.25, 1.0, fs).unwrap();
        let hum = apply(&sine(50.0, fs, 4096), &kernel, FirPhase::ZeroDouble).unwrap();
        let keep = apply(&sine(10.0, fs, 4096), &kernel, FirPhase::Zero).unwrap();
        assert!(rms(middle(&hum)) < 0.05);
        assert!((rms(middle(&keep)) - 0.5f64.sqrt()).abs() < 0.05);
    }

    #[test]
    fn minimum_phase_keeps_dc_gain() {
        let fs = 128.0;
        let kernel = design_bandpass(None, Some(20.0), fs).unwrap();
        let y = apply(&vec![1.0; 512], &kernel, FirPhase::Minimum).unwrap();
        assert!((y[400] - 1.0).abs() < 0.05, "{}", y[400]);
    }

    #[test]
    fn fft_convolution_matches_the_direct_sum() {
        let x: Vec<f64> = (0..97).map(|i| ((i * 7) % 11) as f64 - 5.0).collect();
        let h = [0.25, -0.5, 1.0, 0.5, 0.125];
        for offset in [0isize, 2, 7] {
            let fast = convolve(&x, &h, offset).unwrap();
            for (i, value) in fast.iter().enumerate() {
                let direct: f64 = h
                    .iter()
                    .enumerate()
                    .map(|(k, hk)| hk * x[reflect_index(i as isize + offset - k as isize, x.len())])
                    .sum();
                assert!((value - direct).abs() < 1e-9, "offset {offset} sample {i}");
            }
        }
    }

    #[test]
    fn rejects_unknown_phase() {
        assert!(matches!(
            FirPhase::parse("linear"),
            Err(Error::InvalidFrequency(_))
        ));
    }
}
