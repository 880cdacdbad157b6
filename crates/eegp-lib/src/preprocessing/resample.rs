use crate::error::{Error, Result};
use crate::preprocessing::fir::reflect_index;
use realfft::RealFftPlanner;

/// Edge padding that brings `n` up to a power of two with at least a small
/// margin on each side; returns `(left, right)`.
pub fn auto_padding(n: usize) -> (usize, usize) {
    let min_add = (n / 8).min(100) * 2;
    let total = (n + min_add).next_power_of_two() - n;
    (total / 2, total - total / 2)
}

/// Number of output samples for `n` inputs resampled by `ratio`.
pub fn resampled_len(n: usize, ratio: f64) -> usize {
    ((n as f64 * ratio).round() as usize).max(1)
}

/// Fourier-domain resampling of one channel with reflective edge padding.
pub fn resample(x: &[f64], ratio: f64) -> Result<Vec<f64>> {
    if !(ratio.is_finite() && ratio > 0.0) {
        return Err(Error::invalid_frequency(format!(
            "resampling ratio {} is not positive",
            ratio
        )));
    }
    let n = x.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let (left, right) = auto_padding(n);
    let n_old = n + left + right;
    let n_new = resampled_len(n_old, ratio);

    let mut padded: Vec<f64> = (0..n_old)
        .map(|i| x[reflect_index(i as isize - left as isize, n)])
        .collect();

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(n_old);
    let c2r = planner.plan_fft_inverse(n_new);
    let fft_err = |e: realfft::FftError| Error::NumericInstability(format!("fft failed: {}", e));

    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut padded, &mut spectrum).map_err(fft_err)?;

    let mut out_spectrum = c2r.make_input_vec();
    let shared = spectrum.len().min(out_spectrum.len());
    out_spectrum[..shared].copy_from_slice(&spectrum[..shared]);
    // An even-length Nyquist bin stands for both signs; split it when it
    // becomes an ordinary bin of the longer output.
    if n_new > n_old && n_old % 2 == 0 {
        out_spectrum[n_old / 2] *= 0.5;
    }
    out_spectrum[0].im = 0.0;
    if n_new % 2 == 0 {
        if let Some(last) = out_spectrum.last_mut() {
            last.im = 0.0;
        }
    }

    let mut out = c2r.make_output_vec();
    c2r.process(&mut out_spectrum, &mut out).map_err(fft_err)?;
    let scale = 1.0 / n_old as f64;

    let len = resampled_len(n, ratio);
    let start = ((left as f64 * ratio).round() as usize).min(n_new.saturating_sub(len));
    Ok(out[start..start + len].iter().map(|v| v * scale).collect())
}

/// Moves every non-zero marker to `round(i * ratio)` in a zeroed channel of
/// the new length; colliding markers keep the first one.
pub fn reindex_stimulus(stim: &[f64], ratio: f64) -> Vec<f64> {
    let len = resampled_len(stim.len(), ratio);
    let mut out = vec![0.0; len];
    for (idx, value) in stim.iter().enumerate() {
        if *value == 0.0 {
            continue;
        }
        let target = ((idx as f64 * ratio).round() as usize).min(len - 1);
        if out[target] == 0.0 {
            out[target] = *value;
        }
    }
    out
}
