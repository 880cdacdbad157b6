//! Independent component analysis of the eeg channels for artifact removal.
//!
//! FastICA runs through `linfa-ica`. Extended Infomax is fitted on the same
//! centred data after whitening it with an orthonormal basis of the channel
//! space. Whichever method ran, the mixing matrix is recovered from the
//! sources by least squares and its pseudo-inverse is the unmixing matrix.

use crate::{
    error::{Error, Result},
    signal::RawSignal,
};
use linfa::prelude::*;
use linfa_ica::fast_ica::{FastIca, GFunc};
use log::{debug, info, warn};
use ndarray::{Array1, Array2, Axis};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Squared residual norms below this fraction of the largest channel's are
/// treated as rank loss.
const RANK_TOLERANCE: f64 = 1e-10;

const INFOMAX_W_CHANGE: f64 = 1e-12;
const INFOMAX_MAX_WEIGHT: f64 = 1e8;
const INFOMAX_MIN_RATE: f64 = 1e-10;
const INFOMAX_RESTART_FACTOR: f64 = 0.9;
const INFOMAX_ANNEAL_DEGREES: f64 = 60.0;
const INFOMAX_ANNEAL_STEP: f64 = 0.9;
const INFOMAX_SIGN_BIAS: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IcaMethod {
    /// Symmetric FastICA with the logcosh contrast.
    #[default]
    Fastica,
    /// Extended Infomax, which also separates sub-gaussian sources.
    Infomax,
}

impl fmt::Display for IcaMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IcaMethod::Fastica => "fastica",
            IcaMethod::Infomax => "infomax",
        })
    }
}

impl FromStr for IcaMethod {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "fastica" => Ok(IcaMethod::Fastica),
            "infomax" => Ok(IcaMethod::Infomax),
            "picard" => Err(Error::validation(
                "ICA method 'picard' is not supported, use fastica or infomax",
            )),
            other => Err(Error::validation(format!(
                "unknown ICA method '{}', expected fastica or infomax",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IcaConfig {
    pub seed: u64,
    pub max_iter: usize,
    pub tol: f64,
}

impl Default for IcaConfig {
    fn default() -> Self {
        Self {
            seed: 97,
            max_iter: 200,
            tol: 1e-4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ica {
    pub method: IcaMethod,
    /// Per-channel mean removed before fitting.
    pub mean: Array1<f64>,
    /// `channels x k`
    pub mixing: Array2<f64>,
    /// `k x channels`
    pub unmixing: Array2<f64>,
}

impl Ica {
    pub fn fit(signal: &RawSignal, method: IcaMethod, config: &IcaConfig) -> Result<Self> {
        signal.ensure_finite()?;
        let n_channels = signal.n_channels();
        let n_samples = signal.n_samples();
        if n_channels == 0 || n_samples < 2 {
            return Err(Error::validation(format!(
                "ICA needs at least one channel and two samples, got {}x{}",
                n_channels, n_samples
            )));
        }
        info!(
            "fitting {} ICA on {} channels x {} samples",
            method, n_channels, n_samples
        );

        let data = samples_by_channel(signal);
        let mean = data
            .mean_axis(Axis(0))
            .ok_or_else(|| Error::validation("ICA needs at least one sample"))?;
        let centred = &data - &mean;

        let basis = orthonormal_basis(&centred);
        let n_comp = basis.ncols();
        if n_comp == 0 {
            return Err(Error::NumericInstability(
                "channel covariance has no positive variance".into(),
            ));
        }
        if n_comp < n_channels {
            warn!(
                "dropping {} rank-deficient directions before ICA",
                n_channels - n_comp
            );
        }

        let sources = match method {
            IcaMethod::Fastica => fast_ica(&centred, n_comp, config)?,
            IcaMethod::Infomax => {
                let whitened = basis * (n_samples as f64).sqrt();
                let weights = extended_infomax(&whitened, config)?;
                whitened.dot(&weights)
            }
        };
        if sources.iter().any(|v| !v.is_finite()) {
            return Err(Error::NumericInstability(format!(
                "{} produced non-finite sources",
                method
            )));
        }
        let (mixing, unmixing) = mixing_unmixing(&centred, &sources)?;
        Ok(Self {
            method,
            mean,
            mixing,
            unmixing,
        })
    }

    pub fn n_components(&self) -> usize {
        self.mixing.ncols()
    }

    /// Component time courses, `samples x k`. The signal must carry the
    /// channels the decomposition was fitted on.
    pub fn sources(&self, signal: &RawSignal) -> Array2<f64> {
        let centred = samples_by_channel(signal) - &self.mean;
        centred.dot(&self.unmixing.t())
    }

    /// Rebuild the eeg channels with the listed components zeroed.
    pub fn exclude(&self, signal: &RawSignal, components: &[usize]) -> Result<RawSignal> {
        if let Some(bad) = components.iter().find(|&&c| c >= self.n_components()) {
            return Err(Error::validation(format!(
                "component {} out of range, the decomposition has {}",
                bad,
                self.n_components()
            )));
        }
        let mut sources = self.sources(signal);
        for &c in components {
            sources.column_mut(c).fill(0.0);
        }
        let rebuilt = sources.dot(&self.mixing.t()) + &self.mean;
        if rebuilt.iter().any(|v| !v.is_finite()) {
            return Err(Error::NumericInstability(
                "ICA reconstruction produced non-finite samples".into(),
            ));
        }
        let data = rebuilt.columns().into_iter().map(|c| c.to_vec()).collect();
        info!("ICA removed components {:?}", components);
        Ok(signal.with_data(signal.sfreq, data, signal.stim.clone()))
    }
}

fn samples_by_channel(signal: &RawSignal) -> Array2<f64> {
    Array2::from_shape_fn((signal.n_samples(), signal.n_channels()), |(t, c)| {
        signal.data[c][t]
    })
}

/// Orthonormal basis of the channel space, `samples x rank`.
fn orthonormal_basis(centred: &Array2<f64>) -> Array2<f64> {
    let scale = centred
        .columns()
        .into_iter()
        .map(|c| c.dot(&c))
        .fold(0.0, f64::max);
    let mut basis: Vec<Array1<f64>> = Vec::new();
    for column in centred.columns() {
        let mut v = column.to_owned();
        // second pass restores orthogonality lost to rounding
        for _ in 0..2 {
            for b in &basis {
                let p = v.dot(b);
                v.scaled_add(-p, b);
            }
        }
        let norm2 = v.dot(&v);
        if norm2 > 0.0 && norm2 > RANK_TOLERANCE * scale {
            v /= norm2.sqrt();
            basis.push(v);
        }
    }
    let mut out = Array2::zeros((centred.nrows(), basis.len()));
    for (mut column, b) in out.columns_mut().into_iter().zip(&basis) {
        column.assign(b);
    }
    out
}

fn fast_ica(centred: &Array2<f64>, n_comp: usize, config: &IcaConfig) -> Result<Array2<f64>> {
    debug!(
        "FastICA: n_components={}, max_iter={}, tol={}",
        n_comp, config.max_iter, config.tol
    );
    let dataset = DatasetBase::from(centred.clone());
    let model = FastIca::<f64>::params()
        .ncomponents(n_comp)
        .gfunc(GFunc::Logcosh(1.0))
        .max_iter(config.max_iter)
        .tol(config.tol)
        .random_state(config.seed as usize)
        .fit(&dataset)
        .map_err(|e| Error::NumericInstability(format!("FastICA failed: {}", e)))?;
    Ok(model.predict(centred))
}

/// Extended Infomax on whitened data. Returns `W` with `sources = x · W`.
fn extended_infomax(whitened: &Array2<f64>, config: &IcaConfig) -> Result<Array2<f64>> {
    let (n_samples, n_comp) = whitened.dim();
    let block = ((n_samples as f64 / 3.0).sqrt().floor() as usize).clamp(1, n_samples);
    let mut rate = 0.01 / ((n_comp * n_comp) as f64).ln().max(1.0);
    let mut rng = StdRng::seed_from_u64(config.seed);

    let identity = Array2::<f64>::eye(n_comp);
    let block_identity = &identity * block as f64;
    let mut weights = identity.clone();
    let mut bias = Array1::<f64>::zeros(n_comp);
    let mut signs = Array1::<f64>::ones(n_comp);
    signs[0] = -1.0;
    let mut order: Vec<usize> = (0..n_samples).collect();
    let mut previous: Option<(Array2<f64>, f64)> = None;

    let mut step = 0;
    while step < config.max_iter {
        step += 1;
        order.shuffle(&mut rng);
        let start = weights.clone();
        let mut blown = false;
        for chunk in order.chunks_exact(block) {
            let mut u = whitened.select(Axis(0), chunk).dot(&weights);
            u += &bias;
            let y = u.mapv(f64::tanh);
            let uy = u.t().dot(&y) * &signs;
            let uu = u.t().dot(&u);
            let update = &block_identity - &uy - &uu;
            weights = &weights + &(weights.dot(&update) * rate);
            bias -= &(y.sum_axis(Axis(0)) * (2.0 * rate));
            if weights
                .iter()
                .any(|w| !w.is_finite() || w.abs() > INFOMAX_MAX_WEIGHT)
            {
                blown = true;
                break;
            }
        }
        if blown {
            rate *= INFOMAX_RESTART_FACTOR;
            if rate < INFOMAX_MIN_RATE {
                return Err(Error::NumericInstability(
                    "Infomax weights diverged at every learning rate".into(),
                ));
            }
            warn!("Infomax weights blew up, restarting with learning rate {:.3e}", rate);
            weights = identity.clone();
            bias.fill(0.0);
            previous = None;
            step = 0;
            continue;
        }

        let sources = whitened.dot(&weights);
        for (sign, column) in signs.iter_mut().zip(sources.columns()) {
            let m2 = column.mapv(|v| v * v).mean().unwrap_or(0.0);
            let m4 = column.mapv(|v| v.powi(4)).mean().unwrap_or(0.0);
            let kurtosis = if m2 > 0.0 { m4 / (m2 * m2) - 3.0 } else { 0.0 };
            *sign = if kurtosis + INFOMAX_SIGN_BIAS >= 0.0 { 1.0 } else { -1.0 };
        }

        let delta = &weights - &start;
        let change = delta.mapv(|d| d * d).sum();
        debug!("Infomax step {}: change {:.3e}, rate {:.3e}", step, change, rate);
        if change < INFOMAX_W_CHANGE {
            info!("Infomax converged after {} steps", step);
            return Ok(weights);
        }
        match &previous {
            Some((old_delta, old_change)) => {
                let cos = (&delta * old_delta).sum() / (change * old_change).sqrt();
                if cos.clamp(-1.0, 1.0).acos().to_degrees() > INFOMAX_ANNEAL_DEGREES {
                    rate *= INFOMAX_ANNEAL_STEP;
                    previous = Some((delta, change));
                }
            }
            None => previous = Some((delta, change)),
        }
    }
    warn!(
        "Infomax did not converge in {} steps; consider raising max_iter",
        config.max_iter
    );
    Ok(weights)
}

/// `A = Xᵀ S (SᵀS)⁻¹` and its pseudo-inverse `(AᵀA)⁻¹ Aᵀ`.
fn mixing_unmixing(
    centred: &Array2<f64>,
    sources: &Array2<f64>,
) -> Result<(Array2<f64>, Array2<f64>)> {
    let sts = sources.t().dot(sources);
    let mixing = centred.t().dot(sources).dot(&invert(&sts)?);
    let ata = mixing.t().dot(&mixing);
    let unmixing = invert(&ata)?.dot(&mixing.t());
    Ok((mixing, unmixing))
}

/// Gauss-Jordan inverse with partial pivoting.
fn invert(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    let n = matrix.nrows();
    let scale = matrix.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let mut aug = Array2::<f64>::zeros((n, 2 * n));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = matrix[[i, j]];
        }
        aug[[i, n + i]] = 1.0;
    }
    for i in 0..n {
        let pivot_row = (i..n)
            .max_by(|&a, &b| aug[[a, i]].abs().total_cmp(&aug[[b, i]].abs()))
            .unwrap_or(i);
        if pivot_row != i {
            for j in 0..2 * n {
                aug.swap([i, j], [pivot_row, j]);
            }
        }
        let pivot = aug[[i, i]];
        if !(pivot.abs() > 1e-12 * scale) {
            return Err(Error::NumericInstability(
                "ICA mixing matrix is singular".into(),
            ));
        }
        for j in 0..2 * n {
            aug[[i, j]] /= pivot;
        }
        for k in 0..n {
            if k != i {
                let factor = aug[[k, i]];
                if factor != 0.0 {
                    for j in 0..2 * n {
                        aug[[k, j]] -= factor * aug[[i, j]];
                    }
                }
            }
        }
    }
    let mut inv = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            inv[[i, j]] = aug[[i, n + j]];
        }
    }
    Ok(inv)
}

/// Audit text for an exclusion, e.g. `Components removed: 0, 2`.
pub fn exclusion_description(components: &[usize]) -> String {
    if components.is_empty() {
        return "Components removed: none".to_string();
    }
    let list: Vec<String> = components.iter().map(|c| c.to_string()).collect();
    format!("Components removed: {}", list.join(", "))
}
