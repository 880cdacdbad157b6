//! Per-epoch summary statistics turned into feature tables.

use crate::{
    epochs::Epochs,
    error::{Error, Result},
    io::table::{Table, STIMULUS_COLUMN},
    spectrum,
};
use log::info;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Mean,
    Variance,
    Deviation,
    Psd,
}

impl FeatureKind {
    /// Column suffix appended to each channel name.
    pub fn suffix(&self) -> &'static str {
        match self {
            FeatureKind::Mean => "_mean",
            FeatureKind::Variance => "_variance",
            FeatureKind::Deviation => "_deviation_standard",
            FeatureKind::Psd => "_psd",
        }
    }

    /// Name stored in a record's feature markers.
    pub fn marker_name(&self) -> &'static str {
        match self {
            FeatureKind::Mean => "Mean",
            FeatureKind::Variance => "Variance",
            FeatureKind::Deviation => "Standard Deviation",
            FeatureKind::Psd => "Power Spectral Density",
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker_name())
    }
}

impl FromStr for FeatureKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "mean" => Ok(FeatureKind::Mean),
            "variance" => Ok(FeatureKind::Variance),
            "deviation" => Ok(FeatureKind::Deviation),
            "psd" => Ok(FeatureKind::Psd),
            other => Err(Error::validation(format!(
                "unknown feature '{}', expected mean, variance, deviation or psd",
                other
            ))),
        }
    }
}

/// How the spread of an epoch channel is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VarianceEstimator {
    /// Mean squared deviation over all samples.
    #[default]
    Population,
    /// Squared deviation of the final sample divided by the sample count;
    /// matches tables produced by earlier releases.
    FinalDeviation,
}

impl VarianceEstimator {
    pub fn variance(&self, x: &[f64]) -> f64 {
        if x.is_empty() {
            return 0.0;
        }
        let n = x.len() as f64;
        let mean = x.iter().sum::<f64>() / n;
        match self {
            VarianceEstimator::Population => x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n,
            VarianceEstimator::FinalDeviation => {
                let last = x[x.len() - 1];
                (last - mean).powi(2) / n
            }
        }
    }
}

fn mean(x: &[f64]) -> f64 {
    if x.is_empty() {
        0.0
    } else {
        x.iter().sum::<f64>() / x.len() as f64
    }
}

/// One row per epoch: `<channel><suffix>` columns then the epoch's code.
pub fn extract(epochs: &Epochs, kind: FeatureKind, estimator: VarianceEstimator) -> Result<Table> {
    let mut headers: Vec<String> = epochs
        .channels
        .iter()
        .map(|ch| format!("{}{}", ch.name, kind.suffix()))
        .collect();
    headers.push(STIMULUS_COLUMN.to_string());
    let mut table = Table::new(headers);

    for epoch in &epochs.epochs {
        let mut row = Vec::with_capacity(epoch.data.len() + 1);
        for channel in &epoch.data {
            let value = match kind {
                FeatureKind::Mean => mean(channel),
                FeatureKind::Variance => estimator.variance(channel),
                FeatureKind::Deviation => estimator.variance(channel).sqrt(),
                FeatureKind::Psd => spectrum::welch_default(channel, epochs.sfreq)?.mean_power(),
            };
            row.push(value);
        }
        row.push(epoch.event.code as f64);
        table.push_row(row)?;
    }
    info!(
        "extracted {} over {} epochs x {} channels",
        kind,
        epochs.len(),
        epochs.channels.len()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{experiment::fixtures, signal::ChannelInfo, signal::RawSignal};

    fn epochs() -> Epochs {
        let n = 1000;
        let mut stim = vec![0.0; n];
        stim[100] = 1.0;
        stim[500] = 2.0;
        let data = (0..8)
            .map(|c| {
                (0..n)
                    .map(|t| ((t * (c + 1)) % 7) as f64 - 3.0)
                    .collect()
            })
            .collect();
        let signal = RawSignal::new(
            256.0,
            fixtures::CHANNELS_8.iter().map(|c| ChannelInfo::eeg(*c)).collect(),
            data,
            "Stimulus",
            stim,
        )
        .unwrap();
        Epochs::build(&signal, &fixtures::left_right(256.0)).unwrap()
    }

    #[test]
    fn columns_carry_suffixes_and_codes() {
        let epochs = epochs();
        let table = extract(&epochs, FeatureKind::Deviation, VarianceEstimator::Population).unwrap();
        assert_eq!(table.headers[0], "Fp1_deviation_standard");
        assert_eq!(table.headers[8], STIMULUS_COLUMN);
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.column(8), vec![1.0, 2.0]);
    }

    #[test]
    fn variance_estimators_differ_as_documented() {
        let x = [1.0, 2.0, 3.0, 6.0];
        assert!((VarianceEstimator::Population.variance(&x) - 3.5).abs() < 1e-12);
        assert!((VarianceEstimator::FinalDeviation.variance(&x) - 9.0 / 4.0).abs() < 1e-12);
    }

    #[test]
    fn deviation_is_root_of_variance() {
        let epochs = epochs();
        let var = extract(&epochs, FeatureKind::Variance, VarianceEstimator::Population).unwrap();
        let dev = extract(&epochs, FeatureKind::Deviation, VarianceEstimator::Population).unwrap();
        for (v, d) in var.rows[0].iter().zip(&dev.rows[0]).take(8) {
            assert!((v.sqrt() - d).abs() < 1e-12);
        }
    }

    #[test]
    fn psd_and_mean_fill_every_channel() {
        let epochs = epochs();
        let psd = extract(&epochs, FeatureKind::Psd, VarianceEstimator::Population).unwrap();
        assert_eq!(psd.headers[2], "C3_psd");
        assert!(psd.rows.iter().flatten().all(|v| v.is_finite() && *v >= 0.0));
        let mean = extract(&epochs, FeatureKind::Mean, VarianceEstimator::Population).unwrap();
        assert_eq!(mean.n_cols(), 9);
    }

    #[test]
    fn parses_feature_names() {
        assert_eq!("psd".parse::<FeatureKind>().unwrap(), FeatureKind::Psd);
        assert_eq!(FeatureKind::Deviation.to_string(), "Standard Deviation");
        assert!("median".parse::<FeatureKind>().is_err());
    }
}
