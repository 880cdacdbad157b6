use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Channel role inside a raw recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Sensor signal.
    Eeg,
    /// Discrete stimulus marker codes.
    Stim,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    pub kind: ChannelKind,
    /// Head-plane coordinates from the sensor layout, nose towards +y.
    pub position: Option<[f64; 2]>,
}

impl ChannelInfo {
    pub fn eeg(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ChannelKind::Eeg,
            position: None,
        }
    }

    pub fn stim(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ChannelKind::Stim,
            position: None,
        }
    }
}

/// Multichannel recording with one designated stimulus channel.
///
/// `data[c][t]` holds sample `t` of eeg channel `c`; every row has the same
/// length as `stim`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSignal {
    pub sfreq: f64,
    pub channels: Vec<ChannelInfo>,
    pub data: Vec<Vec<f64>>,
    pub stim_channel: ChannelInfo,
    pub stim: Vec<f64>,
}

impl RawSignal {
    pub fn new(
        sfreq: f64,
        channels: Vec<ChannelInfo>,
        data: Vec<Vec<f64>>,
        stim_name: impl Into<String>,
        stim: Vec<f64>,
    ) -> Result<Self> {
        if !(sfreq.is_finite() && sfreq > 0.0) {
            return Err(Error::validation(format!("invalid sample rate {}", sfreq)));
        }
        if channels.len() != data.len() {
            return Err(Error::validation(format!(
                "{} channel names for {} data rows",
                channels.len(),
                data.len()
            )));
        }
        if let Some(row) = data.iter().find(|row| row.len() != stim.len()) {
            return Err(Error::validation(format!(
                "channel has {} samples but stimulus channel has {}",
                row.len(),
                stim.len()
            )));
        }
        Ok(Self {
            sfreq,
            channels,
            data,
            stim_channel: ChannelInfo::stim(stim_name),
            stim,
        })
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn n_samples(&self) -> usize {
        self.stim.len()
    }

    pub fn duration(&self) -> f64 {
        self.n_samples() as f64 / self.sfreq
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|ch| ch.name.clone()).collect()
    }

    /// Same channel layout with replaced sample data and rate.
    pub fn with_data(&self, sfreq: f64, data: Vec<Vec<f64>>, stim: Vec<f64>) -> Self {
        Self {
            sfreq,
            channels: self.channels.clone(),
            data,
            stim_channel: self.stim_channel.clone(),
            stim,
        }
    }

    /// Fails when any eeg sample is NaN or infinite.
    pub fn ensure_finite(&self) -> Result<()> {
        for (ch, row) in self.channels.iter().zip(&self.data) {
            if let Some(t) = row.iter().position(|v| !v.is_finite()) {
                return Err(Error::NumericInstability(format!(
                    "channel {} has a non-finite sample at index {}",
                    ch.name, t
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ragged_rows() {
        let err = RawSignal::new(
            100.0,
            vec![ChannelInfo::eeg("Cz")],
            vec![vec![0.0; 3]],
            "Stimulus",
            vec![0.0; 4],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn finite_check_names_channel() {
        let signal = RawSignal::new(
            100.0,
            vec![ChannelInfo::eeg("Cz"), ChannelInfo::eeg("Pz")],
            vec![vec![0.0; 3], vec![0.0, f64::NAN, 0.0]],
            "Stimulus",
            vec![0.0; 3],
        )
        .unwrap();
        let err = signal.ensure_finite().unwrap_err().to_string();
        assert!(err.contains("Pz"));
    }
}
