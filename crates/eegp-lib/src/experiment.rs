use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Headsets record at most this many sensor channels.
pub const MAX_HEADSET_CHANNELS: usize = 8;

/// Acquisition device family. Only the multichannel headset is supported by
/// the loader; other kinds round-trip through storage untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeviceKind {
    EegHeadset,
    Other(String),
}

impl From<String> for DeviceKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "eeg_headset" => DeviceKind::EegHeadset,
            _ => DeviceKind::Other(value),
        }
    }
}

impl From<DeviceKind> for String {
    fn from(kind: DeviceKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::EegHeadset => f.write_str("eeg_headset"),
            DeviceKind::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    pub sample_rate: f64,
    pub channels: Vec<String>,
}

impl Device {
    pub fn headset(sample_rate: f64, channels: Vec<String>) -> Self {
        Self {
            kind: DeviceKind::EegHeadset,
            sample_rate,
            channels,
        }
    }

    pub fn channels_count(&self) -> usize {
        self.channels.len()
    }

    /// Fails with `UnsupportedDevice` for anything but the headset kind.
    pub fn ensure_supported(&self) -> Result<()> {
        match &self.kind {
            DeviceKind::EegHeadset => Ok(()),
            DeviceKind::Other(name) => Err(Error::UnsupportedDevice(name.clone())),
        }
    }
}

/// Maps an integer stimulus code to a human readable name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub code: i64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub device: Device,
    pub labels: Vec<Label>,
    /// Window start relative to stimulus onset, seconds.
    pub epoch_start: f64,
    /// Window end relative to stimulus onset, seconds.
    pub epoch_end: f64,
}

impl Experiment {
    pub fn validate(&self) -> Result<()> {
        let device = &self.device;
        if !(device.sample_rate.is_finite() && device.sample_rate > 0.0) {
            return Err(Error::validation(format!(
                "device sample rate must be positive, got {}",
                device.sample_rate
            )));
        }
        if device.channels.is_empty() {
            return Err(Error::validation("device declares no channels"));
        }
        if device.kind == DeviceKind::EegHeadset && device.channels.len() > MAX_HEADSET_CHANNELS {
            return Err(Error::validation(format!(
                "headset devices carry at most {} channels, got {}",
                MAX_HEADSET_CHANNELS,
                device.channels.len()
            )));
        }
        if self.epoch_end <= self.epoch_start {
            return Err(Error::validation(format!(
                "epoch window [{}, {}] is empty",
                self.epoch_start, self.epoch_end
            )));
        }
        Ok(())
    }

    pub fn has_code(&self, code: i64) -> bool {
        self.labels.iter().any(|label| label.code == code)
    }

    pub fn label_for(&self, code: i64) -> Option<&Label> {
        self.labels.iter().find(|label| label.code == code)
    }

    pub fn code_for(&self, description: &str) -> Option<i64> {
        self.labels
            .iter()
            .find(|label| label.description == description)
            .map(|label| label.code)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub const CHANNELS_8: [&str; 8] = ["Fp1", "Fp2", "C3", "C4", "P7", "P8", "O1", "O2"];

    pub fn left_right(sample_rate: f64) -> Experiment {
        Experiment {
            id: 1,
            name: "motor imagery".into(),
            device: Device::headset(
                sample_rate,
                CHANNELS_8.iter().map(|c| c.to_string()).collect(),
            ),
            labels: vec![
                Label {
                    code: 1,
                    description: "Left".into(),
                },
                Label {
                    code: 2,
                    description: "Right".into(),
                },
            ],
            epoch_start: -0.2,
            epoch_end: 0.8,
        }
    }
}
