//! Event detection and stimulus-locked segmentation.

use crate::{
    error::{Error, Result},
    experiment::{Experiment, Label},
    signal::{ChannelInfo, RawSignal},
};
use log::{debug, warn};
use serde::Serialize;

/// Onset of a stimulus code in the marker channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Event {
    pub sample: usize,
    pub code: i64,
}

/// An onset is any non-zero sample that differs from the one before it;
/// the sample before the first is taken as zero.
pub fn find_events(stim: &[f64]) -> Vec<Event> {
    let mut events = Vec::new();
    let mut previous = 0.0;
    for (sample, value) in stim.iter().enumerate() {
        if *value != 0.0 && *value != previous {
            events.push(Event {
                sample,
                code: value.round() as i64,
            });
        }
        previous = *value;
    }
    events
}

#[derive(Debug, Clone, Serialize)]
pub struct Epoch {
    pub event: Event,
    pub label: String,
    /// `channels x n_times`
    pub data: Vec<Vec<f64>>,
    pub stim: Vec<f64>,
}

/// Materialised, baseline-corrected epochs of one recording.
#[derive(Debug, Clone, Serialize)]
pub struct Epochs {
    pub sfreq: f64,
    pub tmin: f64,
    pub tmax: f64,
    pub channels: Vec<ChannelInfo>,
    pub labels: Vec<Label>,
    /// All onsets found in the marker channel, labelled or not.
    pub events: Vec<Event>,
    pub epochs: Vec<Epoch>,
}

impl Epochs {
    pub fn build(signal: &RawSignal, experiment: &Experiment) -> Result<Self> {
        let events = find_events(&signal.stim);
        if events.is_empty() {
            return Err(Error::NoEventsFound);
        }
        let fs = signal.sfreq;
        let (tmin, tmax) = (experiment.epoch_start, experiment.epoch_end);
        let offset = (tmin * fs).round() as isize;
        let n_times = ((tmax - tmin) * fs - 1e-9).ceil().max(1.0) as usize;
        let n_samples = signal.n_samples() as isize;

        let mut epochs = Vec::new();
        for event in &events {
            let Some(label) = experiment.label_for(event.code) else {
                debug!("ignoring unlabelled code {} at sample {}", event.code, event.sample);
                continue;
            };
            let start = event.sample as isize + offset;
            if start < 0 || start + n_times as isize > n_samples {
                warn!(
                    "dropping {} epoch at sample {}: window exceeds the recording",
                    label.description, event.sample
                );
                continue;
            }
            let start = start as usize;
            let range = start..start + n_times;
            let mut data: Vec<Vec<f64>> = signal.data.iter().map(|row| row[range.clone()].to_vec()).collect();
            if tmin <= 0.0 {
                let onset = event.sample - start;
                for row in data.iter_mut() {
                    let baseline = row[..=onset].iter().sum::<f64>() / (onset + 1) as f64;
                    row.iter_mut().for_each(|v| *v -= baseline);
                }
            }
            epochs.push(Epoch {
                event: *event,
                label: label.description.clone(),
                data,
                stim: signal.stim[range].to_vec(),
            });
        }
        debug!(
            "built {} epochs of {} samples from {} events",
            epochs.len(),
            n_times,
            events.len()
        );
        Ok(Self {
            sfreq: fs,
            tmin,
            tmax,
            channels: signal.channels.clone(),
            labels: experiment.labels.clone(),
            events,
            epochs,
        })
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn n_times(&self) -> usize {
        self.epochs.first().map_or(0, |e| e.stim.len())
    }

    /// Time of each epoch sample relative to onset, seconds.
    pub fn times(&self) -> Vec<f64> {
        let offset = (self.tmin * self.sfreq).round();
        (0..self.n_times())
            .map(|i| (offset + i as f64) / self.sfreq)
            .collect()
    }

    pub fn by_label(&self, label: &str) -> Vec<&Epoch> {
        self.epochs.iter().filter(|e| e.label == label).collect()
    }

    pub fn counts(&self) -> Vec<(String, usize)> {
        self.labels
            .iter()
            .map(|l| (l.description.clone(), self.by_label(&l.description).len()))
            .collect()
    }

    /// `"Left: 1, Right: 1"` in experiment label order.
    pub fn summary(&self) -> String {
        self.counts()
            .iter()
            .map(|(label, count)| format!("{}: {}", label, count))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Mean over the epochs of one label.
    pub fn average(&self, label: &str) -> Result<Evoked> {
        let selected = self.by_label(label);
        if selected.is_empty() {
            return Err(Error::not_found(format!("epochs for label '{}'", label)));
        }
        let n = selected.len() as f64;
        let mut data = vec![vec![0.0; self.n_times()]; self.channels.len()];
        for epoch in &selected {
            for (acc, row) in data.iter_mut().zip(&epoch.data) {
                for (a, v) in acc.iter_mut().zip(row) {
                    *a += v / n;
                }
            }
        }
        Ok(Evoked {
            label: label.to_string(),
            sfreq: self.sfreq,
            times: self.times(),
            channels: self.channels.clone(),
            data,
            n_averaged: selected.len(),
        })
    }
}

/// Averaged response of one label.
#[derive(Debug, Clone, Serialize)]
pub struct Evoked {
    pub label: String,
    pub sfreq: f64,
    pub times: Vec<f64>,
    pub channels: Vec<ChannelInfo>,
    pub data: Vec<Vec<f64>>,
    pub n_averaged: usize,
}

impl Evoked {
    /// Global field power: spatial standard deviation at each time point.
    pub fn gfp(&self) -> Vec<f64> {
        let n_ch = self.data.len() as f64;
        (0..self.times.len())
            .map(|t| {
                let mean = self.data.iter().map(|row| row[t]).sum::<f64>() / n_ch;
                (self.data.iter().map(|row| (row[t] - mean).powi(2)).sum::<f64>() / n_ch).sqrt()
            })
            .collect()
    }

    /// Channel values at the sample nearest to `time` (seconds).
    pub fn at_time(&self, time: f64) -> Result<Vec<f64>> {
        let first = self.times.first().copied().unwrap_or(0.0);
        let last = self.times.last().copied().unwrap_or(0.0);
        let step = 0.5 / self.sfreq;
        if time < first - step || time > last + step {
            return Err(Error::validation(format!(
                "time {} s is outside the epoch window [{}, {}]",
                time, first, last
            )));
        }
        let idx = ((time - first) * self.sfreq).round().max(0.0) as usize;
        let idx = idx.min(self.times.len() - 1);
        Ok(self.data.iter().map(|row| row[idx]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::fixtures;

    fn recording(n: usize, markers: &[(usize, f64)]) -> RawSignal {
        let mut stim = vec![0.0; n];
        for (idx, code) in markers {
            stim[*idx] = *code;
        }
        let data = (0..8)
            .map(|c| (0..n).map(|t| (c * 100) as f64 + t as f64 * 0.01).collect())
            .collect();
        RawSignal::new(
            256.0,
            fixtures::CHANNELS_8.iter().map(|c| ChannelInfo::eeg(*c)).collect(),
            data,
            "Stimulus",
            stim,
        )
        .unwrap()
    }

    #[test]
    fn detects_changes_only() {
        let events = find_events(&[0.0, 1.0, 1.0, 0.0, 2.0, 1.0, 0.0]);
        assert_eq!(
            events,
            vec![
                Event { sample: 1, code: 1 },
                Event { sample: 4, code: 2 },
                Event { sample: 5, code: 1 },
            ]
        );
        assert_eq!(find_events(&[3.0])[0].sample, 0);
    }

    #[test]
    fn two_events_make_two_full_epochs() {
        let exp = fixtures::left_right(256.0);
        let epochs = Epochs::build(&recording(1000, &[(100, 1.0), (500, 2.0)]), &exp).unwrap();
        assert_eq!(epochs.len(), 2);
        assert_eq!(epochs.n_times(), 256);
        assert!(epochs.epochs.iter().all(|e| e.data.len() == 8));
        assert_eq!(epochs.summary(), "Left: 1, Right: 1");
        assert_eq!(epochs.by_label("Right")[0].event.sample, 500);
        let times = epochs.times();
        assert!((times[0] + 51.0 / 256.0).abs() < 1e-12);
    }

    #[test]
    fn baseline_mean_is_removed() {
        let exp = fixtures::left_right(256.0);
        let epochs = Epochs::build(&recording(1000, &[(100, 1.0)]), &exp).unwrap();
        let epoch = &epochs.epochs[0];
        let onset = 51;
        let pre: f64 = epoch.data[3][..=onset].iter().sum::<f64>() / (onset + 1) as f64;
        assert!(pre.abs() < 1e-9);
    }

    #[test]
    fn edge_windows_and_unknown_codes_are_skipped() {
        let exp = fixtures::left_right(256.0);
        let epochs =
            Epochs::build(&recording(1000, &[(10, 1.0), (300, 9.0), (900, 2.0)]), &exp).unwrap();
        assert_eq!(epochs.events.len(), 3);
        assert!(epochs.is_empty());
        assert_eq!(epochs.summary(), "Left: 0, Right: 0");
    }

    #[test]
    fn flat_marker_channel_has_no_events() {
        let exp = fixtures::left_right(256.0);
        assert!(matches!(
            Epochs::build(&recording(400, &[]), &exp),
            Err(Error::NoEventsFound)
        ));
    }

    #[test]
    fn evoked_averages_and_reports_gfp() {
        let exp = fixtures::left_right(256.0);
        let epochs =
            Epochs::build(&recording(1000, &[(100, 1.0), (400, 1.0), (700, 2.0)]), &exp).unwrap();
        let evoked = epochs.average("Left").unwrap();
        assert_eq!(evoked.n_averaged, 2);
        assert_eq!(evoked.gfp().len(), 256);
        assert_eq!(evoked.at_time(0.0).unwrap().len(), 8);
        assert!(evoked.at_time(2.0).is_err());
        assert!(epochs.average("Up").is_err());
    }
}
