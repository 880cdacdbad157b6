use crate::{
    error::{Error, Result},
    experiment::Experiment,
    io::table::{Table, STIMULUS_COLUMN, TIMESTAMP_COLUMN},
    montage,
    signal::{ChannelInfo, RawSignal},
};
use log::{debug, warn};

/// Build a typed signal from a stored table.
///
/// The timestamp column is discarded, the device's declared number of leading
/// columns become eeg channels and the final column is the stimulus channel.
/// `sfreq` is the record's effective rate (the device rate until resampled).
pub fn load_raw(table: &Table, experiment: &Experiment, sfreq: f64) -> Result<RawSignal> {
    experiment.device.ensure_supported()?;
    let mut table = table.clone();
    table.drop_column(TIMESTAMP_COLUMN);

    let n_channels = experiment.device.channels_count();
    if table.n_cols() < n_channels + 1 {
        return Err(Error::validation(format!(
            "table has {} data columns, device declares {} channels plus a stimulus column",
            table.n_cols(),
            n_channels
        )));
    }

    let stim_idx = table.n_cols() - 1;
    let mut channels: Vec<ChannelInfo> = table.headers[..n_channels]
        .iter()
        .map(ChannelInfo::eeg)
        .collect();
    let missing = montage::apply_standard_1020(&mut channels);
    if !missing.is_empty() {
        warn!(
            "channels {:?} are not part of the {} layout; topographies will skip them",
            missing,
            montage::STANDARD_1020
        );
    }

    let data: Vec<Vec<f64>> = (0..n_channels).map(|idx| table.column(idx)).collect();
    let stim = table.column(stim_idx);
    debug!(
        "loaded {} channels x {} samples at {} Hz",
        n_channels,
        stim.len(),
        sfreq
    );
    RawSignal::new(sfreq, channels, data, table.headers[stim_idx].clone(), stim)
}

/// Export a signal as channel columns followed by the stimulus column.
pub fn signal_to_table(signal: &RawSignal) -> Table {
    let mut headers = signal.channel_names();
    headers.push(STIMULUS_COLUMN.to_string());
    let rows = (0..signal.n_samples())
        .map(|t| {
            signal
                .data
                .iter()
                .map(|row| row[t])
                .chain(std::iter::once(signal.stim[t]))
                .collect()
        })
        .collect();
    Table { headers, rows }
}
