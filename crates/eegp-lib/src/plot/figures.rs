use crate::{
    epochs::{Epochs, Evoked},
    error::{Error, Result},
    plot::{
        decimate_points, palette,
        topomap::{topomap_figure, Extrapolate},
        Canvas, Color, EventMarker, Figure, LineSeries, Series, Style, TextLabel,
    },
    preprocessing::ica::Ica,
    signal::{ChannelInfo, RawSignal},
    spectrum,
};
use log::warn;

pub const WIDTH: u32 = 1150;
pub const EPOCHS_HEIGHT: u32 = 750;
pub const HEIGHT: u32 = 500;
const MAX_POINTS: usize = 2000;
const TOPO_ROW_HEIGHT: u32 = 300;

fn line(name: &str, points: Vec<[f64; 2]>, color: Color, width: f32) -> Series {
    Series::Line(LineSeries {
        name: name.into(),
        points: decimate_points(&points, MAX_POINTS),
        style: Style::solid(color, width),
    })
}

fn onset_marker(x: f64, label: Option<String>) -> Series {
    Series::Marker(EventMarker {
        x,
        label,
        style: Style {
            width: 1.0,
            dash: Some([4.0, 3.0]),
            color: Color(0x2CA02C),
        },
    })
}

/// Positions of located channels together with their indices.
fn located(channels: &[ChannelInfo]) -> Result<(Vec<usize>, Vec<[f64; 2]>)> {
    let (idx, pos): (Vec<usize>, Vec<[f64; 2]>) = channels
        .iter()
        .enumerate()
        .filter_map(|(i, ch)| ch.position.map(|p| (i, p)))
        .unzip();
    if idx.len() < channels.len() {
        warn!(
            "{} channels have no sensor position and are left out of scalp maps",
            channels.len() - idx.len()
        );
    }
    if idx.is_empty() {
        return Err(Error::validation(
            "no channel has a sensor position; scalp maps are unavailable",
        ));
    }
    Ok((idx, pos))
}

/// The first `n_events` epochs side by side, channels stacked and each
/// scaled to its own peak.
pub fn epochs_canvas(epochs: &Epochs, n_events: usize) -> Result<Canvas> {
    let shown: Vec<_> = epochs.epochs.iter().take(n_events.max(1)).collect();
    if shown.is_empty() {
        return Err(Error::validation("the recording has no epochs to plot"));
    }
    let times = epochs.times();
    let span = epochs.n_times() as f64 / epochs.sfreq;
    let n_channels = epochs.channels.len();

    let mut fig = Figure::new(Some(format!("Epochs ({} of {})", shown.len(), epochs.len())))
        .with_labels("Time (s)", "Channel");
    fig.y.range = Some([-(n_channels as f64) + 0.4, 0.6]);
    for (c, channel) in epochs.channels.iter().enumerate() {
        let peak = shown
            .iter()
            .flat_map(|e| e.data[c].iter())
            .fold(0.0f64, |m, v| m.max(v.abs()))
            .max(f64::EPSILON);
        let offset = -(c as f64);
        let points: Vec<[f64; 2]> = shown
            .iter()
            .enumerate()
            .flat_map(|(k, epoch)| {
                let shift = k as f64 * span;
                times
                    .iter()
                    .zip(&epoch.data[c])
                    .map(move |(t, v)| [shift + t, offset + 0.45 * v / peak])
            })
            .collect();
        fig.add_series(line(&channel.name, points, Color::BLACK, 1.0));
        fig.add_series(Series::Text(TextLabel {
            x: times.first().copied().unwrap_or(0.0),
            y: offset + 0.2,
            text: channel.name.clone(),
            color: palette(c),
        }));
    }
    for (k, epoch) in shown.iter().enumerate() {
        let shift = k as f64 * span;
        fig.add_series(onset_marker(shift, Some(epoch.label.clone())));
        if k > 0 {
            fig.add_series(Series::Marker(EventMarker {
                x: shift + times.first().copied().unwrap_or(0.0),
                label: None,
                style: Style::solid(Color::GREY, 1.0),
            }));
        }
    }
    Ok(Canvas::single(fig, WIDTH, EPOCHS_HEIGHT))
}

/// Scalp maps of every component's sensor weights.
pub fn ica_components_canvas(ica: &Ica, channels: &[ChannelInfo]) -> Result<Canvas> {
    let (idx, positions) = located(channels)?;
    let n = ica.n_components();
    let mut panels = Vec::with_capacity(n);
    for k in 0..n {
        let weights: Vec<f64> = idx.iter().map(|&c| ica.mixing[[c, k]]).collect();
        panels.push(topomap_figure(
            Some(format!("ICA{:03}", k)),
            &positions,
            &weights,
            Extrapolate::Head,
        )?);
    }
    let columns = n.clamp(1, 4);
    let rows = (n + columns - 1) / columns;
    Ok(Canvas {
        title: Some("ICA components".into()),
        width: WIDTH,
        height: TOPO_ROW_HEIGHT * rows.max(1) as u32 + 40,
        columns,
        panels,
    })
}

/// One canvas per component: scalp map, source spectrum and time course.
pub fn ica_properties_canvases(ica: &Ica, signal: &RawSignal) -> Result<Vec<Canvas>> {
    let (idx, positions) = located(&signal.channels)?;
    let sources = ica.sources(signal);
    let mut out = Vec::with_capacity(sources.ncols());
    for (k, column) in sources.columns().into_iter().enumerate() {
        let source = column.to_vec();
        let weights: Vec<f64> = idx.iter().map(|&c| ica.mixing[[c, k]]).collect();
        let topo = topomap_figure(Some("Weights".into()), &positions, &weights, Extrapolate::Head)?;

        let psd = spectrum::welch_default(&source, signal.sfreq)?;
        let db: Vec<[f64; 2]> = psd
            .freqs
            .iter()
            .zip(&psd.powers)
            .skip(1)
            .map(|(f, p)| [*f, 10.0 * p.max(1e-20).log10()])
            .collect();
        let mut spec = Figure::new(Some("Spectrum".into())).with_labels("Frequency (Hz)", "dB");
        spec.add_series(line("psd", db, palette(0), 1.5));

        let course: Vec<[f64; 2]> = source
            .iter()
            .enumerate()
            .map(|(t, v)| [t as f64 / signal.sfreq, *v])
            .collect();
        let mut time = Figure::new(Some("Time course".into())).with_labels("Time (s)", "AU");
        time.add_series(line("source", course, Color::BLACK, 1.0));

        out.push(Canvas {
            title: Some(format!("ICA{:03}", k)),
            width: WIDTH,
            height: HEIGHT,
            columns: 3,
            panels: vec![topo, spec, time],
        });
    }
    Ok(out)
}

/// Averaged response of one channel.
pub fn evoked_canvas(evoked: &Evoked, channel: &str) -> Result<Canvas> {
    let c = evoked
        .channels
        .iter()
        .position(|ch| ch.name.eq_ignore_ascii_case(channel))
        .ok_or_else(|| Error::not_found(format!("channel '{}'", channel)))?;
    let points: Vec<[f64; 2]> = evoked
        .times
        .iter()
        .zip(&evoked.data[c])
        .map(|(t, v)| [*t, *v])
        .collect();
    let mut fig = Figure::new(Some(format!(
        "Channel {}, Label: {} (N={})",
        evoked.channels[c].name, evoked.label, evoked.n_averaged
    )))
    .with_labels("Time (s)", "Amplitude");
    fig.add_series(line(&evoked.channels[c].name, points, palette(0), 1.5));
    fig.add_series(onset_marker(0.0, None));
    Ok(Canvas::single(fig, WIDTH, HEIGHT))
}

/// Global field power of one label's average.
pub fn compare_canvas(evoked: &Evoked) -> Canvas {
    let points: Vec<[f64; 2]> = evoked
        .times
        .iter()
        .zip(evoked.gfp())
        .map(|(t, v)| [*t, v])
        .collect();
    let mut fig = Figure::new(Some(format!("Label: {}", evoked.label)))
        .with_labels("Time (s)", "GFP");
    fig.add_series(line(&evoked.label, points, palette(0), 1.5));
    fig.add_series(onset_marker(0.0, None));
    Canvas::single(fig, WIDTH, HEIGHT)
}

/// Scalp maps of an average at the requested latencies.
pub fn topomap_canvas(evoked: &Evoked, times: &[f64], extrapolate: Extrapolate) -> Result<Canvas> {
    if times.is_empty() {
        return Err(Error::validation("at least one time is required"));
    }
    let (idx, positions) = located(&evoked.channels)?;
    let mut panels = Vec::with_capacity(times.len());
    for t in times {
        let values = evoked.at_time(*t)?;
        let picked: Vec<f64> = idx.iter().map(|&c| values[c]).collect();
        panels.push(topomap_figure(
            Some(format!("{:.3} s", t)),
            &positions,
            &picked,
            extrapolate,
        )?);
    }
    Ok(Canvas {
        title: Some(format!("Label: {}", evoked.label)),
        width: WIDTH,
        height: HEIGHT,
        columns: times.len(),
        panels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{experiment::fixtures, montage, preprocessing::ica::{IcaConfig, IcaMethod}};
    use std::f64::consts::PI;

    fn signal() -> RawSignal {
        let n = 1000;
        let mut stim = vec![0.0; n];
        stim[100] = 1.0;
        stim[500] = 2.0;
        stim[700] = 1.0;
        let data = (0..8)
            .map(|c| {
                (0..n)
                    .map(|t| (2.0 * PI * (c + 3) as f64 * t as f64 / 256.0).sin() + 0.1 * c as f64)
                    .collect()
            })
            .collect();
        let mut channels: Vec<ChannelInfo> =
            fixtures::CHANNELS_8.iter().map(|c| ChannelInfo::eeg(*c)).collect();
        montage::apply_standard_1020(&mut channels);
        RawSignal::new(256.0, channels, data, "Stimulus", stim).unwrap()
    }

    #[test]
    fn epochs_canvas_marks_each_shown_epoch() {
        let epochs = Epochs::build(&signal(), &fixtures::left_right(256.0)).unwrap();
        let canvas = epochs_canvas(&epochs, 2).unwrap();
        assert_eq!((canvas.width, canvas.height), (1150, 750));
        let markers = canvas.panels[0]
            .series
            .iter()
            .filter(|s| matches!(s, Series::Marker(m) if m.label.is_some()))
            .count();
        assert_eq!(markers, 2);
    }

    #[test]
    fn evoked_and_topomaps() {
        let epochs = Epochs::build(&signal(), &fixtures::left_right(256.0)).unwrap();
        let evoked = epochs.average("Left").unwrap();
        assert!(evoked_canvas(&evoked, "c3").is_ok());
        assert!(matches!(evoked_canvas(&evoked, "Cz"), Err(Error::NotFound(_))));
        let topo = topomap_canvas(&evoked, &[0.0, 0.1, 0.2], Extrapolate::Local).unwrap();
        assert_eq!(topo.panels.len(), 3);
        assert_eq!(compare_canvas(&evoked).panels.len(), 1);
    }

    #[test]
    fn ica_figures_cover_every_component() {
        let raw = signal();
        let ica = Ica::fit(&raw, IcaMethod::Fastica, &IcaConfig::default()).unwrap();
        let components = ica_components_canvas(&ica, &raw.channels).unwrap();
        assert_eq!(components.panels.len(), ica.n_components());
        let props = ica_properties_canvases(&ica, &raw).unwrap();
        assert_eq!(props.len(), ica.n_components());
        assert!(props.iter().all(|c| c.panels.len() == 3));
    }

    #[test]
    fn scalp_maps_need_positions() {
        let raw = signal();
        let mut unplaced = raw.channels.clone();
        unplaced.iter_mut().for_each(|c| c.position = None);
        let ica = Ica::fit(&raw, IcaMethod::Fastica, &IcaConfig::default()).unwrap();
        assert!(ica_components_canvas(&ica, &unplaced).is_err());
    }
}
