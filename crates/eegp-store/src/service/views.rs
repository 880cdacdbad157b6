use super::RecordService;
use crate::{
    error::{Result, StoreError},
    files::FileStore,
    model::RecordId,
    repository::Repository,
};
use eegp_lib::{
    epochs::Epochs,
    io::TIMESTAMP_COLUMN,
    plot::{figures, topomap::Extrapolate, Canvas, PlotBackend},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PreviewValue {
    pub pv: f64,
}

/// Non-zero stimulus sample, `x` counted from the window start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StimulusPoint {
    pub x: usize,
    pub stim: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PreviewSeries {
    Channel(Vec<PreviewValue>),
    Stimulus(Vec<StimulusPoint>),
}

/// One series per channel followed by the stimulus series.
pub type Preview = Vec<PreviewSeries>;

/// Figures rendered from a record's epochs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PlotRequest {
    Epochs {
        n_events: usize,
    },
    Average {
        label: String,
        channel: String,
    },
    Compare {
        label: String,
    },
    Topomap {
        label: String,
        times: Vec<f64>,
        #[serde(default)]
        extrapolate: Extrapolate,
    },
}

impl<R: Repository, F: FileStore> RecordService<R, F> {
    /// Raw values between `start` and `start + duration` seconds.
    pub fn preview(&self, id: RecordId, start: f64, duration: f64) -> Result<Preview> {
        if !(start >= 0.0 && duration > 0.0) {
            return Err(StoreError::validation(format!(
                "preview window start={} duration={} is invalid",
                start, duration
            )));
        }
        let record = self.record(id)?;
        let mut table = self.files.read_table(&record.path)?;
        table.drop_column(TIMESTAMP_COLUMN);
        if table.n_cols() == 0 {
            return Ok(Vec::new());
        }

        let fs = record.sample_rate;
        let n = table.n_rows();
        let first = ((start * fs).floor() as usize).min(n);
        let last = (((start + duration) * fs).floor() as usize).clamp(first, n);
        let window = table.slice_rows(first..last);
        let mut columns = window.columns();
        let stim = columns.pop().unwrap_or_default();

        let mut out: Preview = columns
            .into_iter()
            .map(|col| PreviewSeries::Channel(col.into_iter().map(|pv| PreviewValue { pv }).collect()))
            .collect();
        out.push(PreviewSeries::Stimulus(
            stim.into_iter()
                .enumerate()
                .filter(|(_, v)| *v != 0.0)
                .map(|(x, stim)| StimulusPoint { x, stim })
                .collect(),
        ));
        Ok(out)
    }

    fn epochs_of(&self, id: RecordId) -> Result<Epochs> {
        let record = self.record(id)?;
        let (experiment, signal) = self.load_signal(&record)?;
        Ok(Epochs::build(&signal, &experiment)?)
    }

    fn sized(&self, mut canvas: Canvas, height: u32) -> Canvas {
        canvas.width = self.config.render.width;
        canvas.height = height;
        canvas
    }

    /// Base64 PNG of the requested figure.
    pub fn plot(&self, id: RecordId, request: &PlotRequest) -> Result<String> {
        let epochs = self.epochs_of(id)?;
        let render = &self.config.render;
        let canvas = match request {
            PlotRequest::Epochs { n_events } => {
                self.sized(figures::epochs_canvas(&epochs, *n_events)?, render.epochs_height)
            }
            PlotRequest::Average { label, channel } => {
                let evoked = epochs.average(label)?;
                self.sized(figures::evoked_canvas(&evoked, channel)?, render.height)
            }
            PlotRequest::Compare { label } => {
                let evoked = epochs.average(label)?;
                self.sized(figures::compare_canvas(&evoked), render.height)
            }
            PlotRequest::Topomap {
                label,
                times,
                extrapolate,
            } => {
                let evoked = epochs.average(label)?;
                self.sized(
                    figures::topomap_canvas(&evoked, times, *extrapolate)?,
                    render.height,
                )
            }
        };
        self.renderer().draw(&canvas)
    }
}
