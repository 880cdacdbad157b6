use super::RecordService;
use crate::{
    error::Result,
    files::FileStore,
    model::{Lineage, Record},
    repository::Repository,
};
use eegp_lib::{
    epochs::Epochs,
    io::{build_headset_table, load_raw, UploadPayload},
};
use log::info;

/// Raw uploads to turn into a new record.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub name: String,
    pub subject_id: u64,
    pub experiment_id: u64,
    pub payloads: Vec<UploadPayload>,
    /// Seconds added to every sample timestamp.
    pub time_correction: f64,
}

impl<R: Repository, F: FileStore> RecordService<R, F> {
    /// Build, check and store a recording. Nothing is written when the
    /// stimuli do not match the experiment or no event is found.
    pub fn ingest(&self, request: IngestRequest) -> Result<Record> {
        let experiment = self.experiment(request.experiment_id)?;
        let mut subject = self.subject(request.subject_id)?;

        let table = build_headset_table(&request.payloads, &experiment, request.time_correction)?;
        let sample_rate = experiment.device.sample_rate;
        let signal = load_raw(&table, &experiment, sample_rate)?;
        let epochs = Epochs::build(&signal, &experiment)?;

        let reservation = self.paths.allocate(&self.repo, &self.files);
        self.files.write_table(&reservation.path, &table)?;
        let record = Record {
            id: 0,
            name: request.name,
            subject_name: subject.display_name(),
            experiment_id: experiment.id,
            lineage: Lineage::Original,
            path: reservation.path.clone(),
            date: reservation.date.clone(),
            duration: table.n_rows() as f64 / sample_rate,
            events: epochs.events.len(),
            epochs: epochs.summary(),
            sample_rate,
            preprocessing: Vec::new(),
            features: Vec::new(),
        };
        let saved = match self.repo.save_record(record) {
            Ok(saved) => saved,
            Err(e) => {
                self.discard(std::slice::from_ref(&reservation));
                return Err(e);
            }
        };

        subject.total_experiments_performed += 1;
        self.repo.save_subject(subject)?;
        info!(
            "record {} ingested to {} ({} events, {})",
            saved.id, saved.path, saved.events, saved.epochs
        );
        Ok(saved)
    }
}
