//! `RecordService`: every record operation, from ingestion to rendering.

mod features;
mod ica;
mod ingest;
mod lifecycle;
mod preprocess;
mod views;

pub use ica::IcaComponents;
pub use ingest::IngestRequest;
pub use views::{PlotRequest, Preview, PreviewSeries, PreviewValue, StimulusPoint};

use crate::{
    config::StoreConfig,
    error::{Result, StoreError},
    files::{DiskFileStore, FileStore},
    locks::RecordLocks,
    model::{Record, RecordId, Subject, Training},
    paths::PathAllocator,
    render::PngRenderer,
    repository::{MemoryRepository, Repository},
};
use eegp_lib::{
    io::{load_raw, Table},
    Experiment, RawSignal,
};
use log::{info, warn};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

/// Raised when a batch touches a record that already holds features.
pub const FEATURES_APPLIED: &str =
    "In some csv have already applied feature extraction. Please, unselect";

pub struct RecordService<R, F> {
    repo: R,
    files: F,
    config: StoreConfig,
    paths: PathAllocator,
    locks: RecordLocks,
    tmp_dir: PathBuf,
}

impl RecordService<MemoryRepository, DiskFileStore> {
    /// Workspace rooted at `root`: `eegp.toml`, the snapshot and the csv
    /// directory all live below it.
    pub fn open(root: &Path) -> Result<Self> {
        let config = StoreConfig::load_from_root(root)?;
        let repo = match &config.snapshot {
            Some(snapshot) => MemoryRepository::open(&root.join(snapshot))?,
            None => MemoryRepository::new(),
        };
        let tmp_dir = root.join(&config.tmp_dir);
        Ok(Self::new(repo, DiskFileStore::new(root), config, tmp_dir))
    }
}

impl<R: Repository, F: FileStore> RecordService<R, F> {
    pub fn new(repo: R, files: F, config: StoreConfig, tmp_dir: PathBuf) -> Self {
        let paths = PathAllocator::new(config.csv_dir.to_string_lossy().into_owned());
        Self {
            repo,
            files,
            config,
            paths,
            locks: RecordLocks::new(),
            tmp_dir,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn files(&self) -> &F {
        &self.files
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn add_experiment(&self, experiment: Experiment) -> Result<Experiment> {
        experiment.validate()?;
        let saved = self.repo.save_experiment(experiment)?;
        info!("experiment {} '{}' stored", saved.id, saved.name);
        Ok(saved)
    }

    pub fn experiment(&self, id: u64) -> Result<Experiment> {
        self.repo
            .experiment(id)
            .ok_or_else(|| StoreError::not_found(format!("experiment {}", id)))
    }

    pub fn add_subject(&self, name: &str, surname: &str) -> Result<Subject> {
        self.repo.save_subject(Subject {
            id: 0,
            name: name.to_string(),
            surname: surname.to_string(),
            total_experiments_performed: 0,
        })
    }

    pub fn subject(&self, id: u64) -> Result<Subject> {
        self.repo
            .subject(id)
            .ok_or_else(|| StoreError::not_found(format!("subject {}", id)))
    }

    pub fn record(&self, id: RecordId) -> Result<Record> {
        self.repo
            .record(id)
            .ok_or_else(|| StoreError::not_found(format!("record {}", id)))
    }

    /// Every id must exist; reported in request order with repeats dropped.
    fn records_for(&self, ids: &[RecordId]) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Err(StoreError::validation("no records selected"));
        }
        let mut seen = HashSet::with_capacity(ids.len());
        ids.iter()
            .filter(|id| seen.insert(**id))
            .map(|id| self.record(*id))
            .collect()
    }

    fn ensure_no_features(records: &[Record]) -> Result<()> {
        if records.iter().any(Record::has_features) {
            return Err(StoreError::precondition(FEATURES_APPLIED));
        }
        Ok(())
    }

    /// Experiment and typed signal behind a record.
    fn load_signal(&self, record: &Record) -> Result<(Experiment, RawSignal)> {
        let experiment = self.experiment(record.experiment_id)?;
        let table = self.files.read_table(&record.path)?;
        let signal = load_raw(&table, &experiment, record.sample_rate)?;
        Ok((experiment, signal))
    }

    fn renderer(&self) -> PngRenderer {
        PngRenderer::new(&self.tmp_dir)
    }

    /// Write each table under a fresh path, then save the records pointing
    /// at them in one repository write and drop the superseded files.
    ///
    /// Nothing is saved unless every file was written; new files are
    /// removed again on failure.
    fn replace_files(&self, updates: Vec<(Record, Table)>) -> Result<Vec<Record>> {
        let mut reservations = Vec::with_capacity(updates.len());
        let mut records = Vec::with_capacity(updates.len());
        let mut old_paths = Vec::with_capacity(updates.len());

        for (mut record, table) in updates {
            let reservation = self.paths.allocate(&self.repo, &self.files);
            if let Err(e) = self.files.write_table(&reservation.path, &table) {
                self.discard(&reservations);
                return Err(e);
            }
            old_paths.push(std::mem::replace(&mut record.path, reservation.path.clone()));
            record.date = reservation.date.clone();
            records.push(record);
            reservations.push(reservation);
        }

        let saved = match self.repo.save_records(records) {
            Ok(saved) => saved,
            Err(e) => {
                self.discard(&reservations);
                return Err(e);
            }
        };
        for path in old_paths {
            if let Err(e) = self.files.remove(&path) {
                warn!("record saved but superseded file {} remains: {}", path, e);
            }
        }
        Ok(saved)
    }

    fn discard(&self, reservations: &[crate::paths::Reservation<'_>]) {
        for reservation in reservations {
            if let Err(e) = self.files.remove(&reservation.path) {
                warn!("could not clean up {}: {}", reservation.path, e);
            }
        }
    }

    pub fn add_training(&self, name: &str, ids: &[RecordId]) -> Result<Training> {
        let records = self.records_for(ids)?;
        let training = self.repo.save_training(Training {
            id: 0,
            name: name.to_string(),
            records: records.iter().map(|r| r.id).collect(),
        })?;
        info!("training {} groups {} records", training.id, training.records.len());
        Ok(training)
    }

    pub fn trainings(&self) -> Vec<Training> {
        self.repo.trainings()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn unknown_ids_are_not_found() {
        let (_dir, service) = service();
        assert!(service.record(4).unwrap_err().is_not_found());
        assert!(service.experiment(4).unwrap_err().is_not_found());
        assert!(service.subject(4).unwrap_err().is_not_found());
    }

    #[test]
    fn invalid_experiment_is_rejected() {
        let (_dir, service) = service();
        let mut exp = experiment();
        exp.epoch_end = exp.epoch_start;
        assert!(service.add_experiment(exp).is_err());
        assert!(service.repository().experiments().is_empty());
    }

    #[test]
    fn training_requires_existing_records() {
        let (_dir, service, record) = seeded();
        assert!(service.add_training("t", &[record.id, 99]).is_err());
        let training = service.add_training("t", &[record.id]).unwrap();
        assert_eq!(service.trainings(), vec![training]);
    }

    /// Disk store whose deletes always fail.
    struct StickyFiles(DiskFileStore);

    impl FileStore for StickyFiles {
        fn read_table(&self, path: &str) -> Result<Table> {
            self.0.read_table(path)
        }
        fn write_table(&self, path: &str, table: &Table) -> Result<()> {
            self.0.write_table(path, table)
        }
        fn copy(&self, from: &str, to: &str) -> Result<()> {
            self.0.copy(from, to)
        }
        fn remove(&self, _path: &str) -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }
        fn exists(&self, path: &str) -> bool {
            self.0.exists(path)
        }
    }

    #[test]
    fn stale_file_cleanup_failure_keeps_the_saved_batch() {
        let dir = tempfile::tempdir().unwrap();
        let service = RecordService::new(
            MemoryRepository::new(),
            StickyFiles(DiskFileStore::new(dir.path())),
            StoreConfig::default(),
            dir.path().join("tmp"),
        );
        let exp = service.add_experiment(experiment()).unwrap();
        let subject = service.add_subject("Ada", "Lovelace").unwrap();
        let record = service
            .ingest(IngestRequest {
                name: "R1".into(),
                subject_id: subject.id,
                experiment_id: exp.id,
                payloads: vec![payload(&[(1, 100), (2, 500)])],
                time_correction: 0.0,
            })
            .unwrap();

        let saved = service
            .apply_preprocessing(
                &[record.id],
                &[eegp_lib::preprocessing::Transform::Downsampling {
                    freq_downsampling: "128".into(),
                }],
            )
            .unwrap();
        assert_ne!(saved[0].path, record.path);
        assert_eq!(service.record(record.id).unwrap(), saved[0]);
        assert!(dir.path().join(&record.path).exists());
    }
}
