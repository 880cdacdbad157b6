//! Persistence seam for records, experiments, subjects and trainings.

use crate::{
    error::Result,
    model::{Record, RecordId, Subject, Training},
};
use eegp_lib::Experiment;
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

/// Storage of entities. Saving an entity with id 0 assigns the next id.
pub trait Repository: Send + Sync {
    fn record(&self, id: RecordId) -> Option<Record>;
    fn record_by_path(&self, path: &str) -> Option<Record>;
    fn records(&self) -> Vec<Record>;
    fn records_for_experiment(&self, experiment_id: u64) -> Vec<Record>;
    fn save_record(&self, record: Record) -> Result<Record>;
    /// Several records in one write; all or none become visible.
    fn save_records(&self, records: Vec<Record>) -> Result<Vec<Record>>;
    fn delete_record(&self, id: RecordId) -> Result<bool>;

    fn experiment(&self, id: u64) -> Option<Experiment>;
    fn experiments(&self) -> Vec<Experiment>;
    fn save_experiment(&self, experiment: Experiment) -> Result<Experiment>;

    fn subject(&self, id: u64) -> Option<Subject>;
    fn subjects(&self) -> Vec<Subject>;
    fn save_subject(&self, subject: Subject) -> Result<Subject>;

    fn training(&self, id: u64) -> Option<Training>;
    fn trainings(&self) -> Vec<Training>;
    fn save_training(&self, training: Training) -> Result<Training>;
    fn delete_training(&self, id: u64) -> Result<bool>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct State {
    next_id: u64,
    records: BTreeMap<RecordId, Record>,
    experiments: BTreeMap<u64, Experiment>,
    subjects: BTreeMap<u64, Subject>,
    trainings: BTreeMap<u64, Training>,
}

impl State {
    fn assign(&mut self, id: u64) -> u64 {
        if id != 0 {
            self.next_id = self.next_id.max(id);
            return id;
        }
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory repository, optionally mirrored to a JSON snapshot after every
/// mutation.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: RwLock<State>,
    snapshot: Option<PathBuf>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path` if it exists and keep writing to it.
    pub fn open(path: &Path) -> Result<Self> {
        let state = if path.exists() {
            let contents = fs::read_to_string(path)?;
            let state: State = serde_json::from_str(&contents)?;
            debug!(
                "loaded snapshot {} ({} records)",
                path.display(),
                state.records.len()
            );
            state
        } else {
            State::default()
        };
        Ok(Self {
            state: RwLock::new(state),
            snapshot: Some(path.to_path_buf()),
        })
    }

    fn persist(&self, state: &State) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, state)?;
            writer.flush()?;
        }
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Applies `f` to a copy that replaces the live state only once the
    /// snapshot holds it.
    fn mutate<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T> {
        let mut state = self.state.write();
        let mut next = state.clone();
        let out = f(&mut next);
        self.persist(&next)?;
        *state = next;
        Ok(out)
    }
}

impl Repository for MemoryRepository {
    fn record(&self, id: RecordId) -> Option<Record> {
        self.state.read().records.get(&id).cloned()
    }

    fn record_by_path(&self, path: &str) -> Option<Record> {
        self.state
            .read()
            .records
            .values()
            .find(|r| r.path == path)
            .cloned()
    }

    fn records(&self) -> Vec<Record> {
        self.state.read().records.values().cloned().collect()
    }

    fn records_for_experiment(&self, experiment_id: u64) -> Vec<Record> {
        self.state
            .read()
            .records
            .values()
            .filter(|r| r.experiment_id == experiment_id)
            .cloned()
            .collect()
    }

    fn save_record(&self, record: Record) -> Result<Record> {
        let mut saved = self.save_records(vec![record])?;
        Ok(saved.remove(0))
    }

    fn save_records(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        self.mutate(|state| {
            records
                .into_iter()
                .map(|mut record| {
                    record.id = state.assign(record.id);
                    state.records.insert(record.id, record.clone());
                    record
                })
                .collect()
        })
    }

    fn delete_record(&self, id: RecordId) -> Result<bool> {
        self.mutate(|state| state.records.remove(&id).is_some())
    }

    fn experiment(&self, id: u64) -> Option<Experiment> {
        self.state.read().experiments.get(&id).cloned()
    }

    fn experiments(&self) -> Vec<Experiment> {
        self.state.read().experiments.values().cloned().collect()
    }

    fn save_experiment(&self, mut experiment: Experiment) -> Result<Experiment> {
        self.mutate(|state| {
            experiment.id = state.assign(experiment.id);
            state.experiments.insert(experiment.id, experiment.clone());
            experiment
        })
    }

    fn subject(&self, id: u64) -> Option<Subject> {
        self.state.read().subjects.get(&id).cloned()
    }

    fn subjects(&self) -> Vec<Subject> {
        self.state.read().subjects.values().cloned().collect()
    }

    fn save_subject(&self, mut subject: Subject) -> Result<Subject> {
        self.mutate(|state| {
            subject.id = state.assign(subject.id);
            state.subjects.insert(subject.id, subject.clone());
            subject
        })
    }

    fn training(&self, id: u64) -> Option<Training> {
        self.state.read().trainings.get(&id).cloned()
    }

    fn trainings(&self) -> Vec<Training> {
        self.state.read().trainings.values().cloned().collect()
    }

    fn save_training(&self, mut training: Training) -> Result<Training> {
        self.mutate(|state| {
            training.id = state.assign(training.id);
            state.trainings.insert(training.id, training.clone());
            training
        })
    }

    fn delete_training(&self, id: u64) -> Result<bool> {
        self.mutate(|state| state.trainings.remove(&id).is_some())
    }
}
