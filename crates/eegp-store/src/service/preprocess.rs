use super::RecordService;
use crate::{
    error::{Result, StoreError},
    files::FileStore,
    model::{Lineage, Record, RecordId},
    repository::Repository,
};
use eegp_lib::{
    io::signal_to_table,
    preprocessing::{apply_all, Transform},
};
use log::info;

impl<R: Repository, F: FileStore> RecordService<R, F> {
    /// Run `transforms` in order over every record. Either all records are
    /// replaced or none is.
    pub fn apply_preprocessing(
        &self,
        ids: &[RecordId],
        transforms: &[Transform],
    ) -> Result<Vec<Record>> {
        if transforms.is_empty() {
            return Err(StoreError::validation("no preprocessing steps given"));
        }
        let _guard = self.locks.lock(ids);
        let records = self.records_for(ids)?;
        Self::ensure_no_features(&records)?;

        let mut updates = Vec::with_capacity(records.len());
        for mut record in records {
            let (_, signal) = self.load_signal(&record)?;
            let (processed, drafts) = apply_all(&signal, transforms)?;
            record.push_steps(drafts);
            record.lineage = Lineage::Prep;
            record.duration = processed.duration();
            record.sample_rate = processed.sfreq;
            updates.push((record, signal_to_table(&processed)));
        }

        let saved = self.replace_files(updates)?;
        info!(
            "applied {} steps to records {:?}",
            transforms.len(),
            saved.iter().map(|r| r.id).collect::<Vec<_>>()
        );
        Ok(saved)
    }
}
