use super::RecordService;
use crate::{
    error::Result,
    files::FileStore,
    model::{Lineage, PreprocessingStep, Record, RecordId},
    repository::Repository,
};
use log::info;

impl<R: Repository, F: FileStore> RecordService<R, F> {
    /// Duplicate file and preprocessing trail; feature markers stay behind.
    pub fn copy(&self, id: RecordId, name: &str) -> Result<Record> {
        let _guard = self.locks.lock(&[id]);
        let original = self.record(id)?;
        let reservation = self.paths.allocate(&self.repo, &self.files);
        self.files.copy(&original.path, &reservation.path)?;
        let copy = Record {
            id: 0,
            name: name.to_string(),
            lineage: Lineage::Copied,
            path: reservation.path.clone(),
            date: reservation.date.clone(),
            features: Vec::new(),
            ..original
        };
        match self.repo.save_record(copy) {
            Ok(saved) => {
                info!("record {} copied to {} as '{}'", id, saved.id, saved.name);
                Ok(saved)
            }
            Err(e) => {
                self.discard(std::slice::from_ref(&reservation));
                Err(e)
            }
        }
    }

    pub fn rename(&self, id: RecordId, name: &str) -> Result<Record> {
        let _guard = self.locks.lock(&[id]);
        let mut record = self.record(id)?;
        record.name = name.to_string();
        self.repo.save_record(record)
    }

    /// Remove the record and its file. Trainings lose the record; those
    /// left empty are deleted.
    pub fn delete(&self, id: RecordId) -> Result<()> {
        let _guard = self.locks.lock(&[id]);
        let record = self.record(id)?;
        self.files.remove(&record.path)?;
        for mut training in self.repo.trainings() {
            if !training.records.contains(&id) {
                continue;
            }
            if training.records.len() == 1 {
                info!("training {} is empty and goes with record {}", training.id, id);
                self.repo.delete_training(training.id)?;
            } else {
                training.records.retain(|r| *r != id);
                self.repo.save_training(training)?;
            }
        }
        self.repo.delete_record(id)?;
        info!("record {} deleted", id);
        Ok(())
    }

    pub fn records(&self) -> Vec<Record> {
        self.repo.records()
    }

    pub fn records_for_experiment(&self, experiment_id: u64) -> Result<Vec<Record>> {
        self.experiment(experiment_id)?;
        Ok(self.repo.records_for_experiment(experiment_id))
    }

    pub fn preprocessing_steps(&self, id: RecordId) -> Result<Vec<PreprocessingStep>> {
        Ok(self.record(id)?.preprocessing)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use eegp_lib::{features::FeatureKind, preprocessing::Transform};

    #[test]
    fn copy_keeps_steps_but_not_features() {
        let (dir, service, r1) = seeded();
        let prepped = service
            .apply_preprocessing(
                &[r1.id],
                &[Transform::Downsampling {
                    freq_downsampling: "128".into(),
                }],
            )
            .unwrap()
            .remove(0);
        let copy = service.copy(r1.id, "copy").unwrap();
        assert_ne!(copy.id, r1.id);
        assert_ne!(copy.path, prepped.path);
        assert_eq!(copy.lineage, Lineage::Copied);
        assert_eq!(copy.preprocessing, prepped.preprocessing);
        assert_eq!(copy.sample_rate, 128.0);
        assert!(dir.path().join(&copy.path).exists());

        service.apply_feature(&[r1.id], FeatureKind::Mean).unwrap();
        let second = service.copy(r1.id, "second").unwrap();
        assert!(second.features.is_empty());
    }

    #[test]
    fn rename_changes_only_the_name() {
        let (_dir, service, r1) = seeded();
        let renamed = service.rename(r1.id, "renamed").unwrap();
        assert_eq!(renamed.name, "renamed");
        assert_eq!(renamed.path, r1.path);
        assert!(service.rename(99, "x").unwrap_err().is_not_found());
    }

    #[test]
    fn delete_cascades_to_trainings() {
        let (dir, service, r1) = seeded();
        let r2 = service.copy(r1.id, "R2").unwrap();
        let solo = service.add_training("solo", &[r1.id]).unwrap();
        let pair = service.add_training("pair", &[r1.id, r2.id]).unwrap();

        service.delete(r1.id).unwrap();
        assert!(service.record(r1.id).is_err());
        assert!(!dir.path().join(&r1.path).exists());
        assert!(service.repository().training(solo.id).is_none());
        assert_eq!(service.repository().training(pair.id).unwrap().records, vec![r2.id]);
    }

    #[test]
    fn delete_tolerates_a_missing_file() {
        let (dir, service, r1) = seeded();
        std::fs::remove_file(dir.path().join(&r1.path)).unwrap();
        service.delete(r1.id).unwrap();
        assert!(service.repository().records().is_empty());
    }

    #[test]
    fn lists_by_experiment_and_steps() {
        let (_dir, service, r1) = seeded();
        let listed = service.records_for_experiment(r1.experiment_id).unwrap();
        assert_eq!(listed, vec![r1.clone()]);
        assert!(service.records_for_experiment(999).is_err());
        assert!(service.preprocessing_steps(r1.id).unwrap().is_empty());
    }
}
