use super::RecordService;
use crate::{
    error::{Result, StoreError},
    files::FileStore,
    model::{FeatureMarker, Record, RecordId},
    repository::Repository,
};
use eegp_lib::{
    epochs::Epochs,
    features::{extract, FeatureKind},
};
use log::{info, warn};

impl<R: Repository, F: FileStore> RecordService<R, F> {
    /// Replace each record's data by a per-epoch feature table.
    ///
    /// Records that already hold features are epoched from their stored
    /// feature table, so each further marker describes the reduced data.
    pub fn apply_feature(&self, ids: &[RecordId], kind: FeatureKind) -> Result<Vec<Record>> {
        let _guard = self.locks.lock(ids);
        let records = self.records_for(ids)?;
        let experiment_id = records[0].experiment_id;
        if records.iter().any(|r| r.experiment_id != experiment_id) {
            return Err(StoreError::validation(
                "feature extraction needs records of a single experiment",
            ));
        }

        let estimator = self.config.features.variance;
        let mut updates = Vec::with_capacity(records.len());
        for mut record in records {
            let (experiment, signal) = self.load_signal(&record)?;
            let epochs = Epochs::build(&signal, &experiment)?;
            if record.has_features() && epochs.is_empty() {
                warn!(
                    "record {} holds {} rows of features and no epoch window fits them",
                    record.id,
                    signal.n_samples()
                );
            }
            let table = extract(&epochs, kind, estimator)?;
            record.features.push(FeatureMarker { kind });
            record.lineage = record.lineage.after_feature();
            record.duration = 0.0;
            updates.push((record, table));
        }

        let saved = self.replace_files(updates)?;
        info!("extracted {} for {} records", kind, saved.len());
        Ok(saved)
    }

    /// Other records whose feature markers match this one's, in order.
    pub fn same_features(&self, id: RecordId) -> Result<Vec<Record>> {
        let record = self.record(id)?;
        let kinds = record.feature_kinds();
        Ok(self
            .repo
            .records()
            .into_iter()
            .filter(|r| r.id != id && r.feature_kinds() == kinds)
            .collect())
    }

    pub fn feature_markers(&self, id: RecordId) -> Result<Vec<FeatureMarker>> {
        Ok(self.record(id)?.features)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::model::Lineage;
    use eegp_lib::{
        preprocessing::{FilterMethod, Transform},
        Error,
    };

    #[test]
    fn feature_table_replaces_data() {
        let (dir, service, record) = seeded();
        let updated = service
            .apply_feature(&[record.id], FeatureKind::Deviation)
            .unwrap()
            .remove(0);
        assert_eq!(updated.lineage, Lineage::Feature);
        assert_eq!(updated.duration, 0.0);
        assert_eq!(updated.features[0].name(), "Standard Deviation");
        assert!(!dir.path().join(&record.path).exists());

        let table = service.files().read_table(&updated.path).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.headers[0], "Fp1_deviation_standard");
        assert_eq!(table.column(8), vec![1.0, 2.0]);
    }

    #[test]
    fn preprocessed_record_becomes_prep_feature() {
        let (_dir, service, record) = seeded();
        service
            .apply_preprocessing(
                &[record.id],
                &[Transform::Notch {
                    freq: "50".into(),
                    filter_method: FilterMethod::Fir,
                    phase: "zero".into(),
                    order: "4".into(),
                }],
            )
            .unwrap();
        let updated = service
            .apply_feature(&[record.id], FeatureKind::Psd)
            .unwrap()
            .remove(0);
        assert_eq!(updated.lineage, Lineage::PrepFeature);
        assert_eq!(updated.preprocessing.len(), 1);
    }

    #[test]
    fn second_extraction_works_on_the_feature_table() {
        let (dir, service, record) = seeded();
        let first = service
            .apply_feature(&[record.id], FeatureKind::Mean)
            .unwrap()
            .remove(0);
        let second = service
            .apply_feature(&[record.id], FeatureKind::Variance)
            .unwrap()
            .remove(0);
        assert_eq!(second.feature_kinds(), vec![FeatureKind::Mean, FeatureKind::Variance]);
        assert_eq!(second.lineage, Lineage::Feature);
        assert_eq!(second.duration, 0.0);
        assert!(!dir.path().join(&first.path).exists());

        // two rows are too short for any epoch window
        let table = service.files().read_table(&second.path).unwrap();
        assert_eq!(table.headers[0], "Fp1_mean_variance");
        assert_eq!(table.n_rows(), 0);
    }

    #[test]
    fn prep_feature_lineage_survives_another_feature() {
        let (_dir, service, record) = seeded();
        service
            .apply_preprocessing(
                &[record.id],
                &[Transform::Downsampling {
                    freq_downsampling: "128".into(),
                }],
            )
            .unwrap();
        service.apply_feature(&[record.id], FeatureKind::Mean).unwrap();
        let updated = service
            .apply_feature(&[record.id], FeatureKind::Deviation)
            .unwrap()
            .remove(0);
        assert_eq!(updated.lineage, Lineage::PrepFeature);
        assert_eq!(updated.features.len(), 2);
    }

    #[test]
    fn records_must_share_an_experiment() {
        let (_dir, service, record) = seeded();
        let mut other = experiment();
        other.name = "other".into();
        let other = service.add_experiment(other).unwrap();
        let mut stray = service.copy(record.id, "stray").unwrap();
        stray.experiment_id = other.id;
        service.repository().save_record(stray.clone()).unwrap();
        let err = service
            .apply_feature(&[record.id, stray.id], FeatureKind::Mean)
            .unwrap_err();
        assert!(matches!(err.core(), Some(Error::Validation(_))));
    }

    #[test]
    fn same_features_matches_sequences_and_skips_self() {
        let (_dir, service, r1) = seeded();
        let r2 = service.copy(r1.id, "R2").unwrap();
        let r3 = service.copy(r1.id, "R3").unwrap();
        service.apply_feature(&[r1.id, r2.id], FeatureKind::Mean).unwrap();

        let same: Vec<RecordId> = service.same_features(r1.id).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(same, vec![r2.id]);
        let plain: Vec<RecordId> = service.same_features(r3.id).unwrap().iter().map(|r| r.id).collect();
        assert!(plain.is_empty());
        assert_eq!(service.feature_markers(r2.id).unwrap().len(), 1);
    }
}
