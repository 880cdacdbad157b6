use super::RecordService;
use crate::{
    error::Result,
    files::FileStore,
    model::{Lineage, Record, RecordId},
    repository::Repository,
};
use eegp_lib::{
    io::signal_to_table,
    plot::{figures, PlotBackend},
    preprocessing::{
        ica::{exclusion_description, Ica, IcaMethod},
        PreprocessingKind, StepDraft,
    },
    RawSignal,
};
use log::info;
use serde::Serialize;

/// Scalp maps of every component and how many there are.
#[derive(Debug, Clone, Serialize)]
pub struct IcaComponents {
    pub img: String,
    pub components: usize,
}

impl<R: Repository, F: FileStore> RecordService<R, F> {
    fn fit_ica(&self, id: RecordId, method: IcaMethod) -> Result<(Record, RawSignal, Ica)> {
        let record = self.record(id)?;
        let (_, signal) = self.load_signal(&record)?;
        let ica = Ica::fit(&signal, method, &self.config.ica)?;
        Ok((record, signal, ica))
    }

    pub fn ica_components(&self, id: RecordId, method: IcaMethod) -> Result<IcaComponents> {
        let (_, signal, ica) = self.fit_ica(id, method)?;
        let mut canvas = figures::ica_components_canvas(&ica, &signal.channels)?;
        canvas.width = self.config.render.width;
        let img = self.renderer().draw(&canvas)?;
        Ok(IcaComponents {
            img,
            components: ica.n_components(),
        })
    }

    /// One image per component.
    pub fn ica_properties(&self, id: RecordId, method: IcaMethod) -> Result<Vec<String>> {
        let (_, signal, ica) = self.fit_ica(id, method)?;
        let mut renderer = self.renderer();
        figures::ica_properties_canvases(&ica, &signal)?
            .into_iter()
            .map(|mut canvas| {
                canvas.width = self.config.render.width;
                canvas.height = self.config.render.height;
                renderer.draw(&canvas)
            })
            .collect()
    }

    /// Reconstruct the record without the listed components.
    pub fn ica_exclude(
        &self,
        id: RecordId,
        method: IcaMethod,
        components: &[usize],
    ) -> Result<Record> {
        let _guard = self.locks.lock(&[id]);
        let (mut record, signal, ica) = self.fit_ica(id, method)?;
        Self::ensure_no_features(std::slice::from_ref(&record))?;
        let cleaned = ica.exclude(&signal, components)?;

        record.push_steps([StepDraft {
            kind: PreprocessingKind::Ica,
            description: exclusion_description(components),
        }]);
        record.lineage = Lineage::Prep;
        record.duration = cleaned.duration();
        let table = signal_to_table(&cleaned);
        let saved = self.replace_files(vec![(record, table)])?.remove(0);
        info!("record {} cleaned by {} ICA", saved.id, method);
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::model::PreprocessingStep;
    use eegp_lib::Error;

    #[test]
    fn exclusion_appends_an_ica_step() {
        let (_dir, service, record) = seeded();
        let updated = service.ica_exclude(record.id, IcaMethod::Fastica, &[0, 2]).unwrap();
        assert_eq!(
            updated.preprocessing,
            vec![PreprocessingStep {
                position: 1,
                kind: PreprocessingKind::Ica,
                description: "Components removed: 0, 2".into(),
            }]
        );
        assert_eq!(updated.lineage, Lineage::Prep);
        let table = service.files().read_table(&updated.path).unwrap();
        assert_eq!(table.n_rows(), 1000);
        assert_eq!(table.n_cols(), 9);
    }

    #[test]
    fn out_of_range_component_is_rejected() {
        let (_dir, service, record) = seeded();
        let err = service.ica_exclude(record.id, IcaMethod::Fastica, &[40]).unwrap_err();
        assert!(matches!(err.core(), Some(Error::Validation(_))));
        assert_eq!(service.record(record.id).unwrap(), record);
    }

    #[test]
    fn component_images_are_rendered() {
        let (_dir, service, record) = seeded();
        let components = service.ica_components(record.id, IcaMethod::Fastica).unwrap();
        assert_eq!(components.components, 8);
        assert!(!components.img.is_empty());
        let props = service.ica_properties(record.id, IcaMethod::Fastica).unwrap();
        assert_eq!(props.len(), 8);
    }

    #[test]
    fn infomax_exclusion_keeps_the_same_audit_text() {
        let (_dir, service, record) = seeded();
        let updated = service
            .ica_exclude(record.id, IcaMethod::Infomax, &[1])
            .unwrap();
        assert_eq!(updated.preprocessing.len(), 1);
        assert_eq!(updated.preprocessing[0].description, "Components removed: 1");
        // one direction less in the cleaned data
        let components = service.ica_components(updated.id, IcaMethod::Infomax).unwrap();
        assert_eq!(components.components, 7);
    }
}
