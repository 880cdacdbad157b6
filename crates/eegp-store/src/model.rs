//! Persisted entities of the record lifecycle.

use eegp_lib::{
    features::FeatureKind,
    preprocessing::{PreprocessingKind, StepDraft},
};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type RecordId = u64;

/// How a record's current data came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lineage {
    #[serde(rename = "original")]
    Original,
    #[serde(rename = "copied")]
    Copied,
    #[serde(rename = "prep")]
    Prep,
    #[serde(rename = "feature")]
    Feature,
    #[serde(rename = "prep | feature")]
    PrepFeature,
}

impl Lineage {
    /// Lineage once a feature table replaces the data.
    pub fn after_feature(self) -> Self {
        match self {
            Lineage::Prep | Lineage::PrepFeature => Lineage::PrepFeature,
            _ => Lineage::Feature,
        }
    }
}

impl fmt::Display for Lineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lineage::Original => "original",
            Lineage::Copied => "copied",
            Lineage::Prep => "prep",
            Lineage::Feature => "feature",
            Lineage::PrepFeature => "prep | feature",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingStep {
    /// 1-based, contiguous per record.
    pub position: u32,
    pub kind: PreprocessingKind,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMarker {
    pub kind: FeatureKind,
}

impl FeatureMarker {
    pub fn name(&self) -> &'static str {
        self.kind.marker_name()
    }
}

/// One stored recording and its audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub name: String,
    pub subject_name: String,
    pub experiment_id: u64,
    pub lineage: Lineage,
    /// Relative to the workspace root; unique across records.
    pub path: String,
    pub date: String,
    /// Seconds; zero once the data is a feature table.
    pub duration: f64,
    pub events: usize,
    pub epochs: String,
    pub sample_rate: f64,
    #[serde(default)]
    pub preprocessing: Vec<PreprocessingStep>,
    #[serde(default)]
    pub features: Vec<FeatureMarker>,
}

impl Record {
    pub fn has_features(&self) -> bool {
        !self.features.is_empty()
    }

    /// Append audit entries after the existing ones.
    pub fn push_steps(&mut self, drafts: impl IntoIterator<Item = StepDraft>) {
        for draft in drafts {
            let position = self.preprocessing.len() as u32 + 1;
            self.preprocessing.push(PreprocessingStep {
                position,
                kind: draft.kind,
                description: draft.description,
            });
        }
    }

    pub fn feature_kinds(&self) -> Vec<FeatureKind> {
        self.features.iter().map(|m| m.kind).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    pub surname: String,
    #[serde(default)]
    pub total_experiments_performed: u32,
}

impl Subject {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }
}

/// Named group of records assembled for model training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Training {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    pub records: Vec<RecordId>,
}
