//! Record lifecycle on top of `eegp-lib`: persistence seams, file naming,
//! locking, configuration and the [`RecordService`] that drives ingestion,
//! preprocessing, feature extraction, ICA and rendering.

pub mod config;
pub mod error;
pub mod files;
pub mod locks;
pub mod model;
pub mod paths;
pub mod render;
pub mod repository;
pub mod service;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use files::{DiskFileStore, FileStore};
pub use model::{FeatureMarker, Lineage, PreprocessingStep, Record, RecordId, Subject, Training};
pub use repository::{MemoryRepository, Repository};
pub use service::{IcaComponents, IngestRequest, PlotRequest, Preview, RecordService};
