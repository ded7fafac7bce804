pub mod registry;
pub mod artifact_storage;
pub mod config;

pub use registry::{lookup, DatasetId, DatasetSpec, ModelKind, OptimizerKind, HUSHEM, SMIDS};
pub use artifact_storage::{create_bundle, install_bundle, ArtifactPaths};
pub use config::{AppConfig, ConfidenceSource, DeviceType, HistorySettings, Normalization};
