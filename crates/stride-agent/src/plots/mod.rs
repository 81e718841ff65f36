//! Plot artifacts: storage and reference resolution

pub mod resolver;
pub mod storage;

pub use resolver::{PlotReferenceResolver, ReferenceValidation};
pub use storage::{PlotMetadata, PlotStorage, SharedPlotStorage, StorageStats};
