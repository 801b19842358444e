mod models;
mod store;

pub use models::{DeviceMetadata, Report, ReportOutcome};
pub use store::ReportStore;
