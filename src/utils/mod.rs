pub mod logging;

pub use logging::NarrativeLog;
