mod controller;
mod engine;
mod state;

pub use controller::TesterController;
pub use engine::{EngineParts, StartRejection, TesterEngine};
pub use state::{LiveState, TestSession, TesterStatus};
