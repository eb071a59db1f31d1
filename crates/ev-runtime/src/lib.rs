mod engine;
mod helpers;
mod legacy;

pub use engine::{check_snapshot, EventProcessor, ProcessorOptions, DEFAULT_MAX_STEPS};
pub use legacy::LegacyProcessor;
