pub mod commands;
pub mod error;
pub mod host;
pub mod program;
pub mod types;
pub mod value;

pub use commands::{builtin_descriptors, CommandDescriptor, CommandRegistry, CommandRole, CommandTag};
pub use error::{ErrorCode, ErrorFrame, EventError};
pub use host::{EventCatalog, ScriptHost, StaticHost};
pub use program::*;
pub use types::*;
pub use value::*;
