pub mod error;
pub mod types;

pub use error::{JobsError, Result};
pub use types::{ActionCategory, ActorId, ContextValue, EventContext, JobId, context_keys};
