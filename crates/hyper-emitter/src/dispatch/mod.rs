//! # Listener Dispatch
//!
//! - `listeners` - Per-name handler lists and registration handles
//! - `completion` - The completion signal of asynchronous handlers
//! - `pipeline` - The one-entry-at-a-time delivery loop

pub mod completion;
pub mod listeners;
pub mod pipeline;

pub use completion::Completion;
pub use listeners::{AsyncHandler, Handler, ListenerHandle, ListenerTable, SyncHandler};
pub use pipeline::DispatchHandler;
