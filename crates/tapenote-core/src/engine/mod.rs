//! Real-time plumbing around a session
//!
//! - Command queue from the UI to the audio thread (`rtrb`)
//! - Atomic snapshot of session state for the UI
//! - Deferred deallocation of decoded clips (`basedrop`)
//! - [`SessionEngine`]: the object the audio callback owns

mod atomics;
mod command;
mod gc;
mod session_engine;

pub use atomics::SessionAtomics;
pub use command::{command_channel, SessionCommand, COMMAND_QUEUE_CAPACITY};
pub use gc::gc_handle;
pub use session_engine::{create_engine, CommandSender, SessionEngine};
