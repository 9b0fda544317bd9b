//! Tapenote Core - Transport, A/B loop and take mixing for songwriting sessions
//!
//! A session plays one backing track through a [`transport::Transport`],
//! lets the writer mark an A/B loop, records short vocal takes into two
//! round-robin slots and plays each take back at the song position where it
//! was recorded.

pub mod audio;
pub mod codec;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod gesture;
pub mod looping;
pub mod mixer;
pub mod recorder;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use types::*;
