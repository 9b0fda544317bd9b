//! RT-safe deallocation for decoded audio
//!
//! Decoded clips are shared between the decode workers and the audio thread as
//! `basedrop::Shared<T>`. Dropping the last reference on the audio thread only
//! enqueues the pointer; the memory is freed on a background collector thread.
//!
//! ```ignore
//! use basedrop::Shared;
//! use tapenote_core::engine::gc_handle;
//!
//! let clip = Shared::new(&gc_handle(), decoded_clip);
//! ```

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// How often the collector thread frees deferred drops
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("clip-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it lives on this thread only
            let mut collector = Collector::new();
            tx.send(collector.handle()).expect("Failed to send GC handle");

            log::info!("Clip GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn clip GC thread");

    rx.recv().expect("Failed to receive GC handle")
}

/// Handle for creating `Shared<T>` allocations
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}
