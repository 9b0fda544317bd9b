//! Background decoding of backing tracks and takes
//!
//! Requests go to a dispatcher thread which fans them out on the rayon pool.
//! Results come back on a channel that the session drains between audio
//! blocks, so decoding never runs on the audio thread.
//!
//! Every request carries the identity of what it was decoded for. Consumers
//! compare that against what they currently hold and drop stale results.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use basedrop::Shared;

use crate::codec::{decode_clip, DecodeError};
use crate::engine::gc_handle;
use crate::types::{AudioClip, SourceId};

/// What a decode request is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeTarget {
    /// The backing track of an attached source
    Track(SourceId),
    /// A take slot at a given content revision
    Take { slot: usize, revision: u64 },
}

struct DecodeRequest {
    target: DecodeTarget,
    payload: Arc<[u8]>,
}

/// A finished decode
pub struct DecodeResult {
    pub target: DecodeTarget,
    pub result: Result<Shared<AudioClip>, DecodeError>,
}

/// Background decoder shared by the transport and the take mixer
pub struct DecodeService {
    request_tx: Sender<DecodeRequest>,
    result_rx: Receiver<DecodeResult>,
    _handle: JoinHandle<()>,
}

impl DecodeService {
    pub fn new() -> Self {
        let (request_tx, request_rx) = mpsc::channel::<DecodeRequest>();
        let (result_tx, result_rx) = mpsc::channel::<DecodeResult>();

        let handle = thread::Builder::new()
            .name("clip-decoder".to_string())
            .spawn(move || dispatcher_thread(request_rx, result_tx))
            .expect("Failed to spawn clip decoder thread");

        Self {
            request_tx,
            result_rx,
            _handle: handle,
        }
    }

    /// Queue a payload for decoding (non-blocking)
    pub fn submit(&self, target: DecodeTarget, payload: Arc<[u8]>) {
        if let Err(e) = self.request_tx.send(DecodeRequest { target, payload }) {
            log::error!("Decoder: Failed to queue {:?}, dispatcher gone", e.0.target);
        }
    }

    /// Next finished decode, if any
    pub fn try_recv(&self) -> Option<DecodeResult> {
        self.result_rx.try_recv().ok()
    }
}

impl Default for DecodeService {
    fn default() -> Self {
        Self::new()
    }
}

fn dispatcher_thread(request_rx: Receiver<DecodeRequest>, result_tx: Sender<DecodeResult>) {
    log::info!("Clip decoder thread started");

    // Ends when the service (and its sender) is dropped
    while let Ok(request) = request_rx.recv() {
        let result_tx = result_tx.clone();
        rayon::spawn(move || {
            let DecodeRequest { target, payload } = request;
            let result = decode_clip(&payload).map(|clip| Shared::new(&gc_handle(), clip));

            match &result {
                Ok(clip) => log::debug!("Decoder: {:?} ready ({:.2}s)", target, clip.duration()),
                Err(e) => log::warn!("Decoder: {:?} failed: {}", target, e),
            }

            // Receiver gone means the session ended; nothing to report to
            let _ = result_tx.send(DecodeResult { target, result });
        });
    }

    log::debug!("Clip decoder thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{tone_wav, wait_until};
    use std::time::Duration;

    fn next_result(service: &DecodeService) -> DecodeResult {
        let mut found = None;
        assert!(wait_until(Duration::from_secs(10), || {
            found = service.try_recv();
            found.is_some()
        }));
        found.unwrap()
    }

    #[test]
    fn test_decodes_in_background() {
        let service = DecodeService::new();
        let id = SourceId::next();
        service.submit(DecodeTarget::Track(id), tone_wav(0.5, 8000, 0.5).into());

        let result = next_result(&service);
        assert_eq!(result.target, DecodeTarget::Track(id));
        let clip = result.result.unwrap();
        assert!((clip.duration() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_failure_is_reported_with_target() {
        let service = DecodeService::new();
        let target = DecodeTarget::Take { slot: 1, revision: 3 };
        service.submit(target, Arc::from(&b"noise"[..]));

        let result = next_result(&service);
        assert_eq!(result.target, target);
        assert!(result.result.is_err());
    }
}
