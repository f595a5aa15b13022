// src/runner/output.rs

//! Output multiplexing: fan-out of [`RunEvent`]s to subscribers, and the
//! pumps that turn a child's byte streams into `RunEvent::Output` chunks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::runner::{OutputStream, RunEvent};
use crate::types::ScriptId;

/// Size of a single read from a child stream.
const READ_CHUNK: usize = 8 * 1024;

/// Delivers every emitted [`RunEvent`] to all current subscribers.
///
/// Subscriber channels are unbounded: emitting never waits on a slow
/// consumer, so a consumer that calls back into the runner while handling
/// an event cannot deadlock the run loop. Subscribers whose receiver was
/// dropped are pruned on the next emit.
#[derive(Debug, Clone, Default)]
pub struct OutputMultiplexer {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<RunEvent>>>>,
}

impl OutputMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RunEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    pub fn emit(&self, event: RunEvent) {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        trace!(subscribers = subscribers.len(), ?event, "emitted run event");
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<RunEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Incremental, lossy UTF-8 decoder for chunked byte streams.
///
/// A multi-byte character split across two reads is held back until its
/// remaining bytes arrive instead of being turned into replacement
/// characters. Bytes that are genuinely invalid become U+FFFD; decoding
/// never fails.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `bytes` (plus anything held back) as possible.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let split = self.pending.len() - incomplete_suffix_len(&self.pending);
        let text = String::from_utf8_lossy(&self.pending[..split]).into_owned();
        self.pending.drain(..split);
        text
    }

    /// Flush whatever is held back; a truncated character becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Length of a trailing, not-yet-complete UTF-8 sequence in `bytes`.
fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let byte = bytes[len - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let width = match byte {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return 0,
        };
        return if back < width { back } else { 0 };
    }
    0
}

/// Read `reader` to EOF, emitting each decoded chunk as `RunEvent::Output`
/// attributed to `script_id`.
///
/// Read errors end the pump quietly; they are not run failures.
pub async fn pump_stream<R>(
    mut reader: R,
    script_id: ScriptId,
    stream: OutputStream,
    events: OutputMultiplexer,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    let mut decoder = Utf8ChunkDecoder::new();

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.decode(&buf[..n]);
                if !text.is_empty() {
                    events.emit(RunEvent::Output {
                        script_id,
                        stream,
                        text,
                    });
                }
            }
            Err(e) => {
                debug!(script_id, ?stream, error = %e, "stream read failed; stopping pump");
                break;
            }
        }
    }

    let rest = decoder.finish();
    if !rest.is_empty() {
        events.emit(RunEvent::Output {
            script_id,
            stream,
            text: rest,
        });
    }

    debug!(script_id, ?stream, "output pump ended");
}
