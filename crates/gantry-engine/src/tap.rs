//! In-memory step output capture with offset-resumable fan-out
//!
//! When a step runs in captured mode its raw output is teed into an
//! [`OutputTap`]. Callers subscribe from a byte offset: they atomically
//! receive everything already captured past the offset, then every later
//! write as incremental chunks until the step completes.
//!
//! Back-pressure policy: subscriber channels are bounded and the tap awaits
//! each send, so one slow subscriber stalls writes for its own step only.

use crate::error::{EngineError, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

/// Capacity of each subscriber channel, in chunks.
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 64;

struct TapState {
    full: Vec<u8>,
    subscribers: Vec<(u64, mpsc::Sender<Vec<u8>>)>,
    next_subscriber_id: u64,
}

/// Resumable capture buffer for one step's output.
pub struct OutputTap {
    state: Mutex<TapState>,
    done_tx: watch::Sender<bool>,
}

impl OutputTap {
    pub fn new() -> Arc<Self> {
        let (done_tx, _) = watch::channel(false);
        Arc::new(OutputTap {
            state: Mutex::new(TapState {
                full: Vec::new(),
                subscribers: Vec::new(),
                next_subscriber_id: 0,
            }),
            done_tx,
        })
    }

    /// Append a chunk and fan it out to every current subscriber.
    ///
    /// Subscribers whose receiver is gone are pruned; a subscriber that is
    /// merely slow blocks this write until it drains.
    pub async fn write(&self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        let mut state = self.state.lock().await;
        state.full.extend_from_slice(chunk);

        let mut dead = Vec::new();
        for (id, tx) in &state.subscribers {
            if tx.send(chunk.to_vec()).await.is_err() {
                dead.push(*id);
            }
        }
        state.subscribers.retain(|(id, _)| !dead.contains(id));
    }

    /// Register a subscriber at `offset`.
    ///
    /// Returns the already-captured bytes past the offset, the subscriber id
    /// for [`unsubscribe`](Self::unsubscribe), and the chunk receiver. The
    /// prefix and registration happen under one lock, so the concatenation
    /// of prefix and received chunks equals `full[offset..]`.
    pub async fn subscribe(
        &self,
        offset: usize,
    ) -> Result<(Vec<u8>, u64, mpsc::Receiver<Vec<u8>>)> {
        let mut state = self.state.lock().await;
        if offset > state.full.len() {
            return Err(EngineError::OffsetOutOfBounds {
                offset,
                len: state.full.len(),
            });
        }
        let prefix = state.full[offset..].to_vec();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        state.subscribers.push((id, tx));
        Ok((prefix, id, rx))
    }

    /// Remove a subscriber. Chunks already enqueued on its channel remain
    /// readable; nothing further is delivered.
    pub async fn unsubscribe(&self, id: u64) {
        let mut state = self.state.lock().await;
        state.subscribers.retain(|(sub_id, _)| *sub_id != id);
    }

    /// Completion signal; flips to true once the owning step finishes.
    pub fn done(&self) -> watch::Receiver<bool> {
        self.done_tx.subscribe()
    }

    /// Mark the owning step complete and wake `done` watchers.
    pub fn mark_done(&self) {
        let _ = self.done_tx.send(true);
    }

    /// Total bytes captured so far.
    pub async fn len(&self) -> usize {
        self.state.lock().await.full.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
