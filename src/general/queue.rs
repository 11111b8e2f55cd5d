//! Bounded hand-off between the MIDI callback and the decoding worker.
//!
//! The producer never blocks: when the queue is full the oldest queued event
//! is evicted to make room, since a stale fader position is worth less than
//! the latest one. Dropping the producer shuts the queue down; the consumer
//! drains what is left and then sees `None`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use log::warn;

use crate::midi::RawMidiEvent;

/// Reference default from the mixer's input buffer sizing.
pub const DEFAULT_CAPACITY: usize = 10240;

#[derive(Debug, Default)]
pub struct QueueStats {
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl QueueStats {
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Events evicted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create a queue holding at most `capacity` events.
///
/// # Panics
///
/// If `capacity` is zero; configuration loading rejects that value.
pub fn ingest_queue(capacity: usize) -> (QueueProducer, QueueConsumer) {
    assert!(capacity > 0, "ingest queue capacity must be non-zero");
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    let stats = Arc::new(QueueStats::default());
    let producer = QueueProducer {
        tx,
        evict: rx.clone(),
        stats: stats.clone(),
    };
    let consumer = QueueConsumer { rx, stats };
    (producer, consumer)
}

/// Transport side. Not `Clone`: a single producer keeps eviction exact.
pub struct QueueProducer {
    tx: Sender<RawMidiEvent>,
    evict: Receiver<RawMidiEvent>,
    stats: Arc<QueueStats>,
}

impl QueueProducer {
    /// Enqueue without blocking, evicting the oldest event if full. The new
    /// event itself is never the one dropped while the consumer is alive.
    ///
    /// Every failed send is followed by an eviction or by the consumer having
    /// taken an event, and only this producer fills slots, so the loop ends.
    pub fn push(&self, event: RawMidiEvent) {
        let mut event = event;
        loop {
            match self.tx.try_send(event) {
                Ok(()) => {
                    self.stats.pushed.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(TrySendError::Full(back)) => {
                    event = back;
                    match self.evict.try_recv() {
                        Ok(_oldest) => {
                            let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                            if dropped.is_power_of_two() {
                                warn!(target: "midi", "ingest queue full, {} events dropped so far", dropped);
                            }
                        }
                        // The consumer emptied a slot in the meantime.
                        Err(TryRecvError::Empty) => {}
                        Err(TryRecvError::Disconnected) => return,
                    }
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        self.stats.clone()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }

    /// Signal shutdown. Same as dropping the producer.
    pub fn close(self) {}
}

/// Decoding-worker side.
pub struct QueueConsumer {
    rx: Receiver<RawMidiEvent>,
    stats: Arc<QueueStats>,
}

impl QueueConsumer {
    /// Block until an event is available. `None` once the producer is gone
    /// and the queue has been drained.
    pub fn pop(&self) -> Option<RawMidiEvent> {
        self.rx.recv().ok()
    }

    pub fn try_pop(&self) -> Option<RawMidiEvent> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        self.stats.clone()
    }
}
