use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use log::{debug, info, warn};

use crate::general::queue::QueueConsumer;
use crate::midi::{MidiDecoder, RawMidiEvent};
use crate::remote::osc_sender::Dispatcher;
use crate::template::TemplateEngine;

#[derive(Debug, Default)]
pub struct PipelineStats {
    events: AtomicU64,
    decode_errors: AtomicU64,
    osc_messages: AtomicU64,
}

impl PipelineStats {
    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    /// OSC messages handed to the dispatcher.
    pub fn osc_messages(&self) -> u64 {
        self.osc_messages.load(Ordering::Relaxed)
    }
}

/// Decoder, templates and dispatcher as driven by the decoding worker.
pub struct EventProcessor {
    decoder: MidiDecoder,
    engine: TemplateEngine,
    dispatcher: Dispatcher,
    stats: Arc<PipelineStats>,
}

impl EventProcessor {
    pub fn new(decoder: MidiDecoder, engine: TemplateEngine, dispatcher: Dispatcher) -> Self {
        Self {
            decoder,
            engine,
            dispatcher,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run one raw event through the whole pipeline. Returns the number of
    /// OSC messages dispatched for it.
    ///
    /// NRPN timeouts are measured on the events' arrival clock, so a worker
    /// that falls behind the queue does not expire sequences that arrived
    /// in time.
    pub fn process(&mut self, event: &RawMidiEvent) -> usize {
        self.stats.events.fetch_add(1, Ordering::Relaxed);
        let expired = self.decoder.expire(event.arrival());
        if expired > 0 {
            debug!(target: "midi", "dropped {} stale NRPN sequence(s)", expired);
        }

        let decoded = match self.decoder.decode(event) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => return 0,
            Err(e) => {
                self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!(target: "midi", "{} ({:02X?})", e, event.bytes());
                return 0;
            }
        };

        let mut sent = 0;
        for msg in self.engine.resolve(&decoded) {
            match self.dispatcher.dispatch(&msg) {
                Ok(()) => sent += 1,
                Err(e) => warn!(target: "osc", "{}", e),
            }
        }
        self.stats.osc_messages.fetch_add(sent as u64, Ordering::Relaxed);
        sent
    }

    pub fn into_dispatcher(self) -> Dispatcher {
        self.dispatcher
    }
}

/// Spawn the decoding worker. It runs until the queue's producer is gone and
/// every queued event has been processed, then hands the processor back.
pub fn spawn_forwarder(
    queue: QueueConsumer,
    mut processor: EventProcessor,
) -> std::io::Result<thread::JoinHandle<EventProcessor>> {
    thread::Builder::new().name("midi-decode".into()).spawn(move || {
        while let Some(event) = queue.pop() {
            processor.process(&event);
        }
        let stats = processor.stats();
        info!(
            target: "bridge",
            "decoder stopped after {} events ({} decode errors, {} OSC messages)",
            stats.events(),
            stats.decode_errors(),
            stats.osc_messages()
        );
        processor
    })
}
