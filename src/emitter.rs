use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::engine::Error;
use crate::stats::MetricRecord;

/// An item of the merged output: a record, or the fatal error that ended the engine.
pub type Item = Result<MetricRecord, Error>;

type Slot = Arc<Mutex<Option<UnboundedSender<Item>>>>;

/// A producer's handle on the merged output.
///
/// Every producer writes through its own slot. Closing a slot drops its sender under the
/// slot's lock, so once [`Emitter::close`] returns nothing can be emitted through it
/// anymore. Clones share the slot; [`Emitter::fork`] creates an independent one. The
/// output ends when every slot is closed.
#[derive(Debug, Clone)]
pub struct Emitter {
    slot: Slot,
}

impl Emitter {
    /// Creates the merged output and the root emitter feeding it.
    pub fn channel() -> (Self, MetricStream) {
        let (tx, rx) = unbounded_channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            MetricStream { rx },
        )
    }

    fn lock(&self) -> MutexGuard<'_, Option<UnboundedSender<Item>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates an emitter with its own slot on the same output, or `None` if this one is
    /// already closed.
    pub fn fork(&self) -> Option<Self> {
        let tx = self.lock().as_ref()?.clone();
        Some(Self {
            slot: Arc::new(Mutex::new(Some(tx))),
        })
    }

    /// Queues a record. Returns `false` if the emitter is closed or the consumer is gone.
    pub fn emit(&self, record: MetricRecord) -> bool {
        self.send(Ok(record))
    }

    /// Queues a fatal error.
    pub fn fail(&self, err: Error) -> bool {
        self.send(Err(err))
    }

    fn send(&self, item: Item) -> bool {
        match self.lock().as_ref() {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }

    /// Closes the slot. Idempotent.
    pub fn close(&self) {
        self.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().as_ref().is_none_or(UnboundedSender::is_closed)
    }
}

/// The merged output of all sessions, in emission order per container.
#[derive(Debug)]
pub struct MetricStream {
    rx: UnboundedReceiver<Item>,
}

impl MetricStream {
    /// Waits for the next item; `None` once the engine stopped and every queued item was
    /// received.
    pub async fn next(&mut self) -> Option<Item> {
        self.rx.recv().await
    }

    /// Returns an already queued item without waiting.
    pub fn try_next(&mut self) -> Option<Item> {
        self.rx.try_recv().ok()
    }
}
