//! The aggregation engine: wires a lifecycle source to the registry and merges every
//! session's records into one [`MetricStream`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::emitter::{Emitter, MetricStream};
use crate::registry::Registry;
use crate::session;
use crate::source::{self, LifecycleEvent, LifecycleSource, StatsSource};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("lifecycle source failed: {0}")]
    Lifecycle(#[source] source::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A running collector.
///
/// Dropping the engine stops it.
#[derive(Debug)]
pub struct Engine<S> {
    inner: Arc<Inner<S>>,
    lifecycle: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct Inner<S> {
    registry: Arc<Registry<S>>,
    emitter: Emitter,
    poller: Mutex<Option<(JoinHandle<()>, Emitter)>>,
    shutdown: watch::Sender<bool>,
    stopped: AtomicBool,
}

impl<S: StatsSource> Engine<S> {
    /// Starts collecting: listens to `source` and, in pull mode, starts the polling timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<L>(config: Config, source: L) -> (Self, MetricStream)
    where
        L: LifecycleSource<Stats = S>,
    {
        let (emitter, output) = Emitter::channel();
        let registry = Arc::new(Registry::new(&config, emitter.clone()));

        let poller = match emitter.fork() {
            Some(poll_emitter) if !config.stream_mode => {
                let task = tokio::spawn(session::run_poller(
                    Arc::clone(&registry),
                    config.poll_interval(),
                    config.container_delay,
                    poll_emitter.clone(),
                ));
                Some((task, poll_emitter))
            }
            _ => None,
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let inner = Arc::new(Inner {
            registry,
            emitter,
            poller: Mutex::new(poller),
            shutdown,
            stopped: AtomicBool::new(false),
        });

        log::info!(
            "starting collector: stream_mode={}, stats_interval={}, container_delay={:?}",
            config.stream_mode,
            config.window(),
            config.container_delay
        );
        let lifecycle = tokio::spawn(drive_lifecycle(source, Arc::clone(&inner), shutdown_rx));

        (
            Self {
                inner,
                lifecycle: Some(lifecycle),
            },
            output,
        )
    }

    /// Stops listening for lifecycle events, destroys every session and closes the output
    /// once queued records are consumed. Idempotent.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// The registry of attached containers.
    pub fn registry(&self) -> &Registry<S> {
        &self.inner.registry
    }

    /// Waits until the lifecycle source has been released.
    pub async fn join(mut self) {
        if let Some(task) = self.lifecycle.take() {
            if let Err(err) = task.await {
                log::error!("lifecycle task failed: {}", err);
            }
        }
    }
}

impl<S> Drop for Engine<S> {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

impl<S> Inner<S> {
    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("stopping collector");

        self.shutdown.send_replace(true);
        if let Some((task, emitter)) = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            emitter.close();
            task.abort();
        }
        self.registry.shutdown_all();
        self.emitter.close();
    }
}

async fn drive_lifecycle<L, S>(
    mut source: L,
    inner: Arc<Inner<S>>,
    mut shutdown: watch::Receiver<bool>,
) where
    L: LifecycleSource<Stats = S>,
    S: StatsSource,
{
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stopped| *stopped) => break,
            event = source.next_event() => event,
        };

        match event {
            Some(Ok(LifecycleEvent::Start { meta, stats })) => {
                inner.registry.on_start(meta, stats);
            }
            Some(Ok(LifecycleEvent::Stop { id })) => {
                inner.registry.on_stop(&id);
            }
            Some(Err(err)) => {
                log::error!("lifecycle source failed: {}", err);
                inner.emitter.fail(Error::Lifecycle(err));
                inner.stop();
                break;
            }
            None => {
                log::warn!("lifecycle source ended");
                inner.stop();
                break;
            }
        }
    }

    source.destroy();
    log::debug!("released lifecycle source");
}
