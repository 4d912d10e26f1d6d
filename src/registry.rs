use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::config::Config;
use crate::container::{ContainerID, ContainerMeta};
use crate::emitter::Emitter;
use crate::session::{PullEntry, PullTarget, StreamSession};
use crate::source::StatsSource;
use crate::stats::{MetricRecord, RawStats};

/// The active session of a registered container.
#[derive(Debug)]
pub enum Session<S> {
    Streaming(StreamSession),
    Polling(PullEntry<S>),
}

/// Maps container ids to their active session.
///
/// Holds at most one session per id. Removing a session destroys it.
#[derive(Debug)]
pub struct Registry<S> {
    sessions: DashMap<ContainerID, Session<S>>,
    stream_mode: bool,
    window: u32,
    reconnect_delay: Duration,
    self_identity: Option<String>,
    emitter: Emitter,
    next_serial: AtomicU64,
    // serializes attaching against shutdown; `true` once shut down
    closed: Mutex<bool>,
}

impl<S> Registry<S> {
    /// Creates an empty registry. Sessions emit through forks of `emitter`.
    pub fn new(config: &Config, emitter: Emitter) -> Self {
        Self {
            sessions: DashMap::default(),
            stream_mode: config.stream_mode,
            window: config.window(),
            reconnect_delay: config.reconnect_delay,
            self_identity: config.self_identity.clone(),
            emitter,
            next_serial: AtomicU64::new(0),
            closed: Mutex::new(false),
        }
    }
}

impl<S: StatsSource> Registry<S> {
    /// Attaches a session for a started container.
    ///
    /// Returns `false` if the container is the collector itself, is already registered,
    /// or the registry was shut down.
    pub fn on_start(&self, meta: ContainerMeta, stats: S) -> bool {
        if let Some(identity) = self.self_identity.as_deref()
            && meta.id.is_self(identity)
        {
            log::debug!(
                target: "registry",
                "ignoring own container: container_id={}",
                meta.id
            );
            return false;
        }

        let closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return false;
        }

        let entry = match self.sessions.entry(meta.id.clone()) {
            Entry::Occupied(_) => {
                log::debug!(
                    target: "registry",
                    "container already attached: container_id={}",
                    meta.id
                );
                return false;
            }
            Entry::Vacant(entry) => entry,
        };

        let session = if self.stream_mode {
            let Some(emitter) = self.emitter.fork() else {
                return false;
            };
            log::info!(
                "attaching stats stream: container_id={}, name={}, image={}",
                meta.id,
                meta.name,
                meta.image
            );
            Session::Streaming(StreamSession::spawn(
                meta,
                Arc::new(stats),
                self.window,
                self.reconnect_delay,
                emitter,
            ))
        } else {
            log::info!(
                "registering container for polling: container_id={}, name={}, image={}",
                meta.id,
                meta.name,
                meta.image
            );
            let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
            Session::Polling(PullEntry::new(meta, Arc::new(stats), serial))
        };
        entry.insert(session);

        true
    }
}

impl<S> Registry<S> {
    /// Detaches and destroys the session of a stopped container. Unknown ids are ignored.
    pub fn on_stop(&self, id: &ContainerID) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                if let Session::Streaming(stream) = &session {
                    stream.destroy();
                }
                log::info!("detached container: container_id={}", id);
                true
            }
            None => {
                log::debug!(
                    target: "registry",
                    "stop for unknown container: container_id={}",
                    id
                );
                false
            }
        }
    }

    /// Destroys every session. Later starts are ignored.
    pub fn shutdown_all(&self) {
        {
            let mut closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
            *closed = true;
        }
        self.sessions.retain(|id, session| {
            if let Session::Streaming(stream) = session {
                stream.destroy();
            }
            log::debug!(target: "registry", "destroyed session: container_id={}", id);
            false
        });
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of the containers registered for polling.
    pub(crate) fn pull_targets(&self) -> Vec<PullTarget<S>> {
        self.sessions
            .iter()
            .filter_map(|session| match session.value() {
                Session::Polling(entry) => Some(entry.target()),
                Session::Streaming(_) => None,
            })
            .collect()
    }

    /// Reduces a pulled sample for `id`, if that registration is still active.
    pub(crate) fn reduce_pulled(
        &self,
        id: &ContainerID,
        serial: u64,
        stats: RawStats,
    ) -> Option<MetricRecord> {
        match self.sessions.get_mut(id)?.value_mut() {
            Session::Polling(entry) => entry.reduce(serial, stats),
            Session::Streaming(_) => None,
        }
    }
}
