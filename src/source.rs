//! Interfaces of the collaborators the engine consumes.
//!
//! - A [`LifecycleSource`] announces containers as they start and stop.
//! - A [`StatsSource`] belongs to one container and yields its raw stats, either as a
//!   continuous newline-delimited JSON byte stream ([`SampleStream`]) or as a one-shot
//!   snapshot.
//!
//! [`crate::docker`] provides implementations backed by the Docker Engine API.

use std::future::Future;

use crate::container::{ContainerID, ContainerMeta};

/// A chunk of raw bytes read from a stats stream.
pub type Chunk = hyper::body::Bytes;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A container lifecycle notification.
#[derive(Debug)]
pub enum LifecycleEvent<S> {
    /// A container started. `stats` gives access to its usage samples.
    Start { meta: ContainerMeta, stats: S },
    /// A container stopped.
    Stop { id: ContainerID },
}

pub trait LifecycleSource: Send + 'static {
    type Stats: StatsSource;

    /// Waits for the next notification.
    ///
    /// `None` means the source is exhausted, `Some(Err(_))` that it failed. Both end the
    /// engine.
    fn next_event(
        &mut self,
    ) -> impl Future<Output = Option<Result<LifecycleEvent<Self::Stats>>>> + Send;

    /// Stops listening for notifications and releases the underlying subscription.
    fn destroy(&mut self);
}

pub trait StatsSource: Send + Sync + 'static {
    type Stream: SampleStream;

    /// Opens a continuous stream of newline-delimited stats objects.
    fn open_stream(&self) -> impl Future<Output = Result<Self::Stream>> + Send;

    /// Requests a single stats object. `Ok(None)` means the runtime returned nothing.
    fn snapshot(&self) -> impl Future<Output = Result<Option<Chunk>>> + Send;
}

pub trait SampleStream: Send + 'static {
    /// Returns the next chunk of bytes, or `Ok(None)` once the stream ended.
    fn next_chunk(&mut self) -> impl Future<Output = Result<Option<Chunk>>> + Send;
}
