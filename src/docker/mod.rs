//! Docker Engine API plumbing: container lifecycle events and per-container stats
//! read over the daemon's unix socket.

mod client;
mod error;
mod events;
mod filter;
mod stats;

pub use client::{BodyStream, DockerClient};
pub use error::{Error, Result};
pub use events::DockerEvents;
pub use filter::ContainerFilter;
pub use stats::DockerStats;

/// Default location of the Docker daemon socket.
pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";
