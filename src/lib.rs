//! Dockstat: a container metrics collector that follows container lifecycle events and
//! turns each container's raw resource samples into uniform metric records.
//!
//! Records are produced either by following a live stats stream per container (push
//! mode) or by sampling every attached container on a fixed timer (pull mode). The CPU
//! utilisation of each record is derived from consecutive cumulative counters.

use std::path::PathBuf;

pub mod config;
pub mod container;
pub mod docker;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod registry;
pub mod session;
pub mod sink;
pub mod source;
pub mod stats;

mod lines;

#[cfg(test)]
mod testutil;

pub use config::Config;
pub use emitter::MetricStream;
pub use engine::Engine;
pub use stats::MetricRecord;

/// Runs the collector against the Docker daemon listening on `socket_path`.
///
/// Writes every record as one JSON line to stdout until Ctrl-C is received.
///
/// # Errors
///
/// Returns the fatal error that ended the collection, e.g. a lost connection to the
/// daemon, or a failure to write to stdout.
pub async fn run(
    config: Config,
    socket_path: PathBuf,
    filter: docker::ContainerFilter,
) -> Result<(), Box<dyn std::error::Error>> {
    log::info!(
        "collecting from `{}`: stream_mode={}, stats_interval={}, container_delay={}ms",
        socket_path.display(),
        config.stream_mode,
        config.stats_interval,
        config.container_delay.as_millis()
    );
    let client = docker::DockerClient::new(socket_path);
    let events = docker::DockerEvents::new(client, filter);
    let (engine, mut output) = Engine::start(config, events);

    let mut sink = sink::JsonLinesSink::new(std::io::stdout());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result: Result<(), Box<dyn std::error::Error>> = loop {
        let item = tokio::select! {
            signal = &mut ctrl_c => {
                if let Err(err) = signal {
                    log::error!("failed to listen for Ctrl-C: {}", err);
                }
                log::info!("received shutdown signal");
                break Ok(());
            }
            item = output.next() => item,
        };

        match item {
            Some(Ok(record)) => {
                if let Err(err) = sink.write(&record) {
                    break Err(err.into());
                }
            }
            Some(Err(err)) => break Err(err.into()),
            None => break Ok(()),
        }
    };

    engine.stop();
    engine.join().await;
    result
}
