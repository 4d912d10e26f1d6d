use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use dockstat::Config;
use dockstat::docker::{ContainerFilter, DEFAULT_SOCKET};

/// Collects resource usage of running Docker containers and prints one JSON record per
/// sample to stdout.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Number of raw samples averaged into one record (push mode), or seconds between
    /// polls (pull mode).
    #[arg(long, env = "STATS_INTERVAL", default_value_t = 1)]
    stats_interval: u32,

    /// Pause in milliseconds between two containers within one poll (pull mode).
    #[arg(long, env = "CONTAINER_DELAY", default_value_t = 0)]
    container_delay: u64,

    /// Follow a live stats stream per container instead of polling.
    #[arg(long, env = "STREAM_MODE", default_value_t = true, action = ArgAction::Set)]
    stream_mode: bool,

    /// Only attach containers whose name matches this regex.
    #[arg(long, env = "MATCH_BY_NAME")]
    match_by_name: Option<String>,

    /// Only attach containers whose image matches this regex.
    #[arg(long, env = "MATCH_BY_IMAGE")]
    match_by_image: Option<String>,

    /// Never attach containers whose name matches this regex.
    #[arg(long, env = "SKIP_BY_NAME")]
    skip_by_name: Option<String>,

    /// Never attach containers whose image matches this regex.
    #[arg(long, env = "SKIP_BY_IMAGE")]
    skip_by_image: Option<String>,

    /// Path of the Docker daemon socket.
    #[arg(long, env = "DOCKER_SOCKET", default_value = DEFAULT_SOCKET)]
    docker_socket: PathBuf,

    /// Identity of the collector's own container; it is never attached.
    #[arg(long, env = "HOSTNAME")]
    hostname: Option<String>,
}

/// Entry point for the dockstat collector.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=info STREAM_MODE=false STATS_INTERVAL=10 dockstat
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let filter = ContainerFilter::default()
        .match_by_name(args.match_by_name.as_deref())?
        .match_by_image(args.match_by_image.as_deref())?
        .skip_by_name(args.skip_by_name.as_deref())?
        .skip_by_image(args.skip_by_image.as_deref())?;

    let mut config = Config::default()
        .with_stats_interval(args.stats_interval)
        .with_container_delay(Duration::from_millis(args.container_delay))
        .with_stream_mode(args.stream_mode);
    if let Some(hostname) = args.hostname {
        config = config.with_self_identity(hostname);
    }

    if let Err(err) = dockstat::run(config, args.docker_socket, filter).await {
        log::error!("collector failed: {}", err);
        return Err(err);
    }
    Ok(())
}
