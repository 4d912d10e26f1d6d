use std::time::Duration;

/// Default delay before a finished stats stream is reopened.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Window size in samples (push mode) and polling period in seconds (pull mode).
    pub stats_interval: u32,
    /// Delay between two containers within one polling tick.
    pub container_delay: Duration,
    /// `true` attaches a continuous stream per container, `false` polls all containers.
    pub stream_mode: bool,
    /// Identity of the collector itself. Containers whose id begins with it are ignored.
    pub self_identity: Option<String>,
    /// Delay before a finished stats stream is reopened.
    pub reconnect_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stats_interval: 1,
            container_delay: Duration::ZERO,
            stream_mode: true,
            self_identity: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl Config {
    pub fn with_stats_interval(mut self, stats_interval: u32) -> Self {
        self.stats_interval = stats_interval;
        self
    }

    pub fn with_container_delay(mut self, container_delay: Duration) -> Self {
        self.container_delay = container_delay;
        self
    }

    pub fn with_stream_mode(mut self, stream_mode: bool) -> Self {
        self.stream_mode = stream_mode;
        self
    }

    pub fn with_self_identity(mut self, identity: impl Into<String>) -> Self {
        self.self_identity = Some(identity.into());
        self
    }

    pub fn with_reconnect_delay(mut self, reconnect_delay: Duration) -> Self {
        self.reconnect_delay = reconnect_delay;
        self
    }

    /// Window size used by streaming sessions. `0` is treated as `1`.
    pub fn window(&self) -> u32 {
        self.stats_interval.max(1)
    }

    /// Period of the polling timer.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.window()))
    }
}
