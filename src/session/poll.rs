use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::container::{ContainerID, ContainerMeta};
use crate::emitter::Emitter;
use crate::registry::Registry;
use crate::source::StatsSource;
use crate::stats::{MetricRecord, RawStats, WindowAccumulator};

/// Registration of a container in pull mode.
///
/// No stream is held open; the poller uses `stats` to request one snapshot per tick and
/// reduces it against the previous tick's counters.
#[derive(Debug)]
pub struct PullEntry<S> {
    meta: ContainerMeta,
    stats: Arc<S>,
    accumulator: WindowAccumulator,
    serial: u64,
}

impl<S> PullEntry<S> {
    pub(crate) fn new(meta: ContainerMeta, stats: Arc<S>, serial: u64) -> Self {
        Self {
            meta,
            stats,
            accumulator: WindowAccumulator::new(1),
            serial,
        }
    }

    pub fn meta(&self) -> &ContainerMeta {
        &self.meta
    }

    pub(crate) fn target(&self) -> PullTarget<S> {
        PullTarget {
            id: self.meta.id.clone(),
            serial: self.serial,
            stats: Arc::clone(&self.stats),
        }
    }

    /// Reduces a pulled sample, unless it was requested for an earlier registration of
    /// the same container.
    pub(crate) fn reduce(&mut self, serial: u64, stats: RawStats) -> Option<MetricRecord> {
        if serial != self.serial {
            return None;
        }
        self.accumulator.push(&self.meta, stats)
    }
}

/// What the poller needs to pull one container without holding a registry guard.
#[derive(Debug)]
pub(crate) struct PullTarget<S> {
    pub(crate) id: ContainerID,
    pub(crate) serial: u64,
    pub(crate) stats: Arc<S>,
}

/// Polls every registered container once per `interval` until the emitter is closed.
///
/// A tick that outlasts the interval delays the next one; missed ticks are skipped.
pub(crate) async fn run_poller<S: StatsSource>(
    registry: Arc<Registry<S>>,
    interval: Duration,
    container_delay: Duration,
    emitter: Emitter,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if emitter.is_closed() {
            return;
        }
        let emitted = poll_once(&registry, container_delay, &emitter).await;
        log::trace!(target: "poller", "polling tick emitted {emitted} records");
    }
}

/// Runs a single polling tick: one snapshot request per registered container, strictly
/// one after another, with `container_delay` between two containers.
///
/// Returns the number of emitted records.
pub(crate) async fn poll_once<S: StatsSource>(
    registry: &Registry<S>,
    container_delay: Duration,
    emitter: &Emitter,
) -> usize {
    let mut emitted = 0;
    for (i, target) in registry.pull_targets().into_iter().enumerate() {
        if i > 0 && !container_delay.is_zero() {
            tokio::time::sleep(container_delay).await;
        }
        if emitter.is_closed() {
            break;
        }

        let payload = match target.stats.snapshot().await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                log::debug!(
                    target: "poller",
                    "skipping container without stats: container_id={}",
                    target.id
                );
                continue;
            }
            Err(err) => {
                log::warn!(
                    target: "poller",
                    "failed pulling container stats: container_id={}, error={}",
                    target.id,
                    err
                );
                continue;
            }
        };

        let stats = match RawStats::from_slice(&payload) {
            Ok(stats) => stats,
            Err(err) => {
                log::debug!(
                    target: "poller",
                    "dropping malformed sample: container_id={}, error={}",
                    target.id,
                    err
                );
                continue;
            }
        };

        if let Some(record) = registry.reduce_pulled(&target.id, target.serial, stats) {
            if emitter.emit(record) {
                emitted += 1;
            }
        }
    }

    emitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::source;
    use crate::testutil::{self, FakeStats, PullProbe};
    use tokio::time::Instant;

    fn pull_registry(root: &Emitter) -> Registry<FakeStats> {
        Registry::new(&Config::default().with_stream_mode(false), root.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_is_sequential_with_delay() {
        let (root, mut output) = Emitter::channel();
        let registry = pull_registry(&root);
        let probe = Arc::new(PullProbe::default());
        for id in ["1111111111111111", "2222222222222222", "3333333333333333"] {
            let stats = FakeStats::polling(Arc::clone(&probe), Duration::from_millis(10));
            assert!(registry.on_start(testutil::meta(id), stats));
        }

        let before = Instant::now();
        let emitted = poll_once(&registry, Duration::from_millis(50), &root).await;
        let took = before.elapsed();

        assert_eq!(emitted, 3);
        assert!(took >= Duration::from_millis(100), "tick took {took:?}");
        assert_eq!(probe.calls(), 3);
        assert_eq!(probe.max_in_flight(), 1);

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(testutil::next_record(&mut output).await.id().to_owned());
        }
        ids.sort();
        assert_eq!(ids, ["111111111111", "222222222222", "333333333333"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_pull_is_skipped() {
        let (root, mut output) = Emitter::channel();
        let registry = pull_registry(&root);
        let probe = Arc::new(PullProbe::default());

        let failing = FakeStats::polling(Arc::clone(&probe), Duration::ZERO);
        failing.push_snapshot(Err(source::Error::Io(std::io::Error::other("boom"))));
        failing.push_snapshot(Ok(None));
        registry.on_start(testutil::meta("aaaaaaaaaaaaaaaa"), failing);
        registry.on_start(
            testutil::meta("bbbbbbbbbbbbbbbb"),
            FakeStats::polling(Arc::clone(&probe), Duration::ZERO),
        );

        assert_eq!(poll_once(&registry, Duration::ZERO, &root).await, 1);
        assert_eq!(testutil::next_record(&mut output).await.id(), "bbbbbbbbbbbb");
        assert_eq!(registry.len(), 2);

        assert_eq!(poll_once(&registry, Duration::ZERO, &root).await, 1);
        assert_eq!(testutil::next_record(&mut output).await.id(), "bbbbbbbbbbbb");

        assert_eq!(poll_once(&registry, Duration::ZERO, &root).await, 2);
        assert_eq!(probe.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_percent_against_previous_tick() {
        let (root, mut output) = Emitter::channel();
        let registry = pull_registry(&root);
        let stats = FakeStats::polling(Arc::new(PullProbe::default()), Duration::ZERO);
        stats.push_snapshot(Ok(Some(testutil::sample_line(1000, 10000, 4).into())));
        stats.push_snapshot(Ok(Some(testutil::sample_line(1500, 12000, 4).into())));
        registry.on_start(testutil::meta("cccccccccccccccc"), stats);

        poll_once(&registry, Duration::ZERO, &root).await;
        poll_once(&registry, Duration::ZERO, &root).await;

        let first = testutil::next_record(&mut output).await;
        assert_eq!(first.stats().cpu_percent(), Some(40.0));
        let second = testutil::next_record(&mut output).await;
        // (500 / 2000) * 4 * 100
        assert_eq!(second.stats().cpu_percent(), Some(100.0));
        assert_eq!(second.stats().cpu_total_usage().unwrap(), 1500.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_discarded_when_stopped_in_flight() {
        let (root, mut output) = Emitter::channel();
        let registry = Arc::new(pull_registry(&root));
        let probe = Arc::new(PullProbe::default());
        registry.on_start(
            testutil::meta("dddddddddddddddd"),
            FakeStats::polling(Arc::clone(&probe), Duration::from_millis(100)),
        );

        let tick = tokio::spawn({
            let registry = Arc::clone(&registry);
            let root = root.clone();
            async move { poll_once(&registry, Duration::ZERO, &root).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(probe.in_flight(), 1);
        registry.on_stop(&ContainerID::new("dddddddddddddddd").unwrap());

        assert_eq!(tick.await.unwrap(), 0);
        assert!(output.try_next().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_ticks_on_interval() {
        let (root, mut output) = Emitter::channel();
        let registry = Arc::new(pull_registry(&root));
        let probe = Arc::new(PullProbe::default());
        registry.on_start(
            testutil::meta("eeeeeeeeeeeeeeee"),
            FakeStats::polling(Arc::clone(&probe), Duration::ZERO),
        );

        let poller = root.fork().unwrap();
        let task = tokio::spawn(run_poller(
            Arc::clone(&registry),
            Duration::from_secs(1),
            Duration::ZERO,
            poller.clone(),
        ));

        // the first tick fires immediately, then once per second
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(probe.calls(), 3);
        for _ in 0..3 {
            testutil::next_record(&mut output).await;
        }

        poller.close();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(task.is_finished());
        assert_eq!(probe.calls(), 3);
    }
}
