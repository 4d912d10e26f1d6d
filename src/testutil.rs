//! In-memory collaborators for tests.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;

use crate::container::{ContainerID, ContainerMeta};
use crate::emitter::MetricStream;
use crate::source::{self, Chunk, LifecycleEvent, LifecycleSource, SampleStream, StatsSource};
use crate::stats::{MetricRecord, RawStats, WindowAccumulator};

pub(crate) fn meta(id: &str) -> ContainerMeta {
    ContainerMeta::new(ContainerID::new(id).unwrap(), "busybox:latest", format!("{id}-name"))
}

/// One newline-terminated stats object.
pub(crate) fn sample_line(cpu: u64, sys: u64, cpus: usize) -> String {
    let json = serde_json::json!({
        "read": "2024-05-01T10:00:00Z",
        "cpu_stats": {
            "cpu_usage": {"total_usage": cpu, "percpu_usage": vec![0u64; cpus]},
            "system_cpu_usage": sys,
        },
        "memory_stats": {"usage": 1024},
    });
    format!("{json}\n")
}

pub(crate) fn sample(cpu: u64, sys: u64, cpus: usize) -> RawStats {
    RawStats::from_slice(sample_line(cpu, sys, cpus).as_bytes()).unwrap()
}

pub(crate) fn record(id: &str) -> MetricRecord {
    WindowAccumulator::new(1)
        .push(&meta(id), sample(10, 100, 1))
        .unwrap()
}

/// Lets spawned tasks run until they are idle.
pub(crate) async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub(crate) async fn next_record(output: &mut MetricStream) -> MetricRecord {
    tokio::time::timeout(Duration::from_secs(60), output.next())
        .await
        .expect("timed out waiting for a record")
        .expect("output closed")
        .expect("engine failed")
}

/// Observes concurrent snapshot requests across several containers.
#[derive(Debug, Default)]
pub(crate) struct PullProbe {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl PullProbe {
    fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

type Feed = Arc<tokio::sync::Mutex<UnboundedReceiver<Option<Chunk>>>>;

/// A stats source fed by the test.
///
/// Streams read from one shared feed, so a reopened stream continues where the previous
/// one ended. Snapshots return queued responses, then generated samples whose counters
/// grow by `100`/`1000` per pull.
#[derive(Debug)]
pub(crate) struct FakeStats {
    feed: Feed,
    opens: Arc<AtomicUsize>,
    failing_opens: AtomicUsize,
    snapshots: Mutex<VecDeque<source::Result<Option<Chunk>>>>,
    pulls: AtomicUsize,
    probe: Arc<PullProbe>,
    latency: Duration,
}

impl FakeStats {
    fn new(probe: Arc<PullProbe>, latency: Duration) -> (Self, StreamFeed) {
        let (tx, rx) = unbounded_channel();
        let opens = Arc::new(AtomicUsize::new(0));
        (
            Self {
                feed: Arc::new(tokio::sync::Mutex::new(rx)),
                opens: Arc::clone(&opens),
                failing_opens: AtomicUsize::new(0),
                snapshots: Mutex::default(),
                pulls: AtomicUsize::new(0),
                probe,
                latency,
            },
            StreamFeed { tx, opens },
        )
    }

    pub(crate) fn streaming() -> (Self, StreamFeed) {
        Self::new(Arc::default(), Duration::ZERO)
    }

    pub(crate) fn polling(probe: Arc<PullProbe>, latency: Duration) -> Self {
        Self::new(probe, latency).0
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_next_opens(&self, n: usize) {
        self.failing_opens.store(n, Ordering::SeqCst);
    }

    pub(crate) fn push_snapshot(&self, response: source::Result<Option<Chunk>>) {
        self.snapshots.lock().unwrap().push_back(response);
    }
}

impl StatsSource for FakeStats {
    type Stream = FakeStream;

    async fn open_stream(&self) -> source::Result<FakeStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_opens.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_opens.store(failing - 1, Ordering::SeqCst);
            return Err(source::Error::Io(std::io::Error::other("connection refused")));
        }
        Ok(FakeStream {
            feed: Arc::clone(&self.feed),
        })
    }

    async fn snapshot(&self) -> source::Result<Option<Chunk>> {
        let n = self.pulls.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        self.probe.enter();
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.probe.exit();

        let queued = self.snapshots.lock().unwrap().pop_front();
        match queued {
            Some(response) => response,
            None => Ok(Some(Chunk::from(sample_line(100 * n, 1000 * n, 2)))),
        }
    }
}

#[derive(Debug)]
pub(crate) struct FakeStream {
    feed: Feed,
}

impl SampleStream for FakeStream {
    async fn next_chunk(&mut self) -> source::Result<Option<Chunk>> {
        let mut rx = self.feed.lock().await;
        Ok(rx.recv().await.flatten())
    }
}

/// Test side of a [`FakeStats`] stream.
#[derive(Debug)]
pub(crate) struct StreamFeed {
    tx: UnboundedSender<Option<Chunk>>,
    opens: Arc<AtomicUsize>,
}

impl StreamFeed {
    /// Sends one sample reported on two CPUs.
    pub(crate) fn send_line(&self, cpu: u64, sys: u64) {
        self.send_raw(sample_line(cpu, sys, 2));
    }

    pub(crate) fn send_raw(&self, bytes: impl AsRef<[u8]>) {
        let _ = self.tx.send(Some(Chunk::copy_from_slice(bytes.as_ref())));
    }

    /// Ends the currently open stream.
    pub(crate) fn end_stream(&self) {
        let _ = self.tx.send(None);
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

/// A lifecycle source driven by a [`LifecycleFeed`].
#[derive(Debug)]
pub(crate) struct FakeLifecycle {
    rx: UnboundedReceiver<source::Result<LifecycleEvent<FakeStats>>>,
    destroyed: Arc<AtomicBool>,
}

impl FakeLifecycle {
    pub(crate) fn new() -> (Self, LifecycleFeed) {
        let (tx, rx) = unbounded_channel();
        (
            Self {
                rx,
                destroyed: Arc::default(),
            },
            LifecycleFeed { tx },
        )
    }

    pub(crate) fn destroyed(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.destroyed)
    }
}

impl LifecycleSource for FakeLifecycle {
    type Stats = FakeStats;

    async fn next_event(&mut self) -> Option<source::Result<LifecycleEvent<FakeStats>>> {
        self.rx.recv().await
    }

    fn destroy(&mut self) {
        self.rx.close();
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub(crate) struct LifecycleFeed {
    tx: UnboundedSender<source::Result<LifecycleEvent<FakeStats>>>,
}

impl LifecycleFeed {
    pub(crate) fn start(&self, meta: ContainerMeta, stats: FakeStats) {
        let _ = self.tx.send(Ok(LifecycleEvent::Start { meta, stats }));
    }

    pub(crate) fn stop(&self, id: &str) {
        let id = ContainerID::new(id).unwrap();
        let _ = self.tx.send(Ok(LifecycleEvent::Stop { id }));
    }

    pub(crate) fn fail(&self, reason: &str) {
        let _ = self.tx.send(Err(source::Error::Other(reason.into())));
    }
}

/// A Docker daemon stand-in answering canned responses on a unix socket.
///
/// Each request gets its own connection; the route's body is sent in full and the
/// connection is closed, which ends streaming responses. Unknown paths answer `404`.
#[derive(Debug)]
pub(crate) struct FakeDaemon {
    dir: tempfile::TempDir,
    task: JoinHandle<()>,
}

impl FakeDaemon {
    pub(crate) fn serve(routes: &[(&str, u16, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let listener = tokio::net::UnixListener::bind(dir.path().join("docker.sock")).unwrap();
        let routes: Arc<Vec<(String, u16, String)>> = Arc::new(
            routes
                .iter()
                .map(|(path, status, body)| ((*path).to_owned(), *status, (*body).to_owned()))
                .collect(),
        );

        let task = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let routes = Arc::clone(&routes);
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&head);
                    let path = head.split_whitespace().nth(1).unwrap_or_default();
                    let (status, body) = routes
                        .iter()
                        .find(|(route, ..)| route == path)
                        .map(|(_, status, body)| (*status, body.as_str()))
                        .unwrap_or((404, r#"{"message":"page not found"}"#));

                    let response = format!(
                        "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self { dir, task }
    }

    pub(crate) fn socket_path(&self) -> PathBuf {
        self.dir.path().join("docker.sock")
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.task.abort();
    }
}
