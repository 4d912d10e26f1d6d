use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::container::ContainerMeta;
use crate::emitter::Emitter;
use crate::lines::LineBuffer;
use crate::source::{SampleStream, StatsSource};
use crate::stats::{RawStats, WindowAccumulator};

/// A live stats subscription for one container.
///
/// The subscription survives the end of the underlying byte stream: it is reopened after
/// the reconnect delay, keeping the window state. Only [`StreamSession::destroy`] (or
/// dropping the session) ends it.
#[derive(Debug)]
pub struct StreamSession {
    emitter: Emitter,
    task: JoinHandle<()>,
}

impl StreamSession {
    /// Spawns the session task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S: StatsSource>(
        meta: ContainerMeta,
        stats: Arc<S>,
        window: u32,
        reconnect_delay: Duration,
        emitter: Emitter,
    ) -> Self {
        let task = tokio::spawn(run(
            meta,
            stats,
            WindowAccumulator::new(window),
            reconnect_delay,
            emitter.clone(),
        ));

        Self { emitter, task }
    }

    /// Stops the subscription. No record is emitted once this returns. Idempotent.
    pub fn destroy(&self) {
        self.emitter.close();
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.destroy();
    }
}

async fn run<S: StatsSource>(
    meta: ContainerMeta,
    stats: Arc<S>,
    mut accumulator: WindowAccumulator,
    reconnect_delay: Duration,
    emitter: Emitter,
) {
    let mut lines = LineBuffer::default();
    loop {
        match stats.open_stream().await {
            Ok(mut stream) => {
                log::debug!(
                    target: "stream session",
                    "opened stats stream: container_id={}",
                    meta.id
                );
                loop {
                    match stream.next_chunk().await {
                        Ok(Some(chunk)) => {
                            lines.extend(&chunk);
                            while let Some(line) = lines.next_line() {
                                if !handle_line(&meta, &mut accumulator, &line, &emitter) {
                                    return;
                                }
                            }
                        }
                        Ok(None) => {
                            log::debug!(
                                target: "stream session",
                                "stats stream ended: container_id={}",
                                meta.id
                            );
                            break;
                        }
                        Err(err) => {
                            log::warn!(
                                target: "stream session",
                                "failed reading stats stream: container_id={}, error={}",
                                meta.id,
                                err
                            );
                            break;
                        }
                    }
                }
            }
            Err(err) => {
                log::warn!(
                    target: "stream session",
                    "failed opening stats stream: container_id={}, error={}",
                    meta.id,
                    err
                );
            }
        }

        lines.clear();
        if emitter.is_closed() {
            return;
        }
        tokio::time::sleep(reconnect_delay).await;
    }
}

/// Feeds one line into the accumulator. Returns `false` once the emitter is closed.
fn handle_line(
    meta: &ContainerMeta,
    accumulator: &mut WindowAccumulator,
    line: &[u8],
    emitter: &Emitter,
) -> bool {
    if line.iter().all(u8::is_ascii_whitespace) {
        return true;
    }

    let stats = match RawStats::from_slice(line) {
        Ok(stats) => stats,
        Err(err) => {
            log::debug!(
                target: "stream session",
                "dropping malformed sample: container_id={}, error={}",
                meta.id,
                err
            );
            return true;
        }
    };

    match accumulator.push(meta, stats) {
        Some(record) => emitter.emit(record),
        None => true,
    }
}
