use std::collections::{HashMap, VecDeque};

use crate::container::{ContainerID, ContainerMeta};
use crate::error::ResultExt;
use crate::lines::LineBuffer;
use crate::source::{self, LifecycleEvent, LifecycleSource};

use super::client::{BodyStream, DockerClient};
use super::filter::ContainerFilter;
use super::stats::DockerStats;
use super::{Error, Result};

const CONTAINERS_PATH: &str = "/containers/json";
/// `/events` filtered to `{"type":["container"],"event":["start","die"]}`.
const EVENTS_PATH: &str = "/events?filters=%7B%22type%22%3A%5B%22container%22%5D%2C%22event%22%3A%5B%22start%22%2C%22die%22%5D%7D";

/// An entry of `GET /containers/json`.
#[derive(Debug, serde::Deserialize)]
struct ListedContainer {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "Names", default)]
    names: Vec<String>,
}

impl ListedContainer {
    fn into_meta(self) -> crate::container::Result<ContainerMeta> {
        let name = self
            .names
            .first()
            .map(|name| name.trim_start_matches('/').to_owned())
            .unwrap_or_default();
        Ok(ContainerMeta::new(ContainerID::new(&self.id)?, self.image, name))
    }
}

/// A message of `GET /events`.
#[derive(Debug, Default, serde::Deserialize)]
struct EventMessage {
    #[serde(rename = "Type", default)]
    kind: String,
    #[serde(rename = "Action", default)]
    action: String,
    #[serde(rename = "Actor", default)]
    actor: Actor,
    // pre 1.22 API fields
    #[serde(default)]
    status: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    from: String,
}

#[derive(Debug, Default, serde::Deserialize)]
struct Actor {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Attributes", default)]
    attributes: HashMap<String, String>,
}

/// A container lifecycle change reported by the daemon.
#[derive(Debug, PartialEq, Eq)]
enum ContainerEvent {
    Started(ContainerMeta),
    Died(ContainerID),
}

/// Decodes one line of the events stream. Returns `Ok(None)` for events that do not
/// concern the container lifecycle.
fn parse_event(line: &[u8]) -> Result<Option<ContainerEvent>> {
    let msg: EventMessage = serde_json::from_slice(line)?;
    if !msg.kind.is_empty() && msg.kind != "container" {
        return Ok(None);
    }

    let action = if msg.action.is_empty() {
        msg.status.as_str()
    } else {
        msg.action.as_str()
    };
    let raw_id = if msg.actor.id.is_empty() {
        msg.id.as_str()
    } else {
        msg.actor.id.as_str()
    };

    match action {
        "start" => {
            let id = ContainerID::new(raw_id).map_err(|err| Error::InvalidRequest {
                path: EVENTS_PATH.to_owned(),
                reason: err.to_string(),
            })?;
            let attribute = |key: &str| msg.actor.attributes.get(key).cloned();
            let image = attribute("image").unwrap_or_else(|| msg.from.clone());
            let name = attribute("name").unwrap_or_default();
            Ok(Some(ContainerEvent::Started(ContainerMeta::new(id, image, name))))
        }
        "die" => match ContainerID::new(raw_id) {
            Ok(id) => Ok(Some(ContainerEvent::Died(id))),
            Err(_) => Ok(None),
        },
        _ => Ok(None),
    }
}

enum State {
    Initial,
    Streaming(BodyStream),
    Destroyed,
}

/// Container lifecycle notifications from the Docker daemon.
///
/// On first use, announces every running container, then follows the `start` and `die`
/// events. Containers rejected by the [`ContainerFilter`] are never announced; stops are
/// always forwarded.
pub struct DockerEvents {
    client: DockerClient,
    filter: ContainerFilter,
    state: State,
    pending: VecDeque<LifecycleEvent<DockerStats>>,
    lines: LineBuffer,
}

impl DockerEvents {
    pub fn new(client: DockerClient, filter: ContainerFilter) -> Self {
        Self {
            client,
            filter,
            state: State::Initial,
            pending: VecDeque::default(),
            lines: LineBuffer::default(),
        }
    }

    /// Subscribes to events, then queues a start for every running container. Subscribing
    /// first means no container starting in between is missed.
    async fn subscribe(&mut self) -> Result<()> {
        let events = BodyStream::new(self.client.get(EVENTS_PATH).await?);
        log::debug!(target: "docker", "subscribed to container events");

        let containers: Vec<ListedContainer> = self.client.get_json(CONTAINERS_PATH).await?;
        log::debug!(target: "docker", "found {} running containers", containers.len());
        for container in containers {
            if let Some(meta) = container.into_meta().ok_or_log("skipping listed container") {
                if let Some(event) = self.start_event(meta) {
                    self.pending.push_back(event);
                }
            }
        }

        self.state = State::Streaming(events);
        Ok(())
    }

    fn start_event(&self, meta: ContainerMeta) -> Option<LifecycleEvent<DockerStats>> {
        if !self.filter.admits(&meta) {
            log::debug!(
                target: "docker",
                "container filtered out: container_id={}, name={}, image={}",
                meta.id,
                meta.name,
                meta.image
            );
            return None;
        }
        let stats = DockerStats::new(self.client.clone(), meta.id.clone());
        Some(LifecycleEvent::Start { meta, stats })
    }

    fn decode_line(&self, line: &[u8]) -> Option<LifecycleEvent<DockerStats>> {
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        match parse_event(line).ok_or_log("ignoring docker event")?? {
            ContainerEvent::Started(meta) => self.start_event(meta),
            ContainerEvent::Died(id) => Some(LifecycleEvent::Stop { id }),
        }
    }

    fn fail(&mut self, err: Error) -> Option<source::Result<LifecycleEvent<DockerStats>>> {
        self.state = State::Destroyed;
        Some(Err(err.into()))
    }
}

impl LifecycleSource for DockerEvents {
    type Stats = DockerStats;

    async fn next_event(&mut self) -> Option<source::Result<LifecycleEvent<DockerStats>>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            while let Some(line) = self.lines.next_line() {
                if let Some(event) = self.decode_line(&line) {
                    return Some(Ok(event));
                }
            }

            if matches!(self.state, State::Initial) {
                if let Err(err) = self.subscribe().await {
                    return self.fail(err);
                }
                continue;
            }

            let chunk = match &mut self.state {
                State::Streaming(events) => events.read_chunk().await,
                State::Initial | State::Destroyed => return None,
            };
            match chunk {
                Ok(Some(chunk)) => self.lines.extend(&chunk),
                Ok(None) => return self.fail(Error::EventsClosed),
                Err(err) => return self.fail(err),
            }
        }
    }

    fn destroy(&mut self) {
        self.state = State::Destroyed;
        self.pending.clear();
        self.lines.clear();
    }
}
