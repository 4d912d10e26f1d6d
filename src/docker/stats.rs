use crate::container::ContainerID;
use crate::source::{self, Chunk, SampleStream, StatsSource};

use super::client::{BodyStream, DockerClient};

/// Stats of one container from `GET /containers/{id}/stats`.
#[derive(Debug, Clone)]
pub struct DockerStats {
    client: DockerClient,
    id: ContainerID,
}

impl DockerStats {
    pub fn new(client: DockerClient, id: ContainerID) -> Self {
        Self { client, id }
    }

    fn path(&self, stream: bool) -> String {
        format!("/containers/{}/stats?stream={}", self.id, stream)
    }
}

impl StatsSource for DockerStats {
    type Stream = BodyStream;

    async fn open_stream(&self) -> source::Result<BodyStream> {
        let response = self.client.get(&self.path(true)).await?;
        Ok(BodyStream::new(response))
    }

    async fn snapshot(&self) -> source::Result<Option<Chunk>> {
        let body = self.client.get_bytes(&self.path(false)).await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(body))
    }
}

impl SampleStream for BodyStream {
    async fn next_chunk(&mut self) -> source::Result<Option<Chunk>> {
        Ok(self.read_chunk().await?)
    }
}
