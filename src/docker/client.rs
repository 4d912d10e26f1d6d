use std::path::{Path, PathBuf};
use std::sync::Arc;

use http_body_util::{BodyExt, Empty};
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;

use super::{Error, Result};

/// A minimal Docker Engine API client speaking HTTP/1.1 over the daemon's unix socket.
///
/// Every request uses its own connection, so a long-lived stream (events, stats) never
/// blocks other requests.
#[derive(Debug, Clone)]
pub struct DockerClient {
    socket_path: Arc<PathBuf>,
}

impl DockerClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: Arc::new(socket_path.into()),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Issues a `GET` request and returns the response once its headers arrived.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be reached or the daemon answers with a non-success
    /// status.
    pub async fn get(&self, path: &str) -> Result<Response<Incoming>> {
        let stream = tokio::net::UnixStream::connect(self.socket_path.as_path())
            .await
            .map_err(|source| Error::SocketConnect {
                path: self.socket_path.to_path_buf(),
                source,
            })?;
        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(Error::Handshake)?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                log::debug!(target: "docker", "connection closed: {}", err);
            }
        });

        let request = Request::get(path)
            .header(hyper::header::HOST, "docker")
            .body(Empty::<Bytes>::new())
            .map_err(|err| Error::InvalidRequest {
                path: path.to_owned(),
                reason: err.to_string(),
            })?;
        log::trace!(target: "docker", "GET {}", path);
        let response = sender
            .send_request(request)
            .await
            .map_err(|source| Error::Request {
                path: path.to_owned(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.into_body().collect().await {
                Ok(body) => String::from_utf8_lossy(&body.to_bytes()).trim().to_owned(),
                Err(_) => String::new(),
            };
            return Err(Error::Status {
                path: path.to_owned(),
                status,
                body,
            });
        }

        Ok(response)
    }

    /// Issues a `GET` request and collects the whole body.
    pub async fn get_bytes(&self, path: &str) -> Result<Bytes> {
        let body = self
            .get(path)
            .await?
            .into_body()
            .collect()
            .await
            .map_err(Error::Body)?;
        Ok(body.to_bytes())
    }

    /// Issues a `GET` request and decodes the JSON body.
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.get_bytes(path).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// The body of a streaming response, read chunk by chunk.
#[derive(Debug)]
pub struct BodyStream {
    body: Incoming,
}

impl BodyStream {
    pub fn new(response: Response<Incoming>) -> Self {
        Self {
            body: response.into_body(),
        }
    }

    /// Returns the next data chunk, or `None` once the body is complete.
    pub async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        while let Some(frame) = self.body.frame().await {
            if let Ok(data) = frame.map_err(Error::Body)?.into_data() {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }
}
