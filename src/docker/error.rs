use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to socket `{path}`: {source}")]
    SocketConnect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP handshake with the docker daemon failed: {0}")]
    Handshake(#[source] hyper::Error),
    #[error("invalid request `{path}`: {reason}")]
    InvalidRequest { path: String, reason: String },
    #[error("request `{path}` failed: {source}")]
    Request {
        path: String,
        #[source]
        source: hyper::Error,
    },
    #[error("docker daemon answered `{path}` with status {status}: {body}")]
    Status {
        path: String,
        status: hyper::StatusCode,
        body: String,
    },
    #[error("failed to read response body: {0}")]
    Body(#[source] hyper::Error),
    #[error("failed to decode docker response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid container filter: {0}")]
    Filter(#[from] regex::Error),
    #[error("docker event stream ended")]
    EventsClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for crate::source::Error {
    fn from(err: Error) -> Self {
        crate::source::Error::Other(Box::new(err))
    }
}
