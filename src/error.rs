use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Failures raised while serving a request or running the gateway.
///
/// Anything reaching the dispatcher as a `GatewayError` is answered with a 500.
/// Routing misses and missing files are not errors; see
/// [request::RequestResult](crate::request::RequestResult).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The host identifier does not map to a drive key.
    #[error("cannot resolve host identifier {0:?}")]
    UnknownHost(String),

    /// The key resolved, but no drive could be acquired for it.
    #[error("drive {0} is not available")]
    DriveUnavailable(String),

    /// Storage read failure.
    #[error("storage i/o failure on {path}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Directory listing could not be serialized.
    #[error("cannot encode directory listing")]
    Encode(#[from] serde_json::Error),

    /// The listening socket could not be opened.
    #[error("cannot bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    /// The storage provider failed to initialize. Shared by every request
    /// that waited on the same attempt.
    #[error("storage provider failed to initialize")]
    Init(#[source] Arc<GatewayError>),

    /// The storage provider was released and will not be created again.
    #[error("storage provider is shut down")]
    Closed,
}

impl GatewayError {
    pub fn io(path: impl Into<String>, source: io::Error) -> GatewayError {
        GatewayError::Io {
            path: path.into(),
            source,
        }
    }

    /// Error message followed by its source chain, one cause per line.
    pub fn report(&self) -> String {
        let mut s = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(e) = cause {
            s.push_str("\ncaused by: ");
            s.push_str(&e.to_string());
            cause = e.source();
        }
        s
    }
}
