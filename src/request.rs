use std::fmt;
use std::io::Read;
use std::sync::Arc;

use log::{debug, error};
use mime::Mime;
use percent_encoding::percent_decode_str;
use tiny_http::Method;
use url::Url;

use crate::content_type::ContentTypes;
use crate::drive::{Entry, Provider, SEP};
use crate::error::GatewayError;
use crate::lifecycle::Lifecycle;
use crate::resolve::{resolve, Resolution};

/// Paths served by the gateway start with this.
pub const ROUTE_PREFIX: &str = "/hyper/";

/// Query flag turning off index file resolution.
pub const NO_RESOLVE_FLAG: &str = "noResolve";

/// What the gateway needs to know about an incoming request.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
    pub method: Method,
    pub raw_path: String,
}

/// Drive and path a request points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Human-facing name of the drive.
    pub host: String,
    /// Path inside the drive. Always starts with `/`.
    pub path: String,
    /// Serve the directory listing even if an index file exists.
    pub suppress_index: bool,
}

impl ResolvedTarget {
    /// Parse the local part of a request URL, e.g. `/hyper/example/docs/?noResolve`.
    ///
    /// Returns `None` if the URL is not under [ROUTE_PREFIX] or names no host.
    pub fn from_url(raw: &str) -> Option<ResolvedTarget> {
        if !raw.starts_with(ROUTE_PREFIX) {
            return None;
        }
        let base = Url::parse("http://gateway.invalid/").ok()?;
        let url = base.join(raw).ok()?;
        let path = url.path();
        if !path.starts_with(ROUTE_PREFIX) {
            return None;
        }

        let mut segments = path[ROUTE_PREFIX.len()..].split(SEP);
        let host = decode(segments.next()?);
        if host.is_empty() {
            return None;
        }
        let rest: Vec<String> = segments.map(decode).collect();
        let mut requested = String::with_capacity(path.len());
        requested.push(SEP);
        requested.push_str(&rest.join("/"));

        let suppress_index = url.query().map_or(false, |q| q.contains(NO_RESOLVE_FLAG));
        Some(ResolvedTarget {
            host,
            path: requested,
            suppress_index,
        })
    }

    pub fn is_directory(&self) -> bool {
        self.path.ends_with(SEP)
    }
}

fn decode(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Outcome of dispatching a request.
pub enum RequestResult {
    /// Directory entries, to be served as a JSON array.
    Listing(Vec<String>),
    /// File content to stream.
    File {
        path: String,
        entry: Entry,
        content_type: Mime,
        reader: Box<dyn Read + Send>,
    },
    NotFound,
    MethodNotAllowed,
    Failed(GatewayError),
}

impl fmt::Debug for RequestResult {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestResult::Listing(v) => write!(fmt, "Listing({:?})", v),
            RequestResult::File { path, entry, content_type, .. } => {
                write!(fmt, "File({}, {} bytes, {})", path, entry.byte_length, content_type)
            },
            RequestResult::NotFound => fmt.write_str("NotFound"),
            RequestResult::MethodNotAllowed => fmt.write_str("MethodNotAllowed"),
            RequestResult::Failed(e) => write!(fmt, "Failed({})", e),
        }
    }
}

/// Per-request orchestration: routing, drive lookup, path resolution.
pub struct Dispatcher<P> {
    lifecycle: Arc<Lifecycle<P>>,
    content_types: ContentTypes,
}

impl<P: Provider> Dispatcher<P> {
    pub fn new(lifecycle: Arc<Lifecycle<P>>, content_types: ContentTypes) -> Dispatcher<P> {
        Dispatcher {
            lifecycle,
            content_types,
        }
    }

    /// Handle a request. Never fails: storage errors come back as [RequestResult::Failed].
    pub fn process(&self, req: &RequestDescriptor) -> RequestResult {
        let target = match ResolvedTarget::from_url(&req.raw_path) {
            Some(v) => v,
            None => {
                debug!("not routed: {}", &req.raw_path);
                return RequestResult::NotFound;
            },
        };
        if req.method != Method::Get {
            debug!("method {} not allowed for {}", req.method, &req.raw_path);
            return RequestResult::MethodNotAllowed;
        }
        match self.serve(&target) {
            Ok(v) => v,
            Err(e) => {
                error!("{} {} failed: {}", req.method, &req.raw_path, e.report());
                RequestResult::Failed(e)
            },
        }
    }

    fn serve(&self, target: &ResolvedTarget) -> Result<RequestResult, GatewayError> {
        let provider = self.lifecycle.get()?;
        let key = provider.resolve_key(&target.host)?;
        let drive = provider.drive(&key)?;
        debug!("host {} path {} key {} version {}", &target.host, &target.path, &key, drive.version());

        let r = match resolve(target, drive.as_ref())? {
            Resolution::Listing(v) => RequestResult::Listing(v),
            Resolution::File { path, entry } => {
                let content_type = self.content_types.resolve(&path);
                let reader = drive.open(&path)?;
                RequestResult::File {
                    path,
                    entry,
                    content_type,
                    reader,
                }
            },
            Resolution::NotFound => RequestResult::NotFound,
        };
        Ok(r)
    }
}
