use std::io::Read;
use std::str::FromStr;

use ascii::AsciiString;
use log::{debug, error};
use tiny_http::{
    Header,
    HeaderField,
    Request,
    Response,
    ResponseBox,
    StatusCode,
};

use crate::error::GatewayError;
use crate::request::RequestResult;

pub const NOT_FOUND: &str = "Not Found";
pub const METHOD_NOT_ALLOWED: &str = "Method Not Allowed";
pub const INTERNAL_ERROR: &str = "Internal Server Error";

fn header(field: &str, value: &str) -> Option<Header> {
    let field = HeaderField::from_str(field).ok()?;
    let value = AsciiString::from_ascii(value).ok()?;
    Some(Header { field, value })
}

/// Headers sent with every response.
pub fn origin_headers() -> Vec<Header> {
    let server_header_v = format!("drivegate/{}, tiny_http (Rust)", env!("CARGO_PKG_VERSION"));
    [
        ("Access-Control-Allow-Origin", "*"),
        ("Access-Control-Allow-Methods", "GET"),
        ("Server", server_header_v.as_str()),
    ]
    .iter()
    .filter_map(|(k, v)| header(k, v))
    .collect()
}

fn text(status: u16, s: &str) -> ResponseBox {
    let mut res = Response::from_data(s.as_bytes().to_vec()).with_status_code(StatusCode(status));
    if let Some(h) = header("Content-Type", "text/plain") {
        res.add_header(h);
    }
    res.boxed()
}

fn failure(e: &GatewayError, expose_errors: bool) -> ResponseBox {
    if expose_errors {
        text(500, &e.report())
    } else {
        text(500, INTERNAL_ERROR)
    }
}

/// Build the response for a dispatch outcome.
///
/// Failure details are only put in the body if `expose_errors` is set; otherwise the body is a
/// generic message.
pub fn build_response(r: RequestResult, expose_errors: bool) -> ResponseBox {
    let mut res = match r {
        RequestResult::Listing(v) => {
            match serde_json::to_string(&v) {
                Ok(s) => {
                    let mut res = Response::from_data(s.into_bytes()).with_status_code(StatusCode(200));
                    if let Some(h) = header("Content-Type", "application/json") {
                        res.add_header(h);
                    }
                    res.boxed()
                },
                Err(e) => {
                    let e = GatewayError::from(e);
                    error!("{}", e.report());
                    failure(&e, expose_errors)
                },
            }
        },
        RequestResult::File { path, entry, content_type, reader } => {
            let length = usize::try_from(entry.byte_length).ok();
            let mut headers: Vec<Header> = vec!();
            if let Some(h) = header("Content-Type", content_type.as_ref()) {
                headers.push(h);
            }
            debug!("streaming {} as {} ({} bytes)", &path, &content_type, entry.byte_length);
            let reader: Box<dyn Read + Send> = reader;
            // known length goes out as Content-Length, never chunked
            Response::new(StatusCode(200), headers, reader, length, None)
                .with_chunked_threshold(usize::MAX)
        },
        RequestResult::NotFound => {
            text(404, NOT_FOUND)
        },
        RequestResult::MethodNotAllowed => {
            text(405, METHOD_NOT_ALLOWED)
        },
        RequestResult::Failed(e) => {
            failure(&e, expose_errors)
        },
    };
    for h in origin_headers() {
        res.add_header(h);
    }
    res
}

/// Respond to `req` with the outcome of dispatching it.
///
/// The body is streamed to the client as it is read. A client going away mid-stream ends the
/// response early; the reader is dropped either way.
pub fn exec_response(req: Request, r: RequestResult, expose_errors: bool) {
    let url = req.url().to_string();
    let res = build_response(r, expose_errors);
    if let Err(e) = req.respond(res) {
        debug!("response to {} not completed: {}", url, e);
    }
}
