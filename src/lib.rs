#![crate_name = "drivegate"]

//! drivegate is an HTTP gateway to versioned, content-addressed drives.
//!
//! It lets ordinary HTTP clients browse drives held by a peer-to-peer storage system without
//! speaking that system's protocol. A request names a drive by a host identifier and a path inside
//! it:
//!
//! ``` ignore,
//! http://localhost:3748/hyper/<host identifier>/<path...>
//! ```
//!
//! The identifier is resolved to a drive key by the storage [Provider](crate::drive::Provider),
//! and the path to either a file, which is streamed back, or a directory, which is returned as a
//! JSON array of entry names with subdirectories suffixed by `/`.
//!
//! ## Path resolution
//!
//! A directory containing one of `index.html`, `index.md`, `index.gmi`, `index.gemini`,
//! `index.org`, `README.md`, `README.org` is served as that file, first match in that order. Add
//! `?noResolve` to the URL to get the listing instead.
//!
//! A file path that does not exist is retried with `.html`, `.md`, `.gmi`, `.gemini` and `.org`
//! appended, so `/hyper/example/about` serves `about.html` if that exists.
//!
//! See [resolve](crate::resolve) for details.
//!
//! ## Running the daemon
//!
//! The drivegate daemon listens on all addresses on port 3748 by default and serves drives from
//! the `./storage` directory, one subdirectory per drive named by the hex of its key. See
//! [drive::fs](crate::drive::fs) for the layout, and `cargo run -- --help` for options.
//!
//! Logging is controlled with `RUST_LOG`.

/// Command line settings.
pub mod arg;

/// Error types.
pub mod error;

/// Storage collaborator interface and builtin providers.
pub mod drive;

/// File extension to content type lookup.
pub mod content_type;

/// Request path resolution against a drive.
pub mod resolve;

/// Encapsulates an incoming remote request.
pub mod request;

/// Encapsulates an outgoing response to remote.
pub mod response;

/// Single-flight storage provider lifecycle.
pub mod lifecycle;

/// Listener and request workers.
pub mod server;
