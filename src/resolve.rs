//! Turns a requested path into something to serve.
//!
//! A request for a path ending in `/` is a directory request. Its children are listed, and if one
//! of them is a well-known index file (see [INDEX_FILES]) that file is served in place of the
//! listing, unless index resolution was suppressed for the request.
//!
//! Any other request, or one redirected to an index file, is a file request. The exact path is
//! tried first, then the path with each of [FALLBACK_SUFFIXES] appended. The first candidate
//! that exists wins.
use log::debug;

use crate::drive::{Drive, Entry, SEP};
use crate::error::GatewayError;
use crate::request::ResolvedTarget;

/// Index file names in priority order.
pub const INDEX_FILES: [&str; 7] = [
    "index.html",
    "index.md",
    "index.gmi",
    "index.gemini",
    "index.org",
    "README.md",
    "README.org",
];

/// Suffixes tried, in order, after the exact path misses.
pub const FALLBACK_SUFFIXES: [&str; 5] = [
    ".html",
    ".md",
    ".gmi",
    ".gemini",
    ".org",
];

/// Outcome of resolving a path against a drive.
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Children of a directory, subdirectories suffixed with `/`.
    Listing(Vec<String>),
    /// A file that exists, at `path`.
    File {
        path: String,
        entry: Entry,
    },
    NotFound,
}

/// Evaluate `candidates` in order and return the first one `stat` reports present, along with
/// what `stat` returned for it. Candidates after the first hit are never looked at.
pub fn first_present<I, T, E, F>(candidates: I, mut stat: F) -> Result<Option<(String, T)>, E>
where
    I: IntoIterator<Item = String>,
    F: FnMut(&str) -> Result<Option<T>, E>,
{
    for c in candidates {
        if let Some(v) = stat(&c)? {
            return Ok(Some((c, v)));
        }
    }
    Ok(None)
}

/// The exact path, then the path with each fallback suffix.
pub fn file_candidates(path: &str) -> Vec<String> {
    let mut r = Vec::with_capacity(FALLBACK_SUFFIXES.len() + 1);
    r.push(path.to_string());
    for s in FALLBACK_SUFFIXES.iter() {
        r.push(format!("{}{}", path, s));
    }
    r
}

/// The highest priority index file present among `children`.
pub fn index_file(children: &[String]) -> Option<&'static str> {
    INDEX_FILES
        .iter()
        .find(|name| children.iter().any(|c| c.as_str() == **name))
        .copied()
}

/// Children of the directory at `path`, each stat-ed to tell files from subdirectories.
///
/// Returns the raw child names alongside the listing.
fn list_directory(drive: &dyn Drive, path: &str) -> Result<(Vec<String>, Vec<String>), GatewayError> {
    let children = drive.list(path)?;
    let mut listing = Vec::with_capacity(children.len());
    for c in children.iter() {
        let child_path = format!("{}{}{}", path, SEP, c);
        match drive.entry(&child_path)? {
            Some(_) => {
                listing.push(c.clone());
            },
            None => {
                listing.push(format!("{}{}", c, SEP));
            },
        }
    }
    Ok((children, listing))
}

/// Resolve `target` against `drive`.
pub fn resolve(target: &ResolvedTarget, drive: &dyn Drive) -> Result<Resolution, GatewayError> {
    let mut path = target.path.clone();

    if target.is_directory() {
        let (children, listing) = list_directory(drive, &path)?;
        if target.suppress_index {
            return Ok(Resolution::Listing(listing));
        }
        match index_file(&children) {
            Some(v) => {
                debug!("directory {} resolved to index file {}", &path, v);
                path.push_str(v);
            },
            None => {
                return Ok(Resolution::Listing(listing));
            },
        }
    }

    match first_present(file_candidates(&path), |c| drive.entry(c))? {
        Some((path, entry)) => {
            debug!("{} resolved to {} ({} bytes)", &target.path, &path, entry.byte_length);
            Ok(Resolution::File { path, entry })
        },
        None => Ok(Resolution::NotFound),
    }
}
