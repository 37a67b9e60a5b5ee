//! The storage collaborator as seen by the gateway.
//!
//! A [Provider] turns a host identifier into a [DriveKey], and a key into a [Drive]. A drive is a
//! versioned tree of files addressed by `/`-separated paths. Directories are implicit: a path is a
//! directory when it has children, and [Drive::entry] reports `None` for it.
//!
//! Two providers ship with the crate: [fs::FsProvider], which serves drives stored as directories
//! on the local filesystem, and [memory::MemoryProvider], which keeps everything in memory.
use std::convert::Infallible;
use std::fmt;
use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::GatewayError;

/// Directory-backed storage.
pub mod fs;

/// In-memory storage.
pub mod memory;

/// Path separator inside a drive.
pub const SEP: char = '/';

/// Stable binary key of a drive.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DriveKey {
    v: [u8; 32],
}

impl DriveKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.v
    }
}

impl From<[u8; 32]> for DriveKey {
    fn from(v: [u8; 32]) -> DriveKey {
        DriveKey { v }
    }
}

impl FromStr for DriveKey {
    type Err = Infallible;

    /// A 64 character hex string is taken as the key itself. Anything else is a name, and the key
    /// is the SHA256 of that name.
    fn from_str(s: &str) -> Result<DriveKey, Infallible> {
        let mut v = [0u8; 32];
        if s.len() == 64 && hex::decode_to_slice(s, &mut v).is_ok() {
            return Ok(DriveKey { v });
        }
        let mut h = Sha256::new();
        h.update(s.as_bytes());
        v.copy_from_slice(&h.finalize());
        Ok(DriveKey { v })
    }
}

impl fmt::Display for DriveKey {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&hex::encode(self.v))
    }
}

impl fmt::Debug for DriveKey {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "DriveKey({})", self)
    }
}

/// Stat record of a file inside a drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entry {
    pub byte_length: u64,
}

/// A versioned, hierarchical file store.
pub trait Drive: Send + Sync {
    /// Current version of the drive. Owned by the storage backend, only ever grows.
    fn version(&self) -> u64;

    /// Names of the direct children of the directory at `path`, in enumeration order.
    ///
    /// A path that is not a directory has no children.
    fn list(&self, path: &str) -> Result<Vec<String>, GatewayError>;

    /// Stat the file at exactly `path`. `None` if there is no file there.
    fn entry(&self, path: &str) -> Result<Option<Entry>, GatewayError>;

    /// Open a stream positioned at the start of the file's content.
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, GatewayError>;
}

/// Source of drives.
pub trait Provider: Send + Sync + 'static {
    /// Resolve a human-facing host identifier to a drive key.
    fn resolve_key(&self, identifier: &str) -> Result<DriveKey, GatewayError>;

    /// Acquire a handle to the drive with the given key.
    fn drive(&self, key: &DriveKey) -> Result<Arc<dyn Drive>, GatewayError>;

    /// Release storage resources. Called once, at shutdown.
    fn close(&self) -> Result<(), GatewayError>;
}

/// Split a drive path into its segments.
///
/// Empty and `.` segments are dropped, so repeated separators collapse. Returns `None` when the
/// path tries to climb out of the drive with `..`.
pub fn segments(path: &str) -> Option<Vec<&str>> {
    let mut r = vec!();
    for s in path.split(SEP) {
        match s {
            "" | "." => {},
            ".." => {
                return None;
            },
            _ => {
                r.push(s);
            },
        }
    }
    Some(r)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::{segments, DriveKey};

    #[test]
    fn test_key_from_name() {
        let k = DriveKey::from_str("foo").unwrap();
        assert_eq!(k.to_string(), "2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae");
    }

    #[test]
    fn test_key_from_hex() {
        let s = "c3ab8ff13720e8ad9047dd39466b3c8974e592c2fa383d4a3960714caef0c4f2";
        let k = DriveKey::from_str(s).unwrap();
        assert_eq!(k.to_string(), s);
        assert_eq!(k.as_bytes()[0], 0xc3);
    }

    #[test]
    fn test_key_not_quite_hex() {
        let s = "x3ab8ff13720e8ad9047dd39466b3c8974e592c2fa383d4a3960714caef0c4f2";
        let k = DriveKey::from_str(s).unwrap();
        assert_ne!(k.to_string(), s);
    }

    #[test]
    fn test_segments() {
        assert_eq!(segments("/").unwrap(), Vec::<&str>::new());
        assert_eq!(segments("//a.txt").unwrap(), vec!("a.txt"));
        assert_eq!(segments("/sub/./b/").unwrap(), vec!("sub", "b"));
        assert!(segments("/sub/../../etc/passwd").is_none());
    }
}
