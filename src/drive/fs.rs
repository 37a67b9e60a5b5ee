//! Drives stored as plain directories.
//!
//! The storage root holds one directory per drive, named by the lowercase hex of its key:
//!
//! ``` ignore,
//! storage/
//!   names/
//!     example          <- contains the hex key of the "example" drive
//!   2c26b46b...e7ae/   <- drive root
//!     index.md
//!     sub/
//! ```
//!
//! Host identifiers without a record under `names/` resolve as [DriveKey::from_str] does.
//!
//! Symbolic links are followed only while they stay inside the drive root. Anything resolving
//! outside of it is treated as absent.
use std::fs::{self, File};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use log::{debug, info, warn};

use crate::drive::{segments, Drive, DriveKey, Entry, Provider};
use crate::error::GatewayError;

const NAMES_DIR: &str = "names";

/// Provider serving drives from a storage directory.
#[derive(Debug)]
pub struct FsProvider {
    root: PathBuf,
}

impl FsProvider {
    /// Open the storage root, creating it if missing.
    pub fn open(root: &Path) -> Result<FsProvider, GatewayError> {
        fs::create_dir_all(root).map_err(|e| GatewayError::io(root.to_string_lossy(), e))?;
        info!("using storage directory {:?}", root);
        Ok(FsProvider {
            root: root.to_path_buf(),
        })
    }

    fn name_pointer(&self, identifier: &str) -> Result<Option<DriveKey>, GatewayError> {
        let fp = self.root.join(NAMES_DIR).join(identifier);
        match fs::read_to_string(&fp) {
            Ok(v) => {
                let s = v.trim();
                if s.len() != 64 || hex::decode(s).is_err() {
                    return Err(GatewayError::UnknownHost(identifier.to_string()));
                }
                let key = match DriveKey::from_str(s) {
                    Ok(v) => v,
                    Err(e) => match e {},
                };
                debug!("name {} points to {}", identifier, key);
                Ok(Some(key))
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GatewayError::io(fp.to_string_lossy(), e)),
        }
    }
}

impl Provider for FsProvider {
    fn resolve_key(&self, identifier: &str) -> Result<DriveKey, GatewayError> {
        if identifier.is_empty()
            || identifier.starts_with('.')
            || identifier.contains('/')
            || identifier.contains('\\') {
            return Err(GatewayError::UnknownHost(identifier.to_string()));
        }
        if let Some(key) = self.name_pointer(identifier)? {
            return Ok(key);
        }
        match DriveKey::from_str(identifier) {
            Ok(v) => Ok(v),
            Err(e) => match e {},
        }
    }

    fn drive(&self, key: &DriveKey) -> Result<Arc<dyn Drive>, GatewayError> {
        let root = self.root.join(key.to_string());
        if !root.is_dir() {
            return Err(GatewayError::DriveUnavailable(key.to_string()));
        }
        let root = root.canonicalize().map_err(|e| GatewayError::io(root.to_string_lossy(), e))?;
        Ok(Arc::new(FsDrive { root }))
    }

    fn close(&self) -> Result<(), GatewayError> {
        debug!("closing storage directory {:?}", self.root);
        Ok(())
    }
}

/// A drive rooted at a local directory.
#[derive(Debug)]
pub struct FsDrive {
    /// Canonical path of the drive directory.
    root: PathBuf,
}

impl FsDrive {
    /// Filesystem location of `path`, with links resolved.
    ///
    /// `None` if the path does not exist or leaves the drive root.
    fn locate(&self, path: &str) -> Result<Option<PathBuf>, GatewayError> {
        let parts = match segments(path) {
            Some(v) => v,
            None => {
                return Ok(None);
            },
        };
        let mut fp = self.root.clone();
        for s in parts {
            if s.contains('\\') {
                return Ok(None);
            }
            fp.push(s);
        }
        let fp = match fp.canonicalize() {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(None);
            },
            Err(e) => {
                // e.g. a component is a regular file
                if fp.symlink_metadata().is_err() {
                    return Ok(None);
                }
                return Err(GatewayError::io(path, e));
            },
        };
        if !fp.starts_with(&self.root) {
            warn!("{} resolves to {:?}, outside of drive {:?}", path, fp, self.root);
            return Ok(None);
        }
        Ok(Some(fp))
    }
}

impl Drive for FsDrive {
    fn version(&self) -> u64 {
        fs::metadata(&self.root)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn list(&self, path: &str) -> Result<Vec<String>, GatewayError> {
        let fp = match self.locate(path)? {
            Some(v) => v,
            None => {
                return Ok(vec!());
            },
        };
        let rd = match fs::read_dir(&fp) {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(vec!());
            },
            Err(e) => {
                if fp.is_file() {
                    return Ok(vec!());
                }
                return Err(GatewayError::io(path, e));
            },
        };
        let mut names: Vec<String> = vec!();
        for v in rd {
            let d = v.map_err(|e| GatewayError::io(path, e))?;
            names.push(d.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn entry(&self, path: &str) -> Result<Option<Entry>, GatewayError> {
        let fp = match self.locate(path)? {
            Some(v) => v,
            None => {
                return Ok(None);
            },
        };
        match fs::metadata(&fp) {
            Ok(m) => {
                if m.is_file() {
                    Ok(Some(Entry { byte_length: m.len() }))
                } else {
                    Ok(None)
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GatewayError::io(path, e)),
        }
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, GatewayError> {
        let fp = match self.locate(path)? {
            Some(v) => v,
            None => {
                let e = std::io::Error::new(ErrorKind::NotFound, "no such file in drive");
                return Err(GatewayError::io(path, e));
            },
        };
        match File::open(&fp) {
            Ok(f) => Ok(Box::new(f)),
            Err(e) => Err(GatewayError::io(path, e)),
        }
    }
}
