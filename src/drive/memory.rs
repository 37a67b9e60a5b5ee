use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::drive::{segments, Drive, DriveKey, Entry, Provider};
use crate::error::GatewayError;

/// A drive held entirely in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryDrive {
    files: BTreeMap<String, Arc<Vec<u8>>>,
    version: u64,
}

fn canonical(path: &str) -> Option<String> {
    segments(path).map(|v| v.join("/"))
}

impl MemoryDrive {
    pub fn new() -> MemoryDrive {
        MemoryDrive::default()
    }

    /// Add a file. Every addition bumps the drive version.
    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> MemoryDrive {
        if let Some(p) = canonical(path) {
            self.files.insert(p, Arc::new(content.into()));
            self.version += 1;
        }
        self
    }
}

impl Drive for MemoryDrive {
    fn version(&self) -> u64 {
        self.version
    }

    fn list(&self, path: &str) -> Result<Vec<String>, GatewayError> {
        let dir = match canonical(path) {
            Some(v) => v,
            None => {
                return Ok(vec!());
            },
        };
        let prefix = if dir.is_empty() {
            dir
        } else {
            format!("{}/", dir)
        };
        let mut children: Vec<String> = vec!();
        for k in self.files.keys() {
            let rest = match k.strip_prefix(prefix.as_str()) {
                Some(v) => v,
                None => {
                    continue;
                },
            };
            let name = rest.split('/').next().unwrap_or(rest);
            if children.last().map(String::as_str) != Some(name) {
                children.push(name.to_string());
            }
        }
        Ok(children)
    }

    fn entry(&self, path: &str) -> Result<Option<Entry>, GatewayError> {
        let r = canonical(path)
            .and_then(|p| self.files.get(&p))
            .map(|v| Entry { byte_length: v.len() as u64 });
        Ok(r)
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>, GatewayError> {
        match canonical(path).and_then(|p| self.files.get(&p)) {
            Some(v) => {
                let data: Vec<u8> = v.as_ref().clone();
                Ok(Box::new(Cursor::new(data)))
            },
            None => {
                let e = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
                Err(GatewayError::io(path, e))
            },
        }
    }
}

/// Provider serving a fixed set of named [MemoryDrive]s.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    names: HashMap<String, DriveKey>,
    drives: HashMap<DriveKey, Arc<MemoryDrive>>,
    closed: AtomicBool,
}

impl MemoryProvider {
    pub fn new() -> MemoryProvider {
        MemoryProvider::default()
    }

    /// Register `drive` under `name`. The key is derived from the name as [DriveKey::from_str]
    /// does.
    pub fn with_drive(mut self, name: &str, drive: MemoryDrive) -> MemoryProvider {
        let key = match DriveKey::from_str(name) {
            Ok(v) => v,
            Err(e) => match e {},
        };
        self.names.insert(name.to_string(), key.clone());
        self.drives.insert(key, Arc::new(drive));
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Provider for MemoryProvider {
    fn resolve_key(&self, identifier: &str) -> Result<DriveKey, GatewayError> {
        match self.names.get(identifier) {
            Some(v) => Ok(v.clone()),
            None => Err(GatewayError::UnknownHost(identifier.to_string())),
        }
    }

    fn drive(&self, key: &DriveKey) -> Result<Arc<dyn Drive>, GatewayError> {
        match self.drives.get(key) {
            Some(v) => Ok(v.clone()),
            None => Err(GatewayError::DriveUnavailable(key.to_string())),
        }
    }

    fn close(&self) -> Result<(), GatewayError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::{MemoryDrive, MemoryProvider};
    use crate::drive::{Drive, Entry, Provider};
    use crate::error::GatewayError;

    fn drive() -> MemoryDrive {
        MemoryDrive::new()
            .with_file("/a.txt", "foo")
            .with_file("/sub/b.md", "# bar")
            .with_file("/sub/deeper/c", "baz")
    }

    #[test]
    fn test_list_root() {
        let d = drive();
        assert_eq!(d.list("/").unwrap(), vec!("a.txt", "sub"));
    }

    #[test]
    fn test_list_sub() {
        let d = drive();
        assert_eq!(d.list("/sub/").unwrap(), vec!("b.md", "deeper"));
        assert_eq!(d.list("//sub").unwrap(), vec!("b.md", "deeper"));
        assert!(d.list("/nope/").unwrap().is_empty());
        assert!(d.list("/a.txt").unwrap().is_empty());
    }

    #[test]
    fn test_entry() {
        let d = drive();
        assert_eq!(d.entry("//a.txt").unwrap(), Some(Entry { byte_length: 3 }));
        assert_eq!(d.entry("/sub").unwrap(), None);
        assert_eq!(d.entry("/../a.txt").unwrap(), None);
        assert_eq!(d.version(), 3);
    }

    #[test]
    fn test_open() {
        let d = drive();
        let mut s = String::new();
        d.open("/sub/b.md").unwrap().read_to_string(&mut s).unwrap();
        assert_eq!(s, "# bar");
        assert!(d.open("/sub/b").is_err());
    }

    #[test]
    fn test_provider() {
        let p = MemoryProvider::new().with_drive("example", drive());
        let k = p.resolve_key("example").unwrap();
        let d = p.drive(&k).unwrap();
        assert_eq!(d.version(), 3);
        match p.resolve_key("other") {
            Err(GatewayError::UnknownHost(v)) => {
                assert_eq!(v, "other");
            },
            other => {
                panic!("unexpected {:?}", other.map(|k| k.to_string()));
            },
        }
        assert!(!p.is_closed());
        p.close().unwrap();
        assert!(p.is_closed());
    }
}
