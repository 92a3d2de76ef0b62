//-
// Copyright (c) 2026, Jason Lingle
//
// This file is part of Swallow.
//
// Swallow is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Swallow is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Swallow. If not, see <http://www.gnu.org/licenses/>.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::error;

use super::{KeyCache, Mode};
use crate::stream::InputByteStream;
use crate::support::error::Error;
use crate::support::safe_name::is_safe_key;

/// A `KeyCache` storing each item in its own file.
///
/// Each namespace is a directory under the cache root. File handles are
/// opened on first use and kept until the item or namespace is cleared.
/// Every namespace this cache created is removed when it is dropped.
pub struct DiskKeyCache {
    root: PathBuf,
    // Held so that a temporary root lives as long as the cache
    _tmp: Option<tempfile::TempDir>,
    keys: HashMap<String, HashMap<String, Option<fs::File>>>,
}

impl DiskKeyCache {
    /// Create a cache under `root`, which is created if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref().to_owned();
        fs::create_dir_all(&root).map_err(|e| {
            Error::Cache(format!(
                "Cache root {} is not writable: {}",
                root.display(),
                e
            ))
        })?;

        Ok(DiskKeyCache {
            root,
            _tmp: None,
            keys: HashMap::new(),
        })
    }

    /// Create a cache in a fresh temporary directory.
    pub fn temporary() -> Result<Self, Error> {
        let tmp = tempfile::Builder::new().prefix("swallow-cache").tempdir()?;
        Ok(DiskKeyCache {
            root: tmp.path().to_owned(),
            _tmp: Some(tmp),
            keys: HashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn item_path(&self, ns: &str, item: &str) -> Result<PathBuf, Error> {
        if !is_safe_key(ns) || !is_safe_key(item) {
            return Err(Error::UnsafeName);
        }
        Ok(self.root.join(ns).join(item))
    }

    /// Return the handle for the item, opening (and creating) it if needed.
    fn handle(&mut self, ns: &str, item: &str) -> Result<&mut fs::File, Error> {
        let path = self.item_path(ns, item)?;
        let dir = self.root.join(ns);

        let slot = self
            .keys
            .entry(ns.to_owned())
            .or_default()
            .entry(item.to_owned())
            .or_default();

        if slot.is_none() {
            fs::create_dir_all(&dir).map_err(|e| {
                Error::Cache(format!(
                    "Failed to create cache directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
            let file = fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)?;
            *slot = Some(file);
        }

        match slot.as_mut() {
            Some(file) => Ok(file),
            None => Err(Error::Cache("Lost cache file handle".to_owned())),
        }
    }
}

impl KeyCache for DiskKeyCache {
    fn set_bytes(
        &mut self,
        ns: &str,
        item: &str,
        bytes: &[u8],
        mode: Mode,
    ) -> Result<(), Error> {
        let file = self.handle(ns, item)?;
        if Mode::Write == mode {
            file.set_len(0)?;
        }
        file.seek(SeekFrom::End(0))?;
        file.write_all(bytes)?;
        Ok(())
    }

    fn get_bytes(
        &mut self,
        ns: &str,
        item: &str,
    ) -> Result<Option<Vec<u8>>, Error> {
        if !self.has_key(ns, item) {
            return Ok(None);
        }

        let file = self.handle(ns, item)?;
        file.seek(SeekFrom::Start(0))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(Some(data))
    }

    fn export_to_byte_stream(
        &mut self,
        ns: &str,
        item: &str,
        is: &mut dyn InputByteStream,
    ) -> Result<(), Error> {
        if !self.has_key(ns, item) {
            return Ok(());
        }

        let file = self.handle(ns, item)?;
        file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; 8192];
        loop {
            let n = file.read(&mut buf)?;
            if 0 == n {
                break;
            }
            is.write(&buf[..n])?;
        }
        Ok(())
    }

    fn has_key(&self, ns: &str, item: &str) -> bool {
        self.keys
            .get(ns)
            .map_or(false, |items| items.contains_key(item))
            && self
                .item_path(ns, item)
                .map_or(false, |path| path.is_file())
    }

    fn clear_key(&mut self, ns: &str, item: &str) -> Result<(), Error> {
        let path = self.item_path(ns, item)?;
        let known = self
            .keys
            .get_mut(ns)
            .and_then(|items| items.remove(item))
            .is_some();

        if known {
            match fs::remove_file(&path) {
                Ok(()) => (),
                Err(e) if io::ErrorKind::NotFound == e.kind() => (),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn clear_all(&mut self, ns: &str) -> Result<(), Error> {
        if !is_safe_key(ns) {
            return Err(Error::UnsafeName);
        }

        if let Some(items) = self.keys.remove(ns) {
            for item in items.keys() {
                match fs::remove_file(self.root.join(ns).join(item)) {
                    Ok(()) => (),
                    Err(e) if io::ErrorKind::NotFound == e.kind() => (),
                    Err(e) => return Err(e.into()),
                }
            }

            match fs::remove_dir(self.root.join(ns)) {
                Ok(()) => (),
                Err(e) if io::ErrorKind::NotFound == e.kind() => (),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Drop for DiskKeyCache {
    fn drop(&mut self) {
        let namespaces = self.keys.keys().cloned().collect::<Vec<_>>();
        for ns in namespaces {
            if let Err(e) = self.clear_all(&ns) {
                error!(
                    "Failed to clear cache namespace {} in {}: {}",
                    ns,
                    self.root.display(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn shared_behaviour() {
        let tmp = TempDir::new().unwrap();
        let mut cache = DiskKeyCache::new(tmp.path()).unwrap();
        super::super::test::exercise(&mut cache);
    }

    #[test]
    fn items_are_files_and_are_removed_on_drop() {
        crate::init_test_log();

        let tmp = TempDir::new().unwrap();
        let mut cache = DiskKeyCache::new(tmp.path()).unwrap();
        cache.set_bytes("abc123", "body", b"data", Mode::Write).unwrap();
        assert_eq!(
            b"data".to_vec(),
            fs::read(tmp.path().join("abc123").join("body")).unwrap()
        );

        drop(cache);
        assert!(!tmp.path().join("abc123").exists());
    }

    #[test]
    fn unsafe_keys_rejected() {
        let mut cache = DiskKeyCache::temporary().unwrap();
        assert_matches!(
            Err(Error::UnsafeName),
            cache.set_bytes("..", "x", b"", Mode::Write)
        );
        assert_matches!(
            Err(Error::UnsafeName),
            cache.set_bytes("ns", "../x", b"", Mode::Write)
        );
    }

    #[test]
    fn foreign_files_are_not_keys() {
        let mut cache = DiskKeyCache::temporary().unwrap();
        fs::create_dir(cache.root().join("ns")).unwrap();
        fs::write(cache.root().join("ns").join("x"), b"stale").unwrap();
        assert!(!cache.has_key("ns", "x"));
        assert_eq!(None, cache.get_bytes("ns", "x").unwrap());
    }
}
