// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use super::{Persist, PersistStrategy};
use crate::error::{Error, ErrorKind};

/// Suffix of every persisted packet file.
pub const FILE_SUFFIX: &str = ".mqtt";

#[derive(Debug)]
struct Inner {
    /// Writes which have not reached disk yet.
    buffer: HashMap<String, Vec<u8>>,

    /// Number of distinct keys, on disk plus buffered.
    count: usize,

    last_flush: Instant,
}

/// Persistence with one file per in-flight packet.
///
/// The filename is the entry key plus [`FILE_SUFFIX`]; file contents are
/// the exact wire bytes of the packet. With a non-zero strategy interval,
/// writes buffer in memory and reach disk when the interval has elapsed
/// or [`Persist::flush`] is called; a zero interval means write-through.
#[derive(Debug)]
pub struct FilePersist {
    dir: PathBuf,
    strategy: PersistStrategy,
    inner: Mutex<Inner>,
}

impl FilePersist {
    /// Open (or create) the persistence directory and seed the entry count
    /// from the files already present.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or scanned.
    pub fn new(dir: &Path, strategy: PersistStrategy) -> Result<Self, Error> {
        fs::create_dir_all(dir).map_err(|err| {
            Error::from_string(
                ErrorKind::ConfigError,
                format!("Failed to create persist dir {dir:?}, {err}"),
            )
        })?;

        let mut count = 0;
        let entries = fs::read_dir(dir).map_err(|err| {
            Error::from_string(
                ErrorKind::ConfigError,
                format!("Failed to scan persist dir {dir:?}, {err}"),
            )
        })?;
        for entry in entries.flatten() {
            if Self::key_of(&entry.path()).is_some() {
                count += 1;
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            strategy,
            inner: Mutex::new(Inner {
                buffer: HashMap::new(),
                count,
                last_flush: Instant::now(),
            }),
        })
    }

    /// Number of stored entries, on disk plus buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}{FILE_SUFFIX}"))
    }

    fn key_of(path: &Path) -> Option<String> {
        let name = path.file_name()?.to_str()?;
        name.strip_suffix(FILE_SUFFIX).map(ToString::to_string)
    }

    fn write_entry(&self, key: &str, packet: &[u8]) -> Result<(), Error> {
        fs::write(self.path_of(key), packet).map_err(|err| {
            Error::from_string(
                ErrorKind::PersistError,
                format!("Failed to write persist file for {key}, {err}"),
            )
        })
    }

    fn flush_locked(&self, inner: &mut Inner) -> Result<(), Error> {
        for (key, packet) in inner.buffer.drain() {
            fs::write(self.path_of(&key), &packet).map_err(|err| {
                Error::from_string(
                    ErrorKind::PersistError,
                    format!("Failed to flush persist file for {key}, {err}"),
                )
            })?;
        }
        inner.last_flush = Instant::now();
        Ok(())
    }
}

impl Persist for FilePersist {
    fn name(&self) -> &str {
        "FilePersist"
    }

    fn store(&self, key: &str, packet: &[u8]) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();

        let exists = inner.buffer.contains_key(key) || self.path_of(key).exists();
        if exists && !self.strategy.duplicate_replace() {
            return Ok(());
        }

        let max_count = self.strategy.max_count() as usize;
        if !exists
            && max_count > 0
            && inner.count >= max_count
            && self.strategy.drop_on_exceed()
        {
            return Err(Error::from_string(
                ErrorKind::PacketDropped,
                format!("file persist full, dropped key {key}"),
            ));
        }

        if self.strategy.interval().is_zero() {
            self.write_entry(key, packet)?;
        } else {
            inner.buffer.insert(key.to_string(), packet.to_vec());
            if inner.last_flush.elapsed() >= self.strategy.interval() {
                self.flush_locked(&mut inner)?;
            }
        }
        if !exists {
            inner.count += 1;
        }
        Ok(())
    }

    fn load(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(packet) = self.inner.lock().unwrap().buffer.get(key) {
            return Some(packet.clone());
        }
        fs::read(self.path_of(key)).ok()
    }

    fn range(&self, visitor: &mut dyn FnMut(&str, &[u8]) -> bool) {
        let inner = self.inner.lock().unwrap();
        for (key, packet) in &inner.buffer {
            if !visitor(key, packet) {
                return;
            }
        }

        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(key) = Self::key_of(&path) else {
                continue;
            };
            if inner.buffer.contains_key(&key) {
                continue;
            }
            if let Ok(packet) = fs::read(&path) {
                if !visitor(&key, &packet) {
                    return;
                }
            }
        }
    }

    fn delete(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        let buffered = inner.buffer.remove(key).is_some();
        let path = self.path_of(key);
        let on_disk = path.exists();
        if on_disk {
            if let Err(err) = fs::remove_file(&path) {
                log::warn!("persist: Failed to remove file {path:?}, {err}");
            }
        }
        if buffered || on_disk {
            inner.count = inner.count.saturating_sub(1);
        }
    }

    fn destroy(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        inner.buffer.clear();
        inner.count = 0;

        let entries = fs::read_dir(&self.dir).map_err(|err| {
            Error::from_string(
                ErrorKind::PersistError,
                format!("Failed to scan persist dir {:?}, {err}", self.dir),
            )
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if Self::key_of(&path).is_some() {
                if let Err(err) = fs::remove_file(&path) {
                    log::warn!("persist: Failed to remove file {path:?}, {err}");
                }
            }
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock().unwrap();
        self.flush_locked(&mut inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("roost-tests")
            .join(format!("{name}-{}", std::process::id()));
        let _ret = fs::remove_dir_all(&dir);
        dir
    }

    fn write_through() -> PersistStrategy {
        PersistStrategy::new(Duration::ZERO, 0, false, true)
    }

    #[test]
    fn test_store_creates_named_file() {
        let dir = temp_dir("file-names");
        let persist = FilePersist::new(&dir, write_through()).unwrap();
        persist.store("S3", b"bytes").unwrap();
        assert!(dir.join("S3.mqtt").exists());
        assert_eq!(persist.load("S3"), Some(b"bytes".to_vec()));
    }

    #[test]
    fn test_survives_reopen() {
        let dir = temp_dir("file-reopen");
        {
            let persist = FilePersist::new(&dir, write_through()).unwrap();
            persist.store("S1", b"payload-bytes").unwrap();
        }

        let persist = FilePersist::new(&dir, write_through()).unwrap();
        assert_eq!(persist.len(), 1);

        let mut found = Vec::new();
        persist.range(&mut |key, packet| {
            found.push((key.to_string(), packet.to_vec()));
            true
        });
        assert_eq!(found, [("S1".to_string(), b"payload-bytes".to_vec())]);
    }

    #[test]
    fn test_buffered_until_flush() {
        let dir = temp_dir("file-buffered");
        let strategy = PersistStrategy::new(Duration::from_secs(3600), 0, false, true);
        let persist = FilePersist::new(&dir, strategy).unwrap();

        persist.store("S1", b"one").unwrap();
        assert!(!dir.join("S1.mqtt").exists());
        // Buffered entries are still visible.
        assert_eq!(persist.load("S1"), Some(b"one".to_vec()));

        persist.flush().unwrap();
        assert!(dir.join("S1.mqtt").exists());
    }

    #[test]
    fn test_delete_and_destroy() {
        let dir = temp_dir("file-delete");
        let persist = FilePersist::new(&dir, write_through()).unwrap();
        persist.store("S1", b"one").unwrap();
        persist.store("R2", b"two").unwrap();

        persist.delete("S1");
        assert!(persist.load("S1").is_none());
        assert_eq!(persist.len(), 1);

        persist.destroy().unwrap();
        assert!(persist.is_empty());
        assert!(persist.load("R2").is_none());
    }

    #[test]
    fn test_drop_on_exceed() {
        let dir = temp_dir("file-exceed");
        let strategy = PersistStrategy::new(Duration::ZERO, 1, true, true);
        let persist = FilePersist::new(&dir, strategy).unwrap();
        persist.store("S1", b"one").unwrap();
        let err = persist.store("S2", b"two").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PacketDropped);
    }
}
