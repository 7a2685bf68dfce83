//! The dispatcher client: token handshake and scoped guards.
//!
//! A query acquires a read token before touching any index and releases
//! it when the guard drops, so every exit path — success, runtime error,
//! panic unwind — gives the token back. Writers follow
//! write-start → write-commit/write-rollback, with rollback on drop.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use log::debug;

use crate::diagnostics::RuntimeError;

pub trait Dispatcher {
    fn request_read_and_idx(&self) -> Result<(), RuntimeError>;
    fn read_idx_finished(&self) -> Result<(), RuntimeError>;
    fn read_finished(&self);
    fn write_start(&self) -> Result<(), RuntimeError>;
    fn write_commit(&self) -> Result<(), RuntimeError>;
    fn write_rollback(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Reading,
    IdxFinished,
    Closed,
}

/// A held read token. Dropping it releases the token.
pub struct ReadGuard<'d> {
    dispatcher: &'d dyn Dispatcher,
    state: ReadState,
}

impl<'d> ReadGuard<'d> {
    pub fn acquire(dispatcher: &'d dyn Dispatcher) -> Result<Self, RuntimeError> {
        debug!("request_read_and_idx() start");
        dispatcher.request_read_and_idx()?;
        debug!("request_read_and_idx() end");
        Ok(Self {
            dispatcher,
            state: ReadState::Reading,
        })
    }

    /// Signals that all index headers are loaded; the dispatcher may let
    /// writers go ahead with preparing the next snapshot.
    pub fn idx_finished(&mut self) -> Result<(), RuntimeError> {
        if self.state == ReadState::Reading {
            self.dispatcher.read_idx_finished()?;
            self.state = ReadState::IdxFinished;
        }
        Ok(())
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        if self.state != ReadState::Closed {
            debug!("read_finished()");
            self.dispatcher.read_finished();
            self.state = ReadState::Closed;
        }
    }
}

/// A held write token over the area snapshot. Dropping without
/// [`WriteGuard::commit`] rolls the write back.
pub struct WriteGuard<'d> {
    dispatcher: &'d dyn Dispatcher,
    committed: bool,
}

impl<'d> WriteGuard<'d> {
    pub fn acquire(dispatcher: &'d dyn Dispatcher) -> Result<Self, RuntimeError> {
        debug!("write_start()");
        dispatcher.write_start()?;
        Ok(Self {
            dispatcher,
            committed: false,
        })
    }

    pub fn commit(mut self) -> Result<(), RuntimeError> {
        debug!("write_commit()");
        self.dispatcher.write_commit()?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            debug!("write_rollback()");
            self.dispatcher.write_rollback();
        }
    }
}

#[derive(Debug, Default)]
struct Leases {
    readers: u32,
    writer: bool,
}

/// Process-local dispatcher: lease bookkeeping behind a mutex, area
/// snapshot versioning as files in a directory. One writer at a time;
/// readers coexist with the writer, since they read the previously
/// committed snapshot.
#[derive(Debug)]
pub struct LocalDispatcher {
    leases: Mutex<Leases>,
    dir: PathBuf,
}

impl LocalDispatcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            leases: Mutex::new(Leases::default()),
            dir: dir.into(),
        }
    }

    fn leases(&self) -> Result<std::sync::MutexGuard<'_, Leases>, RuntimeError> {
        self.leases
            .lock()
            .map_err(|_| RuntimeError::Other("dispatcher lease table poisoned".to_string()))
    }

    /// The committed area snapshot version, empty before the first
    /// commit.
    pub fn area_version(&self) -> io::Result<String> {
        match fs::read_to_string(self.dir.join("area_version")) {
            Ok(version) => Ok(version),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    /// Publishes a new area snapshot version: shadow file first, then an
    /// atomic rename over the active name.
    pub fn commit_area_version(&self, timestamp: &str) -> io::Result<()> {
        let shadow = self.dir.join("area_version.shadow");
        fs::write(&shadow, timestamp)?;
        fs::rename(shadow, self.dir.join("area_version"))
    }

    pub fn discard_area_shadow(&self) {
        let _ = fs::remove_file(self.dir.join("area_version.shadow"));
    }
}

impl Dispatcher for LocalDispatcher {
    fn request_read_and_idx(&self) -> Result<(), RuntimeError> {
        self.leases()?.readers += 1;
        Ok(())
    }

    fn read_idx_finished(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn read_finished(&self) {
        if let Ok(mut leases) = self.leases.lock() {
            leases.readers = leases.readers.saturating_sub(1);
        }
    }

    fn write_start(&self) -> Result<(), RuntimeError> {
        let mut leases = self.leases()?;
        if leases.writer {
            return Err(RuntimeError::Other(
                "another writer holds the area token".to_string(),
            ));
        }
        leases.writer = true;
        Ok(())
    }

    fn write_commit(&self) -> Result<(), RuntimeError> {
        self.leases()?.writer = false;
        Ok(())
    }

    fn write_rollback(&self) {
        self.discard_area_shadow();
        if let Ok(mut leases) = self.leases.lock() {
            leases.writer = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mapql-dispatch-{name}-{}", std::process::id()));
        let _ = fs::create_dir_all(&dir);
        dir
    }

    #[test]
    fn read_guard_releases_on_drop() {
        let dispatcher = LocalDispatcher::new(tmp_dir("read"));
        {
            let mut guard = ReadGuard::acquire(&dispatcher).unwrap();
            guard.idx_finished().unwrap();
            assert_eq!(dispatcher.leases().unwrap().readers, 1);
        }
        assert_eq!(dispatcher.leases().unwrap().readers, 0);
    }

    #[test]
    fn second_writer_is_rejected_until_release() {
        let dispatcher = LocalDispatcher::new(tmp_dir("write"));
        let guard = WriteGuard::acquire(&dispatcher).unwrap();
        assert!(WriteGuard::acquire(&dispatcher).is_err());
        drop(guard); // rollback
        assert!(WriteGuard::acquire(&dispatcher).is_ok());
    }

    #[test]
    fn area_version_commits_via_shadow_and_rename() {
        let dir = tmp_dir("version");
        let dispatcher = LocalDispatcher::new(&dir);
        assert_eq!(dispatcher.area_version().unwrap(), "");
        dispatcher.commit_area_version("2024-06-01T00:00:00Z").unwrap();
        assert_eq!(dispatcher.area_version().unwrap(), "2024-06-01T00:00:00Z");
        assert!(!dir.join("area_version.shadow").exists());
    }
}
