// SerialScribe - app/log_store.rs
//
// Durable, size-bounded storage of captured lines.
//
// Layout (other tooling depends on it):
//   <root>/<YYYY>/<MM>_<Mon>/<DD>_<MM>_<YYYY>/<HH>_<MM>_<SS>.txt
//
// - The day directory is resolved once per session and kept for its whole
//   lifetime.
// - Every append opens, writes and closes the active file.
// - Rotation compares the file's on-disk size (not the tracked counter)
//   with the threshold, so bytes written by anything else count too.
// - Rotation never touches the previous file. Only `finalize` changes
//   permissions, and only of the file active at that moment.

use crate::platform::fs;
use crate::util::constants::{LOG_FILE_EXTENSION, MAX_FILE_NAME_COLLISIONS};
use crate::util::error::PersistenceError;
use chrono::{Local, NaiveDateTime};
use std::io;
use std::path::{Path, PathBuf};

/// Directory for captures started at `now`.
pub fn day_dir(root: &Path, now: NaiveDateTime) -> PathBuf {
    root.join(now.format("%Y").to_string())
        .join(now.format("%m_%b").to_string())
        .join(now.format("%d_%m_%Y").to_string())
}

/// File stem for a log file created at `now`.
pub fn file_stem(now: NaiveDateTime) -> String {
    now.format("%H_%M_%S").to_string()
}

/// Per-session log file manager.
#[derive(Debug)]
pub struct LogStore {
    root: PathBuf,
    max_size: u64,
    session_dir: Option<PathBuf>,
    active: Option<PathBuf>,
    /// Bytes this store appended to the active file.
    tracked_size: u64,
    /// Bytes appended across all files.
    bytes_written: u64,
    files: Vec<PathBuf>,
    finalized: bool,
}

impl LogStore {
    /// `max_size` is the rotation threshold in bytes (clamped to at least 1).
    pub fn new(root: impl Into<PathBuf>, max_size: u64) -> Self {
        Self {
            root: root.into(),
            max_size: max_size.max(1),
            session_dir: None,
            active: None,
            tracked_size: 0,
            bytes_written: 0,
            files: Vec::new(),
            finalized: false,
        }
    }

    /// Create today's directory (and any missing parents) and make it the
    /// session directory. Idempotent within a day.
    pub fn open_session(&mut self) -> Result<PathBuf, PersistenceError> {
        self.open_session_at(Local::now().naive_local())
    }

    pub fn open_session_at(&mut self, now: NaiveDateTime) -> Result<PathBuf, PersistenceError> {
        let dir = day_dir(&self.root, now);
        std::fs::create_dir_all(&dir).map_err(|source| PersistenceError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        tracing::debug!(dir = %dir.display(), "Log directory ready");
        self.session_dir = Some(dir.clone());
        Ok(dir)
    }

    /// Create a new log file named by the current time of day and make it
    /// the active file. The previous file is left exactly as it is.
    pub fn new_file(&mut self) -> Result<PathBuf, PersistenceError> {
        self.new_file_at(Local::now().naive_local())
    }

    pub fn new_file_at(&mut self, now: NaiveDateTime) -> Result<PathBuf, PersistenceError> {
        if self.finalized {
            return Err(PersistenceError::Finalized {
                path: self.active.clone(),
            });
        }
        let dir = match &self.session_dir {
            Some(dir) => dir.clone(),
            None => self.open_session_at(now)?,
        };

        let stem = file_stem(now);
        for n in 0..MAX_FILE_NAME_COLLISIONS {
            let name = if n == 0 {
                format!("{stem}.{LOG_FILE_EXTENSION}")
            } else {
                format!("{stem}_{n}.{LOG_FILE_EXTENSION}")
            };
            let path = dir.join(name);
            match fs::create_new_file(&path) {
                Ok(()) => {
                    tracing::info!(file = %path.display(), "New log file");
                    self.active = Some(path.clone());
                    self.tracked_size = 0;
                    self.files.push(path.clone());
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(PersistenceError::CreateFile { path, source }),
            }
        }

        Err(PersistenceError::NameExhausted { dir, stem })
    }

    /// Append one line to the active file through a short-lived handle.
    ///
    /// Failures are returned, never retried.
    pub fn append(&mut self, line: &str) -> Result<(), PersistenceError> {
        let path = self.writable_file()?;
        fs::append_bytes(&path, line.as_bytes())
            .map_err(|source| PersistenceError::Write { path, source })?;
        self.tracked_size += line.len() as u64;
        self.bytes_written += line.len() as u64;
        Ok(())
    }

    /// Switch to a new file if the active one reached the threshold on disk.
    ///
    /// Returns the new file's path when a rotation happened.
    pub fn rotate_if_needed(&mut self) -> Result<Option<PathBuf>, PersistenceError> {
        let path = self.writable_file()?;
        let size = fs::file_len(&path).map_err(|source| PersistenceError::Stat {
            path: path.clone(),
            source,
        })?;
        if size < self.max_size {
            return Ok(None);
        }
        tracing::debug!(
            file = %path.display(),
            size,
            max = self.max_size,
            "Log file reached size limit; rotating"
        );
        self.new_file().map(Some)
    }

    /// Mark the active file read-only and refuse further writes.
    ///
    /// The store is finalised even if the permission change fails; the error
    /// is returned for reporting only. Calling this again is a no-op.
    pub fn finalize(&mut self) -> Result<(), PersistenceError> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;
        let Some(path) = self.active.clone() else {
            return Ok(());
        };
        fs::set_read_only(&path).map_err(|source| PersistenceError::Permissions {
            path: path.clone(),
            source,
        })?;
        tracing::info!(file = %path.display(), "Log file finalised (read-only)");
        Ok(())
    }

    fn writable_file(&self) -> Result<PathBuf, PersistenceError> {
        if self.finalized {
            return Err(PersistenceError::Finalized {
                path: self.active.clone(),
            });
        }
        self.active.clone().ok_or(PersistenceError::NoActiveFile)
    }

    pub fn active_file(&self) -> Option<&Path> {
        self.active.as_deref()
    }

    pub fn tracked_size(&self) -> u64 {
        self.tracked_size
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Every file created by this store, oldest first.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .expect("valid date")
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).expect("read")
    }

    #[test]
    fn test_directory_layout() {
        let dir = day_dir(Path::new("logs"), at(9, 5, 1));
        assert_eq!(dir, Path::new("logs/2024/03_Mar/07_03_2024"));
        assert_eq!(file_stem(at(9, 5, 1)), "09_05_01");
    }

    #[test]
    fn test_open_session_is_idempotent() {
        let tmp = TempDir::new().expect("tmpdir");
        let mut store = LogStore::new(tmp.path(), 1024);
        let first = store.open_session_at(at(1, 0, 0)).expect("open");
        let second = store.open_session_at(at(2, 0, 0)).expect("reopen");
        assert_eq!(first, second);
        assert!(first.is_dir());
    }

    #[test]
    fn test_same_second_files_get_suffixes() {
        let tmp = TempDir::new().expect("tmpdir");
        let mut store = LogStore::new(tmp.path(), 1024);
        let a = store.new_file_at(at(10, 0, 0)).expect("a");
        let b = store.new_file_at(at(10, 0, 0)).expect("b");
        assert_eq!(a.file_name().unwrap(), "10_00_00.txt");
        assert_eq!(b.file_name().unwrap(), "10_00_00_1.txt");
        assert_eq!(store.active_file(), Some(b.as_path()));
        assert_eq!(store.files(), &[a, b]);
    }

    #[test]
    fn test_append_without_file_is_error() {
        let tmp = TempDir::new().expect("tmpdir");
        let mut store = LogStore::new(tmp.path(), 1024);
        assert!(matches!(
            store.append("x\n"),
            Err(PersistenceError::NoActiveFile)
        ));
    }

    #[test]
    fn test_rotation_at_threshold() {
        let tmp = TempDir::new().expect("tmpdir");
        let mut store = LogStore::new(tmp.path(), 10);
        let first = store.new_file_at(at(12, 0, 0)).expect("file");

        store.append("ab\n").expect("append");
        assert_eq!(store.rotate_if_needed().expect("check"), None);

        store.append("cdefgh\n").expect("append");
        let second = store
            .rotate_if_needed()
            .expect("check")
            .expect("10 bytes must rotate");
        assert_ne!(first, second);
        assert_eq!(store.tracked_size(), 0);

        store.append("ij\n").expect("append");
        assert_eq!(store.rotate_if_needed().expect("check"), None);

        assert_eq!(read(&first), "ab\ncdefgh\n");
        assert_eq!(read(&second), "ij\n");
        assert_eq!(store.bytes_written(), 13);
    }

    #[test]
    fn test_rotation_uses_on_disk_size() {
        let tmp = TempDir::new().expect("tmpdir");
        let mut store = LogStore::new(tmp.path(), 16);
        let first = store.new_file_at(at(8, 0, 0)).expect("file");
        store.append("a\n").expect("append");

        // Another writer grows the file behind the store's back.
        fs::append_bytes(&first, &[b'x'; 32]).expect("external write");
        assert_eq!(store.tracked_size(), 2);

        let rotated = store.rotate_if_needed().expect("check");
        assert!(rotated.is_some());
        // The old file is untouched and still writable.
        let perms = std::fs::metadata(&first).expect("meta").permissions();
        assert!(!perms.readonly());
    }

    #[test]
    fn test_finalize_marks_read_only_and_blocks_appends() {
        let tmp = TempDir::new().expect("tmpdir");
        let mut store = LogStore::new(tmp.path(), 1024);
        let path = store.new_file_at(at(23, 59, 59)).expect("file");
        store.append("last line\n").expect("append");

        store.finalize().expect("finalize");
        store.finalize().expect("second finalize is a no-op");

        assert!(store.is_finalized());
        assert!(std::fs::metadata(&path)
            .expect("meta")
            .permissions()
            .readonly());
        assert!(matches!(
            store.append("late\n"),
            Err(PersistenceError::Finalized { .. })
        ));
        assert!(store.new_file().is_err());
        assert_eq!(read(&path), "last line\n");
    }

    #[test]
    fn test_finalize_without_file_succeeds() {
        let tmp = TempDir::new().expect("tmpdir");
        let mut store = LogStore::new(tmp.path(), 1024);
        store.finalize().expect("finalize");
        assert!(store.active_file().is_none());
    }
}
