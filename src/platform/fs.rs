// SerialScribe - platform/fs.rs
//
// Filesystem helpers used by the log store.
//
// Every write goes through a short-lived handle: open, write, close. No file
// handle outlives a single call, so nothing is held open across a device
// read or a backoff wait.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Append `data` to `path`, creating the file if it does not exist.
pub fn append_bytes(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(data)?;
    file.flush()
}

/// Create an empty file at `path`, failing with `AlreadyExists` if taken.
pub fn create_new_file(path: &Path) -> io::Result<()> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map(drop)
}

/// Current on-disk size of `path` in bytes.
pub fn file_len(path: &Path) -> io::Result<u64> {
    fs::metadata(path).map(|m| m.len())
}

/// Clear every write permission bit on `path`.
///
/// On Unix this yields mode 0444 for a default 0644 file; on Windows it sets
/// the read-only attribute.
pub fn set_read_only(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    if perms.readonly() {
        return Ok(());
    }
    perms.set_readonly(true);
    fs::set_permissions(path, perms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_creates_then_extends() {
        let dir = TempDir::new().expect("tmpdir");
        let path = dir.path().join("a.txt");
        append_bytes(&path, b"one\n").expect("append");
        append_bytes(&path, b"two\n").expect("append");
        assert_eq!(fs::read_to_string(&path).expect("read"), "one\ntwo\n");
        assert_eq!(file_len(&path).expect("len"), 8);
    }

    #[test]
    fn test_create_new_file_refuses_existing() {
        let dir = TempDir::new().expect("tmpdir");
        let path = dir.path().join("b.txt");
        create_new_file(&path).expect("first create");
        let err = create_new_file(&path).expect_err("second create");
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_set_read_only_is_idempotent() {
        let dir = TempDir::new().expect("tmpdir");
        let path = dir.path().join("c.txt");
        fs::write(&path, b"x").expect("write");
        set_read_only(&path).expect("first");
        set_read_only(&path).expect("second");
        assert!(fs::metadata(&path).expect("meta").permissions().readonly());
    }
}
