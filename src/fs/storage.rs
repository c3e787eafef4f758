//! Filesystem abstraction used by the copy pipelines
//!
//! Pipelines never touch `std::fs` directly: they open their handles through a
//! [`Storage`] so the engine can run against the local filesystem or against
//! in-memory fakes in tests.

use std::fs::{File, Metadata, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;

/// A source file opened for positioned reads
///
/// Shared with the I/O pool while a read is in flight, hence `Send + Sync`.
pub trait SourceFile: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`; 0 means end of file
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// File length observed when the handle was opened
    fn size(&self) -> u64;
}

/// A destination file opened for positioned writes
pub trait DestinationFile: Send {
    /// Write `buf` at `offset`, returning how many bytes were accepted
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize>;

    /// Flush buffered state before the handle is closed
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Opens pipeline handles
pub trait Storage: Send + Sync {
    /// Open `path` for sequential positioned reads
    fn open_source(&self, path: &Path) -> io::Result<Arc<dyn SourceFile>>;

    /// Create `path`, truncating any previous content
    fn create_destination(&self, path: &Path) -> io::Result<Box<dyn DestinationFile>>;

    /// Whether `destination` names the same file as `source`
    fn same_file(&self, source: &Path, destination: &Path) -> bool {
        source == destination
    }
}

/// Local filesystem storage
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorage;

impl LocalStorage {
    /// Create a local storage handle
    pub fn new() -> Self {
        Self
    }
}

impl Storage for LocalStorage {
    fn open_source(&self, path: &Path) -> io::Result<Arc<dyn SourceFile>> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        advise_sequential(&file);
        Ok(Arc::new(LocalSource { file, len }))
    }

    fn create_destination(&self, path: &Path) -> io::Result<Box<dyn DestinationFile>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(LocalDestination { file }))
    }

    fn same_file(&self, source: &Path, destination: &Path) -> bool {
        match (std::fs::metadata(source), std::fs::metadata(destination)) {
            (Ok(a), Ok(b)) => same_inode(&a, &b, source, destination),
            _ => false,
        }
    }
}

/// Hard links and differently spelled paths share one inode
#[cfg(unix)]
fn same_inode(a: &Metadata, b: &Metadata, _: &Path, _: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_inode(_: &Metadata, _: &Metadata, source: &Path, destination: &Path) -> bool {
    match (std::fs::canonicalize(source), std::fs::canonicalize(destination)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

struct LocalSource {
    file: File,
    len: u64,
}

impl SourceFile for LocalSource {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        pread(&self.file, buf, offset)
    }

    fn size(&self) -> u64 {
        self.len
    }
}

struct LocalDestination {
    file: File,
}

impl DestinationFile for LocalDestination {
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        pwrite(&self.file, buf, offset)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.file)
    }
}

/// Positioned read that does not move the file cursor
#[cfg(unix)]
pub fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
pub fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

/// Positioned write that does not move the file cursor
#[cfg(unix)]
pub fn pwrite(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(buf, offset)
}

#[cfg(windows)]
pub fn pwrite(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_write(buf, offset)
}

/// Hint the kernel that the file will be read front to back
#[cfg(target_os = "linux")]
fn advise_sequential(file: &File) {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_SEQUENTIAL) };
    if rc != 0 {
        tracing::debug!("posix_fadvise(SEQUENTIAL) failed: {}", io::Error::from_raw_os_error(rc));
    }
}

#[cfg(not(target_os = "linux"))]
fn advise_sequential(_file: &File) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_local_source_reads_at_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("src.bin");
        File::create(&path).unwrap().write_all(b"0123456789").unwrap();

        let source = LocalStorage::new().open_source(&path).unwrap();
        assert_eq!(source.size(), 10);

        let mut buf = [0u8; 4];
        assert_eq!(source.read_at(&mut buf, 3).unwrap(), 4);
        assert_eq!(&buf, b"3456");
        assert_eq!(source.read_at(&mut buf, 10).unwrap(), 0);
    }

    #[test]
    fn test_destination_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dst.bin");
        std::fs::write(&path, vec![0xFFu8; 1000]).unwrap();

        let mut dest = LocalStorage::new().create_destination(&path).unwrap();
        assert_eq!(dest.write_at(b"abc", 0).unwrap(), 3);
        dest.flush().unwrap();
        drop(dest);

        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[test]
    fn test_same_file_detection() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"data").unwrap();
        let other = dir.path().join("b.bin");
        std::fs::write(&other, b"data").unwrap();
        let storage = LocalStorage::new();

        assert!(storage.same_file(&path, &path));
        assert!(storage.same_file(&path, &dir.path().join(".").join("a.bin")));
        assert!(!storage.same_file(&path, &other));
        assert!(!storage.same_file(&path, &dir.path().join("missing.bin")));
    }

    #[cfg(unix)]
    #[test]
    fn test_hard_link_is_same_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"data").unwrap();
        let link = dir.path().join("link.bin");
        std::fs::hard_link(&path, &link).unwrap();

        assert!(LocalStorage::new().same_file(&path, &link));
    }

    #[test]
    fn test_open_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let result = LocalStorage::new().open_source(&dir.path().join("nope"));
        assert_eq!(result.err().unwrap().kind(), io::ErrorKind::NotFound);
    }
}
