//! File inspection for the `info` command

use crate::error::{CopyError, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::{File, Metadata, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Notable attribute of a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAttribute {
    /// A directory
    Directory,
    /// No write permission
    ReadOnly,
    /// Name starts with a dot
    Hidden,
    /// A symbolic link
    Symlink,
    /// Some execute bit is set
    Executable,
}

impl FileAttribute {
    /// Upper-case label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Directory => "DIRECTORY",
            Self::ReadOnly => "READONLY",
            Self::Hidden => "HIDDEN",
            Self::Symlink => "SYMLINK",
            Self::Executable => "EXECUTABLE",
        }
    }
}

/// What `inspect` found out about a path
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    /// Inspected path
    pub path: PathBuf,
    /// Attributes that apply
    pub attributes: Vec<FileAttribute>,
    /// Size in bytes
    pub size: u64,
    /// Creation time, where the platform records one
    pub created: Option<DateTime<Local>>,
    /// Last access
    pub accessed: Option<DateTime<Local>>,
    /// Last modification
    pub modified: Option<DateTime<Local>>,
    /// `user:group`
    pub owner: Option<String>,
    /// Opening for reading succeeded
    pub can_read: bool,
    /// Opening for writing succeeded
    pub can_write: bool,
}

impl FileInfo {
    /// Write the report in the layout of the interactive menu
    pub fn render<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "\n=== File info for: {} ===", self.path.display())?;

        writeln!(out, "Attributes:")?;
        if self.attributes.is_empty() {
            writeln!(out, "  (none)")?;
        }
        for attr in &self.attributes {
            writeln!(out, "  - {}", attr.label())?;
        }

        writeln!(
            out,
            "\nFile size: {} bytes ({})",
            self.size,
            humansize::format_size(self.size, humansize::BINARY)
        )?;
        for (label, time) in [
            ("Created", &self.created),
            ("Accessed", &self.accessed),
            ("Modified", &self.modified),
        ] {
            match time {
                Some(t) => writeln!(out, "{}: {}", label, format_time(t))?,
                None => writeln!(out, "{}: (not available)", label)?,
            }
        }

        match &self.owner {
            Some(owner) => writeln!(out, "Owner: {}", owner)?,
            None => writeln!(out, "Owner: (unknown)")?,
        }

        writeln!(out, "\nAccess:")?;
        writeln!(out, "  Can READ:  {}", yes_no(self.can_read))?;
        writeln!(out, "  Can WRITE: {}", yes_no(self.can_write))
    }

    /// Print to stdout
    pub fn print(&self) -> io::Result<()> {
        self.render(&mut io::stdout().lock())
    }
}

/// Format a timestamp as `dd.mm.yyyy HH:MM:SS`
pub fn format_time(time: &DateTime<Local>) -> String {
    time.format(TIME_FORMAT).to_string()
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "YES"
    } else {
        "NO"
    }
}

/// Gather attributes, size, times, owner and access of `path`
pub fn inspect(path: &Path) -> Result<FileInfo> {
    let link_meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(CopyError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(CopyError::io(path, e)),
    };
    // Describe the target of a link, falling back to the link for dangling ones.
    let meta = if link_meta.file_type().is_symlink() {
        std::fs::metadata(path).unwrap_or_else(|_| link_meta.clone())
    } else {
        link_meta.clone()
    };

    let mut attributes = Vec::new();
    if meta.is_dir() {
        attributes.push(FileAttribute::Directory);
    }
    if meta.permissions().readonly() {
        attributes.push(FileAttribute::ReadOnly);
    }
    if is_hidden(path) {
        attributes.push(FileAttribute::Hidden);
    }
    if link_meta.file_type().is_symlink() {
        attributes.push(FileAttribute::Symlink);
    }
    if is_executable(&meta) {
        attributes.push(FileAttribute::Executable);
    }

    Ok(FileInfo {
        path: path.to_path_buf(),
        attributes,
        size: meta.len(),
        created: local_time(meta.created()),
        accessed: local_time(meta.accessed()),
        modified: local_time(meta.modified()),
        owner: owner_of(&meta),
        can_read: can_open(path, false, meta.is_dir()),
        can_write: can_open(path, true, meta.is_dir()),
    })
}

fn local_time(time: io::Result<SystemTime>) -> Option<DateTime<Local>> {
    time.ok().map(DateTime::<Local>::from)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

#[cfg(unix)]
fn is_executable(meta: &Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    !meta.is_dir() && meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &Metadata) -> bool {
    false
}

#[cfg(unix)]
fn owner_of(meta: &Metadata) -> Option<String> {
    use nix::unistd::{Gid, Group, Uid, User};
    use std::os::unix::fs::MetadataExt;

    let user = User::from_uid(Uid::from_raw(meta.uid()))
        .ok()
        .flatten()
        .map(|u| u.name)
        .unwrap_or_else(|| meta.uid().to_string());
    let group = Group::from_gid(Gid::from_raw(meta.gid()))
        .ok()
        .flatten()
        .map(|g| g.name)
        .unwrap_or_else(|| meta.gid().to_string());
    Some(format!("{}:{}", user, group))
}

#[cfg(not(unix))]
fn owner_of(_meta: &Metadata) -> Option<String> {
    None
}

/// Whether `path` can be opened for reading or writing right now
fn can_open(path: &Path, write: bool, is_dir: bool) -> bool {
    if is_dir {
        return if write {
            !std::fs::metadata(path)
                .map(|m| m.permissions().readonly())
                .unwrap_or(true)
        } else {
            std::fs::read_dir(path).is_ok()
        };
    }
    if write {
        OpenOptions::new().write(true).open(path).is_ok()
    } else {
        File::open(path).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_inspect_regular_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, vec![1u8; 1234]).unwrap();

        let info = inspect(&path).unwrap();
        assert_eq!(info.size, 1234);
        assert!(info.modified.is_some());
        assert!(info.can_read);
        assert!(!info.attributes.contains(&FileAttribute::Directory));
        assert!(!info.attributes.contains(&FileAttribute::Hidden));
    }

    #[test]
    fn test_inspect_directory_and_hidden() {
        let dir = TempDir::new().unwrap();
        let hidden = dir.path().join(".cache");
        std::fs::create_dir(&hidden).unwrap();

        let info = inspect(&hidden).unwrap();
        assert!(info.attributes.contains(&FileAttribute::Directory));
        assert!(info.attributes.contains(&FileAttribute::Hidden));
        assert!(info.can_read);
    }

    #[test]
    fn test_inspect_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(inspect(&missing), Err(CopyError::NotFound(p)) if p == missing));
    }

    #[test]
    fn test_readonly_attribute() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ro.txt");
        std::fs::write(&path, b"x").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&path, perms).unwrap();

        let info = inspect(&path).unwrap();
        assert!(info.attributes.contains(&FileAttribute::ReadOnly));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_and_owner() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target.sh");
        std::fs::write(&target, b"#!/bin/sh\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let info = inspect(&link).unwrap();
        assert!(info.attributes.contains(&FileAttribute::Symlink));
        assert!(info.attributes.contains(&FileAttribute::Executable));
        assert!(info.owner.unwrap().contains(':'));
    }

    #[test]
    fn test_render() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.txt");
        std::fs::write(&path, b"hello").unwrap();

        let mut out = Vec::new();
        inspect(&path).unwrap().render(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("=== File info for:"));
        assert!(text.contains("File size: 5 bytes"));
        assert!(text.contains("Can READ:  YES"));
    }

    #[test]
    fn test_format_time() {
        use chrono::TimeZone;
        let t = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(format_time(&t), "07.03.2024 09:05:01");
    }
}
