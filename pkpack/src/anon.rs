//! Nameless files for code that can only be loaded by path
use std::fs::{File, Permissions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::{wrap_io_err, Error};

fn fd_path(fd: i32) -> PathBuf {
    PathBuf::from(format!("/proc/self/fd/{}", fd))
}

/// A read-only descriptor onto an unlinked file, addressable by its
/// `/proc/self/fd` path for as long as this value lives.
#[derive(Debug)]
pub struct AnonFile {
    file: File,
    path: PathBuf,
}

impl AnonFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self) -> &File {
        &self.file
    }
}

/// Write `content` to a file that has no directory entry, and hand back a
/// second, read-only descriptor for it.
pub fn materialize(content: &[u8]) -> Result<AnonFile, Error> {
    let scratch = tempfile::tempfile().map_err(wrap_io_err!("Creating anonymous file"))?;
    fill(scratch, content)
}

/// Takes ownership of the writable descriptor, so it is closed before
/// returning on success and on error alike.
fn fill(mut scratch: File, content: &[u8]) -> Result<AnonFile, Error> {
    scratch
        .write_all(content)
        .map_err(wrap_io_err!("Writing anonymous file"))?;
    scratch
        .set_permissions(Permissions::from_mode(0o500))
        .map_err(wrap_io_err!("Marking anonymous file executable"))?;

    let scratch_path = fd_path(scratch.as_raw_fd());
    let file = File::open(&scratch_path).map_err(wrap_io_err!(scratch_path, "Reopening anonymous file"))?;
    let path = fd_path(file.as_raw_fd());
    Ok(AnonFile { file, path })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::fs::{self, File};
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    use super::{fill, materialize};
    use crate::Error;

    /// Descriptors of this process open on the same file as `file`
    pub(crate) fn fds_on(file: &File) -> usize {
        let meta = file.metadata().unwrap();
        fs::read_dir("/proc/self/fd")
            .unwrap()
            .filter_map(|fd| fs::metadata(fd.ok()?.path()).ok())
            .filter(|other| other.dev() == meta.dev() && other.ino() == meta.ino())
            .count()
    }

    #[test]
    fn readable_by_path_with_no_name() -> Result<(), Error> {
        let anon = materialize(b"\x7fELF not really")?;
        assert!(anon.path().starts_with("/proc/self/fd"));
        assert_eq!(fs::read(anon.path()).unwrap(), b"\x7fELF not really");

        let meta = anon.file().metadata().unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o500);
        // Unlinked: no directory entry refers to it
        assert_eq!(meta.nlink(), 0);
        Ok(())
    }

    #[test]
    fn only_the_read_descriptor_survives() -> Result<(), Error> {
        let anon = materialize(b"payload")?;
        assert_eq!(fds_on(anon.file()), 1);

        let reader = File::open(anon.path()).unwrap();
        drop(anon);
        assert_eq!(fds_on(&reader), 1);
        Ok(())
    }

    #[test]
    fn scratch_is_closed_when_writing_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratch");
        fs::write(&path, "").unwrap();
        let watcher = File::open(&path).unwrap();

        // Read-only, so the write fails
        let scratch = File::open(&path).unwrap();
        assert_eq!(fds_on(&watcher), 2);
        assert!(matches!(fill(scratch, b"payload"), Err(Error::Io { .. })));
        assert_eq!(fds_on(&watcher), 1);
    }
}
