//! Where the archive of a loader invocation comes from
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::os::unix::io::{FromRawFd, RawFd};
use std::path::PathBuf;

use pkpack_core::Pack;

use crate::config::Config;
use crate::{bundle, codec, wrap_io_err, Error};

/// A parsed source reference
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// `stdin`
    Stdin,
    /// `X:<base64>`
    Inline(String),
    /// `fd:<n>`: base64 text on an inherited descriptor
    Fd(RawFd),
    /// A bundle stub or a gzip'd tar on disk
    File(PathBuf),
}

impl Source {
    pub fn parse(reference: &str) -> Source {
        if reference == "stdin" {
            Source::Stdin
        } else if let Some(text) = reference.strip_prefix("X:") {
            Source::Inline(text.to_string())
        } else if let Some(fd) = reference
            .strip_prefix("fd:")
            .and_then(|n| n.parse::<RawFd>().ok())
            .filter(|fd| *fd >= 0)
        {
            Source::Fd(fd)
        } else {
            Source::File(PathBuf::from(reference))
        }
    }

    /// First available of: the stub's inline reference, the `pk` variable,
    /// then standard input unless it is a terminal.
    pub fn locate(config: &Config, interactive: bool) -> Option<Source> {
        config
            .inline
            .as_deref()
            .or(config.source.as_deref())
            .map(Source::parse)
            .or(if interactive { None } else { Some(Source::Stdin) })
    }

    /// The archive bytes of the first non-empty source, with `stdin` drained
    /// here so that an empty stream (`</dev/null`) counts as no source.
    pub fn acquire<R: Read>(
        config: &Config,
        interactive: bool,
        stdin: R,
    ) -> Result<Option<Vec<u8>>, Error> {
        match Source::locate(config, interactive) {
            Some(Source::Stdin) => {
                let data = drain(stdin)?;
                if data.is_empty() {
                    crate::verbose!("stdin is empty");
                    Ok(None)
                } else {
                    archive_or_stub(data).map(Some)
                }
            }
            Some(source) => {
                crate::verbose!("archive source: {}", source);
                source.read().map(Some)
            }
            None => Ok(None),
        }
    }

    /// The gzip'd tar this reference points at. Consumes the reference,
    /// since a descriptor can only be drained once.
    pub fn read(self) -> Result<Vec<u8>, Error> {
        match self {
            Source::Stdin => archive_or_stub(drain(io::stdin().lock())?),
            Source::Inline(text) => codec::decode_text(&text),
            Source::Fd(fd) => {
                // Owned from here on: the descriptor is closed once drained
                let mut file = unsafe { File::from_raw_fd(fd) };
                let mut data = Vec::new();
                file.read_to_end(&mut data)
                    .map_err(wrap_io_err!(format!("fd:{}", fd), "Reading archive descriptor"))?;
                let text = std::str::from_utf8(&data)
                    .map_err(|err| Error::decode(format!("fd:{}: {}", fd, err)))?;
                codec::decode_text(text)
            }
            Source::File(path) => {
                let data = fs::read(&path).map_err(wrap_io_err!(path, "Reading archive"))?;
                archive_or_stub(data)
            }
        }
    }

    pub fn unpack(self) -> Result<Pack, Error> {
        let entries = codec::unpack(&self.read()?)?;
        Ok(Pack::new(entries))
    }
}

fn drain<R: Read>(mut stdin: R) -> Result<Vec<u8>, Error> {
    let mut data = Vec::new();
    stdin
        .read_to_end(&mut data)
        .map_err(wrap_io_err!("Reading archive from stdin"))?;
    Ok(data)
}

fn archive_or_stub(data: Vec<u8>) -> Result<Vec<u8>, Error> {
    if bundle::is_stub(&data) {
        let text = String::from_utf8(data).map_err(Error::decode)?;
        bundle::archive_bytes(&text)
    } else {
        Ok(data)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Source::Stdin => write!(f, "stdin"),
            Source::Inline(text) => write!(f, "inline ({} bytes of text)", text.len()),
            Source::Fd(fd) => write!(f, "fd:{}", fd),
            Source::File(path) => write!(f, "{}", path.display()),
        }
    }
}

pub fn stdin_is_tty() -> bool {
    unsafe { libc::isatty(libc::STDIN_FILENO) == 1 }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::{Seek, SeekFrom, Write};
    use std::os::unix::io::IntoRawFd;
    use std::path::PathBuf;

    use pkpack_core::Entry;

    use super::Source;
    use crate::config::Config;
    use crate::{codec, Bundler, Error};

    fn entries() -> Vec<Entry> {
        vec![
            Entry::new("pkg-2/readme.txt", "read me\n"),
            Entry::new("pkg-2/app/__init__.src", ""),
        ]
    }

    #[test]
    fn parse_references() {
        assert_eq!(Source::parse("stdin"), Source::Stdin);
        assert_eq!(Source::parse("X:aGk="), Source::Inline("aGk=".to_string()));
        assert_eq!(Source::parse("fd:3"), Source::Fd(3));
        assert_eq!(Source::parse("fd:-1"), Source::File(PathBuf::from("fd:-1")));
        assert_eq!(Source::parse("/tmp/a.tar.gz"), Source::File(PathBuf::from("/tmp/a.tar.gz")));
    }

    #[test]
    fn locate_precedence() {
        let mut config = Config::default();
        assert_eq!(Source::locate(&config, true), None);
        assert_eq!(Source::locate(&config, false), Some(Source::Stdin));

        config.source = Some("/srv/a.tar.gz".to_string());
        assert_eq!(
            Source::locate(&config, false),
            Some(Source::File(PathBuf::from("/srv/a.tar.gz")))
        );

        config.inline = Some("fd:3".to_string());
        assert_eq!(Source::locate(&config, true), Some(Source::Fd(3)));
    }

    #[test]
    fn empty_stdin_is_no_source() -> Result<(), Error> {
        let config = Config::default();
        assert_eq!(Source::acquire(&config, false, &b""[..])?, None);
        assert_eq!(Source::acquire(&config, true, &b"ignored"[..])?, None);

        let archive = codec::pack(&entries())?;
        assert_eq!(Source::acquire(&config, false, &archive[..])?, Some(archive.clone()));

        // A configured source is read without touching stdin
        let mut config = Config::default();
        config.source = Some(format!("X:{}", codec::encode_lines(&archive)));
        assert_eq!(Source::acquire(&config, false, &b""[..])?, Some(archive));
        Ok(())
    }

    #[test]
    fn inline_archive() -> Result<(), Error> {
        let text = codec::encode_lines(&codec::pack(&entries())?);
        let pack = Source::Inline(text).unpack()?;
        assert_eq!(pack.into_entries(), entries());
        Ok(())
    }

    #[test]
    fn descriptor_archive() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::tempfile()?;
        file.write_all(codec::encode_lines(&codec::pack(&entries())?).as_bytes())?;
        file.seek(SeekFrom::Start(0))?;

        let pack = Source::Fd(file.into_raw_fd()).unpack()?;
        assert_eq!(pack.len(), 2);
        assert!(pack.find("app/__init__.src").is_some());
        Ok(())
    }

    #[test]
    fn file_archive_and_bundle() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;

        let tarball = dir.path().join("a.tar.gz");
        fs::write(&tarball, codec::pack(&entries())?)?;
        assert_eq!(Source::File(tarball).unpack()?.into_entries(), entries());

        let stub = dir.path().join("a.pk");
        let pack = pkpack_core::Pack::new(entries());
        let mut out = Vec::new();
        Bundler::new(&pack).loader(&b"loader"[..]).write(&mut out)?;
        fs::write(&stub, out)?;

        let unpacked = Source::File(stub).unpack()?;
        assert_eq!(unpacked.len(), 3);
        assert_eq!(unpacked.read("pkpack"), Some(&b"loader"[..]));
        Ok(())
    }

    #[test]
    fn missing_file() {
        let err = Source::File(PathBuf::from("/nonexistent/a.tar.gz")).read().unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
