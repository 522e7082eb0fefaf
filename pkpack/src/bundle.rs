//! Self-executing bundles.
//!
//! A bundle is a POSIX `sh` script carrying two base64 heredocs: the gzip'd
//! loader image, which the script writes to a temporary file and `exec`s,
//! and the gzip'd tar of the entry table, which reaches the loader on
//! descriptor 3.
use std::env;
use std::fs;
use std::io::Write;

use pkpack_core::{quote, Entry, Pack, LOADER_ENTRY, SPEC_ENTRY, SPEC_VAR};

use crate::config::{INLINE_VAR, LOADER_TMP_VAR};
use crate::{codec, wrap_io_err, Error};

const LOADER_MARK: &str = "PKPACK_LOADER";
const ARCHIVE_MARK: &str = "PKPACK_ARCHIVE";
const STUB_TAG: &str = "# pkpack bundle";
/// Descriptor the stub feeds the archive heredoc on
const ARCHIVE_FD: u32 = 3;

/// The running loader executable
pub fn loader_image() -> Result<Vec<u8>, Error> {
    match fs::read("/proc/self/exe") {
        Ok(image) => Ok(image),
        Err(_) => {
            let exe = env::current_exe().map_err(wrap_io_err!("Locating loader executable"))?;
            fs::read(&exe).map_err(wrap_io_err!(exe, "Reading loader executable"))
        }
    }
}

/// The `pack.spec` entry declaring `path` as the default entry point
pub fn spec_entry(path: &str) -> Entry {
    Entry::new(SPEC_ENTRY, format!("{} = {}\n", SPEC_VAR, quote(path)))
}

pub struct Bundler<'a> {
    pack: &'a Pack,
    entry: Option<String>,
    loader: Option<Vec<u8>>,
}

impl<'a> Bundler<'a> {
    pub fn new(pack: &'a Pack) -> Bundler<'a> {
        Bundler {
            pack,
            entry: None,
            loader: None,
        }
    }

    /// Declare the default entry point
    pub fn entry(mut self, path: impl Into<String>) -> Bundler<'a> {
        self.entry = Some(path.into());
        self
    }

    /// Loader image to embed when the table does not already carry one.
    /// Defaults to [`loader_image`].
    pub fn loader(mut self, image: impl Into<Vec<u8>>) -> Bundler<'a> {
        self.loader = Some(image.into());
        self
    }

    /// A copy of the table with the loader and `pack.spec` entries added
    pub fn finish_pack(&self) -> Result<Pack, Error> {
        let mut pack = self.pack.clone();
        if !pack.has_entry(LOADER_ENTRY) {
            let image = match &self.loader {
                Some(image) => image.clone(),
                None => loader_image()?,
            };
            pack.push(Entry::new(LOADER_ENTRY, image));
        }
        if let Some(path) = &self.entry {
            pack.replace_or_push(spec_entry(path));
        }
        Ok(pack)
    }

    pub fn to_stub(&self) -> Result<String, Error> {
        let pack = self.finish_pack()?;
        let loader = pack
            .entries()
            .iter()
            .find(|entry| entry.path() == LOADER_ENTRY)
            .map(Entry::content)
            .unwrap_or_default();

        let archive = codec::pack(pack.entries())?;
        crate::verbose!(
            "bundle: {} entries, archive {} bytes, blake3 {}",
            pack.len(),
            archive.len(),
            blake3::hash(&archive).to_hex()
        );
        let loader = codec::encode_lines(&codec::gzip(loader)?);
        let archive = codec::encode_lines(&archive);

        Ok(format!(
            "#!/bin/sh\n\
             {tag}\n\
             pk_loader=$(mktemp \"${{TMPDIR:-/tmp}}/pkpack.XXXXXX\") || exit 1\n\
             base64 -d <<'{lmark}' | gzip -dc >\"$pk_loader\" || exit 1\n\
             {loader}\n\
             {lmark}\n\
             chmod 700 \"$pk_loader\"\n\
             {inline}=fd:{fd} {tmp}=\"$pk_loader\" exec \"$pk_loader\" \"$@\" {fd}<<'{amark}'\n\
             {archive}\n\
             {amark}\n",
            tag = STUB_TAG,
            lmark = LOADER_MARK,
            amark = ARCHIVE_MARK,
            inline = INLINE_VAR,
            tmp = LOADER_TMP_VAR,
            fd = ARCHIVE_FD,
            loader = loader,
            archive = archive,
        ))
    }

    pub fn write<W: Write>(&self, out: &mut W) -> Result<(), Error> {
        let stub = self.to_stub()?;
        out.write_all(stub.as_bytes())
            .map_err(wrap_io_err!("Writing bundle"))?;
        out.flush().map_err(wrap_io_err!("Writing bundle"))
    }
}

/// Body of the heredoc opened with `<<'mark'`. The opener may be followed
/// by the rest of a pipeline on its line.
fn section<'t>(text: &'t str, mark: &str) -> Option<&'t str> {
    let opener = format!("<<'{}'", mark);
    let mut offset = 0;
    let mut start = None;
    for line in text.split_inclusive('\n') {
        let bare = line.trim_end();
        match start {
            None if bare.contains(&opener) => start = Some(offset + line.len()),
            Some(begin) if bare == mark => return Some(&text[begin..offset]),
            _ => {}
        }
        offset += line.len();
    }
    None
}

/// Whether `data` looks like a bundle stub rather than a raw archive
pub fn is_stub(data: &[u8]) -> bool {
    data.starts_with(b"#!")
        && std::str::from_utf8(data)
            .map(|text| section(text, ARCHIVE_MARK).is_some())
            .unwrap_or(false)
}

/// The gzip'd tar carried by a stub
pub fn archive_bytes(stub: &str) -> Result<Vec<u8>, Error> {
    let text = section(stub, ARCHIVE_MARK)
        .ok_or_else(|| Error::decode("not a pkpack bundle: no archive section"))?;
    codec::decode_text(text)
}

/// The loader image carried by a stub
pub fn loader_bytes(stub: &str) -> Result<Vec<u8>, Error> {
    let text = section(stub, LOADER_MARK)
        .ok_or_else(|| Error::decode("not a pkpack bundle: no loader section"))?;
    codec::gunzip(&codec::decode_text(text)?)
}

/// Recover the entry table from a stub
pub fn decode(stub: &str) -> Result<Vec<Entry>, Error> {
    codec::unpack(&archive_bytes(stub)?)
}
