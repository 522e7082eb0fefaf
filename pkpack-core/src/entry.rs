//! One archived file, as unpacked from the bundle's tarball
use core::fmt::{self, Display};

use blake3::Hash;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// Archive-relative path, exactly as stored
    pub path: String,
    /// File contents
    pub content: Vec<u8>,
}

impl Entry {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Entry {
        Entry {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn blake3(&self) -> Hash {
        blake3::hash(&self.content)
    }
}

impl Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "path={:?} hash={} size={}",
            self.path,
            self.blake3().to_hex(),
            self.size()
        )
    }
}
