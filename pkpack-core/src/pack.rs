//! The in-memory archive: an ordered entry table plus an alias-aware path
//! index over it.
use std::collections::HashMap;
use std::fmt;

use crate::{Entry, Error, DISPLAY_ROOT};

/// Join `path` onto `/`. Already rooted paths are returned unchanged.
pub fn normalize(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Drop the first segment of a rooted path: `/a/b/c` becomes `/b/c`.
/// Returns `None` once there is no further separator to strip to.
fn strip_first_segment(path: &str) -> Option<&str> {
    path.get(1..)
        .and_then(|rest| rest.find('/'))
        .map(|idx| &path[idx + 1..])
}

/// The result of a successful [`Pack::find`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Found<'a> {
    /// Synthetic `<pack>/...` path; diagnostic only, never opened
    pub display: &'a str,
    /// The entry's path as stored in the table
    pub path: &'a str,
    pub content: &'a [u8],
}

#[derive(Clone, Debug)]
struct IndexSlot {
    display: String,
    position: usize,
}

#[derive(Clone, Default)]
pub struct Pack {
    entries: Vec<Entry>,
    index: HashMap<String, IndexSlot>,
}

impl Pack {
    pub fn new(entries: Vec<Entry>) -> Pack {
        let mut pack = Pack {
            entries,
            index: HashMap::new(),
        };
        pack.build_index();
        pack
    }

    /// Walking the table backwards means the earliest entry performs the
    /// last write for any key it shares, so it wins alias collisions.
    fn build_index(&mut self) {
        self.index.clear();
        for (position, entry) in self.entries.iter().enumerate().rev() {
            let full = normalize(&entry.path);
            let display = format!("{}{}", DISPLAY_ROOT, full);

            let mut key = full.as_str();
            loop {
                self.index.insert(
                    key.to_string(),
                    IndexSlot {
                        display: display.clone(),
                        position,
                    },
                );
                match strip_first_segment(key) {
                    Some(shorter) => key = shorter,
                    None => break,
                }
            }
        }
    }

    pub fn find(&self, key: &str) -> Option<Found<'_>> {
        self.index.get(&normalize(key)).map(|slot| {
            let entry = &self.entries[slot.position];
            Found {
                display: &slot.display,
                path: &entry.path,
                content: &entry.content,
            }
        })
    }

    pub fn find_or_err(&self, key: &str) -> Result<Found<'_>, Error> {
        self.find(key)
            .ok_or_else(|| Error::FileNotFound(key.to_string()))
    }

    pub fn read(&self, key: &str) -> Option<&[u8]> {
        self.find(key).map(|found| found.content)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(&normalize(key))
    }

    /// Original entry paths (never aliases) under `prefix`
    pub fn list<'a>(&'a self, prefix: &str) -> impl Iterator<Item = &'a str> + 'a {
        let prefix = normalize(prefix);
        self.entries
            .iter()
            .filter(move |entry| normalize(&entry.path).starts_with(&prefix))
            .map(|entry| entry.path.as_str())
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if an entry is stored under exactly this path, ignoring aliases
    pub fn has_entry(&self, path: &str) -> bool {
        self.entries.iter().any(|entry| entry.path == path)
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
        self.build_index();
    }

    /// Overwrite the content of the entry stored under `entry.path`, or
    /// append it if there is none.
    pub fn replace_or_push(&mut self, entry: Entry) {
        match self.entries.iter_mut().find(|e| e.path == entry.path) {
            Some(existing) => existing.content = entry.content,
            None => self.entries.push(entry),
        }
        self.build_index();
    }
}

impl fmt::Debug for Pack {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Pack(cnt={})", self.entries.len())
    }
}
