//! Extension traits for base types defined in `pkpack-core`.
use pkpack_core::Pack;
use regex::Regex;

use crate::Error;

pub trait PackExt {
    /// Entry paths (never aliases) whose beginning matches `pattern`, in
    /// pack order.
    fn matching(&self, pattern: &str) -> Result<Vec<&str>, Error>;

    /// [`PackExt::matching`] joined by single spaces
    fn ls(&self, pattern: &str) -> Result<String, Error> {
        Ok(self.matching(pattern)?.join(" "))
    }
}

impl PackExt for Pack {
    fn matching(&self, pattern: &str) -> Result<Vec<&str>, Error> {
        let regex = Regex::new(&format!("^(?:{})", pattern))?;
        Ok(self
            .entries()
            .iter()
            .map(|entry| entry.path())
            .filter(|path| regex.is_match(path))
            .collect())
    }
}
