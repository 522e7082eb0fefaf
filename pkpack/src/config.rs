//! Environment-driven configuration
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

use lazy_static::lazy_static;

/// Source reference baked into a bundle's stub
pub const INLINE_VAR: &str = "PKPACK_INLINE";
/// User-supplied source reference
pub const SOURCE_VAR: &str = "pk";
/// Temporary copy of the loader written by the stub
pub const LOADER_TMP_VAR: &str = "PKPACK_LOADER_TMP";
pub const SHELL_VAR: &str = "PKPACK_SHELL";
/// Colon separated directories searched after the archive
pub const PATH_VAR: &str = "PKPACK_PATH";
pub const VERBOSE_VAR: &str = "PKPACK_VERBOSE";

pub const DEFAULT_SHELL: &str = "/bin/bash";

lazy_static! {
    static ref VERBOSE: bool = env::var_os(VERBOSE_VAR)
        .map(|v| !v.is_empty())
        .unwrap_or(false);
}

pub fn verbose() -> bool {
    *VERBOSE
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub inline: Option<String>,
    pub source: Option<String>,
    pub loader_tmp: Option<PathBuf>,
    pub shell: PathBuf,
    pub search_path: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            inline: None,
            source: None,
            loader_tmp: None,
            shell: PathBuf::from(DEFAULT_SHELL),
            search_path: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Config {
        Config::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Config {
        let get = |name| lookup(name).filter(|v| !v.is_empty());

        let mut config = Config {
            inline: get(INLINE_VAR),
            source: get(SOURCE_VAR),
            loader_tmp: get(LOADER_TMP_VAR).map(PathBuf::from),
            ..Config::default()
        };
        if let Some(shell) = get(SHELL_VAR) {
            config.shell = PathBuf::from(shell);
        }
        if let Some(path) = get(PATH_VAR) {
            config.search_path = path
                .split(':')
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        config
    }

    /// Keep stub-private variables away from child processes and delete the
    /// stub's temporary loader copy. The running image stays reachable
    /// through `/proc/self/exe`.
    pub fn scrub_env(&self) {
        env::remove_var(INLINE_VAR);
        env::remove_var(LOADER_TMP_VAR);

        if let Some(tmp) = &self.loader_tmp {
            match fs::remove_file(tmp) {
                Ok(()) => crate::verbose!("removed loader copy {}", tmp.display()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => crate::verbose!("could not remove {}: {}", tmp.display(), err),
            }
        }
    }
}
