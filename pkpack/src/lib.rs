mod anon;
pub mod bundle;
pub mod codec;
pub mod config;
mod dispatch;
pub mod ext;
mod native;
mod resolver;
pub mod source;

pub use anon::{materialize, AnonFile};
pub use bundle::Bundler;
pub use config::Config;
pub use dispatch::{is_executable, Dispatcher, Outcome, Selection};
pub use native::{LoadError, NativeLibrary};
pub use resolver::{DirResolver, PackResolver};

pub use pkpack_core as core;

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Usage text printed when no archive source can be found
pub const USAGE: &str = "\
pkpack: self-executing bundle loader

    tar zc *.src -O | pkpack --pack entry.src >app.pk
    curl -s $r/a.tar.gz | pkpack ...
    pk=$r/a.tar.gz pkpack ...
";

#[derive(thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] pkpack_core::Error),

    #[error("{context}{}", .path.as_ref().map(|p| format!(": {}", p.display())).unwrap_or_default())]
    Io {
        #[source]
        source: io::Error,
        path: Option<PathBuf>,
        context: &'static str,
    },

    #[error("Decode: {reason}")]
    Decode { reason: String },

    #[error("Invalid listing pattern")]
    Pattern(#[from] regex::Error),

    #[error("Failed to run interpreter {}", .shell.display())]
    Spawn {
        #[source]
        source: io::Error,
        shell: PathBuf,
    },
}

impl Error {
    pub(crate) fn decode(reason: impl fmt::Display) -> Error {
        Error::Decode {
            reason: reason.to_string(),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{self}")?;

        let mut source = self.source();
        while let Some(err) = source {
            writeln!(f, "\tCaused by: {err}")?;
            source = err.source();
        }

        Ok(())
    }
}

/// Build a closure mapping an `io::Error` into [`Error::Io`], with an
/// optional path for context.
#[macro_export]
macro_rules! wrap_io_err {
    ($path:expr, $context:expr) => {
        |source| $crate::Error::Io {
            source,
            path: Some(::std::path::PathBuf::from(&$path)),
            context: $context,
        }
    };
    ($context:expr) => {
        |source| $crate::Error::Io {
            source,
            path: None,
            context: $context,
        }
    };
}

/// Print a diagnostic line on stderr when `PKPACK_VERBOSE` is set
#[macro_export]
macro_rules! verbose {
    ($($arg:tt)*) => {
        if $crate::config::verbose() {
            eprintln!("pkpack: {}", format_args!($($arg)*));
        }
    };
}
