use std::error;
use std::io;
use std::fmt::{Display, Formatter, Result};

/// What went wrong while evaluating a pkscript unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptErrorKind {
    Syntax(String),
    UndefinedName(String),
    NoAttribute { module: String, name: String },
    Type(String),
    /// Source bytes that are not UTF-8
    Encoding(String),
}

impl Display for ScriptErrorKind {
    fn fmt(&self, f: &mut Formatter) -> Result {
        use ScriptErrorKind::*;

        match self {
            Syntax(msg) => write!(f, "syntax error: {}", msg),
            UndefinedName(name) => write!(f, "name '{}' is not defined", name),
            NoAttribute { module, name } => {
                write!(f, "module '{}' has no attribute '{}'", module, name)
            }
            Type(msg) => write!(f, "type error: {}", msg),
            Encoding(msg) => write!(f, "invalid UTF-8: {}", msg),
        }
    }
}

#[derive(Debug)]
pub enum Error {
    /// A file was requested from the archive but is not in it
    FileNotFound(String),
    /// Neither the requested entry nor the declared default exist
    EntryNotFound(String),
    /// No resolver in the chain knows this dotted name
    ModuleNotFound(String),
    /// A resolver reported the name, then could not load it
    ModuleVanished(String),
    NativeLoad {
        module: String,
        reason: String,
    },
    Script {
        file: String,
        line: usize,
        kind: ScriptErrorKind,
    },
    /// Writing program output failed
    Io(io::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> Result {
        use Error::*;

        match self {
            FileNotFound(path) => write!(f, "not found file in pack: {}", path),
            EntryNotFound(path) if path.is_empty() => {
                write!(f, "no entry given and no default entry declared")
            }
            EntryNotFound(path) => write!(f, "{} not found!", path),
            ModuleNotFound(name) => write!(f, "no module named '{}'", name),
            ModuleVanished(name) => write!(f, "not found module in pack: {}", name),
            NativeLoad { module, reason } => {
                write!(f, "failed to load native module '{}': {}", module, reason)
            }
            Script { file, line, kind } => write!(f, "{}:{}: {}", file, line, kind),
            Io(err) => write!(f, "Io: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}
