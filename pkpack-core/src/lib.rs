pub use crate::entry::Entry;
pub use crate::error::{Error, ScriptErrorKind};
pub use crate::module::{Module, ModuleRef, Namespace, Value};
pub use crate::pack::{normalize, Found, Pack};
pub use crate::runtime::{candidates, Payload, Resolver, Runtime, Unit, UnitKind, MAIN_MODULE};
pub use crate::script::{quote, Host, Script};

mod entry;
mod error;
pub mod module;
mod pack;
mod runtime;
mod script;


/// Extension of compiled-in-process source units
pub const SOURCE_EXT: &str = "src";
/// Extension of native shared-object units
pub const NATIVE_EXT: &str = "so";
/// Prefix of every display path; never a real directory
pub const DISPLAY_ROOT: &str = "<pack>";

/// Entry holding the default entry-point assignment
pub const SPEC_ENTRY: &str = "pack.spec";
/// Variable `pack.spec` binds to the default entry path
pub const SPEC_VAR: &str = "__pk_entry__";
/// Entry holding the loader image itself
pub const LOADER_ENTRY: &str = "pkpack";
/// Entry printed when the bundle runs without arguments
pub const README_ENTRY: &str = "readme.txt";
