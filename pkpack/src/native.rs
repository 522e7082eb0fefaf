//! `dlopen`-backed native units
use std::ffi::{c_void, CStr, CString};
use std::fmt;
use std::os::raw::c_int;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::anon::AnonFile;

/// Optional initializer a native unit may export; non-zero means failure
pub const INIT_SYMBOL: &str = "pk_module_init";

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("invalid {what}: {source}")]
    InvalidName {
        what: &'static str,
        #[source]
        source: std::ffi::NulError,
    },

    #[error("{}: {reason}", .path.display())]
    Open { path: PathBuf, reason: String },

    #[error("{symbol} returned {code}")]
    Init { symbol: &'static str, code: c_int },
}

fn dlerror() -> String {
    let err_ptr = unsafe { libc::dlerror() };
    if err_ptr.is_null() {
        "Unknown error".to_string()
    } else {
        unsafe { CStr::from_ptr(err_ptr) }
            .to_string_lossy()
            .into_owned()
    }
}

pub struct NativeLibrary {
    handle: *mut c_void,
    path: PathBuf,
    /// Descriptor backing `path` when loaded from memory
    backing: Option<AnonFile>,
}

impl NativeLibrary {
    /// `dlopen(RTLD_NOW | RTLD_LOCAL)` a library by path
    pub fn open(path: impl AsRef<Path>) -> Result<NativeLibrary, LoadError> {
        let path = path.as_ref().to_path_buf();
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|source| LoadError::InvalidName { what: "path", source })?;

        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(LoadError::Open {
                reason: dlerror(),
                path,
            });
        }

        Ok(NativeLibrary {
            handle,
            path,
            backing: None,
        })
    }

    /// Load from an anonymous file, taking ownership of its descriptor
    pub fn open_anon(anon: AnonFile) -> Result<NativeLibrary, LoadError> {
        let mut library = NativeLibrary::open(anon.path())?;
        library.backing = Some(anon);
        Ok(library)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a symbol; `None` when the library does not export it.
    pub fn symbol(&self, name: &str) -> Result<Option<*mut c_void>, LoadError> {
        let c_name = CString::new(name)
            .map_err(|source| LoadError::InvalidName { what: "symbol name", source })?;
        let symbol = unsafe {
            // Clear any previous error
            libc::dlerror();
            libc::dlsym(self.handle, c_name.as_ptr())
        };
        Ok(if symbol.is_null() { None } else { Some(symbol) })
    }

    /// Run [`INIT_SYMBOL`] if the library exports it
    pub fn init(&self) -> Result<(), LoadError> {
        if let Some(symbol) = self.symbol(INIT_SYMBOL)? {
            type InitFn = extern "C" fn() -> c_int;
            let init: InitFn = unsafe { std::mem::transmute::<*mut c_void, InitFn>(symbol) };
            let code = init();
            if code != 0 {
                return Err(LoadError::Init {
                    symbol: INIT_SYMBOL,
                    code,
                });
            }
        }
        Ok(())
    }
}

impl Drop for NativeLibrary {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle);
        }
    }
}

impl fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("path", &self.path)
            .field("anonymous", &self.backing.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use super::{LoadError, NativeLibrary};
    use crate::anon::materialize;
    use crate::anon::tests::fds_on;

    /// A system library that sits next to the C library this binary uses
    fn system_library(name: &str) -> Option<PathBuf> {
        let maps = fs::read_to_string("/proc/self/maps").ok()?;
        maps.lines()
            .filter_map(|line| line.split_whitespace().nth(5))
            .find(|path| path.contains("/libc.so") || path.contains("/libc-"))
            .map(|libc| Path::new(libc).with_file_name(name))
            .filter(|path| path.is_file())
    }

    #[test]
    fn rejects_non_libraries() {
        let anon = materialize(b"definitely not an ELF object").unwrap();
        match NativeLibrary::open_anon(anon) {
            Err(LoadError::Open { path, .. }) => assert!(path.starts_with("/proc/self/fd/")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_path() {
        assert!(matches!(
            NativeLibrary::open("/nonexistent/libpk.so"),
            Err(LoadError::Open { .. })
        ));
        assert!(matches!(
            NativeLibrary::open("nul\0byte.so"),
            Err(LoadError::InvalidName { .. })
        ));
    }

    #[test]
    fn loads_a_shared_object_from_memory() {
        let path = system_library("libm.so.6").expect("libm next to libc");
        let image = fs::read(&path).unwrap();

        let anon = materialize(&image).unwrap();
        let watcher = fs::File::open(anon.path()).unwrap();
        assert_eq!(fds_on(&watcher), 2);

        let library = NativeLibrary::open_anon(anon).unwrap();
        assert!(library.path().starts_with("/proc/self/fd/"));
        assert!(library.symbol("cos").unwrap().is_some());
        assert!(library.symbol("pk_no_such_symbol").unwrap().is_none());
        // libm exports no initializer, so this is a no-op
        library.init().unwrap();
        // dlopen's own descriptor is closed once the object is mapped
        assert_eq!(fds_on(&watcher), 2);

        drop(library);
        assert_eq!(fds_on(&watcher), 1);
    }
}
