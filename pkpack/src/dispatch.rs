//! Running an archive: pick an entry, then print it, evaluate it in-process
//! or hand it to an external interpreter.
use std::fs::File;
use std::io::{self, Write};
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::rc::Rc;

use pkpack_core::{
    Error as CoreError, Pack, Resolver, Runtime, Script, Value, SOURCE_EXT, SPEC_ENTRY, SPEC_VAR,
};

use crate::config::{Config, DEFAULT_SHELL};
use crate::resolver::{DirResolver, PackResolver};
use crate::{wrap_io_err, Error};

/// Content that asks to be executed rather than printed
pub fn is_executable(content: &[u8]) -> bool {
    content.starts_with(b"#!/")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub code: i32,
}

impl Outcome {
    pub const SUCCESS: Outcome = Outcome { code: 0 };
}

/// The entry a run settled on
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    /// Index key the entry was found under
    pub key: String,
    pub display: String,
    /// Whether the first argument named the entry
    pub consumed: bool,
}

pub struct Dispatcher<W: Write> {
    pack: Rc<Pack>,
    runtime: Runtime<W>,
    shell: PathBuf,
}

impl<W: Write> Dispatcher<W> {
    /// A dispatcher whose runtime resolves modules from `pack` first
    pub fn new(pack: Rc<Pack>, out: W) -> Dispatcher<W> {
        let mut runtime = Runtime::new(out);
        runtime.install_front(Rc::new(PackResolver::new(pack.clone())));
        Dispatcher {
            pack,
            runtime,
            shell: PathBuf::from(DEFAULT_SHELL),
        }
    }

    pub fn with_config(pack: Rc<Pack>, out: W, config: &Config) -> Dispatcher<W> {
        let mut dispatcher = Dispatcher::new(pack, out).shell(&config.shell);
        if !config.search_path.is_empty() {
            dispatcher.install_back(Rc::new(DirResolver::new(config.search_path.clone())));
        }
        dispatcher
    }

    /// Interpreter for executable entries that are not source units
    pub fn shell(mut self, shell: impl Into<PathBuf>) -> Dispatcher<W> {
        self.shell = shell.into();
        self
    }

    pub fn install_back(&mut self, resolver: Rc<dyn Resolver>) {
        self.runtime.install_back(resolver);
    }

    pub fn pack(&self) -> &Pack {
        &self.pack
    }

    pub fn runtime(&self) -> &Runtime<W> {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime<W> {
        &mut self.runtime
    }

    pub fn into_output(self) -> W {
        self.runtime.into_output()
    }

    /// Evaluate `pack.spec`, when present, in the main namespace
    pub fn load_spec(&mut self) -> Result<(), Error> {
        let pack = self.pack.clone();
        if let Some(found) = pack.find(SPEC_ENTRY) {
            crate::verbose!("evaluating {}", found.display);
            let code = Script::source_text(found.content, found.display)?;
            self.runtime.run_main(code, found.display)?;
        }
        Ok(())
    }

    /// The first argument when it names an entry, otherwise the declared
    /// default.
    pub fn select(&self, args: &[String]) -> Result<Selection, Error> {
        if let Some(first) = args.first() {
            if let Some(found) = self.pack.find(first) {
                return Ok(Selection {
                    key: first.clone(),
                    display: found.display.to_string(),
                    consumed: true,
                });
            }
        }

        let default = self
            .runtime
            .main()
            .borrow()
            .get(SPEC_VAR)
            .and_then(Value::as_str)
            .map(str::to_string);
        match default {
            Some(key) => match self.pack.find(&key) {
                Some(found) => Ok(Selection {
                    display: found.display.to_string(),
                    key,
                    consumed: false,
                }),
                None => Err(CoreError::EntryNotFound(key).into()),
            },
            None => Err(CoreError::EntryNotFound(args.first().cloned().unwrap_or_default()).into()),
        }
    }

    pub fn run(&mut self, args: &[String]) -> Result<Outcome, Error> {
        self.load_spec()?;
        let selection = self.select(args)?;
        let rest = if selection.consumed { &args[1..] } else { args };

        let pack = self.pack.clone();
        let found = pack.find_or_err(&selection.key)?;

        if !is_executable(found.content) {
            crate::verbose!("printing {}", found.display);
            let out = self.runtime.output_mut();
            out.write_all(found.content)
                .map_err(wrap_io_err!(found.display, "Writing entry"))?;
            out.flush().map_err(wrap_io_err!("Flushing output"))?;
            return Ok(Outcome::SUCCESS);
        }

        let is_source = Path::new(&selection.key)
            .extension()
            .map_or(false, |ext| ext == SOURCE_EXT);
        if is_source {
            crate::verbose!("running {} in-process", found.display);
            {
                let main = self.runtime.main();
                let mut main = main.borrow_mut();
                let argv = std::iter::once(selection.key.as_str())
                    .chain(rest.iter().map(String::as_str))
                    .map(Value::from)
                    .collect();
                main.set("argv", Value::List(argv));
                main.set("__file__", Value::from(found.display));
            }
            let code = Script::source_text(found.content, found.display)?;
            self.runtime.run_main(code, found.display)?;
            self.runtime
                .output_mut()
                .flush()
                .map_err(wrap_io_err!("Flushing output"))?;
            Ok(Outcome::SUCCESS)
        } else {
            crate::verbose!("handing {} to {}", found.display, self.shell.display());
            self.handoff(found.content, rest)
        }
    }

    /// Run `script` under the configured shell, fed through a pipe the
    /// child sees as `/dev/fd/<n>`.
    pub fn handoff(&mut self, script: &[u8], args: &[String]) -> Result<Outcome, Error> {
        self.runtime
            .output_mut()
            .flush()
            .map_err(wrap_io_err!("Flushing output"))?;

        let (read, mut write) = pipe()?;
        let mut child = Command::new(&self.shell)
            .arg(format!("/dev/fd/{}", read.as_raw_fd()))
            .args(args)
            .spawn()
            .map_err(|source| Error::Spawn {
                source,
                shell: self.shell.clone(),
            })?;
        drop(read);

        match write.write_all(script) {
            Ok(()) => {}
            // The interpreter stopped reading early; its status says why
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {}
            Err(err) => crate::verbose!("writing script to interpreter: {}", err),
        }
        drop(write);

        let status = child
            .wait()
            .map_err(wrap_io_err!(self.shell, "Waiting for interpreter"))?;
        Ok(Outcome {
            code: exit_code(status),
        })
    }
}

/// A close-on-exec pipe whose read end is inheritable
fn pipe() -> Result<(OwnedFd, File), Error> {
    let mut fds = [0; 2];
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error()).map_err(wrap_io_err!("Creating pipe"));
    }
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) };

    let fd = read.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 || unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error()).map_err(wrap_io_err!("Clearing close-on-exec"));
    }
    Ok((read, write))
}

fn exit_code(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}
