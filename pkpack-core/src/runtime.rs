//! Module resolution: an ordered chain of resolvers plus the registry of
//! modules loaded so far.
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use crate::module::{parent_name, Module, ModuleRef, Value};
use crate::script::{Host, Script};
use crate::{Error, DISPLAY_ROOT, NATIVE_EXT, SOURCE_EXT};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitKind {
    /// `a/b/__init__.src`
    Package,
    /// `a/b.src`
    Module,
    /// `a/b.so`
    Native,
}

/// A dotted name that a resolver knows how to load
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unit {
    /// Path the resolver found the unit under
    pub path: String,
    /// Diagnostic path recorded as the module's `__file__`
    pub display: String,
    pub kind: UnitKind,
}

/// A materialized unit, ready to become a module
pub enum Payload {
    Source(String),
    /// Opaque handle keeping a native library loaded
    Native(Box<dyn Any>),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Payload::Source(code) => write!(f, "Payload::Source({} bytes)", code.len()),
            Payload::Native(_) => write!(f, "Payload::Native(_)"),
        }
    }
}

pub trait Resolver {
    /// Report whether `name` is loadable from here. Never fails; `None` lets
    /// the next resolver in the chain have a go.
    fn resolve(&self, name: &str) -> Option<Unit>;

    /// Materialize a unit previously returned by `resolve`.
    fn load(&self, name: &str, unit: &Unit) -> Result<Payload, Error>;
}

/// Relative paths probed for `name`, in priority order
pub fn candidates(name: &str) -> [(String, UnitKind); 3] {
    let base = name.replace('.', "/");
    [
        (format!("{}/__init__.{}", base, SOURCE_EXT), UnitKind::Package),
        (format!("{}.{}", base, SOURCE_EXT), UnitKind::Module),
        (format!("{}.{}", base, NATIVE_EXT), UnitKind::Native),
    ]
}

pub const MAIN_MODULE: &str = "__main__";

pub struct Runtime<W: Write> {
    resolvers: Vec<Rc<dyn Resolver>>,
    modules: BTreeMap<String, ModuleRef>,
    main: ModuleRef,
    out: W,
}

impl<W: Write> Runtime<W> {
    pub fn new(out: W) -> Runtime<W> {
        Runtime {
            resolvers: Vec::new(),
            modules: BTreeMap::new(),
            main: Module::new(MAIN_MODULE, DISPLAY_ROOT, false).into_ref(),
            out,
        }
    }

    /// Put `resolver` ahead of every resolver already installed
    pub fn install_front(&mut self, resolver: Rc<dyn Resolver>) {
        self.resolvers.insert(0, resolver);
    }

    /// Consult `resolver` after every resolver already installed
    pub fn install_back(&mut self, resolver: Rc<dyn Resolver>) {
        self.resolvers.push(resolver);
    }

    pub fn main(&self) -> &ModuleRef {
        &self.main
    }

    /// A module already in the registry
    pub fn module(&self, name: &str) -> Option<ModuleRef> {
        self.modules.get(name).cloned()
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn output_mut(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Evaluate `code` in the main namespace
    pub fn run_main(&mut self, code: &str, display: &str) -> Result<(), Error> {
        let script = Script::parse(code, display)?;
        let main = self.main.clone();
        script.exec(&main, self)
    }

    fn find(&self, name: &str) -> Option<(Rc<dyn Resolver>, Unit)> {
        self.resolvers
            .iter()
            .find_map(|resolver| resolver.resolve(name).map(|unit| (resolver.clone(), unit)))
    }

    /// Get-or-load `name`. Parents are imported first and each child is
    /// bound as an attribute of its parent.
    pub fn import(&mut self, name: &str) -> Result<ModuleRef, Error> {
        if let Some(module) = self.modules.get(name) {
            return Ok(module.clone());
        }

        let parent = match parent_name(name) {
            Some(parent) => Some(self.import(parent)?),
            None => None,
        };
        // The parent's body may have imported us already
        if let Some(module) = self.modules.get(name) {
            return Ok(module.clone());
        }

        let (resolver, unit) = self
            .find(name)
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))?;
        let payload = resolver.load(name, &unit)?;

        let mut module = Module::new(name, &unit.display, unit.kind == UnitKind::Package);
        let script = match payload {
            Payload::Source(code) => Some(Script::parse(&code, &unit.display)?),
            Payload::Native(handle) => {
                module.native = Some(handle);
                None
            }
        };
        let module = module.into_ref();

        // Registered before running so cyclic imports see the module
        self.modules.insert(name.to_string(), module.clone());
        if let Some(script) = script {
            if let Err(err) = script.exec(&module, self) {
                self.modules.remove(name);
                return Err(err);
            }
        }

        if let Some(parent) = parent {
            let leaf = name.rsplit('.').next().unwrap_or(name);
            parent.borrow_mut().set(leaf, Value::Module(module.clone()));
        }
        Ok(module)
    }
}

impl<W: Write> Host for Runtime<W> {
    fn import(&mut self, name: &str) -> Result<ModuleRef, Error> {
        Runtime::import(self, name)
    }

    fn print(&mut self, line: &str) -> Result<(), Error> {
        writeln!(self.out, "{}", line)?;
        Ok(())
    }
}

impl<W: Write> fmt::Debug for Runtime<W> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("resolvers", &self.resolvers.len())
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}
