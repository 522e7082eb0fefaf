use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use pkpack_core::{candidates, Error, Pack, Payload, Resolver, Script, Unit, UnitKind};

use crate::anon;
use crate::native::NativeLibrary;

fn native_error(module: &str, reason: impl ToString) -> Error {
    Error::NativeLoad {
        module: module.to_string(),
        reason: reason.to_string(),
    }
}

/// Serves modules straight out of the archive
#[derive(Debug)]
pub struct PackResolver {
    pack: Rc<Pack>,
}

impl PackResolver {
    pub fn new(pack: Rc<Pack>) -> PackResolver {
        PackResolver { pack }
    }

    fn locate(&self, name: &str) -> Option<(Unit, &[u8])> {
        candidates(name).into_iter().find_map(|(path, kind)| {
            self.pack.find(&path).map(|found| {
                let unit = Unit {
                    path,
                    display: found.display.to_string(),
                    kind,
                };
                (unit, found.content)
            })
        })
    }
}

impl Resolver for PackResolver {
    fn resolve(&self, name: &str) -> Option<Unit> {
        self.locate(name).map(|(unit, _)| unit)
    }

    fn load(&self, name: &str, _unit: &Unit) -> Result<Payload, Error> {
        let (unit, content) = self
            .locate(name)
            .ok_or_else(|| Error::ModuleVanished(name.to_string()))?;

        match unit.kind {
            UnitKind::Package | UnitKind::Module => Ok(Payload::Source(
                Script::source_text(content, &unit.display)?.to_string(),
            )),
            UnitKind::Native => {
                eprintln!("load dynamic: {}", unit.display);
                let file = anon::materialize(content).map_err(|err| native_error(name, err))?;
                let library =
                    NativeLibrary::open_anon(file).map_err(|reason| native_error(name, reason))?;
                library.init().map_err(|reason| native_error(name, reason))?;
                Ok(Payload::Native(Box::new(library)))
            }
        }
    }
}

/// Ordinary on-disk resolution, consulted after the archive
#[derive(Debug)]
pub struct DirResolver {
    roots: Vec<PathBuf>,
}

impl DirResolver {
    pub fn new(roots: Vec<PathBuf>) -> DirResolver {
        DirResolver { roots }
    }
}

impl Resolver for DirResolver {
    fn resolve(&self, name: &str) -> Option<Unit> {
        let candidates = candidates(name);
        self.roots.iter().find_map(|root| {
            candidates.iter().find_map(|(path, kind)| {
                let full = root.join(path);
                if full.is_file() {
                    let full = full.to_string_lossy().into_owned();
                    Some(Unit {
                        path: full.clone(),
                        display: full,
                        kind: *kind,
                    })
                } else {
                    None
                }
            })
        })
    }

    fn load(&self, name: &str, unit: &Unit) -> Result<Payload, Error> {
        let vanished = |_| Error::ModuleVanished(name.to_string());
        match unit.kind {
            UnitKind::Package | UnitKind::Module => {
                let content = fs::read(&unit.path).map_err(vanished)?;
                Ok(Payload::Source(Script::source_text(&content, &unit.display)?.to_string()))
            }
            UnitKind::Native => {
                fs::metadata(&unit.path).map_err(vanished)?;
                let library =
                    NativeLibrary::open(&unit.path).map_err(|reason| native_error(name, reason))?;
                library.init().map_err(|reason| native_error(name, reason))?;
                Ok(Payload::Native(Box::new(library)))
            }
        }
    }
}
