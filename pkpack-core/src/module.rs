//! Module records and the values their namespaces hold
use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

pub type ModuleRef = Rc<RefCell<Module>>;
pub type Namespace = BTreeMap<String, Value>;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Module(ModuleRef),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Module(_) => "module",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Int(i)
    }
}

/// `print` formatting
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match item {
                        Value::Str(s) => write!(f, "{:?}", s)?,
                        other => write!(f, "{}", other)?,
                    }
                }
                write!(f, "]")
            }
            Value::Module(module) => match module.try_borrow() {
                Ok(module) => write!(f, "<module '{}' from '{}'>", module.name, module.file),
                Err(_) => write!(f, "<module>"),
            },
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            // Modules can reference each other; don't recurse
            other => write!(f, "{}", other),
        }
    }
}

/// A loaded unit of code
pub struct Module {
    /// Dotted name, e.g. `app.mod`
    pub name: String,
    /// Display path the module was loaded from
    pub file: String,
    /// `__package__`: the name itself for packages, the parent otherwise
    pub package: String,
    pub is_package: bool,
    pub namespace: Namespace,
    /// Keeps a native library mapped for as long as the module lives
    pub native: Option<Box<dyn Any>>,
}

impl Module {
    pub fn new(name: &str, file: &str, is_package: bool) -> Module {
        let package = if is_package {
            name.to_string()
        } else {
            parent_name(name).unwrap_or("").to_string()
        };

        let mut namespace = Namespace::new();
        namespace.insert("__name__".to_string(), Value::from(name));
        namespace.insert("__file__".to_string(), Value::from(file));
        namespace.insert("__package__".to_string(), Value::from(package.as_str()));

        Module {
            name: name.to_string(),
            file: file.to_string(),
            package,
            is_package,
            namespace,
            native: None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.namespace.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.namespace.insert(name.into(), value);
    }

    pub fn into_ref(self) -> ModuleRef {
        Rc::new(RefCell::new(self))
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("file", &self.file)
            .field("package", &self.package)
            .field("is_package", &self.is_package)
            .field("names", &self.namespace.keys().collect::<Vec<_>>())
            .field("native", &self.native.is_some())
            .finish()
    }
}

/// `a.b.c` -> `a.b`; `None` for a top-level name
pub fn parent_name(name: &str) -> Option<&str> {
    name.rfind('.').map(|idx| &name[..idx])
}

#[cfg(test)]
mod tests {
    use super::{parent_name, Module, Value};

    #[test]
    fn package_identity() {
        let pkg = Module::new("app", "<pack>/app/__init__.src", true);
        assert_eq!(pkg.package, "app");
        assert_eq!(pkg.get("__package__"), Some(&Value::from("app")));

        let module = Module::new("app.mod", "<pack>/app/mod.src", false);
        assert_eq!(module.package, "app");

        let top = Module::new("top", "<pack>/top.src", false);
        assert_eq!(top.package, "");
    }

    #[test]
    fn parents() {
        assert_eq!(parent_name("a.b.c"), Some("a.b"));
        assert_eq!(parent_name("a"), None);
    }

    #[test]
    fn display_values() {
        assert_eq!(Value::Int(3).to_string(), "3");
        assert_eq!(Value::Bool(false).to_string(), "False");
        let list = Value::List(vec![Value::from("x"), Value::Int(1)]);
        assert_eq!(list.to_string(), "[\"x\", 1]");
    }
}
