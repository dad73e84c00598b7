use crate::runtime::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type Env = Rc<RefCell<Environment>>;

/// One lexical scope: bindings, namespace bindings for imported modules,
/// and a link to the enclosing scope. Scopes are reference-counted so a
/// closure keeps its defining environment alive after the scope exits.
#[derive(Debug, Default)]
pub struct Environment {
    enclosing: Option<Env>,
    values: HashMap<String, Value>,
    namespaces: HashMap<String, Env>,
}

impl Environment {
    pub fn new() -> Env {
        Rc::new(RefCell::new(Environment::default()))
    }

    pub fn with_enclosing(enclosing: &Env) -> Env {
        Rc::new(RefCell::new(Environment {
            enclosing: Some(Rc::clone(enclosing)),
            ..Default::default()
        }))
    }

    /// Inserts into the current scope only. Redefining a name in the same
    /// scope overwrites the previous binding.
    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn define_namespace(&mut self, name: &str, namespace: Env) {
        self.namespaces.insert(name.to_string(), namespace);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.values.get(name) {
            return Some(value.clone());
        }
        self.enclosing
            .as_ref()
            .and_then(|enclosing| enclosing.borrow().get(name))
    }

    /// Walks the chain outward; returns false when no binding exists
    /// anywhere, leaving the chain untouched.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        if let Some(slot) = self.values.get_mut(name) {
            *slot = value;
            return true;
        }
        match &self.enclosing {
            Some(enclosing) => enclosing.borrow_mut().assign(name, value),
            None => false,
        }
    }

    pub fn get_namespace(&self, name: &str) -> Option<Env> {
        if let Some(namespace) = self.namespaces.get(name) {
            return Some(Rc::clone(namespace));
        }
        self.enclosing
            .as_ref()
            .and_then(|enclosing| enclosing.borrow().get_namespace(name))
    }
}
