use crate::language::ast::FunctionDecl;
use crate::runtime::environment::Env;
use crate::runtime::error::RuntimeResult;
use crate::runtime::interpreter::Interpreter;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Nil,
    Number(f64),
    Bool(bool),
    String(String),
    List(ListValue),
    Map(MapValue),
    Callable(Callable),
}

impl Value {
    /// `nil`, `false`, and numeric zero are falsy; everything else,
    /// including empty strings and empty collections, is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Callable(_) => "function",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::String(s) => write!(f, "{s}"),
            Value::List(list) => {
                write!(f, "[")?;
                for (idx, value) in list.items.borrow().iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                let mut first = true;
                for (key, value) in map.entries.borrow().iter() {
                    if !first {
                        write!(f, ", ")?;
                    }
                    first = false;
                    write!(f, "{}: {}", key.to_value(), value)?;
                }
                write!(f, "}}")
            }
            Value::Callable(callable) => write!(f, "{callable}"),
        }
    }
}

/// Lists alias: assigning a list copies the handle, not the elements.
#[derive(Clone, Debug)]
pub struct ListValue {
    pub items: Rc<RefCell<Vec<Value>>>,
}

impl ListValue {
    pub fn new(items: Vec<Value>) -> Self {
        Self {
            items: Rc::new(RefCell::new(items)),
        }
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.borrow().get(index).cloned()
    }

    pub fn concat(&self, other: &ListValue) -> ListValue {
        let mut items = self.items.borrow().clone();
        items.extend(other.items.borrow().iter().cloned());
        ListValue::new(items)
    }
}

impl PartialEq for ListValue {
    fn eq(&self, other: &Self) -> bool {
        *self.items.borrow() == *other.items.borrow()
    }
}

#[derive(Clone, Debug)]
pub struct MapValue {
    pub entries: Rc<RefCell<HashMap<MapKey, Value>>>,
}

impl MapValue {
    pub fn new(entries: HashMap<MapKey, Value>) -> Self {
        Self {
            entries: Rc::new(RefCell::new(entries)),
        }
    }

    pub fn get(&self, key: &MapKey) -> Option<Value> {
        self.entries.borrow().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.borrow().keys().map(MapKey::to_value).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.borrow().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialEq for MapValue {
    fn eq(&self, other: &Self) -> bool {
        *self.entries.borrow() == *other.entries.borrow()
    }
}

/// The hashable projection of a value used as a map key. Aggregates and
/// callables are rejected at insertion/lookup; `-0.0` folds onto `0.0`
/// and NaN is never a key, so structural equality and hashing agree.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MapKey {
    Nil,
    Bool(bool),
    Number(u64),
    String(String),
}

impl MapKey {
    pub fn from_value(value: &Value) -> Option<MapKey> {
        match value {
            Value::Nil => Some(MapKey::Nil),
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::Number(n) if !n.is_nan() => {
                let normalized = if *n == 0.0 { 0.0 } else { *n };
                Some(MapKey::Number(normalized.to_bits()))
            }
            Value::String(s) => Some(MapKey::String(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Nil => Value::Nil,
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Number(bits) => Value::Number(f64::from_bits(*bits)),
            MapKey::String(s) => Value::String(s.clone()),
        }
    }
}

#[derive(Clone)]
pub enum Callable {
    Function(Rc<Function>),
    Native(NativeFunction),
}

impl Callable {
    pub fn arity(&self) -> usize {
        match self {
            Callable::Function(function) => function.declaration.params.len(),
            Callable::Native(native) => native.arity,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Callable::Function(function) => &function.declaration.name.lexeme,
            Callable::Native(native) => native.name,
        }
    }

    fn same_identity(&self, other: &Callable) -> bool {
        match (self, other) {
            (Callable::Function(a), Callable::Function(b)) => Rc::ptr_eq(a, b),
            (Callable::Native(a), Callable::Native(b)) => a.name == b.name,
            _ => false,
        }
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        self.same_identity(other)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Function(function) => {
                write!(f, "<fn {}>", function.declaration.name.lexeme)
            }
            Callable::Native(native) => write!(f, "<native fn {}>", native.name),
        }
    }
}

/// A user function: its declaration plus the environment captured at the
/// definition site. Calls bind parameters in a fresh child of `closure`.
pub struct Function {
    pub declaration: Rc<FunctionDecl>,
    pub closure: Env,
}

#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub func: fn(&mut Interpreter, Vec<Value>) -> RuntimeResult<Value>,
}
