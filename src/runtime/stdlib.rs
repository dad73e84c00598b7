use crate::runtime::environment::Env;
use crate::runtime::error::{RuntimeError, RuntimeErrorKind, RuntimeResult};
use crate::runtime::interpreter::Interpreter;
use crate::runtime::value::{Callable, ListValue, NativeFunction, Value};
use rand::Rng;
use std::fs;
use std::io::{self, BufRead};
use std::time::{SystemTime, UNIX_EPOCH};

/// Installs the native registry into an environment. Both the global
/// scope and every aliased-import namespace get the same set.
pub fn register(env: &Env) {
    let mut env = env.borrow_mut();
    for native in NATIVES {
        env.define(native.name, Value::Callable(Callable::Native(*native)));
    }
}

const NATIVES: &[NativeFunction] = &[
    NativeFunction {
        name: "input",
        arity: 0,
        func: native_input,
    },
    NativeFunction {
        name: "len",
        arity: 1,
        func: native_len,
    },
    NativeFunction {
        name: "clock",
        arity: 0,
        func: native_clock,
    },
    NativeFunction {
        name: "_keys",
        arity: 1,
        func: native_keys,
    },
    NativeFunction {
        name: "_values",
        arity: 1,
        func: native_values,
    },
    NativeFunction {
        name: "_read",
        arity: 1,
        func: native_read,
    },
    NativeFunction {
        name: "_write",
        arity: 2,
        func: native_write,
    },
    NativeFunction {
        name: "_random",
        arity: 0,
        func: native_random,
    },
];

fn native_error(message: impl Into<String>) -> RuntimeError {
    RuntimeError::bare(RuntimeErrorKind::NativeCall {
        message: message.into(),
    })
}

fn native_input(_interpreter: &mut Interpreter, _args: Vec<Value>) -> RuntimeResult<Value> {
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|err| native_error(format!("Error reading input: {err}")))?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Value::String(line))
}

fn native_len(_interpreter: &mut Interpreter, mut args: Vec<Value>) -> RuntimeResult<Value> {
    match args.remove(0) {
        Value::List(list) => Ok(Value::Number(list.len() as f64)),
        Value::String(text) => Ok(Value::Number(text.chars().count() as f64)),
        other => Err(native_error(format!(
            "Expected a list or string but got {}.",
            other.type_name()
        ))),
    }
}

fn native_clock(_interpreter: &mut Interpreter, _args: Vec<Value>) -> RuntimeResult<Value> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| native_error(format!("Clock error: {err}")))?;
    Ok(Value::Number(now.as_secs_f64()))
}

fn native_keys(_interpreter: &mut Interpreter, mut args: Vec<Value>) -> RuntimeResult<Value> {
    match args.remove(0) {
        Value::Map(map) => Ok(Value::List(ListValue::new(map.keys()))),
        other => Err(native_error(format!(
            "Expected a map but got {}.",
            other.type_name()
        ))),
    }
}

fn native_values(_interpreter: &mut Interpreter, mut args: Vec<Value>) -> RuntimeResult<Value> {
    match args.remove(0) {
        Value::Map(map) => Ok(Value::List(ListValue::new(map.values()))),
        other => Err(native_error(format!(
            "Expected a map but got {}.",
            other.type_name()
        ))),
    }
}

fn native_read(_interpreter: &mut Interpreter, mut args: Vec<Value>) -> RuntimeResult<Value> {
    let path = match args.remove(0) {
        Value::String(path) => path,
        other => {
            return Err(native_error(format!(
                "Expected a file path string but got {}.",
                other.type_name()
            )))
        }
    };
    fs::read_to_string(&path)
        .map(Value::String)
        .map_err(|err| native_error(format!("Error reading file: {err}")))
}

fn native_write(_interpreter: &mut Interpreter, mut args: Vec<Value>) -> RuntimeResult<Value> {
    let content = match args.pop() {
        Some(Value::String(content)) => content,
        other => {
            return Err(native_error(format!(
                "Expected content string but got {}.",
                other.map(|v| v.type_name()).unwrap_or("nothing")
            )))
        }
    };
    let path = match args.pop() {
        Some(Value::String(path)) => path,
        other => {
            return Err(native_error(format!(
                "Expected a file path string but got {}.",
                other.map(|v| v.type_name()).unwrap_or("nothing")
            )))
        }
    };
    fs::write(&path, content).map_err(|err| native_error(format!("Error writing file: {err}")))?;
    Ok(Value::Nil)
}

fn native_random(_interpreter: &mut Interpreter, _args: Vec<Value>) -> RuntimeResult<Value> {
    Ok(Value::Number(rand::thread_rng().gen::<f64>()))
}

/// Resolved module: the canonical name used for re-lexing and circular
/// import tracking, plus the raw source.
pub struct ModuleSource {
    pub canonical: String,
    pub source: String,
}

pub trait ModuleLoader {
    fn load(&self, path: &str) -> Result<ModuleSource, String>;
}

const STD_PREFIX: &str = "std/";

const BUNDLED_MODULES: &[(&str, &str)] = &[
    ("std/math", include_str!("../../stdlib/math.quill")),
    ("std/lists", include_str!("../../stdlib/lists.quill")),
];

/// Production loader: `std/` paths resolve against the embedded bundle,
/// everything else against the filesystem.
pub struct FileLoader;

impl ModuleLoader for FileLoader {
    fn load(&self, path: &str) -> Result<ModuleSource, String> {
        if path.starts_with(STD_PREFIX) {
            for (name, source) in BUNDLED_MODULES {
                if *name == path {
                    return Ok(ModuleSource {
                        canonical: (*name).to_string(),
                        source: (*source).to_string(),
                    });
                }
            }
            return Err(format!("'{path}' is not in the bundled library"));
        }

        let canonical = fs::canonicalize(path).map_err(|err| err.to_string())?;
        let source = fs::read_to_string(&canonical).map_err(|err| err.to_string())?;
        Ok(ModuleSource {
            canonical: canonical.display().to_string(),
            source,
        })
    }
}
