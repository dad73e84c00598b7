use crate::language::token::Token;
use crate::runtime::value::Callable;
use std::rc::Rc;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Clone, Debug, Error)]
pub enum RuntimeErrorKind {
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Undefined namespace '{name}'")]
    UndefinedNamespace { name: String },
    #[error("{message}")]
    TypeMismatch { message: String },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Expected {expected} arguments but got {received}")]
    ArityMismatch { expected: usize, received: usize },
    #[error("Can only call functions")]
    NotCallable,
    #[error("Index out of bounds")]
    IndexOutOfBounds,
    #[error("Key not found in map")]
    KeyNotFound,
    #[error("Slice bounds out of range")]
    SliceOutOfBounds,
    #[error("Precondition failed{}", contract_suffix(.message))]
    PreconditionFailed { message: Option<String> },
    #[error("Postcondition failed{}", contract_suffix(.message))]
    PostconditionFailed { message: Option<String> },
    #[error("Assertion failed{}", contract_suffix(.message))]
    AssertionFailed { message: Option<String> },
    #[error("Circular import of '{path}'")]
    CircularImport { path: String },
    #[error("Could not import '{path}': {reason}")]
    ImportFailed { path: String, reason: String },
    #[error("{message}")]
    NativeCall { message: String },
}

fn contract_suffix(message: &Option<String>) -> String {
    match message {
        Some(message) => format!(": {message}"),
        None => ".".to_string(),
    }
}

/// A runtime failure: what went wrong, the token it anchors to (absent
/// for errors raised inside native functions), and the call-stack
/// snapshot captured at the first call boundary it crossed.
#[derive(Clone, Debug, Error)]
#[error("{kind}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub token: Option<Token>,
    pub trace: Vec<CallFrame>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, token: Token) -> Self {
        Self {
            kind,
            token: Some(token),
            trace: Vec::new(),
        }
    }

    pub fn bare(kind: RuntimeErrorKind) -> Self {
        Self {
            kind,
            token: None,
            trace: Vec::new(),
        }
    }

    pub fn undefined_variable(name: &Token) -> Self {
        Self::new(
            RuntimeErrorKind::UndefinedVariable {
                name: name.lexeme.clone(),
            },
            name.clone(),
        )
    }

    pub fn undefined_namespace(name: &Token) -> Self {
        Self::new(
            RuntimeErrorKind::UndefinedNamespace {
                name: name.lexeme.clone(),
            },
            name.clone(),
        )
    }

    pub fn type_mismatch(message: impl Into<String>, token: &Token) -> Self {
        Self::new(
            RuntimeErrorKind::TypeMismatch {
                message: message.into(),
            },
            token.clone(),
        )
    }
}

/// One in-flight invocation, recorded for diagnostic traces.
#[derive(Clone, Debug)]
pub struct CallFrame {
    pub callable: Callable,
    pub line: usize,
    pub file: Rc<str>,
}
