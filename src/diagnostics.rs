use crate::language::errors::{SyntaxError, SyntaxErrors};
use crate::runtime::error::RuntimeError;
use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("{message}")]
pub struct SyntaxDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("here")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
}

impl SyntaxDiagnostic {
    pub fn from_error(src: NamedSource<String>, err: &SyntaxError) -> Self {
        Self {
            src,
            span: err.to_source_span(),
            help: err.help.clone(),
            message: err.message.clone(),
        }
    }
}

pub fn emit_syntax_errors(name: &str, source: &str, errors: &SyntaxErrors) {
    let src = NamedSource::new(name, source.to_string());
    for err in &errors.errors {
        let diagnostic = SyntaxDiagnostic::from_error(src.clone(), err);
        eprintln!("{:?}", Report::new(diagnostic));
    }
}

/// Prints the error with its source position and the captured call
/// chain, innermost call first.
pub fn report_runtime_error(error: &RuntimeError) {
    match &error.token {
        Some(token) => eprintln!(
            "Runtime error: {} [{}:{}]",
            error.kind, token.file, token.line
        ),
        None => eprintln!("Runtime error: {}", error.kind),
    }
    for frame in error.trace.iter().rev() {
        eprintln!("  in {} [{}:{}]", frame.callable, frame.file, frame.line);
    }
}

pub fn report_io_error(path: &str, error: &std::io::Error) {
    eprintln!("Failed to access {path}: {error}");
}
