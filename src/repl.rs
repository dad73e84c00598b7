use crate::diagnostics;
use crate::language::parser::{parse_source, ParseMode};
use crate::runtime::Interpreter;
use std::io::{self, BufRead, Write};

/// Line-based prompt. Declarations persist between lines; top-level
/// expression values are echoed on the diagnostic channel by the
/// interpreter itself. Syntax errors never poison the next line.
pub fn run() {
    let mut interpreter = Interpreter::new(true);
    let stdin = io::stdin();
    println!("Quill REPL. Ctrl-D exits.");

    loop {
        print!("> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => {
                println!("Exiting prompt.");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                eprintln!("Error reading input: {err}");
                break;
            }
        }
        if line.trim().is_empty() {
            continue;
        }

        match parse_source(&line, "repl", ParseMode::Script) {
            Ok(statements) => {
                if let Err(err) = interpreter.interpret(&statements) {
                    diagnostics::report_runtime_error(&err);
                }
            }
            Err(errors) => diagnostics::emit_syntax_errors("repl", &line, &errors),
        }
    }
}
