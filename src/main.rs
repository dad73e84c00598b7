use quill_lang::diagnostics;
use quill_lang::language::parser::{parse_source, ParseMode};
use quill_lang::repl;
use quill_lang::runtime::Interpreter;
use quill_lang::tools::ast_printer;
use std::env;
use std::fs;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    match args.len() {
        1 => repl::run(),
        2 => run_file(&args[1], ParseMode::Script),
        3 if args[1] == "--test" => run_file(&args[2], ParseMode::Test),
        3 if args[1] == "--ast" => print_ast(&args[2]),
        _ => {
            eprintln!("Usage: quill-lang [--test | --ast] <script.quill>");
            process::exit(64);
        }
    }
}

fn load_source(filename: &str) -> String {
    if !filename.ends_with(".quill") {
        eprintln!("Invalid file extension. Only .quill files are allowed.");
        process::exit(64);
    }
    match fs::read_to_string(filename) {
        Ok(source) => source,
        Err(err) => {
            diagnostics::report_io_error(filename, &err);
            process::exit(66);
        }
    }
}

fn run_file(filename: &str, mode: ParseMode) {
    let source = load_source(filename);
    let statements = match parse_source(&source, filename, mode) {
        Ok(statements) => statements,
        Err(errors) => {
            diagnostics::emit_syntax_errors(filename, &source, &errors);
            process::exit(65);
        }
    };

    let mut interpreter = Interpreter::new(false);
    let result = interpreter.interpret(&statements);
    if let Err(err) = &result {
        diagnostics::report_runtime_error(err);
    }
    interpreter.print_test_results();
    if result.is_err() {
        process::exit(70);
    }
}

fn print_ast(filename: &str) {
    let source = load_source(filename);
    // Test mode so `test` blocks show up in the tree too.
    match parse_source(&source, filename, ParseMode::Test) {
        Ok(statements) => print!("{}", ast_printer::print_program(&statements)),
        Err(errors) => {
            diagnostics::emit_syntax_errors(filename, &source, &errors);
            process::exit(65);
        }
    }
}
