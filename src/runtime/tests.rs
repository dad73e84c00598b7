use crate::language::parser::{parse_source, ParseMode};
use crate::runtime::error::{RuntimeError, RuntimeErrorKind};
use crate::runtime::interpreter::Interpreter;
use crate::runtime::stdlib::{ModuleLoader, ModuleSource};
use crate::runtime::value::{ListValue, Value};
use pretty_assertions::assert_eq;
use std::collections::HashMap;

fn run_mode(source: &str, mode: ParseMode) -> (Interpreter, Result<(), RuntimeError>) {
    let statements = parse_source(source, "test.quill", mode).expect("program should parse");
    let mut interpreter = Interpreter::new(false);
    let result = interpreter.interpret(&statements);
    (interpreter, result)
}

fn run(source: &str) -> (Interpreter, Result<(), RuntimeError>) {
    run_mode(source, ParseMode::Script)
}

fn eval_ok(source: &str) -> Interpreter {
    let (interpreter, result) = run(source);
    if let Err(err) = result {
        panic!("program failed: {err}");
    }
    interpreter
}

fn eval_err(source: &str) -> RuntimeError {
    let (_, result) = run(source);
    result.expect_err("program should fail")
}

fn global(interpreter: &Interpreter, name: &str) -> Value {
    interpreter
        .lookup(name)
        .unwrap_or_else(|| panic!("global `{name}` not defined"))
}

fn number_list(values: &[f64]) -> Value {
    Value::List(ListValue::new(
        values.iter().map(|n| Value::Number(*n)).collect(),
    ))
}

struct MemoryLoader {
    modules: HashMap<String, String>,
}

impl MemoryLoader {
    fn new(modules: &[(&str, &str)]) -> Self {
        Self {
            modules: modules
                .iter()
                .map(|(name, source)| (name.to_string(), source.to_string()))
                .collect(),
        }
    }
}

impl ModuleLoader for MemoryLoader {
    fn load(&self, path: &str) -> Result<ModuleSource, String> {
        self.modules
            .get(path)
            .map(|source| ModuleSource {
                canonical: path.to_string(),
                source: source.clone(),
            })
            .ok_or_else(|| format!("module '{path}' not found"))
    }
}

fn run_with_modules(
    source: &str,
    modules: &[(&str, &str)],
) -> (Interpreter, Result<(), RuntimeError>) {
    let statements =
        parse_source(source, "test.quill", ParseMode::Script).expect("program should parse");
    let mut interpreter = Interpreter::with_loader(false, Box::new(MemoryLoader::new(modules)));
    let result = interpreter.interpret(&statements);
    (interpreter, result)
}

#[test]
fn arithmetic_matches_double_precision() {
    let interpreter = eval_ok("var x = (3 + 4) * 2; var y = 7 / 2; var z = 10 % 3;");
    assert_eq!(global(&interpreter, "x"), Value::Number(14.0));
    assert_eq!(global(&interpreter, "y"), Value::Number(3.5));
    assert_eq!(global(&interpreter, "z"), Value::Number(1.0));
}

#[test]
fn division_and_modulo_by_zero_fail_for_any_left_operand() {
    let err = eval_err("var x = 1 / 0;");
    assert!(matches!(err.kind, RuntimeErrorKind::DivisionByZero));
    let err = eval_err("var x = 0 / 0;");
    assert!(matches!(err.kind, RuntimeErrorKind::DivisionByZero));
    let err = eval_err("var x = 42 % 0;");
    assert!(matches!(err.kind, RuntimeErrorKind::DivisionByZero));
}

#[test]
fn truthiness_table() {
    let interpreter = eval_ok(
        "var t1 = \"\" ? 1 : 2;\n\
         var t2 = 0.5 ? 1 : 2;\n\
         var t3 = [] ? 1 : 2;\n\
         var t4 = {} ? 1 : 2;\n\
         var f1 = nil ? 1 : 2;\n\
         var f2 = false ? 1 : 2;\n\
         var f3 = 0 ? 1 : 2;",
    );
    for truthy in ["t1", "t2", "t3", "t4"] {
        assert_eq!(global(&interpreter, truthy), Value::Number(1.0), "{truthy}");
    }
    for falsy in ["f1", "f2", "f3"] {
        assert_eq!(global(&interpreter, falsy), Value::Number(2.0), "{falsy}");
    }
}

#[test]
fn mixed_plus_concatenates_through_string_conversion() {
    let interpreter = eval_ok(
        "var s = \"x\" + 3; var t = 3 + \"x\"; var u = \"n=\" + 2.5; var v = \"is \" + nil;",
    );
    assert_eq!(global(&interpreter, "s"), Value::String("x3".into()));
    assert_eq!(global(&interpreter, "t"), Value::String("3x".into()));
    assert_eq!(global(&interpreter, "u"), Value::String("n=2.5".into()));
    assert_eq!(global(&interpreter, "v"), Value::String("is nil".into()));
}

#[test]
fn list_concatenation_builds_a_new_list() {
    let interpreter = eval_ok("var l = [1, 2] + [3];");
    assert_eq!(global(&interpreter, "l"), number_list(&[1.0, 2.0, 3.0]));
}

#[test]
fn plus_on_unrelated_types_is_an_error() {
    let err = eval_err("var x = [1] + 2;");
    assert!(matches!(err.kind, RuntimeErrorKind::TypeMismatch { .. }));
}

#[test]
fn comparisons_require_numbers() {
    let err = eval_err("var x = \"a\" < 1;");
    assert!(matches!(err.kind, RuntimeErrorKind::TypeMismatch { .. }));
}

#[test]
fn assignment_to_undefined_name_fails() {
    let err = eval_err("x = 1;");
    match err.kind {
        RuntimeErrorKind::UndefinedVariable { name } => assert_eq!(name, "x"),
        other => panic!("expected undefined variable, got {other}"),
    }
}

#[test]
fn assignment_in_nested_scope_mutates_the_outer_binding() {
    let interpreter = eval_ok("var x = 1; { x = 2; } var y = x;");
    assert_eq!(global(&interpreter, "y"), Value::Number(2.0));
}

#[test]
fn closures_capture_the_definition_environment() {
    let interpreter = eval_ok(
        "fun make(n) {\n\
             fun inner() { return n; }\n\
             return inner;\n\
         }\n\
         var f = make(7);\n\
         var got = f();",
    );
    assert_eq!(global(&interpreter, "got"), Value::Number(7.0));
}

#[test]
fn closures_share_mutable_captured_state() {
    let interpreter = eval_ok(
        "fun counter() {\n\
             var count = 0;\n\
             fun tick() { count = count + 1; return count; }\n\
             return tick;\n\
         }\n\
         var tick = counter();\n\
         tick();\n\
         var second = tick();",
    );
    assert_eq!(global(&interpreter, "second"), Value::Number(2.0));
}

#[test]
fn recursive_calls_keep_their_own_locals() {
    let interpreter = eval_ok(
        "fun fib(n) {\n\
             if (n < 2) { return n; }\n\
             return fib(n - 1) + fib(n - 2);\n\
         }\n\
         var got = fib(10);",
    );
    assert_eq!(global(&interpreter, "got"), Value::Number(55.0));
}

#[test]
fn arity_mismatch_names_expected_and_actual() {
    let err = eval_err("fun f(a, b) { return a; } f(1);");
    match err.kind {
        RuntimeErrorKind::ArityMismatch { expected, received } => {
            assert_eq!(expected, 2);
            assert_eq!(received, 1);
        }
        other => panic!("expected arity mismatch, got {other}"),
    }
}

#[test]
fn calling_a_non_callable_value_fails() {
    let err = eval_err("42();");
    assert!(matches!(err.kind, RuntimeErrorKind::NotCallable));
}

#[test]
fn failed_precondition_blocks_the_body() {
    let (interpreter, result) = run(
        "var ran = false;\n\
         fun f(x) precondition: x > 0 { ran = true; return x; }\n\
         f(-1);",
    );
    let err = result.expect_err("precondition should fail");
    assert!(matches!(
        err.kind,
        RuntimeErrorKind::PreconditionFailed { .. }
    ));
    assert!(!err.trace.is_empty(), "error crossed a call boundary");
    assert_eq!(global(&interpreter, "ran"), Value::Bool(false));
}

#[test]
fn precondition_carries_its_custom_message() {
    let err = eval_err(
        "fun f(x) precondition: x > 0, \"x must be positive\" { return x; }\n\
         f(0);",
    );
    match err.kind {
        RuntimeErrorKind::PreconditionFailed { message } => {
            assert_eq!(message.as_deref(), Some("x must be positive"));
        }
        other => panic!("expected precondition failure, got {other}"),
    }
}

#[test]
fn contract_clauses_stop_at_the_first_failure() {
    let (interpreter, result) = run(
        "var probe = 0;\n\
         fun g(x) precondition: x > 0, (probe = 1) == 99 { return x; }\n\
         g(-1);",
    );
    assert!(result.is_err());
    // The second clause never evaluated.
    assert_eq!(global(&interpreter, "probe"), Value::Number(0.0));
}

#[test]
fn failed_postcondition_fires_after_side_effects() {
    let (interpreter, result) = run(
        "var log = \"\";\n\
         fun f() postcondition: result > 0 { log = log + \"ran\"; return -1; }\n\
         f();",
    );
    let err = result.expect_err("postcondition should fail");
    assert!(matches!(
        err.kind,
        RuntimeErrorKind::PostconditionFailed { .. }
    ));
    assert_eq!(global(&interpreter, "log"), Value::String("ran".into()));
}

#[test]
fn postcondition_sees_the_return_value_as_result() {
    let interpreter = eval_ok(
        "fun double(x) postcondition: result == x * 2 { return x * 2; }\n\
         var got = double(3);",
    );
    assert_eq!(global(&interpreter, "got"), Value::Number(6.0));
}

#[test]
fn assertion_statement_failure_is_fatal() {
    let err = eval_err("assertion: 1 > 2, \"boom\";");
    match err.kind {
        RuntimeErrorKind::AssertionFailed { message } => {
            assert_eq!(message.as_deref(), Some("boom"));
        }
        other => panic!("expected assertion failure, got {other}"),
    }
}

#[test]
fn passing_assertion_and_failing_check_do_not_abort() {
    let interpreter = eval_ok(
        "assertion: 1 < 2;\n\
         check: 1 > 2, \"only a warning\";\n\
         var after = 5;",
    );
    assert_eq!(global(&interpreter, "after"), Value::Number(5.0));
}

#[test]
fn break_unwinds_to_the_nearest_loop() {
    let interpreter = eval_ok(
        "var i = 0;\n\
         while (true) {\n\
             i = i + 1;\n\
             if (i == 3) { break; }\n\
         }",
    );
    assert_eq!(global(&interpreter, "i"), Value::Number(3.0));
}

#[test]
fn for_loop_desugar_runs_initializer_condition_and_increment() {
    let interpreter = eval_ok(
        "var sum = 0;\n\
         for (var i = 0; i < 4; i = i + 1) { sum = sum + i; }",
    );
    assert_eq!(global(&interpreter, "sum"), Value::Number(6.0));
}

#[test]
fn return_unwinds_out_of_loops_to_the_call() {
    let interpreter = eval_ok(
        "fun f() {\n\
             while (true) { return 42; }\n\
         }\n\
         var got = f();",
    );
    assert_eq!(global(&interpreter, "got"), Value::Number(42.0));
}

#[test]
fn function_without_return_yields_nil() {
    let interpreter = eval_ok("fun f() { var x = 1; } var got = f();");
    assert_eq!(global(&interpreter, "got"), Value::Nil);
}

const UTIL_MODULE: &str = "var shared = 1;\nfun helper() { return shared + 1; }";

#[test]
fn flat_import_merges_declarations_into_the_importing_scope() {
    let (interpreter, result) = run_with_modules(
        "import \"util\";\nvar got = helper();\nvar s = shared;",
        &[("util", UTIL_MODULE)],
    );
    result.expect("import should run");
    assert_eq!(global(&interpreter, "got"), Value::Number(2.0));
    assert_eq!(global(&interpreter, "s"), Value::Number(1.0));
}

#[test]
fn aliased_import_isolates_declarations_in_a_namespace() {
    let (interpreter, result) = run_with_modules(
        "import \"util\" as util;\nvar got = util::helper();\nvar s = util::shared;",
        &[("util", UTIL_MODULE)],
    );
    result.expect("import should run");
    assert_eq!(global(&interpreter, "got"), Value::Number(2.0));
    assert_eq!(global(&interpreter, "s"), Value::Number(1.0));
    assert!(
        interpreter.lookup("helper").is_none(),
        "aliased imports must not leak into the importing scope"
    );
}

#[test]
fn imports_admit_only_declarations() {
    let (interpreter, result) = run_with_modules(
        "import \"m\";\nvar got = x;",
        &[("m", "print \"boom\";\nassertion: 1 > 2;\nvar x = 5;")],
    );
    result.expect("non-declaration statements are dropped, not run");
    assert_eq!(global(&interpreter, "got"), Value::Number(5.0));
}

#[test]
fn circular_imports_are_detected() {
    let (_, result) = run_with_modules(
        "import \"a\";",
        &[("a", "import \"b\";"), ("b", "import \"a\";")],
    );
    let err = result.expect_err("cycle should be detected");
    assert!(matches!(err.kind, RuntimeErrorKind::CircularImport { .. }));

    let (_, result) = run_with_modules("import \"self\";", &[("self", "import \"self\";")]);
    assert!(matches!(
        result.expect_err("self import is a cycle").kind,
        RuntimeErrorKind::CircularImport { .. }
    ));
}

#[test]
fn missing_import_target_is_reported() {
    let (_, result) = run_with_modules("import \"nope\";", &[]);
    let err = result.expect_err("missing module");
    assert!(matches!(err.kind, RuntimeErrorKind::ImportFailed { .. }));
}

#[test]
fn nested_imports_resolve_inside_an_aliased_namespace() {
    let (interpreter, result) = run_with_modules(
        "import \"outer\" as o;\nvar got = o::both();",
        &[
            ("outer", "import \"inner\";\nfun both() { return base + 1; }"),
            ("inner", "var base = 10;"),
        ],
    );
    result.expect("nested import should run");
    assert_eq!(global(&interpreter, "got"), Value::Number(11.0));
}

#[test]
fn test_blocks_record_outcomes_without_aborting_the_program() {
    let (interpreter, result) = run_mode(
        "test \"adds\" { var x = 1 + 1; }\n\
         test \"fails\" { assertion: 1 > 2, \"nope\"; }\n\
         var after_tests = 1;",
        ParseMode::Test,
    );
    result.expect("test failures never abort the program");
    assert_eq!(global(&interpreter, "after_tests"), Value::Number(1.0));

    let results = interpreter.test_results();
    assert_eq!(results.len(), 2);
    assert!(results[0].passed);
    assert_eq!(results[0].name, "adds");
    assert!(!results[1].passed);
    assert_eq!(results[1].name, "fails");
    assert!(
        results[1]
            .message
            .as_deref()
            .unwrap_or_default()
            .contains("nope"),
        "failure records carry the error message"
    );
}

#[test]
fn test_blocks_are_discarded_outside_test_mode() {
    let (interpreter, result) = run("test \"adds\" { assertion: 1 > 2; }");
    result.expect("discarded tests cannot fail");
    assert!(interpreter.test_results().is_empty());
}

#[test]
fn indexing_lists_strings_and_maps() {
    let interpreter = eval_ok(
        "var l = [10, 20, 30];\n\
         var a = l[1];\n\
         var s = l[0:2];\n\
         var text = \"hello\";\n\
         var c = text[1];\n\
         var sub = text[1:3];\n\
         var m = {\"k\": 1, 2: \"two\", nil: true};\n\
         var mk = m[\"k\"];\n\
         var m2 = m[2];\n\
         var mn = m[nil];",
    );
    assert_eq!(global(&interpreter, "a"), Value::Number(20.0));
    assert_eq!(global(&interpreter, "s"), number_list(&[10.0, 20.0]));
    assert_eq!(global(&interpreter, "c"), Value::String("e".into()));
    assert_eq!(global(&interpreter, "sub"), Value::String("el".into()));
    assert_eq!(global(&interpreter, "mk"), Value::Number(1.0));
    assert_eq!(global(&interpreter, "m2"), Value::String("two".into()));
    assert_eq!(global(&interpreter, "mn"), Value::Bool(true));
}

#[test]
fn out_of_range_access_is_an_error_not_a_crash() {
    assert!(matches!(
        eval_err("var x = [1, 2][5];").kind,
        RuntimeErrorKind::IndexOutOfBounds
    ));
    assert!(matches!(
        eval_err("var x = [1, 2][0:3];").kind,
        RuntimeErrorKind::SliceOutOfBounds
    ));
    assert!(matches!(
        eval_err("var x = \"abc\"[2:1];").kind,
        RuntimeErrorKind::SliceOutOfBounds
    ));
    assert!(matches!(
        eval_err("var m = {\"k\": 1}; var x = m[\"nope\"];").kind,
        RuntimeErrorKind::KeyNotFound
    ));
    assert!(matches!(
        eval_err("var x = nil[0];").kind,
        RuntimeErrorKind::TypeMismatch { .. }
    ));
}

#[test]
fn aggregate_map_keys_are_rejected() {
    let err = eval_err("var m = {[1]: 2};");
    assert!(matches!(err.kind, RuntimeErrorKind::TypeMismatch { .. }));
}

#[test]
fn map_helpers_expose_keys_and_values() {
    let interpreter = eval_ok(
        "var m = {\"a\": 1, \"b\": 2};\n\
         var ks = len(_keys(m));\n\
         var vs = len(_values(m));",
    );
    assert_eq!(global(&interpreter, "ks"), Value::Number(2.0));
    assert_eq!(global(&interpreter, "vs"), Value::Number(2.0));
}

#[test]
fn len_counts_lists_and_strings() {
    let interpreter = eval_ok("var a = len(\"abc\"); var b = len([1, 2]);");
    assert_eq!(global(&interpreter, "a"), Value::Number(3.0));
    assert_eq!(global(&interpreter, "b"), Value::Number(2.0));
}

#[test]
fn clock_and_random_produce_numbers() {
    let interpreter = eval_ok("var t = clock(); var r = _random();");
    match global(&interpreter, "t") {
        Value::Number(t) => assert!(t > 0.0),
        other => panic!("expected number, got {other}"),
    }
    match global(&interpreter, "r") {
        Value::Number(r) => assert!((0.0..1.0).contains(&r)),
        other => panic!("expected number, got {other}"),
    }
}

#[test]
fn native_errors_pick_up_the_call_site_and_trace() {
    let err = eval_err("len(5);");
    assert!(matches!(err.kind, RuntimeErrorKind::NativeCall { .. }));
    assert!(err.token.is_some(), "call site token attached");
    assert_eq!(err.trace.len(), 1);
}

#[test]
fn bundled_math_module_is_importable() {
    let interpreter = eval_ok(
        "import \"std/math\";\n\
         var a = abs(-3);\n\
         var mx = max(2, 5);\n\
         var cl = clamp(12, 0, 10);",
    );
    assert_eq!(global(&interpreter, "a"), Value::Number(3.0));
    assert_eq!(global(&interpreter, "mx"), Value::Number(5.0));
    assert_eq!(global(&interpreter, "cl"), Value::Number(10.0));
}

#[test]
fn bundled_lists_module_works_behind_an_alias() {
    let interpreter = eval_ok(
        "import \"std/lists\" as lists;\n\
         var has = lists::contains([1, 2], 2);\n\
         var idx = lists::index_of([1, 2], 5);\n\
         var rev = lists::reverse([1, 2, 3]);\n\
         var rng = lists::range(0, 3);",
    );
    assert_eq!(global(&interpreter, "has"), Value::Bool(true));
    assert_eq!(global(&interpreter, "idx"), Value::Number(-1.0));
    assert_eq!(global(&interpreter, "rev"), number_list(&[3.0, 2.0, 1.0]));
    assert_eq!(global(&interpreter, "rng"), number_list(&[0.0, 1.0, 2.0]));
}

#[test]
fn ternary_evaluates_both_branches_before_selecting() {
    let interpreter = eval_ok(
        "var n = 0;\n\
         fun bump() { n = n + 1; return n; }\n\
         var v = 1 ? bump() : bump();",
    );
    assert_eq!(global(&interpreter, "n"), Value::Number(2.0));
    assert_eq!(global(&interpreter, "v"), Value::Number(1.0));
}

#[test]
fn logical_operators_short_circuit_and_return_operands() {
    let interpreter = eval_ok(
        "var n = 0;\n\
         fun bump() { n = n + 1; return n; }\n\
         var a = false and bump();\n\
         var b = true or bump();\n\
         var c = nil or \"fallback\";",
    );
    assert_eq!(global(&interpreter, "n"), Value::Number(0.0));
    assert_eq!(global(&interpreter, "a"), Value::Bool(false));
    assert_eq!(global(&interpreter, "b"), Value::Bool(true));
    assert_eq!(global(&interpreter, "c"), Value::String("fallback".into()));
}

#[test]
fn nil_equality_rules() {
    let interpreter = eval_ok(
        "var a = nil == nil;\n\
         var b = nil == 0;\n\
         var c = nil == false;",
    );
    assert_eq!(global(&interpreter, "a"), Value::Bool(true));
    assert_eq!(global(&interpreter, "b"), Value::Bool(false));
    assert_eq!(global(&interpreter, "c"), Value::Bool(false));
}

#[test]
fn equality_is_structural_for_collections() {
    let interpreter = eval_ok(
        "var e = [1, [2]] == [1, [2]];\n\
         var m = {\"a\": 1} == {\"a\": 1};\n\
         var d = [1] == [2];",
    );
    assert_eq!(global(&interpreter, "e"), Value::Bool(true));
    assert_eq!(global(&interpreter, "m"), Value::Bool(true));
    assert_eq!(global(&interpreter, "d"), Value::Bool(false));
}

#[test]
fn runtime_errors_capture_the_innermost_call_chain() {
    let err = eval_err(
        "fun inner() { return 1 / 0; }\n\
         fun outer() { return inner(); }\n\
         outer();",
    );
    assert!(matches!(err.kind, RuntimeErrorKind::DivisionByZero));
    let names: Vec<&str> = err.trace.iter().map(|f| f.callable.name()).collect();
    assert_eq!(names, vec!["outer", "inner"]);
    assert!(err.token.is_some());
}

#[test]
fn undefined_namespace_is_reported() {
    let err = eval_err("var x = nope::thing;");
    assert!(matches!(
        err.kind,
        RuntimeErrorKind::UndefinedNamespace { .. }
    ));
}
