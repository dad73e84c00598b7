use crate::language::ast::{ContractKind, Expr, Literal, Stmt};
use crate::language::parser::{parse_source, ParseMode};
use crate::language::token::{LiteralValue, Token, TokenKind};
use crate::runtime::environment::{Env, Environment};
use crate::runtime::error::{CallFrame, RuntimeError, RuntimeErrorKind, RuntimeResult};
use crate::runtime::stdlib::{self, FileLoader, ModuleLoader};
use crate::runtime::value::{Callable, Function, ListValue, MapKey, MapValue, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

/// Non-local control transfer, threaded up through every statement
/// executor instead of unwinding the host stack.
pub enum FlowSignal {
    Break,
    Return(Value),
}

#[derive(Clone, Debug)]
pub struct TestResult {
    pub name: String,
    pub line: usize,
    pub passed: bool,
    pub message: Option<String>,
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed {
            write!(f, "PASS (line {}): {}", self.line, self.name)
        } else {
            write!(
                f,
                "FAIL (line {}): {} ({})",
                self.line,
                self.name,
                self.message.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

pub struct Interpreter {
    pub globals: Env,
    env: Env,
    repl: bool,
    call_stack: Vec<CallFrame>,
    /// Canonical names of imports currently being loaded; a path seen
    /// twice before its declarations finish executing is a cycle.
    loading: HashSet<String>,
    test_results: Vec<TestResult>,
    loader: Box<dyn ModuleLoader>,
}

impl Interpreter {
    pub fn new(repl: bool) -> Self {
        Self::with_loader(repl, Box::new(FileLoader))
    }

    pub fn with_loader(repl: bool, loader: Box<dyn ModuleLoader>) -> Self {
        let globals = Environment::new();
        stdlib::register(&globals);
        Self {
            env: Rc::clone(&globals),
            globals,
            repl,
            call_stack: Vec::new(),
            loading: HashSet::new(),
            test_results: Vec::new(),
            loader,
        }
    }

    /// Runs a top-level statement sequence. The first runtime error
    /// aborts the sequence; test outcomes collected so far survive and
    /// are reported separately by the driver.
    pub fn interpret(&mut self, statements: &[Stmt]) -> RuntimeResult<()> {
        for statement in statements {
            self.execute(statement)?;
        }
        Ok(())
    }

    pub fn test_results(&self) -> &[TestResult] {
        &self.test_results
    }

    pub fn print_test_results(&self) {
        if self.test_results.is_empty() {
            return;
        }
        println!("Test Results:");
        for result in &self.test_results {
            println!("{result}");
        }
    }

    /// Global lookup by plain name; the REPL and tests inspect state
    /// through this.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name)
    }

    fn execute(&mut self, statement: &Stmt) -> RuntimeResult<Option<FlowSignal>> {
        match statement {
            Stmt::Expression(expr) => {
                let value = self.evaluate(expr)?;
                if self.repl && self.call_stack.is_empty() {
                    eprintln!("{value}");
                }
                Ok(None)
            }
            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;
                println!("{value}");
                Ok(None)
            }
            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                self.env.borrow_mut().define(&name.lexeme, value);
                Ok(None)
            }
            Stmt::Block(statements) => {
                let scope = Environment::with_enclosing(&self.env);
                self.execute_block(statements, scope)
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(None)
                }
            }
            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    match self.execute(body)? {
                        None => {}
                        Some(FlowSignal::Break) => break,
                        Some(flow @ FlowSignal::Return(_)) => return Ok(Some(flow)),
                    }
                }
                Ok(None)
            }
            Stmt::Break => Ok(Some(FlowSignal::Break)),
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                Ok(Some(FlowSignal::Return(value)))
            }
            Stmt::Function(declaration) => {
                let function = Value::Callable(Callable::Function(Rc::new(Function {
                    declaration: Rc::clone(declaration),
                    closure: Rc::clone(&self.env),
                })));
                self.env
                    .borrow_mut()
                    .define(&declaration.name.lexeme, function);
                Ok(None)
            }
            Stmt::Contract {
                kind,
                keyword,
                conditions,
                message,
            } => self.execute_contract(*kind, keyword, conditions, message.as_deref()),
            Stmt::Import { path, alias } => self.execute_import(path, alias.as_ref()),
            Stmt::Test { name, body } => self.execute_test(name, body),
        }
    }

    /// Runs statements with `scope` as the current environment, restoring
    /// the previous one on every exit path.
    fn execute_block(&mut self, statements: &[Stmt], scope: Env) -> RuntimeResult<Option<FlowSignal>> {
        let previous = std::mem::replace(&mut self.env, scope);
        let mut flow = None;
        for statement in statements {
            match self.execute(statement) {
                Ok(None) => {}
                Ok(signal) => {
                    flow = signal;
                    break;
                }
                Err(err) => {
                    self.env = previous;
                    return Err(err);
                }
            }
        }
        self.env = previous;
        Ok(flow)
    }

    fn execute_contract(
        &mut self,
        kind: ContractKind,
        keyword: &Token,
        conditions: &[Expr],
        message: Option<&str>,
    ) -> RuntimeResult<Option<FlowSignal>> {
        let env = Rc::clone(&self.env);
        if !self.conditions_hold(conditions, &env)? {
            match kind {
                ContractKind::Assertion => {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::AssertionFailed {
                            message: message.map(str::to_string),
                        },
                        keyword.clone(),
                    ));
                }
                ContractKind::Warning => {
                    let text = message.unwrap_or("check failed");
                    eprintln!("Warning: {text} [{}:{}]", keyword.file, keyword.line);
                }
            }
        }
        Ok(None)
    }

    /// Evaluates clauses left to right in `env`; the first falsy clause
    /// fails the whole list.
    fn conditions_hold(&mut self, conditions: &[Expr], env: &Env) -> RuntimeResult<bool> {
        let previous = std::mem::replace(&mut self.env, Rc::clone(env));
        let mut held = true;
        for condition in conditions {
            match self.evaluate(condition) {
                Ok(value) => {
                    if !value.is_truthy() {
                        held = false;
                        break;
                    }
                }
                Err(err) => {
                    self.env = previous;
                    return Err(err);
                }
            }
        }
        self.env = previous;
        Ok(held)
    }

    fn execute_test(&mut self, name: &Token, body: &Stmt) -> RuntimeResult<Option<FlowSignal>> {
        let test_name = match &name.literal {
            Some(LiteralValue::String(text)) => text.clone(),
            _ => name.lexeme.clone(),
        };
        match self.execute(body) {
            Ok(_) => self.test_results.push(TestResult {
                name: test_name,
                line: name.line,
                passed: true,
                message: None,
            }),
            Err(err) => self.test_results.push(TestResult {
                name: test_name,
                line: name.line,
                passed: false,
                message: Some(err.kind.to_string()),
            }),
        }
        Ok(None)
    }

    fn execute_import(
        &mut self,
        path: &Token,
        alias: Option<&Token>,
    ) -> RuntimeResult<Option<FlowSignal>> {
        let import_path = match &path.literal {
            Some(LiteralValue::String(text)) => text.clone(),
            _ => path.lexeme.clone(),
        };

        let module = self.loader.load(&import_path).map_err(|reason| {
            RuntimeError::new(
                RuntimeErrorKind::ImportFailed {
                    path: import_path.clone(),
                    reason,
                },
                path.clone(),
            )
        })?;

        if self.loading.contains(&module.canonical) {
            return Err(RuntimeError::new(
                RuntimeErrorKind::CircularImport {
                    path: import_path.clone(),
                },
                path.clone(),
            ));
        }
        self.loading.insert(module.canonical.clone());
        let result = self.run_import(&module.source, &module.canonical, &import_path, path, alias);
        self.loading.remove(&module.canonical);
        result?;
        Ok(None)
    }

    fn run_import(
        &mut self,
        source: &str,
        canonical: &str,
        import_path: &str,
        path_token: &Token,
        alias: Option<&Token>,
    ) -> RuntimeResult<()> {
        let statements = parse_source(source, canonical, ParseMode::Script).map_err(|errors| {
            RuntimeError::new(
                RuntimeErrorKind::ImportFailed {
                    path: import_path.to_string(),
                    reason: format!("{} syntax error(s) in module", errors.len()),
                },
                path_token.clone(),
            )
        })?;

        // Modules are declaration-only: anything but function and var
        // declarations and nested imports is dropped.
        let declarations: Vec<Stmt> = statements
            .into_iter()
            .filter(|statement| {
                matches!(
                    statement,
                    Stmt::Function(_) | Stmt::Var { .. } | Stmt::Import { .. }
                )
            })
            .collect();

        match alias {
            Some(alias) => {
                let namespace = Environment::new();
                stdlib::register(&namespace);
                self.execute_block(&declarations, Rc::clone(&namespace))?;
                self.env
                    .borrow_mut()
                    .define_namespace(&alias.lexeme, namespace);
            }
            None => {
                for statement in &declarations {
                    self.execute(statement)?;
                }
            }
        }
        Ok(())
    }

    fn evaluate(&mut self, expr: &Expr) -> RuntimeResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::Nil => Value::Nil,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::String(s.clone()),
            }),
            Expr::Grouping(inner) => self.evaluate(inner),
            Expr::Variable(name) => self
                .env
                .borrow()
                .get(&name.lexeme)
                .ok_or_else(|| RuntimeError::undefined_variable(name)),
            Expr::Namespaced(parts) => {
                let target = self.resolve_namespace(&parts[..parts.len() - 1])?;
                let last = &parts[parts.len() - 1];
                let value = target.borrow().get(&last.lexeme);
                value.ok_or_else(|| RuntimeError::undefined_variable(last))
            }
            Expr::Assign { name, value } => {
                let value = self.evaluate(value)?;
                if self.env.borrow_mut().assign(&name.lexeme, value.clone()) {
                    Ok(value)
                } else {
                    Err(RuntimeError::undefined_variable(name))
                }
            }
            Expr::Unary { operator, right } => {
                let right = self.evaluate(right)?;
                match operator.kind {
                    TokenKind::Minus => match right {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        other => Err(RuntimeError::type_mismatch(
                            format!("Operand must be a number, not {}.", other.type_name()),
                            operator,
                        )),
                    },
                    _ => Ok(Value::Bool(!right.is_truthy())),
                }
            }
            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                self.eval_binary(operator, left, right)
            }
            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                if operator.kind == TokenKind::Or {
                    if left.is_truthy() {
                        return Ok(left);
                    }
                } else if !left.is_truthy() {
                    return Ok(left);
                }
                self.evaluate(right)
            }
            Expr::Ternary {
                condition,
                then,
                otherwise,
            } => {
                // Both branches evaluate before the condition selects one.
                let condition = self.evaluate(condition)?;
                let then = self.evaluate(then)?;
                let otherwise = self.evaluate(otherwise)?;
                Ok(if condition.is_truthy() { then } else { otherwise })
            }
            Expr::List(elements) => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.evaluate(element)?);
                }
                Ok(Value::List(ListValue::new(items)))
            }
            Expr::Map {
                brace,
                keys,
                values,
            } => {
                let mut entries = HashMap::with_capacity(keys.len());
                for (key_expr, value_expr) in keys.iter().zip(values) {
                    let key_value = self.evaluate(key_expr)?;
                    let key = MapKey::from_value(&key_value).ok_or_else(|| {
                        RuntimeError::type_mismatch(
                            format!(
                                "Map keys must be nil, booleans, numbers, or strings, not {}.",
                                key_value.type_name()
                            ),
                            brace,
                        )
                    })?;
                    let value = self.evaluate(value_expr)?;
                    entries.insert(key, value);
                }
                Ok(Value::Map(MapValue::new(entries)))
            }
            Expr::Index {
                collection,
                bracket,
                index,
            } => {
                let collection = self.evaluate(collection)?;
                let index = self.evaluate(index)?;
                self.eval_index(collection, bracket, index)
            }
            Expr::Slice {
                collection,
                bracket,
                start,
                end,
            } => {
                let collection = self.evaluate(collection)?;
                let start = self.evaluate(start)?;
                let end = self.evaluate(end)?;
                self.eval_slice(collection, bracket, start, end)
            }
            Expr::Call {
                callee,
                paren,
                arguments,
            } => self.eval_call(callee, paren, arguments),
        }
    }

    fn resolve_namespace(&self, parts: &[Token]) -> RuntimeResult<Env> {
        let mut namespace = Rc::clone(&self.env);
        for part in parts {
            let next = namespace.borrow().get_namespace(&part.lexeme);
            namespace = next.ok_or_else(|| RuntimeError::undefined_namespace(part))?;
        }
        Ok(namespace)
    }

    fn eval_call(
        &mut self,
        callee: &Expr,
        paren: &Token,
        arguments: &[Expr],
    ) -> RuntimeResult<Value> {
        let callee = self.evaluate(callee)?;
        let mut args = Vec::with_capacity(arguments.len());
        for argument in arguments {
            args.push(self.evaluate(argument)?);
        }

        let Value::Callable(callable) = callee else {
            return Err(RuntimeError::new(RuntimeErrorKind::NotCallable, paren.clone()));
        };
        if args.len() != callable.arity() {
            return Err(RuntimeError::new(
                RuntimeErrorKind::ArityMismatch {
                    expected: callable.arity(),
                    received: args.len(),
                },
                paren.clone(),
            ));
        }

        self.call_stack.push(CallFrame {
            callable: callable.clone(),
            line: paren.line,
            file: Rc::clone(&paren.file),
        });
        let result = match &callable {
            Callable::Function(function) => self.call_function(function, args),
            Callable::Native(native) => (native.func)(self, args),
        };
        let result = result.map_err(|mut err| {
            // Attach the call site and the stack snapshot exactly once,
            // at the innermost boundary the error crosses.
            if err.token.is_none() {
                err.token = Some(paren.clone());
            }
            if err.trace.is_empty() {
                err.trace = self.call_stack.clone();
            }
            err
        });
        self.call_stack.pop();
        result
    }

    fn call_function(&mut self, function: &Rc<Function>, args: Vec<Value>) -> RuntimeResult<Value> {
        let declaration = Rc::clone(&function.declaration);
        let call_env = Environment::with_enclosing(&function.closure);
        for (param, value) in declaration.params.iter().zip(args) {
            call_env.borrow_mut().define(&param.lexeme, value);
        }

        if !self.conditions_hold(&declaration.preconditions, &call_env)? {
            return Err(RuntimeError::new(
                RuntimeErrorKind::PreconditionFailed {
                    message: declaration.pre_message.clone(),
                },
                declaration.name.clone(),
            ));
        }

        let flow = self.execute_block(&declaration.body, Rc::clone(&call_env))?;
        let result = match flow {
            Some(FlowSignal::Return(value)) => value,
            _ => Value::Nil,
        };

        // Postconditions run after the body, in the same environment,
        // with the returned value bound as `result`. Side effects of the
        // body are not rolled back on failure.
        call_env.borrow_mut().define("result", result.clone());
        if !self.conditions_hold(&declaration.postconditions, &call_env)? {
            return Err(RuntimeError::new(
                RuntimeErrorKind::PostconditionFailed {
                    message: declaration.post_message.clone(),
                },
                declaration.name.clone(),
            ));
        }

        Ok(result)
    }

    fn eval_binary(&mut self, operator: &Token, left: Value, right: Value) -> RuntimeResult<Value> {
        match operator.kind {
            TokenKind::Plus => match (left, right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (left, right)
                    if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) =>
                {
                    Ok(Value::String(format!("{left}{right}")))
                }
                (Value::List(a), Value::List(b)) => Ok(Value::List(a.concat(&b))),
                (left, right) => Err(RuntimeError::type_mismatch(
                    format!(
                        "'+' needs two numbers, two lists, or a string operand; got {} and {}.",
                        left.type_name(),
                        right.type_name()
                    ),
                    operator,
                )),
            },
            TokenKind::Minus => {
                let (a, b) = number_operands(operator, left, right)?;
                Ok(Value::Number(a - b))
            }
            TokenKind::Star => {
                let (a, b) = number_operands(operator, left, right)?;
                Ok(Value::Number(a * b))
            }
            TokenKind::Slash => {
                let (a, b) = number_operands(operator, left, right)?;
                if b == 0.0 {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::DivisionByZero,
                        operator.clone(),
                    ));
                }
                Ok(Value::Number(a / b))
            }
            TokenKind::Percent => {
                let (a, b) = number_operands(operator, left, right)?;
                if b == 0.0 {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::DivisionByZero,
                        operator.clone(),
                    ));
                }
                Ok(Value::Number(a % b))
            }
            TokenKind::Greater => {
                let (a, b) = number_operands(operator, left, right)?;
                Ok(Value::Bool(a > b))
            }
            TokenKind::GreaterEqual => {
                let (a, b) = number_operands(operator, left, right)?;
                Ok(Value::Bool(a >= b))
            }
            TokenKind::Less => {
                let (a, b) = number_operands(operator, left, right)?;
                Ok(Value::Bool(a < b))
            }
            TokenKind::LessEqual => {
                let (a, b) = number_operands(operator, left, right)?;
                Ok(Value::Bool(a <= b))
            }
            TokenKind::EqualEqual => Ok(Value::Bool(left == right)),
            TokenKind::BangEqual => Ok(Value::Bool(left != right)),
            _ => Err(RuntimeError::type_mismatch(
                format!("Unsupported operator '{}'.", operator.lexeme),
                operator,
            )),
        }
    }

    fn eval_index(&mut self, collection: Value, bracket: &Token, index: Value) -> RuntimeResult<Value> {
        match collection {
            Value::List(list) => {
                let i = index_operand(bracket, &index, "list")?;
                let items = list.items.borrow();
                if i < 0 || i as usize >= items.len() {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::IndexOutOfBounds,
                        bracket.clone(),
                    ));
                }
                Ok(items[i as usize].clone())
            }
            Value::String(text) => {
                let i = index_operand(bracket, &index, "string")?;
                if i < 0 {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::IndexOutOfBounds,
                        bracket.clone(),
                    ));
                }
                match text.chars().nth(i as usize) {
                    Some(ch) => Ok(Value::String(ch.to_string())),
                    None => Err(RuntimeError::new(
                        RuntimeErrorKind::IndexOutOfBounds,
                        bracket.clone(),
                    )),
                }
            }
            Value::Map(map) => {
                let key = MapKey::from_value(&index).ok_or_else(|| {
                    RuntimeError::type_mismatch(
                        format!("{} cannot be a map key.", index.type_name()),
                        bracket,
                    )
                })?;
                map.get(&key).ok_or_else(|| {
                    RuntimeError::new(RuntimeErrorKind::KeyNotFound, bracket.clone())
                })
            }
            other => Err(RuntimeError::type_mismatch(
                format!(
                    "Can only index lists, maps, and strings, not {}.",
                    other.type_name()
                ),
                bracket,
            )),
        }
    }

    fn eval_slice(
        &mut self,
        collection: Value,
        bracket: &Token,
        start: Value,
        end: Value,
    ) -> RuntimeResult<Value> {
        let s = index_operand(bracket, &start, "slice")?;
        let e = index_operand(bracket, &end, "slice")?;

        match collection {
            Value::List(list) => {
                let items = list.items.borrow();
                let (s, e) = slice_bounds(bracket, s, e, items.len())?;
                Ok(Value::List(ListValue::new(items[s..e].to_vec())))
            }
            Value::String(text) => {
                let len = text.chars().count();
                let (s, e) = slice_bounds(bracket, s, e, len)?;
                Ok(Value::String(text.chars().skip(s).take(e - s).collect()))
            }
            other => Err(RuntimeError::type_mismatch(
                format!("Can only slice lists and strings, not {}.", other.type_name()),
                bracket,
            )),
        }
    }
}

fn number_operands(operator: &Token, left: Value, right: Value) -> RuntimeResult<(f64, f64)> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((a, b)),
        (left, right) => Err(RuntimeError::type_mismatch(
            format!(
                "Operands of '{}' must be numbers; got {} and {}.",
                operator.lexeme,
                left.type_name(),
                right.type_name()
            ),
            operator,
        )),
    }
}

fn index_operand(bracket: &Token, value: &Value, what: &str) -> RuntimeResult<i64> {
    match value {
        Value::Number(n) => Ok(*n as i64),
        other => Err(RuntimeError::type_mismatch(
            format!("{what} index must be a number, not {}.", other.type_name()),
            bracket,
        )),
    }
}

fn slice_bounds(bracket: &Token, start: i64, end: i64, len: usize) -> RuntimeResult<(usize, usize)> {
    if start < 0 || end < start || end as usize > len {
        return Err(RuntimeError::new(
            RuntimeErrorKind::SliceOutOfBounds,
            bracket.clone(),
        ));
    }
    Ok((start as usize, end as usize))
}
