use crate::language::ast::{ContractKind, Expr, Literal, Stmt};

/// Renders a parsed program as an indented s-expression tree, one
/// top-level statement per line group.
pub fn print_program(statements: &[Stmt]) -> String {
    let mut out = String::new();
    for statement in statements {
        print_stmt(&mut out, statement, 0);
    }
    out
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn print_stmt(out: &mut String, statement: &Stmt, depth: usize) {
    indent(out, depth);
    match statement {
        Stmt::Expression(expr) => {
            out.push_str(&format!("(expr {})\n", print_expr(expr)));
        }
        Stmt::Print(expr) => {
            out.push_str(&format!("(print {})\n", print_expr(expr)));
        }
        Stmt::Var { name, initializer } => match initializer {
            Some(init) => out.push_str(&format!("(var {} {})\n", name.lexeme, print_expr(init))),
            None => out.push_str(&format!("(var {})\n", name.lexeme)),
        },
        Stmt::Block(statements) => {
            out.push_str("(block\n");
            for inner in statements {
                print_stmt(out, inner, depth + 1);
            }
            indent(out, depth);
            out.push_str(")\n");
        }
        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => {
            out.push_str(&format!("(if {}\n", print_expr(condition)));
            print_stmt(out, then_branch, depth + 1);
            if let Some(else_branch) = else_branch {
                indent(out, depth);
                out.push_str("else\n");
                print_stmt(out, else_branch, depth + 1);
            }
            indent(out, depth);
            out.push_str(")\n");
        }
        Stmt::While { condition, body } => {
            out.push_str(&format!("(while {}\n", print_expr(condition)));
            print_stmt(out, body, depth + 1);
            indent(out, depth);
            out.push_str(")\n");
        }
        Stmt::Break => out.push_str("(break)\n"),
        Stmt::Return { value, .. } => match value {
            Some(value) => out.push_str(&format!("(return {})\n", print_expr(value))),
            None => out.push_str("(return)\n"),
        },
        Stmt::Function(decl) => {
            let params: Vec<&str> = decl.params.iter().map(|p| p.lexeme.as_str()).collect();
            out.push_str(&format!("(fun {} ({})\n", decl.name.lexeme, params.join(" ")));
            if !decl.preconditions.is_empty() {
                indent(out, depth + 1);
                out.push_str(&format!(
                    "(precondition {})\n",
                    print_exprs(&decl.preconditions)
                ));
            }
            if !decl.postconditions.is_empty() {
                indent(out, depth + 1);
                out.push_str(&format!(
                    "(postcondition {})\n",
                    print_exprs(&decl.postconditions)
                ));
            }
            for inner in &decl.body {
                print_stmt(out, inner, depth + 1);
            }
            indent(out, depth);
            out.push_str(")\n");
        }
        Stmt::Contract {
            kind, conditions, ..
        } => {
            let name = match kind {
                ContractKind::Assertion => "assertion",
                ContractKind::Warning => "check",
            };
            out.push_str(&format!("({name} {})\n", print_exprs(conditions)));
        }
        Stmt::Import { path, alias } => match alias {
            Some(alias) => out.push_str(&format!(
                "(import {} as {})\n",
                path.lexeme, alias.lexeme
            )),
            None => out.push_str(&format!("(import {})\n", path.lexeme)),
        },
        Stmt::Test { name, body } => {
            out.push_str(&format!("(test {}\n", name.lexeme));
            print_stmt(out, body, depth + 1);
            indent(out, depth);
            out.push_str(")\n");
        }
    }
}

fn print_exprs(exprs: &[Expr]) -> String {
    let parts: Vec<String> = exprs.iter().map(print_expr).collect();
    parts.join(" ")
}

fn print_expr(expr: &Expr) -> String {
    match expr {
        Expr::Literal(Literal::Nil) => "nil".to_string(),
        Expr::Literal(Literal::Bool(b)) => b.to_string(),
        Expr::Literal(Literal::Number(n)) => n.to_string(),
        Expr::Literal(Literal::String(s)) => format!("\"{s}\""),
        Expr::Grouping(inner) => format!("(group {})", print_expr(inner)),
        Expr::Unary { operator, right } => {
            format!("({} {})", operator.lexeme, print_expr(right))
        }
        Expr::Binary {
            left,
            operator,
            right,
        }
        | Expr::Logical {
            left,
            operator,
            right,
        } => format!(
            "({} {} {})",
            operator.lexeme,
            print_expr(left),
            print_expr(right)
        ),
        Expr::Ternary {
            condition,
            then,
            otherwise,
        } => format!(
            "(?: {} {} {})",
            print_expr(condition),
            print_expr(then),
            print_expr(otherwise)
        ),
        Expr::Variable(name) => name.lexeme.clone(),
        Expr::Namespaced(parts) => {
            let names: Vec<&str> = parts.iter().map(|p| p.lexeme.as_str()).collect();
            names.join("::")
        }
        Expr::Assign { name, value } => format!("(= {} {})", name.lexeme, print_expr(value)),
        Expr::Call {
            callee, arguments, ..
        } => {
            if arguments.is_empty() {
                format!("(call {})", print_expr(callee))
            } else {
                format!("(call {} {})", print_expr(callee), print_exprs(arguments))
            }
        }
        Expr::List(elements) => format!("(list {})", print_exprs(elements)),
        Expr::Map { keys, values, .. } => {
            let entries: Vec<String> = keys
                .iter()
                .zip(values)
                .map(|(k, v)| format!("{} {}", print_expr(k), print_expr(v)))
                .collect();
            format!("(map {})", entries.join(" "))
        }
        Expr::Index {
            collection, index, ..
        } => format!("(index {} {})", print_expr(collection), print_expr(index)),
        Expr::Slice {
            collection,
            start,
            end,
            ..
        } => format!(
            "(slice {} {} {})",
            print_expr(collection),
            print_expr(start),
            print_expr(end)
        ),
    }
}
