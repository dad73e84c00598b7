use crate::language::{
    ast::{ContractKind, Expr, FunctionDecl, Literal, Stmt},
    errors::{SyntaxError, SyntaxErrors},
    lexer::lex,
    token::{LiteralValue, Token, TokenKind},
};
use std::rc::Rc;

/// Whether `test` statements survive parsing. They are always parsed for
/// validation; outside test mode they are discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseMode {
    Script,
    Test,
}

/// Lexes and parses a full source unit. Lexical and syntactic errors are
/// collected together; any error yields `Err` and the caller must not
/// evaluate the (partial) statement list.
pub fn parse_source(source: &str, file: &str, mode: ParseMode) -> Result<Vec<Stmt>, SyntaxErrors> {
    let (tokens, mut errors) = lex(source, Rc::from(file));
    let parser = Parser::new(tokens, mode);
    let (statements, parse_errors) = parser.parse();
    errors.extend(parse_errors);
    if errors.is_empty() {
        Ok(statements)
    } else {
        Err(SyntaxErrors::new(errors))
    }
}

const MAX_CALL_ARGS: usize = 255;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<SyntaxError>,
    loop_depth: usize,
    function_depth: usize,
    mode: ParseMode,
}

impl Parser {
    fn new(tokens: Vec<Token>, mode: ParseMode) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
            loop_depth: 0,
            function_depth: 0,
            mode,
        }
    }

    fn parse(mut self) -> (Vec<Stmt>, Vec<SyntaxError>) {
        let mut statements = Vec::new();
        while !self.is_eof() {
            match self.declaration() {
                Ok(Some(stmt)) => statements.push(stmt),
                Ok(None) => {}
                Err(err) => {
                    self.report(err);
                    self.synchronize();
                }
            }
        }
        (statements, self.errors)
    }

    fn declaration(&mut self) -> Result<Option<Stmt>, SyntaxError> {
        if self.matches(TokenKind::Var) {
            return self.var_declaration().map(Some);
        }
        if self.matches(TokenKind::Fun) {
            return self.function_declaration().map(Some);
        }
        if self.matches(TokenKind::Import) {
            return self.import_statement().map(Some);
        }
        if self.matches(TokenKind::Test) {
            let stmt = self.test_statement()?;
            return Ok(if self.mode == ParseMode::Test {
                Some(stmt)
            } else {
                None
            });
        }
        self.statement().map(Some)
    }

    fn statement(&mut self) -> Result<Stmt, SyntaxError> {
        if self.matches(TokenKind::Print) {
            return self.print_statement();
        }
        if self.matches(TokenKind::LeftBrace) {
            return Ok(Stmt::Block(self.block()?));
        }
        if self.matches(TokenKind::If) {
            return self.if_statement();
        }
        if self.matches(TokenKind::While) {
            return self.while_statement();
        }
        if self.matches(TokenKind::For) {
            return self.for_statement();
        }
        if self.matches(TokenKind::Break) {
            return self.break_statement();
        }
        if self.matches(TokenKind::Return) {
            return self.return_statement();
        }
        if self.matches(TokenKind::Assertion) {
            return self.contract_statement(ContractKind::Assertion);
        }
        if self.matches(TokenKind::Check) {
            return self.contract_statement(ContractKind::Warning);
        }
        self.expression_statement()
    }

    fn var_declaration(&mut self) -> Result<Stmt, SyntaxError> {
        let name = self.expect_identifier("Expected variable name.")?;
        let initializer = if self.matches(TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "Expected ';' after variable declaration.")?;
        Ok(Stmt::Var { name, initializer })
    }

    fn function_declaration(&mut self) -> Result<Stmt, SyntaxError> {
        self.function_depth += 1;
        let result = self.finish_function();
        self.function_depth -= 1;
        result.map(|decl| Stmt::Function(Rc::new(decl)))
    }

    fn finish_function(&mut self) -> Result<FunctionDecl, SyntaxError> {
        let name = self.expect_identifier("Expected function name.")?;
        self.expect(TokenKind::LeftParen, "Expected '(' after function name.")?;

        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if params.len() >= MAX_CALL_ARGS {
                    let err = self.error_here("Can't have more than 255 parameters.");
                    self.report(err);
                }
                params.push(self.expect_identifier("Expected parameter name.")?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen, "Expected ')' after parameters.")?;

        let mut preconditions = Vec::new();
        let mut pre_message = None;
        let mut postconditions = Vec::new();
        let mut post_message = None;
        if self.matches(TokenKind::Precondition) {
            self.expect(TokenKind::Colon, "Expected ':' after 'precondition'.")?;
            (preconditions, pre_message) = self.contract_clauses()?;
        }
        if self.matches(TokenKind::Postcondition) {
            self.expect(TokenKind::Colon, "Expected ':' after 'postcondition'.")?;
            (postconditions, post_message) = self.contract_clauses()?;
        }

        self.expect(TokenKind::LeftBrace, "Expected '{' before function body.")?;
        let body = self.block()?;

        Ok(FunctionDecl {
            name,
            params,
            body,
            preconditions,
            postconditions,
            pre_message,
            post_message,
        })
    }

    /// Comma-separated condition list, optionally closed by a string
    /// message: `x > 0, y > 0, "both operands must be positive"`.
    fn contract_clauses(&mut self) -> Result<(Vec<Expr>, Option<String>), SyntaxError> {
        let mut conditions = Vec::new();
        let mut message = None;
        loop {
            if self.check(TokenKind::String) {
                let token = self.advance().clone();
                if let Some(LiteralValue::String(text)) = token.literal {
                    message = Some(text);
                }
                break;
            }
            conditions.push(self.expression()?);
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        Ok((conditions, message))
    }

    fn contract_statement(&mut self, kind: ContractKind) -> Result<Stmt, SyntaxError> {
        let keyword = self.previous().clone();
        self.expect(
            TokenKind::Colon,
            &format!("Expected ':' after '{}'.", keyword.lexeme),
        )?;
        let (conditions, message) = self.contract_clauses()?;
        self.expect(TokenKind::Semicolon, "Expected ';' after contract statement.")?;
        Ok(Stmt::Contract {
            kind,
            keyword,
            conditions,
            message,
        })
    }

    fn import_statement(&mut self) -> Result<Stmt, SyntaxError> {
        if !self.check(TokenKind::String) {
            return Err(self.error_here("Expected import path string."));
        }
        let path = self.advance().clone();
        let alias = if self.matches(TokenKind::As) {
            Some(self.expect_identifier("Expected namespace name after 'as'.")?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "Expected ';' after import.")?;
        Ok(Stmt::Import { path, alias })
    }

    fn test_statement(&mut self) -> Result<Stmt, SyntaxError> {
        if !self.check(TokenKind::String) {
            return Err(self.error_here("Expected test name string."));
        }
        let name = self.advance().clone();
        let body = self.statement()?;
        Ok(Stmt::Test {
            name,
            body: Box::new(body),
        })
    }

    fn print_statement(&mut self) -> Result<Stmt, SyntaxError> {
        let value = self.expression()?;
        self.expect(TokenKind::Semicolon, "Expected ';' after value.")?;
        Ok(Stmt::Print(value))
    }

    fn block(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_eof() {
            match self.declaration() {
                Ok(Some(stmt)) => statements.push(stmt),
                Ok(None) => {}
                Err(err) => {
                    self.report(err);
                    self.synchronize();
                }
            }
        }
        self.expect(TokenKind::RightBrace, "Expected '}' after block.")?;
        Ok(statements)
    }

    fn if_statement(&mut self) -> Result<Stmt, SyntaxError> {
        self.expect(TokenKind::LeftParen, "Expected '(' after 'if'.")?;
        let condition = self.expression()?;
        self.expect(TokenKind::RightParen, "Expected ')' after 'if' condition.")?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.matches(TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt, SyntaxError> {
        self.expect(TokenKind::LeftParen, "Expected '(' after 'while'.")?;
        let condition = self.expression()?;
        self.expect(TokenKind::RightParen, "Expected ')' after 'while' condition.")?;

        self.loop_depth += 1;
        let body = self.statement();
        self.loop_depth -= 1;

        Ok(Stmt::While {
            condition,
            body: Box::new(body?),
        })
    }

    /// `for` has no AST node of its own: it desugars into an initializer
    /// plus a while loop, with the increment appended to the loop body.
    fn for_statement(&mut self) -> Result<Stmt, SyntaxError> {
        self.loop_depth += 1;
        let result = self.finish_for();
        self.loop_depth -= 1;
        result
    }

    fn finish_for(&mut self) -> Result<Stmt, SyntaxError> {
        self.expect(TokenKind::LeftParen, "Expected '(' after 'for'.")?;
        let initializer = if self.matches(TokenKind::Semicolon) {
            None
        } else if self.matches(TokenKind::Var) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if !self.check(TokenKind::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "Expected ';' after loop condition.")?;

        let increment = if !self.check(TokenKind::RightParen) {
            Some(self.expression()?)
        } else {
            None
        };
        self.expect(TokenKind::RightParen, "Expected ')' after for clauses.")?;

        let mut body = self.statement()?;
        if let Some(increment) = increment {
            body = Stmt::Block(vec![body, Stmt::Expression(increment)]);
        }
        let condition = condition.unwrap_or(Expr::Literal(Literal::Bool(true)));
        body = Stmt::While {
            condition,
            body: Box::new(body),
        };
        if let Some(initializer) = initializer {
            body = Stmt::Block(vec![initializer, body]);
        }
        Ok(body)
    }

    fn break_statement(&mut self) -> Result<Stmt, SyntaxError> {
        let keyword = self.previous().clone();
        self.expect(TokenKind::Semicolon, "Expected ';' after 'break'.")?;
        if self.loop_depth == 0 {
            self.report(SyntaxError::new(
                "Found 'break' outside a loop.",
                keyword.span,
            ));
        }
        Ok(Stmt::Break)
    }

    fn return_statement(&mut self) -> Result<Stmt, SyntaxError> {
        let keyword = self.previous().clone();
        if self.function_depth == 0 {
            self.report(SyntaxError::new(
                "Cannot return from top-level code.",
                keyword.span,
            ));
        }
        let value = if !self.check(TokenKind::Semicolon) {
            Some(self.expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, "Expected ';' after return value.")?;
        Ok(Stmt::Return { keyword, value })
    }

    fn expression_statement(&mut self) -> Result<Stmt, SyntaxError> {
        let value = self.expression()?;
        self.expect(TokenKind::Semicolon, "Expected ';' after expression.")?;
        Ok(Stmt::Expression(value))
    }

    fn expression(&mut self) -> Result<Expr, SyntaxError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, SyntaxError> {
        let expr = self.ternary()?;

        if self.matches(TokenKind::Equal) {
            let equals = self.previous().clone();
            let value = self.assignment()?;
            return match expr {
                Expr::Variable(name) => Ok(Expr::Assign {
                    name,
                    value: Box::new(value),
                }),
                other => {
                    self.report(SyntaxError::new("Invalid assignment target.", equals.span));
                    Ok(other)
                }
            };
        }

        Ok(expr)
    }

    fn ternary(&mut self) -> Result<Expr, SyntaxError> {
        let expr = self.logical_or()?;

        if self.matches(TokenKind::Question) {
            let then = self.ternary()?;
            self.expect(TokenKind::Colon, "Expected ':' in ternary expression.")?;
            let otherwise = self.ternary()?;
            return Ok(Expr::Ternary {
                condition: Box::new(expr),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }

        Ok(expr)
    }

    fn logical_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.logical_and()?;
        while self.matches(TokenKind::Or) {
            let operator = self.previous().clone();
            let right = self.logical_and()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn logical_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.equality()?;
        while self.matches(TokenKind::And) {
            let operator = self.previous().clone();
            let right = self.equality()?;
            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.comparison()?;
        while self.match_any(&[TokenKind::BangEqual, TokenKind::EqualEqual]) {
            let operator = self.previous().clone();
            let right = self.comparison()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.term()?;
        while self.match_any(&[
            TokenKind::Greater,
            TokenKind::GreaterEqual,
            TokenKind::Less,
            TokenKind::LessEqual,
        ]) {
            let operator = self.previous().clone();
            let right = self.term()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.factor()?;
        while self.match_any(&[TokenKind::Minus, TokenKind::Plus]) {
            let operator = self.previous().clone();
            let right = self.factor()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.unary()?;
        while self.match_any(&[TokenKind::Slash, TokenKind::Star, TokenKind::Percent]) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        if self.match_any(&[TokenKind::Bang, TokenKind::Minus]) {
            let operator = self.previous().clone();
            let right = self.unary()?;
            return Ok(Expr::Unary {
                operator,
                right: Box::new(right),
            });
        }
        self.call()
    }

    fn call(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.primary()?;
        loop {
            if self.matches(TokenKind::LeftParen) {
                expr = self.finish_call(expr)?;
            } else if self.matches(TokenKind::LeftSquare) {
                expr = self.finish_index(expr)?;
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr, SyntaxError> {
        let mut arguments = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                if arguments.len() >= MAX_CALL_ARGS {
                    let err = self.error_here("Can't have more than 255 arguments.");
                    self.report(err);
                }
                arguments.push(self.expression()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        let paren = self
            .expect(TokenKind::RightParen, "Expected ')' after arguments.")?
            .clone();
        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }

    fn finish_index(&mut self, collection: Expr) -> Result<Expr, SyntaxError> {
        let bracket = self.previous().clone();
        let first = self.expression()?;
        if self.matches(TokenKind::Colon) {
            let end = self.expression()?;
            self.expect(TokenKind::RightSquare, "Expected ']' after slice bounds.")?;
            return Ok(Expr::Slice {
                collection: Box::new(collection),
                bracket,
                start: Box::new(first),
                end: Box::new(end),
            });
        }
        self.expect(TokenKind::RightSquare, "Expected ']' after index.")?;
        Ok(Expr::Index {
            collection: Box::new(collection),
            bracket,
            index: Box::new(first),
        })
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        if self.matches(TokenKind::False) {
            return Ok(Expr::Literal(Literal::Bool(false)));
        }
        if self.matches(TokenKind::True) {
            return Ok(Expr::Literal(Literal::Bool(true)));
        }
        if self.matches(TokenKind::Nil) {
            return Ok(Expr::Literal(Literal::Nil));
        }
        if self.matches(TokenKind::Number) {
            let value = match &self.previous().literal {
                Some(LiteralValue::Number(value)) => *value,
                _ => 0.0,
            };
            return Ok(Expr::Literal(Literal::Number(value)));
        }
        if self.matches(TokenKind::String) {
            let value = match &self.previous().literal {
                Some(LiteralValue::String(value)) => value.clone(),
                _ => String::new(),
            };
            return Ok(Expr::Literal(Literal::String(value)));
        }
        if self.matches(TokenKind::Identifier) {
            let first = self.previous().clone();
            if self.check(TokenKind::ColonColon) {
                let mut parts = vec![first];
                while self.matches(TokenKind::ColonColon) {
                    parts.push(self.expect_identifier("Expected name after '::'.")?);
                }
                return Ok(Expr::Namespaced(parts));
            }
            return Ok(Expr::Variable(first));
        }
        if self.matches(TokenKind::LeftParen) {
            let expr = self.expression()?;
            self.expect(TokenKind::RightParen, "Expected ')' after expression.")?;
            return Ok(Expr::Grouping(Box::new(expr)));
        }
        if self.matches(TokenKind::LeftSquare) {
            let mut elements = Vec::new();
            if !self.check(TokenKind::RightSquare) {
                loop {
                    elements.push(self.expression()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RightSquare, "Expected ']' after list elements.")?;
            return Ok(Expr::List(elements));
        }
        if self.matches(TokenKind::LeftBrace) {
            return self.map_literal();
        }

        // Error production: a binary operator with no left-hand operand.
        if self.match_any(&[
            TokenKind::Plus,
            TokenKind::Star,
            TokenKind::Slash,
            TokenKind::Percent,
            TokenKind::EqualEqual,
            TokenKind::BangEqual,
            TokenKind::Greater,
            TokenKind::GreaterEqual,
            TokenKind::Less,
            TokenKind::LessEqual,
        ]) {
            let operator = self.previous().clone();
            return Err(SyntaxError::new(
                format!("Missing left-hand operand before '{}'.", operator.lexeme),
                operator.span,
            ));
        }

        Err(self.error_here("Expected expression."))
    }

    fn map_literal(&mut self) -> Result<Expr, SyntaxError> {
        let brace = self.previous().clone();
        let mut keys = Vec::new();
        let mut values = Vec::new();
        if !self.check(TokenKind::RightBrace) {
            loop {
                keys.push(self.expression()?);
                self.expect(TokenKind::Colon, "Expected ':' between map key and value.")?;
                values.push(self.expression()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightBrace, "Expected '}' after map entries.")?;
        Ok(Expr::Map {
            brace,
            keys,
            values,
        })
    }

    fn expect_identifier(&mut self, message: &str) -> Result<Token, SyntaxError> {
        if self.check(TokenKind::Identifier) {
            return Ok(self.advance().clone());
        }
        Err(self.error_here(message))
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<&Token, SyntaxError> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        Err(self.error_here(message))
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        false
    }

    fn match_any(&mut self, kinds: &[TokenKind]) -> bool {
        for kind in kinds {
            if self.check(*kind) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().unwrap())
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn advance(&mut self) -> &Token {
        if !self.is_eof() {
            self.pos += 1;
        }
        self.previous()
    }

    fn is_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            SyntaxError::new(format!("{message} (at end of input)"), token.span)
        } else {
            SyntaxError::new(message.to_string(), token.span)
        }
    }

    fn report(&mut self, err: SyntaxError) {
        self.errors.push(err);
    }

    /// Discard tokens until the next statement boundary so one syntax
    /// error does not hide the rest of the file.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_eof() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            match self.peek().kind {
                TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return
                | TokenKind::Break
                | TokenKind::Import
                | TokenKind::Test
                | TokenKind::Assertion
                | TokenKind::Check => return,
                _ => {
                    self.advance();
                }
            }
        }
    }
}
