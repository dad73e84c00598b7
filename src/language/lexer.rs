use crate::language::{
    errors::SyntaxError,
    span::Span,
    token::{LiteralValue, Token, TokenKind},
};
use std::rc::Rc;

/// Scans the whole source in one pass. Lexical problems (unknown
/// characters, unterminated strings) are recorded and scanning continues,
/// so a single pass surfaces every error.
pub fn lex(source: &str, file: Rc<str>) -> (Vec<Token>, Vec<SyntaxError>) {
    let lexer = Lexer::new(source, file);
    lexer.run()
}

struct Lexer<'a> {
    src: &'a str,
    chars: std::str::Chars<'a>,
    current: Option<char>,
    offset: usize,
    start: usize,
    line: usize,
    start_line: usize,
    file: Rc<str>,
    tokens: Vec<Token>,
    errors: Vec<SyntaxError>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, file: Rc<str>) -> Self {
        let mut chars = src.chars();
        let current = chars.next();
        Self {
            src,
            chars,
            current,
            offset: 0,
            start: 0,
            line: 1,
            start_line: 1,
            file,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn run(mut self) -> (Vec<Token>, Vec<SyntaxError>) {
        while let Some(ch) = self.current {
            self.start = self.offset;
            self.start_line = self.line;
            match ch {
                '/' if self.peek() == Some('/') => self.eat_line_comment(),
                '\n' => {
                    self.line += 1;
                    self.bump();
                }
                ch if ch.is_whitespace() => {
                    self.bump();
                }
                ch if ch.is_ascii_alphabetic() || ch == '_' => self.lex_identifier(),
                ch if ch.is_ascii_digit() => self.lex_number(),
                '"' => self.lex_string(),
                _ => self.lex_symbol(),
            }
        }
        self.start = self.offset;
        self.start_line = self.line;
        self.push_token(TokenKind::Eof);

        (self.tokens, self.errors)
    }

    fn bump(&mut self) -> Option<char> {
        if let Some(ch) = self.current {
            self.offset += ch.len_utf8();
        }
        self.current = self.chars.next();
        self.current
    }

    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn match_next(&mut self, expected: char) -> bool {
        if self.current == Some(expected) {
            self.bump();
            return true;
        }
        false
    }

    fn push_token(&mut self, kind: TokenKind) {
        self.push_literal(kind, None);
    }

    fn push_literal(&mut self, kind: TokenKind, literal: Option<LiteralValue>) {
        self.tokens.push(Token {
            kind,
            lexeme: self.src[self.start..self.offset].to_string(),
            literal,
            line: self.start_line,
            file: Rc::clone(&self.file),
            span: Span::new(self.start, self.offset),
        });
    }

    fn error(&mut self, start: usize, end: usize, message: impl Into<String>) {
        self.errors
            .push(SyntaxError::new(message.into(), Span::new(start, end)));
    }

    fn eat_line_comment(&mut self) {
        while let Some(ch) = self.current {
            if ch == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn lex_identifier(&mut self) {
        while let Some(ch) = self.current {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.bump();
            } else {
                break;
            }
        }

        let kind = match &self.src[self.start..self.offset] {
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "fun" => TokenKind::Fun,
            "var" => TokenKind::Var,
            "nil" => TokenKind::Nil,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "return" => TokenKind::Return,
            "break" => TokenKind::Break,
            "print" => TokenKind::Print,
            "import" => TokenKind::Import,
            "as" => TokenKind::As,
            "test" => TokenKind::Test,
            "assertion" => TokenKind::Assertion,
            "check" => TokenKind::Check,
            "precondition" => TokenKind::Precondition,
            "postcondition" => TokenKind::Postcondition,
            _ => TokenKind::Identifier,
        };
        self.push_token(kind);
    }

    fn lex_number(&mut self) {
        while matches!(self.current, Some(ch) if ch.is_ascii_digit()) {
            self.bump();
        }

        if self.current == Some('.') && matches!(self.peek(), Some(ch) if ch.is_ascii_digit()) {
            self.bump();
            while matches!(self.current, Some(ch) if ch.is_ascii_digit()) {
                self.bump();
            }
        }

        let value: f64 = self.src[self.start..self.offset].parse().unwrap_or(0.0);
        self.push_literal(TokenKind::Number, Some(LiteralValue::Number(value)));
    }

    fn lex_string(&mut self) {
        self.bump();
        while let Some(ch) = self.current {
            if ch == '"' {
                break;
            }
            if ch == '\n' {
                self.line += 1;
            }
            self.bump();
        }

        if self.current.is_none() {
            self.error(self.start, self.offset, "Unterminated string.");
            return;
        }

        self.bump();

        let value = self.src[self.start + 1..self.offset - 1].to_string();
        self.push_literal(TokenKind::String, Some(LiteralValue::String(value)));
    }

    fn lex_symbol(&mut self) {
        let ch = self.current.unwrap_or('\0');
        self.bump();
        match ch {
            '(' => self.push_token(TokenKind::LeftParen),
            ')' => self.push_token(TokenKind::RightParen),
            '{' => self.push_token(TokenKind::LeftBrace),
            '}' => self.push_token(TokenKind::RightBrace),
            '[' => self.push_token(TokenKind::LeftSquare),
            ']' => self.push_token(TokenKind::RightSquare),
            ',' => self.push_token(TokenKind::Comma),
            '.' => self.push_token(TokenKind::Dot),
            '-' => self.push_token(TokenKind::Minus),
            '+' => self.push_token(TokenKind::Plus),
            ';' => self.push_token(TokenKind::Semicolon),
            '*' => self.push_token(TokenKind::Star),
            '/' => self.push_token(TokenKind::Slash),
            '%' => self.push_token(TokenKind::Percent),
            '?' => self.push_token(TokenKind::Question),
            ':' => {
                if self.match_next(':') {
                    self.push_token(TokenKind::ColonColon);
                } else {
                    self.push_token(TokenKind::Colon);
                }
            }
            '!' => {
                if self.match_next('=') {
                    self.push_token(TokenKind::BangEqual);
                } else {
                    self.push_token(TokenKind::Bang);
                }
            }
            '=' => {
                if self.match_next('=') {
                    self.push_token(TokenKind::EqualEqual);
                } else {
                    self.push_token(TokenKind::Equal);
                }
            }
            '<' => {
                if self.match_next('=') {
                    self.push_token(TokenKind::LessEqual);
                } else {
                    self.push_token(TokenKind::Less);
                }
            }
            '>' => {
                if self.match_next('=') {
                    self.push_token(TokenKind::GreaterEqual);
                } else {
                    self.push_token(TokenKind::Greater);
                }
            }
            _ => self.error(self.start, self.offset, format!("Unexpected character '{ch}'.")),
        }
    }
}
