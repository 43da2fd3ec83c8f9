/*!
 * Lexer
 * Tokenizes the component-description dialect
 */

use super::types::{CompileError, CompileResult, Span};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Number(f64),
    Str(Arc<str>),

    // Keywords
    Let,
    Fn,
    Return,
    If,
    Else,
    For,
    In,
    Export,
    Default,
    True,
    False,
    Null,

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semi,
    Dot,
    QuestionDot,
    Ellipsis,
    Question,
    NullishCoalesce,
    Arrow,
    Assign,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AndAnd,
    OrOr,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "identifier '{}'", name),
            Token::Number(n) => write!(f, "number {}", n),
            Token::Str(_) => write!(f, "string literal"),
            Token::Eof => write!(f, "end of input"),
            other => write!(f, "'{}'", other.symbol()),
        }
    }
}

impl Token {
    /// Source spelling of a keyword token
    pub fn keyword_text(&self) -> Option<&'static str> {
        match self {
            Token::Let
            | Token::Fn
            | Token::Return
            | Token::If
            | Token::Else
            | Token::For
            | Token::In
            | Token::Export
            | Token::Default
            | Token::True
            | Token::False
            | Token::Null => Some(self.symbol()),
            _ => None,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Token::Let => "let",
            Token::Fn => "fn",
            Token::Return => "return",
            Token::If => "if",
            Token::Else => "else",
            Token::For => "for",
            Token::In => "in",
            Token::Export => "export",
            Token::Default => "default",
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Semi => ";",
            Token::Dot => ".",
            Token::QuestionDot => "?.",
            Token::Ellipsis => "...",
            Token::Question => "?",
            Token::NullishCoalesce => "??",
            Token::Arrow => "=>",
            Token::Assign => "=",
            Token::Eq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Bang => "!",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Ident(_) | Token::Number(_) | Token::Str(_) | Token::Eof => "",
        }
    }
}

/// `const`/`function`/`undefined` are accepted as spellings of
/// `let`/`fn`/`null` so reducer snippets written for browsers still load.
fn keyword(word: &str) -> Option<Token> {
    Some(match word {
        "let" | "const" | "var" => Token::Let,
        "fn" | "function" => Token::Fn,
        "return" => Token::Return,
        "if" => Token::If,
        "else" => Token::Else,
        "for" => Token::For,
        "in" | "of" => Token::In,
        "export" => Token::Export,
        "default" => Token::Default,
        "true" => Token::True,
        "false" => Token::False,
        "null" | "undefined" => Token::Null,
        _ => return None,
    })
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    col: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            col: 1,
        }
    }

    fn span(&self) -> Span {
        Span {
            line: self.line,
            col: self.col,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self) -> CompileResult<()> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    match ahead.next() {
                        Some('/') => {
                            while let Some(c) = self.bump() {
                                if c == '\n' {
                                    break;
                                }
                            }
                        }
                        Some('*') => {
                            let at = self.span();
                            self.bump();
                            self.bump();
                            let mut prev = '\0';
                            loop {
                                match self.bump() {
                                    Some('/') if prev == '*' => break,
                                    Some(c) => prev = c,
                                    None => return Err(CompileError::UnterminatedComment { at }),
                                }
                            }
                        }
                        _ => return Ok(()),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn string(&mut self, quote: char, at: Span) -> CompileResult<Token> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(CompileError::UnterminatedString { at }),
                Some(c) if c == quote => break,
                Some('\n') if quote != '`' => return Err(CompileError::UnterminatedString { at }),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some('u') => {
                        let mut hex = String::new();
                        for _ in 0..4 {
                            match self.bump() {
                                Some(h) if h.is_ascii_hexdigit() => hex.push(h),
                                _ => {
                                    return Err(CompileError::Invalid {
                                        message: "malformed \\u escape".into(),
                                        at,
                                    })
                                }
                            }
                        }
                        let ch = u32::from_str_radix(&hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .unwrap_or('\u{FFFD}');
                        out.push(ch);
                    }
                    Some(other) => out.push(other),
                    None => return Err(CompileError::UnterminatedString { at }),
                },
                Some(c) => out.push(c),
            }
        }
        Ok(Token::Str(Arc::from(out)))
    }

    fn number(&mut self, first: char, at: Span) -> CompileResult<Token> {
        let mut text = String::from(first);
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.bump();
                if c != '_' {
                    text.push(c);
                }
            } else if c == '.' && !text.contains('.') {
                // `1..` never occurs; a dot followed by a digit continues the literal
                let mut ahead = self.chars.clone();
                ahead.next();
                if ahead.next().map(|d| d.is_ascii_digit()).unwrap_or(false) {
                    self.bump();
                    text.push('.');
                } else {
                    break;
                }
            } else {
                break;
            }
        }
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| CompileError::Invalid {
                message: format!("invalid number '{}'", text),
                at,
            })
    }

    fn next_token(&mut self) -> CompileResult<(Token, Span)> {
        self.skip_trivia()?;
        let at = self.span();
        let c = match self.bump() {
            Some(c) => c,
            None => return Ok((Token::Eof, at)),
        };

        let token = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            ':' => Token::Colon,
            ';' => Token::Semi,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '.' => {
                if self.peek() == Some('.') {
                    self.bump();
                    if !self.eat('.') {
                        return Err(CompileError::UnexpectedChar { ch: '.', at });
                    }
                    Token::Ellipsis
                } else {
                    Token::Dot
                }
            }
            '?' => {
                if self.eat('.') {
                    Token::QuestionDot
                } else if self.eat('?') {
                    Token::NullishCoalesce
                } else {
                    Token::Question
                }
            }
            '=' => {
                if self.eat('=') {
                    self.eat('=');
                    Token::Eq
                } else if self.eat('>') {
                    Token::Arrow
                } else {
                    Token::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    self.eat('=');
                    Token::NotEq
                } else {
                    Token::Bang
                }
            }
            '<' => {
                if self.eat('=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '&' if self.eat('&') => Token::AndAnd,
            '|' if self.eat('|') => Token::OrOr,
            '"' | '\'' | '`' => self.string(c, at)?,
            c if c.is_ascii_digit() => self.number(c, at)?,
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut word = String::from(c);
                while let Some(n) = self.peek() {
                    if n.is_alphanumeric() || n == '_' || n == '$' {
                        word.push(n);
                        self.bump();
                    } else {
                        break;
                    }
                }
                keyword(&word).unwrap_or(Token::Ident(word))
            }
            other => return Err(CompileError::UnexpectedChar { ch: other, at }),
        };
        Ok((token, at))
    }
}

/// Tokenize a whole source text, ending with [`Token::Eof`]
pub fn tokenize(source: &str) -> CompileResult<Vec<(Token, Span)>> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let (token, span) = lexer.next_token()?;
        let done = token == Token::Eof;
        tokens.push((token, span));
        if done {
            return Ok(tokens);
        }
    }
}
