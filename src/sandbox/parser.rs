/*!
 * Parser
 * Recursive descent over the token stream
 */

use super::ast::*;
use super::lexer::{tokenize, Token};
use super::types::{CompileError, CompileResult, Span};
use std::sync::Arc;

/// Deepest syntax tree the parser will build
pub const MAX_NESTING: usize = 128;

pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
    /// Nesting of function bodies; `return` is only legal inside one
    fn_depth: usize,
    /// Depth of the node under construction, bounded by `MAX_NESTING`
    nesting: usize,
    last_line: u32,
}

impl Parser {
    pub fn new(tokens: Vec<(Token, Span)>) -> Self {
        Self {
            tokens,
            pos: 0,
            fn_depth: 0,
            nesting: 0,
            last_line: 1,
        }
    }

    /// One level deeper; a failed parse is abandoned so only success paths restore the count
    fn nest(&mut self) -> CompileResult<()> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(CompileError::Invalid {
                message: format!("nesting deeper than {} levels", MAX_NESTING),
                at: self.span(),
            });
        }
        Ok(())
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|(t, _)| t)
            .unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map(|(t, _)| t)
            .unwrap_or(&Token::Eof)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| *s)
            .or_else(|| self.tokens.last().map(|(_, s)| *s))
            .unwrap_or_default()
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        self.last_line = self.span().line;
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        CompileError::Unexpected {
            expected: expected.to_string(),
            found: self.peek().to_string(),
            at: self.span(),
        }
    }

    fn expect(&mut self, token: Token) -> CompileResult<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(&token.to_string()))
        }
    }

    fn ident(&mut self) -> CompileResult<String> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// Statement terminator: `;`, or implied before `}`, end of input, or a line break
    fn end_statement(&mut self) -> CompileResult<()> {
        if self.eat(&Token::Semi) {
            return Ok(());
        }
        if matches!(self.peek(), Token::RBrace | Token::Eof) || self.span().line > self.last_line {
            return Ok(());
        }
        Err(self.unexpected("';'"))
    }

    pub fn parse_program(&mut self) -> CompileResult<Program> {
        let mut body = Vec::new();
        while !self.check(&Token::Eof) {
            if self.eat(&Token::Semi) {
                continue;
            }
            body.push(self.statement()?);
        }
        Ok(Program { body })
    }

    fn block(&mut self) -> CompileResult<Vec<Stmt>> {
        self.expect(Token::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.check(&Token::Eof) {
                return Err(self.unexpected("'}'"));
            }
            if self.eat(&Token::Semi) {
                continue;
            }
            body.push(self.statement()?);
        }
        self.advance();
        Ok(body)
    }

    /// Block, or a single statement as the body of `if`/`else`
    fn body(&mut self) -> CompileResult<Vec<Stmt>> {
        if self.check(&Token::LBrace) {
            self.block()
        } else {
            Ok(vec![self.statement()?])
        }
    }

    fn statement(&mut self) -> CompileResult<Stmt> {
        self.nest()?;
        let stmt = self.statement_inner()?;
        self.nesting -= 1;
        Ok(stmt)
    }

    fn statement_inner(&mut self) -> CompileResult<Stmt> {
        match self.peek() {
            Token::Let => {
                self.advance();
                let name = self.ident()?;
                let value = if self.eat(&Token::Assign) {
                    Some(self.expression()?)
                } else {
                    None
                };
                self.end_statement()?;
                Ok(Stmt::Let(name, value))
            }
            Token::Fn if matches!(self.peek_at(1), Token::Ident(_)) => {
                self.advance();
                let decl = self.function_rest(true)?;
                Ok(Stmt::Function(decl))
            }
            Token::Export => self.export(),
            Token::Return => {
                let at = self.span();
                self.advance();
                if self.fn_depth == 0 {
                    return Err(CompileError::Invalid {
                        message: "'return' outside of a function".into(),
                        at,
                    });
                }
                let value = if matches!(self.peek(), Token::Semi | Token::RBrace | Token::Eof)
                    || self.span().line > self.last_line
                {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.end_statement()?;
                Ok(Stmt::Return(value))
            }
            Token::If => {
                self.advance();
                let cond = self.expression()?;
                let then = self.body()?;
                let otherwise = if self.eat(&Token::Else) {
                    if self.check(&Token::If) {
                        Some(vec![self.statement()?])
                    } else {
                        Some(self.body()?)
                    }
                } else {
                    None
                };
                Ok(Stmt::If(cond, then, otherwise))
            }
            Token::For => {
                self.advance();
                let parens = self.eat(&Token::LParen);
                self.eat(&Token::Let);
                let binding = self.ident()?;
                self.expect(Token::In)?;
                let iterable = self.expression()?;
                if parens {
                    self.expect(Token::RParen)?;
                }
                let body = self.block()?;
                Ok(Stmt::For(binding, iterable, body))
            }
            Token::LBrace => Ok(Stmt::Block(self.block()?)),
            _ => {
                let expr = self.expression()?;
                self.end_statement()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn export(&mut self) -> CompileResult<Stmt> {
        self.expect(Token::Export)?;
        match self.peek() {
            Token::Default => {
                self.advance();
                let value = self.expression()?;
                self.end_statement()?;
                Ok(Stmt::ExportDefault(value))
            }
            Token::Fn => {
                self.advance();
                let decl = self.function_rest(true)?;
                let name = decl.name.clone().unwrap_or_default();
                Ok(Stmt::Export(name, Expr::Function(decl)))
            }
            _ => {
                self.eat(&Token::Let);
                let name = self.ident()?;
                self.expect(Token::Assign)?;
                let value = self.expression()?;
                self.end_statement()?;
                Ok(Stmt::Export(name, value))
            }
        }
    }

    fn params(&mut self) -> CompileResult<Vec<String>> {
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        while !self.check(&Token::RParen) {
            params.push(self.ident()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(params)
    }

    /// Body after the parameter list: `{ ... }` or `=> expr`
    fn function_body(&mut self) -> CompileResult<Vec<Stmt>> {
        self.fn_depth += 1;
        let body = if self.eat(&Token::Arrow) {
            if self.check(&Token::LBrace) {
                self.block()
            } else {
                self.assignment().map(|e| vec![Stmt::Return(Some(e))])
            }
        } else {
            self.block()
        };
        self.fn_depth -= 1;
        body
    }

    /// Parse after `fn`: optional name, parameters, body
    fn function_rest(&mut self, named: bool) -> CompileResult<Arc<FunctionDecl>> {
        let name = if named || matches!(self.peek(), Token::Ident(_)) {
            Some(self.ident()?)
        } else {
            None
        };
        let params = self.params()?;
        let body = self.function_body()?;
        Ok(Arc::new(FunctionDecl { name, params, body }))
    }

    /// Whether `(` at the cursor opens an arrow parameter list
    fn at_arrow_params(&self) -> bool {
        let mut i = 1;
        loop {
            match self.peek_at(i) {
                Token::RParen => return matches!(self.peek_at(i + 1), Token::Arrow),
                Token::Ident(_) => match self.peek_at(i + 1) {
                    Token::Comma => i += 2,
                    Token::RParen => i += 1,
                    _ => return false,
                },
                _ => return false,
            }
        }
    }

    pub fn expression(&mut self) -> CompileResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> CompileResult<Expr> {
        self.nest()?;
        let expr = self.assignment_inner()?;
        self.nesting -= 1;
        Ok(expr)
    }

    fn assignment_inner(&mut self) -> CompileResult<Expr> {
        let at = self.span();
        let target = self.conditional()?;
        if self.eat(&Token::Assign) {
            if !matches!(
                target,
                Expr::Ident(..) | Expr::Member { optional: false, .. } | Expr::Index { .. }
            ) {
                return Err(CompileError::Invalid {
                    message: "invalid assignment target".into(),
                    at,
                });
            }
            let value = self.assignment()?;
            return Ok(Expr::Assign(Box::new(target), Box::new(value)));
        }
        Ok(target)
    }

    fn conditional(&mut self) -> CompileResult<Expr> {
        let cond = self.logical_or()?;
        if self.eat(&Token::Question) {
            let then = self.assignment()?;
            self.expect(Token::Colon)?;
            let otherwise = self.assignment()?;
            return Ok(Expr::Conditional(
                Box::new(cond),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(cond)
    }

    fn logical_or(&mut self) -> CompileResult<Expr> {
        let base = self.nesting;
        let mut lhs = self.logical_and()?;
        loop {
            let op = match self.peek() {
                Token::OrOr => LogicalOp::Or,
                Token::NullishCoalesce => LogicalOp::Nullish,
                _ => {
                    self.nesting = base;
                    return Ok(lhs);
                }
            };
            self.advance();
            self.nest()?;
            let rhs = self.logical_and()?;
            lhs = Expr::Logical(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn logical_and(&mut self) -> CompileResult<Expr> {
        let base = self.nesting;
        let mut lhs = self.equality()?;
        while self.eat(&Token::AndAnd) {
            self.nest()?;
            let rhs = self.equality()?;
            lhs = Expr::Logical(LogicalOp::And, Box::new(lhs), Box::new(rhs));
        }
        self.nesting = base;
        Ok(lhs)
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> CompileResult<Expr>,
        ops: &[(Token, BinaryOp)],
    ) -> CompileResult<Expr> {
        // Left-leaning chains deepen the tree without recursing here
        let base = self.nesting;
        let mut lhs = next(self)?;
        'outer: loop {
            for (token, op) in ops {
                if self.check(token) {
                    self.advance();
                    self.nest()?;
                    let rhs = next(self)?;
                    lhs = Expr::Binary(*op, Box::new(lhs), Box::new(rhs));
                    continue 'outer;
                }
            }
            self.nesting = base;
            return Ok(lhs);
        }
    }

    fn equality(&mut self) -> CompileResult<Expr> {
        self.binary_level(
            Self::comparison,
            &[(Token::Eq, BinaryOp::Eq), (Token::NotEq, BinaryOp::NotEq)],
        )
    }

    fn comparison(&mut self) -> CompileResult<Expr> {
        self.binary_level(
            Self::additive,
            &[
                (Token::Lt, BinaryOp::Lt),
                (Token::Le, BinaryOp::Le),
                (Token::Gt, BinaryOp::Gt),
                (Token::Ge, BinaryOp::Ge),
            ],
        )
    }

    fn additive(&mut self) -> CompileResult<Expr> {
        self.binary_level(
            Self::multiplicative,
            &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
        )
    }

    fn multiplicative(&mut self) -> CompileResult<Expr> {
        self.binary_level(
            Self::unary,
            &[
                (Token::Star, BinaryOp::Mul),
                (Token::Slash, BinaryOp::Div),
                (Token::Percent, BinaryOp::Rem),
            ],
        )
    }

    fn unary(&mut self) -> CompileResult<Expr> {
        let op = match self.peek() {
            Token::Bang => UnaryOp::Not,
            Token::Minus => UnaryOp::Neg,
            _ => return self.postfix(),
        };
        self.advance();
        self.nest()?;
        let operand = self.unary()?;
        self.nesting -= 1;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    /// Property name after `.`; keywords are allowed
    fn property_name(&mut self) -> CompileResult<String> {
        if let Token::Ident(name) = self.peek() {
            let name = name.clone();
            self.advance();
            return Ok(name);
        }
        match self.peek().keyword_text() {
            Some(word) => {
                self.advance();
                Ok(word.to_string())
            }
            None => Err(self.unexpected("property name")),
        }
    }

    fn arguments(&mut self) -> CompileResult<Vec<Element>> {
        let mut args = Vec::new();
        while !self.check(&Token::RParen) {
            args.push(self.element()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(args)
    }

    fn element(&mut self) -> CompileResult<Element> {
        if self.eat(&Token::Ellipsis) {
            Ok(Element::Spread(self.assignment()?))
        } else {
            Ok(Element::Item(self.assignment()?))
        }
    }

    fn postfix(&mut self) -> CompileResult<Expr> {
        let base = self.nesting;
        let mut expr = self.primary()?;
        loop {
            if matches!(
                self.peek(),
                Token::LParen | Token::Dot | Token::QuestionDot | Token::LBracket
            ) {
                self.nest()?;
            }
            match self.peek() {
                Token::LParen => {
                    let span = self.span();
                    self.advance();
                    let args = self.arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        span,
                    };
                }
                Token::Dot | Token::QuestionDot => {
                    let optional = self.advance() == Token::QuestionDot;
                    let property = self.property_name()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        optional,
                    };
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => {
                    self.nesting = base;
                    return Ok(expr);
                }
            }
        }
    }

    fn primary(&mut self) -> CompileResult<Expr> {
        let at = self.span();
        match self.peek().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Token::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            Token::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            Token::Null => {
                self.advance();
                Ok(Expr::Null)
            }
            Token::Ident(name) => {
                self.advance();
                if self.check(&Token::Arrow) {
                    let body = self.function_body()?;
                    return Ok(Expr::Function(Arc::new(FunctionDecl {
                        name: None,
                        params: vec![name],
                        body,
                    })));
                }
                Ok(Expr::Ident(name, at))
            }
            Token::Fn => {
                self.advance();
                Ok(Expr::Function(self.function_rest(false)?))
            }
            Token::LParen => {
                if self.at_arrow_params() {
                    let params = self.params()?;
                    let body = self.function_body()?;
                    return Ok(Expr::Function(Arc::new(FunctionDecl {
                        name: None,
                        params,
                        body,
                    })));
                }
                self.advance();
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.check(&Token::RBracket) {
                    items.push(self.element()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expr::Array(items))
            }
            Token::LBrace => self.object(),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn object(&mut self) -> CompileResult<Expr> {
        self.expect(Token::LBrace)?;
        let mut props = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.eat(&Token::Ellipsis) {
                props.push(Property::Spread(self.assignment()?));
            } else if self.eat(&Token::LBracket) {
                let key = self.expression()?;
                self.expect(Token::RBracket)?;
                self.expect(Token::Colon)?;
                props.push(Property::Computed(key, self.assignment()?));
            } else {
                let at = self.span();
                let key = match self.peek().clone() {
                    Token::Str(s) => {
                        self.advance();
                        s.to_string()
                    }
                    Token::Number(n) => {
                        self.advance();
                        crate::sandbox::value::number_to_string(n)
                    }
                    _ => self.property_name()?,
                };
                if self.eat(&Token::Colon) {
                    props.push(Property::Field(key, self.assignment()?));
                } else if self.check(&Token::LParen) {
                    let params = self.params()?;
                    let body = self.function_body()?;
                    let decl = FunctionDecl {
                        name: Some(key.clone()),
                        params,
                        body,
                    };
                    props.push(Property::Field(key, Expr::Function(Arc::new(decl))));
                } else {
                    props.push(Property::Field(key.clone(), Expr::Ident(key, at)));
                }
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBrace)?;
        Ok(Expr::Object(props))
    }
}

/// Lex and parse a source unit
pub fn parse(source: &str) -> CompileResult<Program> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).parse_program()
}
