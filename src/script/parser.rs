// src/script/parser.rs

//! Recursive-descent parser producing the script AST.

use serde_json::Value;

use super::lexer::{Token, TokenKind};
use super::ScriptError;

/// Nesting limit for blocks and sub-expressions.
const MAX_DEPTH: usize = 64;

const KEYWORDS: &[&str] = &[
    "let", "if", "else", "while", "return", "delete", "true", "false", "null",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Ident(String),
    Member {
        target: Box<Expr>,
        name: String,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Let { name: String, value: Expr },
    Assign { target: Expr, value: Expr },
    Delete(Expr),
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    While { cond: Expr, body: Vec<Stmt> },
    Return,
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

/// A parsed script.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

pub fn parse_program(tokens: Vec<Token>) -> Result<Program, ScriptError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let mut stmts = Vec::new();
    while !parser.at(&TokenKind::Eof) {
        stmts.push(parser.statement()?);
    }
    Ok(Program { stmts })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token stream always ends with `Eof`, and `advance` never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn line(&self) -> usize {
        self.peek().line
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn at_keyword(&self, word: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(s) if s == word)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ScriptError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {what}, found {}", describe(&self.peek().kind))))
        }
    }

    fn error(&self, message: String) -> ScriptError {
        ScriptError::Syntax {
            line: self.line(),
            message,
        }
    }

    fn enter(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("script is nested too deeply".to_string()));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        let line = self.line();

        let kind = if self.at_keyword("let") {
            self.advance();
            let name = self.identifier("variable name")?;
            self.expect(&TokenKind::Assign, "'='")?;
            let value = self.expression()?;
            self.end_statement();
            StmtKind::Let { name, value }
        } else if self.at_keyword("if") {
            self.if_statement()?
        } else if self.at_keyword("while") {
            self.advance();
            let cond = self.expression()?;
            let body = self.block()?;
            StmtKind::While { cond, body }
        } else if self.at_keyword("return") {
            self.advance();
            self.end_statement();
            StmtKind::Return
        } else if self.at_keyword("delete") {
            self.advance();
            let target = self.postfix()?;
            ensure_place(&target).map_err(|m| self.error(m))?;
            self.end_statement();
            StmtKind::Delete(target)
        } else {
            let expr = self.expression()?;
            if self.eat(&TokenKind::Assign) {
                ensure_place(&expr).map_err(|m| self.error(m))?;
                let value = self.expression()?;
                self.end_statement();
                StmtKind::Assign {
                    target: expr,
                    value,
                }
            } else {
                self.end_statement();
                StmtKind::Expr(expr)
            }
        };

        Ok(Stmt { kind, line })
    }

    fn if_statement(&mut self) -> Result<StmtKind, ScriptError> {
        self.advance();
        let cond = self.expression()?;
        let then_branch = self.block()?;
        let else_branch = if self.at_keyword("else") {
            self.advance();
            if self.at_keyword("if") {
                let line = self.line();
                let nested = self.if_statement()?;
                Some(vec![Stmt { kind: nested, line }])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        self.enter()?;
        let mut stmts = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            if self.at(&TokenKind::Eof) {
                return Err(self.error("unterminated block, expected '}'".to_string()));
            }
            stmts.push(self.statement()?);
        }
        self.advance();
        self.leave();
        Ok(stmts)
    }

    /// Semicolons are optional terminators.
    fn end_statement(&mut self) {
        while self.eat(&TokenKind::Semi) {}
    }

    fn identifier(&mut self, what: &str) -> Result<String, ScriptError> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) if !KEYWORDS.contains(&name.as_str()) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected {what}, found {}", describe(&other)))),
        }
    }

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.enter()?;
        let expr = self.logical_or();
        self.leave();
        expr
    }

    fn logical_or(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.logical_and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.logical_and()?;
            left = Expr::Logical {
                left: Box::new(left),
                op: LogicalOp::Or,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.equality()?;
        while self.eat(&TokenKind::And) {
            let right = self.equality()?;
            left = Expr::Logical {
                left: Box::new(left),
                op: LogicalOp::And,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::Ne => BinaryOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.comparison()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            self.advance();
            let right = self.additive()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.multiplicative()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            let right = self.unary()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek().kind {
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            _ => return self.postfix(),
        };
        self.advance();
        self.enter()?;
        let operand = self.unary();
        self.leave();
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                // Member names may be keywords (`msg.delete`), so read the raw identifier.
                let name = match self.advance().kind {
                    TokenKind::Ident(name) => name,
                    other => {
                        return Err(self.error(format!(
                            "expected property name after '.', found {}",
                            describe(&other)
                        )));
                    }
                };
                expr = Expr::Member {
                    target: Box::new(expr),
                    name,
                };
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.expression()?;
                self.expect(&TokenKind::RBracket, "']'")?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat(&TokenKind::LParen) {
                let args = self.list(&TokenKind::RParen, "')'")?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn list(&mut self, close: &TokenKind, what: &str) -> Result<Vec<Expr>, ScriptError> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(&TokenKind::Comma, &format!("',' or {what}"))?;
            // Allow a trailing comma.
            if self.eat(close) {
                return Ok(items);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Num(n) => Ok(Expr::Literal(super::value::number(n))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::Ident(word) if KEYWORDS.contains(&word.as_str()) => {
                match word.as_str() {
                    "true" => Ok(Expr::Literal(Value::Bool(true))),
                    "false" => Ok(Expr::Literal(Value::Bool(false))),
                    "null" => Ok(Expr::Literal(Value::Null)),
                    w => Err(ScriptError::Syntax {
                        line: tok.line,
                        message: format!("unexpected keyword '{w}'"),
                    }),
                }
            }
            TokenKind::Ident(word) => Ok(Expr::Ident(word)),
            TokenKind::LParen => {
                let expr = self.expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.enter()?;
                let items = self.list(&TokenKind::RBracket, "']'");
                self.leave();
                Ok(Expr::Array(items?))
            }
            TokenKind::LBrace => {
                self.enter()?;
                let fields = self.object_fields();
                self.leave();
                Ok(Expr::Object(fields?))
            }
            other => Err(ScriptError::Syntax {
                line: tok.line,
                message: format!("unexpected {}", describe(&other)),
            }),
        }
    }

    fn object_fields(&mut self) -> Result<Vec<(String, Expr)>, ScriptError> {
        let mut fields = Vec::new();
        loop {
            if self.eat(&TokenKind::RBrace) {
                return Ok(fields);
            }
            let key = match self.advance().kind {
                TokenKind::Ident(k) | TokenKind::Str(k) => k,
                other => {
                    return Err(self.error(format!(
                        "expected object key, found {}",
                        describe(&other)
                    )));
                }
            };
            self.expect(&TokenKind::Colon, "':'")?;
            let value = self.expression()?;
            fields.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RBrace, "',' or '}'")?;
                return Ok(fields);
            }
        }
    }
}

fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
    Expr::Binary {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

/// Only variables and property/index chains can be assigned or deleted.
fn ensure_place(expr: &Expr) -> Result<(), String> {
    match expr {
        Expr::Ident(_) => Ok(()),
        Expr::Member { target, .. } | Expr::Index { target, .. } => ensure_place(target),
        _ => Err("invalid assignment target".to_string()),
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(s) => format!("'{s}'"),
        TokenKind::Str(_) => "string".to_string(),
        TokenKind::Num(n) => format!("number {n}"),
        TokenKind::Eof => "end of script".to_string(),
        other => format!("{other:?}"),
    }
}
