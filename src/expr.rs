//! Custom expression sandbox
//!
//! Evaluates administrator-supplied boolean expressions over exactly three
//! bindings: `subject` (alias `user`), `resource`, and `subscription`. No
//! other state is reachable. The grammar is deliberately small:
//!
//! ```text
//! expr       := and ( "||" and )*
//! and        := unary ( "&&" unary )*
//! unary      := "!" unary | comparison
//! comparison := operand ( ("=="|"!="|">="|"<="|">"|"<") operand )?
//! operand    := number | string | true | false | null | path | "(" expr ")"
//! path       := ident ( "." ident )*
//! ```
//!
//! Execution is bounded three ways: input byte length, parser nesting
//! depth, and a wall-clock deadline checked at every evaluation step. Every
//! failure mode is an [`ExprError`]; the sandbox never panics.

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::error::ExprError;

/// The three records visible to an expression.
#[derive(Debug, Clone)]
pub struct Bindings {
    subject: Value,
    resource: Value,
    subscription: Value,
}

impl Bindings {
    pub fn new(subject: Value, resource: Value, subscription: Value) -> Self {
        Bindings {
            subject,
            resource,
            subscription,
        }
    }

    fn root(&self, name: &str) -> Result<&Value, ExprError> {
        match name {
            // `user` is an accepted alias for the subject record
            "subject" | "user" => Ok(&self.subject),
            "resource" => Ok(&self.resource),
            "subscription" => Ok(&self.subscription),
            other => Err(ExprError::UnknownBinding(other.to_string())),
        }
    }

    /// Walk a dotted path. Missing intermediate or leaf keys resolve to
    /// null rather than erroring; only an unknown root is an error.
    fn resolve(&self, path: &[String]) -> Result<Value, ExprError> {
        let mut current = self.root(&path[0])?;
        for segment in &path[1..] {
            match current.get(segment) {
                Some(value) => current = value,
                None => return Ok(Value::Null),
            }
        }
        Ok(current.clone())
    }
}

/// Sandboxed evaluator for custom policy expressions.
#[derive(Debug, Clone)]
pub struct ExpressionSandbox {
    budget: Duration,
    max_len: usize,
    max_depth: usize,
}

impl ExpressionSandbox {
    pub fn new(budget: Duration, max_len: usize, max_depth: usize) -> Self {
        ExpressionSandbox {
            budget,
            max_len,
            max_depth,
        }
    }

    /// Evaluate an expression to a boolean.
    ///
    /// A null result counts as false; any other non-boolean result is a
    /// type error. The caller decides what an error means (the condition
    /// evaluator fails closed).
    pub fn evaluate(&self, source: &str, bindings: &Bindings) -> Result<bool, ExprError> {
        if source.len() > self.max_len {
            return Err(ExprError::TooLong(self.max_len));
        }

        let tokens = lex(source)?;
        let expr = Parser::new(tokens, self.max_depth).parse()?;

        let deadline = Instant::now() + self.budget;
        match eval(&expr, bindings, deadline)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            _ => Err(ExprError::NotBoolean),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Path(Vec<String>),
}

fn lex(source: &str) -> Result<Vec<Token>, ExprError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            b')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            b'&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push(Token::And);
                    i += 2;
                } else {
                    return Err(parse_err(i, "expected '&&'"));
                }
            }
            b'|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push(Token::Or);
                    i += 2;
                } else {
                    return Err(parse_err(i, "expected '||'"));
                }
            }
            b'!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            b'=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Eq);
                    i += 2;
                } else {
                    return Err(parse_err(i, "expected '=='"));
                }
            }
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            b'<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            quote @ (b'\'' | b'"') => {
                let (token, next) = lex_string(bytes, i, quote)?;
                tokens.push(token);
                i = next;
            }
            b'0'..=b'9' => {
                let (token, next) = lex_number(source, bytes, i)?;
                tokens.push(token);
                i = next;
            }
            c if is_ident_start(c) => {
                let (token, next) = lex_word(source, bytes, i)?;
                tokens.push(token);
                i = next;
            }
            _ => return Err(parse_err(i, "unexpected character")),
        }
    }

    Ok(tokens)
}

fn lex_string(bytes: &[u8], start: usize, quote: u8) -> Result<(Token, usize), ExprError> {
    let mut value = Vec::new();
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                match bytes.get(i + 1) {
                    Some(&c @ (b'\\' | b'\'' | b'"')) => value.push(c),
                    _ => return Err(parse_err(i, "invalid escape")),
                }
                i += 2;
            }
            c if c == quote => {
                let value = String::from_utf8(value)
                    .map_err(|_| parse_err(start, "invalid utf-8 in string"))?;
                return Ok((Token::Str(value), i + 1));
            }
            c => {
                value.push(c);
                i += 1;
            }
        }
    }
    Err(parse_err(start, "unterminated string"))
}

fn lex_number(source: &str, bytes: &[u8], start: usize) -> Result<(Token, usize), ExprError> {
    let mut i = start;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    let number: f64 = source[start..i]
        .parse()
        .map_err(|_| parse_err(start, "invalid number"))?;
    Ok((Token::Number(number), i))
}

fn lex_word(source: &str, bytes: &[u8], start: usize) -> Result<(Token, usize), ExprError> {
    let mut segments = Vec::new();
    let mut i = start;

    loop {
        let seg_start = i;
        while i < bytes.len() && is_ident_char(bytes[i]) {
            i += 1;
        }
        if i == seg_start {
            return Err(parse_err(i, "expected identifier"));
        }
        segments.push(source[seg_start..i].to_string());

        // A dot continues the path only when followed by another identifier
        if i < bytes.len() && bytes[i] == b'.' && bytes.get(i + 1).copied().is_some_and(is_ident_start)
        {
            i += 1;
        } else {
            break;
        }
    }

    let token = match (segments.len(), segments[0].as_str()) {
        (1, "true") => Token::Bool(true),
        (1, "false") => Token::Bool(false),
        (1, "null") => Token::Null,
        _ => Token::Path(segments),
    };
    Ok((token, i))
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn parse_err(pos: usize, msg: &str) -> ExprError {
    ExprError::Parse {
        pos,
        msg: msg.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

#[derive(Debug, Clone)]
enum Expr {
    Lit(Value),
    Path(Vec<String>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    max_depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, max_depth: usize) -> Self {
        Parser {
            tokens,
            pos: 0,
            max_depth,
        }
    }

    fn parse(mut self) -> Result<Expr, ExprError> {
        let expr = self.or_expr(0)?;
        if self.pos != self.tokens.len() {
            return Err(parse_err(self.pos, "unexpected trailing tokens"));
        }
        Ok(expr)
    }

    fn or_expr(&mut self, depth: usize) -> Result<Expr, ExprError> {
        self.check_depth(depth)?;
        let mut lhs = self.and_expr(depth + 1)?;
        while self.eat(&Token::Or) {
            let rhs = self.and_expr(depth + 1)?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self, depth: usize) -> Result<Expr, ExprError> {
        self.check_depth(depth)?;
        let mut lhs = self.unary(depth + 1)?;
        while self.eat(&Token::And) {
            let rhs = self.unary(depth + 1)?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self, depth: usize) -> Result<Expr, ExprError> {
        self.check_depth(depth)?;
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.unary(depth + 1)?)));
        }
        self.comparison(depth + 1)
    }

    fn comparison(&mut self, depth: usize) -> Result<Expr, ExprError> {
        self.check_depth(depth)?;
        let lhs = self.operand(depth + 1)?;
        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Ge) => CmpOp::Ge,
            Some(Token::Le) => CmpOp::Le,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.operand(depth + 1)?;
        Ok(Expr::Cmp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn operand(&mut self, depth: usize) -> Result<Expr, ExprError> {
        self.check_depth(depth)?;
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => return Err(parse_err(self.pos, "unexpected end of expression")),
        };
        self.pos += 1;
        match token {
            Token::LParen => {
                let inner = self.or_expr(depth + 1)?;
                if !self.eat(&Token::RParen) {
                    return Err(parse_err(self.pos, "expected ')'"));
                }
                Ok(inner)
            }
            Token::Number(n) => {
                let number = serde_json::Number::from_f64(n)
                    .ok_or_else(|| parse_err(self.pos, "number out of range"))?;
                Ok(Expr::Lit(Value::Number(number)))
            }
            Token::Str(s) => Ok(Expr::Lit(Value::String(s))),
            Token::Bool(b) => Ok(Expr::Lit(Value::Bool(b))),
            Token::Null => Ok(Expr::Lit(Value::Null)),
            Token::Path(path) => Ok(Expr::Path(path)),
            _ => Err(parse_err(self.pos - 1, "expected operand")),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn check_depth(&self, depth: usize) -> Result<(), ExprError> {
        if depth > self.max_depth {
            return Err(ExprError::TooDeep(self.max_depth));
        }
        Ok(())
    }
}

fn eval(expr: &Expr, bindings: &Bindings, deadline: Instant) -> Result<Value, ExprError> {
    if Instant::now() >= deadline {
        return Err(ExprError::BudgetExhausted);
    }
    match expr {
        Expr::Lit(value) => Ok(value.clone()),
        Expr::Path(path) => bindings.resolve(path),
        Expr::Not(inner) => {
            let value = eval(inner, bindings, deadline)?;
            Ok(Value::Bool(!truthy(&value)?))
        }
        Expr::And(lhs, rhs) => {
            if !truthy(&eval(lhs, bindings, deadline)?)? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&eval(rhs, bindings, deadline)?)?))
        }
        Expr::Or(lhs, rhs) => {
            if truthy(&eval(lhs, bindings, deadline)?)? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&eval(rhs, bindings, deadline)?)?))
        }
        Expr::Cmp { op, lhs, rhs } => {
            let lhs = eval(lhs, bindings, deadline)?;
            let rhs = eval(rhs, bindings, deadline)?;
            Ok(Value::Bool(compare(*op, &lhs, &rhs)))
        }
    }
}

/// Boolean coercion: booleans pass through, null is false, anything else
/// is a type error.
fn truthy(value: &Value) -> Result<bool, ExprError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        _ => Err(ExprError::NotBoolean),
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> bool {
    match op {
        CmpOp::Eq => loose_eq(lhs, rhs),
        CmpOp::Ne => !loose_eq(lhs, rhs),
        CmpOp::Gt => matches!(ordering(lhs, rhs), Some(o) if o.is_gt()),
        CmpOp::Lt => matches!(ordering(lhs, rhs), Some(o) if o.is_lt()),
        CmpOp::Ge => matches!(ordering(lhs, rhs), Some(o) if o.is_ge()),
        CmpOp::Le => matches!(ordering(lhs, rhs), Some(o) if o.is_le()),
    }
}

/// Equality that treats integer and float representations of the same
/// number as equal.
fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => lhs == rhs,
    }
}

/// Ordering over two numbers or two strings; anything else is unordered
/// and every ordered comparison on it is false.
fn ordering(lhs: &Value, rhs: &Value) -> Option<std::cmp::Ordering> {
    match (lhs, rhs) {
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => lhs.as_f64()?.partial_cmp(&rhs.as_f64()?),
    }
}
