//! A small expression language over key→value maps.
//!
//! Score formulas evaluate these expressions against decoded artifact
//! payloads; the in-memory registry evaluates them as listing filters.
//! Supported: int/float/bool/string literals, dotted identifiers resolving
//! into the context map, unary `-`/`!`, arithmetic, comparisons, `&&`/`||`,
//! and the functions `min`, `max`, `size`, `int`, `double`.

use crate::error::{Error, Result};
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Str(_) => "string",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Evaluate `expr` against a JSON object context.
pub fn evaluate(expr: &str, ctx: &serde_json::Value) -> Result<Value> {
    let tokens = lex(expr)?;
    let mut parser = Parser { tokens, pos: 0 };
    let ast = parser.expression()?;
    if parser.pos != parser.tokens.len() {
        return Err(Error::expression(format!(
            "unexpected trailing input in {:?}",
            expr
        )));
    }
    eval(&ast, ctx)
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    AndAnd,
    OrOr,
    Not,
    LParen,
    RParen,
    Comma,
}

fn lex(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '0'..='9' => {
                let mut text = String::new();
                let mut is_float = false;
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        text.push(d);
                        chars.next();
                    } else if d == '.' && !is_float {
                        // Lookahead: "1.5" is a float, "a.b" never reaches here.
                        let mut ahead = chars.clone();
                        ahead.next();
                        if ahead.peek().is_some_and(|n| n.is_ascii_digit()) {
                            is_float = true;
                            text.push(d);
                            chars.next();
                        } else {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                if is_float {
                    let v = text
                        .parse::<f64>()
                        .map_err(|e| Error::expression(format!("bad float {:?}: {}", text, e)))?;
                    tokens.push(Token::Float(v));
                } else {
                    let v = text
                        .parse::<i64>()
                        .map_err(|e| Error::expression(format!("bad int {:?}: {}", text, e)))?;
                    tokens.push(Token::Int(v));
                }
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut text = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' || d == '.' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(text));
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(d) = chars.next() {
                    if d == quote {
                        closed = true;
                        break;
                    }
                    text.push(d);
                }
                if !closed {
                    return Err(Error::expression(format!(
                        "unterminated string in {:?}",
                        input
                    )));
                }
                tokens.push(Token::Str(text));
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::EqEq);
                } else {
                    return Err(Error::expression("single '=' is not an operator".to_string()));
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '&' => {
                chars.next();
                if chars.peek() == Some(&'&') {
                    chars.next();
                    tokens.push(Token::AndAnd);
                } else {
                    return Err(Error::expression("single '&' is not an operator".to_string()));
                }
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                    tokens.push(Token::OrOr);
                } else {
                    return Err(Error::expression("single '|' is not an operator".to_string()));
                }
            }
            other => {
                return Err(Error::expression(format!(
                    "unexpected character {:?} in {:?}",
                    other, input
                )))
            }
        }
    }
    Ok(tokens)
}

#[derive(Clone, Debug)]
enum Expr {
    Lit(Value),
    Ident(String),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Clone, Copy, Debug)]
enum UnOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, t: &Token) -> bool {
        if self.peek() == Some(t) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expression(&mut self) -> Result<Expr> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut left = self.and_expr()?;
        while self.eat(&Token::OrOr) {
            let right = self.and_expr()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut left = self.cmp_expr()?;
        while self.eat(&Token::AndAnd) {
            let right = self.cmp_expr()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn cmp_expr(&mut self) -> Result<Expr> {
        let left = self.add_expr()?;
        let op = match self.peek() {
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            Some(Token::EqEq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.add_expr()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn add_expr(&mut self) -> Result<Expr> {
        let mut left = self.mul_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.mul_expr()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn mul_expr(&mut self) -> Result<Expr> {
        let mut left = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary_expr()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary_expr(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Unary(UnOp::Neg, Box::new(self.unary_expr()?)));
        }
        if self.eat(&Token::Not) {
            return Ok(Expr::Unary(UnOp::Not, Box::new(self.unary_expr()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.bump() {
            Some(Token::Int(i)) => Ok(Expr::Lit(Value::Int(i))),
            Some(Token::Float(f)) => Ok(Expr::Lit(Value::Float(f))),
            Some(Token::Str(s)) => Ok(Expr::Lit(Value::Str(s))),
            Some(Token::Ident(id)) => {
                if id == "true" {
                    return Ok(Expr::Lit(Value::Bool(true)));
                }
                if id == "false" {
                    return Ok(Expr::Lit(Value::Bool(false)));
                }
                if self.eat(&Token::LParen) {
                    let mut args = Vec::new();
                    if !self.eat(&Token::RParen) {
                        loop {
                            args.push(self.expression()?);
                            if self.eat(&Token::RParen) {
                                break;
                            }
                            if !self.eat(&Token::Comma) {
                                return Err(Error::expression(format!(
                                    "expected ',' or ')' in call to {}",
                                    id
                                )));
                            }
                        }
                    }
                    return Ok(Expr::Call(id, args));
                }
                Ok(Expr::Ident(id))
            }
            Some(Token::LParen) => {
                let inner = self.expression()?;
                if !self.eat(&Token::RParen) {
                    return Err(Error::expression("missing closing ')'".to_string()));
                }
                Ok(inner)
            }
            other => Err(Error::expression(format!(
                "unexpected token {:?}",
                other
            ))),
        }
    }
}

/// Resolve a dotted identifier path inside the context object.
fn lookup<'a>(path: &str, ctx: &'a serde_json::Value) -> Result<&'a serde_json::Value> {
    let mut current = ctx;
    for part in path.split('.') {
        current = current
            .get(part)
            .ok_or_else(|| Error::expression(format!("unknown identifier {:?}", path)))?;
    }
    Ok(current)
}

fn json_to_value(path: &str, v: &serde_json::Value) -> Result<Value> {
    match v {
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::String(s) => Ok(Value::Str(s.clone())),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Float(f))
            } else {
                Err(Error::expression(format!("{:?} is out of range", path)))
            }
        }
        other => Err(Error::expression(format!(
            "{:?} is not a scalar (found {})",
            path,
            kind_of(other)
        ))),
    }
}

fn kind_of(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn eval(expr: &Expr, ctx: &serde_json::Value) -> Result<Value> {
    match expr {
        Expr::Lit(v) => Ok(v.clone()),
        Expr::Ident(path) => json_to_value(path, lookup(path, ctx)?),
        Expr::Unary(op, inner) => {
            let v = eval(inner, ctx)?;
            match (op, v) {
                (UnOp::Neg, Value::Int(i)) => Ok(Value::Int(-i)),
                (UnOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
                (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                (op, v) => Err(Error::expression(format!(
                    "cannot apply {:?} to {}",
                    op,
                    v.type_name()
                ))),
            }
        }
        Expr::Binary(op, l, r) => eval_binary(*op, l, r, ctx),
        Expr::Call(name, args) => eval_call(name, args, ctx),
    }
}

fn eval_binary(op: BinOp, l: &Expr, r: &Expr, ctx: &serde_json::Value) -> Result<Value> {
    // Short-circuit the boolean connectives.
    if op == BinOp::And || op == BinOp::Or {
        let lv = expect_bool(eval(l, ctx)?)?;
        if op == BinOp::And && !lv {
            return Ok(Value::Bool(false));
        }
        if op == BinOp::Or && lv {
            return Ok(Value::Bool(true));
        }
        return Ok(Value::Bool(expect_bool(eval(r, ctx)?)?));
    }

    let lv = eval(l, ctx)?;
    let rv = eval(r, ctx)?;
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => arith(op, lv, rv),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => compare(op, lv, rv),
        BinOp::Eq | BinOp::Ne => {
            let eq = equals(&lv, &rv)?;
            Ok(Value::Bool(if op == BinOp::Eq { eq } else { !eq }))
        }
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

fn expect_bool(v: Value) -> Result<bool> {
    match v {
        Value::Bool(b) => Ok(b),
        other => Err(Error::expression(format!(
            "expected bool, found {}",
            other.type_name()
        ))),
    }
}

fn arith(op: BinOp, l: Value, r: Value) -> Result<Value> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => match op {
            BinOp::Add => Ok(Value::Int(a + b)),
            BinOp::Sub => Ok(Value::Int(a - b)),
            BinOp::Mul => Ok(Value::Int(a * b)),
            BinOp::Div => {
                if b == 0 {
                    Err(Error::expression("division by zero".to_string()))
                } else {
                    Ok(Value::Int(a / b))
                }
            }
            BinOp::Rem => {
                if b == 0 {
                    Err(Error::expression("division by zero".to_string()))
                } else {
                    Ok(Value::Int(a % b))
                }
            }
            _ => unreachable!(),
        },
        (l, r) => {
            let (a, b) = match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(Error::expression(format!(
                        "cannot apply {:?} to {} and {}",
                        op,
                        l.type_name(),
                        r.type_name()
                    )))
                }
            };
            match op {
                BinOp::Add => Ok(Value::Float(a + b)),
                BinOp::Sub => Ok(Value::Float(a - b)),
                BinOp::Mul => Ok(Value::Float(a * b)),
                BinOp::Div => {
                    if b == 0.0 {
                        Err(Error::expression("division by zero".to_string()))
                    } else {
                        Ok(Value::Float(a / b))
                    }
                }
                BinOp::Rem => Ok(Value::Float(a % b)),
                _ => unreachable!(),
            }
        }
    }
}

fn compare(op: BinOp, l: Value, r: Value) -> Result<Value> {
    let ordering = match (&l, &r) {
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        _ => {
            let (a, b) = match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(Error::expression(format!(
                        "cannot compare {} and {}",
                        l.type_name(),
                        r.type_name()
                    )))
                }
            };
            a.partial_cmp(&b)
                .ok_or_else(|| Error::expression("incomparable values".to_string()))?
        }
    };
    let result = match op {
        BinOp::Lt => ordering.is_lt(),
        BinOp::Le => ordering.is_le(),
        BinOp::Gt => ordering.is_gt(),
        BinOp::Ge => ordering.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn equals(l: &Value, r: &Value) -> Result<bool> {
    match (l, r) {
        (Value::Str(a), Value::Str(b)) => Ok(a == b),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => Ok(a == b),
            _ => Err(Error::expression(format!(
                "cannot compare {} and {}",
                l.type_name(),
                r.type_name()
            ))),
        },
    }
}

fn eval_call(name: &str, args: &[Expr], ctx: &serde_json::Value) -> Result<Value> {
    match name {
        "min" | "max" => {
            if args.len() != 2 {
                return Err(Error::expression(format!("{} takes two arguments", name)));
            }
            let l = eval(&args[0], ctx)?;
            let r = eval(&args[1], ctx)?;
            match (&l, &r) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(if name == "min" {
                    *a.min(b)
                } else {
                    *a.max(b)
                })),
                _ => {
                    let (a, b) = match (l.as_f64(), r.as_f64()) {
                        (Some(a), Some(b)) => (a, b),
                        _ => {
                            return Err(Error::expression(format!(
                                "{} needs numeric arguments",
                                name
                            )))
                        }
                    };
                    Ok(Value::Float(if name == "min" { a.min(b) } else { a.max(b) }))
                }
            }
        }
        "size" => {
            if args.len() != 1 {
                return Err(Error::expression("size takes one argument".to_string()));
            }
            // size of an identifier counts array/object elements in place.
            if let Expr::Ident(path) = &args[0] {
                return match lookup(path, ctx)? {
                    serde_json::Value::Array(a) => Ok(Value::Int(a.len() as i64)),
                    serde_json::Value::Object(o) => Ok(Value::Int(o.len() as i64)),
                    serde_json::Value::String(s) => Ok(Value::Int(s.len() as i64)),
                    other => Err(Error::expression(format!(
                        "size of {:?} ({}) is undefined",
                        path,
                        kind_of(other)
                    ))),
                };
            }
            match eval(&args[0], ctx)? {
                Value::Str(s) => Ok(Value::Int(s.len() as i64)),
                other => Err(Error::expression(format!(
                    "size of {} is undefined",
                    other.type_name()
                ))),
            }
        }
        "int" => {
            if args.len() != 1 {
                return Err(Error::expression("int takes one argument".to_string()));
            }
            match eval(&args[0], ctx)? {
                Value::Int(i) => Ok(Value::Int(i)),
                Value::Float(f) => Ok(Value::Int(f as i64)),
                other => Err(Error::expression(format!(
                    "cannot convert {} to int",
                    other.type_name()
                ))),
            }
        }
        "double" => {
            if args.len() != 1 {
                return Err(Error::expression("double takes one argument".to_string()));
            }
            match eval(&args[0], ctx)? {
                Value::Int(i) => Ok(Value::Float(i as f64)),
                Value::Float(f) => Ok(Value::Float(f)),
                other => Err(Error::expression(format!(
                    "cannot convert {} to double",
                    other.type_name()
                ))),
            }
        }
        other => Err(Error::expression(format!("unknown function {:?}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval_ok(expr: &str, ctx: &serde_json::Value) -> Value {
        evaluate(expr, ctx).unwrap_or_else(|e| panic!("eval {:?}: {}", expr, e))
    }

    #[test]
    fn arithmetic_and_precedence() {
        let ctx = json!({});
        assert_eq!(eval_ok("2 + 3 * 4", &ctx), Value::Int(14));
        assert_eq!(eval_ok("(2 + 3) * 4", &ctx), Value::Int(20));
        assert_eq!(eval_ok("10 / 4", &ctx), Value::Int(2));
        assert_eq!(eval_ok("10.0 / 4", &ctx), Value::Float(2.5));
        assert_eq!(eval_ok("-3 + 5", &ctx), Value::Int(2));
        assert_eq!(eval_ok("7 % 4", &ctx), Value::Int(3));
    }

    #[test]
    fn identifiers_resolve_dotted_paths() {
        let ctx = json!({"stats": {"errors": 2, "score": 87.5}, "name": "petstore"});
        assert_eq!(eval_ok("stats.errors", &ctx), Value::Int(2));
        assert_eq!(eval_ok("stats.score", &ctx), Value::Float(87.5));
        assert_eq!(eval_ok("name == 'petstore'", &ctx), Value::Bool(true));
        assert!(evaluate("stats.missing", &ctx).is_err());
    }

    #[test]
    fn comparisons_and_connectives() {
        let ctx = json!({"errors": 0, "warnings": 3});
        assert_eq!(eval_ok("errors == 0 && warnings < 5", &ctx), Value::Bool(true));
        assert_eq!(eval_ok("errors > 0 || warnings >= 3", &ctx), Value::Bool(true));
        assert_eq!(eval_ok("!(errors == 0)", &ctx), Value::Bool(false));
        assert_eq!(eval_ok("warnings != 3", &ctx), Value::Bool(false));
    }

    #[test]
    fn short_circuit_skips_right_side() {
        // The right side would fail on the unknown identifier.
        let ctx = json!({"ready": false});
        assert_eq!(eval_ok("ready && missing > 0", &ctx), Value::Bool(false));
        assert_eq!(eval_ok("!ready || missing > 0", &ctx), Value::Bool(true));
    }

    #[test]
    fn functions() {
        let ctx = json!({"problems": [1, 2, 3], "tag": "v1"});
        assert_eq!(eval_ok("size(problems)", &ctx), Value::Int(3));
        assert_eq!(eval_ok("size(tag)", &ctx), Value::Int(2));
        assert_eq!(eval_ok("min(3, 7)", &ctx), Value::Int(3));
        assert_eq!(eval_ok("max(3, 7.5)", &ctx), Value::Float(7.5));
        assert_eq!(eval_ok("int(9.9)", &ctx), Value::Int(9));
        assert_eq!(eval_ok("double(2)", &ctx), Value::Float(2.0));
    }

    #[test]
    fn weighted_rollup_expression() {
        let ctx = json!({"a": 80, "b": 60});
        assert_eq!(eval_ok("a*0.7 + b*0.3", &ctx), Value::Float(74.0));
    }

    #[test]
    fn errors_are_reported_not_panicked() {
        let ctx = json!({"flag": true});
        assert!(evaluate("1 / 0", &ctx).is_err());
        assert!(evaluate("flag + 1", &ctx).is_err());
        assert!(evaluate("1 ==", &ctx).is_err());
        assert!(evaluate("'open", &ctx).is_err());
        assert!(evaluate("2 @ 2", &ctx).is_err());
    }
}
