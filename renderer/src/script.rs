//! A small built-in evaluator so documents render out of the box and
//! tests have a deterministic runtime. Statements are line-oriented:
//! `name = expr` binds a variable silently; a bare expression whose
//! value is not Unit becomes a text artifact, mirroring an interactive
//! statistics console. `#` starts a comment.

use crate::context::ExecutionContext;
use crate::error::EvalError;
use crate::evaluator::{Evaluator, OutputArtifact};
use crate::value::Value;

#[derive(Debug, Default)]
pub struct ScriptEvaluator;

impl ScriptEvaluator {
    pub fn new() -> Self {
        ScriptEvaluator
    }
}

impl Evaluator for ScriptEvaluator {
    fn execute(
        &mut self,
        code: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<Vec<OutputArtifact>, EvalError> {
        let mut artifacts = Vec::new();

        for line in code.lines() {
            let line = strip_comment(line).trim();
            if line.is_empty() {
                continue;
            }
            match parse_statement(line)? {
                Statement::Assign(name, expr) => {
                    let value = eval(&expr, ctx, &mut artifacts)?;
                    ctx.set(name, value);
                }
                Statement::Expr(expr) => {
                    let value = eval(&expr, ctx, &mut artifacts)?;
                    if !matches!(value, Value::Unit) {
                        artifacts.push(OutputArtifact::Text(value.to_string()));
                    }
                }
            }
        }

        Ok(artifacts)
    }

    fn eval_inline(
        &mut self,
        code: &str,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, EvalError> {
        let tokens = tokenize(code)?;
        let mut parser = Parser::new(tokens);
        let expr = parser.parse_expr(0)?;
        parser.finish()?;
        // Inline expressions may emit artifacts (a print call); those
        // have nowhere to go in narrative text, so they are dropped.
        let mut scratch = Vec::new();
        eval(&expr, ctx, &mut scratch)
    }
}

// ---------------------------------------------------------------------------
// Statements and expressions
// ---------------------------------------------------------------------------

enum Statement {
    Assign(String, Expr),
    Expr(Expr),
}

#[derive(Debug, Clone)]
enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Var(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

fn parse_statement(line: &str) -> Result<Statement, EvalError> {
    let tokens = tokenize(line)?;
    let mut parser = Parser::new(tokens);

    if let (Some(Token::Ident(name)), Some(Token::Assign)) =
        (parser.tokens.first(), parser.tokens.get(1))
    {
        let name = name.clone();
        parser.pos = 2;
        let expr = parser.parse_expr(0)?;
        parser.finish()?;
        return Ok(Statement::Assign(name, expr));
    }

    let expr = parser.parse_expr(0)?;
    parser.finish()?;
    Ok(Statement::Expr(expr))
}

/// Cut a trailing comment, respecting quoted strings.
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    for (i, c) in line.char_indices() {
        match c {
            '"' | '\'' => match quote {
                Some(q) if q == c => quote = None,
                None => quote = Some(c),
                _ => {}
            },
            '#' if quote.is_none() => return &line[..i],
            _ => {}
        }
    }
    line
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    AndAnd,
    OrOr,
    Not,
    Assign,
    LParen,
    RParen,
    Comma,
}

fn tokenize(src: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            // A leading '.' starts a number only when a digit follows;
            // otherwise it starts an identifier (names like `.hidden`).
            c if c.is_ascii_digit()
                || (c == '.'
                    && src[start + 1..].starts_with(|d: char| d.is_ascii_digit())) =>
            {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &src[start..end];
                let n = text.parse::<f64>().map_err(|_| {
                    EvalError::Syntax(format!("invalid number literal '{}'", text))
                })?;
                tokens.push(Token::Number(n));
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut content = String::new();
                let mut closed = false;
                for (_, d) in chars.by_ref() {
                    if d == quote {
                        closed = true;
                        break;
                    }
                    content.push(d);
                }
                if !closed {
                    return Err(EvalError::Syntax("unterminated string literal".to_string()));
                }
                tokens.push(Token::Str(content));
            }
            c if c.is_alphabetic() || c == '_' || c == '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(src[start..end].to_string()));
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
            '^' => {
                chars.next();
                tokens.push(Token::Caret);
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
            '=' => {
                chars.next();
                if chars.peek().is_some_and(|&(_, d)| d == '=') {
                    chars.next();
                    tokens.push(Token::EqEq);
                } else {
                    tokens.push(Token::Assign);
                }
            }
            '!' => {
                chars.next();
                if chars.peek().is_some_and(|&(_, d)| d == '=') {
                    chars.next();
                    tokens.push(Token::NotEq);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '<' => {
                chars.next();
                if chars.peek().is_some_and(|&(_, d)| d == '=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek().is_some_and(|&(_, d)| d == '=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '&' => {
                chars.next();
                if chars.peek().is_some_and(|&(_, d)| d == '&') {
                    chars.next();
                    tokens.push(Token::AndAnd);
                } else {
                    return Err(EvalError::Syntax("expected '&&'".to_string()));
                }
            }
            '|' => {
                chars.next();
                if chars.peek().is_some_and(|&(_, d)| d == '|') {
                    chars.next();
                    tokens.push(Token::OrOr);
                } else {
                    return Err(EvalError::Syntax("expected '||'".to_string()));
                }
            }
            other => {
                return Err(EvalError::Syntax(format!(
                    "unexpected character '{}'",
                    other
                )));
            }
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser (precedence climbing)
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn finish(&self) -> Result<(), EvalError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(EvalError::Syntax("unexpected trailing input".to_string()))
        }
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_prefix()?;

        while let Some(tok) = self.peek() {
            let Some((op, lbp, rbp)) = binary_op(tok) else {
                break;
            };
            if lbp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_expr(rbp)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, EvalError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" | "TRUE" => Ok(Expr::Bool(true)),
                "false" | "FALSE" => Ok(Expr::Bool(false)),
                _ => {
                    if self.peek() == Some(&Token::LParen) {
                        self.advance();
                        let args = self.parse_args()?;
                        Ok(Expr::Call(name, args))
                    } else {
                        Ok(Expr::Var(name))
                    }
                }
            },
            // Unary minus binds below ^ so -x^2 reads as -(x^2),
            // matching the source material's conventions.
            Some(Token::Minus) => {
                let operand = self.parse_expr(13)?;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)))
            }
            // ! binds below comparisons: !x == y reads as !(x == y).
            Some(Token::Not) => {
                let operand = self.parse_expr(5)?;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)))
            }
            Some(Token::LParen) => {
                let inner = self.parse_expr(0)?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(EvalError::Syntax("expected ')'".to_string())),
                }
            }
            Some(other) => Err(EvalError::Syntax(format!(
                "unexpected token {:?}",
                other
            ))),
            None => Err(EvalError::Syntax("unexpected end of expression".to_string())),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, EvalError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr(0)?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                _ => return Err(EvalError::Syntax("expected ',' or ')'".to_string())),
            }
        }
        Ok(args)
    }
}

fn binary_op(tok: &Token) -> Option<(BinaryOp, u8, u8)> {
    Some(match tok {
        Token::OrOr => (BinaryOp::Or, 1, 2),
        Token::AndAnd => (BinaryOp::And, 3, 4),
        Token::EqEq => (BinaryOp::Eq, 5, 6),
        Token::NotEq => (BinaryOp::Ne, 5, 6),
        Token::Lt => (BinaryOp::Lt, 7, 8),
        Token::Gt => (BinaryOp::Gt, 7, 8),
        Token::Le => (BinaryOp::Le, 7, 8),
        Token::Ge => (BinaryOp::Ge, 7, 8),
        Token::Plus => (BinaryOp::Add, 9, 10),
        Token::Minus => (BinaryOp::Sub, 9, 10),
        Token::Star => (BinaryOp::Mul, 11, 12),
        Token::Slash => (BinaryOp::Div, 11, 12),
        Token::Percent => (BinaryOp::Rem, 11, 12),
        Token::Caret => (BinaryOp::Pow, 14, 13), // right-associative
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn eval(
    expr: &Expr,
    ctx: &mut ExecutionContext,
    artifacts: &mut Vec<OutputArtifact>,
) -> Result<Value, EvalError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Boolean(*b)),
        Expr::Var(name) => ctx
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UndefinedVariable(name.clone())),
        Expr::Unary(op, operand) => {
            let val = eval(operand, ctx, artifacts)?;
            match op {
                UnaryOp::Neg => Ok(Value::Number(-coerce_number(&val)?)),
                UnaryOp::Not => Ok(Value::Boolean(val.is_falsy())),
            }
        }
        Expr::Binary(op, left, right) => {
            let l = eval(left, ctx, artifacts)?;
            let r = eval(right, ctx, artifacts)?;
            eval_binary(*op, &l, &r)
        }
        Expr::Call(name, args) => {
            let values: Vec<Value> = args
                .iter()
                .map(|a| eval(a, ctx, artifacts))
                .collect::<Result<_, _>>()?;
            call_builtin(name, &values, artifacts)
        }
    }
}

fn eval_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            _ => Err(EvalError::TypeError {
                expected: "matching numeric or string types".to_string(),
                got: format!("{} + {}", left.type_name(), right.type_name()),
            }),
        },
        BinaryOp::Sub => numeric_binop(left, right, |a, b| a - b),
        BinaryOp::Mul => numeric_binop(left, right, |a, b| a * b),
        BinaryOp::Div => {
            let a = coerce_number(left)?;
            let b = coerce_number(right)?;
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Number(a / b))
        }
        BinaryOp::Rem => {
            let a = coerce_number(left)?;
            let b = coerce_number(right)?;
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Number(a % b))
        }
        BinaryOp::Pow => numeric_binop(left, right, f64::powf),
        BinaryOp::Eq => Ok(Value::Boolean(left == right)),
        BinaryOp::Ne => Ok(Value::Boolean(left != right)),
        BinaryOp::Lt => numeric_cmp(left, right, |a, b| a < b),
        BinaryOp::Gt => numeric_cmp(left, right, |a, b| a > b),
        BinaryOp::Le => numeric_cmp(left, right, |a, b| a <= b),
        BinaryOp::Ge => numeric_cmp(left, right, |a, b| a >= b),
        BinaryOp::And => Ok(Value::Boolean(left.is_truthy() && right.is_truthy())),
        BinaryOp::Or => Ok(Value::Boolean(left.is_truthy() || right.is_truthy())),
    }
}

fn call_builtin(
    name: &str,
    args: &[Value],
    artifacts: &mut Vec<OutputArtifact>,
) -> Result<Value, EvalError> {
    match name {
        "print" => {
            let arg = single_arg(name, args)?;
            artifacts.push(OutputArtifact::Text(arg.to_string()));
            Ok(Value::Unit)
        }
        "round" => {
            let x = coerce_number(first_arg(name, args)?)?;
            let digits = match args.get(1) {
                Some(v) => coerce_number(v)? as i32,
                None => 0,
            };
            let factor = 10f64.powi(digits);
            Ok(Value::Number((x * factor).round() / factor))
        }
        "sqrt" => {
            let x = coerce_number(single_arg(name, args)?)?;
            Ok(Value::Number(x.sqrt()))
        }
        "paste" => {
            let joined = args
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            Ok(Value::String(joined))
        }
        "figure" => {
            let path = match first_arg(name, args)? {
                Value::String(s) => s.clone(),
                other => {
                    return Err(EvalError::TypeError {
                        expected: "String".to_string(),
                        got: other.type_name().to_string(),
                    });
                }
            };
            artifacts.push(OutputArtifact::Figure {
                path,
                caption: None,
            });
            Ok(Value::Unit)
        }
        "table" => {
            // First argument is the comma-separated header row, the
            // rest are data rows.
            let mut rows_iter = args.iter().map(|v| match v {
                Value::String(s) => Ok(split_csv(s)),
                other => Err(EvalError::TypeError {
                    expected: "String".to_string(),
                    got: other.type_name().to_string(),
                }),
            });
            let headers = rows_iter
                .next()
                .ok_or_else(|| EvalError::Custom("table() needs a header row".to_string()))??;
            let rows = rows_iter.collect::<Result<Vec<_>, _>>()?;
            artifacts.push(OutputArtifact::Table {
                headers,
                rows,
                caption: None,
            });
            Ok(Value::Unit)
        }
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',').map(|c| c.trim().to_string()).collect()
}

fn single_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, EvalError> {
    match args {
        [one] => Ok(one),
        _ => Err(EvalError::Custom(format!(
            "{}() takes exactly one argument, got {}",
            name,
            args.len()
        ))),
    }
}

fn first_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, EvalError> {
    args.first().ok_or_else(|| {
        EvalError::Custom(format!("{}() needs at least one argument", name))
    })
}

fn coerce_number(val: &Value) -> Result<f64, EvalError> {
    match val {
        Value::Number(n) => Ok(*n),
        other => Err(EvalError::TypeError {
            expected: "Number".to_string(),
            got: other.type_name().to_string(),
        }),
    }
}

fn numeric_binop(
    left: &Value,
    right: &Value,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    let a = coerce_number(left)?;
    let b = coerce_number(right)?;
    Ok(Value::Number(f(a, b)))
}

fn numeric_cmp(
    left: &Value,
    right: &Value,
    f: impl Fn(f64, f64) -> bool,
) -> Result<Value, EvalError> {
    let a = coerce_number(left)?;
    let b = coerce_number(right)?;
    Ok(Value::Boolean(f(a, b)))
}
