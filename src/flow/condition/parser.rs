// SPDX-License-Identifier: MIT

//! Condition expression parser
//!
//! Parses expressions like:
//! - `always` / `never`
//! - `{{context.nodeOutputs.detect.violation_detected}} == true`
//! - `total > 100 and not flags.paused`
//! - `(tier == 'poor' || tier == 'fair') && budget >= 50`

use super::ast::{CompareOp, Expression, Literal, Operand};
use thiserror::Error;

/// Failure to parse a condition string
#[derive(Debug, Error, Clone, PartialEq)]
#[error("Could not parse condition '{input}': {message}")]
pub struct ConditionError {
    pub input: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Path(String),
    Str(String),
    Number(f64),
    True,
    False,
    Null,
    Op(CompareOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

/// Parse a condition expression string into an AST
pub fn parse(input: &str) -> Result<Expression, ConditionError> {
    let trimmed = input.trim();

    // Handle special cases
    match trimmed {
        "always" | "true" => return Ok(Expression::True),
        "never" | "false" => return Ok(Expression::False),
        "" => return Err(error(input, "empty condition")),
        _ => {}
    }

    let tokens = tokenize(trimmed).map_err(|m| error(input, &m))?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or().map_err(|m| error(input, &m))?;

    if let Some(tok) = parser.peek() {
        return Err(error(input, &format!("unexpected token {:?}", tok)));
    }
    Ok(expr)
}

fn error(input: &str, message: &str) -> ConditionError {
    ConditionError {
        input: input.to_string(),
        message: message.to_string(),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match (c, next) {
            ('{', Some('{')) => {
                let start = i + 2;
                let mut end = start;
                while end + 1 < chars.len() && !(chars[end] == '}' && chars[end + 1] == '}') {
                    end += 1;
                }
                if end + 1 >= chars.len() {
                    return Err("unterminated '{{' placeholder".to_string());
                }
                let path: String = chars[start..end].iter().collect::<String>().trim().to_string();
                if path.is_empty() {
                    return Err("empty '{{}}' placeholder".to_string());
                }
                tokens.push(Token::Path(path));
                i = end + 2;
            }
            ('(', _) => {
                tokens.push(Token::LParen);
                i += 1;
            }
            (')', _) => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ('&', Some('&')) => {
                tokens.push(Token::And);
                i += 2;
            }
            ('|', Some('|')) => {
                tokens.push(Token::Or);
                i += 2;
            }
            ('=', Some('=')) => {
                tokens.push(Token::Op(CompareOp::Eq));
                i += if chars.get(i + 2) == Some(&'=') { 3 } else { 2 };
            }
            ('!', Some('=')) => {
                tokens.push(Token::Op(CompareOp::NotEq));
                i += if chars.get(i + 2) == Some(&'=') { 3 } else { 2 };
            }
            ('!', _) => {
                tokens.push(Token::Not);
                i += 1;
            }
            ('>', Some('=')) => {
                tokens.push(Token::Op(CompareOp::Gte));
                i += 2;
            }
            ('<', Some('=')) => {
                tokens.push(Token::Op(CompareOp::Lte));
                i += 2;
            }
            ('>', _) => {
                tokens.push(Token::Op(CompareOp::Gt));
                i += 1;
            }
            ('<', _) => {
                tokens.push(Token::Op(CompareOp::Lt));
                i += 1;
            }
            ('\'', _) | ('"', _) => {
                let quote = c;
                let mut value = String::new();
                let mut j = i + 1;
                let mut closed = false;
                while j < chars.len() {
                    match chars[j] {
                        '\\' if j + 1 < chars.len() => {
                            value.push(chars[j + 1]);
                            j += 2;
                        }
                        ch if ch == quote => {
                            closed = true;
                            j += 1;
                            break;
                        }
                        ch => {
                            value.push(ch);
                            j += 1;
                        }
                    }
                }
                if !closed {
                    return Err("unterminated string literal".to_string());
                }
                tokens.push(Token::Str(value));
                i = j;
            }
            (d, _) if d.is_ascii_digit() || (d == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
                    j += 1;
                }
                let raw: String = chars[i..j].iter().collect();
                let n = raw
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", raw))?;
                tokens.push(Token::Number(n));
                i = j;
            }
            (a, _) if is_ident_start(a) => {
                let mut j = i + 1;
                while j < chars.len() && is_ident_char(chars[j]) {
                    j += 1;
                }
                let word: String = chars[i..j].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" | "undefined" => Token::Null,
                    "contains" => Token::Op(CompareOp::Contains),
                    _ => Token::Path(word),
                });
                i = j;
            }
            _ => return Err(format!("unexpected character '{}'", c)),
        }
    }

    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '.' | '-')
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn parse_or(&mut self) -> Result<Expression, String> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, String> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, String> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(Expression::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression, String> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            return match self.next() {
                Some(Token::RParen) => Ok(inner),
                _ => Err("expected ')'".to_string()),
            };
        }

        let left = self.parse_operand()?;

        if let Some(Token::Op(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.parse_operand()?;
            return Ok(Expression::Compare { left, op, right });
        }

        // No operator: only paths and booleans stand alone
        match left {
            Operand::Path(path) => Ok(Expression::Truthy(path)),
            Operand::Literal(Literal::Boolean(true)) => Ok(Expression::True),
            Operand::Literal(Literal::Boolean(false)) => Ok(Expression::False),
            Operand::Literal(lit) => Err(format!("expected comparison after {:?}", lit)),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, String> {
        match self.next() {
            Some(Token::Path(p)) => Ok(Operand::Path(p)),
            Some(Token::Str(s)) => Ok(Operand::Literal(Literal::String(s))),
            Some(Token::Number(n)) => Ok(Operand::Literal(Literal::Number(n))),
            Some(Token::True) => Ok(Operand::Literal(Literal::Boolean(true))),
            Some(Token::False) => Ok(Operand::Literal(Literal::Boolean(false))),
            Some(Token::Null) => Ok(Operand::Literal(Literal::Null)),
            Some(tok) => Err(format!("unexpected token {:?}", tok)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}
