// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Filter expression lexer and recursive-descent parser.
//!
//! The parser works on names only; field references are bound to schema
//! positions afterwards by [`ContentFilter::compile`](super::ContentFilter::compile).

use super::FilterError;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=` or `==`
    Eq,
    /// `<>` or `!=`
    Ne,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
}

impl Operator {
    /// Operator with its operands swapped (`a < b` becomes `b > a`).
    pub fn flipped(self) -> Self {
        match self {
            Operator::Gt => Operator::Lt,
            Operator::Lt => Operator::Gt,
            Operator::Ge => Operator::Le,
            Operator::Le => Operator::Ge,
            other => other,
        }
    }
}

/// Operand of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Integer literal
    Integer(i64),
    /// Float literal
    Float(f64),
    /// Quoted string literal
    String(String),
    /// `TRUE` / `FALSE`
    Boolean(bool),
    /// `%N`
    Parameter(usize),
    /// Field name
    Field(String),
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `left op right`
    Comparison {
        /// Left operand
        left: Operand,
        /// Operator
        op: Operator,
        /// Right operand
        right: Operand,
    },
    /// Conjunction, evaluated left to right
    And(Box<Expression>, Box<Expression>),
    /// Disjunction, evaluated left to right
    Or(Box<Expression>, Box<Expression>),
    /// Negation
    Not(Box<Expression>),
}

impl Expression {
    /// Visit every operand in the tree, left to right.
    pub fn for_each_operand<'a>(&'a self, f: &mut impl FnMut(&'a Operand)) {
        match self {
            Expression::Comparison { left, right, .. } => {
                f(left);
                f(right);
            }
            Expression::And(a, b) | Expression::Or(a, b) => {
                a.for_each_operand(f);
                b.for_each_operand(f);
            }
            Expression::Not(inner) => inner.for_each_operand(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Integer(i64),
    Float(f64),
    Quoted(String),
    Parameter(usize),
    Op(Operator),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b' ' | b'\t' | b'\n' | b'\r' => i += 1,
            b'(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            b')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            b'=' => {
                i += if bytes.get(i + 1) == Some(&b'=') { 2 } else { 1 };
                tokens.push(Token::Op(Operator::Eq));
            }
            b'!' => {
                if bytes.get(i + 1) != Some(&b'=') {
                    return Err(FilterError::ParseError(format!(
                        "expected '=' after '!' at offset {}",
                        i
                    )));
                }
                tokens.push(Token::Op(Operator::Ne));
                i += 2;
            }
            b'<' => match bytes.get(i + 1) {
                Some(b'=') => {
                    tokens.push(Token::Op(Operator::Le));
                    i += 2;
                }
                Some(b'>') => {
                    tokens.push(Token::Op(Operator::Ne));
                    i += 2;
                }
                _ => {
                    tokens.push(Token::Op(Operator::Lt));
                    i += 1;
                }
            },
            b'>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Op(Operator::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Op(Operator::Gt));
                    i += 1;
                }
            }
            b'\'' | b'"' => {
                let close = input[i + 1..].find(c as char).ok_or_else(|| {
                    FilterError::ParseError(format!("unterminated string at offset {}", i))
                })?;
                tokens.push(Token::Quoted(input[i + 1..i + 1 + close].to_string()));
                i += close + 2;
            }
            b'%' => {
                let digits = count_while(&bytes[i + 1..], |b| b.is_ascii_digit());
                if digits == 0 {
                    return Err(FilterError::ParseError(format!(
                        "expected parameter index after '%' at offset {}",
                        i
                    )));
                }
                let idx = input[i + 1..i + 1 + digits].parse().map_err(|_| {
                    FilterError::ParseError(format!("parameter index too large at offset {}", i))
                })?;
                tokens.push(Token::Parameter(idx));
                i += 1 + digits;
            }
            b'-' | b'0'..=b'9' => {
                let (token, len) = lex_number(&input[i..])?;
                tokens.push(token);
                i += len;
            }
            _ if c.is_ascii_alphabetic() || c == b'_' => {
                let len = count_while(&bytes[i..], |b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.');
                let word = &input[i..i + len];
                tokens.push(match word.to_ascii_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    _ => Token::Word(word.to_string()),
                });
                i += len;
            }
            _ => {
                let ch = input[i..].chars().next().unwrap_or('?');
                return Err(FilterError::ParseError(format!(
                    "unexpected character '{}' at offset {}",
                    ch, i
                )));
            }
        }
    }

    Ok(tokens)
}

fn count_while(bytes: &[u8], pred: impl Fn(u8) -> bool) -> usize {
    bytes.iter().take_while(|&&b| pred(b)).count()
}

fn lex_number(text: &str) -> Result<(Token, usize), FilterError> {
    let bytes = text.as_bytes();
    let sign = usize::from(bytes.first() == Some(&b'-'));
    let int_digits = count_while(&bytes[sign..], |b| b.is_ascii_digit());
    if int_digits == 0 {
        return Err(FilterError::ParseError(format!(
            "expected digits in number near '{}'",
            text
        )));
    }
    let mut len = sign + int_digits;
    let is_float = bytes.get(len) == Some(&b'.');
    if is_float {
        len += 1 + count_while(&bytes[len + 1..], |b| b.is_ascii_digit());
    }

    let literal = &text[..len];
    let token = if is_float {
        literal
            .parse()
            .map(Token::Float)
            .map_err(|_| FilterError::ParseError(format!("invalid float '{}'", literal)))?
    } else {
        literal
            .parse()
            .map(Token::Integer)
            .map_err(|_| FilterError::ParseError(format!("invalid integer '{}'", literal)))?
    };
    Ok((token, len))
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
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn or_expr(&mut self) -> Result<Expression, FilterError> {
        let mut expr = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            expr = Expression::Or(Box::new(expr), Box::new(self.and_expr()?));
        }
        Ok(expr)
    }

    fn and_expr(&mut self) -> Result<Expression, FilterError> {
        let mut expr = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            expr = Expression::And(Box::new(expr), Box::new(self.unary()?));
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expression, FilterError> {
        match self.peek() {
            Some(Token::Not) => {
                self.pos += 1;
                Ok(Expression::Not(Box::new(self.unary()?)))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let expr = self.or_expr()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(expr),
                    other => Err(FilterError::ParseError(format!(
                        "expected ')', found {}",
                        describe(other.as_ref())
                    ))),
                }
            }
            _ => self.comparison(),
        }
    }

    fn comparison(&mut self) -> Result<Expression, FilterError> {
        let left = self.operand()?;
        let op = match self.bump() {
            Some(Token::Op(op)) => op,
            other => {
                return Err(FilterError::ParseError(format!(
                    "expected comparison operator, found {}",
                    describe(other.as_ref())
                )))
            }
        };
        let right = self.operand()?;
        Ok(Expression::Comparison { left, op, right })
    }

    fn operand(&mut self) -> Result<Operand, FilterError> {
        match self.bump() {
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("TRUE") => Ok(Operand::Boolean(true)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("FALSE") => Ok(Operand::Boolean(false)),
            Some(Token::Word(w)) => Ok(Operand::Field(w)),
            Some(Token::Integer(n)) => Ok(Operand::Integer(n)),
            Some(Token::Float(f)) => Ok(Operand::Float(f)),
            Some(Token::Quoted(s)) => Ok(Operand::String(s)),
            Some(Token::Parameter(idx)) => Ok(Operand::Parameter(idx)),
            other => Err(FilterError::ParseError(format!(
                "expected field, literal or parameter, found {}",
                describe(other.as_ref())
            ))),
        }
    }
}

fn describe(token: Option<&Token>) -> String {
    match token {
        None => "end of expression".to_string(),
        Some(t) => format!("{:?}", t),
    }
}

/// Parse `expression` into an [`Expression`] tree.
///
/// ```ignore
/// let expr = parse_expression("degrees > %0 or degrees < %1")?;
/// ```
pub fn parse_expression(expression: &str) -> Result<Expression, FilterError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(FilterError::EmptyExpression);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or_expr()?;
    if let Some(extra) = parser.peek() {
        return Err(FilterError::ParseError(format!(
            "unexpected trailing token {:?}",
            extra
        )));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_station_filter() {
        let expr = parse_expression("next_station = %0").unwrap();
        assert_eq!(
            expr,
            Expression::Comparison {
                left: Operand::Field("next_station".to_string()),
                op: Operator::Eq,
                right: Operand::Parameter(0),
            }
        );
    }

    #[test]
    fn test_lowercase_keywords() {
        let expr = parse_expression("degrees > %0 or degrees < %1").unwrap();
        assert!(matches!(expr, Expression::Or(_, _)));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse_expression("a = 1 OR b = 2 AND c = 3").unwrap();
        match expr {
            Expression::Or(_, right) => assert!(matches!(*right, Expression::And(_, _))),
            other => panic!("expected OR at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_parentheses_and_not() {
        let expr = parse_expression("NOT (a >= 1.5 AND b <> 'x')").unwrap();
        match expr {
            Expression::Not(inner) => assert!(matches!(*inner, Expression::And(_, _))),
            other => panic!("expected NOT, got {:?}", other),
        }
    }

    #[test]
    fn test_literals() {
        let expr = parse_expression("x != -3 AND y = \"dq\" AND z = TRUE").unwrap();
        let mut operands = Vec::new();
        expr.for_each_operand(&mut |o| operands.push(o.clone()));
        assert!(operands.contains(&Operand::Integer(-3)));
        assert!(operands.contains(&Operand::String("dq".to_string())));
        assert!(operands.contains(&Operand::Boolean(true)));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_expression("   "), Err(FilterError::EmptyExpression));
        assert!(matches!(parse_expression("a >"), Err(FilterError::ParseError(_))));
        assert!(matches!(parse_expression("a = 'open"), Err(FilterError::ParseError(_))));
        assert!(matches!(parse_expression("(a = 1"), Err(FilterError::ParseError(_))));
        assert!(matches!(parse_expression("a = 1 b"), Err(FilterError::ParseError(_))));
        assert!(matches!(parse_expression("a = %"), Err(FilterError::ParseError(_))));
        assert!(matches!(parse_expression("a # 1"), Err(FilterError::ParseError(_))));
        assert!(matches!(parse_expression("a"), Err(FilterError::ParseError(_))));
    }

    #[test]
    fn test_flipped_operator() {
        assert_eq!(Operator::Lt.flipped(), Operator::Gt);
        assert_eq!(Operator::Eq.flipped(), Operator::Eq);
    }
}
