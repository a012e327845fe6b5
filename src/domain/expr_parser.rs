//! Predicate DSL parser.
//!
//! Recursive descent parser turning text like
//! `CLOSE > SMA_FAST AND NOT RSI_14 < 30` or
//! `CROSS_ABOVE(SMA_FAST, SMA_SLOW)` into an [`Expr`] AST, with positioned
//! error messages.
//!
//! Grammar (loosest binding first):
//!
//! ```text
//! expr       := and_expr (OR and_expr)*
//! and_expr   := unary (AND unary)*
//! unary      := NOT unary | primary
//! primary    := '(' expr ')'
//!             | CROSS_ABOVE '(' operand ',' operand ')'
//!             | CROSS_BELOW '(' operand ',' operand ')'
//!             | BETWEEN '(' operand ',' number ',' number ')'
//!             | operand ('>' | '<' | '>=' | '<=' | '=') operand
//! operand    := number | column_name
//! ```
//!
//! Keywords are case-insensitive; column names are normalized to uppercase.

use crate::domain::error::ParseError;
use crate::domain::expr::{Expr, Operand};

pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(input);
    let expr = parser.parse_or()?;
    parser.skip_whitespace();
    if parser.pos < input.len() {
        return Err(ParseError {
            message: format!("unexpected trailing input: '{}'", parser.remaining()),
            position: parser.pos,
        });
    }
    Ok(expr)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(ParseError {
                message: format!("expected '{}', found '{}'", expected, ch),
                position: self.pos,
            }),
            None => Err(ParseError {
                message: format!("expected '{}', found end of input", expected),
                position: self.pos,
            }),
        }
    }

    /// The next identifier-shaped word, without consuming it.
    fn peek_word(&self) -> String {
        let mut word = String::new();
        for ch in self.remaining().chars() {
            if ch.is_alphanumeric() || ch == '_' {
                word.push(ch);
            } else {
                break;
            }
        }
        word
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        let word = self.peek_word();
        if word.eq_ignore_ascii_case(keyword) {
            self.pos += word.len();
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut terms = vec![self.parse_and()?];
        while self.consume_keyword("OR") {
            terms.push(self.parse_and()?);
        }
        if terms.len() == 1 {
            Ok(terms.pop().unwrap())
        } else {
            Ok(Expr::Or(terms))
        }
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut terms = vec![self.parse_unary()?];
        while self.consume_keyword("AND") {
            terms.push(self.parse_unary()?);
        }
        if terms.len() == 1 {
            Ok(terms.pop().unwrap())
        } else {
            Ok(Expr::And(terms))
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.consume_keyword("NOT") {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        self.skip_whitespace();

        if self.peek() == Some('(') {
            self.advance();
            let expr = self.parse_or()?;
            self.expect_char(')')?;
            return Ok(expr);
        }

        if self.consume_keyword("CROSS_ABOVE") {
            let (left, right) = self.parse_operand_pair()?;
            return Ok(Expr::CrossAbove { left, right });
        }
        if self.consume_keyword("CROSS_BELOW") {
            let (left, right) = self.parse_operand_pair()?;
            return Ok(Expr::CrossBelow { left, right });
        }
        if self.consume_keyword("BETWEEN") {
            self.expect_char('(')?;
            let operand = self.parse_operand()?;
            self.expect_char(',')?;
            let lower = self.parse_number()?;
            self.expect_char(',')?;
            let upper = self.parse_number()?;
            self.expect_char(')')?;
            return Ok(Expr::Between {
                operand,
                lower,
                upper,
            });
        }

        self.parse_comparison()
    }

    fn parse_operand_pair(&mut self) -> Result<(Operand, Operand), ParseError> {
        self.expect_char('(')?;
        let left = self.parse_operand()?;
        self.expect_char(',')?;
        let right = self.parse_operand()?;
        self.expect_char(')')?;
        Ok((left, right))
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_operand()?;
        self.skip_whitespace();

        match self.peek() {
            Some('>') => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    let right = self.parse_operand()?;
                    Ok(Expr::AboveOrEqual { left, right })
                } else {
                    let right = self.parse_operand()?;
                    Ok(Expr::Above { left, right })
                }
            }
            Some('<') => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    let right = self.parse_operand()?;
                    Ok(Expr::BelowOrEqual { left, right })
                } else {
                    let right = self.parse_operand()?;
                    Ok(Expr::Below { left, right })
                }
            }
            Some('=') => {
                self.advance();
                let right = self.parse_operand()?;
                Ok(Expr::Equals { left, right })
            }
            Some(ch) => Err(ParseError {
                message: format!("expected comparison operator, found '{}'", ch),
                position: self.pos,
            }),
            None => Err(ParseError {
                message: "expected comparison operator, found end of input".into(),
                position: self.pos,
            }),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch.is_ascii_digit() || ch == '-' || ch == '.' => {
                Ok(Operand::Constant(self.parse_number()?))
            }
            Some(ch) if ch.is_alphabetic() || ch == '_' => {
                let word = self.peek_word();
                self.pos += word.len();
                Ok(Operand::Column(word.to_ascii_uppercase()))
            }
            Some(ch) => Err(ParseError {
                message: format!("expected column name or number, found '{}'", ch),
                position: self.pos,
            }),
            None => Err(ParseError {
                message: "expected column name or number, found end of input".into(),
                position: self.pos,
            }),
        }
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if self.peek() == Some('-') {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected number".into(),
                position: start,
            });
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }
}
