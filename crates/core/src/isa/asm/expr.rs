//! Operand expression parser.
//!
//! LL(1) grammar shared by all operand positions:
//!
//! ```text
//! expr    ::= [ "+" | "-" ] term { ("+" | "-" | "|" | "^") term }
//! term    ::= factor { ("*" | "/" | "%" | "&") factor }
//! factor  ::= number | gReg | cReg | "~" factor | "(" expr ")"
//! ```
//!
//! Arithmetic on numeric values is overflow-checked; mixing value kinds
//! (register vs number) fails with a type-match error.

use crate::common::bits::{will_add_overflow, will_div_overflow, will_mult_overflow, will_sub_overflow};
use crate::common::error::{AsmError, AsmErrorId};
use crate::common::Word;
use crate::isa::asm::token::{Lexer, Token};

/// Result of evaluating an operand expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExprVal {
    Num(Word),
    GReg(u32),
    CReg(u32),
}

impl ExprVal {
    /// Numeric value, or a type-match error at `pos`.
    pub fn num(&self, pos: usize) -> Result<Word, AsmError> {
        match self {
            ExprVal::Num(val) => Ok(*val),
            _ => Err(AsmError::new(AsmErrorId::ExpectedNumeric, pos)),
        }
    }
}

fn same_kind(a: &ExprVal, b: &ExprVal) -> bool {
    matches!(
        (a, b),
        (ExprVal::Num(_), ExprVal::Num(_))
            | (ExprVal::GReg(_), ExprVal::GReg(_))
            | (ExprVal::CReg(_), ExprVal::CReg(_))
    )
}

fn num_pair(a: &ExprVal, b: &ExprVal, pos: usize) -> Result<(Word, Word), AsmError> {
    match (a, b) {
        (ExprVal::Num(x), ExprVal::Num(y)) => Ok((*x, *y)),
        _ => Err(AsmError::new(AsmErrorId::ExpectedNumeric, pos)),
    }
}

/// Parses a complete expression.
pub fn parse_expr(lex: &mut Lexer<'_>) -> Result<ExprVal, AsmError> {
    let mut lhs;

    match lex.tok() {
        Token::Plus => {
            lex.next_token()?;
            lhs = parse_term(lex)?;
            lhs.num(lex.pos())?;
        }
        Token::Minus => {
            lex.next_token()?;
            lhs = parse_term(lex)?;
            lhs = ExprVal::Num(-lhs.num(lex.pos())?);
        }
        _ => lhs = parse_term(lex)?,
    }

    loop {
        let op = match lex.tok() {
            Token::Plus | Token::Minus | Token::Pipe | Token::Caret => lex.tok().clone(),
            _ => return Ok(lhs),
        };
        let pos = lex.pos();
        lex.next_token()?;
        let rhs = parse_term(lex)?;

        if !same_kind(&lhs, &rhs) {
            return Err(AsmError::new(AsmErrorId::ExprTypeMatch, pos));
        }

        lhs = match op {
            Token::Plus => {
                let (a, b) = num_pair(&lhs, &rhs, pos)?;
                if will_add_overflow(a, b) {
                    return Err(AsmError::new(AsmErrorId::NumericOverflow, pos));
                }
                ExprVal::Num(a + b)
            }
            Token::Minus => {
                let (a, b) = num_pair(&lhs, &rhs, pos)?;
                if will_sub_overflow(a, b) {
                    return Err(AsmError::new(AsmErrorId::NumericOverflow, pos));
                }
                ExprVal::Num(a - b)
            }
            Token::Pipe => {
                let (a, b) = num_pair(&lhs, &rhs, pos)?;
                ExprVal::Num(a | b)
            }
            _ => {
                let (a, b) = num_pair(&lhs, &rhs, pos)?;
                ExprVal::Num(a ^ b)
            }
        };
    }
}

fn parse_term(lex: &mut Lexer<'_>) -> Result<ExprVal, AsmError> {
    let mut lhs = parse_factor(lex)?;

    loop {
        let op = match lex.tok() {
            Token::Star | Token::Slash | Token::Percent | Token::Amp => lex.tok().clone(),
            _ => return Ok(lhs),
        };
        let pos = lex.pos();
        lex.next_token()?;
        let rhs = parse_factor(lex)?;

        if !same_kind(&lhs, &rhs) {
            return Err(AsmError::new(AsmErrorId::ExprTypeMatch, pos));
        }

        lhs = match op {
            Token::Star => {
                let (a, b) = num_pair(&lhs, &rhs, pos)?;
                if will_mult_overflow(a, b) {
                    return Err(AsmError::new(AsmErrorId::NumericOverflow, pos));
                }
                ExprVal::Num(a * b)
            }
            Token::Slash => {
                let (a, b) = num_pair(&lhs, &rhs, pos)?;
                if will_div_overflow(a, b) {
                    return Err(AsmError::new(AsmErrorId::NumericOverflow, pos));
                }
                ExprVal::Num(a / b)
            }
            Token::Percent => {
                let (a, b) = num_pair(&lhs, &rhs, pos)?;
                if will_div_overflow(a, b) {
                    return Err(AsmError::new(AsmErrorId::NumericOverflow, pos));
                }
                ExprVal::Num(a % b)
            }
            _ => {
                let (a, b) = num_pair(&lhs, &rhs, pos)?;
                ExprVal::Num(a & b)
            }
        };
    }
}

fn parse_factor(lex: &mut Lexer<'_>) -> Result<ExprVal, AsmError> {
    match lex.tok().clone() {
        Token::Num(val) => {
            lex.next_token()?;
            Ok(ExprVal::Num(val))
        }
        Token::GReg(reg) => {
            lex.next_token()?;
            Ok(ExprVal::GReg(reg))
        }
        Token::CReg(reg) => {
            lex.next_token()?;
            Ok(ExprVal::CReg(reg))
        }
        Token::Tilde => {
            lex.next_token()?;
            let val = parse_factor(lex)?;
            Ok(ExprVal::Num(!val.num(lex.pos())?))
        }
        Token::LParen => {
            lex.next_token()?;
            let val = parse_expr(lex)?;
            lex.accept_rparen()?;
            Ok(val)
        }
        _ => Err(AsmError::new(AsmErrorId::InvalidExpr, lex.pos())),
    }
}
