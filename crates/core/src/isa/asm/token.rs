//! Lexer and token table of the one-line assembler.
//!
//! The lexer scans a character stream into tokens: symbols, numbers,
//! registers and opcode mnemonics. The stream comes through the `CharSource`
//! trait; a string-backed source serves the interactive one-line case and a
//! file-backed source serves assembly listings.
//!
//! Numeric literals accept `0x`, `0b` and decimal forms with optional `_`
//! separators. Qualified constants `L%n`, `R%n`, `M%n` and `U%n` select
//! sub-ranges of a value for address-building sequences.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::common::error::{AsmError, AsmErrorId};
use crate::common::Word;
use crate::isa::{grp, opc};

/// A source of characters for the lexer.
pub trait CharSource {
    /// Returns the next character, or `None` at end of input.
    fn next_char(&mut self) -> Option<char>;
}

/// Character source over an in-memory line.
pub struct StrSource {
    chars: Vec<char>,
    idx: usize,
}

impl StrSource {
    pub fn new(line: &str) -> Self {
        Self {
            chars: line.chars().collect(),
            idx: 0,
        }
    }
}

impl CharSource for StrSource {
    fn next_char(&mut self) -> Option<char> {
        let ch = self.chars.get(self.idx).copied();
        self.idx += 1;
        ch
    }
}

/// Character source over a file, for assembling listings line by line.
pub struct FileSource {
    reader: BufReader<File>,
}

impl FileSource {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
        })
    }
}

impl CharSource for FileSource {
    fn next_char(&mut self) -> Option<char> {
        let mut byte = [0u8; 1];
        match self.reader.read(&mut byte) {
            Ok(1) => Some(byte[0] as char),
            _ => None,
        }
    }
}

/// Opcode mnemonics known to the assembler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpId {
    Nop,
    Add,
    Sub,
    And,
    Or,
    Xor,
    Cmp,
    Extr,
    Dep,
    Dsr,
    Shl1a,
    Shl2a,
    Shl3a,
    Shr1a,
    Shr2a,
    Shr3a,
    Ldil,
    Addil,
    Ldo,
    Ld,
    Ldr,
    St,
    Stc,
    B,
    Be,
    Br,
    Bv,
    Bb,
    Cbr,
    Mbr,
    Abr,
    Mfcr,
    Mtcr,
    Mfia,
    Rsm,
    Ssm,
    Lpa,
    Prb,
    Iitlb,
    Idtlb,
    Pitlb,
    Pdtlb,
    Pica,
    Pdca,
    Fica,
    Fdca,
    Rfi,
    Diag,
    Trap,
}

/// One scanned token.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Eos,
    Comma,
    Period,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Num(Word),
    GReg(u32),
    CReg(u32),
    Ident(String),
    /// A mnemonic with its initial encoding template.
    Op(OpId, u32),
}

/// Builds an encoding template from group, family and initial opt1 value.
const fn tmpl(group: u32, family: u32, opt1: u32) -> u32 {
    (group << 30) | (family << 26) | (opt1 << 19)
}

/// Reserved-word table entry.
enum Reserved {
    GReg(u32),
    CReg(u32),
    Op(OpId, u32),
}

/// Looks up a reserved word. Names arrive upshifted.
///
/// Besides the architected `Rn`/`Cn` names, the runtime-architecture aliases
/// (`T0..T6`, `ARGn`/`RETn`, `DP`, `RL`, `SP`, `SAR`) resolve to their
/// register numbers.
fn lookup_reserved(name: &str) -> Option<Reserved> {
    use OpId::*;
    use Reserved::*;

    let entry = match name {
        "R0" => GReg(0),
        "R1" | "T0" => GReg(1),
        "R2" | "T1" => GReg(2),
        "R3" | "T2" => GReg(3),
        "R4" | "T3" => GReg(4),
        "R5" | "T4" => GReg(5),
        "R6" | "T5" => GReg(6),
        "R7" | "T6" => GReg(7),
        "R8" | "ARG3" | "RET3" => GReg(8),
        "R9" | "ARG2" | "RET2" => GReg(9),
        "R10" | "ARG1" | "RET1" => GReg(10),
        "R11" | "ARG0" | "RET0" => GReg(11),
        "R12" => GReg(12),
        "R13" | "DP" => GReg(13),
        "R14" | "RL" => GReg(14),
        "R15" | "SP" => GReg(15),

        "C0" => CReg(0),
        "C1" => CReg(1),
        "C2" | "SAR" => CReg(2),
        "C3" => CReg(3),
        "C4" => CReg(4),
        "C5" => CReg(5),
        "C6" => CReg(6),
        "C7" => CReg(7),
        "C8" => CReg(8),
        "C9" => CReg(9),
        "C10" => CReg(10),
        "C11" => CReg(11),
        "C12" => CReg(12),
        "C13" => CReg(13),
        "C14" => CReg(14),
        "C15" => CReg(15),

        "NOP" => Op(Nop, tmpl(grp::ALU, opc::NOP, 0)),
        "ADD" => Op(Add, tmpl(grp::ALU, opc::ADD, 0)),
        "SUB" => Op(Sub, tmpl(grp::ALU, opc::SUB, 0)),
        "AND" => Op(And, tmpl(grp::ALU, opc::AND, 0)),
        "OR" => Op(Or, tmpl(grp::ALU, opc::OR, 0)),
        "XOR" => Op(Xor, tmpl(grp::ALU, opc::XOR, 0)),
        "CMP" => Op(Cmp, tmpl(grp::ALU, opc::CMP_A, 0)),
        "EXTR" => Op(Extr, tmpl(grp::ALU, opc::BITOP, 0)),
        "DEP" => Op(Dep, tmpl(grp::ALU, opc::BITOP, 1)),
        "DSR" => Op(Dsr, tmpl(grp::ALU, opc::BITOP, 2)),
        "SHL1A" => Op(Shl1a, tmpl(grp::ALU, opc::SHAOP, 0)),
        "SHL2A" => Op(Shl2a, tmpl(grp::ALU, opc::SHAOP, 0)),
        "SHL3A" => Op(Shl3a, tmpl(grp::ALU, opc::SHAOP, 0)),
        "SHR1A" => Op(Shr1a, tmpl(grp::ALU, opc::SHAOP, 2)),
        "SHR2A" => Op(Shr2a, tmpl(grp::ALU, opc::SHAOP, 2)),
        "SHR3A" => Op(Shr3a, tmpl(grp::ALU, opc::SHAOP, 2)),
        "LDIL" => Op(Ldil, tmpl(grp::ALU, opc::IMMOP, 0)),
        "ADDIL" => Op(Addil, tmpl(grp::ALU, opc::IMMOP, 0)),
        "LDO" => Op(Ldo, tmpl(grp::ALU, opc::LDO, 0)),
        "LD" => Op(Ld, tmpl(grp::MEM, opc::LD, 0)),
        "LDR" => Op(Ldr, tmpl(grp::MEM, opc::LDR, 0)),
        "ST" => Op(St, tmpl(grp::MEM, opc::ST, 0)),
        "STC" => Op(Stc, tmpl(grp::MEM, opc::STC, 0)),
        "B" => Op(B, tmpl(grp::BR, opc::B, 0)),
        "BE" => Op(Be, tmpl(grp::BR, opc::BE, 0)),
        "BR" => Op(Br, tmpl(grp::BR, opc::BR, 0)),
        "BV" => Op(Bv, tmpl(grp::BR, opc::BV, 0)),
        "BB" => Op(Bb, tmpl(grp::BR, opc::BB, 0)),
        "CBR" => Op(Cbr, tmpl(grp::BR, opc::CBR, 0)),
        "MBR" => Op(Mbr, tmpl(grp::BR, opc::MBR, 0)),
        "ABR" => Op(Abr, tmpl(grp::BR, opc::ABR, 0)),
        "MFCR" => Op(Mfcr, tmpl(grp::SYS, opc::MR, 0)),
        "MTCR" => Op(Mtcr, tmpl(grp::SYS, opc::MR, 1)),
        "MFIA" => Op(Mfia, tmpl(grp::SYS, opc::MR, 4)),
        "RSM" => Op(Rsm, tmpl(grp::SYS, opc::MST, 0)),
        "SSM" => Op(Ssm, tmpl(grp::SYS, opc::MST, 1)),
        "LPA" => Op(Lpa, tmpl(grp::SYS, opc::LPA, 0)),
        "PRB" => Op(Prb, tmpl(grp::SYS, opc::PRB, 0)),
        "IITLB" => Op(Iitlb, tmpl(grp::SYS, opc::TLB, 0)),
        "IDTLB" => Op(Idtlb, tmpl(grp::SYS, opc::TLB, 1)),
        "PITLB" => Op(Pitlb, tmpl(grp::SYS, opc::TLB, 2)),
        "PDTLB" => Op(Pdtlb, tmpl(grp::SYS, opc::TLB, 3)),
        "PICA" => Op(Pica, tmpl(grp::SYS, opc::CA, 0)),
        "PDCA" => Op(Pdca, tmpl(grp::SYS, opc::CA, 1)),
        "FICA" => Op(Fica, tmpl(grp::SYS, opc::CA, 2)),
        "FDCA" => Op(Fdca, tmpl(grp::SYS, opc::CA, 3)),
        "RFI" => Op(Rfi, tmpl(grp::SYS, opc::RFI, 0)),
        "DIAG" => Op(Diag, tmpl(grp::SYS, opc::DIAG, 0)),
        "TRAP" => Op(Trap, tmpl(grp::SYS, opc::TRAP, 0)),
        _ => return None,
    };
    Some(entry)
}

/// The lexer. Scans one instruction line; a newline or `;` ends the line.
pub struct Lexer<'a> {
    src: &'a mut dyn CharSource,
    current_char: Option<char>,
    /// Character index of the char after `current_char`.
    char_idx: usize,
    /// Character index where the current token started.
    tok_pos: usize,
    tok: Token,
    /// Set when the underlying source is exhausted (not just end of line).
    at_source_end: bool,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer and scans the first token.
    pub fn new(src: &'a mut dyn CharSource) -> Result<Self, AsmError> {
        let mut lex = Self {
            src,
            current_char: Some(' '),
            char_idx: 0,
            tok_pos: 0,
            tok: Token::Eos,
            at_source_end: false,
        };
        lex.next_token()?;
        Ok(lex)
    }

    /// Current token.
    pub fn tok(&self) -> &Token {
        &self.tok
    }

    /// Character position of the current token, for diagnostics.
    pub fn pos(&self) -> usize {
        self.tok_pos
    }

    /// True when the underlying character source has no further lines.
    pub fn source_exhausted(&self) -> bool {
        self.at_source_end && matches!(self.tok, Token::Eos)
    }

    fn err(&self, id: AsmErrorId) -> AsmError {
        AsmError::new(id, self.tok_pos)
    }

    fn advance_char(&mut self) {
        match self.src.next_char() {
            Some(ch) => {
                self.current_char = Some(ch);
                self.char_idx += 1;
            }
            None => {
                self.current_char = None;
                self.at_source_end = true;
            }
        }
    }

    /// Skips the rest of the current line. Used after `;` comments and by
    /// the listing loop on parse errors.
    pub fn skip_line(&mut self) {
        while let Some(ch) = self.current_char {
            if ch == '\n' {
                break;
            }
            self.advance_char();
        }
    }

    /// Steps past an end-of-line so the next token starts the next line.
    pub fn begin_next_line(&mut self) -> Result<(), AsmError> {
        if self.current_char == Some('\n') {
            self.advance_char();
        }
        self.next_token()
    }

    /// Scans the next token.
    pub fn next_token(&mut self) -> Result<(), AsmError> {
        while matches!(self.current_char, Some(' ') | Some('\t') | Some('\r')) {
            self.advance_char();
        }
        self.tok_pos = self.char_idx.saturating_sub(1);

        let ch = match self.current_char {
            None | Some('\n') => {
                self.tok = Token::Eos;
                return Ok(());
            }
            Some(ch) => ch,
        };

        if ch.is_ascii_alphabetic() {
            self.parse_ident()
        } else if ch.is_ascii_digit() {
            self.tok = Token::Num(self.parse_num()?);
            Ok(())
        } else {
            self.tok = match ch {
                '.' => Token::Period,
                ',' => Token::Comma,
                '(' => Token::LParen,
                ')' => Token::RParen,
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '%' => Token::Percent,
                '&' => Token::Amp,
                '|' => Token::Pipe,
                '^' => Token::Caret,
                '~' => Token::Tilde,
                ';' => {
                    self.skip_line();
                    self.tok = Token::Eos;
                    return Ok(());
                }
                _ => return Err(self.err(AsmErrorId::InvalidChar)),
            };
            self.advance_char();
            Ok(())
        }
    }

    /// Parses a numeric literal: decimal, `0x` hex or `0b` binary, with `_`
    /// separators. Digit counts are bounded per base; longer literals fail
    /// with `invalid-num`.
    fn parse_num(&mut self) -> Result<Word, AsmError> {
        let mut base: Word = 10;
        let mut max_digits = 22;
        let mut digits = 0;
        let mut val: Word = 0;

        if self.current_char == Some('0') {
            self.advance_char();
            match self.current_char {
                Some('x') | Some('X') => {
                    base = 16;
                    max_digits = 16;
                    self.advance_char();
                }
                Some('b') | Some('B') => {
                    base = 2;
                    max_digits = 64;
                    self.advance_char();
                }
                Some(ch) if ch.is_ascii_digit() || ch == '_' => {}
                _ => return Ok(0),
            }
        }

        loop {
            let ch = match self.current_char {
                Some(ch) => ch,
                None => break,
            };
            if ch == '_' {
                self.advance_char();
                continue;
            }
            let digit = match ch.to_digit(36) {
                Some(d) if (d as Word) < base => d as Word,
                Some(d) if d < 10 => return Err(self.err(AsmErrorId::InvalidNum)),
                _ => break,
            };
            val = val
                .checked_mul(base)
                .and_then(|v| v.checked_add(digit))
                .ok_or_else(|| self.err(AsmErrorId::NumericOverflow))?;
            digits += 1;
            if digits > max_digits {
                return Err(self.err(AsmErrorId::InvalidNum));
            }
            self.advance_char();
        }

        Ok(val)
    }

    /// Parses an identifier or a qualified constant (`L%`, `R%`, `M%`, `U%`).
    fn parse_ident(&mut self) -> Result<(), AsmError> {
        let first = self.current_char.unwrap().to_ascii_uppercase();

        if matches!(first, 'L' | 'R' | 'M' | 'U') {
            self.advance_char();
            if self.current_char == Some('%') {
                self.advance_char();
                if !matches!(self.current_char, Some(ch) if ch.is_ascii_digit()) {
                    return Err(self.err(AsmErrorId::InvalidChar));
                }
                let num = self.parse_num()? as u64;
                let val = match first {
                    'L' => (num & 0x0000_0000_FFFF_F000) >> 12,
                    'R' => num & 0x0000_0000_0000_0FFF,
                    'M' => (num & 0x000F_FFFF_0000_0000) >> 32,
                    _ => (num & 0xFFF0_0000_0000_0000) >> 52,
                };
                self.tok = Token::Num(val as Word);
                return Ok(());
            }
            // Not a qualifier; fall through with the first char consumed.
            let mut name = String::new();
            name.push(first);
            self.finish_ident(name);
            return Ok(());
        }

        self.finish_ident(String::new());
        Ok(())
    }

    fn finish_ident(&mut self, mut name: String) {
        while let Some(ch) = self.current_char {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                name.push(ch.to_ascii_uppercase());
                self.advance_char();
            } else {
                break;
            }
        }

        self.tok = match lookup_reserved(&name) {
            Some(Reserved::GReg(reg)) => Token::GReg(reg),
            Some(Reserved::CReg(reg)) => Token::CReg(reg),
            Some(Reserved::Op(id, template)) => Token::Op(id, template),
            None => Token::Ident(name),
        };
    }

    // Parser helpers shared by the instruction and expression grammars.

    pub fn accept_eos(&mut self) -> Result<(), AsmError> {
        if matches!(self.tok, Token::Eos) {
            Ok(())
        } else {
            Err(self.err(AsmErrorId::ExtraTokenInStr))
        }
    }

    pub fn accept_comma(&mut self) -> Result<(), AsmError> {
        if matches!(self.tok, Token::Comma) {
            self.next_token()
        } else {
            Err(self.err(AsmErrorId::ExpectedComma))
        }
    }

    pub fn accept_lparen(&mut self) -> Result<(), AsmError> {
        if matches!(self.tok, Token::LParen) {
            self.next_token()
        } else {
            Err(self.err(AsmErrorId::ExpectedLparen))
        }
    }

    pub fn accept_rparen(&mut self) -> Result<(), AsmError> {
        if matches!(self.tok, Token::RParen) {
            self.next_token()
        } else {
            Err(self.err(AsmErrorId::ExpectedRparen))
        }
    }
}
