//! Program loading.
//!
//! Raw binary images are read whole and copied into the owning memory
//! module; ROM modules accept images through the loader even though the bus
//! rejects stores. Assembly listings go through the file-backed character
//! source and the one-line assembler, one instruction per line.

use std::path::Path;

use crate::common::bits::store_be;
use crate::common::error::SimError;
use crate::common::{Instr, Word};
use crate::isa::asm::token::{FileSource, Lexer, Token};
use crate::isa::asm;
use crate::soc::System;

/// Reads a raw binary image.
pub fn load_binary(path: &Path) -> Result<Vec<u8>, SimError> {
    std::fs::read(path).map_err(|_| SimError::FileNotFound(path.display().to_string()))
}

/// Copies an image into physical memory at `p_adr`, through the owning
/// module's backing store so ROM contents can be established.
pub fn load_image(sys: &mut System, p_adr: Word, image: &[u8]) -> Result<(), SimError> {
    let num = sys
        .lookup_by_adr(p_adr)
        .ok_or(SimError::InvalidArg(format!(
            "no memory module at {:#x}",
            p_adr
        )))?;
    let module = sys
        .module_mut(num)
        .and_then(|module| module.as_memory_mut())
        .ok_or(SimError::InvalidModuleNum(num))?;
    module.load_image(p_adr, image)?;
    Ok(())
}

/// Assembles a listing file: one instruction per line, `;` comments, blank
/// lines ignored. Returns the instruction words in order.
pub fn assemble_listing(path: &Path) -> Result<Vec<Instr>, SimError> {
    let mut src =
        FileSource::open(path).map_err(|_| SimError::FileNotFound(path.display().to_string()))?;
    let mut lex = Lexer::new(&mut src)?;
    let mut words = Vec::new();

    loop {
        if matches!(lex.tok(), Token::Eos) {
            if lex.source_exhausted() {
                break;
            }
            lex.begin_next_line()?;
            continue;
        }
        words.push(asm::assemble_next(&mut lex)?);
        lex.begin_next_line()?;
    }
    Ok(words)
}

/// Assembles a listing and stores it at `p_adr`, big-endian words as the
/// bus carries them.
pub fn load_listing(sys: &mut System, p_adr: Word, path: &Path) -> Result<usize, SimError> {
    let words = assemble_listing(path)?;
    let mut image = vec![0u8; words.len() * 4];
    for (idx, word) in words.iter().enumerate() {
        store_be(&mut image[idx * 4..idx * 4 + 4], *word as u64);
    }
    load_image(sys, p_adr, &image)?;
    Ok(words.len())
}
