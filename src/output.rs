//! Instruction-memory file formats produced by the assembler and consumed
//! by the emulator.

use miette::Result;

use crate::air::{Air, Instruction};
use crate::error;
use crate::lexer;

fn hex_word(tok: &str) -> Option<u16> {
    let digits = tok
        .strip_prefix("0x")
        .or_else(|| tok.strip_prefix("0X"))
        .unwrap_or(tok);
    u16::from_str_radix(digits, 16).ok()
}

/// One 4-digit hex word per line.
pub fn render_hex(air: &Air) -> Result<String> {
    let mut out = String::new();
    for inst in air {
        out.push_str(&inst.to_hex()?);
        out.push('\n');
    }
    Ok(out)
}

/// One 16-digit binary word per line.
pub fn render_binary(air: &Air) -> Result<String> {
    let mut out = String::new();
    for inst in air {
        out.push_str(&inst.to_binary()?);
        out.push('\n');
    }
    Ok(out)
}

/// Verilog-style memory file: `@address word`, addressed by instruction
/// index, with the disassembly in a trailing comment.
pub fn render_vmem(air: &Air) -> Result<String> {
    let mut out = String::from("// TUCA-5.1 instruction memory\n");
    for (idx, inst) in air.instructions().iter().enumerate() {
        out.push_str(&format!("@{idx:04x} {} // {inst}\n", inst.to_hex()?));
    }
    Ok(out)
}

/// Parse a program-word file: either `@address word` lines or bare hex
/// words. Addresses must be contiguous from zero.
pub fn parse_vmem(src: &str) -> Result<Vec<u16>> {
    let mut words = Vec::new();
    for line in &lexer::scan(src) {
        if line.is_blank() {
            continue;
        }
        let word_tok = if let Some(rest) = line.text.strip_prefix('@') {
            let Some((addr_tok, word_tok)) = rest.split_once(char::is_whitespace) else {
                return Err(error::vmem_bad_line(line.span, src, line.num));
            };
            let addr = hex_word(addr_tok)
                .ok_or_else(|| error::vmem_bad_line(line.span, src, line.num))?;
            if addr as usize != words.len() {
                return Err(error::vmem_gap(
                    line.span_of(addr_tok),
                    src,
                    addr,
                    words.len() as u16,
                    line.num,
                ));
            }
            word_tok.trim_start()
        } else {
            line.text
        };
        let word = hex_word(word_tok)
            .ok_or_else(|| error::vmem_bad_line(line.span_of(word_tok), src, line.num))?;
        words.push(word);
    }
    Ok(words)
}
