//! Data-memory file formats: initial images, final-state dumps, and
//! dump comparison.

use std::fmt;

use miette::Result;

use crate::error;
use crate::lexer;
use crate::runtime::MEMORY_SIZE;
use crate::symbol::FxMap;

/// Sparse data memory. Absent addresses hold zero.
pub type MemoryImage = FxMap<u8, u8>;

/// One differing address between two dumps.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Mismatch {
    pub addr: u8,
    pub actual: u8,
    pub expected: u8,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#04x}: expected {:#04x}, found {:#04x}",
            self.addr, self.expected, self.actual
        )
    }
}

/// Hex byte, with or without a `0x` prefix.
fn hex_byte(tok: &str) -> Option<u8> {
    let digits = tok
        .strip_prefix("0x")
        .or_else(|| tok.strip_prefix("0X"))
        .unwrap_or(tok);
    u8::from_str_radix(digits, 16).ok()
}

/// Parse an initial-memory file. Two layouts, detected over the whole
/// file: `addr=value` pairs, or one hex byte per line where the address
/// is the zero-based line number.
pub fn parse_initial_memory(src: &str) -> Result<MemoryImage> {
    let lines = lexer::scan(src);
    let paired = lines.iter().any(|line| line.text.contains('='));
    let mut image = MemoryImage::default();
    for line in &lines {
        if line.is_blank() {
            continue;
        }
        if paired {
            let Some((addr, value)) = line.text.split_once('=') else {
                return Err(error::mem_bad_line(line.span, src, line.num));
            };
            let (addr, value) = (addr.trim(), value.trim());
            let a = hex_byte(addr)
                .ok_or_else(|| error::mem_bad_value(line.span_of(addr), src, addr, line.num))?;
            let v = hex_byte(value)
                .ok_or_else(|| error::mem_bad_value(line.span_of(value), src, value, line.num))?;
            image.insert(a, v);
        } else {
            // Blank lines still advance the address
            let addr = line.num - 1;
            if addr >= MEMORY_SIZE {
                return Err(error::mem_bad_line(line.span, src, line.num));
            }
            let v = hex_byte(line.text).ok_or_else(|| {
                error::mem_bad_value(line.span, src, line.text, line.num)
            })?;
            image.insert(addr as u8, v);
        }
    }
    Ok(image)
}

/// Render a final-state dump: one `0xAA=0xVV` line per written address.
pub fn render_dump(memory: &[(u8, u8)]) -> String {
    let mut out = String::new();
    for &(addr, value) in memory {
        out.push_str(&format!("{addr:#04x}={value:#04x}\n"));
    }
    out
}

/// Parse a dump back into sorted address/value pairs.
pub fn parse_dump(src: &str) -> Result<Vec<(u8, u8)>> {
    let mut entries = Vec::new();
    for line in &lexer::scan(src) {
        if line.is_blank() {
            continue;
        }
        let Some((addr, value)) = line.text.split_once('=') else {
            return Err(error::mem_bad_line(line.span, src, line.num));
        };
        let (addr, value) = (addr.trim(), value.trim());
        let a = hex_byte(addr)
            .ok_or_else(|| error::mem_bad_value(line.span_of(addr), src, addr, line.num))?;
        let v = hex_byte(value)
            .ok_or_else(|| error::mem_bad_value(line.span_of(value), src, value, line.num))?;
        entries.push((a, v));
    }
    entries.sort_unstable_by_key(|&(addr, _)| addr);
    Ok(entries)
}

/// Compare two dumps across the full address space; addresses absent from
/// either side read as zero.
pub fn compare_dumps(actual: &[(u8, u8)], expected: &[(u8, u8)]) -> Vec<Mismatch> {
    let actual: FxMap<u8, u8> = actual.iter().copied().collect();
    let expected: FxMap<u8, u8> = expected.iter().copied().collect();
    let mut mismatches = Vec::new();
    for addr in 0..=u8::MAX {
        let a = actual.get(&addr).copied().unwrap_or(0);
        let e = expected.get(&addr).copied().unwrap_or(0);
        if a != e {
            mismatches.push(Mismatch { addr, actual: a, expected: e });
        }
    }
    mismatches
}
