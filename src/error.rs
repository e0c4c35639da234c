use miette::{miette, LabeledSpan, Report, Severity};

use crate::isa::Opcode;
use crate::symbol::Span;

// Resolver (first pass) errors

pub fn bad_macro_def(span: Span, src: &str, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "resolve::macro",
        help = "macro definitions look like `def name value`.",
        labels = vec![LabeledSpan::at(span, "malformed definition")],
        "Malformed macro definition on line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn bad_label(span: Span, src: &str, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "resolve::label",
        help = "labels must start with a letter or underscore, like `loop:`.",
        labels = vec![LabeledSpan::at(span, "malformed label")],
        "Malformed label on line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn duplicate_label(span: Span, src: &str, name: &str, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "resolve::duplicate_label",
        help = "each label may only be bound once per program.",
        labels = vec![LabeledSpan::at(span, "duplicate label")],
        "Label `{name}` redefined on line {line}",
    )
    .with_source_code(src.to_string())
}

// Parser (second pass) errors

pub fn unknown_mnemonic(span: Span, src: &str, token: &str, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::unknown_mnemonic",
        help = "check the list of TUCA-5.1 mnemonics in the documentation.",
        labels = vec![LabeledSpan::at(span, "not a mnemonic")],
        "Unknown mnemonic `{token}` on line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn operand_count(
    span: Span,
    src: &str,
    opcode: Opcode,
    expected: usize,
    found: usize,
    line: usize,
) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::operand_count",
        help = "check the operand shape for this instruction.",
        labels = vec![LabeledSpan::at(span, "wrong operand count")],
        "`{opcode}` takes {expected} operand(s), found {found} on line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn bad_register(span: Span, src: &str, token: &str, opcode: Opcode, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::register",
        help = "registers are written `r0` through `r15`.",
        labels = vec![LabeledSpan::at(span, "not a register")],
        "Expected a register for `{opcode}`, found `{token}` on line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn bad_literal(
    span: Span,
    src: &str,
    token: &str,
    what: &str,
    max: u16,
    opcode: Opcode,
    line: usize,
) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::literal",
        help = format!("{what} literals are decimal or 0x-prefixed hex below {max}."),
        labels = vec![LabeledSpan::at(span, "bad literal")],
        "Invalid {what} `{token}` for `{opcode}` on line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn bad_shift(span: Span, src: &str, token: &str, opcode: Opcode, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::shift",
        help = "shift amounts range from 1 to 7.",
        labels = vec![LabeledSpan::at(span, "bad shift amount")],
        "Invalid shift amount `{token}` for `{opcode}` on line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn unknown_label(span: Span, src: &str, token: &str, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::unknown_label",
        help = "jump targets are labels bound somewhere in the program, or plain addresses.",
        labels = vec![LabeledSpan::at(span, "unbound label")],
        "Unknown jump target `{token}` on line {line}",
    )
    .with_source_code(src.to_string())
}

// Instruction codec errors

pub fn no_encoding(opcode: Opcode) -> Report {
    miette!(
        severity = Severity::Error,
        code = "encode::extended",
        help = "only the sixteen hardware opcodes have a binary encoding.",
        "`{opcode}` has no hardware encoding",
    )
}

pub fn decode_shift(word: u16) -> Report {
    miette!(
        severity = Severity::Error,
        code = "decode::shift",
        help = "shift amounts range from 1 to 7.",
        "Instruction word {word:#06x} carries an out-of-range shift amount",
    )
}

// Memory/vmem file loader errors

pub fn mem_bad_line(span: Span, src: &str, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "mem::line",
        help = "memory files hold one hex byte per line, or `addr=value` pairs.",
        labels = vec![LabeledSpan::at(span, "unrecognized line")],
        "Malformed memory file line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn mem_bad_value(span: Span, src: &str, token: &str, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "mem::value",
        help = "addresses and values are hex bytes, with or without a 0x prefix.",
        labels = vec![LabeledSpan::at(span, "bad value")],
        "Invalid memory value `{token}` on line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn vmem_bad_line(span: Span, src: &str, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "vmem::line",
        help = "expected `@address word` or a bare 4-digit hex word per line.",
        labels = vec![LabeledSpan::at(span, "unrecognized line")],
        "Malformed program word on line {line}",
    )
    .with_source_code(src.to_string())
}

pub fn vmem_gap(span: Span, src: &str, addr: u16, expected: u16, line: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "vmem::gap",
        help = "instruction memory addresses must be contiguous from zero.",
        labels = vec![LabeledSpan::at(span, "out-of-order address")],
        "Address {addr:#06x} on line {line} where {expected:#06x} was expected",
    )
    .with_source_code(src.to_string())
}
