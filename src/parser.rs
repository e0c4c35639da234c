use miette::Result;

use crate::air::{Air, Instruction};
use crate::error;
use crate::isa::{Opcode, Shape};
use crate::lexer::{self, Line};
use crate::symbol::{FxMap, LabelTable, MacroTable, Register};

/// Transforms assembly source into an [`Air`] program.
///
/// Two linear passes: the first binds labels to instruction indices and
/// macros to replacement text, the second builds one [`Instruction`] per
/// remaining line. Assembly is all-or-nothing; the first malformed line
/// aborts with a diagnostic.
pub struct AsmParser<'a> {
    /// Reference to the source file
    src: &'a str,
    /// Cleaned source lines
    lines: Vec<Line<'a>>,
    labels: LabelTable,
    macros: MacroTable,
}

impl<'a> AsmParser<'a> {
    pub fn new(src: &'a str) -> Self {
        AsmParser {
            src,
            lines: lexer::scan(src),
            labels: FxMap::default(),
            macros: FxMap::default(),
        }
    }

    /// Bind labels and macros without emitting instructions. Label and
    /// macro-definition lines contribute no address; every other non-blank
    /// line advances the counter by one instruction.
    fn first_pass(&mut self) -> Result<()> {
        let mut addr: u16 = 0;
        for line in &self.lines {
            if line.is_blank() {
                continue;
            }
            if lexer::is_macro_def(line.text) {
                let Some((name, value)) = lexer::split_macro_def(line.text) else {
                    return Err(error::bad_macro_def(line.span, self.src, line.num));
                };
                self.macros.insert(name.to_string(), value.to_string());
                continue;
            }
            let mut text = line.text;
            if let Some((name, rest)) = lexer::split_label(text) {
                if !lexer::is_ident(name) {
                    return Err(error::bad_label(line.span, self.src, line.num));
                }
                if self.labels.insert(name.to_string(), addr).is_some() {
                    return Err(error::duplicate_label(line.span, self.src, name, line.num));
                }
                text = rest;
            }
            if !text.is_empty() {
                addr += 1;
            }
        }
        Ok(())
    }

    /// Run both passes and consume self to return the assembled program.
    pub fn parse(mut self) -> Result<Air> {
        self.first_pass()?;

        let lines = std::mem::take(&mut self.lines);
        let mut ast = Vec::new();
        for line in &lines {
            if line.is_blank() || lexer::is_macro_def(line.text) {
                continue;
            }
            let mut text = line.text;
            if let Some((_, rest)) = lexer::split_label(text) {
                // Label already recorded during the first pass
                text = rest;
                if text.is_empty() {
                    continue;
                }
            }
            ast.push(self.parse_instr(line, text)?);
        }
        Ok(Air::new(ast, self.labels))
    }

    fn parse_instr(&self, line: &Line<'a>, text: &str) -> Result<Instruction> {
        let (mnemonic, rest) = match text.find(char::is_whitespace) {
            Some(idx) => (&text[..idx], text[idx..].trim_start()),
            None => (text, ""),
        };
        let opcode: Opcode = mnemonic.parse().map_err(|()| {
            error::unknown_mnemonic(line.span_of(mnemonic), self.src, mnemonic, line.num)
        })?;

        // Macros apply to the operand text before tokenization
        let rest = lexer::substitute(&self.macros, rest);
        let ops = lexer::split_operands(&rest);
        self.build(opcode, &ops, line)
    }

    /// Build an instruction, enforcing the operand shape table.
    fn build(&self, opcode: Opcode, ops: &[&str], line: &Line<'a>) -> Result<Instruction> {
        use Opcode::*;
        let inst = match opcode.shape() {
            Shape::None => {
                self.expect_count(opcode, ops, 0, line)?;
                Instruction::Halt
            }
            Shape::Reg => {
                self.expect_count(opcode, ops, 1, line)?;
                let rs = self.expect_reg(ops[0], opcode, line)?;
                match opcode {
                    If => Instruction::If { rs },
                    _ => Instruction::Skipif { rs },
                }
            }
            Shape::RegReg => {
                self.expect_count(opcode, ops, 2, line)?;
                let a = self.expect_reg(ops[0], opcode, line)?;
                let b = self.expect_reg(ops[1], opcode, line)?;
                match opcode {
                    Not => Instruction::Not { rs: a, rd: b },
                    Neg => Instruction::Neg { rs: a, rd: b },
                    Ldr => Instruction::Ldr { ra: a, rd: b },
                    Str => Instruction::Str { rs: a, ra: b },
                    Loadpc => Instruction::Loadpc { rh: a, rl: b },
                    _ => Instruction::Jmpr { rh: a, rl: b },
                }
            }
            Shape::RegRegReg => {
                self.expect_count(opcode, ops, 3, line)?;
                let rs1 = self.expect_reg(ops[0], opcode, line)?;
                let rs2 = self.expect_reg(ops[1], opcode, line)?;
                let rd = self.expect_reg(ops[2], opcode, line)?;
                match opcode {
                    Add => Instruction::Add { rs1, rs2, rd },
                    And => Instruction::And { rs1, rs2, rd },
                    Or => Instruction::Or { rs1, rs2, rd },
                    Eq => Instruction::Eq { rs1, rs2, rd },
                    Gt => Instruction::Gt { rs1, rs2, rd },
                    _ => Instruction::Sub { rs1, rs2, rd },
                }
            }
            Shape::RegShiftReg => {
                self.expect_count(opcode, ops, 3, line)?;
                let rs = self.expect_reg(ops[0], opcode, line)?;
                let n = self.expect_shift(ops[1], opcode, line)?;
                let rd = self.expect_reg(ops[2], opcode, line)?;
                match opcode {
                    Shl => Instruction::Shl { rs, n, rd },
                    _ => Instruction::Shr { rs, n, rd },
                }
            }
            Shape::ImmReg => {
                self.expect_count(opcode, ops, 2, line)?;
                let imm = self.expect_byte(ops[0], "immediate", opcode, line)?;
                let rd = self.expect_reg(ops[1], opcode, line)?;
                Instruction::Ldi { imm, rd }
            }
            Shape::AddrReg => {
                self.expect_count(opcode, ops, 2, line)?;
                let addr = self.expect_byte(ops[0], "address", opcode, line)?;
                let rd = self.expect_reg(ops[1], opcode, line)?;
                Instruction::Ld { addr, rd }
            }
            Shape::RegAddr => {
                self.expect_count(opcode, ops, 2, line)?;
                let rs = self.expect_reg(ops[0], opcode, line)?;
                let addr = self.expect_byte(ops[1], "address", opcode, line)?;
                Instruction::St { rs, addr }
            }
            Shape::Addr => {
                self.expect_count(opcode, ops, 1, line)?;
                let target = self.expect_target(ops[0], line)?;
                Instruction::Jmp { target }
            }
        };
        Ok(inst)
    }

    fn expect_count(
        &self,
        opcode: Opcode,
        ops: &[&str],
        expected: usize,
        line: &Line<'a>,
    ) -> Result<()> {
        if ops.len() != expected {
            return Err(error::operand_count(
                line.span, self.src, opcode, expected, ops.len(), line.num,
            ));
        }
        Ok(())
    }

    fn expect_reg(&self, tok: &str, opcode: Opcode, line: &Line<'a>) -> Result<Register> {
        tok.parse::<Register>().map_err(|()| {
            error::bad_register(line.span_of(tok), self.src, tok, opcode, line.num)
        })
    }

    fn expect_byte(
        &self,
        tok: &str,
        what: &str,
        opcode: Opcode,
        line: &Line<'a>,
    ) -> Result<u8> {
        match lexer::parse_literal(tok) {
            Some(val) if val < 0x100 => Ok(val as u8),
            _ => Err(error::bad_literal(
                line.span_of(tok), self.src, tok, what, 0x100, opcode, line.num,
            )),
        }
    }

    fn expect_shift(&self, tok: &str, opcode: Opcode, line: &Line<'a>) -> Result<u8> {
        match lexer::parse_literal(tok) {
            Some(val @ 1..=7) => Ok(val as u8),
            _ => Err(error::bad_shift(line.span_of(tok), self.src, tok, opcode, line.num)),
        }
    }

    /// Jump operands resolve through the label table first, then fall back
    /// to a plain 12-bit address literal.
    fn expect_target(&self, tok: &str, line: &Line<'a>) -> Result<u16> {
        if let Some(&target) = self.labels.get(tok) {
            return Ok(target);
        }
        match lexer::parse_literal(tok) {
            Some(val) if val < 0x1000 => Ok(val),
            Some(_) => Err(error::bad_literal(
                line.span_of(tok), self.src, tok, "jump target", 0x1000, Opcode::Jmp, line.num,
            )),
            None => Err(error::unknown_label(line.span_of(tok), self.src, tok, line.num)),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn reg(val: u8) -> Register {
        Register::new(val).unwrap()
    }

    fn assemble(src: &str) -> Air {
        AsmParser::new(src).parse().unwrap()
    }

    #[test]
    fn parse_add_basic() {
        let air = assemble("add r0 r1 r2");
        assert_eq!(
            air.get(0),
            &Instruction::Add { rs1: reg(0), rs2: reg(1), rd: reg(2) }
        );
    }

    #[test]
    fn parse_comma_operands() {
        let air = assemble("add r0, r1, r2\nshl r1, 3, r2");
        assert_eq!(air.len(), 2);
        assert_eq!(air.get(1), &Instruction::Shl { rs: reg(1), n: 3, rd: reg(2) });
    }

    #[test]
    fn parse_case_insensitive_mnemonic() {
        let air = assemble("LDI 0x05 r0");
        assert_eq!(air.get(0), &Instruction::Ldi { imm: 5, rd: reg(0) });
    }

    #[test]
    fn parse_forward_label() {
        let air = assemble("jmp end\nldi 0x01 r0\nend: halt");
        assert_eq!(air.get(0), &Instruction::Jmp { target: 2 });
        assert_eq!(air.labels().get("end"), Some(&2));
    }

    #[test]
    fn parse_label_own_line() {
        let air = assemble("loop:\nldi 0x01 r0\njmp loop");
        assert_eq!(air.labels().get("loop"), Some(&0));
        assert_eq!(air.get(1), &Instruction::Jmp { target: 0 });
    }

    #[test]
    fn parse_jmp_numeric_target() {
        let air = assemble("jmp 0x2\njmp 3");
        assert_eq!(air.get(0), &Instruction::Jmp { target: 2 });
        assert_eq!(air.get(1), &Instruction::Jmp { target: 3 });
    }

    #[test]
    fn parse_macro_substitution() {
        let air = assemble("def RESULT 0x1f\nld RESULT r2\nst r2 RESULT");
        assert_eq!(air.get(0), &Instruction::Ld { addr: 0x1f, rd: reg(2) });
        assert_eq!(air.get(1), &Instruction::St { rs: reg(2), addr: 0x1f });
    }

    #[test]
    fn parse_macro_defined_after_use() {
        // Both passes complete before any operand is parsed
        let air = assemble("ld RESULT r2\ndef RESULT 0x1f");
        assert_eq!(air.get(0), &Instruction::Ld { addr: 0x1f, rd: reg(2) });
    }

    #[test]
    fn parse_comments_and_blanks() {
        let air = assemble("# header\n\nhalt # trailing\n");
        assert_eq!(air.len(), 1);
        assert_eq!(air.get(0), &Instruction::Halt);
    }

    #[test]
    fn parse_extended_mnemonics() {
        let air = assemble("ldr r1 r2\nstr r3 r4\nsub r0 r1 r2\nloadpc r1 r2\njmpr r1 r2");
        assert_eq!(air.get(0), &Instruction::Ldr { ra: reg(1), rd: reg(2) });
        assert_eq!(air.get(1), &Instruction::Str { rs: reg(3), ra: reg(4) });
        assert_eq!(air.get(2), &Instruction::Sub { rs1: reg(0), rs2: reg(1), rd: reg(2) });
        assert_eq!(air.get(3), &Instruction::Loadpc { rh: reg(1), rl: reg(2) });
        assert_eq!(air.get(4), &Instruction::Jmpr { rh: reg(1), rl: reg(2) });
    }

    #[test]
    fn reject_unknown_mnemonic() {
        assert!(AsmParser::new("frobnicate r0").parse().is_err());
    }

    #[test]
    fn reject_operand_count() {
        assert!(AsmParser::new("add r0 r1").parse().is_err());
        assert!(AsmParser::new("halt r0").parse().is_err());
        assert!(AsmParser::new("if").parse().is_err());
    }

    #[test]
    fn reject_register_range() {
        assert!(AsmParser::new("add r0 r1 r16").parse().is_err());
        assert!(AsmParser::new("if x3").parse().is_err());
    }

    #[test]
    fn reject_literal_range() {
        assert!(AsmParser::new("ldi 0x100 r0").parse().is_err());
        assert!(AsmParser::new("ld 256 r0").parse().is_err());
        assert!(AsmParser::new("st r0 0x100").parse().is_err());
    }

    #[test]
    fn reject_shift_range() {
        assert!(AsmParser::new("shl r1 0 r2").parse().is_err());
        assert!(AsmParser::new("shr r1 8 r2").parse().is_err());
    }

    #[test]
    fn reject_duplicate_label() {
        assert!(AsmParser::new("a: halt\na: halt").parse().is_err());
    }

    #[test]
    fn reject_malformed_label() {
        assert!(AsmParser::new("2bad: halt").parse().is_err());
    }

    #[test]
    fn reject_malformed_macro() {
        assert!(AsmParser::new("def onlyname").parse().is_err());
        assert!(AsmParser::new("def 2bad 0x1f").parse().is_err());
    }

    #[test]
    fn reject_unknown_jump_target() {
        assert!(AsmParser::new("jmp nowhere").parse().is_err());
    }

    #[test]
    fn empty_source_is_empty_program() {
        let air = assemble("# nothing here\n\n");
        assert!(air.is_empty());
    }

    #[test]
    fn hex_rendering_of_reference_program() {
        let air = assemble("ldi 0x05 r0\nldi 0x03 r1\nadd r0 r1 r2\nst r2 0x00\nhalt");
        let hex: Vec<String> = air
            .instructions()
            .iter()
            .map(|inst| inst.to_hex().unwrap())
            .collect();
        assert_eq!(hex, vec!["2050", "2031", "4012", "3200", "f000"]);
    }
}
