use std::fmt;

use miette::Result;

use crate::error;
use crate::isa::Opcode;
use crate::symbol::{LabelTable, Register};

/// A single validated TUCA instruction.
///
/// One variant per opcode so that both the codec and the execution engine
/// dispatch exhaustively. Field ranges are enforced at construction: register
/// fields by the `Register` type, bytes by `u8`, shift amounts and 12-bit
/// jump targets by the checked constructors below.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Instruction {
    /// Absolute jump to an instruction index
    Jmp { target: u16 },
    /// Load memory\[addr\] into rd
    Ld { addr: u8, rd: Register },
    /// Load an immediate into rd
    Ldi { imm: u8, rd: Register },
    /// Store rs at memory\[addr\]
    St { rs: Register, addr: u8 },
    Add { rs1: Register, rs2: Register, rd: Register },
    And { rs1: Register, rs2: Register, rd: Register },
    Or { rs1: Register, rs2: Register, rd: Register },
    /// Bitwise complement of rs into rd
    Not { rs: Register, rd: Register },
    /// Two's-complement negation of rs into rd
    Neg { rs: Register, rd: Register },
    Shl { rs: Register, n: u8, rd: Register },
    /// Unsigned logical shift right
    Shr { rs: Register, n: u8, rd: Register },
    /// rd = 1 if rs1 == rs2 else 0
    Eq { rs1: Register, rs2: Register, rd: Register },
    /// rd = 1 if rs1 > rs2 else 0
    Gt { rs1: Register, rs2: Register, rd: Register },
    /// Skip the next instruction when rs == 0
    If { rs: Register },
    /// Skip the next instruction when rs != 0
    Skipif { rs: Register },
    Halt,
    // Emulator-only mnemonics, no hardware encoding
    /// Load memory\[ra\] into rd
    Ldr { ra: Register, rd: Register },
    /// Store rs at memory\[ra\]
    Str { rs: Register, ra: Register },
    Sub { rs1: Register, rs2: Register, rd: Register },
    /// Split the current byte address across rh/rl
    Loadpc { rh: Register, rl: Register },
    /// Jump to the byte address held in rh/rl
    Jmpr { rh: Register, rl: Register },
}

impl Instruction {
    /// Jump targets must fit the 12-bit address field.
    pub fn jump(target: u16) -> Option<Instruction> {
        (target < 0x1000).then_some(Instruction::Jmp { target })
    }

    /// Shift amounts range from 1 to 7.
    pub fn shift(opcode: Opcode, rs: Register, n: u8, rd: Register) -> Option<Instruction> {
        if !(1..=7).contains(&n) {
            return None;
        }
        match opcode {
            Opcode::Shl => Some(Instruction::Shl { rs, n, rd }),
            Opcode::Shr => Some(Instruction::Shr { rs, n, rd }),
            _ => None,
        }
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Jmp { .. } => Opcode::Jmp,
            Instruction::Ld { .. } => Opcode::Ld,
            Instruction::Ldi { .. } => Opcode::Ldi,
            Instruction::St { .. } => Opcode::St,
            Instruction::Add { .. } => Opcode::Add,
            Instruction::And { .. } => Opcode::And,
            Instruction::Or { .. } => Opcode::Or,
            Instruction::Not { .. } => Opcode::Not,
            Instruction::Neg { .. } => Opcode::Neg,
            Instruction::Shl { .. } => Opcode::Shl,
            Instruction::Shr { .. } => Opcode::Shr,
            Instruction::Eq { .. } => Opcode::Eq,
            Instruction::Gt { .. } => Opcode::Gt,
            Instruction::If { .. } => Opcode::If,
            Instruction::Skipif { .. } => Opcode::Skipif,
            Instruction::Halt => Opcode::Halt,
            Instruction::Ldr { .. } => Opcode::Ldr,
            Instruction::Str { .. } => Opcode::Str,
            Instruction::Sub { .. } => Opcode::Sub,
            Instruction::Loadpc { .. } => Opcode::Loadpc,
            Instruction::Jmpr { .. } => Opcode::Jmpr,
        }
    }

    /// Emit the canonical 16-bit encoding, opcode in the top nibble.
    /// Errors for the emulator-only mnemonics.
    pub fn emit(&self) -> Result<u16> {
        use Instruction::*;
        let opcode = self.opcode();
        let code = opcode.code().ok_or_else(|| error::no_encoding(opcode))? as u16;
        let fields = match *self {
            Jmp { target } => target & 0xFFF,
            Ld { addr, rd } => ((addr as u16) << 4) | rd.bits(),
            Ldi { imm, rd } => ((imm as u16) << 4) | rd.bits(),
            St { rs, addr } => (rs.bits() << 8) | addr as u16,
            Add { rs1, rs2, rd }
            | And { rs1, rs2, rd }
            | Or { rs1, rs2, rd }
            | Eq { rs1, rs2, rd }
            | Gt { rs1, rs2, rd } => (rs1.bits() << 8) | (rs2.bits() << 4) | rd.bits(),
            Not { rs, rd } | Neg { rs, rd } => (rs.bits() << 8) | (rd.bits() << 4),
            Shl { rs, n, rd } | Shr { rs, n, rd } => {
                (rs.bits() << 8) | ((n as u16) << 4) | rd.bits()
            }
            If { rs } | Skipif { rs } => rs.bits() << 8,
            Halt => 0,
            // Filtered by the code() check above
            Ldr { .. } | Str { .. } | Sub { .. } | Loadpc { .. } | Jmpr { .. } => unreachable!(),
        };
        Ok((code << 12) | fields)
    }

    /// Inverse of [`Instruction::emit`]. Field layouts per opcode shape;
    /// unused bits are ignored, out-of-range shift amounts are rejected.
    pub fn decode(word: u16) -> Result<Instruction> {
        use Instruction::*;
        let reg = |shift: u16| Register::from_nibble(word >> shift);
        let byte = ((word >> 4) & 0xFF) as u8;
        let inst = match Opcode::from_code((word >> 12) as u8) {
            Opcode::Jmp => Jmp { target: word & 0xFFF },
            Opcode::Ld => Ld { addr: byte, rd: reg(0) },
            Opcode::Ldi => Ldi { imm: byte, rd: reg(0) },
            Opcode::St => St { rs: reg(8), addr: (word & 0xFF) as u8 },
            Opcode::Add => Add { rs1: reg(8), rs2: reg(4), rd: reg(0) },
            Opcode::And => And { rs1: reg(8), rs2: reg(4), rd: reg(0) },
            Opcode::Or => Or { rs1: reg(8), rs2: reg(4), rd: reg(0) },
            Opcode::Not => Not { rs: reg(8), rd: reg(4) },
            Opcode::Neg => Neg { rs: reg(8), rd: reg(4) },
            op @ (Opcode::Shl | Opcode::Shr) => {
                Instruction::shift(op, reg(8), ((word >> 4) & 0xF) as u8, reg(0))
                    .ok_or_else(|| error::decode_shift(word))?
            }
            Opcode::Eq => Eq { rs1: reg(8), rs2: reg(4), rd: reg(0) },
            Opcode::Gt => Gt { rs1: reg(8), rs2: reg(4), rd: reg(0) },
            Opcode::If => If { rs: reg(8) },
            Opcode::Skipif => Skipif { rs: reg(8) },
            Opcode::Halt => Halt,
            // from_code only yields hardware opcodes
            _ => unreachable!(),
        };
        Ok(inst)
    }

    /// Four lowercase hex digits.
    pub fn to_hex(&self) -> Result<String> {
        Ok(format!("{:04x}", self.emit()?))
    }

    /// Sixteen binary digits.
    pub fn to_binary(&self) -> Result<String> {
        Ok(format!("{:016b}", self.emit()?))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;
        match *self {
            Jmp { target } => write!(f, "jmp {target}"),
            Ld { addr, rd } => write!(f, "ld {addr:#04x} {rd}"),
            Ldi { imm, rd } => write!(f, "ldi {imm:#04x} {rd}"),
            St { rs, addr } => write!(f, "st {rs} {addr:#04x}"),
            Add { rs1, rs2, rd } => write!(f, "add {rs1} {rs2} {rd}"),
            And { rs1, rs2, rd } => write!(f, "and {rs1} {rs2} {rd}"),
            Or { rs1, rs2, rd } => write!(f, "or {rs1} {rs2} {rd}"),
            Not { rs, rd } => write!(f, "not {rs} {rd}"),
            Neg { rs, rd } => write!(f, "neg {rs} {rd}"),
            Shl { rs, n, rd } => write!(f, "shl {rs} {n} {rd}"),
            Shr { rs, n, rd } => write!(f, "shr {rs} {n} {rd}"),
            Eq { rs1, rs2, rd } => write!(f, "eq {rs1} {rs2} {rd}"),
            Gt { rs1, rs2, rd } => write!(f, "gt {rs1} {rs2} {rd}"),
            If { rs } => write!(f, "if {rs}"),
            Skipif { rs } => write!(f, "skipif {rs}"),
            Halt => write!(f, "halt"),
            Ldr { ra, rd } => write!(f, "ldr {ra} {rd}"),
            Str { rs, ra } => write!(f, "str {rs} {ra}"),
            Sub { rs1, rs2, rd } => write!(f, "sub {rs1} {rs2} {rd}"),
            Loadpc { rh, rl } => write!(f, "loadpc {rh} {rl}"),
            Jmpr { rh, rl } => write!(f, "jmpr {rh} {rl}"),
        }
    }
}

/// An assembled program: the instruction sequence plus the label table
/// produced by the first pass.
pub struct Air {
    ast: Vec<Instruction>,
    labels: LabelTable,
}

impl Air {
    pub(crate) fn new(ast: Vec<Instruction>, labels: LabelTable) -> Self {
        Air { ast, labels }
    }

    pub fn get(&self, idx: usize) -> &Instruction {
        &self.ast[idx]
    }

    pub fn len(&self) -> usize {
        self.ast.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ast.is_empty()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.ast
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }
}

impl<'a> IntoIterator for &'a Air {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.ast.iter()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn reg(val: u8) -> Register {
        Register::new(val).unwrap()
    }

    #[test]
    fn golden_encodings() {
        // Field layouts per the hardware reference
        let cases: &[(Instruction, u16)] = &[
            (Instruction::Jmp { target: 0x003 }, 0x0003),
            (Instruction::Ld { addr: 0x1f, rd: reg(2) }, 0x11f2),
            (Instruction::Ldi { imm: 0x05, rd: reg(0) }, 0x2050),
            (Instruction::St { rs: reg(2), addr: 0x00 }, 0x3200),
            (Instruction::Add { rs1: reg(0), rs2: reg(1), rd: reg(2) }, 0x4012),
            (Instruction::And { rs1: reg(3), rs2: reg(4), rd: reg(5) }, 0x5345),
            (Instruction::Or { rs1: reg(15), rs2: reg(0), rd: reg(1) }, 0x6f01),
            (Instruction::Not { rs: reg(1), rd: reg(2) }, 0x7120),
            (Instruction::Neg { rs: reg(9), rd: reg(10) }, 0x89a0),
            (Instruction::Shl { rs: reg(1), n: 3, rd: reg(2) }, 0x9132),
            (Instruction::Shr { rs: reg(4), n: 7, rd: reg(4) }, 0xa474),
            (Instruction::Eq { rs1: reg(1), rs2: reg(2), rd: reg(3) }, 0xb123),
            (Instruction::Gt { rs1: reg(2), rs2: reg(1), rd: reg(0) }, 0xc210),
            (Instruction::If { rs: reg(3) }, 0xd300),
            (Instruction::Skipif { rs: reg(12) }, 0xec00),
            (Instruction::Halt, 0xf000),
        ];
        for (inst, word) in cases {
            assert_eq!(inst.emit().unwrap(), *word, "{inst}");
            assert_eq!(&Instruction::decode(*word).unwrap(), inst);
        }
    }

    #[test]
    fn roundtrip_field_ranges() {
        for r1 in [0u8, 7, 15] {
            for r2 in [0u8, 8, 15] {
                for r3 in [0u8, 15] {
                    let inst = Instruction::Add {
                        rs1: reg(r1),
                        rs2: reg(r2),
                        rd: reg(r3),
                    };
                    assert_eq!(Instruction::decode(inst.emit().unwrap()).unwrap(), inst);
                }
            }
        }
        for val in [0u8, 1, 0x7f, 0xff] {
            for r in [0u8, 15] {
                let ld = Instruction::Ld { addr: val, rd: reg(r) };
                let ldi = Instruction::Ldi { imm: val, rd: reg(r) };
                let st = Instruction::St { rs: reg(r), addr: val };
                for inst in [ld, ldi, st] {
                    assert_eq!(Instruction::decode(inst.emit().unwrap()).unwrap(), inst);
                }
            }
        }
        for n in 1..=7u8 {
            let inst = Instruction::shift(Opcode::Shl, reg(1), n, reg(2)).unwrap();
            assert_eq!(Instruction::decode(inst.emit().unwrap()).unwrap(), inst);
        }
        for target in [0u16, 1, 0xabc, 0xfff] {
            let inst = Instruction::jump(target).unwrap();
            assert_eq!(Instruction::decode(inst.emit().unwrap()).unwrap(), inst);
        }
    }

    #[test]
    fn construction_rejects_out_of_range() {
        assert!(Instruction::jump(0x1000).is_none());
        assert!(Instruction::shift(Opcode::Shl, reg(0), 0, reg(1)).is_none());
        assert!(Instruction::shift(Opcode::Shr, reg(0), 8, reg(1)).is_none());
        assert!(Register::new(16).is_none());
    }

    #[test]
    fn extended_mnemonics_do_not_encode() {
        let cases = [
            Instruction::Ldr { ra: reg(1), rd: reg(2) },
            Instruction::Str { rs: reg(1), ra: reg(2) },
            Instruction::Sub { rs1: reg(1), rs2: reg(2), rd: reg(3) },
            Instruction::Loadpc { rh: reg(1), rl: reg(2) },
            Instruction::Jmpr { rh: reg(1), rl: reg(2) },
        ];
        for inst in cases {
            let err = inst.emit().unwrap_err();
            assert!(err.to_string().contains("no hardware encoding"), "{err}");
        }
    }

    #[test]
    fn decode_rejects_bad_shift() {
        // shl r1 0 r2
        assert!(Instruction::decode(0x9102).is_err());
        // shr with amount 0
        assert!(Instruction::decode(0xa102).is_err());
    }

    #[test]
    fn renderings() {
        let inst = Instruction::Ldi { imm: 0x05, rd: reg(0) };
        assert_eq!(inst.to_hex().unwrap(), "2050");
        assert_eq!(inst.to_binary().unwrap(), "0010000001010000");
        assert_eq!(inst.to_string(), "ldi 0x05 r0");
    }
}
