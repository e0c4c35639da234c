use std::fmt;
use std::str::FromStr;

/// Operand shape of an opcode. Every opcode has exactly one.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Shape {
    /// `halt`
    None,
    /// `if r1` / `skipif r1`
    Reg,
    /// `not r1 r2` and friends
    RegReg,
    /// `add r1 r2 r3` - sources first, destination last
    RegRegReg,
    /// `shl r1 n r2`
    RegShiftReg,
    /// `ldi val r1`
    ImmReg,
    /// `ld addr r1`
    AddrReg,
    /// `st r1 addr`
    RegAddr,
    /// `jmp label` - 12-bit absolute target
    Addr,
}

/// Closed set of TUCA-5.1 mnemonics.
///
/// The first sixteen are the hardware opcodes and carry a 4-bit code; the
/// rest are interpreted by the emulator but have no binary encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Opcode {
    Jmp,
    Ld,
    Ldi,
    St,
    Add,
    And,
    Or,
    Not,
    Neg,
    Shl,
    Shr,
    Eq,
    Gt,
    If,
    Skipif,
    Halt,
    // Emulator-only extensions
    Ldr,
    Str,
    Sub,
    Loadpc,
    Jmpr,
}

impl Opcode {
    pub const fn shape(self) -> Shape {
        use Opcode::*;
        match self {
            Halt => Shape::None,
            If | Skipif => Shape::Reg,
            Not | Neg | Ldr | Str | Loadpc | Jmpr => Shape::RegReg,
            Add | And | Or | Eq | Gt | Sub => Shape::RegRegReg,
            Shl | Shr => Shape::RegShiftReg,
            Ldi => Shape::ImmReg,
            Ld => Shape::AddrReg,
            St => Shape::RegAddr,
            Jmp => Shape::Addr,
        }
    }

    /// 4-bit hardware opcode. `None` for the emulator-only mnemonics.
    pub const fn code(self) -> Option<u8> {
        use Opcode::*;
        match self {
            Jmp => Some(0b0000),
            Ld => Some(0b0001),
            Ldi => Some(0b0010),
            St => Some(0b0011),
            Add => Some(0b0100),
            And => Some(0b0101),
            Or => Some(0b0110),
            Not => Some(0b0111),
            Neg => Some(0b1000),
            Shl => Some(0b1001),
            Shr => Some(0b1010),
            Eq => Some(0b1011),
            Gt => Some(0b1100),
            If => Some(0b1101),
            Skipif => Some(0b1110),
            Halt => Some(0b1111),
            Ldr | Str | Sub | Loadpc | Jmpr => None,
        }
    }

    /// Decode the top nibble of an instruction word. Total, as all sixteen
    /// codes are assigned.
    pub fn from_code(code: u8) -> Opcode {
        use Opcode::*;
        match code & 0xF {
            0b0000 => Jmp,
            0b0001 => Ld,
            0b0010 => Ldi,
            0b0011 => St,
            0b0100 => Add,
            0b0101 => And,
            0b0110 => Or,
            0b0111 => Not,
            0b1000 => Neg,
            0b1001 => Shl,
            0b1010 => Shr,
            0b1011 => Eq,
            0b1100 => Gt,
            0b1101 => If,
            0b1110 => Skipif,
            _ => Halt,
        }
    }

    pub const fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Jmp => "jmp",
            Ld => "ld",
            Ldi => "ldi",
            St => "st",
            Add => "add",
            And => "and",
            Or => "or",
            Not => "not",
            Neg => "neg",
            Shl => "shl",
            Shr => "shr",
            Eq => "eq",
            Gt => "gt",
            If => "if",
            Skipif => "skipif",
            Halt => "halt",
            Ldr => "ldr",
            Str => "str",
            Sub => "sub",
            Loadpc => "loadpc",
            Jmpr => "jmpr",
        }
    }

    pub const fn is_extended(self) -> bool {
        self.code().is_none()
    }
}

impl FromStr for Opcode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Opcode::*;
        // Mnemonics are case-insensitive
        let op = match s.to_ascii_lowercase().as_str() {
            "jmp" => Jmp,
            "ld" => Ld,
            "ldi" => Ldi,
            "st" => St,
            "add" => Add,
            "and" => And,
            "or" => Or,
            "not" => Not,
            "neg" => Neg,
            "shl" => Shl,
            "shr" => Shr,
            "eq" => Eq,
            "gt" => Gt,
            "if" => If,
            "skipif" => Skipif,
            "halt" => Halt,
            "ldr" => Ldr,
            "str" => Str,
            "sub" => Sub,
            "loadpc" => Loadpc,
            "jmpr" => Jmpr,
            _ => return Err(()),
        };
        Ok(op)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
