use std::fmt;

use crate::air::{Air, Instruction};
use crate::error;
use crate::export::MemoryImage;
use crate::isa::{Opcode, Shape};
use crate::lexer;
use crate::symbol::{LabelTable, MacroTable, Register};

pub const MEMORY_SIZE: usize = 256;
pub const NUM_REGISTERS: usize = 16;

/// A loaded program. The text form re-tokenizes each line at every step,
/// the encoded form executes decoded instruction words; both flow through
/// the same [`RunState::apply`] kernel.
enum Program {
    Text(Vec<String>),
    Encoded(Vec<Instruction>),
}

/// All mutable machine state for one run. Create one per program
/// execution; nothing is shared or global.
pub struct RunState {
    reg: [u8; NUM_REGISTERS],
    mem: MemoryImage,
    pc: usize,
    skip_next: bool,
    count: u64,
    program: Program,
    labels: LabelTable,
    macros: MacroTable,
    limit: Option<u64>,
}

/// How a finished run ended.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Termination {
    /// A `halt` instruction executed
    Halted,
    /// The program counter ran off the end of the program
    EndOfProgram,
    /// The step limit was reached
    CeilingReached,
    /// A runtime fault aborted the run
    Faulted,
}

/// Final machine state of a run. Memory holds only the addresses that were
/// written, sorted; every absent address reads as zero.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Snapshot {
    pub registers: [u8; NUM_REGISTERS],
    pub memory: Vec<(u8, u8)>,
    pub instruction_count: u64,
    pub termination: Termination,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RunErrorKind {
    UnknownInstruction(String),
    BadOperand { token: String, expected: String },
    UnknownLabel(String),
}

/// A fault raised mid-run, carrying the machine state at the point of
/// failure so the caller can report it.
#[derive(Debug)]
pub struct RunError {
    pub kind: RunErrorKind,
    pub pc: usize,
    pub snapshot: Snapshot,
}

impl fmt::Display for RunErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunErrorKind::UnknownInstruction(tok) => write!(f, "unknown instruction `{tok}`"),
            RunErrorKind::BadOperand { token, expected } => {
                write!(f, "bad operand `{token}`, expected {expected}")
            }
            RunErrorKind::UnknownLabel(tok) => write!(f, "unknown jump target `{tok}`"),
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault at instruction {}: {}", self.pc, self.kind)
    }
}

impl std::error::Error for RunError {}

/// Next-pc decision of one executed instruction.
enum Flow {
    Advance,
    Jump(usize),
    Halt,
}

impl RunState {
    fn empty(program: Program, labels: LabelTable, macros: MacroTable) -> RunState {
        RunState {
            reg: [0; NUM_REGISTERS],
            mem: MemoryImage::default(),
            pc: 0,
            skip_next: false,
            count: 0,
            program,
            labels,
            macros,
            limit: None,
        }
    }

    /// Load assembly text for direct interpretation. Labels and macros are
    /// collected up front; instruction lines are kept as text and parsed
    /// again at each step.
    pub fn from_source(src: &str) -> miette::Result<RunState> {
        let mut labels = LabelTable::default();
        let mut macros = MacroTable::default();
        let mut program = Vec::new();
        for line in &lexer::scan(src) {
            if line.is_blank() {
                continue;
            }
            if lexer::is_macro_def(line.text) {
                let Some((name, value)) = lexer::split_macro_def(line.text) else {
                    return Err(error::bad_macro_def(line.span, src, line.num));
                };
                macros.insert(name.to_string(), value.to_string());
                continue;
            }
            let mut text = line.text;
            if let Some((name, rest)) = lexer::split_label(text) {
                if !lexer::is_ident(name) {
                    return Err(error::bad_label(line.span, src, line.num));
                }
                if labels.insert(name.to_string(), program.len() as u16).is_some() {
                    return Err(error::duplicate_label(line.span, src, name, line.num));
                }
                text = rest;
            }
            if !text.is_empty() {
                program.push(text.to_string());
            }
        }
        Ok(RunState::empty(Program::Text(program), labels, macros))
    }

    /// Load an assembled program.
    pub fn from_air(air: &Air) -> RunState {
        RunState::empty(
            Program::Encoded(air.instructions().to_vec()),
            air.labels().clone(),
            MacroTable::default(),
        )
    }

    /// Load raw instruction words, e.g. from a `.mem` file.
    pub fn from_words(words: &[u16]) -> miette::Result<RunState> {
        let code = words
            .iter()
            .map(|&word| Instruction::decode(word))
            .collect::<miette::Result<Vec<_>>>()?;
        Ok(RunState::empty(
            Program::Encoded(code),
            LabelTable::default(),
            MacroTable::default(),
        ))
    }

    /// Seed data memory before the run starts.
    pub fn set_memory(&mut self, image: MemoryImage) {
        self.mem.extend(image);
    }

    /// Cap the number of executed instructions. Skipped instructions and
    /// `halt` itself count toward the cap.
    pub fn set_limit(&mut self, limit: u64) {
        self.limit = Some(limit);
    }

    /// Fetch/decode/execute until the program halts, runs off the end, or
    /// hits the step ceiling.
    pub fn run(&mut self) -> Result<Snapshot, RunError> {
        loop {
            if self.pc >= self.program_len() {
                return Ok(self.snapshot(Termination::EndOfProgram));
            }
            if let Some(limit) = self.limit {
                if self.count >= limit {
                    return Ok(self.snapshot(Termination::CeilingReached));
                }
            }
            self.count += 1;
            // An armed skip consumes the fetch but not the semantics
            if self.skip_next {
                self.skip_next = false;
                self.pc += 1;
                continue;
            }
            let inst = match self.fetch() {
                Ok(inst) => inst,
                Err(kind) => return Err(self.fault(kind)),
            };
            match self.apply(inst) {
                Flow::Advance => self.pc += 1,
                Flow::Jump(target) => self.pc = target,
                Flow::Halt => return Ok(self.snapshot(Termination::Halted)),
            }
        }
    }

    fn program_len(&self) -> usize {
        match &self.program {
            Program::Text(lines) => lines.len(),
            Program::Encoded(code) => code.len(),
        }
    }

    fn fetch(&self) -> Result<Instruction, RunErrorKind> {
        match &self.program {
            Program::Encoded(code) => Ok(code[self.pc]),
            Program::Text(lines) => self.parse_line(&lines[self.pc]),
        }
    }

    /// Absent addresses read as zero without being materialized.
    fn load(&self, addr: u8) -> u8 {
        self.mem.get(&addr).copied().unwrap_or(0)
    }

    /// Execute one instruction against the machine state. All arithmetic is
    /// modulo 256.
    fn apply(&mut self, inst: Instruction) -> Flow {
        use Instruction::*;
        match inst {
            Jmp { target } => return Flow::Jump(target as usize),
            Ld { addr, rd } => self.reg[rd.idx()] = self.load(addr),
            Ldi { imm, rd } => self.reg[rd.idx()] = imm,
            St { rs, addr } => {
                self.mem.insert(addr, self.reg[rs.idx()]);
            }
            Add { rs1, rs2, rd } => {
                self.reg[rd.idx()] = self.reg[rs1.idx()].wrapping_add(self.reg[rs2.idx()])
            }
            Sub { rs1, rs2, rd } => {
                self.reg[rd.idx()] = self.reg[rs1.idx()].wrapping_sub(self.reg[rs2.idx()])
            }
            And { rs1, rs2, rd } => self.reg[rd.idx()] = self.reg[rs1.idx()] & self.reg[rs2.idx()],
            Or { rs1, rs2, rd } => self.reg[rd.idx()] = self.reg[rs1.idx()] | self.reg[rs2.idx()],
            Not { rs, rd } => self.reg[rd.idx()] = !self.reg[rs.idx()],
            Neg { rs, rd } => self.reg[rd.idx()] = self.reg[rs.idx()].wrapping_neg(),
            // u8 shifts drop the bits that leave the byte
            Shl { rs, n, rd } => self.reg[rd.idx()] = self.reg[rs.idx()] << n,
            Shr { rs, n, rd } => self.reg[rd.idx()] = self.reg[rs.idx()] >> n,
            Eq { rs1, rs2, rd } => {
                self.reg[rd.idx()] = (self.reg[rs1.idx()] == self.reg[rs2.idx()]) as u8
            }
            Gt { rs1, rs2, rd } => {
                self.reg[rd.idx()] = (self.reg[rs1.idx()] > self.reg[rs2.idx()]) as u8
            }
            If { rs } => {
                if self.reg[rs.idx()] == 0 {
                    self.skip_next = true;
                }
            }
            Skipif { rs } => {
                if self.reg[rs.idx()] != 0 {
                    self.skip_next = true;
                }
            }
            Halt => return Flow::Halt,
            Ldr { ra, rd } => self.reg[rd.idx()] = self.load(self.reg[ra.idx()]),
            Str { rs, ra } => {
                self.mem.insert(self.reg[ra.idx()], self.reg[rs.idx()]);
            }
            // The byte address of the loadpc itself: instructions are two
            // bytes wide, so index * 2
            Loadpc { rh, rl } => {
                let byte = self.pc * 2;
                self.reg[rh.idx()] = (byte >> 8) as u8;
                self.reg[rl.idx()] = byte as u8;
            }
            Jmpr { rh, rl } => {
                let byte = ((self.reg[rh.idx()] as usize) << 8) | self.reg[rl.idx()] as usize;
                return Flow::Jump(byte >> 1);
            }
        }
        Flow::Advance
    }

    /// Tokenize and validate one program line at step time.
    fn parse_line(&self, text: &str) -> Result<Instruction, RunErrorKind> {
        let (mnemonic, rest) = match text.find(char::is_whitespace) {
            Some(idx) => (&text[..idx], text[idx..].trim_start()),
            None => (text, ""),
        };
        let opcode: Opcode = mnemonic
            .parse()
            .map_err(|()| RunErrorKind::UnknownInstruction(mnemonic.to_string()))?;
        let rest = lexer::substitute(&self.macros, rest);
        let ops = lexer::split_operands(&rest);
        self.build(opcode, &ops)
    }

    fn build(&self, opcode: Opcode, ops: &[&str]) -> Result<Instruction, RunErrorKind> {
        use Opcode::*;
        let expected = match opcode.shape() {
            Shape::None => 0,
            Shape::Reg | Shape::Addr => 1,
            Shape::RegReg | Shape::ImmReg | Shape::AddrReg | Shape::RegAddr => 2,
            Shape::RegRegReg | Shape::RegShiftReg => 3,
        };
        if ops.len() != expected {
            return Err(RunErrorKind::BadOperand {
                token: ops.join(" "),
                expected: format!("{expected} operand(s) for `{opcode}`"),
            });
        }
        let inst = match opcode.shape() {
            Shape::None => Instruction::Halt,
            Shape::Reg => {
                let rs = reg(ops[0])?;
                match opcode {
                    If => Instruction::If { rs },
                    _ => Instruction::Skipif { rs },
                }
            }
            Shape::RegReg => {
                let a = reg(ops[0])?;
                let b = reg(ops[1])?;
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
                let rs1 = reg(ops[0])?;
                let rs2 = reg(ops[1])?;
                let rd = reg(ops[2])?;
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
                let rs = reg(ops[0])?;
                let n = shift_amount(ops[1])?;
                let rd = reg(ops[2])?;
                match opcode {
                    Shl => Instruction::Shl { rs, n, rd },
                    _ => Instruction::Shr { rs, n, rd },
                }
            }
            Shape::ImmReg => Instruction::Ldi {
                imm: byte(ops[0])?,
                rd: reg(ops[1])?,
            },
            Shape::AddrReg => Instruction::Ld {
                addr: byte(ops[0])?,
                rd: reg(ops[1])?,
            },
            Shape::RegAddr => Instruction::St {
                rs: reg(ops[0])?,
                addr: byte(ops[1])?,
            },
            Shape::Addr => Instruction::Jmp {
                target: self.target(ops[0])?,
            },
        };
        Ok(inst)
    }

    fn target(&self, tok: &str) -> Result<u16, RunErrorKind> {
        if let Some(&target) = self.labels.get(tok) {
            return Ok(target);
        }
        match lexer::parse_literal(tok) {
            Some(val) if val < 0x1000 => Ok(val),
            Some(_) => Err(RunErrorKind::BadOperand {
                token: tok.to_string(),
                expected: "a 12-bit jump target".to_string(),
            }),
            None => Err(RunErrorKind::UnknownLabel(tok.to_string())),
        }
    }

    fn snapshot(&self, termination: Termination) -> Snapshot {
        let mut memory: Vec<(u8, u8)> = self.mem.iter().map(|(&a, &v)| (a, v)).collect();
        memory.sort_unstable_by_key(|&(addr, _)| addr);
        Snapshot {
            registers: self.reg,
            memory,
            instruction_count: self.count,
            termination,
        }
    }

    fn fault(&self, kind: RunErrorKind) -> RunError {
        RunError {
            kind,
            pc: self.pc,
            snapshot: self.snapshot(Termination::Faulted),
        }
    }
}

fn reg(tok: &str) -> Result<Register, RunErrorKind> {
    tok.parse().map_err(|()| RunErrorKind::BadOperand {
        token: tok.to_string(),
        expected: "a register `r0` through `r15`".to_string(),
    })
}

fn byte(tok: &str) -> Result<u8, RunErrorKind> {
    match lexer::parse_literal(tok) {
        Some(val) if val < 0x100 => Ok(val as u8),
        _ => Err(RunErrorKind::BadOperand {
            token: tok.to_string(),
            expected: "a byte literal below 0x100".to_string(),
        }),
    }
}

fn shift_amount(tok: &str) -> Result<u8, RunErrorKind> {
    match lexer::parse_literal(tok) {
        Some(val @ 1..=7) => Ok(val as u8),
        _ => Err(RunErrorKind::BadOperand {
            token: tok.to_string(),
            expected: "a shift amount from 1 to 7".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parser::AsmParser;

    fn run_src(src: &str) -> Snapshot {
        RunState::from_source(src).unwrap().run().unwrap()
    }

    #[test]
    fn reference_program() {
        let snap = run_src("ldi 0x05 r0\nldi 0x03 r1\nadd r0 r1 r2\nst r2 0x00\nhalt");
        assert_eq!(snap.registers[2], 8);
        assert_eq!(snap.memory, vec![(0x00, 8)]);
        assert_eq!(snap.instruction_count, 5);
        assert_eq!(snap.termination, Termination::Halted);
    }

    #[test]
    fn if_skips_on_zero() {
        let snap = run_src("ldi 0x00 r0\nif r0\nldi 0x07 r1\nldi 0x09 r2\nhalt");
        assert_eq!(snap.registers[1], 0);
        assert_eq!(snap.registers[2], 9);
        // Skipped instructions still count
        assert_eq!(snap.instruction_count, 5);
    }

    #[test]
    fn if_falls_through_on_nonzero() {
        let snap = run_src("ldi 0x01 r0\nif r0\nldi 0x07 r1\nhalt");
        assert_eq!(snap.registers[1], 7);
    }

    #[test]
    fn skip_suppresses_a_following_conditional() {
        // The skipped skipif must not arm the flag itself
        let snap = run_src("ldi 0x01 r1\nif r0\nskipif r1\nldi 0x07 r2\nhalt");
        assert_eq!(snap.registers[2], 7);
        assert_eq!(snap.termination, Termination::Halted);
    }

    #[test]
    fn skipif_skips_on_nonzero() {
        let snap = run_src("ldi 0x01 r0\nskipif r0\nldi 0x07 r1\nhalt");
        assert_eq!(snap.registers[1], 0);
    }

    #[test]
    fn countdown_loop_with_labels() {
        let snap = run_src(
            "ldi 0x03 r0\n\
             ldi 0x01 r1\n\
             loop: skipif r0\n\
             jmp done\n\
             sub r0 r1 r0\n\
             jmp loop\n\
             done: halt",
        );
        assert_eq!(snap.registers[0], 0);
        assert_eq!(snap.termination, Termination::Halted);
    }

    #[test]
    fn end_of_program_without_halt() {
        let snap = run_src("ldi 0x01 r0\nldi 0x02 r1");
        assert_eq!(snap.termination, Termination::EndOfProgram);
        assert_eq!(snap.instruction_count, 2);
    }

    #[test]
    fn step_ceiling_stops_infinite_loop() {
        let mut state = RunState::from_source("loop: jmp loop").unwrap();
        state.set_limit(10);
        let snap = state.run().unwrap();
        assert_eq!(snap.termination, Termination::CeilingReached);
        assert_eq!(snap.instruction_count, 10);
    }

    #[test]
    fn arithmetic_wraps_mod_256() {
        let snap = run_src(
            "ldi 200 r0\nldi 100 r1\nadd r0 r1 r2\n\
             ldi 3 r3\nldi 5 r4\nsub r3 r4 r5\n\
             ldi 0 r6\nneg r6 r7\nldi 1 r8\nneg r8 r9\nhalt",
        );
        assert_eq!(snap.registers[2], 44);
        assert_eq!(snap.registers[5], 254);
        assert_eq!(snap.registers[7], 0);
        assert_eq!(snap.registers[9], 255);
    }

    #[test]
    fn shifts_drop_escaping_bits() {
        let snap = run_src("ldi 0x81 r0\nshl r0 1 r1\nshr r0 1 r2\nhalt");
        assert_eq!(snap.registers[1], 0x02);
        assert_eq!(snap.registers[2], 0x40);
    }

    #[test]
    fn bitwise_and_comparisons() {
        let snap = run_src(
            "ldi 0x0f r0\nldi 0x35 r1\n\
             and r0 r1 r2\nor r0 r1 r3\nnot r0 r4\n\
             eq r0 r1 r5\neq r0 r0 r6\ngt r1 r0 r7\ngt r0 r1 r8\nhalt",
        );
        assert_eq!(snap.registers[2], 0x05);
        assert_eq!(snap.registers[3], 0x3f);
        assert_eq!(snap.registers[4], 0xf0);
        assert_eq!(snap.registers[5], 0);
        assert_eq!(snap.registers[6], 1);
        assert_eq!(snap.registers[7], 1);
        assert_eq!(snap.registers[8], 0);
    }

    #[test]
    fn register_indirect_memory() {
        let snap = run_src(
            "ldi 0x20 r0\nldi 0x2a r1\nstr r1 r0\nldr r0 r2\nhalt",
        );
        assert_eq!(snap.registers[2], 0x2a);
        assert_eq!(snap.memory, vec![(0x20, 0x2a)]);
    }

    #[test]
    fn loads_do_not_materialize_memory() {
        let snap = run_src("ld 0x10 r0\nldr r0 r1\nhalt");
        assert_eq!(snap.registers[0], 0);
        assert!(snap.memory.is_empty());
    }

    #[test]
    fn loadpc_and_jmpr_round_trip() {
        // loadpc captures its own byte address; the add steers the jump
        // over the poison instruction at index 4
        let snap = run_src(
            "ldi 0x08 r3\n\
             loadpc r1 r2\n\
             add r2 r3 r2\n\
             jmpr r1 r2\n\
             ldi 0xff r0\n\
             halt",
        );
        assert_eq!(snap.registers[2], 10);
        assert_eq!(snap.registers[0], 0);
        assert_eq!(snap.termination, Termination::Halted);
    }

    #[test]
    fn macro_substitution_at_step_time() {
        let snap = run_src("def RESULT 0x1f\nldi 0x2a r0\nst r0 RESULT\nhalt");
        assert_eq!(snap.memory, vec![(0x1f, 0x2a)]);
    }

    #[test]
    fn initial_memory_image() {
        let mut state = RunState::from_source("ld 0x03 r0\nhalt").unwrap();
        let mut image = MemoryImage::default();
        image.insert(0x03, 0x77);
        state.set_memory(image);
        let snap = state.run().unwrap();
        assert_eq!(snap.registers[0], 0x77);
        assert_eq!(snap.memory, vec![(0x03, 0x77)]);
    }

    #[test]
    fn unknown_mnemonic_faults() {
        let err = RunState::from_source("frobnicate r0")
            .unwrap()
            .run()
            .unwrap_err();
        assert_eq!(err.pc, 0);
        assert_eq!(err.snapshot.termination, Termination::Faulted);
        assert_eq!(err.snapshot.instruction_count, 1);
        assert!(matches!(err.kind, RunErrorKind::UnknownInstruction(_)));
    }

    #[test]
    fn bad_operand_faults() {
        let err = RunState::from_source("add r0 r1")
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(err.kind, RunErrorKind::BadOperand { .. }));
        let err = RunState::from_source("jmp nowhere")
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(err.kind, RunErrorKind::UnknownLabel(_)));
    }

    #[test]
    fn text_and_encoded_paths_agree() {
        let src = "ldi 0x05 r0\nldi 0x03 r1\nadd r0 r1 r2\nst r2 0x00\nhalt";
        let text_snap = run_src(src);

        let air = AsmParser::new(src).parse().unwrap();
        let air_snap = RunState::from_air(&air).run().unwrap();
        assert_eq!(air_snap, text_snap);

        let words: Vec<u16> = air
            .instructions()
            .iter()
            .map(|inst| inst.emit().unwrap())
            .collect();
        let word_snap = RunState::from_words(&words).unwrap().run().unwrap();
        assert_eq!(word_snap, text_snap);
    }

    #[test]
    fn vmem_round_trip_matches_source() {
        let src = "ldi 0x05 r0\nldi 0x03 r1\nadd r0 r1 r2\nst r2 0x00\nhalt";
        let air = AsmParser::new(src).parse().unwrap();
        let vmem = crate::output::render_vmem(&air).unwrap();
        let words = crate::output::parse_vmem(&vmem).unwrap();
        let snap = RunState::from_words(&words).unwrap().run().unwrap();
        assert_eq!(snap, run_src(src));
    }

    #[test]
    fn loader_rejects_malformed_source() {
        assert!(RunState::from_source("def onlyname").is_err());
        assert!(RunState::from_source("2bad: halt").is_err());
        assert!(RunState::from_source("a: halt\na: halt").is_err());
    }
}
