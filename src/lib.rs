// Assembling
mod parser;
pub use parser::AsmParser;
mod air;
pub use air::{Air, Instruction};
mod isa;
pub use isa::{Opcode, Shape};

// Running
mod runtime;
pub use runtime::{RunError, RunErrorKind, RunState, Snapshot, Termination};

// Harness file formats
pub mod export;
pub mod output;

mod error;
mod lexer;
mod symbol;
pub use symbol::Register;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;
