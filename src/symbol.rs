use std::{fmt, ops::Range, str::FromStr};

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use miette::SourceSpan;

/// Insertion-ordered map used for the label and macro tables.
///
/// Insertion order matters for macros: substitution applies them in
/// definition order.
pub type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Label -> instruction index.
pub type LabelTable = FxMap<String, u16>;
/// Macro name -> raw replacement text.
pub type MacroTable = FxMap<String, String>;

/// Location within source
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Span {
    offs: SrcOffset,
    len: usize,
}

impl Span {
    pub fn new(offs: SrcOffset, len: usize) -> Self {
        Span { offs, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn offs(&self) -> usize {
        self.offs.0
    }

    pub fn end(&self) -> usize {
        self.offs.0 + self.len
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

impl From<Span> for Range<usize> {
    fn from(value: Span) -> Self {
        value.offs()..value.end()
    }
}

/// Used to refer to offsets from the start of a source file.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct SrcOffset(pub usize);

/// One of the 16 registers of the register file.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Register(u8);

impl Register {
    pub fn new(val: u8) -> Option<Register> {
        (val < 16).then_some(Register(val))
    }

    /// Low nibble of an instruction word field.
    pub fn from_nibble(nibble: u16) -> Register {
        Register((nibble & 0xF) as u8)
    }

    pub fn idx(self) -> usize {
        self.0 as usize
    }

    pub fn bits(self) -> u16 {
        self.0 as u16
    }
}

impl FromStr for Register {
    type Err = ();

    /// Register operands look like `r0` through `r15`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let num = s.strip_prefix(['r', 'R']).ok_or(())?;
        let val: u8 = num.parse().map_err(|_| ())?;
        Register::new(val).ok_or(())
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}
