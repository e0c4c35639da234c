use std::borrow::Cow;

use crate::symbol::{MacroTable, Span, SrcOffset};

/// A source line with its comment suffix removed and surrounding whitespace
/// trimmed, keeping enough position info for diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct Line<'a> {
    /// 1-based line number
    pub num: usize,
    /// Cleaned text; empty for blank and comment-only lines
    pub text: &'a str,
    /// Span of the cleaned text within the whole source
    pub span: Span,
}

impl<'a> Line<'a> {
    pub fn is_blank(&self) -> bool {
        self.text.is_empty()
    }

    /// Span of a token borrowed from this line's text. Tokens that no longer
    /// point into the source (after macro substitution) fall back to the
    /// line span.
    pub fn span_of(&self, tok: &str) -> Span {
        let base = self.text.as_ptr() as usize;
        let pt = tok.as_ptr() as usize;
        if pt >= base && pt + tok.len() <= base + self.text.len() {
            Span::new(SrcOffset(self.span.offs() + (pt - base)), tok.len())
        } else {
            self.span
        }
    }
}

/// Split source into cleaned lines. Blank lines are kept so that line
/// numbers stay 1-based and contiguous. Both `#` and `//` start comments.
pub fn scan(src: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut offs = 0usize;
    for (idx, raw) in src.split('\n').enumerate() {
        let cut = match (raw.find('#'), raw.find("//")) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => raw.len(),
        };
        let text = raw[..cut].trim();
        // Offset of the trimmed slice inside the raw line
        let lead = text.as_ptr() as usize - raw.as_ptr() as usize;
        lines.push(Line {
            num: idx + 1,
            text,
            span: Span::new(SrcOffset(offs + lead), text.len()),
        });
        offs += raw.len() + 1;
    }
    lines
}

/// Test if a string is a valid label or macro identifier.
pub fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Line starts a macro definition (`def name value`).
pub fn is_macro_def(text: &str) -> bool {
    text.split_whitespace().next() == Some("def")
}

/// Split `def name value` into name and replacement text (rest of line).
/// Returns `None` when either part is missing.
pub fn split_macro_def(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix("def")?.trim_start();
    let name_end = rest.find(char::is_whitespace)?;
    let (name, value) = rest.split_at(name_end);
    let value = value.trim();
    (is_ident(name) && !value.is_empty()).then_some((name, value))
}

/// Split a leading `label:` prefix off a line. Returns the text before the
/// first colon (not validated) and the trimmed remainder.
pub fn split_label(text: &str) -> Option<(&str, &str)> {
    let colon = text.find(':')?;
    Some((&text[..colon], text[colon + 1..].trim_start()))
}

/// Split an operand string into tokens: comma-separated, falling back to
/// whitespace when no comma is present.
pub fn split_operands(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let ops: Vec<&str> = text.split(',').map(str::trim).collect();
    if ops.len() == 1 && ops[0].contains(char::is_whitespace) {
        return ops[0].split_whitespace().collect();
    }
    ops
}

/// Literal find/replace of every bound macro, in definition order.
/// No recursion, no token hygiene.
pub fn substitute<'t>(macros: &MacroTable, text: &'t str) -> Cow<'t, str> {
    let mut out = Cow::Borrowed(text);
    for (tag, value) in macros {
        if out.contains(tag.as_str()) {
            out = Cow::Owned(out.replace(tag.as_str(), value));
        }
    }
    out
}

/// Parse a numeric literal: decimal, or hex with a `0x`/`0X` prefix.
pub fn parse_literal(tok: &str) -> Option<u16> {
    if let Some(hex) = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).ok()
    } else {
        tok.parse().ok()
    }
}
