use std::fmt;

use super::Context;

/// A problem found on one source line while parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based line in the source document.
    pub line: usize,
    pub kind: DiagnosticKind,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DiagnosticKind {
    #[error("unknown keyword {}", .0)]
    UnknownKeyword(String),

    #[error("expected a $block or .statement keyword, found {}", .0)]
    UnexpectedToken(String),

    #[error("missing {}", .0)]
    MissingOperand(&'static str),

    #[error("malformed {operand}: {found}")]
    MalformedOperand { operand: &'static str, found: String },

    #[error("{operand} {value} out of range {min}..={max}")]
    OutOfRange {
        operand: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("unexpected operand {}", .0)]
    ExtraOperand(String),

    #[error("{keyword} not allowed {context}")]
    WrongContext { keyword: String, context: Context },

    #[error("unterminated string")]
    UnterminatedString,
}

impl DiagnosticKind {
    pub fn at(self, line: usize) -> Diagnostic {
        Diagnostic { line, kind: self }
    }
}
