//! BCL: the BC Control Language used to describe BCR2000 presets.
//!
//! The document is processed line by line. Each non-blank line starts with
//! either a `$block` or a `.statement` keyword, optionally followed by operands
//! and a `;` comment.

mod command;
pub use command::{
    Block, Command, CommandKind, Context, EasyPar, MidiMode, Mode, ParMode, Startup, Statement,
    TxItem,
};

mod diagnostic;
pub use diagnostic::{Diagnostic, DiagnosticKind};

mod parser;
pub use parser::{lines, parse, Parsed, Parser};

pub mod token;
