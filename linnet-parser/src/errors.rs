//! Parse-time error kinds: lexical, grammatical, and the syntax-level reference checks
//! this crate owns (duplicate device names, malformed statements). Anything about
//! whether the resulting circuit is electrically well-formed is `linnet_ir::CoreError`,
//! not this type — see the module doc comment on [`crate`].

use miden_diagnostics::{Diagnostic, ToDiagnostic};

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("line {0}: unexpected character `{1}`")]
    UnexpectedChar(usize, char),
    #[error("line {0}: malformed number literal `{1}`")]
    BadNumber(usize, String),
    #[error("line {0}: unexpected end of statement")]
    UnexpectedEof(usize),
    #[error("line {0}: expected {1}, found `{2}`")]
    Expected(usize, &'static str, String),
    #[error("line {0}: unknown statement keyword `{1}`")]
    UnknownStatement(usize, String),
    #[error("line {0}: duplicate device name `{1}`")]
    DuplicateDevice(usize, String),
    #[error(transparent)]
    Builder(#[from] linnet_ir::model::BuilderError),
}

impl ToDiagnostic for ParseError {
    fn to_diagnostic(self) -> Diagnostic {
        Diagnostic::error().with_message(self.to_string())
    }
}
