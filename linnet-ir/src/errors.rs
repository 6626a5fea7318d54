//! Error kinds for the core pipeline (spec.md §7). Every variant is terminal for the
//! circuit it occurs in, but non-terminal for the overall run (§5, §7): the driver in
//! `linnet`'s CLI catches a [`CoreError`], logs it once, and moves to the next file.

use miden_diagnostics::{Diagnostic, ToDiagnostic};

use crate::rational::RationalError;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("node `{0}` is not reachable from any source: orphan component")]
    OrphanComponent(String),
    #[error("op-amps `{0}` and `{1}` share output node `{2}`")]
    DuplicateOpAmpOutput(String, String, String),
    #[error("op-amp `{0}` has terminals in three different connected components")]
    OpAmpSpansComponents(String),
    #[error("controlled source `{0}` has a sense pair straddling connected components")]
    ControlledSourceStraddlesComponents(String),
    #[error("user-defined voltage `{0}` straddles connected components")]
    UserVoltageStraddlesComponents(String),
    #[error("component has more than one candidate ground node: {0:?}")]
    AmbiguousGround(Vec<String>),
    #[error("component containing an op-amp has no explicit ground node")]
    MissingGroundWithOpAmp,
    #[error("ground node `{0}` coincides with an op-amp output")]
    GroundIsOpAmpOutput(String),
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SymbolError {
    #[error("name `{0}` is used by more than one known/unknown/device/reserved symbol")]
    NameClash(String),
    #[error("unknown name `{0}` passed to setTargetUnknownForSolver")]
    NotAnUnknown(String),
    #[error("device value relation chain exceeds the constant limit ({0})")]
    RelationChainTooLong(usize),
    #[error("device value relation chain overflowed during resolution")]
    RelationOverflow,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum BadReferenceError {
    #[error("result request `{0}` references undefined quantity `{1}`")]
    UndefinedQuantity(String, String),
    #[error("Bode request `{0}` names two dependents in a multi-input system")]
    BodeBetweenTwoDependents(String),
    #[error("Bode request `{0}` names two independents")]
    BodeBetweenTwoIndependents(String),
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SolveError {
    #[error("linearly dependent or contradictory equations at elimination step {0}")]
    Singular(usize),
    #[error("solver determinant mismatch between unknown #{0} and the first solved unknown")]
    DeterminantMismatch(usize),
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Symbol(#[from] SymbolError),
    #[error(transparent)]
    BadReference(#[from] BadReferenceError),
    #[error(transparent)]
    Solve(#[from] SolveError),
    #[error("rational arithmetic overflowed")]
    Overflow(#[from] RationalError),
    #[error("circuit uses {0} constants, exceeding the limit of {1}")]
    LimitExceeded(usize, usize),
}

impl ToDiagnostic for CoreError {
    fn to_diagnostic(self) -> Diagnostic {
        Diagnostic::error().with_message(self.to_string())
    }
}
