//! Internal-invariant failures.

/// Which invariant broke.
///
/// None of these can be produced by well-formed input; they indicate a
/// compiler bug and abort the method (and, in debug builds, the process via
/// the assertions at the check sites).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[allow(missing_docs)]
pub enum BugKind {
    UnreachableOpcode,
    DominatorIntersection,
    SsaDoubleDef,
    PhiOperandMismatch,
    AssemblerRetriesExhausted,
    MalformedGraph,
    CatchEntryUnmapped,
}

/// A broken compiler invariant, carried up to the driver.
#[derive(Debug, Clone, thiserror::Error)]
#[error("compiler bug ({kind}): {message}")]
pub struct Bug {
    /// Classification of the failure.
    pub kind: BugKind,
    /// Human-readable diagnostic.
    pub message: String,
}

impl Bug {
    /// Build a bug record.
    pub fn new(kind: BugKind, message: impl Into<String>) -> Self {
        Bug {
            kind,
            message: message.into(),
        }
    }
}
