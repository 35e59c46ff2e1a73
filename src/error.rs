//! The error taxonomy shared by every component: user-facing input problems,
//! internal invariant violations, evaluation-time traps raised by DSL
//! semantics, and sample-budget exhaustion.

use std::fmt;

/// A single error type covering every failure mode described by the
/// component designs. Variants are deliberately coarse (a message string)
/// rather than one sub-struct per call site, matching how the teacher's own
/// ad hoc error types (`ParseOnTheFlyLimitError`, `BuildError`) carry just
/// enough structure for a CLI to print a diagnostic and choose an exit code.
#[derive(Debug, Clone)]
pub enum Error {
    /// Malformed DSL type string, unresolved polymorphic slot, unsupported
    /// file extension, or any other malformed input handed to the core by
    /// its caller. Non-recoverable; surfaces to the CLI with exit code 1.
    UserInput(String),
    /// A programmer-facing invariant was violated: an ambiguous state type,
    /// a type-check disagreement, minimisation called on an unreduced
    /// automaton, or loop closure called on an already-unbounded one.
    /// Exits with code 2.
    DomainInvariant(String),
    /// A DSL semantic raised during evaluation and its exception kind was
    /// not in the allow-list, so it propagated instead of being swallowed
    /// as `Value::Bottom`. Exits with code 3.
    SemanticTrap { kind: String },
    /// A type's sample pool could not produce the requested number of
    /// distinct values even after the retry budget, and has zero samples
    /// to fall back on.
    Capacity {
        type_name: String,
        requested: usize,
        available: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UserInput(msg) => write!(f, "invalid input: {}", msg),
            Error::DomainInvariant(msg) => write!(f, "internal invariant violated: {}", msg),
            Error::SemanticTrap { kind } => write!(f, "unhandled exception in DSL semantic: {}", kind),
            Error::Capacity {
                type_name,
                requested,
                available,
            } => write!(
                f,
                "type `{}` has no samples to satisfy a request for {} (available: {})",
                type_name, requested, available
            ),
        }
    }
}

impl std::error::Error for Error {}

/// Exit codes mirroring the taxonomy, used by the CLI (§6).
pub fn exit_code(err: &Error) -> i32 {
    match err {
        Error::UserInput(_) | Error::Capacity { .. } => 1,
        Error::DomainInvariant(_) => 2,
        Error::SemanticTrap { .. } => 3,
    }
}

pub type Result<T> = std::result::Result<T, Error>;
