//! This module contains errors pertaining to the symbolic execution of a
//! frame's instruction stream.

use thiserror::Error;

use crate::error::container;

/// Errors that occur during symbolic execution of a frame by the
/// [`crate::tracer::Tracer`].
///
/// The variants fall into two classes. The _deliberate aborts_ say that the
/// frame contains something the tracer does not capture; they are an expected
/// outcome and the frame simply runs unmodified. Every other variant is an
/// internal invariant violation, indicating disagreement between the frame,
/// the host object model and the tracer itself.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("Cannot trace: {what}")]
    Unsupported { what: String },

    #[error("Trace exceeded the step limit of {limit:?} instructions")]
    StepLimitExceeded { limit: usize },

    #[error("Captured graph exceeded the node limit of {limit:?}")]
    GraphNodeLimitExceeded { limit: usize },

    #[error(
        "Instruction pointer {requested:?} is out of bounds in a stream of length {available:?}"
    )]
    InstructionPointerOutOfBounds { requested: usize, available: usize },

    #[error("Operand stack capacity of {limit:?} exceeded by a push to depth {requested:?}")]
    StackDepthExceeded { requested: usize, limit: usize },

    #[error("{requested:?} operands were requested but only {available:?} are on the stack")]
    NotEnoughOperands { requested: usize, available: usize },

    #[error("The local binding {name:?} was read before being written")]
    UnboundLocal { name: String },

    #[error("The name {name:?} is bound in neither the global nor the builtin table")]
    UnknownName { name: String },

    #[error("The {opcode} instruction expected a {expected} operand")]
    MalformedOperand { opcode: String, expected: &'static str },

    #[error("The {opcode} instruction has no resolvable jump target")]
    MissingJumpTarget { opcode: String },

    #[error("The component path {path:?} does not resolve in the registry")]
    UnknownComponentPath { path: String },

    #[error("The callable {name:?} has no member {member:?}")]
    UnknownCallableMember { name: String, member: String },

    #[error("Mapping keys must be constants but a value of kind {found} was found")]
    MappingKeyNotConstant { found: String },

    #[error("Keyword names must be a constant tuple of strings but {found} was found")]
    MalformedKeywordNames { found: String },

    #[error("The keyword argument {name:?} was supplied more than once")]
    DuplicateKeyword { name: String },

    #[error("The mapping key {key} was supplied more than once")]
    DuplicateMappingKey { key: String },

    #[error("A mapping build found {keys:?} keys for {values:?} values")]
    MappingArityMismatch { keys: usize, values: usize },

    #[error("Unpacking expected {expected:?} items but the sequence has {actual:?}")]
    UnpackArityMismatch { expected: usize, actual: usize },

    #[error("Call argument unpacking expected a {expected} but found a value of kind {found}")]
    MalformedCallUnpack {
        expected: &'static str,
        found:    String,
    },

    #[error("The graph already has an output node")]
    DuplicateOutput,

    #[error("Graph compilation failed: {reason}")]
    Compilation { reason: String },
}

impl Error {
    /// Constructs the deliberate-abort error for the untraceable construct
    /// described by `what`.
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported { what: what.into() }
    }

    /// Checks whether this error is a deliberate abort rather than an
    /// invariant violation.
    ///
    /// Deliberate aborts are the tracer declining to capture a frame; they are
    /// logged quietly and counted, while invariant violations are loud.
    #[must_use]
    pub fn is_deliberate_abort(&self) -> bool {
        matches!(
            self,
            Self::Unsupported { .. }
                | Self::StepLimitExceeded { .. }
                | Self::GraphNodeLimitExceeded { .. }
        )
    }

    /// Gets the statistics tag under which this abort is counted, or [`None`]
    /// if the error is an invariant violation.
    #[must_use]
    pub fn abort_tag(&self) -> Option<String> {
        match self {
            Self::Unsupported { what } => Some(what.clone()),
            Self::StepLimitExceeded { .. } => Some("step limit".into()),
            Self::GraphNodeLimitExceeded { .. } => Some("graph size limit".into()),
            _ => None,
        }
    }
}

/// A trace error with an associated position in the instruction stream.
pub type LocatedError = container::Located<Error>;

/// The result type for methods that may have trace errors.
pub type Result<T> = std::result::Result<T, LocatedError>;

/// Make it possible to attach locations to these errors.
impl container::Locatable for Error {
    type Located = LocatedError;

    fn locate(self, instruction_index: usize) -> Self::Located {
        container::Located {
            location: instruction_index,
            payload:  self,
        }
    }
}
