//! This module contains errors pertaining to the construction and validation
//! of instruction streams.

use thiserror::Error;

use crate::error::container;

/// Errors that occur while assembling an
/// [`crate::instruction::InstructionStream`] from decoded instructions.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("Cannot construct an instruction stream containing no instructions")]
    EmptyStream,

    #[error("The jump at instruction {from:?} names non-existent target {target:?}")]
    NonExistentJumpTarget { from: usize, target: u64 },

    #[error("The opcode at instruction {at:?} does not take a jump target")]
    UnexpectedJumpTarget { at: usize },
}

/// A stream error with an associated position in the instruction sequence.
pub type LocatedError = container::Located<Error>;

/// The result type for methods that may have stream-construction errors.
pub type Result<T> = std::result::Result<T, Error>;

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
