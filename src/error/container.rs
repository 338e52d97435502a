use std::fmt::Formatter;

use thiserror::Error;

/// An error that is localised to a particular position in the instruction
/// stream being traced.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub struct Located<E>
where
    E: Clone,
{
    /// The index in the instruction stream at which the error occurred.
    pub location: usize,

    /// The error data
    pub payload: E,
}

/// Displays the error together with the instruction index at which it
/// occurred.
impl<E> std::fmt::Display for Located<E>
where
    E: std::fmt::Display + Clone,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[instruction {}]: {}", self.location, self.payload)
    }
}

/// A trait for types that can have an instruction-stream position attached to
/// them.
pub trait Locatable
where
    Self: Sized,
{
    /// The return type with the attached position.
    type Located;

    /// Attach the position described by `instruction_index` (an index into the
    /// instruction stream) to the error.
    fn locate(self, instruction_index: usize) -> Self::Located;
}

/// A blanket implementation that allows for attaching a location to any
/// result.
impl<T, E> Locatable for Result<T, E>
where
    E: std::error::Error + Clone,
{
    type Located = Result<T, Located<E>>;

    fn locate(self, instruction_index: usize) -> Self::Located {
        self.map_err(|e| Located {
            location: instruction_index,
            payload:  e,
        })
    }
}
