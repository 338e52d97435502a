//! This module contains the implementation of the tracer's operand stack.

use crate::{error::trace::Error, value::SymbolicValue};

/// The operand stack of the frame being traced.
///
/// # Indexing
///
/// Indexing into this stack is zero-based, where depth 0 is the top of the
/// stack.
///
/// # Depth
///
/// The host's bytecode compiler records the maximum operand depth a frame can
/// reach, so the stack enforces that bound. Going past it means the
/// instruction stream and the recorded metadata disagree, which is not
/// something the tracer can recover from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperandStack {
    data:  Vec<SymbolicValue>,
    limit: usize,
}

impl OperandStack {
    /// Creates a new operand stack that can hold at most `limit` values.
    pub fn new(limit: usize) -> Self {
        let data = Vec::with_capacity(limit);
        Self { data, limit }
    }

    /// Pushes the provided `value` onto the top of the stack.
    ///
    /// # Errors
    ///
    /// If the stack cannot grow to accommodate the requested `value`.
    pub fn push(&mut self, value: SymbolicValue) -> Result<(), Error> {
        if self.data.len() + 1 > self.limit {
            return Err(Error::StackDepthExceeded {
                requested: self.data.len() + 1,
                limit:     self.limit,
            });
        }
        self.data.push(value);
        Ok(())
    }

    /// Pops the top value from the stack.
    ///
    /// # Errors
    ///
    /// If the stack has no value to pop.
    pub fn pop(&mut self) -> Result<SymbolicValue, Error> {
        self.data.pop().ok_or(Error::NotEnoughOperands {
            requested: 1,
            available: 0,
        })
    }

    /// Pops the top `count` values from the stack, returning them in stack
    /// order with the deepest value first.
    ///
    /// # Errors
    ///
    /// If the stack holds fewer than `count` values.
    pub fn popn(&mut self, count: usize) -> Result<Vec<SymbolicValue>, Error> {
        if self.data.len() < count {
            return Err(Error::NotEnoughOperands {
                requested: count,
                available: self.data.len(),
            });
        }
        Ok(self.data.split_off(self.data.len() - count))
    }

    /// Reads the value at the provided `depth` without removing it.
    ///
    /// # Errors
    ///
    /// If `depth` does not exist in the stack.
    pub fn peek(&self, depth: usize) -> Result<&SymbolicValue, Error> {
        let size = self.data.len();
        if depth >= size {
            return Err(Error::NotEnoughOperands {
                requested: depth + 1,
                available: size,
            });
        }
        Ok(&self.data[size - 1 - depth])
    }

    /// Moves the top of the stack down `count - 1` slots, lifting the values
    /// it passes by one position each.
    ///
    /// This is the general case of the stack rotation opcodes, where
    /// `ROT_TWO` is `rotate(2)` and so on.
    ///
    /// # Errors
    ///
    /// If the stack holds fewer than `count` values.
    pub fn rotate(&mut self, count: usize) -> Result<(), Error> {
        if self.data.len() < count {
            return Err(Error::NotEnoughOperands {
                requested: count,
                available: self.data.len(),
            });
        }

        // The subtraction is safe as the bound was checked above and popping
        // cannot fail with at least `count >= 1` values present.
        if let Some(top) = self.data.pop() {
            let index = self.data.len() + 1 - count;
            self.data.insert(index, top);
        }

        Ok(())
    }

    /// Gets the current number of values on the stack.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Checks if the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}
