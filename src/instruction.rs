//! This module contains the in-memory form of a decoded instruction stream.
//!
//! Decoding from the host's byte-level encoding happens outside the library;
//! what arrives here is a sequence of decoded instructions. The stream
//! assigns each instruction an identity when it is built, and jump targets
//! refer to those identities rather than to positions, because the code
//! rewriter replaces instruction sequences wholesale and positions do not
//! survive that.

use std::fmt::{Display, Formatter};

use derivative::Derivative;

use crate::{
    error::stream::Error,
    host::ConstValue,
    opcode::Opcode,
};

/// The identity of one instruction within its stream.
///
/// Identities are minted when the stream is built and never reused, so they
/// remain stable while positions shift under rewriting.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct InstructionId(u64);

impl Display for InstructionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The decoded operand of an instruction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Operand {
    /// The opcode takes no operand.
    None,

    /// A binding or attribute name.
    Name(String),

    /// An item count, argument count or flag word.
    Count(usize),

    /// An inline constant.
    Const(ConstValue),
}

/// A single decoded instruction.
///
/// Equality ignores the identity, so a synthesized instruction compares equal
/// to an original of the same shape.
#[derive(Clone, Debug, Derivative)]
#[derivative(Eq, PartialEq)]
pub struct Instruction {
    /// The instruction's identity within its stream.
    #[derivative(PartialEq = "ignore")]
    pub id: InstructionId,

    /// The operation to perform.
    pub opcode: Opcode,

    /// The decoded operand.
    pub operand: Operand,

    /// The identity of the instruction to transfer control to, for opcodes
    /// that jump.
    pub target: Option<InstructionId>,
}

impl Instruction {
    /// Renders the operand, or [`None`] when there is nothing to show.
    fn operand_text(&self) -> Option<String> {
        match &self.operand {
            Operand::None => None,
            Operand::Name(name) => Some(name.clone()),
            Operand::Count(count) => Some(count.to_string()),
            Operand::Const(value) => Some(value.to_string()),
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.opcode)?;
        if let Some(operand) = self.operand_text() {
            write!(f, " {operand}")?;
        }
        if let Some(target) = self.target {
            write!(f, " -> {target}")?;
        }

        Ok(())
    }
}

/// A validated sequence of instructions.
///
/// Streams are constructed through [`InstructionStream::build`], which checks
/// that the sequence is non-empty, that jump targets name instructions that
/// exist, and that only jumping opcodes carry targets.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstructionStream {
    instructions: Vec<Instruction>,
    next_id:      u64,
}

impl InstructionStream {
    /// Starts building a new instruction stream.
    #[must_use]
    pub fn build() -> StreamBuilder {
        StreamBuilder::new()
    }

    /// Gets the instruction at position `index`, if one exists.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    /// Gets the position of the instruction with identity `id`, if it is in
    /// the stream.
    #[must_use]
    pub fn position_of(&self, id: InstructionId) -> Option<usize> {
        self.instructions.iter().position(|i| i.id == id)
    }

    /// Gets the number of instructions in the stream.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Checks whether the stream contains no instructions.
    ///
    /// A validated stream is never empty; this exists for completeness.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Gets the instructions in stream order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Replaces the entire stream with the straight-line sequence described
    /// by `replacement`, minting fresh identities for the new instructions.
    pub fn replace_with(&mut self, replacement: Vec<(Opcode, Operand)>) {
        self.instructions = replacement
            .into_iter()
            .map(|(opcode, operand)| {
                let id = InstructionId(self.next_id);
                self.next_id += 1;
                Instruction {
                    id,
                    opcode,
                    operand,
                    target: None,
                }
            })
            .collect();
    }
}

/// Renders the stream as a listing with one position-numbered instruction per
/// line, resolving jump targets back to positions.
impl Display for InstructionStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (index, instruction) in self.instructions.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{index:>4}: {}", instruction.opcode)?;
            if let Some(operand) = instruction.operand_text() {
                write!(f, " {operand}")?;
            }
            if let Some(target) = instruction.target {
                match self.position_of(target) {
                    Some(position) => write!(f, " -> {position}")?,
                    None => write!(f, " -> ?")?,
                }
            }
        }

        Ok(())
    }
}

/// An instruction recorded by the builder, with its jump target still
/// expressed as a position in the build sequence.
#[derive(Clone, Debug)]
struct PendingInstruction {
    opcode:  Opcode,
    operand: Operand,
    target:  Option<usize>,
}

/// A builder assembling an [`InstructionStream`] one instruction at a time.
///
/// Jump targets are given as positions in the build sequence and are resolved
/// to identities when the stream is finished.
#[derive(Clone, Debug, Default)]
pub struct StreamBuilder {
    pending: Vec<PendingInstruction>,
}

impl StreamBuilder {
    /// Creates a new, empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an instruction with no operand.
    #[must_use]
    pub fn op(mut self, opcode: Opcode) -> Self {
        self.pending.push(PendingInstruction {
            opcode,
            operand: Operand::None,
            target: None,
        });
        self
    }

    /// Appends an instruction carrying the name `name`.
    #[must_use]
    pub fn named(mut self, opcode: Opcode, name: impl Into<String>) -> Self {
        self.pending.push(PendingInstruction {
            opcode,
            operand: Operand::Name(name.into()),
            target: None,
        });
        self
    }

    /// Appends an instruction carrying the count `count`.
    #[must_use]
    pub fn counted(mut self, opcode: Opcode, count: usize) -> Self {
        self.pending.push(PendingInstruction {
            opcode,
            operand: Operand::Count(count),
            target: None,
        });
        self
    }

    /// Appends an instruction carrying the constant `value`.
    #[must_use]
    pub fn constant(mut self, opcode: Opcode, value: ConstValue) -> Self {
        self.pending.push(PendingInstruction {
            opcode,
            operand: Operand::Const(value),
            target: None,
        });
        self
    }

    /// Appends a jumping instruction whose target is the instruction at
    /// position `target` in the build sequence.
    #[must_use]
    pub fn jump(mut self, opcode: Opcode, target: usize) -> Self {
        self.pending.push(PendingInstruction {
            opcode,
            operand: Operand::None,
            target: Some(target),
        });
        self
    }

    /// Finishes the stream, validating it and minting identities.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyStream`] for an empty build sequence,
    /// [`Error::NonExistentJumpTarget`] when a jump names a position outside
    /// the sequence, and [`Error::UnexpectedJumpTarget`] when a non-jumping
    /// opcode carries a target.
    pub fn finish(self) -> Result<InstructionStream, Error> {
        if self.pending.is_empty() {
            return Err(Error::EmptyStream);
        }
        let len = self.pending.len();
        for (index, pending) in self.pending.iter().enumerate() {
            if let Some(target) = pending.target {
                if !pending.opcode.takes_target() {
                    return Err(Error::UnexpectedJumpTarget { at: index });
                }
                if target >= len {
                    return Err(Error::NonExistentJumpTarget {
                        from:   index,
                        target: target as u64,
                    });
                }
            }
        }

        let instructions = self
            .pending
            .into_iter()
            .enumerate()
            .map(|(index, pending)| Instruction {
                id:      InstructionId(index as u64),
                opcode:  pending.opcode,
                operand: pending.operand,
                target:  pending.target.map(|t| InstructionId(t as u64)),
            })
            .collect();

        Ok(InstructionStream {
            instructions,
            next_id: len as u64,
        })
    }
}

#[cfg(test)]
mod test {
    use crate::{
        error::stream::Error,
        host::ConstValue,
        instruction::{InstructionStream, Operand},
        opcode::Opcode,
    };

    #[test]
    fn refuses_an_empty_stream() {
        let result = InstructionStream::build().finish();
        assert_eq!(result.unwrap_err(), Error::EmptyStream);
    }

    #[test]
    fn refuses_a_jump_past_the_end() {
        let result = InstructionStream::build()
            .named(Opcode::LoadLocal, "x")
            .jump(Opcode::JumpIfFalse, 9)
            .op(Opcode::Return)
            .finish();

        assert_eq!(
            result.unwrap_err(),
            Error::NonExistentJumpTarget { from: 1, target: 9 }
        );
    }

    #[test]
    fn refuses_a_target_on_a_non_jumping_opcode() {
        let result = InstructionStream::build()
            .jump(Opcode::LoadConst, 0)
            .finish();

        assert_eq!(result.unwrap_err(), Error::UnexpectedJumpTarget { at: 0 });
    }

    #[test]
    fn looks_instructions_up_by_identity() -> anyhow::Result<()> {
        let stream = InstructionStream::build()
            .named(Opcode::LoadLocal, "x")
            .named(Opcode::LoadLocal, "y")
            .op(Opcode::Return)
            .finish()?;

        let second = stream.get(1).unwrap().id;
        assert_eq!(stream.position_of(second), Some(1));

        Ok(())
    }

    #[test]
    fn synthesized_instructions_compare_equal_by_shape() -> anyhow::Result<()> {
        let mut rewritten = InstructionStream::build()
            .named(Opcode::LoadLocal, "scratch")
            .op(Opcode::Return)
            .finish()?;
        rewritten.replace_with(vec![
            (Opcode::LoadGlobal, Operand::Name("f".into())),
            (Opcode::CallFunction, Operand::Count(0)),
            (Opcode::Return, Operand::None),
        ]);

        let expected = InstructionStream::build()
            .named(Opcode::LoadGlobal, "f")
            .counted(Opcode::CallFunction, 0)
            .op(Opcode::Return)
            .finish()?;

        assert_eq!(rewritten.instructions(), expected.instructions());

        Ok(())
    }

    #[test]
    fn renders_a_listing_with_resolved_targets() -> anyhow::Result<()> {
        let stream = InstructionStream::build()
            .named(Opcode::LoadLocal, "flag")
            .jump(Opcode::JumpIfFalse, 3)
            .constant(Opcode::LoadConst, ConstValue::Int(1))
            .op(Opcode::Return)
            .finish()?;

        let listing = stream.to_string();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines[0], "   0: LOAD_LOCAL flag");
        assert_eq!(lines[1], "   1: JUMP_IF_FALSE -> 3");
        assert_eq!(lines[2], "   2: LOAD_CONST 1");
        assert_eq!(lines[3], "   3: RETURN_VALUE");

        Ok(())
    }
}
