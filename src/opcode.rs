//! This module contains the instruction set that the tracer understands.
//!
//! The set is closed: every opcode that can appear in a decoded frame is a
//! variant of [`Opcode`], and the tracer dispatches over it with a single
//! total `match`. Opcodes that the tracer recognises but never captures
//! (iteration, cell variables, attribute stores and the like) are still
//! variants, so that encountering one falls through to an explicit
//! "cannot trace" arm rather than being invisible to the type system.
//!
//! Operator selection is part of the opcode itself, as it is in the host's
//! instruction encoding: `BINARY_ADD` and `BINARY_MUL` are distinct
//! instructions, represented here as [`Opcode::Binary`] carrying a
//! [`BinaryOp`].

use std::fmt::{Display, Formatter};

/// The opcodes of the host's stack-machine instruction set.
///
/// The names that appear in listings and abort messages are the conventional
/// upper-case mnemonics, available via [`Opcode::mnemonic`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Opcode {
    /// Does nothing.
    Nop,

    /// Discards the value on top of the operand stack.
    PopTop,

    /// Swaps the two topmost operand stack values.
    RotTwo,

    /// Lifts the second and third stack values one position up and moves the
    /// top value to position three.
    RotThree,

    /// Lifts values two to four one position up and moves the top value to
    /// position four.
    RotFour,

    /// Duplicates the value on top of the operand stack.
    DupTop,

    /// Duplicates the two topmost operand stack values, preserving order.
    DupTopTwo,

    /// Pushes the local binding named by the operand.
    LoadLocal,

    /// Pops the top of the stack into the local binding named by the operand.
    StoreLocal,

    /// Pushes the constant carried by the operand.
    LoadConst,

    /// Pushes the global (or builtin) binding named by the operand.
    LoadGlobal,

    /// Replaces the top of the stack with its attribute named by the operand.
    LoadAttr,

    /// Pops two operands and pushes the result of the selected binary
    /// operator.
    Binary(BinaryOp),

    /// Replaces the top of the stack with the result of the selected unary
    /// operator.
    Unary(UnaryOp),

    /// Pops two operands and pushes the result of the selected comparison.
    Compare(CompareOp),

    /// Calls the callable below `n` positional arguments, where `n` is the
    /// count operand.
    CallFunction,

    /// As [`Self::CallFunction`], but the top of the stack carries a constant
    /// tuple naming the trailing keyword arguments.
    CallFunctionKw,

    /// Calls a callable with an unpacked argument sequence, and additionally
    /// an unpacked keyword mapping when the count operand has its lowest bit
    /// set.
    CallFunctionEx,

    /// Pops `n` values and pushes a tuple of them.
    BuildTuple,

    /// Pops `n` values and pushes a list of them.
    BuildList,

    /// Pops `n` values and pushes a slice of them.
    BuildSlice,

    /// Pops `n` key-value pairs and pushes a mapping of them.
    BuildMap,

    /// Pops a constant key tuple and `n` values and pushes a mapping of them.
    BuildConstKeyMap,

    /// Pops a sequence and pushes its `n` items rightmost-first.
    UnpackSequence,

    /// Pops the top of stack and jumps to the target when it is falsy.
    JumpIfFalse,

    /// Returns the top of the stack to the caller, ending the frame.
    Return,

    /// Pops the top of stack and jumps to the target when it is truthy. Never
    /// traced.
    JumpIfTrue,

    /// Unconditionally moves execution to the target. Never traced.
    JumpAbsolute,

    /// Replaces the top of the stack with an iterator over it. Never traced.
    GetIter,

    /// Advances the iterator below the top of the stack. Never traced.
    ForIter,

    /// Stores into an attribute of the top of the stack. Never traced.
    StoreAttr,

    /// Pushes the cell or free binding named by the operand. Never traced.
    LoadDeref,

    /// Pops into the cell or free binding named by the operand. Never traced.
    StoreDeref,

    /// Builds a function object from parts on the stack. Never traced.
    MakeFunction,
}

impl Opcode {
    /// Gets the conventional upper-case mnemonic for this opcode, as it
    /// appears in listings and abort messages.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::PopTop => "POP_TOP",
            Self::RotTwo => "ROT_TWO",
            Self::RotThree => "ROT_THREE",
            Self::RotFour => "ROT_FOUR",
            Self::DupTop => "DUP_TOP",
            Self::DupTopTwo => "DUP_TOP_TWO",
            Self::LoadLocal => "LOAD_LOCAL",
            Self::StoreLocal => "STORE_LOCAL",
            Self::LoadConst => "LOAD_CONST",
            Self::LoadGlobal => "LOAD_GLOBAL",
            Self::LoadAttr => "LOAD_ATTR",
            Self::Binary(op) => op.mnemonic(),
            Self::Unary(op) => op.mnemonic(),
            Self::Compare(op) => op.mnemonic(),
            Self::CallFunction => "CALL_FUNCTION",
            Self::CallFunctionKw => "CALL_FUNCTION_KW",
            Self::CallFunctionEx => "CALL_FUNCTION_EX",
            Self::BuildTuple => "BUILD_TUPLE",
            Self::BuildList => "BUILD_LIST",
            Self::BuildSlice => "BUILD_SLICE",
            Self::BuildMap => "BUILD_MAP",
            Self::BuildConstKeyMap => "BUILD_CONST_KEY_MAP",
            Self::UnpackSequence => "UNPACK_SEQUENCE",
            Self::JumpIfFalse => "JUMP_IF_FALSE",
            Self::Return => "RETURN_VALUE",
            Self::JumpIfTrue => "JUMP_IF_TRUE",
            Self::JumpAbsolute => "JUMP_ABSOLUTE",
            Self::GetIter => "GET_ITER",
            Self::ForIter => "FOR_ITER",
            Self::StoreAttr => "STORE_ATTR",
            Self::LoadDeref => "LOAD_DEREF",
            Self::StoreDeref => "STORE_DEREF",
            Self::MakeFunction => "MAKE_FUNCTION",
        }
    }

    /// Checks whether this opcode transfers control, and hence whether an
    /// instruction carrying it may name a jump target.
    #[must_use]
    pub fn takes_target(&self) -> bool {
        matches!(
            self,
            Self::JumpIfFalse | Self::JumpIfTrue | Self::JumpAbsolute | Self::ForIter
        )
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// The binary operators of the instruction set.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    MatMul,
    TrueDiv,
    FloorDiv,
    Mod,
    Pow,
    Subscript,
    LShift,
    RShift,
    BitAnd,
    BitXor,
    BitOr,
}

impl BinaryOp {
    /// Gets the mnemonic of the instruction selecting this operator.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Add => "BINARY_ADD",
            Self::Sub => "BINARY_SUBTRACT",
            Self::Mul => "BINARY_MULTIPLY",
            Self::MatMul => "BINARY_MATRIX_MULTIPLY",
            Self::TrueDiv => "BINARY_TRUE_DIVIDE",
            Self::FloorDiv => "BINARY_FLOOR_DIVIDE",
            Self::Mod => "BINARY_MODULO",
            Self::Pow => "BINARY_POWER",
            Self::Subscript => "BINARY_SUBSCR",
            Self::LShift => "BINARY_LSHIFT",
            Self::RShift => "BINARY_RSHIFT",
            Self::BitAnd => "BINARY_AND",
            Self::BitXor => "BINARY_XOR",
            Self::BitOr => "BINARY_OR",
        }
    }

    /// Gets the lower-case operator name used when rendering graph nodes.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::MatMul => "matmul",
            Self::TrueDiv => "truediv",
            Self::FloorDiv => "floordiv",
            Self::Mod => "mod",
            Self::Pow => "pow",
            Self::Subscript => "getitem",
            Self::LShift => "lshift",
            Self::RShift => "rshift",
            Self::BitAnd => "and",
            Self::BitXor => "xor",
            Self::BitOr => "or",
        }
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The unary operators of the instruction set.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum UnaryOp {
    Pos,
    Neg,
    Not,
    Invert,
}

impl UnaryOp {
    /// Gets the mnemonic of the instruction selecting this operator.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Pos => "UNARY_POSITIVE",
            Self::Neg => "UNARY_NEGATIVE",
            Self::Not => "UNARY_NOT",
            Self::Invert => "UNARY_INVERT",
        }
    }

    /// Gets the lower-case operator name used when rendering graph nodes.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pos => "pos",
            Self::Neg => "neg",
            Self::Not => "not",
            Self::Invert => "invert",
        }
    }
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The comparison operators of the instruction set.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Gets the mnemonic of the instruction selecting this comparison.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Eq => "COMPARE_EQ",
            Self::Ne => "COMPARE_NE",
            Self::Lt => "COMPARE_LT",
            Self::Le => "COMPARE_LE",
            Self::Gt => "COMPARE_GT",
            Self::Ge => "COMPARE_GE",
        }
    }

    /// Gets the lower-case operator name used when rendering graph nodes.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
        }
    }
}

impl Display for CompareOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
