//! This module contains the shape of the input the library operates on: a
//! paused frame of the host interpreter.
//!
//! The host hands over its decoded instruction stream, the structural
//! metadata of the code object, and the three binding tables the frame can
//! read from. The code object is the part the rewriter mutates on a
//! successful capture; the binding tables are read during tracing, and the
//! global table additionally receives the compiled callable's binding.

use std::collections::BTreeMap;

use crate::{host::HostValue, instruction::InstructionStream};

/// A name-to-value binding table of the frame.
pub type BindingTable = BTreeMap<String, HostValue>;

/// The structural metadata of a code object.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CodeMetadata {
    /// The local variable names, in declaration order. This order, not the
    /// binding table's, decides the order in which locals are wrapped.
    pub variable_names: Vec<String>,

    /// The global names the code references.
    pub global_names: Vec<String>,

    /// The names of variables captured by nested scopes.
    pub cell_names: Vec<String>,

    /// The names of variables captured from enclosing scopes.
    pub free_names: Vec<String>,

    /// The operand stack depth hint the host computed for the code.
    pub stack_size: usize,

    /// The name of the source the code was compiled from.
    pub source_name: String,
}

impl CodeMetadata {
    /// Appends `name` to the referenced global names unless already present.
    pub fn add_global_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.global_names.contains(&name) {
            self.global_names.push(name);
        }
    }

    /// Raises the stack depth hint to at least `needed`.
    pub fn raise_stack_size(&mut self, needed: usize) {
        self.stack_size = self.stack_size.max(needed);
    }
}

/// A code object: an instruction stream plus its structural metadata.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CodeObject {
    /// The decoded instructions.
    pub instructions: InstructionStream,

    /// The structural metadata.
    pub metadata: CodeMetadata,
}

impl CodeObject {
    /// Constructs a code object from its parts.
    #[must_use]
    pub fn new(instructions: InstructionStream, metadata: CodeMetadata) -> Self {
        Self {
            instructions,
            metadata,
        }
    }
}

/// A paused frame of the host interpreter, as handed to the tracer.
#[derive(Clone, Debug)]
pub struct Frame {
    /// The code object the frame is executing.
    pub code: CodeObject,

    /// The frame's local bindings.
    pub locals: BindingTable,

    /// The frame's global bindings.
    pub globals: BindingTable,

    /// The builtin bindings visible to the frame.
    pub builtins: BindingTable,
}

impl Frame {
    /// Constructs a frame for `code` with empty binding tables.
    #[must_use]
    pub fn new(code: CodeObject) -> Self {
        Self {
            code,
            locals: BindingTable::new(),
            globals: BindingTable::new(),
            builtins: BindingTable::new(),
        }
    }

    /// Adds the local binding `name` = `value`.
    #[must_use]
    pub fn with_local(mut self, name: impl Into<String>, value: HostValue) -> Self {
        self.locals.insert(name.into(), value);
        self
    }

    /// Adds the global binding `name` = `value`.
    #[must_use]
    pub fn with_global(mut self, name: impl Into<String>, value: HostValue) -> Self {
        self.globals.insert(name.into(), value);
        self
    }

    /// Adds the builtin binding `name` = `value`.
    #[must_use]
    pub fn with_builtin(mut self, name: impl Into<String>, value: HostValue) -> Self {
        self.builtins.insert(name.into(), value);
        self
    }
}
