//! This module contains the code rewrite that a successful trace performs:
//! the description of where each captured input comes from, the naming of
//! compiled callables, and the synthesis of the replacement program.
//!
//! The replacement program is straight-line and total. Replacing the whole
//! stream is valid because a trace only completes at a return instruction,
//! which is the last instruction reachable along the traced path; everything
//! after the graph's single output was already consumed.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use crate::{
    constant::COMPILED_NAME_PREFIX,
    error::trace::Error,
    host::HostValue,
    instruction::Operand,
    opcode::Opcode,
    tracer::{TraceOutcome, Tracer},
    value::SupportState,
};

/// The serial numbers for compiled callable names.
///
/// Minted names are bound into frames' global tables, and frames outlive any
/// single trace, so the counter is process-wide and never reset.
static COMPILED_NAMES: AtomicUsize = AtomicUsize::new(0);

/// Mints a fresh, process-unique name for a compiled callable.
fn fresh_callable_name() -> String {
    let serial = COMPILED_NAMES.fetch_add(1, Ordering::Relaxed);
    format!("{COMPILED_NAME_PREFIX}{serial}")
}

/// Where one captured graph input comes from in the paused frame.
///
/// The rewritten program reloads each captured input from its source at call
/// time, in placeholder order, so the order of these descriptors is the
/// positional argument order of the compiled callable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CaptureSource {
    /// The local binding with the given name.
    Local { name: String },

    /// The global binding with the given name.
    Global { name: String },
}

impl CaptureSource {
    /// Gets the name of the binding the capture reads.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Local { name } | Self::Global { name } => name,
        }
    }

    /// Gets the instruction that reloads the captured value.
    fn load(&self) -> (Opcode, Operand) {
        match self {
            Self::Local { name } => (Opcode::LoadLocal, Operand::Name(name.clone())),
            Self::Global { name } => (Opcode::LoadGlobal, Operand::Name(name.clone())),
        }
    }
}

/// Builds the program that replaces a captured frame's instructions: load the
/// compiled callable from its new global binding, reload each captured
/// argument, call with that positional arity, and return the result.
fn replacement_program(callable: &str, captures: &[CaptureSource]) -> Vec<(Opcode, Operand)> {
    let mut program = Vec::with_capacity(captures.len() + 3);
    program.push((Opcode::LoadGlobal, Operand::Name(callable.into())));
    program.extend(captures.iter().map(CaptureSource::load));
    program.push((Opcode::CallFunction, Operand::Count(captures.len())));
    program.push((Opcode::Return, Operand::None));

    program
}

impl Tracer<'_> {
    /// Completes the trace at a return instruction.
    ///
    /// The returned value is sealed into the graph as its output, the graph
    /// is compiled, the compiled callable is bound into the frame's global
    /// table under a fresh name, and the frame's instruction stream is
    /// replaced wholesale with a call to that binding.
    ///
    /// # Errors
    ///
    /// Aborts when the returned value is not a fully supported array, and
    /// fails when the backend cannot compile the graph.
    pub(super) fn finalize_return(&mut self) -> Result<TraceOutcome, Error> {
        let value = self.stack.pop()?;
        if value.support != SupportState::Supported {
            return Err(Error::unsupported("return value not fully supported"));
        }
        let Some(node) = value.as_node() else {
            return Err(Error::unsupported(format!(
                "returning a {}",
                value.kind_name()
            )));
        };

        self.graph.create_output(node)?;
        debug!(graph = %self.graph, "captured graph");

        let callable = self
            .compiler
            .compile(&self.graph, &self.registry)
            .map_err(|reason| Error::Compilation { reason })?;
        self.guards.merge(&value.guards);

        let name = fresh_callable_name();
        self.frame
            .globals
            .insert(name.clone(), HostValue::Function(callable));
        self.frame.code.metadata.add_global_name(&name);
        self.frame
            .code
            .metadata
            .raise_stack_size(self.captures.len() + 1);
        self.frame
            .code
            .instructions
            .replace_with(replacement_program(&name, &self.captures));

        let calls_captured = self.graph.call_count();
        Ok(TraceOutcome {
            code: self.frame.code.clone(),
            guards: self.guards.clone(),
            calls_captured,
            fusions_possible: calls_captured.saturating_sub(1),
        })
    }
}
