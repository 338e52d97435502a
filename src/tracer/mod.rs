//! This module contains the symbolic interpreter at the heart of the
//! library.
//!
//! The [`Tracer`] walks the instruction stream of one paused frame with
//! symbolic values in place of the host's concrete ones. Array operations
//! are not performed but captured as nodes of a dataflow graph; everything
//! else is either evaluated exactly (constants, stack shuffles, bindings) or
//! refused. Refusal is total: the first construct the tracer does not model
//! aborts the whole trace, and the frame is left untouched.
//!
//! A trace that reaches a return instruction with a fully supported array on
//! top of the stack ends differently: the graph is sealed and compiled, and
//! the frame's instruction stream is replaced with a call to the compiled
//! callable, guarded by the conditions the trace accumulated along the way.

pub mod rewrite;
pub mod stack;

mod call;

use std::collections::BTreeMap;

use crate::{
    allowlist::AllowList,
    compiler::DynCompiler,
    constant::{DEFAULT_GRAPH_NODE_LIMIT, DEFAULT_TRACE_STEP_LIMIT},
    error::{
        container::Locatable,
        trace::{self, Error},
    },
    frame::{CodeObject, Frame},
    graph::{ArgValue, CallTarget, Graph, Operation},
    guard::{Guard, GuardRequirement, GuardSet, GuardSource},
    host::{ConstValue, HostValue},
    instruction::{Instruction, Operand},
    opcode::Opcode,
    registry::ComponentRegistry,
    tracer::{rewrite::CaptureSource, stack::OperandStack},
    value::{ContainerKind, SupportState, SymbolicValue, ValueData},
};

/// The configuration for the tracer's resource ceilings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The maximum number of instructions one trace may execute.
    pub step_limit: usize,

    /// The maximum number of nodes one captured graph may hold.
    pub graph_node_limit: usize,
}

impl Config {
    /// Creates a configuration with the default ceilings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of instructions one trace may execute.
    #[must_use]
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    /// Sets the maximum number of nodes one captured graph may hold.
    #[must_use]
    pub fn with_graph_node_limit(mut self, limit: usize) -> Self {
        self.graph_node_limit = limit;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            step_limit:       DEFAULT_TRACE_STEP_LIMIT,
            graph_node_limit: DEFAULT_GRAPH_NODE_LIMIT,
        }
    }
}

/// What a successful trace of one frame produced.
#[derive(Clone, Debug)]
pub struct TraceOutcome {
    /// The rewritten code object, now invoking the compiled callable.
    pub code: CodeObject,

    /// The conditions under which the rewritten code stands in for the
    /// original.
    pub guards: GuardSet,

    /// How many call nodes the captured graph holds.
    pub calls_captured: usize,

    /// How many adjacent call pairs a backend could fuse, estimated as the
    /// captured calls minus one.
    pub fusions_possible: usize,
}

/// The symbolic interpreter for one frame.
///
/// A tracer is single-use: it is constructed over a paused frame, driven to
/// completion or abort by [`Tracer::run`], and then discarded. Nothing it
/// builds along the way is observable unless the trace completes, at which
/// point the frame's code object has been rewritten and the outcome reports
/// the guards.
#[derive(Debug)]
pub struct Tracer<'a> {
    /// The frame being traced.
    frame: &'a mut Frame,

    /// The allow-list consulted for global callables and component classes.
    allowlist: &'a AllowList,

    /// The backend that compiles the captured graph.
    compiler: DynCompiler,

    /// The resource ceilings for this trace.
    config: Config,

    /// The symbolic values of the frame's local bindings.
    locals: BTreeMap<String, SymbolicValue>,

    /// The operand stack.
    stack: OperandStack,

    /// The dataflow graph accumulated so far.
    graph: Graph,

    /// The components captured so far, keyed by minted root names.
    registry: ComponentRegistry,

    /// Where each captured input comes from, in placeholder order.
    captures: Vec<CaptureSource>,

    /// The guards demanded by the control flow taken so far.
    guards: GuardSet,

    /// The position of the next instruction to execute.
    ip: usize,

    /// The position of the instruction currently executing.
    at: usize,

    /// The number of placeholder and registry names minted so far.
    minted: usize,

    /// The number of instructions executed so far.
    steps: usize,
}

impl<'a> Tracer<'a> {
    /// Creates a tracer over `frame`, eagerly wrapping every bound local into
    /// its symbolic form.
    ///
    /// # Errors
    ///
    /// Aborts, located at position zero, when a local binding holds a value
    /// of a kind the tracer cannot wrap. Nothing has executed at that point,
    /// so the frame is untouched.
    pub fn new(
        frame: &'a mut Frame,
        allowlist: &'a AllowList,
        compiler: DynCompiler,
        config: Config,
    ) -> trace::Result<Self> {
        let stack = OperandStack::new(frame.code.metadata.stack_size);
        let graph = Graph::new(config.graph_node_limit);
        let mut tracer = Self {
            frame,
            allowlist,
            compiler,
            config,
            locals: BTreeMap::new(),
            stack,
            graph,
            registry: ComponentRegistry::new(),
            captures: Vec::new(),
            guards: GuardSet::new(),
            ip: 0,
            at: 0,
            minted: 0,
            steps: 0,
        };
        tracer.wrap_locals().locate(0)?;

        Ok(tracer)
    }

    /// Drives the trace until it completes at a return instruction.
    ///
    /// # Errors
    ///
    /// Returns the located abort or invariant violation that ended the
    /// trace. The frame is only ever modified on success.
    pub fn run(mut self) -> trace::Result<TraceOutcome> {
        loop {
            if self.steps >= self.config.step_limit {
                return Err(Error::StepLimitExceeded {
                    limit: self.config.step_limit,
                }
                .locate(self.ip));
            }
            if let Some(outcome) = self.step()? {
                return Ok(outcome);
            }
        }
    }

    /// Executes one instruction, returning the outcome if it completed the
    /// trace.
    fn step(&mut self) -> trace::Result<Option<TraceOutcome>> {
        let at = self.ip;
        let instruction = self
            .frame
            .code
            .instructions
            .get(at)
            .cloned()
            .ok_or(Error::InstructionPointerOutOfBounds {
                requested: at,
                available: self.frame.code.instructions.len(),
            })
            .locate(at)?;
        self.at = at;
        self.ip = at + 1;
        self.steps += 1;

        self.execute(&instruction).locate(at)
    }

    /// Dispatches one decoded instruction.
    ///
    /// The match is total over the instruction set. Opcodes the tracer
    /// recognises but does not capture abort explicitly, naming themselves,
    /// so nothing ever falls through silently.
    fn execute(&mut self, instruction: &Instruction) -> Result<Option<TraceOutcome>, Error> {
        match instruction.opcode {
            Opcode::Nop => {}
            Opcode::PopTop => {
                self.stack.pop()?;
            }
            Opcode::RotTwo => self.stack.rotate(2)?,
            Opcode::RotThree => self.stack.rotate(3)?,
            Opcode::RotFour => self.stack.rotate(4)?,
            Opcode::DupTop => {
                let top = self.stack.peek(0)?.clone();
                self.stack.push(top)?;
            }
            Opcode::DupTopTwo => {
                let below = self.stack.peek(1)?.clone();
                let top = self.stack.peek(0)?.clone();
                self.stack.push(below)?;
                self.stack.push(top)?;
            }
            Opcode::LoadLocal => {
                let name = name_operand(instruction)?;
                let value = self
                    .locals
                    .get(&name)
                    .ok_or(Error::UnboundLocal { name })?
                    .clone();
                self.stack.push(value)?;
            }
            Opcode::StoreLocal => {
                let name = name_operand(instruction)?;
                let value = self.stack.pop()?;
                self.locals.insert(name, value);
            }
            Opcode::LoadConst => {
                let value = const_operand(instruction)?;
                self.stack.push(SymbolicValue::constant(value))?;
            }
            Opcode::LoadGlobal => {
                let name = name_operand(instruction)?;
                self.load_global(&name)?;
            }
            Opcode::LoadAttr => {
                let name = name_operand(instruction)?;
                self.load_attribute(&name)?;
            }
            Opcode::Binary(op) => self.operator(op.mnemonic(), CallTarget::Binary(op), 2)?,
            Opcode::Unary(op) => self.operator(op.mnemonic(), CallTarget::Unary(op), 1)?,
            Opcode::Compare(op) => self.operator(op.mnemonic(), CallTarget::Compare(op), 2)?,
            Opcode::CallFunction => {
                let argc = count_operand(instruction)?;
                self.call_function(argc)?;
            }
            Opcode::CallFunctionKw => {
                let argc = count_operand(instruction)?;
                self.call_function_kw(argc)?;
            }
            Opcode::CallFunctionEx => {
                let flag = count_operand(instruction)?;
                self.call_function_ex(flag)?;
            }
            Opcode::BuildTuple => {
                let count = count_operand(instruction)?;
                self.build_container(ContainerKind::Tuple, count)?;
            }
            Opcode::BuildList => {
                let count = count_operand(instruction)?;
                self.build_container(ContainerKind::List, count)?;
            }
            Opcode::BuildSlice => {
                let count = count_operand(instruction)?;
                self.build_container(ContainerKind::Slice, count)?;
            }
            Opcode::BuildMap => {
                let count = count_operand(instruction)?;
                self.build_map(count)?;
            }
            Opcode::BuildConstKeyMap => {
                let count = count_operand(instruction)?;
                self.build_const_key_map(count)?;
            }
            Opcode::UnpackSequence => {
                let count = count_operand(instruction)?;
                self.unpack_sequence(count)?;
            }
            Opcode::JumpIfFalse => self.jump_if_false(instruction)?,
            Opcode::Return => return self.finalize_return().map(Some),
            Opcode::JumpIfTrue
            | Opcode::JumpAbsolute
            | Opcode::GetIter
            | Opcode::ForIter
            | Opcode::StoreAttr
            | Opcode::LoadDeref
            | Opcode::StoreDeref
            | Opcode::MakeFunction => {
                return Err(Error::unsupported(format!(
                    "missing opcode {}",
                    instruction.opcode.mnemonic()
                )));
            }
        }

        Ok(None)
    }

    /// Wraps every bound local of the frame into its symbolic form, in the
    /// declaration order of the code object's variable names.
    fn wrap_locals(&mut self) -> Result<(), Error> {
        for name in self.frame.code.metadata.variable_names.clone() {
            let Some(value) = self.frame.locals.get(&name).cloned() else {
                continue;
            };
            let wrapped = self.wrap_local(&name, &value)?;
            self.locals.insert(name, wrapped);
        }

        Ok(())
    }

    /// Wraps the concrete value of the local binding `name`.
    ///
    /// Arrays become graph placeholders and are recorded for capture,
    /// components are registered under a minted root key, and boolean or
    /// none constants specialize on their exact value. Anything else aborts.
    fn wrap_local(&mut self, name: &str, value: &HostValue) -> Result<SymbolicValue, Error> {
        match value {
            HostValue::Array(_) => {
                let placeholder = self.mint_name(name);
                let node = self.graph.create_input(placeholder)?;
                self.captures.push(CaptureSource::Local { name: name.into() });

                Ok(SymbolicValue::array(
                    node,
                    SupportState::Supported,
                    GuardSet::from(Guard::new(
                        name,
                        GuardSource::Local,
                        GuardRequirement::TypeMatch,
                    )),
                ))
            }
            HostValue::Component(component) => {
                let key = self.mint_name(name);
                let path = self.registry.register(key, component.clone());

                Ok(SymbolicValue::new(
                    SupportState::Supported,
                    GuardSet::from(Guard::new(
                        name,
                        GuardSource::Local,
                        GuardRequirement::ExactValueMatch,
                    )),
                    ValueData::Component { path },
                ))
            }
            HostValue::Const(constant @ (ConstValue::Bool(_) | ConstValue::None)) => {
                Ok(SymbolicValue::new(
                    SupportState::Unknown,
                    GuardSet::from(Guard::new(
                        name,
                        GuardSource::Local,
                        GuardRequirement::ExactValueMatch,
                    )),
                    ValueData::Constant {
                        value: constant.clone(),
                    },
                ))
            }
            other => Err(Error::unsupported(format!(
                "local `{name}` of kind {}",
                other.kind_name()
            ))),
        }
    }

    /// Executes a global load.
    ///
    /// Whitelisted callables are the only globals the tracer captures. A
    /// global array is a known-unfinished capture path and aborts; builtins
    /// and everything else abort naming the binding.
    fn load_global(&mut self, name: &str) -> Result<(), Error> {
        if let Some(value) = self.frame.globals.get(name) {
            let wrapped = match value {
                HostValue::Function(function) if self.allowlist.allows_callable(function) => {
                    SymbolicValue::new(
                        SupportState::Supported,
                        GuardSet::from(Guard::new(
                            name,
                            GuardSource::Global,
                            GuardRequirement::IdentityMatch,
                        )),
                        ValueData::Callable {
                            function: function.clone(),
                        },
                    )
                }
                HostValue::Array(_) => {
                    return Err(Error::unsupported(format!("global array `{name}`")));
                }
                other => {
                    return Err(Error::unsupported(format!(
                        "global `{name}` of kind {}",
                        other.kind_name()
                    )));
                }
            };

            return self.stack.push(wrapped);
        }

        if self.frame.builtins.contains_key(name) {
            return Err(Error::unsupported(format!("builtin `{name}`")));
        }

        Err(Error::UnknownName { name: name.into() })
    }

    /// Captures an operator application as a call node.
    ///
    /// Operators are only captured over arrays; any other operand kind
    /// aborts, naming the instruction and the offending kind.
    fn operator(
        &mut self,
        mnemonic: &'static str,
        target: CallTarget,
        operand_count: usize,
    ) -> Result<(), Error> {
        let operands = self.stack.popn(operand_count)?;
        let mut args = Vec::with_capacity(operands.len());
        for operand in &operands {
            let Some(node) = operand.as_node() else {
                return Err(Error::unsupported(format!(
                    "{mnemonic} on a {}",
                    operand.kind_name()
                )));
            };
            args.push(ArgValue::Node(node));
        }

        let (support, guards) = SymbolicValue::propagate(&operands);
        let node = self
            .graph
            .create_op(Operation::Call { target }, args, Vec::new())?;

        self.stack.push(SymbolicValue::array(node, support, guards))
    }

    /// Pops `count` values and pushes a container of the given kind.
    fn build_container(&mut self, kind: ContainerKind, count: usize) -> Result<(), Error> {
        let items = self.stack.popn(count)?;
        let (support, guards) = SymbolicValue::propagate(&items);

        self.stack.push(SymbolicValue::new(
            support,
            guards,
            ValueData::Container { kind, items },
        ))
    }

    /// Pops `count` key-value pairs and pushes a mapping of them.
    fn build_map(&mut self, count: usize) -> Result<(), Error> {
        let flat = self.stack.popn(count * 2)?;
        let (support, guards) = SymbolicValue::propagate(&flat);

        let mut entries = Vec::with_capacity(count);
        let mut flat = flat.into_iter();
        while let (Some(key), Some(value)) = (flat.next(), flat.next()) {
            let Some(constant) = key.as_constant().cloned() else {
                return Err(Error::MappingKeyNotConstant {
                    found: key.kind_name().into(),
                });
            };
            if entries.iter().any(|(existing, _)| *existing == constant) {
                return Err(Error::DuplicateMappingKey {
                    key: constant.to_string(),
                });
            }
            entries.push((constant, value));
        }

        self.stack
            .push(SymbolicValue::new(support, guards, ValueData::Mapping { entries }))
    }

    /// Pops a constant key tuple and `count` values and pushes a mapping of
    /// them.
    fn build_const_key_map(&mut self, count: usize) -> Result<(), Error> {
        let keys_value = self.stack.pop()?;
        let keys = match keys_value.as_constant() {
            Some(ConstValue::Tuple(keys)) => keys.clone(),
            Some(other) => {
                return Err(Error::MappingKeyNotConstant {
                    found: other.kind_name().into(),
                });
            }
            None => {
                return Err(Error::MappingKeyNotConstant {
                    found: keys_value.kind_name().into(),
                });
            }
        };

        let values = self.stack.popn(count)?;
        if keys.len() != values.len() {
            return Err(Error::MappingArityMismatch {
                keys:   keys.len(),
                values: values.len(),
            });
        }

        let inputs = std::iter::once(&keys_value).chain(values.iter());
        let (support, guards) = SymbolicValue::propagate(inputs);

        let mut entries = Vec::with_capacity(count);
        for (key, value) in keys.into_iter().zip(values) {
            if entries.iter().any(|(existing, _)| *existing == key) {
                return Err(Error::DuplicateMappingKey {
                    key: key.to_string(),
                });
            }
            entries.push((key, value));
        }

        self.stack
            .push(SymbolicValue::new(support, guards, ValueData::Mapping { entries }))
    }

    /// Pops a container and pushes its items rightmost-first, so the leftmost
    /// item ends up on top.
    fn unpack_sequence(&mut self, count: usize) -> Result<(), Error> {
        let value = self.stack.pop()?;
        let ValueData::Container { items, .. } = &value.data else {
            return Err(Error::unsupported(format!(
                "unpacking a {}",
                value.kind_name()
            )));
        };
        if items.len() != count {
            return Err(Error::UnpackArityMismatch {
                expected: count,
                actual:   items.len(),
            });
        }

        for item in items.iter().rev() {
            self.stack.push(item.clone())?;
        }

        Ok(())
    }

    /// Executes a conditional jump.
    ///
    /// The branch must be decidable at trace time, so the condition has to be
    /// a constant; its guards join the trace's guard set either way, because
    /// the decision specializes the traced path on the condition's value.
    fn jump_if_false(&mut self, instruction: &Instruction) -> Result<(), Error> {
        let condition = self.stack.pop()?;
        self.guards.merge(&condition.guards);

        let Some(constant) = condition.as_constant() else {
            return Err(Error::unsupported("data-dependent branch"));
        };
        if !constant.is_truthy() {
            let target = instruction
                .target
                .ok_or_else(|| Error::MissingJumpTarget {
                    opcode: instruction.opcode.mnemonic().into(),
                })?;
            self.ip = self
                .frame
                .code
                .instructions
                .position_of(target)
                .ok_or_else(|| Error::MissingJumpTarget {
                    opcode: instruction.opcode.mnemonic().into(),
                })?;
        }

        Ok(())
    }

    /// Mints the next serial-numbered name derived from `name`.
    fn mint_name(&mut self, name: &str) -> String {
        let serial = self.minted;
        self.minted += 1;

        format!("{name}_{serial}")
    }
}

/// Extracts the name operand of `instruction`.
fn name_operand(instruction: &Instruction) -> Result<String, Error> {
    match &instruction.operand {
        Operand::Name(name) => Ok(name.clone()),
        _ => Err(Error::MalformedOperand {
            opcode:   instruction.opcode.mnemonic().into(),
            expected: "name",
        }),
    }
}

/// Extracts the count operand of `instruction`.
fn count_operand(instruction: &Instruction) -> Result<usize, Error> {
    match &instruction.operand {
        Operand::Count(count) => Ok(*count),
        _ => Err(Error::MalformedOperand {
            opcode:   instruction.opcode.mnemonic().into(),
            expected: "count",
        }),
    }
}

/// Extracts the constant operand of `instruction`.
fn const_operand(instruction: &Instruction) -> Result<ConstValue, Error> {
    match &instruction.operand {
        Operand::Const(value) => Ok(value.clone()),
        _ => Err(Error::MalformedOperand {
            opcode:   instruction.opcode.mnemonic().into(),
            expected: "constant",
        }),
    }
}
