//! This library implements trace-based specialization for the paused frames
//! of a stack-machine host interpreter. It walks a frame's instruction
//! stream symbolically, captures the array computation it performs into a
//! dataflow graph, and, when the whole frame is understood, rewrites the
//! frame to call a compiled form of that graph instead. It is a _best
//! effort_ capture: the first construct it does not model aborts the trace
//! and the frame runs unmodified.
//!
//! # How it Works
//!
//! From a very high level, a frame is captured as follows:
//!
//! 1. The host hands over a paused [`frame::Frame`]: a decoded
//!    [`instruction::InstructionStream`], the code object's metadata, and
//!    the frame's binding tables.
//! 2. Every bound local is wrapped into a [`value::SymbolicValue`]. Arrays
//!    become placeholders of a [`graph::Graph`] and are recorded for
//!    capture; each wrap records a [`guard::Guard`] tying the specialization
//!    to the binding it observed.
//! 3. The [`tracer::Tracer`] executes the stream over those symbolic values.
//!    Array operations append graph nodes instead of computing anything;
//!    branches must be decidable at trace time and specialize the trace on
//!    the condition's value.
//! 4. At a return of a fully supported array, the graph is sealed and handed
//!    to the [`compiler::GraphCompiler`], and the frame's instruction stream
//!    is replaced wholesale with a call to the compiled callable.
//! 5. The [`convert::FrameConverter`] wraps all of this in a boundary that
//!    never fails: any abort hands back the original code with an empty
//!    guard set.
//!
//! # Basic Usage
//!
//! For the most basic usage of the library, it is sufficient to construct a
//! `FrameConverter` and offer it frames.
//!
//! ```
//! use frame_lift::{
//!     allowlist::AllowList,
//!     compiler::RecordingCompiler,
//!     convert::FrameConverter,
//!     frame::{CodeMetadata, CodeObject, Frame},
//!     host::{ArrayValue, HostValue},
//!     instruction::InstructionStream,
//!     opcode::{BinaryOp, Opcode},
//! };
//!
//! let stream = InstructionStream::build()
//!     .named(Opcode::LoadLocal, "x")
//!     .named(Opcode::LoadLocal, "y")
//!     .op(Opcode::Binary(BinaryOp::Add))
//!     .op(Opcode::Return)
//!     .finish()
//!     .unwrap();
//! let metadata = CodeMetadata {
//!     variable_names: vec!["x".into(), "y".into()],
//!     stack_size: 4,
//!     source_name: "model.host".into(),
//!     ..CodeMetadata::default()
//! };
//! let mut frame = Frame::new(CodeObject::new(stream, metadata))
//!     .with_local("x", HostValue::Array(ArrayValue::new("x").in_rc()))
//!     .with_local("y", HostValue::Array(ArrayValue::new("y").in_rc()));
//!
//! let mut converter =
//!     FrameConverter::new(AllowList::new(), RecordingCompiler::new().in_rc());
//! let result = converter.convert_frame(&mut frame);
//!
//! // The frame now loads a compiled callable, reloads `x` and `y`, calls it
//! // with both, and returns, under one type guard per captured input.
//! assert_eq!(result.guards.len(), 2);
//! assert_eq!(result.code.instructions.len(), 5);
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod allowlist;
pub mod compiler;
pub mod constant;
pub mod convert;
pub mod error;
pub mod frame;
pub mod graph;
pub mod guard;
pub mod host;
pub mod instruction;
pub mod opcode;
pub mod registry;
pub mod tracer;
pub mod value;

// Re-exports to provide the library interface.
pub use convert::{FrameConverter, GuardedCode, TraceStats};
