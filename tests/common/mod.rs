//! This module contains common utilities for simplifying the writing of
//! integration tests for this library.

#![cfg(test)]

use std::rc::Rc;

use anyhow::anyhow;
use frame_lift::{
    allowlist::AllowList,
    compiler::RecordingCompiler,
    constant::COMPILED_NAME_PREFIX,
    frame::{CodeMetadata, CodeObject, Frame},
    host::{ArrayValue, HostValue},
    instruction::InstructionStream,
    FrameConverter,
};

/// The source name used for hand-constructed frames, standing in for the
/// module a host would have compiled the code from.
pub const SOURCE_NAME: &str = "model.host";

/// Routes the library's log output to the test harness.
///
/// Use the `RUST_LOG` environment variable to override the default filter.
#[allow(unused)] // It is actually
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("frame_lift=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Constructs a code object from `stream` with the provided local variable
/// declaration order and operand stack depth hint.
#[allow(unused)] // It is actually
pub fn new_code(
    stream: InstructionStream,
    variable_names: &[&str],
    stack_size: usize,
) -> CodeObject {
    let metadata = CodeMetadata {
        variable_names: variable_names.iter().map(ToString::to_string).collect(),
        stack_size,
        source_name: SOURCE_NAME.into(),
        ..CodeMetadata::default()
    };

    CodeObject::new(stream, metadata)
}

/// Constructs a fresh host array value with the provided label.
#[allow(unused)] // It is actually
pub fn new_array(label: impl Into<String>) -> HostValue {
    HostValue::Array(ArrayValue::new(label).in_rc())
}

/// Constructs a converter over a fresh recording compiler and an empty
/// allowlist, returning the compiler handle so that tests can inspect what
/// was compiled.
#[allow(unused)] // It is actually
pub fn new_converter() -> (FrameConverter, Rc<RecordingCompiler>) {
    new_converter_with(AllowList::new())
}

/// Constructs a converter over a fresh recording compiler and the provided
/// allowlist.
#[allow(unused)] // It is actually
pub fn new_converter_with(allowlist: AllowList) -> (FrameConverter, Rc<RecordingCompiler>) {
    init_tracing();
    let compiler = RecordingCompiler::new().in_rc();
    let converter = FrameConverter::new(allowlist, compiler.clone());

    (converter, compiler)
}

/// Finds the name of the compiled callable bound into the frame's global
/// table by a successful conversion.
#[allow(unused)] // It is actually
pub fn minted_global(frame: &Frame) -> anyhow::Result<String> {
    frame
        .globals
        .keys()
        .find(|name| name.starts_with(COMPILED_NAME_PREFIX))
        .cloned()
        .ok_or_else(|| anyhow!("No compiled callable was bound into the frame"))
}
