//! This module is an integration test for branching on constant locals: the
//! taken side of the branch decides what the graph captures, and the
//! condition's exact value becomes part of the emitted guards.
#![cfg(test)]

use anyhow::anyhow;
use frame_lift::{
    frame::Frame,
    graph::{CallTarget, Operation},
    guard::{Guard, GuardRequirement, GuardSource},
    host::{ConstValue, HostValue},
    instruction::InstructionStream,
    opcode::{BinaryOp, Opcode, UnaryOp},
};

mod common;

/// Builds a frame that doubles `x` when `flag` is truthy and negates it
/// otherwise.
fn branching_frame(flag: bool) -> anyhow::Result<Frame> {
    let stream = InstructionStream::build()
        .named(Opcode::LoadLocal, "flag")
        .jump(Opcode::JumpIfFalse, 6)
        .named(Opcode::LoadLocal, "x")
        .named(Opcode::LoadLocal, "x")
        .op(Opcode::Binary(BinaryOp::Add))
        .op(Opcode::Return)
        .named(Opcode::LoadLocal, "x")
        .op(Opcode::Unary(UnaryOp::Neg))
        .op(Opcode::Return)
        .finish()?;

    Ok(Frame::new(common::new_code(stream, &["flag", "x"], 2))
        .with_local("flag", HostValue::Const(ConstValue::Bool(flag)))
        .with_local("x", common::new_array("x")))
}

/// Gets the call target of the single call node the trace captured.
fn captured_target(
    compiler: &frame_lift::compiler::RecordingCompiler,
) -> anyhow::Result<CallTarget> {
    let compiled = compiler.compiled();
    let graph = &compiled
        .first()
        .ok_or_else(|| anyhow!("nothing was compiled"))?
        .graph;
    assert_eq!(graph.call_count(), 1);

    let target = graph
        .nodes()
        .find_map(|node| match &node.op {
            Operation::Call { target } => Some(target.clone()),
            _ => None,
        })
        .ok_or_else(|| anyhow!("expected a call node in the graph"));
    target
}

#[test]
fn a_truthy_condition_falls_through_to_the_next_instruction() -> anyhow::Result<()> {
    let mut frame = branching_frame(true)?;
    let (mut converter, compiler) = common::new_converter();

    let result = converter.convert_frame(&mut frame);

    assert_eq!(converter.stats().frames_ok, 1);
    assert!(matches!(
        captured_target(&compiler)?,
        CallTarget::Binary(BinaryOp::Add)
    ));

    // Specializing on the branch makes the flag's exact value a condition
    // of reusing the rewritten frame.
    assert!(result.guards.contains(&Guard::new(
        "flag",
        GuardSource::Local,
        GuardRequirement::ExactValueMatch
    )));
    assert!(result.guards.contains(&Guard::new(
        "x",
        GuardSource::Local,
        GuardRequirement::TypeMatch
    )));
    assert_eq!(result.guards.len(), 2);

    Ok(())
}

#[test]
fn a_falsy_condition_redirects_to_the_jump_target() -> anyhow::Result<()> {
    let mut frame = branching_frame(false)?;
    let (mut converter, compiler) = common::new_converter();

    let result = converter.convert_frame(&mut frame);

    assert_eq!(converter.stats().frames_ok, 1);
    assert!(matches!(
        captured_target(&compiler)?,
        CallTarget::Unary(UnaryOp::Neg)
    ));
    assert!(result.guards.contains(&Guard::new(
        "flag",
        GuardSource::Local,
        GuardRequirement::ExactValueMatch
    )));

    Ok(())
}

#[test]
fn a_branch_on_an_array_aborts_the_trace() -> anyhow::Result<()> {
    let stream = InstructionStream::build()
        .named(Opcode::LoadLocal, "x")
        .jump(Opcode::JumpIfFalse, 2)
        .named(Opcode::LoadLocal, "x")
        .op(Opcode::Return)
        .finish()?;
    let mut frame = Frame::new(common::new_code(stream, &["x"], 2))
        .with_local("x", common::new_array("x"));
    let original = frame.code.clone();
    let (mut converter, compiler) = common::new_converter();

    converter.convert_frame(&mut frame);

    assert_eq!(frame.code, original);
    assert_eq!(compiler.compiled_count(), 0);
    assert_eq!(
        converter.stats().unsupported.get("data-dependent branch"),
        Some(&1)
    );

    Ok(())
}
