//! This module is an integration test for the call surface: component
//! hierarchies reached through attribute walks, the three call encodings,
//! and the capture of whitelisted callables and their members.
#![cfg(test)]

use std::rc::Rc;

use anyhow::anyhow;
use frame_lift::{
    allowlist::AllowList,
    frame::Frame,
    graph::{ArgValue, CallTarget, NodeId, Operation},
    guard::{Guard, GuardRequirement, GuardSource},
    host::{
        ArrayValue,
        Component,
        ComponentChild,
        ComponentClass,
        ConstValue,
        FunctionValue,
        HostValue,
    },
    instruction::{InstructionStream, Operand},
    opcode::{BinaryOp, Opcode},
};

mod common;

/// A small component hierarchy: a `Dense` root holding an `Act` child and a
/// weight leaf.
struct ModelFixture {
    dense_class: Rc<ComponentClass>,
    act_class:   Rc<ComponentClass>,
    net:         Rc<Component>,
}

fn new_model() -> ModelFixture {
    let dense_class = ComponentClass::new("Dense").in_rc();
    let act_class = ComponentClass::new("Act").in_rc();
    let act = Component::new(act_class.clone()).in_rc();
    let net = Component::new(dense_class.clone())
        .with_child("act", ComponentChild::Component(act))
        .with_child(
            "weight",
            ComponentChild::Array(ArrayValue::new("net.weight").in_rc()),
        )
        .in_rc();

    ModelFixture {
        dense_class,
        act_class,
        net,
    }
}

#[test]
fn calls_an_allowed_component_through_the_registry() -> anyhow::Result<()> {
    let model = new_model();
    let stream = InstructionStream::build()
        .named(Opcode::LoadLocal, "net")
        .named(Opcode::LoadLocal, "x")
        .counted(Opcode::CallFunction, 1)
        .op(Opcode::Return)
        .finish()?;
    let mut frame = Frame::new(common::new_code(stream, &["net", "x"], 2))
        .with_local("net", HostValue::Component(model.net))
        .with_local("x", common::new_array("x"));
    let allowlist = AllowList::new().with_component_class(&model.dense_class);
    let (mut converter, compiler) = common::new_converter_with(allowlist);

    let result = converter.convert_frame(&mut frame);

    assert_eq!(converter.stats().frames_ok, 1);

    // The call resolves through the registry under the minted root key, and
    // the registry travels to the compiler alongside the graph.
    let compiled = compiler.compiled();
    let entry = compiled.first().ok_or_else(|| anyhow!("nothing compiled"))?;
    assert_eq!(entry.registry_keys, vec!["net_0".to_string()]);
    let call = entry
        .graph
        .nodes()
        .find_map(|node| match &node.op {
            Operation::ComponentCall { path } => Some(path.as_str().to_string()),
            _ => None,
        })
        .ok_or_else(|| anyhow!("expected a component call node"))?;
    assert_eq!(call, "net_0");

    // Only the array local is captured; the component is reconstructed from
    // the registry, guarded by its exact value.
    let listing = frame.code.instructions.instructions();
    assert_eq!(listing.len(), 4);
    assert_eq!(listing[1].operand, Operand::Name("x".into()));
    assert!(result.guards.contains(&Guard::new(
        "net",
        GuardSource::Local,
        GuardRequirement::ExactValueMatch
    )));
    assert!(result.guards.contains(&Guard::new(
        "x",
        GuardSource::Local,
        GuardRequirement::TypeMatch
    )));

    Ok(())
}

#[test]
fn walks_into_a_sub_component_before_calling() -> anyhow::Result<()> {
    let model = new_model();
    let stream = InstructionStream::build()
        .named(Opcode::LoadLocal, "net")
        .named(Opcode::LoadAttr, "act")
        .named(Opcode::LoadLocal, "x")
        .counted(Opcode::CallFunction, 1)
        .op(Opcode::Return)
        .finish()?;
    let mut frame = Frame::new(common::new_code(stream, &["net", "x"], 2))
        .with_local("net", HostValue::Component(model.net))
        .with_local("x", common::new_array("x"));
    let allowlist = AllowList::new()
        .with_component_class(&model.dense_class)
        .with_component_class(&model.act_class);
    let (mut converter, compiler) = common::new_converter_with(allowlist);

    converter.convert_frame(&mut frame);

    assert_eq!(converter.stats().frames_ok, 1);
    let compiled = compiler.compiled();
    let entry = compiled.first().ok_or_else(|| anyhow!("nothing compiled"))?;
    let call = entry
        .graph
        .nodes()
        .find_map(|node| match &node.op {
            Operation::ComponentCall { path } => Some(path.as_str().to_string()),
            _ => None,
        })
        .ok_or_else(|| anyhow!("expected a component call node"))?;
    assert_eq!(call, "net_0.act");

    Ok(())
}

#[test]
fn rejects_a_sub_component_outside_the_allowlist() -> anyhow::Result<()> {
    let model = new_model();
    let stream = InstructionStream::build()
        .named(Opcode::LoadLocal, "net")
        .named(Opcode::LoadAttr, "act")
        .named(Opcode::LoadLocal, "x")
        .counted(Opcode::CallFunction, 1)
        .op(Opcode::Return)
        .finish()?;
    let mut frame = Frame::new(common::new_code(stream, &["net", "x"], 2))
        .with_local("net", HostValue::Component(model.net))
        .with_local("x", common::new_array("x"));
    let original = frame.code.clone();
    let allowlist = AllowList::new().with_component_class(&model.dense_class);
    let (mut converter, compiler) = common::new_converter_with(allowlist);

    converter.convert_frame(&mut frame);

    assert_eq!(frame.code, original);
    assert_eq!(compiler.compiled_count(), 0);
    assert_eq!(
        converter.stats().unsupported.get("custom sub-component `Act`"),
        Some(&1)
    );

    Ok(())
}

#[test]
fn reads_an_array_leaf_through_get_attr() -> anyhow::Result<()> {
    let model = new_model();
    let stream = InstructionStream::build()
        .named(Opcode::LoadLocal, "net")
        .named(Opcode::LoadAttr, "weight")
        .named(Opcode::LoadLocal, "x")
        .op(Opcode::Binary(BinaryOp::Mul))
        .op(Opcode::Return)
        .finish()?;
    let mut frame = Frame::new(common::new_code(stream, &["net", "x"], 2))
        .with_local("net", HostValue::Component(model.net))
        .with_local("x", common::new_array("x"));
    let allowlist = AllowList::new().with_component_class(&model.dense_class);
    let (mut converter, compiler) = common::new_converter_with(allowlist);

    converter.convert_frame(&mut frame);

    assert_eq!(converter.stats().frames_ok, 1);
    let compiled = compiler.compiled();
    let graph = &compiled.first().ok_or_else(|| anyhow!("nothing compiled"))?.graph;

    // The leaf read becomes a node of its own feeding the multiply, and it
    // does not count as a captured call.
    assert_eq!(graph.len(), 4);
    assert_eq!(graph.call_count(), 1);
    let leaf = graph
        .nodes()
        .find_map(|node| match &node.op {
            Operation::GetAttr { path } => Some(path.as_str().to_string()),
            _ => None,
        })
        .ok_or_else(|| anyhow!("expected a get-attr node"))?;
    assert_eq!(leaf, "net_0.weight");
    let call = graph
        .nodes()
        .find(|node| matches!(node.op, Operation::Call { .. }))
        .ok_or_else(|| anyhow!("expected a call node"))?;
    assert_eq!(
        call.args,
        vec![ArgValue::Node(NodeId::new(1)), ArgValue::Node(NodeId::new(0))]
    );

    Ok(())
}

#[test]
fn passes_keywords_through_the_keyword_call_encoding() -> anyhow::Result<()> {
    let function = FunctionValue::new("scaled_add").in_rc();
    let stream = InstructionStream::build()
        .named(Opcode::LoadGlobal, "f")
        .named(Opcode::LoadLocal, "x")
        .named(Opcode::LoadLocal, "y")
        .constant(
            Opcode::LoadConst,
            ConstValue::Tuple(vec![ConstValue::str("scale")]),
        )
        .counted(Opcode::CallFunctionKw, 2)
        .op(Opcode::Return)
        .finish()?;
    let mut frame = Frame::new(common::new_code(stream, &["x", "y"], 4))
        .with_local("x", common::new_array("x"))
        .with_local("y", common::new_array("y"))
        .with_global("f", HostValue::Function(function.clone()));
    let allowlist = AllowList::new().with_callable(&function);
    let (mut converter, compiler) = common::new_converter_with(allowlist);

    let result = converter.convert_frame(&mut frame);

    assert_eq!(converter.stats().frames_ok, 1);

    // The trailing argument travels as a keyword, in supplied order.
    let compiled = compiler.compiled();
    let graph = &compiled.first().ok_or_else(|| anyhow!("nothing compiled"))?.graph;
    let call = graph
        .nodes()
        .find(|node| matches!(node.op, Operation::Call { .. }))
        .ok_or_else(|| anyhow!("expected a call node"))?;
    assert_eq!(call.args, vec![ArgValue::Node(NodeId::new(0))]);
    assert_eq!(
        call.kwargs,
        vec![("scale".to_string(), ArgValue::Node(NodeId::new(1)))]
    );

    // Reuse is conditional on `f` still being the very same callable.
    assert!(result.guards.contains(&Guard::new(
        "f",
        GuardSource::Global,
        GuardRequirement::IdentityMatch
    )));

    // Both array locals are captured for the rewritten call.
    let listing = frame.code.instructions.instructions();
    assert_eq!(listing.len(), 5);
    assert_eq!(listing[3].operand, Operand::Count(2));

    Ok(())
}

#[test]
fn unpacks_sequences_and_mappings_through_the_ex_encoding() -> anyhow::Result<()> {
    let function = FunctionValue::new("scaled_add").in_rc();
    let stream = InstructionStream::build()
        .named(Opcode::LoadGlobal, "f")
        .named(Opcode::LoadLocal, "x")
        .counted(Opcode::BuildTuple, 1)
        .constant(Opcode::LoadConst, ConstValue::str("scale"))
        .named(Opcode::LoadLocal, "y")
        .counted(Opcode::BuildMap, 1)
        .counted(Opcode::CallFunctionEx, 1)
        .op(Opcode::Return)
        .finish()?;
    let mut frame = Frame::new(common::new_code(stream, &["x", "y"], 4))
        .with_local("x", common::new_array("x"))
        .with_local("y", common::new_array("y"))
        .with_global("f", HostValue::Function(function.clone()));
    let allowlist = AllowList::new().with_callable(&function);
    let (mut converter, compiler) = common::new_converter_with(allowlist);

    converter.convert_frame(&mut frame);

    assert_eq!(converter.stats().frames_ok, 1);
    let compiled = compiler.compiled();
    let graph = &compiled.first().ok_or_else(|| anyhow!("nothing compiled"))?.graph;
    let call = graph
        .nodes()
        .find(|node| matches!(node.op, Operation::Call { .. }))
        .ok_or_else(|| anyhow!("expected a call node"))?;
    assert_eq!(call.args, vec![ArgValue::Node(NodeId::new(0))]);
    assert_eq!(
        call.kwargs,
        vec![("scale".to_string(), ArgValue::Node(NodeId::new(1)))]
    );

    Ok(())
}

#[test]
fn defers_a_method_call_on_an_array_to_the_graph() -> anyhow::Result<()> {
    let stream = InstructionStream::build()
        .named(Opcode::LoadLocal, "x")
        .named(Opcode::LoadAttr, "relu")
        .counted(Opcode::CallFunction, 0)
        .op(Opcode::Return)
        .finish()?;
    let mut frame = Frame::new(common::new_code(stream, &["x"], 2))
        .with_local("x", common::new_array("x"));
    let (mut converter, compiler) = common::new_converter();

    converter.convert_frame(&mut frame);

    assert_eq!(converter.stats().frames_ok, 1);

    // The receiver becomes the method call's first argument.
    let compiled = compiler.compiled();
    let graph = &compiled.first().ok_or_else(|| anyhow!("nothing compiled"))?.graph;
    let call = graph
        .nodes()
        .find(|node| matches!(node.op, Operation::MethodCall { .. }))
        .ok_or_else(|| anyhow!("expected a method call node"))?;
    assert!(matches!(&call.op, Operation::MethodCall { method } if method == "relu"));
    assert_eq!(call.args, vec![ArgValue::Node(NodeId::new(0))]);

    Ok(())
}

#[test]
fn resolves_members_of_whitelisted_namespaces() -> anyhow::Result<()> {
    let member = FunctionValue::new("nn.relu").in_rc();
    let namespace = FunctionValue::new("nn")
        .with_member("relu", member.clone())
        .in_rc();
    let stream = InstructionStream::build()
        .named(Opcode::LoadGlobal, "nn")
        .named(Opcode::LoadAttr, "relu")
        .named(Opcode::LoadLocal, "x")
        .counted(Opcode::CallFunction, 1)
        .op(Opcode::Return)
        .finish()?;
    let mut frame = Frame::new(common::new_code(stream, &["x"], 3))
        .with_local("x", common::new_array("x"))
        .with_global("nn", HostValue::Function(namespace.clone()));
    let allowlist = AllowList::new().with_callable(&namespace);
    let (mut converter, compiler) = common::new_converter_with(allowlist);

    converter.convert_frame(&mut frame);

    assert_eq!(converter.stats().frames_ok, 1);
    let compiled = compiler.compiled();
    let graph = &compiled.first().ok_or_else(|| anyhow!("nothing compiled"))?.graph;
    let target = graph
        .nodes()
        .find_map(|node| match &node.op {
            Operation::Call {
                target: CallTarget::Function(function),
            } => Some(function.clone()),
            _ => None,
        })
        .ok_or_else(|| anyhow!("expected a function call node"))?;
    assert_eq!(target, member);

    Ok(())
}
