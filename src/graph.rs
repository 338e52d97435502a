//! This module contains the dataflow graph that a trace accumulates and
//! eventually hands to the compiler.
//!
//! The graph is append-only for the duration of a trace: nodes are never
//! removed or rewritten, and an aborted trace simply drops the whole graph.
//! Placeholder nodes are kept contiguously at the front, each new one
//! inserted after the last existing placeholder. Their order is the order in
//! which the tracer first discovered the captured inputs, and the compiled
//! callable's positional arguments follow the same order, so this invariant
//! is what makes the rewritten call sites correct.

use std::{
    fmt::{Display, Formatter},
    rc::Rc,
};

use itertools::Itertools;

use crate::{
    error::trace::Error,
    host::{ComponentPath, ConstValue, FunctionValue},
    opcode::{BinaryOp, CompareOp, UnaryOp},
    value::ContainerKind,
};

/// A stable reference to a node in a [`Graph`].
///
/// Identifiers are minted in creation order and never reused, so they stay
/// valid as placeholder insertion shifts node positions.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(usize);

impl NodeId {
    /// Constructs a node identifier from its raw index.
    #[must_use]
    pub fn new(id: usize) -> Self {
        Self(id)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// What a call node invokes.
#[derive(Clone, Debug)]
pub enum CallTarget {
    /// A whitelisted free function.
    Function(Rc<FunctionValue>),

    /// A binary operator of the instruction set.
    Binary(BinaryOp),

    /// A unary operator of the instruction set.
    Unary(UnaryOp),

    /// A comparison operator of the instruction set.
    Compare(CompareOp),
}

impl Display for CallTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Function(function) => write!(f, "{}", function.name),
            Self::Binary(op) => write!(f, "{op}"),
            Self::Unary(op) => write!(f, "{op}"),
            Self::Compare(op) => write!(f, "{op}"),
        }
    }
}

/// The operation a graph node performs.
#[derive(Clone, Debug)]
pub enum Operation {
    /// A captured input to the specialized computation.
    Placeholder { name: String },

    /// A call to a free function or operator.
    Call { target: CallTarget },

    /// A call to a named method of the node's first argument.
    MethodCall { method: String },

    /// A call to the component at the given registry path.
    ComponentCall { path: ComponentPath },

    /// A read of the array leaf at the given registry path.
    GetAttr { path: ComponentPath },

    /// The terminal node marking the computation's result.
    Output,
}

/// An argument carried by a graph node.
#[derive(Clone, Debug, PartialEq)]
pub enum ArgValue {
    /// A reference to another node's result.
    Node(NodeId),

    /// A literal constant.
    Constant(ConstValue),

    /// A sequence of arguments, preserving the container kind it was built
    /// from.
    Sequence {
        kind:  ContainerKind,
        items: Vec<ArgValue>,
    },
}

impl Display for ArgValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node(id) => write!(f, "{id}"),
            Self::Constant(value) => write!(f, "{value}"),
            Self::Sequence { kind, items } => {
                let rendered = items.iter().map(ToString::to_string).join(", ");
                match kind {
                    ContainerKind::Tuple => write!(f, "({rendered})"),
                    ContainerKind::List => write!(f, "[{rendered}]"),
                    ContainerKind::Slice => write!(f, "slice({rendered})"),
                }
            }
        }
    }
}

/// A single node of the dataflow graph.
#[derive(Clone, Debug)]
pub struct GraphNode {
    /// The node's stable identifier.
    pub id: NodeId,

    /// The operation the node performs.
    pub op: Operation,

    /// Positional arguments to the operation.
    pub args: Vec<ArgValue>,

    /// Keyword arguments to the operation, in the order they were supplied.
    pub kwargs: Vec<(String, ArgValue)>,
}

impl Display for GraphNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let args = self
            .args
            .iter()
            .map(ToString::to_string)
            .chain(self.kwargs.iter().map(|(k, v)| format!("{k}={v}")))
            .join(", ");
        match &self.op {
            Operation::Placeholder { name } => write!(f, "{} = placeholder {name}", self.id),
            Operation::Call { target } => write!(f, "{} = call {target}({args})", self.id),
            Operation::MethodCall { method } => {
                write!(f, "{} = call-method {method}({args})", self.id)
            }
            Operation::ComponentCall { path } => {
                write!(f, "{} = call-component {path}({args})", self.id)
            }
            Operation::GetAttr { path } => write!(f, "{} = get-attr {path}", self.id),
            Operation::Output => write!(f, "{} = output({args})", self.id),
        }
    }
}

/// The dataflow graph for one trace.
#[derive(Clone, Debug)]
pub struct Graph {
    /// The nodes in program order: placeholders first, then operations in the
    /// order they were captured.
    nodes: Vec<GraphNode>,

    /// The number of leading placeholder nodes.
    placeholder_count: usize,

    /// Whether the terminal output node has been created.
    has_output: bool,

    /// The maximum number of nodes the graph may hold.
    node_limit: usize,

    /// The next identifier to mint.
    next_id: usize,
}

impl Graph {
    /// Creates a new, empty graph that can grow to at most `node_limit`
    /// nodes.
    #[must_use]
    pub fn new(node_limit: usize) -> Self {
        Self {
            nodes: Vec::new(),
            placeholder_count: 0,
            has_output: false,
            node_limit,
            next_id: 0,
        }
    }

    /// Creates a placeholder node for the captured input `name`, inserting it
    /// immediately after the last existing placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphNodeLimitExceeded`] if the graph is full.
    pub fn create_input(&mut self, name: impl Into<String>) -> Result<NodeId, Error> {
        let id = self.mint_id()?;
        self.nodes.insert(
            self.placeholder_count,
            GraphNode {
                id,
                op: Operation::Placeholder { name: name.into() },
                args: Vec::new(),
                kwargs: Vec::new(),
            },
        );
        self.placeholder_count += 1;

        Ok(id)
    }

    /// Appends a node performing `op` over `args` and `kwargs`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphNodeLimitExceeded`] if the graph is full.
    pub fn create_op(
        &mut self,
        op: Operation,
        args: Vec<ArgValue>,
        kwargs: Vec<(String, ArgValue)>,
    ) -> Result<NodeId, Error> {
        let id = self.mint_id()?;
        self.nodes.push(GraphNode {
            id,
            op,
            args,
            kwargs,
        });

        Ok(id)
    }

    /// Appends the terminal output node wrapping `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateOutput`] if an output node already exists,
    /// and [`Error::GraphNodeLimitExceeded`] if the graph is full.
    pub fn create_output(&mut self, value: NodeId) -> Result<NodeId, Error> {
        if self.has_output {
            return Err(Error::DuplicateOutput);
        }
        let id = self.create_op(Operation::Output, vec![ArgValue::Node(value)], Vec::new())?;
        self.has_output = true;

        Ok(id)
    }

    /// Counts the call nodes captured so far, of all three call kinds.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| {
                matches!(
                    node.op,
                    Operation::Call { .. }
                        | Operation::MethodCall { .. }
                        | Operation::ComponentCall { .. }
                )
            })
            .count()
    }

    /// Gets the number of nodes in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Checks whether the graph contains no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Gets the number of leading placeholder nodes.
    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        self.placeholder_count
    }

    /// Iterates over the nodes in program order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter()
    }

    /// Gets the node identified by `id`, if it exists.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    fn mint_id(&mut self) -> Result<NodeId, Error> {
        if self.nodes.len() >= self.node_limit {
            return Err(Error::GraphNodeLimitExceeded {
                limit: self.node_limit,
            });
        }
        let id = NodeId::new(self.next_id);
        self.next_id += 1;

        Ok(id)
    }
}

/// Renders the graph with one node per line, in program order.
impl Display for Graph {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.nodes.iter().map(ToString::to_string).join("\n"))
    }
}

#[cfg(test)]
mod test {
    use crate::{
        constant::DEFAULT_GRAPH_NODE_LIMIT,
        error::trace::Error,
        graph::{ArgValue, CallTarget, Graph, Operation},
        opcode::BinaryOp,
    };

    #[test]
    fn inserts_placeholders_before_operations() -> anyhow::Result<()> {
        let mut graph = Graph::new(DEFAULT_GRAPH_NODE_LIMIT);
        let x = graph.create_input("x_0")?;
        let sum = graph.create_op(
            Operation::Call {
                target: CallTarget::Binary(BinaryOp::Add),
            },
            vec![ArgValue::Node(x), ArgValue::Node(x)],
            vec![],
        )?;
        let y = graph.create_input("y_1")?;
        let out = graph.create_output(sum)?;

        let order: Vec<_> = graph.nodes().map(|node| node.id).collect();
        assert_eq!(order, vec![x, y, sum, out]);
        assert_eq!(graph.placeholder_count(), 2);

        Ok(())
    }

    #[test]
    fn refuses_a_second_output_node() -> anyhow::Result<()> {
        let mut graph = Graph::new(DEFAULT_GRAPH_NODE_LIMIT);
        let x = graph.create_input("x_0")?;
        graph.create_output(x)?;

        assert_eq!(graph.create_output(x), Err(Error::DuplicateOutput));

        Ok(())
    }

    #[test]
    fn counts_only_call_nodes() -> anyhow::Result<()> {
        let mut graph = Graph::new(DEFAULT_GRAPH_NODE_LIMIT);
        let x = graph.create_input("x_0")?;
        let a = graph.create_op(
            Operation::Call {
                target: CallTarget::Binary(BinaryOp::Mul),
            },
            vec![ArgValue::Node(x), ArgValue::Node(x)],
            vec![],
        )?;
        let b = graph.create_op(
            Operation::MethodCall {
                method: "scaled".into(),
            },
            vec![ArgValue::Node(a)],
            vec![],
        )?;
        graph.create_op(
            Operation::GetAttr {
                path: crate::host::ComponentPath::root("encoder_0").child("w"),
            },
            vec![],
            vec![],
        )?;
        graph.create_output(b)?;

        assert_eq!(graph.call_count(), 2);

        Ok(())
    }

    #[test]
    fn rejects_growth_past_the_node_limit() -> anyhow::Result<()> {
        let mut graph = Graph::new(2);
        graph.create_input("x_0")?;
        graph.create_input("y_1")?;

        assert_eq!(
            graph.create_input("z_2"),
            Err(Error::GraphNodeLimitExceeded { limit: 2 })
        );

        Ok(())
    }

    #[test]
    fn renders_nodes_one_per_line() -> anyhow::Result<()> {
        let mut graph = Graph::new(DEFAULT_GRAPH_NODE_LIMIT);
        let x = graph.create_input("x_0")?;
        let sum = graph.create_op(
            Operation::Call {
                target: CallTarget::Binary(BinaryOp::Add),
            },
            vec![
                ArgValue::Node(x),
                ArgValue::Constant(crate::host::ConstValue::Int(1)),
            ],
            vec![],
        )?;
        graph.create_output(sum)?;

        let rendered = graph.to_string();
        assert_eq!(
            rendered,
            "%0 = placeholder x_0\n%1 = call add(%0, 1)\n%2 = output(%1)"
        );

        Ok(())
    }
}
