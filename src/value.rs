//! This module contains the symbolic value model: the closed set of value
//! shapes that can live on the tracer's operand stack and in its locals.
//!
//! Every symbolic value couples three things: a [`SupportState`] saying how
//! well the tracer understands the value's origin, the [`GuardSet`] that
//! justifies everything assumed about it so far, and the [`ValueData`]
//! describing its shape. Values are immutable once constructed; derived
//! values are built fresh, with their support and guards computed from the
//! inputs by [`SymbolicValue::propagate`].
//!
//! The propagation law is what makes the emitted guard set sound: because a
//! derived value's guards are always the union of the guards of everything
//! that flowed into it, validating the final guard set before reusing a
//! rewritten frame is equivalent to validating every intermediate assumption
//! the trace made.

use std::rc::Rc;

use crate::{
    graph::{ArgValue, NodeId},
    guard::{Guard, GuardSet},
    host::{ComponentPath, ConstValue, FunctionValue},
};

/// How well the tracer understands a value's origin.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SupportState {
    /// Nothing is known about the origin, as for an inline literal. Such a
    /// value may still flow into a capture; it specializes when a supported
    /// operation consumes it.
    Unknown,

    /// The origin is fully modeled and the value can anchor a capture.
    Supported,

    /// The origin is known to be untraceable. Poisons everything derived
    /// from it.
    Unsupported,
}

impl SupportState {
    /// Combines two support states.
    ///
    /// Any unsupported input poisons the result; otherwise a supported input
    /// dominates an unknown one.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        match (self, other) {
            (Self::Unsupported, _) | (_, Self::Unsupported) => Self::Unsupported,
            (Self::Supported, _) | (_, Self::Supported) => Self::Supported,
            (Self::Unknown, Self::Unknown) => Self::Unknown,
        }
    }
}

/// The kinds of sequence container the tracer models.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ContainerKind {
    Tuple,
    List,
    Slice,
}

impl ContainerKind {
    /// Gets the name of the container kind as used in messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tuple => "tuple",
            Self::List => "list",
            Self::Slice => "slice",
        }
    }
}

/// The shape of a symbolic value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValueData {
    /// A fully known scalar, string, boolean or none.
    Constant { value: ConstValue },

    /// An array-valued quantity, backed by exactly one graph node.
    Array { node: NodeId },

    /// A stateful component, named by its dotted path from the trace's root
    /// registry.
    Component { path: ComponentPath },

    /// A deferred attribute access on another value, resolved when it is
    /// eventually called.
    Attribute {
        base: Box<SymbolicValue>,
        name: String,
    },

    /// An ordered sequence of values.
    Container {
        kind:  ContainerKind,
        items: Vec<SymbolicValue>,
    },

    /// A mapping from constant keys to values, in insertion order.
    Mapping {
        entries: Vec<(ConstValue, SymbolicValue)>,
    },

    /// A whitelisted callable.
    Callable { function: Rc<FunctionValue> },
}

/// A value as the tracer sees it: a shape, the support of its origin, and the
/// guards that justify it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SymbolicValue {
    /// How well the value's origin is understood.
    pub support: SupportState,

    /// The conditions under which everything assumed about this value holds.
    pub guards: GuardSet,

    /// The shape of the value.
    pub data: ValueData,
}

impl SymbolicValue {
    /// Constructs a new symbolic value from its parts.
    #[must_use]
    pub fn new(support: SupportState, guards: GuardSet, data: ValueData) -> Self {
        Self {
            support,
            guards,
            data,
        }
    }

    /// Constructs a constant of unknown origin carrying no guards, as pushed
    /// by a load-constant instruction.
    #[must_use]
    pub fn constant(value: ConstValue) -> Self {
        Self::new(
            SupportState::Unknown,
            GuardSet::new(),
            ValueData::Constant { value },
        )
    }

    /// Constructs an array value backed by `node`.
    #[must_use]
    pub fn array(node: NodeId, support: SupportState, guards: GuardSet) -> Self {
        Self::new(support, guards, ValueData::Array { node })
    }

    /// Adds `guard` to the value's guard set.
    #[must_use]
    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guards.insert(guard);
        self
    }

    /// Combines the support states and unions the guard sets of `values`.
    ///
    /// This is the propagation law, invoked before constructing essentially
    /// every derived value. Combining no values yields an unknown support
    /// state and no guards.
    pub fn propagate<'a>(
        values: impl IntoIterator<Item = &'a SymbolicValue>,
    ) -> (SupportState, GuardSet) {
        let mut support = SupportState::Unknown;
        let mut guards = GuardSet::new();
        for value in values {
            support = support.combine(value.support);
            guards.merge(&value.guards);
        }

        (support, guards)
    }

    /// Gets the name of the value's kind as used in abort messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match &self.data {
            ValueData::Constant { .. } => "constant",
            ValueData::Array { .. } => "array",
            ValueData::Component { .. } => "component",
            ValueData::Attribute { .. } => "attribute",
            ValueData::Container { kind, .. } => kind.name(),
            ValueData::Mapping { .. } => "mapping",
            ValueData::Callable { .. } => "callable",
        }
    }

    /// Gets the constant this value holds, if it is one.
    #[must_use]
    pub fn as_constant(&self) -> Option<&ConstValue> {
        match &self.data {
            ValueData::Constant { value } => Some(value),
            _ => None,
        }
    }

    /// Gets the graph node backing this value, if it is an array.
    #[must_use]
    pub fn as_node(&self) -> Option<NodeId> {
        match &self.data {
            ValueData::Array { node } => Some(*node),
            _ => None,
        }
    }

    /// Lowers the value to a graph argument, or [`None`] for shapes that
    /// cannot appear as one.
    ///
    /// Arrays lower to node references, constants to themselves, and
    /// containers lower item-wise. Components, deferred attributes, mappings
    /// and callables have no graph-argument form.
    #[must_use]
    pub fn to_argument(&self) -> Option<ArgValue> {
        match &self.data {
            ValueData::Constant { value } => Some(ArgValue::Constant(value.clone())),
            ValueData::Array { node } => Some(ArgValue::Node(*node)),
            ValueData::Container { kind, items } => {
                let items = items
                    .iter()
                    .map(SymbolicValue::to_argument)
                    .collect::<Option<Vec<_>>>()?;
                Some(ArgValue::Sequence { kind: *kind, items })
            }
            ValueData::Component { .. }
            | ValueData::Attribute { .. }
            | ValueData::Mapping { .. }
            | ValueData::Callable { .. } => None,
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        graph::{ArgValue, NodeId},
        guard::{Guard, GuardRequirement, GuardSet, GuardSource},
        host::ConstValue,
        value::{ContainerKind, SupportState, SymbolicValue, ValueData},
    };

    fn guarded_array(node: usize, binding: &str) -> SymbolicValue {
        SymbolicValue::array(
            NodeId::new(node),
            SupportState::Supported,
            GuardSet::from(Guard::new(
                binding,
                GuardSource::Local,
                GuardRequirement::TypeMatch,
            )),
        )
    }

    #[test]
    fn unsupported_inputs_poison_derived_values() {
        let poisoned = SymbolicValue::new(
            SupportState::Unsupported,
            GuardSet::new(),
            ValueData::Constant {
                value: ConstValue::None,
            },
        );
        let healthy = guarded_array(0, "x");

        let (support, _) = SymbolicValue::propagate([&healthy, &poisoned]);
        assert_eq!(support, SupportState::Unsupported);
    }

    #[test]
    fn supported_inputs_dominate_unknown_ones() {
        let constant = SymbolicValue::constant(ConstValue::Int(2));
        let array = guarded_array(0, "x");

        let (support, _) = SymbolicValue::propagate([&array, &constant]);
        assert_eq!(support, SupportState::Supported);
    }

    #[test]
    fn propagating_nothing_yields_unknown_support() {
        let (support, guards) = SymbolicValue::propagate([]);
        assert_eq!(support, SupportState::Unknown);
        assert!(guards.is_empty());
    }

    #[test]
    fn propagation_unions_guards_from_all_inputs() {
        let x = guarded_array(0, "x");
        let y = guarded_array(1, "y");

        let (_, guards) = SymbolicValue::propagate([&x, &y, &x]);
        assert_eq!(guards.len(), 2);
        assert!(guards.contains(&Guard::new(
            "y",
            GuardSource::Local,
            GuardRequirement::TypeMatch
        )));
    }

    #[test]
    fn containers_lower_to_sequence_arguments_item_wise() {
        let value = SymbolicValue::new(
            SupportState::Supported,
            GuardSet::new(),
            ValueData::Container {
                kind:  ContainerKind::Tuple,
                items: vec![
                    guarded_array(3, "x"),
                    SymbolicValue::constant(ConstValue::Int(1)),
                ],
            },
        );

        let Some(ArgValue::Sequence { kind, items }) = value.to_argument() else {
            panic!("container did not lower to a sequence argument");
        };
        assert_eq!(kind, ContainerKind::Tuple);
        assert_eq!(
            items,
            vec![
                ArgValue::Node(NodeId::new(3)),
                ArgValue::Constant(ConstValue::Int(1))
            ]
        );
    }

    #[test]
    fn component_shapes_have_no_argument_form() {
        let value = SymbolicValue::new(
            SupportState::Supported,
            GuardSet::new(),
            ValueData::Component {
                path: crate::host::ComponentPath::root("encoder_0"),
            },
        );

        assert!(value.to_argument().is_none());
    }
}
