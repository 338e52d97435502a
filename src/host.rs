//! This module contains the host-side object model: the values that can be
//! observed in the binding tables of a paused frame.
//!
//! The tracer never executes host code, so these types carry only what the
//! trace needs to know about each object: its kind, its identity (for
//! allow-list membership and guard emission) and, for components, the named
//! children that attribute access can reach. Identity is a minted [`Uuid`]
//! rather than an address, which keeps identity stable across clones of the
//! describing structures.

use std::{collections::BTreeMap, fmt::Formatter, rc::Rc};

use itertools::Itertools;
use ordered_float::OrderedFloat;
use uuid::Uuid;

/// A constant as the host represents it.
///
/// Floats are wrapped in [`OrderedFloat`] so that constants are totally
/// ordered and hashable, which lets them key mappings and compare exactly.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ConstValue {
    None,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    Str(String),
    Tuple(Vec<ConstValue>),
}

impl ConstValue {
    /// Constructs a float constant from a plain [`f64`].
    #[must_use]
    pub fn float(value: f64) -> Self {
        Self::Float(OrderedFloat(value))
    }

    /// Constructs a string constant.
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    /// Evaluates the constant for truthiness under the host's rules: none,
    /// zero and emptiness are falsy, everything else is truthy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => f.0 != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Tuple(items) => !items.is_empty(),
        }
    }

    /// Gets the name of the constant's kind as used in messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Tuple(_) => "tuple",
        }
    }
}

impl std::fmt::Display for ConstValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{}", x.0),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Tuple(items) => {
                write!(f, "({})", items.iter().map(ToString::to_string).join(", "))
            }
        }
    }
}

/// A host array: the opaque bulk-data values whose operations the tracer
/// captures into the graph.
///
/// The tracer treats arrays as pure dataflow. Nothing about their contents is
/// inspected; only their identity and a human-readable label are carried.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ArrayValue {
    /// The identity of this array.
    pub id: Uuid,

    /// A human-readable description, used only in renderings.
    pub label: String,
}

impl ArrayValue {
    /// Constructs a new array value described by `label`, minting a fresh
    /// identity.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id:    Uuid::new_v4(),
            label: label.into(),
        }
    }

    /// Wraps the array in an [`Rc`] for cheap sharing.
    #[must_use]
    pub fn in_rc(self) -> Rc<Self> {
        Rc::new(self)
    }
}

/// The class of a component, checked against the allow-list when a component
/// is called.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ComponentClass {
    /// The identity of this class.
    pub id: Uuid,

    /// The class name as the host reports it.
    pub name: String,
}

impl ComponentClass {
    /// Constructs a new component class named `name`, minting a fresh
    /// identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id:   Uuid::new_v4(),
            name: name.into(),
        }
    }

    /// Wraps the class in an [`Rc`] for cheap sharing.
    #[must_use]
    pub fn in_rc(self) -> Rc<Self> {
        Rc::new(self)
    }
}

/// A named child reachable from a component by attribute access.
#[derive(Clone, Debug)]
pub enum ComponentChild {
    /// A nested sub-component.
    Component(Rc<Component>),

    /// An array leaf, such as a parameter of the component.
    Array(Rc<ArrayValue>),

    /// A plain constant attribute.
    Const(ConstValue),
}

/// A host component: a stateful callable object assembled from named
/// sub-components, array leaves and constant attributes.
#[derive(Clone, Debug)]
pub struct Component {
    /// The class this component is an instance of.
    pub class: Rc<ComponentClass>,

    /// The children reachable from this component by name.
    pub children: BTreeMap<String, ComponentChild>,
}

impl Component {
    /// Constructs a new component of the given `class` with no children.
    #[must_use]
    pub fn new(class: Rc<ComponentClass>) -> Self {
        Self {
            class,
            children: BTreeMap::new(),
        }
    }

    /// Adds the child `value` under `name`, replacing any existing child of
    /// that name.
    #[must_use]
    pub fn with_child(mut self, name: impl Into<String>, value: ComponentChild) -> Self {
        self.children.insert(name.into(), value);
        self
    }

    /// Gets the child named `name`, if one exists.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&ComponentChild> {
        self.children.get(name)
    }

    /// Wraps the component in an [`Rc`] for cheap sharing.
    #[must_use]
    pub fn in_rc(self) -> Rc<Self> {
        Rc::new(self)
    }
}

/// A host callable: a free function the tracer may capture calls to.
///
/// Callables can expose named members that are themselves callables, which is
/// how attribute access on a whitelisted namespace object resolves.
#[derive(Clone, Debug)]
pub struct FunctionValue {
    /// The identity of this callable.
    pub id: Uuid,

    /// The name the callable renders under in graphs.
    pub name: String,

    /// Named callable members reachable by attribute access.
    pub members: BTreeMap<String, Rc<FunctionValue>>,
}

impl FunctionValue {
    /// Constructs a new callable named `name`, minting a fresh identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id:      Uuid::new_v4(),
            name:    name.into(),
            members: BTreeMap::new(),
        }
    }

    /// Adds `member` as a named member of this callable.
    #[must_use]
    pub fn with_member(mut self, name: impl Into<String>, member: Rc<FunctionValue>) -> Self {
        self.members.insert(name.into(), member);
        self
    }

    /// Gets the member named `name`, if one exists.
    #[must_use]
    pub fn member(&self, name: &str) -> Option<&Rc<FunctionValue>> {
        self.members.get(name)
    }

    /// Wraps the callable in an [`Rc`] for cheap sharing.
    #[must_use]
    pub fn in_rc(self) -> Rc<Self> {
        Rc::new(self)
    }
}

/// Equality for callables is identity equality.
impl PartialEq for FunctionValue {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for FunctionValue {}

/// Any value that can appear in a frame's binding tables.
#[derive(Clone, Debug)]
pub enum HostValue {
    /// A bulk-data array.
    Array(Rc<ArrayValue>),

    /// A component instance.
    Component(Rc<Component>),

    /// A callable.
    Function(Rc<FunctionValue>),

    /// A plain constant.
    Const(ConstValue),

    /// A host object of a kind the tracer has no model for. The string names
    /// the host-side type and appears in abort messages.
    Opaque(String),
}

impl HostValue {
    /// Gets the name of the value's kind as used in messages.
    #[must_use]
    pub fn kind_name(&self) -> String {
        match self {
            Self::Array(_) => "array".into(),
            Self::Component(_) => "component".into(),
            Self::Function(_) => "callable".into(),
            Self::Const(c) => c.kind_name().into(),
            Self::Opaque(type_name) => type_name.clone(),
        }
    }
}

/// A dotted path from a registry root to a value nested within a component
/// tree, such as `encoder_1.block.weights`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ComponentPath {
    path: String,
}

impl ComponentPath {
    /// Constructs the path consisting of the single root segment `root`.
    pub fn root(root: impl Into<String>) -> Self {
        Self { path: root.into() }
    }

    /// Constructs the path that extends this one by the child segment `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        Self {
            path: format!("{}.{name}", self.path),
        }
    }

    /// Gets the segments of the path in root-to-leaf order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('.')
    }

    /// Gets the path as the dotted string it renders as.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.path
    }
}

impl std::fmt::Display for ComponentPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}
