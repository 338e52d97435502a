//! This module contains the per-trace registry of components encountered
//! while tracing.
//!
//! When the tracer wraps a component binding it registers the component under
//! a minted root key. Attribute access then extends paths downward, and every
//! path a captured node refers to resolves here through an explicit,
//! iterative child-table walk. The registry is owned by exactly one trace and
//! is handed to the compiler alongside the finished graph, so the compiled
//! callable can reach the same components the trace saw.

use std::{collections::BTreeMap, rc::Rc};

use crate::{
    error::trace::Error,
    host::{Component, ComponentChild, ComponentPath, ConstValue},
};

/// A value reached by resolving a path against the registry.
#[derive(Clone, Debug)]
pub enum Resolved {
    /// A component, possibly nested below the root it was registered under.
    Component(Rc<Component>),

    /// An array leaf within a component tree.
    Array(Rc<crate::host::ArrayValue>),

    /// A constant attribute within a component tree.
    Const(ConstValue),
}

/// The registry of components captured by one trace, keyed by minted root
/// names.
#[derive(Clone, Debug, Default)]
pub struct ComponentRegistry {
    roots: BTreeMap<String, Rc<Component>>,
}

impl ComponentRegistry {
    /// Creates a new, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `component` under the minted root key `key` and returns the
    /// path naming it.
    pub fn register(&mut self, key: impl Into<String>, component: Rc<Component>) -> ComponentPath {
        let key = key.into();
        let path = ComponentPath::root(&key);
        self.roots.insert(key, component);

        path
    }

    /// Gets the root component registered under `key`, if one exists.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Rc<Component>> {
        self.roots.get(key)
    }

    /// Gets the number of registered roots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Checks whether no roots have been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Iterates over the registered roots in key order.
    pub fn roots(&self) -> impl Iterator<Item = (&String, &Rc<Component>)> {
        self.roots.iter()
    }

    /// Resolves `path` by looking its first segment up in the root table and
    /// then walking child tables segment by segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownComponentPath`] when the root is not
    /// registered, a segment names a missing child, or the path tries to
    /// descend below a leaf.
    pub fn resolve(&self, path: &ComponentPath) -> Result<Resolved, Error> {
        let unknown = || Error::UnknownComponentPath {
            path: path.to_string(),
        };

        let mut segments = path.segments();
        let root = segments.next().ok_or_else(unknown)?;
        let mut current = Resolved::Component(Rc::clone(self.roots.get(root).ok_or_else(unknown)?));

        for segment in segments {
            let Resolved::Component(component) = current else {
                // Paths cannot descend below an array or constant leaf.
                return Err(unknown());
            };
            current = match component.child(segment).ok_or_else(unknown)? {
                ComponentChild::Component(child) => Resolved::Component(Rc::clone(child)),
                ComponentChild::Array(leaf) => Resolved::Array(Rc::clone(leaf)),
                ComponentChild::Const(value) => Resolved::Const(value.clone()),
            };
        }

        Ok(current)
    }
}
