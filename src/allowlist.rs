//! This module contains the allow-list collaborator: the tracer's source of
//! truth for which callables and component classes are safe to capture.
//!
//! The list is a pure identity lookup with no side effects. What belongs on
//! it is the host's policy; the tracer only ever asks membership questions,
//! when a global load finds a callable and when a component is called.

use std::collections::HashSet;

use uuid::Uuid;

use crate::host::{ComponentClass, FunctionValue};

/// The set of callables and component classes the tracer may capture calls
/// to, keyed by identity.
#[derive(Clone, Debug, Default)]
pub struct AllowList {
    functions: HashSet<Uuid>,
    component_classes: HashSet<Uuid>,
}

impl AllowList {
    /// Creates a new, empty allow-list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `function` to the list of allowed callables.
    #[must_use]
    pub fn with_callable(mut self, function: &FunctionValue) -> Self {
        self.functions.insert(function.id);
        self
    }

    /// Adds `class` to the list of allowed component classes.
    #[must_use]
    pub fn with_component_class(mut self, class: &ComponentClass) -> Self {
        self.component_classes.insert(class.id);
        self
    }

    /// Checks whether calls to `function` may be captured.
    #[must_use]
    pub fn allows_callable(&self, function: &FunctionValue) -> bool {
        self.functions.contains(&function.id)
    }

    /// Checks whether calls to components of `class` may be captured.
    #[must_use]
    pub fn allows_component_class(&self, class: &ComponentClass) -> bool {
        self.component_classes.contains(&class.id)
    }
}
