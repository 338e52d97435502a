//! This module contains the interface to the downstream graph compiler, and a
//! recording implementation used when no real backend is attached.
//!
//! The tracer does not know how graphs become executable; it hands the
//! finished graph and the component registry across this boundary and gets
//! back a callable to bind into the rewritten frame. Compilation quality,
//! optimization and caching are entirely the collaborator's business.

use std::{cell::RefCell, fmt::Debug, rc::Rc};

use downcast_rs::{impl_downcast, Downcast};

use crate::{graph::Graph, host::FunctionValue, registry::ComponentRegistry};

/// A dynamically dispatched [`GraphCompiler`] instance.
pub type DynCompiler = Rc<dyn GraphCompiler>;

/// The interface to the backend that turns captured graphs into executable
/// callables.
///
/// The trait supports downcasting so that a client holding the shared handle
/// can recover its concrete compiler, for example to read accumulated state
/// out of it after a run.
pub trait GraphCompiler
where
    Self: Debug + Downcast,
{
    /// Compiles `graph`, resolving component references through `registry`,
    /// into a callable.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the graph cannot be compiled.
    fn compile(&self, graph: &Graph, registry: &ComponentRegistry)
        -> Result<Rc<FunctionValue>, String>;
}

impl_downcast!(GraphCompiler);

/// One compilation observed by a [`RecordingCompiler`].
#[derive(Clone, Debug)]
pub struct CompiledEntry {
    /// The graph that was handed over.
    pub graph: Graph,

    /// The registry root keys that accompanied it.
    pub registry_keys: Vec<String>,

    /// The callable that was minted for it.
    pub callable: Rc<FunctionValue>,
}

/// A compiler that performs no real compilation: it mints a fresh callable
/// per graph and records everything it was asked to compile.
///
/// This keeps the tracer usable and testable without a backend attached; the
/// recorded entries let a test inspect exactly what would have been compiled.
#[derive(Debug, Default)]
pub struct RecordingCompiler {
    compiled: RefCell<Vec<CompiledEntry>>,
}

impl RecordingCompiler {
    /// Creates a new compiler with nothing recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps `self` into an [`Rc`].
    #[must_use]
    pub fn in_rc(self) -> Rc<Self> {
        Rc::new(self)
    }

    /// Gets the number of graphs compiled so far.
    #[must_use]
    pub fn compiled_count(&self) -> usize {
        self.compiled.borrow().len()
    }

    /// Gets a copy of everything compiled so far, in compilation order.
    #[must_use]
    pub fn compiled(&self) -> Vec<CompiledEntry> {
        self.compiled.borrow().clone()
    }
}

impl GraphCompiler for RecordingCompiler {
    fn compile(
        &self,
        graph: &Graph,
        registry: &ComponentRegistry,
    ) -> Result<Rc<FunctionValue>, String> {
        let mut compiled = self.compiled.borrow_mut();
        let callable = FunctionValue::new(format!("compiled_graph_{}", compiled.len())).in_rc();
        compiled.push(CompiledEntry {
            graph: graph.clone(),
            registry_keys: registry.roots().map(|(key, _)| key.clone()).collect(),
            callable: Rc::clone(&callable),
        });

        Ok(callable)
    }
}
