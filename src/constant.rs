//! This module contains constants that are needed throughout the codebase.

/// The default maximum number of instructions a single trace will execute
/// before giving up.
///
/// Frames are finite, but a conditional jump whose condition folds to a
/// constant can send the trace backwards forever. The limit turns such a
/// frame into an ordinary untraceable one instead of a hang.
pub const DEFAULT_TRACE_STEP_LIMIT: usize = 50_000;

/// The default maximum number of nodes that a captured graph can contain
/// before the trace gives up.
///
/// This bounds the memory held by a single capture and keeps pathological
/// frames from producing graphs too large to be worth compiling.
pub const DEFAULT_GRAPH_NODE_LIMIT: usize = 10_000;

/// The prefix for the global names under which compiled graph callables are
/// bound into a rewritten frame.
///
/// A process-wide counter is appended to guarantee that repeated captures in
/// the same global namespace never collide.
pub const COMPILED_NAME_PREFIX: &str = "__lifted_graph_";

/// The source name given to code objects produced by graph compilation.
///
/// Frames carrying this source name are already the output of a capture and
/// are never traced again.
pub const GENERATED_SOURCE_MARKER: &str = "<lifted>";
