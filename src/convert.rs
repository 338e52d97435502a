//! This module contains the frame capture orchestrator: the boundary between
//! the host interpreter and the tracer.
//!
//! The orchestrator's contract is that it never fails. A frame either traces
//! successfully, in which case its code object has been rewritten and the
//! guards are reported, or anything at all goes wrong, in which case the
//! original code is handed back with an empty guard set and the host runs it
//! unmodified. Deliberate aborts are counted quietly per construct; invariant
//! violations are logged loudly with the instruction listing and counted
//! separately, but they degrade the same way.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, error};

use crate::{
    allowlist::AllowList,
    compiler::DynCompiler,
    constant::GENERATED_SOURCE_MARKER,
    frame::{CodeObject, Frame},
    guard::GuardSet,
    tracer::{Config, Tracer},
};

/// The per-frame result: the code to install and the guards that justify it.
#[derive(Clone, Debug)]
pub struct GuardedCode {
    /// The code object for the frame: rewritten on a successful capture, the
    /// original otherwise.
    pub code: CodeObject,

    /// The conditions under which `code` stands in for the original. Empty
    /// exactly when the code is unmodified.
    pub guards: GuardSet,
}

/// Counters accumulated across every frame offered to one converter.
///
/// The aggregate lives for the converter's lifetime and is never reset;
/// readers see running totals since construction.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct TraceStats {
    /// How many frames were offered.
    pub frames_total: usize,

    /// How many frames were captured and rewritten.
    pub frames_ok: usize,

    /// How many call nodes were captured across successful frames.
    pub calls_captured: usize,

    /// The estimated fusion opportunities across successful frames.
    pub fusions_possible: usize,

    /// Deliberate aborts, counted per construct tag.
    pub unsupported: BTreeMap<String, usize>,

    /// Invariant violations observed at the boundary.
    pub trace_errors: usize,
}

/// The orchestrator that offers paused frames to the tracer and absorbs
/// every failure.
#[derive(Debug)]
pub struct FrameConverter {
    /// The allow-list consulted by every trace.
    allowlist: AllowList,

    /// The backend handed to every trace.
    compiler: DynCompiler,

    /// The resource ceilings handed to every trace.
    config: Config,

    /// The running counters.
    stats: TraceStats,
}

impl FrameConverter {
    /// Creates a converter that traces against `allowlist` and compiles
    /// through `compiler`, with the default resource ceilings.
    pub fn new(allowlist: AllowList, compiler: DynCompiler) -> Self {
        Self {
            allowlist,
            compiler,
            config: Config::default(),
            stats: TraceStats::default(),
        }
    }

    /// Replaces the resource ceilings handed to each trace.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Offers one paused frame for capture.
    ///
    /// On a successful trace the frame's code object is rewritten in place
    /// and returned with its guards. On any failure the frame is untouched
    /// and the original code comes back with an empty guard set. Frames
    /// whose code was generated by a previous capture are skipped outright,
    /// so compiled callables are never re-traced.
    pub fn convert_frame(&mut self, frame: &mut Frame) -> GuardedCode {
        self.stats.frames_total += 1;

        if frame.code.metadata.source_name == GENERATED_SOURCE_MARKER {
            debug!("skipping generated code");
            return GuardedCode {
                code:   frame.code.clone(),
                guards: GuardSet::new(),
            };
        }

        let original = frame.code.clone();
        let result = Tracer::new(
            frame,
            &self.allowlist,
            self.compiler.clone(),
            self.config.clone(),
        )
        .and_then(Tracer::run);

        match result {
            Ok(outcome) => {
                self.stats.frames_ok += 1;
                self.stats.calls_captured += outcome.calls_captured;
                self.stats.fusions_possible += outcome.fusions_possible;
                debug!(
                    calls = outcome.calls_captured,
                    guards = outcome.guards.len(),
                    "captured frame"
                );

                GuardedCode {
                    code:   outcome.code,
                    guards: outcome.guards,
                }
            }
            Err(failure) => {
                if failure.payload.is_deliberate_abort() {
                    if let Some(tag) = failure.payload.abort_tag() {
                        *self.stats.unsupported.entry(tag).or_insert(0) += 1;
                    }
                    debug!(%failure, "trace aborted");
                } else {
                    self.stats.trace_errors += 1;
                    error!(%failure, listing = %original.instructions, "trace failed");
                }

                GuardedCode {
                    code:   original,
                    guards: GuardSet::new(),
                }
            }
        }
    }

    /// Gets the counters accumulated so far.
    pub fn stats(&self) -> &TraceStats {
        &self.stats
    }
}
