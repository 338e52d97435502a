//! This module contains the guard model: the conditions under which a
//! rewritten frame remains a faithful stand-in for the original.
//!
//! Every symbolic value remembers the guards that justify its shape. When a
//! trace completes, the guards of the returned value and of every branch
//! taken along the way are emitted alongside the rewritten code; the host
//! re-checks them on later entries to the frame and falls back to the
//! original code when any fails.

use std::{collections::BTreeSet, fmt::Formatter};

use itertools::Itertools;
use serde::Serialize;

/// The binding table in which a guarded name lives.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum GuardSource {
    /// The frame's local binding table.
    Local,

    /// The frame's global binding table.
    Global,
}

impl std::fmt::Display for GuardSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Global => write!(f, "global"),
        }
    }
}

/// The check a guard imposes on its binding.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum GuardRequirement {
    /// The binding must hold a value of the same concrete type as it did when
    /// the trace was captured.
    TypeMatch,

    /// The binding must hold a value equal to the one seen when the trace was
    /// captured.
    ExactValueMatch,

    /// The binding must hold the very same object it did when the trace was
    /// captured.
    IdentityMatch,
}

impl std::fmt::Display for GuardRequirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TypeMatch => write!(f, "type-match"),
            Self::ExactValueMatch => write!(f, "exact-value-match"),
            Self::IdentityMatch => write!(f, "identity-match"),
        }
    }
}

/// A single validity condition on a rewritten frame: the named binding in the
/// named table must satisfy the requirement.
///
/// Guards are pure data. Two guards are the same guard exactly when their
/// three fields agree, so accumulating them in a set deduplicates the
/// conditions emitted for a frame.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Guard {
    /// The name of the guarded binding.
    pub binding: String,

    /// The table the binding lives in.
    pub source: GuardSource,

    /// The check imposed on the binding.
    pub requirement: GuardRequirement,
}

impl Guard {
    /// Constructs a new guard on `binding` in `source` imposing
    /// `requirement`.
    pub fn new(
        binding: impl Into<String>,
        source: GuardSource,
        requirement: GuardRequirement,
    ) -> Self {
        Self {
            binding: binding.into(),
            source,
            requirement,
        }
    }
}

impl std::fmt::Display for Guard {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} on {} `{}`",
            self.requirement, self.source, self.binding
        )
    }
}

/// A deduplicated set of guards in a deterministic order.
///
/// The order is the derived order on [`Guard`] (binding name first), so the
/// emitted conditions for a frame do not depend on the order in which the
/// trace discovered them.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct GuardSet {
    guards: BTreeSet<Guard>,
}

impl GuardSet {
    /// Creates a new, empty set of guards.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `guard` to the set.
    pub fn insert(&mut self, guard: Guard) {
        self.guards.insert(guard);
    }

    /// Adds every guard in `other` to the set.
    pub fn merge(&mut self, other: &GuardSet) {
        for guard in &other.guards {
            self.guards.insert(guard.clone());
        }
    }

    /// Checks whether `guard` is in the set.
    #[must_use]
    pub fn contains(&self, guard: &Guard) -> bool {
        self.guards.contains(guard)
    }

    /// Gets the number of guards in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    /// Checks if the set contains no guards.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Iterates over the guards in their deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = &Guard> {
        self.guards.iter()
    }
}

impl From<Guard> for GuardSet {
    fn from(value: Guard) -> Self {
        let mut guards = Self::new();
        guards.insert(value);
        guards
    }
}

impl FromIterator<Guard> for GuardSet {
    fn from_iter<T: IntoIterator<Item = Guard>>(iter: T) -> Self {
        Self {
            guards: iter.into_iter().collect(),
        }
    }
}

impl std::fmt::Display for GuardSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.guards.iter().map(ToString::to_string).join("; ")
        )
    }
}
