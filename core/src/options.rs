//! # Options
//!
//! This module contains all configuration options of the core-guided optimizer.

use std::fmt;

use crate::encodings::totalizer::Semantics;

/// Optimizer configuration options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Options {
    /// How soft clauses are scheduled into the active problem
    pub stratification: Stratification,
    /// Harden relaxation literals whose weight exceeds all remaining weight when moving to the
    /// next stratification level
    pub hardening: bool,
    /// Core trimming with the given maximum number of rounds
    pub core_trimming: Option<usize>,
    /// Core minimization
    pub core_minimization: bool,
    /// Core exhaustion
    pub core_exhaustion: bool,
    /// Detect groups of soft clauses of which at most one can be satisfied before the search
    pub adapt_am1: bool,
    /// The semantics of the totalizer encodings
    pub semantics: Semantics,
    /// Conflict limit for each oracle call during core minimization
    pub minimization_conflicts: u32,
    /// Conflict limit for each oracle call during core exhaustion
    pub exhaustion_conflicts: u32,
    /// Solution enumeration options
    pub enumeration: EnumOptions,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            stratification: Stratification::default(),
            hardening: true,
            core_trimming: None,
            core_minimization: false,
            core_exhaustion: false,
            adapt_am1: false,
            semantics: Semantics::default(),
            minimization_conflicts: 1000,
            exhaustion_conflicts: 50000,
            enumeration: EnumOptions::default(),
        }
    }
}

impl Options {
    pub fn set_enumeration(&mut self, enumeration: EnumOptions) {
        self.enumeration = enumeration;
    }

    /// Whether hardening can be applied under the current enumeration settings. Hardening only
    /// preserves solutions of optimal cost.
    pub(crate) fn hardening_sound(&self) -> bool {
        self.hardening && self.enumeration.scope == EnumScope::Optimal
    }
}

/// Strategies for moving soft clauses into the active problem
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Stratification {
    /// All soft clauses are assumed from the start
    Disabled,
    /// One weight stratum is added per level
    #[default]
    Progressive,
    /// One lexicographic block of strata is added per level
    Lexicographic,
}

impl fmt::Display for Stratification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stratification::Disabled => write!(f, "disabled"),
            Stratification::Progressive => write!(f, "progressive"),
            Stratification::Lexicographic => write!(f, "lexicographic"),
        }
    }
}

/// Enumeration options for the optimizer
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct EnumOptions {
    /// How found solutions are excluded
    pub blocking: Blocking,
    /// Which solutions to enumerate
    pub scope: EnumScope,
}

/// Types of blocking clauses between enumerated solutions
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Blocking {
    /// Block the assignment to the original variables
    #[default]
    Model,
    /// Block the set of falsified soft clauses and all its supersets
    Mcs,
    /// Block the set of satisfied soft clauses and all its supersets
    Mss,
}

impl fmt::Display for Blocking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Blocking::Model => write!(f, "model"),
            Blocking::Mcs => write!(f, "mcs"),
            Blocking::Mss => write!(f, "mss"),
        }
    }
}

/// Which solutions an enumeration yields
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum EnumScope {
    /// Only solutions of optimal cost
    #[default]
    Optimal,
    /// All solutions in order of non-decreasing cost
    All,
}

impl fmt::Display for EnumScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumScope::Optimal => write!(f, "optimal"),
            EnumScope::All => write!(f, "all"),
        }
    }
}

/// Limits for an optimization run
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct Limits {
    /// The maximum number of SAT oracle calls to make
    pub oracle_calls: Option<usize>,
}

impl Limits {
    /// No limits
    pub fn none() -> Limits {
        Limits { oracle_calls: None }
    }
}
