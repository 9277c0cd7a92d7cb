//! # Skiff
//!
//! A core-guided weighted MaxSAT solver in the style of RC2 / OLL. Soft clauses are relaxed by
//! fresh literals and assumed to be satisfied, unsatisfiable cores returned by an incremental
//! SAT oracle are relaxed with lazily built incremental totalizers, and weights are handled via
//! stratification and weight splitting.
//!
//! ```
//! use rustsat::{clause, lit};
//! use skiff_core::{types::Formula, Optimizer, Options};
//!
//! let mut formula = Formula::new();
//! formula.add_hard(clause![lit![0], lit![1]]);
//! formula.add_soft(clause![!lit![0]], 2);
//! formula.add_soft(clause![!lit![1]], 3);
//!
//! let mut opt: Optimizer<rustsat_cadical::CaDiCaL<'static, 'static>> =
//!     Optimizer::from_formula(formula, Options::default()).unwrap();
//! let res = opt.optimize().unwrap();
//! assert_eq!(res.cost, 2);
//! ```

use rustsat::solvers::SolverResult;

pub mod options;
pub use options::{Blocking, EnumOptions, EnumScope, Limits, Options, Stratification};

pub mod types;
pub use types::{Formula, IdAllocator, OptimizationResult};

pub mod encodings;
pub use encodings::totalizer::{NetId, Semantics, TotDb};

pub mod stratification;
pub use stratification::{lexicographic_blocks, stratify, Stratum};

pub mod algs;
pub use algs::{Enumerate, Interrupter, Optimizer};

pub mod log;
pub use log::{LoggerConfig, StreamLogger};

pub(crate) mod termination;
pub use termination::{Error, Result, Termination};

/// Statistics of the optimizer
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Stats {
    /// The number of calls to the SAT oracle
    pub n_oracle_calls: usize,
    /// The number of cores extracted
    pub n_cores: usize,
    /// The number of solutions returned
    pub n_solutions: usize,
    /// The number of relaxation literals hardened
    pub n_hardened: usize,
    /// The number of stratification levels activated
    pub n_levels: usize,
    /// The number of at-most-one constraints detected among the soft clauses
    pub n_am1s: usize,
    /// The number of original hard clauses
    pub n_orig_clauses: usize,
    /// The number of soft clauses
    pub n_soft: usize,
}

/// Statistics of the totalizer encodings
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct EncodingStats {
    /// The number of clauses in the encoding
    pub n_clauses: usize,
    /// The number of variables in the encoding
    pub n_vars: u32,
    /// The number of networks built
    pub n_networks: usize,
}

/// A logger to attach to an optimizer
pub trait WriteSolverLog {
    /// Adds an oracle call to the log
    fn log_oracle_call(&mut self, result: SolverResult) -> anyhow::Result<()>;
    /// Adds an extracted core to the log
    fn log_core(&mut self, weight: usize, len: usize, red_len: usize) -> anyhow::Result<()>;
    /// Adds a detected at-most-one constraint to the log
    fn log_am1(&mut self, len: usize, weight: usize) -> anyhow::Result<()>;
    /// Adds a core exhaustion to the log
    fn log_core_exhaustion(&mut self, exhausted: usize, weight: usize) -> anyhow::Result<()>;
    /// Adds an increased lower bound on the cost to the log
    fn log_cost(&mut self, cost: usize) -> anyhow::Result<()>;
    /// Adds the activation of a stratification level to the log
    fn log_stratum(&mut self, weight: usize, n_lits: usize) -> anyhow::Result<()>;
    /// Adds hardened relaxation literals to the log
    fn log_hardening(&mut self, n_hardened: usize) -> anyhow::Result<()>;
    /// Adds a solution to the log
    fn log_solution(&mut self, cost: usize) -> anyhow::Result<()>;
    /// Adds a new routine starting to the log
    fn log_routine_start(&mut self, desc: &'static str) -> anyhow::Result<()>;
    /// Adds a new routine ending to the log
    fn log_routine_end(&mut self) -> anyhow::Result<()>;
    /// Adds end of solving to the log
    fn log_end_solve(&mut self) -> anyhow::Result<()>;
    /// Logs any string
    fn log_message(&mut self, msg: &str) -> anyhow::Result<()>;
}
