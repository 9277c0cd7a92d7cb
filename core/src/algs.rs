//! # Core-Guided Optimizer
//!
//! The optimizer kernel: loading a formula into the oracle, wrapping oracle calls with logging,
//! limits and interrupt detection, and enumerating solutions. The OLL search loop itself lives
//! in the `coreguided` submodule.

use std::{
    ops::Not,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::Context;
use rustsat::{
    clause,
    encodings::CollectClauses,
    instances::ManageVars,
    solvers::{LimitConflicts, Propagate, SolveIncremental, SolveStats, SolverResult},
    types::{Assignment, Clause, Lit, TernaryVal},
};

use crate::{
    encodings::totalizer::TotDb,
    options::{Blocking, EnumScope},
    stratification::Stratifier,
    termination::{Error, Result, Termination},
    types::{clause_from_ipasir, Formula, IdAllocator, OptimizationResult, SoftClause},
    EncodingStats, Limits, Options, Stats, WriteSolverLog,
};

mod am1;
mod coreguided;
use coreguided::Reformulation;

/// Handle to interrupt a running optimizer from another thread
pub struct Interrupter {
    /// Termination flag of the optimizer
    term_flag: Arc<AtomicBool>,
    /// The terminator of the underlying SAT oracle
    #[cfg(feature = "interrupt-oracle")]
    oracle_interrupter: Box<dyn rustsat::solvers::InterruptSolver + Send>,
}

#[cfg(feature = "interrupt-oracle")]
impl Interrupter {
    /// Interrupts the optimizer asynchronously
    pub fn interrupt(&mut self) {
        self.term_flag.store(true, Ordering::Relaxed);
        self.oracle_interrupter.interrupt();
    }
}

#[cfg(not(feature = "interrupt-oracle"))]
impl Interrupter {
    /// Interrupts the optimizer asynchronously
    pub fn interrupt(&mut self) {
        self.term_flag.store(true, Ordering::Relaxed);
    }
}

/// A soft clause after relaxation
#[derive(Debug, Clone)]
struct RelaxedSoft {
    relax: Lit,
    body: Clause,
    weight: usize,
}

/// Where the optimizer is between two solutions
#[derive(Debug, Clone)]
enum State {
    /// Nothing was solved yet
    Fresh,
    /// A solution was returned, the full oracle assignment is kept for blocking
    Solved(Assignment),
    /// Clauses were added after a solution, the search continues without blocking
    Resumed,
    /// All solutions were returned
    Exhausted,
    /// The hard clauses are unsatisfiable
    Unsat,
    /// An error stopped the optimizer
    Aborted,
}

impl State {
    /// The state after clauses were added to the formula
    fn extended(self) -> State {
        match self {
            State::Solved(_) => State::Resumed,
            other => other,
        }
    }
}

/// Core-guided weighted MaxSAT optimizer
///
/// # Generics
///
/// - `O`: the SAT solver oracle
pub struct Optimizer<O> {
    /// The SAT solver backend
    oracle: O,
    /// Issues fresh variables above the formula
    ids: IdAllocator,
    /// The relaxed soft clauses
    softs: Vec<RelaxedSoft>,
    /// The weight of empty soft clauses
    offset: usize,
    /// The totalizers built over cores
    tot_db: TotDb,
    /// The active literals with their residual weights
    reform: Reformulation,
    /// Soft literals not yet part of the active problem
    stratifier: Stratifier,
    /// The lower bound derived from cores
    cost: usize,
    state: State,
    /// Configuration options
    opts: Options,
    /// Running statistics
    stats: Stats,
    /// Limits for the run
    lims: Limits,
    /// Logger to log with
    logger: Option<Box<dyn WriteSolverLog>>,
    /// Termination flag
    term_flag: Arc<AtomicBool>,
}

impl<O> Optimizer<O>
where
    O: SolveIncremental + SolveStats + LimitConflicts + Propagate,
{
    /// Loads a formula into an oracle. Every non-empty soft clause is extended with a fresh
    /// relaxation literal and added as a hard clause.
    pub fn new(mut oracle: O, formula: Formula, opts: Options) -> Result<Self> {
        formula.validate()?;
        let ids = IdAllocator::new(formula.max_var());
        let stats = Stats {
            n_orig_clauses: formula.n_hard(),
            n_soft: formula.n_soft(),
            ..Default::default()
        };
        let (hard, soft) = formula.into_parts();
        oracle.extend_clauses(hard)?;

        let mut opt = Optimizer {
            oracle,
            ids,
            softs: Vec::with_capacity(soft.len()),
            offset: 0,
            tot_db: TotDb::new(opts.semantics),
            reform: Reformulation::default(),
            stratifier: Stratifier::new(std::iter::empty::<(Lit, usize)>(), opts.stratification),
            cost: 0,
            state: State::Fresh,
            opts,
            stats,
            lims: Limits::none(),
            logger: None,
            term_flag: Arc::new(AtomicBool::new(false)),
        };
        for SoftClause { clause, weight } in soft {
            opt.relax_soft(clause, weight)?;
        }
        if let Some(max_var) = opt.ids.max_var() {
            opt.oracle.reserve(max_var)?;
        }
        Ok(opt)
    }

    /// Adds a hard clause over the original variables. After a solution was returned, the next
    /// call to [`Optimizer::optimize`] continues the search under the new clause instead of
    /// blocking that solution.
    ///
    /// Clauses cannot be added once relaxation literals were hardened, disable
    /// [`Options::hardening`] to add clauses between solutions.
    pub fn add_hard(&mut self, clause: Clause) -> Result<()> {
        self.check_extension(&clause)?;
        if clause.is_empty() {
            return Err(Error::MalformedFormula(String::from("hard clause is empty")));
        }
        let state = std::mem::replace(&mut self.state, State::Aborted);
        self.add_clause(clause)?;
        self.stats.n_orig_clauses += 1;
        self.state = state.extended();
        Ok(())
    }

    /// Adds a soft clause over the original variables, see [`Optimizer::add_hard`]
    pub fn add_soft(&mut self, clause: Clause, weight: usize) -> Result<()> {
        self.check_extension(&clause)?;
        if weight == 0 {
            return Err(Error::MalformedFormula(String::from(
                "soft clause has weight zero",
            )));
        }
        let state = std::mem::replace(&mut self.state, State::Aborted);
        self.relax_soft(clause, weight)?;
        self.stats.n_soft += 1;
        self.state = state.extended();
        Ok(())
    }

    /// Adds a hard clause given as IPASIR literals
    pub fn add_hard_ipasir(&mut self, lits: &[i32]) -> Result<()> {
        self.add_hard(clause_from_ipasir(lits)?)
    }

    /// Adds a soft clause given as IPASIR literals
    pub fn add_soft_ipasir(&mut self, lits: &[i32], weight: usize) -> Result<()> {
        self.add_soft(clause_from_ipasir(lits)?, weight)
    }

    fn check_extension(&self, clause: &Clause) -> Result<()> {
        if matches!(self.state, State::Aborted) {
            return Err(Error::Aborted);
        }
        if self.stats.n_hardened > 0 {
            return Err(Error::IncrementAfterHardening);
        }
        if let Some(lit) = clause.iter().find(|l| !self.ids.is_orig(l.var())) {
            return Err(Error::MalformedFormula(format!(
                "variable {} is not part of the formula",
                lit.var()
            )));
        }
        Ok(())
    }

    /// Relaxes a soft clause and hands its relaxation literal to the stratifier. Empty soft
    /// clauses only add to the offset.
    fn relax_soft(&mut self, clause: Clause, weight: usize) -> Result<()> {
        if clause.is_empty() {
            self.offset += weight;
            return Ok(());
        }
        let relax = self.ids.try_new_lit()?;
        let mut relaxed = clause.clone();
        relaxed.add(relax);
        self.add_clause(relaxed)?;
        if self.opts.enumeration.blocking != Blocking::Model {
            // relaxation literal is true exactly if the clause is falsified
            for &l in clause.iter() {
                self.add_clause(clause![!l, !relax])?;
            }
        }
        self.stratifier.defer(relax, weight);
        self.softs.push(RelaxedSoft {
            relax,
            body: clause,
            weight,
        });
        Ok(())
    }

    /// Computes an optimal solution. On an optimizer that already returned solutions, this
    /// returns the next solution of the enumeration or [`Error::Exhausted`].
    pub fn optimize(&mut self) -> Result<OptimizationResult> {
        self.next_solution()?.ok_or(Error::Exhausted)
    }

    /// Lazily enumerates solutions as configured by [`Options::enumeration`]
    pub fn enumerate(&mut self) -> Enumerate<'_, O> {
        Enumerate {
            opt: self,
            done: false,
        }
    }

    fn next_solution(&mut self) -> Result<Option<OptimizationResult>> {
        let res = self.step();
        if let Some(logger) = &mut self.logger {
            logger.log_end_solve().context("logger failed")?;
        }
        res
    }

    fn step(&mut self) -> Result<Option<OptimizationResult>> {
        // any error below leaves the optimizer aborted
        match std::mem::replace(&mut self.state, State::Aborted) {
            State::Aborted => return Err(Error::Aborted),
            State::Unsat => {
                self.state = State::Unsat;
                return Err(Error::Unsatisfiable);
            }
            State::Exhausted => {
                self.state = State::Exhausted;
                return Ok(None);
            }
            State::Fresh => {
                if self.opts.adapt_am1 {
                    self.adapt_am1()?;
                }
                self.activate_level()?;
                if !self.search()? {
                    self.state = State::Unsat;
                    return Err(Error::Unsatisfiable);
                }
            }
            State::Resumed => {
                if !self.search()? {
                    self.state = State::Unsat;
                    return Err(Error::Unsatisfiable);
                }
            }
            State::Solved(sol) => {
                if !self.block(&sol)? || !self.next_enumerated()? {
                    self.state = State::Exhausted;
                    return Ok(None);
                }
            }
        }
        self.yield_solution().map(Some)
    }

    /// Runs OLL and activates stratification levels until all soft literals are active and the
    /// assumptions are satisfiable. Returns `false` if the hard clauses are unsatisfiable.
    fn search(&mut self) -> Result<bool> {
        loop {
            if !self.oll()? {
                return Ok(false);
            }
            if self.stratifier.is_done() {
                return Ok(true);
            }
            self.harden()?;
            self.activate_level()?;
        }
    }

    /// Finds the next solution after the last one was blocked
    fn next_enumerated(&mut self) -> Result<bool> {
        match self.opts.enumeration.scope {
            EnumScope::All => self.search(),
            EnumScope::Optimal => {
                let assumps = self.reform.assumps();
                match self.solve_assumps(&assumps)? {
                    SolverResult::Sat => Ok(true),
                    SolverResult::Unsat => Ok(false),
                    SolverResult::Interrupted => Err(Termination::Interrupted.into()),
                }
            }
        }
    }

    /// Adds the blocking clause for a solution. Returns `false` if the clause is empty, i.e.,
    /// no other solution can exist.
    fn block(&mut self, sol: &Assignment) -> Result<bool> {
        let clause: Clause = match self.opts.enumeration.blocking {
            Blocking::Model => match self.ids.max_orig_var() {
                Some(max_var) => sol.clone().truncate(max_var).into_iter().map(Lit::not).collect(),
                None => Clause::new(),
            },
            // one of the violated clauses must become satisfied
            Blocking::Mcs => self
                .softs
                .iter()
                .filter(|sc| sol.lit_value(sc.relax) == TernaryVal::True)
                .map(|sc| !sc.relax)
                .collect(),
            // one of the satisfied clauses must become violated
            Blocking::Mss => self
                .softs
                .iter()
                .filter(|sc| sol.lit_value(sc.relax) != TernaryVal::True)
                .map(|sc| sc.relax)
                .collect(),
        };
        if clause.is_empty() {
            return Ok(false);
        }
        self.add_clause(clause)?;
        Ok(true)
    }

    /// Gets the solution from the oracle and records it for blocking
    fn yield_solution(&mut self) -> Result<OptimizationResult> {
        let sol = match self.ids.max_var() {
            Some(max_var) => self.oracle.solution(max_var)?,
            None => Assignment::default(),
        };
        debug_assert_eq!(self.soft_cost(&sol), self.cost);
        let model = match self.ids.max_orig_var() {
            Some(max_var) => sol.clone().truncate(max_var),
            None => Assignment::default(),
        };
        let cost = self.cost + self.offset;
        self.stats.n_solutions += 1;
        self.log_solution(cost)?;
        self.state = State::Solved(sol);
        Ok(OptimizationResult { cost, model })
    }

    /// The cost of the non-empty soft clauses under an assignment
    fn soft_cost(&self, sol: &Assignment) -> usize {
        self.softs
            .iter()
            .filter(|sc| {
                !sc.body
                    .iter()
                    .any(|&l| sol.lit_value(l) == TernaryVal::True)
            })
            .map(|sc| sc.weight)
            .sum()
    }

    /// Wrapper around the oracle with call logging and interrupt detection
    fn solve_assumps(&mut self, assumps: &[Lit]) -> Result<SolverResult> {
        self.log_routine_start("oracle call")?;
        let res = self.oracle.solve_assumps(assumps)?;
        self.log_routine_end()?;
        self.check_termination()?;
        self.log_oracle_call(res)?;
        Ok(res)
    }

    fn add_clause(&mut self, clause: Clause) -> Result<()> {
        CollectClauses::add_clause(&mut self.oracle, clause)?;
        Ok(())
    }
}

impl<O> Optimizer<O>
where
    O: SolveIncremental + SolveStats + LimitConflicts + Propagate + Default,
{
    /// Loads a formula into a default-initialized oracle
    pub fn from_formula(formula: Formula, opts: Options) -> Result<Self> {
        Self::new(O::default(), formula, opts)
    }
}

#[cfg(feature = "interrupt-oracle")]
impl<O> Optimizer<O>
where
    O: rustsat::solvers::Interrupt,
{
    /// Gets an interrupter to the optimizer
    pub fn interrupter(&mut self) -> Interrupter {
        Interrupter {
            term_flag: self.term_flag.clone(),
            oracle_interrupter: Box::new(self.oracle.interrupter()),
        }
    }
}

#[cfg(not(feature = "interrupt-oracle"))]
impl<O> Optimizer<O> {
    /// Gets an interrupter to the optimizer
    pub fn interrupter(&mut self) -> Interrupter {
        Interrupter {
            term_flag: self.term_flag.clone(),
        }
    }
}

impl<O> Optimizer<O> {
    /// Attaches a logger to the optimizer
    pub fn attach_logger<L: WriteSolverLog + 'static>(&mut self, logger: L) {
        self.logger = Some(Box::new(logger));
    }

    /// Detaches a logger from the optimizer
    pub fn detach_logger(&mut self) -> Option<Box<dyn WriteSolverLog>> {
        self.logger.take()
    }

    /// Sets the limits for the remaining run
    pub fn set_limits(&mut self, limits: Limits) {
        self.lims = limits;
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn encoding_stats(&self) -> EncodingStats {
        self.tot_db.stats()
    }

    /// The current lower bound on the optimal cost. After a solution was returned, this is the
    /// cost of that solution.
    pub fn cost(&self) -> usize {
        self.cost + self.offset
    }

    /// Gets a reference to the oracle
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Checks the termination flag and terminates if appropriate
    fn check_termination(&self) -> Result<()> {
        if self.term_flag.load(Ordering::Relaxed) {
            return Err(Termination::Interrupted.into());
        }
        Ok(())
    }

    /// Logs an oracle call. Can return a termination if the oracle call limit is reached.
    fn log_oracle_call(&mut self, result: SolverResult) -> Result<()> {
        self.stats.n_oracle_calls += 1;
        // Dispatch to logger
        if let Some(logger) = &mut self.logger {
            logger.log_oracle_call(result).context("logger failed")?;
        }
        // Update limit and check termination
        if let Some(oracle_calls) = &mut self.lims.oracle_calls {
            *oracle_calls = oracle_calls.saturating_sub(1);
            if *oracle_calls == 0 {
                return Err(Termination::OracleCallsLimit.into());
            }
        }
        Ok(())
    }

    fn log_core(&mut self, weight: usize, len: usize, red_len: usize) -> Result<()> {
        if let Some(logger) = &mut self.logger {
            logger
                .log_core(weight, len, red_len)
                .context("logger failed")?;
        }
        Ok(())
    }

    fn log_am1(&mut self, len: usize, weight: usize) -> Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.log_am1(len, weight).context("logger failed")?;
        }
        Ok(())
    }

    fn log_core_exhaustion(&mut self, exhausted: usize, weight: usize) -> Result<()> {
        if let Some(logger) = &mut self.logger {
            logger
                .log_core_exhaustion(exhausted, weight)
                .context("logger failed")?;
        }
        Ok(())
    }

    fn log_cost(&mut self) -> Result<()> {
        let cost = self.cost();
        if let Some(logger) = &mut self.logger {
            logger.log_cost(cost).context("logger failed")?;
        }
        Ok(())
    }

    fn log_stratum(&mut self, weight: usize, n_lits: usize) -> Result<()> {
        if let Some(logger) = &mut self.logger {
            logger
                .log_stratum(weight, n_lits)
                .context("logger failed")?;
        }
        Ok(())
    }

    fn log_hardening(&mut self, n_hardened: usize) -> Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.log_hardening(n_hardened).context("logger failed")?;
        }
        Ok(())
    }

    fn log_solution(&mut self, cost: usize) -> Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.log_solution(cost).context("logger failed")?;
        }
        Ok(())
    }

    /// Logs a routine start
    fn log_routine_start(&mut self, desc: &'static str) -> anyhow::Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.log_routine_start(desc).context("logger failed")?;
        }
        Ok(())
    }

    /// Logs a routine end
    fn log_routine_end(&mut self) -> anyhow::Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.log_routine_end().context("logger failed")?;
        }
        Ok(())
    }
}

/// Iterator over the solutions of an [`Optimizer`], see [`Optimizer::enumerate`]. Stops after
/// the last solution or after the first error.
pub struct Enumerate<'opt, O> {
    opt: &'opt mut Optimizer<O>,
    done: bool,
}

impl<O> Iterator for Enumerate<'_, O>
where
    O: SolveIncremental + SolveStats + LimitConflicts + Propagate,
{
    type Item = Result<OptimizationResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.opt.next_solution() {
            Ok(Some(res)) => Some(Ok(res)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<O> std::iter::FusedIterator for Enumerate<'_, O> where
    O: SolveIncremental + SolveStats + LimitConflicts + Propagate
{
}
