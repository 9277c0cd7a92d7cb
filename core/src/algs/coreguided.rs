//! # OLL Core-Guided Search
//!
//! The reformulated objective and the OLL loop. Cores are relaxed by totalizers whose outputs
//! become new objective literals, weights are split by the minimum core weight, and cores can
//! be trimmed, minimized and exhausted before they are relaxed.

use std::cmp::Reverse;

use itertools::Itertools;
use rustsat::{
    clause,
    solvers::{LimitConflicts, Propagate, SolveIncremental, SolveStats, SolverResult},
    types::{Lit, RsHashMap, RsHashSet},
};

use super::Optimizer;
use crate::{
    encodings::totalizer::NetId,
    termination::{ensure, Error, Result, Termination},
};

/// A totalizer output that is an objective literal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct SumData {
    /// The network the output belongs to
    pub net: NetId,
    /// The literal is the output `o_{bound+1}`
    pub bound: usize,
}

/// The reformulated objective: active literals with their residual weights
#[derive(Debug, Default, Clone)]
pub(super) struct Reformulation {
    weights: RsHashMap<Lit, usize>,
    /// Activation order, fixed at the first activation of a literal
    ranks: RsHashMap<Lit, usize>,
    sums: RsHashMap<Lit, SumData>,
}

impl Reformulation {
    /// Activates a literal or adds to its weight if it is already active
    pub fn insert(&mut self, lit: Lit, weight: usize) {
        let next_rank = self.ranks.len();
        self.ranks.entry(lit).or_insert(next_rank);
        *self.weights.entry(lit).or_default() += weight;
    }

    pub fn weight(&self, lit: Lit) -> Option<usize> {
        self.weights.get(&lit).copied()
    }

    pub fn is_active(&self, lit: Lit) -> bool {
        self.weights.contains_key(&lit)
    }

    /// Subtracts a weight from an active literal and returns the residual weight. Literals with
    /// no residual weight are deactivated.
    pub fn relax(&mut self, lit: Lit, weight: usize) -> usize {
        let Some(current) = self.weights.get_mut(&lit) else {
            return 0;
        };
        *current = current.saturating_sub(weight);
        let residual = *current;
        if residual == 0 {
            self.weights.remove(&lit);
        }
        residual
    }

    pub fn remove(&mut self, lit: Lit) -> Option<usize> {
        self.weights.remove(&lit)
    }

    pub fn rank(&self, lit: Lit) -> usize {
        self.ranks.get(&lit).copied().unwrap_or(usize::MAX)
    }

    pub fn sum(&self, lit: Lit) -> Option<SumData> {
        self.sums.get(&lit).copied()
    }

    /// The active literals in activation order
    pub fn active(&self) -> Vec<(Lit, usize)> {
        self.weights
            .iter()
            .map(|(&l, &w)| (l, w))
            .sorted_by_key(|&(l, _)| self.rank(l))
            .collect()
    }

    /// Assumptions for the next oracle call, heaviest literals first
    pub fn assumps(&self) -> Vec<Lit> {
        self.active()
            .into_iter()
            .sorted_by_key(|&(_, w)| Reverse(w))
            .map(|(l, _)| !l)
            .collect()
    }
}

impl<O> Optimizer<O>
where
    O: SolveIncremental + SolveStats + LimitConflicts + Propagate,
{
    /// Extracts and relaxes cores until the active literals can all be falsified. Returns
    /// `false` if the hard clauses are unsatisfiable.
    pub(super) fn oll(&mut self) -> Result<bool> {
        self.log_routine_start("oll")?;
        loop {
            let assumps = self.reform.assumps();
            match self.solve_assumps(&assumps)? {
                SolverResult::Sat => break,
                SolverResult::Interrupted => return Err(Termination::Interrupted.into()),
                SolverResult::Unsat => (),
            }
            let core = self.oracle.core()?;
            let orig_len = core.len();
            if core.is_empty() {
                self.log_routine_end()?;
                return Ok(false);
            }
            self.check_core(&core)?;
            let core = self.trim_core(core)?;
            let core = self.minimize_core(core)?;
            if core.is_empty() {
                self.log_routine_end()?;
                return Ok(false);
            }
            self.process_core(core, orig_len)?;
        }
        self.log_routine_end()?;
        Ok(true)
    }

    fn check_core(&self, core: &[Lit]) -> Result<()> {
        for &lit in core {
            ensure!(
                self.reform.is_active(lit),
                "core literal {lit} is not an active objective literal"
            );
        }
        Ok(())
    }

    /// Splits the minimum weight off the core literals and relaxes the core
    fn process_core(&mut self, core: Vec<Lit>, orig_len: usize) -> Result<()> {
        let core: Vec<Lit> = core
            .into_iter()
            .sorted_by_key(|&l| self.reform.rank(l))
            .dedup()
            .collect();
        let weight = core
            .iter()
            .filter_map(|&l| self.reform.weight(l))
            .min()
            .unwrap_or(0);
        ensure!(weight > 0, "core of weight zero");
        self.stats.n_cores += 1;
        self.log_core(weight, orig_len, core.len())?;

        let mut cost_increase = weight;
        for &lit in &core {
            let residual = self.reform.relax(lit, weight);
            if residual > 0 && self.stratifier.should_defer(residual) {
                self.reform.remove(lit);
                self.stratifier.defer(lit, residual);
            }
            if let Some(SumData { net, bound }) = self.reform.sum(lit) {
                self.bump_sum(net, bound + 1, weight)?;
            }
        }

        if core.len() > 1 {
            let net = self
                .tot_db
                .create(&core, 1, &mut self.oracle, &mut self.ids)?;
            let bound = self.exhaust_core(net, weight)?;
            cost_increase += (bound - 1) * weight;
            if bound < self.tot_db.n_inputs(net) {
                self.set_bound(net, bound, weight)?;
            } else {
                // all literals are true in every solution
                for &lit in &core {
                    self.add_clause(clause![lit])?;
                }
            }
        } else {
            self.add_clause(clause![core[0]])?;
        }

        self.cost += cost_increase;
        self.log_cost()
    }

    /// Moves the objective literal of a network to the next output
    fn bump_sum(&mut self, net: NetId, bound: usize, weight: usize) -> Result<()> {
        if bound >= self.tot_db.n_inputs(net) {
            return Ok(());
        }
        self.tot_db
            .raise_bound(net, bound, &mut self.oracle, &mut self.ids)?;
        self.set_bound(net, bound, weight)
    }

    /// Activates `o_{bound+1}` of a network with the given weight
    fn set_bound(&mut self, net: NetId, bound: usize, weight: usize) -> Result<()> {
        let olit = self.tot_db.output_literal(net, bound + 1)?;
        self.reform.insert(olit, weight);
        self.reform.sums.insert(olit, SumData { net, bound });
        Ok(())
    }

    /// Finds the largest bound that is implied for a freshly built network. Returns `1` if
    /// exhaustion is disabled.
    fn exhaust_core(&mut self, net: NetId, weight: usize) -> Result<usize> {
        if !self.opts.core_exhaustion {
            return Ok(1);
        }
        self.log_routine_start("core-exhaustion")?;
        let n_inputs = self.tot_db.n_inputs(net);
        let mut bound = 1;
        while bound < n_inputs {
            let olit = self.tot_db.output_literal(net, bound + 1)?;
            self.oracle
                .limit_conflicts(Some(self.opts.exhaustion_conflicts))?;
            if self.solve_assumps(&[!olit])? != SolverResult::Unsat {
                break;
            }
            bound += 1;
            self.tot_db
                .raise_bound(net, bound, &mut self.oracle, &mut self.ids)?;
        }
        self.oracle.limit_conflicts(None)?;
        if bound > 1 {
            self.log_core_exhaustion(bound, weight)?;
        }
        self.log_routine_end()?;
        Ok(bound)
    }

    /// Re-solves under the core until it stops shrinking or the round limit is reached
    fn trim_core(&mut self, mut core: Vec<Lit>) -> Result<Vec<Lit>> {
        let Some(rounds) = self.opts.core_trimming else {
            return Ok(core);
        };
        if core.len() <= 1 {
            return Ok(core);
        }
        self.log_routine_start("core-trimming")?;
        for _ in 0..rounds {
            let size_before = core.len();
            let assumps: Vec<Lit> = core.iter().map(|&l| !l).collect();
            match self.solve_assumps(&assumps)? {
                SolverResult::Unsat => (),
                SolverResult::Interrupted => return Err(Termination::Interrupted.into()),
                SolverResult::Sat => {
                    return Err(Error::EncodingInvariantViolation(format!(
                        "core of size {size_before} became satisfiable"
                    )))
                }
            }
            core = self.oracle.core()?;
            self.check_core(&core)?;
            if core.len() == size_before || core.len() <= 1 {
                break;
            }
        }
        self.log_routine_end()?;
        Ok(core)
    }

    /// Deletion-based core minimization with a conflict budget per oracle call. Light literals
    /// are tried first.
    fn minimize_core(&mut self, mut core: Vec<Lit>) -> Result<Vec<Lit>> {
        if !self.opts.core_minimization || core.len() <= 1 {
            return Ok(core);
        }
        self.log_routine_start("core-minimization")?;
        core.sort_by_key(|&l| (self.reform.weight(l), self.reform.rank(l)));
        let mut idx = 0;
        while idx < core.len() && core.len() > 1 {
            let dropped = core[idx];
            let assumps: Vec<Lit> = core
                .iter()
                .filter(|&&l| l != dropped)
                .map(|&l| !l)
                .collect();
            self.oracle
                .limit_conflicts(Some(self.opts.minimization_conflicts))?;
            if self.solve_assumps(&assumps)? == SolverResult::Unsat {
                let subcore = self.oracle.core()?;
                self.check_core(&subcore)?;
                let subcore: RsHashSet<Lit> = subcore.into_iter().collect();
                core.retain(|l| subcore.contains(l));
            } else {
                idx += 1;
            }
        }
        self.oracle.limit_conflicts(None)?;
        self.log_routine_end()?;
        Ok(core)
    }

    /// Finishes a stratification level by hardening every active literal that is heavier than
    /// all pending literals together
    pub(super) fn harden(&mut self) -> Result<()> {
        if !self.opts.hardening_sound() {
            return Ok(());
        }
        let pending = self.stratifier.pending_weight();
        let hardened: Vec<Lit> = self
            .reform
            .active()
            .into_iter()
            .filter(|&(_, w)| w > pending)
            .map(|(l, _)| l)
            .collect();
        if hardened.is_empty() {
            return Ok(());
        }
        for &lit in &hardened {
            self.reform.remove(lit);
            self.add_clause(clause![!lit])?;
        }
        self.stats.n_hardened += hardened.len();
        self.log_hardening(hardened.len())
    }

    /// Activates the next stratification level
    pub(super) fn activate_level(&mut self) -> Result<()> {
        let level = self.stratifier.next_level();
        if level.is_empty() {
            return Ok(());
        }
        self.stats.n_levels += 1;
        for stratum in level {
            self.log_stratum(stratum.weight, stratum.lits.len())?;
            for lit in stratum.lits {
                self.reform.insert(lit, stratum.weight);
            }
        }
        Ok(())
    }
}
