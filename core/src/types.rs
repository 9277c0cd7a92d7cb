//! # Types
//!
//! Shared types of the optimizer: the input formula, results and variable id allocation.

use std::cmp;

use rustsat::{
    instances::{Cnf, ManageVars, OptInstance},
    types::{Assignment, Clause, Lit, TernaryVal, Var},
};

use crate::termination::{Error, Result};

/// The largest variable index that still has an IPASIR representation
const MAX_VAR_IDX: u32 = (i32::MAX as u32) - 1;

/// A soft clause with its weight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftClause {
    pub clause: Clause,
    pub weight: usize,
}

/// A weighted MaxSAT formula of hard and soft clauses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Formula {
    hard: Cnf,
    soft: Vec<SoftClause>,
    max_var: Option<Var>,
}

impl Formula {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hard clause
    pub fn add_hard(&mut self, clause: Clause) {
        self.track_vars(&clause);
        self.hard.add_clause(clause);
    }

    /// Adds a soft clause with a given weight. The weight is checked when the formula is
    /// validated.
    pub fn add_soft(&mut self, clause: Clause, weight: usize) {
        self.track_vars(&clause);
        self.soft.push(SoftClause { clause, weight });
    }

    /// Adds a hard clause given as IPASIR literals
    pub fn add_hard_ipasir(&mut self, lits: &[i32]) -> Result<()> {
        let clause = clause_from_ipasir(lits)?;
        self.add_hard(clause);
        Ok(())
    }

    /// Adds a soft clause given as IPASIR literals
    pub fn add_soft_ipasir(&mut self, lits: &[i32], weight: usize) -> Result<()> {
        let clause = clause_from_ipasir(lits)?;
        self.add_soft(clause, weight);
        Ok(())
    }

    /// Declares that the formula ranges over at least the variables up to `max_var`, even if
    /// they do not occur in any clause
    pub fn reserve_vars(&mut self, max_var: Var) {
        self.max_var = cmp::max(self.max_var, Some(max_var));
    }

    /// Gets the highest variable of the formula
    pub fn max_var(&self) -> Option<Var> {
        self.max_var
    }

    pub fn hard(&self) -> &Cnf {
        &self.hard
    }

    pub fn soft(&self) -> &[SoftClause] {
        &self.soft
    }

    /// Splits the formula into its hard and soft clauses
    pub fn into_parts(self) -> (Cnf, Vec<SoftClause>) {
        (self.hard, self.soft)
    }

    pub fn n_hard(&self) -> usize {
        self.hard.len()
    }

    pub fn n_soft(&self) -> usize {
        self.soft.len()
    }

    /// Checks that the formula can be optimized
    pub fn validate(&self) -> Result<()> {
        if let Some(idx) = self.hard.iter().position(|cl| cl.is_empty()) {
            return Err(Error::MalformedFormula(format!(
                "hard clause {idx} is empty"
            )));
        }
        if let Some(idx) = self.soft.iter().position(|sc| sc.weight == 0) {
            return Err(Error::MalformedFormula(format!(
                "soft clause {idx} has weight zero"
            )));
        }
        Ok(())
    }

    /// Checks whether an assignment satisfies all hard clauses
    pub fn is_feasible(&self, model: &Assignment) -> bool {
        self.hard.evaluate(model) == TernaryVal::True
    }

    /// Computes the cost of an assignment, i.e., the sum of weights of falsified soft clauses
    pub fn cost(&self, model: &Assignment) -> usize {
        self.soft
            .iter()
            .filter(|sc| sc.clause.evaluate(model) != TernaryVal::True)
            .map(|sc| sc.weight)
            .sum()
    }

    fn track_vars(&mut self, clause: &Clause) {
        if let Some(var) = clause.iter().map(|l| l.var()).max() {
            self.max_var = cmp::max(self.max_var, Some(var));
        }
    }
}

impl TryFrom<OptInstance> for Formula {
    type Error = Error;

    /// Converts a single-objective instance. A positive objective offset becomes an empty soft
    /// clause, a negative offset cannot be represented.
    fn try_from(inst: OptInstance) -> Result<Self> {
        let (hard, (softs, offset), vm) = inst.into_hard_cls_soft_cls();
        let mut formula = Formula {
            max_var: vm.max_var(),
            ..Default::default()
        };
        for cl in hard {
            formula.add_hard(cl);
        }
        for (cl, weight) in softs {
            formula.add_soft(cl, weight);
        }
        match usize::try_from(offset) {
            Ok(0) => (),
            Ok(offset) => formula.add_soft(Clause::new(), offset),
            Err(_) => {
                return Err(Error::MalformedFormula(format!(
                    "negative objective offset {offset}"
                )))
            }
        }
        Ok(formula)
    }
}

pub(crate) fn clause_from_ipasir(lits: &[i32]) -> Result<Clause> {
    lits.iter()
        .map(|&val| {
            if val == 0 {
                return Err(Error::MalformedFormula(String::from(
                    "zero is not a valid literal",
                )));
            }
            Lit::from_ipasir(val).map_err(|err| Error::MalformedFormula(err.to_string()))
        })
        .collect()
}

/// An optimal (or enumerated) solution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationResult {
    /// The sum of weights of falsified soft clauses
    pub cost: usize,
    /// The assignment to the original variables
    pub model: Assignment,
}

/// Checks that `n` more variables can be issued by a variable manager
pub(crate) fn check_capacity(ids: &dyn ManageVars, n: usize) -> Result<()> {
    if ids.n_used() as usize + n > MAX_VAR_IDX as usize + 1 {
        return Err(Error::IdsExhausted);
    }
    Ok(())
}

/// Issues fresh variables above the original variables of a formula. Every variable is issued
/// exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAllocator {
    next_var: Var,
    max_orig_var: Option<Var>,
}

impl IdAllocator {
    /// Creates an allocator that issues variables above `max_orig_var`
    pub fn new(max_orig_var: Option<Var>) -> Self {
        IdAllocator {
            next_var: max_orig_var.map_or(Var::new(0), |v| v + 1),
            max_orig_var,
        }
    }

    /// Issues a fresh variable or fails if the id space is used up
    pub fn try_new_var(&mut self) -> Result<Var> {
        check_capacity(&*self, 1)?;
        Ok(self.new_var())
    }

    /// Issues a fresh positive literal or fails if the id space is used up
    pub fn try_new_lit(&mut self) -> Result<Lit> {
        Ok(self.try_new_var()?.pos_lit())
    }

    /// Gets the highest original variable
    pub fn max_orig_var(&self) -> Option<Var> {
        self.max_orig_var
    }

    /// The number of variables issued by this allocator
    pub fn n_issued(&self) -> u32 {
        let first = self.max_orig_var.map_or(0, |v| v.idx32() + 1);
        self.next_var.idx32() - first
    }

    /// Checks whether a variable belongs to the original formula
    pub fn is_orig(&self, var: Var) -> bool {
        self.max_orig_var.is_some_and(|max| var <= max)
    }

    fn first_free(&self) -> Var {
        self.max_orig_var.map_or(Var::new(0), |v| v + 1)
    }
}

impl ManageVars for IdAllocator {
    fn new_var(&mut self) -> Var {
        let v = self.next_var;
        self.next_var += 1;
        v
    }

    fn max_var(&self) -> Option<Var> {
        if self.next_var == Var::new(0) {
            None
        } else {
            Some(self.next_var - 1)
        }
    }

    fn increase_next_free(&mut self, v: Var) -> bool {
        if v > self.next_var {
            self.next_var = v;
            return true;
        };
        false
    }

    fn combine(&mut self, other: Self) {
        if other.next_var > self.next_var {
            self.next_var = other.next_var;
        };
    }

    fn n_used(&self) -> u32 {
        self.next_var.idx32()
    }

    /// Original variables are never forgotten
    fn forget_from(&mut self, min_var: Var) {
        self.next_var = cmp::max(cmp::min(self.next_var, min_var), self.first_free());
    }
}
