//! # At-Most-One Detection
//!
//! Before the first oracle call, groups of soft clauses of which at most one can be satisfied
//! are found by unit propagation and replaced by a single sum literal.

use std::collections::BTreeSet;

use itertools::Itertools;
use rustsat::{
    clause,
    solvers::{LimitConflicts, Propagate, SolveIncremental, SolveStats},
    types::{Clause, Lit, RsHashMap, RsHashSet},
};

use super::Optimizer;
use crate::termination::{ensure, Result};

impl<O> Optimizer<O>
where
    O: SolveIncremental + SolveStats + LimitConflicts + Propagate,
{
    /// Detects and relaxes at-most-one constraints over the pending soft literals
    pub(super) fn adapt_am1(&mut self) -> Result<()> {
        self.log_routine_start("am1-detection")?;
        if self.oracle.propagate(&[], false)?.conflict {
            // the hard clauses are unsatisfiable, the search reports it
            return Ok(self.log_routine_end()?);
        }
        let pending = self.stratifier.take_pending();
        let mut order: Vec<Lit> = pending.iter().map(|&(l, _)| l).collect();
        let mut weights: RsHashMap<Lit, usize> = pending.into_iter().collect();

        // two literals are connected if they cannot both be false
        let mut conns: RsHashMap<Lit, RsHashSet<Lit>> = RsHashMap::default();
        let mut forced = vec![];
        for &lit in &order {
            let res = self.oracle.propagate(&[!lit], false)?;
            if res.conflict {
                forced.push(lit);
                continue;
            }
            for other in res.propagated {
                if other != lit && weights.contains_key(&other) {
                    conns.entry(lit).or_default().insert(other);
                    conns.entry(other).or_default().insert(lit);
                }
            }
        }

        for lit in forced {
            let weight = weights.remove(&lit).unwrap_or(0);
            ensure!(weight > 0, "forced literal {lit} has no weight");
            self.add_clause(clause![lit])?;
            self.stats.n_cores += 1;
            self.log_core(weight, 1, 1)?;
            self.cost += weight;
            self.log_cost()?;
            if let Some(adj) = conns.remove(&lit) {
                for other in adj {
                    if let Some(other_adj) = conns.get_mut(&other) {
                        other_adj.remove(&lit);
                    }
                }
            }
        }
        conns.retain(|_, adj| !adj.is_empty());

        let degree = |conns: &RsHashMap<Lit, RsHashSet<Lit>>, lit: &Lit| {
            conns.get(lit).map_or(0, RsHashSet::len)
        };
        let mut remaining: BTreeSet<Lit> = conns.keys().copied().collect();
        loop {
            let Some(first) = remaining
                .iter()
                .copied()
                .min_by_key(|l| degree(&conns, l))
            else {
                break;
            };
            let mut am1 = vec![first];
            let cands = conns
                .get(&first)
                .into_iter()
                .flatten()
                .copied()
                .sorted_by_key(|l| (degree(&conns, l), *l));
            for cand in cands {
                let connected = am1[1..]
                    .iter()
                    .all(|l| conns.get(l).is_some_and(|adj| adj.contains(&cand)));
                if remaining.contains(&cand) && connected {
                    am1.push(cand);
                }
            }
            for lit in &am1 {
                remaining.remove(lit);
                if let Some(adj) = conns.remove(lit) {
                    for other in adj {
                        if let Some(other_adj) = conns.get_mut(&other) {
                            other_adj.remove(lit);
                        }
                    }
                }
            }
            // literals without connections left are in no further constraint
            remaining.retain(|l| degree(&conns, l) > 0);
            if am1.len() > 1 {
                self.process_am1(am1, &mut weights, &mut order)?;
            }
        }

        for lit in order {
            if let Some(&weight) = weights.get(&lit) {
                self.stratifier.defer(lit, weight);
            }
        }
        Ok(self.log_routine_end()?)
    }

    /// Relaxes an at-most-one constraint: with `k` literals at least `k - 1` are true, the
    /// last one is represented by a fresh sum literal
    fn process_am1(
        &mut self,
        mut am1: Vec<Lit>,
        weights: &mut RsHashMap<Lit, usize>,
        order: &mut Vec<Lit>,
    ) -> Result<()> {
        self.stats.n_am1s += 1;
        while am1.len() > 1 {
            let weight = am1
                .iter()
                .filter_map(|l| weights.get(l).copied())
                .min()
                .unwrap_or(0);
            ensure!(weight > 0, "at-most-one constraint of weight zero");
            self.log_am1(am1.len(), weight)?;
            self.cost += (am1.len() - 1) * weight;
            self.log_cost()?;

            let sum = self.ids.try_new_lit()?;
            let mut cl: Clause = am1.iter().map(|&l| !l).collect();
            cl.add(sum);
            self.add_clause(cl)?;

            am1.retain(|&l| {
                let residual = weights.get(&l).map_or(0, |&w| w.saturating_sub(weight));
                if residual == 0 {
                    weights.remove(&l);
                    false
                } else {
                    weights.insert(l, residual);
                    true
                }
            });
            weights.insert(sum, weight);
            order.push(sum);
        }
        Ok(())
    }
}
