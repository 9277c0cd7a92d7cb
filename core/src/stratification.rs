//! # Weight Stratification
//!
//! Soft clauses are grouped into strata of equal weight and handed to the optimizer from the
//! heaviest stratum down. Strata that are heavier than everything below them form
//! lexicographic blocks: the optimum of a block cannot be traded against any combination of
//! lighter clauses, so a block is optimized to completion before lighter literals are assumed.

use std::{collections::BTreeMap, ops::Range};

use rustsat::types::Lit;

use crate::options::Stratification;

/// Relaxation literals sharing the same weight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stratum {
    pub weight: usize,
    pub lits: Vec<Lit>,
}

impl Stratum {
    /// The summed weight of all literals in the stratum
    pub fn total_weight(&self) -> usize {
        self.weight * self.lits.len()
    }
}

/// Groups weighted literals into strata in descending weight order. Literals in a stratum keep
/// the order they were given in.
pub fn stratify<I>(softs: I) -> Vec<Stratum>
where
    I: IntoIterator<Item = (Lit, usize)>,
{
    let mut buckets: BTreeMap<usize, Vec<Lit>> = BTreeMap::new();
    for (lit, weight) in softs {
        buckets.entry(weight).or_default().push(lit);
    }
    buckets
        .into_iter()
        .rev()
        .map(|(weight, lits)| Stratum { weight, lits })
        .collect()
}

/// Partitions descending strata into lexicographic blocks. A block ends after stratum `i` if the
/// weight of `i` exceeds the total weight of all strata after it.
pub fn lexicographic_blocks(strata: &[Stratum]) -> Vec<Range<usize>> {
    debug_assert!(strata.windows(2).all(|w| w[0].weight > w[1].weight));
    let mut blocks = vec![];
    let mut start = 0;
    let mut suffix: usize = strata.iter().map(Stratum::total_weight).sum();
    for (idx, stratum) in strata.iter().enumerate() {
        suffix -= stratum.total_weight();
        if suffix > 0 && stratum.weight > suffix {
            blocks.push(start..idx + 1);
            start = idx + 1;
        }
    }
    if start < strata.len() {
        blocks.push(start..strata.len());
    }
    blocks
}

/// Tracks the strata that are not yet part of the active problem
#[derive(Debug, Clone)]
pub(crate) struct Stratifier {
    mode: Stratification,
    pending: BTreeMap<usize, Vec<Lit>>,
    level: Option<usize>,
}

impl Stratifier {
    pub fn new<I>(softs: I, mode: Stratification) -> Self
    where
        I: IntoIterator<Item = (Lit, usize)>,
    {
        let mut pending: BTreeMap<usize, Vec<Lit>> = BTreeMap::new();
        for (lit, weight) in softs {
            pending.entry(weight).or_default().push(lit);
        }
        Stratifier {
            mode,
            pending,
            level: None,
        }
    }

    /// The pending strata, heaviest first
    pub fn pending(&self) -> Vec<Stratum> {
        self.pending
            .iter()
            .rev()
            .map(|(&weight, lits)| Stratum {
                weight,
                lits: lits.clone(),
            })
            .collect()
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    /// The summed weight of all pending literals
    pub fn pending_weight(&self) -> usize {
        self.pending
            .iter()
            .map(|(&weight, lits)| weight * lits.len())
            .sum()
    }

    /// Checks whether a literal with the given residual weight has dropped below the current
    /// level and should wait for a later level
    pub fn should_defer(&self, weight: usize) -> bool {
        self.mode != Stratification::Disabled && self.level.is_some_and(|lvl| weight < lvl)
    }

    /// Moves a literal (back) into the pending strata
    pub fn defer(&mut self, lit: Lit, weight: usize) {
        self.pending.entry(weight).or_default().push(lit);
    }

    /// Removes all pending literals, heaviest first
    pub fn take_pending(&mut self) -> Vec<(Lit, usize)> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .rev()
            .flat_map(|(weight, lits)| lits.into_iter().map(move |lit| (lit, weight)))
            .collect()
    }

    /// Removes the strata of the next level from the pending strata
    pub fn next_level(&mut self) -> Vec<Stratum> {
        let n_strata = match self.mode {
            Stratification::Disabled => self.pending.len(),
            Stratification::Progressive => usize::from(!self.pending.is_empty()),
            Stratification::Lexicographic => lexicographic_blocks(&self.pending())
                .first()
                .map_or(0, |block| block.len()),
        };
        let mut level = Vec::with_capacity(n_strata);
        for _ in 0..n_strata {
            if let Some((weight, lits)) = self.pending.pop_last() {
                level.push(Stratum { weight, lits });
            }
        }
        if let Some(lightest) = level.last() {
            self.level = Some(lightest.weight);
        }
        level
    }
}

#[cfg(test)]
mod tests {
    use rustsat::lit;

    use super::{lexicographic_blocks, stratify, Stratifier, Stratum};
    use crate::options::Stratification;

    fn strata(weights: &[(usize, usize)]) -> Vec<Stratum> {
        let mut next = 0;
        weights
            .iter()
            .map(|&(weight, n)| {
                let lits = (next..next + n).map(|idx| lit![idx as u32]).collect();
                next += n;
                Stratum { weight, lits }
            })
            .collect()
    }

    #[test]
    fn stratify_descending_stable() {
        let strata = stratify([
            (lit![0], 1),
            (lit![1], 4),
            (lit![2], 1),
            (lit![3], 4),
            (lit![4], 2),
        ]);
        assert_eq!(
            strata,
            vec![
                Stratum {
                    weight: 4,
                    lits: vec![lit![1], lit![3]]
                },
                Stratum {
                    weight: 2,
                    lits: vec![lit![4]]
                },
                Stratum {
                    weight: 1,
                    lits: vec![lit![0], lit![2]]
                },
            ]
        );
    }

    #[test]
    fn stratify_empty() {
        assert!(stratify([]).is_empty());
        assert!(lexicographic_blocks(&[]).is_empty());
    }

    #[test]
    fn blocks_boundary() {
        // 4 > 3 * 1
        assert_eq!(
            lexicographic_blocks(&strata(&[(4, 3), (1, 3)])),
            vec![0..1, 1..2]
        );
    }

    #[test]
    fn blocks_no_boundary() {
        // 5 <= 3 + 3 and 3 <= 3
        assert_eq!(
            lexicographic_blocks(&strata(&[(5, 1), (3, 1), (1, 3)])),
            vec![0..3]
        );
    }

    #[test]
    fn blocks_all_boundaries() {
        assert_eq!(
            lexicographic_blocks(&strata(&[(10, 1), (4, 1), (2, 1), (1, 1)])),
            vec![0..1, 1..2, 2..3, 3..4]
        );
    }

    #[test]
    fn blocks_mixed() {
        assert_eq!(
            lexicographic_blocks(&strata(&[(20, 1), (6, 2), (4, 1), (1, 2)])),
            vec![0..1, 1..3, 3..4]
        );
    }

    #[test]
    fn stratifier_progressive() {
        let mut strat = Stratifier::new(
            [(lit![0], 3), (lit![1], 1), (lit![2], 3), (lit![3], 2)],
            Stratification::Progressive,
        );
        assert_eq!(strat.pending_weight(), 9);
        let level = strat.next_level();
        assert_eq!(level.len(), 1);
        assert_eq!(level[0].lits, vec![lit![0], lit![2]]);
        assert!(strat.should_defer(2));
        assert!(!strat.should_defer(3));
        strat.defer(lit![0], 1);
        assert_eq!(strat.pending_weight(), 4);
        assert_eq!(strat.next_level()[0].weight, 2);
        let level = strat.next_level();
        assert_eq!(level[0].lits, vec![lit![1], lit![0]]);
        assert!(strat.is_done());
        assert!(strat.next_level().is_empty());
    }

    #[test]
    fn stratifier_lexicographic() {
        let mut strat = Stratifier::new(
            [
                (lit![0], 20),
                (lit![1], 6),
                (lit![2], 6),
                (lit![3], 5),
                (lit![4], 2),
            ],
            Stratification::Lexicographic,
        );
        assert_eq!(strat.next_level().len(), 1);
        let level = strat.next_level();
        assert_eq!(level.len(), 2);
        assert!(strat.should_defer(4));
        assert!(!strat.should_defer(5));
        assert_eq!(strat.next_level().len(), 1);
        assert!(strat.is_done());
    }

    #[test]
    fn stratifier_take_pending() {
        let mut strat = Stratifier::new(
            [(lit![0], 2), (lit![1], 7), (lit![2], 2)],
            Stratification::Progressive,
        );
        assert_eq!(
            strat.take_pending(),
            vec![(lit![1], 7), (lit![0], 2), (lit![2], 2)]
        );
        assert!(strat.is_done());
        strat.defer(lit![3], 4);
        assert_eq!(strat.pending_weight(), 4);
        assert_eq!(strat.next_level()[0].lits, vec![lit![3]]);
    }

    #[test]
    fn stratifier_disabled() {
        let mut strat = Stratifier::new(
            [(lit![0], 20), (lit![1], 6), (lit![2], 1)],
            Stratification::Disabled,
        );
        assert_eq!(strat.next_level().len(), 3);
        assert!(!strat.should_defer(0));
        assert!(strat.is_done());
    }
}
