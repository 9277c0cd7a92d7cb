use libtest_mimic::{Arguments, Failed, Trial};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rustsat::types::{Assignment, Clause, Lit, RsHashSet, TernaryVal, Var};
use skiff_core::{
    types::Formula, Blocking, EnumOptions, EnumScope, Error, Options, Semantics, Stratification,
};

type Optimizer = skiff_core::Optimizer<rustsat_cadical::CaDiCaL<'static, 'static>>;

const N_SEEDS: u64 = 25;

fn main() {
    let args = Arguments::from_args();
    let mut tests = vec![];

    let vars = [
        ("", Options::default()),
        (
            "no-strat",
            Options {
                stratification: Stratification::Disabled,
                ..Options::default()
            },
        ),
        (
            "lex-strat",
            Options {
                stratification: Stratification::Lexicographic,
                ..Options::default()
            },
        ),
        (
            "no-hardening",
            Options {
                hardening: false,
                ..Options::default()
            },
        ),
        (
            "core-techniques",
            Options {
                core_trimming: Some(3),
                core_minimization: true,
                core_exhaustion: true,
                ..Options::default()
            },
        ),
        (
            "am1",
            Options {
                adapt_am1: true,
                ..Options::default()
            },
        ),
        (
            "iff",
            Options {
                semantics: Semantics::IfAndOnlyIf,
                core_exhaustion: true,
                ..Options::default()
            },
        ),
    ];

    for (id, opts) in vars {
        for seed in 0..N_SEEDS {
            for (weights, max_weight) in [("unit", 1), ("small", 5), ("blo", 0)] {
                tests.push(Trial::test(
                    name("optimize", id, weights, seed),
                    move || run_optimize(opts, seed, max_weight),
                ));
            }
            for blocking in [Blocking::Model, Blocking::Mcs, Blocking::Mss] {
                tests.push(Trial::test(
                    name(&format!("enum-optimal-{blocking}"), id, "small", seed),
                    move || run_enum_optimal(opts, blocking, seed),
                ));
                tests.push(Trial::test(
                    name(&format!("enum-all-{blocking}"), id, "small", seed),
                    move || run_enum_all(opts, blocking, seed),
                ));
            }
        }
    }

    libtest_mimic::run(&args, tests).exit();
}

fn name(kind: &str, variant: &str, weights: &str, seed: u64) -> String {
    format!(
        "{kind}{}{variant}:{weights}:seed-{seed}",
        if variant.is_empty() { "" } else { ":" },
    )
}

fn run_optimize(opts: Options, seed: u64, max_weight: usize) -> Result<(), Failed> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_vars = rng.gen_range(3..=8);
    let formula = random_formula(&mut rng, n_vars, max_weight);
    let (opt_cost, _) = brute_force(&formula, n_vars);

    let mut opt = Optimizer::from_formula(formula.clone(), opts)?;
    match (opt.optimize(), opt_cost) {
        (Ok(res), Some(opt_cost)) => {
            if !formula.is_feasible(&res.model) {
                return Err("model violates a hard clause".into());
            }
            if formula.cost(&res.model) != res.cost {
                return Err(format!(
                    "reported cost {} but model has cost {}",
                    res.cost,
                    formula.cost(&res.model)
                )
                .into());
            }
            if res.cost != opt_cost {
                return Err(format!("found cost {} but optimum is {opt_cost}", res.cost).into());
            }
            Ok(())
        }
        (Err(Error::Unsatisfiable), None) => Ok(()),
        (res, expected) => Err(format!("got {res:?}, expected optimum {expected:?}").into()),
    }
}

fn run_enum_optimal(mut opts: Options, blocking: Blocking, seed: u64) -> Result<(), Failed> {
    opts.set_enumeration(EnumOptions {
        blocking,
        scope: EnumScope::Optimal,
    });
    let mut rng = StdRng::seed_from_u64(seed);
    let n_vars = rng.gen_range(3..=6);
    let formula = random_formula(&mut rng, n_vars, 5);
    let (opt_cost, optimal) = brute_force(&formula, n_vars);
    // model blocking yields every optimal model, the other kinds every optimal falsified set
    let expected: RsHashSet<u32> = match blocking {
        Blocking::Model => optimal,
        Blocking::Mcs | Blocking::Mss => optimal
            .into_iter()
            .map(|bits| falsified(&formula, bits))
            .collect(),
    };

    let mut opt = Optimizer::from_formula(formula.clone(), opts)?;
    let mut found = RsHashSet::default();
    for res in opt.enumerate() {
        let res = match res {
            Ok(res) => res,
            Err(Error::Unsatisfiable) if opt_cost.is_none() => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        if Some(res.cost) != opt_cost {
            return Err(format!("enumerated cost {} but optimum is {opt_cost:?}", res.cost).into());
        }
        let bits = to_bits(&res.model, n_vars);
        let key = match blocking {
            Blocking::Model => bits,
            Blocking::Mcs | Blocking::Mss => falsified(&formula, bits),
        };
        if !found.insert(key) {
            return Err(format!("solution {key:#b} enumerated twice").into());
        }
    }
    if found != expected {
        return Err(format!(
            "enumerated {} optimal solutions, expected {}",
            found.len(),
            expected.len()
        )
        .into());
    }
    Ok(())
}

fn run_enum_all(mut opts: Options, blocking: Blocking, seed: u64) -> Result<(), Failed> {
    opts.set_enumeration(EnumOptions {
        blocking,
        scope: EnumScope::All,
    });
    let mut rng = StdRng::seed_from_u64(seed);
    let n_vars = rng.gen_range(3..=5);
    let formula = random_formula(&mut rng, n_vars, 5);
    let mut expected: Vec<usize> = (0..1u32 << n_vars)
        .filter(|&bits| formula.hard().iter().all(|cl| satisfied(cl, bits)))
        .map(|bits| cost(&formula, bits))
        .collect();
    expected.sort_unstable();

    let mut opt = Optimizer::from_formula(formula.clone(), opts)?;
    let mut costs = vec![];
    let mut found = RsHashSet::default();
    for res in opt.enumerate() {
        let res = match res {
            Ok(res) => res,
            Err(Error::Unsatisfiable) if expected.is_empty() => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        if !formula.is_feasible(&res.model) || formula.cost(&res.model) != res.cost {
            return Err(format!("solution does not match its reported cost {}", res.cost).into());
        }
        if blocking != Blocking::Model
            && !found.insert(falsified(&formula, to_bits(&res.model, n_vars)))
        {
            return Err("falsified set enumerated twice".into());
        }
        costs.push(res.cost);
    }
    match blocking {
        Blocking::Model => {
            if costs != expected {
                return Err(format!("enumerated costs {costs:?}, expected {expected:?}").into());
            }
        }
        Blocking::Mcs | Blocking::Mss => {
            if costs.first() != expected.first() {
                return Err(format!(
                    "first cost {:?}, expected optimum {:?}",
                    costs.first(),
                    expected.first()
                )
                .into());
            }
            if costs.windows(2).any(|w| w[0] > w[1]) {
                return Err(format!("enumerated costs {costs:?} decrease").into());
            }
        }
    }
    Ok(())
}

/// Generates a formula in which every variable appears in a soft unit clause. A `max_weight`
/// of zero draws weights from powers of three.
fn random_formula(rng: &mut StdRng, n_vars: u32, max_weight: usize) -> Formula {
    let mut formula = Formula::new();
    let random_clause = |rng: &mut StdRng, len: usize| -> Clause {
        (0..len)
            .map(|_| Lit::new(rng.gen_range(0..n_vars), rng.gen_bool(0.5)))
            .collect()
    };
    let weight = |rng: &mut StdRng| -> usize {
        if max_weight == 0 {
            3usize.pow(rng.gen_range(0..4))
        } else {
            rng.gen_range(1..=max_weight)
        }
    };
    for _ in 0..rng.gen_range(0..=n_vars) {
        let len = rng.gen_range(1..=3);
        let cl = random_clause(rng, len);
        formula.add_hard(cl);
    }
    for idx in 0..n_vars {
        let w = weight(rng);
        formula.add_soft(Clause::from_iter([Lit::new(idx, rng.gen_bool(0.5))]), w);
    }
    for _ in 0..rng.gen_range(1..=n_vars) {
        let len = rng.gen_range(1..=3);
        let cl = random_clause(rng, len);
        let w = weight(rng);
        formula.add_soft(cl, w);
    }
    formula
}

fn satisfied(clause: &Clause, bits: u32) -> bool {
    clause
        .iter()
        .any(|l| ((bits >> l.vidx()) & 1 == 1) != l.is_neg())
}

/// The soft clauses an assignment falsifies, as a bitmask over their indices
fn falsified(formula: &Formula, bits: u32) -> u32 {
    formula
        .soft()
        .iter()
        .enumerate()
        .filter(|(_, sc)| !satisfied(&sc.clause, bits))
        .fold(0, |mask, (idx, _)| mask | 1 << idx)
}

fn cost(formula: &Formula, bits: u32) -> usize {
    formula
        .soft()
        .iter()
        .filter(|sc| !satisfied(&sc.clause, bits))
        .map(|sc| sc.weight)
        .sum()
}

/// Computes the optimal cost and all optimal assignments by enumerating every assignment
fn brute_force(formula: &Formula, n_vars: u32) -> (Option<usize>, RsHashSet<u32>) {
    let mut best = None;
    let mut optimal = RsHashSet::default();
    for bits in 0..1u32 << n_vars {
        if !formula.hard().iter().all(|cl| satisfied(cl, bits)) {
            continue;
        }
        let cost = cost(formula, bits);
        match best {
            Some(b) if cost > b => continue,
            Some(b) if cost == b => {
                optimal.insert(bits);
            }
            _ => {
                best = Some(cost);
                optimal.clear();
                optimal.insert(bits);
            }
        }
    }
    (best, optimal)
}

fn to_bits(model: &Assignment, n_vars: u32) -> u32 {
    (0..n_vars)
        .filter(|&idx| model.var_value(Var::new(idx)) == TernaryVal::True)
        .fold(0, |bits, idx| bits | 1 << idx)
}
