//! Property tests for the rewriter and substitutions.

use pbeskit_rewrite::{apply, IndexedSubstitution, MapSubstitution, Substitution};
use pbeskit_rewrite::Rewriter;
use pbeskit_term::{Args, Expr, IdGen, RewriteRule, SortId, Symbol, TermPool, Variable};
use proptest::prelude::*;

struct Arith {
    pool: TermPool,
    idgen: IdGen,
    rw: Rewriter,
    zero: Symbol,
    succ: Symbol,
    add: Symbol,
}

/// Peano naturals with addition, the standard two-rule system.
fn arith() -> Arith {
    let mut pool = TermPool::new();
    let zero = pool.symbol("zero");
    let succ = pool.symbol("succ");
    let add = pool.symbol("add");
    let nat = SortId(0);
    let x = Variable {
        name: pool.symbol("x"),
        sort: nat,
    };
    let y = Variable {
        name: pool.symbol("y"),
        sort: nat,
    };
    let xe = pool.var(x);
    let ye = pool.var(y);

    let zero_e = pool.app(zero, Args::new());
    let lhs1 = pool.app(add, Args::from_vec(vec![zero_e, ye.clone()]));
    let rule1 = RewriteRule::new(&pool, lhs1, None, ye.clone()).unwrap();

    let sx = pool.app(succ, Args::from_vec(vec![xe.clone()]));
    let lhs2 = pool.app(add, Args::from_vec(vec![sx, ye.clone()]));
    let add_xy = pool.app(add, Args::from_vec(vec![xe, ye]));
    let rhs2 = pool.app(succ, Args::from_vec(vec![add_xy]));
    let rule2 = RewriteRule::new(&pool, lhs2, None, rhs2).unwrap();

    Arith {
        pool,
        idgen: IdGen::new(),
        rw: Rewriter::with_rules([rule1, rule2]),
        zero,
        succ,
        add,
    }
}

fn num(a: &mut Arith, n: u8) -> Expr {
    let mut e = a.pool.app(a.zero, Args::new());
    for _ in 0..n {
        e = a.pool.app(a.succ, Args::from_vec(vec![e]));
    }
    e
}

/// Build a random nested sum following a shape word: each pair of numbers
/// becomes an `add` application, left- or right-nested by the flags.
fn sum_tree(a: &mut Arith, leaves: &[u8], left_nested: bool) -> Expr {
    let mut acc = num(a, leaves[0]);
    for &n in &leaves[1..] {
        let rhs = num(a, n);
        acc = if left_nested {
            a.pool.app(a.add, Args::from_vec(vec![acc, rhs]))
        } else {
            a.pool.app(a.add, Args::from_vec(vec![rhs, acc]))
        };
    }
    acc
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn rewriting_is_idempotent(
        leaves in prop::collection::vec(0u8..6, 1..5),
        left_nested in any::<bool>(),
    ) {
        let mut a = arith();
        let e = sum_tree(&mut a, &leaves, left_nested);
        let once = a.rw.rewrite(&mut a.pool, &mut a.idgen, &e);
        let twice = a.rw.rewrite(&mut a.pool, &mut a.idgen, &once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn normal_form_is_the_sum(
        leaves in prop::collection::vec(0u8..6, 1..5),
        left_nested in any::<bool>(),
    ) {
        let mut a = arith();
        let e = sum_tree(&mut a, &leaves, left_nested);
        let nf = a.rw.rewrite(&mut a.pool, &mut a.idgen, &e);
        let total: u16 = leaves.iter().map(|&n| n as u16).sum();
        let expected = num(&mut a, total as u8);
        prop_assert_eq!(nf, expected);
    }

    #[test]
    fn substitution_is_identity_outside_domain(name in "[a-z][a-z0-9]{0,6}") {
        let mut pool = TermPool::new();
        let v = Variable {
            name: pool.symbol(&name),
            sort: SortId(0),
        };
        let sigma = MapSubstitution::new();
        let resolved = sigma.resolve(&mut pool, v);
        prop_assert_eq!(resolved, pool.var(v));
    }

    #[test]
    fn identity_assignment_removes_from_domain(n in 0u8..20) {
        let mut pool = TermPool::new();
        let mut map = MapSubstitution::new();
        let mut idxed = IndexedSubstitution::new();
        let vars: Vec<Variable> = (0..=n)
            .map(|i| Variable {
                name: pool.symbol(&format!("v{i}")),
                sort: SortId(0),
            })
            .collect();
        let tt = pool.tt();
        for &v in &vars {
            map.assign(v, tt.clone());
            idxed.assign(v, tt.clone());
        }
        for &v in &vars {
            let ve = pool.var(v);
            map.assign(v, ve.clone());
            idxed.assign(v, ve);
        }
        prop_assert!(map.is_identity());
        prop_assert!(idxed.is_identity());
    }

    #[test]
    fn map_and_indexed_substitution_agree(
        assigned in prop::collection::btree_set(0u8..16, 0..8),
        probed in prop::collection::vec(0u8..16, 1..8),
    ) {
        let mut pool = TermPool::new();
        let mut idgen = IdGen::new();
        let vars: Vec<Variable> = (0..16)
            .map(|i| Variable {
                name: pool.symbol(&format!("v{i}")),
                sort: SortId(0),
            })
            .collect();
        let mut map = MapSubstitution::new();
        let mut idxed = IndexedSubstitution::new();
        for &i in &assigned {
            let image = pool.bool_const(i % 2 == 0);
            map.assign(vars[i as usize], image.clone());
            idxed.assign(vars[i as usize], image);
        }
        for &i in &probed {
            let v = vars[i as usize];
            prop_assert_eq!(map.lookup(&v), idxed.lookup(&v));
            let ve = pool.var(v);
            let via_map = apply(&mut pool, &mut idgen, &map, &ve);
            let via_idx = apply(&mut pool, &mut idgen, &idxed, &ve);
            prop_assert_eq!(via_map, via_idx);
        }
    }
}
