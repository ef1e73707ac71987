//! Sorts, constructors and the data specification.

use crate::expr::Symbol;
use ahash::AHashMap;
use std::fmt;

/// Index of a sort in the data specification.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortId(pub u32);

impl fmt::Debug for SortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SortId({})", self.0)
    }
}

/// A constructor of a sort. Nullary constructors have no argument sorts.
/// Constructor applications are normal forms for user rule sets; the only
/// exception is the builtin boolean collapse installed by
/// [`install_bool_sort`], which rewrites the `true`/`false` constructor
/// terms into the pool's sentinel constants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constructor {
    pub name: Symbol,
    pub arg_sorts: Vec<SortId>,
}

/// A declared sort with its ordered constructor list. A sort with zero
/// constructors cannot be enumerated.
#[derive(Clone, Debug)]
pub struct Sort {
    pub name: String,
    pub constructors: Vec<Constructor>,
}

/// The data specification: the sort table consulted by the enumerator and
/// by the ground-naming scheme.
#[derive(Clone, Debug, Default)]
pub struct DataSpec {
    sorts: Vec<Sort>,
    by_name: AHashMap<String, SortId>,
}

impl DataSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a sort with no constructors yet. Redeclaring a name returns
    /// the existing id.
    pub fn add_sort(&mut self, name: &str) -> SortId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = SortId(self.sorts.len() as u32);
        self.sorts.push(Sort {
            name: name.to_string(),
            constructors: Vec::new(),
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Append a constructor to a sort. Declaration order is significant:
    /// the enumerator expands constructors in this order.
    pub fn add_constructor(&mut self, sort: SortId, name: Symbol, arg_sorts: Vec<SortId>) {
        self.sorts[sort.0 as usize]
            .constructors
            .push(Constructor { name, arg_sorts });
    }

    pub fn lookup(&self, name: &str) -> Option<SortId> {
        self.by_name.get(name).copied()
    }

    pub fn sort_name(&self, id: SortId) -> &str {
        &self.sorts[id.0 as usize].name
    }

    pub fn constructors(&self, id: SortId) -> &[Constructor] {
        &self.sorts[id.0 as usize].constructors
    }

    pub fn sort_count(&self) -> usize {
        self.sorts.len()
    }

    /// Whether the head symbol is a constructor of some sort.
    pub fn is_constructor(&self, head: Symbol) -> bool {
        self.sorts
            .iter()
            .any(|s| s.constructors.iter().any(|c| c.name == head))
    }

    /// A sort is certainly finite when it has at least one constructor and
    /// every constructor argument sort is itself certainly finite, with no
    /// recursion through the sort. Recursive sorts (e.g. Peano naturals) and
    /// constructor-less sorts are not certainly finite.
    pub fn is_certainly_finite(&self, id: SortId) -> bool {
        let mut memo = vec![Finiteness::Unknown; self.sorts.len()];
        self.finite_rec(id, &mut memo)
    }

    fn finite_rec(&self, id: SortId, memo: &mut Vec<Finiteness>) -> bool {
        match memo[id.0 as usize] {
            Finiteness::Finite => return true,
            // Visiting means we recursed back into this sort: a cycle.
            Finiteness::Infinite | Finiteness::Visiting => return false,
            Finiteness::Unknown => {}
        }
        memo[id.0 as usize] = Finiteness::Visiting;
        let sort = &self.sorts[id.0 as usize];
        let finite = !sort.constructors.is_empty()
            && sort
                .constructors
                .iter()
                .all(|c| c.arg_sorts.iter().all(|&a| self.finite_rec(a, memo)));
        memo[id.0 as usize] = if finite {
            Finiteness::Finite
        } else {
            Finiteness::Infinite
        };
        finite
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Finiteness {
    Unknown,
    Visiting,
    Finite,
    Infinite,
}

/// Register the builtin boolean sort: constructors `true` and `false`, plus
/// the two rules that collapse the constructor terms into the pool's
/// boolean sentinels, so enumerated booleans take part in connective
/// simplification.
pub fn install_bool_sort(
    pool: &mut crate::expr::TermPool,
    spec: &mut DataSpec,
) -> (SortId, Vec<crate::rule::RewriteRule>) {
    use crate::expr::Args;

    let sort = spec.add_sort("Bool");
    let true_c = pool.symbol("true");
    let false_c = pool.symbol("false");
    spec.add_constructor(sort, true_c, vec![]);
    spec.add_constructor(sort, false_c, vec![]);

    let lhs_t = pool.app(true_c, Args::new());
    let tt = pool.tt();
    let lhs_f = pool.app(false_c, Args::new());
    let ff = pool.ff();
    let rules = vec![
        crate::rule::RewriteRule::new(pool, lhs_t, None, tt)
            .expect("builtin boolean rule is well-formed"),
        crate::rule::RewriteRule::new(pool, lhs_f, None, ff)
            .expect("builtin boolean rule is well-formed"),
    ];
    (sort, rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::TermPool;

    #[test]
    fn bool_is_finite() {
        let mut pool = TermPool::new();
        let mut spec = DataSpec::new();
        let b = spec.add_sort("Bool");
        let t = pool.symbol("true_c");
        let f = pool.symbol("false_c");
        spec.add_constructor(b, t, vec![]);
        spec.add_constructor(b, f, vec![]);
        assert!(spec.is_certainly_finite(b));
        assert_eq!(spec.constructors(b).len(), 2);
    }

    #[test]
    fn peano_nat_is_infinite() {
        let mut pool = TermPool::new();
        let mut spec = DataSpec::new();
        let nat = spec.add_sort("Nat");
        let zero = pool.symbol("zero");
        let succ = pool.symbol("succ");
        spec.add_constructor(nat, zero, vec![]);
        spec.add_constructor(nat, succ, vec![nat]);
        assert!(!spec.is_certainly_finite(nat));
    }

    #[test]
    fn empty_sort_is_not_finite() {
        let mut spec = DataSpec::new();
        let s = spec.add_sort("Void");
        assert!(!spec.is_certainly_finite(s));
    }

    #[test]
    fn pair_of_finite_is_finite() {
        let mut pool = TermPool::new();
        let mut spec = DataSpec::new();
        let b = spec.add_sort("Bool");
        spec.add_constructor(b, pool.symbol("true_c"), vec![]);
        spec.add_constructor(b, pool.symbol("false_c"), vec![]);
        let p = spec.add_sort("Pair");
        spec.add_constructor(p, pool.symbol("pair"), vec![b, b]);
        assert!(spec.is_certainly_finite(p));
    }
}
