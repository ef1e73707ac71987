//! The constructor-expansion enumerator.

use pbeskit_rewrite::{MapSubstitution, Rewriter};
use pbeskit_term::{Args, DataSpec, Expr, IdGen, SortId, TermPool, Variable};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::debug;

/// Raised when enumeration reaches a variable whose sort has no
/// constructors. Recoverable by design: the instantiation worklist catches
/// it per equation instead of aborting the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot enumerate variable '{variable_name}': sort '{sort_name}' has no constructors")]
pub struct EnumerationError {
    pub variable: Variable,
    pub sort: SortId,
    pub variable_name: String,
    pub sort_name: String,
}

/// Decides which fully-instantiated conditions are yielded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selector {
    /// Yield only conditions that rewrote to the constant `true`.
    MustBeTrue,
    /// Yield only conditions that rewrote to the constant `false`.
    MustBeFalse,
    /// Yield anything not known to be `false`. The right choice when the
    /// condition still contains free variables outside the enumerated set.
    NotFalse,
}

impl Selector {
    /// Does a candidate's condition satisfy this selector?
    pub fn accepts(self, condition: &Expr) -> bool {
        match self {
            Selector::MustBeTrue => condition.is_true(),
            Selector::MustBeFalse => condition.is_false(),
            Selector::NotFalse => !condition.is_false(),
        }
    }

    /// Can a partially-instantiated condition still satisfy this selector?
    /// A branch failing this is pruned without expansion.
    fn viable(self, condition: &Expr) -> bool {
        match self {
            Selector::MustBeTrue | Selector::NotFalse => !condition.is_false(),
            Selector::MustBeFalse => !condition.is_true(),
        }
    }
}

/// Shared, read-only lookup context for enumeration. Cursors borrow it, so
/// forking a cursor never copies the constructor catalog.
pub struct EnumeratorContext<'a> {
    spec: &'a DataSpec,
}

impl<'a> EnumeratorContext<'a> {
    pub fn new(spec: &'a DataSpec) -> Self {
        EnumeratorContext { spec }
    }

    pub fn spec(&self) -> &DataSpec {
        self.spec
    }
}

/// One yielded solution: the substitution over the enumerated variables and
/// the condition as rewritten under it (so callers need not re-rewrite).
#[derive(Clone, Debug)]
pub struct Valuation {
    pub substitution: MapSubstitution,
    pub condition: Expr,
}

/// A node of the search tree: a partial substitution, the variables still
/// to instantiate, and the condition rewritten under the partial
/// substitution.
#[derive(Clone)]
struct Node {
    sigma: MapSubstitution,
    pending: VecDeque<Variable>,
    condition: Expr,
}

/// Breadth-first cursor over the valuations of a variable set.
///
/// `Clone` forks the cursor: both copies traverse the remaining sequence
/// independently. Enumeration over a recursively constructed sort is
/// infinite; callers impose their own yield bound.
pub struct Enumerator<'a> {
    ctx: &'a EnumeratorContext<'a>,
    selector: Selector,
    queue: VecDeque<Node>,
}

impl<'a> Clone for Enumerator<'a> {
    fn clone(&self) -> Self {
        Enumerator {
            ctx: self.ctx,
            selector: self.selector,
            queue: self.queue.clone(),
        }
    }
}

impl<'a> Enumerator<'a> {
    /// Start a cursor over `variables` with the given condition. The
    /// condition is expected to be in normal form already; enumeration
    /// rewrites it further under every extension of the substitution.
    pub fn new(
        ctx: &'a EnumeratorContext<'a>,
        selector: Selector,
        variables: &[Variable],
        condition: Expr,
    ) -> Self {
        let mut queue = VecDeque::new();
        queue.push_back(Node {
            sigma: MapSubstitution::new(),
            pending: variables.iter().copied().collect(),
            condition,
        });
        Enumerator {
            ctx,
            selector,
            queue,
        }
    }

    /// Advance to the next valuation. Returns `None` when the search space
    /// is exhausted; a zero-constructor sort yields an error and exhausts
    /// the cursor.
    pub fn next(
        &mut self,
        pool: &mut TermPool,
        idgen: &mut IdGen,
        rewriter: &Rewriter,
    ) -> Option<Result<Valuation, EnumerationError>> {
        while let Some(mut node) = self.queue.pop_front() {
            let Some(v) = node.pending.pop_front() else {
                if self.selector.accepts(&node.condition) {
                    return Some(Ok(Valuation {
                        substitution: node.sigma,
                        condition: node.condition,
                    }));
                }
                continue;
            };

            let constructors = self.ctx.spec.constructors(v.sort);
            if constructors.is_empty() {
                self.queue.clear();
                return Some(Err(EnumerationError {
                    variable: v,
                    sort: v.sort,
                    variable_name: pool.symbol_name(v.name).to_string(),
                    sort_name: self.ctx.spec.sort_name(v.sort).to_string(),
                }));
            }

            // Expand in constructor declaration order; children go to the
            // back of the queue, giving breadth-first traversal.
            for ctor in constructors.iter().cloned() {
                let mut fresh_vars = Vec::with_capacity(ctor.arg_sorts.len());
                let mut args = Args::new();
                for &arg_sort in &ctor.arg_sorts {
                    let fresh = Variable {
                        name: idgen.fresh(pool, v.name),
                        sort: arg_sort,
                    };
                    fresh_vars.push(fresh);
                    args.push(pool.var(fresh));
                }
                let term = pool.app(ctor.name, args);

                let mut delta = MapSubstitution::new();
                delta.assign(v, term.clone());
                let condition = rewriter.rewrite_under(pool, idgen, &delta, &node.condition);
                if !self.selector.viable(&condition) {
                    debug!(
                        variable = pool.symbol_name(v.name),
                        constructor = pool.symbol_name(ctor.name),
                        "branch pruned"
                    );
                    continue;
                }

                let mut sigma = node.sigma.clone();
                // Later instantiation of the fresh argument variables must
                // reach into previously assigned images as well.
                for (var, image) in node.sigma.iter() {
                    let refined = apply_delta(pool, idgen, &delta, image);
                    sigma.assign(*var, refined);
                }
                sigma.assign(v, term);

                let mut pending = node.pending.clone();
                pending.extend(fresh_vars.iter().copied());
                self.queue.push_back(Node {
                    sigma,
                    pending,
                    condition,
                });
            }
        }
        None
    }

    /// Collect up to `bound` valuations. `None` means unbounded; use only
    /// with conditions known to have a finite search space.
    pub fn collect_up_to(
        &mut self,
        pool: &mut TermPool,
        idgen: &mut IdGen,
        rewriter: &Rewriter,
        bound: Option<usize>,
    ) -> Result<Vec<Valuation>, EnumerationError> {
        let mut out = Vec::new();
        while let Some(item) = self.next(pool, idgen, rewriter) {
            out.push(item?);
            if let Some(limit) = bound {
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }
}

fn apply_delta(
    pool: &mut TermPool,
    idgen: &mut IdGen,
    delta: &MapSubstitution,
    image: &Expr,
) -> Expr {
    if delta.is_identity() {
        image.clone()
    } else {
        pbeskit_rewrite::apply(pool, idgen, delta, image)
    }
}
