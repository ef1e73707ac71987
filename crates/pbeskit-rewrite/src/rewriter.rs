//! Head-symbol-indexed innermost rewriter.

use crate::substitution::{apply, MapSubstitution, Substitution};
use ahash::AHashMap;
use pbeskit_term::{Args, Expr, ExprNode, IdGen, RewriteRule, Symbol, TermPool};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{trace, warn};

/// Recognized rewrite strategy names. Only the innermost engine is
/// implemented; the prover and compiled variants are accepted for
/// compatibility and degrade to it with a warning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RewriteStrategy {
    #[default]
    Innermost,
    InnermostProver,
    Jitty,
    JittyProver,
    CompiledInnermost,
    CompiledJitty,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown rewrite strategy '{0}'")]
pub struct StrategyParseError(pub String);

impl FromStr for RewriteStrategy {
    type Err = StrategyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "innermost" => Ok(RewriteStrategy::Innermost),
            "innermost-prover" => Ok(RewriteStrategy::InnermostProver),
            "jitty" => Ok(RewriteStrategy::Jitty),
            "jitty-prover" => Ok(RewriteStrategy::JittyProver),
            "compiled-innermost" => Ok(RewriteStrategy::CompiledInnermost),
            "compiled-jitty" => Ok(RewriteStrategy::CompiledJitty),
            other => Err(StrategyParseError(other.to_string())),
        }
    }
}

impl fmt::Display for RewriteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RewriteStrategy::Innermost => "innermost",
            RewriteStrategy::InnermostProver => "innermost-prover",
            RewriteStrategy::Jitty => "jitty",
            RewriteStrategy::JittyProver => "jitty-prover",
            RewriteStrategy::CompiledInnermost => "compiled-innermost",
            RewriteStrategy::CompiledJitty => "compiled-jitty",
        };
        f.write_str(name)
    }
}

/// Normalizes expressions against a rule set. Rules are indexed by the head
/// symbol of their pattern; within one head, candidates are tried in
/// declaration order.
///
/// Termination is the rule set's problem, not the rewriter's: a
/// non-terminating rule set loops. Callers needing liveness bound the work
/// externally.
#[derive(Debug, Default)]
pub struct Rewriter {
    index: AHashMap<Symbol, Vec<RewriteRule>>,
    rule_count: usize,
}

impl Rewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a rewriter from validated rules.
    pub fn with_rules(rules: impl IntoIterator<Item = RewriteRule>) -> Self {
        let mut rw = Rewriter::new();
        for rule in rules {
            rw.add_rule(rule);
        }
        rw
    }

    /// Select the engine for a requested strategy. Everything other than
    /// plain innermost falls back to it.
    pub fn with_strategy(
        strategy: RewriteStrategy,
        rules: impl IntoIterator<Item = RewriteRule>,
    ) -> Self {
        if strategy != RewriteStrategy::Innermost {
            warn!(%strategy, "strategy not available, using innermost");
        }
        Self::with_rules(rules)
    }

    /// Insert a rule at the end of its head's candidate list. Structural
    /// validation already happened at [`RewriteRule`] construction.
    pub fn add_rule(&mut self, rule: RewriteRule) {
        self.index.entry(rule.head()).or_default().push(rule);
        self.rule_count += 1;
    }

    /// Remove a previously added rule. Returns whether it was present.
    pub fn remove_rule(&mut self, rule: &RewriteRule) -> bool {
        if let Some(rules) = self.index.get_mut(&rule.head()) {
            let before = rules.len();
            rules.retain(|r| r != rule);
            let removed = before - rules.len();
            self.rule_count -= removed;
            return removed > 0;
        }
        false
    }

    pub fn rule_count(&self) -> usize {
        self.rule_count
    }

    /// Candidate rules for a head symbol, in declaration order.
    pub fn rules_for(&self, head: Symbol) -> &[RewriteRule] {
        self.index.get(&head).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reduce an expression to normal form: innermost, bottom-up. Boolean
    /// connectives and quantifier bodies are simplified with the pool's
    /// optimized constructors in the same pass.
    pub fn rewrite(&self, pool: &mut TermPool, idgen: &mut IdGen, e: &Expr) -> Expr {
        match e.node() {
            ExprNode::Bool(_) | ExprNode::Var(_) => e.clone(),
            ExprNode::App(head, args) => {
                let head = *head;
                let new_args: Args = args
                    .clone()
                    .iter()
                    .map(|a| self.rewrite(pool, idgen, a))
                    .collect();
                self.rewrite_head(pool, idgen, head, new_args)
            }
            ExprNode::PropVar(name, args) => {
                let name = *name;
                let new_args: Args = args
                    .clone()
                    .iter()
                    .map(|a| self.rewrite(pool, idgen, a))
                    .collect();
                pool.prop_var(name, new_args)
            }
            ExprNode::Not(inner) => {
                let inner = inner.clone();
                let n = self.rewrite(pool, idgen, &inner);
                pool.not_(n)
            }
            ExprNode::And(l, r) => {
                let (l, r) = (l.clone(), r.clone());
                let nl = self.rewrite(pool, idgen, &l);
                if nl.is_false() {
                    return pool.ff();
                }
                let nr = self.rewrite(pool, idgen, &r);
                pool.and_(nl, nr)
            }
            ExprNode::Or(l, r) => {
                let (l, r) = (l.clone(), r.clone());
                let nl = self.rewrite(pool, idgen, &l);
                if nl.is_true() {
                    return pool.tt();
                }
                let nr = self.rewrite(pool, idgen, &r);
                pool.or_(nl, nr)
            }
            ExprNode::Implies(l, r) => {
                let (l, r) = (l.clone(), r.clone());
                let nl = self.rewrite(pool, idgen, &l);
                if nl.is_false() {
                    return pool.tt();
                }
                let nr = self.rewrite(pool, idgen, &r);
                pool.implies(nl, nr)
            }
            ExprNode::Forall(vars, body) => {
                let (vars, body) = (vars.clone(), body.clone());
                let nb = self.rewrite(pool, idgen, &body);
                pool.forall(vars, nb)
            }
            ExprNode::Exists(vars, body) => {
                let (vars, body) = (vars.clone(), body.clone());
                let nb = self.rewrite(pool, idgen, &body);
                pool.exists(vars, nb)
            }
        }
    }

    /// Rewrite under a substitution: the expression's free variables are
    /// resolved through `sigma` (capture-avoiding) before normalization.
    pub fn rewrite_under<S: Substitution>(
        &self,
        pool: &mut TermPool,
        idgen: &mut IdGen,
        sigma: &S,
        e: &Expr,
    ) -> Expr {
        let resolved = apply(pool, idgen, sigma, e);
        self.rewrite(pool, idgen, &resolved)
    }

    /// Try the candidate rules on an application whose arguments are already
    /// in normal form. The first match whose condition reduces to `true`
    /// fires; its instantiated replacement is normalized recursively, so the
    /// returned expression needs no further top-level pass.
    fn rewrite_head(
        &self,
        pool: &mut TermPool,
        idgen: &mut IdGen,
        head: Symbol,
        args: Args,
    ) -> Expr {
        let subject = pool.app(head, args);
        let Some(rules) = self.index.get(&head) else {
            return subject;
        };
        for rule in rules {
            let mut bindings = MapSubstitution::new();
            if !match_pattern(rule.lhs(), &subject, &mut bindings) {
                continue;
            }
            let condition_holds = match rule.condition() {
                None => true,
                Some(cond) => self
                    .rewrite_under(pool, idgen, &bindings, cond)
                    .is_true(),
            };
            if !condition_holds {
                continue;
            }
            trace!(
                head = pool.symbol_name(head),
                "rule fired"
            );
            let replaced = apply(pool, idgen, &bindings, rule.rhs());
            return self.rewrite(pool, idgen, &replaced);
        }
        subject
    }
}

/// First-order structural matching of a pattern against a subject in normal
/// form. Non-linear patterns require equal (pointer-identical) subterms.
fn match_pattern(pattern: &Expr, subject: &Expr, bindings: &mut MapSubstitution) -> bool {
    match (pattern.node(), subject.node()) {
        (ExprNode::Var(v), _) => {
            if let Some(bound) = bindings.lookup(v) {
                bound == subject
            } else {
                // Identity assignments vanish from the domain, which is
                // exactly right: the pattern variable matched itself.
                bindings.assign(*v, subject.clone());
                true
            }
        }
        (ExprNode::Bool(a), ExprNode::Bool(b)) => a == b,
        (ExprNode::App(f, pargs), ExprNode::App(g, sargs)) => {
            f == g
                && pargs.len() == sargs.len()
                && pargs
                    .iter()
                    .zip(sargs.iter())
                    .all(|(p, s)| match_pattern(p, s, bindings))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbeskit_term::{SortId, Variable};

    struct Peano {
        pool: TermPool,
        idgen: IdGen,
        rw: Rewriter,
        zero: Symbol,
        succ: Symbol,
        add: Symbol,
    }

    /// zero/succ naturals with `add(zero, y) -> y` and
    /// `add(succ(x), y) -> succ(add(x, y))`.
    fn peano() -> Peano {
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

        let rw = Rewriter::with_rules([rule1, rule2]);
        Peano {
            pool,
            idgen: IdGen::new(),
            rw,
            zero,
            succ,
            add,
        }
    }

    fn num(p: &mut Peano, n: usize) -> Expr {
        let mut e = p.pool.app(p.zero, Args::new());
        for _ in 0..n {
            e = p.pool.app(p.succ, Args::from_vec(vec![e]));
        }
        e
    }

    #[test]
    fn addition_normalizes() {
        let mut p = peano();
        let two = num(&mut p, 2);
        let three = num(&mut p, 3);
        let five = num(&mut p, 5);
        let sum = p.pool.app(p.add, Args::from_vec(vec![two, three]));
        let nf = p.rw.rewrite(&mut p.pool, &mut p.idgen, &sum);
        assert_eq!(nf, five);
    }

    #[test]
    fn rewriting_is_idempotent() {
        let mut p = peano();
        let two = num(&mut p, 2);
        let three = num(&mut p, 3);
        let sum = p.pool.app(p.add, Args::from_vec(vec![two, three]));
        let once = p.rw.rewrite(&mut p.pool, &mut p.idgen, &sum);
        let twice = p.rw.rewrite(&mut p.pool, &mut p.idgen, &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn no_matching_rule_leaves_normal_form() {
        let mut p = peano();
        let n = num(&mut p, 4);
        let nf = p.rw.rewrite(&mut p.pool, &mut p.idgen, &n);
        assert_eq!(nf, n);
    }

    #[test]
    fn rewrite_under_substitution_resolves_first() {
        let mut p = peano();
        let nat = SortId(0);
        let v = Variable {
            name: p.pool.symbol("k"),
            sort: nat,
        };
        let ve = p.pool.var(v);
        let one = num(&mut p, 1);
        let sum = p.pool.app(p.add, Args::from_vec(vec![one, ve]));

        let mut sigma = MapSubstitution::new();
        let two = num(&mut p, 2);
        sigma.assign(v, two);

        let nf = p
            .rw
            .rewrite_under(&mut p.pool, &mut p.idgen, &sigma, &sum);
        let three = num(&mut p, 3);
        assert_eq!(nf, three);
    }

    #[test]
    fn conditional_rule_fires_only_when_condition_holds() {
        // f(x) -> zero if is_zero(x), with is_zero defined on constructors.
        let mut pool = TermPool::new();
        let zero = pool.symbol("zero");
        let succ = pool.symbol("succ");
        let f = pool.symbol("f");
        let is_zero = pool.symbol("is_zero");
        let nat = SortId(0);
        let x = Variable {
            name: pool.symbol("x"),
            sort: nat,
        };
        let xe = pool.var(x);
        let zero_e = pool.app(zero, Args::new());

        let iz_zero = pool.app(is_zero, Args::from_vec(vec![zero_e.clone()]));
        let r1 = RewriteRule::new(&pool, iz_zero, None, pool.tt()).unwrap();
        let sx = pool.app(succ, Args::from_vec(vec![xe.clone()]));
        let iz_succ = pool.app(is_zero, Args::from_vec(vec![sx]));
        let r2 = RewriteRule::new(&pool, iz_succ, None, pool.ff()).unwrap();

        let fx = pool.app(f, Args::from_vec(vec![xe.clone()]));
        let cond = pool.app(is_zero, Args::from_vec(vec![xe]));
        let r3 = RewriteRule::new(&pool, fx, Some(cond), zero_e.clone()).unwrap();

        let rw = Rewriter::with_rules([r1, r2, r3]);
        let mut idgen = IdGen::new();

        let f_zero = pool.app(f, Args::from_vec(vec![zero_e.clone()]));
        let nf = rw.rewrite(&mut pool, &mut idgen, &f_zero);
        assert_eq!(nf, zero_e);

        let one = {
            let z = pool.app(zero, Args::new());
            pool.app(succ, Args::from_vec(vec![z]))
        };
        let f_one = pool.app(f, Args::from_vec(vec![one.clone()]));
        let nf = rw.rewrite(&mut pool, &mut idgen, &f_one);
        // Condition fails: f(succ(zero)) is its own normal form.
        let expected = pool.app(f, Args::from_vec(vec![one]));
        assert_eq!(nf, expected);
    }

    #[test]
    fn declaration_order_decides_between_overlapping_rules() {
        let mut pool = TermPool::new();
        let g = pool.symbol("g");
        let a = pool.symbol("a");
        let b = pool.symbol("b");
        let x = Variable {
            name: pool.symbol("x"),
            sort: SortId(0),
        };
        let xe = pool.var(x);
        let gx = pool.app(g, Args::from_vec(vec![xe.clone()]));
        let ae = pool.app(a, Args::new());
        let be = pool.app(b, Args::new());
        let r_first = RewriteRule::new(&pool, gx.clone(), None, ae.clone()).unwrap();
        let r_second = RewriteRule::new(&pool, gx, None, be).unwrap();

        let rw = Rewriter::with_rules([r_first, r_second]);
        let mut idgen = IdGen::new();
        let c = pool.symbol("c");
        let ce = pool.app(c, Args::new());
        let g_c = pool.app(g, Args::from_vec(vec![ce]));
        let nf = rw.rewrite(&mut pool, &mut idgen, &g_c);
        assert_eq!(nf, ae);
    }

    #[test]
    fn nonlinear_pattern_requires_equal_subterms() {
        let mut pool = TermPool::new();
        let eq = pool.symbol("eq");
        let x = Variable {
            name: pool.symbol("x"),
            sort: SortId(0),
        };
        let xe = pool.var(x);
        let lhs = pool.app(eq, Args::from_vec(vec![xe.clone(), xe]));
        let rule = RewriteRule::new(&pool, lhs, None, pool.tt()).unwrap();
        let rw = Rewriter::with_rules([rule]);
        let mut idgen = IdGen::new();

        let a_sym = pool.symbol("a");
        let b_sym = pool.symbol("b");
        let a = pool.app(a_sym, Args::new());
        let b = pool.app(b_sym, Args::new());
        let eq_aa = pool.app(eq, Args::from_vec(vec![a.clone(), a.clone()]));
        let eq_ab = pool.app(eq, Args::from_vec(vec![a, b]));

        let nf = rw.rewrite(&mut pool, &mut idgen, &eq_aa);
        assert!(nf.is_true());
        let nf = rw.rewrite(&mut pool, &mut idgen, &eq_ab);
        assert_eq!(nf, eq_ab);
    }

    #[test]
    fn removed_rule_no_longer_fires() {
        let mut pool = TermPool::new();
        let g = pool.symbol("g");
        let x = Variable {
            name: pool.symbol("x"),
            sort: SortId(0),
        };
        let xe = pool.var(x);
        let gx = pool.app(g, Args::from_vec(vec![xe.clone()]));
        let rule = RewriteRule::new(&pool, gx, None, xe).unwrap();

        let mut rw = Rewriter::with_rules([rule.clone()]);
        let mut idgen = IdGen::new();
        let a_sym = pool.symbol("a");
        let a = pool.app(a_sym, Args::new());
        let g_a = pool.app(g, Args::from_vec(vec![a.clone()]));
        assert_eq!(rw.rewrite(&mut pool, &mut idgen, &g_a), a);

        assert!(rw.remove_rule(&rule));
        assert!(!rw.remove_rule(&rule));
        assert_eq!(rw.rewrite(&mut pool, &mut idgen, &g_a), g_a);
    }

    #[test]
    fn strategy_names_parse() {
        assert_eq!(
            "innermost".parse::<RewriteStrategy>().unwrap(),
            RewriteStrategy::Innermost
        );
        assert_eq!(
            "jitty".parse::<RewriteStrategy>().unwrap(),
            RewriteStrategy::Jitty
        );
        assert!("native".parse::<RewriteStrategy>().is_err());
    }
}
