//! Worklist-driven lowering of a PBES into a ground BES.

use crate::naming::{GroundNames, GroundNamingError};
use crate::pbes::{Bes, BesEquation, Pbes};
use ahash::AHashMap;
use pbeskit_enumerate::{Enumerator, EnumeratorContext, Selector};
use pbeskit_rewrite::{IndexedSubstitution, Rewriter, Substitution};
use pbeskit_term::{Args, DataSpec, Expr, ExprNode, IdGen, Symbol, TermPool, Variable};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fatal instantiation failures: structurally invalid input. Everything
/// local to one equation (enumeration, ground naming) is handled inside the
/// worklist loop instead.
#[derive(Debug, Error)]
pub enum InstantiationError {
    #[error("initial state '{0}' is not a propositional variable instantiation")]
    MalformedInitialState(String),

    #[error("propositional variable '{0}' has no declaring equation")]
    UndeclaredVariable(String),

    #[error("'{name}' declares {expected} formal parameters but is instantiated with {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("cannot name the initial instantiation: {0}")]
    InitialNaming(#[source] GroundNamingError),
}

pub type InstantiateResult<T> = Result<T, InstantiationError>;

/// Which instantiation algorithm to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Explore only instantiations reachable from the initial one,
    /// breadth-first, with the dedup cache. Output is minimal but unbounded
    /// when the reachable set is infinite.
    #[default]
    Lazy,
    /// Pre-enumerate the cross-product of every certainly-finite declared
    /// parameter, once per equation, reachability ignored.
    Finite,
}

/// What to do with an equation whose quantifier could not be expanded or
/// whose instantiation could not be named.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EnumErrorFallback {
    /// Emit the equation with the offending part left symbolic.
    #[default]
    KeepSymbolic,
    /// Drop just that equation and keep going.
    DropEquation,
}

#[derive(Clone, Debug, Default)]
pub struct InstantiateConfig {
    pub strategy: Strategy,
    /// Maximum yields per quantifier occurrence. Exceeding it is treated
    /// like an enumeration failure: a truncated conjunction or disjunction
    /// would be unsound.
    pub enum_bound: Option<usize>,
    pub on_enum_error: EnumErrorFallback,
    /// Relevant to the finite strategy: do not fail when the initial
    /// instantiation cannot be resolved.
    pub ignore_initial_state: bool,
}

/// One pending node of the lazy exploration: a discovered PVI with its
/// ground name, declaring equation and normalized argument values.
struct Pending {
    ground: Symbol,
    eq_idx: usize,
    args: Args,
}

/// Per-equation outcome flags, inspected against the configured fallback.
#[derive(Default)]
struct EquationStatus {
    failed: bool,
}

/// Lowers a PBES into a BES. Owns no state across runs; the rewriter and
/// data specification are borrowed read-only, per-run state (worklist,
/// dedup cache) lives inside `run`.
pub struct Instantiator<'a> {
    spec: &'a DataSpec,
    rewriter: &'a Rewriter,
    config: InstantiateConfig,
}

impl<'a> Instantiator<'a> {
    pub fn new(spec: &'a DataSpec, rewriter: &'a Rewriter, config: InstantiateConfig) -> Self {
        Instantiator {
            spec,
            rewriter,
            config,
        }
    }

    pub fn run(
        &self,
        pool: &mut TermPool,
        idgen: &mut IdGen,
        pbes: &Pbes,
    ) -> InstantiateResult<Bes> {
        match self.config.strategy {
            Strategy::Lazy => self.run_lazy(pool, idgen, pbes),
            Strategy::Finite => self.run_finite(pool, idgen, pbes),
        }
    }

    fn run_lazy(
        &self,
        pool: &mut TermPool,
        idgen: &mut IdGen,
        pbes: &Pbes,
    ) -> InstantiateResult<Bes> {
        let index = pbes.equation_index();
        let ctx = EnumeratorContext::new(self.spec);
        let mut names = GroundNames::new();

        let initial_nf = self.rewriter.rewrite(pool, idgen, &pbes.initial);
        let (init_name, init_args) = match initial_nf.node() {
            ExprNode::PropVar(name, args) => (*name, args.clone()),
            _ => {
                return Err(InstantiationError::MalformedInitialState(
                    pool.expr_to_string(&initial_nf),
                ))
            }
        };
        let init_idx = self.lookup_equation(pool, &index, init_name)?;
        self.check_arity(pool, pbes, init_idx, init_args.len())?;
        let init_ground = names
            .resolve(pool, self.spec, &pbes.equations[init_idx].var, &init_args)
            .map_err(InstantiationError::InitialNaming)?;

        let mut worklist: VecDeque<Pending> = VecDeque::new();
        worklist.push_back(Pending {
            ground: init_ground.name,
            eq_idx: init_idx,
            args: init_args,
        });

        let mut emitted: Vec<(usize, BesEquation)> = Vec::new();
        while let Some(pending) = worklist.pop_front() {
            let eq = &pbes.equations[pending.eq_idx];
            debug!(
                equation = pool.symbol_name(eq.var.name),
                ground = pool.symbol_name(pending.ground),
                queued = worklist.len(),
                "expanding instantiation"
            );

            let mut sigma = IndexedSubstitution::new();
            for (param, arg) in eq.var.params.iter().zip(pending.args.iter()) {
                sigma.assign(*param, arg.clone());
            }
            let formula = self
                .rewriter
                .rewrite_under(pool, idgen, &sigma, &eq.formula);

            let mut status = EquationStatus::default();
            let formula = self.eliminate_quantifiers(pool, idgen, &ctx, &formula, &mut status);
            let formula = self.rename_pvis(
                pool,
                idgen,
                pbes,
                &index,
                &mut names,
                &mut worklist,
                true,
                &mut status,
                &formula,
            )?;
            if status.failed && self.config.on_enum_error == EnumErrorFallback::DropEquation {
                warn!(
                    ground = pool.symbol_name(pending.ground),
                    "dropping equation after enumeration failure"
                );
                continue;
            }

            emitted.push((
                pending.eq_idx,
                BesEquation {
                    fixpoint: eq.fixpoint,
                    name: pending.ground,
                    formula,
                },
            ));
        }

        info!(
            equations = emitted.len(),
            names = names.len(),
            "lazy instantiation finished"
        );
        Ok(finish(emitted, init_ground.name))
    }

    fn run_finite(
        &self,
        pool: &mut TermPool,
        idgen: &mut IdGen,
        pbes: &Pbes,
    ) -> InstantiateResult<Bes> {
        let index = pbes.equation_index();
        let ctx = EnumeratorContext::new(self.spec);
        let mut names = GroundNames::new();
        let mut emitted: Vec<(usize, BesEquation)> = Vec::new();
        // The finite strategy never feeds the worklist; PVIs found in
        // formulas are renamed through the same cache only.
        let mut sink: VecDeque<Pending> = VecDeque::new();

        for (eq_idx, eq) in pbes.equations.iter().enumerate() {
            let finite_params: Vec<Variable> = eq
                .var
                .params
                .iter()
                .copied()
                .filter(|p| self.spec.is_certainly_finite(p.sort))
                .collect();
            let tt = pool.tt();
            let mut cursor = Enumerator::new(&ctx, Selector::NotFalse, &finite_params, tt);
            // Certainly-finite sorts cannot raise the zero-constructor
            // error, and their search space is finite, so no bound.
            let valuations = match cursor.collect_up_to(pool, idgen, self.rewriter, None) {
                Ok(v) => v,
                Err(err) => {
                    warn!(%err, equation = pool.symbol_name(eq.var.name), "skipping equation");
                    continue;
                }
            };

            for val in valuations {
                let mut args = Args::new();
                for p in &eq.var.params {
                    match val.substitution.lookup(p) {
                        Some(image) => {
                            let image = image.clone();
                            args.push(self.rewriter.rewrite(pool, idgen, &image));
                        }
                        None => args.push(pool.var(*p)),
                    }
                }
                let ground = match names.resolve(pool, self.spec, &eq.var, &args) {
                    Ok(g) => g,
                    Err(err) => {
                        warn!(%err, "skipping combination");
                        continue;
                    }
                };

                let mut sigma = IndexedSubstitution::new();
                for (p, a) in eq.var.params.iter().zip(args.iter()) {
                    sigma.assign(*p, a.clone());
                }
                let formula = self
                    .rewriter
                    .rewrite_under(pool, idgen, &sigma, &eq.formula);
                let mut status = EquationStatus::default();
                let formula =
                    self.eliminate_quantifiers(pool, idgen, &ctx, &formula, &mut status);
                let formula = self.rename_pvis(
                    pool,
                    idgen,
                    pbes,
                    &index,
                    &mut names,
                    &mut sink,
                    false,
                    &mut status,
                    &formula,
                )?;
                if status.failed && self.config.on_enum_error == EnumErrorFallback::DropEquation {
                    warn!(
                        ground = pool.symbol_name(ground.name),
                        "dropping combination after enumeration failure"
                    );
                    continue;
                }
                emitted.push((
                    eq_idx,
                    BesEquation {
                        fixpoint: eq.fixpoint,
                        name: ground.name,
                        formula,
                    },
                ));
            }
        }

        let initial = self.finite_initial(pool, idgen, pbes, &index, &mut names, &emitted)?;
        info!(
            equations = emitted.len(),
            names = names.len(),
            "finite instantiation finished"
        );
        Ok(finish(emitted, initial))
    }

    /// Resolve the initial PVI for the finite strategy. With
    /// `ignore_initial_state` set, resolution failures fall back to the
    /// first emitted equation.
    fn finite_initial(
        &self,
        pool: &mut TermPool,
        idgen: &mut IdGen,
        pbes: &Pbes,
        index: &AHashMap<Symbol, usize>,
        names: &mut GroundNames,
        emitted: &[(usize, BesEquation)],
    ) -> InstantiateResult<Symbol> {
        let fallback = |pool: &mut TermPool| {
            emitted
                .first()
                .map(|(_, eq)| eq.name)
                .unwrap_or_else(|| pool.symbol("init"))
        };

        let initial_nf = self.rewriter.rewrite(pool, idgen, &pbes.initial);
        let (name, args) = match initial_nf.node() {
            ExprNode::PropVar(name, args) => (*name, args.clone()),
            _ if self.config.ignore_initial_state => return Ok(fallback(pool)),
            _ => {
                return Err(InstantiationError::MalformedInitialState(
                    pool.expr_to_string(&initial_nf),
                ))
            }
        };
        let eq_idx = match index.get(&name) {
            Some(&i) => i,
            None if self.config.ignore_initial_state => return Ok(fallback(pool)),
            None => {
                return Err(InstantiationError::UndeclaredVariable(
                    pool.symbol_name(name).to_string(),
                ))
            }
        };
        self.check_arity(pool, pbes, eq_idx, args.len())?;
        // Finite instantiation keys instances by their certainly-finite
        // parameters only; align the initial PVI by replacing the other
        // argument values with their formals.
        let decl = &pbes.equations[eq_idx].var;
        let keyed: Args = decl
            .params
            .iter()
            .zip(args.iter())
            .map(|(p, a)| {
                if self.spec.is_certainly_finite(p.sort) {
                    a.clone()
                } else {
                    pool.var(*p)
                }
            })
            .collect();
        match names.resolve(pool, self.spec, decl, &keyed) {
            Ok(g) => Ok(g.name),
            Err(_) if self.config.ignore_initial_state => Ok(fallback(pool)),
            Err(err) => Err(InstantiationError::InitialNaming(err)),
        }
    }

    fn lookup_equation(
        &self,
        pool: &TermPool,
        index: &AHashMap<Symbol, usize>,
        name: Symbol,
    ) -> InstantiateResult<usize> {
        index.get(&name).copied().ok_or_else(|| {
            InstantiationError::UndeclaredVariable(pool.symbol_name(name).to_string())
        })
    }

    fn check_arity(
        &self,
        pool: &TermPool,
        pbes: &Pbes,
        eq_idx: usize,
        actual: usize,
    ) -> InstantiateResult<()> {
        let decl = &pbes.equations[eq_idx].var;
        if decl.params.len() != actual {
            return Err(InstantiationError::ArityMismatch {
                name: pool.symbol_name(decl.name).to_string(),
                expected: decl.params.len(),
                actual,
            });
        }
        Ok(())
    }

    /// Replace every remaining quantifier by a finite conjunction or
    /// disjunction over enumerated instances, short-circuiting on the
    /// absorbing element. A failed expansion flags the equation and leaves
    /// the quantifier in place.
    fn eliminate_quantifiers(
        &self,
        pool: &mut TermPool,
        idgen: &mut IdGen,
        ctx: &EnumeratorContext<'_>,
        e: &Expr,
        status: &mut EquationStatus,
    ) -> Expr {
        match e.node() {
            ExprNode::Bool(_)
            | ExprNode::Var(_)
            | ExprNode::App(..)
            | ExprNode::PropVar(..) => e.clone(),
            ExprNode::Not(inner) => {
                let inner = inner.clone();
                let n = self.eliminate_quantifiers(pool, idgen, ctx, &inner, status);
                pool.not_(n)
            }
            ExprNode::And(l, r) => {
                let (l, r) = (l.clone(), r.clone());
                let nl = self.eliminate_quantifiers(pool, idgen, ctx, &l, status);
                if nl.is_false() {
                    return pool.ff();
                }
                let nr = self.eliminate_quantifiers(pool, idgen, ctx, &r, status);
                pool.and_(nl, nr)
            }
            ExprNode::Or(l, r) => {
                let (l, r) = (l.clone(), r.clone());
                let nl = self.eliminate_quantifiers(pool, idgen, ctx, &l, status);
                if nl.is_true() {
                    return pool.tt();
                }
                let nr = self.eliminate_quantifiers(pool, idgen, ctx, &r, status);
                pool.or_(nl, nr)
            }
            ExprNode::Implies(l, r) => {
                let (l, r) = (l.clone(), r.clone());
                let nl = self.eliminate_quantifiers(pool, idgen, ctx, &l, status);
                if nl.is_false() {
                    return pool.tt();
                }
                let nr = self.eliminate_quantifiers(pool, idgen, ctx, &r, status);
                pool.implies(nl, nr)
            }
            ExprNode::Forall(vars, body) => {
                let (vars, body) = (vars.clone(), body.clone());
                let body = self.eliminate_quantifiers(pool, idgen, ctx, &body, status);
                self.expand_forall(pool, idgen, ctx, &vars, &body, status)
            }
            ExprNode::Exists(vars, body) => {
                let (vars, body) = (vars.clone(), body.clone());
                let body = self.eliminate_quantifiers(pool, idgen, ctx, &body, status);
                self.expand_exists(pool, idgen, ctx, &vars, &body, status)
            }
        }
    }

    /// `exists v... . body` becomes the disjunction of the body over every
    /// enumerated valuation. Valuations whose body is already `false` are
    /// pruned inside the enumerator.
    fn expand_exists(
        &self,
        pool: &mut TermPool,
        idgen: &mut IdGen,
        ctx: &EnumeratorContext<'_>,
        vars: &[Variable],
        body: &Expr,
        status: &mut EquationStatus,
    ) -> Expr {
        let mut cursor = Enumerator::new(ctx, Selector::NotFalse, vars, body.clone());
        let mut acc = pool.ff();
        let mut yields = 0usize;
        while let Some(item) = cursor.next(pool, idgen, self.rewriter) {
            match item {
                Ok(val) => {
                    yields += 1;
                    if self.exceeds_bound(yields) {
                        warn!("enumeration bound hit, keeping existential symbolic");
                        status.failed = true;
                        return pool.exists(vars.to_vec(), body.clone());
                    }
                    acc = pool.or_(acc, val.condition);
                    if acc.is_true() {
                        return acc;
                    }
                }
                Err(err) => {
                    warn!(%err, "cannot expand existential");
                    status.failed = true;
                    return pool.exists(vars.to_vec(), body.clone());
                }
            }
        }
        acc
    }

    /// `forall v... . body` enumerates the negated body: every yielded
    /// valuation is a potential counterexample, and the conjunction of the
    /// un-negated instances is the result. No yields means no valuation can
    /// falsify the body.
    fn expand_forall(
        &self,
        pool: &mut TermPool,
        idgen: &mut IdGen,
        ctx: &EnumeratorContext<'_>,
        vars: &[Variable],
        body: &Expr,
        status: &mut EquationStatus,
    ) -> Expr {
        let negated = pool.not_(body.clone());
        let mut cursor = Enumerator::new(ctx, Selector::NotFalse, vars, negated);
        let mut acc = pool.tt();
        let mut yields = 0usize;
        while let Some(item) = cursor.next(pool, idgen, self.rewriter) {
            match item {
                Ok(val) => {
                    yields += 1;
                    if self.exceeds_bound(yields) {
                        warn!("enumeration bound hit, keeping universal symbolic");
                        status.failed = true;
                        return pool.forall(vars.to_vec(), body.clone());
                    }
                    let instance = pool.not_(val.condition);
                    acc = pool.and_(acc, instance);
                    if acc.is_false() {
                        return acc;
                    }
                }
                Err(err) => {
                    warn!(%err, "cannot expand universal");
                    status.failed = true;
                    return pool.forall(vars.to_vec(), body.clone());
                }
            }
        }
        acc
    }

    fn exceeds_bound(&self, yields: usize) -> bool {
        matches!(self.config.enum_bound, Some(bound) if yields > bound)
    }

    /// Replace every PVI by its ground-named counterpart (PVI-to-PVI
    /// replacement, not expression substitution). Newly discovered PVIs go
    /// onto the worklist when `push_new` is set.
    #[allow(clippy::too_many_arguments)]
    fn rename_pvis(
        &self,
        pool: &mut TermPool,
        idgen: &mut IdGen,
        pbes: &Pbes,
        index: &AHashMap<Symbol, usize>,
        names: &mut GroundNames,
        worklist: &mut VecDeque<Pending>,
        push_new: bool,
        status: &mut EquationStatus,
        e: &Expr,
    ) -> InstantiateResult<Expr> {
        match e.node() {
            ExprNode::Bool(_) | ExprNode::Var(_) | ExprNode::App(..) => Ok(e.clone()),
            ExprNode::PropVar(name, args) => {
                let (name, args) = (*name, args.clone());
                let eq_idx = self.lookup_equation(pool, index, name)?;
                self.check_arity(pool, pbes, eq_idx, args.len())?;
                let decl = &pbes.equations[eq_idx].var;
                match names.resolve(pool, self.spec, decl, &args) {
                    Ok(g) => {
                        if g.is_new && push_new {
                            worklist.push_back(Pending {
                                ground: g.name,
                                eq_idx,
                                args,
                            });
                        }
                        Ok(pool.prop_var(g.name, g.residual))
                    }
                    Err(err) => {
                        warn!(%err, "leaving instantiation symbolic");
                        status.failed = true;
                        Ok(e.clone())
                    }
                }
            }
            ExprNode::Not(inner) => {
                let inner = inner.clone();
                let n = self.rename_pvis(
                    pool, idgen, pbes, index, names, worklist, push_new, status, &inner,
                )?;
                Ok(pool.not_(n))
            }
            ExprNode::And(l, r) => {
                let (l, r) = (l.clone(), r.clone());
                let nl = self.rename_pvis(
                    pool, idgen, pbes, index, names, worklist, push_new, status, &l,
                )?;
                let nr = self.rename_pvis(
                    pool, idgen, pbes, index, names, worklist, push_new, status, &r,
                )?;
                Ok(pool.and_(nl, nr))
            }
            ExprNode::Or(l, r) => {
                let (l, r) = (l.clone(), r.clone());
                let nl = self.rename_pvis(
                    pool, idgen, pbes, index, names, worklist, push_new, status, &l,
                )?;
                let nr = self.rename_pvis(
                    pool, idgen, pbes, index, names, worklist, push_new, status, &r,
                )?;
                Ok(pool.or_(nl, nr))
            }
            ExprNode::Implies(l, r) => {
                let (l, r) = (l.clone(), r.clone());
                let nl = self.rename_pvis(
                    pool, idgen, pbes, index, names, worklist, push_new, status, &l,
                )?;
                let nr = self.rename_pvis(
                    pool, idgen, pbes, index, names, worklist, push_new, status, &r,
                )?;
                Ok(pool.implies(nl, nr))
            }
            ExprNode::Forall(vars, body) => {
                let (vars, body) = (vars.clone(), body.clone());
                let nb = self.rename_pvis(
                    pool, idgen, pbes, index, names, worklist, push_new, status, &body,
                )?;
                Ok(pool.forall(vars, nb))
            }
            ExprNode::Exists(vars, body) => {
                let (vars, body) = (vars.clone(), body.clone());
                let nb = self.rename_pvis(
                    pool, idgen, pbes, index, names, worklist, push_new, status, &body,
                )?;
                Ok(pool.exists(vars, nb))
            }
        }
    }
}

/// Stable re-sort by source equation index: downstream solvers rely on the
/// original fixpoint-block order, discovery order survives within a block.
fn finish(mut emitted: Vec<(usize, BesEquation)>, initial: Symbol) -> Bes {
    emitted.sort_by_key(|(idx, _)| *idx);
    Bes {
        equations: emitted.into_iter().map(|(_, eq)| eq).collect(),
        initial,
    }
}
