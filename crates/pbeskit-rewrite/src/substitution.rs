//! Variable valuations: finite mappings, identity elsewhere.

use ahash::AHashMap;
use pbeskit_term::expr::free_variables;
use pbeskit_term::{Args, Expr, ExprNode, IdGen, TermPool, Variable};

/// A valuation of data variables. Total by identity outside the domain.
pub trait Substitution {
    /// The image of `v`, or `None` when `v` maps to itself.
    fn lookup(&self, v: &Variable) -> Option<&Expr>;

    /// `sigma(v)`: the image of `v`, or `v` itself.
    fn resolve(&self, pool: &mut TermPool, v: Variable) -> Expr {
        match self.lookup(&v) {
            Some(e) => e.clone(),
            None => pool.var(v),
        }
    }
}

/// Map-backed substitution for arbitrary variable domains.
#[derive(Clone, Debug, Default)]
pub struct MapSubstitution {
    map: AHashMap<Variable, Expr>,
}

impl MapSubstitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `v ↦ e`. Assigning a variable to itself removes it from the
    /// domain, keeping the representation minimal.
    pub fn assign(&mut self, v: Variable, e: Expr) {
        if is_identity_image(&v, &e) {
            self.map.remove(&v);
        } else {
            self.map.insert(v, e);
        }
    }

    /// Reset to the identity substitution. Allocated capacity is retained.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn is_identity(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Expr)> {
        self.map.iter()
    }
}

impl Substitution for MapSubstitution {
    fn lookup(&self, v: &Variable) -> Option<&Expr> {
        self.map.get(v)
    }
}

/// Index-backed substitution keyed by the variable's interned-name index.
/// O(1) lookup and update; storage grows on first assignment to an unseen
/// index and is retained across [`IndexedSubstitution::clear`].
///
/// The name index is injective over names, not over variables; a slot also
/// stores the full variable so a same-named variable of a different sort is
/// treated as unmapped.
#[derive(Clone, Debug, Default)]
pub struct IndexedSubstitution {
    slots: Vec<Option<(Variable, Expr)>>,
    populated: usize,
}

impl IndexedSubstitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        IndexedSubstitution {
            slots: vec![None; n],
            populated: 0,
        }
    }

    /// Assign `v ↦ e`, growing storage as needed. The identity-removal
    /// contract matches [`MapSubstitution::assign`].
    pub fn assign(&mut self, v: Variable, e: Expr) {
        let idx = v.name.0 as usize;
        if idx >= self.slots.len() {
            if is_identity_image(&v, &e) {
                return;
            }
            self.slots.resize(idx + 1, None);
        }
        let slot = &mut self.slots[idx];
        if is_identity_image(&v, &e) {
            if slot.take().is_some() {
                self.populated -= 1;
            }
        } else {
            if slot.is_none() {
                self.populated += 1;
            }
            *slot = Some((v, e));
        }
    }

    /// Reset to the identity substitution without shrinking storage.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.populated = 0;
    }

    pub fn is_identity(&self) -> bool {
        self.populated == 0
    }

    pub fn len(&self) -> usize {
        self.populated
    }

    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }
}

impl Substitution for IndexedSubstitution {
    fn lookup(&self, v: &Variable) -> Option<&Expr> {
        match self.slots.get(v.name.0 as usize) {
            Some(Some((stored, e))) if stored == v => Some(e),
            _ => None,
        }
    }
}

fn is_identity_image(v: &Variable, e: &Expr) -> bool {
    matches!(e.node(), ExprNode::Var(w) if w == v)
}

/// Apply a substitution to an expression, capture-avoiding: bound variables
/// that would capture a free variable of the substitution's range are renamed
/// with fresh identifiers, and bound variables in the domain shadow their
/// mapping for the body.
pub fn apply<S: Substitution>(
    pool: &mut TermPool,
    idgen: &mut IdGen,
    sigma: &S,
    e: &Expr,
) -> Expr {
    let mut overlay = AHashMap::new();
    apply_rec(pool, idgen, sigma, &mut overlay, e)
}

#[derive(Clone)]
enum Binding {
    Renamed(Expr),
    Shadowed,
}

fn apply_rec<S: Substitution>(
    pool: &mut TermPool,
    idgen: &mut IdGen,
    sigma: &S,
    overlay: &mut AHashMap<Variable, Binding>,
    e: &Expr,
) -> Expr {
    match e.node() {
        ExprNode::Bool(_) => e.clone(),
        ExprNode::Var(v) => match overlay.get(v) {
            Some(Binding::Renamed(r)) => r.clone(),
            Some(Binding::Shadowed) => pool.var(*v),
            None => sigma.resolve(pool, *v),
        },
        ExprNode::App(head, args) => {
            let head = *head;
            let new_args: Args = args
                .clone()
                .iter()
                .map(|a| apply_rec(pool, idgen, sigma, overlay, a))
                .collect();
            pool.app(head, new_args)
        }
        ExprNode::PropVar(name, args) => {
            let name = *name;
            let new_args: Args = args
                .clone()
                .iter()
                .map(|a| apply_rec(pool, idgen, sigma, overlay, a))
                .collect();
            pool.prop_var(name, new_args)
        }
        ExprNode::Not(inner) => {
            let inner = inner.clone();
            let n = apply_rec(pool, idgen, sigma, overlay, &inner);
            pool.not_(n)
        }
        ExprNode::And(l, r) => {
            let (l, r) = (l.clone(), r.clone());
            let nl = apply_rec(pool, idgen, sigma, overlay, &l);
            let nr = apply_rec(pool, idgen, sigma, overlay, &r);
            pool.and_(nl, nr)
        }
        ExprNode::Or(l, r) => {
            let (l, r) = (l.clone(), r.clone());
            let nl = apply_rec(pool, idgen, sigma, overlay, &l);
            let nr = apply_rec(pool, idgen, sigma, overlay, &r);
            pool.or_(nl, nr)
        }
        ExprNode::Implies(l, r) => {
            let (l, r) = (l.clone(), r.clone());
            let nl = apply_rec(pool, idgen, sigma, overlay, &l);
            let nr = apply_rec(pool, idgen, sigma, overlay, &r);
            pool.implies(nl, nr)
        }
        ExprNode::Forall(vars, body) => {
            let (vars, body) = (vars.clone(), body.clone());
            let (new_vars, saved) =
                enter_binders(pool, idgen, sigma, overlay, &vars, &body);
            let new_body = apply_rec(pool, idgen, sigma, overlay, &body);
            restore_overlay(overlay, saved);
            pool.forall(new_vars, new_body)
        }
        ExprNode::Exists(vars, body) => {
            let (vars, body) = (vars.clone(), body.clone());
            let (new_vars, saved) =
                enter_binders(pool, idgen, sigma, overlay, &vars, &body);
            let new_body = apply_rec(pool, idgen, sigma, overlay, &body);
            restore_overlay(overlay, saved);
            pool.exists(new_vars, new_body)
        }
    }
}

type SavedBindings = Vec<(Variable, Option<Binding>)>;

/// Set up overlay entries for the binders of a quantifier: rename a binder
/// when it occurs free in the image of some variable free in the body,
/// shadow it when it is in the substitution's domain.
fn enter_binders<S: Substitution>(
    pool: &mut TermPool,
    idgen: &mut IdGen,
    sigma: &S,
    overlay: &mut AHashMap<Variable, Binding>,
    vars: &[Variable],
    body: &Expr,
) -> (Vec<Variable>, SavedBindings) {
    let body_free = free_variables(body);
    let mut range_free: Vec<Variable> = Vec::new();
    for u in &body_free {
        if vars.contains(u) {
            continue;
        }
        let image = match overlay.get(u) {
            Some(Binding::Renamed(r)) => Some(r.clone()),
            Some(Binding::Shadowed) => None,
            None => sigma.lookup(u).cloned(),
        };
        if let Some(img) = image {
            range_free.extend(free_variables(&img));
        }
    }

    let mut new_vars = Vec::with_capacity(vars.len());
    let mut saved = Vec::with_capacity(vars.len());
    for &w in vars {
        let binding = if range_free.contains(&w) {
            let fresh_name = idgen.fresh(pool, w.name);
            let renamed = Variable {
                name: fresh_name,
                sort: w.sort,
            };
            new_vars.push(renamed);
            Binding::Renamed(pool.var(renamed))
        } else {
            new_vars.push(w);
            Binding::Shadowed
        };
        saved.push((w, overlay.insert(w, binding)));
    }
    (new_vars, saved)
}

fn restore_overlay(overlay: &mut AHashMap<Variable, Binding>, saved: SavedBindings) {
    for (v, prev) in saved.into_iter().rev() {
        match prev {
            Some(b) => {
                overlay.insert(v, b);
            }
            None => {
                overlay.remove(&v);
            }
        }
    }
}
