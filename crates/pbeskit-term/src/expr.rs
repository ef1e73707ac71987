//! Interned expression trees with maximal sharing.

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An interned name. Cheap to copy and compare; resolved to text by the pool.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(pub u32);

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

/// A data variable: an interned name paired with its sort.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Variable {
    pub name: Symbol,
    pub sort: crate::sorts::SortId,
}

/// Argument vectors for applications and propositional variable instantiations.
/// Most heads in practice take at most a handful of arguments.
pub type Args = SmallVec<[Expr; 4]>;

/// One expression node. Children are interned [`Expr`] handles, so structural
/// equality of nodes reduces to pointer equality of children.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ExprNode {
    /// Boolean constant.
    Bool(bool),
    /// Free or bound data variable.
    Var(Variable),
    /// Function (or constructor) application, `f(e1, ..., en)`.
    App(Symbol, Args),
    /// Logical negation.
    Not(Expr),
    /// Conjunction.
    And(Expr, Expr),
    /// Disjunction.
    Or(Expr, Expr),
    /// Implication.
    Implies(Expr, Expr),
    /// Universal quantifier over data variables.
    Forall(Vec<Variable>, Expr),
    /// Existential quantifier over data variables.
    Exists(Vec<Variable>, Expr),
    /// Propositional variable instantiation, `X(e1, ..., en)`.
    PropVar(Symbol, Args),
}

/// Handle to an interned expression. Equality and hashing are O(1): the pool
/// guarantees that structurally equal expressions share one allocation.
#[derive(Clone)]
pub struct Expr(Arc<ExprNode>);

impl PartialEq for Expr {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl std::ops::Deref for Expr {
    type Target = ExprNode;

    #[inline]
    fn deref(&self) -> &ExprNode {
        &self.0
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Expr {
    /// Borrow the underlying node for matching.
    #[inline]
    pub fn node(&self) -> &ExprNode {
        &self.0
    }

    /// Is this the boolean constant `true`?
    #[inline]
    pub fn is_true(&self) -> bool {
        matches!(*self.0, ExprNode::Bool(true))
    }

    /// Is this the boolean constant `false`?
    #[inline]
    pub fn is_false(&self) -> bool {
        matches!(*self.0, ExprNode::Bool(false))
    }

    /// Is this a closed constructor-style term: an application (of anything)
    /// or constant with no variables, quantifiers or PVIs anywhere inside?
    pub fn is_closed_data(&self) -> bool {
        match &*self.0 {
            ExprNode::Bool(_) => true,
            ExprNode::App(_, args) => args.iter().all(Expr::is_closed_data),
            _ => false,
        }
    }
}

/// Interning pool for expressions and names.
///
/// All expressions flowing through a rewrite/enumeration/instantiation run
/// must come from the same pool; pointer equality is only meaningful within
/// one pool. The pool is threaded by `&mut` through the call graph — there is
/// no process-wide default instance.
pub struct TermPool {
    table: HashSet<Arc<ExprNode>, ahash::RandomState>,
    names: Vec<Arc<str>>,
    by_name: AHashMap<Arc<str>, Symbol>,
    tt: Expr,
    ff: Expr,
}

impl Default for TermPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TermPool {
    pub fn new() -> Self {
        let mut table: HashSet<Arc<ExprNode>, ahash::RandomState> = HashSet::default();
        let tt_node = Arc::new(ExprNode::Bool(true));
        let ff_node = Arc::new(ExprNode::Bool(false));
        table.insert(tt_node.clone());
        table.insert(ff_node.clone());
        TermPool {
            table,
            names: Vec::new(),
            by_name: AHashMap::new(),
            tt: Expr(tt_node),
            ff: Expr(ff_node),
        }
    }

    /// Number of distinct interned expressions.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Intern a node, returning the shared handle.
    fn intern(&mut self, node: ExprNode) -> Expr {
        if let Some(existing) = self.table.get(&node) {
            return Expr(existing.clone());
        }
        let arc = Arc::new(node);
        self.table.insert(arc.clone());
        Expr(arc)
    }

    // === Names ===

    /// Intern a name, returning its symbol.
    pub fn symbol(&mut self, name: &str) -> Symbol {
        if let Some(&sym) = self.by_name.get(name) {
            return sym;
        }
        let sym = Symbol(self.names.len() as u32);
        let arc: Arc<str> = Arc::from(name);
        self.names.push(arc.clone());
        self.by_name.insert(arc, sym);
        sym
    }

    /// Resolve a symbol back to its text.
    pub fn symbol_name(&self, sym: Symbol) -> &str {
        &self.names[sym.0 as usize]
    }

    /// Whether a name is already interned.
    pub fn has_symbol(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Number of interned names. Doubles as the key space bound for
    /// name-indexed substitutions.
    pub fn symbol_count(&self) -> usize {
        self.names.len()
    }

    // === Plain constructors ===

    pub fn bool_const(&self, value: bool) -> Expr {
        if value {
            self.tt.clone()
        } else {
            self.ff.clone()
        }
    }

    pub fn tt(&self) -> Expr {
        self.tt.clone()
    }

    pub fn ff(&self) -> Expr {
        self.ff.clone()
    }

    pub fn var(&mut self, v: Variable) -> Expr {
        self.intern(ExprNode::Var(v))
    }

    pub fn app(&mut self, head: Symbol, args: Args) -> Expr {
        self.intern(ExprNode::App(head, args))
    }

    pub fn prop_var(&mut self, name: Symbol, args: Args) -> Expr {
        self.intern(ExprNode::PropVar(name, args))
    }

    // === Optimized boolean constructors ===
    //
    // These short-circuit on the `true`/`false` sentinels and on syntactic
    // idempotence (pointer equality) before falling back to plain interning.
    // They are used standalone, inside the rewriter, and by the
    // instantiation algorithm's quantifier elimination.

    pub fn not_(&mut self, e: Expr) -> Expr {
        match e.node() {
            ExprNode::Bool(b) => self.bool_const(!b),
            ExprNode::Not(inner) => inner.clone(),
            _ => self.intern(ExprNode::Not(e)),
        }
    }

    pub fn and_(&mut self, l: Expr, r: Expr) -> Expr {
        if l.is_false() || r.is_false() {
            return self.ff();
        }
        if l.is_true() {
            return r;
        }
        if r.is_true() || l == r {
            return l;
        }
        self.intern(ExprNode::And(l, r))
    }

    pub fn or_(&mut self, l: Expr, r: Expr) -> Expr {
        if l.is_true() || r.is_true() {
            return self.tt();
        }
        if l.is_false() {
            return r;
        }
        if r.is_false() || l == r {
            return l;
        }
        self.intern(ExprNode::Or(l, r))
    }

    pub fn implies(&mut self, l: Expr, r: Expr) -> Expr {
        if l.is_false() || r.is_true() || l == r {
            return self.tt();
        }
        if l.is_true() {
            return r;
        }
        if r.is_false() {
            return self.not_(l);
        }
        self.intern(ExprNode::Implies(l, r))
    }

    pub fn forall(&mut self, vars: Vec<Variable>, body: Expr) -> Expr {
        if vars.is_empty() || body.is_true() || body.is_false() {
            return body;
        }
        self.intern(ExprNode::Forall(vars, body))
    }

    pub fn exists(&mut self, vars: Vec<Variable>, body: Expr) -> Expr {
        if vars.is_empty() || body.is_true() || body.is_false() {
            return body;
        }
        self.intern(ExprNode::Exists(vars, body))
    }

    // === Printing ===

    /// Render an expression to text. Used for diagnostics and BES output;
    /// full pretty-printing lives outside this crate.
    pub fn expr_to_string(&self, e: &Expr) -> String {
        let mut out = String::new();
        self.write_expr(&mut out, e);
        out
    }

    fn write_expr(&self, out: &mut String, e: &Expr) {
        match e.node() {
            ExprNode::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            ExprNode::Var(v) => out.push_str(self.symbol_name(v.name)),
            ExprNode::App(head, args) | ExprNode::PropVar(head, args) => {
                out.push_str(self.symbol_name(*head));
                if !args.is_empty() {
                    out.push('(');
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        self.write_expr(out, a);
                    }
                    out.push(')');
                }
            }
            ExprNode::Not(inner) => {
                out.push('!');
                self.write_paren(out, inner);
            }
            ExprNode::And(l, r) => {
                self.write_paren(out, l);
                out.push_str(" && ");
                self.write_paren(out, r);
            }
            ExprNode::Or(l, r) => {
                self.write_paren(out, l);
                out.push_str(" || ");
                self.write_paren(out, r);
            }
            ExprNode::Implies(l, r) => {
                self.write_paren(out, l);
                out.push_str(" => ");
                self.write_paren(out, r);
            }
            ExprNode::Forall(vars, body) => {
                out.push_str("forall ");
                self.write_binders(out, vars);
                out.push_str(". ");
                self.write_paren(out, body);
            }
            ExprNode::Exists(vars, body) => {
                out.push_str("exists ");
                self.write_binders(out, vars);
                out.push_str(". ");
                self.write_paren(out, body);
            }
        }
    }

    fn write_paren(&self, out: &mut String, e: &Expr) {
        let atomic = matches!(
            e.node(),
            ExprNode::Bool(_) | ExprNode::Var(_) | ExprNode::App(..) | ExprNode::PropVar(..)
        );
        if atomic {
            self.write_expr(out, e);
        } else {
            out.push('(');
            self.write_expr(out, e);
            out.push(')');
        }
    }

    fn write_binders(&self, out: &mut String, vars: &[Variable]) {
        for (i, v) in vars.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(self.symbol_name(v.name));
        }
    }
}

/// Collect the free data variables of an expression.
pub fn free_variables(e: &Expr) -> AHashSet<Variable> {
    let mut out = AHashSet::new();
    collect_free(e, &mut Vec::new(), &mut out);
    out
}

fn collect_free(e: &Expr, bound: &mut Vec<Variable>, out: &mut AHashSet<Variable>) {
    match e.node() {
        ExprNode::Bool(_) => {}
        ExprNode::Var(v) => {
            if !bound.contains(v) {
                out.insert(*v);
            }
        }
        ExprNode::App(_, args) | ExprNode::PropVar(_, args) => {
            for a in args {
                collect_free(a, bound, out);
            }
        }
        ExprNode::Not(inner) => collect_free(inner, bound, out),
        ExprNode::And(l, r) | ExprNode::Or(l, r) | ExprNode::Implies(l, r) => {
            collect_free(l, bound, out);
            collect_free(r, bound, out);
        }
        ExprNode::Forall(vars, body) | ExprNode::Exists(vars, body) => {
            let depth = bound.len();
            bound.extend_from_slice(vars);
            collect_free(body, bound, out);
            bound.truncate(depth);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sorts::SortId;

    fn var(pool: &mut TermPool, name: &str) -> Variable {
        let sym = pool.symbol(name);
        Variable {
            name: sym,
            sort: SortId(0),
        }
    }

    #[test]
    fn interning_shares_structure() {
        let mut pool = TermPool::new();
        let x = var(&mut pool, "x");
        let a = pool.var(x);
        let b = pool.var(x);
        assert_eq!(a, b);

        let f = pool.symbol("f");
        let fa = pool.app(f, Args::from_vec(vec![a.clone()]));
        let fb = pool.app(f, Args::from_vec(vec![b]));
        assert_eq!(fa, fb);
        // Same allocation, not just equal.
        assert!(std::ptr::eq(fa.node(), fb.node()));
    }

    #[test]
    fn boolean_short_circuits() {
        let mut pool = TermPool::new();
        let x = var(&mut pool, "x");
        let xe = pool.var(x);
        let tt = pool.tt();
        let ff = pool.ff();

        let e = pool.and_(tt.clone(), xe.clone());
        assert_eq!(e, xe);
        let e = pool.and_(xe.clone(), ff.clone());
        assert!(e.is_false());
        let e = pool.or_(ff.clone(), xe.clone());
        assert_eq!(e, xe);
        let e = pool.or_(xe.clone(), tt.clone());
        assert!(e.is_true());
        let e = pool.implies(ff, xe.clone());
        assert!(e.is_true());
    }

    #[test]
    fn boolean_idempotence() {
        let mut pool = TermPool::new();
        let x = var(&mut pool, "x");
        let xe = pool.var(x);
        let e = pool.and_(xe.clone(), xe.clone());
        assert_eq!(e, xe);
        let e = pool.or_(xe.clone(), xe.clone());
        assert_eq!(e, xe);
        let e = pool.implies(xe.clone(), xe);
        assert!(e.is_true());
    }

    #[test]
    fn double_negation_collapses() {
        let mut pool = TermPool::new();
        let x = var(&mut pool, "x");
        let xe = pool.var(x);
        let n = pool.not_(xe.clone());
        let nn = pool.not_(n);
        assert_eq!(nn, xe);
    }

    #[test]
    fn quantifier_over_constant_simplifies() {
        let mut pool = TermPool::new();
        let x = var(&mut pool, "x");
        let tt = pool.tt();
        let e = pool.forall(vec![x], tt);
        assert!(e.is_true());
        let ff = pool.ff();
        let e = pool.exists(vec![x], ff);
        assert!(e.is_false());
    }

    #[test]
    fn free_variables_respect_binders() {
        let mut pool = TermPool::new();
        let x = var(&mut pool, "x");
        let y = var(&mut pool, "y");
        let xe = pool.var(x);
        let ye = pool.var(y);
        let conj = pool.and_(xe, ye);
        let quantified = pool.forall(vec![x], conj);
        let free = free_variables(&quantified);
        assert!(free.contains(&y));
        assert!(!free.contains(&x));
    }

    #[test]
    fn display_is_readable() {
        let mut pool = TermPool::new();
        let x = var(&mut pool, "x");
        let xe = pool.var(x);
        let s = pool.symbol("succ");
        let sx = pool.app(s, Args::from_vec(vec![xe.clone()]));
        let body = pool.not_(xe);
        let e = pool.exists(vec![x], body);
        assert_eq!(pool.expr_to_string(&sx), "succ(x)");
        assert_eq!(pool.expr_to_string(&e), "exists x. (!x)");
    }
}
