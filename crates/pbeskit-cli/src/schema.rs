//! JSON input schema and lowering into the term pool.
//!
//! Textual parsing of a real specification language is a separate
//! collaborator; the CLI consumes a JSON document describing the data
//! specification and the PBES, and lowers it into interned terms here.

use pbeskit_instantiate::{Bes, Fixpoint, Pbes, PbesEquation, PropVarDecl};
use pbeskit_rewrite::{RewriteStrategy, Rewriter};
use pbeskit_term::sorts::install_bool_sort;
use pbeskit_term::{
    Args, DataSpec, Expr, IdGen, MalformedRuleError, RewriteRule, SortId, TermPool, Variable,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unknown sort '{0}'")]
    UnknownSort(String),

    #[error("malformed rewrite rule: {0}")]
    MalformedRule(#[from] MalformedRuleError),
}

/// Top-level input document.
#[derive(Debug, Deserialize)]
pub struct InputDoc {
    #[serde(default)]
    pub sorts: Vec<SortSchema>,
    #[serde(default)]
    pub rules: Vec<RuleSchema>,
    pub equations: Vec<EquationSchema>,
    pub initial: ExprSchema,
}

#[derive(Debug, Deserialize)]
pub struct SortSchema {
    pub name: String,
    #[serde(default)]
    pub constructors: Vec<ConstructorSchema>,
}

#[derive(Debug, Deserialize)]
pub struct ConstructorSchema {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RuleSchema {
    pub lhs: ExprSchema,
    #[serde(default)]
    pub condition: Option<ExprSchema>,
    pub rhs: ExprSchema,
}

#[derive(Debug, Deserialize)]
pub struct EquationSchema {
    pub fixpoint: FixpointSchema,
    pub name: String,
    #[serde(default)]
    pub params: Vec<VarSchema>,
    pub formula: ExprSchema,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixpointSchema {
    Mu,
    Nu,
}

#[derive(Debug, Deserialize)]
pub struct VarSchema {
    pub name: String,
    pub sort: String,
}

/// Externally tagged expression tree, e.g. `{"and": [a, b]}` or
/// `{"pvi": {"name": "X", "args": [...]}}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprSchema {
    Bool(bool),
    Var(VarSchema),
    App {
        head: String,
        #[serde(default)]
        args: Vec<ExprSchema>,
    },
    Not(Box<ExprSchema>),
    And(Box<ExprSchema>, Box<ExprSchema>),
    Or(Box<ExprSchema>, Box<ExprSchema>),
    Implies(Box<ExprSchema>, Box<ExprSchema>),
    Forall {
        vars: Vec<VarSchema>,
        body: Box<ExprSchema>,
    },
    Exists {
        vars: Vec<VarSchema>,
        body: Box<ExprSchema>,
    },
    Pvi {
        name: String,
        #[serde(default)]
        args: Vec<ExprSchema>,
    },
}

/// Everything a run needs, lowered from one input document.
pub struct Loaded {
    pub pool: TermPool,
    pub idgen: IdGen,
    pub spec: DataSpec,
    pub rewriter: Rewriter,
    pub pbes: Pbes,
}

/// Lower an input document. The builtin `Bool` sort is always installed;
/// an input sort of the same name is ignored with a warning.
pub fn load(doc: &InputDoc, strategy: RewriteStrategy) -> Result<Loaded, SchemaError> {
    let mut pool = TermPool::new();
    let mut spec = DataSpec::new();
    let (_, bool_rules) = install_bool_sort(&mut pool, &mut spec);

    // Two passes so constructor argument sorts may refer forward.
    for sort in &doc.sorts {
        if sort.name == "Bool" {
            warn!("input redeclares the builtin sort Bool, ignoring");
            continue;
        }
        spec.add_sort(&sort.name);
    }
    for sort in &doc.sorts {
        if sort.name == "Bool" {
            continue;
        }
        let id = spec
            .lookup(&sort.name)
            .expect("declared in the first pass");
        for ctor in &sort.constructors {
            let name = pool.symbol(&ctor.name);
            let arg_sorts = ctor
                .args
                .iter()
                .map(|a| resolve_sort(&spec, a))
                .collect::<Result<Vec<_>, _>>()?;
            spec.add_constructor(id, name, arg_sorts);
        }
    }

    let mut rules = bool_rules;
    for rule in &doc.rules {
        let lhs = lower_expr(&mut pool, &spec, &rule.lhs)?;
        let condition = rule
            .condition
            .as_ref()
            .map(|c| lower_expr(&mut pool, &spec, c))
            .transpose()?;
        let rhs = lower_expr(&mut pool, &spec, &rule.rhs)?;
        rules.push(RewriteRule::new(&pool, lhs, condition, rhs)?);
    }
    let rewriter = Rewriter::with_strategy(strategy, rules);

    let mut equations = Vec::with_capacity(doc.equations.len());
    for eq in &doc.equations {
        let name = pool.symbol(&eq.name);
        let params = eq
            .params
            .iter()
            .map(|p| lower_var(&mut pool, &spec, p))
            .collect::<Result<Vec<_>, _>>()?;
        let formula = lower_expr(&mut pool, &spec, &eq.formula)?;
        equations.push(PbesEquation {
            fixpoint: match eq.fixpoint {
                FixpointSchema::Mu => Fixpoint::Mu,
                FixpointSchema::Nu => Fixpoint::Nu,
            },
            var: PropVarDecl { name, params },
            formula,
        });
    }
    let initial = lower_expr(&mut pool, &spec, &doc.initial)?;

    Ok(Loaded {
        pool,
        idgen: IdGen::new(),
        spec,
        rewriter,
        pbes: Pbes { equations, initial },
    })
}

fn resolve_sort(spec: &DataSpec, name: &str) -> Result<SortId, SchemaError> {
    spec.lookup(name)
        .ok_or_else(|| SchemaError::UnknownSort(name.to_string()))
}

fn lower_var(
    pool: &mut TermPool,
    spec: &DataSpec,
    v: &VarSchema,
) -> Result<Variable, SchemaError> {
    Ok(Variable {
        name: pool.symbol(&v.name),
        sort: resolve_sort(spec, &v.sort)?,
    })
}

fn lower_expr(
    pool: &mut TermPool,
    spec: &DataSpec,
    e: &ExprSchema,
) -> Result<Expr, SchemaError> {
    Ok(match e {
        ExprSchema::Bool(b) => pool.bool_const(*b),
        ExprSchema::Var(v) => {
            let var = lower_var(pool, spec, v)?;
            pool.var(var)
        }
        ExprSchema::App { head, args } => {
            let head = pool.symbol(head);
            let args = args
                .iter()
                .map(|a| lower_expr(pool, spec, a))
                .collect::<Result<Args, _>>()?;
            pool.app(head, args)
        }
        ExprSchema::Not(inner) => {
            let n = lower_expr(pool, spec, inner)?;
            pool.not_(n)
        }
        ExprSchema::And(l, r) => {
            let nl = lower_expr(pool, spec, l)?;
            let nr = lower_expr(pool, spec, r)?;
            pool.and_(nl, nr)
        }
        ExprSchema::Or(l, r) => {
            let nl = lower_expr(pool, spec, l)?;
            let nr = lower_expr(pool, spec, r)?;
            pool.or_(nl, nr)
        }
        ExprSchema::Implies(l, r) => {
            let nl = lower_expr(pool, spec, l)?;
            let nr = lower_expr(pool, spec, r)?;
            pool.implies(nl, nr)
        }
        ExprSchema::Forall { vars, body } => {
            let vars = vars
                .iter()
                .map(|v| lower_var(pool, spec, v))
                .collect::<Result<Vec<_>, _>>()?;
            let body = lower_expr(pool, spec, body)?;
            pool.forall(vars, body)
        }
        ExprSchema::Exists { vars, body } => {
            let vars = vars
                .iter()
                .map(|v| lower_var(pool, spec, v))
                .collect::<Result<Vec<_>, _>>()?;
            let body = lower_expr(pool, spec, body)?;
            pool.exists(vars, body)
        }
        ExprSchema::Pvi { name, args } => {
            let name = pool.symbol(name);
            let args = args
                .iter()
                .map(|a| lower_expr(pool, spec, a))
                .collect::<Result<Args, _>>()?;
            pool.prop_var(name, args)
        }
    })
}

/// Serializable rendition of an instantiated BES.
#[derive(Debug, Serialize)]
pub struct BesDoc {
    pub equations: Vec<BesEquationDoc>,
    pub initial: String,
}

#[derive(Debug, Serialize)]
pub struct BesEquationDoc {
    pub fixpoint: String,
    pub name: String,
    pub formula: String,
}

impl BesDoc {
    pub fn from_bes(pool: &TermPool, bes: &Bes) -> Self {
        BesDoc {
            equations: bes
                .equations
                .iter()
                .map(|eq| BesEquationDoc {
                    fixpoint: eq.fixpoint.to_string(),
                    name: pool.symbol_name(eq.name).to_string(),
                    formula: pool.expr_to_string(&eq.formula),
                })
                .collect(),
            initial: pool.symbol_name(bes.initial).to_string(),
        }
    }
}
