//! Ground naming of propositional variable instantiations.

use crate::pbes::PropVarDecl;
use ahash::AHashMap;
use pbeskit_term::{Args, DataSpec, Expr, ExprNode, Symbol, TermPool};
use thiserror::Error;

/// An argument of a certainly-finite sort whose value is not a closed
/// constructor term, so it cannot be encoded into a ground name. Surfaced
/// like an enumeration failure: recoverable per equation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot encode argument '{value}' of '{variable}' into a ground name")]
pub struct GroundNamingError {
    pub variable: String,
    pub value: String,
}

/// The ground rendition of one PVI.
#[derive(Clone, Debug)]
pub struct GroundPvi {
    /// The minted (or cached) parameter-free name.
    pub name: Symbol,
    /// Whether this PVI was seen for the first time.
    pub is_new: bool,
    /// Argument values that stayed residual (non-closed values of sorts
    /// that are not certainly finite). Empty for fully ground PVIs.
    pub residual: Args,
}

/// Deduplicating ground-name cache.
///
/// Keys are the argument value vectors themselves, not the rendered name
/// strings: two PVIs are the same exploration node iff their values are
/// equal, which is pointer equality on interned expressions.
#[derive(Debug, Default)]
pub struct GroundNames {
    cache: AHashMap<(Symbol, Args), Symbol>,
}

impl GroundNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct ground names minted so far.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Resolve a PVI `decl(args)` to its ground name, minting one on first
    /// sight. Arguments are expected in normal form.
    pub fn resolve(
        &mut self,
        pool: &mut TermPool,
        spec: &DataSpec,
        decl: &PropVarDecl,
        args: &Args,
    ) -> Result<GroundPvi, GroundNamingError> {
        if let Some(&name) = self.cache.get(&(decl.name, args.clone())) {
            return Ok(GroundPvi {
                name,
                is_new: false,
                residual: residual_args(spec, decl, args),
            });
        }

        let mut rendered = pool.symbol_name(decl.name).to_string();
        let mut residual = Args::new();
        for (param, value) in decl.params.iter().zip(args.iter()) {
            if value.is_closed_data() {
                rendered.push('@');
                encode_value(pool, value, &mut rendered);
            } else if spec.is_certainly_finite(param.sort) {
                return Err(GroundNamingError {
                    variable: pool.symbol_name(decl.name).to_string(),
                    value: pool.expr_to_string(value),
                });
            } else {
                residual.push(value.clone());
            }
        }

        let name = pool.symbol(&rendered);
        self.cache.insert((decl.name, args.clone()), name);
        Ok(GroundPvi {
            name,
            is_new: true,
            residual,
        })
    }
}

fn residual_args(spec: &DataSpec, decl: &PropVarDecl, args: &Args) -> Args {
    decl.params
        .iter()
        .zip(args.iter())
        .filter(|(param, value)| {
            !value.is_closed_data() && !spec.is_certainly_finite(param.sort)
        })
        .map(|(_, value)| value.clone())
        .collect()
}

/// Structural encoding of a closed value into a name fragment:
/// `true`, `zero`, `succ(zero)`, `pair(T,F)`.
fn encode_value(pool: &TermPool, value: &Expr, out: &mut String) {
    match value.node() {
        ExprNode::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        ExprNode::App(head, args) => {
            out.push_str(pool.symbol_name(*head));
            if !args.is_empty() {
                out.push('(');
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    encode_value(pool, a, out);
                }
                out.push(')');
            }
        }
        // `resolve` only encodes closed data values.
        _ => unreachable!("encode_value called on a non-closed value"),
    }
}
