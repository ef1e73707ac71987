//! Rewrite rules and their well-formedness check.

use crate::expr::{free_variables, Expr, ExprNode, Symbol, TermPool};
use thiserror::Error;

/// A structurally malformed rewrite rule, rejected before it enters a
/// rewriter's index. Non-fatal: callers typically log and skip the rule.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedRuleError {
    #[error("rule left-hand side '{lhs}' is not a function application")]
    NotAnApplication { lhs: String },

    #[error("variable '{name}' occurs in the condition or right-hand side but not in the pattern")]
    UnboundVariable { name: String },
}

/// A conditional rewrite rule `lhs -> rhs if condition`. The pattern
/// variables are exactly the variables of `lhs`; every variable free in the
/// condition or replacement must occur among them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RewriteRule {
    lhs: Expr,
    condition: Option<Expr>,
    rhs: Expr,
}

impl RewriteRule {
    /// Build a rule, validating well-formedness. The pool is only consulted
    /// to render names into error messages.
    pub fn new(
        pool: &TermPool,
        lhs: Expr,
        condition: Option<Expr>,
        rhs: Expr,
    ) -> Result<Self, MalformedRuleError> {
        if !matches!(lhs.node(), ExprNode::App(..)) {
            return Err(MalformedRuleError::NotAnApplication {
                lhs: pool.expr_to_string(&lhs),
            });
        }
        let pattern_vars = free_variables(&lhs);
        let mut escaped = free_variables(&rhs);
        if let Some(cond) = &condition {
            escaped.extend(free_variables(cond));
        }
        for v in escaped {
            if !pattern_vars.contains(&v) {
                return Err(MalformedRuleError::UnboundVariable {
                    name: pool.symbol_name(v.name).to_string(),
                });
            }
        }
        Ok(RewriteRule {
            lhs,
            condition,
            rhs,
        })
    }

    /// Head symbol of the pattern; rules are indexed by it.
    pub fn head(&self) -> Symbol {
        match self.lhs.node() {
            ExprNode::App(head, _) => *head,
            // Enforced by `new`.
            _ => unreachable!("rule lhs is always an application"),
        }
    }

    pub fn lhs(&self) -> &Expr {
        &self.lhs
    }

    pub fn condition(&self) -> Option<&Expr> {
        self.condition.as_ref()
    }

    pub fn rhs(&self) -> &Expr {
        &self.rhs
    }
}
