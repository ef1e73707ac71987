//! Term model for pbeskit: interned expressions, sorts and rewrite rules.
//!
//! Every other crate in the workspace operates on the [`Expr`] handles
//! produced by a [`TermPool`]. The pool guarantees maximal sharing:
//! structurally equal expressions are the same allocation, so equality
//! and hashing on `Expr` are pointer operations.

pub mod expr;
pub mod idgen;
pub mod rule;
pub mod sorts;

pub use expr::{Args, Expr, ExprNode, Symbol, TermPool, Variable};
pub use idgen::IdGen;
pub use rule::{MalformedRuleError, RewriteRule};
pub use sorts::{install_bool_sort, Constructor, DataSpec, Sort, SortId};
