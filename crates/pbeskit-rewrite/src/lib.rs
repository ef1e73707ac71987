//! Substitution and rewriting for pbeskit.
//!
//! Two layers: [`substitution`] provides the variable-to-expression mappings
//! (map-backed and name-index-backed) plus capture-avoiding application, and
//! [`rewriter`] normalizes expressions against a head-symbol-indexed rule
//! set, optionally under a substitution.

pub mod rewriter;
pub mod substitution;

pub use rewriter::{RewriteStrategy, Rewriter, StrategyParseError};
pub use substitution::{apply, IndexedSubstitution, MapSubstitution, Substitution};
