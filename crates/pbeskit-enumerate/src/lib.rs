//! Quantifier and finite-sort enumeration for pbeskit.
//!
//! Given a set of variables and a condition over them, the [`Enumerator`]
//! produces substitutions by exhaustive constructor instantiation, pruning
//! branches whose condition already refutes the configured [`Selector`].
//! The sequence is lazy and possibly infinite; bounding it is the caller's
//! responsibility.

pub mod enumerator;

pub use enumerator::{EnumerationError, Enumerator, EnumeratorContext, Selector, Valuation};
