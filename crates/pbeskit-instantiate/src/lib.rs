//! PBES-to-BES lowering for pbeskit.
//!
//! A parameterised boolean equation system (PBES) binds propositional
//! variables with data-valued formal parameters. Instantiation grounds it
//! into a plain boolean equation system (BES) whose variables carry no
//! parameters, by rewriting each equation's formula under concrete
//! parameter values, expanding quantifiers through the enumerator, and
//! naming every distinct reachable instantiation exactly once.

pub mod instantiate;
pub mod naming;
pub mod pbes;

pub use instantiate::{
    EnumErrorFallback, InstantiateConfig, InstantiationError, Instantiator, Strategy,
};
pub use naming::{GroundNames, GroundNamingError, GroundPvi};
pub use pbes::{Bes, BesEquation, Fixpoint, Pbes, PbesEquation, PropVarDecl};
