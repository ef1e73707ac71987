//! PBES and BES data types.

use ahash::AHashMap;
use pbeskit_term::{Expr, Symbol, TermPool, Variable};
use std::fmt;

/// Fixpoint symbol of an equation: least (`mu`) or greatest (`nu`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fixpoint {
    Mu,
    Nu,
}

impl fmt::Display for Fixpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Fixpoint::Mu => "mu",
            Fixpoint::Nu => "nu",
        })
    }
}

/// The bound variable of a PBES equation: a name with formal parameters.
#[derive(Clone, Debug)]
pub struct PropVarDecl {
    pub name: Symbol,
    pub params: Vec<Variable>,
}

/// One parameterised equation. Read once from input, never mutated.
#[derive(Clone, Debug)]
pub struct PbesEquation {
    pub fixpoint: Fixpoint,
    pub var: PropVarDecl,
    pub formula: Expr,
}

/// A parameterised boolean equation system. `initial` is a propositional
/// variable instantiation referring to one of the equations. Equation order
/// is the fixpoint-block order that instantiation must preserve.
#[derive(Clone, Debug)]
pub struct Pbes {
    pub equations: Vec<PbesEquation>,
    pub initial: Expr,
}

impl Pbes {
    /// Index from bound-variable name to equation position.
    pub fn equation_index(&self) -> AHashMap<Symbol, usize> {
        self.equations
            .iter()
            .enumerate()
            .map(|(i, eq)| (eq.var.name, i))
            .collect()
    }
}

/// One ground equation: the bound variable carries no parameters.
/// Created exactly once per distinct reachable instantiation.
#[derive(Clone, Debug)]
pub struct BesEquation {
    pub fixpoint: Fixpoint,
    pub name: Symbol,
    pub formula: Expr,
}

/// A ground boolean equation system, consumable by a Gauss-elimination or
/// local-fixpoint solver.
#[derive(Clone, Debug)]
pub struct Bes {
    pub equations: Vec<BesEquation>,
    pub initial: Symbol,
}

impl Bes {
    /// Plain-text rendering, one equation per line.
    pub fn to_text(&self, pool: &TermPool) -> String {
        let mut out = String::new();
        for eq in &self.equations {
            out.push_str(&format!(
                "{} {} = {};\n",
                eq.fixpoint,
                pool.symbol_name(eq.name),
                pool.expr_to_string(&eq.formula)
            ));
        }
        out.push_str(&format!("init {};\n", pool.symbol_name(self.initial)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equation_index_maps_names_to_positions() {
        let mut pool = TermPool::new();
        let x = pool.symbol("X");
        let y = pool.symbol("Y");
        let tt = pool.tt();
        let init = pool.prop_var(x, Default::default());
        let pbes = Pbes {
            equations: vec![
                PbesEquation {
                    fixpoint: Fixpoint::Nu,
                    var: PropVarDecl {
                        name: x,
                        params: vec![],
                    },
                    formula: tt.clone(),
                },
                PbesEquation {
                    fixpoint: Fixpoint::Mu,
                    var: PropVarDecl {
                        name: y,
                        params: vec![],
                    },
                    formula: tt,
                },
            ],
            initial: init,
        };
        let index = pbes.equation_index();
        assert_eq!(index[&x], 0);
        assert_eq!(index[&y], 1);
    }

    #[test]
    fn bes_renders_to_text() {
        let mut pool = TermPool::new();
        let x = pool.symbol("X@true");
        let y = pool.symbol("X@false");
        let ye = pool.prop_var(y, Default::default());
        let xe = pool.prop_var(x, Default::default());
        let bes = Bes {
            equations: vec![
                BesEquation {
                    fixpoint: Fixpoint::Nu,
                    name: x,
                    formula: ye,
                },
                BesEquation {
                    fixpoint: Fixpoint::Nu,
                    name: y,
                    formula: xe,
                },
            ],
            initial: x,
        };
        let text = bes.to_text(&pool);
        assert_eq!(
            text,
            "nu X@true = X@false;\nnu X@false = X@true;\ninit X@true;\n"
        );
    }
}
