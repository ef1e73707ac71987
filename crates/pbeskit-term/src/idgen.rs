//! Fresh-identifier generation.

use crate::expr::{Symbol, TermPool};

/// Mints identifiers guaranteed not to collide with any name interned so
/// far. One generator is threaded through a rewrite/instantiation run;
/// there is no process-wide counter.
#[derive(Debug, Default)]
pub struct IdGen {
    counter: u64,
}

impl IdGen {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh symbol derived from `base`, e.g. `x!3`. Skips names that a
    /// caller already interned for other purposes.
    pub fn fresh(&mut self, pool: &mut TermPool, base: Symbol) -> Symbol {
        loop {
            let candidate = format!("{}!{}", pool.symbol_name(base), self.counter);
            self.counter += 1;
            if !pool.has_symbol(&candidate) {
                return pool.symbol(&candidate);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_names_are_distinct() {
        let mut pool = TermPool::new();
        let mut gen = IdGen::new();
        let base = pool.symbol("x");
        let a = gen.fresh(&mut pool, base);
        let b = gen.fresh(&mut pool, base);
        assert_ne!(a, b);
        assert_ne!(a, base);
    }

    #[test]
    fn fresh_skips_taken_names() {
        let mut pool = TermPool::new();
        let mut gen = IdGen::new();
        let base = pool.symbol("x");
        pool.symbol("x!0");
        let a = gen.fresh(&mut pool, base);
        assert_eq!(pool.symbol_name(a), "x!1");
    }
}
