//! Deferred symbol expressions.
//!
//! Emitted value fields may reference symbols that are not bound yet, so
//! every field records an expression tree and resolution happens when the
//! container is assembled.

use crate::symbol::SymId;

/// A deferred expression over symbols and constants.
#[derive(Debug, Clone)]
pub enum Expr {
    Symbol(SymId),
    Const(i64),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn add(self, rhs: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(rhs))
    }

    pub fn sub(self, rhs: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }

    /// Flatten to `addend + plus - minus`.
    ///
    /// Panics when more than one symbol ends up on the same side; nothing
    /// the emission surface produces nests deeper than that.
    pub fn reduce(&self) -> Reduced {
        let mut reduced = Reduced {
            addend: 0,
            plus: None,
            minus: None,
        };
        self.fold(false, &mut reduced);
        reduced
    }

    fn fold(&self, negate: bool, reduced: &mut Reduced) {
        match self {
            Expr::Symbol(id) => {
                let slot = if negate {
                    &mut reduced.minus
                } else {
                    &mut reduced.plus
                };
                assert!(
                    slot.is_none(),
                    "expression carries more than one symbol per side"
                );
                *slot = Some(*id);
            }
            Expr::Const(value) => {
                if negate {
                    reduced.addend -= value;
                } else {
                    reduced.addend += value;
                }
            }
            Expr::Add(lhs, rhs) => {
                lhs.fold(negate, reduced);
                rhs.fold(negate, reduced);
            }
            Expr::Sub(lhs, rhs) => {
                lhs.fold(negate, reduced);
                rhs.fold(!negate, reduced);
            }
        }
    }
}

/// Flattened form of an expression: `addend + plus - minus`.
#[derive(Debug, Clone, Copy)]
pub struct Reduced {
    pub addend: i64,
    pub plus: Option<SymId>,
    pub minus: Option<SymId>,
}
