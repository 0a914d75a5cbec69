//! Constant folding.
//!
//! Folds after parsing: arithmetic, comparisons, logic, and string
//! concatenation over literal operands, plus resolution of identifiers
//! that name compile-time constants (enum values, objects). Folded nodes
//! are rebuilt in the arena; unfoldable trees are returned unchanged.

use crate::ast::{BinOp, Const, Expr, Program, PropVal, UnOp};
use crate::symtab::{SymKind, SymbolTable};
use tadsc_base::{Arena, Interner};

/// Folds every constant-foldable property initializer in the program.
pub fn fold_program<'a>(
    arena: &'a Arena,
    symtab: &SymbolTable,
    interner: &mut Interner,
    program: &mut Program<'a>,
) {
    for idx in 0..program.objects.len() {
        for pidx in 0..program.objects[idx].props.len() {
            if let PropVal::Expr(e) = program.objects[idx].props[pidx].val {
                let folded = fold_expr(arena, symtab, interner, e);
                program.objects[idx].props[pidx].val = PropVal::Expr(folded);
            }
        }
    }
}

/// Folds one expression tree.
pub fn fold_expr<'a>(
    arena: &'a Arena,
    symtab: &SymbolTable,
    interner: &mut Interner,
    expr: &'a Expr<'a>,
) -> &'a Expr<'a> {
    match expr {
        Expr::Sym { name, .. } => {
            // identifiers naming compile-time constants fold to constants
            match symtab.find(*name).map(|id| (id, &symtab.sym(id).kind)) {
                Some((id, SymKind::Enum(_))) => arena.alloc(Expr::Const(Const::Enum(id))),
                Some((id, SymKind::Object(_))) => arena.alloc(Expr::Const(Const::Object(id))),
                _ => expr,
            }
        }
        Expr::Unary { op, operand } => {
            let folded = fold_expr(arena, symtab, interner, operand);
            match (op, folded.as_const()) {
                (UnOp::Neg, Some(Const::Int(v))) => {
                    arena.alloc(Expr::Const(Const::Int(v.wrapping_neg())))
                }
                (UnOp::BNot, Some(Const::Int(v))) => arena.alloc(Expr::Const(Const::Int(!v))),
                (UnOp::Not, Some(c)) => match truthiness(c) {
                    Some(true) => arena.alloc(Expr::Const(Const::Nil)),
                    Some(false) => arena.alloc(Expr::Const(Const::True)),
                    None => rebuild_unary(arena, expr, *op, operand, folded),
                },
                _ => rebuild_unary(arena, expr, *op, operand, folded),
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let l = fold_expr(arena, symtab, interner, lhs);
            let r = fold_expr(arena, symtab, interner, rhs);
            if let (Some(lc), Some(rc)) = (l.as_const(), r.as_const()) {
                if let Some(folded) = fold_binary(interner, *op, lc, rc) {
                    return arena.alloc(Expr::Const(folded));
                }
            }
            if std::ptr::eq(l, *lhs) && std::ptr::eq(r, *rhs) {
                expr
            } else {
                arena.alloc(Expr::Binary { op: *op, lhs: l, rhs: r })
            }
        }
        Expr::Cond { cond, then, other } => {
            let c = fold_expr(arena, symtab, interner, cond);
            match c.as_const().and_then(truthiness) {
                Some(true) => fold_expr(arena, symtab, interner, then),
                Some(false) => fold_expr(arena, symtab, interner, other),
                None => {
                    let t = fold_expr(arena, symtab, interner, then);
                    let o = fold_expr(arena, symtab, interner, other);
                    if std::ptr::eq(c, *cond) && std::ptr::eq(t, *then) && std::ptr::eq(o, *other)
                    {
                        expr
                    } else {
                        arena.alloc(Expr::Cond { cond: c, then: t, other: o })
                    }
                }
            }
        }
        Expr::List(items) => {
            let folded: Vec<&'a Expr<'a>> = items
                .iter()
                .map(|e| fold_expr(arena, symtab, interner, e))
                .collect();
            if folded.iter().zip(items.iter()).all(|(a, b)| std::ptr::eq(*a, *b)) {
                expr
            } else {
                arena.alloc(Expr::List(arena.alloc_slice_fill(folded)))
            }
        }
        _ => expr,
    }
}

fn rebuild_unary<'a>(
    arena: &'a Arena,
    orig: &'a Expr<'a>,
    op: UnOp,
    old: &'a Expr<'a>,
    new: &'a Expr<'a>,
) -> &'a Expr<'a> {
    if std::ptr::eq(old, new) {
        orig
    } else {
        arena.alloc(Expr::Unary { op, operand: new })
    }
}

/// TADS truth value of a constant, when it has one.
fn truthiness(c: Const) -> Option<bool> {
    match c {
        Const::Nil => Some(false),
        Const::True => Some(true),
        Const::Int(v) => Some(v != 0),
        _ => None,
    }
}

fn fold_binary(interner: &mut Interner, op: BinOp, l: Const, r: Const) -> Option<Const> {
    use BinOp::*;
    match (l, r) {
        (Const::Int(a), Const::Int(b)) => match op {
            Add => Some(Const::Int(a.wrapping_add(b))),
            Sub => Some(Const::Int(a.wrapping_sub(b))),
            Mul => Some(Const::Int(a.wrapping_mul(b))),
            Div if b != 0 => Some(Const::Int(a.wrapping_div(b))),
            Mod if b != 0 => Some(Const::Int(a.wrapping_rem(b))),
            Shl => Some(Const::Int(a.wrapping_shl(b as u32))),
            Shr => Some(Const::Int(a.wrapping_shr(b as u32))),
            BAnd => Some(Const::Int(a & b)),
            BOr => Some(Const::Int(a | b)),
            BXor => Some(Const::Int(a ^ b)),
            Eq => Some(bool_const(a == b)),
            Ne => Some(bool_const(a != b)),
            Lt => Some(bool_const(a < b)),
            Gt => Some(bool_const(a > b)),
            Le => Some(bool_const(a <= b)),
            Ge => Some(bool_const(a >= b)),
            _ => None,
        },
        (Const::SStr(a), Const::SStr(b)) => match op {
            Add => {
                let joined = format!("{}{}", interner.resolve(a), interner.resolve(b));
                Some(Const::SStr(interner.intern(&joined)))
            }
            Eq => Some(bool_const(a == b)),
            Ne => Some(bool_const(a != b)),
            _ => None,
        },
        _ => match op {
            And => match (truthiness(l), truthiness(r)) {
                (Some(a), Some(b)) => Some(bool_const(a && b)),
                _ => None,
            },
            Or => match (truthiness(l), truthiness(r)) {
                (Some(a), Some(b)) => Some(bool_const(a || b)),
                _ => None,
            },
            Eq if constants_comparable(l, r) => Some(bool_const(l == r)),
            Ne if constants_comparable(l, r) => Some(bool_const(l != r)),
            _ => None,
        },
    }
}

/// Equality folds only within one constant family.
fn constants_comparable(l: Const, r: Const) -> bool {
    matches!(
        (l, r),
        (Const::Nil | Const::True, Const::Nil | Const::True)
            | (Const::Object(_), Const::Object(_))
            | (Const::Enum(_), Const::Enum(_))
    )
}

fn bool_const(b: bool) -> Const {
    if b {
        Const::True
    } else {
        Const::Nil
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tadsc_base::SourcePos;

    fn int(arena: &Arena, v: i64) -> &Expr<'_> {
        arena.alloc(Expr::Const(Const::Int(v)))
    }

    #[test]
    fn folds_arithmetic() {
        let arena = Arena::new();
        let symtab = SymbolTable::new();
        let mut interner = Interner::new();
        let e = arena.alloc(Expr::Binary {
            op: BinOp::Add,
            lhs: int(&arena, 2),
            rhs: arena.alloc(Expr::Binary {
                op: BinOp::Mul,
                lhs: int(&arena, 3),
                rhs: int(&arena, 4),
            }),
        });
        let folded = fold_expr(&arena, &symtab, &mut interner, e);
        assert_eq!(folded.as_const(), Some(Const::Int(14)));
    }

    #[test]
    fn division_by_zero_is_left_alone() {
        let arena = Arena::new();
        let symtab = SymbolTable::new();
        let mut interner = Interner::new();
        let e = arena.alloc(Expr::Binary {
            op: BinOp::Div,
            lhs: int(&arena, 1),
            rhs: int(&arena, 0),
        });
        let folded = fold_expr(&arena, &symtab, &mut interner, e);
        assert!(folded.as_const().is_none());
    }

    #[test]
    fn folds_string_concat() {
        let arena = Arena::new();
        let symtab = SymbolTable::new();
        let mut interner = Interner::new();
        let a = interner.intern("north ");
        let b = interner.intern("wall");
        let e = arena.alloc(Expr::Binary {
            op: BinOp::Add,
            lhs: arena.alloc(Expr::Const(Const::SStr(a))),
            rhs: arena.alloc(Expr::Const(Const::SStr(b))),
        });
        let folded = fold_expr(&arena, &symtab, &mut interner, e);
        match folded.as_const() {
            Some(Const::SStr(s)) => assert_eq!(interner.resolve(s), "north wall"),
            other => panic!("expected folded string, got {other:?}"),
        }
    }

    #[test]
    fn folds_conditional_on_constant() {
        let arena = Arena::new();
        let symtab = SymbolTable::new();
        let mut interner = Interner::new();
        let e = arena.alloc(Expr::Cond {
            cond: arena.alloc(Expr::Const(Const::True)),
            then: int(&arena, 1),
            other: int(&arena, 2),
        });
        let folded = fold_expr(&arena, &symtab, &mut interner, e);
        assert_eq!(folded.as_const(), Some(Const::Int(1)));
    }

    #[test]
    fn unfoldable_tree_is_returned_unchanged() {
        let arena = Arena::new();
        let symtab = SymbolTable::new();
        let mut interner = Interner::new();
        let name = interner.intern("someProp");
        let e = arena.alloc(Expr::Binary {
            op: BinOp::Add,
            lhs: arena.alloc(Expr::Sym {
                name,
                pos: SourcePos::none(),
            }),
            rhs: int(&arena, 1),
        });
        let folded = fold_expr(&arena, &symtab, &mut interner, e);
        assert!(std::ptr::eq(folded, e));
    }

    #[test]
    fn negation_folds() {
        let arena = Arena::new();
        let symtab = SymbolTable::new();
        let mut interner = Interner::new();
        let e = arena.alloc(Expr::Unary {
            op: UnOp::Neg,
            operand: int(&arena, 7),
        });
        let folded = fold_expr(&arena, &symtab, &mut interner, e);
        assert_eq!(folded.as_const(), Some(Const::Int(-7)));
    }
}
