//! Local canonicalization of freshly built statements.
//!
//! These rewrites run once, at the moment a loop or conditional is sealed
//! into its container; they are all idempotent.

use std::mem;

use crate::ast::{Expr, LabelId, Stmt};
use crate::ir::{BinaryOp, Constant, UnaryOp};

/// Logical negation, unwrapping an existing `!`.
pub(crate) fn not(expr: Expr) -> Expr {
    match expr {
        Expr::Unary {
            op: UnaryOp::Not,
            operand,
        } => *operand,
        other => Expr::unary(UnaryOp::Not, other),
    }
}

/// Logical conjunction; `!a && !b` folds to `!(a || b)`.
pub(crate) fn and(a: Expr, b: Expr) -> Expr {
    match (a, b) {
        (
            Expr::Unary {
                op: UnaryOp::Not,
                operand: a,
            },
            Expr::Unary {
                op: UnaryOp::Not,
                operand: b,
            },
        ) => Expr::unary(
            UnaryOp::Not,
            Expr::Binary {
                op: BinaryOp::Or,
                lhs: a,
                rhs: b,
            },
        ),
        (a, b) => Expr::binary(BinaryOp::And, a, b),
    }
}

fn placeholder() -> Expr {
    Expr::Const(Constant::Null)
}

/// Canonicalizes a conditional in place. Returns whether anything changed.
pub(crate) fn optimize_if(
    condition: &mut Expr,
    consequent: &mut Vec<Stmt>,
    alternative: &mut Vec<Stmt>,
) -> bool {
    let a = invert_empty_consequent(condition, consequent, alternative);
    let b = merge_nested_ifs(condition, consequent, alternative);
    let c = invert_not_condition(condition, consequent, alternative);
    a | b | c
}

/// `if (c) {} else { S }` becomes `if (!c) { S }`.
fn invert_empty_consequent(
    condition: &mut Expr,
    consequent: &mut Vec<Stmt>,
    alternative: &mut Vec<Stmt>,
) -> bool {
    if !consequent.is_empty() || alternative.is_empty() {
        return false;
    }
    let cond = mem::replace(condition, placeholder());
    *condition = not(cond);
    mem::swap(consequent, alternative);
    true
}

/// `if (a) { if (b) { S } }` becomes `if (a && b) { S }`.
fn merge_nested_ifs(
    condition: &mut Expr,
    consequent: &mut Vec<Stmt>,
    alternative: &mut Vec<Stmt>,
) -> bool {
    if !alternative.is_empty() || consequent.len() != 1 {
        return false;
    }
    if !matches!(
        consequent.first(),
        Some(Stmt::If { alternative, .. }) if alternative.is_empty()
    ) {
        return false;
    }
    let Some(Stmt::If {
        condition: inner_condition,
        consequent: inner_consequent,
        ..
    }) = consequent.pop()
    else {
        return false;
    };
    *consequent = inner_consequent;
    let outer = mem::replace(condition, placeholder());
    *condition = and(outer, inner_condition);
    invert_not_condition(condition, consequent, alternative);
    true
}

/// `if (!c) { A } else { B }` becomes `if (c) { B } else { A }`.
fn invert_not_condition(
    condition: &mut Expr,
    consequent: &mut Vec<Stmt>,
    alternative: &mut Vec<Stmt>,
) -> bool {
    if consequent.is_empty() || alternative.is_empty() {
        return false;
    }
    if !matches!(
        condition,
        Expr::Unary {
            op: UnaryOp::Not,
            ..
        }
    ) {
        return false;
    }
    let cond = mem::replace(condition, placeholder());
    if let Expr::Unary { operand, .. } = cond {
        *condition = *operand;
    }
    mem::swap(consequent, alternative);
    true
}

/// Pulls a leading `if (c) break <this loop>;` out of a guard-less loop
/// body and turns it into the loop's guard `!c`.
pub(crate) fn optimize_loop(
    condition: &mut Option<Expr>,
    body: &mut Vec<Stmt>,
    label: LabelId,
) -> bool {
    if condition.is_some() || body.is_empty() {
        return false;
    }
    if !matches!(
        body.first(),
        Some(Stmt::If {
            consequent,
            alternative,
            ..
        }) if alternative.is_empty()
            && consequent.len() == 1
            && matches!(&consequent[0], Stmt::Break { target } if *target == label)
    ) {
        return false;
    }
    if let Stmt::If {
        condition: exit_condition,
        ..
    } = body.remove(0)
    {
        *condition = Some(not(exit_condition));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::LabelKind;
    use crate::ast::Labels;
    use crate::entity::EntityRef;
    use crate::ir::VarId;

    fn var(index: usize) -> Expr {
        Expr::Var(VarId::new(index))
    }

    fn ret() -> Stmt {
        Stmt::Return { value: None }
    }

    #[test]
    fn not_unwraps_double_negation() {
        let expr = not(not(var(0)));
        assert_eq!(expr, var(0));
    }

    #[test]
    fn and_applies_de_morgan() {
        let expr = and(not(var(0)), not(var(1)));
        assert_eq!(
            expr,
            Expr::unary(
                UnaryOp::Not,
                Expr::binary(BinaryOp::Or, var(0), var(1))
            )
        );
    }

    #[test]
    fn empty_consequent_inverts() {
        let mut condition = var(0);
        let mut consequent = Vec::new();
        let mut alternative = vec![ret()];
        assert!(optimize_if(&mut condition, &mut consequent, &mut alternative));
        assert_eq!(condition, not(var(0)));
        assert_eq!(consequent, vec![ret()]);
        assert!(alternative.is_empty());
    }

    #[test]
    fn nested_ifs_merge_with_and() {
        let mut condition = var(0);
        let mut consequent = vec![Stmt::If {
            condition: var(1),
            consequent: vec![ret()],
            alternative: Vec::new(),
        }];
        let mut alternative = Vec::new();
        assert!(optimize_if(&mut condition, &mut consequent, &mut alternative));
        assert_eq!(condition, Expr::binary(BinaryOp::And, var(0), var(1)));
        assert_eq!(consequent, vec![ret()]);
    }

    #[test]
    fn negated_condition_swaps_nonempty_arms() {
        let mut condition = not(var(0));
        let mut consequent = vec![ret()];
        let mut alternative = vec![Stmt::Throw { value: var(1) }];
        assert!(optimize_if(&mut condition, &mut consequent, &mut alternative));
        assert_eq!(condition, var(0));
        assert_eq!(consequent, vec![Stmt::Throw { value: var(1) }]);
        assert_eq!(alternative, vec![ret()]);
    }

    #[test]
    fn optimizer_is_idempotent() {
        let mut condition = var(0);
        let mut consequent = Vec::new();
        let mut alternative = vec![ret()];
        optimize_if(&mut condition, &mut consequent, &mut alternative);
        let snapshot = (condition.clone(), consequent.clone(), alternative.clone());
        assert!(!optimize_if(&mut condition, &mut consequent, &mut alternative));
        assert_eq!(snapshot, (condition, consequent, alternative));
    }

    #[test]
    fn loop_guard_extracted_from_leading_break() {
        let mut labels = Labels::new();
        let label = labels.alloc(LabelKind::Loop);
        let mut condition = None;
        let mut body = vec![
            Stmt::If {
                condition: var(0),
                consequent: vec![Stmt::Break { target: label }],
                alternative: Vec::new(),
            },
            ret(),
        ];
        assert!(optimize_loop(&mut condition, &mut body, label));
        assert_eq!(condition, Some(not(var(0))));
        assert_eq!(body, vec![ret()]);
    }

    #[test]
    fn guarded_loop_left_alone() {
        let mut labels = Labels::new();
        let label = labels.alloc(LabelKind::Loop);
        let mut condition = Some(var(0));
        let mut body = vec![ret()];
        assert!(!optimize_loop(&mut condition, &mut body, label));
        assert_eq!(body, vec![ret()]);
    }
}
