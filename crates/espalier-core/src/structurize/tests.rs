use super::structurize;
use crate::ast::{Expr, Stmt, StructuredBody};
use crate::error::CoreError;
use crate::ir::{BinaryOp, BranchCond, Constant, FunctionBuilder};

/// Collects the names of all calls in the tree, in statement order.
fn call_names(stmts: &[Stmt]) -> Vec<String> {
    fn from_expr(expr: &Expr, out: &mut Vec<String>) {
        match expr {
            Expr::Call { function, args } => {
                for arg in args {
                    from_expr(arg, out);
                }
                out.push(function.clone());
            }
            Expr::Unary { operand, .. } => from_expr(operand, out),
            Expr::Binary { lhs, rhs, .. } => {
                from_expr(lhs, out);
                from_expr(rhs, out);
            }
            Expr::GetField { object, .. } => {
                if let Some(object) = object {
                    from_expr(object, out);
                }
            }
            Expr::GetElement { array, index } => {
                from_expr(array, out);
                from_expr(index, out);
            }
            Expr::Var(_) | Expr::Const(_) => {}
        }
    }
    fn walk(stmts: &[Stmt], out: &mut Vec<String>) {
        for stmt in stmts {
            match stmt {
                Stmt::Assign { target, value } => {
                    if let Some(target) = target {
                        from_expr(target, out);
                    }
                    from_expr(value, out);
                }
                Stmt::Labeled { body, .. } => walk(body, out),
                Stmt::While {
                    condition, body, ..
                } => {
                    if let Some(condition) = condition {
                        from_expr(condition, out);
                    }
                    walk(body, out);
                }
                Stmt::If {
                    condition,
                    consequent,
                    alternative,
                } => {
                    from_expr(condition, out);
                    walk(consequent, out);
                    walk(alternative, out);
                }
                Stmt::Switch {
                    value,
                    clauses,
                    default,
                } => {
                    from_expr(value, out);
                    for clause in clauses {
                        walk(&clause.body, out);
                    }
                    walk(default, out);
                }
                Stmt::Try { body, handler, .. } => {
                    walk(body, out);
                    walk(handler, out);
                }
                Stmt::Return { value } => {
                    if let Some(value) = value {
                        from_expr(value, out);
                    }
                }
                Stmt::Throw { value } => from_expr(value, out),
                Stmt::Break { .. } | Stmt::Continue { .. } => {}
            }
        }
    }
    let mut out = Vec::new();
    walk(stmts, &mut out);
    out
}

/// All labeled blocks remaining in the tree.
fn labeled_blocks(stmts: &[Stmt], out: &mut Vec<crate::ast::LabelId>) {
    for stmt in stmts {
        match stmt {
            Stmt::Labeled { label, body } => {
                out.push(*label);
                labeled_blocks(body, out);
            }
            Stmt::While { body, .. } => labeled_blocks(body, out),
            Stmt::If {
                consequent,
                alternative,
                ..
            } => {
                labeled_blocks(consequent, out);
                labeled_blocks(alternative, out);
            }
            Stmt::Switch {
                clauses, default, ..
            } => {
                for clause in clauses {
                    labeled_blocks(&clause.body, out);
                }
                labeled_blocks(default, out);
            }
            Stmt::Try { body, handler, .. } => {
                labeled_blocks(body, out);
                labeled_blocks(handler, out);
            }
            _ => {}
        }
    }
}

fn assert_labels_used(body: &StructuredBody) {
    let mut labels = Vec::new();
    labeled_blocks(&body.statements, &mut labels);
    for label in labels {
        assert!(
            body.labels.use_count(label) > 0,
            "label {label} materialized with zero uses:\n{body}"
        );
    }
}

#[test]
fn linear_chain_needs_no_labels() {
    let mut fb = FunctionBuilder::new("chain");
    let b = fb.create_block();
    fb.call_void("a", &[]);
    fb.jump(b);
    fb.switch_to_block(b);
    fb.call_void("b", &[]);
    fb.ret(None);

    let body = structurize(&fb.build()).unwrap();
    assert_eq!(call_names(&body.statements), vec!["a", "b"]);
    let mut labels = Vec::new();
    labeled_blocks(&body.statements, &mut labels);
    assert!(labels.is_empty(), "unexpected labels:\n{body}");
    // The trailing bare return at the end of the function is elided.
    assert_eq!(body.statements.len(), 2);
}

#[test]
fn diamond_owns_both_arms_and_inlines_merge() {
    let mut fb = FunctionBuilder::new("diamond");
    let cond = fb.fresh_var();
    let then_block = fb.create_block();
    let else_block = fb.create_block();
    let merge = fb.create_block();

    fb.branch_nonzero(cond, then_block, else_block);
    fb.switch_to_block(then_block);
    fb.call_void("b", &[]);
    fb.jump(merge);
    fb.switch_to_block(else_block);
    fb.call_void("c", &[]);
    fb.jump(merge);
    fb.switch_to_block(merge);
    fb.call_void("d", &[]);
    fb.ret(None);

    let body = structurize(&fb.build()).unwrap();
    assert_labels_used(&body);

    // if (cond != 0) { b(); } else { c(); } followed by d() inlined.
    assert_eq!(body.statements.len(), 2, "got:\n{body}");
    match &body.statements[0] {
        Stmt::If {
            consequent,
            alternative,
            ..
        } => {
            assert_eq!(call_names(consequent), vec!["b"]);
            assert_eq!(call_names(alternative), vec!["c"]);
        }
        other => panic!("expected If, got {other:?}"),
    }
    assert_eq!(call_names(&body.statements[1..]), vec!["d"]);
}

#[test]
fn natural_loop_gets_a_guard() {
    //   entry -> head; head: if (v0) body else exit; body -> head
    let mut fb = FunctionBuilder::new("natural_loop");
    let examined = fb.fresh_var();
    let head = fb.create_block();
    let loop_body = fb.create_block();
    let exit = fb.create_block();

    fb.jump(head);
    fb.switch_to_block(head);
    fb.branch_nonzero(examined, loop_body, exit);
    fb.switch_to_block(loop_body);
    fb.call_void("work", &[]);
    fb.jump(head);
    fb.switch_to_block(exit);
    fb.call_void("after", &[]);
    fb.ret(None);

    let body = structurize(&fb.build()).unwrap();
    assert_labels_used(&body);
    assert_eq!(body.statements.len(), 2, "got:\n{body}");
    match &body.statements[0] {
        Stmt::While {
            condition, body, ..
        } => {
            // The exit branch `if (!(v0 != 0)) break` became the guard.
            assert_eq!(
                condition.as_ref(),
                Some(&Expr::binary(
                    BinaryOp::Ne,
                    Expr::Var(examined),
                    Expr::int(0)
                ))
            );
            assert_eq!(call_names(body), vec!["work"]);
        }
        other => panic!("expected While, got {other:?}"),
    }
    assert_eq!(call_names(&body.statements[1..]), vec!["after"]);
}

#[test]
fn regular_protected_region_becomes_one_try() {
    let mut fb = FunctionBuilder::new("try_regular");
    let second = fb.create_block();
    let handler = fb.create_block();

    fb.protect(Some("Failure"), handler);
    fb.call_void("a", &[]);
    fb.jump(second);

    fb.switch_to_block(second);
    fb.protect(Some("Failure"), handler);
    fb.call_void("b", &[]);
    fb.ret(None);

    fb.switch_to_block(handler);
    let caught = fb.set_exception_var();
    fb.call_void("recover", &[caught]);
    fb.ret(None);

    let body = structurize(&fb.build()).unwrap();
    assert_labels_used(&body);
    assert_eq!(body.statements.len(), 1, "got:\n{body}");
    match &body.statements[0] {
        Stmt::Try {
            body,
            exception_type,
            exception_var,
            handler,
        } => {
            assert_eq!(call_names(body), vec!["a", "b"]);
            assert_eq!(exception_type.as_deref(), Some("Failure"));
            assert_eq!(*exception_var, Some(caught));
            assert_eq!(call_names(handler), vec!["recover"]);
        }
        other => panic!("expected Try, got {other:?}"),
    }
}

#[test]
fn switch_coalesces_values_and_owns_targets() {
    let mut fb = FunctionBuilder::new("switch");
    let scrutinee = fb.fresh_var();
    let b = fb.create_block();
    let c = fb.create_block();
    let d = fb.create_block();

    fb.switch(scrutinee, &[(1, b), (2, b), (3, c)], d);
    fb.switch_to_block(b);
    fb.call_void("b", &[]);
    fb.ret(None);
    fb.switch_to_block(c);
    fb.call_void("c", &[]);
    fb.ret(None);
    fb.switch_to_block(d);
    fb.call_void("d", &[]);
    fb.ret(None);

    let body = structurize(&fb.build()).unwrap();
    let mut labels = Vec::new();
    labeled_blocks(&body.statements, &mut labels);
    assert!(labels.is_empty(), "unexpected labels:\n{body}");

    assert_eq!(body.statements.len(), 1);
    match &body.statements[0] {
        Stmt::Switch {
            clauses, default, ..
        } => {
            assert_eq!(clauses.len(), 2);
            assert_eq!(clauses[0].values, vec![1, 2]);
            assert_eq!(call_names(&clauses[0].body), vec!["b"]);
            assert_eq!(clauses[1].values, vec![3]);
            assert_eq!(call_names(&clauses[1].body), vec!["c"]);
            assert_eq!(call_names(default), vec!["d"]);
        }
        other => panic!("expected Switch, got {other:?}"),
    }
}

#[test]
fn nested_conditions_merge_into_and() {
    //   entry: if (v0) b else x; b: if (v1) c else x; c: call; x: ret
    let mut fb = FunctionBuilder::new("and_merge");
    let first = fb.fresh_var();
    let second = fb.fresh_var();
    let b = fb.create_block();
    let c = fb.create_block();
    let x = fb.create_block();

    fb.branch_nonzero(first, b, x);
    fb.switch_to_block(b);
    fb.branch_nonzero(second, c, x);
    fb.switch_to_block(c);
    fb.call_void("both", &[]);
    fb.jump(x);
    fb.switch_to_block(x);
    fb.ret(None);

    let body = structurize(&fb.build()).unwrap();
    assert_eq!(body.statements.len(), 1, "got:\n{body}");
    match &body.statements[0] {
        Stmt::If {
            condition,
            consequent,
            alternative,
        } => {
            assert_eq!(
                *condition,
                Expr::binary(
                    BinaryOp::And,
                    Expr::binary(BinaryOp::Ne, Expr::Var(first), Expr::int(0)),
                    Expr::binary(BinaryOp::Ne, Expr::Var(second), Expr::int(0)),
                )
            );
            assert_eq!(call_names(consequent), vec!["both"]);
            assert!(alternative.is_empty());
        }
        other => panic!("expected If, got {other:?}"),
    }
}

#[test]
fn loop_inside_arm_folds_trailing_break() {
    //   entry: if (v0) head else c
    //   head:  if (v1) l else m     (loop, no dedicated exit)
    //   l:     call; jump head
    //   c:     call; jump m
    //   m:     call; ret
    let mut fb = FunctionBuilder::new("loop_in_arm");
    let outer = fb.fresh_var();
    let inner = fb.fresh_var();
    let head = fb.create_block();
    let l = fb.create_block();
    let c = fb.create_block();
    let m = fb.create_block();

    fb.branch_nonzero(outer, head, c);
    fb.switch_to_block(head);
    fb.branch_nonzero(inner, l, m);
    fb.switch_to_block(l);
    fb.call_void("work", &[]);
    fb.jump(head);
    fb.switch_to_block(c);
    fb.call_void("other", &[]);
    fb.jump(m);
    fb.switch_to_block(m);
    fb.call_void("merge", &[]);
    fb.ret(None);

    let body = structurize(&fb.build()).unwrap();
    assert_labels_used(&body);

    // Break elimination folds the chain: the labeled block's trailing
    // statements moved into the conditional's arms.
    assert_eq!(body.statements.len(), 2, "got:\n{body}");
    match &body.statements[0] {
        Stmt::Labeled { body: inner, .. } => match &inner[0] {
            Stmt::If {
                consequent,
                alternative,
                ..
            } => {
                assert!(
                    consequent.iter().any(|s| matches!(s, Stmt::While { .. })),
                    "expected the loop inside an arm:\n{body}"
                );
                assert_eq!(call_names(alternative), vec!["other"]);
            }
            other => panic!("expected If inside label, got {other:?}"),
        },
        other => panic!("expected Labeled, got {other:?}"),
    }
    assert_eq!(call_names(&body.statements[1..]), vec!["merge"]);
}

#[test]
fn collapsible_values_inline_without_temporaries() {
    let mut fb = FunctionBuilder::new("inline");
    let x = fb.call("f", &[]);
    let y = fb.call("g", &[x]);
    fb.call_void("use", &[y]);
    fb.ret(None);

    let body = structurize(&fb.build()).unwrap();
    assert_eq!(body.statements.len(), 1, "got:\n{body}");
    assert_eq!(
        body.statements[0],
        Stmt::Assign {
            target: None,
            value: Expr::Call {
                function: "use".into(),
                args: vec![Expr::Call {
                    function: "g".into(),
                    args: vec![Expr::Call {
                        function: "f".into(),
                        args: vec![],
                    }],
                }],
            },
        }
    );
}

#[test]
fn stack_order_consumption_inlines_both() {
    let mut fb = FunctionBuilder::new("ordered");
    let x = fb.call("f", &[]);
    let y = fb.call("g", &[]);
    fb.call_void("use", &[x, y]);
    fb.ret(None);

    let body = structurize(&fb.build()).unwrap();
    // use(f(), g()) — both pending values consumed in stack order.
    assert_eq!(call_names(&body.statements), vec!["f", "g", "use"]);
    assert_eq!(body.statements.len(), 1, "got:\n{body}");
}

#[test]
fn out_of_order_read_is_fatal() {
    let mut fb = FunctionBuilder::new("unordered");
    let x = fb.call("f", &[]);
    let y = fb.call("g", &[]);
    // Arguments reversed relative to computation order: x is buried under
    // y on the pending stack when it is requested.
    fb.call_void("use", &[y, x]);
    fb.ret(None);

    let err = structurize(&fb.build()).unwrap_err();
    assert!(
        matches!(err, CoreError::UnorderedVariable { var, .. } if var == x),
        "unexpected error: {err}"
    );
}

#[test]
fn compare_against_zero_folds_to_direct_comparison() {
    let mut fb = FunctionBuilder::new("fold");
    let a = fb.fresh_var();
    let b = fb.fresh_var();
    let t = fb.create_block();
    let f = fb.create_block();

    let cmp = fb.compare(a, b);
    fb.branch(BranchCond::Less, cmp, t, f);
    fb.switch_to_block(t);
    fb.call_void("less", &[]);
    fb.ret(None);
    fb.switch_to_block(f);
    fb.call_void("rest", &[]);
    fb.ret(None);

    let body = structurize(&fb.build()).unwrap();
    match &body.statements[0] {
        Stmt::If { condition, .. } => {
            assert_eq!(
                *condition,
                Expr::binary(BinaryOp::Lt, Expr::Var(a), Expr::Var(b))
            );
        }
        other => panic!("expected If, got {other:?}"),
    }
}

#[test]
fn return_value_is_inlined() {
    let mut fb = FunctionBuilder::new("ret_value");
    let a = fb.fresh_var();
    let b = fb.fresh_var();
    let sum = fb.add(a, b);
    fb.ret(Some(sum));

    let body = structurize(&fb.build()).unwrap();
    assert_eq!(
        body.statements,
        vec![Stmt::Return {
            value: Some(Expr::binary(BinaryOp::Add, Expr::Var(a), Expr::Var(b))),
        }]
    );
}

#[test]
fn multi_use_constant_stays_relocatable() {
    let mut fb = FunctionBuilder::new("const_reuse");
    let ten = fb.const_int(10);
    let x = fb.add(ten, ten);
    fb.ret(Some(x));

    let body = structurize(&fb.build()).unwrap();
    // The constant substitutes at both uses; no temporary materializes.
    assert_eq!(
        body.statements,
        vec![Stmt::Return {
            value: Some(Expr::binary(
                BinaryOp::Add,
                Expr::Const(Constant::Int(10)),
                Expr::Const(Constant::Int(10)),
            )),
        }]
    );
}

#[test]
fn missing_terminator_is_fatal() {
    let mut fb = FunctionBuilder::new("unterminated");
    fb.call_void("a", &[]);

    let err = structurize(&fb.build()).unwrap_err();
    assert!(
        matches!(err, CoreError::MissingTerminator { .. }),
        "unexpected error: {err}"
    );
}

#[test]
fn structurize_is_deterministic() {
    let mut fb = FunctionBuilder::new("deterministic");
    let cond = fb.fresh_var();
    let head = fb.create_block();
    let l = fb.create_block();
    let a = fb.create_block();
    let b = fb.create_block();
    let exit = fb.create_block();

    fb.jump(head);
    fb.switch_to_block(head);
    fb.branch_nonzero(cond, l, a);
    fb.switch_to_block(l);
    fb.call_void("body", &[]);
    fb.jump(head);
    fb.switch_to_block(a);
    fb.call_void("a", &[]);
    fb.jump(b);
    fb.switch_to_block(b);
    fb.call_void("b", &[]);
    fb.jump(exit);
    fb.switch_to_block(exit);
    fb.ret(None);
    let func = fb.build();

    let first = structurize(&func).unwrap();
    let second = structurize(&func).unwrap();
    assert_eq!(first, second);
}

#[test]
fn every_block_appears_exactly_once() {
    let mut fb = FunctionBuilder::new("coverage");
    let cond = fb.fresh_var();
    let scrutinee = fb.fresh_var();
    let left = fb.create_block();
    let right = fb.create_block();
    let merge = fb.create_block();
    let s1 = fb.create_block();
    let s2 = fb.create_block();
    let exit = fb.create_block();

    fb.branch_nonzero(cond, left, right);
    fb.switch_to_block(left);
    fb.call_void("left", &[]);
    fb.jump(merge);
    fb.switch_to_block(right);
    fb.call_void("right", &[]);
    fb.jump(merge);
    fb.switch_to_block(merge);
    fb.call_void("merge", &[]);
    fb.switch(scrutinee, &[(1, s1), (2, s2)], exit);
    fb.switch_to_block(s1);
    fb.call_void("s1", &[]);
    fb.ret(None);
    fb.switch_to_block(s2);
    fb.call_void("s2", &[]);
    fb.ret(None);
    fb.switch_to_block(exit);
    fb.call_void("exit", &[]);
    fb.ret(None);

    let body = structurize(&fb.build()).unwrap();
    let mut names = call_names(&body.statements);
    names.sort();
    let mut expected = vec!["left", "right", "merge", "s1", "s2", "exit"];
    expected.sort_unstable();
    assert_eq!(names, expected, "got:\n{body}");
}

#[test]
fn irregular_region_falls_back_to_labeled_children() {
    // Two blocks declare the same handler at different nesting depths, so
    // the region is not representable as one nested statement.
    let mut fb = FunctionBuilder::new("irregular");
    let second = fb.create_block();
    let handler = fb.create_block();
    let other_handler = fb.create_block();

    fb.protect(Some("Failure"), handler);
    fb.call_void("a", &[]);
    fb.jump(second);

    fb.switch_to_block(second);
    // Same handler, but nested under a different outer region.
    fb.protect(Some("Other"), other_handler);
    fb.protect(Some("Failure"), handler);
    fb.call_void("b", &[]);
    fb.ret(None);

    fb.switch_to_block(handler);
    fb.call_void("recover", &[]);
    fb.ret(None);

    fb.switch_to_block(other_handler);
    fb.call_void("recover_other", &[]);
    fb.ret(None);

    let body = structurize(&fb.build()).unwrap();
    // The shared-handler region is not representable as one nested
    // statement, so no Try opens for it — its handler is reached as an
    // ordinary dominated child instead. The well-nested `Other` region on
    // the second block still structures normally. Every block appears
    // exactly once either way.
    fn try_types(stmts: &[Stmt], out: &mut Vec<Option<String>>) {
        for stmt in stmts {
            match stmt {
                Stmt::Try {
                    body,
                    exception_type,
                    handler,
                    ..
                } => {
                    out.push(exception_type.clone());
                    try_types(body, out);
                    try_types(handler, out);
                }
                Stmt::Labeled { body, .. } | Stmt::While { body, .. } => try_types(body, out),
                Stmt::If {
                    consequent,
                    alternative,
                    ..
                } => {
                    try_types(consequent, out);
                    try_types(alternative, out);
                }
                _ => {}
            }
        }
    }
    let mut names = call_names(&body.statements);
    names.sort();
    let mut expected = vec!["a", "b", "recover", "recover_other"];
    expected.sort_unstable();
    assert_eq!(names, expected, "got:\n{body}");

    let mut types = Vec::new();
    try_types(&body.statements, &mut types);
    assert_eq!(
        types,
        vec![Some("Other".to_string())],
        "only the well-nested region may open:\n{body}"
    );
}
