// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Pass (b): stock-flow resolution, per §4.4. Decomposes each stock's
//! `INTEG(flow_expr, init_expr)` call: `flow_expr`'s top-level additive
//! structure becomes the stock's inflow/outflow list, and `init_expr`
//! becomes a synthesized initialization equation.
//!
//! A stock's flow expression decomposes cleanly only when every addend is a
//! bare variable reference, no variable repeats or appears on both the
//! inflow and outflow side, and no addend names the stock itself or another
//! stock. Any other shape invalidates the *whole* decomposition (not just
//! the offending addend): the entire flow expression is lifted verbatim into
//! one synthesized net-flow auxiliary, per §4.4's "synthetic net-flow
//! variable synthesis" and mirroring xmutil's `MarkStockFlows`
//! (`Variable.cpp:210-276`). A stock defined by more than one equation (an
//! `EXCEPT`-partitioned array, say) must have every equation decompose to
//! the *same* inflow/outflow set before that set is trusted directly; when
//! they disagree, each equation's raw flow expression is copied verbatim
//! onto the synthesized flow rather than merged into a sum (§9).

use crate::ast::{BinaryOp, Equation, EquationKind, Expr, FuncRef, InterpMode, Lhs, SymbolList, UnaryOp};
use crate::model::{FlowList, Project, VarKind};
use crate::namespace::VarId;
use crate::passes::typing::root_call;

pub fn run(project: &mut Project) {
    let stocks: Vec<VarId> = project
        .namespace
        .iter()
        .filter(|&id| project.var(id).kind == VarKind::Stock)
        .collect();

    let mut synth_counter = 0u32;

    for stock in stocks {
        let integ_eqs = integ_equations(project, stock);
        if integ_eqs.is_empty() {
            continue;
        }

        let decomposed: Vec<Option<FlowList>> = integ_eqs
            .iter()
            .map(|(flow_expr, _, _)| {
                let mut flows = FlowList::default();
                if try_decompose(project, flow_expr, true, &mut flows, stock) {
                    Some(flows)
                } else {
                    None
                }
            })
            .collect();

        let all_match = decomposed.iter().all(Option::is_some)
            && decomposed
                .windows(2)
                .all(|w| flow_lists_match(w[0].as_ref().unwrap(), w[1].as_ref().unwrap()));

        let flows = if all_match {
            decomposed.into_iter().next().unwrap().unwrap()
        } else {
            let flow = synthesize_net_flow(project, &integ_eqs, &mut synth_counter, stock);
            FlowList {
                inflows: vec![flow],
                outflows: Vec::new(),
            }
        };

        for &flow in flows.inflows.iter().chain(&flows.outflows) {
            if project.var(flow).kind == VarKind::Unknown {
                project.var_mut(flow).kind = VarKind::Flow;
            }
        }

        let init_expr = integ_eqs[0].1.clone();
        let var = project.var_mut(stock);
        var.inflows = flows.inflows;
        var.outflows = flows.outflows;
        var.equations.push(Equation {
            lhs: Lhs {
                var: stock,
                subscripts: None,
                except: Vec::new(),
                interp: InterpMode::Default,
                loc: Default::default(),
            },
            rhs: init_expr,
            kind: EquationKind::DtNormalized,
            units: None,
            comment: None,
        });
    }
}

/// Every `INTEG(flow, init)` equation defining `stock`, in declaration
/// order, paired with the subscript tuple (if any) of the equation's LHS.
fn integ_equations(project: &Project, stock: VarId) -> Vec<(Expr, Expr, Option<SymbolList>)> {
    project
        .var(stock)
        .equations
        .iter()
        .filter_map(|eq| match &eq.rhs {
            Expr::FunctionCallWithMemory(FuncRef::Builtin(idx), args, _, _)
                if crate::functions::lookup(*idx).name == "integ" && args.len() == 2 =>
            {
                Some((args[0].clone(), args[1].clone(), eq.lhs.subscripts.clone()))
            }
            _ => None,
        })
        .collect()
}

fn flow_lists_match(a: &FlowList, b: &FlowList) -> bool {
    a.inflows.len() == b.inflows.len()
        && a.outflows.len() == b.outflows.len()
        && a.inflows.iter().all(|v| b.inflows.contains(v))
        && a.outflows.iter().all(|v| b.outflows.contains(v))
}

/// Walk `expr`'s top-level `+`/`-` chain, classifying each addend as an
/// inflow (positive) or outflow (subtracted). Returns `false` the moment any
/// addend fails to decompose: a non-variable addend, a variable repeated or
/// appearing on both sides, or a reference to `stock` itself or another
/// stock. The caller discards `flows` entirely on a `false` result.
fn try_decompose(
    project: &Project,
    expr: &Expr,
    positive: bool,
    flows: &mut FlowList,
    stock: VarId,
) -> bool {
    match expr {
        Expr::Binary(BinaryOp::Add, lhs, rhs, _) => {
            try_decompose(project, lhs, positive, flows, stock)
                && try_decompose(project, rhs, positive, flows, stock)
        }
        Expr::Binary(BinaryOp::Sub, lhs, rhs, _) => {
            try_decompose(project, lhs, positive, flows, stock)
                && try_decompose(project, rhs, !positive, flows, stock)
        }
        Expr::Unary(UnaryOp::Negative, inner, _) => {
            try_decompose(project, inner, !positive, flows, stock)
        }
        Expr::Unary(UnaryOp::Positive, inner, _) => {
            try_decompose(project, inner, positive, flows, stock)
        }
        Expr::Paren(inner, _) => try_decompose(project, inner, positive, flows, stock),
        Expr::VariableRef(var, _, _) => {
            if *var == stock
                || flows.inflows.contains(var)
                || flows.outflows.contains(var)
                || project.try_var(*var).is_some_and(|v| v.kind == VarKind::Stock)
            {
                false
            } else {
                push_flow(flows, *var, positive);
                true
            }
        }
        _ => false,
    }
}

fn push_flow(flows: &mut FlowList, var: VarId, positive: bool) {
    if positive {
        flows.inflows.push(var);
    } else {
        flows.outflows.push(var);
    }
}

/// Lift every `INTEG` equation's flow expression, verbatim, onto one new
/// flow auxiliary: one `<eqn>` per original stock equation, not merged into
/// a sum (§9).
fn synthesize_net_flow(
    project: &mut Project,
    integ_eqs: &[(Expr, Expr, Option<SymbolList>)],
    synth_counter: &mut u32,
    stock: VarId,
) -> VarId {
    let stock_name = project.namespace.display_name(stock).to_string();
    let base_name = format!("{stock_name} net flow");
    let name = if project.namespace.find(&base_name).is_none() {
        base_name
    } else {
        loop {
            *synth_counter += 1;
            let candidate = format!("{base_name} {synth_counter}");
            if project.namespace.find(&candidate).is_none() {
                break candidate;
            }
        }
    };
    let var = project.namespace.insert(&name);
    project.namespace.confirm_all();
    let variable = project.declare(var, VarKind::Flow);
    variable.is_synthesized = true;
    for (flow_expr, _, subscripts) in integ_eqs {
        variable.equations.push(Equation {
            lhs: Lhs {
                var,
                subscripts: subscripts.clone(),
                except: Vec::new(),
                interp: InterpMode::Default,
                loc: Default::default(),
            },
            rhs: flow_expr.clone(),
            kind: EquationKind::Definition,
            units: None,
            comment: None,
        });
    }
    var
}

/// Exposed for the emitter: is `root_call` actually `INTEG`? Kept alongside
/// this pass since it is the only other module that needs to recognize an
/// `INTEG` call shape.
pub fn is_integ(expr: &Expr) -> bool {
    matches!(root_call(expr), Some(FuncRef::Builtin(idx)) if crate::functions::lookup(*idx).name == "integ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Log;
    use crate::passes::typing;

    fn build(src: &str) -> Project {
        let mut project = Project::new("m");
        let mut log = Log::new();
        crate::parser::parse_equations(src, &mut project, &mut log);
        typing::run(&mut project, &mut log);
        run(&mut project);
        project
    }

    #[test]
    fn simple_integ_splits_inflow_and_outflow() {
        let project = build("Pop=INTEG(Births-Deaths, 100)~~|Births=1~~|Deaths=1~~|");
        let pop = project.namespace.find("Pop").unwrap();
        let births = project.namespace.find("Births").unwrap();
        let deaths = project.namespace.find("Deaths").unwrap();
        assert_eq!(project.var(pop).inflows, vec![births]);
        assert_eq!(project.var(pop).outflows, vec![deaths]);
        assert_eq!(project.var(births).kind, VarKind::Flow);
        assert_eq!(project.var(deaths).kind, VarKind::Flow);
    }

    #[test]
    fn init_value_becomes_dt_normalized_equation() {
        let project = build("Pop=INTEG(Births, 100)~~|Births=1~~|");
        let pop = project.namespace.find("Pop").unwrap();
        let init_eq = project
            .var(pop)
            .equations
            .iter()
            .find(|e| e.kind == EquationKind::DtNormalized)
            .unwrap();
        assert!(matches!(init_eq.rhs, Expr::Number(n, _) if n == 100.0));
    }

    #[test]
    fn non_variable_addend_synthesizes_one_net_flow_for_the_whole_expression() {
        let project = build("S=INTEG(a*b+c, 0)~~|a=1~~|b=1~~|c=1~~|");
        let s = project.namespace.find("S").unwrap();
        assert_eq!(project.var(s).inflows.len(), 1);
        assert!(project.var(s).outflows.is_empty());
        let synthesized = project.var(s).inflows[0];
        assert!(project.var(synthesized).is_synthesized);
        assert_eq!(project.var(synthesized).equations.len(), 1);
        assert!(matches!(
            project.var(synthesized).equations[0].rhs,
            Expr::Binary(BinaryOp::Add, _, _, _)
        ));
    }

    #[test]
    fn variable_on_both_sides_invalidates_the_whole_decomposition() {
        let project = build("Pop=INTEG(Births-Births, 100)~~|Births=1~~|");
        let pop = project.namespace.find("Pop").unwrap();
        assert_eq!(project.var(pop).inflows.len(), 1);
        assert!(project.var(pop).outflows.is_empty());
        let synthesized = project.var(pop).inflows[0];
        assert!(project.var(synthesized).is_synthesized);
    }

    #[test]
    fn stock_referencing_itself_invalidates_the_decomposition() {
        let project = build("Pop=INTEG(Pop-Deaths, 100)~~|Deaths=1~~|");
        let pop = project.namespace.find("Pop").unwrap();
        let synthesized = project.var(pop).inflows[0];
        assert!(project.var(synthesized).is_synthesized);
    }

    #[test]
    fn disagreeing_equations_synthesize_one_flow_per_equation() {
        let project = build(
            "Sub: (Elem1,Elem2)~~|S[Elem1]=INTEG(a, 0)~~|S[Elem2]=INTEG(b, 0)~~|a=1~~|b=1~~|",
        );
        let s = project.namespace.find("S").unwrap();
        assert_eq!(project.var(s).inflows.len(), 1);
        let synthesized = project.var(s).inflows[0];
        assert!(project.var(synthesized).is_synthesized);
        assert_eq!(project.var(synthesized).equations.len(), 2);
    }

    #[test]
    fn synthesized_net_flow_is_named_stock_net_flow() {
        let project = build("S=INTEG(a*b+c, 0)~~|a=1~~|b=1~~|c=1~~|");
        let s = project.namespace.find("S").unwrap();
        let synthesized = project.var(s).inflows[0];
        assert_eq!(project.namespace.display_name(synthesized), "S net flow");
    }
}
