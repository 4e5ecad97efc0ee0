// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Pass (a): mark variable types, per §4.4. Every symbol the parser touched
//! starts life `Unknown`; this pass reclassifies each one from the shape of
//! its own equation, before stock-flow resolution or subscript ownership
//! need the distinction.

use crate::ast::{Equation, EquationKind, Expr, FuncRef, SymbolList, SymbolListEntry};
use crate::common::{Diag, ErrorCode};
use crate::diagnostics::Log;
use crate::functions;
use crate::model::{Dimension, Project, VarKind};
use crate::namespace::VarId;
use crate::units;

/// Walk every confirmed variable once and assign its `VarKind`, per §4.4.
/// Dimensions are recognized from their `SubscriptRange`-kind equation and
/// registered onto `project.model.dimensions`; a variable whose equation's
/// root call is `INTEG` is marked `Stock`, and one whose root call is some
/// other memory/delay function is marked `DelayAux`. Everything else is left
/// `Unknown`: stock-flow resolution promotes flow-list members to `Flow`,
/// view reconciliation promotes sketch-decorated valves to `Flow`, and
/// [`finalize`] defaults whatever is left to `Aux` once both have run.
pub fn run(project: &mut Project, log: &mut Log) {
    let ids: Vec<VarId> = project.namespace.iter().collect();

    for &id in &ids {
        if project.var(id).kind == VarKind::ArrayElement {
            continue;
        }
        let is_dimension = project
            .var(id)
            .equations
            .first()
            .is_some_and(|eq| eq.kind == EquationKind::SubscriptRange);
        if is_dimension {
            project.var_mut(id).kind = VarKind::Dimension;
        }
    }

    for &id in &ids {
        if project.var(id).kind != VarKind::Dimension {
            continue;
        }
        let elements = dimension_elements(project, id);
        for &elem in &elements {
            project.var_mut(elem).owner = Some(id);
        }
        project.model.dimensions.push(Dimension {
            id,
            elements,
            mapped_to: None,
        });
    }

    expand_number_tables(project, &ids, log);

    for &id in &ids {
        let kind = project.var(id).kind;
        if kind != VarKind::Unknown {
            continue;
        }
        let root = project.var(id).equations.first().map(|eq| &eq.rhs);
        if is_integ_definition(project.var(id).equations.first()) {
            project.var_mut(id).kind = VarKind::Stock;
        } else if root.and_then(root_call).is_some_and(is_delay_call) {
            project.var_mut(id).kind = VarKind::DelayAux;
        }
    }

    for &id in &ids {
        let raw_units = project
            .var(id)
            .equations
            .iter()
            .find_map(|eq| eq.units.clone());
        if let Some(raw_units) = raw_units {
            project.var_mut(id).units = Some(units::parse(&raw_units));
        }
    }

    propagate_lookup_extrapolate(project, &ids);
}

/// §4.4(a): `LOOKUP EXTRAPOLATE(graph, x)` anywhere in any equation sets
/// `extrapolate=true` on the `Table` owned by the graphical variable it
/// names, wherever that variable's own equation defines one (`TableDef` or
/// `WithLookup`).
fn propagate_lookup_extrapolate(project: &mut Project, ids: &[VarId]) {
    let mut targets: Vec<VarId> = Vec::new();
    for &id in ids {
        for eq in &project.var(id).equations {
            collect_lookup_extrapolate_targets(&eq.rhs, &mut targets);
        }
    }

    for target in targets {
        for eq in &mut project.var_mut(target).equations {
            match &mut eq.rhs {
                Expr::TableDef(table, _) => table.extrapolate = true,
                Expr::WithLookup(_, table, _) => table.extrapolate = true,
                _ => {}
            }
        }
    }
}

fn collect_lookup_extrapolate_targets(expr: &Expr, out: &mut Vec<VarId>) {
    match expr {
        Expr::FunctionCall(FuncRef::Builtin(idx), args, _)
            if functions::lookup(*idx).name == "lookup extrapolate" =>
        {
            if let Some(Expr::VariableRef(var, _, _)) = args.first() {
                out.push(*var);
            }
            for arg in args {
                collect_lookup_extrapolate_targets(arg, out);
            }
        }
        Expr::Unary(_, inner, _) | Expr::Paren(inner, _) => {
            collect_lookup_extrapolate_targets(inner, out)
        }
        Expr::Binary(_, lhs, rhs, _) | Expr::Logical(_, lhs, rhs, _) => {
            collect_lookup_extrapolate_targets(lhs, out);
            collect_lookup_extrapolate_targets(rhs, out);
        }
        Expr::FunctionCall(_, args, _) | Expr::FunctionCallWithMemory(_, args, _, _) => {
            for arg in args {
                collect_lookup_extrapolate_targets(arg, out);
            }
        }
        Expr::Lookup(table, arg, _) => {
            collect_lookup_extrapolate_targets(table, out);
            collect_lookup_extrapolate_targets(arg, out);
        }
        Expr::WithLookup(arg, _, _) => collect_lookup_extrapolate_targets(arg, out),
        Expr::Number(..)
        | Expr::Literal(..)
        | Expr::Na(_)
        | Expr::VariableRef(..)
        | Expr::SymbolListExpr(..)
        | Expr::NumberTable(..)
        | Expr::TableDef(..) => {}
    }
}

/// §4.4(a) bullet 2: a `TABBED ARRAY` equation whose LHS carries subscripts
/// expands into one equation per subscript tuple, each a scalar `Number`.
/// Uses the LHS's own subscript list rather than [`crate::passes::subscripts`]'s
/// `subrange` field, since that field isn't populated until a later pass.
fn expand_number_tables(project: &mut Project, ids: &[VarId], log: &mut Log) {
    let mut replacements: Vec<(VarId, usize, Vec<Equation>)> = Vec::new();

    for &id in ids {
        for (i, eq) in project.var(id).equations.iter().enumerate() {
            let (Some(subscripts), Expr::NumberTable(values, loc)) =
                (&eq.lhs.subscripts, &eq.rhs)
            else {
                continue;
            };
            let tuples = cartesian_subscripts(project, subscripts);
            if tuples.len() != values.len() {
                log.push(&Diag {
                    line: 0,
                    column: 0,
                    file: None,
                    code: ErrorCode::SubscriptCardinalityMismatch,
                    message: format!(
                        "{}: TABBED ARRAY has {} value(s) but {} subscript element(s)",
                        project.namespace.name(id),
                        values.len(),
                        tuples.len()
                    ),
                });
                continue;
            }

            let expanded = tuples
                .into_iter()
                .zip(values.iter())
                .map(|(tuple, &value)| {
                    let mut lhs = eq.lhs.clone();
                    lhs.subscripts = Some(SymbolList {
                        entries: tuple
                            .into_iter()
                            .map(|var| SymbolListEntry::Symbol { var, bang: false })
                            .collect(),
                        map_range: None,
                    });
                    Equation {
                        lhs,
                        rhs: Expr::Number(value, *loc),
                        kind: eq.kind,
                        units: eq.units.clone(),
                        comment: eq.comment.clone(),
                    }
                })
                .collect();
            replacements.push((id, i, expanded));
        }
    }

    // Apply highest index first so a variable with more than one expanded
    // equation doesn't see its later indices shift out from under it.
    replacements.sort_by(|a, b| b.1.cmp(&a.1));
    for (id, i, expanded) in replacements {
        project.var_mut(id).equations.splice(i..=i, expanded);
    }
}

/// Enumerate every concrete subscript tuple an LHS's subscript list denotes,
/// in row-major order: a `Dimension`-kind entry expands to its element list
/// (already registered earlier in this same pass), a concrete element is a
/// singleton.
fn cartesian_subscripts(project: &Project, subscripts: &SymbolList) -> Vec<Vec<VarId>> {
    let axes: Vec<Vec<VarId>> = subscripts
        .entries
        .iter()
        .filter_map(|entry| match entry {
            SymbolListEntry::Symbol { var, .. } => Some(axis_elements(project, *var)),
            SymbolListEntry::Nested(_) => None,
        })
        .collect();

    let mut tuples: Vec<Vec<VarId>> = vec![Vec::new()];
    for axis in axes {
        let mut next = Vec::with_capacity(tuples.len() * axis.len());
        for prefix in &tuples {
            for &elem in &axis {
                let mut tuple = prefix.clone();
                tuple.push(elem);
                next.push(tuple);
            }
        }
        tuples = next;
    }
    tuples
}

fn axis_elements(project: &Project, var: VarId) -> Vec<VarId> {
    if project.var(var).kind == VarKind::Dimension {
        project
            .model
            .dimensions
            .iter()
            .find(|d| d.id == var)
            .map(|d| d.elements.clone())
            .unwrap_or_default()
    } else {
        vec![var]
    }
}

/// Default every variable stock-flow resolution and view reconciliation left
/// `Unknown` to `Aux` (§4.4(a)'s final "else `Aux`"). Run once, after both of
/// those passes have had a chance to promote flow-list members and
/// sketch-decorated valves to `Flow`.
pub fn finalize(project: &mut Project) {
    let ids: Vec<VarId> = project.namespace.iter().collect();
    for id in ids {
        if project.var(id).kind == VarKind::Unknown {
            project.var_mut(id).kind = VarKind::Aux;
        }
    }
}

fn is_delay_call(f: &FuncRef) -> bool {
    match f {
        FuncRef::Builtin(idx) => {
            let def = functions::lookup(*idx);
            def.is_delay && def.name != "integ"
        }
        FuncRef::Unknown(_) => false,
    }
}

fn dimension_elements(project: &Project, dimension: VarId) -> Vec<VarId> {
    let Some(eq) = project.var(dimension).equations.first() else {
        return Vec::new();
    };
    match &eq.rhs {
        Expr::SymbolListExpr(list, _, _) => list
            .entries
            .iter()
            .filter_map(|entry| match entry {
                crate::ast::SymbolListEntry::Symbol { var, .. } => Some(*var),
                crate::ast::SymbolListEntry::Nested(_) => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn is_integ_definition(eq: Option<&Equation>) -> bool {
    let Some(eq) = eq else { return false };
    matches!(root_call(&eq.rhs), Some(FuncRef::Builtin(idx)) if functions::lookup(idx).name == "integ")
}

/// Unwrap `Paren`/unary-plus wrappers to find the call at an expression's
/// root, if any. Stock-flow resolution reuses this to find `INTEG`.
pub fn root_call(expr: &Expr) -> Option<&FuncRef> {
    match expr {
        Expr::FunctionCallWithMemory(f, ..) => Some(f),
        Expr::FunctionCall(f, ..) => Some(f),
        Expr::Paren(inner, _) => root_call(inner),
        Expr::Unary(crate::ast::UnaryOp::Positive, inner, _) => root_call(inner),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Log;

    #[test]
    fn classifies_integ_as_stock() {
        let mut project = Project::new("m");
        let mut log = Log::new();
        crate::parser::parse_equations("Pop=INTEG(Births, 100)~~|", &mut project, &mut log);
        run(&mut project, &mut log);
        let pop = project.namespace.find("Pop").unwrap();
        assert_eq!(project.var(pop).kind, VarKind::Stock);
    }

    #[test]
    fn classifies_subscript_range_as_dimension_and_owns_elements() {
        let mut project = Project::new("m");
        let mut log = Log::new();
        crate::parser::parse_equations("Loc: (East,West)~~|", &mut project, &mut log);
        run(&mut project, &mut log);
        let loc = project.namespace.find("Loc").unwrap();
        assert_eq!(project.var(loc).kind, VarKind::Dimension);
        assert_eq!(project.model.dimensions.len(), 1);
        let east = project.namespace.find("East").unwrap();
        assert_eq!(project.var(east).owner, Some(loc));
    }

    #[test]
    fn plain_equation_defaults_to_aux() {
        let mut project = Project::new("m");
        let mut log = Log::new();
        crate::parser::parse_equations("X=1~~|", &mut project, &mut log);
        run(&mut project, &mut log);
        let x = project.namespace.find("X").unwrap();
        assert_eq!(project.var(x).kind, VarKind::Unknown);
        finalize(&mut project);
        assert_eq!(project.var(x).kind, VarKind::Aux);
    }

    #[test]
    fn lookup_extrapolate_marks_the_referenced_graph_extrapolating() {
        let mut project = Project::new("m");
        let mut log = Log::new();
        crate::parser::parse_equations(
            "g(0,0,5,5,10,10)~~|f=LOOKUP EXTRAPOLATE(g, 1)~~|",
            &mut project,
            &mut log,
        );
        run(&mut project, &mut log);
        let g = project.namespace.find("g").unwrap();
        let table = match &project.var(g).equations[0].rhs {
            Expr::TableDef(table, _) => table,
            other => panic!("expected a TableDef equation, got {other:?}"),
        };
        assert!(table.extrapolate);
    }

    #[test]
    fn delay_call_is_marked_delay_aux() {
        let mut project = Project::new("m");
        let mut log = Log::new();
        crate::parser::parse_equations("X=SMOOTH(Y, 5)~~|Y=1~~|", &mut project, &mut log);
        run(&mut project, &mut log);
        let x = project.namespace.find("X").unwrap();
        assert_eq!(project.var(x).kind, VarKind::DelayAux);
    }

    #[test]
    fn raw_units_text_is_parsed_into_a_unit_expr() {
        let mut project = Project::new("m");
        let mut log = Log::new();
        crate::parser::parse_equations("X=1~Widgets/Month~|", &mut project, &mut log);
        run(&mut project, &mut log);
        let x = project.namespace.find("X").unwrap();
        let units = project.var(x).units.as_ref().unwrap();
        assert_eq!(units.numerator, vec!["Widgets".to_string()]);
        assert_eq!(units.denominator, vec!["Month".to_string()]);
    }
}
