// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! View reconciliation: pass (e) of §4.4/§4.5 — resolve sketch UIDs against
//! the namespace, upgrade ghosts to their primary placement (within a view
//! and across the whole model), attach valves to the flow they animate (and,
//! failing that, to a stock's view), dump any variable still unplaced after
//! that onto the first view, and complete each view's connectors against the
//! variable's actual RHS inputs.

use std::collections::{HashMap, HashSet};

use crate::ast::Expr;
use crate::model::{Project, VarKind};
use crate::namespace::VarId;
use crate::view::types::{
    Connector, ElementShape, Point, Uid, VensimValve, VensimVariable, View, ViewElement,
};

/// Match every [`crate::view::types::VensimVariable`] sketch entry against
/// the namespace by its label, populating `var`. Entries that fail to
/// resolve are left with `var: None`; callers should drop them rather than
/// emit a dangling reference.
pub fn resolve_variable_refs(project: &Project, view: &mut View) {
    for element in &mut view.elements {
        match element {
            ViewElement::Variable(v) if v.var.is_none() => {
                v.var = project.namespace.find(&v.label);
            }
            ViewElement::Valve(v) if v.var.is_none() => {
                // valves aren't labeled directly; resolved in attach_flows
                let _ = v;
            }
            _ => {}
        }
    }
}

/// Upgrade ghost placements (§4.5 "ghost upgrade"): a ghost entry whose
/// primary placement resolved to a variable inherits that variable's id, so
/// downstream connector resolution treats both placements as the same
/// symbol.
pub fn upgrade_ghosts(view: &mut View) {
    let primaries: std::collections::HashMap<Uid, Option<crate::namespace::VarId>> = view
        .elements
        .iter()
        .filter_map(|e| match e {
            ViewElement::Variable(v) if !v.is_ghost => Some((v.uid, v.var)),
            _ => None,
        })
        .collect();

    for element in &mut view.elements {
        if let ViewElement::Variable(v) = element {
            if v.is_ghost && v.var.is_none() {
                if let Some(origin) = v.ghost_of {
                    if let Some(&Some(resolved)) = primaries.get(&origin) {
                        v.var = Some(resolved);
                    }
                }
            }
        }
    }
}

/// Upgrade ghosts across the whole model (§4.5 step 1, the cross-view half):
/// a variable with no primary (non-ghost) placement in any view is promoted
/// from the first ghost entry of it found, in view order.
pub fn upgrade_ghosts_cross_view(views: &mut [View]) {
    let has_primary: HashSet<VarId> = views
        .iter()
        .flat_map(|v| v.variables())
        .filter(|v| !v.is_ghost)
        .filter_map(|v| v.var)
        .collect();

    let mut promoted: HashSet<VarId> = HashSet::new();
    for view in views.iter_mut() {
        for element in &mut view.elements {
            if let ViewElement::Variable(v) = element
                && v.is_ghost
                && let Some(var) = v.var
                && !has_primary.contains(&var)
                && !promoted.contains(&var)
            {
                v.is_ghost = false;
                promoted.insert(var);
            }
        }
    }
}

/// Place a flow with no placement in any view into the view of a stock that
/// uses it (§4.5 step 2): a valve positioned 60 units on from the stock's
/// own placement, since the flow's other endpoint (if any) isn't itself
/// necessarily placed either.
pub fn attach_flows_cross_view(project: &Project, views: &mut [View]) {
    let placed: HashSet<VarId> = views
        .iter()
        .flat_map(|v| v.elements.iter())
        .filter_map(placed_var)
        .collect();

    let mut next_uid = next_free_uid(views);

    let flows: Vec<VarId> = project
        .namespace
        .iter()
        .filter(|&id| project.var(id).kind == VarKind::Flow && !placed.contains(&id))
        .collect();

    for flow in flows {
        let stock = project.namespace.iter().find(|&s| {
            project.var(s).kind == VarKind::Stock
                && (project.var(s).inflows.contains(&flow) || project.var(s).outflows.contains(&flow))
        });
        let Some(stock) = stock else { continue };

        let Some((view_idx, stock_pos)) = views.iter().enumerate().find_map(|(i, v)| {
            v.variables()
                .find(|vv| vv.var == Some(stock))
                .map(|vv| (i, vv.pos))
        }) else {
            continue;
        };

        views[view_idx].elements.push(ViewElement::Valve(VensimValve {
            uid: Uid(next_uid),
            var: Some(flow),
            pos: Point {
                x: stock_pos.x + 60.0,
                y: stock_pos.y + 60.0,
            },
        }));
        next_uid += 1;
    }
}

/// Dump every variable still unplaced after ghost upgrade and flow
/// attachment onto the first view at (200, 200) (§4.5 step 3).
pub fn dump_undefined_variables(project: &Project, views: &mut [View]) {
    if views.is_empty() {
        return;
    }
    let placed: HashSet<VarId> = views
        .iter()
        .flat_map(|v| v.elements.iter())
        .filter_map(placed_var)
        .collect();

    let mut next_uid = next_free_uid(views);
    let undefined: Vec<VarId> = project
        .namespace
        .iter()
        .filter(|&id| {
            matches!(
                project.var(id).kind,
                VarKind::Stock | VarKind::Flow | VarKind::Aux | VarKind::DelayAux | VarKind::Array
            ) && !placed.contains(&id)
        })
        .collect();

    for var in undefined {
        let label = project.namespace.name(var).to_string();
        views[0].elements.push(ViewElement::Variable(VensimVariable {
            uid: Uid(next_uid),
            var: Some(var),
            label,
            pos: Point { x: 200.0, y: 200.0 },
            width: 40.0,
            height: 20.0,
            shape: ElementShape::Rectangle,
            is_ghost: false,
            ghost_of: None,
            hidden: false,
        }));
        next_uid += 1;
    }
}

fn placed_var(element: &ViewElement) -> Option<VarId> {
    match element {
        ViewElement::Variable(v) => v.var,
        ViewElement::Valve(v) => v.var,
        _ => None,
    }
}

fn next_free_uid(views: &[View]) -> i32 {
    views
        .iter()
        .flat_map(|v| v.elements.iter())
        .map(|e| e.uid().0)
        .max()
        .unwrap_or(0)
        + 1
}

/// Every variable `expr` reads from, in tree order (duplicates allowed;
/// callers that need a set should dedupe).
pub fn referenced_vars(expr: &Expr) -> Vec<VarId> {
    let mut out = Vec::new();
    collect_refs(expr, &mut out);
    out
}

fn collect_refs(expr: &Expr, out: &mut Vec<VarId>) {
    match expr {
        Expr::VariableRef(var, _, _) => out.push(*var),
        Expr::Unary(_, inner, _) | Expr::Paren(inner, _) => collect_refs(inner, out),
        Expr::Binary(_, lhs, rhs, _) | Expr::Logical(_, lhs, rhs, _) => {
            collect_refs(lhs, out);
            collect_refs(rhs, out);
        }
        Expr::FunctionCall(_, args, _) | Expr::FunctionCallWithMemory(_, args, _, _) => {
            for arg in args {
                collect_refs(arg, out);
            }
        }
        Expr::Lookup(table, arg, _) => {
            collect_refs(table, out);
            collect_refs(arg, out);
        }
        Expr::WithLookup(arg, _, _) => collect_refs(arg, out),
        Expr::Number(..)
        | Expr::Literal(..)
        | Expr::Na(_)
        | Expr::SymbolListExpr(..)
        | Expr::NumberTable(..)
        | Expr::TableDef(..) => {}
    }
}

/// Attach each valve glyph to the flow variable it animates by matching the
/// flow pipe segment whose valve uid points at it, then walking that pipe's
/// endpoints back to a stock placement and the originating flow's namespace
/// entry (§4.5 "flow attachment").
pub fn attach_flows(project: &Project, view: &mut View) {
    let pipe_valves: Vec<(Uid, Uid)> = view
        .elements
        .iter()
        .filter_map(|e| match e {
            ViewElement::Pipe(p) => Some((p.uid, p.valve)),
            _ => None,
        })
        .collect();

    for (_pipe_uid, valve_uid) in pipe_valves {
        let label = view
            .elements
            .iter()
            .find_map(|e| match e {
                ViewElement::Variable(v) if v.uid == valve_uid => Some(v.label.clone()),
                _ => None,
            });
        if let Some(label) = label {
            let resolved = project.namespace.find(&label);
            if let Some(ViewElement::Valve(valve)) = view
                .elements
                .iter_mut()
                .find(|e| matches!(e, ViewElement::Valve(v) if v.uid == valve_uid))
            {
                valve.var = resolved;
            }
        }
    }
}

/// Complete a view's connectors against each placed variable's actual RHS
/// inputs (§4.5 "link completion"): for every non-stock variable placed in
/// the view, ensure a connector exists from each input also placed in the
/// view, dropping any connector whose source isn't one of that variable's
/// inputs. Finally fill in the angle (clockwise from north; XMILE's
/// `<connector><angle>` convention) for any connector still missing one.
pub fn complete_links(project: &Project, view: &mut View) {
    let uid_by_var: HashMap<VarId, Uid> = view
        .elements
        .iter()
        .filter_map(|e| placed_var(e).map(|var| (var, e.uid())))
        .collect();

    let var_by_uid: HashMap<Uid, VarId> = uid_by_var.iter().map(|(&var, &uid)| (uid, var)).collect();

    let mut next_uid = next_free_uid(std::slice::from_ref(view));

    for (&var, &to_uid) in &uid_by_var {
        let variable = project.var(var);
        if variable.kind == VarKind::Stock {
            continue;
        }
        let inputs: HashSet<VarId> = variable
            .equations
            .iter()
            .flat_map(|eq| referenced_vars(&eq.rhs))
            .collect();

        for &input in &inputs {
            let Some(&from_uid) = uid_by_var.get(&input) else {
                continue;
            };
            let exists = view.elements.iter().any(|e| {
                matches!(e, ViewElement::Connector(c) if c.from == from_uid && c.to == to_uid)
            });
            if !exists {
                view.elements.push(ViewElement::Connector(Connector {
                    uid: Uid(next_uid),
                    from: from_uid,
                    to: to_uid,
                    angle: None,
                    points: Vec::new(),
                }));
                next_uid += 1;
            }
        }

        view.elements.retain(|e| match e {
            ViewElement::Connector(c) if c.to == to_uid => var_by_uid
                .get(&c.from)
                .is_some_and(|from_var| inputs.contains(from_var)),
            _ => true,
        });
    }

    let positions: HashMap<Uid, Point> = view
        .elements
        .iter()
        .filter_map(|e| match e {
            ViewElement::Variable(v) => Some((v.uid, v.pos)),
            ViewElement::Valve(v) => Some((v.uid, v.pos)),
            ViewElement::Comment(c) => Some((c.uid, c.pos)),
            _ => None,
        })
        .collect();

    for element in &mut view.elements {
        if let ViewElement::Connector(c) = element {
            if c.angle.is_none() {
                if let (Some(from), Some(to)) = (positions.get(&c.from), positions.get(&c.to)) {
                    c.angle = Some(bearing_degrees(*from, *to));
                }
            }
        }
    }
}

fn bearing_degrees(from: Point, to: Point) -> f64 {
    let dx = to.x - from.x;
    // screen y grows downward; flip so 0 degrees points north (up)
    let dy = from.y - to.y;
    let mut degrees = dy.atan2(dx).to_degrees();
    degrees = 90.0 - degrees;
    if degrees < 0.0 {
        degrees += 360.0;
    }
    degrees
}

/// Run the whole reconciliation pipeline over one view, in the order §4.5
/// specifies: resolve references, upgrade ghosts, attach flows, complete
/// links.
pub fn reconcile(project: &Project, view: &mut View) {
    resolve_variable_refs(project, view);
    upgrade_ghosts(view);
    attach_flows(project, view);
    complete_links(project, view);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Equation, EquationKind, InterpMode, Lhs, Loc};
    use crate::model::{Project, VarKind};
    use crate::view::types::{Connector, ElementShape, Uid, VensimVariable};

    fn var_element(uid: i32, label: &str, x: f64, y: f64) -> ViewElement {
        ViewElement::Variable(VensimVariable {
            uid: Uid(uid),
            var: None,
            label: label.to_string(),
            pos: Point { x, y },
            width: 40.0,
            height: 20.0,
            shape: ElementShape::Rectangle,
            is_ghost: false,
            ghost_of: None,
            hidden: false,
        })
    }

    #[test]
    fn resolves_variable_refs_by_label() {
        let mut project = Project::new("m");
        let id = project.namespace.insert("Births");
        project.namespace.confirm_all();
        project.declare(id, VarKind::Flow);

        let mut view = View::default();
        view.elements.push(var_element(1, "Births", 0.0, 0.0));
        resolve_variable_refs(&project, &mut view);

        match &view.elements[0] {
            ViewElement::Variable(v) => assert_eq!(v.var, Some(id)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn ghost_inherits_primary_variable() {
        let mut project = Project::new("m");
        let id = project.namespace.insert("Population");
        project.namespace.confirm_all();
        project.declare(id, VarKind::Stock);

        let mut view = View::default();
        view.elements.push(var_element(1, "Population", 0.0, 0.0));
        let mut ghost = var_element(2, "Population", 100.0, 100.0);
        if let ViewElement::Variable(v) = &mut ghost {
            v.is_ghost = true;
            v.ghost_of = Some(Uid(1));
        }
        view.elements.push(ghost);

        reconcile(&project, &mut view);

        match &view.elements[1] {
            ViewElement::Variable(v) => assert_eq!(v.var, Some(id)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn connector_angle_points_north_for_vertical_link() {
        let project = Project::new("m");
        let mut view = View::default();
        view.elements.push(var_element(1, "A", 0.0, 100.0));
        view.elements.push(var_element(2, "B", 0.0, 0.0));
        view.elements.push(ViewElement::Connector(Connector {
            uid: Uid(3),
            from: Uid(1),
            to: Uid(2),
            angle: None,
            points: Vec::new(),
        }));

        complete_links(&project, &mut view);

        match &view.elements[2] {
            ViewElement::Connector(c) => {
                let angle = c.angle.unwrap();
                assert!((angle - 0.0).abs() < 1e-6 || (angle - 360.0).abs() < 1e-6);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn ghost_upgrades_across_views_when_no_view_has_a_primary() {
        let mut project = Project::new("m");
        let id = project.namespace.insert("Population");
        project.namespace.confirm_all();
        project.declare(id, VarKind::Stock);

        let mut ghost = var_element(1, "Population", 0.0, 0.0);
        if let ViewElement::Variable(v) = &mut ghost {
            v.var = Some(id);
            v.is_ghost = true;
        }
        let mut view_a = View::default();
        view_a.elements.push(ghost);
        let mut view_b = View::default();
        view_b.elements.push(var_element(2, "Unrelated", 0.0, 0.0));

        let mut views = vec![view_a, view_b];
        upgrade_ghosts_cross_view(&mut views);

        match &views[0].elements[0] {
            ViewElement::Variable(v) => assert!(!v.is_ghost),
            _ => unreachable!(),
        }
    }

    #[test]
    fn flow_attaches_to_the_view_of_a_stock_that_uses_it() {
        let mut project = Project::new("m");
        let stock_id = project.namespace.insert("Population");
        let flow_id = project.namespace.insert("Births");
        project.namespace.confirm_all();
        project.declare(stock_id, VarKind::Stock).inflows = vec![flow_id];
        project.declare(flow_id, VarKind::Flow);

        let mut view = View::default();
        let mut stock_element = var_element(1, "Population", 10.0, 20.0);
        if let ViewElement::Variable(v) = &mut stock_element {
            v.var = Some(stock_id);
        }
        view.elements.push(stock_element);

        let mut views = vec![view];
        attach_flows_cross_view(&project, &mut views);

        let valve = views[0].elements.iter().find_map(|e| match e {
            ViewElement::Valve(v) if v.var == Some(flow_id) => Some(v),
            _ => None,
        });
        assert!(valve.is_some());
    }

    #[test]
    fn undefined_variables_are_dumped_on_the_first_view() {
        let mut project = Project::new("m");
        let id = project.namespace.insert("Orphan");
        project.namespace.confirm_all();
        project.declare(id, VarKind::Aux);

        let mut views = vec![View::default(), View::default()];
        dump_undefined_variables(&project, &mut views);

        let placed = views[0].variables().find(|v| v.var == Some(id));
        assert!(placed.is_some());
        assert_eq!(placed.unwrap().pos, Point { x: 200.0, y: 200.0 });
        assert!(views[1].variables().next().is_none());
    }

    #[test]
    fn link_completion_creates_a_missing_connector_for_an_rhs_input() {
        let mut project = Project::new("m");
        let input_id = project.namespace.insert("Rate");
        let aux_id = project.namespace.insert("Adjusted");
        project.namespace.confirm_all();
        project.declare(input_id, VarKind::Aux);
        project.declare(aux_id, VarKind::Aux).equations.push(Equation {
            lhs: Lhs {
                var: aux_id,
                subscripts: None,
                except: Vec::new(),
                interp: InterpMode::Default,
                loc: Loc::default(),
            },
            rhs: Expr::VariableRef(input_id, None, Loc::default()),
            kind: EquationKind::Definition,
            units: None,
            comment: None,
        });

        let mut view = View::default();
        let mut input_element = var_element(1, "Rate", 0.0, 0.0);
        if let ViewElement::Variable(v) = &mut input_element {
            v.var = Some(input_id);
        }
        view.elements.push(input_element);
        let mut aux_element = var_element(2, "Adjusted", 100.0, 0.0);
        if let ViewElement::Variable(v) = &mut aux_element {
            v.var = Some(aux_id);
        }
        view.elements.push(aux_element);

        complete_links(&project, &mut view);

        let connector = view.connectors().find(|c| c.from == Uid(1) && c.to == Uid(2));
        assert!(connector.is_some());
    }

    #[test]
    fn link_completion_drops_a_connector_not_backed_by_an_input() {
        let mut project = Project::new("m");
        let stray_id = project.namespace.insert("Unrelated");
        let aux_id = project.namespace.insert("Adjusted");
        project.namespace.confirm_all();
        project.declare(stray_id, VarKind::Aux);
        project.declare(aux_id, VarKind::Aux).equations.push(Equation {
            lhs: Lhs {
                var: aux_id,
                subscripts: None,
                except: Vec::new(),
                interp: InterpMode::Default,
                loc: Loc::default(),
            },
            rhs: Expr::Number(1.0, Loc::default()),
            kind: EquationKind::Definition,
            units: None,
            comment: None,
        });

        let mut view = View::default();
        let mut stray_element = var_element(1, "Unrelated", 0.0, 0.0);
        if let ViewElement::Variable(v) = &mut stray_element {
            v.var = Some(stray_id);
        }
        view.elements.push(stray_element);
        let mut aux_element = var_element(2, "Adjusted", 100.0, 0.0);
        if let ViewElement::Variable(v) = &mut aux_element {
            v.var = Some(aux_id);
        }
        view.elements.push(aux_element);
        view.elements.push(ViewElement::Connector(Connector {
            uid: Uid(3),
            from: Uid(1),
            to: Uid(2),
            angle: None,
            points: Vec::new(),
        }));

        complete_links(&project, &mut view);

        assert!(view.connectors().find(|c| c.from == Uid(1) && c.to == Uid(2)).is_none());
    }
}
