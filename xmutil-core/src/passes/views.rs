// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Pass (e): view reconciliation, per §4.5. Extracts every group's sketch
//! into one collection so the cross-view steps — ghost upgrade, flow
//! attachment, and the undefined-variable dump — can see the whole model's
//! placements at once, then hands each view back to [`crate::view`]'s
//! per-view steps before writing the views back into their groups.

use crate::model::{Project, VarKind};
use crate::view::{self, View, ViewElement};

pub fn run(project: &mut Project) {
    let group_count = project.model.groups.len();
    let mut views: Vec<View> = Vec::with_capacity(group_count);
    let mut owners: Vec<usize> = Vec::with_capacity(group_count);

    for i in 0..group_count {
        if let Some(v) = project.model.groups[i].view.take() {
            owners.push(i);
            views.push(v);
        }
    }

    for v in &mut views {
        view::resolve_variable_refs(project, v);
        view::upgrade_ghosts(v);
        view::attach_flows(project, v);
    }

    // §4.4(a)'s final classification bullet: a variable the sketch decorates
    // with a valve, but that stock-flow resolution didn't already pick up as
    // part of a stock's flow list, is still a flow.
    for v in &views {
        for element in &v.elements {
            if let ViewElement::Valve(valve) = element
                && let Some(var) = valve.var
                && project.var(var).kind == VarKind::Unknown
            {
                project.var_mut(var).kind = VarKind::Flow;
            }
        }
    }

    view::upgrade_ghosts_cross_view(&mut views);
    view::attach_flows_cross_view(project, &mut views);
    view::dump_undefined_variables(project, &mut views);

    for v in &mut views {
        view::complete_links(project, v);
    }

    for (owner, v) in owners.into_iter().zip(views.into_iter()) {
        project.model.groups[owner].variables = v.variables().filter_map(|vv| vv.var).collect();
        project.model.groups[owner].view = Some(v);
    }
}
