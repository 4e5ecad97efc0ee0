// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Pass (c): subscript ownership and cartesian expansion, per §4.4. Every
//! stock/flow/aux whose left-hand side carried a subscript list records
//! which dimensions it is indexed by; [`cartesian_elements`] then lets the
//! emitter enumerate the concrete element tuples a subscripted variable
//! ranges over.

use crate::ast::SymbolListEntry;
use crate::model::{Project, VarKind};
use crate::namespace::VarId;

/// Record each non-dimension, non-element variable's owning dimensions from
/// its equations' left-hand-side subscript lists.
pub fn run(project: &mut Project) {
    let ids: Vec<VarId> = project
        .namespace
        .iter()
        .filter(|&id| !matches!(project.var(id).kind, VarKind::Dimension | VarKind::ArrayElement))
        .collect();

    for id in ids {
        let dims = owning_dimensions(project, id);
        if dims.is_empty() {
            continue;
        }
        project.var_mut(id).subrange = dims;
    }
}

fn owning_dimensions(project: &Project, id: VarId) -> Vec<VarId> {
    let mut dims = Vec::new();
    for eq in &project.var(id).equations {
        let Some(subscripts) = &eq.lhs.subscripts else {
            continue;
        };
        for entry in &subscripts.entries {
            if let SymbolListEntry::Symbol { var, .. } = entry {
                if let Some(owner) = project.var(*var).owner {
                    if !dims.contains(&owner) {
                        dims.push(owner);
                    }
                }
            }
        }
    }
    dims
}

/// Enumerate every concrete element tuple a variable's `subrange` ranges
/// over, in row-major (last dimension fastest-varying) order, as the
/// emitter needs for the `TABBED ARRAY` body and for per-element equation
/// lookups.
pub fn cartesian_elements(project: &Project, subrange: &[VarId]) -> Vec<Vec<VarId>> {
    let mut result: Vec<Vec<VarId>> = vec![Vec::new()];
    for &dim in subrange {
        let elements = &project
            .model
            .dimensions
            .iter()
            .find(|d| d.id == dim)
            .map(|d| d.elements.clone())
            .unwrap_or_default();
        let mut next = Vec::with_capacity(result.len() * elements.len().max(1));
        for partial in &result {
            for &elem in elements {
                let mut tuple = partial.clone();
                tuple.push(elem);
                next.push(tuple);
            }
        }
        result = next;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Log;
    use crate::passes::typing;

    #[test]
    fn subscripted_variable_records_its_dimension() {
        let mut project = Project::new("m");
        let mut log = Log::new();
        crate::parser::parse_equations(
            "Loc: (East,West)~~|\nSales[Loc]=1~~|",
            &mut project,
            &mut log,
        );
        typing::run(&mut project, &mut log);
        run(&mut project);

        let sales = project.namespace.find("Sales").unwrap();
        let loc = project.namespace.find("Loc").unwrap();
        assert_eq!(project.var(sales).subrange, vec![loc]);
    }

    #[test]
    fn cartesian_elements_enumerates_single_dimension() {
        let mut project = Project::new("m");
        let mut log = Log::new();
        crate::parser::parse_equations(
            "Loc: (East,West)~~|\nSales[Loc]=1~~|",
            &mut project,
            &mut log,
        );
        typing::run(&mut project, &mut log);
        run(&mut project);

        let sales = project.namespace.find("Sales").unwrap();
        let subrange = project.var(sales).subrange.clone();
        let tuples = cartesian_elements(&project, &subrange);
        assert_eq!(tuples.len(), 2);
    }
}
