// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Pass (f): long-name canonicalization, per §4.4/§6's `long_name` option.
//! Off by default; when enabled, every variable's comment is compressed to
//! whitespace-collapsed words and, if the result is non-empty, unique in the
//! namespace, and no longer than 80 characters, the variable is renamed to
//! it — so a documentation string like `Stock of widgets in the warehouse`
//! becomes the variable's emitted name in place of whatever short symbol the
//! `.mdl` source used.

use crate::model::Project;
use crate::namespace::VarId;

pub fn run(project: &mut Project, enabled: bool) {
    if !enabled {
        return;
    }

    let ids: Vec<VarId> = project.namespace.iter().collect();
    for id in ids {
        let Some(comment) = project.var(id).comment.clone().or_else(|| {
            project
                .var(id)
                .equations
                .iter()
                .find_map(|e| e.comment.clone())
        }) else {
            continue;
        };
        let alt = compress_whitespace(&comment);
        if alt.is_empty() || alt.len() >= 80 {
            continue;
        }
        if project.namespace.find(&alt).is_none() {
            project.namespace.rename(id, &alt);
        }
    }
}

/// Collapse runs of whitespace to single spaces and trim the ends, matching
/// the original translator's `compress_whitespace` helper used to turn a
/// free-form comment into a candidate variable name.
fn compress_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Log;
    use crate::passes::{subscripts, typing};

    #[test]
    fn long_name_renames_from_comment_when_enabled() {
        let mut project = Project::new("m");
        let mut log = Log::new();
        crate::parser::parse_equations(
            "Sales=1~Widgets~Total   sales\n   across regions|",
            &mut project,
            &mut log,
        );
        typing::run(&mut project, &mut log);
        subscripts::run(&mut project);
        let sales = project.namespace.find("Sales").unwrap();

        run(&mut project, true);

        assert!(project.namespace.find("Sales").is_none());
        assert_eq!(
            project.namespace.find("Total sales across regions"),
            Some(sales)
        );
    }

    #[test]
    fn disabled_by_default() {
        let mut project = Project::new("m");
        let mut log = Log::new();
        crate::parser::parse_equations("Sales=1~Widgets~Total sales|", &mut project, &mut log);
        typing::run(&mut project, &mut log);
        subscripts::run(&mut project);

        run(&mut project, false);

        assert!(project.namespace.find("Sales").is_some());
    }

    #[test]
    fn blank_comment_leaves_name_unchanged() {
        let mut project = Project::new("m");
        let mut log = Log::new();
        crate::parser::parse_equations("Sales=1~Widgets~|", &mut project, &mut log);
        typing::run(&mut project, &mut log);
        subscripts::run(&mut project);

        run(&mut project, true);

        assert!(project.namespace.find("Sales").is_some());
    }
}
