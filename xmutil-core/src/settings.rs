// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Simulation control extraction and the settings-block tail, per §4.6.
//! `INITIAL TIME`/`FINAL TIME`/`TIME STEP`/`SAVEPER` are ordinary variables
//! as far as the parser is concerned; this module reads their parsed
//! equations back out into a [`crate::model::SimSpecs`] and separately
//! tracks the numbered `N:payload` settings lines (workbook, sensitivity,
//! ...) Vensim appends after the sketch, which this translator passes
//! through unparsed (§1 Non-goals: no simulation, no UI-settings rendering).

use crate::ast::Expr;
use crate::model::{IntegrationMethod, Project};

/// One `N:payload` line from the post-sketch settings tail, kept verbatim
/// since no XMILE counterpart exists for most of it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawSetting {
    pub type_tag: u32,
    pub payload: String,
}

/// Parse the settings tail into its numbered lines without interpreting
/// them further.
pub fn parse_settings_block(text: &str) -> Vec<RawSetting> {
    text.lines()
        .filter_map(|line| {
            let (tag, rest) = line.split_once(':')?;
            let tag: u32 = tag.trim().parse().ok()?;
            Some(RawSetting {
                type_tag: tag,
                payload: rest.to_string(),
            })
        })
        .collect()
}

/// Pull `INITIAL TIME`, `FINAL TIME`, `TIME STEP`, and `SAVEPER` out of the
/// parsed namespace into `project.model.sim_specs`, per §4.6. Each control
/// variable's equation is expected to reduce to a numeric literal, or (for
/// `SAVEPER`) a reference to `TIME STEP`; anything else is left at the
/// default and the caller's diagnostics should already have flagged it as
/// an unsupported construct during parsing.
pub fn extract_sim_specs(project: &mut Project) {
    let start = lookup_numeric(project, "initial time");
    let stop = lookup_numeric(project, "final time");
    let dt = lookup_numeric(project, "time step");
    let save_per = lookup_numeric(project, "saveper").or(dt);
    let units = lookup_units(project, "initial time");

    let specs = &mut project.model.sim_specs;
    if let Some(start) = start {
        specs.start = start;
    }
    if let Some(stop) = stop {
        specs.stop = stop;
    }
    if let Some(dt) = dt {
        specs.dt = dt;
    }
    specs.save_per = save_per;
    if units.is_some() {
        specs.time_units = units;
    }
}

/// Apply the settings tail's `15:` (integration method) and `22:` (units
/// equivalence) records onto `project.model`, per §4.6. `15:` carries the
/// method as its fourth comma-separated field; the original translator maps
/// `1`/`5` to RK4, `3`/`4` to RK2 (XMILE has no RK2 method name, so this
/// collapses to RK4 as the nearest supported choice), and everything else to
/// Euler. `22:` lines are kept verbatim since XMILE has no equivalent slot.
pub fn apply_settings_tail(project: &mut Project, settings: &[RawSetting]) {
    for setting in settings {
        match setting.type_tag {
            15 => {
                let fields: Vec<&str> = setting.payload.split(',').collect();
                let code: i64 = fields.get(3).and_then(|f| f.trim().parse().ok()).unwrap_or(0);
                project.model.sim_specs.method = match code {
                    1 | 3 | 4 | 5 => IntegrationMethod::RungeKutta4,
                    _ => IntegrationMethod::Euler,
                };
            }
            22 => project.model.units_equivs.push(setting.payload.trim().to_string()),
            _ => {}
        }
    }
}

fn lookup_numeric(project: &Project, name: &str) -> Option<f64> {
    let id = project.namespace.find(name)?;
    let eq = project.var(id).equations.first()?;
    match &eq.rhs {
        Expr::Number(n, _) => Some(*n),
        Expr::VariableRef(other, _, _) => lookup_numeric_by_id(project, *other),
        _ => None,
    }
}

fn lookup_numeric_by_id(project: &Project, id: crate::namespace::VarId) -> Option<f64> {
    let eq = project.var(id).equations.first()?;
    match &eq.rhs {
        Expr::Number(n, _) => Some(*n),
        _ => None,
    }
}

fn lookup_units(project: &Project, name: &str) -> Option<String> {
    let id = project.namespace.find(name)?;
    project.var(id).equations.first()?.units.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Log;

    #[test]
    fn extracts_start_stop_dt_from_control_variables() {
        let mut project = Project::new("m");
        let mut log = Log::new();
        crate::parser::parse_equations(
            "INITIAL TIME=0~Month~|FINAL TIME=100~Month~|TIME STEP=0.25~Month~|",
            &mut project,
            &mut log,
        );
        extract_sim_specs(&mut project);
        let specs = &project.model.sim_specs;
        assert_eq!(specs.start, 0.0);
        assert_eq!(specs.stop, 100.0);
        assert_eq!(specs.dt, 0.25);
        assert_eq!(specs.time_units.as_deref(), Some("Month"));
    }

    #[test]
    fn saveper_falls_back_to_time_step_reference() {
        let mut project = Project::new("m");
        let mut log = Log::new();
        crate::parser::parse_equations(
            "TIME STEP=0.5~Month~|SAVEPER=TIME STEP~Month~|",
            &mut project,
            &mut log,
        );
        extract_sim_specs(&mut project);
        assert_eq!(project.model.sim_specs.save_per, Some(0.5));
    }

    #[test]
    fn settings_block_parses_numbered_lines() {
        let settings = parse_settings_block("15:0,0,0,0,0,0\n19:100,0\n");
        assert_eq!(settings.len(), 2);
        assert_eq!(settings[0].type_tag, 15);
        assert_eq!(settings[1].payload, "100,0");
    }

    #[test]
    fn type_15_record_selects_runge_kutta_4() {
        let mut project = Project::new("m");
        let settings = parse_settings_block("15:0,0,0,1,0,0\n");
        apply_settings_tail(&mut project, &settings);
        assert_eq!(project.model.sim_specs.method, IntegrationMethod::RungeKutta4);
    }

    #[test]
    fn type_15_record_defaults_to_euler() {
        let mut project = Project::new("m");
        let settings = parse_settings_block("15:0,0,0,0,0,0\n");
        apply_settings_tail(&mut project, &settings);
        assert_eq!(project.model.sim_specs.method, IntegrationMethod::Euler);
    }

    #[test]
    fn type_22_records_collect_as_units_equivalences() {
        let mut project = Project::new("m");
        let settings = parse_settings_block("22:$,Dollar,Dollars,$s\n22:Day,Days\n");
        apply_settings_tail(&mut project, &settings);
        assert_eq!(
            project.model.units_equivs,
            vec!["$,Dollar,Dollars,$s".to_string(), "Day,Days".to_string()]
        );
    }
}
