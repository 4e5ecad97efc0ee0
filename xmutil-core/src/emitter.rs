// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! XMILE emission, per §4.1/§4.5/§6: walks the translated [`Project`] and
//! writes the OASIS XMILE document via `quick_xml`'s event writer (the same
//! low-level `BytesStart`/`BytesText`/`BytesEnd` style the simlin codebase
//! uses, rather than a serde-derived document tree, since the element set
//! here is small and irregular enough that manual events stay more direct).

use std::io::Cursor;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::ast::{BinaryOp, Equation, EquationKind, Expr, FuncRef, LogicalOp, SymbolListEntry, UnaryOp};
use crate::functions;
use crate::model::{Project, VarKind};
use crate::namespace::VarId;
use crate::passes::stock_flow::is_integ;
use crate::view::{ElementShape, View, ViewElement};

#[derive(Clone, Copy, Debug)]
pub struct EmitOptions {
    pub compact: bool,
    pub as_sectors: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions {
            compact: false,
            as_sectors: false,
        }
    }
}

pub fn emit_xmile(project: &Project, filename: &str, options: EmitOptions) -> String {
    let mut writer = if options.compact {
        Writer::new(Cursor::new(Vec::new()))
    } else {
        Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2)
    };

    write_root(&mut writer, project, filename, options);

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).expect("xmile output is always valid utf8")
}

fn write_root<W: std::io::Write>(
    writer: &mut Writer<W>,
    project: &Project,
    filename: &str,
    options: EmitOptions,
) {
    let mut root = BytesStart::new("xmile");
    root.push_attribute(("version", "1.0"));
    root.push_attribute(("xmlns", "http://www.systemdynamics.org/XMILE"));
    writer.write_event(Event::Start(root)).unwrap();

    write_header(writer, filename);
    write_sim_specs(writer, project);
    write_model_units(writer, project);

    if options.as_sectors && !project.model.groups.is_empty() {
        for group in &project.model.groups {
            write_model(writer, project, Some(&group.name), &group.variables, group.view.as_ref());
        }
    } else {
        let all: Vec<VarId> = project.namespace.iter().collect();
        let view = project.model.groups.first().and_then(|g| g.view.as_ref());
        write_model(writer, project, None, &all, view);
    }

    for macro_def in &project.macros {
        write_macro(writer, macro_def);
    }

    writer.write_event(Event::End(BytesEnd::new("xmile"))).unwrap();
}

fn write_header<W: std::io::Write>(writer: &mut Writer<W>, filename: &str) {
    writer
        .write_event(Event::Start(BytesStart::new("header")))
        .unwrap();
    write_text_elem(writer, "vendor", "xmutil-rs");
    write_text_elem(writer, "product", "xmutil-rs");
    write_text_elem(writer, "name", filename);
    writer
        .write_event(Event::End(BytesEnd::new("header")))
        .unwrap();
}

fn write_sim_specs<W: std::io::Write>(writer: &mut Writer<W>, project: &Project) {
    let specs = &project.model.sim_specs;
    let mut elem = BytesStart::new("sim_specs");
    elem.push_attribute(("method", method_name(specs.method)));
    if let Some(units) = &specs.time_units {
        elem.push_attribute(("time_units", units.as_str()));
    }
    writer.write_event(Event::Start(elem)).unwrap();
    write_text_elem(writer, "start", &format_number(specs.start));
    write_text_elem(writer, "stop", &format_number(specs.stop));
    write_text_elem(writer, "dt", &format_number(specs.dt));
    if let Some(save_per) = specs.save_per {
        write_text_elem(writer, "savestep", &format_number(save_per));
    }
    writer
        .write_event(Event::End(BytesEnd::new("sim_specs")))
        .unwrap();
}

fn method_name(method: crate::model::IntegrationMethod) -> &'static str {
    match method {
        crate::model::IntegrationMethod::Euler => "Euler",
        crate::model::IntegrationMethod::RungeKutta4 => "RK4",
    }
}

fn write_model_units<W: std::io::Write>(writer: &mut Writer<W>, project: &Project) {
    if project.model.dimensions.is_empty() {
        return;
    }
    writer
        .write_event(Event::Start(BytesStart::new("model_units")))
        .unwrap();
    for dim in &project.model.dimensions {
        let mut elem = BytesStart::new("dim");
        let name = render_name(project, dim.id);
        elem.push_attribute(("name", name.as_str()));
        writer.write_event(Event::Start(elem)).unwrap();
        for &element in &dim.elements {
            let mut e = BytesStart::new("elem");
            let name = render_name(project, element);
            e.push_attribute(("name", name.as_str()));
            writer.write_event(Event::Empty(e)).unwrap();
        }
        writer.write_event(Event::End(BytesEnd::new("dim"))).unwrap();
    }
    writer
        .write_event(Event::End(BytesEnd::new("model_units")))
        .unwrap();
}

fn write_model<W: std::io::Write>(
    writer: &mut Writer<W>,
    project: &Project,
    name: Option<&str>,
    vars: &[VarId],
    view: Option<&View>,
) {
    let mut elem = BytesStart::new("model");
    if let Some(name) = name {
        elem.push_attribute(("name", name));
    }
    writer.write_event(Event::Start(elem)).unwrap();

    writer
        .write_event(Event::Start(BytesStart::new("variables")))
        .unwrap();
    for &id in vars {
        write_variable(writer, project, id);
    }
    writer
        .write_event(Event::End(BytesEnd::new("variables")))
        .unwrap();

    if let Some(view) = view {
        write_views(writer, project, view);
    }

    writer.write_event(Event::End(BytesEnd::new("model"))).unwrap();
}

/// `<macro name="...">` per §2/§4.5: "one `<macro>` block per macro
/// function." A macro is translated the same way an ordinary model is —
/// its own variables, typed and emitted with the same `write_variable` —
/// plus a `<parm>` child per declared parameter.
fn write_macro<W: std::io::Write>(writer: &mut Writer<W>, macro_def: &crate::model::MacroDef) {
    let mut elem = BytesStart::new("macro");
    elem.push_attribute(("name", macro_def.name.as_str()));
    writer.write_event(Event::Start(elem)).unwrap();
    for param in &macro_def.params {
        write_text_elem(writer, "parm", param);
    }
    writer
        .write_event(Event::Start(BytesStart::new("variables")))
        .unwrap();
    for id in macro_def.project.namespace.iter() {
        write_variable(writer, &macro_def.project, id);
    }
    writer
        .write_event(Event::End(BytesEnd::new("variables")))
        .unwrap();
    writer.write_event(Event::End(BytesEnd::new("macro"))).unwrap();
}

fn write_variable<W: std::io::Write>(writer: &mut Writer<W>, project: &Project, id: VarId) {
    let var = project.var(id);
    let tag = match var.kind {
        VarKind::Stock => "stock",
        VarKind::Flow => "flow",
        VarKind::Aux | VarKind::DelayAux => "aux",
        VarKind::Dimension
        | VarKind::Array
        | VarKind::ArrayElement
        | VarKind::Unknown
        | VarKind::Module
        | VarKind::Group => {
            return;
        }
    };

    let mut elem = BytesStart::new(tag);
    let name = render_name(project, id);
    elem.push_attribute(("name", name.as_str()));
    writer.write_event(Event::Start(elem)).unwrap();

    if var.kind == VarKind::DelayAux {
        writer
            .write_event(Event::Empty(BytesStart::new("isee:delay_aux")))
            .unwrap();
    }

    if var.kind == VarKind::Stock {
        for &inflow in &var.inflows {
            write_text_elem(writer, "inflow", &render_name(project, inflow));
        }
        for &outflow in &var.outflows {
            write_text_elem(writer, "outflow", &render_name(project, outflow));
        }
        if let Some(init) = var
            .equations
            .iter()
            .find(|e| e.kind == EquationKind::DtNormalized)
        {
            write_text_elem(writer, "eqn", &render_expr(project, &init.rhs));
        }
    } else {
        let definitions: Vec<&Equation> = var
            .equations
            .iter()
            .filter(|e| e.kind == EquationKind::Definition)
            .collect();

        if definitions.len() > 1 {
            // Multi-equation array: one `<element>` per subscript tuple,
            // skipping Vensim's "A FUNCTION OF" no-equation sentinel.
            for eq in &definitions {
                if is_function_of_placeholder(&eq.rhs) {
                    continue;
                }
                let subscript = eq
                    .lhs
                    .subscripts
                    .as_ref()
                    .map(|list| render_element_subscript(project, list))
                    .unwrap_or_default();
                let mut element = BytesStart::new("element");
                element.push_attribute(("subscript", subscript.as_str()));
                writer.write_event(Event::Start(element)).unwrap();
                write_eqn_or_gf(writer, project, &eq.rhs);
                writer
                    .write_event(Event::End(BytesEnd::new("element")))
                    .unwrap();
            }
        } else if let Some(eq) = definitions.first() {
            if is_integ(&eq.rhs) {
                // handled by the Stock branch above; a non-Stock with an INTEG
                // shape would be a typing-pass bug, not an emission concern.
            } else {
                write_eqn_or_gf(writer, project, &eq.rhs);
            }
        }
    }

    if !var.subrange.is_empty() {
        writer
            .write_event(Event::Start(BytesStart::new("dimensions")))
            .unwrap();
        for &dim in &var.subrange {
            let mut d = BytesStart::new("dim");
            let name = render_name(project, dim);
            d.push_attribute(("name", name.as_str()));
            writer.write_event(Event::Empty(d)).unwrap();
        }
        writer
            .write_event(Event::End(BytesEnd::new("dimensions")))
            .unwrap();
    }

    if let Some(units) = var.units.as_ref() {
        let rendered = units.render();
        if !rendered.is_empty() {
            write_text_elem(writer, "units", &rendered);
        }
    } else if let Some(units_text) = var.equations.iter().find_map(|e| e.units.clone()) {
        write_text_elem(writer, "units", &units_text);
    }

    if let Some(comment) = var.equations.iter().find_map(|e| e.comment.clone()) {
        write_text_elem(writer, "doc", &comment);
    }

    writer.write_event(Event::End(BytesEnd::new(tag))).unwrap();
}

/// Most equations render as a plain `<eqn>`; a bare `WITH LOOKUP`/table
/// definition renders as `<eqn>` for the lookup subject plus a `<gf>`
/// graphical-function block, per §4.1's Table shape.
fn write_eqn_or_gf<W: std::io::Write>(writer: &mut Writer<W>, project: &Project, rhs: &Expr) {
    match rhs {
        Expr::WithLookup(subject, table, _) => {
            write_text_elem(writer, "eqn", &render_expr(project, subject));
            write_gf(writer, table);
        }
        Expr::TableDef(table, _) => {
            write_gf(writer, table);
        }
        other => {
            write_text_elem(writer, "eqn", &render_expr(project, other));
        }
    }
}

fn write_gf<W: std::io::Write>(writer: &mut Writer<W>, table: &crate::ast::Table) {
    let mut elem = BytesStart::new("gf");
    if table.extrapolate {
        elem.push_attribute(("type", "extrapolate"));
    }
    writer.write_event(Event::Start(elem)).unwrap();
    let (min_y, max_y) = if let Some((min_x, max_x, min_y, max_y)) = table.range {
        let mut xscale = BytesStart::new("xscale");
        xscale.push_attribute(("min", format_number(min_x).as_str()));
        xscale.push_attribute(("max", format_number(max_x).as_str()));
        writer.write_event(Event::Empty(xscale)).unwrap();
        (min_y, max_y)
    } else {
        // §4.5: "y scale is computed from the y-series; if all y's are
        // equal, max = min + 1."
        let min_y = table.ys.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_y = table.ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if min_y == max_y {
            (min_y, min_y + 1.0)
        } else {
            (min_y, max_y)
        }
    };
    let mut yscale = BytesStart::new("yscale");
    yscale.push_attribute(("min", format_number(min_y).as_str()));
    yscale.push_attribute(("max", format_number(max_y).as_str()));
    writer.write_event(Event::Empty(yscale)).unwrap();
    let xpts: Vec<String> = table.xs.iter().map(|x| format_number(*x)).collect();
    let ypts: Vec<String> = table.ys.iter().map(|y| format_number(*y)).collect();
    write_text_elem(writer, "xpts", &xpts.join(","));
    write_text_elem(writer, "ypts", &ypts.join(","));
    writer.write_event(Event::End(BytesEnd::new("gf"))).unwrap();
}

fn write_views<W: std::io::Write>(writer: &mut Writer<W>, project: &Project, view: &View) {
    writer
        .write_event(Event::Start(BytesStart::new("views")))
        .unwrap();
    writer
        .write_event(Event::Start(BytesStart::new("view")))
        .unwrap();

    for element in &view.elements {
        match element {
            ViewElement::Variable(v) => {
                let Some(var) = v.var else { continue };
                let tag = match project.var(var).kind {
                    VarKind::Stock => "stock",
                    VarKind::Flow => "flow",
                    _ => "aux",
                };
                let mut elem = BytesStart::new(tag);
                let name = render_name(project, var);
                elem.push_attribute(("name", name.as_str()));
                elem.push_attribute(("x", format_number(v.pos.x).as_str()));
                elem.push_attribute(("y", format_number(v.pos.y).as_str()));
                if v.shape == ElementShape::Oval {
                    elem.push_attribute(("shape", "oval"));
                }
                writer.write_event(Event::Empty(elem)).unwrap();
            }
            ViewElement::Connector(c) => {
                let mut elem = BytesStart::new("connector");
                if let Some(angle) = c.angle {
                    elem.push_attribute(("angle", format_number(angle).as_str()));
                }
                writer.write_event(Event::Empty(elem)).unwrap();
            }
            ViewElement::Comment(comment) => {
                let mut elem = BytesStart::new("text_box");
                elem.push_attribute(("x", format_number(comment.pos.x).as_str()));
                elem.push_attribute(("y", format_number(comment.pos.y).as_str()));
                writer.write_event(Event::Start(elem)).unwrap();
                writer
                    .write_event(Event::Text(BytesText::new(&comment.text)))
                    .unwrap();
                writer
                    .write_event(Event::End(BytesEnd::new("text_box")))
                    .unwrap();
            }
            ViewElement::Valve(_) | ViewElement::Pipe(_) => {
                // valves/pipes are Vensim-only connective glyphs; the stock
                // and flow elements above already carry XMILE's equivalent
                // layout information.
            }
        }
    }

    writer.write_event(Event::End(BytesEnd::new("view"))).unwrap();
    writer.write_event(Event::End(BytesEnd::new("views"))).unwrap();
}

fn write_text_elem<W: std::io::Write>(writer: &mut Writer<W>, tag: &str, text: &str) {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .unwrap();
    writer.write_event(Event::Text(BytesText::new(text))).unwrap();
    writer.write_event(Event::End(BytesEnd::new(tag))).unwrap();
}

/// A variable's emitted identifier, per §6: its original spelling with
/// spaces mapped to `_`, or quoted whole if it contains a `.` (XMILE reserves
/// `.` as the module-instance path separator). Grounded on the teacher's
/// `XMILEGenerator.cpp` `SpaceToUnderBar`/`QuotedSpaceToUnderBar`.
fn render_name(project: &Project, id: VarId) -> String {
    space_map(project.namespace.display_name(id))
}

fn space_map(name: &str) -> String {
    if name.contains('.') {
        format!("\"{name}\"")
    } else {
        name.replace(' ', "_")
    }
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v}")
    }
}

/// Render an expression tree back to an infix string for an `<eqn>` body.
/// Every binary/logical subexpression is parenthesized unconditionally:
/// correctness under re-parsing matters far more here than matching
/// Vensim's own minimal-parens style.
pub fn render_expr(project: &Project, expr: &Expr) -> String {
    match expr {
        Expr::Number(n, _) => format_number(*n),
        Expr::Literal(s, _) => format!("\"{s}\""),
        Expr::Na(_) => ":NA:".to_string(),
        Expr::VariableRef(var, subscripts, _) => {
            let mut s = render_name(project, *var);
            if let Some(list) = subscripts {
                s.push('[');
                s.push_str(&render_symbol_list(project, list));
                s.push(']');
            }
            s
        }
        Expr::SymbolListExpr(list, _, _) => format!("({})", render_symbol_list(project, list)),
        Expr::NumberTable(values, _) => values
            .iter()
            .map(|v| format_number(*v))
            .collect::<Vec<_>>()
            .join(","),
        Expr::Unary(op, inner, _) => {
            let sym = match op {
                UnaryOp::Positive => "+",
                UnaryOp::Negative => "-",
                UnaryOp::Not => "NOT ",
            };
            format!("{sym}({})", render_expr(project, inner))
        }
        Expr::Binary(op, lhs, rhs, _) => format!(
            "({} {} {})",
            render_expr(project, lhs),
            binary_symbol(*op),
            render_expr(project, rhs)
        ),
        Expr::Logical(op, lhs, rhs, _) => format!(
            "({} {} {})",
            render_expr(project, lhs),
            logical_symbol(*op),
            render_expr(project, rhs)
        ),
        Expr::Paren(inner, _) => format!("({})", render_expr(project, inner)),
        Expr::FunctionCall(func, args, _) => render_call(project, func, args),
        Expr::FunctionCallWithMemory(func, args, _, _) => render_call(project, func, args),
        Expr::Lookup(target, arg, _) => {
            format!("{}({})", render_expr(project, target), render_expr(project, arg))
        }
        Expr::WithLookup(subject, _, _) => render_expr(project, subject),
        Expr::TableDef(_, _) => String::new(),
    }
}

fn render_call(project: &Project, func: &FuncRef, args: &[Expr]) -> String {
    if let FuncRef::Builtin(idx) = func {
        let def = functions::lookup(*idx);
        if let Some(rewritten) = render_builtin_rewrite(project, def.name, args) {
            return rewritten;
        }
    }
    let name = match func {
        FuncRef::Builtin(idx) => {
            let def = functions::lookup(*idx);
            def.xmile_name.unwrap_or(def.name)
        }
        FuncRef::Unknown(name) => name,
    };
    let rendered_args: Vec<String> = args.iter().map(|a| render_expr(project, a)).collect();
    format!("{name}({})", rendered_args.join(","))
}

/// Vensim builtins with no direct XMILE equivalent expand into an explicit
/// expression instead of a renamed call, per §4.5. Grounded on xmutil's
/// `Function.cpp` `OutputComputable` overrides (`FunctionIfThenElse`,
/// `FunctionPulse`, `FunctionPulseTrain`, `FunctionQuantum`,
/// `FunctionRandomNormal`, `FunctionRandomPoisson`, `FunctionSampleIfTrue`,
/// `FunctionDelayN`, `FunctionSmoothN`, `FunctionTimeBase`, `FunctionLog`),
/// which is where each expansion shape below comes from.
fn render_builtin_rewrite(project: &Project, name: &str, args: &[Expr]) -> Option<String> {
    let r = |i: usize| render_expr(project, &args[i]);
    match (name, args.len()) {
        ("if then else", 3) => Some(format!("( IF {} THEN {} ELSE {} )", r(0), r(1), r(2))),
        ("sample if true", 3) => {
            Some(format!("( IF {} THEN {} ELSE PREVIOUS(SELF, {}) )", r(0), r(1), r(2)))
        }
        ("pulse", 2) => {
            let (start, width) = (r(0), r(1));
            Some(format!(
                "( IF TIME >= ({start}) AND TIME < (({start}) + MAX(DT,{width})) THEN 1 ELSE 0 )"
            ))
        }
        ("pulse train", 4) => {
            let (start, width, interval, end) = (r(0), r(1), r(2), r(3));
            Some(format!(
                "( IF TIME >= ({start}) AND TIME <= ({end}) AND (TIME - ({start})) MOD ({interval}) < ({width}) THEN 1 ELSE 0 )"
            ))
        }
        ("quantum", 2) => {
            let (x, quantum) = (r(0), r(1));
            Some(format!("({quantum})*INT(({x})/({quantum}))"))
        }
        ("random normal", 5) => Some(format!(
            "NORMAL({}, {}, {}, {}, {})",
            r(2),
            r(3),
            r(4),
            r(0),
            r(1)
        )),
        ("random poisson", 6) => Some(format!(
            "POISSON(({})/DT, {}, {}, {}) * {} + {}",
            r(2),
            r(5),
            r(0),
            r(1),
            r(4),
            r(3)
        )),
        ("delay n", 4) => Some(format!("DELAYN({},{},{},{})", r(0), r(1), r(3), r(2))),
        ("smooth n", 4) => Some(format!("SMTHN({},{},{},{})", r(0), r(1), r(3), r(2))),
        ("time base", 2) => Some(format!("{} + ({}) * Time", r(0), r(1))),
        ("log", 2) => Some(format!("(LN({}) / LN({}))", r(0), r(1))),
        _ => None,
    }
}

/// Vensim's "no equation" sentinel for an array element: a bare `A FUNCTION
/// OF(...)` call at the root of the RHS.
fn is_function_of_placeholder(rhs: &Expr) -> bool {
    matches!(
        rhs,
        Expr::FunctionCall(FuncRef::Builtin(idx), ..)
            if functions::lookup(*idx).name == "a function of"
    )
}

/// `subscript="e1, e2"` per §4.5: element names joined with ", ", in LHS order.
fn render_element_subscript(project: &Project, list: &crate::ast::SymbolList) -> String {
    list.entries
        .iter()
        .filter_map(|entry| match entry {
            SymbolListEntry::Symbol { var, .. } => Some(render_name(project, *var)),
            SymbolListEntry::Nested(_) => None,
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_symbol_list(project: &Project, list: &crate::ast::SymbolList) -> String {
    list.entries
        .iter()
        .map(|entry| match entry {
            SymbolListEntry::Symbol { var, bang } => {
                let name = render_name(project, *var);
                if *bang {
                    format!("{name}!")
                } else {
                    name
                }
            }
            SymbolListEntry::Nested(nested) => format!("({})", render_symbol_list(project, nested)),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn binary_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Exp => "^",
        BinaryOp::Lt => "<",
        BinaryOp::Gt => ">",
        BinaryOp::Lte => "<=",
        BinaryOp::Gte => ">=",
        BinaryOp::Eq => "=",
        BinaryOp::Neq => "<>",
    }
}

fn logical_symbol(op: LogicalOp) -> &'static str {
    match op {
        LogicalOp::And => "AND",
        LogicalOp::Or => "OR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Log;
    use crate::passes;

    fn translate(src: &str) -> Project {
        let mut project = Project::new("m");
        let mut log = Log::new();
        crate::parser::parse_equations(src, &mut project, &mut log);
        passes::run_all(&mut project, passes::PassOptions::default(), &mut log);
        crate::settings::extract_sim_specs(&mut project);
        for macro_def in &mut project.macros {
            passes::run_all(&mut macro_def.project, passes::PassOptions::default(), &mut log);
        }
        project
    }

    #[test]
    fn emits_stock_with_inflow_and_outflow() {
        let project = translate("Pop=INTEG(Births-Deaths, 100)~~|Births=1~~|Deaths=1~~|");
        let xml = emit_xmile(&project, "model.mdl", EmitOptions::default());
        assert!(xml.contains("<stock name=\"Pop\">"));
        assert!(xml.contains("<inflow>Births</inflow>"));
        assert!(xml.contains("<outflow>Deaths</outflow>"));
    }

    #[test]
    fn names_with_spaces_are_underscore_mapped_on_emission() {
        let project = translate("Birth Rate=1~~|");
        let xml = emit_xmile(&project, "model.mdl", EmitOptions::default());
        assert!(xml.contains("<aux name=\"Birth_Rate\">"));
    }

    #[test]
    fn synthesized_net_flow_emits_as_stock_net_flow() {
        let project = translate("S=INTEG(a*b+c, 0)~~|a=1~~|b=1~~|c=1~~|");
        let xml = emit_xmile(&project, "model.mdl", EmitOptions::default());
        assert!(xml.contains("<inflow>S_net_flow</inflow>"));
        assert!(xml.contains("<flow name=\"S_net_flow\">"));
    }

    #[test]
    fn if_then_else_rewrites_to_explicit_if_then_else_expression() {
        let project = translate("Y=IF THEN ELSE(X>0, 1, -1)~~|X=1~~|");
        let xml = emit_xmile(&project, "model.mdl", EmitOptions::default());
        assert!(xml.contains("<eqn>( IF (X &gt; 0) THEN 1 ELSE -1 )</eqn>"));
    }

    #[test]
    fn pulse_rewrites_to_explicit_time_window_expression() {
        let project = translate("Y=PULSE(5, 2)~~|");
        let xml = emit_xmile(&project, "model.mdl", EmitOptions::default());
        assert!(xml.contains(
            "<eqn>( IF TIME &gt;= (5) AND TIME &lt; ((5) + MAX(DT,2)) THEN 1 ELSE 0 )</eqn>"
        ));
    }

    #[test]
    fn emits_sim_specs_from_control_variables() {
        let project = translate("INITIAL TIME=0~Month~|FINAL TIME=10~Month~|TIME STEP=1~Month~|");
        let xml = emit_xmile(&project, "model.mdl", EmitOptions::default());
        assert!(xml.contains("<start>0</start>"));
        assert!(xml.contains("<stop>10</stop>"));
        assert!(xml.contains("<dt>1</dt>"));
    }

    #[test]
    fn multi_equation_array_emits_one_element_per_subscript_tuple() {
        let project = translate("Loc: (East,West)~~|\nSales[East]=1~~|\nSales[West]=2~~|\n");
        let xml = emit_xmile(&project, "model.mdl", EmitOptions::default());
        assert!(xml.contains("<element subscript=\"east\">"));
        assert!(xml.contains("<element subscript=\"west\">"));
        assert!(xml.contains("<dim name=\"loc\""));
    }

    #[test]
    fn placeholder_element_is_skipped_in_multi_equation_emission() {
        let project = translate(
            "Loc: (East,West)~~|\nSales[East]=1~~|\nSales[West]=A FUNCTION OF(East)~~|\n",
        );
        let xml = emit_xmile(&project, "model.mdl", EmitOptions::default());
        assert!(xml.contains("<element subscript=\"east\">"));
        assert!(!xml.contains("<element subscript=\"west\">"));
    }

    #[test]
    fn delay_aux_emits_isee_delay_aux_child() {
        let project = translate("X=SMOOTH(Y, 5)~~|Y=1~~|");
        let xml = emit_xmile(&project, "model.mdl", EmitOptions::default());
        assert!(xml.contains("<isee:delay_aux"));
    }

    #[test]
    fn compact_mode_has_no_indentation_whitespace() {
        let project = translate("X=1~~|");
        let xml = emit_xmile(&project, "model.mdl", EmitOptions { compact: true, as_sectors: false });
        assert!(!xml.contains("\n "));
    }

    #[test]
    fn macro_block_emits_parm_and_nested_variables() {
        let project = translate(
            ":MACRO: Double(input)\n\
             out = input*2~~|\n\
             :END OF MACRO:\n\
             X=1~~|\n",
        );
        let xml = emit_xmile(&project, "model.mdl", EmitOptions::default());
        assert!(xml.contains("<macro name=\"Double\">"));
        assert!(xml.contains("<parm>input</parm>"));
        assert!(xml.contains("<aux name=\"out\">"));
    }
}
