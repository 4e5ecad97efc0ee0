// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Sketch-section text parser, per §3/§4.5. Once the equation parser stops
//! at the `\\\---///` marker, this module reads the comma-delimited view
//! records Vensim writes after it into [`View`]/[`ViewElement`] values, one
//! [`ModelGroup`] per `*View N` section. Grounded directly on the reference
//! translator's `VensimView::ReadView`/`VensimParse::ReadEquations` tail
//! (record layout: `type,uid,<type-specific fields>`, the `10`/`11`/`12`/`1`
//! type tags for variable/valve/comment/connector, and the closing
//! `///---\\\` + `:L<0x7f>%^E!@` settings-tail markers).

use crate::model::{ModelGroup, Project};
use crate::view::types::{
    Connector, ElementShape, FlowPipe, Point, Uid, VensimComment, VensimValve, VensimVariable,
    View, ViewElement, ViewVersion,
};

const SKETCH_MARKER: &str = "\\\\\\---///";
const SKETCH_END_MARKER: &str = "///---\\\\\\";

/// Parse every `*View N` section in the sketch tail into a [`ModelGroup`]
/// per view and push them onto `project.model.groups`. Returns the text
/// remaining after the sketch section (the settings tail), for
/// [`crate::settings::parse_settings_block`].
pub fn parse_sketch<'a>(tail: &'a str, project: &mut Project) -> &'a str {
    let mut rest = tail;
    let mut view_index = 0;

    while rest.trim_start().starts_with(SKETCH_MARKER) {
        let after_marker = skip_line(rest.trim_start());
        let (version, after_version) = read_version_line(after_marker);
        let (title, after_title) = read_line(after_version);
        let after_font = skip_line(after_title);

        let (view, new_rest) = read_view_body(after_font, version);
        view_index += 1;
        let name = title
            .trim()
            .strip_prefix('*')
            .unwrap_or(title.trim())
            .trim()
            .to_string();
        let name = if name.is_empty() {
            format!("View {view_index}")
        } else {
            name
        };

        // Sketch entries haven't been resolved against the namespace yet
        // (that's pass (e)'s job); `variables` is filled in once it runs.
        project.model.groups.push(ModelGroup {
            name,
            variables: Vec::new(),
            view: Some(view),
        });

        rest = new_rest;
    }

    rest
}

fn read_version_line(text: &str) -> (ViewVersion, &str) {
    let (line, rest) = read_line(text);
    let version = if line.starts_with("V300") {
        ViewVersion::V300
    } else if line.starts_with("V310") || line.starts_with("V364") {
        ViewVersion::V310
    } else {
        ViewVersion::Unknown
    };
    (version, rest)
}

/// Read consecutive `type,uid,...` records until a line that doesn't start
/// with a digit (or the end-of-sketch marker), matching
/// `VensimView::ReadView`'s own loop termination.
fn read_view_body(mut text: &str, version: ViewVersion) -> (View, &str) {
    let mut view = View {
        version: Some(version),
        elements: Vec::new(),
    };

    loop {
        let trimmed = text.trim_start();
        if !trimmed.starts_with(|c: char| c.is_ascii_digit()) {
            text = trimmed;
            break;
        }
        let (line, next) = read_line(trimmed);
        if let Some(element) = parse_record(line) {
            view.elements.push(element);
        }
        text = next;
    }

    classify_pipes(&mut view);
    (view, text)
}

/// Reclassify a raw connector as a [`FlowPipe`] when either endpoint names a
/// valve already seen in this view, matching how Vensim draws a flow's pipe
/// as an ordinary connector into/out of its valve glyph.
fn classify_pipes(view: &mut View) {
    let valve_uids: std::collections::HashSet<Uid> = view
        .elements
        .iter()
        .filter_map(|e| match e {
            ViewElement::Valve(v) => Some(v.uid),
            _ => None,
        })
        .collect();

    for element in &mut view.elements {
        if let ViewElement::Connector(c) = element {
            let valve = if valve_uids.contains(&c.from) {
                Some(c.from)
            } else if valve_uids.contains(&c.to) {
                Some(c.to)
            } else {
                None
            };
            if let Some(valve) = valve {
                *element = ViewElement::Pipe(FlowPipe {
                    uid: c.uid,
                    valve,
                    points: c.points.clone(),
                });
            }
        }
    }
}

fn parse_record(line: &str) -> Option<ViewElement> {
    let fields = split_fields(line);
    if fields.len() < 2 {
        return None;
    }
    let type_tag: i32 = fields[0].trim().parse().ok()?;
    let uid: i32 = fields[1].trim().parse().ok()?;
    let uid = Uid(uid);

    match type_tag {
        10 => Some(ViewElement::Variable(parse_variable(uid, &fields))),
        11 => Some(ViewElement::Valve(parse_valve(uid, &fields))),
        12 => Some(ViewElement::Comment(parse_comment(uid, &fields))),
        1 => Some(ViewElement::Connector(parse_connector(uid, &fields))),
        _ => None,
    }
}

fn field_f64(fields: &[String], idx: usize) -> f64 {
    fields.get(idx).and_then(|s| s.trim().parse().ok()).unwrap_or(0.0)
}

fn field_i32(fields: &[String], idx: usize) -> i32 {
    fields.get(idx).and_then(|s| s.trim().parse().ok()).unwrap_or(0)
}

/// `10,uid,name,x,y,width,height,shape,bits,...`
fn parse_variable(uid: Uid, fields: &[String]) -> VensimVariable {
    let label = unquote(fields.get(2).map(String::as_str).unwrap_or(""));
    let x = field_f64(fields, 3);
    let y = field_f64(fields, 4);
    let width = field_f64(fields, 5);
    let height = field_f64(fields, 6);
    let shape_bits = field_i32(fields, 7);
    let bits = field_i32(fields, 8);
    let is_ghost = bits & 1 == 0;
    VensimVariable {
        uid,
        var: None,
        label,
        pos: Point { x, y },
        width,
        height,
        shape: if shape_bits & 0b11 == 3 {
            ElementShape::Oval
        } else {
            ElementShape::Rectangle
        },
        is_ghost,
        // Vensim does not encode the ghost's origin uid directly in the
        // record; it is the nearest prior non-ghost placement of the same
        // label, which reconciliation resolves by label match instead.
        ghost_of: None,
        hidden: false,
    }
}

/// `11,uid,name,x,y,width,height,shape,...`
fn parse_valve(uid: Uid, fields: &[String]) -> VensimValve {
    let x = field_f64(fields, 3);
    let y = field_f64(fields, 4);
    VensimValve {
        uid,
        var: None,
        pos: Point { x, y },
    }
}

/// `12,uid,name,x,y,width,height,shape,bits,...`
fn parse_comment(uid: Uid, fields: &[String]) -> VensimComment {
    let text = unquote(fields.get(2).map(String::as_str).unwrap_or(""));
    let x = field_f64(fields, 3);
    let y = field_f64(fields, 4);
    VensimComment {
        uid,
        text,
        pos: Point { x, y },
    }
}

/// `1,uid,from,to,...,npoints|(x,y)|...`
fn parse_connector(uid: Uid, fields: &[String]) -> Connector {
    let from = Uid(field_i32(fields, 2));
    let to = Uid(field_i32(fields, 3));
    let points = fields
        .last()
        .map(|last| parse_points(last))
        .unwrap_or_default();
    Connector {
        uid,
        from,
        to,
        angle: None,
        points,
    }
}

/// Parse the trailing `N|(x1,y1)|(x2,y2)|...` point-list field a connector
/// record ends with.
fn parse_points(field: &str) -> Vec<Point> {
    field
        .split('|')
        .filter_map(|part| {
            let part = part.trim().trim_start_matches('(').trim_end_matches(')');
            let (x, y) = part.split_once(',')?;
            Some(Point {
                x: x.trim().parse().ok()?,
                y: y.trim().parse().ok()?,
            })
        })
        .collect()
}

/// Split a sketch record line on commas, respecting `"..."` quoted fields
/// (which may themselves contain escaped quotes), per
/// `VensimParse::GetString`.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();
    let mut current = String::new();
    let mut in_quotes = false;
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '\\' if in_quotes => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn unquote(s: &str) -> String {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
        .replace("\\\"", "\"")
        .to_string()
}

fn read_line(text: &str) -> (&str, &str) {
    match text.find('\n') {
        Some(idx) => (&text[..idx], &text[idx + 1..]),
        None => (text, ""),
    }
}

fn skip_line(text: &str) -> &str {
    read_line(text).1
}

/// True once the sketch section has ended (the `///---\\\` marker), leaving
/// only the numbered settings tail.
pub fn at_settings_boundary(text: &str) -> bool {
    text.trim_start().starts_with(SKETCH_END_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Project;

    #[test]
    fn parses_a_single_view_with_a_variable_and_connector() {
        let tail = "\\\\\\---///\nV300  Do not edit\n*View 1\n$font info\n\
                     10,1,Stock,351,249,40,20,3,3,0,0,0,0,0,0\n\
                     10,2,Births,100,100,40,20,8,3,0,0,0,0,0,0\n\
                     1,4,2,1,4,0,0,0,0,0,0,-1--1--1,,1|(200,200)|\n\
                     ///---\\\\\\\n:L\u{7f}<%^E!@\n15:1,0,0,1,0,0\n";
        let mut project = Project::new("m");
        let stock = project.namespace.insert("Stock");
        let births = project.namespace.insert("Births");
        project.namespace.confirm_all();
        project.declare(stock, crate::model::VarKind::Stock);
        project.declare(births, crate::model::VarKind::Flow);

        let rest = parse_sketch(tail, &mut project);
        assert_eq!(project.model.groups.len(), 1);
        let group = &project.model.groups[0];
        assert_eq!(group.name, "View 1");
        let view = group.view.as_ref().unwrap();
        assert_eq!(view.variables().count(), 2);
        assert_eq!(view.connectors().count(), 1);
        assert!(at_settings_boundary(rest));
    }

    #[test]
    fn split_fields_respects_quotes() {
        let fields = split_fields("10,1,\"My, Var\",1,2");
        assert_eq!(fields[2], "\"My, Var\"");
    }

    #[test]
    fn parses_point_list_from_connector_tail() {
        let points = parse_points("1|(478,251)|(500,300)|");
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], Point { x: 478.0, y: 251.0 });
    }
}
