// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Vensim `.mdl` to XMILE translation engine, per §6's top-level API.
//!
//! [`translate`] runs the whole pipeline over a `.mdl` source string: lex
//! and parse equations into a [`model::Project`], run the semantic passes in
//! their fixed order, extract the simulation-control block, then emit the
//! result as an XMILE document. Everything under this crate is a library
//! surface; the process-wide diagnostic log and C ABI live in the sibling
//! `xmutil` crate.

pub mod ast;
pub mod common;
pub mod diagnostics;
pub mod emitter;
pub mod functions;
pub mod lexer;
pub mod model;
pub mod namespace;
pub mod parser;
pub mod passes;
pub mod settings;
pub mod units;
pub mod view;

use diagnostics::Log;
use model::Project;

/// Knobs exposed across the FFI boundary, per §6: compact vs. pretty XML,
/// long-name canonicalization, and sector-per-`<model>` emission.
#[derive(Clone, Copy, Debug, Default)]
pub struct TranslateOptions {
    pub compact: bool,
    pub long_name: bool,
    pub as_sectors: bool,
}

/// Translate one `.mdl` source file into an XMILE document.
///
/// `filename` is used only for diagnostics and the emitted `<header><name>`;
/// it need not refer to an actual path. Per §4.3/§7's error-recovery-not-abort
/// model, a malformed equation is logged and skipped rather than aborting the
/// whole translation, so the XMILE document is returned even when the log
/// reports errors; `None` is reserved for inputs the parser cannot make any
/// forward progress on at all (currently never produced, but kept in the
/// signature so a future hard-failure mode has somewhere to report through).
pub fn translate(
    src: &str,
    filename: Option<&str>,
    options: TranslateOptions,
) -> (Option<String>, Option<String>) {
    let filename = filename.unwrap_or("model.mdl");
    let mut log = Log::new();
    let mut project = Project::new(model_name_from_filename(filename));

    let tail = parser::parse_equations(src, &mut project, &mut log);
    let settings_text = view::parse_sketch(tail, &mut project);
    let raw_settings = settings::parse_settings_block(settings_text);

    let pass_options = passes::PassOptions {
        long_name: options.long_name,
    };
    passes::run_all(&mut project, pass_options, &mut log);
    settings::extract_sim_specs(&mut project);
    settings::apply_settings_tail(&mut project, &raw_settings);

    // Each macro body is its own tiny model, per §4.3; type/classify it the
    // same way the enclosing model is, but skip sim-specs/view extraction
    // (macros carry no sketch or `INITIAL TIME`-style control variables of
    // their own).
    for macro_def in &mut project.macros {
        passes::run_all(&mut macro_def.project, pass_options, &mut log);
    }

    let emit_options = emitter::EmitOptions {
        compact: options.compact,
        as_sectors: options.as_sectors,
    };
    let xmile = emitter::emit_xmile(&project, filename, emit_options);

    let log_text = if log.is_empty() { None } else { Some(log.render()) };
    (Some(xmile), log_text)
}

fn model_name_from_filename(filename: &str) -> &str {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    base.strip_suffix(".mdl").unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_a_simple_stock_and_flow_model() {
        let src = "Pop=INTEG(Births-Deaths, 100)~People~|\n\
                    Births=0.02*Pop~People/Year~|\n\
                    Deaths=0.01*Pop~People/Year~|\n\
                    INITIAL TIME=0~Year~|\n\
                    FINAL TIME=10~Year~|\n\
                    TIME STEP=0.25~Year~|\n";
        let (xmile, log) = translate(src, Some("population.mdl"), TranslateOptions::default());
        assert!(log.is_none());
        let xmile = xmile.expect("translation should succeed");
        assert!(xmile.contains("<stock name=\"Pop\">"));
        assert!(xmile.contains("<inflow>Births</inflow>"));
        assert!(xmile.contains("<outflow>Deaths</outflow>"));
        assert!(xmile.contains("<start>0</start>"));
    }

    #[test]
    fn parse_errors_surface_in_the_log_without_panicking() {
        let src = "Pop=INTEG(((Births-Deaths, 100)~~|\n";
        let (_xmile, log) = translate(src, Some("broken.mdl"), TranslateOptions::default());
        assert!(log.is_some());
    }

    #[test]
    fn model_name_strips_extension_and_directory() {
        assert_eq!(model_name_from_filename("models/population.mdl"), "population");
        assert_eq!(model_name_from_filename("plain"), "plain");
    }
}
