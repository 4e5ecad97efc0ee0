// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The semantic passes, run in the fixed order §4.4/§4.5 specify: typing,
//! then stock-flow resolution, then subscript ownership, then view
//! reconciliation, then (optionally) long-name canonicalization. Equation
//! ordering/algebraic-loop detection is deliberately not wired into this
//! list — see `crate::TranslateOptions` and DESIGN.md.

pub mod naming;
pub mod stock_flow;
pub mod subscripts;
pub mod typing;
pub mod views;

use crate::diagnostics::Log;
use crate::model::Project;

#[derive(Clone, Copy, Debug, Default)]
pub struct PassOptions {
    pub long_name: bool,
}

pub fn run_all(project: &mut Project, options: PassOptions, log: &mut Log) {
    typing::run(project, log);
    stock_flow::run(project);
    subscripts::run(project);
    views::run(project);
    typing::finalize(project);
    naming::run(project, options.long_name);
}
