// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Vensim sketch ("view") handling: element types and the reconciliation
//! pass that resolves them against the symbol graph, per §3/§4.5.

mod convert;
pub mod parse;
mod types;

pub use convert::{
    attach_flows, attach_flows_cross_view, complete_links, dump_undefined_variables, reconcile,
    referenced_vars, resolve_variable_refs, upgrade_ghosts, upgrade_ghosts_cross_view,
};
pub use parse::parse_sketch;
pub use types::{
    Connector, ElementShape, FlowPipe, Point, Uid, VensimComment, VensimValve, VensimVariable,
    View, ViewElement, ViewVersion,
};
