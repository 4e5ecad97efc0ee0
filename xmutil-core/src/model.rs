// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The typed symbol graph a translation builds and the semantic passes
//! mutate in place: [`Variable`], [`Equation`] ownership, [`Dimension`]s,
//! [`ModelGroup`]s (Vensim's views/sectors), and the [`Project`] that ties a
//! [`SymbolNamespace`] to the variables it names.

use crate::ast::Equation;
use crate::namespace::{SymbolNamespace, VarId};
use crate::units::UnitExpr;
use crate::view::View;

/// The classification §4.4's "mark variable types" pass assigns to every
/// symbol. A symbol starts `Unknown` the moment the parser allocates it and
/// is reclassified once its role in the model is determined.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VarKind {
    Unknown,
    Aux,
    /// An auxiliary synthesized to hold a memory function's state, e.g. the
    /// `{placeholder}` variable standing in for a bare `SMOOTH(...)` call.
    DelayAux,
    Stock,
    Flow,
    /// A subscripted variable that owns one or more dimensions.
    Array,
    /// A single element of a subscript range; never itself a model variable.
    ArrayElement,
    /// A named subscript range/dimension.
    Dimension,
    Module,
    Group,
}

impl VarKind {
    pub fn is_flow_like(self) -> bool {
        matches!(self, VarKind::Flow)
    }

    pub fn is_stock_like(self) -> bool {
        matches!(self, VarKind::Stock)
    }
}

/// Transient bookkeeping used while the stock-flow pass (§4.4) walks
/// `INTEG` arguments: accumulates which flows increase/decrease a stock
/// before the pass commits them onto the `Variable`'s `inflows`/`outflows`.
#[derive(Default, Clone, Debug)]
pub struct FlowList {
    pub inflows: Vec<VarId>,
    pub outflows: Vec<VarId>,
}

impl FlowList {
    pub fn is_empty(&self) -> bool {
        self.inflows.is_empty() && self.outflows.is_empty()
    }
}

/// A named subscript range (Vensim's `Loc` in `Loc: (L1-L3)`), plus an
/// optional `->` mapping to another dimension (§4.1 subscript equivalence).
#[derive(Clone, Debug)]
pub struct Dimension {
    pub id: VarId,
    pub elements: Vec<VarId>,
    pub mapped_to: Option<VarId>,
}

/// One modeled quantity: a stock, flow, auxiliary, array, or (once
/// classified) a dimension or dimension element.
#[derive(Clone, Debug)]
pub struct Variable {
    pub id: VarId,
    pub kind: VarKind,
    /// Usually one equation; more than one when a subscripted variable is
    /// defined piecewise across several `EXCEPT` partitions.
    pub equations: Vec<Equation>,
    pub units: Option<UnitExpr>,
    pub comment: Option<String>,
    /// For an `ArrayElement`, the `Array`/`Dimension` it belongs to.
    pub owner: Option<VarId>,
    /// For a `Stock`/`Flow`/`Aux`/`Array`, the dimensions it is indexed by,
    /// in declaration order.
    pub subrange: Vec<VarId>,
    pub inflows: Vec<VarId>,
    pub outflows: Vec<VarId>,
    /// Set on `DelayAux` variables and on ghost-upgraded view placeholders;
    /// such variables are real model variables but were not named directly
    /// by the `.mdl` source.
    pub is_synthesized: bool,
}

impl Variable {
    pub fn new(id: VarId, kind: VarKind) -> Self {
        Variable {
            id,
            kind,
            equations: Vec::new(),
            units: None,
            comment: None,
            owner: None,
            subrange: Vec::new(),
            inflows: Vec::new(),
            outflows: Vec::new(),
            is_synthesized: false,
        }
    }

    pub fn is_subscripted(&self) -> bool {
        !self.subrange.is_empty()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IntegrationMethod {
    Euler,
    RungeKutta4,
}

/// Simulation control block (`sim-specs`), parsed from the settings tail of
/// a `.mdl` file per §4.6.
#[derive(Clone, Debug)]
pub struct SimSpecs {
    pub start: f64,
    pub stop: f64,
    pub dt: f64,
    /// True when the source wrote `DT = 1/N` form; preserved so the emitter
    /// can round-trip the reciprocal spelling some Vensim files rely on.
    pub dt_is_reciprocal: bool,
    pub save_per: Option<f64>,
    pub time_units: Option<String>,
    pub method: IntegrationMethod,
}

impl Default for SimSpecs {
    fn default() -> Self {
        SimSpecs {
            start: 0.0,
            stop: 100.0,
            dt: 1.0,
            dt_is_reciprocal: false,
            save_per: None,
            time_units: None,
            method: IntegrationMethod::Euler,
        }
    }
}

/// One Vensim "view"/sector worth of variables plus its sketch, per §4.5.
#[derive(Clone, Debug, Default)]
pub struct ModelGroup {
    pub name: String,
    pub variables: Vec<VarId>,
    pub view: Option<View>,
}

/// The whole translated model: simulation control, named dimensions, and
/// the groups (sectors/views) partitioning its variables.
#[derive(Clone, Debug)]
pub struct Model {
    pub name: String,
    pub sim_specs: SimSpecs,
    pub dimensions: Vec<Dimension>,
    pub groups: Vec<ModelGroup>,
    /// Raw `22:` units-equivalence payloads from the settings tail (§4.6),
    /// e.g. `"$,Dollar,Dollars,$s"`. Kept verbatim; XMILE has no dedicated
    /// slot for this so it is not currently emitted.
    pub units_equivs: Vec<String>,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Model {
            name: name.into(),
            sim_specs: SimSpecs::default(),
            dimensions: Vec::new(),
            groups: Vec::new(),
            units_equivs: Vec::new(),
        }
    }
}

/// A `:MACRO: name(params) ... :END OF MACRO:` block, per §4.3. Each macro
/// gets its own namespace/variable graph — a macro body's equations never
/// see or shadow the enclosing model's symbols — so it carries its own
/// nested [`Project`] rather than a slice of the parent's variables.
pub struct MacroDef {
    pub name: String,
    pub params: Vec<String>,
    pub project: Project,
}

/// The root container a translation builds: the symbol namespace plus the
/// variable storage it names, and the model tree those variables feed.
pub struct Project {
    pub namespace: SymbolNamespace,
    variables: Vec<Option<Variable>>,
    pub model: Model,
    pub macros: Vec<MacroDef>,
}

impl Project {
    pub fn new(model_name: impl Into<String>) -> Self {
        Project {
            namespace: SymbolNamespace::new(),
            variables: Vec::new(),
            model: Model::new(model_name),
            macros: Vec::new(),
        }
    }

    /// Register `id`'s [`Variable`] slot, growing storage as needed. Called
    /// once per symbol, immediately after the namespace allocates it.
    pub fn declare(&mut self, id: VarId, kind: VarKind) -> &mut Variable {
        let idx = id.index();
        if idx >= self.variables.len() {
            self.variables.resize(idx + 1, None);
        }
        self.variables[idx].get_or_insert_with(|| Variable::new(id, kind))
    }

    pub fn var(&self, id: VarId) -> &Variable {
        self.variables[id.index()]
            .as_ref()
            .expect("VarId without a declared Variable slot")
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut Variable {
        self.variables[id.index()]
            .as_mut()
            .expect("VarId without a declared Variable slot")
    }

    pub fn try_var(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.index()).and_then(|v| v.as_ref())
    }

    /// Iterate the live, confirmed variables in namespace allocation order.
    pub fn iter_vars(&self) -> impl Iterator<Item = &Variable> + '_ {
        self.namespace.iter().map(move |id| self.var(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_then_lookup_round_trips() {
        let mut project = Project::new("test");
        let id = project.namespace.insert("Stock Level");
        project.namespace.confirm_all();
        project.declare(id, VarKind::Stock);
        assert_eq!(project.var(id).kind, VarKind::Stock);
    }

    #[test]
    fn iter_vars_reflects_namespace_confirmation() {
        let mut project = Project::new("test");
        let confirmed = project.namespace.insert("Births");
        project.namespace.confirm_all();
        project.declare(confirmed, VarKind::Flow);

        let scratch = project.namespace.insert("Scratch");
        project.declare(scratch, VarKind::Unknown);
        project.namespace.delete_all_unconfirmed();

        let names: Vec<VarId> = project.iter_vars().map(|v| v.id).collect();
        assert_eq!(names, vec![confirmed]);
    }
}
