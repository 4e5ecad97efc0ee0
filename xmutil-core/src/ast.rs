// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The expression tree and equation shapes built by the parser, per §3
//! "Equation" / "Left-hand side" / "Expression tree (tagged variants)" /
//! "SymbolList". `VariableRef` holds a `VarId` handle rather than a name or
//! pointer, per the "Cyclic references" design note in §9: variables own
//! their equations, and expressions must not own a path back to the
//! variable that owns them.

use crate::namespace::VarId;

/// Byte span in source text, for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Loc {
    pub start: u32,
    pub end: u32,
}

impl Loc {
    pub fn new(start: usize, end: usize) -> Self {
        Loc {
            start: start as u32,
            end: end as u32,
        }
    }

    pub fn merge(a: Loc, b: Loc) -> Loc {
        Loc {
            start: a.start.min(b.start),
            end: a.end.max(b.end),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Positive,
    Negative,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Exp,
    Lt,
    Gt,
    Lte,
    Gte,
    Eq,
    Neq,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// A reference to a built-in or unknown function, per §4.1's Function
/// registry: "The `Unknown` function preserves source text untranslated."
#[derive(Clone, Debug, PartialEq)]
pub enum FuncRef {
    Builtin(usize),
    Unknown(String),
}

/// A single entry in a [`SymbolList`]: a subscript symbol, optionally
/// bang-marked for iteration (§3 invariant d), or a nested list for Vensim's
/// `(a-b)` range shorthand and map lists.
#[derive(Clone, Debug, PartialEq)]
pub enum SymbolListEntry {
    Symbol { var: VarId, bang: bool },
    Nested(SymbolList),
}

/// An ordered sequence of subscript entries with an optional map-range.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SymbolList {
    pub entries: Vec<SymbolListEntry>,
    pub map_range: Option<Box<SymbolList>>,
}

impl SymbolList {
    pub fn single(var: VarId) -> Self {
        SymbolList {
            entries: vec![SymbolListEntry::Symbol { var, bang: false }],
            map_range: None,
        }
    }

    pub fn has_bang(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e, SymbolListEntry::Symbol { bang: true, .. }))
    }
}

/// Graphical/lookup table data, per §3: `Table { xs, ys, range, extrapolate }`.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub range: Option<(f64, f64, f64, f64)>,
    pub extrapolate: bool,
}

impl Table {
    /// Invariant 4 (§8): xs and ys have the same length and xs is weakly
    /// increasing once emitted.
    pub fn is_well_formed(&self) -> bool {
        self.xs.len() == self.ys.len() && self.xs.windows(2).all(|w| w[0] <= w[1])
    }
}

/// The expression tree, per §3 "Expression tree (tagged variants)".
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64, Loc),
    Literal(String, Loc),
    /// `:NA:`, Vensim's -1e38 sentinel.
    Na(Loc),
    VariableRef(VarId, Option<SymbolList>, Loc),
    /// RHS of a subscript-range definition: `Loc: (L1-L3)`.
    SymbolListExpr(SymbolList, Option<SymbolList>, Loc),
    /// A bulk constant-array literal (`TABBED ARRAY` body).
    NumberTable(Vec<f64>, Loc),
    Unary(UnaryOp, Box<Expr>, Loc),
    Binary(BinaryOp, Box<Expr>, Box<Expr>, Loc),
    Logical(LogicalOp, Box<Expr>, Box<Expr>, Loc),
    Paren(Box<Expr>, Loc),
    /// Memoryless call: `MAX(a, b)`.
    FunctionCall(FuncRef, Vec<Expr>, Loc),
    /// Call with memory, e.g. `SMOOTH(x, dt)`; `placeholder` is populated by
    /// placeholder synthesis (§4.3) when this call is not itself the root of
    /// a top-level equation.
    FunctionCallWithMemory(FuncRef, Vec<Expr>, Option<VarId>, Loc),
    /// `table(x)` invocation of a graphical-function variable.
    Lookup(Box<Expr>, Box<Expr>, Loc),
    /// `WITH LOOKUP(x, (pairs))` inline table definition.
    WithLookup(Box<Expr>, Table, Loc),
    /// A lookup/graphical-function variable's own defining equation.
    TableDef(Table, Loc),
}

impl Expr {
    pub fn loc(&self) -> Loc {
        match self {
            Expr::Number(_, l)
            | Expr::Literal(_, l)
            | Expr::Na(l)
            | Expr::VariableRef(_, _, l)
            | Expr::SymbolListExpr(_, _, l)
            | Expr::NumberTable(_, l)
            | Expr::Unary(_, _, l)
            | Expr::Binary(_, _, _, l)
            | Expr::Logical(_, _, _, l)
            | Expr::Paren(_, l)
            | Expr::FunctionCall(_, _, l)
            | Expr::FunctionCallWithMemory(_, _, _, l)
            | Expr::Lookup(_, _, l)
            | Expr::WithLookup(_, _, l)
            | Expr::TableDef(_, l) => *l,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterpMode {
    Default,
    HoldBackward,
    LookForward,
    Interpolate,
    Raw,
}

/// A left-hand side: variable, optional subscript tuple, optional except
/// list, optional interpolation mode.
#[derive(Clone, Debug, PartialEq)]
pub struct Lhs {
    pub var: VarId,
    pub subscripts: Option<SymbolList>,
    pub except: Vec<SymbolList>,
    pub interp: InterpMode,
    pub loc: Loc,
}

/// How an equation was introduced, per §3 "Equation".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EquationKind {
    /// `=` aux/flow equation.
    Definition,
    /// `:` subscript-range definition.
    SubscriptRange,
    /// `(` lookup-table definition.
    LookupTable,
    /// `:=` data equation.
    DataEquals,
    /// `<->` subscript alias.
    Equivalence,
    /// Stock initialization normalized from `INTEG(flow, init)`'s second arg.
    DtNormalized,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Equation {
    pub lhs: Lhs,
    pub rhs: Expr,
    pub kind: EquationKind,
    pub units: Option<String>,
    pub comment: Option<String>,
}
