// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Vensim sketch ("view") element types, per §3's View/ViewElement/Connector
//! shapes and §4.5's reconciliation pass. A view is read from the `.mdl`
//! sketch section keyed by integer UIDs; those UIDs only ever resolve to
//! variables within the reconciliation pass, so they are kept as bare `i32`s
//! here rather than `VarId`s until that pass runs.

use crate::namespace::VarId;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Uid(pub i32);

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// The sketch-section version header Vensim stamps on every view, e.g.
/// `V300  Do not modify`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewVersion {
    V300,
    V310,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementShape {
    Rectangle,
    Oval,
    None,
}

/// A stock/flow/aux/dimension box placed on the sketch.
#[derive(Clone, Debug)]
pub struct VensimVariable {
    pub uid: Uid,
    /// Resolved once the reconciliation pass matches this sketch entry
    /// against a namespace symbol; `None` for a ghost whose original could
    /// not be found, which the pass then drops.
    pub var: Option<VarId>,
    pub label: String,
    pub pos: Point,
    pub width: f64,
    pub height: f64,
    pub shape: ElementShape,
    /// True when this sketch entry is a secondary reference to a variable
    /// drawn elsewhere (Vensim's "ghost" / ALIAS mechanism), rather than the
    /// variable's primary placement.
    pub is_ghost: bool,
    /// The uid of the primary placement, when `is_ghost` is true.
    pub ghost_of: Option<Uid>,
    pub hidden: bool,
}

/// A flow's valve glyph: the little diamond/circle Vensim draws mid-pipe.
#[derive(Clone, Debug)]
pub struct VensimValve {
    pub uid: Uid,
    pub var: Option<VarId>,
    pub pos: Point,
}

/// A free-floating sketch comment/text box, not bound to any variable.
#[derive(Clone, Debug)]
pub struct VensimComment {
    pub uid: Uid,
    pub text: String,
    pub pos: Point,
}

/// A stock-to-flow pipe segment (the literal pipe, not the valve glyph).
#[derive(Clone, Debug)]
pub struct FlowPipe {
    pub uid: Uid,
    pub valve: Uid,
    pub points: Vec<Point>,
}

/// An information-link arrow between two sketch elements, with the angle
/// (degrees, clockwise from north) XMILE uses to place the arrowhead.
#[derive(Clone, Debug)]
pub struct Connector {
    pub uid: Uid,
    pub from: Uid,
    pub to: Uid,
    pub angle: Option<f64>,
    pub points: Vec<Point>,
}

#[derive(Clone, Debug)]
pub enum ViewElement {
    Variable(VensimVariable),
    Valve(VensimValve),
    Comment(VensimComment),
    Pipe(FlowPipe),
    Connector(Connector),
}

impl ViewElement {
    pub fn uid(&self) -> Uid {
        match self {
            ViewElement::Variable(v) => v.uid,
            ViewElement::Valve(v) => v.uid,
            ViewElement::Comment(c) => c.uid,
            ViewElement::Pipe(p) => p.uid,
            ViewElement::Connector(c) => c.uid,
        }
    }
}

/// One reconciled Vensim view (sketch), ready for the emitter's view mode,
/// per §4.5.
#[derive(Clone, Debug, Default)]
pub struct View {
    pub version: Option<ViewVersion>,
    pub elements: Vec<ViewElement>,
}

impl View {
    pub fn find(&self, uid: Uid) -> Option<&ViewElement> {
        self.elements.iter().find(|e| e.uid() == uid)
    }

    pub fn variables(&self) -> impl Iterator<Item = &VensimVariable> + '_ {
        self.elements.iter().filter_map(|e| match e {
            ViewElement::Variable(v) => Some(v),
            _ => None,
        })
    }

    pub fn connectors(&self) -> impl Iterator<Item = &Connector> + '_ {
        self.elements.iter().filter_map(|e| match e {
            ViewElement::Connector(c) => Some(c),
            _ => None,
        })
    }
}

impl Default for ViewVersion {
    fn default() -> Self {
        ViewVersion::Unknown
    }
}
