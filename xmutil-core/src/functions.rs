// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The built-in function registry: name, arity, memory/time-dependence flags,
//! and an XMILE-facing renderer name, per §3 "Function" and §4.1's keyword
//! matching. Grounded in xmutil's `Function.h` subclass table and in
//! `mdl::builtins::to_lower_space`/`classify_symbol` from the Rust-side
//! conversion code, unified into a single static table.

use std::sync::LazyLock;

use crate::common::canonicalize;

/// Sentinel arity for variadic built-ins (`SUM`, `A FUNCTION OF`, ...).
pub const VARIADIC: i8 = -1;

/// Which argument positions a memory function evaluates under the *active*
/// vs *initial* sub-expression, as a bitmask over argument index (bit 0 =
/// first argument). A function is memoryless iff this is empty and
/// `time_dependent` is false.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryMask {
    pub active: u32,
    pub init: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Arity {
    Fixed(i8),
    Variadic,
}

/// One built-in function's static metadata.
#[derive(Clone, Debug)]
pub struct FunctionDef {
    /// Canonical (space-separated, lowercase) Vensim name, e.g. "if then else".
    pub name: &'static str,
    pub arity: Arity,
    pub memory: MemoryMask,
    pub is_delay: bool,
    pub time_dependent: bool,
    /// Name used when rendering the call into an XMILE `<eqn>` body. `None`
    /// means "render the Vensim name verbatim" (e.g. unknown functions).
    pub xmile_name: Option<&'static str>,
}

impl FunctionDef {
    pub fn is_memoryless(&self) -> bool {
        self.memory.active == 0 && self.memory.init == 0 && !self.time_dependent
    }

    pub fn arity_matches(&self, nargs: usize) -> bool {
        match self.arity {
            Arity::Fixed(n) => n as usize == nargs,
            Arity::Variadic => true,
        }
    }
}

macro_rules! f {
    ($name:expr, $arity:expr, $xmile:expr) => {
        FunctionDef {
            name: $name,
            arity: Arity::Fixed($arity),
            memory: MemoryMask { active: 0, init: 0 },
            is_delay: false,
            time_dependent: false,
            xmile_name: Some($xmile),
        }
    };
}

macro_rules! time_fn {
    ($name:expr, $arity:expr, $xmile:expr) => {
        FunctionDef {
            name: $name,
            arity: Arity::Fixed($arity),
            memory: MemoryMask { active: 0, init: 0 },
            is_delay: false,
            time_dependent: true,
            xmile_name: Some($xmile),
        }
    };
}

macro_rules! delay_fn {
    ($name:expr, $arity:expr, $xmile:expr) => {
        FunctionDef {
            name: $name,
            arity: Arity::Fixed($arity),
            memory: MemoryMask { active: 0, init: 0 },
            is_delay: true,
            time_dependent: false,
            xmile_name: Some($xmile),
        }
    };
}

macro_rules! memory_fn {
    ($name:expr, $arity:expr, $active_bits:expr, $init_bits:expr, $xmile:expr) => {
        FunctionDef {
            name: $name,
            arity: Arity::Fixed($arity),
            memory: MemoryMask {
                active: $active_bits,
                init: $init_bits,
            },
            is_delay: true,
            time_dependent: false,
            xmile_name: Some($xmile),
        }
    };
}

/// The static built-in table, indexed by canonical name (see `to_lower_space`).
pub static BUILTINS: LazyLock<Vec<FunctionDef>> = LazyLock::new(|| {
    vec![
        f!("abs", 1, "ABS"),
        f!("exp", 1, "EXP"),
        f!("sqrt", 1, "SQRT"),
        f!("ln", 1, "LN"),
        f!("log", 2, "LOG10"),
        f!("sin", 1, "SIN"),
        f!("cos", 1, "COS"),
        f!("tan", 1, "TAN"),
        f!("arcsin", 1, "ARCSIN"),
        f!("arccos", 1, "ARCCOS"),
        f!("arctan", 1, "ARCTAN"),
        f!("integer", 1, "INT"),
        f!("modulo", 2, "MODULO"),
        f!("quantum", 2, "Quantum"),
        f!("max", 2, "MAX"),
        f!("min", 2, "MIN"),
        f!("vmax", 1, "MAX"),
        f!("vmin", 1, "MIN"),
        f!("if then else", 3, "IF"),
        f!("zidz", 2, "SAFEDIV"),
        f!("xidz", 3, "SAFEDIV"),
        time_fn!("pulse", 2, "Pulse"),
        f!("pulse train", 4, "PulseTrain"),
        time_fn!("step", 2, "step"),
        time_fn!("ramp", 3, "RAMP"),
        delay_fn!("smooth", 2, "SMTH1"),
        delay_fn!("smoothi", 3, "SMTH1"),
        delay_fn!("smooth3", 2, "SMTH3"),
        delay_fn!("smooth3i", 3, "SMTH3"),
        FunctionDef {
            name: "smooth n",
            arity: Arity::Fixed(4),
            memory: MemoryMask { active: 0, init: 0 },
            is_delay: true,
            time_dependent: false,
            xmile_name: Some("SMTHN"),
        },
        delay_fn!("delay1", 2, "DELAY1"),
        delay_fn!("delay1i", 3, "DELAY1"),
        delay_fn!("delay3", 2, "DELAY3"),
        delay_fn!("delay3i", 3, "DELAY3"),
        delay_fn!("delay fixed", 3, "DELAY"),
        FunctionDef {
            name: "delay n",
            arity: Arity::Fixed(4),
            memory: MemoryMask { active: 0, init: 0 },
            is_delay: true,
            time_dependent: false,
            xmile_name: Some("DELAYN"),
        },
        f!("delay conveyor", 6, "DELAY_CONVEYOR"),
        delay_fn!("trend", 3, "TREND"),
        delay_fn!("forecast", 3, "FORCST"),
        memory_fn!("integ", 2, 0b10, 0b01, "integ_active"),
        memory_fn!("active initial", 2, 0b10, 0b01, "ai_active"),
        f!("initial", 1, "INIT"),
        f!("reinitial", 1, "INIT"),
        f!("sample if true", 3, "SampleIfTrue"),
        f!("with lookup", 3, "WITH_LOOKUP"),
        f!("lookup invert", 2, "LOOKUPINV"),
        f!("lookup area", 3, "LOOKUP_AREA"),
        f!("lookup extrapolate", 2, "LOOKUP"),
        f!("lookup forward", 1, "LOOKUP"),
        f!("lookup backward", 1, "LOOKUP"),
        f!("tabxl", 1, "LOOKUP"),
        f!("get data at time", 2, "GET_DATA_AT_TIME"),
        f!("get data last time", 1, "GET_DATA_LAST_TIME"),
        FunctionDef {
            name: "sum",
            arity: Arity::Variadic,
            memory: MemoryMask { active: 0, init: 0 },
            is_delay: false,
            time_dependent: false,
            xmile_name: Some("SUM"),
        },
        FunctionDef {
            name: "prod",
            arity: Arity::Variadic,
            memory: MemoryMask { active: 0, init: 0 },
            is_delay: false,
            time_dependent: false,
            xmile_name: Some("PROD"),
        },
        f!("elmcount", 1, "SIZE"),
        f!("vector select", 5, "VECTOR SELECT"),
        f!("vector elm map", 2, "VECTOR ELM MAP"),
        f!("vector sort order", 2, "VECTOR SORT ORDER"),
        f!("vector reorder", 2, "VECTOR_REORDER"),
        f!("vector lookup", 5, "VECTOR LOOKUP"),
        f!("random 0 1", 0, "UNIFORM(0,1)"),
        f!("random uniform", 3, "UNIFORM"),
        f!("random normal", 5, "RandomNormal"),
        f!("random pink noise", 4, "NORMALPINK"),
        f!("random poisson", 6, "RandomPoisson"),
        FunctionDef {
            name: "a function of",
            arity: Arity::Variadic,
            memory: MemoryMask { active: 0, init: 0 },
            is_delay: false,
            time_dependent: false,
            xmile_name: Some("NAN"),
        },
        f!("game", 1, ""),
        time_fn!("time base", 2, "TIME_BASE"),
        f!("npv", 4, "NPV"),
        f!("allocate by priority", 4, "ALLOCATE_BY_PRIORITY"),
        f!("get direct data", 4, "GET_DIRECT_DATA"),
        f!("get data mean", 3, "GET_DATA_MEAN"),
    ]
});

/// Classification of a raw symbol token once canonicalized — lets the
/// normalizer dispatch in one `to_lower_space` call rather than re-checking
/// each category. Mirrors `mdl::builtins::SymbolClass`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolClass {
    WithLookup,
    TabbedArray,
    GetXls(&'static str),
    Builtin(usize),
    Regular,
}

pub fn classify_symbol(name: &str) -> SymbolClass {
    let canonical = canonicalize(name);
    let canonical = canonical.as_str();
    if canonical == "with lookup" {
        return SymbolClass::WithLookup;
    }
    if canonical == "tabbed array" {
        return SymbolClass::TabbedArray;
    }
    if let Some(rest) = canonical.strip_prefix("get ") {
        if rest.starts_with("123") {
            return SymbolClass::GetXls("{GET 123");
        }
        if rest.starts_with("data") {
            return SymbolClass::GetXls("{GET DATA");
        }
        if rest.starts_with("direct") {
            return SymbolClass::GetXls("{GET DIRECT");
        }
        if rest.starts_with("vdf") {
            return SymbolClass::GetXls("{GET VDF");
        }
        if rest.starts_with("xls") {
            return SymbolClass::GetXls("{GET XLS");
        }
    }
    if let Some(idx) = BUILTINS.iter().position(|f| f.name == canonical) {
        return SymbolClass::Builtin(idx);
    }
    SymbolClass::Regular
}

pub fn lookup(idx: usize) -> &'static FunctionDef {
    &BUILTINS[idx]
}

pub fn find_by_name(canonical_name: &str) -> Option<&'static FunctionDef> {
    BUILTINS.iter().find(|f| f.name == canonical_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integ_is_a_memory_function() {
        let integ = find_by_name("integ").unwrap();
        assert!(!integ.is_memoryless());
        assert_eq!(integ.memory.active, 0b10);
        assert_eq!(integ.memory.init, 0b01);
    }

    #[test]
    fn abs_is_memoryless() {
        let abs = find_by_name("abs").unwrap();
        assert!(abs.is_memoryless());
        assert!(abs.arity_matches(1));
        assert!(!abs.arity_matches(2));
    }

    #[test]
    fn sum_is_variadic() {
        let sum = find_by_name("sum").unwrap();
        assert!(sum.arity_matches(1));
        assert!(sum.arity_matches(5));
    }

    #[test]
    fn classify_handles_spacing_and_case_variants() {
        assert!(matches!(classify_symbol("IF_THEN_ELSE"), SymbolClass::Builtin(_)));
        assert!(matches!(classify_symbol("if then else"), SymbolClass::Builtin(_)));
        assert!(matches!(classify_symbol("WITH LOOKUP"), SymbolClass::WithLookup));
        assert!(matches!(classify_symbol("TABBED_ARRAY"), SymbolClass::TabbedArray));
        assert!(matches!(classify_symbol("GET XLS"), SymbolClass::GetXls(_)));
        assert!(matches!(classify_symbol("my_variable"), SymbolClass::Regular));
    }

    #[test]
    fn pulse_is_time_dependent_but_memoryless_of_state() {
        let pulse = find_by_name("pulse").unwrap();
        assert!(pulse.time_dependent);
        assert!(!pulse.is_memoryless());
    }
}
