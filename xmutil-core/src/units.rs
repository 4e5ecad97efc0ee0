// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Unit expression parsing, simplification, and rendering, per §3 "Units /
//! UnitExpression": a multiset pair `(numerator, denominator)` of unit atoms
//! plus an optional `(min, max, step)` range, with equality-based
//! simplification cancelling identical atoms.

/// One bound of a unit range: either a literal value or the `?` Vensim uses
/// to mean "unbounded in this direction".
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Bound {
    Value(f64),
    Unbounded,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitRange {
    pub min: Bound,
    pub max: Bound,
    pub step: Option<f64>,
}

/// A unit expression: a multiset pair of numerator/denominator atoms plus an
/// optional numeric range, e.g. `Widgets/Month [0,?]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnitExpr {
    pub numerator: Vec<String>,
    pub denominator: Vec<String>,
    pub range: Option<UnitRange>,
}

impl UnitExpr {
    pub fn atom(name: &str) -> Self {
        UnitExpr {
            numerator: vec![name.to_string()],
            denominator: Vec::new(),
            range: None,
        }
    }

    pub fn dimensionless() -> Self {
        UnitExpr::default()
    }

    /// Multiply two unit expressions (numerator/denominator concatenate);
    /// ranges are dropped, matching Vensim's lack of unit-range algebra.
    pub fn mul(&self, other: &UnitExpr) -> UnitExpr {
        let mut numerator = self.numerator.clone();
        numerator.extend(other.numerator.iter().cloned());
        let mut denominator = self.denominator.clone();
        denominator.extend(other.denominator.iter().cloned());
        UnitExpr {
            numerator,
            denominator,
            range: None,
        }
        .simplify()
    }

    pub fn div(&self, other: &UnitExpr) -> UnitExpr {
        let mut numerator = self.numerator.clone();
        numerator.extend(other.denominator.iter().cloned());
        let mut denominator = self.denominator.clone();
        denominator.extend(other.numerator.iter().cloned());
        UnitExpr {
            numerator,
            denominator,
            range: None,
        }
        .simplify()
    }

    /// Cancel identical atoms appearing in both numerator and denominator.
    /// Non-goal per §1: no unit algebra beyond this simplification.
    pub fn simplify(&self) -> UnitExpr {
        let mut numerator = self.numerator.clone();
        let mut denominator = self.denominator.clone();
        numerator.sort();
        denominator.sort();

        let mut simplified_num = Vec::new();
        let mut denom_remaining = denominator.clone();
        for atom in numerator {
            if let Some(pos) = denom_remaining.iter().position(|d| *d == atom) {
                denom_remaining.remove(pos);
            } else {
                simplified_num.push(atom);
            }
        }
        simplified_num.sort();
        denom_remaining.sort();

        UnitExpr {
            numerator: simplified_num,
            denominator: denom_remaining,
            range: self.range,
        }
    }

    /// Render to a Vensim/XMILE-compatible unit string: `A*B/C*D`, with a
    /// trailing `[min,max]` or `[min,max,step]` when a range is present.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.numerator.is_empty() && self.denominator.is_empty() {
            // dimensionless: render nothing but the range, if any
        } else if self.numerator.is_empty() {
            out.push('1');
        } else {
            out.push_str(&self.numerator.join("*"));
        }
        if !self.denominator.is_empty() {
            out.push('/');
            if self.denominator.len() == 1 {
                out.push_str(&self.denominator[0]);
            } else {
                out.push('(');
                out.push_str(&self.denominator.join("*"));
                out.push(')');
            }
        }
        if let Some(range) = &self.range {
            out.push_str(" [");
            out.push_str(&render_bound(range.min));
            out.push(',');
            out.push_str(&render_bound(range.max));
            if let Some(step) = range.step {
                out.push(',');
                out.push_str(&format_number(step));
            }
            out.push(']');
        }
        out
    }
}

fn render_bound(bound: Bound) -> String {
    match bound {
        Bound::Value(v) => format_number(v),
        Bound::Unbounded => "?".to_string(),
    }
}

fn format_number(v: f64) -> String {
    if float_cmp::approx_eq!(f64, v, v.round()) {
        format!("{v:.0}")
    } else {
        format!("{v}")
    }
}

/// Parse a Vensim units string, e.g. `"Widgets/Month [0,?]"` or
/// `"Dmnl"`.
pub fn parse(s: &str) -> UnitExpr {
    let s = s.trim();
    let (body, range) = match s.find('[') {
        Some(idx) if s.ends_with(']') => (s[..idx].trim(), parse_range(&s[idx + 1..s.len() - 1])),
        _ => (s, None),
    };

    if body.is_empty() || body.eq_ignore_ascii_case("dmnl") {
        return UnitExpr {
            numerator: Vec::new(),
            denominator: Vec::new(),
            range,
        };
    }

    let (num_part, den_part) = match body.find('/') {
        Some(idx) => (&body[..idx], Some(&body[idx + 1..])),
        None => (body, None),
    };

    let numerator = split_atoms(num_part);
    let denominator = match den_part {
        Some(den) => split_atoms(den.trim_start_matches('(').trim_end_matches(')')),
        None => Vec::new(),
    };

    UnitExpr {
        numerator,
        denominator,
        range,
    }
    .simplify_preserving_range(range)
}

impl UnitExpr {
    fn simplify_preserving_range(self, range: Option<UnitRange>) -> UnitExpr {
        let mut simplified = self.simplify();
        simplified.range = range;
        simplified
    }
}

fn split_atoms(s: &str) -> Vec<String> {
    s.split('*')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_range(inner: &str) -> Option<UnitRange> {
    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    if parts.len() < 2 {
        return None;
    }
    let parse_bound = |p: &str| -> Bound {
        if p == "?" {
            Bound::Unbounded
        } else {
            p.parse().map(Bound::Value).unwrap_or(Bound::Unbounded)
        }
    };
    let min = parse_bound(parts[0]);
    let max = parse_bound(parts[1]);
    let step = parts.get(2).and_then(|p| p.parse().ok());
    Some(UnitRange { min, max, step })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_ratio() {
        let u = parse("Widgets/Month");
        assert_eq!(u.numerator, vec!["Widgets".to_string()]);
        assert_eq!(u.denominator, vec!["Month".to_string()]);
    }

    #[test]
    fn parses_range_with_unbounded_max() {
        let u = parse("Month [0,?]");
        assert_eq!(u.numerator, vec!["Month".to_string()]);
        let range = u.range.unwrap();
        assert_eq!(range.min, Bound::Value(0.0));
        assert_eq!(range.max, Bound::Unbounded);
    }

    #[test]
    fn dmnl_is_dimensionless() {
        let u = parse("Dmnl");
        assert!(u.numerator.is_empty() && u.denominator.is_empty());
    }

    #[test]
    fn simplify_cancels_identical_atoms() {
        let u = UnitExpr {
            numerator: vec!["Month".to_string(), "Widgets".to_string()],
            denominator: vec!["Month".to_string()],
            range: None,
        };
        let s = u.simplify();
        assert_eq!(s.numerator, vec!["Widgets".to_string()]);
        assert!(s.denominator.is_empty());
    }

    #[test]
    fn mul_then_simplify_matches_simplify_then_mul() {
        // Property 5: simplify(u)*simplify(v) renders the same as simplify(u*v).
        let u = parse("Widgets/Month");
        let v = parse("Month/Day");
        let lhs = u.simplify().mul(&v.simplify());
        let rhs = u.mul(&v);
        assert_eq!(lhs.render(), rhs.render());
    }

    #[test]
    fn render_round_trips_ratio() {
        assert_eq!(parse("Widgets/Month").render(), "Widgets/Month");
    }
}
