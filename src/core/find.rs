//! Cell search over the attribute view.
//!
//! A condition is `attr op value` clauses joined by `and`/`or`, with `and`
//! binding tighter: `mat == 5 and rho < 0 or u == 2`. Attributes come from a
//! fixed table; there is no other way to reach a cell's data.

use serde::Serialize;

use crate::deck::{AttributeView, CellAttributes};
use crate::error::{Error, Result};
use crate::utils::numeric::parse_real;
use crate::utils::ranges::{compress, Span};

const ATTRIBUTES: [&str; 8] = ["cel", "mat", "rho", "u", "fill", "tr", "sur", "imp:<p>"];

#[derive(Debug, Clone, PartialEq)]
enum Attr {
    Cell,
    Material,
    Density,
    Universe,
    Fill,
    Transformation,
    Surface,
    Importance(String),
}

impl Attr {
    fn parse(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        let attr = match lower.as_str() {
            "cel" | "cell" => Attr::Cell,
            "mat" => Attr::Material,
            "rho" | "den" => Attr::Density,
            "u" => Attr::Universe,
            "fill" => Attr::Fill,
            "tr" | "trcl" => Attr::Transformation,
            "sur" => Attr::Surface,
            _ => {
                let particle = lower.strip_prefix("imp:").filter(|p| !p.is_empty())?;
                Attr::Importance(particle.to_string())
            }
        };
        Some(attr)
    }

    /// Values of this attribute for a cell; a cell with none never matches.
    fn values(&self, cell: &CellAttributes) -> Vec<f64> {
        let int = |v: Option<i64>| -> Vec<f64> { v.map(|v| v as f64).into_iter().collect() };
        match self {
            Attr::Cell => vec![cell.id as f64],
            Attr::Material => vec![cell.material as f64],
            Attr::Density => cell.density.as_ref().and_then(|d| d.value).into_iter().collect(),
            // No `u` keyword means the real world, universe 0.
            Attr::Universe => vec![cell.universe.unwrap_or(0) as f64],
            Attr::Fill => int(cell.fill),
            Attr::Transformation => int(cell.transformation),
            Attr::Surface => cell.surfaces.iter().map(|&s| s as f64).collect(),
            Attr::Importance(p) => cell
                .importances
                .get(p)
                .and_then(|l| l.value)
                .into_iter()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Op {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "==" | "=" => Some(Op::Eq),
            "!=" => Some(Op::Ne),
            "<" => Some(Op::Lt),
            "<=" => Some(Op::Le),
            ">" => Some(Op::Gt),
            ">=" => Some(Op::Ge),
            _ => None,
        }
    }

    fn holds(self, left: f64, right: f64) -> bool {
        match self {
            Op::Eq => left == right,
            Op::Ne => left != right,
            Op::Lt => left < right,
            Op::Le => left <= right,
            Op::Gt => left > right,
            Op::Ge => left >= right,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Clause {
    attr: Attr,
    op: Op,
    value: f64,
}

impl Clause {
    fn matches(&self, cell: &CellAttributes) -> bool {
        self.attr
            .values(cell)
            .into_iter()
            .any(|v| self.op.holds(v, self.value))
    }
}

/// A parsed condition: a disjunction of conjunctions.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    any_of: Vec<Vec<Clause>>,
}

fn is_op_char(c: char) -> bool {
    matches!(c, '=' | '!' | '<' | '>')
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let op = is_op_char(c);
        let mut token = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() || is_op_char(c) != op {
                break;
            }
            token.push(c);
            chars.next();
        }
        tokens.push(token);
    }

    tokens
}

impl Condition {
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = |problem: String| {
            Error::validation_invalid_argument(
                "condition",
                problem,
                Some(text.to_string()),
                Some(ATTRIBUTES.iter().map(|s| s.to_string()).collect()),
            )
        };

        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(invalid("condition is empty".to_string()));
        }

        let mut any_of = vec![Vec::new()];
        let mut rest = tokens.as_slice();
        loop {
            let [attr, op, value, tail @ ..] = rest else {
                return Err(invalid(format!(
                    "incomplete clause '{}'",
                    rest.join(" ")
                )));
            };
            let clause = Clause {
                attr: Attr::parse(attr)
                    .ok_or_else(|| invalid(format!("unknown attribute '{}'", attr)))?,
                op: Op::parse(op).ok_or_else(|| invalid(format!("unknown operator '{}'", op)))?,
                value: parse_real(value)
                    .ok_or_else(|| invalid(format!("'{}' is not a number", value)))?,
            };
            if let Some(group) = any_of.last_mut() {
                group.push(clause);
            }

            match tail {
                [] => break,
                [joiner, more @ ..] => {
                    match joiner.to_ascii_lowercase().as_str() {
                        "and" => {}
                        "or" => any_of.push(Vec::new()),
                        other => return Err(invalid(format!("expected 'and' or 'or', found '{}'", other))),
                    }
                    rest = more;
                }
            }
        }

        Ok(Condition { any_of })
    }

    pub fn matches(&self, cell: &CellAttributes) -> bool {
        self.any_of
            .iter()
            .any(|all| all.iter().all(|clause| clause.matches(cell)))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FindResult {
    pub condition: String,
    /// Matching cells in definition order.
    pub cells: Vec<i64>,
    /// The same cells as sorted contiguous ranges.
    pub ranges: Vec<Span>,
}

pub fn find_cells(view: &AttributeView, condition: &str) -> Result<FindResult> {
    let parsed = Condition::parse(condition)?;
    let cells: Vec<i64> = view
        .iter()
        .filter(|cell| parsed.matches(cell))
        .map(|cell| cell.id)
        .collect();
    let ranges = compress(&cells.iter().copied().collect());

    Ok(FindResult {
        condition: condition.to_string(),
        cells,
        ranges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::Deck;

    const DECK: &str = "title
1 1 -7.8 -1 imp:n=1
2 1 0.05 1 -2 imp:n=2 u=3
3 0 2 imp:n=0
4 2 -1.0 -3 imp:n=1 fill=3
5 like 1 but u=3

1 so 5
2 so 10
3 px 1

m1 1001 1
m2 1001 1
";

    fn find(condition: &str) -> Vec<i64> {
        let deck = Deck::parse(DECK).unwrap();
        find_cells(deck.view(), condition).unwrap().cells
    }

    #[test]
    fn single_clauses() {
        assert_eq!(find("mat == 1"), vec![1, 2, 5]);
        assert_eq!(find("mat != 1"), vec![3, 4]);
        assert_eq!(find("u == 3"), vec![2, 5]);
        assert_eq!(find("u == 0"), vec![1, 3, 4]);
        assert_eq!(find("fill == 3"), vec![4]);
        assert_eq!(find("imp:n >= 1"), vec![1, 2, 4, 5]);
    }

    #[test]
    fn density_compared_literally_with_sign() {
        assert_eq!(find("rho < 0"), vec![1, 4, 5]);
        assert_eq!(find("rho > 0"), vec![2]);
    }

    #[test]
    fn surface_clause_matches_any_surface() {
        assert_eq!(find("sur == 2"), vec![2, 3]);
        assert_eq!(find("sur > 2"), vec![4]);
    }

    #[test]
    fn and_binds_tighter_than_or() {
        assert_eq!(find("mat == 1 and u == 3 or cel == 3"), vec![2, 3, 5]);
        assert_eq!(find("cel>=2 and cel<=4"), vec![2, 3, 4]);
    }

    #[test]
    fn result_carries_ranges() {
        let deck = Deck::parse(DECK).unwrap();
        let result = find_cells(deck.view(), "cel != 3").unwrap();
        assert_eq!(result.cells, vec![1, 2, 4, 5]);
        assert_eq!(result.ranges.len(), 2);
        assert_eq!(result.ranges[1].to_string(), "4 -- 5");
    }

    #[test]
    fn parse_errors() {
        for bad in ["", "mat ==", "vol == 1", "mat ~ 1", "mat == x", "mat == 1 xor u == 1"] {
            let err = Condition::parse(bad).unwrap_err();
            assert_eq!(err.code.as_str(), "validation.invalid_argument", "{}", bad);
        }
    }

    #[test]
    fn tokenizer_splits_operators() {
        assert_eq!(tokenize("imp:n>=1"), vec!["imp:n", ">=", "1"]);
        assert_eq!(tokenize("rho < -1.5"), vec!["rho", "<", "-1.5"]);
    }
}
