//! Renumbering plans from rule strings, map files, and JSON plan files.
//!
//! Map file lines look like
//!
//! ```text
//! c 100 -- 140: +20     shift cells 100..=140 up by 20
//! c 150: 151            cell 150 becomes 151
//! c 200 -- 300: 400     cells 200..=300 move to start at 400
//! c: 50                 every other cell moves by 50
//! c 10: mat 7 rho -2.0  change attributes of cell 10
//! ```
//!
//! A line without `:` or without a known kind is a comment.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::deck::{AttributeEdit, EditField, ElementKind, Piece, RenumberPlan, RenumberRule};
use crate::error::{Error, Result};
use crate::utils::io;
use crate::utils::numeric::parse_int;

/// Attribute changes for a range of cells, from a map file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRule {
    /// `None` applies to every cell.
    pub range: Option<(i64, i64)>,
    pub changes: Vec<(EditField, String)>,
}

impl ChangeRule {
    fn applies_to(&self, cell: i64) -> bool {
        self.range
            .map_or(true, |(from, to)| (from..=to).contains(&cell))
    }
}

/// Everything a run should do: renumbering rules plus attribute edits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub renumber: RenumberPlan,
    pub edits: Vec<AttributeEdit>,
    pub changes: Vec<ChangeRule>,
}

#[derive(Debug, Deserialize)]
struct PlanFile {
    #[serde(default)]
    rules: BTreeMap<ElementKind, RenumberRule>,
    #[serde(default)]
    edits: Vec<AttributeEdit>,
}

impl Plan {
    /// Overlay `other` onto this plan. Its rules replace same-kind rules here;
    /// its edits and changes are appended.
    pub fn merge(&mut self, other: Plan) {
        self.renumber.merge(other.renumber);
        self.edits.extend(other.edits);
        self.changes.extend(other.changes);
    }

    pub fn is_empty(&self) -> bool {
        self.renumber.is_empty() && self.edits.is_empty() && self.changes.is_empty()
    }

    /// Explicit edits followed by change rules expanded over `cell_ids`. The
    /// first change rule matching a cell wins, and an explicit edit of the same
    /// attribute takes precedence over it.
    pub fn resolve_edits(&self, cell_ids: &[i64]) -> Vec<AttributeEdit> {
        let mut edits = self.edits.clone();

        for &cell in cell_ids {
            let Some(rule) = self.changes.iter().find(|r| r.applies_to(cell)) else {
                continue;
            };
            for (field, value) in &rule.changes {
                let explicit = edits.iter().any(|e| e.cell == cell && &e.field == field);
                if !explicit {
                    edits.push(AttributeEdit::new(cell, field.clone(), value.clone()));
                }
            }
        }

        edits
    }
}

// ============================================================================
// Rule strings
// ============================================================================

fn invalid_rule(arg: &str, problem: impl Into<String>) -> Error {
    Error::validation_invalid_argument("rule", problem, Some(arg.to_string()), None)
}

fn int_or(arg: &str, text: &str) -> Result<i64> {
    parse_int(text.trim())
        .ok_or_else(|| invalid_rule(arg, format!("'{}' is not an integer", text.trim())))
}

/// Parse `KIND=SPEC`:
///
/// - `+N`, `-N`, `N`: offset
/// - `A--B:C`: move `[A, B]` to start at `C`
/// - `i`, `i:START`: number by first appearance
/// - `A:B,C:D`: explicit pairs
pub fn parse_rule(arg: &str) -> Result<(ElementKind, RenumberRule)> {
    let (kind, spec) = arg
        .split_once('=')
        .ok_or_else(|| invalid_rule(arg, "expected KIND=SPEC"))?;
    let kind = ElementKind::parse(kind)
        .ok_or_else(|| invalid_rule(arg, format!("unknown element kind '{}'", kind.trim())))?;
    let spec = spec.trim();

    let rule = if spec.eq_ignore_ascii_case("i") {
        RenumberRule::Sequential { start: 1 }
    } else if let Some(start) = spec.strip_prefix("i:").or_else(|| spec.strip_prefix("I:")) {
        RenumberRule::Sequential {
            start: int_or(arg, start)?,
        }
    } else if let Some((range, start)) = spec.split_once(':').filter(|(r, _)| r.contains("--")) {
        let (from, to) = range
            .split_once("--")
            .ok_or_else(|| invalid_rule(arg, "expected A--B:C"))?;
        RenumberRule::Range {
            from: int_or(arg, from)?,
            to: int_or(arg, to)?,
            start: int_or(arg, start)?,
        }
    } else if spec.contains(':') {
        let pairs = spec
            .split(',')
            .map(|pair| {
                let (old, new) = pair
                    .split_once(':')
                    .ok_or_else(|| invalid_rule(arg, format!("'{}' is not an OLD:NEW pair", pair)))?;
                Ok((int_or(arg, old)?, int_or(arg, new)?))
            })
            .collect::<Result<Vec<_>>>()?;
        RenumberRule::Explicit(pairs)
    } else {
        RenumberRule::Offset(int_or(arg, spec)?)
    };

    Ok((kind, rule))
}

/// Parse `CELL:FIELD=VALUE`, e.g. `10:mat=7` or `10:imp:n=0`.
pub fn parse_edit(arg: &str) -> Result<AttributeEdit> {
    let invalid = |problem: &str| {
        Error::validation_invalid_argument("set", problem, Some(arg.to_string()), None)
    };

    let (cell, rest) = arg
        .split_once(':')
        .ok_or_else(|| invalid("expected CELL:FIELD=VALUE"))?;
    let (field, value) = rest
        .split_once('=')
        .ok_or_else(|| invalid("expected CELL:FIELD=VALUE"))?;
    let cell = parse_int(cell.trim())
        .filter(|c| *c > 0)
        .ok_or_else(|| invalid("cell must be a positive integer"))?;
    let field = EditField::parse(field).ok_or_else(|| {
        Error::validation_invalid_argument(
            "set",
            format!("unknown cell attribute '{}'", field.trim()),
            Some(arg.to_string()),
            Some(
                ["mat", "rho", "imp:<p>", "fill", "u", "tr"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
        )
    })?;
    let value = value.trim();
    if value.is_empty() {
        return Err(invalid("value is empty"));
    }

    Ok(AttributeEdit::new(cell, field, value))
}

// ============================================================================
// Map files
// ============================================================================

fn map_error(line: usize, text: &str, problem: impl Into<String>) -> Error {
    Error::config_invalid_value(
        format!("map line {}", line),
        Some(text.trim().to_string()),
        problem,
    )
}

fn parse_map_range(text: &str, line: usize, raw: &str) -> Result<Option<(i64, i64)>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let parse = |s: &str| {
        parse_int(s.trim()).ok_or_else(|| map_error(line, raw, format!("'{}' is not an integer", s.trim())))
    };
    match text.split_once("--") {
        Some((a, b)) => Ok(Some((parse(a)?, parse(b)?))),
        None => {
            let n = parse(text)?;
            Ok(Some((n, n)))
        }
    }
}

fn change_field(name: &str) -> Option<EditField> {
    match name {
        "den" | "density" => Some(EditField::Density),
        "mat" | "m" | "rho" | "fill" | "u" | "tr" | "trcl" => EditField::parse(name),
        _ if name.starts_with("imp:") => EditField::parse(name),
        _ => None,
    }
}

/// `key value` pairs; parsing stops at the first token that is not a known
/// attribute, and the rest of the line is a comment.
fn parse_changes(tokens: &[&str]) -> Vec<(EditField, String)> {
    let mut changes = Vec::new();
    let mut iter = tokens.iter();
    while let Some(key) = iter.next() {
        let Some(field) = change_field(key) else {
            break;
        };
        let Some(value) = iter.next() else {
            break;
        };
        changes.push((field, value.to_string()));
    }
    changes
}

#[derive(Default)]
struct KindRules {
    ranges: Vec<Piece>,
    default_offset: Option<i64>,
}

pub fn parse_map_file(text: &str) -> Result<Plan> {
    let mut per_kind: BTreeMap<ElementKind, KindRules> = BTreeMap::new();
    let mut changes = Vec::new();

    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        let lower = raw.trim().to_ascii_lowercase();
        let Some((left, right)) = lower.split_once(':') else {
            continue;
        };

        let letters_end = left
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(left.len());
        let Some(kind) = ElementKind::parse(&left[..letters_end]) else {
            continue;
        };
        let range = parse_map_range(&left[letters_end..], line, raw)?;

        let tokens: Vec<&str> = right
            .split(|c: char| c.is_whitespace() || c == '=')
            .filter(|t| !t.is_empty())
            .collect();
        let Some(first) = tokens.first() else {
            continue;
        };

        let Some(value) = parse_int(first) else {
            let rule_changes = parse_changes(&tokens);
            if rule_changes.is_empty() {
                continue;
            }
            if kind != ElementKind::Cell {
                return Err(map_error(line, raw, "attribute changes apply to cells only"));
            }
            changes.push(ChangeRule {
                range,
                changes: rule_changes,
            });
            continue;
        };

        let signed = first.starts_with(|c: char| c == '+' || c == '-');
        let rules = per_kind.entry(kind).or_default();
        match range {
            None => rules.default_offset = Some(value),
            Some((from, to)) => {
                let offset = if signed {
                    value
                } else {
                    value
                        .checked_sub(from)
                        .ok_or_else(|| map_error(line, raw, "new start is out of range"))?
                };
                rules.ranges.push(Piece { from, to, offset });
            }
        }
    }

    let mut renumber = RenumberPlan::default();
    for (kind, rules) in per_kind {
        renumber.rules.insert(
            kind,
            RenumberRule::Piecewise {
                ranges: rules.ranges,
                default_offset: rules.default_offset.unwrap_or(0),
            },
        );
    }

    Ok(Plan {
        renumber,
        edits: Vec::new(),
        changes,
    })
}

pub fn load_map_file(path: &Path) -> Result<Plan> {
    let text = io::read_file(path, "read map file")?;
    parse_map_file(&text)
}

// ============================================================================
// JSON plan files
// ============================================================================

pub fn parse_plan_json(text: &str, source: &str) -> Result<Plan> {
    let file: PlanFile =
        serde_json::from_str(text).map_err(|e| Error::config_invalid_json(source, e))?;

    Ok(Plan {
        renumber: RenumberPlan { rules: file.rules },
        edits: file.edits,
        changes: Vec::new(),
    })
}

pub fn load_plan_file(path: &Path) -> Result<Plan> {
    let text = io::read_file(path, "read plan file")?;
    parse_plan_json(&text, &path.display().to_string())
}

// ============================================================================
// Tests
// ============================================================================
