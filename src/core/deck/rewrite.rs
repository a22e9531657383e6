//! Rewriter: applies a renumbering and attribute edits as byte-span
//! replacements on the original source.
//!
//! Every byte outside a replaced span is reproduced unchanged. Replacements
//! are applied from the end of the source toward the start so earlier offsets
//! stay valid.

use std::collections::HashSet;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::classify::{Card, CellLayout, Param};
use super::index::ReferenceIndex;
use super::kind::ElementKind;
use super::renumber::Renumbering;
use crate::error::{Error, Result};
use crate::utils::numeric::{parse_int, parse_real};

// ============================================================================
// Edit types
// ============================================================================

/// A cell attribute that can be edited.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EditField {
    Material,
    Density,
    /// Importance for one particle designator.
    Importance(String),
    Fill,
    Universe,
    Transformation,
}

impl EditField {
    pub fn parse(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        match lower.as_str() {
            "mat" | "m" => Some(EditField::Material),
            "rho" | "d" => Some(EditField::Density),
            "fill" => Some(EditField::Fill),
            "u" => Some(EditField::Universe),
            "tr" | "trcl" => Some(EditField::Transformation),
            _ => {
                let particle = lower.strip_prefix("imp:")?;
                let valid = !particle.is_empty()
                    && !particle.contains(',')
                    && particle.chars().all(|c| !c.is_whitespace());
                valid.then(|| EditField::Importance(particle.to_string()))
            }
        }
    }

    /// Keyword used when the parameter has to be written out.
    pub fn keyword(&self) -> String {
        match self {
            EditField::Material => "mat".to_string(),
            EditField::Density => "rho".to_string(),
            EditField::Importance(p) => format!("imp:{}", p),
            EditField::Fill => "fill".to_string(),
            EditField::Universe => "u".to_string(),
            EditField::Transformation => "trcl".to_string(),
        }
    }
}

impl TryFrom<String> for EditField {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        EditField::parse(&value).ok_or_else(|| format!("unknown cell attribute '{}'", value))
    }
}

impl From<EditField> for String {
    fn from(field: EditField) -> Self {
        match field {
            EditField::Transformation => "tr".to_string(),
            other => other.keyword(),
        }
    }
}

impl std::fmt::Display for EditField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from(self.clone()))
    }
}

/// Set one attribute of one cell's defining card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeEdit {
    pub cell: i64,
    pub field: EditField,
    pub value: String,
}

impl AttributeEdit {
    pub fn new(cell: i64, field: EditField, value: impl Into<String>) -> Self {
        AttributeEdit {
            cell,
            field,
            value: value.into(),
        }
    }
}

// ============================================================================
// Replacements
// ============================================================================

#[derive(Debug, Clone)]
struct Replacement {
    span: Range<usize>,
    text: String,
    /// Insertion order; ties at one offset are applied so that this order
    /// survives in the output.
    seq: usize,
}

#[derive(Debug, Default)]
struct Replacements {
    items: Vec<Replacement>,
}

impl Replacements {
    fn push(&mut self, span: Range<usize>, text: impl Into<String>) {
        let seq = self.items.len();
        self.items.push(Replacement {
            span,
            text: text.into(),
            seq,
        });
    }

    fn overlaps(&self, span: &Range<usize>) -> bool {
        self.items
            .iter()
            .any(|r| r.span.start < span.end && span.start < r.span.end)
    }

    /// Apply to `source`. Overlapping non-empty spans are an internal fault.
    fn apply(mut self, source: &str) -> Result<String> {
        self.items
            .sort_by(|a, b| (a.span.start, a.seq).cmp(&(b.span.start, b.seq)));

        let mut reach = 0;
        for r in &self.items {
            if r.span.start < reach {
                return Err(Error::rewrite_inconsistent(format!(
                    "replacement at bytes {}..{} overlaps an earlier one",
                    r.span.start, r.span.end
                )));
            }
            if r.span.end > source.len() || !source.is_char_boundary(r.span.start) {
                return Err(Error::rewrite_inconsistent(format!(
                    "replacement at bytes {}..{} is outside the source",
                    r.span.start, r.span.end
                )));
            }
            reach = reach.max(r.span.end);
        }

        let mut text = source.to_string();
        for r in self.items.iter().rev() {
            text.replace_range(r.span.clone(), &r.text);
        }
        Ok(text)
    }
}

/// Result of a rewrite pass.
#[derive(Debug, Clone, Serialize)]
pub struct Rewrite {
    #[serde(skip)]
    pub text: String,
    /// Identifier occurrences whose value changed.
    pub renumbered: usize,
    /// Attribute edits applied.
    pub edited: usize,
    /// 1-based lines that now run past column 80 but did not before.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub long_lines: Vec<usize>,
}

const LINE_LIMIT: usize = 80;

/// Lines pushed past the card width by longer replacements. Replacements never
/// add or remove newlines, so lines pair up one to one.
fn grown_past_limit(source: &str, text: &str) -> Vec<usize> {
    let width = |line: &str| line.trim_end_matches('\r').chars().count();
    source
        .lines()
        .zip(text.lines())
        .enumerate()
        .filter(|(_, (before, after))| width(before) <= LINE_LIMIT && width(after) > LINE_LIMIT)
        .map(|(i, _)| i + 1)
        .collect()
}

// ============================================================================
// Attribute edits
// ============================================================================

fn require_int(edit: &AttributeEdit, min: i64, max: i64) -> Result<i64> {
    parse_int(&edit.value)
        .filter(|v| (min..=max).contains(v))
        .ok_or_else(|| {
            Error::edit_invalid(
                edit.cell,
                edit.field.to_string(),
                format!("'{}' is not an integer in {}..={}", edit.value, min, max),
            )
        })
}

fn require_real(edit: &AttributeEdit) -> Result<()> {
    parse_real(&edit.value).map(|_| ()).ok_or_else(|| {
        Error::edit_invalid(
            edit.cell,
            edit.field.to_string(),
            format!("'{}' is not a number", edit.value),
        )
    })
}

fn values_span(param: &Param) -> Option<Range<usize>> {
    let first = param.values.first()?;
    let last = param.values.last()?;
    Some(first.span.start..last.span.end)
}

/// Set the first value of a keyword parameter, or append ` key=value`.
fn set_param(
    out: &mut Replacements,
    card: &Card,
    layout: &CellLayout,
    names: &[&str],
    keyword: &str,
    value: &str,
) {
    match layout.param(names).and_then(|p| p.values.first()) {
        Some(word) => out.push(word.span.clone(), value),
        None => out.push(card.raw.tail..card.raw.tail, format!(" {}={}", keyword, value)),
    }
}

struct CellEdits<'a> {
    card: &'a Card,
    layout: &'a CellLayout,
    edits: Vec<&'a AttributeEdit>,
}

impl<'a> CellEdits<'a> {
    fn find(&self, field: &EditField) -> Option<&'a AttributeEdit> {
        self.edits.iter().copied().find(|e| &e.field == field)
    }

    fn apply(&self, out: &mut Replacements) -> Result<usize> {
        let mut applied = 0;
        for edit in &self.edits {
            match &edit.field {
                EditField::Material => self.material(edit, out)?,
                EditField::Density => self.density(edit, out)?,
                EditField::Importance(p) => self.importance(edit, p, out)?,
                EditField::Fill => self.fill(edit, out)?,
                EditField::Universe => {
                    let v = require_int(edit, 0, ElementKind::Universe.max_id())?;
                    set_param(out, self.card, self.layout, &["u"], "u", &v.to_string());
                }
                EditField::Transformation => {
                    let v = require_int(edit, 0, ElementKind::Transformation.max_id())?;
                    match self.layout.param(&["trcl"]).and_then(values_span) {
                        Some(span) => out.push(span, v.to_string()),
                        None => out.push(
                            self.card.raw.tail..self.card.raw.tail,
                            format!(" trcl={}", v),
                        ),
                    }
                }
            }
            applied += 1;
        }
        Ok(applied)
    }

    fn material(&self, edit: &AttributeEdit, out: &mut Replacements) -> Result<()> {
        let new = require_int(edit, 0, ElementKind::Material.max_id())?;
        let density_edit = self.find(&EditField::Density);

        let Some(material) = &self.layout.material else {
            // LIKE-BUT: keyword form.
            set_param(out, self.card, self.layout, &["mat"], "mat", &new.to_string());
            return Ok(());
        };
        let old = parse_int(&material.text).unwrap_or(0);

        match (old, new, &self.layout.density) {
            (0, 0, _) => out.push(material.span.clone(), "0"),
            (0, _, _) => {
                let rho = density_edit.ok_or_else(|| {
                    Error::edit_invalid(
                        edit.cell,
                        "mat",
                        "a void cell needs a 'rho' edit in the same batch",
                    )
                })?;
                require_real(rho)?;
                out.push(material.span.clone(), format!("{} {}", new, rho.value));
            }
            (_, 0, Some(density)) => {
                if density_edit.is_some() {
                    return Err(Error::edit_invalid(
                        edit.cell,
                        "rho",
                        "cannot set a density on a cell made void",
                    ));
                }
                out.push(material.span.start..density.span.end, "0");
            }
            _ => out.push(material.span.clone(), new.to_string()),
        }
        Ok(())
    }

    fn density(&self, edit: &AttributeEdit, out: &mut Replacements) -> Result<()> {
        require_real(edit)?;

        if self.layout.material.is_none() {
            set_param(out, self.card, self.layout, &["rho"], "rho", &edit.value);
            return Ok(());
        }

        // Void transitions are written by the material edit.
        if let Some(material_edit) = self.find(&EditField::Material) {
            let material = self.layout.material.as_ref().and_then(|w| parse_int(&w.text));
            if material == Some(0) {
                if parse_int(material_edit.value.trim()) == Some(0) {
                    return Err(Error::edit_invalid(
                        edit.cell,
                        "rho",
                        "cannot set a density on a cell that stays void",
                    ));
                }
                return Ok(());
            }
        }

        match &self.layout.density {
            Some(word) => {
                out.push(word.span.clone(), edit.value.clone());
                Ok(())
            }
            None => Err(Error::edit_invalid(
                edit.cell,
                "rho",
                "a void cell has no density; set 'mat' as well",
            )),
        }
    }

    fn importance(&self, edit: &AttributeEdit, particle: &str, out: &mut Replacements) -> Result<()> {
        require_real(edit)?;
        let tail = self.card.raw.tail;

        let found = self.layout.params.iter().find_map(|p| {
            let particles = p.particles()?;
            particles.iter().any(|x| x == particle).then_some((p, particles))
        });

        match found {
            Some((param, particles)) if particles.len() == 1 => match param.values.first() {
                Some(word) => out.push(word.span.clone(), edit.value.clone()),
                None => {
                    return Err(Error::edit_invalid(
                        edit.cell,
                        edit.field.to_string(),
                        "importance keyword has no value",
                    ))
                }
            },
            Some((param, particles)) => {
                let rest: Vec<&str> = particles
                    .iter()
                    .filter(|x| x.as_str() != particle)
                    .map(|x| x.as_str())
                    .collect();
                let prefix = &param.keyword.text[..param.keyword.text.len() - param.name().len()];
                out.push(
                    param.keyword.span.clone(),
                    format!("{}imp:{}", prefix, rest.join(",")),
                );
                out.push(tail..tail, format!(" imp:{}={}", particle, edit.value));
            }
            None => out.push(tail..tail, format!(" imp:{}={}", particle, edit.value)),
        }
        Ok(())
    }

    fn fill(&self, edit: &AttributeEdit, out: &mut Replacements) -> Result<()> {
        let new = require_int(edit, 0, ElementKind::Universe.max_id())?;

        let Some(param) = self.layout.param(&["fill"]) else {
            let tail = self.card.raw.tail;
            out.push(tail..tail, format!(" fill={}", new));
            return Ok(());
        };
        let Some(first) = param.values.first() else {
            return Err(Error::edit_invalid(edit.cell, "fill", "fill keyword has no value"));
        };
        if first.text.contains(':') {
            return Err(Error::edit_invalid(
                edit.cell,
                "fill",
                "lattice array fills cannot be edited as a single universe",
            ));
        }

        let universe_len = first.text.find('(').unwrap_or(first.text.len());
        let span = first.span.start..first.span.start + universe_len;
        if universe_len == 0 {
            out.push(span, format!("{} ", new));
        } else {
            out.push(span, new.to_string());
        }
        Ok(())
    }
}

fn group_edits<'a>(
    edits: &'a [AttributeEdit],
    cards: &'a [Card],
    index: &ReferenceIndex,
) -> Result<Vec<CellEdits<'a>>> {
    let mut seen: HashSet<(i64, &EditField)> = HashSet::new();
    let mut groups: Vec<CellEdits<'a>> = Vec::new();

    for edit in edits {
        if !seen.insert((edit.cell, &edit.field)) {
            return Err(Error::edit_invalid(
                edit.cell,
                edit.field.to_string(),
                "the same attribute is edited twice",
            ));
        }

        let card = index
            .definition(ElementKind::Cell, edit.cell)
            .map(|o| &cards[o.card])
            .ok_or_else(|| Error::edit_target_not_found(edit.cell, edit.field.to_string()))?;
        let layout = card
            .cell
            .as_ref()
            .ok_or_else(|| Error::edit_target_not_found(edit.cell, edit.field.to_string()))?;

        match groups.iter_mut().find(|g| g.card.id == Some(edit.cell)) {
            Some(group) => group.edits.push(edit),
            None => groups.push(CellEdits {
                card,
                layout,
                edits: vec![edit],
            }),
        }
    }

    Ok(groups)
}

// ============================================================================
// Entry point
// ============================================================================

/// Apply `renumbering` to every indexed occurrence and `edits` to their cells'
/// defining cards. An edit supersedes any renumbering of the span it touches.
pub fn rewrite(
    source: &str,
    cards: &[Card],
    index: &ReferenceIndex,
    renumbering: &Renumbering,
    edits: &[AttributeEdit],
) -> Result<Rewrite> {
    let mut out = Replacements::default();

    let mut edited = 0;
    for group in group_edits(edits, cards, index)? {
        edited += group.apply(&mut out)?;
    }

    let mut renumbered = 0;
    for occurrence in index.iter() {
        let new = renumbering
            .map(occurrence.kind, occurrence.value)
            .ok_or_else(|| {
                Error::rewrite_inconsistent(format!(
                    "{} {} has no entry in the mapping",
                    occurrence.kind, occurrence.value
                ))
            })?;
        if new == occurrence.value {
            continue;
        }
        if out.overlaps(&occurrence.span) {
            continue;
        }
        out.push(occurrence.span.clone(), new.to_string());
        renumbered += 1;
    }

    let text = out.apply(source)?;
    let long_lines = grown_past_limit(source, &text);

    Ok(Rewrite {
        text,
        renumbered,
        edited,
        long_lines,
    })
}

// ============================================================================
// Tests
// ============================================================================
