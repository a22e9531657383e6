//! Deck model and the renumber/edit pipeline.
//!
//! `Deck::parse` runs segmentation, classification, and indexing once; the
//! result is read-only. `Deck::apply` computes and validates a renumbering,
//! then rewrites a copy of the source. Nothing is written anywhere until the
//! whole pipeline has succeeded.

pub mod attributes;
pub mod classify;
pub mod index;
pub mod kind;
pub mod renumber;
pub mod rewrite;
pub mod segment;
pub mod usage;

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;

use serde::Serialize;

pub use attributes::{AttributeView, CellAttributes, Literal};
pub use classify::{Card, CardKind, Field};
pub use index::{Occurrence, ReferenceIndex};
pub use kind::{ElementKind, Role};
pub use renumber::{compute_mapping, Piece, RenumberPlan, RenumberRule, Renumbering, Violation};
pub use rewrite::{AttributeEdit, EditField, Rewrite};
pub use usage::{usage_report, UsageReport};

use crate::error::Result;
use crate::utils::io;

#[derive(Debug)]
pub struct Deck {
    source: String,
    title: Option<Range<usize>>,
    cards: Vec<Card>,
    index: ReferenceIndex,
    view: AttributeView,
}

/// Counts reported by `check`.
#[derive(Debug, Clone, Serialize)]
pub struct DeckSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub cards: usize,
    pub occurrences: usize,
    pub identifiers: BTreeMap<ElementKind, usize>,
    pub dangling: BTreeMap<ElementKind, Vec<i64>>,
}

/// Output of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct Applied {
    pub text: String,
    pub renumbering: Renumbering,
    pub rewrite: Rewrite,
}

impl Deck {
    pub fn parse(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let segmented = segment::segment(&source)?;
        let cards = classify::classify(segmented.cards)?;
        let index = ReferenceIndex::build(&cards)?;
        let view = AttributeView::build(&cards);

        log_status!(
            "deck",
            "{} cards, {} occurrences",
            cards.len(),
            index.len()
        );

        Ok(Deck {
            source,
            title: segmented.title,
            cards,
            index,
            view,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = io::read_file(path, "read deck")?;
        Self::parse(source)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn title(&self) -> Option<&str> {
        self.title.clone().and_then(|span| self.source.get(span))
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn index(&self) -> &ReferenceIndex {
        &self.index
    }

    pub fn view(&self) -> &AttributeView {
        &self.view
    }

    pub fn usage(&self) -> UsageReport {
        usage_report(&self.index)
    }

    pub fn summary(&self) -> DeckSummary {
        let mut identifiers = BTreeMap::new();
        let mut dangling = BTreeMap::new();
        for kind in ElementKind::ALL {
            let count = self.index.values(kind).len();
            if count > 0 {
                identifiers.insert(kind, count);
            }
            let missing = self.index.dangling(kind);
            if !missing.is_empty() {
                dangling.insert(kind, missing);
            }
        }

        DeckSummary {
            title: self.title().map(|t| t.trim_end().to_string()),
            cards: self.cards.len(),
            occurrences: self.index.len(),
            identifiers,
            dangling,
        }
    }

    /// `u=0` edits for every cell that is in the real world only implicitly.
    /// Cells inheriting a universe through LIKE BUT are left alone.
    pub fn explicit_universe_edits(&self) -> Vec<AttributeEdit> {
        self.view
            .iter()
            .filter(|cell| cell.universe.is_none())
            .map(|cell| AttributeEdit::new(cell.id, EditField::Universe, "0"))
            .collect()
    }

    /// Validate `plan` against this deck without rewriting anything.
    pub fn mapping(&self, plan: &RenumberPlan) -> Result<Renumbering> {
        compute_mapping(plan, &self.index)
    }

    /// Renumber and edit. Fails atomically; on success the original deck is
    /// untouched and the new text is returned.
    pub fn apply(&self, plan: &RenumberPlan, edits: &[AttributeEdit]) -> Result<Applied> {
        let renumbering = self.mapping(plan)?;
        let rewrite = rewrite::rewrite(&self.source, &self.cards, &self.index, &renumbering, edits)?;

        log_status!(
            "renum",
            "{} occurrence(s) renumbered, {} edit(s) applied",
            rewrite.renumbered,
            rewrite.edited
        );
        if !rewrite.long_lines.is_empty() {
            log_status!(
                "renum",
                "Warning: {} line(s) now exceed 80 columns: {:?}",
                rewrite.long_lines.len(),
                rewrite.long_lines
            );
        }

        Ok(Applied {
            text: rewrite.text.clone(),
            renumbering,
            rewrite,
        })
    }
}
