//! Cross-reference index: every identifier occurrence, per kind and value.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::Range;

use serde::Serialize;

use super::classify::{Card, CardKind};
use super::kind::{ElementKind, Role};
use crate::error::{to_details, Error, Result};

/// One place an identifier appears.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Occurrence {
    pub kind: ElementKind,
    pub value: i64,
    /// Index into the deck's card list.
    pub card: usize,
    /// Index into the card's field list.
    pub field: usize,
    pub role: Role,
    pub negative: bool,
    #[serde(skip)]
    pub span: Range<usize>,
}

#[derive(Debug, Serialize)]
struct DuplicateDefinition {
    kind: ElementKind,
    id: i64,
    lines: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct ReferenceIndex {
    by_kind: BTreeMap<ElementKind, BTreeMap<i64, Vec<Occurrence>>>,
    /// First-appearance order per kind.
    order: BTreeMap<ElementKind, Vec<i64>>,
    total: usize,
}

/// An `sp`/`ds` card can stand in for a missing `si` card.
fn is_probability_card(card: &Card) -> bool {
    card.kind == CardKind::Distribution
        && card.raw.words.first().is_some_and(|w| {
            let lower = w.text.to_ascii_lowercase();
            lower.starts_with("sp") || lower.starts_with("ds")
        })
}

impl ReferenceIndex {
    /// Index every field of every card. Two definitions of one (kind, value)
    /// fail the whole build; all duplicates are reported together.
    pub fn build(cards: &[Card]) -> Result<Self> {
        let mut index = ReferenceIndex::default();

        for (card_idx, card) in cards.iter().enumerate() {
            for (field_idx, field) in card.fields.iter().enumerate() {
                let occurrence = Occurrence {
                    kind: field.kind,
                    value: field.value,
                    card: card_idx,
                    field: field_idx,
                    role: field.role,
                    negative: field.negative,
                    span: field.span.clone(),
                };
                let values = index.by_kind.entry(field.kind).or_default();
                let list = values.entry(field.value).or_default();
                if list.is_empty() {
                    index.order.entry(field.kind).or_default().push(field.value);
                }
                list.push(occurrence);
                index.total += 1;
            }
        }

        index.promote_probability_cards(cards);
        index.check_duplicates(cards)?;
        Ok(index)
    }

    fn promote_probability_cards(&mut self, cards: &[Card]) {
        let Some(values) = self.by_kind.get_mut(&ElementKind::Distribution) else {
            return;
        };
        for list in values.values_mut() {
            if list.iter().any(|o| o.role == Role::Definition) {
                continue;
            }
            if let Some(first) = list
                .iter_mut()
                .find(|o| o.field == 0 && is_probability_card(&cards[o.card]))
            {
                first.role = Role::Definition;
            }
        }
    }

    fn check_duplicates(&self, cards: &[Card]) -> Result<()> {
        let mut duplicates = Vec::new();

        for (kind, values) in &self.by_kind {
            for (value, list) in values {
                let lines: Vec<usize> = list
                    .iter()
                    .filter(|o| o.role == Role::Definition)
                    .map(|o| cards[o.card].raw.line)
                    .collect();
                if lines.len() > 1 {
                    duplicates.push(DuplicateDefinition {
                        kind: *kind,
                        id: *value,
                        lines,
                    });
                }
            }
        }

        if duplicates.is_empty() {
            return Ok(());
        }
        let count = duplicates.len();
        Err(Error::deck_duplicate_definition(to_details(duplicates), count))
    }

    /// Occurrences of one identifier, in deck order.
    pub fn occurrences(&self, kind: ElementKind, value: i64) -> &[Occurrence] {
        self.by_kind
            .get(&kind)
            .and_then(|values| values.get(&value))
            .map_or(&[], |list| list.as_slice())
    }

    /// Every occurrence of every kind.
    pub fn iter(&self) -> impl Iterator<Item = &Occurrence> {
        self.by_kind.values().flat_map(|values| values.values().flatten())
    }

    /// Total number of occurrences.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Sorted distinct values of a kind.
    pub fn values(&self, kind: ElementKind) -> BTreeSet<i64> {
        self.by_kind
            .get(&kind)
            .map(|values| values.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Distinct values in order of first appearance.
    pub fn first_appearance(&self, kind: ElementKind) -> Vec<i64> {
        self.order.get(&kind).cloned().unwrap_or_default()
    }

    /// The defining occurrence, or the first membership for universes.
    pub fn definition(&self, kind: ElementKind, value: i64) -> Option<&Occurrence> {
        self.occurrences(kind, value)
            .iter()
            .find(|o| matches!(o.role, Role::Definition | Role::Membership))
    }

    pub fn is_defined(&self, kind: ElementKind, value: i64) -> bool {
        self.definition(kind, value).is_some()
    }

    /// Values that are referenced but never defined.
    pub fn dangling(&self, kind: ElementKind) -> Vec<i64> {
        let Some(values) = self.by_kind.get(&kind) else {
            return Vec::new();
        };
        values
            .iter()
            .filter(|(_, list)| {
                !list
                    .iter()
                    .any(|o| matches!(o.role, Role::Definition | Role::Membership))
            })
            .map(|(value, _)| *value)
            .collect()
    }

    /// Cards holding at least one occurrence of `kind`.
    pub fn cards_with(&self, kind: ElementKind) -> HashSet<usize> {
        self.by_kind
            .get(&kind)
            .map(|values| values.values().flatten().map(|o| o.card).collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::classify::classify;
    use crate::deck::segment::segment;

    fn index_of(source: &str) -> Result<ReferenceIndex> {
        let cards = classify(segment(source)?.cards)?;
        ReferenceIndex::build(&cards)
    }

    const DECK: &str = "title
10 5 -7.8 -1 2 u=3
20 0 1 fill=3
30 0 -2 #10 u=3

1 so 5
2 px 3

m5 1001 1
f4:n 10 30
sdef cel=d1
sp1 1 1
";

    #[test]
    fn occurrences_in_deck_order() {
        let index = index_of(DECK).unwrap();
        let cell10 = index.occurrences(ElementKind::Cell, 10);
        assert_eq!(cell10.len(), 3);
        assert_eq!(cell10[0].role, Role::Definition);
        assert!(cell10[1..].iter().all(|o| o.role == Role::Reference));
        assert!(cell10.windows(2).all(|w| w[0].card <= w[1].card));
    }

    #[test]
    fn values_and_first_appearance() {
        let index = index_of(DECK).unwrap();
        assert_eq!(
            index.values(ElementKind::Cell).into_iter().collect::<Vec<_>>(),
            vec![10, 20, 30]
        );
        assert_eq!(index.first_appearance(ElementKind::Surface), vec![1, 2]);
        assert!(index.values(ElementKind::Transformation).is_empty());
    }

    #[test]
    fn universe_defined_by_membership() {
        let index = index_of(DECK).unwrap();
        assert!(index.is_defined(ElementKind::Universe, 3));
        assert!(index.dangling(ElementKind::Universe).is_empty());
    }

    #[test]
    fn probability_card_stands_in_for_missing_si() {
        let index = index_of(DECK).unwrap();
        assert!(index.is_defined(ElementKind::Distribution, 1));
    }

    #[test]
    fn dangling_lists_undefined_references() {
        let index = index_of(
            "title\n10 7 -1 -1 -9\n\n1 so 5\n\nm5 1001 1\n",
        )
        .unwrap();
        assert_eq!(index.dangling(ElementKind::Material), vec![7]);
        assert_eq!(index.dangling(ElementKind::Surface), vec![9]);
        assert!(index.dangling(ElementKind::Cell).is_empty());
    }

    #[test]
    fn duplicate_definitions_reported_together() {
        let err = index_of("title\n1 0 -1\n1 0 1\n\n1 so 5\n1 px 2\n\nnps 1\n").unwrap_err();
        assert_eq!(err.code.as_str(), "deck.duplicate_definition");
        assert_eq!(err.details["count"], 2);
        let dups = err.details["duplicates"].as_array().unwrap();
        assert_eq!(dups[0]["kind"], "cell");
        assert_eq!(dups[0]["lines"], serde_json::json!([2, 3]));
        assert_eq!(dups[1]["kind"], "surface");
    }

    #[test]
    fn len_counts_all_occurrences() {
        let index = index_of(DECK).unwrap();
        assert_eq!(index.len(), index.iter().count());
        assert!(!index.is_empty());
    }
}
