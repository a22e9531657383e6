//! Element namespaces and occurrence roles.

use serde::{Deserialize, Serialize};

/// A numbered element namespace. Two kinds may reuse the same value freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Cell,
    Surface,
    Material,
    Transformation,
    Tally,
    Distribution,
    Universe,
}

impl ElementKind {
    pub const ALL: [ElementKind; 7] = [
        ElementKind::Cell,
        ElementKind::Surface,
        ElementKind::Material,
        ElementKind::Transformation,
        ElementKind::Tally,
        ElementKind::Distribution,
        ElementKind::Universe,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::Cell => "cell",
            ElementKind::Surface => "surface",
            ElementKind::Material => "material",
            ElementKind::Transformation => "transformation",
            ElementKind::Tally => "tally",
            ElementKind::Distribution => "distribution",
            ElementKind::Universe => "universe",
        }
    }

    /// Short letter used in map files.
    pub fn letter(&self) -> &'static str {
        match self {
            ElementKind::Cell => "c",
            ElementKind::Surface => "s",
            ElementKind::Material => "m",
            ElementKind::Transformation => "tr",
            ElementKind::Tally => "f",
            ElementKind::Distribution => "d",
            ElementKind::Universe => "u",
        }
    }

    /// Accepts full names, common abbreviations, and map-file letters.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "c" | "cel" | "cell" | "cells" => Some(ElementKind::Cell),
            "s" | "sur" | "surf" | "surface" | "surfaces" => Some(ElementKind::Surface),
            "m" | "mat" | "material" | "materials" => Some(ElementKind::Material),
            "tr" | "transformation" | "transformations" => Some(ElementKind::Transformation),
            "f" | "tal" | "tally" | "tallies" => Some(ElementKind::Tally),
            "d" | "dist" | "distribution" | "distributions" => Some(ElementKind::Distribution),
            "u" | "universe" | "universes" => Some(ElementKind::Universe),
            _ => None,
        }
    }

    /// Largest identifier the input format accepts for this kind.
    pub fn max_id(&self) -> i64 {
        match self {
            ElementKind::Transformation | ElementKind::Distribution => 999,
            _ => 99_999_999,
        }
    }

    /// Smallest identifier a rule may produce. Universe 0 is the real world.
    pub fn min_id(&self) -> i64 {
        match self {
            ElementKind::Universe => 0,
            _ => 1,
        }
    }

    pub fn is_valid_id(&self, value: i64) -> bool {
        (self.min_id()..=self.max_id()).contains(&value)
    }

    /// Universes are never defined by a card of their own; `u=N` on a cell
    /// establishes membership instead.
    pub fn has_defining_card(&self) -> bool {
        !matches!(self, ElementKind::Universe)
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How an identifier occurrence relates to its element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The single card that describes the element.
    Definition,
    /// A link to an element described elsewhere.
    Reference,
    /// `u=N` on a cell card.
    Membership,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_letters_and_names() {
        assert_eq!(ElementKind::parse("c"), Some(ElementKind::Cell));
        assert_eq!(ElementKind::parse("Surface"), Some(ElementKind::Surface));
        assert_eq!(ElementKind::parse("tr"), Some(ElementKind::Transformation));
        assert_eq!(ElementKind::parse("f"), Some(ElementKind::Tally));
        assert_eq!(ElementKind::parse("x"), None);
    }

    #[test]
    fn letters_round_trip() {
        for kind in ElementKind::ALL {
            assert_eq!(ElementKind::parse(kind.letter()), Some(kind));
        }
    }

    #[test]
    fn limits() {
        assert!(ElementKind::Transformation.is_valid_id(999));
        assert!(!ElementKind::Transformation.is_valid_id(1000));
        assert!(!ElementKind::Cell.is_valid_id(0));
        assert!(ElementKind::Cell.is_valid_id(99_999_999));
        assert!(ElementKind::Universe.is_valid_id(0));
        assert!(!ElementKind::Universe.is_valid_id(-1));
    }
}
