//! Read-only per-cell attribute view.
//!
//! Built once per loaded deck from the classified cards. LIKE n BUT cells
//! start from their base cell's resolved attributes and apply their own
//! parameters on top.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use super::classify::{Card, CellLayout, Param};
use super::kind::{ElementKind, Role};
use crate::utils::numeric::{parse_int, parse_real};

/// A literal number as written, plus its parsed value when it has one.
/// Density and importance are compared on the parsed value, sign included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Literal {
    pub text: String,
    pub value: Option<f64>,
}

impl Literal {
    fn new(text: &str) -> Self {
        Literal {
            text: text.to_string(),
            value: parse_real(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellAttributes {
    pub id: i64,
    /// 0 for void.
    pub material: i64,
    pub density: Option<Literal>,
    pub importances: BTreeMap<String, Literal>,
    /// Simple fill only; lattice-array fills leave this empty.
    pub fill: Option<i64>,
    pub universe: Option<i64>,
    pub transformation: Option<i64>,
    pub like: Option<i64>,
    pub surfaces: BTreeSet<i64>,
}

/// What one card says about its cell, before LIKE-BUT resolution.
#[derive(Debug, Clone, Default)]
struct OwnAttributes {
    like: Option<i64>,
    material: Option<i64>,
    density: Option<Literal>,
    importances: BTreeMap<String, Literal>,
    fill: Option<i64>,
    universe: Option<i64>,
    transformation: Option<i64>,
    surfaces: BTreeSet<i64>,
}

fn first_value(param: &Param) -> Option<&str> {
    param.values.first().map(|w| w.text.as_str())
}

fn simple_fill(param: &Param) -> Option<i64> {
    let first = first_value(param)?;
    if first.contains(':') {
        return None;
    }
    let universe = first.split('(').next()?;
    parse_int(universe)
}

fn own_attributes(card: &Card, layout: &CellLayout) -> OwnAttributes {
    let mut own = OwnAttributes {
        like: layout.like,
        material: layout.material.as_ref().and_then(|w| parse_int(&w.text)),
        density: layout.density.as_ref().map(|w| Literal::new(&w.text)),
        ..OwnAttributes::default()
    };

    for param in &layout.params {
        if let Some(particles) = param.particles() {
            if let Some(value) = first_value(param) {
                for p in particles {
                    own.importances.insert(p, Literal::new(value));
                }
            }
            continue;
        }
        match param.name().as_str() {
            "mat" => own.material = first_value(param).and_then(parse_int),
            "rho" => own.density = first_value(param).map(Literal::new),
            "u" => own.universe = first_value(param).and_then(parse_int),
            "fill" => own.fill = simple_fill(param),
            "trcl" if param.values.len() == 1 => {
                own.transformation = first_value(param).and_then(parse_int)
            }
            _ => {}
        }
    }

    if own.like.is_none() {
        own.surfaces = card
            .fields
            .iter()
            .filter(|f| f.kind == ElementKind::Surface && f.role == Role::Reference)
            .map(|f| f.value)
            .collect();
    }

    own
}

#[derive(Debug, Clone, Default)]
pub struct AttributeView {
    cells: BTreeMap<i64, CellAttributes>,
    order: Vec<i64>,
}

impl AttributeView {
    pub fn build(cards: &[Card]) -> Self {
        let mut own: BTreeMap<i64, OwnAttributes> = BTreeMap::new();
        let mut order = Vec::new();

        for card in cards {
            let (Some(id), Some(layout)) = (card.id, card.cell.as_ref()) else {
                continue;
            };
            own.insert(id, own_attributes(card, layout));
            order.push(id);
        }

        let cells = order
            .iter()
            .map(|&id| (id, resolve(id, &own, &mut HashSet::new())))
            .collect();

        AttributeView { cells, order }
    }

    pub fn attributes_of(&self, cell_id: i64) -> Option<&CellAttributes> {
        self.cells.get(&cell_id)
    }

    /// Cell ids in definition order.
    pub fn all_cell_ids(&self) -> &[i64] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellAttributes> {
        self.order.iter().filter_map(|id| self.cells.get(id))
    }
}

/// Attributes of `id` with LIKE-BUT chains followed. A chain that loops or
/// names a missing cell stops there.
fn resolve(id: i64, own: &BTreeMap<i64, OwnAttributes>, seen: &mut HashSet<i64>) -> CellAttributes {
    let mine = own.get(&id).cloned().unwrap_or_default();
    seen.insert(id);

    let base = mine
        .like
        .filter(|b| own.contains_key(b) && !seen.contains(b))
        .map(|b| resolve(b, own, seen));

    let Some(mut attrs) = base else {
        return CellAttributes {
            id,
            material: mine.material.unwrap_or(0),
            density: mine.density,
            importances: mine.importances,
            fill: mine.fill,
            universe: mine.universe,
            transformation: mine.transformation,
            like: mine.like,
            surfaces: mine.surfaces,
        };
    };

    attrs.id = id;
    attrs.like = mine.like;
    if let Some(m) = mine.material {
        attrs.material = m;
        if m == 0 {
            attrs.density = None;
        }
    }
    if mine.density.is_some() {
        attrs.density = mine.density;
    }
    attrs.importances.extend(mine.importances);
    attrs.fill = mine.fill.or(attrs.fill);
    attrs.universe = mine.universe.or(attrs.universe);
    attrs.transformation = mine.transformation.or(attrs.transformation);
    attrs
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::classify::classify;
    use crate::deck::segment::segment;

    fn view(cells: &str) -> AttributeView {
        let source = format!("title\n{}\n\n1 so 5\n2 px 1\n\nm1 1001 1\n", cells);
        AttributeView::build(&classify(segment(&source).unwrap().cards).unwrap())
    }

    #[test]
    fn plain_cell_attributes() {
        let v = view("10 1 -7.8 -1 2 imp:n,p=1 u=3 fill=4 (2)");
        let a = v.attributes_of(10).unwrap();
        assert_eq!(a.material, 1);
        let density = a.density.as_ref().unwrap();
        assert_eq!(density.text, "-7.8");
        assert_eq!(density.value, Some(-7.8));
        assert_eq!(a.importances["n"].text, "1");
        assert_eq!(a.importances["p"].text, "1");
        assert_eq!(a.universe, Some(3));
        assert_eq!(a.fill, Some(4));
        assert_eq!(a.surfaces, [1, 2].into_iter().collect());
    }

    #[test]
    fn void_cell_and_lattice_fill() {
        let v = view("20 0 -1 lat=1 fill=0:1 0:0 0:0 1 2");
        let a = v.attributes_of(20).unwrap();
        assert_eq!(a.material, 0);
        assert!(a.density.is_none());
        assert_eq!(a.fill, None);
    }

    #[test]
    fn like_but_inherits_and_overrides() {
        let v = view("10 1 -7.8 -1 imp:n=1 trcl=2\n11 like 10 but mat=0 imp:n=4\n12 like 11 but u=5");
        let a = v.attributes_of(11).unwrap();
        assert_eq!(a.like, Some(10));
        assert_eq!(a.material, 0);
        assert!(a.density.is_none());
        assert_eq!(a.importances["n"].text, "4");
        assert_eq!(a.transformation, Some(2));
        assert_eq!(a.surfaces, [1].into_iter().collect());

        let b = v.attributes_of(12).unwrap();
        assert_eq!(b.universe, Some(5));
        assert_eq!(b.importances["n"].text, "4");
    }

    #[test]
    fn like_cycle_stops() {
        let v = view("1 like 2 but u=1\n2 like 1 but u=2");
        assert_eq!(v.attributes_of(1).unwrap().universe, Some(1));
        assert_eq!(v.attributes_of(2).unwrap().universe, Some(2));
    }

    #[test]
    fn cell_ids_in_definition_order() {
        let v = view("30 0 -1\n10 0 -2\n20 0 1");
        assert_eq!(v.all_cell_ids(), &[30, 10, 20]);
        assert_eq!(v.iter().count(), 3);
        assert!(v.attributes_of(99).is_none());
    }
}
