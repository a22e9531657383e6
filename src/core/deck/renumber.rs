//! Renumbering rules and the validated old-to-new mapping they produce.
//!
//! A rule is materialized over exactly the identifiers present in the deck,
//! then the whole batch is checked as if applied at once: two identifiers
//! landing on one value is a collision whether or not either of them moved.
//! Every violation is collected before failing.
//!
//! Tally rules act on the prefix (`id / 10`); the last digit is the tally
//! type and is carried over unchanged.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::index::ReferenceIndex;
use super::kind::ElementKind;
use crate::error::{to_details, Error, ErrorCode, Result};

// ============================================================================
// Rules
// ============================================================================

/// One contiguous piece of a piecewise rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub from: i64,
    pub to: i64,
    pub offset: i64,
}

impl Piece {
    pub fn contains(&self, value: i64) -> bool {
        (self.from..=self.to).contains(&value)
    }
}

fn default_start() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenumberRule {
    /// Old-to-new pairs; must cover every identifier present.
    Explicit(Vec<(i64, i64)>),
    /// Add a constant to every identifier.
    Offset(i64),
    /// Move `[from, to]` so that it starts at `start`; others stay put.
    Range { from: i64, to: i64, start: i64 },
    /// First matching piece wins; anything else gets `default_offset`.
    Piecewise {
        ranges: Vec<Piece>,
        #[serde(default)]
        default_offset: i64,
    },
    /// Number identifiers by first appearance in the deck.
    Sequential {
        #[serde(default = "default_start")]
        start: i64,
    },
}

impl RenumberRule {
    /// Structural problems independent of the deck.
    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match self {
            RenumberRule::Explicit(pairs) => {
                let mut seen: HashMap<i64, i64> = HashMap::new();
                for &(old, new) in pairs {
                    if let Some(&prev) = seen.get(&old) {
                        if prev != new {
                            problems.push(format!(
                                "identifier {} is mapped to both {} and {}",
                                old, prev, new
                            ));
                        }
                    }
                    seen.insert(old, new);
                }
            }
            RenumberRule::Range { from, to, .. } if from > to => {
                problems.push(format!("range {} -- {} is empty", from, to));
            }
            RenumberRule::Piecewise { ranges, .. } => {
                for piece in ranges.iter().filter(|p| p.from > p.to) {
                    problems.push(format!("range {} -- {} is empty", piece.from, piece.to));
                }
            }
            _ => {}
        }
        problems
    }

    /// Materialize the rule over `domain`, listed in first-appearance order.
    /// Values an explicit rule omits are left out of the returned map. Fails
    /// with a problem description when a new value does not fit in an `i64`.
    fn materialize(&self, domain: &[i64]) -> std::result::Result<BTreeMap<i64, i64>, String> {
        let overflow = |v: i64| format!("identifier {} overflows under this rule", v);
        match self {
            RenumberRule::Explicit(pairs) => {
                let pairs: HashMap<i64, i64> = pairs.iter().copied().collect();
                Ok(domain
                    .iter()
                    .filter_map(|v| pairs.get(v).map(|new| (*v, *new)))
                    .collect())
            }
            RenumberRule::Offset(d) => domain
                .iter()
                .map(|&v| v.checked_add(*d).map(|new| (v, new)).ok_or_else(|| overflow(v)))
                .collect(),
            RenumberRule::Range { from, to, start } => domain
                .iter()
                .map(|&v| {
                    if !(*from..=*to).contains(&v) {
                        return Ok((v, v));
                    }
                    v.checked_sub(*from)
                        .and_then(|shift| start.checked_add(shift))
                        .map(|new| (v, new))
                        .ok_or_else(|| overflow(v))
                })
                .collect(),
            RenumberRule::Piecewise {
                ranges,
                default_offset,
            } => domain
                .iter()
                .map(|&v| {
                    let offset = ranges
                        .iter()
                        .find(|p| p.contains(v))
                        .map_or(*default_offset, |p| p.offset);
                    v.checked_add(offset).map(|new| (v, new)).ok_or_else(|| overflow(v))
                })
                .collect(),
            RenumberRule::Sequential { start } => domain
                .iter()
                .enumerate()
                .map(|(i, &v)| {
                    i64::try_from(i)
                        .ok()
                        .and_then(|i| start.checked_add(i))
                        .map(|new| (v, new))
                        .ok_or_else(|| overflow(v))
                })
                .collect(),
        }
    }
}

/// Rules for the kinds the caller wants changed. Kinds without a rule keep
/// their identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenumberPlan {
    #[serde(default)]
    pub rules: BTreeMap<ElementKind, RenumberRule>,
}

impl RenumberPlan {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn with_rule(mut self, kind: ElementKind, rule: RenumberRule) -> Self {
        self.rules.insert(kind, rule);
        self
    }

    /// Overlay `other`'s rules onto this plan, replacing same-kind rules.
    pub fn merge(&mut self, other: RenumberPlan) {
        self.rules.extend(other.rules);
    }
}

// ============================================================================
// Violations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Violation {
    /// Several identifiers land on one value. `untouched` lists the ones the
    /// rule left in place.
    Collision {
        kind: ElementKind,
        target: i64,
        sources: Vec<i64>,
        untouched: Vec<i64>,
    },
    /// A moved identifier is referenced but never defined.
    Dangling {
        kind: ElementKind,
        value: i64,
        new_value: i64,
    },
    /// An explicit rule omits an identifier present in the deck.
    Unmapped { kind: ElementKind, value: i64 },
    OutOfRange {
        kind: ElementKind,
        value: i64,
        new_value: i64,
    },
    InvalidRule { kind: ElementKind, problem: String },
}

impl Violation {
    fn code(&self) -> ErrorCode {
        match self {
            Violation::Collision { .. } => ErrorCode::RenumberCollision,
            Violation::Dangling { .. } => ErrorCode::RenumberDanglingReference,
            _ => ErrorCode::RenumberInvalidRule,
        }
    }
}

/// Headline code for a violation set: collision, then dangling, then rule.
fn headline(violations: &[Violation]) -> ErrorCode {
    let codes: Vec<ErrorCode> = violations.iter().map(Violation::code).collect();
    [
        ErrorCode::RenumberCollision,
        ErrorCode::RenumberDanglingReference,
    ]
    .into_iter()
    .find(|c| codes.contains(c))
    .unwrap_or(ErrorCode::RenumberInvalidRule)
}

// ============================================================================
// Mapping
// ============================================================================

/// The validated mapping. For tallies the map is keyed by prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Renumbering {
    maps: BTreeMap<ElementKind, BTreeMap<i64, i64>>,
}

fn domain_value(kind: ElementKind, value: i64) -> i64 {
    match kind {
        ElementKind::Tally => value / 10,
        _ => value,
    }
}

fn compose(kind: ElementKind, value: i64, mapped_domain: i64) -> Option<i64> {
    match kind {
        ElementKind::Tally => mapped_domain.checked_mul(10)?.checked_add(value % 10),
        _ => Some(mapped_domain),
    }
}

impl Renumbering {
    /// New value for an identifier. Kinds without a rule map to themselves;
    /// `None` means a ruled kind has no entry for the value.
    pub fn map(&self, kind: ElementKind, value: i64) -> Option<i64> {
        match self.maps.get(&kind) {
            None => Some(value),
            Some(map) => map
                .get(&domain_value(kind, value))
                .and_then(|&new| compose(kind, value, new)),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.maps
            .values()
            .all(|map| map.iter().all(|(old, new)| old == new))
    }

    /// Kinds that carry a rule.
    pub fn kinds(&self) -> impl Iterator<Item = ElementKind> + '_ {
        self.maps.keys().copied()
    }

    /// Domain values that actually move (tally prefixes for tallies).
    pub fn moved(&self, kind: ElementKind) -> Vec<(i64, i64)> {
        self.maps
            .get(&kind)
            .map(|map| {
                map.iter()
                    .filter(|(old, new)| old != new)
                    .map(|(old, new)| (*old, *new))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Render as a map file. With `reverse`, each line maps the new value back
    /// to the old one, so applying the file undoes this renumbering.
    pub fn to_map_file(&self, reverse: bool) -> String {
        let mut out = String::new();

        for kind in self.kinds() {
            let mut pairs = self.moved(kind);
            if pairs.is_empty() {
                continue;
            }
            if reverse {
                pairs = pairs.into_iter().map(|(old, new)| (new, old)).collect();
                pairs.sort();
            }
            out.push_str(&format!("{} {}\n", "-".repeat(40), kind.name()));
            for (from, to) in pairs {
                out.push_str(&format!("{:<2} {:>8}: {:>8}\n", kind.letter(), from, to));
            }
        }

        out
    }
}

/// Materialize and validate every rule in `plan` against the indexed deck.
pub fn compute_mapping(plan: &RenumberPlan, index: &ReferenceIndex) -> Result<Renumbering> {
    let mut violations = Vec::new();
    let mut renumbering = Renumbering::default();

    for (&kind, rule) in &plan.rules {
        let problems = rule.problems();
        if !problems.is_empty() {
            violations.extend(
                problems
                    .into_iter()
                    .map(|problem| Violation::InvalidRule { kind, problem }),
            );
            continue;
        }

        let mut domain: Vec<i64> = Vec::new();
        for value in index.first_appearance(kind) {
            let d = domain_value(kind, value);
            if !domain.contains(&d) {
                domain.push(d);
            }
        }
        let map = match rule.materialize(&domain) {
            Ok(map) => map,
            Err(problem) => {
                violations.push(Violation::InvalidRule { kind, problem });
                continue;
            }
        };

        let observed = index.values(kind);
        let mut targets: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        let dangling: BTreeSet<i64> = index.dangling(kind).into_iter().collect();

        for &value in &observed {
            let Some(&new_domain) = map.get(&domain_value(kind, value)) else {
                violations.push(Violation::Unmapped { kind, value });
                continue;
            };
            let Some(new_value) = compose(kind, value, new_domain) else {
                violations.push(Violation::InvalidRule {
                    kind,
                    problem: format!("identifier {} overflows under this rule", value),
                });
                continue;
            };
            if !kind.is_valid_id(new_value) {
                violations.push(Violation::OutOfRange {
                    kind,
                    value,
                    new_value,
                });
            }
            if new_value != value && dangling.contains(&value) {
                violations.push(Violation::Dangling {
                    kind,
                    value,
                    new_value,
                });
            }
            targets.entry(new_value).or_default().push(value);
        }

        for (target, sources) in targets.into_iter().filter(|(_, s)| s.len() > 1) {
            let untouched = sources.iter().copied().filter(|&s| s == target).collect();
            violations.push(Violation::Collision {
                kind,
                target,
                sources,
                untouched,
            });
        }

        renumbering.maps.insert(kind, map);
    }

    if violations.is_empty() {
        return Ok(renumbering);
    }

    let code = headline(&violations);
    let count = violations.len();
    Err(Error::renumber_rejected(code, to_details(violations), count))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::classify::classify;
    use crate::deck::segment::segment;

    const DECK: &str = "title
10 5 -7.8 -1 2
20 0 1 -3
30 0 3

1 so 5
2 px 3
3 py 4

m5 1001 1
f14:n 10 30
f24:n 20
fc14 flux
";

    fn index() -> ReferenceIndex {
        let cards = classify(segment(DECK).unwrap().cards).unwrap();
        ReferenceIndex::build(&cards).unwrap()
    }

    fn plan(kind: ElementKind, rule: RenumberRule) -> RenumberPlan {
        RenumberPlan::default().with_rule(kind, rule)
    }

    // ========================================================================
    // Rule kinds
    // ========================================================================

    #[test]
    fn offset_moves_every_identifier() {
        let r = compute_mapping(&plan(ElementKind::Cell, RenumberRule::Offset(100)), &index())
            .unwrap();
        assert_eq!(r.map(ElementKind::Cell, 10), Some(110));
        assert_eq!(r.map(ElementKind::Cell, 30), Some(130));
        assert_eq!(r.map(ElementKind::Surface, 3), Some(3));
    }

    #[test]
    fn range_leaves_outside_values() {
        let rule = RenumberRule::Range {
            from: 2,
            to: 3,
            start: 102,
        };
        let r = compute_mapping(&plan(ElementKind::Surface, rule), &index()).unwrap();
        assert_eq!(r.map(ElementKind::Surface, 1), Some(1));
        assert_eq!(r.map(ElementKind::Surface, 2), Some(102));
        assert_eq!(r.map(ElementKind::Surface, 3), Some(103));
    }

    #[test]
    fn piecewise_uses_first_match_then_default() {
        let rule = RenumberRule::Piecewise {
            ranges: vec![Piece {
                from: 10,
                to: 20,
                offset: 5,
            }],
            default_offset: 100,
        };
        let r = compute_mapping(&plan(ElementKind::Cell, rule), &index()).unwrap();
        assert_eq!(r.map(ElementKind::Cell, 10), Some(15));
        assert_eq!(r.map(ElementKind::Cell, 20), Some(25));
        assert_eq!(r.map(ElementKind::Cell, 30), Some(130));
    }

    #[test]
    fn sequential_follows_first_appearance() {
        let r = compute_mapping(
            &plan(ElementKind::Surface, RenumberRule::Sequential { start: 1 }),
            &index(),
        )
        .unwrap();
        assert!(r.is_identity());

        let r = compute_mapping(
            &plan(ElementKind::Cell, RenumberRule::Sequential { start: 1 }),
            &index(),
        )
        .unwrap();
        assert_eq!(r.map(ElementKind::Cell, 10), Some(1));
        assert_eq!(r.map(ElementKind::Cell, 20), Some(2));
        assert_eq!(r.map(ElementKind::Cell, 30), Some(3));
    }

    // ========================================================================
    // Tallies
    // ========================================================================

    #[test]
    fn tally_rule_acts_on_prefix() {
        let r = compute_mapping(&plan(ElementKind::Tally, RenumberRule::Offset(2)), &index())
            .unwrap();
        assert_eq!(r.map(ElementKind::Tally, 14), Some(34));
        assert_eq!(r.map(ElementKind::Tally, 24), Some(44));
    }

    #[test]
    fn tally_explicit_pair_keeps_digit() {
        let rule = RenumberRule::Explicit(vec![(1, 5), (2, 6)]);
        let r = compute_mapping(&plan(ElementKind::Tally, rule), &index()).unwrap();
        assert_eq!(r.map(ElementKind::Tally, 14), Some(54));
        assert_eq!(r.map(ElementKind::Tally, 24), Some(64));
    }

    // ========================================================================
    // Violations
    // ========================================================================

    #[test]
    fn explicit_collision_names_both_sources() {
        let rule = RenumberRule::Explicit(vec![(1, 9), (2, 9), (3, 3)]);
        let err = compute_mapping(&plan(ElementKind::Surface, rule), &index()).unwrap_err();
        assert_eq!(err.code, ErrorCode::RenumberCollision);
        let v = &err.details["violations"][0];
        assert_eq!(v["type"], "collision");
        assert_eq!(v["sources"], serde_json::json!([1, 2]));
        assert_eq!(v["target"], 9);
    }

    #[test]
    fn collision_with_untouched_identifier() {
        let rule = RenumberRule::Range {
            from: 1,
            to: 1,
            start: 3,
        };
        let err = compute_mapping(&plan(ElementKind::Surface, rule), &index()).unwrap_err();
        let v = &err.details["violations"][0];
        assert_eq!(v["sources"], serde_json::json!([1, 3]));
        assert_eq!(v["untouched"], serde_json::json!([3]));
    }

    #[test]
    fn swap_is_not_a_collision() {
        let rule = RenumberRule::Explicit(vec![(1, 2), (2, 1), (3, 3)]);
        let r = compute_mapping(&plan(ElementKind::Surface, rule), &index()).unwrap();
        assert_eq!(r.map(ElementKind::Surface, 1), Some(2));
        assert_eq!(r.map(ElementKind::Surface, 2), Some(1));
    }

    #[test]
    fn all_collisions_reported_in_one_pass() {
        let rule = RenumberRule::Explicit(vec![(10, 1), (20, 1), (30, 1)]);
        let err = compute_mapping(&plan(ElementKind::Cell, rule), &index()).unwrap_err();
        assert_eq!(err.details["count"], 1);
        assert_eq!(
            err.details["violations"][0]["sources"],
            serde_json::json!([10, 20, 30])
        );
    }

    #[test]
    fn explicit_rule_must_cover_present_ids() {
        let rule = RenumberRule::Explicit(vec![(1, 11)]);
        let err = compute_mapping(&plan(ElementKind::Surface, rule), &index()).unwrap_err();
        assert_eq!(err.code, ErrorCode::RenumberInvalidRule);
        let types: Vec<&str> = err.details["violations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["type"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["unmapped", "unmapped"]);
    }

    #[test]
    fn out_of_range_targets() {
        let err = compute_mapping(&plan(ElementKind::Cell, RenumberRule::Offset(-10)), &index())
            .unwrap_err();
        let v = &err.details["violations"][0];
        assert_eq!(v["type"], "out_of_range");
        assert_eq!(v["value"], 10);
        assert_eq!(v["new_value"], 0);
    }

    #[test]
    fn dangling_reference_under_active_rule() {
        let cards = classify(
            segment("title\n10 0 -1 -7\n\n1 so 5\n\nnps 1\n")
                .unwrap()
                .cards,
        )
        .unwrap();
        let index = ReferenceIndex::build(&cards).unwrap();
        let err = compute_mapping(&plan(ElementKind::Surface, RenumberRule::Offset(10)), &index)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::RenumberDanglingReference);
        assert_eq!(err.details["violations"][0]["value"], 7);

        // Dangling but not moved is fine.
        let rule = RenumberRule::Range {
            from: 1,
            to: 1,
            start: 2,
        };
        assert!(compute_mapping(&plan(ElementKind::Surface, rule), &index).is_ok());
    }

    #[test]
    fn invalid_rule_shape() {
        let rule = RenumberRule::Range {
            from: 5,
            to: 1,
            start: 10,
        };
        let err = compute_mapping(&plan(ElementKind::Cell, rule), &index()).unwrap_err();
        assert_eq!(err.code, ErrorCode::RenumberInvalidRule);
        assert_eq!(err.details["violations"][0]["type"], "invalid_rule");
    }

    #[test]
    fn overflowing_targets_are_invalid_rules() {
        let rules = [
            (ElementKind::Cell, RenumberRule::Offset(i64::MAX)),
            (
                ElementKind::Surface,
                RenumberRule::Range {
                    from: i64::MIN,
                    to: 3,
                    start: 0,
                },
            ),
            (ElementKind::Cell, RenumberRule::Sequential { start: i64::MAX }),
            (ElementKind::Tally, RenumberRule::Offset(i64::MAX / 10)),
        ];
        for (kind, rule) in rules {
            let err = compute_mapping(&plan(kind, rule), &index()).unwrap_err();
            assert_eq!(err.code, ErrorCode::RenumberInvalidRule);
            let v = &err.details["violations"][0];
            assert_eq!(v["type"], "invalid_rule");
            assert!(v["problem"].as_str().unwrap().contains("overflows"));
        }
    }

    #[test]
    fn collision_outranks_other_violations() {
        let plan = RenumberPlan::default()
            .with_rule(ElementKind::Cell, RenumberRule::Offset(-10))
            .with_rule(
                ElementKind::Surface,
                RenumberRule::Explicit(vec![(1, 2), (2, 2), (3, 3)]),
            );
        let err = compute_mapping(&plan, &index()).unwrap_err();
        assert_eq!(err.code, ErrorCode::RenumberCollision);
    }

    // ========================================================================
    // Map file output
    // ========================================================================

    #[test]
    fn map_file_reverses_by_default() {
        let r = compute_mapping(&plan(ElementKind::Cell, RenumberRule::Offset(100)), &index())
            .unwrap();
        let text = r.to_map_file(true);
        assert!(text.contains("c       110:       10"));
        let forward = r.to_map_file(false);
        assert!(forward.contains("c        10:      110"));
    }

    #[test]
    fn plan_deserializes_from_json() {
        let json = r#"{"rules": {"cell": {"offset": 100}, "tally": {"explicit": [[1, 5]]}, "surface": {"sequential": {}}}}"#;
        let plan: RenumberPlan = serde_json::from_str(json).unwrap();
        assert_eq!(plan.rules[&ElementKind::Cell], RenumberRule::Offset(100));
        assert_eq!(
            plan.rules[&ElementKind::Tally],
            RenumberRule::Explicit(vec![(1, 5)])
        );
        assert_eq!(
            plan.rules[&ElementKind::Surface],
            RenumberRule::Sequential { start: 1 }
        );
    }
}
