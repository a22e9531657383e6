//! Identifier usage report: which numbers each kind uses, as ranges.

use std::collections::BTreeSet;

use serde::Serialize;

use super::index::ReferenceIndex;
use super::kind::ElementKind;
use crate::utils::ranges::{compress, Span};

#[derive(Debug, Clone, Serialize)]
pub struct RangeUsage {
    pub first: i64,
    pub last: i64,
    pub len: i64,
    /// Unused numbers between the previous range and this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unused_before: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KindUsage {
    pub kind: ElementKind,
    pub count: usize,
    pub ranges: Vec<RangeUsage>,
    /// Tally numbers divided by ten, the values tally rules act on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefixes: Option<Vec<RangeUsage>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dangling: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub kinds: Vec<KindUsage>,
}

fn range_rows(values: &BTreeSet<i64>) -> Vec<RangeUsage> {
    let mut previous: Option<Span> = None;
    compress(values)
        .into_iter()
        .map(|span| {
            let usage = RangeUsage {
                first: span.first,
                last: span.last,
                len: span.len(),
                unused_before: previous.map(|p| span.first - p.last - 1),
            };
            previous = Some(span);
            usage
        })
        .collect()
}

pub fn usage_report(index: &ReferenceIndex) -> UsageReport {
    let kinds = ElementKind::ALL
        .iter()
        .map(|&kind| {
            let values = index.values(kind);
            let prefixes = (kind == ElementKind::Tally && !values.is_empty()).then(|| {
                let prefixes: BTreeSet<i64> = values.iter().map(|v| v / 10).collect();
                range_rows(&prefixes)
            });

            KindUsage {
                kind,
                count: values.len(),
                ranges: range_rows(&values),
                prefixes,
                dangling: index.dangling(kind),
            }
        })
        .collect();

    UsageReport { kinds }
}

fn render_rows(out: &mut String, letter: &str, rows: &[RangeUsage]) {
    for range in rows {
        let span = Span {
            first: range.first,
            last: range.last,
        };
        let gap = range
            .unused_before
            .map(|g| g.to_string())
            .unwrap_or_default();
        out.push_str(&format!(
            "  {:>2} {:<28} {:>8} {:>8}\n",
            letter,
            span.to_string(),
            range.len,
            gap
        ));
    }
}

impl UsageReport {
    /// Plain-text rendering: one header per kind, then one line per range
    /// with its length and the gap before it.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for usage in self.kinds.iter().filter(|u| u.count > 0) {
            out.push_str(&format!(
                "{} {} {}\n",
                "-".repeat(40),
                usage.kind.name(),
                usage.count
            ));
            render_rows(&mut out, usage.kind.letter(), &usage.ranges);
            if let Some(prefixes) = &usage.prefixes {
                out.push_str("  tally rules act on these prefixes (number / 10):\n");
                render_rows(&mut out, usage.kind.letter(), prefixes);
            }
        }
        out
    }
}
