//! Contiguous-range compression for integer sets.

use serde::Serialize;
use std::collections::BTreeSet;

/// An inclusive run of consecutive integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub first: i64,
    pub last: i64,
}

impl Span {
    pub fn len(&self) -> i64 {
        self.last - self.first + 1
    }

    pub fn is_single(&self) -> bool {
        self.first == self.last
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.first)
        } else {
            write!(f, "{} -- {}", self.first, self.last)
        }
    }
}

/// Cover a set of integers with the fewest contiguous spans, in ascending order.
///
/// `{1, 3, 4, 5, 7}` becomes `[1], [3 -- 5], [7]`.
pub fn compress(values: &BTreeSet<i64>) -> Vec<Span> {
    let mut spans: Vec<Span> = Vec::new();

    for &v in values {
        match spans.last_mut() {
            Some(span) if span.last + 1 == v => span.last = v,
            _ => spans.push(Span { first: v, last: v }),
        }
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_splits_on_gaps() {
        let set: BTreeSet<i64> = [1, 3, 4, 5, 7].into_iter().collect();
        let spans = compress(&set);
        assert_eq!(
            spans,
            vec![
                Span { first: 1, last: 1 },
                Span { first: 3, last: 5 },
                Span { first: 7, last: 7 },
            ]
        );
    }

    #[test]
    fn compress_empty() {
        assert!(compress(&BTreeSet::new()).is_empty());
    }

    #[test]
    fn span_display() {
        assert_eq!(Span { first: 3, last: 5 }.to_string(), "3 -- 5");
        assert_eq!(Span { first: 9, last: 9 }.to_string(), "9");
        assert_eq!(Span { first: 3, last: 5 }.len(), 3);
    }
}
