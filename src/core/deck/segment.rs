//! Split raw deck text into cards.
//!
//! A deck is a title line (optionally preceded by a `message:` block) followed
//! by three blank-line-terminated blocks: cells, surfaces, data. A card is a
//! first line plus its continuation lines, where a continuation is either
//! indented by five or more spaces or follows a line ending in `&`.
//!
//! Nothing here copies text: every card and word carries byte spans into the
//! original source, which is what lets the rewriter reproduce untouched bytes
//! exactly.

use std::ops::Range;

use serde::Serialize;

use crate::error::{Error, Result};

/// The block a card was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Block {
    Cell,
    Surface,
    Data,
}

impl Block {
    fn next(self) -> Option<Block> {
        match self {
            Block::Cell => Some(Block::Surface),
            Block::Surface => Some(Block::Data),
            Block::Data => None,
        }
    }
}

/// A meaningful token: a maximal run without whitespace or `=`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    pub span: Range<usize>,
}

/// One card as cut from the source, before classification.
#[derive(Debug, Clone)]
pub struct RawCard {
    pub block: Block,
    /// 1-based line number of the card's first line.
    pub line: usize,
    /// Whole lines covered by the card, including interior comment lines.
    pub span: Range<usize>,
    pub words: Vec<Word>,
    /// Byte offset right after the last meaningful word; appended parameters go here.
    pub tail: usize,
}

#[derive(Debug, Clone)]
pub struct Segmented {
    pub title: Option<Range<usize>>,
    pub cards: Vec<RawCard>,
}

struct SourceLine<'a> {
    number: usize,
    start: usize,
    end: usize,
    body: &'a str,
}

fn split_lines(source: &str) -> Vec<SourceLine<'_>> {
    let mut lines = Vec::new();
    let mut start = 0;

    for (i, raw) in source.split_inclusive('\n').enumerate() {
        let body = raw
            .strip_suffix('\n')
            .map(|b| b.strip_suffix('\r').unwrap_or(b))
            .unwrap_or(raw);
        lines.push(SourceLine {
            number: i + 1,
            start,
            end: start + raw.len(),
            body,
        });
        start += raw.len();
    }

    lines
}

fn is_blank(body: &str) -> bool {
    body.trim().is_empty()
}

/// `c` or `C` within the first five columns, followed by a blank or end of line.
pub(crate) fn is_comment(body: &str) -> bool {
    let rest = body.trim_start_matches(' ');
    if body.len() - rest.len() >= 5 {
        return false;
    }
    let mut chars = rest.chars();
    match chars.next() {
        Some('c') | Some('C') => chars.next().map_or(true, |c| c.is_whitespace()),
        _ => false,
    }
}

fn is_indented_continuation(body: &str) -> bool {
    body.starts_with("     ")
}

fn is_tally_comment(body: &str) -> bool {
    let lower = body.trim_start().to_ascii_lowercase();
    lower.starts_with("fc") && lower[2..].starts_with(|c: char| c.is_ascii_digit())
}

/// Split `text` (located at `base` in the source) into words.
fn words_in(text: &str, base: usize) -> Vec<Word> {
    let mut words = Vec::new();
    let mut current: Option<usize> = None;

    for (i, c) in text.char_indices() {
        let separator = c.is_whitespace() || c == '=';
        match (separator, current) {
            (true, Some(s)) => {
                words.push(Word {
                    text: text[s..i].to_string(),
                    span: base + s..base + i,
                });
                current = None;
            }
            (false, None) => current = Some(i),
            _ => {}
        }
    }
    if let Some(s) = current {
        words.push(Word {
            text: text[s..].to_string(),
            span: base + s..base + text.len(),
        });
    }

    words
}

struct CardBuilder {
    block: Block,
    line: usize,
    start: usize,
    end: usize,
    words: Vec<Word>,
    tail: usize,
    tally_comment: bool,
}

impl CardBuilder {
    fn open(block: Block, line: &SourceLine<'_>) -> (Self, bool) {
        let mut builder = CardBuilder {
            block,
            line: line.number,
            start: line.start,
            end: line.start,
            words: Vec::new(),
            tail: line.start,
            tally_comment: is_tally_comment(line.body),
        };
        let amp = builder.push_line(line);
        (builder, amp)
    }

    /// Add a data line. Returns whether it ends with the `&` continuation marker.
    fn push_line(&mut self, line: &SourceLine<'_>) -> bool {
        self.end = line.end;

        if self.tally_comment {
            // Everything after the keyword is free text.
            if self.words.is_empty() {
                let mut words = words_in(line.body, line.start);
                words.truncate(1);
                if let Some(w) = words.first() {
                    self.tail = w.span.end;
                }
                self.words = words;
            }
            return false;
        }

        let meaningful = match line.body.find('$') {
            Some(i) => &line.body[..i],
            None => line.body,
        };
        let trimmed = meaningful.trim_end();
        let (text, amp) = match trimmed.strip_suffix('&') {
            Some(t) => (t, true),
            None => (trimmed, false),
        };

        let words = words_in(text, line.start);
        if let Some(last) = words.last() {
            self.tail = last.span.end;
        }
        self.words.extend(words);
        amp
    }

    fn finish(self) -> RawCard {
        RawCard {
            block: self.block,
            line: self.line,
            span: self.start..self.end,
            words: self.words,
            tail: self.tail,
        }
    }
}

/// Cut `source` into cards.
pub fn segment(source: &str) -> Result<Segmented> {
    let lines = split_lines(source);
    if lines.iter().all(|l| is_blank(l.body)) {
        return Err(Error::deck_format(1, "deck is empty"));
    }

    let first_keyword = lines[0]
        .body
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();

    let mut title = None;
    let mut next_line = 1;
    let mut stage = Some(Block::Cell);
    let mut data_only = false;

    if first_keyword == "message:" {
        while next_line < lines.len() && !is_blank(lines[next_line].body) {
            next_line += 1;
        }
        if next_line >= lines.len() {
            return Err(Error::deck_format(
                lines.len(),
                "message block is not terminated by a blank line",
            ));
        }
        next_line += 1;
        let Some(title_line) = lines.get(next_line) else {
            return Err(Error::deck_format(next_line + 1, "missing title card"));
        };
        title = Some(title_line.start..title_line.end);
        next_line += 1;
    } else if first_keyword == "continue" {
        stage = Some(Block::Data);
        data_only = true;
    } else {
        title = Some(lines[0].start..lines[0].end);
    }

    let mut cards = Vec::new();
    let mut current: Option<CardBuilder> = None;
    let mut amp = false;

    for line in &lines[next_line..] {
        let Some(block) = stage else {
            break;
        };

        if is_blank(line.body) {
            if let Some(card) = current.take() {
                cards.push(card.finish());
            }
            amp = false;
            stage = block.next();
            continue;
        }

        let indented = is_indented_continuation(line.body);
        // A comment line joins the card only if a continuation line follows it,
        // which the span arithmetic handles on its own.
        if !indented && is_comment(line.body) {
            continue;
        }

        if indented || amp {
            let Some(card) = current.as_mut() else {
                return Err(Error::deck_format(
                    line.number,
                    "continuation line with no preceding card",
                ));
            };
            amp = card.push_line(line);
            continue;
        }

        if let Some(card) = current.take() {
            cards.push(card.finish());
        }
        let (card, line_amp) = CardBuilder::open(block, line);
        current = Some(card);
        amp = line_amp;
    }

    if let Some(card) = current.take() {
        cards.push(card.finish());
    }

    if !data_only {
        match stage {
            Some(Block::Cell) => {
                return Err(Error::deck_format(
                    lines.len(),
                    "cell block is not terminated by a blank line",
                ))
            }
            Some(Block::Surface) => {
                return Err(Error::deck_format(
                    lines.len(),
                    "surface block is not terminated by a blank line",
                ))
            }
            _ => {}
        }
    }

    Ok(Segmented { title, cards })
}

// ============================================================================
// Tests
// ============================================================================
