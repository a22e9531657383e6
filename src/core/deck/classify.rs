//! Card classification: which element a card defines, and which numeric
//! fields are identifiers of which kind.
//!
//! Cell and surface cards are recognized by block; data cards by their leading
//! keyword. Each identifier field records the byte span of its digits only, so
//! a sign in front (`-3`, inside of surface 3) or a facet behind (`-3.2`) is
//! never touched by a rewrite.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::kind::{ElementKind, Role};
use super::segment::{Block, RawCard, Word};
use crate::error::{Error, Result};
use crate::utils::numeric::parse_int;

// ============================================================================
// Types
// ============================================================================

/// What a card describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardKind {
    Cell,
    Surface,
    Material,
    Transformation,
    Tally,
    Distribution,
    Source,
    Other,
}

/// One identifier found on a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub kind: ElementKind,
    pub role: Role,
    /// Magnitude; the sign lives in `negative`.
    pub value: i64,
    pub negative: bool,
    /// Byte span of the digits in the source.
    pub span: Range<usize>,
}

/// A keyword parameter on a cell card, e.g. `imp:n=1` or `fill=3 (2)`.
#[derive(Debug, Clone)]
pub struct Param {
    pub keyword: Word,
    pub values: Vec<Word>,
}

impl Param {
    /// Keyword lowercased, without a leading `*`.
    pub fn name(&self) -> String {
        self.keyword
            .text
            .trim_start_matches('*')
            .to_ascii_lowercase()
    }

    /// Particles of an `imp:` keyword (`imp:n,p` gives `["n", "p"]`).
    pub fn particles(&self) -> Option<Vec<String>> {
        let name = self.name();
        let list = name.strip_prefix("imp:")?;
        Some(list.split(',').map(|p| p.to_string()).collect())
    }
}

/// Positional and keyword layout of a cell card, kept for the attribute view
/// and for attribute edits.
#[derive(Debug, Clone)]
pub struct CellLayout {
    /// Base cell of a `LIKE n BUT` card.
    pub like: Option<i64>,
    /// Positional material word (absent on LIKE-BUT cards).
    pub material: Option<Word>,
    /// Positional density word (absent on void and LIKE-BUT cards).
    pub density: Option<Word>,
    pub params: Vec<Param>,
}

impl CellLayout {
    pub fn param(&self, names: &[&str]) -> Option<&Param> {
        self.params
            .iter()
            .find(|p| names.contains(&p.name().as_str()))
    }
}

/// A classified card.
#[derive(Debug, Clone)]
pub struct Card {
    pub raw: RawCard,
    pub kind: CardKind,
    /// Defining identifier; absent on companion and unnumbered data cards.
    pub id: Option<i64>,
    pub fields: Vec<Field>,
    pub cell: Option<CellLayout>,
}

// ============================================================================
// Field helpers
// ============================================================================

fn data_keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([*+]?)([A-Za-z]+)(\d+)(:\S*)?$").expect("data keyword pattern")
    })
}

fn geometry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(#?)([-+]?)(\d+)(\.\d+)?").expect("geometry pattern"))
}

fn distribution_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[dD](\d+)$").expect("distribution pattern"))
}

fn field(
    kind: ElementKind,
    role: Role,
    value: i64,
    negative: bool,
    span: Range<usize>,
) -> Option<Field> {
    (value != 0).then_some(Field {
        kind,
        role,
        value,
        negative,
        span,
    })
}

/// A whole word holding a signed integer.
fn int_field(word: &Word, kind: ElementKind, role: Role) -> Option<Field> {
    let value = parse_int(&word.text)?;
    let sign_len = usize::from(word.text.starts_with(|c: char| c == '-' || c == '+'));
    field(
        kind,
        role,
        value.abs(),
        value < 0,
        word.span.start + sign_len..word.span.end,
    )
}

fn is_keyword(text: &str) -> bool {
    let body = text.strip_prefix('*').unwrap_or(text);
    body.starts_with(|c: char| c.is_ascii_alphabetic())
}

/// Integers in a list-like word, skipping reals, repeat counts (`2r`, `3i`),
/// and anything inside `[...]`. `depth` carries bracket nesting across words.
fn scan_integers(word: &Word, depth: &mut i32) -> Vec<(Range<usize>, bool)> {
    let bytes = word.text.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'[' => {
                *depth += 1;
                i += 1;
            }
            b']' => {
                *depth -= 1;
                i += 1;
            }
            b if b.is_ascii_digit() => {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if *depth > 0 {
                    continue;
                }
                let prev = start.checked_sub(1).map(|p| bytes[p]);
                let next = bytes.get(i).copied();
                let glued = |b: u8| b == b'.' || b.is_ascii_alphabetic();
                if prev.is_some_and(glued) || next.is_some_and(glued) {
                    continue;
                }
                let signed = matches!(prev, Some(b'-') | Some(b'+'));
                if signed {
                    let before_sign = start.checked_sub(2).map(|p| bytes[p]);
                    if before_sign.is_some_and(|b| glued(b) || b.is_ascii_digit()) {
                        continue;
                    }
                }
                found.push((
                    word.span.start + start..word.span.start + i,
                    prev == Some(b'-'),
                ));
            }
            _ => i += 1,
        }
    }

    found
}

fn list_fields(words: &[Word], kind: ElementKind, fields: &mut Vec<Field>) {
    let mut depth = 0;
    for word in words {
        for (span, negative) in scan_integers(word, &mut depth) {
            if let Some(value) = word_value(word, &span) {
                fields.extend(field(kind, Role::Reference, value, negative, span));
            }
        }
    }
}

fn word_value(word: &Word, span: &Range<usize>) -> Option<i64> {
    let local = span.start - word.span.start..span.end - word.span.start;
    word.text.get(local)?.parse().ok()
}

// ============================================================================
// Cell cards
// ============================================================================

fn classify_cell(raw: &RawCard) -> Result<(Option<i64>, Vec<Field>, CellLayout)> {
    let words = &raw.words;
    let mut fields = Vec::new();

    let id_field = words
        .first()
        .and_then(|w| int_field(w, ElementKind::Cell, Role::Definition))
        .filter(|f| !f.negative)
        .ok_or_else(|| Error::deck_format(raw.line, "cell card must start with a cell number"))?;
    let id = id_field.value;
    fields.push(id_field);

    let second = words.get(1).map(|w| w.text.to_ascii_lowercase());
    let mut layout = CellLayout {
        like: None,
        material: None,
        density: None,
        params: Vec::new(),
    };

    let params_start = if second.as_deref() == Some("like") {
        let base = words
            .get(2)
            .and_then(|w| int_field(w, ElementKind::Cell, Role::Reference))
            .ok_or_else(|| Error::deck_format(raw.line, "LIKE must name a cell number"))?;
        layout.like = Some(base.value);
        fields.push(base);
        if words.get(3).map(|w| w.text.to_ascii_lowercase()).as_deref() != Some("but") {
            return Err(Error::deck_format(raw.line, "LIKE n must be followed by BUT"));
        }
        4
    } else {
        let material_word = words
            .get(1)
            .ok_or_else(|| Error::deck_format(raw.line, "cell card is missing its material"))?;
        let material = parse_int(&material_word.text).ok_or_else(|| {
            Error::deck_format(
                raw.line,
                format!("cell {} has a non-numeric material '{}'", id, material_word.text),
            )
        })?;
        layout.material = Some(material_word.clone());

        let mut next = 2;
        if material != 0 {
            fields.extend(int_field(material_word, ElementKind::Material, Role::Reference));
            let density = words.get(2).ok_or_else(|| {
                Error::deck_format(raw.line, format!("cell {} has a material but no density", id))
            })?;
            layout.density = Some(density.clone());
            next = 3;
        }

        let geometry_end = words[next..]
            .iter()
            .position(|w| is_keyword(&w.text))
            .map_or(words.len(), |p| next + p);
        geometry_fields(&words[next..geometry_end], &mut fields);
        geometry_end
    };

    layout.params = group_params(&words[params_start.min(words.len())..]);
    for param in &layout.params {
        param_fields(param, &mut fields);
    }

    Ok((Some(id), fields, layout))
}

fn geometry_fields(words: &[Word], fields: &mut Vec<Field>) {
    for word in words {
        for caps in geometry_re().captures_iter(&word.text) {
            let (Some(complement), Some(sign), Some(digits)) = (caps.get(1), caps.get(2), caps.get(3))
            else {
                continue;
            };
            let kind = if complement.as_str().is_empty() {
                ElementKind::Surface
            } else {
                ElementKind::Cell
            };
            let Ok(value) = digits.as_str().parse::<i64>() else {
                continue;
            };
            let span = word.span.start + digits.start()..word.span.start + digits.end();
            fields.extend(field(kind, Role::Reference, value, sign.as_str() == "-", span));
        }
    }
}

/// `u=0` written out. Unlike other zeros it is an occurrence, so universe
/// rules can move a model's real world into a universe.
fn explicit_real_world(word: &Word) -> Option<Field> {
    if parse_int(&word.text)? != 0 {
        return None;
    }
    let sign_len = usize::from(word.text.starts_with(|c: char| c == '-' || c == '+'));
    Some(Field {
        kind: ElementKind::Universe,
        role: Role::Membership,
        value: 0,
        negative: false,
        span: word.span.start + sign_len..word.span.end,
    })
}

fn group_params(words: &[Word]) -> Vec<Param> {
    let mut params: Vec<Param> = Vec::new();
    for word in words {
        if is_keyword(&word.text) {
            params.push(Param {
                keyword: word.clone(),
                values: Vec::new(),
            });
        } else if let Some(param) = params.last_mut() {
            param.values.push(word.clone());
        }
    }
    params
}

fn param_fields(param: &Param, fields: &mut Vec<Field>) {
    match param.name().as_str() {
        "u" => {
            if let Some(w) = param.values.first() {
                fields.extend(
                    int_field(w, ElementKind::Universe, Role::Membership)
                        .or_else(|| explicit_real_world(w)),
                );
            }
        }
        "mat" => {
            if let Some(w) = param.values.first() {
                fields.extend(int_field(w, ElementKind::Material, Role::Reference));
            }
        }
        "trcl" => {
            if let [w] = param.values.as_slice() {
                fields.extend(int_field(w, ElementKind::Transformation, Role::Reference));
            }
        }
        "fill" => fill_fields(&param.values, fields),
        _ => {}
    }
}

/// `fill=N`, `fill=N(t)`, `fill=N (t)`, or the lattice array form
/// `fill=i1:i2 j1:j2 k1:k2 u u u ...`.
fn fill_fields(values: &[Word], fields: &mut Vec<Field>) {
    let Some(first) = values.first() else {
        return;
    };

    if first.text.contains(':') {
        let entries = values.iter().skip_while(|w| w.text.contains(':'));
        let mut in_group = false;
        for word in entries {
            if in_group {
                in_group = !word.text.contains(')');
                continue;
            }
            if word.text.starts_with('(') {
                match paren_transform(word) {
                    Some(f) => fields.push(f),
                    None => in_group = !word.text.contains(')'),
                }
                continue;
            }
            fill_entry(word, fields);
        }
        return;
    }

    fill_entry(first, fields);
    if let Some(f) = values.get(1).and_then(paren_transform) {
        fields.push(f);
    }
}

/// `N` or `N(t)`; anything else (repeat counts, reals) is left alone.
fn fill_entry(word: &Word, fields: &mut Vec<Field>) {
    let (universe, rest) = match word.text.find('(') {
        Some(i) => (&word.text[..i], Some(i)),
        None => (word.text.as_str(), None),
    };

    let head = Word {
        text: universe.to_string(),
        span: word.span.start..word.span.start + universe.len(),
    };
    fields.extend(int_field(&head, ElementKind::Universe, Role::Reference));

    if let Some(i) = rest {
        let tail = Word {
            text: word.text[i..].to_string(),
            span: word.span.start + i..word.span.end,
        };
        fields.extend(paren_transform(&tail));
    }
}

/// A single-integer transformation in parentheses: `(5)`.
fn paren_transform(word: &Word) -> Option<Field> {
    let inner = word.text.strip_prefix('(')?.strip_suffix(')')?;
    let value: i64 = inner.parse().ok()?;
    let start = word.span.start + 1;
    field(
        ElementKind::Transformation,
        Role::Reference,
        value,
        false,
        start..start + inner.len(),
    )
}

// ============================================================================
// Surface cards
// ============================================================================

fn classify_surface(raw: &RawCard) -> Result<(Option<i64>, Vec<Field>)> {
    let words = &raw.words;
    let first = words
        .first()
        .ok_or_else(|| Error::deck_format(raw.line, "empty surface card"))?;

    let prefix = usize::from(first.text.starts_with(|c: char| c == '*' || c == '+'));
    let id_word = Word {
        text: first.text[prefix..].to_string(),
        span: first.span.start + prefix..first.span.end,
    };
    let id_field = int_field(&id_word, ElementKind::Surface, Role::Definition)
        .filter(|f| !f.negative)
        .ok_or_else(|| {
            Error::deck_format(raw.line, "surface card must start with a surface number")
        })?;
    let id = id_field.value;
    let mut fields = vec![id_field];

    if let Some(second) = words.get(1) {
        if let Some(n) = parse_int(&second.text) {
            let kind = if n < 0 {
                ElementKind::Surface
            } else {
                ElementKind::Transformation
            };
            fields.extend(int_field(second, kind, Role::Reference));
        }
    }

    Ok((Some(id), fields))
}

// ============================================================================
// Data cards
// ============================================================================

/// `sdef` bindings of a distribution to an element kind (`cel=d1` makes
/// distribution 1 a list of cells).
fn source_bindings(cards: &[RawCard]) -> HashMap<i64, ElementKind> {
    let mut bindings = HashMap::new();

    for raw in cards.iter().filter(|c| c.block == Block::Data) {
        let Some(first) = raw.words.first() else {
            continue;
        };
        if !first.text.eq_ignore_ascii_case("sdef") {
            continue;
        }
        for pair in raw.words[1..].windows(2) {
            let kind = match pair[0].text.to_ascii_lowercase().as_str() {
                "cel" => ElementKind::Cell,
                "sur" => ElementKind::Surface,
                "tr" => ElementKind::Transformation,
                _ => continue,
            };
            if let Some(caps) = distribution_ref_re().captures(&pair[1].text) {
                if let Ok(n) = caps[1].parse::<i64>() {
                    bindings.insert(n, kind);
                }
            }
        }
    }

    bindings
}

fn classify_source(raw: &RawCard) -> Vec<Field> {
    let mut fields = Vec::new();
    let mut keyword = String::new();
    let mut first_value = false;

    for word in &raw.words[1..] {
        if let Some(caps) = distribution_ref_re().captures(&word.text) {
            if let (Some(m), Ok(n)) = (caps.get(1), caps[1].parse::<i64>()) {
                let span = word.span.start + m.start()..word.span.start + m.end();
                fields.extend(field(ElementKind::Distribution, Role::Reference, n, false, span));
            }
            first_value = false;
            continue;
        }
        if is_keyword(&word.text) {
            keyword = word.text.to_ascii_lowercase();
            first_value = true;
            continue;
        }
        if first_value {
            let kind = match keyword.as_str() {
                "cel" => Some(ElementKind::Cell),
                "sur" => Some(ElementKind::Surface),
                "tr" => Some(ElementKind::Transformation),
                _ => None,
            };
            if let Some(kind) = kind {
                fields.extend(int_field(word, kind, Role::Reference));
            }
        }
        first_value = false;
    }

    fields
}

/// Body of an `si`/`ds` card: option letter, then entries.
fn distribution_body(
    body: &[Word],
    bound: Option<ElementKind>,
    allow_list: bool,
    fields: &mut Vec<Field>,
) {
    let Some(option) = body.first() else {
        return;
    };
    match option.text.to_ascii_lowercase().as_str() {
        "s" => {
            for word in &body[1..] {
                fields.extend(int_field(word, ElementKind::Distribution, Role::Reference));
            }
        }
        "l" if allow_list => {
            if let Some(kind) = bound {
                list_fields(&body[1..], kind, fields);
            }
        }
        _ => {}
    }
}

fn tally_body_kind(id: i64) -> Option<ElementKind> {
    match id % 10 {
        1 | 2 => Some(ElementKind::Surface),
        4 | 6 | 7 | 8 => Some(ElementKind::Cell),
        _ => None,
    }
}

/// Bracket levels of a surface tally bin. In `(1 < 10 < 20)` only the first
/// level is a surface; the levels after `<` are cells.
#[derive(Default)]
struct Levels {
    open: Vec<bool>,
    top: bool,
}

impl Levels {
    fn advance(&mut self, text: &str) {
        for c in text.chars() {
            match c {
                '(' => {
                    let past = self.past_first();
                    self.open.push(past);
                }
                ')' => {
                    self.open.pop();
                }
                '<' => match self.open.last_mut() {
                    Some(past) => *past = true,
                    None => self.top = true,
                },
                _ => {}
            }
        }
    }

    fn past_first(&self) -> bool {
        self.open.last().copied().unwrap_or(self.top)
    }
}

fn tally_body(body: &[Word], kind: ElementKind, fields: &mut Vec<Field>) {
    let mut depth = 0;
    let mut levels = Levels::default();
    let mut universe_next = false;

    for word in body {
        if word.text.starts_with(|c: char| c.is_ascii_alphabetic()) {
            universe_next = word.text.eq_ignore_ascii_case("u");
            continue;
        }
        let mut cursor = 0;
        for (span, negative) in scan_integers(word, &mut depth) {
            let local = span.start - word.span.start..span.end - word.span.start;
            levels.advance(&word.text[cursor..local.start]);
            cursor = local.end;

            let Some(value) = word_value(word, &span) else {
                continue;
            };
            let target = if universe_next {
                universe_next = false;
                ElementKind::Universe
            } else if kind == ElementKind::Surface && levels.past_first() {
                ElementKind::Cell
            } else {
                kind
            };
            fields.extend(field(target, Role::Reference, value, negative, span));
        }
        levels.advance(&word.text[cursor..]);
    }
}

/// Entries of each `fm` bin. Bins are the top-level `( ... )` groups, or the
/// whole body when there are none; nested reaction groups are skipped.
fn multiplier_bins(body: &[Word]) -> Vec<Vec<Word>> {
    let grouped = body.iter().any(|w| w.text.contains('('));
    let entry_depth = usize::from(grouped);
    let mut bins: Vec<Vec<Word>> = Vec::new();
    if !grouped {
        bins.push(Vec::new());
    }

    let mut depth = 0usize;
    for word in body {
        let mut start: Option<usize> = None;
        let ends = word.text.char_indices().chain(std::iter::once((word.text.len(), ' ')));
        for (i, c) in ends {
            if !matches!(c, '(' | ')' | ' ') {
                start.get_or_insert(i);
                continue;
            }
            if let Some(s) = start.take() {
                if depth == entry_depth {
                    if let Some(bin) = bins.last_mut() {
                        bin.push(Word {
                            text: word.text[s..i].to_string(),
                            span: word.span.start + s..word.span.start + i,
                        });
                    }
                }
            }
            match c {
                '(' => {
                    depth += 1;
                    if depth == 1 {
                        bins.push(Vec::new());
                    }
                }
                ')' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
    }

    bins
}

/// Materials of `fm` bins: `c m r...`, or `c -1 m1 px1 m2 px2 ...` for
/// attenuators.
fn multiplier_fields(body: &[Word], fields: &mut Vec<Field>) {
    for bin in multiplier_bins(body) {
        let Some(material) = bin.get(1) else {
            continue;
        };
        match parse_int(&material.text) {
            Some(-1) => {
                for word in bin[2..].iter().step_by(2) {
                    fields.extend(int_field(word, ElementKind::Material, Role::Reference));
                }
            }
            Some(m) if m > 0 => {
                fields.extend(int_field(material, ElementKind::Material, Role::Reference));
            }
            _ => {}
        }
    }
}

fn classify_data(
    raw: &RawCard,
    bindings: &HashMap<i64, ElementKind>,
) -> (CardKind, Option<i64>, Vec<Field>) {
    let Some(first) = raw.words.first() else {
        return (CardKind::Other, None, Vec::new());
    };
    if first.text.eq_ignore_ascii_case("sdef") {
        return (CardKind::Source, None, classify_source(raw));
    }

    let Some(caps) = data_keyword_re().captures(&first.text) else {
        return (CardKind::Other, None, Vec::new());
    };
    let (Some(name), Some(digits)) = (caps.get(2), caps.get(3)) else {
        return (CardKind::Other, None, Vec::new());
    };
    let Ok(n) = digits.as_str().parse::<i64>() else {
        return (CardKind::Other, None, Vec::new());
    };
    let span = first.span.start + digits.start()..first.span.start + digits.end();
    let body = &raw.words[1..];
    let mut fields = Vec::new();

    let defining = |kind: ElementKind, fields: &mut Vec<Field>| {
        let f = field(kind, Role::Definition, n, false, span.clone());
        let id = f.as_ref().map(|f| f.value);
        fields.extend(f);
        id
    };
    let referencing = |kind: ElementKind, fields: &mut Vec<Field>| {
        fields.extend(field(kind, Role::Reference, n, false, span.clone()));
    };

    match name.as_str().to_ascii_lowercase().as_str() {
        "m" => {
            let id = defining(ElementKind::Material, &mut fields);
            (CardKind::Material, id, fields)
        }
        "mt" | "mpn" | "mx" => {
            referencing(ElementKind::Material, &mut fields);
            (CardKind::Material, None, fields)
        }
        "tr" => {
            let id = defining(ElementKind::Transformation, &mut fields);
            (CardKind::Transformation, id, fields)
        }
        "f" => {
            let id = defining(ElementKind::Tally, &mut fields);
            if let Some(kind) = tally_body_kind(n) {
                tally_body(body, kind, &mut fields);
            }
            (CardKind::Tally, id, fields)
        }
        "fm" => {
            referencing(ElementKind::Tally, &mut fields);
            multiplier_fields(body, &mut fields);
            (CardKind::Tally, None, fields)
        }
        "fc" | "e" | "t" | "c" | "fq" | "de" | "df" | "em" | "tm" | "cm" | "sd" | "fu"
        | "tf" | "ft" => {
            referencing(ElementKind::Tally, &mut fields);
            (CardKind::Tally, None, fields)
        }
        "cf" => {
            referencing(ElementKind::Tally, &mut fields);
            list_fields(body, ElementKind::Cell, &mut fields);
            (CardKind::Tally, None, fields)
        }
        "sf" | "fs" => {
            referencing(ElementKind::Tally, &mut fields);
            list_fields(body, ElementKind::Surface, &mut fields);
            (CardKind::Tally, None, fields)
        }
        "si" => {
            let id = defining(ElementKind::Distribution, &mut fields);
            distribution_body(body, bindings.get(&n).copied(), true, &mut fields);
            (CardKind::Distribution, id, fields)
        }
        "ds" => {
            referencing(ElementKind::Distribution, &mut fields);
            distribution_body(body, None, false, &mut fields);
            (CardKind::Distribution, None, fields)
        }
        "sp" | "sb" | "sc" => {
            referencing(ElementKind::Distribution, &mut fields);
            (CardKind::Distribution, None, fields)
        }
        _ => (CardKind::Other, None, Vec::new()),
    }
}

// ============================================================================
// Entry point
// ============================================================================

/// Classify every card. Fails only on cell or surface cards whose leading
/// fields cannot be read; unknown data cards pass through as `Other`.
pub fn classify(raw_cards: Vec<RawCard>) -> Result<Vec<Card>> {
    let bindings = source_bindings(&raw_cards);
    let mut cards = Vec::with_capacity(raw_cards.len());

    for raw in raw_cards {
        let card = match raw.block {
            Block::Cell => {
                let (id, fields, layout) = classify_cell(&raw)?;
                Card {
                    raw,
                    kind: CardKind::Cell,
                    id,
                    fields,
                    cell: Some(layout),
                }
            }
            Block::Surface => {
                let (id, fields) = classify_surface(&raw)?;
                Card {
                    raw,
                    kind: CardKind::Surface,
                    id,
                    fields,
                    cell: None,
                }
            }
            Block::Data => {
                let (kind, id, fields) = classify_data(&raw, &bindings);
                Card {
                    raw,
                    kind,
                    id,
                    fields,
                    cell: None,
                }
            }
        };
        cards.push(card);
    }

    Ok(cards)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::segment::segment;

    fn classify_deck(cells: &str, surfaces: &str, data: &str) -> (String, Vec<Card>) {
        let source = format!("title\n{}\n\n{}\n\n{}\n", cells, surfaces, data);
        let cards = classify(segment(&source).unwrap().cards).unwrap();
        (source, cards)
    }

    fn summary(card: &Card) -> Vec<(ElementKind, Role, i64, bool)> {
        card.fields
            .iter()
            .map(|f| (f.kind, f.role, f.value, f.negative))
            .collect()
    }

    use ElementKind::*;
    use Role::*;

    #[test]
    fn cell_with_material_geometry_and_params() {
        let (_, cards) = classify_deck(
            "10 5 -7.8 -1 2 #20 imp:n=1 u=3",
            "1 so 5",
            "m5 26000 1",
        );
        let cell = &cards[0];
        assert_eq!(cell.kind, CardKind::Cell);
        assert_eq!(cell.id, Some(10));
        assert_eq!(
            summary(cell),
            vec![
                (Cell, Definition, 10, false),
                (Material, Reference, 5, false),
                (Surface, Reference, 1, true),
                (Surface, Reference, 2, false),
                (Cell, Reference, 20, false),
                (Universe, Membership, 3, false),
            ]
        );
        let layout = cell.cell.as_ref().unwrap();
        assert_eq!(layout.density.as_ref().unwrap().text, "-7.8");
    }

    #[test]
    fn void_cell_has_no_material_or_density() {
        let (_, cards) = classify_deck("20 0 -1:2 imp:n=0", "1 so 5", "nps 1");
        let layout = cards[0].cell.as_ref().unwrap();
        assert!(layout.density.is_none());
        assert_eq!(
            summary(&cards[0]),
            vec![
                (Cell, Definition, 20, false),
                (Surface, Reference, 1, true),
                (Surface, Reference, 2, false),
            ]
        );
    }

    #[test]
    fn field_spans_cover_digits_only() {
        let (source, cards) = classify_deck("10 0 -3 (4:-5.2)", "1 so 5", "nps 1");
        let spans: Vec<&str> = cards[0]
            .fields
            .iter()
            .map(|f| &source[f.span.clone()])
            .collect();
        assert_eq!(spans, vec!["10", "3", "4", "5"]);
        assert!(cards[0].fields[3].negative);
    }

    #[test]
    fn like_but_cell() {
        let (_, cards) = classify_deck(
            "10 1 -1.0 -1 imp:n=1\n11 like 10 but mat=2 rho=-2.0 trcl=4",
            "1 so 5",
            "nps 1",
        );
        let like = &cards[1];
        assert_eq!(like.cell.as_ref().unwrap().like, Some(10));
        assert_eq!(
            summary(like),
            vec![
                (Cell, Definition, 11, false),
                (Cell, Reference, 10, false),
                (Material, Reference, 2, false),
                (Transformation, Reference, 4, false),
            ]
        );
    }

    #[test]
    fn fill_forms() {
        let (_, cards) = classify_deck(
            "1 0 -1 fill=2 (3)\n2 0 -1 fill=4(5)\n3 0 -1 lat=1 fill=0:1 0:0 0:0 6 2r 7 u=8",
            "1 so 5",
            "nps 1",
        );
        assert_eq!(
            summary(&cards[0])[2..],
            [(Universe, Reference, 2, false), (Transformation, Reference, 3, false)]
        );
        assert_eq!(
            summary(&cards[1])[2..],
            [(Universe, Reference, 4, false), (Transformation, Reference, 5, false)]
        );
        assert_eq!(
            summary(&cards[2])[2..],
            [
                (Universe, Reference, 6, false),
                (Universe, Reference, 7, false),
                (Universe, Membership, 8, false),
            ]
        );
    }

    #[test]
    fn surface_transformation_and_periodic() {
        let (_, cards) = classify_deck("1 0 -1", "1 2 px 3\n*2 -3 py 4\n3 so 1", "nps 1");
        assert_eq!(
            summary(&cards[1]),
            vec![(Surface, Definition, 1, false), (Transformation, Reference, 2, false)]
        );
        assert_eq!(
            summary(&cards[2]),
            vec![(Surface, Definition, 2, false), (Surface, Reference, 3, true)]
        );
        assert_eq!(summary(&cards[3]), vec![(Surface, Definition, 3, false)]);
    }

    #[test]
    fn material_and_transformation_cards() {
        let (_, cards) = classify_deck(
            "1 0 -1",
            "1 so 5",
            "m5 1001 2 8016 1 nlib=80c\nmt5 lwtr\n*tr3 0 0 1\nm0 nlib=70c",
        );
        assert_eq!(cards[2].kind, CardKind::Material);
        assert_eq!(cards[2].id, Some(5));
        assert_eq!(summary(&cards[3]), vec![(Material, Reference, 5, false)]);
        assert_eq!(cards[4].id, Some(3));
        assert!(cards[5].fields.is_empty());
    }

    #[test]
    fn tally_body_kinds() {
        let (_, cards) = classify_deck(
            "1 0 -1",
            "1 so 5",
            "f4:n 1 2 (3 < 4[0 0 1] < u=5) T\nf2:p 7 8\nf5:n 0 0 0 1\nfc4 flux in 4 cells\ne4 1 10 20",
        );
        assert_eq!(
            summary(&cards[2]),
            vec![
                (Tally, Definition, 4, false),
                (Cell, Reference, 1, false),
                (Cell, Reference, 2, false),
                (Cell, Reference, 3, false),
                (Cell, Reference, 4, false),
                (Universe, Reference, 5, false),
            ]
        );
        assert_eq!(
            summary(&cards[3]),
            vec![
                (Tally, Definition, 2, false),
                (Surface, Reference, 7, false),
                (Surface, Reference, 8, false),
            ]
        );
        assert_eq!(summary(&cards[4]), vec![(Tally, Definition, 5, false)]);
        assert_eq!(summary(&cards[5]), vec![(Tally, Reference, 4, false)]);
        assert_eq!(summary(&cards[6]), vec![(Tally, Reference, 4, false)]);
    }

    #[test]
    fn surface_tally_levels_after_lt_are_cells() {
        let (_, cards) = classify_deck(
            "1 0 -1",
            "1 so 5",
            "f2:n (1 < 10 < 20) 3\nf12:n ((1 2) < 10) (4<30)",
        );
        assert_eq!(
            summary(&cards[2]),
            vec![
                (Tally, Definition, 2, false),
                (Surface, Reference, 1, false),
                (Cell, Reference, 10, false),
                (Cell, Reference, 20, false),
                (Surface, Reference, 3, false),
            ]
        );
        assert_eq!(
            summary(&cards[3]),
            vec![
                (Tally, Definition, 12, false),
                (Surface, Reference, 1, false),
                (Surface, Reference, 2, false),
                (Cell, Reference, 10, false),
                (Surface, Reference, 4, false),
                (Cell, Reference, 30, false),
            ]
        );
    }

    #[test]
    fn multiplier_bins_reference_materials() {
        let (_, cards) = classify_deck(
            "1 0 -1",
            "1 so 5",
            "fm4 1.0 5 102\nfm14 (1 6 (1 -4)) (2 -1 7 0.5 8 1.2) (0.5) (1 0 16)",
        );
        assert_eq!(
            summary(&cards[2]),
            vec![(Tally, Reference, 4, false), (Material, Reference, 5, false)]
        );
        assert_eq!(
            summary(&cards[3]),
            vec![
                (Tally, Reference, 14, false),
                (Material, Reference, 6, false),
                (Material, Reference, 7, false),
                (Material, Reference, 8, false),
            ]
        );
    }

    #[test]
    fn explicit_real_world_membership() {
        let (_, cards) = classify_deck("1 0 -1 u=0\n2 0 1 u=3", "1 so 5", "");
        assert_eq!(summary(&cards[0]).last(), Some(&(Universe, Membership, 0, false)));
        assert_eq!(summary(&cards[1]).last(), Some(&(Universe, Membership, 3, false)));
    }

    #[test]
    fn tally_companions_with_lists() {
        let (_, cards) = classify_deck(
            "1 0 -1",
            "1 so 5",
            "f14:n 1\ncf14 1 2\nfs14 -1 2\ne0 1 2",
        );
        assert_eq!(
            summary(&cards[3]),
            vec![
                (Tally, Reference, 14, false),
                (Cell, Reference, 1, false),
                (Cell, Reference, 2, false),
            ]
        );
        assert_eq!(
            summary(&cards[4]),
            vec![
                (Tally, Reference, 14, false),
                (Surface, Reference, 1, true),
                (Surface, Reference, 2, false),
            ]
        );
        assert!(cards[5].fields.is_empty());
    }

    #[test]
    fn source_and_distributions() {
        let (_, cards) = classify_deck(
            "1 0 -1",
            "1 so 5",
            "sdef cel=d1 erg=d2 sur=3 tr=4\nsi1 l 1 2\nsp1 1 1\nsi2 s 3 4\nsp3 -3 1.0\nds4 s 5",
        );
        assert_eq!(cards[2].kind, CardKind::Source);
        assert_eq!(
            summary(&cards[2]),
            vec![
                (Distribution, Reference, 1, false),
                (Distribution, Reference, 2, false),
                (Surface, Reference, 3, false),
                (Transformation, Reference, 4, false),
            ]
        );
        assert_eq!(
            summary(&cards[3]),
            vec![
                (Distribution, Definition, 1, false),
                (Cell, Reference, 1, false),
                (Cell, Reference, 2, false),
            ]
        );
        assert_eq!(summary(&cards[4]), vec![(Distribution, Reference, 1, false)]);
        assert_eq!(
            summary(&cards[5]),
            vec![
                (Distribution, Definition, 2, false),
                (Distribution, Reference, 3, false),
                (Distribution, Reference, 4, false),
            ]
        );
        assert_eq!(summary(&cards[6]), vec![(Distribution, Reference, 3, false)]);
        assert_eq!(
            summary(&cards[7]),
            vec![(Distribution, Reference, 4, false), (Distribution, Reference, 5, false)]
        );
    }

    #[test]
    fn unknown_data_cards_are_opaque() {
        let (_, cards) = classify_deck("1 0 -1", "1 so 5", "mode n p\nimp:n 1 0\nkcode 1000 1 10 50");
        assert!(cards[2..].iter().all(|c| c.kind == CardKind::Other && c.fields.is_empty()));
    }

    #[test]
    fn bad_cell_card_is_format_error() {
        let source = "title\nabc 0 -1\n\n1 so 1\n\nnps 1\n";
        let err = classify(segment(source).unwrap().cards).unwrap_err();
        assert_eq!(err.code.as_str(), "deck.format");

        let source = "title\n1 2\n\n1 so 1\n\nnps 1\n";
        let err = classify(segment(source).unwrap().cards).unwrap_err();
        assert!(err.message.contains("cell 1"));
    }

    #[test]
    fn scan_integers_skips_reals_and_repeats() {
        let word = Word {
            text: "1.5".to_string(),
            span: 0..3,
        };
        assert!(scan_integers(&word, &mut 0).is_empty());
        let word = Word {
            text: "2r".to_string(),
            span: 0..2,
        };
        assert!(scan_integers(&word, &mut 0).is_empty());
        let word = Word {
            text: "1e-5".to_string(),
            span: 0..4,
        };
        assert!(scan_integers(&word, &mut 0).is_empty());
        let word = Word {
            text: "(3<4".to_string(),
            span: 10..14,
        };
        assert_eq!(
            scan_integers(&word, &mut 0),
            vec![(11..12, false), (13..14, false)]
        );
    }
}
