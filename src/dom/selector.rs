//! A small CSS selector engine.
//!
//! Supports comma-separated lists of compound selectors built from `tag`,
//! `*`, `#id`, `.class`, `[attr]` and `[attr=value]` (value optionally
//! quoted). Combinators are rejected.

use thiserror::Error;

/// Failure to parse a selector.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("Empty selector")]
    Empty,

    #[error("Unexpected character {ch:?} at {pos}")]
    Unexpected { ch: char, pos: usize },

    #[error("Unterminated attribute selector")]
    UnterminatedAttribute,

    #[error("Combinators are not supported: {0:?}")]
    Combinator(String),
}

/// What the engine needs to know about an element.
pub trait ElementView {
    fn tag(&self) -> &str;
    fn attribute(&self, name: &str) -> Option<&str>;

    fn has_class(&self, class: &str) -> bool {
        self.attribute("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct AttributeMatch {
    name: String,
    value: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Compound {
    /// `None` for `*` or no type selector.
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<AttributeMatch>,
}

impl Compound {
    fn matches(&self, element: &dyn ElementView) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag().eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.attribute("id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| element.has_class(c)) {
            return false;
        }
        self.attributes.iter().all(|attr| match (&attr.value, element.attribute(&attr.name)) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(expected), Some(actual)) => expected == actual,
        })
    }
}

/// A parsed selector list. Matches when any of its compounds does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectorList {
    compounds: Vec<Compound>,
}

impl SelectorList {
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let mut compounds = Vec::new();
        for part in split_list(input)? {
            compounds.push(parse_compound(part.0, part.1)?);
        }
        if compounds.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Self { compounds })
    }

    pub fn matches(&self, element: &dyn ElementView) -> bool {
        self.compounds.iter().any(|c| c.matches(element))
    }
}

/// Split on top-level commas, keeping each part's offset for error reporting.
fn split_list(input: &str) -> Result<Vec<(&str, usize)>, SelectorError> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_brackets = false;
    let mut quote: Option<char> = None;

    for (pos, ch) in input.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') if in_brackets => quote = Some(ch),
            (None, '[') => in_brackets = true,
            (None, ']') => in_brackets = false,
            (None, ',') if !in_brackets => {
                parts.push((&input[start..pos], start));
                start = pos + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() || in_brackets {
        return Err(SelectorError::UnterminatedAttribute);
    }
    parts.push((&input[start..], start));

    Ok(parts)
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '-' || ch == '_'
}

fn parse_compound(raw: &str, offset: usize) -> Result<Compound, SelectorError> {
    let leading = raw.len() - raw.trim_start().len();
    let text = raw.trim();
    if text.is_empty() {
        return Err(SelectorError::Empty);
    }
    if outside_brackets_has_combinator(text) {
        return Err(SelectorError::Combinator(text.to_string()));
    }

    let base = offset + leading;
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut compound = Compound::default();
    let mut i = 0;

    let read_ident = |i: &mut usize| -> String {
        let mut ident = String::new();
        while *i < chars.len() && is_ident_char(chars[*i].1) {
            ident.push(chars[*i].1);
            *i += 1;
        }
        ident
    };

    if i < chars.len() && chars[i].1 == '*' {
        i += 1;
    } else if i < chars.len() && is_ident_char(chars[i].1) {
        compound.tag = Some(read_ident(&mut i));
    }

    while i < chars.len() {
        let (pos, ch) = chars[i];
        match ch {
            '#' | '.' => {
                i += 1;
                let ident = read_ident(&mut i);
                if ident.is_empty() {
                    return Err(SelectorError::Unexpected { ch, pos: base + pos });
                }
                if ch == '#' {
                    compound.id = Some(ident);
                } else {
                    compound.classes.push(ident);
                }
            }
            '[' => {
                i += 1;
                let name = read_ident(&mut i);
                if name.is_empty() {
                    return Err(SelectorError::Unexpected { ch, pos: base + pos });
                }
                let value = match chars.get(i).map(|c| c.1) {
                    Some(']') => None,
                    Some('=') => {
                        i += 1;
                        Some(read_attribute_value(&chars, &mut i)?)
                    }
                    Some(other) => {
                        return Err(SelectorError::Unexpected {
                            ch: other,
                            pos: base + chars[i].0,
                        })
                    }
                    None => return Err(SelectorError::UnterminatedAttribute),
                };
                if chars.get(i).map(|c| c.1) != Some(']') {
                    return Err(SelectorError::UnterminatedAttribute);
                }
                i += 1;
                compound.attributes.push(AttributeMatch { name, value });
            }
            _ => return Err(SelectorError::Unexpected { ch, pos: base + pos }),
        }
    }

    Ok(compound)
}

fn read_attribute_value(chars: &[(usize, char)], i: &mut usize) -> Result<String, SelectorError> {
    let mut value = String::new();
    match chars.get(*i).map(|c| c.1) {
        Some(q @ ('"' | '\'')) => {
            *i += 1;
            loop {
                match chars.get(*i).map(|c| c.1) {
                    Some(c) if c == q => {
                        *i += 1;
                        return Ok(value);
                    }
                    Some(c) => {
                        value.push(c);
                        *i += 1;
                    }
                    None => return Err(SelectorError::UnterminatedAttribute),
                }
            }
        }
        _ => {
            while let Some(&(_, c)) = chars.get(*i) {
                if c == ']' {
                    break;
                }
                value.push(c);
                *i += 1;
            }
            Ok(value)
        }
    }
}

/// Whitespace or combinator characters outside `[...]`.
fn outside_brackets_has_combinator(text: &str) -> bool {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for ch in text.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') if depth > 0 => quote = Some(ch),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, c) if depth == 0 && (c.is_whitespace() || matches!(c, '>' | '+' | '~')) => {
                return true
            }
            _ => {}
        }
    }
    false
}
