//! The CSS subset needed by the host page contract: type, `.class`, `#id`,
//! `[attr]`, `[attr=v]`, `[attr*=v]`, `[attr^=v]`, the descendant combinator
//! and comma-separated groups.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::{PosterError, Result};

/// Read-only view of an element used for matching.
pub trait ElementLike {
    fn tag(&self) -> &str;
    fn attr(&self, name: &str) -> Option<&str>;

    fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|value| value.split_whitespace().any(|c| c == class))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals(String),
    Contains(String),
    Prefix(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrMatcher {
    name: String,
    op: AttrOp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrMatcher>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
    }

    fn matches<E: ElementLike + ?Sized>(&self, element: &E) -> bool {
        if let Some(tag) = &self.tag
            && !element.tag().eq_ignore_ascii_case(tag)
        {
            return false;
        }
        if let Some(id) = &self.id
            && element.attr("id") != Some(id.as_str())
        {
            return false;
        }
        if !self.classes.iter().all(|class| element.has_class(class)) {
            return false;
        }
        self.attrs.iter().all(|matcher| {
            let Some(value) = element.attr(&matcher.name) else {
                return false;
            };
            match &matcher.op {
                AttrOp::Exists => true,
                AttrOp::Equals(expected) => value == expected,
                AttrOp::Contains(needle) => value.contains(needle.as_str()),
                AttrOp::Prefix(prefix) => value.starts_with(prefix.as_str()),
            }
        })
    }
}

/// Compounds joined by descendant combinators, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Chain(Vec<Compound>);

impl Chain {
    fn matches<'a, E, I>(&self, element: &E, ancestors: I) -> bool
    where
        E: ElementLike + ?Sized + 'a,
        I: Iterator<Item = &'a E>,
    {
        let Some((subject, outer)) = self.0.split_last() else {
            return false;
        };
        if !subject.matches(element) {
            return false;
        }

        // Descendant-only chains can be matched greedily against the nearest
        // qualifying ancestor.
        let mut pending = outer.iter().rev().peekable();
        for ancestor in ancestors {
            match pending.peek() {
                Some(compound) if compound.matches(ancestor) => {
                    pending.next();
                }
                Some(_) => {}
                None => break,
            }
        }
        pending.peek().is_none()
    }
}

/// A parsed selector group such as `div.film-poster img, div.poster img`.
#[derive(Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    groups: Vec<Chain>,
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selector").field(&self.source).finish()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Selector {
    pub fn parse(source: &str) -> Result<Self> {
        let mut groups = Vec::new();
        for group in source.split(',') {
            groups.push(parse_chain(source, group)?);
        }
        Ok(Self {
            source: source.trim().to_string(),
            groups,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// `ancestors` must yield the element's ancestors nearest first, up to the
    /// document root.
    pub fn matches<'a, E, I>(&self, element: &E, ancestors: I) -> bool
    where
        E: ElementLike + ?Sized + 'a,
        I: Iterator<Item = &'a E> + Clone,
    {
        self.groups
            .iter()
            .any(|chain| chain.matches(element, ancestors.clone()))
    }
}

fn invalid(source: &str, reason: impl Into<String>) -> PosterError {
    PosterError::Selector {
        selector: source.to_string(),
        reason: reason.into(),
    }
}

fn parse_chain(source: &str, group: &str) -> Result<Chain> {
    let mut compounds = Vec::new();
    let mut chars = group.trim().chars().peekable();

    while chars.peek().is_some() {
        let compound = parse_compound(source, &mut chars)?;
        if compound.is_empty() {
            return Err(invalid(source, "expected a simple selector"));
        }
        compounds.push(compound);

        match chars.peek() {
            Some(c) if c.is_whitespace() => {
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
            }
            Some(c) => {
                return Err(invalid(source, format!("unsupported token {c:?}")));
            }
            None => {}
        }
    }

    if compounds.is_empty() {
        return Err(invalid(source, "empty selector group"));
    }
    Ok(Chain(compounds))
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut ident = String::new();
    while let Some(&c) = chars.peek() {
        if !is_ident_char(c) {
            break;
        }
        ident.push(c);
        chars.next();
    }
    ident
}

fn parse_compound(source: &str, chars: &mut Peekable<Chars<'_>>) -> Result<Compound> {
    let mut compound = Compound::default();

    if chars.peek() == Some(&'*') {
        chars.next();
    } else if chars.peek().is_some_and(|c| is_ident_char(*c)) {
        compound.tag = Some(take_ident(chars).to_ascii_lowercase());
    }

    loop {
        match chars.peek() {
            Some('.') => {
                chars.next();
                let class = take_ident(chars);
                if class.is_empty() {
                    return Err(invalid(source, "empty class name"));
                }
                compound.classes.push(class);
            }
            Some('#') => {
                chars.next();
                let id = take_ident(chars);
                if id.is_empty() {
                    return Err(invalid(source, "empty id"));
                }
                compound.id = Some(id);
            }
            Some('[') => {
                chars.next();
                compound.attrs.push(parse_attr(source, chars)?);
            }
            _ => break,
        }
    }

    Ok(compound)
}

fn parse_attr(source: &str, chars: &mut Peekable<Chars<'_>>) -> Result<AttrMatcher> {
    let name = take_ident(chars);
    if name.is_empty() {
        return Err(invalid(source, "empty attribute name"));
    }

    let op = match chars.next() {
        Some(']') => return Ok(AttrMatcher { name, op: AttrOp::Exists }),
        Some('=') => AttrOp::Equals(parse_attr_value(source, chars)?),
        Some(modifier @ ('*' | '^')) => {
            if chars.next() != Some('=') {
                return Err(invalid(source, "expected '=' after attribute operator"));
            }
            let value = parse_attr_value(source, chars)?;
            if modifier == '*' {
                AttrOp::Contains(value)
            } else {
                AttrOp::Prefix(value)
            }
        }
        other => {
            return Err(invalid(
                source,
                format!("unexpected {other:?} in attribute selector"),
            ));
        }
    };

    if chars.next() != Some(']') {
        return Err(invalid(source, "unterminated attribute selector"));
    }
    Ok(AttrMatcher { name, op })
}

fn parse_attr_value(source: &str, chars: &mut Peekable<Chars<'_>>) -> Result<String> {
    match chars.peek().copied() {
        Some(quote @ ('\'' | '"')) => {
            chars.next();
            let mut value = String::new();
            for c in chars.by_ref() {
                if c == quote {
                    return Ok(value);
                }
                value.push(c);
            }
            Err(invalid(source, "unterminated quoted value"))
        }
        _ => Ok(take_ident(chars)),
    }
}
