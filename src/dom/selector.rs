//! CSS selector subset.
//!
//! Supports what page inspection actually sends:
//!
//! - type (`button`), universal (`*`), id (`#login`), class (`.item`)
//! - attributes: `[name]`, `[name=v]`, `[name^=v]`, `[name$=v]`, `[name*=v]`, `[name~=v]`
//! - descendant (`ul li`) and child (`ul > li`) combinators
//! - selector lists (`h1, h2`)
//!
//! Pseudo-classes and sibling combinators are rejected with
//! [`Error::InvalidSelector`] rather than silently matching nothing.
//!
//! # Example
//!
//! ```ignore
//! let selector = Selector::parse("form#login > input[type=password]")?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::iter::Peekable;
use std::str::Chars;

use crate::error::{Error, Result};
use crate::identifiers::NodeId;

// ============================================================================
// SelectorContext
// ============================================================================

/// Read access a document must provide for matching.
pub trait SelectorContext {
    /// Lowercase tag name, or `None` for non-element nodes.
    fn element_tag(&self, node: NodeId) -> Option<&str>;

    /// Attribute value by exact (lowercase) name.
    fn element_attr(&self, node: NodeId, name: &str) -> Option<&str>;

    /// Nearest element ancestor.
    fn parent_element(&self, node: NodeId) -> Option<NodeId>;
}

// ============================================================================
// Types
// ============================================================================

/// A parsed selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    /// Comma-separated alternatives.
    groups: Vec<Complex>,
}

/// Compounds joined by combinators; `parts[0].0` is unused.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    parts: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrMatcher>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrMatcher {
    name: String,
    op: AttrOp,
    value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Prefix,
    Suffix,
    Contains,
    Includes,
}

// ============================================================================
// Selector - Parsing
// ============================================================================

impl Selector {
    /// Parses a selector list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSelector`] on empty input, unsupported syntax
    /// or dangling combinators.
    pub fn parse(input: &str) -> Result<Self> {
        let mut groups = Vec::new();
        for raw in split_groups(input) {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(Error::invalid_selector(input, "empty selector"));
            }
            groups.push(parse_complex(input, raw)?);
        }
        Ok(Self { groups })
    }

    /// Returns `true` if `node` matches any alternative.
    pub fn matches<C: SelectorContext>(&self, ctx: &C, node: NodeId) -> bool {
        if ctx.element_tag(node).is_none() {
            return false;
        }
        self.groups
            .iter()
            .any(|complex| matches_at(ctx, node, &complex.parts, complex.parts.len() - 1))
    }
}

fn parse_complex(full: &str, raw: &str) -> Result<Complex> {
    let mut parts = Vec::new();
    let mut chars = raw.chars().peekable();
    let mut pending = Combinator::Descendant;

    loop {
        let mut saw_space = false;
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
            saw_space = true;
        }
        let Some(&c) = chars.peek() else { break };

        if c == '>' {
            if parts.is_empty() {
                return Err(Error::invalid_selector(full, "leading combinator"));
            }
            chars.next();
            pending = Combinator::Child;
            continue;
        }
        if c == '+' || c == '~' {
            return Err(Error::invalid_selector(
                full,
                format!("sibling combinator '{c}' is not supported"),
            ));
        }
        if !parts.is_empty() && !saw_space && pending == Combinator::Descendant {
            return Err(Error::invalid_selector(full, format!("unexpected '{c}'")));
        }

        let compound = parse_compound(full, &mut chars)?;
        parts.push((pending, compound));
        pending = Combinator::Descendant;
    }

    if parts.is_empty() {
        return Err(Error::invalid_selector(full, "empty selector"));
    }
    if pending == Combinator::Child {
        return Err(Error::invalid_selector(full, "dangling combinator"));
    }
    Ok(Complex { parts })
}

fn parse_compound(full: &str, chars: &mut Peekable<Chars<'_>>) -> Result<Compound> {
    let mut compound = Compound::default();
    let mut empty = true;

    if chars.peek() == Some(&'*') {
        chars.next();
        empty = false;
    } else if chars.peek().is_some_and(|c| is_ident_char(*c)) {
        compound.tag = Some(read_ident(chars).to_ascii_lowercase());
        empty = false;
    }

    while let Some(&c) = chars.peek() {
        match c {
            '#' => {
                chars.next();
                let id = read_ident(chars);
                if id.is_empty() {
                    return Err(Error::invalid_selector(full, "empty id"));
                }
                compound.id = Some(id);
            }
            '.' => {
                chars.next();
                let class = read_ident(chars);
                if class.is_empty() {
                    return Err(Error::invalid_selector(full, "empty class"));
                }
                compound.classes.push(class);
            }
            '[' => {
                chars.next();
                compound.attrs.push(parse_attr(full, chars)?);
            }
            ':' => {
                return Err(Error::invalid_selector(full, "pseudo-classes are not supported"));
            }
            _ => break,
        }
        empty = false;
    }

    if empty {
        let found = chars.peek().copied().unwrap_or(' ');
        return Err(Error::invalid_selector(full, format!("unexpected '{found}'")));
    }
    Ok(compound)
}

fn parse_attr(full: &str, chars: &mut Peekable<Chars<'_>>) -> Result<AttrMatcher> {
    skip_ws(chars);
    let name = read_ident(chars).to_ascii_lowercase();
    if name.is_empty() {
        return Err(Error::invalid_selector(full, "empty attribute name"));
    }
    skip_ws(chars);

    let op = match chars.next() {
        Some(']') => {
            return Ok(AttrMatcher {
                name,
                op: AttrOp::Exists,
                value: String::new(),
            });
        }
        Some('=') => AttrOp::Equals,
        Some(prefix @ ('^' | '$' | '*' | '~')) => {
            if chars.next() != Some('=') {
                return Err(Error::invalid_selector(full, "malformed attribute operator"));
            }
            match prefix {
                '^' => AttrOp::Prefix,
                '$' => AttrOp::Suffix,
                '*' => AttrOp::Contains,
                _ => AttrOp::Includes,
            }
        }
        _ => return Err(Error::invalid_selector(full, "malformed attribute selector")),
    };

    skip_ws(chars);
    let value = match chars.peek() {
        Some(&quote @ ('"' | '\'')) => {
            chars.next();
            let mut value = String::new();
            loop {
                match chars.next() {
                    Some(c) if c == quote => break,
                    Some(c) => value.push(c),
                    None => return Err(Error::invalid_selector(full, "unterminated string")),
                }
            }
            value
        }
        _ => read_ident(chars),
    };
    skip_ws(chars);

    if chars.next() != Some(']') {
        return Err(Error::invalid_selector(full, "expected ']'"));
    }
    Ok(AttrMatcher { name, op, value })
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

fn read_ident(chars: &mut Peekable<Chars<'_>>) -> String {
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

fn skip_ws(chars: &mut Peekable<Chars<'_>>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

// ============================================================================
// Matching
// ============================================================================

fn matches_at<C: SelectorContext>(
    ctx: &C,
    node: NodeId,
    parts: &[(Combinator, Compound)],
    i: usize,
) -> bool {
    let (combinator, compound) = &parts[i];
    if !compound_matches(ctx, node, compound) {
        return false;
    }
    if i == 0 {
        return true;
    }

    match combinator {
        Combinator::Child => ctx
            .parent_element(node)
            .is_some_and(|parent| matches_at(ctx, parent, parts, i - 1)),
        Combinator::Descendant => {
            let mut ancestor = ctx.parent_element(node);
            while let Some(candidate) = ancestor {
                if matches_at(ctx, candidate, parts, i - 1) {
                    return true;
                }
                ancestor = ctx.parent_element(candidate);
            }
            false
        }
    }
}

fn compound_matches<C: SelectorContext>(ctx: &C, node: NodeId, compound: &Compound) -> bool {
    let Some(tag) = ctx.element_tag(node) else {
        return false;
    };
    if compound.tag.as_deref().is_some_and(|t| t != tag) {
        return false;
    }
    if let Some(id) = &compound.id
        && ctx.element_attr(node, "id") != Some(id.as_str())
    {
        return false;
    }
    if !compound.classes.is_empty() {
        let class_attr = ctx.element_attr(node, "class").unwrap_or_default();
        let has_all = compound
            .classes
            .iter()
            .all(|wanted| class_attr.split_whitespace().any(|c| c == wanted));
        if !has_all {
            return false;
        }
    }
    compound.attrs.iter().all(|matcher| {
        let Some(actual) = ctx.element_attr(node, &matcher.name) else {
            return false;
        };
        let wanted = matcher.value.as_str();
        match matcher.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == wanted,
            AttrOp::Prefix => !wanted.is_empty() && actual.starts_with(wanted),
            AttrOp::Suffix => !wanted.is_empty() && actual.ends_with(wanted),
            AttrOp::Contains => !wanted.is_empty() && actual.contains(wanted),
            AttrOp::Includes => actual.split_whitespace().any(|t| t == wanted),
        }
    })
}

// ============================================================================
// Group Splitting
// ============================================================================

/// Splits a selector list on commas outside brackets and quotes.
fn split_groups(input: &str) -> Vec<&str> {
    let mut groups = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut quote = None;

    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                groups.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    groups.push(&input[start..]);
    groups
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_forms() {
        for input in ["h1", "#x", ".item", "*", "input[type=text]", "a[href^='https']"] {
            assert!(Selector::parse(input).is_ok(), "{input} should parse");
        }
    }

    #[test]
    fn test_parse_combinators_and_lists() {
        let sel = Selector::parse("ul > li.item, div p").expect("parse");
        assert_eq!(sel.groups.len(), 2);
        assert_eq!(sel.groups[0].parts.len(), 2);
        assert_eq!(sel.groups[0].parts[1].0, Combinator::Child);
        assert_eq!(sel.groups[1].parts[1].0, Combinator::Descendant);
    }

    #[test]
    fn test_parse_rejects_unsupported() {
        for input in ["", "a:hover", "h1 + p", "> p", "p >", "[", "a[href", "h1,"] {
            let err = Selector::parse(input).unwrap_err();
            assert!(err.is_validation(), "{input} should be rejected");
        }
    }

    #[test]
    fn test_commas_inside_attribute_values() {
        let sel = Selector::parse(r#"[data-x="a,b"], li[title='x, y']"#).expect("parse");
        assert_eq!(sel.groups.len(), 2);

        assert_eq!(split_groups("a, b ,c").len(), 3);
        assert_eq!(split_groups(r#"[data-x="a,b"]"#), vec![r#"[data-x="a,b"]"#]);
    }

    #[test]
    fn test_tag_is_lowercased() {
        let sel = Selector::parse("DIV.Card").expect("parse");
        let compound = &sel.groups[0].parts[0].1;
        assert_eq!(compound.tag.as_deref(), Some("div"));
        assert_eq!(compound.classes, vec!["Card".to_string()]);
    }
}
