//! HTML fragment parser and serializer.
//!
//! Lenient by construction: malformed markup degrades to text or implicit
//! closes, never to an error, matching how `insertAdjacentHTML` behaves.

// ============================================================================
// Constants
// ============================================================================

/// Elements that never have children or an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Elements whose content is raw text up to the matching end tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

// ============================================================================
// ParsedNode
// ============================================================================

/// A node produced by [`parse_fragment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedNode {
    /// Element with lowercase tag and attributes in source order.
    Element {
        /// Tag name.
        tag: String,
        /// Attributes.
        attrs: Vec<(String, String)>,
        /// Child nodes.
        children: Vec<ParsedNode>,
    },
    /// Decoded text.
    Text(String),
}

/// Returns `true` for void elements.
#[inline]
#[must_use]
pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses an HTML fragment into a forest.
#[must_use]
pub fn parse_fragment(html: &str) -> Vec<ParsedNode> {
    let mut parser = Parser {
        input: html,
        pos: 0,
    };
    // Stack of open elements; index 0 is the synthetic fragment root.
    let mut stack: Vec<(String, Vec<(String, String)>, Vec<ParsedNode>)> =
        vec![(String::new(), Vec::new(), Vec::new())];

    while parser.pos < parser.input.len() {
        let rest = parser.rest();
        if let Some(after) = rest.strip_prefix("<!--") {
            let end = after.find("-->").map_or(rest.len(), |i| i + 4 + 3);
            parser.pos += end;
            continue;
        }
        if rest.starts_with("<!") {
            let end = rest.find('>').map_or(rest.len(), |i| i + 1);
            parser.pos += end;
            continue;
        }
        if rest.starts_with("</") {
            if let Some(tag) = parser.read_end_tag() {
                close_element(&mut stack, &tag);
                continue;
            }
        } else if rest.starts_with('<')
            && let Some((tag, attrs, self_closing)) = parser.read_start_tag()
        {
            if is_void(&tag) || self_closing {
                push_child(
                    &mut stack,
                    ParsedNode::Element {
                        tag,
                        attrs,
                        children: Vec::new(),
                    },
                );
            } else if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
                let text = parser.read_raw_text(&tag);
                let children = if text.is_empty() {
                    Vec::new()
                } else {
                    vec![ParsedNode::Text(text)]
                };
                push_child(&mut stack, ParsedNode::Element { tag, attrs, children });
            } else {
                stack.push((tag, attrs, Vec::new()));
            }
            continue;
        }

        let text = parser.read_text();
        if !text.is_empty() {
            push_child(&mut stack, ParsedNode::Text(decode_entities(&text)));
        }
    }

    while stack.len() > 1 {
        pop_into_parent(&mut stack);
    }
    stack.pop().map(|(_, _, children)| children).unwrap_or_default()
}

fn push_child(
    stack: &mut [(String, Vec<(String, String)>, Vec<ParsedNode>)],
    node: ParsedNode,
) {
    if let Some((_, _, children)) = stack.last_mut() {
        children.push(node);
    }
}

fn pop_into_parent(stack: &mut Vec<(String, Vec<(String, String)>, Vec<ParsedNode>)>) {
    if let Some((tag, attrs, children)) = stack.pop() {
        push_child(stack, ParsedNode::Element { tag, attrs, children });
    }
}

fn close_element(stack: &mut Vec<(String, Vec<(String, String)>, Vec<ParsedNode>)>, tag: &str) {
    // Stray end tags with no open match are dropped.
    let Some(depth) = stack.iter().skip(1).rposition(|(open, _, _)| open == tag) else {
        return;
    };
    let target_len = depth + 1;
    while stack.len() > target_len {
        pop_into_parent(stack);
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn read_text(&mut self) -> String {
        let rest = self.rest();
        // A lone '<' that did not start a tag is literal text.
        let skip = usize::from(rest.starts_with('<'));
        let end = rest[skip..].find('<').map_or(rest.len(), |i| i + skip);
        self.pos += end;
        rest[..end].to_string()
    }

    fn read_end_tag(&mut self) -> Option<String> {
        let rest = self.rest();
        let close = rest.find('>')?;
        let tag = rest[2..close].trim().to_ascii_lowercase();
        if tag.is_empty() || !tag.chars().all(|c| c.is_alphanumeric() || c == '-') {
            return None;
        }
        self.pos += close + 1;
        Some(tag)
    }

    fn read_start_tag(&mut self) -> Option<(String, Vec<(String, String)>, bool)> {
        let rest = self.rest();
        let bytes = rest.as_bytes();
        if bytes.len() < 2 || !bytes[1].is_ascii_alphabetic() {
            return None;
        }

        let mut i = 1;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-') {
            i += 1;
        }
        let tag = rest[1..i].to_ascii_lowercase();
        let mut attrs = Vec::new();
        let mut self_closing = false;

        loop {
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= bytes.len() {
                return None;
            }
            match bytes[i] {
                b'>' => {
                    i += 1;
                    break;
                }
                b'/' => {
                    self_closing = true;
                    i += 1;
                    continue;
                }
                _ => {}
            }

            let name_start = i;
            while i < bytes.len()
                && !bytes[i].is_ascii_whitespace()
                && !matches!(bytes[i], b'=' | b'>' | b'/')
            {
                i += 1;
            }
            let name = rest[name_start..i].to_ascii_lowercase();

            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            let mut value = String::new();
            if i < bytes.len() && bytes[i] == b'=' {
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                    let quote = bytes[i];
                    let start = i + 1;
                    let end = rest[start..].find(quote as char)? + start;
                    value = decode_entities(&rest[start..end]);
                    i = end + 1;
                } else {
                    let start = i;
                    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                        i += 1;
                    }
                    value = decode_entities(&rest[start..i]);
                }
            }
            if !name.is_empty() && !attrs.iter().any(|(n, _): &(String, String)| *n == name) {
                attrs.push((name, value));
            }
        }

        self.pos += i;
        Some((tag, attrs, self_closing))
    }

    fn read_raw_text(&mut self, tag: &str) -> String {
        let rest = self.rest();
        let closing = format!("</{tag}");
        let lower = rest.to_ascii_lowercase();
        match lower.find(&closing) {
            Some(start) => {
                let end = rest[start..].find('>').map_or(rest.len(), |i| start + i + 1);
                self.pos += end;
                rest[..start].to_string()
            }
            None => {
                self.pos = self.input.len();
                rest.to_string()
            }
        }
    }
}

// ============================================================================
// Entities & Escaping
// ============================================================================

/// Decodes the handful of entities markup actually uses.
#[must_use]
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|c| (c, end + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Escapes text content for serialization.
#[must_use]
pub fn escape_text(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escapes a double-quoted attribute value.
#[must_use]
pub fn escape_attr(input: &str) -> String {
    input.replace('&', "&amp;").replace('"', "&quot;")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tag: &str, attrs: &[(&str, &str)], children: Vec<ParsedNode>) -> ParsedNode {
        ParsedNode::Element {
            tag: tag.to_string(),
            attrs: attrs
                .iter()
                .map(|(n, v)| ((*n).to_string(), (*v).to_string()))
                .collect(),
            children,
        }
    }

    fn text(s: &str) -> ParsedNode {
        ParsedNode::Text(s.to_string())
    }

    #[test]
    fn test_nested_elements_and_attrs() {
        let nodes = parse_fragment(r#"<div id="a" class='b c'><p>Hi <b>there</b></p></div>"#);
        assert_eq!(
            nodes,
            vec![element(
                "div",
                &[("id", "a"), ("class", "b c")],
                vec![element("p", &[], vec![text("Hi "), element("b", &[], vec![text("there")])])]
            )]
        );
    }

    #[test]
    fn test_void_and_boolean_attributes() {
        let nodes = parse_fragment("<input type=checkbox checked><br/>x");
        assert_eq!(
            nodes,
            vec![
                element("input", &[("type", "checkbox"), ("checked", "")], vec![]),
                element("br", &[], vec![]),
                text("x"),
            ]
        );
    }

    #[test]
    fn test_unclosed_and_stray_tags() {
        let nodes = parse_fragment("<ul><li>one<li>two</span></ul>");
        let ParsedNode::Element { tag, children, .. } = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(tag, "ul");
        assert_eq!(children.len(), 1);
    }

    #[test]
    fn test_comments_skipped_and_entities_decoded() {
        let nodes = parse_fragment("<!-- note -->a &amp; b &lt;c&gt; &#65;&#x42;");
        assert_eq!(nodes, vec![text("a & b <c> AB")]);
    }

    #[test]
    fn test_raw_text_element() {
        let nodes = parse_fragment("<style>.x > .y { color: red }</style>");
        assert_eq!(
            nodes,
            vec![element("style", &[], vec![text(".x > .y { color: red }")])]
        );
    }

    #[test]
    fn test_lone_angle_bracket_is_text() {
        let nodes = parse_fragment("1 < 2");
        assert_eq!(nodes, vec![text("1 "), text("< 2")]);
    }

    #[test]
    fn test_escape_round() {
        assert_eq!(escape_text("<a & b>"), "&lt;a &amp; b&gt;");
        assert_eq!(escape_attr(r#"say "hi" & go"#), "say &quot;hi&quot; &amp; go");
    }
}
