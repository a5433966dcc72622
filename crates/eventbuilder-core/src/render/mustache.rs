//! Mustache subset over `serde_json::Value`.
//!
//! Supported: escaped and raw variables, dotted names, `{{.}}`, sections,
//! inverted sections and comments. Tags alone on their line (sections,
//! inverted sections, closing tags, comments) leave no blank line behind.
//! Partials, lambdas and delimiter changes are not supported.

use crate::error::{Error, Result};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sigil {
    Escaped,
    Raw,
    Section,
    Inverted,
    Close,
    Comment,
}

impl Sigil {
    /// Tags that may stand alone on a line
    fn is_block(self) -> bool {
        matches!(self, Sigil::Section | Sigil::Inverted | Sigil::Close | Sigil::Comment)
    }
}

#[derive(Debug, Clone, Copy)]
enum Token<'t> {
    Text(&'t str),
    Tag { sigil: Sigil, name: &'t str, line: usize },
}

#[derive(Debug)]
enum Node<'t> {
    Text(&'t str),
    Variable { name: &'t str, escape: bool },
    Section { name: &'t str, inverted: bool, children: Vec<Node<'t>> },
}

/// A parsed template, reusable across renders
#[derive(Debug)]
pub struct Template<'t> {
    nodes: Vec<Node<'t>>,
}

impl<'t> Template<'t> {
    /// Parses `source`
    pub fn compile(source: &'t str) -> Result<Self> {
        let tokens = trim_standalone(tokenize(source)?);
        Ok(Self { nodes: parse(&tokens)? })
    }

    /// Renders against `data`
    pub fn render(&self, data: &Value) -> String {
        let mut out = String::new();
        let mut stack = vec![data];
        render_nodes(&self.nodes, &mut stack, &mut out);
        out
    }
}

fn newlines(s: &str) -> usize {
    s.bytes().filter(|&b| b == b'\n').count()
}

fn tokenize(source: &str) -> Result<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut rest = source;
    let mut line = 1;

    while let Some(open) = rest.find("{{") {
        if open > 0 {
            tokens.push(Token::Text(&rest[..open]));
            line += newlines(&rest[..open]);
        }
        let after = &rest[open + 2..];
        let (body, close) = match after.strip_prefix('{') {
            Some(body) => (body, "}}}"),
            None => (after, "}}"),
        };
        let end = body
            .find(close)
            .ok_or_else(|| Error::template(line, "unclosed tag"))?;
        let inner = &body[..end];

        let (sigil, name) = if close == "}}}" {
            (Sigil::Raw, inner)
        } else {
            match inner.chars().next() {
                Some('#') => (Sigil::Section, &inner[1..]),
                Some('^') => (Sigil::Inverted, &inner[1..]),
                Some('/') => (Sigil::Close, &inner[1..]),
                Some('!') => (Sigil::Comment, &inner[1..]),
                Some('&') => (Sigil::Raw, &inner[1..]),
                Some('>') | Some('=') => {
                    return Err(Error::template(line, "partials and delimiter changes are not supported"));
                }
                _ => (Sigil::Escaped, inner),
            }
        };
        let name = name.trim();
        if name.is_empty() && sigil != Sigil::Comment {
            return Err(Error::template(line, "empty tag"));
        }
        tokens.push(Token::Tag { sigil, name, line });

        line += newlines(inner);
        rest = &body[end + close.len()..];
    }
    if !rest.is_empty() {
        tokens.push(Token::Text(rest));
    }
    Ok(tokens)
}

fn is_blank(s: &str) -> bool {
    s.chars().all(|c| c == ' ' || c == '\t' || c == '\r')
}

/// Removes the indentation and line break around standalone block tags
///
/// Cuts are computed on the untouched tokens and applied afterwards, so a
/// text token between two standalone tags can lose both its head and tail.
fn trim_standalone(tokens: Vec<Token<'_>>) -> Vec<Token<'_>> {
    let last = tokens.len().saturating_sub(1);
    let mut ranges: Vec<(usize, usize)> = tokens
        .iter()
        .map(|t| match t {
            Token::Text(s) => (0, s.len()),
            Token::Tag { .. } => (0, 0),
        })
        .collect();

    for (i, token) in tokens.iter().enumerate() {
        let Token::Tag { sigil, .. } = token else { continue };
        if !sigil.is_block() {
            continue;
        }

        let before = if i == 0 {
            Some(None)
        } else {
            match tokens[i - 1] {
                Token::Text(s) => match s.rfind('\n') {
                    Some(p) if is_blank(&s[p + 1..]) => Some(Some(p + 1)),
                    None if i - 1 == 0 && is_blank(s) => Some(Some(0)),
                    _ => None,
                },
                Token::Tag { .. } => None,
            }
        };
        let after = if i == last {
            Some(None)
        } else {
            match tokens[i + 1] {
                Token::Text(s) => match s.find('\n') {
                    Some(p) if is_blank(&s[..p]) => Some(Some(p + 1)),
                    None if i + 1 == last && is_blank(s) => Some(Some(s.len())),
                    _ => None,
                },
                Token::Tag { .. } => None,
            }
        };

        if let (Some(before), Some(after)) = (before, after) {
            if let Some(end) = before {
                ranges[i - 1].1 = end;
            }
            if let Some(start) = after {
                ranges[i + 1].0 = start;
            }
        }
    }

    tokens
        .into_iter()
        .zip(ranges)
        .filter_map(|(token, (start, end))| match token {
            Token::Text(_) if start >= end => None,
            Token::Text(s) => Some(Token::Text(&s[start..end])),
            tag => Some(tag),
        })
        .collect()
}

fn parse<'t>(tokens: &[Token<'t>]) -> Result<Vec<Node<'t>>> {
    // (name, inverted, opening line, children collected so far)
    let mut open: Vec<(&'t str, bool, usize, Vec<Node<'t>>)> = Vec::new();
    let mut root = Vec::new();

    for token in tokens {
        let node = match *token {
            Token::Text(s) => Node::Text(s),
            Token::Tag { sigil, name, line } => match sigil {
                Sigil::Comment => continue,
                Sigil::Escaped => Node::Variable { name, escape: true },
                Sigil::Raw => Node::Variable { name, escape: false },
                Sigil::Section | Sigil::Inverted => {
                    open.push((name, sigil == Sigil::Inverted, line, Vec::new()));
                    continue;
                }
                Sigil::Close => {
                    let (opened, inverted, _, children) = open.pop().ok_or_else(|| {
                        Error::template(line, format!("closing tag '{}' without an open section", name))
                    })?;
                    if opened != name {
                        return Err(Error::template(
                            line,
                            format!("closing tag '{}' does not match open section '{}'", name, opened),
                        ));
                    }
                    Node::Section {
                        name,
                        inverted,
                        children,
                    }
                }
            },
        };
        match open.last_mut() {
            Some((_, _, _, children)) => children.push(node),
            None => root.push(node),
        }
    }

    if let Some((name, _, line, _)) = open.pop() {
        return Err(Error::template(line, format!("section '{}' is never closed", name)));
    }
    Ok(root)
}

fn lookup<'v>(stack: &[&'v Value], name: &str) -> Option<&'v Value> {
    if name == "." {
        return stack.last().copied();
    }
    let mut parts = name.split('.');
    let first = parts.next()?;
    let mut value = stack.iter().rev().find_map(|ctx| ctx.get(first))?;
    for part in parts {
        value = value.get(part)?;
    }
    Some(value)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}

fn render_nodes<'v>(nodes: &[Node<'_>], stack: &mut Vec<&'v Value>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(s) => out.push_str(s),
            Node::Variable { name, escape } => {
                let text = match lookup(stack, name) {
                    None | Some(Value::Null) => continue,
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                };
                if *escape {
                    escape_into(out, &text);
                } else {
                    out.push_str(&text);
                }
            }
            Node::Section {
                name,
                inverted,
                children,
            } => {
                let value = lookup(stack, name);
                let truthy = value.map_or(false, is_truthy);
                if *inverted {
                    if !truthy {
                        render_nodes(children, stack, out);
                    }
                    continue;
                }
                let Some(value) = value.filter(|_| truthy) else { continue };
                match value {
                    Value::Array(items) => {
                        for item in items {
                            stack.push(item);
                            render_nodes(children, stack, out);
                            stack.pop();
                        }
                    }
                    Value::Bool(_) => render_nodes(children, stack, out),
                    other => {
                        stack.push(other);
                        render_nodes(children, stack, out);
                        stack.pop();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn render(source: &str, data: Value) -> String {
        Template::compile(source).unwrap().render(&data)
    }

    #[test]
    fn test_variables() {
        let data = json!({"name": "List<int>", "count": 3, "nested": {"deep": "yes"}});
        assert_eq!(render("{{name}}", data.clone()), "List&lt;int&gt;");
        assert_eq!(render("{{{name}}}|{{& name}}", data.clone()), "List<int>|List<int>");
        assert_eq!(render("{{count}} {{nested.deep}} [{{missing}}]", data), "3 yes []");
    }

    #[test]
    fn test_sections() {
        let data = json!({
            "items": [{"n": "a"}, {"n": "b"}],
            "empty": [],
            "flag": true,
            "title": "t",
        });
        assert_eq!(render("{{#items}}{{n}}{{title}},{{/items}}", data.clone()), "at,bt,");
        assert_eq!(render("{{#empty}}x{{/empty}}{{^empty}}none{{/empty}}", data.clone()), "none");
        assert_eq!(render("{{#flag}}on{{/flag}}{{^flag}}off{{/flag}}", data.clone()), "on");
        assert_eq!(render("{{#title}}[{{.}}]{{/title}}", data.clone()), "[t]");
        assert_eq!(render("{{^missing}}absent{{/missing}}", data), "absent");
    }

    #[test]
    fn test_standalone_lines() {
        let source = "begin\n  {{#items}}\n  - {{.}}\n  {{/items}}\n{{! note }}\nend\n";
        assert_eq!(
            render(source, json!({"items": ["a", "b"]})),
            "begin\n  - a\n  - b\nend\n"
        );
        // inline tags keep their surroundings
        assert_eq!(render("a {{#x}}b{{/x}} c\n", json!({"x": true})), "a b c\n");
        // standalone at the very start and end of the template
        assert_eq!(render("{{#x}}\nbody\n{{/x}}", json!({"x": true})), "body\n");
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let err = Template::compile("one\ntwo {{#a}}\nthree").unwrap_err();
        assert!(matches!(err, Error::TemplateRender { line: 2, .. }), "{:?}", err);

        let err = Template::compile("{{#a}}\n{{/b}}").unwrap_err();
        assert!(matches!(err, Error::TemplateRender { line: 2, .. }), "{:?}", err);

        let err = Template::compile("x\ny\n{{name").unwrap_err();
        assert!(matches!(err, Error::TemplateRender { line: 3, .. }), "{:?}", err);

        assert!(Template::compile("{{/a}}").is_err());
        assert!(Template::compile("{{> partial}}").is_err());
    }
}
