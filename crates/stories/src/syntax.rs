//! tree-sitter helpers shared by the catalog config reader and the story parser

use std::collections::HashMap;

use tree_sitter::{Node, Parser, Tree};

use storyrun_common::ParseCause;

use crate::property::{PropertyNode, Scalar};

/// Bindings deeper than this are left as expressions
const MAX_RESOLVE_DEPTH: usize = 8;

/// Parse JS/JSX/TS/TSX source. Syntax errors are reported at the first
/// erroneous node.
pub fn parse_program(source: &str) -> Result<Tree, ParseCause> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_typescript::LANGUAGE_TSX.into())
        .map_err(|e| ParseCause::Grammar(e.to_string()))?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ParseCause::Grammar("parser returned no tree".to_string()))?;

    if let Some(node) = first_error(tree.root_node()) {
        let position = node.start_position();
        return Err(ParseCause::Syntax {
            line: position.row + 1,
            column: position.column + 1,
        });
    }

    Ok(tree)
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if !node.has_error() {
        return None;
    }
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .find_map(first_error)
        .or(Some(node))
}

/// Source text of a node
pub fn text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    &source[node.byte_range()]
}

/// Named children, comments excluded
pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

/// Whether a node has an anonymous child token of the given kind
pub fn has_token(node: Node<'_>, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|child| !child.is_named() && child.kind() == kind);
    found
}

/// Strip parentheses and type-only wrappers (`as`, `satisfies`, `!`)
pub fn unwrap_expression(node: Node<'_>) -> Node<'_> {
    let mut current = node;
    loop {
        match current.kind() {
            "parenthesized_expression"
            | "as_expression"
            | "satisfies_expression"
            | "non_null_expression" => match named_children(current).first() {
                Some(inner) => current = *inner,
                None => return current,
            },
            _ => return current,
        }
    }
}

/// Top-level `const`/`let`/`var` bindings, including exported ones
pub struct Bindings<'t> {
    values: HashMap<String, Node<'t>>,
}

impl<'t> Bindings<'t> {
    pub fn collect(program: Node<'t>, source: &str) -> Self {
        let mut values = HashMap::new();
        for statement in named_children(program) {
            let declaration = match statement.kind() {
                "export_statement" => statement.child_by_field_name("declaration"),
                "lexical_declaration" | "variable_declaration" => Some(statement),
                _ => None,
            };
            let Some(declaration) = declaration else {
                continue;
            };
            for (name, value) in declarators(declaration, source) {
                if let Some(value) = value {
                    values.insert(name, value);
                }
            }
        }
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<Node<'t>> {
        self.values.get(name).copied()
    }
}

/// `(name, initializer)` pairs of a lexical/variable declaration
pub fn declarators<'t>(declaration: Node<'t>, source: &str) -> Vec<(String, Option<Node<'t>>)> {
    if !matches!(declaration.kind(), "lexical_declaration" | "variable_declaration") {
        return Vec::new();
    }
    named_children(declaration)
        .into_iter()
        .filter(|child| child.kind() == "variable_declarator")
        .filter_map(|declarator| {
            let name = declarator.child_by_field_name("name")?;
            if name.kind() != "identifier" {
                return None;
            }
            Some((
                text(name, source).to_string(),
                declarator.child_by_field_name("value"),
            ))
        })
        .collect()
}

/// Follow identifiers to their top-level binding
pub fn resolve<'t>(node: Node<'t>, bindings: &Bindings<'t>, source: &str) -> Node<'t> {
    let mut current = unwrap_expression(node);
    for _ in 0..MAX_RESOLVE_DEPTH {
        if current.kind() != "identifier" {
            break;
        }
        match bindings.get(text(current, source)) {
            Some(value) => current = unwrap_expression(value),
            None => break,
        }
    }
    current
}

/// Decode an expression into a property tree
pub fn property_node(node: Node<'_>, bindings: &Bindings<'_>, source: &str) -> PropertyNode {
    decode(node, bindings, source, 0)
}

fn decode(node: Node<'_>, bindings: &Bindings<'_>, source: &str, depth: usize) -> PropertyNode {
    let node = unwrap_expression(node);
    match node.kind() {
        "object" => decode_object(node, bindings, source, depth),
        "array" => PropertyNode::Array(
            named_children(node)
                .into_iter()
                .filter(|item| item.kind() != "spread_element")
                .map(|item| decode(item, bindings, source, depth))
                .collect(),
        ),
        "string" => PropertyNode::Scalar(Scalar::String(string_value(node, source))),
        "template_string" => {
            let has_substitution = named_children(node)
                .iter()
                .any(|child| child.kind() == "template_substitution");
            let raw = text(node, source);
            if has_substitution {
                PropertyNode::Scalar(Scalar::Expression(raw.to_string()))
            } else {
                PropertyNode::Scalar(Scalar::String(raw.trim_matches('`').to_string()))
            }
        }
        "number" => number(text(node, source)),
        "unary_expression" => {
            let raw = text(node, source);
            match raw.strip_prefix('-').map(str::trim) {
                Some(digits) => match number(digits) {
                    PropertyNode::Scalar(Scalar::Number(n)) => {
                        PropertyNode::Scalar(Scalar::Number(-n))
                    }
                    _ => PropertyNode::Scalar(Scalar::Expression(raw.to_string())),
                },
                None => PropertyNode::Scalar(Scalar::Expression(raw.to_string())),
            }
        }
        "true" => PropertyNode::Scalar(Scalar::Bool(true)),
        "false" => PropertyNode::Scalar(Scalar::Bool(false)),
        "null" | "undefined" => PropertyNode::Scalar(Scalar::Null),
        "identifier" if depth < MAX_RESOLVE_DEPTH => {
            match bindings.get(text(node, source)) {
                Some(value) if is_literal(unwrap_expression(value)) => {
                    decode(value, bindings, source, depth + 1)
                }
                _ => PropertyNode::Scalar(Scalar::Expression(text(node, source).to_string())),
            }
        }
        _ => PropertyNode::Scalar(Scalar::Expression(text(node, source).to_string())),
    }
}

fn is_literal(node: Node<'_>) -> bool {
    matches!(
        node.kind(),
        "object" | "array" | "string" | "template_string" | "number" | "true" | "false" | "null"
    )
}

fn decode_object(
    node: Node<'_>,
    bindings: &Bindings<'_>,
    source: &str,
    depth: usize,
) -> PropertyNode {
    let mut object = PropertyNode::empty_object();
    for member in named_children(node) {
        match member.kind() {
            "pair" => {
                let (Some(key), Some(value)) = (
                    member.child_by_field_name("key"),
                    member.child_by_field_name("value"),
                ) else {
                    continue;
                };
                object.set(property_key(key, source), decode(value, bindings, source, depth));
            }
            "shorthand_property_identifier" => {
                let name = text(member, source);
                let value = match bindings.get(name) {
                    Some(value) if depth < MAX_RESOLVE_DEPTH && is_literal(unwrap_expression(value)) => {
                        decode(value, bindings, source, depth + 1)
                    }
                    _ => PropertyNode::Scalar(Scalar::Expression(name.to_string())),
                };
                object.set(name, value);
            }
            "method_definition" => {
                if let Some(name) = member.child_by_field_name("name") {
                    object.set(
                        property_key(name, source),
                        PropertyNode::Scalar(Scalar::Expression(text(member, source).to_string())),
                    );
                }
            }
            "spread_element" => {
                let Some(argument) = named_children(member).first().copied() else {
                    continue;
                };
                if depth >= MAX_RESOLVE_DEPTH {
                    continue;
                }
                if let PropertyNode::Object(entries) = decode(argument, bindings, source, depth + 1) {
                    for (key, value) in entries {
                        object.set(key, value);
                    }
                }
            }
            _ => {}
        }
    }
    object
}

/// Key of an object member: identifiers verbatim, strings unquoted
pub fn property_key(node: Node<'_>, source: &str) -> String {
    match node.kind() {
        "string" => string_value(node, source),
        "computed_property_name" => text(node, source)
            .trim_start_matches('[')
            .trim_end_matches(']')
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .to_string(),
        _ => text(node, source).to_string(),
    }
}

/// Contents of a string literal with common escapes decoded
pub fn string_value(node: Node<'_>, source: &str) -> String {
    let raw = text(node, source);
    let inner = if raw.len() >= 2 { &raw[1..raw.len() - 1] } else { raw };
    unescape(inner)
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn number(raw: &str) -> PropertyNode {
    let cleaned = raw.replace('_', "");
    let parsed = if let Some(hex) = cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok().map(|n| n as f64)
    } else {
        cleaned.parse::<f64>().ok()
    };
    match parsed {
        Some(n) => PropertyNode::Scalar(Scalar::Number(n)),
        None => PropertyNode::Scalar(Scalar::Expression(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_default(source: &str) -> PropertyNode {
        let tree = parse_program(source).unwrap();
        let program = tree.root_node();
        let bindings = Bindings::collect(program, source);
        let export = named_children(program)
            .into_iter()
            .find(|n| n.kind() == "export_statement")
            .unwrap();
        property_node(export.child_by_field_name("value").unwrap(), &bindings, source)
    }

    #[test]
    fn test_decode_literals() {
        let node = decode_default(
            r#"export default { a: 'x', "b": 2, c: -1.5, d: true, e: null, f: [1, "two"], g: () => 1 };"#,
        );
        assert_eq!(node.get("a").and_then(PropertyNode::as_str), Some("x"));
        assert_eq!(node.get("b"), Some(&PropertyNode::Scalar(Scalar::Number(2.0))));
        assert_eq!(node.get("c"), Some(&PropertyNode::Scalar(Scalar::Number(-1.5))));
        assert_eq!(node.get("d").and_then(PropertyNode::as_bool), Some(true));
        assert_eq!(node.get("e"), Some(&PropertyNode::Scalar(Scalar::Null)));
        assert!(matches!(node.get("f"), Some(PropertyNode::Array(items)) if items.len() == 2));
        assert!(matches!(node.get("g"), Some(PropertyNode::Scalar(Scalar::Expression(_)))));
    }

    #[test]
    fn test_decode_resolves_bindings_and_spreads() {
        let node = decode_default(
            r#"
const shared = { verbose: true };
const rules = [{ id: 'a', enabled: false }];
export default { ...shared, config: { rules } } satisfies Meta;
"#,
        );
        assert_eq!(node.get("verbose").and_then(PropertyNode::as_bool), Some(true));
        assert!(matches!(
            node.get_path(&["config", "rules"]),
            Some(PropertyNode::Array(items)) if items.len() == 1
        ));
    }

    #[test]
    fn test_syntax_error_position() {
        let err = parse_program("export default {\n  title: 'x',,,\n").unwrap_err();
        assert!(matches!(err, ParseCause::Syntax { line, .. } if line >= 2));
    }
}
