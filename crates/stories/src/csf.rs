//! Static extraction of Component Story Format modules
//!
//! A CSF module has a default export holding the file-level annotations
//! (`title`, `parameters`, ...) and one named export per story. Stories may be
//! objects, functions, or re-exports; `X.prop = value` assignments after the
//! declaration contribute annotations as well.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use tree_sitter::Node;

use storyrun_common::ParseCause;

use crate::property::{deep_merge, PropertyNode, Scalar};
use crate::syntax::{self, Bindings};

/// Exports that are never stories
const RESERVED_EXPORTS: &[&str] = &["__esModule", "__namedExportsOrder"];

/// Whitespace and the punctuation the catalog turns into `-` in ids
static ID_SEPARATORS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[\s’–—―′¿'`~!@#$%^&*()_|+\-=?;:",.<>{}\[\]\\/]+"#)
        .expect("static pattern is valid")
});

/// A named export as found in source
#[derive(Debug, Clone)]
pub struct StoryExport {
    /// Exported name
    pub key: String,

    /// Object-story properties merged with `X.prop = ...` assignments
    pub annotations: PropertyNode,
}

/// A story with its catalog identity resolved
#[derive(Debug, Clone)]
pub struct CsfStory {
    pub key: String,
    pub id: String,
    pub name: String,
    pub parameters: PropertyNode,
    pub annotations: PropertyNode,
}

/// A statically read CSF module
#[derive(Debug, Clone)]
pub struct CsfFile {
    /// Default export annotations
    pub meta: PropertyNode,

    /// Story exports that pass `includeStories`/`excludeStories`, in source order
    pub exports: Vec<StoryExport>,
}

impl CsfFile {
    pub fn parse(source: &str) -> Result<Self, ParseCause> {
        let tree = syntax::parse_program(source)?;
        let program = tree.root_node();
        let bindings = Bindings::collect(program, source);

        let mut meta: Option<PropertyNode> = None;
        // (exported key, local binding name)
        let mut named: Vec<(String, Option<String>, Option<Node<'_>>)> = Vec::new();
        let mut assignments: HashMap<String, Vec<(String, PropertyNode)>> = HashMap::new();

        for statement in syntax::named_children(program) {
            match statement.kind() {
                "export_statement" => {
                    read_export(statement, &bindings, source, &mut meta, &mut named)?;
                }
                "expression_statement" => {
                    if let Some((target, prop, value)) = read_assignment(statement, &bindings, source) {
                        assignments.entry(target).or_default().push((prop, value));
                    }
                }
                _ => {}
            }
        }

        let meta = meta.ok_or(ParseCause::MissingDefaultExport)?;
        let filter = ExportFilter::from_meta(&meta);

        let exports = named
            .into_iter()
            .filter(|(key, _, _)| !RESERVED_EXPORTS.contains(&key.as_str()))
            .filter(|(key, _, _)| filter.allows(key))
            .map(|(key, local, value)| {
                let mut annotations = match value.map(|v| syntax::resolve(v, &bindings, source)) {
                    Some(node) if node.kind() == "object" => {
                        syntax::property_node(node, &bindings, source)
                    }
                    _ => PropertyNode::empty_object(),
                };
                if let Some(assigned) = local.as_ref().and_then(|name| assignments.get(name)) {
                    for (prop, value) in assigned {
                        let merged = match annotations.get(prop) {
                            Some(existing) if value.is_object() => deep_merge(existing, value),
                            _ => value.clone(),
                        };
                        annotations.set(prop.clone(), merged);
                    }
                }
                StoryExport { key, annotations }
            })
            .collect();

        Ok(Self { meta, exports })
    }

    /// `title` as written in the default export
    pub fn user_title(&self) -> Option<&str> {
        self.meta.get("title").and_then(PropertyNode::as_str)
    }

    /// Resolve ids and names against the file's final title
    pub fn stories(&self, title: &str) -> Vec<CsfStory> {
        let component_id = self
            .meta
            .get("id")
            .and_then(PropertyNode::as_str)
            .unwrap_or(title);

        self.exports
            .iter()
            .map(|export| {
                let parameters = export
                    .annotations
                    .get("parameters")
                    .filter(|p| p.is_object())
                    .cloned()
                    .unwrap_or_default();

                let id = parameters
                    .get("__id")
                    .and_then(PropertyNode::as_str)
                    .map(String::from)
                    .unwrap_or_else(|| to_id(component_id, &story_name_from_export(&export.key)));

                let name = ["storyName", "name"]
                    .iter()
                    .find_map(|key| export.annotations.get(key).and_then(PropertyNode::as_str))
                    .map(String::from)
                    .unwrap_or_else(|| story_name_from_export(&export.key));

                CsfStory {
                    key: export.key.clone(),
                    id,
                    name,
                    parameters,
                    annotations: export.annotations.clone(),
                }
            })
            .collect()
    }
}

fn read_export<'t>(
    statement: Node<'t>,
    bindings: &Bindings<'t>,
    source: &str,
    meta: &mut Option<PropertyNode>,
    named: &mut Vec<(String, Option<String>, Option<Node<'t>>)>,
) -> Result<(), ParseCause> {
    if syntax::has_token(statement, "default") {
        let value = statement
            .child_by_field_name("value")
            .or_else(|| statement.child_by_field_name("declaration"))
            .ok_or(ParseCause::MissingDefaultExport)?;
        *meta = Some(read_meta(value, bindings, source)?);
        return Ok(());
    }

    if let Some(declaration) = statement.child_by_field_name("declaration") {
        match declaration.kind() {
            "lexical_declaration" | "variable_declaration" => {
                for (name, value) in syntax::declarators(declaration, source) {
                    named.push((name.clone(), Some(name), value));
                }
            }
            "function_declaration" | "generator_function_declaration" | "class_declaration" => {
                if let Some(name) = declaration.child_by_field_name("name") {
                    let name = syntax::text(name, source).to_string();
                    named.push((name.clone(), Some(name), None));
                }
            }
            _ => {}
        }
        return Ok(());
    }

    let reexport = statement.child_by_field_name("source").is_some();
    let Some(clause) = syntax::named_children(statement)
        .into_iter()
        .find(|child| child.kind() == "export_clause")
    else {
        return Ok(());
    };

    for specifier in syntax::named_children(clause) {
        if specifier.kind() != "export_specifier" {
            continue;
        }
        let Some(local) = specifier.child_by_field_name("name") else {
            continue;
        };
        let local = syntax::property_key(local, source);
        let exported = specifier
            .child_by_field_name("alias")
            .map(|alias| syntax::property_key(alias, source))
            .unwrap_or_else(|| local.clone());

        if exported == "default" {
            if reexport {
                return Err(ParseCause::Unresolved(format!(
                    "default export re-exported from another module ({})",
                    syntax::text(statement, source)
                )));
            }
            let value = bindings
                .get(&local)
                .ok_or_else(|| ParseCause::Unresolved(local.clone()))?;
            *meta = Some(read_meta(value, bindings, source)?);
        } else if reexport {
            named.push((exported, None, None));
        } else {
            named.push((exported, Some(local.clone()), bindings.get(&local)));
        }
    }
    Ok(())
}

fn read_meta(value: Node<'_>, bindings: &Bindings<'_>, source: &str) -> Result<PropertyNode, ParseCause> {
    let resolved = syntax::resolve(value, bindings, source);
    if resolved.kind() != "object" {
        return Err(ParseCause::Unresolved(syntax::text(value, source).to_string()));
    }
    Ok(syntax::property_node(resolved, bindings, source))
}

/// `Primary.args = {...}` → (`Primary`, `args`, value)
fn read_assignment(
    statement: Node<'_>,
    bindings: &Bindings<'_>,
    source: &str,
) -> Option<(String, String, PropertyNode)> {
    let assignment = syntax::named_children(statement).into_iter().next()?;
    if assignment.kind() != "assignment_expression" {
        return None;
    }
    let left = assignment.child_by_field_name("left")?;
    if left.kind() != "member_expression" {
        return None;
    }
    let object = left.child_by_field_name("object")?;
    let property = left.child_by_field_name("property")?;
    if object.kind() != "identifier" {
        return None;
    }
    let value = assignment.child_by_field_name("right")?;

    Some((
        syntax::text(object, source).to_string(),
        syntax::text(property, source).to_string(),
        syntax::property_node(value, bindings, source),
    ))
}

/// `includeStories` / `excludeStories` of the default export
enum Matcher {
    Names(Vec<String>),
    Pattern(Regex),
}

impl Matcher {
    fn from_node(node: &PropertyNode) -> Option<Self> {
        match node {
            PropertyNode::Array(items) => Some(Matcher::Names(
                items
                    .iter()
                    .filter_map(PropertyNode::as_str)
                    .map(String::from)
                    .collect(),
            )),
            PropertyNode::Scalar(Scalar::String(name)) => Some(Matcher::Names(vec![name.clone()])),
            PropertyNode::Scalar(Scalar::Expression(raw)) => regex_literal(raw).map(Matcher::Pattern),
            _ => None,
        }
    }

    fn matches(&self, key: &str) -> bool {
        match self {
            Matcher::Names(names) => names.iter().any(|name| name == key),
            Matcher::Pattern(pattern) => pattern.is_match(key),
        }
    }
}

/// Compile a JS regex literal such as `/^[A-Z]/i`
fn regex_literal(raw: &str) -> Option<Regex> {
    let body = raw.strip_prefix('/')?;
    let end = body.rfind('/')?;
    let (pattern, flags) = (&body[..end], &body[end + 1..]);
    RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
        .ok()
}

struct ExportFilter {
    include: Option<Matcher>,
    exclude: Option<Matcher>,
}

impl ExportFilter {
    fn from_meta(meta: &PropertyNode) -> Self {
        Self {
            include: meta.get("includeStories").and_then(Matcher::from_node),
            exclude: meta.get("excludeStories").and_then(Matcher::from_node),
        }
    }

    fn allows(&self, key: &str) -> bool {
        self.include.as_ref().map(|m| m.matches(key)).unwrap_or(true)
            && !self.exclude.as_ref().map(|m| m.matches(key)).unwrap_or(false)
    }
}

/// Lowercase and collapse separator runs into single dashes; letters of
/// any script are kept
pub fn sanitize(value: &str) -> String {
    ID_SEPARATORS
        .replace_all(&value.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// Catalog-global story id
pub fn to_id(component: &str, story_name: &str) -> String {
    format!("{}--{}", sanitize(component), sanitize(story_name))
}

/// `EmptyButton` → `Empty Button`, `with_icon2` → `With Icon 2`
pub fn story_name_from_export(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if let Some(prev) = current.chars().last() {
            let next = chars.get(i + 1).copied();
            let boundary = (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_alphabetic() && c.is_ascii_digit())
                || (prev.is_ascii_digit() && c.is_alphabetic())
                || (prev.is_uppercase()
                    && c.is_uppercase()
                    && next.map(char::is_lowercase).unwrap_or(false));
            if boundary {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Primary", "Primary")]
    #[test_case("EmptyButton", "Empty Button")]
    #[test_case("with_icon2", "With Icon 2")]
    #[test_case("HTMLButton", "HTML Button")]
    fn test_story_name_from_export(key: &str, expected: &str) {
        assert_eq!(story_name_from_export(key), expected);
    }

    #[test_case("Example/Button", "Primary", "example-button--primary" ; "path title")]
    #[test_case("Forms / Text Input", "Empty Button", "forms-text-input--empty-button" ; "spaces")]
    #[test_case("Überblick/Button", "Primär", "überblick-button--primär" ; "accented letters")]
    #[test_case("表单/输入框", "默认", "表单-输入框--默认" ; "cjk letters")]
    #[test_case("A -- B", "(With) Icon!", "a-b--with-icon" ; "punctuation runs")]
    fn test_to_id(component: &str, story: &str, expected: &str) {
        assert_eq!(to_id(component, story), expected);
    }

    #[test]
    fn test_object_and_function_stories() {
        let csf = CsfFile::parse(
            r#"
import { Button } from './Button';

export default {
  title: 'Example/Button',
  component: Button,
  parameters: { a11y: { element: '#root' } },
};

const Template = (args) => <Button {...args} />;

export const Primary = Template.bind({});
Primary.args = { primary: true, label: 'Button' };
Primary.storyName = 'The Primary';

export const Secondary = {
  args: { label: 'Button' },
  parameters: { docs: { disabled: true } },
};

export function Large() {
  return <Button size="large" />;
}
"#,
        )
        .unwrap();

        assert_eq!(csf.user_title(), Some("Example/Button"));
        let stories = csf.stories("Example/Button");
        let keys: Vec<&str> = stories.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["Primary", "Secondary", "Large"]);

        assert_eq!(stories[0].id, "example-button--primary");
        assert_eq!(stories[0].name, "The Primary");
        assert_eq!(
            stories[0].annotations.get_path(&["args", "label"]).and_then(PropertyNode::as_str),
            Some("Button")
        );
        assert!(stories[1].parameters.get("docs").is_some());
        assert_eq!(stories[2].name, "Large");
    }

    #[test]
    fn test_include_and_exclude_stories() {
        let csf = CsfFile::parse(
            r#"
export default { title: 'Data', excludeStories: /.*Data$/ };
export const simpleData = { a: 1 };
export const Simple = {};
"#,
        )
        .unwrap();
        let keys: Vec<String> = csf.exports.iter().map(|e| e.key.clone()).collect();
        assert_eq!(keys, vec!["Simple"]);

        let csf = CsfFile::parse(
            r#"
export default { title: 'Data', includeStories: ['Only'] };
export const Only = {};
export const Other = {};
"#,
        )
        .unwrap();
        assert_eq!(csf.exports.len(), 1);
        assert_eq!(csf.exports[0].key, "Only");
    }

    #[test]
    fn test_export_clause_and_meta_binding() {
        let csf = CsfFile::parse(
            r#"
const meta = { title: 'Aliased', id: 'custom-id' };
const First = {};
const Second = { name: 'Second One' };
export { meta as default, First, Second as Renamed };
"#,
        )
        .unwrap();
        let stories = csf.stories("Aliased");
        assert_eq!(stories.len(), 2);
        assert_eq!(stories[0].id, "custom-id--first");
        assert_eq!(stories[1].key, "Renamed");
        assert_eq!(stories[1].name, "Second One");
    }

    #[test]
    fn test_explicit_id_parameter() {
        let csf = CsfFile::parse(
            "export default { title: 'T' };\nexport const A = { parameters: { __id: 'fixed--id' } };",
        )
        .unwrap();
        assert_eq!(csf.stories("T")[0].id, "fixed--id");
    }

    #[test]
    fn test_missing_default_export() {
        let err = CsfFile::parse("export const A = {};").unwrap_err();
        assert!(matches!(err, ParseCause::MissingDefaultExport));
    }

    #[test]
    fn test_unresolvable_default_export() {
        let err = CsfFile::parse("export default makeMeta();\nexport const A = {};").unwrap_err();
        assert!(matches!(err, ParseCause::Unresolved(_)));
    }
}
