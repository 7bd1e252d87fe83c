//! Statically read property trees
//!
//! Story files are never evaluated. Object literals are decoded from the
//! syntax tree into [`PropertyNode`]s; anything that is not a literal keeps
//! its source text as [`Scalar::Expression`].

use serde_json::{Map, Number, Value};

/// A literal leaf value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// A non-literal expression (function, call, reference), kept as source text
    Expression(String),
}

/// A value read from an object literal
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyNode {
    Scalar(Scalar),
    /// Key/value pairs in source order
    Object(Vec<(String, PropertyNode)>),
    Array(Vec<PropertyNode>),
}

impl Default for PropertyNode {
    fn default() -> Self {
        PropertyNode::Object(Vec::new())
    }
}

impl PropertyNode {
    pub fn empty_object() -> Self {
        PropertyNode::Object(Vec::new())
    }

    pub fn string(value: impl Into<String>) -> Self {
        PropertyNode::Scalar(Scalar::String(value.into()))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, PropertyNode::Object(_))
    }

    /// Look up a key of an object node
    pub fn get(&self, key: &str) -> Option<&PropertyNode> {
        match self {
            PropertyNode::Object(entries) => entries
                .iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn get_path(&self, path: &[&str]) -> Option<&PropertyNode> {
        path.iter().try_fold(self, |node, key| node.get(key))
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut PropertyNode> {
        match self {
            PropertyNode::Object(entries) => entries
                .iter_mut()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Insert or replace a key. Non-object nodes are turned into objects.
    pub fn set(&mut self, key: impl Into<String>, value: PropertyNode) {
        let key = key.into();
        if let Some(slot) = self.get_mut(&key) {
            *slot = value;
            return;
        }
        match self {
            PropertyNode::Object(entries) => entries.push((key, value)),
            other => *other = PropertyNode::Object(vec![(key, value)]),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyNode::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyNode::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// JavaScript truthiness. Unknown expressions count as truthy since
    /// they are present in the source.
    pub fn is_truthy(&self) -> bool {
        match self {
            PropertyNode::Scalar(Scalar::Null) => false,
            PropertyNode::Scalar(Scalar::Bool(b)) => *b,
            PropertyNode::Scalar(Scalar::Number(n)) => *n != 0.0 && !n.is_nan(),
            PropertyNode::Scalar(Scalar::String(s)) => !s.is_empty(),
            PropertyNode::Scalar(Scalar::Expression(_)) => true,
            PropertyNode::Object(_) | PropertyNode::Array(_) => true,
        }
    }

    /// Convert to JSON. Expressions cannot cross the process boundary and
    /// become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            PropertyNode::Scalar(Scalar::Null) | PropertyNode::Scalar(Scalar::Expression(_)) => {
                Value::Null
            }
            PropertyNode::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
            PropertyNode::Scalar(Scalar::Number(n)) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    Value::Number((*n as i64).into())
                } else {
                    Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null)
                }
            }
            PropertyNode::Scalar(Scalar::String(s)) => Value::String(s.clone()),
            PropertyNode::Object(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), value.to_json());
                }
                Value::Object(map)
            }
            PropertyNode::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }
}

/// Deep-merge `overlay` over `base`.
///
/// Keys present in both merge recursively when the overlay value is an
/// object; any other overlay value replaces the base value.
pub fn deep_merge(base: &PropertyNode, overlay: &PropertyNode) -> PropertyNode {
    match (base, overlay) {
        (PropertyNode::Object(_), PropertyNode::Object(entries)) => {
            let mut result = base.clone();
            for (key, value) in entries {
                let merged = match (result.get(key), value) {
                    (Some(existing), PropertyNode::Object(_)) => deep_merge(existing, value),
                    (None, PropertyNode::Object(_)) => {
                        deep_merge(&PropertyNode::empty_object(), value)
                    }
                    _ => value.clone(),
                };
                result.set(key.clone(), merged);
            }
            result
        }
        (_, PropertyNode::Object(_)) => deep_merge(&PropertyNode::empty_object(), overlay),
        _ => overlay.clone(),
    }
}

/// Merge two optional blocks; `None` only when both are absent.
pub fn merge_optional(
    base: Option<&PropertyNode>,
    overlay: Option<&PropertyNode>,
) -> Option<PropertyNode> {
    match (base, overlay) {
        (None, None) => None,
        (Some(base), None) => Some(deep_merge(&PropertyNode::empty_object(), base)),
        (None, Some(overlay)) => Some(deep_merge(&PropertyNode::empty_object(), overlay)),
        (Some(base), Some(overlay)) => Some(deep_merge(base, overlay)),
    }
}

/// Turn `config.rules: [{id, ...}]` into `config.rules: {id: {...}}`.
///
/// Rules without a string `id` are dropped.
pub fn normalize_rules(a11y: &mut PropertyNode) {
    let Some(config) = a11y.get_mut("config") else {
        return;
    };
    let Some(PropertyNode::Array(rules)) = config.get("rules") else {
        return;
    };

    let mut by_id = PropertyNode::empty_object();
    for rule in rules {
        let Some(id) = rule.get("id").and_then(PropertyNode::as_str) else {
            tracing::debug!("Skipping accessibility rule without an id: {:?}", rule);
            continue;
        };
        let mut value = match rule {
            PropertyNode::Object(entries) => PropertyNode::Object(
                entries.iter().filter(|(k, _)| k != "id").cloned().collect(),
            ),
            _ => PropertyNode::empty_object(),
        };
        if let Some(PropertyNode::Object(existing)) = by_id.get(id) {
            value = deep_merge(&PropertyNode::Object(existing.clone()), &value);
        }
        by_id.set(id.to_string(), value);
    }

    config.set("rules", by_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(entries: Vec<(&str, PropertyNode)>) -> PropertyNode {
        PropertyNode::Object(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn boolean(b: bool) -> PropertyNode {
        PropertyNode::Scalar(Scalar::Bool(b))
    }

    #[test]
    fn test_merge_with_null_is_identity() {
        let x = obj(vec![
            ("verbose", boolean(true)),
            ("config", obj(vec![("rules", obj(vec![("a", obj(vec![("enabled", boolean(false))]))]))])),
        ]);

        assert_eq!(merge_optional(Some(&x), None), Some(x.clone()));
        assert_eq!(merge_optional(None, Some(&x)), Some(x.clone()));
        assert_eq!(merge_optional(Some(&x), Some(&x)), Some(x.clone()));
        assert_eq!(merge_optional(None, None), None);
    }

    #[test]
    fn test_merge_overrides_scalars_and_recurses_objects() {
        let base = obj(vec![
            ("verbose", boolean(false)),
            ("element", PropertyNode::string("#root")),
            ("config", obj(vec![("rules", obj(vec![("a", obj(vec![("enabled", boolean(false))]))]))])),
        ]);
        let overlay = obj(vec![
            ("verbose", boolean(true)),
            ("config", obj(vec![("rules", obj(vec![("b", obj(vec![("enabled", boolean(true))]))]))])),
        ]);

        let merged = deep_merge(&base, &overlay);
        assert_eq!(merged.get("verbose"), Some(&boolean(true)));
        assert_eq!(merged.get("element").and_then(PropertyNode::as_str), Some("#root"));
        assert!(merged.get_path(&["config", "rules", "a"]).is_some());
        assert!(merged.get_path(&["config", "rules", "b"]).is_some());
    }

    #[test]
    fn test_arrays_are_replaced_not_concatenated() {
        let base = obj(vec![("tags", PropertyNode::Array(vec![PropertyNode::string("a")]))]);
        let overlay = obj(vec![("tags", PropertyNode::Array(vec![PropertyNode::string("b")]))]);

        let merged = deep_merge(&base, &overlay);
        assert_eq!(
            merged.get("tags"),
            Some(&PropertyNode::Array(vec![PropertyNode::string("b")]))
        );
    }

    #[test]
    fn test_normalize_rules() {
        let mut a11y = obj(vec![(
            "config",
            obj(vec![(
                "rules",
                PropertyNode::Array(vec![
                    obj(vec![("id", PropertyNode::string("a")), ("enabled", boolean(false))]),
                    obj(vec![("id", PropertyNode::string("b")), ("selector", PropertyNode::string("*"))]),
                ]),
            )]),
        )]);

        normalize_rules(&mut a11y);

        let expected = obj(vec![
            ("a", obj(vec![("enabled", boolean(false))])),
            ("b", obj(vec![("selector", PropertyNode::string("*"))])),
        ]);
        assert_eq!(a11y.get_path(&["config", "rules"]), Some(&expected));
        assert_eq!(
            a11y.to_json()["config"]["rules"],
            serde_json::json!({ "a": { "enabled": false }, "b": { "selector": "*" } })
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!PropertyNode::Scalar(Scalar::Null).is_truthy());
        assert!(!PropertyNode::string("").is_truthy());
        assert!(PropertyNode::empty_object().is_truthy());
        assert!(PropertyNode::Scalar(Scalar::Expression("fn".into())).is_truthy());
    }
}
