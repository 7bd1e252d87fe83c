//! Core types for storyrun

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// How a story is rendered by the catalog preview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    Story,
    Docs,
}

impl Default for ViewMode {
    fn default() -> Self {
        Self::Story
    }
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Story => "story",
            ViewMode::Docs => "docs",
        }
    }

    pub fn is_docs(&self) -> bool {
        matches!(self, ViewMode::Docs)
    }

    /// Channel event the preview emits once a render in this mode completes.
    pub fn rendered_event(&self) -> &'static str {
        match self {
            ViewMode::Story => "storyRendered",
            ViewMode::Docs => "docsRendered",
        }
    }
}

impl std::fmt::Display for ViewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "story" => Ok(ViewMode::Story),
            "docs" => Ok(ViewMode::Docs),
            other => Err(format!("unknown view mode `{}`", other)),
        }
    }
}

/// One renderable example parsed out of a story file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryUnit {
    /// Catalog-global identifier, e.g. `example-button--primary`
    pub id: String,

    /// Identifier as written in the source (may contain spaces)
    pub export_key: String,

    /// Human-readable name
    pub name: String,

    pub view_mode: ViewMode,

    /// Merged catalog-level and story-level accessibility settings
    #[serde(default)]
    pub a11y: Option<AccessibilityConfig>,

    /// Absolute path of the file that declares the story
    pub story_path: PathBuf,
}

/// All stories declared by a single source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryFileDescriptor {
    pub path: PathBuf,
    pub title: String,
    /// Stories in declaration order
    pub stories: Vec<StoryUnit>,
}

impl StoryFileDescriptor {
    pub fn get(&self, export_key: &str) -> Option<&StoryUnit> {
        self.stories.iter().find(|s| s.export_key == export_key)
    }

    pub fn is_empty(&self) -> bool {
        self.stories.is_empty()
    }

    pub fn declares(&self, path: &Path) -> bool {
        self.path == path
    }
}

/// Per-rule override handed to the audit engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    /// Engine-specific fields we pass through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Accessibility audit settings for one story
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessibilityConfig {
    #[serde(default)]
    pub verbose: bool,

    /// `parameters.a11y.disable` turns the audit off for a story
    #[serde(default)]
    pub disable: bool,

    /// Selector the catalog addon would inspect; the audit itself runs on `body`
    #[serde(default)]
    pub element: Option<String>,

    /// Rule overrides keyed by rule id
    #[serde(default)]
    pub rules: BTreeMap<String, RuleOverride>,

    /// Remaining fields of the `config` block
    #[serde(default)]
    pub config: Map<String, Value>,

    /// Opaque engine options
    #[serde(default)]
    pub options: Value,
}

impl AccessibilityConfig {
    /// Build from a merged `parameters.a11y` object whose `config.rules`
    /// has already been normalized into a map keyed by rule id.
    pub fn from_value(value: &Value) -> Self {
        let mut config = value
            .get("config")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let rules = match config.remove("rules") {
            Some(Value::Object(rules)) => rules
                .into_iter()
                .map(|(id, rule)| {
                    let rule = serde_json::from_value(rule).unwrap_or_default();
                    (id, rule)
                })
                .collect(),
            _ => BTreeMap::new(),
        };

        Self {
            verbose: value.get("verbose").and_then(Value::as_bool).unwrap_or(false),
            disable: value.get("disable").and_then(Value::as_bool).unwrap_or(false),
            element: value.get("element").and_then(Value::as_str).map(String::from),
            rules,
            config,
            options: value.get("options").cloned().unwrap_or(Value::Null),
        }
    }

    /// Options object for the audit run: `{runAssertions, ...config, rules}`
    pub fn audit_options(&self) -> Value {
        let mut options = Map::new();
        options.insert("runAssertions".to_string(), Value::Bool(self.verbose));
        for (key, value) in &self.config {
            options.insert(key.clone(), value.clone());
        }
        if !self.rules.is_empty() {
            let rules = self
                .rules
                .iter()
                .map(|(id, rule)| {
                    (id.clone(), serde_json::to_value(rule).unwrap_or(Value::Null))
                })
                .collect();
            options.insert("rules".to_string(), Value::Object(rules));
        }
        Value::Object(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_view_mode_events() {
        assert_eq!(ViewMode::Story.rendered_event(), "storyRendered");
        assert_eq!(ViewMode::Docs.rendered_event(), "docsRendered");
        assert_eq!("docs".parse::<ViewMode>().unwrap(), ViewMode::Docs);
        assert!("canvas".parse::<ViewMode>().is_err());
    }

    #[test]
    fn test_a11y_from_merged_value() {
        let value = json!({
            "element": "#root",
            "verbose": true,
            "config": {
                "rules": {
                    "image-alt": { "enabled": false },
                    "autocomplete-valid": { "selector": "*:not([autocomplete=\"nope\"])" }
                },
                "checks": []
            },
            "options": {},
            "manual": true
        });

        let config = AccessibilityConfig::from_value(&value);
        assert!(config.verbose);
        assert!(!config.disable);
        assert_eq!(config.element.as_deref(), Some("#root"));
        assert_eq!(config.rules["image-alt"].enabled, Some(false));
        assert_eq!(
            config.rules["autocomplete-valid"].selector.as_deref(),
            Some("*:not([autocomplete=\"nope\"])")
        );
        assert!(config.config.contains_key("checks"));
    }

    #[test]
    fn test_audit_options_shape() {
        let config = AccessibilityConfig::from_value(&json!({
            "config": { "rules": { "button-name": { "enabled": false, "reviewOnFail": true } } }
        }));

        let options = config.audit_options();
        assert_eq!(options["runAssertions"], json!(false));
        assert_eq!(
            options["rules"]["button-name"],
            json!({ "enabled": false, "reviewOnFail": true })
        );
    }
}
