//! Catalog configuration resolution
//!
//! The catalog's `main.*` file is read statically: the exported config
//! object is decoded from source and only its `stories` list is used.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use storyrun_common::{Error, Result, Settings};

use crate::discover::discover;
use crate::property::PropertyNode;
use crate::specifier::{StoriesEntry, StoriesSpecifier};
use crate::syntax::{self, Bindings};

/// Candidate config files, in lookup order
pub const CONFIG_FILES: &[&str] = &["main.js", "main.cjs", "main.mjs", "main.ts", "main.json"];

/// The parts of the catalog configuration the runner needs
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// File the configuration was read from
    pub path: PathBuf,

    pub stories: Vec<StoriesEntry>,
}

impl CatalogConfig {
    /// Locate and read the configuration in `config_dir`
    pub fn load(config_dir: &Path) -> Result<Self> {
        let path = CONFIG_FILES
            .iter()
            .map(|name| config_dir.join(name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| Error::ConfigResolution {
                dir: config_dir.to_path_buf(),
                reason: format!("none of {} exists", CONFIG_FILES.join(", ")),
            })?;

        let source = std::fs::read_to_string(&path).map_err(|e| Error::ConfigResolution {
            dir: config_dir.to_path_buf(),
            reason: format!("could not read {}: {}", path.display(), e),
        })?;

        let config = if path.extension().map(|ext| ext == "json").unwrap_or(false) {
            Self::from_json(&path, &source)
        } else {
            Self::from_script(&path, &source)
        };

        config.map_err(|reason| Error::ConfigResolution {
            dir: config_dir.to_path_buf(),
            reason,
        })
    }

    /// Read a JS/TS config module without evaluating it
    pub fn from_script(path: &Path, source: &str) -> std::result::Result<Self, String> {
        let tree = syntax::parse_program(source)
            .map_err(|e| format!("{} could not be parsed: {}", path.display(), e))?;
        let program = tree.root_node();
        let bindings = Bindings::collect(program, source);

        let exported = syntax::named_children(program)
            .into_iter()
            .find_map(|statement| exported_config(statement, source))
            .ok_or_else(|| {
                format!(
                    "{} has no `module.exports = ...` or `export default ...`",
                    path.display()
                )
            })?;

        let config = syntax::property_node(syntax::resolve(exported, &bindings, source), &bindings, source);
        Self::from_node(path, &config)
    }

    pub fn from_json(path: &Path, source: &str) -> std::result::Result<Self, String> {
        let value: serde_json::Value = serde_json::from_str(source)
            .map_err(|e| format!("{} is not valid JSON: {}", path.display(), e))?;
        let stories = value
            .get("stories")
            .cloned()
            .ok_or_else(|| format!("{} has no `stories` field", path.display()))?;
        let stories = serde_json::from_value(stories)
            .map_err(|e| format!("`stories` in {} is invalid: {}", path.display(), e))?;

        Ok(Self {
            path: path.to_path_buf(),
            stories,
        })
    }

    fn from_node(path: &Path, config: &PropertyNode) -> std::result::Result<Self, String> {
        let stories = match config.get("stories") {
            Some(node @ PropertyNode::Array(_)) => node.to_json(),
            Some(_) => {
                return Err(format!(
                    "`stories` in {} must be a static array",
                    path.display()
                ))
            }
            None => return Err(format!("{} has no `stories` field", path.display())),
        };
        let stories = serde_json::from_value(stories)
            .map_err(|e| format!("`stories` in {} is invalid: {}", path.display(), e))?;

        Ok(Self {
            path: path.to_path_buf(),
            stories,
        })
    }

    /// Resolve every entry against the config dir
    pub fn specifiers(&self) -> Result<Vec<StoriesSpecifier>> {
        let config_dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        self.stories
            .iter()
            .map(|entry| StoriesSpecifier::normalize(entry, config_dir))
            .collect()
    }
}

fn exported_config<'t>(statement: tree_sitter::Node<'t>, source: &str) -> Option<tree_sitter::Node<'t>> {
    match statement.kind() {
        "export_statement" if syntax::has_token(statement, "default") => {
            statement.child_by_field_name("value")
        }
        "expression_statement" => {
            let assignment = syntax::named_children(statement).into_iter().next()?;
            if assignment.kind() != "assignment_expression" {
                return None;
            }
            let left = assignment.child_by_field_name("left")?;
            if syntax::text(left, source).replace(char::is_whitespace, "") != "module.exports" {
                return None;
            }
            assignment.child_by_field_name("right")
        }
        _ => None,
    }
}

/// Everything discovery produced for this run
#[derive(Debug)]
pub struct CatalogMetadata {
    pub config: CatalogConfig,
    pub specifiers: Vec<StoriesSpecifier>,
    /// Absolute paths of matching story files, sorted
    pub story_files: Vec<PathBuf>,
}

/// Resolves catalog metadata once and hands out shared references.
///
/// Construct one per process and pass it to consumers; `invalidate` drops
/// the cached value so the next call resolves again.
pub struct CatalogService {
    working_dir: PathBuf,
    config_dir: PathBuf,
    skip_docs_files: bool,
    cached: Mutex<Option<Arc<CatalogMetadata>>>,
}

impl CatalogService {
    pub fn new(settings: &Settings, working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        Self {
            config_dir: settings.catalog_config_dir_in(&working_dir),
            working_dir,
            skip_docs_files: settings.skip_docs_files,
            cached: Mutex::new(None),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Resolved metadata, computed on first use
    pub fn metadata(&self) -> Result<Arc<CatalogMetadata>> {
        let mut cached = self.cached.lock();
        if let Some(metadata) = cached.as_ref() {
            return Ok(Arc::clone(metadata));
        }

        debug!("Resolving catalog configuration in {}", self.config_dir.display());
        let config = CatalogConfig::load(&self.config_dir)?;
        let specifiers = config.specifiers()?;
        let story_files = discover(&self.working_dir, &specifiers, self.skip_docs_files);
        info!(
            "Found {} story file(s) from {}",
            story_files.len(),
            config.path.display()
        );

        let metadata = Arc::new(CatalogMetadata {
            config,
            specifiers,
            story_files,
        });
        *cached = Some(Arc::clone(&metadata));
        Ok(metadata)
    }

    /// Forget the cached metadata
    pub fn invalidate(&self) {
        self.cached.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports_config() {
        let config = CatalogConfig::from_script(
            Path::new("/p/.storybook/main.js"),
            r#"
module.exports = {
  stories: ['../stories/**/*.stories.mdx', '../stories/**/*.stories.@(js|jsx|ts|tsx)'],
  addons: ['@storybook/addon-essentials'],
  framework: '@storybook/react',
};
"#,
        )
        .unwrap();

        assert_eq!(config.stories.len(), 2);
        assert_eq!(
            config.stories[1],
            StoriesEntry::Pattern("../stories/**/*.stories.@(js|jsx|ts|tsx)".to_string())
        );
    }

    #[test]
    fn test_export_default_binding() {
        let config = CatalogConfig::from_script(
            Path::new("/p/.storybook/main.ts"),
            r#"
import type { StorybookConfig } from '@storybook/react-vite';

const config: StorybookConfig = {
  stories: [{ directory: '../src', titlePrefix: 'Kit' }],
};

export default config;
"#,
        )
        .unwrap();

        assert_eq!(
            config.stories,
            vec![StoriesEntry::Specifier {
                directory: "../src".to_string(),
                files: None,
                title_prefix: Some("Kit".to_string()),
            }]
        );
    }

    #[test]
    fn test_dynamic_stories_rejected() {
        let err = CatalogConfig::from_script(
            Path::new("main.js"),
            "module.exports = { stories: findStories() };",
        )
        .unwrap_err();
        assert!(err.contains("static array"));
    }

    #[test]
    fn test_missing_config_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = CatalogConfig::load(&dir.path().join(".storybook")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_service_memoizes_and_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join(".storybook")).unwrap();
        std::fs::create_dir_all(root.join("stories")).unwrap();
        std::fs::write(
            root.join(".storybook/main.json"),
            r#"{ "stories": ["../stories/*.stories.jsx"] }"#,
        )
        .unwrap();
        std::fs::write(root.join("stories/A.stories.jsx"), "export default {};").unwrap();

        let service = CatalogService::new(&Settings::default(), root);
        let first = service.metadata().unwrap();
        assert_eq!(first.story_files.len(), 1);

        std::fs::write(root.join("stories/B.stories.jsx"), "export default {};").unwrap();
        let second = service.metadata().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        service.invalidate();
        let third = service.metadata().unwrap();
        assert_eq!(third.story_files.len(), 2);
    }
}
