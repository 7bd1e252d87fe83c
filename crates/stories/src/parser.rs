//! Story metadata parser
//!
//! Turns one story file into a [`StoryFileDescriptor`]: resolved title, one
//! [`StoryUnit`] per story export, per-story view mode and merged
//! accessibility configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, warn};

use storyrun_common::{AccessibilityConfig, ParseCause, ParseError, StoryFileDescriptor, StoryUnit, ViewMode};

use crate::catalog::CatalogMetadata;
use crate::csf::CsfFile;
use crate::property::{merge_optional, normalize_rules, PropertyNode};
use crate::title::{AutoTitle, TitleResolver};

/// Export key the catalog reserves for a docs-only page
pub const DOCS_PAGE_EXPORT: &str = "__page";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Full,
    MetaOnly,
}

/// Title and raw CSF of a file, without per-story processing
#[derive(Debug, Clone)]
pub struct CsfMeta {
    pub title: String,
    pub csf: CsfFile,
}

#[derive(Debug, Clone)]
pub enum Parsed {
    Meta(CsfMeta),
    Full(StoryFileDescriptor),
}

pub struct StoryParser {
    catalog: Arc<CatalogMetadata>,
    resolver: Arc<dyn TitleResolver>,
    hide_parse_errors: bool,
}

impl StoryParser {
    pub fn new(catalog: Arc<CatalogMetadata>, hide_parse_errors: bool) -> Self {
        Self {
            catalog,
            resolver: Arc::new(AutoTitle),
            hide_parse_errors,
        }
    }

    /// Replace the default title strategy
    pub fn with_title_resolver(mut self, resolver: Arc<dyn TitleResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn catalog(&self) -> &CatalogMetadata {
        &self.catalog
    }

    pub fn parse(&self, path: &Path, mode: ParseMode) -> Result<Parsed, ParseError> {
        match mode {
            ParseMode::Full => self.parse_file(path).map(Parsed::Full),
            ParseMode::MetaOnly => self.parse_meta(path).map(Parsed::Meta),
        }
    }

    pub fn parse_file(&self, path: &Path) -> Result<StoryFileDescriptor, ParseError> {
        self.with_source(path, |path, source| {
            let meta = self.read_meta(path, source)?;
            Ok(self.describe(path, meta))
        })
    }

    pub fn parse_meta(&self, path: &Path) -> Result<CsfMeta, ParseError> {
        self.with_source(path, |path, source| self.read_meta(path, source))
    }

    fn with_source<T>(
        &self,
        path: &Path,
        read: impl FnOnce(&Path, &str) -> Result<T, ParseCause>,
    ) -> Result<T, ParseError> {
        let path = absolute(path);
        let result = std::fs::read_to_string(&path)
            .map_err(ParseCause::from)
            .and_then(|source| read(&path, &source));

        result.map_err(|cause| {
            let err = ParseError::new(&path, cause);
            if !self.hide_parse_errors {
                error!("{}", err);
            }
            err
        })
    }

    fn read_meta(&self, path: &Path, source: &str) -> Result<CsfMeta, ParseCause> {
        let csf = CsfFile::parse(source)?;
        let title = self
            .resolver
            .resolve(path, &self.catalog.specifiers, csf.user_title())
            .ok_or(ParseCause::MissingTitle)?;
        Ok(CsfMeta { title, csf })
    }

    fn describe(&self, path: &Path, CsfMeta { title, csf }: CsfMeta) -> StoryFileDescriptor {
        let meta_a11y = csf.meta.get_path(&["parameters", "a11y"]);
        let stories = csf
            .stories(&title)
            .into_iter()
            .filter(|story| story.key != DOCS_PAGE_EXPORT)
            .map(|story| StoryUnit {
                view_mode: resolve_view_mode(&story.parameters),
                a11y: story_a11y(meta_a11y, story.parameters.get("a11y")),
                id: story.id,
                export_key: story.key,
                name: story.name,
                story_path: path.to_path_buf(),
            })
            .collect::<Vec<_>>();

        debug!("Parsed {} story(ies) from {}", stories.len(), path.display());
        StoryFileDescriptor {
            path: path.to_path_buf(),
            title,
            stories,
        }
    }
}

/// `parameters.viewMode`, else `docs` when docs are enabled, else `story`
pub fn resolve_view_mode(parameters: &PropertyNode) -> ViewMode {
    if let Some(explicit) = parameters.get("viewMode").and_then(PropertyNode::as_str) {
        match explicit.parse() {
            Ok(mode) => return mode,
            Err(reason) => warn!("Ignoring parameters.viewMode: {}", reason),
        }
    }

    let docs_enabled = parameters
        .get("docs")
        .map(|docs| {
            docs.is_truthy()
                && !docs
                    .get("disabled")
                    .map(PropertyNode::is_truthy)
                    .unwrap_or(false)
        })
        .unwrap_or(false);

    if docs_enabled {
        ViewMode::Docs
    } else {
        ViewMode::Story
    }
}

/// Merge the file-level and story-level `parameters.a11y` blocks
pub fn story_a11y(
    meta: Option<&PropertyNode>,
    story: Option<&PropertyNode>,
) -> Option<AccessibilityConfig> {
    let normalized = |block: Option<&PropertyNode>| {
        block.filter(|b| b.is_object()).map(|b| {
            let mut b = b.clone();
            normalize_rules(&mut b);
            b
        })
    };

    let meta = normalized(meta);
    let story = normalized(story);
    merge_optional(meta.as_ref(), story.as_ref())
        .map(|merged| AccessibilityConfig::from_value(&merged.to_json()))
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Scalar;

    fn obj(entries: Vec<(&str, PropertyNode)>) -> PropertyNode {
        PropertyNode::Object(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn test_unknown_view_mode_falls_through() {
        let params = obj(vec![
            ("viewMode", PropertyNode::string("canvas")),
            ("docs", PropertyNode::empty_object()),
        ]);
        assert_eq!(resolve_view_mode(&params), ViewMode::Docs);
    }

    #[test]
    fn test_a11y_absent_on_both_levels() {
        assert_eq!(story_a11y(None, None), None);
    }

    #[test]
    fn test_a11y_story_overrides_meta() {
        let meta = obj(vec![
            ("verbose", PropertyNode::Scalar(Scalar::Bool(false))),
            ("element", PropertyNode::string("#root")),
        ]);
        let story = obj(vec![("verbose", PropertyNode::Scalar(Scalar::Bool(true)))]);

        let config = story_a11y(Some(&meta), Some(&story)).unwrap();
        assert!(config.verbose);
        assert_eq!(config.element.as_deref(), Some("#root"));
    }
}
