//! Normalized `stories` entries of the catalog configuration

use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use storyrun_common::{Error, Result};

/// Files matched when an entry names a bare directory
pub const DEFAULT_FILES: &str = "**/*.@(mdx|stories.@(js|jsx|mjs|ts|tsx))";

const GLOB_CHARS: &[char] = &['*', '?', '[', ']', '{', '}', '(', ')', '!', '@', '+'];

/// One entry of `stories` as written in the catalog configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoriesEntry {
    Pattern(String),
    #[serde(rename_all = "camelCase")]
    Specifier {
        directory: String,
        #[serde(default)]
        files: Option<String>,
        #[serde(default)]
        title_prefix: Option<String>,
    },
}

/// A `stories` entry resolved against the config dir, with a compiled matcher
#[derive(Debug, Clone)]
pub struct StoriesSpecifier {
    /// Absolute, lexically normalized directory
    pub directory: PathBuf,

    /// Glob relative to `directory`
    pub files: String,

    pub title_prefix: String,

    matcher: GlobSet,
}

impl StoriesSpecifier {
    /// Normalize an entry. Relative directories resolve against `config_dir`.
    pub fn normalize(entry: &StoriesEntry, config_dir: &Path) -> Result<Self> {
        let (directory, files, title_prefix) = match entry {
            StoriesEntry::Pattern(pattern) => {
                let pattern = pattern.replace('\\', "/");
                match split_glob(&pattern) {
                    Some((base, glob)) => (base, glob, String::new()),
                    None => (pattern, DEFAULT_FILES.to_string(), String::new()),
                }
            }
            StoriesEntry::Specifier {
                directory,
                files,
                title_prefix,
            } => (
                directory.replace('\\', "/"),
                files.clone().unwrap_or_else(|| DEFAULT_FILES.to_string()),
                title_prefix.clone().unwrap_or_default(),
            ),
        };

        let directory = normalize_path(&config_dir.join(directory.trim_end_matches('/')));
        let matcher = compile(&files)?;

        Ok(Self {
            directory,
            files,
            title_prefix,
            matcher,
        })
    }

    /// Path of `file` below this specifier's directory
    pub fn relative<'a>(&self, file: &'a Path) -> Option<&'a Path> {
        file.strip_prefix(&self.directory).ok()
    }

    /// Whether an absolute file path is selected by this specifier
    pub fn matches(&self, file: &Path) -> bool {
        self.relative(file)
            .map(|relative| self.matcher.is_match(relative))
            .unwrap_or(false)
    }
}

/// Split `../src/**/*.stories.tsx` into (`../src`, `**/*.stories.tsx`)
fn split_glob(pattern: &str) -> Option<(String, String)> {
    let segments: Vec<&str> = pattern.split('/').collect();
    let first_glob = segments.iter().position(|s| s.contains(GLOB_CHARS))?;
    let base = segments[..first_glob].join("/");
    let glob = segments[first_glob..].join("/");
    Some((if base.is_empty() { ".".to_string() } else { base }, glob))
}

fn compile(files: &str) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in expand_alternatives(files) {
        let glob = GlobBuilder::new(&pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| Error::InvalidPattern {
                pattern: files.to_string(),
                reason: e.to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| Error::InvalidPattern {
        pattern: files.to_string(),
        reason: e.to_string(),
    })
}

/// Expand `@(a|b)` and `{a,b}` groups, nested ones included, into flat
/// patterns. The glob engine rejects nested alternation.
pub fn expand_alternatives(pattern: &str) -> Vec<String> {
    let Some((start, open_len)) = find_group(pattern) else {
        return vec![pattern.to_string()];
    };
    let body_start = start + open_len;
    let Some(end) = find_group_end(pattern, body_start) else {
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..start];
    let suffix = &pattern[end + 1..];
    let mut expanded = Vec::new();
    for alternative in split_top_level(&pattern[body_start..end]) {
        for tail in expand_alternatives(&format!("{}{}", alternative, suffix)) {
            expanded.push(format!("{}{}", prefix, tail));
        }
    }
    expanded
}

fn find_group(pattern: &str) -> Option<(usize, usize)> {
    let bytes = pattern.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'{' => return Some((i, 1)),
            b'@' if bytes.get(i + 1) == Some(&b'(') => return Some((i, 2)),
            _ => {}
        }
    }
    None
}

fn find_group_end(pattern: &str, body_start: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in pattern[body_start..].char_indices() {
        match c {
            '{' | '(' => depth += 1,
            '}' | ')' if depth == 0 => return Some(body_start + i),
            '}' | ')' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut last = 0;
    for (i, c) in body.char_indices() {
        match c {
            '{' | '(' => depth += 1,
            '}' | ')' => depth = depth.saturating_sub(1),
            '|' | ',' if depth == 0 => {
                parts.push(&body[last..i]);
                last = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[last..]);
    parts
}

/// Resolve `.` and `..` without touching the filesystem
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_nested_extglob() {
        let mut patterns = expand_alternatives(DEFAULT_FILES);
        patterns.sort();
        assert_eq!(
            patterns,
            vec![
                "**/*.mdx",
                "**/*.stories.js",
                "**/*.stories.jsx",
                "**/*.stories.mjs",
                "**/*.stories.ts",
                "**/*.stories.tsx",
            ]
        );
    }

    #[test]
    fn test_expand_braces() {
        assert_eq!(
            expand_alternatives("*.stories.{js,jsx}"),
            vec!["*.stories.js", "*.stories.jsx"]
        );
        assert_eq!(expand_alternatives("plain/*.js"), vec!["plain/*.js"]);
    }

    #[test]
    fn test_normalize_glob_entry() {
        let config_dir = Path::new("/project/.storybook");
        let spec = StoriesSpecifier::normalize(
            &StoriesEntry::Pattern("../stories/*.stories.@(js|jsx)".to_string()),
            config_dir,
        )
        .unwrap();

        assert_eq!(spec.directory, PathBuf::from("/project/stories"));
        assert_eq!(spec.files, "*.stories.@(js|jsx)");
        assert!(spec.matches(Path::new("/project/stories/Button.stories.jsx")));
        assert!(!spec.matches(Path::new("/project/stories/nested/Button.stories.jsx")));
        assert!(!spec.matches(Path::new("/project/stories/Button.jsx")));
        assert!(!spec.matches(Path::new("/elsewhere/Button.stories.jsx")));
    }

    #[test]
    fn test_normalize_directory_entry() {
        let spec = StoriesSpecifier::normalize(
            &StoriesEntry::Specifier {
                directory: "../src/components".to_string(),
                files: None,
                title_prefix: Some("Design System".to_string()),
            },
            Path::new("/project/.storybook"),
        )
        .unwrap();

        assert_eq!(spec.title_prefix, "Design System");
        assert!(spec.matches(Path::new("/project/src/components/Button.stories.tsx")));
        assert!(spec.matches(Path::new("/project/src/components/forms/Input.stories.ts")));
        assert!(spec.matches(Path::new("/project/src/components/Intro.mdx")));
        assert!(!spec.matches(Path::new("/project/src/components/Button.tsx")));
    }

    #[test]
    fn test_entry_deserialization() {
        let entries: Vec<StoriesEntry> = serde_json::from_value(serde_json::json!([
            "../stories/**/*.stories.jsx",
            { "directory": "../lib", "titlePrefix": "Lib" }
        ]))
        .unwrap();

        assert_eq!(entries[0], StoriesEntry::Pattern("../stories/**/*.stories.jsx".to_string()));
        assert_eq!(
            entries[1],
            StoriesEntry::Specifier {
                directory: "../lib".to_string(),
                files: None,
                title_prefix: Some("Lib".to_string()),
            }
        );
    }
}
