//! Title resolution for story files

use std::path::Path;

use crate::specifier::StoriesSpecifier;

/// Strategy that names a story file in the catalog's navigation tree.
pub trait TitleResolver: Send + Sync {
    /// `file_name` is the story file's path; `user_title` is the `title`
    /// declared in its default export, if any.
    fn resolve(
        &self,
        file_name: &Path,
        specifiers: &[StoriesSpecifier],
        user_title: Option<&str>,
    ) -> Option<String>;
}

/// The catalog's own rule: the first matching specifier prefixes the user
/// title with its `titlePrefix`, or derives a title from the file's path
/// below the specifier directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoTitle;

impl TitleResolver for AutoTitle {
    fn resolve(
        &self,
        file_name: &Path,
        specifiers: &[StoriesSpecifier],
        user_title: Option<&str>,
    ) -> Option<String> {
        for specifier in specifiers {
            if !specifier.matches(file_name) {
                continue;
            }
            let Some(relative) = specifier.relative(file_name) else {
                continue;
            };
            return Some(match user_title {
                Some(title) => join_title(&specifier.title_prefix, title),
                None => join_title(&specifier.title_prefix, &auto_title(relative)),
            });
        }

        user_title
            .map(String::from)
            .or_else(|| file_name.file_name().map(|n| auto_title(Path::new(n))))
    }
}

fn join_title(prefix: &str, title: &str) -> String {
    let joined = if prefix.is_empty() {
        title.to_string()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), title.trim_start_matches('/'))
    };
    joined.trim_matches('/').to_string()
}

/// `forms/Input/Input.stories.tsx` → `forms/Input`
fn auto_title(relative: &Path) -> String {
    let mut parts: Vec<String> = relative
        .iter()
        .map(|part| part.to_string_lossy().into_owned())
        .collect();

    if let Some(last) = parts.last_mut() {
        *last = strip_extension(last);
    }
    if parts.len() > 1 && parts.last().map(String::as_str) == Some("index") {
        parts.pop();
    }
    if parts.len() > 1 && parts[parts.len() - 1] == parts[parts.len() - 2] {
        parts.pop();
    }

    parts.join("/")
}

fn strip_extension(file_name: &str) -> String {
    let mut pieces: Vec<&str> = file_name.split('.').collect();
    if pieces.len() > 1 {
        pieces.pop();
    }
    if pieces.len() > 1 && pieces.last() == Some(&"stories") {
        pieces.pop();
    }
    pieces.join(".")
}
