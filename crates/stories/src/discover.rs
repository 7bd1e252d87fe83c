//! Story file discovery

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::specifier::StoriesSpecifier;

/// Directory names never descended into
const SKIPPED_DIRS: &[&str] = &[".git", "node_modules"];

/// Walk `root_dir` and return every file selected by at least one specifier.
///
/// `.mdx` files are dropped when `skip_docs_files` is set. The result is
/// absolute and sorted.
pub fn discover(
    root_dir: &Path,
    specifiers: &[StoriesSpecifier],
    skip_docs_files: bool,
) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root_dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable path during discovery: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(DirEntry::into_path)
        .filter(|path| !(skip_docs_files && is_docs_file(path)))
        .filter(|path| specifiers.iter().any(|specifier| specifier.matches(path)))
        .collect();

    files.sort();
    debug!("Discovered {} story file(s) below {}", files.len(), root_dir.display());
    files
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| SKIPPED_DIRS.contains(&name))
            .unwrap_or(false)
}

fn is_docs_file(path: &Path) -> bool {
    path.extension().map(|ext| ext == "mdx").unwrap_or(false)
}
