//! Story discovery and static metadata extraction
//!
//! Story files are read with tree-sitter and never executed. The pipeline is:
//! [`CatalogService`] resolves the catalog configuration and the list of story
//! files, [`StoryParser`] turns each file into a
//! [`StoryFileDescriptor`](storyrun_common::StoryFileDescriptor).

pub mod catalog;
pub mod csf;
pub mod discover;
pub mod parser;
pub mod property;
pub mod specifier;
pub mod syntax;
pub mod title;

pub use catalog::{CatalogConfig, CatalogMetadata, CatalogService};
pub use csf::{CsfFile, CsfStory};
pub use discover::discover;
pub use parser::{resolve_view_mode, story_a11y, CsfMeta, ParseMode, Parsed, StoryParser};
pub use property::{deep_merge, PropertyNode, Scalar};
pub use specifier::{StoriesEntry, StoriesSpecifier};
pub use title::{AutoTitle, TitleResolver};
