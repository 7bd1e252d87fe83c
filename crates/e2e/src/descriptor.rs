//! Test descriptors built from parsed story files

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use storyrun_common::{ParseCause, ParseError, Settings, StoryFileDescriptor, StoryUnit};
use storyrun_stories::{CatalogMetadata, StoryParser};

use crate::audit::ResultCollector;
use crate::error::E2eResult;
use crate::render::{RenderedStory, Renderer};
use crate::webdriver::BrowserSession;

/// Export names are addressed without whitespace
pub fn normalize_export_name(name: &str) -> String {
    name.split_whitespace().collect()
}

/// The tests one story file contributes
#[derive(Debug, Clone)]
pub struct TestDescriptor {
    file: StoryFileDescriptor,
}

impl TestDescriptor {
    pub fn new(file: StoryFileDescriptor) -> Self {
        Self { file }
    }

    /// Test name for an export
    pub fn name(&self, export_name: &str) -> String {
        format!("\"{}\" should render", export_name)
    }

    /// Only the file this descriptor was built from
    pub fn filter(&self, path: &Path) -> bool {
        self.file.declares(path)
    }

    /// Display names of the stories, whitespace removed
    pub fn exports(&self) -> Vec<String> {
        self.file
            .stories
            .iter()
            .map(|story| normalize_export_name(&story.name))
            .collect()
    }

    pub fn data(&self) -> &StoryFileDescriptor {
        &self.file
    }

    /// Test for one export, addressed by its normalized display name or
    /// its source key
    pub fn create_test(&self, export_name: &str) -> Option<StoryTest> {
        let wanted = normalize_export_name(export_name);
        let unit = self.file.stories.iter().find(|story| {
            normalize_export_name(&story.name) == wanted || story.export_key == export_name
        })?;

        Some(StoryTest {
            name: self.name(&wanted),
            unit: unit.clone(),
        })
    }

    /// Every test of the file in declaration order
    pub fn tests(&self) -> Vec<StoryTest> {
        self.exports()
            .iter()
            .filter_map(|export| self.create_test(export))
            .collect()
    }
}

/// One story render, ready to run
#[derive(Debug, Clone)]
pub struct StoryTest {
    pub name: String,
    pub unit: StoryUnit,
}

impl StoryTest {
    pub async fn run<S: BrowserSession>(
        &self,
        renderer: &Renderer<S>,
        collector: &dyn ResultCollector,
    ) -> E2eResult<RenderedStory> {
        debug!("Running {} ({})", self.name, self.unit.id);
        renderer.render_story(&self.unit, collector).await
    }
}

/// Descriptors for every discovered story file.
///
/// Files that fail to parse are skipped unless `fail_on_parse_error` is set.
/// Story ids are unique across the catalog: a file reusing an id already
/// taken is treated like a file that failed to parse.
pub fn build_descriptors(
    catalog: &CatalogMetadata,
    parser: &StoryParser,
    settings: &Settings,
) -> E2eResult<Vec<TestDescriptor>> {
    let mut descriptors = Vec::with_capacity(catalog.story_files.len());
    let mut seen: HashMap<String, PathBuf> = HashMap::new();

    for path in &catalog.story_files {
        let file = match parser.parse_file(path) {
            Ok(file) if file.is_empty() => {
                debug!("{} declares no stories", path.display());
                continue;
            }
            Ok(file) => file,
            Err(err) if settings.fail_on_parse_error => return Err(err.into()),
            Err(err) => {
                debug!("Skipping {}: {}", err.path.display(), err.cause);
                continue;
            }
        };

        if let Some(cause) = duplicate_id(&file, &seen) {
            let err = ParseError::new(&file.path, cause);
            if settings.fail_on_parse_error {
                return Err(err.into());
            }
            if !settings.hide_parse_errors {
                error!("{}", err);
            }
            continue;
        }

        for story in &file.stories {
            seen.insert(story.id.clone(), file.path.clone());
        }
        descriptors.push(TestDescriptor::new(file));
    }

    Ok(descriptors)
}

fn duplicate_id(file: &StoryFileDescriptor, seen: &HashMap<String, PathBuf>) -> Option<ParseCause> {
    let mut own = HashSet::new();
    file.stories.iter().find_map(|story| {
        let first = match seen.get(&story.id) {
            Some(first) => first.clone(),
            None if !own.insert(story.id.as_str()) => file.path.clone(),
            None => return None,
        };
        Some(ParseCause::DuplicateId {
            id: story.id.clone(),
            first,
        })
    })
}
