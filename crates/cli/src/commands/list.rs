//! `storyrun list`: show the stories discovery found

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use storyrun_common::StoryUnit;
use storyrun_e2e::build_descriptors;

use super::Context;
use crate::output::{print_list, TableDisplay};

#[derive(Serialize)]
pub struct StoryRow {
    pub id: String,
    pub name: String,
    pub view_mode: String,
    pub a11y: String,
    pub file: String,
}

impl StoryRow {
    fn new(unit: &StoryUnit, working_dir: &Path) -> Self {
        let a11y = match &unit.a11y {
            None => "-",
            Some(config) if config.disable => "disabled",
            Some(_) => "audit",
        };
        let file = unit
            .story_path
            .strip_prefix(working_dir)
            .unwrap_or(&unit.story_path)
            .display()
            .to_string();

        Self {
            id: unit.id.clone(),
            name: unit.name.clone(),
            view_mode: unit.view_mode.to_string(),
            a11y: a11y.to_string(),
            file,
        }
    }
}

impl TableDisplay for StoryRow {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "NAME", "VIEW MODE", "A11Y", "FILE"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.name.clone(),
            self.view_mode.clone(),
            self.a11y.clone(),
            self.file.clone(),
        ]
    }
}

pub fn execute(ctx: Context) -> Result<u8> {
    let (metadata, parser) = ctx.catalog()?;
    let descriptors = build_descriptors(&metadata, &parser, &ctx.settings)?;

    let rows: Vec<StoryRow> = descriptors
        .iter()
        .flat_map(|descriptor| descriptor.data().stories.iter())
        .map(|unit| StoryRow::new(unit, &ctx.working_dir))
        .collect();
    print_list(&rows, ctx.format);

    Ok(0)
}
