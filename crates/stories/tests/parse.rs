//! End-to-end tests for discovery and metadata extraction

use std::path::{Path, PathBuf};
use std::sync::Arc;

use storyrun_common::{ParseCause, Settings, ViewMode};
use storyrun_stories::{CatalogService, ParseMode, Parsed, StoryParser};
use tempfile::TempDir;
use test_case::test_case;

const BUTTON_STORIES: &str = r#"
import React from 'react';
import { Button } from './Button';

export default {
  title: "Example/Button",
  component: Button,
  parameters: {
    a11y: {
      element: '#root',
      verbose: false,
      config: {
        rules: [
          { id: 'autocomplete-valid', selector: '*:not([autocomplete="nope"])' },
          { id: 'image-alt', enabled: false },
        ],
      },
      options: {},
    },
  },
};

const Template = (args) => <Button {...args} />;

export const Primary = Template.bind({});
Primary.args = { primary: true, label: 'Button' };

export const EmptyButton = Button.bind({});
EmptyButton.args = { size: 'small' };
EmptyButton.parameters = {
  a11y: {
    config: {
      rules: [{ id: 'button-name', enabled: false }],
    },
  },
};

export const __page = () => null;
"#;

const FORM_STORIES: &str = r#"
import Form from './Form.jsx';

export default {
  title: 'Form',
  component: Form,
};

const Template = (args) => <Form {...args} />;

export const EmptyForm = Template.bind({});
export const FilledForm = Template.bind({});
"#;

struct Project {
    _dir: TempDir,
    root: PathBuf,
}

impl Project {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let project = Self { _dir: dir, root };
        project.write(
            ".storybook/main.js",
            "module.exports = {\n  stories: ['../stories/**/*.stories.@(js|jsx|ts|tsx)'],\n};\n",
        );
        project
    }

    fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn parser(&self) -> StoryParser {
        let service = CatalogService::new(&Settings::default(), &self.root);
        StoryParser::new(service.metadata().unwrap(), true)
    }
}

#[test]
fn test_discovers_story_files() {
    let project = Project::new();
    project.write("stories/Button.stories.jsx", BUTTON_STORIES);
    project.write("stories/forms/Form.stories.jsx", FORM_STORIES);
    project.write("stories/Button.jsx", "export const Button = () => null;");
    project.write("node_modules/pkg/stories/Dep.stories.js", FORM_STORIES);

    let service = CatalogService::new(&Settings::default(), &project.root);
    let metadata = service.metadata().unwrap();

    assert_eq!(
        metadata.story_files,
        vec![
            project.root.join("stories/Button.stories.jsx"),
            project.root.join("stories/forms/Form.stories.jsx"),
        ]
    );
}

#[test]
fn test_missing_catalog_config_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let service = CatalogService::new(&Settings::default(), dir.path());
    let err = service.metadata().unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("--catalog-config-dir"));
}

#[test]
fn test_parses_story_units() {
    let project = Project::new();
    let path = project.write("stories/Button.stories.jsx", BUTTON_STORIES);

    let descriptor = project.parser().parse_file(&path).unwrap();

    assert_eq!(descriptor.title, "Example/Button");
    assert_eq!(descriptor.path, path);
    let keys: Vec<&str> = descriptor.stories.iter().map(|s| s.export_key.as_str()).collect();
    assert_eq!(keys, vec!["Primary", "EmptyButton"]);

    let empty = descriptor.get("EmptyButton").unwrap();
    assert_eq!(empty.id, "example-button--empty-button");
    assert_eq!(empty.name, "Empty Button");
    assert_eq!(empty.view_mode, ViewMode::Story);
    assert_eq!(empty.story_path, path);
}

#[test]
fn test_page_export_is_never_a_unit() {
    let project = Project::new();
    let path = project.write("stories/Button.stories.jsx", BUTTON_STORIES);

    let descriptor = project.parser().parse_file(&path).unwrap();
    assert!(descriptor.get("__page").is_none());
}

#[test]
fn test_meta_and_story_rules_are_merged() {
    let project = Project::new();
    let path = project.write("stories/Button.stories.jsx", BUTTON_STORIES);

    let descriptor = project.parser().parse_file(&path).unwrap();

    let empty = descriptor.get("EmptyButton").unwrap().a11y.as_ref().unwrap();
    assert_eq!(empty.element.as_deref(), Some("#root"));
    assert_eq!(empty.rules["image-alt"].enabled, Some(false));
    assert_eq!(empty.rules["button-name"].enabled, Some(false));
    assert_eq!(
        empty.rules["autocomplete-valid"].selector.as_deref(),
        Some("*:not([autocomplete=\"nope\"])")
    );

    let primary = descriptor.get("Primary").unwrap().a11y.as_ref().unwrap();
    assert!(primary.rules.contains_key("image-alt"));
    assert!(!primary.rules.contains_key("button-name"));
}

#[test]
fn test_stories_without_a11y_have_none() {
    let project = Project::new();
    let path = project.write("stories/Form.stories.jsx", FORM_STORIES);

    let descriptor = project.parser().parse_file(&path).unwrap();
    assert_eq!(descriptor.stories.len(), 2);
    assert!(descriptor.stories.iter().all(|story| story.a11y.is_none()));
    assert_eq!(descriptor.stories[1].id, "form--filled-form");
}

#[test_case("{}", ViewMode::Story ; "no parameters")]
#[test_case("{ docs: {} }", ViewMode::Docs ; "docs enabled")]
#[test_case("{ docs: { disabled: true } }", ViewMode::Story ; "docs disabled")]
#[test_case("{ viewMode: 'docs', docs: { disabled: true } }", ViewMode::Docs ; "explicit view mode")]
#[test_case("{ viewMode: 'story', docs: {} }", ViewMode::Story ; "explicit story mode")]
fn test_view_mode_resolution(parameters: &str, expected: ViewMode) {
    let project = Project::new();
    let path = project.write(
        "stories/Mode.stories.tsx",
        &format!(
            "export default {{ title: 'Mode' }};\nexport const Only = {{ parameters: {} }};\n",
            parameters
        ),
    );

    let descriptor = project.parser().parse_file(&path).unwrap();
    assert_eq!(descriptor.stories[0].view_mode, expected);
}

#[test]
fn test_meta_only_parse() {
    let project = Project::new();
    let path = project.write("stories/Form.stories.jsx", FORM_STORIES);

    match project.parser().parse(&path, ParseMode::MetaOnly).unwrap() {
        Parsed::Meta(meta) => {
            assert_eq!(meta.title, "Form");
            assert_eq!(meta.csf.exports.len(), 2);
        }
        Parsed::Full(_) => panic!("expected meta-only result"),
    }
}

#[test]
fn test_auto_title_without_user_title() {
    let project = Project::new();
    let path = project.write(
        "stories/forms/Input/Input.stories.tsx",
        "export default {};\nexport const Basic = {};\n",
    );

    let descriptor = project.parser().parse_file(&path).unwrap();
    assert_eq!(descriptor.title, "forms/Input");
    assert_eq!(descriptor.stories[0].id, "forms-input--basic");
}

#[test]
fn test_syntax_error_is_reported_with_path() {
    let project = Project::new();
    let path = project.write(
        "stories/Broken.stories.jsx",
        "export default { title: 'Broken' \nexport const A = {};\n",
    );

    let err = project.parser().parse_file(&path).unwrap_err();
    assert_eq!(err.path, path);
    assert!(matches!(err.cause, ParseCause::Syntax { .. }));
    assert!(err.to_string().contains("Broken.stories.jsx"));
}

#[test]
fn test_unreadable_file() {
    let project = Project::new();
    let err = project
        .parser()
        .parse_file(&project.root.join("stories/Missing.stories.jsx"))
        .unwrap_err();
    assert!(matches!(err.cause, ParseCause::Io(_)));
}

#[test]
fn test_parser_shares_catalog() {
    let project = Project::new();
    let service = CatalogService::new(&Settings::default(), &project.root);
    let metadata = service.metadata().unwrap();
    let parser = StoryParser::new(Arc::clone(&metadata), true);

    assert!(Arc::ptr_eq(&metadata, &service.metadata().unwrap()));
    assert_eq!(parser.catalog().specifiers.len(), 1);
    assert!(Path::new(&parser.catalog().config.path).ends_with(".storybook/main.js"));
}
