//! CLI Commands

pub mod list;
pub mod open;
pub mod run;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use tracing::warn;

use storyrun_common::Settings;
use storyrun_e2e::{CatalogServer, E2eError};
use storyrun_stories::{CatalogMetadata, CatalogService, StoryParser};

use crate::output::OutputFormat;

/// Settings overrides shared by every command
#[derive(Args, Debug, Default, Clone)]
pub struct SettingsArgs {
    /// Directory holding the catalog's main.* configuration
    #[arg(long, env = "STORYRUN_CATALOG_CONFIG_DIR", global = true)]
    pub catalog_config_dir: Option<PathBuf>,

    /// URL of the running catalog
    #[arg(long, env = "STORYRUN_CATALOG_SERVER_URL", global = true)]
    pub catalog_server_url: Option<String>,

    /// Do not log story files that fail to parse
    #[arg(long, env = "STORYRUN_HIDE_PARSE_ERRORS", global = true)]
    pub hide_parse_errors: bool,

    /// Stop on the first story file that fails to parse
    #[arg(long, env = "STORYRUN_FAIL_ON_PARSE_ERROR", global = true)]
    pub fail_on_parse_error: bool,

    /// Also discover documentation-only (.mdx) files
    #[arg(long, env = "STORYRUN_INCLUDE_DOCS_FILES", global = true)]
    pub include_docs_files: bool,

    /// WebDriver remote end
    #[arg(long, env = "STORYRUN_WEBDRIVER_URL", global = true)]
    pub webdriver_url: Option<String>,

    /// Browser to request from the WebDriver endpoint
    #[arg(long, env = "STORYRUN_BROWSER", global = true)]
    pub browser: Option<String>,

    /// Show the browser window
    #[arg(long, env = "STORYRUN_HEADED", global = true)]
    pub headed: bool,
}

impl SettingsArgs {
    /// Apply flags on top of file settings
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(dir) = &self.catalog_config_dir {
            settings.catalog_config_dir = dir.clone();
        }
        if let Some(url) = &self.catalog_server_url {
            settings.catalog_server_url = url.clone();
        }
        if let Some(url) = &self.webdriver_url {
            settings.webdriver.url = url.clone();
        }
        if let Some(browser) = &self.browser {
            settings.webdriver.browser = browser.clone();
        }
        settings.hide_parse_errors |= self.hide_parse_errors;
        settings.fail_on_parse_error |= self.fail_on_parse_error;
        if self.include_docs_files {
            settings.skip_docs_files = false;
        }
        if self.headed {
            settings.webdriver.headless = false;
        }
    }
}

/// What every command runs with
pub struct Context {
    pub settings: Settings,
    pub working_dir: PathBuf,
    pub format: OutputFormat,
}

impl Context {
    pub fn load(
        config: &Path,
        overrides: &SettingsArgs,
        format: OutputFormat,
    ) -> Result<Self> {
        let working_dir = std::env::current_dir().context("Cannot read working directory")?;
        let mut settings = Settings::load(&working_dir.join(config))?;
        overrides.apply(&mut settings);
        Ok(Self {
            settings,
            working_dir,
            format,
        })
    }

    /// Resolve the catalog and build a parser over it
    pub fn catalog(&self) -> Result<(Arc<CatalogMetadata>, StoryParser)> {
        let service = CatalogService::new(&self.settings, &self.working_dir);
        let metadata = service.metadata()?;
        let parser = StoryParser::new(Arc::clone(&metadata), self.settings.hide_parse_errors);
        Ok((metadata, parser))
    }

    /// Pre-flight the catalog; a server started here replaces the configured URL
    pub async fn ensure_catalog(&mut self) -> Result<Option<CatalogServer>> {
        let server = storyrun_e2e::ensure_catalog(&self.settings, &self.working_dir).await?;
        if let Some(server) = &server {
            self.settings.catalog_server_url = format!("{}/", server.base_url());
        }
        Ok(server)
    }
}

/// Stop a catalog server this command started
pub async fn shutdown(server: Option<CatalogServer>) {
    if let Some(mut server) = server {
        if let Err(err) = server.stop().await {
            warn!("Could not stop the catalog server: {}", err);
        }
    }
}

/// Process exit code for a failed command
pub fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(err) = err.downcast_ref::<storyrun_common::Error>() {
        if err.is_fatal() {
            1
        } else {
            2
        }
    } else if let Some(err) = err.downcast_ref::<E2eError>() {
        match err {
            E2eError::Catalog(inner) if inner.is_fatal() => 1,
            E2eError::CatalogUnreachable { .. }
            | E2eError::ServerStartup(_)
            | E2eError::ServerHealthCheck { .. }
            | E2eError::Parse(_) => 1,
            err if err.is_story_failure() => 1,
            _ => 2,
        }
    } else {
        2
    }
}

/// Hints worth printing under an error
pub fn help(err: &anyhow::Error) -> Vec<String> {
    err.downcast_ref::<E2eError>()
        .map(E2eError::help)
        .unwrap_or_default()
}

/// Story failures are fully described by their message
pub fn show_trace(err: &anyhow::Error) -> bool {
    err.downcast_ref::<E2eError>()
        .map_or(true, E2eError::show_trace)
}
