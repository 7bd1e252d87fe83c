//! `storyrun run`: render every story and audit the ones that ask for it

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tracing::{info, warn};

use storyrun_e2e::{
    build_descriptors, BrowserSession, RenderConfig, Renderer, StoryResult,
    StoryRunner, SuiteResult, WebDriverSession,
};

use super::{shutdown, Context};
use crate::output::{print_error, print_help, print_list, print_success, OutputFormat, TableDisplay};

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Start the catalog dev server before running
    #[arg(long, env = "STORYRUN_START_CATALOG_SERVER")]
    pub start_catalog_server: bool,

    /// Port for the started catalog server
    #[arg(long, env = "STORYRUN_PORT")]
    pub port: Option<u16>,

    /// Only run stories whose id contains this text
    #[arg(long)]
    pub filter: Option<String>,

    /// Relay the browser console to the log
    #[arg(long, env = "STORYRUN_SHOW_BROWSER_CONSOLE")]
    pub show_browser_console: bool,

    /// Overall render bound per story, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Where test-results.json is written
    #[arg(long, env = "STORYRUN_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,
}

impl RunArgs {
    fn apply(&self, ctx: &mut Context) {
        let settings = &mut ctx.settings;
        settings.start_catalog_server |= self.start_catalog_server;
        settings.show_browser_console |= self.show_browser_console;
        if let Some(port) = self.port {
            settings.port = Some(port);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            settings.render.timeout_ms = timeout_ms;
        }
        if let Some(dir) = &self.output_dir {
            settings.output_dir = dir.clone();
        }
    }
}

/// Table row for one story result
#[derive(Serialize)]
struct ResultRow<'a>(&'a StoryResult);

impl TableDisplay for ResultRow<'_> {
    fn headers() -> Vec<&'static str> {
        vec!["STORY", "TEST", "RESULT", "TIME"]
    }

    fn row(&self) -> Vec<String> {
        let result = self.0;
        vec![
            result.story_id.clone(),
            result.name.clone(),
            if result.success { "passed" } else { "failed" }.to_string(),
            format!("{} ms", result.duration_ms),
        ]
    }
}

pub async fn execute(args: RunArgs, mut ctx: Context) -> Result<u8> {
    args.apply(&mut ctx);

    let (metadata, parser) = ctx.catalog()?;
    let descriptors = build_descriptors(&metadata, &parser, &ctx.settings)?;

    let server = ctx.ensure_catalog().await?;

    let session = WebDriverSession::connect(&ctx.settings.webdriver).await?;
    let renderer = Renderer::new(session, RenderConfig::from(&ctx.settings));
    let runner = StoryRunner::new(renderer, &ctx.settings.output_dir);

    let outcome = runner.run(&descriptors, args.filter.as_deref()).await;
    if let Err(err) = runner.renderer().session().close().await {
        warn!("Could not close the browser session: {}", err);
    }
    shutdown(server).await;

    let suite = outcome?;
    let path = runner.write_results(&suite)?;
    report(&suite, ctx.format);
    info!("Results written to {}", path.display());

    Ok(if suite.success() { 0 } else { 1 })
}

fn report(suite: &SuiteResult, format: OutputFormat) {
    let rows: Vec<ResultRow> = suite.results.iter().map(ResultRow).collect();
    print_list(&rows, format);
    if format != OutputFormat::Table {
        return;
    }

    for result in suite.results.iter().filter(|r| !r.success) {
        print_error(&format!(
            "{}: {}",
            result.story_id,
            result.error.as_deref().unwrap_or("unknown error")
        ));
        for hint in &result.help {
            print_help(hint);
        }
    }

    let summary = format!(
        "{} passed, {} failed, {} skipped ({} ms)",
        suite.passed, suite.failed, suite.skipped, suite.duration_ms
    );
    if suite.success() {
        print_success(&summary);
    } else {
        print_error(&summary);
    }
}
