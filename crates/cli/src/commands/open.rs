//! `storyrun open` and `storyrun docs`: drive a visible browser to one story

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use tracing::warn;

use storyrun_e2e::{BrowserSession, RenderConfig, Renderer, WebDriverSession};

use super::{shutdown, Context};
use crate::output::{print_info, print_success};

#[derive(Args, Debug)]
pub struct OpenArgs {
    /// Story id, e.g. example-button--primary
    pub story_id: String,
}

#[derive(Args, Debug)]
pub struct DocsArgs {
    /// Story file whose docs page is mounted
    pub path: PathBuf,
}

async fn connect(ctx: &mut Context) -> Result<Renderer<WebDriverSession>> {
    ctx.settings.webdriver.headless = false;
    let session = WebDriverSession::connect(&ctx.settings.webdriver).await?;
    Ok(Renderer::new(session, RenderConfig::from(&ctx.settings)))
}

async fn hold_until_interrupted(renderer: &Renderer<WebDriverSession>) -> Result<()> {
    print_info("Press Ctrl-C to close the browser.");
    tokio::signal::ctrl_c()
        .await
        .context("Cannot listen for Ctrl-C")?;
    if let Err(err) = renderer.session().close().await {
        warn!("Could not close the browser session: {}", err);
    }
    Ok(())
}

pub async fn execute_open(args: OpenArgs, mut ctx: Context) -> Result<u8> {
    let server = ctx.ensure_catalog().await?;
    let renderer = connect(&mut ctx).await?;

    renderer.open_story(&args.story_id).await?;
    print_success(&format!("Opened {}", args.story_id));

    hold_until_interrupted(&renderer).await?;
    shutdown(server).await;
    Ok(0)
}

pub async fn execute_docs(args: DocsArgs, mut ctx: Context) -> Result<u8> {
    let (_, parser) = ctx.catalog()?;
    let server = ctx.ensure_catalog().await?;
    let renderer = connect(&mut ctx).await?;

    let path = ctx.working_dir.join(&args.path);
    let mounted = match renderer.mount_docs(&path, &parser).await {
        Ok(mounted) => mounted,
        Err(err) => {
            let _ = renderer.session().close().await;
            shutdown(server).await;
            return Err(err.into());
        }
    };
    print_success(&format!("Mounted docs page {}", mounted.story_id));

    hold_until_interrupted(&renderer).await?;
    shutdown(server).await;
    Ok(0)
}
