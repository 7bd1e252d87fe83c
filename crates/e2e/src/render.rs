//! Render orchestrator
//!
//! Navigates the browser to a story, runs the page listener and turns its
//! one result into a [`RenderedStory`] or a [`RenderError`]. The whole wait
//! is bounded by `render.timeout_ms`: the async script result is used when
//! it arrives, otherwise the page's recorded signals are polled and replayed
//! through a [`Settler`] until the same deadline.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

use storyrun_common::config::AccessibilitySettings;
use storyrun_common::{Settings, StoryUnit, ViewMode};
use storyrun_stories::StoryParser;

use crate::audit::{self, ResultCollector};
use crate::error::{E2eResult, RenderError, WebDriverError};
use crate::listener::{
    ConsoleEntry, DoneResult, ListenerOptions, PageState, RenderOutcome, Settler, DOCS_ROOT,
    LISTENER_SCRIPT, POLL_SCRIPT, STORY_ROOT,
};
use crate::webdriver::{BrowserSession, ElementRef};

/// Frame the catalog manager renders previews into
pub const PREVIEW_FRAME: &str = "#storybook-preview-iframe";

/// Timing and addressing of renders
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Catalog URL without a trailing slash
    pub base_url: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub debounce: Duration,
    pub fallback: Duration,
    pub show_browser_console: bool,
    pub accessibility: AccessibilitySettings,
}

impl From<&Settings> for RenderConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            base_url: settings.catalog_base_url().to_string(),
            timeout: settings.render.timeout(),
            poll_interval: settings.render.poll_interval(),
            debounce: settings.render.debounce(),
            fallback: settings.render.fallback(),
            show_browser_console: settings.show_browser_console,
            accessibility: settings.accessibility.clone(),
        }
    }
}

/// A story that rendered; displays as `<story id>.<export name>`
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedStory {
    pub story_id: String,
    pub export_name: String,
    pub element: ElementRef,
    /// The catalog reported the story as unchanged rather than re-rendered
    pub unchanged: bool,
}

impl std::fmt::Display for RenderedStory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.story_id, self.export_name)
    }
}

pub struct Renderer<S> {
    session: S,
    config: RenderConfig,
}

impl<S: BrowserSession> Renderer<S> {
    pub fn new(session: S, config: RenderConfig) -> Self {
        Self { session, config }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// `<base>/iframe.html?viewMode=<mode>&id=<id>`
    pub fn story_url(&self, story_id: &str, view_mode: ViewMode) -> E2eResult<Url> {
        let mut url = Url::parse(&format!("{}/iframe.html", self.config.base_url))?;
        url.query_pairs_mut()
            .append_pair("viewMode", view_mode.as_str())
            .append_pair("id", story_id);
        Ok(url)
    }

    /// Render one story, then audit it when it carries an accessibility config
    pub async fn render_story(
        &self,
        unit: &StoryUnit,
        collector: &dyn ResultCollector,
    ) -> E2eResult<RenderedStory> {
        let url = self.story_url(&unit.id, unit.view_mode)?;
        let rendered = self
            .render(url.as_str(), &unit.id, &unit.export_key, unit.view_mode)
            .await?;
        info!("\"{}\" story was rendered successfully.", rendered);

        if let Some(config) = unit.a11y.as_ref().filter(|config| !config.disable) {
            audit::check(
                &self.session,
                &self.config.accessibility,
                config,
                &rendered.to_string(),
                collector,
            )
            .await?;
        }

        Ok(rendered)
    }

    /// `<base>/?path=<path>` in the catalog manager UI
    pub fn manager_url(&self, path: &str) -> E2eResult<Url> {
        let mut url = Url::parse(&format!("{}/", self.config.base_url))?;
        url.query_pairs_mut().append_pair("path", path);
        Ok(url)
    }

    /// Navigate the catalog manager UI to a story
    pub async fn open_story(&self, story_id: &str) -> E2eResult<()> {
        let url = self.manager_url(&format!("/story/{}", story_id))?;
        debug!("Opening {}", url);
        self.session.navigate(url.as_str()).await?;
        Ok(())
    }

    /// Open the docs page of a story file and wait for it to mount
    pub async fn mount_docs(
        &self,
        story_path: &Path,
        parser: &StoryParser,
    ) -> E2eResult<RenderedStory> {
        let meta = parser.parse_meta(story_path)?;
        let slug = docs_slug(&meta.title);
        let url = self.manager_url(&format!("/docs/{}", slug))?;

        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let story_id = slug.as_str();
        let step = |name: &'static str| Step::new(story_id, started, deadline, name);

        step("navigate").run(self.session.navigate(url.as_str())).await?;
        let frame = step("find preview frame")
            .run(self.session.find_element(PREVIEW_FRAME))
            .await?;
        step("switch to preview frame")
            .run(self.session.switch_to_frame(Some(&frame)))
            .await?;
        step("set script timeout")
            .run(self.session.set_script_timeout(self.config.timeout))
            .await?;

        let options = self.listener_options("", ViewMode::Docs, DOCS_ROOT);
        let result = self.await_listener(story_id, &options, started, deadline).await?;
        self.relay_console(story_id, &result.console);

        let rendered = settle(story_id, "docs", result)?;
        info!("Mounted docs page for {}", story_path.display());
        Ok(rendered)
    }

    async fn render(
        &self,
        url: &str,
        story_id: &str,
        export_name: &str,
        view_mode: ViewMode,
    ) -> Result<RenderedStory, RenderError> {
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let step = |name: &'static str| Step::new(story_id, started, deadline, name);

        debug!("Rendering {} ({})", story_id, url);
        step("navigate").run(self.session.navigate(url)).await?;
        step("set script timeout")
            .run(self.session.set_script_timeout(self.config.timeout))
            .await?;

        let options = self.listener_options(story_id, view_mode, STORY_ROOT);
        let result = self.await_listener(story_id, &options, started, deadline).await?;
        self.relay_console(story_id, &result.console);

        settle(story_id, export_name, result)
    }

    fn listener_options(&self, story_id: &str, view_mode: ViewMode, root: &str) -> ListenerOptions {
        ListenerOptions {
            base_url: self.config.base_url.clone(),
            story_id: story_id.to_string(),
            view_mode,
            root_selector: root.to_string(),
            debounce_ms: self.config.debounce.as_millis() as u64,
            fallback_ms: self.config.fallback.as_millis() as u64,
            capture_console: self.config.show_browser_console,
        }
    }

    async fn await_listener(
        &self,
        story_id: &str,
        options: &ListenerOptions,
        started: Instant,
        deadline: Instant,
    ) -> Result<DoneResult, RenderError> {
        let args = vec![listener_args(options)];

        match timeout_at(deadline, self.session.execute_async(LISTENER_SCRIPT, args)).await {
            Ok(Ok(value)) => return decode(story_id, value),
            Ok(Err(err)) if err.is_channel_failure() => {
                warn!("Listener channel for \"{}\" failed ({}), polling the page", story_id, err);
            }
            Ok(Err(err)) => {
                return Err(RenderError::Browser {
                    story_id: story_id.to_string(),
                    source: err,
                })
            }
            Err(_) => debug!("Listener for \"{}\" did not report before the deadline", story_id),
        }

        self.poll(story_id, options, started, deadline).await
    }

    /// Poll the page's recorded signals until a result settles or the
    /// deadline passes
    async fn poll(
        &self,
        story_id: &str,
        options: &ListenerOptions,
        started: Instant,
        deadline: Instant,
    ) -> Result<DoneResult, RenderError> {
        let root = Value::String(options.root_selector.clone());

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(RenderError::Timeout {
                    story_id: story_id.to_string(),
                    waited: now - started,
                });
            }

            match timeout_at(deadline, self.session.execute(POLL_SCRIPT, vec![root.clone()])).await {
                Ok(Ok(value)) => {
                    let state: PageState = serde_json::from_value(value).map_err(|e| {
                        RenderError::Browser {
                            story_id: story_id.to_string(),
                            source: WebDriverError::UnexpectedResponse(e.to_string()),
                        }
                    })?;
                    if let Some(result) =
                        self.inspect(story_id, options, state, started, deadline).await?
                    {
                        return Ok(result);
                    }
                }
                Ok(Err(err)) if err.is_channel_failure() => {
                    debug!("Poll for \"{}\" failed: {}", story_id, err);
                }
                Ok(Err(err)) => {
                    return Err(RenderError::Browser {
                        story_id: story_id.to_string(),
                        source: err,
                    })
                }
                Err(_) => continue,
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(self.config.poll_interval.min(remaining)).await;
        }
    }

    async fn inspect(
        &self,
        story_id: &str,
        options: &ListenerOptions,
        state: PageState,
        started: Instant,
        deadline: Instant,
    ) -> Result<Option<DoneResult>, RenderError> {
        if !state.installed {
            // The page reloaded and dropped the listener; arm a recording-only copy
            debug!("Reinstalling listener for \"{}\"", story_id);
            let reinstall = self
                .session
                .execute(LISTENER_SCRIPT, vec![listener_args(options)]);
            match Step::new(story_id, started, deadline, "reinstall listener")
                .run(reinstall)
                .await
            {
                Err(RenderError::Browser { source, .. }) if source.is_channel_failure() => {}
                Err(err) => return Err(err),
                Ok(_) => {}
            }
            return Ok(None);
        }

        if let Some(result) = state.result {
            return Ok(Some(result));
        }

        let mut settler = Settler::new(
            options.view_mode,
            self.config.debounce,
            self.config.fallback,
        );
        Ok(settler.replay(&state).map(|mut result| {
            result.console = state.console;
            result
        }))
    }

    fn relay_console(&self, story_id: &str, entries: &[ConsoleEntry]) {
        if !self.config.show_browser_console {
            return;
        }
        for entry in entries {
            match entry.level.as_str() {
                "error" => error!(story = story_id, "[browser] {}", entry.message),
                "warn" => warn!(story = story_id, "[browser] {}", entry.message),
                "debug" => debug!(story = story_id, "[browser] {}", entry.message),
                _ => info!(story = story_id, "[browser] {}", entry.message),
            }
        }
    }
}

/// One browser call made while a render deadline is running
struct Step<'a> {
    story_id: &'a str,
    started: Instant,
    deadline: Instant,
    name: &'static str,
}

impl<'a> Step<'a> {
    fn new(story_id: &'a str, started: Instant, deadline: Instant, name: &'static str) -> Self {
        Self {
            story_id,
            started,
            deadline,
            name,
        }
    }

    /// Await `call`, giving up with a timeout once the deadline passes
    async fn run<T>(
        self,
        call: impl Future<Output = Result<T, WebDriverError>>,
    ) -> Result<T, RenderError> {
        match timeout_at(self.deadline, call).await {
            Ok(result) => result.map_err(|source| RenderError::Browser {
                story_id: self.story_id.to_string(),
                source,
            }),
            Err(_) => {
                warn!("\"{}\" timed out during {}", self.story_id, self.name);
                Err(RenderError::Timeout {
                    story_id: self.story_id.to_string(),
                    waited: Instant::now() - self.started,
                })
            }
        }
    }
}

fn listener_args(options: &ListenerOptions) -> Value {
    serde_json::to_value(options).unwrap_or(Value::Null)
}

fn decode(story_id: &str, value: Value) -> Result<DoneResult, RenderError> {
    serde_json::from_value(value).map_err(|e| RenderError::Browser {
        story_id: story_id.to_string(),
        source: WebDriverError::UnexpectedResponse(format!("listener result: {}", e)),
    })
}

fn settle(story_id: &str, export_name: &str, result: DoneResult) -> Result<RenderedStory, RenderError> {
    match RenderOutcome::from(result) {
        RenderOutcome::NotMounted => Err(RenderError::NotMounted {
            story_id: story_id.to_string(),
        }),
        RenderOutcome::Success(element) => Ok(RenderedStory {
            story_id: story_id.to_string(),
            export_name: export_name.to_string(),
            element,
            unchanged: false,
        }),
        RenderOutcome::Unchanged(element) => Ok(RenderedStory {
            story_id: story_id.to_string(),
            export_name: export_name.to_string(),
            element,
            unchanged: true,
        }),
        RenderOutcome::Errored(detail)
        | RenderOutcome::ThrewException(detail)
        | RenderOutcome::Missing(detail)
        | RenderOutcome::PlayFunctionFailed(detail) => Err(RenderError::Story {
            story_id: story_id.to_string(),
            message: detail.message,
        }),
    }
}

/// `Example/Button` → `example-button`
pub fn docs_slug(title: &str) -> String {
    title.to_lowercase().replacen('/', "-", 1)
}
