//! Error types for story rendering and auditing

use std::time::Duration;

use thiserror::Error;

/// Where the accessibility rules are documented
pub const RULE_DESCRIPTIONS_URL: &str =
    "https://github.com/dequelabs/axe-core/blob/develop/doc/rule-descriptions.md";

const MOUNT_HELP: &[&str] = &[
    "run the browser with devtools open and --debug logging (Chrome only)",
    "investigate the error in the browser console",
];

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Catalog server failed to start: {0}")]
    ServerStartup(String),

    #[error("Catalog server at {url} did not respond after {attempts} attempts")]
    ServerHealthCheck { url: String, attempts: usize },

    #[error(
        "The catalog is not running at {url}. Start it first, or set start_catalog_server = true \
         (and optionally port) so it is started for you"
    )]
    CatalogUnreachable { url: String },

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Accessibility(#[from] AccessibilityViolation),

    #[error("Error while running accessibility tests: {0}")]
    Audit(String),

    #[error("Story not found: {0}")]
    StoryNotFound(String),

    #[error("WebDriver error: {0}")]
    WebDriver(#[from] WebDriverError),

    #[error(transparent)]
    Catalog(#[from] storyrun_common::Error),

    #[error(transparent)]
    Parse(#[from] storyrun_common::ParseError),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Whether a stack trace helps the reader. Story failures are fully
    /// described by their message.
    pub fn show_trace(&self) -> bool {
        !matches!(self, E2eError::Render(_) | E2eError::Accessibility(_))
    }

    /// Remediation hints, if the failure is actionable
    pub fn help(&self) -> Vec<String> {
        match self {
            E2eError::Render(err) => err.help(),
            E2eError::Accessibility(err) => vec![err.link.to_string()],
            E2eError::CatalogUnreachable { .. } => vec![
                "storyrun run --start-catalog-server".to_string(),
                "or set `start_catalog_server = true` in storyrun.toml".to_string(),
            ],
            _ => Vec::new(),
        }
    }

    /// Failures that belong to one story and never stop the suite
    pub fn is_story_failure(&self) -> bool {
        matches!(
            self,
            E2eError::Render(_) | E2eError::Accessibility(_) | E2eError::Audit(_)
        )
    }
}

pub type E2eResult<T> = Result<T, E2eError>;

/// A story that did not render
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Could not mount the component story.")]
    NotMounted { story_id: String },

    /// The catalog reported an error while rendering; the message already
    /// names the story URL
    #[error("{message}")]
    Story { story_id: String, message: String },

    #[error("Timed out after {} ms waiting for \"{story_id}\" to render", waited.as_millis())]
    Timeout { story_id: String, waited: Duration },

    #[error("Browser error while rendering \"{story_id}\": {source}")]
    Browser {
        story_id: String,
        #[source]
        source: WebDriverError,
    },
}

impl RenderError {
    pub fn story_id(&self) -> &str {
        match self {
            RenderError::NotMounted { story_id }
            | RenderError::Story { story_id, .. }
            | RenderError::Timeout { story_id, .. }
            | RenderError::Browser { story_id, .. } => story_id,
        }
    }

    pub fn show_trace(&self) -> bool {
        false
    }

    pub fn help(&self) -> Vec<String> {
        match self {
            RenderError::NotMounted { .. } => MOUNT_HELP.iter().map(|s| s.to_string()).collect(),
            RenderError::Timeout { .. } => vec![
                "check that the story renders in the catalog without errors".to_string(),
                "raise render.timeout_ms in storyrun.toml for slow stories".to_string(),
            ],
            RenderError::Browser { .. } => {
                vec!["check that the WebDriver endpoint is reachable".to_string()]
            }
            RenderError::Story { .. } => Vec::new(),
        }
    }
}

/// The audit ran and found violations
#[derive(Error, Debug)]
#[error("There are accessibility violations; please see the complete report for details.")]
pub struct AccessibilityViolation {
    pub component: String,
    pub violations: usize,
    pub link: &'static str,
}

impl AccessibilityViolation {
    pub fn new(component: impl Into<String>, violations: usize) -> Self {
        Self {
            component: component.into(),
            violations,
            link: RULE_DESCRIPTIONS_URL,
        }
    }

    /// Retrying cannot change the outcome
    pub fn is_retryable(&self) -> bool {
        false
    }

    pub fn show_trace(&self) -> bool {
        false
    }
}

/// Failure reported by the WebDriver endpoint or the transport to it
#[derive(Error, Debug)]
pub enum WebDriverError {
    #[error("{error}: {message}")]
    Protocol { error: String, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl WebDriverError {
    /// W3C error code, for protocol errors
    pub fn code(&self) -> Option<&str> {
        match self {
            WebDriverError::Protocol { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_script_timeout(&self) -> bool {
        self.code() == Some("script timeout")
    }

    /// The async script channel broke but the page may still be polled:
    /// script timeouts, page unloads and slow transports.
    pub fn is_channel_failure(&self) -> bool {
        match self {
            WebDriverError::Protocol { error, .. } => matches!(
                error.as_str(),
                "script timeout" | "javascript error" | "unexpected alert open"
            ),
            WebDriverError::Transport(err) => err.is_timeout(),
            WebDriverError::UnexpectedResponse(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_story_failures_hide_trace() {
        let err = E2eError::from(RenderError::NotMounted {
            story_id: "a--b".to_string(),
        });
        assert!(!err.show_trace());
        assert!(err.is_story_failure());
        assert_eq!(err.help().len(), 2);

        let err = E2eError::from(AccessibilityViolation::new("a--b.B", 3));
        assert!(!err.show_trace());
        assert_eq!(err.help(), vec![RULE_DESCRIPTIONS_URL.to_string()]);
        assert_eq!(
            err.to_string(),
            "There are accessibility violations; please see the complete report for details."
        );
    }

    #[test_case("script timeout", true ; "script timeout")]
    #[test_case("javascript error", true ; "page unload")]
    #[test_case("unexpected alert open", true ; "alert")]
    #[test_case("invalid session id", false ; "dead session")]
    #[test_case("no such window", false ; "closed window")]
    fn test_channel_failure_classification(code: &str, recoverable: bool) {
        let err = WebDriverError::Protocol {
            error: code.to_string(),
            message: String::new(),
        };
        assert_eq!(err.is_channel_failure(), recoverable);
        assert_eq!(err.is_script_timeout(), code == "script timeout");
    }
}
