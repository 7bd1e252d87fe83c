//! Minimal W3C WebDriver client
//!
//! Only the commands the renderer needs: navigation, script execution,
//! element lookup and frame switching. [`BrowserSession`] is the seam the
//! renderer is generic over, so tests can drive it without a browser.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use storyrun_common::config::WebDriverSettings;

use crate::error::WebDriverError;

/// Key of a web element reference in the W3C wire format
pub const ELEMENT_KEY: &str = "element-6066-11e4-a4cf-4ce97de4c1ef";

/// Opaque handle to an element living in the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
    #[serde(rename = "element-6066-11e4-a4cf-4ce97de4c1ef")]
    pub id: String,
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), WebDriverError>;

    /// Run a synchronous script and return its JSON result
    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, WebDriverError>;

    /// Run a script that reports through the callback appended to its arguments
    async fn execute_async(&self, script: &str, args: Vec<Value>)
        -> Result<Value, WebDriverError>;

    async fn set_script_timeout(&self, timeout: Duration) -> Result<(), WebDriverError>;

    async fn find_element(&self, css_selector: &str) -> Result<ElementRef, WebDriverError>;

    /// Switch into a frame element, or back to the top-level document
    async fn switch_to_frame(&self, frame: Option<&ElementRef>) -> Result<(), WebDriverError>;

    async fn close(&self) -> Result<(), WebDriverError>;
}

/// A session on a remote WebDriver endpoint
pub struct WebDriverSession {
    client: reqwest::Client,
    session_url: Url,
    session_id: String,
}

#[derive(Deserialize)]
struct Response {
    value: Value,
}

#[derive(Deserialize)]
struct ErrorValue {
    error: String,
    #[serde(default)]
    message: String,
}

impl WebDriverSession {
    /// Open a new session with the configured browser
    pub async fn connect(settings: &WebDriverSettings) -> Result<Self, WebDriverError> {
        let endpoint = Url::parse(&format!("{}/", settings.url.trim_end_matches('/')))
            .map_err(|e| WebDriverError::UnexpectedResponse(format!("invalid endpoint: {}", e)))?;
        let client = reqwest::Client::builder().build()?;

        let body = json!({ "capabilities": { "alwaysMatch": capabilities(settings) } });
        let url = join(&endpoint, "session")?;
        let value = send(&client, Method::POST, url, Some(body)).await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| WebDriverError::UnexpectedResponse(value.to_string()))?
            .to_string();
        let session_url = join(&endpoint, &format!("session/{}/", session_id))?;

        info!("Opened {} WebDriver session {}", settings.browser, session_id);
        Ok(Self {
            client,
            session_url,
            session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, WebDriverError> {
        let url = join(&self.session_url, path)?;
        send(&self.client, method, url, body).await
    }
}

fn capabilities(settings: &WebDriverSettings) -> Value {
    let mut caps = json!({ "browserName": settings.browser });
    if settings.headless {
        match settings.browser.as_str() {
            "chrome" | "chromium" | "MicrosoftEdge" => {
                let key = if settings.browser == "MicrosoftEdge" {
                    "ms:edgeOptions"
                } else {
                    "goog:chromeOptions"
                };
                caps[key] = json!({ "args": ["--headless=new", "--window-size=1280,800"] });
            }
            "firefox" => {
                caps["moz:firefoxOptions"] = json!({ "args": ["-headless"] });
            }
            _ => {}
        }
    }
    caps
}

fn join(base: &Url, path: &str) -> Result<Url, WebDriverError> {
    base.join(path)
        .map_err(|e| WebDriverError::UnexpectedResponse(format!("invalid command path {}: {}", path, e)))
}

async fn send(
    client: &reqwest::Client,
    method: Method,
    url: Url,
    body: Option<Value>,
) -> Result<Value, WebDriverError> {
    debug!("WebDriver {} {}", method, url.path());
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await?;
    let status = response.status();
    let Response { value } = response.json().await?;

    if status.is_success() {
        return Ok(value);
    }
    match serde_json::from_value::<ErrorValue>(value.clone()) {
        Ok(ErrorValue { error, message }) => Err(WebDriverError::Protocol { error, message }),
        Err(_) => Err(WebDriverError::UnexpectedResponse(format!("{}: {}", status, value))),
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&self, url: &str) -> Result<(), WebDriverError> {
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value, WebDriverError> {
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn execute_async(
        &self,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value, WebDriverError> {
        self.command(
            Method::POST,
            "execute/async",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn set_script_timeout(&self, timeout: Duration) -> Result<(), WebDriverError> {
        self.command(
            Method::POST,
            "timeouts",
            Some(json!({ "script": timeout.as_millis() as u64 })),
        )
        .await
        .map(|_| ())
    }

    async fn find_element(&self, css_selector: &str) -> Result<ElementRef, WebDriverError> {
        let value = self
            .command(
                Method::POST,
                "element",
                Some(json!({ "using": "css selector", "value": css_selector })),
            )
            .await?;
        serde_json::from_value(value.clone())
            .map_err(|_| WebDriverError::UnexpectedResponse(value.to_string()))
    }

    async fn switch_to_frame(&self, frame: Option<&ElementRef>) -> Result<(), WebDriverError> {
        let id = match frame {
            Some(element) => json!(element),
            None => Value::Null,
        };
        self.command(Method::POST, "frame", Some(json!({ "id": id })))
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<(), WebDriverError> {
        debug!("Closing WebDriver session {}", self.session_id);
        let url = self.session_url.clone();
        send(&self.client, Method::DELETE, url, None).await.map(|_| ())
    }
}
