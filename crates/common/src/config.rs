//! Runner settings
//!
//! Settings are read from `storyrun.toml` (all keys optional) and then
//! overridden by command line flags.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Port the catalog dev server listens on when nothing else says otherwise
pub const DEFAULT_CATALOG_PORT: u16 = 6006;

static CATALOG_PORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:localhost|127\.0\.0\.1):(\d+)/?$").expect("valid port regex"));

/// Top-level runner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Spawn the catalog dev server before running stories
    pub start_catalog_server: bool,

    /// Base URL of the running catalog
    pub catalog_server_url: String,

    /// Directory holding the catalog's `main.*` configuration
    pub catalog_config_dir: PathBuf,

    /// Do not log story files that fail to parse
    pub hide_parse_errors: bool,

    /// Abort discovery on the first story file that fails to parse
    pub fail_on_parse_error: bool,

    /// Relay the page's console output through the runner's log
    pub show_browser_console: bool,

    /// Port for a spawned catalog server
    pub port: Option<u16>,

    /// Skip documentation-only (`.mdx`) files during discovery
    pub skip_docs_files: bool,

    /// Command used to start the catalog server; `-p <port>` is appended
    pub catalog_start_command: Vec<String>,

    /// How long to wait for a spawned catalog server to answer
    pub catalog_startup_timeout_secs: u64,

    /// Where suite results are written
    pub output_dir: PathBuf,

    pub webdriver: WebDriverSettings,

    pub render: RenderSettings,

    pub accessibility: AccessibilitySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            start_catalog_server: false,
            catalog_server_url: "http://localhost:6006/".to_string(),
            catalog_config_dir: PathBuf::from(".storybook"),
            hide_parse_errors: false,
            fail_on_parse_error: false,
            show_browser_console: false,
            port: None,
            skip_docs_files: true,
            catalog_start_command: vec!["node_modules/.bin/start-storybook".to_string()],
            catalog_startup_timeout_secs: 120,
            output_dir: PathBuf::from("test-results"),
            webdriver: WebDriverSettings::default(),
            render: RenderSettings::default(),
            accessibility: AccessibilitySettings::default(),
        }
    }
}

/// WebDriver endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDriverSettings {
    /// Remote end URL (chromedriver, geckodriver, selenium grid)
    pub url: String,

    /// `browserName` capability
    pub browser: String,

    pub headless: bool,
}

impl Default for WebDriverSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:4444".to_string(),
            browser: "chrome".to_string(),
            headless: true,
        }
    }
}

/// Timing of the render protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Overall bound for one story render
    pub timeout_ms: u64,

    /// Interval of the host-side signal poll
    pub poll_interval_ms: u64,

    /// Quiet window before a success signal is final
    pub debounce_ms: u64,

    /// Delay before resolving with the current root when no signal arrives
    pub fallback_ms: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 20_000,
            poll_interval_ms: 250,
            debounce_ms: 100,
            fallback_ms: 200,
        }
    }
}

impl RenderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn fallback(&self) -> Duration {
        Duration::from_millis(self.fallback_ms)
    }
}

/// Where the audit engine is loaded from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessibilitySettings {
    /// Local copy of `axe.min.js`; preferred over `axe_url` when set
    pub axe_source: Option<PathBuf>,

    /// Script URL injected when no local copy is configured
    pub axe_url: String,
}

impl Default for AccessibilitySettings {
    fn default() -> Self {
        Self {
            axe_source: None,
            axe_url: "https://cdnjs.cloudflare.com/ajax/libs/axe-core/4.8.4/axe.min.js".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from file, falling back to defaults when it is absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let settings: Self = toml::from_str(&content)?;
            Ok(settings)
        } else {
            tracing::debug!("No settings file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Catalog URL without a trailing slash
    pub fn catalog_base_url(&self) -> &str {
        self.catalog_server_url.trim_end_matches('/')
    }

    /// Port for a spawned catalog: explicit setting, else the URL's port, else 6006
    pub fn catalog_port(&self) -> u16 {
        self.port
            .or_else(|| {
                CATALOG_PORT_RE
                    .captures(&self.catalog_server_url)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse().ok())
            })
            .unwrap_or(DEFAULT_CATALOG_PORT)
    }

    /// Absolute catalog config dir, resolved against `working_dir`
    pub fn catalog_config_dir_in(&self, working_dir: &Path) -> PathBuf {
        if self.catalog_config_dir.is_absolute() {
            self.catalog_config_dir.clone()
        } else {
            working_dir.join(&self.catalog_config_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.catalog_base_url(), "http://localhost:6006");
        assert_eq!(settings.catalog_port(), 6006);
        assert_eq!(settings.render.timeout(), Duration::from_secs(20));
        assert_eq!(settings.render.poll_interval(), Duration::from_millis(250));
        assert!(settings.skip_docs_files);
    }

    #[test]
    fn test_port_from_url() {
        let settings = Settings {
            catalog_server_url: "http://127.0.0.1:8736/".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.catalog_port(), 8736);

        let remote = Settings {
            catalog_server_url: "https://catalog.example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(remote.catalog_port(), DEFAULT_CATALOG_PORT);

        let explicit = Settings {
            port: Some(9001),
            ..settings
        };
        assert_eq!(explicit.catalog_port(), 9001);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storyrun.toml");
        std::fs::write(
            &path,
            r#"
start_catalog_server = true
port = 8736

[render]
debounce_ms = 50
"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert!(settings.start_catalog_server);
        assert_eq!(settings.port, Some(8736));
        assert_eq!(settings.render.debounce_ms, 50);
        assert_eq!(settings.render.fallback_ms, 200);
        assert_eq!(settings.webdriver.browser, "chrome");
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.catalog_config_dir, PathBuf::from(".storybook"));
    }
}
