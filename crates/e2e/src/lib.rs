//! storyrun browser side
//!
//! Renders catalog stories in a real browser over the W3C WebDriver
//! protocol and checks each one:
//! - builds a test per story from parsed story files
//! - navigates to the story and injects a page-context listener that waits
//!   on the catalog's event channel for one settled outcome
//! - runs an axe-core audit for stories that carry accessibility settings
//! - optionally starts the catalog dev server and writes suite results
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  StoryRunner                                                │
//! │    └── for each TestDescriptor → StoryTest::run             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Renderer<S: BrowserSession>                                │
//! │    ├── navigate <base>/iframe.html?viewMode=..&id=..        │
//! │    ├── execute_async(listener.js, options) ── page ──┐      │
//! │    │     storyRendered / storyErrored / ... → done   │      │
//! │    ├── poll window.__storyRunnerState → Settler ◄────┘      │
//! │    └── audit::check (axe-core)                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod audit;
pub mod descriptor;
pub mod error;
pub mod listener;
pub mod render;
pub mod runner;
pub mod server;
pub mod webdriver;

pub use audit::{AuditCollector, AuditReport, ResultCollector};
pub use descriptor::{build_descriptors, StoryTest, TestDescriptor};
pub use error::{AccessibilityViolation, E2eError, E2eResult, RenderError, WebDriverError};
pub use listener::{RenderOutcome, Settler};
pub use render::{RenderConfig, RenderedStory, Renderer};
pub use runner::{StoryResult, StoryRunner, SuiteResult};
pub use server::{ensure_catalog, CatalogServer};
pub use webdriver::{BrowserSession, ElementRef, WebDriverSession};
