//! Suite runner: renders every story test on one browser session

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::audit::{AuditCollector, AuditReport};
use crate::descriptor::{StoryTest, TestDescriptor};
use crate::error::{E2eError, E2eResult};
use crate::render::Renderer;
use crate::webdriver::BrowserSession;

/// Result of rendering a single story
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryResult {
    pub name: String,
    pub story_id: String,
    pub story_path: PathBuf,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub help: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditReport>,
}

/// Result of running the suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<StoryResult>,
}

impl SuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Runs story tests sequentially
pub struct StoryRunner<S> {
    renderer: Renderer<S>,
    collector: AuditCollector,
    output_dir: PathBuf,
}

impl<S: BrowserSession> StoryRunner<S> {
    pub fn new(renderer: Renderer<S>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            renderer,
            collector: AuditCollector::new(),
            output_dir: output_dir.into(),
        }
    }

    pub fn renderer(&self) -> &Renderer<S> {
        &self.renderer
    }

    pub fn collector(&self) -> &AuditCollector {
        &self.collector
    }

    /// Run every test, keeping only stories whose id contains `filter`
    pub async fn run(
        &self,
        descriptors: &[TestDescriptor],
        filter: Option<&str>,
    ) -> E2eResult<SuiteResult> {
        let started_at = Utc::now();
        let start = Instant::now();

        let tests: Vec<StoryTest> = descriptors.iter().flat_map(TestDescriptor::tests).collect();
        let total = tests.len();
        let selected: Vec<&StoryTest> = tests
            .iter()
            .filter(|test| filter.map_or(true, |f| test.unit.id.contains(f)))
            .collect();
        let skipped = total - selected.len();

        info!("Running {} stor(ies)...", selected.len());

        let mut results = Vec::with_capacity(selected.len());
        for test in selected {
            let result = self.run_test(test).await?;
            if result.success {
                info!("✓ {} {} ({} ms)", test.unit.id, test.name, result.duration_ms);
            } else {
                error!(
                    "✗ {} {} - {}",
                    test.unit.id,
                    test.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
            results.push(result);
        }

        let passed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - passed;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Story results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        Ok(SuiteResult {
            started_at,
            total,
            passed,
            failed,
            skipped,
            duration_ms,
            results,
        })
    }

    /// Story failures are recorded; anything else stops the suite
    async fn run_test(&self, test: &StoryTest) -> E2eResult<StoryResult> {
        let start = Instant::now();
        let outcome = test.run(&self.renderer, &self.collector).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let mut result = StoryResult {
            name: test.name.clone(),
            story_id: test.unit.id.clone(),
            story_path: test.unit.story_path.clone(),
            success: true,
            duration_ms,
            error: None,
            help: Vec::new(),
            audit: None,
        };

        match outcome {
            Ok(rendered) => {
                result.audit = self.collector.find(&rendered.to_string());
            }
            Err(err) if err.is_story_failure() || is_browser_failure(&err) => {
                debug!("{} failed: {:?}", test.unit.id, err);
                result.success = false;
                result.help = err.help();
                result.error = Some(err.to_string());
                if let E2eError::Accessibility(violation) = &err {
                    result.audit = self.collector.find(&violation.component);
                }
            }
            Err(err) => return Err(err),
        }

        Ok(result)
    }

    /// Write results as JSON to `<output_dir>/test-results.json`
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        write_results(&self.output_dir, results)
    }
}

fn is_browser_failure(err: &E2eError) -> bool {
    matches!(err, E2eError::WebDriver(e) if e.is_channel_failure())
}

pub fn write_results(output_dir: &Path, results: &SuiteResult) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let path = output_dir.join("test-results.json");
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(&path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_results() {
        let dir = tempfile::tempdir().unwrap();
        let suite = SuiteResult {
            started_at: Utc::now(),
            total: 1,
            passed: 0,
            failed: 1,
            skipped: 0,
            duration_ms: 12,
            results: vec![StoryResult {
                name: "\"Primary\" should render".to_string(),
                story_id: "example-button--primary".to_string(),
                story_path: PathBuf::from("/repo/Button.stories.js"),
                success: false,
                duration_ms: 12,
                error: Some("Could not mount the component story.".to_string()),
                help: Vec::new(),
                audit: None,
            }],
        };

        let path = write_results(&dir.path().join("out"), &suite).unwrap();
        let written: SuiteResult =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert!(!written.success());
        assert_eq!(written.results[0].story_id, "example-button--primary");
        assert!(written.results[0].help.is_empty());
    }
}
