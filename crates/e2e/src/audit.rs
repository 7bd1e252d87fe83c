//! Accessibility audit with axe-core running in the page

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use storyrun_common::config::AccessibilitySettings;
use storyrun_common::AccessibilityConfig;

use crate::error::{AccessibilityViolation, E2eError, E2eResult};
use crate::webdriver::BrowserSession;

/// Element the audit runs against
pub const AUDIT_CONTEXT: &str = "body";

const INJECT_URL_SCRIPT: &str = r#"
var src = arguments[0];
var done = arguments[arguments.length - 1];
if (window.axe) {
  done(true);
  return;
}
var script = document.createElement('script');
script.src = src;
script.onload = function() { done(!!window.axe); };
script.onerror = function() { done(false); };
document.head.appendChild(script);
"#;

const RUN_SCRIPT: &str = r#"
var context = arguments[0];
var options = arguments[1];
var done = arguments[arguments.length - 1];
if (!window.axe) {
  done({ error: 'axe-core is not loaded in the page' });
  return;
}
function summarize(rule) {
  return {
    id: rule.id,
    impact: rule.impact || null,
    help: rule.help || '',
    helpUrl: rule.helpUrl || '',
    nodes: (rule.nodes || []).length
  };
}
window.axe.run(context, options).then(function(results) {
  done({
    passes: results.passes.map(summarize),
    violations: results.violations.map(summarize)
  });
}, function(err) {
  done({ error: String((err && err.message) || err) });
});
"#;

/// One rule result, reduced to what the report shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRule {
    pub id: String,
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub help_url: String,
    /// Number of matched nodes
    #[serde(default)]
    pub nodes: usize,
}

/// Raw reply of the in-page run
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditResults {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub passes: Vec<AuditRule>,
    #[serde(default)]
    pub violations: Vec<AuditRule>,
}

/// Audit outcome for one rendered story
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    /// `<story id>.<export name>`
    pub component: String,
    pub verbose: bool,
    pub passes: Vec<AuditRule>,
    pub violations: Vec<AuditRule>,
}

impl AuditReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Receives audit reports as stories are checked
pub trait ResultCollector: Send + Sync {
    fn record_audit(&self, report: &AuditReport);
}

/// Logs every report and keeps them for the suite summary
#[derive(Default)]
pub struct AuditCollector {
    reports: Mutex<Vec<AuditReport>>,
}

impl AuditCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<AuditReport> {
        self.reports.lock().clone()
    }

    /// Reports recorded for one component
    pub fn find(&self, component: &str) -> Option<AuditReport> {
        self.reports
            .lock()
            .iter()
            .rev()
            .find(|report| report.component == component)
            .cloned()
    }
}

impl ResultCollector for AuditCollector {
    fn record_audit(&self, report: &AuditReport) {
        info!(
            "Accessibility: {} passed, {} violation(s) in {}",
            report.passes.len(),
            report.violations.len(),
            report.component
        );
        for rule in &report.violations {
            warn!(
                "  ✗ {} [{}] {} ({} node(s)) {}",
                rule.id,
                rule.impact.as_deref().unwrap_or("unknown"),
                rule.help,
                rule.nodes,
                rule.help_url
            );
        }
        if report.verbose {
            for rule in &report.passes {
                info!("  ✓ {} {}", rule.id, rule.help);
            }
        }
        self.reports.lock().push(report.clone());
    }
}

/// Load axe-core into the current page
pub async fn inject<S: BrowserSession + ?Sized>(
    session: &S,
    settings: &AccessibilitySettings,
) -> E2eResult<()> {
    if let Some(path) = &settings.axe_source {
        debug!("Injecting axe-core from {}", path.display());
        let source = std::fs::read_to_string(path)?;
        session.execute(&source, Vec::new()).await?;
        return Ok(());
    }

    debug!("Injecting axe-core from {}", settings.axe_url);
    let loaded = session
        .execute_async(INJECT_URL_SCRIPT, vec![Value::String(settings.axe_url.clone())])
        .await?;
    if loaded.as_bool() != Some(true) {
        return Err(E2eError::Audit(format!(
            "could not load axe-core from {}",
            settings.axe_url
        )));
    }
    Ok(())
}

/// Run the audit against `context` with engine options
pub async fn run<S: BrowserSession + ?Sized>(
    session: &S,
    context: &str,
    options: Value,
) -> E2eResult<AuditResults> {
    let value = session
        .execute_async(RUN_SCRIPT, vec![Value::String(context.to_string()), options])
        .await?;
    Ok(serde_json::from_value(value)?)
}

/// Engine options for a story: opaque `options`, then the `config` block
/// and the rule overrides
pub fn run_options(config: &AccessibilityConfig) -> Value {
    let mut options = match &config.options {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if let Value::Object(audit) = config.audit_options() {
        for (key, value) in audit {
            if key != "runAssertions" {
                options.insert(key, value);
            }
        }
    }
    Value::Object(options)
}

/// Inject, run, report and fail on violations
pub async fn check<S: BrowserSession + ?Sized>(
    session: &S,
    settings: &AccessibilitySettings,
    config: &AccessibilityConfig,
    component: &str,
    collector: &dyn ResultCollector,
) -> E2eResult<AuditReport> {
    // Setup failures belong to this story, not the suite
    let results = async {
        inject(session, settings).await?;
        run(session, AUDIT_CONTEXT, run_options(config)).await
    }
    .await
    .map_err(|err| match err {
        E2eError::Audit(_) => err,
        other => E2eError::Audit(format!("could not audit {}: {}", component, other)),
    })?;

    if let Some(error) = results.error {
        return Err(E2eError::Audit(format!("axe.run(): {}", error)));
    }

    let report = AuditReport {
        component: component.to_string(),
        verbose: config.verbose,
        passes: results.passes,
        violations: results.violations,
    };
    collector.record_audit(&report);

    if !report.passed() {
        return Err(AccessibilityViolation::new(component, report.violations.len()).into());
    }
    Ok(report)
}
