//! Page-context render listener
//!
//! [`LISTENER_SCRIPT`] runs inside the catalog preview. It subscribes to the
//! preview channel, debounces success signals and reports one [`DoneResult`].
//! Every signal is also recorded on `window`; [`Settler`] applies the same
//! settlement rules host-side so the recorded signals can be replayed when
//! the async script channel is lost.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use storyrun_common::ViewMode;

use crate::webdriver::ElementRef;

/// Installs the listener. Options travel as the first argument.
pub const LISTENER_SCRIPT: &str = include_str!("../scripts/listener.js");

/// Reads what the listener has recorded so far
pub const POLL_SCRIPT: &str = r#"
var state = window.__storyRunnerState;
if (!state) {
  return { installed: false };
}
var root = document.querySelector(arguments[0]);
return {
  installed: true,
  now: Date.now() - state.startedAt,
  signals: state.signals,
  root: root ? root.firstElementChild : null,
  result: state.result,
  console: state.console
};
"#;

/// Root element of a story render
pub const STORY_ROOT: &str = "#root";

/// Root element of a docs page render
pub const DOCS_ROOT: &str = "#docs-root";

/// JSON options handed to [`LISTENER_SCRIPT`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerOptions {
    pub base_url: String,
    /// Empty when mounting a docs page
    pub story_id: String,
    pub view_mode: ViewMode,
    pub root_selector: String,
    pub debounce_ms: u64,
    pub fallback_ms: u64,
    pub capture_console: bool,
}

/// Events the listener reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelEvent {
    StoryRendered,
    DocsRendered,
    StoryUnchanged,
    StoryErrored,
    StoryThrewException,
    StoryMissing,
    PlayFunctionThrewException,
    /// The preview channel global was not present
    ChannelUnavailable,
}

/// `{name, message}` record of an error raised in the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub name: String,
    pub message: String,
}

/// Payload of a signal: the root element or an engine error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Element(ElementRef),
    Error(ErrorDetail),
}

impl SignalValue {
    pub fn is_error(&self) -> bool {
        matches!(self, SignalValue::Error(_))
    }
}

/// A `console.*` call captured while the listener ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub level: String,
    pub message: String,
}

/// What the listener hands to its completion callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoneResult {
    pub event: ChannelEvent,
    #[serde(default)]
    pub value: Option<SignalValue>,
    #[serde(default)]
    pub console: Vec<ConsoleEntry>,
}

impl DoneResult {
    /// Null roots and engine errors settle without waiting
    pub fn is_terminal(&self) -> bool {
        self.value.as_ref().map(SignalValue::is_error).unwrap_or(true)
    }
}

/// A signal as recorded by the page, `at` milliseconds after installation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedSignal {
    pub event: ChannelEvent,
    pub at: u64,
    #[serde(default)]
    pub value: Option<SignalValue>,
}

/// Snapshot returned by [`POLL_SCRIPT`]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageState {
    pub installed: bool,
    #[serde(default)]
    pub now: u64,
    #[serde(default)]
    pub signals: Vec<RecordedSignal>,
    #[serde(default)]
    pub root: Option<ElementRef>,
    #[serde(default)]
    pub result: Option<DoneResult>,
    #[serde(default)]
    pub console: Vec<ConsoleEntry>,
}

/// The one outcome of a render attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Success(ElementRef),
    Unchanged(ElementRef),
    Errored(ErrorDetail),
    ThrewException(ErrorDetail),
    Missing(ErrorDetail),
    PlayFunctionFailed(ErrorDetail),
    /// The page had no root element to report
    NotMounted,
}

impl From<DoneResult> for RenderOutcome {
    fn from(result: DoneResult) -> Self {
        match (result.event, result.value) {
            (_, None) => RenderOutcome::NotMounted,
            (ChannelEvent::StoryUnchanged, Some(SignalValue::Element(element))) => {
                RenderOutcome::Unchanged(element)
            }
            (_, Some(SignalValue::Element(element))) => RenderOutcome::Success(element),
            (ChannelEvent::StoryThrewException, Some(SignalValue::Error(detail))) => {
                RenderOutcome::ThrewException(detail)
            }
            (ChannelEvent::StoryMissing, Some(SignalValue::Error(detail))) => {
                RenderOutcome::Missing(detail)
            }
            (ChannelEvent::PlayFunctionThrewException, Some(SignalValue::Error(detail))) => {
                RenderOutcome::PlayFunctionFailed(detail)
            }
            (_, Some(SignalValue::Error(detail))) => RenderOutcome::Errored(detail),
        }
    }
}

impl RenderOutcome {
    /// Error record for the failing variants
    pub fn error(&self) -> Option<&ErrorDetail> {
        match self {
            RenderOutcome::Errored(detail)
            | RenderOutcome::ThrewException(detail)
            | RenderOutcome::Missing(detail)
            | RenderOutcome::PlayFunctionFailed(detail) => Some(detail),
            _ => None,
        }
    }

    pub fn element(&self) -> Option<&ElementRef> {
        match self {
            RenderOutcome::Success(element) | RenderOutcome::Unchanged(element) => Some(element),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SettlerState {
    Idle,
    Waiting {
        fallback_at: Option<Duration>,
        pending: Option<(Duration, DoneResult)>,
    },
    Settled,
}

/// Host-side twin of the listener's settlement rules, driven by explicit time.
///
/// `Idle → Waiting → Settled`. Each transition method returns the result
/// exactly once, on the call that settles.
#[derive(Debug, Clone)]
pub struct Settler {
    debounce: Duration,
    fallback: Duration,
    rendered_event: ChannelEvent,
    state: SettlerState,
}

impl Settler {
    pub fn new(view_mode: ViewMode, debounce: Duration, fallback: Duration) -> Self {
        let rendered_event = match view_mode {
            ViewMode::Story => ChannelEvent::StoryRendered,
            ViewMode::Docs => ChannelEvent::DocsRendered,
        };
        Self {
            debounce,
            fallback,
            rendered_event,
            state: SettlerState::Idle,
        }
    }

    /// Subscribe and arm the fallback timer
    pub fn start(&mut self, now: Duration) {
        if self.state == SettlerState::Idle {
            self.state = SettlerState::Waiting {
                fallback_at: Some(now + self.fallback),
                pending: None,
            };
        }
    }

    pub fn is_settled(&self) -> bool {
        self.state == SettlerState::Settled
    }

    /// A channel signal arrived at `now`
    pub fn signal(&mut self, now: Duration, result: DoneResult) -> Option<DoneResult> {
        // Due timers fire before a later signal is seen
        if let Some(done) = self.advance(now, None) {
            return Some(done);
        }
        let SettlerState::Waiting { fallback_at, pending } = &mut self.state else {
            return None;
        };

        *fallback_at = None;
        if result.is_terminal() {
            self.state = SettlerState::Settled;
            return Some(result);
        }
        *pending = Some((now + self.debounce, result));
        None
    }

    /// Fire any timer due at `now`. `root` is the element the fallback
    /// reports; it is looked up only if the fallback fires.
    pub fn advance(
        &mut self,
        now: Duration,
        root: Option<&dyn Fn() -> Option<ElementRef>>,
    ) -> Option<DoneResult> {
        let SettlerState::Waiting { fallback_at, pending } = &mut self.state else {
            return None;
        };

        if let Some((due, _)) = pending {
            if *due <= now {
                let (_, result) = pending.take()?;
                self.state = SettlerState::Settled;
                return Some(result);
            }
        }

        if let Some(due) = fallback_at {
            if *due <= now {
                let value = root.and_then(|lookup| lookup()).map(SignalValue::Element);
                let event = self.rendered_event;
                self.state = SettlerState::Settled;
                return Some(DoneResult {
                    event,
                    value,
                    console: Vec::new(),
                });
            }
        }
        None
    }

    /// Replay the signals a page recorded, then advance to the page's clock
    pub fn replay(&mut self, state: &PageState) -> Option<DoneResult> {
        self.start(Duration::ZERO);
        let root = state.root.clone();
        let lookup = move || root.clone();

        for signal in &state.signals {
            let result = DoneResult {
                event: signal.event,
                value: signal.value.clone(),
                console: Vec::new(),
            };
            if let Some(done) = self.signal(Duration::from_millis(signal.at), result) {
                return Some(done);
            }
        }
        self.advance(Duration::from_millis(state.now), Some(&lookup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webdriver::ELEMENT_KEY;
    use serde_json::json;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn rendered(element: &str) -> DoneResult {
        DoneResult {
            event: ChannelEvent::StoryRendered,
            value: Some(SignalValue::Element(ElementRef {
                id: element.to_string(),
            })),
            console: Vec::new(),
        }
    }

    fn errored() -> DoneResult {
        DoneResult {
            event: ChannelEvent::StoryErrored,
            value: Some(SignalValue::Error(ErrorDetail {
                name: "StoryRunnerError".to_string(),
                message: "boom".to_string(),
            })),
            console: Vec::new(),
        }
    }

    fn settler() -> Settler {
        let mut settler = Settler::new(ViewMode::Story, ms(100), ms(200));
        settler.start(ms(0));
        settler
    }

    #[test]
    fn test_debounce_keeps_last_signal() {
        let mut settler = settler();
        let mut calls = Vec::new();

        calls.extend(settler.signal(ms(0), rendered("first")));
        calls.extend(settler.signal(ms(50), rendered("second")));
        calls.extend(settler.advance(ms(120), None));
        calls.extend(settler.advance(ms(160), None));
        calls.extend(settler.advance(ms(400), None));

        assert_eq!(calls, vec![rendered("second")]);
        assert!(settler.is_settled());
    }

    #[test]
    fn test_one_shot_after_settlement() {
        let mut settler = settler();
        let mut calls = 0;

        calls += settler.signal(ms(10), rendered("root")).into_iter().count();
        calls += settler.advance(ms(110), None).into_iter().count();
        calls += settler.signal(ms(130), errored()).into_iter().count();
        calls += settler.advance(ms(1000), None).into_iter().count();

        assert_eq!(calls, 1);
    }

    #[test]
    fn test_error_settles_without_debounce() {
        let mut settler = settler();
        assert_eq!(settler.signal(ms(0), rendered("root")), None);
        assert_eq!(settler.signal(ms(20), errored()), Some(errored()));
        assert_eq!(settler.advance(ms(500), None), None);
    }

    #[test]
    fn test_null_root_settles_immediately() {
        let mut settler = settler();
        let unmounted = DoneResult {
            event: ChannelEvent::StoryRendered,
            value: None,
            console: Vec::new(),
        };
        assert_eq!(settler.signal(ms(5), unmounted.clone()), Some(unmounted));
    }

    #[test]
    fn test_fallback_reports_current_root() {
        let mut settler = settler();
        let lookup = || {
            Some(ElementRef {
                id: "late".to_string(),
            })
        };

        assert_eq!(settler.advance(ms(199), Some(&lookup)), None);
        let done = settler.advance(ms(200), Some(&lookup)).unwrap();
        assert_eq!(done.event, ChannelEvent::StoryRendered);
        assert_eq!(RenderOutcome::from(done), RenderOutcome::Success(ElementRef { id: "late".to_string() }));
    }

    #[test]
    fn test_first_signal_cancels_fallback() {
        let mut settler = settler();
        assert_eq!(settler.signal(ms(150), rendered("root")), None);
        // fallback would have been due at 200
        assert_eq!(settler.advance(ms(220), None), None);
        assert_eq!(settler.advance(ms(250), None), Some(rendered("root")));
    }

    #[test]
    fn test_replay_recorded_signals() {
        let state: PageState = serde_json::from_value(json!({
            "installed": true,
            "now": 300,
            "signals": [
                { "event": "storyRendered", "at": 40, "value": { ELEMENT_KEY: "a" } },
                { "event": "storyRendered", "at": 90, "value": { ELEMENT_KEY: "b" } }
            ],
            "root": null,
            "result": null
        }))
        .unwrap();

        let mut settler = Settler::new(ViewMode::Story, ms(100), ms(200));
        assert_eq!(settler.replay(&state), Some(rendered("b")));
    }

    #[test]
    fn test_done_result_wire_format() {
        let result: DoneResult = serde_json::from_value(json!({
            "event": "storyThrewException",
            "value": { "name": "StoryRunnerError", "message": "broken" },
            "console": [{ "level": "warn", "message": "careful" }]
        }))
        .unwrap();

        assert!(result.is_terminal());
        assert_eq!(result.console.len(), 1);
        match RenderOutcome::from(result) {
            RenderOutcome::ThrewException(detail) => assert_eq!(detail.message, "broken"),
            other => panic!("unexpected outcome {:?}", other),
        }

        let unmounted: DoneResult =
            serde_json::from_value(json!({ "event": "storyRendered", "value": null })).unwrap();
        assert_eq!(RenderOutcome::from(unmounted), RenderOutcome::NotMounted);
    }

    #[test]
    fn test_options_are_camel_case() {
        let options = ListenerOptions {
            base_url: "http://localhost:6006".to_string(),
            story_id: "example-button--primary".to_string(),
            view_mode: ViewMode::Story,
            root_selector: STORY_ROOT.to_string(),
            debounce_ms: 100,
            fallback_ms: 200,
            capture_console: false,
        };
        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(value["storyId"], "example-button--primary");
        assert_eq!(value["viewMode"], "story");
        assert_eq!(value["rootSelector"], "#root");
    }
}
