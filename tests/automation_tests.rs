//! Macro execution tests
//!
//! These run macros against offline documents with a paused clock, so every
//! timing assertion is deterministic.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use reasonkit_macro::automation::{AbortCause, ActionExecutor, ExecutionOutcome, Macro};
use reasonkit_macro::config::{AdmissionPolicy, EngineConfig, UnrecognizedPolicy};
use reasonkit_macro::error::{EngineError, Error, MacroError, PageError};
use reasonkit_macro::page::document::NodeRef;
use reasonkit_macro::page::{
    DocumentPage, DomSnapshot, EffectKind, Notification, PageDriver, Probe, Rect, Viewport,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const LOGIN_PAGE: &str = r#"<html>
<head><title>Sign in</title></head>
<body>
  <div id="banner">Welcome back</div>
  <form id="login" action="/session" method="post">
    <input id="username" name="username" type="text">
    <input id="email" name="email" type="email">
    <select id="plan" name="plan">
      <option value="free">Free</option>
      <option value="pro">Pro</option>
    </select>
    <button id="go" type="submit">Sign in</button>
  </form>
</body>
</html>"#;

fn executor(config: EngineConfig) -> ActionExecutor<DocumentPage> {
    let page = DocumentPage::new(LOGIN_PAGE).with_url("https://example.com/login");
    ActionExecutor::new(Arc::new(page), config)
}

fn parse(json: serde_json::Value) -> Macro {
    Macro::from_value(&json).unwrap()
}

fn value_events(value: &str) -> Vec<EffectKind> {
    vec![
        EffectKind::ValueSet(value.to_string()),
        EffectKind::Notified {
            notification: Notification::Input,
            bubbles: true,
        },
        EffectKind::Notified {
            notification: Notification::Change,
            bubbles: true,
        },
    ]
}

fn kinds_for(page: &DocumentPage, selector: &str) -> Vec<EffectKind> {
    page.effects_for(selector)
        .into_iter()
        .map(|e| e.kind)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_type_then_click_completes() {
    let exec = executor(EngineConfig::default());
    let actions = parse(json!([
        {"type": "type", "selector": "#username", "text": "alice"},
        {"type": "click", "selector": "button[type=submit]"}
    ]));

    let outcome = exec.execute(actions).await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::Completed { skipped: vec![] });
    assert_eq!(
        serde_json::to_value(&outcome).unwrap(),
        json!({"status": "completed"})
    );

    let page = exec.page();
    assert_eq!(page.value_of("#username"), Some("alice".to_string()));
    assert_eq!(kinds_for(page, "#username"), value_events("alice"));
    assert_eq!(kinds_for(page, "#go"), vec![EffectKind::Activated]);

    // The click lands after every notification of the typed value
    let effects = page.effects();
    assert_eq!(effects.len(), 4);
    assert_eq!(effects.last().unwrap().kind, EffectKind::Activated);
}

#[tokio::test(start_paused = true)]
async fn test_effect_sequence_strictly_increases() {
    let exec = executor(EngineConfig::default());
    let actions = parse(json!([
        {"type": "type", "selector": "#username", "text": "alice"},
        {"type": "select", "selector": "#plan", "value": "pro"},
        {"type": "scroll", "y": 300},
        {"type": "click", "selector": "#go"}
    ]));
    exec.execute(actions).await.unwrap();

    let effects = exec.page().effects();
    assert_eq!(effects.len(), 8);
    for pair in effects.windows(2) {
        assert!(pair[0].seq < pair[1].seq);
        assert!(pair[0].at <= pair[1].at);
    }
}

#[tokio::test(start_paused = true)]
async fn test_missing_selector_aborts_after_timeout() {
    let exec = executor(EngineConfig::builder().resolve_timeout_ms(200).build());
    let actions = parse(json!([{"type": "click", "selector": "#missing"}]));

    let start = Instant::now();
    let outcome = exec.execute(actions).await.unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed <= Duration::from_millis(300));
    match outcome {
        ExecutionOutcome::Aborted {
            at_index,
            selector,
            cause,
            ..
        } => {
            assert_eq!(at_index, 0);
            assert_eq!(selector.as_deref(), Some("#missing"));
            assert_eq!(cause, AbortCause::ResolutionTimeout);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(exec.page().effects().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_selector_aborts_immediately() {
    let exec = executor(EngineConfig::default());
    let actions = parse(json!([{"type": "click", "selector": "button["}]));

    let start = Instant::now();
    let outcome = exec.execute(actions).await.unwrap();

    assert_eq!(start.elapsed(), Duration::ZERO);
    match outcome {
        ExecutionOutcome::Aborted { cause, .. } => {
            assert_eq!(cause, AbortCause::InvalidSelector)
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_wait_delays_next_action() {
    let exec = executor(EngineConfig::default());
    let actions = parse(json!([
        {"type": "wait", "duration": 250},
        {"type": "click", "selector": "#go"}
    ]));

    let start = Instant::now();
    exec.execute(actions).await.unwrap();

    let click = exec.page().effects_for("#go");
    assert_eq!(click.len(), 1);
    assert!(click[0].at.duration_since(start) >= Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn test_unrecognized_action_is_skipped() {
    let exec = executor(EngineConfig::default());
    let actions = parse(json!([
        {"type": "hover", "selector": "#go"},
        {"type": "click", "selector": "#go"}
    ]));

    let outcome = exec.execute(actions).await.unwrap();
    assert_eq!(
        serde_json::to_value(&outcome).unwrap(),
        json!({"status": "completed", "skipped": [0]})
    );
    assert_eq!(kinds_for(exec.page(), "#go"), vec![EffectKind::Activated]);
}

#[tokio::test(start_paused = true)]
async fn test_degrade_policy_reports_partial() {
    let exec = executor(
        EngineConfig::builder()
            .unrecognized(UnrecognizedPolicy::Degrade)
            .build(),
    );
    let actions = parse(json!([
        {"type": "click", "selector": "#go"},
        {"selector": "#go"}
    ]));

    let outcome = exec.execute(actions).await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::Partial { skipped: vec![1] });
}

#[tokio::test(start_paused = true)]
async fn test_handler_fault_stops_later_actions() {
    let exec = executor(EngineConfig::default());
    let actions = parse(json!([
        {"type": "type", "selector": "#username", "text": "alice"},
        {"type": "type", "selector": "#banner", "text": "nope"},
        {"type": "click", "selector": "#go"}
    ]));

    let outcome = exec.execute(actions).await.unwrap();
    match &outcome {
        ExecutionOutcome::Aborted {
            at_index,
            selector,
            cause,
            message,
        } => {
            assert_eq!(*at_index, 1);
            assert_eq!(selector.as_deref(), Some("#banner"));
            assert_eq!(*cause, AbortCause::HandlerFault);
            assert!(message.contains("div"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let page = exec.page();
    // Earlier effects persist, later actions never run
    assert_eq!(page.value_of("#username"), Some("alice".to_string()));
    assert!(kinds_for(page, "#banner").is_empty());
    assert!(kinds_for(page, "#go").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_late_element_is_clicked() {
    let exec = executor(EngineConfig::default());
    let writer = Arc::clone(exec.page());
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        writer.append_html(r#"<button id="late">Later</button>"#);
    });

    let start = Instant::now();
    let outcome = exec
        .execute(parse(json!([{"type": "click", "selector": "#late"}])))
        .await
        .unwrap();

    assert!(outcome.is_completed());
    let click = exec.page().effects_for("#late");
    assert_eq!(click.len(), 1);
    assert_eq!(click[0].at.duration_since(start), Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_select_emits_input_and_change() {
    let exec = executor(EngineConfig::default());
    exec.execute(parse(json!([
        {"type": "select", "selector": "#plan", "value": "pro"}
    ])))
    .await
    .unwrap();

    assert_eq!(exec.page().value_of("#plan"), Some("pro".to_string()));
    assert_eq!(kinds_for(exec.page(), "#plan"), value_events("pro"));
}

#[tokio::test(start_paused = true)]
async fn test_select_unknown_value_clears_selection() {
    let exec = executor(EngineConfig::default());
    let outcome = exec
        .execute(parse(json!([
            {"type": "select", "selector": "#plan", "value": "enterprise"}
        ])))
        .await
        .unwrap();

    assert!(outcome.is_completed());
    assert_eq!(exec.page().value_of("#plan"), Some(String::new()));
    assert_eq!(kinds_for(exec.page(), "#plan"), value_events(""));
}

#[tokio::test(start_paused = true)]
async fn test_fill_sets_fields_in_order() {
    let exec = executor(EngineConfig::default());
    let actions = parse(json!([{
        "type": "fill",
        "data": {"#email": "alice@example.com", "#username": "alice"}
    }]));

    exec.execute(actions).await.unwrap();

    let page = exec.page();
    assert_eq!(page.value_of("#email"), Some("alice@example.com".to_string()));
    assert_eq!(page.value_of("#username"), Some("alice".to_string()));

    let email = page.effects_for("#email");
    let username = page.effects_for("#username");
    assert!(email.last().unwrap().seq < username.first().unwrap().seq);
}

#[tokio::test(start_paused = true)]
async fn test_fill_stops_at_first_missing_field() {
    let exec = executor(EngineConfig::builder().resolve_timeout_ms(100).build());
    let actions = parse(json!([{
        "type": "fill",
        "data": {"#username": "alice", "#nope": "x", "#email": "a@b.c"}
    }]));

    let outcome = exec.execute(actions).await.unwrap();
    match outcome {
        ExecutionOutcome::Aborted {
            at_index,
            selector,
            cause,
            ..
        } => {
            assert_eq!(at_index, 0);
            assert_eq!(selector.as_deref(), Some("#nope"));
            assert_eq!(cause, AbortCause::ResolutionTimeout);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(exec.page().value_of("#username"), Some("alice".to_string()));
    assert_eq!(exec.page().value_of("#email"), Some(String::new()));
}

#[tokio::test(start_paused = true)]
async fn test_scroll_to_selector_and_coordinates() {
    let exec = executor(EngineConfig::default());
    exec.page()
        .set_layout("#go", Rect::new(0.0, 1200.0, 80.0, 24.0))
        .unwrap();

    let actions = parse(json!([
        {"type": "scroll", "selector": "#go", "y": 999},
        {"type": "scroll", "y": 400}
    ]));
    exec.execute(actions).await.unwrap();

    let page = exec.page();
    assert_eq!(kinds_for(page, "#go"), vec![EffectKind::ScrolledIntoView]);
    let last = page.effects().pop().unwrap();
    assert_eq!(last.target, None);
    assert_eq!(last.kind, EffectKind::Scrolled { x: 0.0, y: 400.0 });
}

#[tokio::test(start_paused = true)]
async fn test_wrapped_macro_runs() {
    let exec = executor(EngineConfig::default());
    let actions = Macro::from_json(
        r##"{"actions": [{"type": "type", "selector": "#username", "text": "bob"}]}"##,
    )
    .unwrap();

    let outcome = exec.execute(actions).await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(exec.page().value_of("#username"), Some("bob".to_string()));
}

#[test]
fn test_malformed_known_action_rejects_macro() {
    let err = Macro::from_json(
        r##"[{"type": "click", "selector": "#go"}, {"type": "type", "selector": "#username"}]"##,
    )
    .unwrap_err();
    match err {
        MacroError::InvalidAction { index, .. } => assert_eq!(index, 1),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_interrupts_wait() {
    let exec = executor(EngineConfig::default());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let actions = parse(json!([
        {"type": "wait", "duration": 1000},
        {"type": "click", "selector": "#go"}
    ]));
    let start = Instant::now();
    let outcome = exec.execute_with_cancel(actions, &cancel).await.unwrap();

    assert_eq!(start.elapsed(), Duration::from_millis(50));
    match outcome {
        ExecutionOutcome::Aborted {
            at_index, cause, ..
        } => {
            assert_eq!(at_index, 0);
            assert_eq!(cause, AbortCause::Cancelled);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(exec.page().effects().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_start() {
    let exec = executor(EngineConfig::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = exec
        .execute_with_cancel(parse(json!([{"type": "click", "selector": "#go"}])), &cancel)
        .await
        .unwrap();
    assert_eq!(outcome.aborted_at(), Some(0));
    assert!(exec.page().effects().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reject_policy_refuses_concurrent_macro() {
    let exec = executor(
        EngineConfig::builder()
            .admission(AdmissionPolicy::Reject)
            .build(),
    );

    let first = exec.clone();
    let running = tokio::spawn(async move {
        first
            .execute(parse(json!([{"type": "wait", "duration": 500}])))
            .await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(exec.is_busy());
    let err = exec
        .execute(parse(json!([{"type": "click", "selector": "#go"}])))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Engine(EngineError::Busy)));

    assert!(running.await.unwrap().unwrap().is_completed());
    assert!(!exec.is_busy());
    let outcome = exec
        .execute(parse(json!([{"type": "click", "selector": "#go"}])))
        .await
        .unwrap();
    assert!(outcome.is_completed());
}

#[tokio::test(start_paused = true)]
async fn test_queue_policy_serializes_macros() {
    let exec = executor(EngineConfig::default());

    let first = exec.clone();
    let running = tokio::spawn(async move {
        first
            .execute(parse(json!([
                {"type": "type", "selector": "#username", "text": "first"},
                {"type": "wait", "duration": 100}
            ])))
            .await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let start = Instant::now();
    let outcome = exec
        .execute(parse(json!([
            {"type": "type", "selector": "#username", "text": "second"}
        ])))
        .await
        .unwrap();
    assert!(outcome.is_completed());
    assert!(running.await.unwrap().unwrap().is_completed());

    // The queued macro only starts once the first one has finished
    let sets: Vec<_> = exec
        .page()
        .effects_for("#username")
        .into_iter()
        .filter(|e| matches!(e.kind, EffectKind::ValueSet(_)))
        .collect();
    assert_eq!(sets.len(), 2);
    assert_eq!(sets[0].kind, EffectKind::ValueSet("first".to_string()));
    assert_eq!(sets[1].kind, EffectKind::ValueSet("second".to_string()));
    assert_eq!(sets[1].at.duration_since(start), Duration::from_millis(90));
    assert_eq!(
        exec.page().value_of("#username"),
        Some("second".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_queued() {
    let exec = executor(EngineConfig::default());

    let first = exec.clone();
    let running = tokio::spawn(async move {
        first
            .execute(parse(json!([{"type": "wait", "duration": 500}])))
            .await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let outcome = exec
        .execute_with_cancel(parse(json!([{"type": "click", "selector": "#go"}])), &cancel)
        .await
        .unwrap();
    match outcome {
        ExecutionOutcome::Aborted { at_index, cause, .. } => {
            assert_eq!(at_index, 0);
            assert_eq!(cause, AbortCause::Cancelled);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(kinds_for(exec.page(), "#go").is_empty());
    assert!(running.await.unwrap().unwrap().is_completed());
}

#[tokio::test(start_paused = true)]
async fn test_executors_sharing_a_page_share_admission() {
    let page = Arc::new(DocumentPage::new(LOGIN_PAGE));
    let reject = EngineConfig::builder()
        .admission(AdmissionPolicy::Reject)
        .build();
    let first = ActionExecutor::new(Arc::clone(&page), reject.clone());
    let second = ActionExecutor::new(Arc::clone(&page), reject);

    let running = tokio::spawn(async move {
        first
            .execute(parse(json!([{"type": "wait", "duration": 500}])))
            .await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(second.is_busy());
    let err = second
        .execute(parse(json!([{"type": "click", "selector": "#go"}])))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Engine(EngineError::Busy)));
    assert!(kinds_for(&page, "#go").is_empty());
    assert!(running.await.unwrap().unwrap().is_completed());
}

#[tokio::test(start_paused = true)]
async fn test_executors_sharing_a_page_run_one_at_a_time() {
    let page = Arc::new(DocumentPage::new(LOGIN_PAGE));
    let first = ActionExecutor::new(Arc::clone(&page), EngineConfig::default());
    let second = ActionExecutor::new(Arc::clone(&page), EngineConfig::default());
    let start = Instant::now();

    let running = tokio::spawn(async move {
        first
            .execute(parse(json!([
                {"type": "wait", "duration": 300},
                {"type": "type", "selector": "#username", "text": "first"}
            ])))
            .await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let outcome = second
        .execute(parse(json!([
            {"type": "type", "selector": "#username", "text": "second"}
        ])))
        .await
        .unwrap();
    assert!(outcome.is_completed());
    assert!(running.await.unwrap().unwrap().is_completed());

    let sets: Vec<_> = page
        .effects_for("#username")
        .into_iter()
        .filter(|e| matches!(e.kind, EffectKind::ValueSet(_)))
        .collect();
    assert_eq!(sets.len(), 2);
    assert_eq!(sets[0].kind, EffectKind::ValueSet("first".to_string()));
    assert_eq!(sets[1].kind, EffectKind::ValueSet("second".to_string()));
    assert!(sets[1].at.duration_since(start) >= Duration::from_millis(300));
    assert_eq!(page.value_of("#username"), Some("second".to_string()));
}

/// Offline page whose document is swapped out right after `selector` resolves
struct SwapAfterQuery {
    inner: DocumentPage,
    selector: &'static str,
    replacement: &'static str,
}

#[async_trait]
impl PageDriver for SwapAfterQuery {
    type Element = NodeRef;

    async fn url(&self) -> Result<String, PageError> {
        self.inner.url().await
    }

    async fn query(&self, selector: &str) -> Result<Probe<NodeRef>, PageError> {
        let probe = self.inner.query(selector).await?;
        if selector == self.selector && matches!(probe, Probe::Found(_)) {
            self.inner.set_html(self.replacement);
        }
        Ok(probe)
    }

    async fn set_value(&self, element: &NodeRef, value: &str) -> Result<(), PageError> {
        self.inner.set_value(element, value).await
    }

    async fn notify(&self, element: &NodeRef, notification: Notification) -> Result<(), PageError> {
        self.inner.notify(element, notification).await
    }

    async fn activate(&self, element: &NodeRef) -> Result<(), PageError> {
        self.inner.activate(element).await
    }

    async fn scroll_to(&self, x: f64, y: f64) -> Result<(), PageError> {
        self.inner.scroll_to(x, y).await
    }

    async fn scroll_into_view(&self, element: &NodeRef) -> Result<(), PageError> {
        self.inner.scroll_into_view(element).await
    }

    async fn bounds(&self, element: &NodeRef) -> Result<Rect, PageError> {
        self.inner.bounds(element).await
    }

    async fn viewport(&self) -> Result<Viewport, PageError> {
        self.inner.viewport().await
    }

    async fn snapshot(&self) -> Result<DomSnapshot, PageError> {
        self.inner.snapshot().await
    }

    fn execution_slot(&self) -> Arc<Mutex<()>> {
        self.inner.execution_slot()
    }
}

#[tokio::test(start_paused = true)]
async fn test_element_detached_after_resolution_is_handler_fault() {
    let page = Arc::new(SwapAfterQuery {
        inner: DocumentPage::new(LOGIN_PAGE),
        selector: "#username",
        replacement: LOGIN_PAGE,
    });
    let exec = ActionExecutor::new(Arc::clone(&page), EngineConfig::default());

    let outcome = exec
        .execute(parse(json!([
            {"type": "click", "selector": "#go"},
            {"type": "type", "selector": "#username", "text": "alice"},
            {"type": "click", "selector": "#go"}
        ])))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ExecutionOutcome::Aborted {
            at_index: 1,
            selector: Some("#username".to_string()),
            cause: AbortCause::HandlerFault,
            message: PageError::Detached.to_string(),
        }
    );
    assert_eq!(page.inner.value_of("#username"), Some(String::new()));
    assert_eq!(kinds_for(&page.inner, "#go"), vec![EffectKind::Activated]);
}
