//! End-to-end tests for the Trellis validation engine.
//!
//! Each test exercises the full pipeline: host inputs -> cycle phases ->
//! committed state -> feedback selection -> change notifications.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use trellis_engine::{EngineConfig, EngineEvent, ValidateOptions, ValidationEngine};
use trellis_types::{InteractionState, ModelValue, Result, TrellisError, ValidatorOutcome};
use trellis_validators::testing::{
    AlwaysInvalid, AlwaysValid, AsyncAlwaysInvalid, Counted, GatedAsync,
};
use trellis_validators::{
    DefaultSuccess, ExecuteMeta, MinLength, Required, ResultRule, Rule, Validator,
    ValidatorConfig,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Opt-in log output for debugging: `RUST_LOG=trellis_engine=debug`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn engine_with_types(types: &[&str]) -> ValidationEngine {
    ValidationEngine::with_config(EngineConfig {
        validation_types: types.iter().map(|t| t.to_string()).collect(),
        ..EngineConfig::default()
    })
}

fn v(rule: impl Rule + 'static) -> Validator {
    Validator::new(rule).expect("rule has a name")
}

fn vp(rule: impl Rule + 'static, param: serde_json::Value) -> Validator {
    Validator::with_param(rule, param).expect("rule has a name")
}

fn vt(rule: impl Rule + 'static, param: serde_json::Value, t: &str) -> Validator {
    Validator::with_config(rule, param, ValidatorConfig::of_type(t)).expect("rule has a name")
}

/// A result rule that records the regular result names it was handed.
struct RecordingResult {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl RecordingResult {
    fn new() -> (Self, Arc<Mutex<Vec<Vec<String>>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl ResultRule for RecordingResult {
    fn name(&self) -> &str {
        "RecordingResult"
    }

    fn execute_on_results(
        &self,
        regular_validation_result: &[ValidatorOutcome],
        _prev_validation_result: &[ValidatorOutcome],
    ) -> bool {
        self.calls.lock().unwrap().push(
            regular_validation_result
                .iter()
                .map(|o| o.name.clone())
                .collect(),
        );
        true
    }
}

/// An async rule whose execution always fails.
struct FailingAsync;

#[async_trait]
impl Rule for FailingAsync {
    fn name(&self) -> &str {
        "FailingAsync"
    }

    fn is_async(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _value: &serde_json::Value,
        _param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        tokio::task::yield_now().await;
        Err(TrellisError::Execution {
            validator: "FailingAsync".into(),
            message: "backend unreachable".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Required scenario (spec: empty value gating)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn required_scenario_empty_then_filled() {
    let engine = ValidationEngine::new();
    engine.set_validators(vec![v(Required)]).await.unwrap();
    engine.set_model_value(ModelValue::text("")).await;

    assert!(engine.validation_states().is_active("error", "Required"));
    assert_eq!(engine.has_feedback_for(), vec!["error"]);

    engine.set_model_value(ModelValue::text("foo")).await;
    assert!(!engine.validation_states().is_active("error", "Required"));
    assert_eq!(engine.has_feedback_for(), Vec::<String>::new());
}

#[tokio::test]
async fn empty_value_never_executes_regular_rules() {
    let engine = ValidationEngine::new();
    let counted = Counted::new(AlwaysInvalid);
    let counter = counted.counter();
    engine
        .set_validators(vec![v(Required), v(counted)])
        .await
        .unwrap();

    engine.set_model_value(ModelValue::text("")).await;
    engine.set_model_value(ModelValue::none()).await;
    assert_eq!(counter.get(), 0);
    assert!(engine.validation_states().is_active("error", "Required"));

    engine.set_model_value(ModelValue::text("foo")).await;
    assert_eq!(counter.get(), 1);
}

// ---------------------------------------------------------------------------
// Sync-only completion (spec: no async boundary beyond one tick)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sync_only_list_settles_within_the_mutator_call() {
    let engine = ValidationEngine::new();
    engine
        .set_validators(vec![v(AlwaysValid), v(AlwaysInvalid)])
        .await
        .unwrap();
    engine.set_model_value(ModelValue::text("x")).await;

    // Already settled: no pending flag, completion future resolved, state
    // committed — all before any explicit wait.
    assert!(!engine.is_pending());
    assert!(engine.validation_states().is_active("error", "AlwaysInvalid"));
    engine.validate_complete().await;
}

// ---------------------------------------------------------------------------
// Idempotence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_validate_with_unchanged_inputs_is_stable() {
    let engine = ValidationEngine::new();
    engine
        .set_validators(vec![vp(MinLength, json!(3))])
        .await
        .unwrap();
    engine.set_model_value(ModelValue::text("ab")).await;

    let first_states = engine.validation_states();
    let first_total = engine.total_validation_result();

    engine.validate(ValidateOptions::default()).await;
    engine.validate(ValidateOptions::default()).await;

    assert_eq!(engine.validation_states(), first_states);
    assert_eq!(engine.total_validation_result(), first_total);
}

// ---------------------------------------------------------------------------
// Declared-order feedback (spec: hasFeedbackFor renders in validationTypes order)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn has_feedback_for_follows_declared_type_order() {
    let engine = engine_with_types(&["error", "x", "y"]);
    // Insertion order deliberately differs from the declared order.
    engine
        .set_validators(vec![
            vt(AlwaysInvalid, json!(null), "x"),
            vt(MinLength, json!(3), "error"),
            vt(MinLength, json!(4), "y"),
        ])
        .await
        .unwrap();

    engine.set_model_value(ModelValue::text("1")).await;
    assert_eq!(engine.has_feedback_for(), vec!["error", "x", "y"]);

    engine.set_model_value(ModelValue::text("123")).await;
    assert_eq!(engine.has_feedback_for(), vec!["x", "y"]);

    engine.set_model_value(ModelValue::text("1234")).await;
    assert_eq!(engine.has_feedback_for(), vec!["x"]);
}

#[tokio::test]
async fn validation_states_track_each_declared_type() {
    let engine = engine_with_types(&["x", "error", "y"]);
    engine
        .set_validators(vec![
            vt(MinLength, json!(2), "x"),
            vt(MinLength, json!(3), "error"),
            vt(MinLength, json!(4), "y"),
        ])
        .await
        .unwrap();

    engine.set_model_value(ModelValue::text("1234")).await;
    let states = engine.validation_states();
    assert_eq!(states.types().count(), 3);
    assert_eq!(states.active_count(), 0);

    engine.set_model_value(ModelValue::text("123")).await;
    let states = engine.validation_states();
    assert!(states.is_active("y", "MinLength"));
    assert!(!states.is_active("error", "MinLength"));

    engine.set_model_value(ModelValue::text("1")).await;
    let states = engine.validation_states();
    assert!(states.is_active("x", "MinLength"));
    assert!(states.is_active("error", "MinLength"));
    assert!(states.is_active("y", "MinLength"));
}

// ---------------------------------------------------------------------------
// Async phase (spec: pending transitions, late activation)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pending_transitions_and_late_error_activation() {
    let engine = ValidationEngine::new();
    let (gated, gate) = GatedAsync::new(true);
    engine
        .set_validators(vec![v(AlwaysValid), v(gated)])
        .await
        .unwrap();
    assert!(!engine.is_pending());

    engine.set_model_value(ModelValue::text("dog")).await;
    assert!(engine.is_pending());
    // The async validator has not settled; no error is visible yet.
    assert_eq!(engine.has_feedback_for(), Vec::<String>::new());

    gate.open();
    engine.validate_complete().await;
    assert!(!engine.is_pending());
    assert_eq!(engine.has_feedback_for(), vec!["error"]);
    assert!(engine.validation_states().is_active("error", "GatedAsync"));
}

#[tokio::test]
async fn async_always_invalid_activates_after_completion() {
    let engine = ValidationEngine::new();
    engine
        .set_validators(vec![v(AsyncAlwaysInvalid)])
        .await
        .unwrap();
    engine.set_model_value(ModelValue::text("dog")).await;

    engine.validate_complete().await;
    assert_eq!(engine.has_feedback_for(), vec!["error"]);
}

#[tokio::test]
async fn failing_async_rule_is_inactive_and_cycle_completes() {
    init_tracing();
    let engine = ValidationEngine::new();
    engine
        .set_validators(vec![v(FailingAsync), v(AlwaysInvalid)])
        .await
        .unwrap();
    engine.set_model_value(ModelValue::text("x")).await;

    engine.validate_complete().await;
    assert!(!engine.is_pending());
    let states = engine.validation_states();
    assert!(!states.is_active("error", "FailingAsync"));
    assert!(states.is_active("error", "AlwaysInvalid"));
}

// ---------------------------------------------------------------------------
// Result phase (spec: runs strictly after sync+async settle; highest priority)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn result_phase_waits_for_async_settlement() {
    let engine = ValidationEngine::new();
    let (gated, gate) = GatedAsync::new(true);
    let (recording, calls) = RecordingResult::new();
    engine
        .set_validators(vec![
            v(AlwaysValid),
            Validator::result(recording).unwrap(),
            v(gated),
        ])
        .await
        .unwrap();
    // The install cycle ran on an empty model: async skipped, one result
    // phase invocation with no regular results.
    assert_eq!(calls.lock().unwrap().len(), 1);

    engine.set_model_value(ModelValue::text("x")).await;
    // Async validator still pending: the result phase has not run again.
    assert_eq!(calls.lock().unwrap().len(), 1);

    gate.open();
    engine.validate_complete().await;

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    // The settled async result was visible to the result rule.
    assert_eq!(calls[1], vec!["GatedAsync".to_string()]);
}

#[tokio::test]
async fn result_validator_outcome_leads_the_total_result() {
    let engine = ValidationEngine::new();
    let (recording, _calls) = RecordingResult::new();
    engine
        .set_validators(vec![v(AlwaysInvalid), Validator::result(recording).unwrap()])
        .await
        .unwrap();
    engine.set_model_value(ModelValue::text("myValue")).await;

    let total = engine.total_validation_result();
    assert_eq!(total.len(), 2);
    assert_eq!(total[0].name, "RecordingResult");
    assert_eq!(total[1].name, "AlwaysInvalid");
}

#[tokio::test]
async fn default_success_activates_after_resolved_error() {
    let engine = engine_with_types(&["error", "success"]);
    engine
        .set_validators(vec![
            vp(MinLength, json!(3)),
            Validator::result(DefaultSuccess).unwrap(),
        ])
        .await
        .unwrap();

    engine.set_model_value(ModelValue::text("ab")).await;
    assert_eq!(engine.has_feedback_for(), vec!["error"]);

    engine.set_model_value(ModelValue::text("abc")).await;
    assert!(engine
        .validation_states()
        .is_active("success", "DefaultSuccess"));
    assert_eq!(engine.has_feedback_for(), vec!["success"]);

    // One more clean cycle: the previous total carried only "success", so
    // the success state does not persist.
    engine.set_model_value(ModelValue::text("abcd")).await;
    assert_eq!(engine.has_feedback_for(), Vec::<String>::new());
}

// ---------------------------------------------------------------------------
// Stale-cycle guard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn superseded_cycle_results_are_discarded() {
    init_tracing();
    let engine = ValidationEngine::new();
    let (slow, gate) = GatedAsync::new(true);
    engine.set_validators(vec![v(slow)]).await.unwrap();

    // Cycle 1: slow async validator, left pending.
    engine.set_model_value(ModelValue::text("first")).await;
    assert!(engine.is_pending());

    // Cycle 2: replace with a fast sync validator; finalizes immediately.
    engine.set_validators(vec![v(AlwaysInvalid)]).await.unwrap();
    assert!(!engine.is_pending());
    assert!(engine.validation_states().is_active("error", "AlwaysInvalid"));

    // Cycle 1 was advised to abandon its work.
    assert!(gate.was_aborted());

    // Cycle 1's late resolution must not overwrite cycle 2's state.
    gate.open();
    tokio::task::yield_now().await;
    engine.validate_complete().await;
    let states = engine.validation_states();
    assert!(!states.is_active("error", "GatedAsync"));
    assert!(states.is_active("error", "AlwaysInvalid"));
}

// ---------------------------------------------------------------------------
// Feedback selection and messages
// ---------------------------------------------------------------------------

#[tokio::test]
async fn feedback_is_ordered_by_declared_types_when_cap_is_raised() {
    let engine = engine_with_types(&["error", "x", "y"]);
    engine.set_visible_messages(usize::MAX).await;
    engine.set_submitted(true).await;
    engine
        .set_validators(vec![
            vt(MinLength, json!(2), "x"),
            vt(MinLength, json!(3), "error"),
            vt(MinLength, json!(4), "y"),
        ])
        .await
        .unwrap();

    engine.set_model_value(ModelValue::text("1")).await;
    let order: Vec<String> = engine
        .feedback()
        .iter()
        .map(|e| e.validator_type.clone())
        .collect();
    assert_eq!(order, vec!["error", "x", "y"]);

    engine.set_model_value(ModelValue::text("12")).await;
    let order: Vec<String> = engine
        .feedback()
        .iter()
        .map(|e| e.validator_type.clone())
        .collect();
    assert_eq!(order, vec!["error", "y"]);
}

#[tokio::test]
async fn default_cap_shows_only_the_highest_priority_message() {
    let engine = engine_with_types(&["error", "warning"]);
    engine.set_submitted(true).await;
    engine
        .set_validators(vec![
            vt(AlwaysInvalid, json!(null), "warning"),
            vt(MinLength, json!(3), "error"),
        ])
        .await
        .unwrap();
    engine.set_model_value(ModelValue::text("ab")).await;

    assert_eq!(engine.has_feedback_for(), vec!["error", "warning"]);
    assert_eq!(engine.shows_feedback_for(), vec!["error"]);
    assert_eq!(engine.feedback().len(), 1);
    assert_eq!(engine.feedback()[0].validator, "MinLength");
}

#[tokio::test]
async fn nothing_shows_before_interaction() {
    let engine = ValidationEngine::new();
    engine.set_validators(vec![v(AlwaysInvalid)]).await.unwrap();
    engine.set_model_value(ModelValue::text("x")).await;

    assert_eq!(engine.has_feedback_for(), vec!["error"]);
    assert!(engine.shows_feedback_for().is_empty());
    assert!(engine.feedback().is_empty());

    engine.set_touched(true).await;
    assert!(engine.shows_feedback_for().is_empty());
    engine.set_dirty(true).await;
    assert_eq!(engine.shows_feedback_for(), vec!["error"]);
}

#[tokio::test]
async fn prefilled_invalid_value_is_visible_without_interaction() {
    let engine = ValidationEngine::new();
    engine.set_prefilled(true).await;
    engine
        .set_validators(vec![vp(MinLength, json!(5))])
        .await
        .unwrap();
    engine.set_model_value(ModelValue::text("abc")).await;

    assert_eq!(engine.shows_feedback_for(), vec!["error"]);
}

#[tokio::test]
async fn messages_resolve_with_field_name_and_overrides() {
    let engine = ValidationEngine::with_config(EngineConfig {
        field_name: Some("nickname".into()),
        ..EngineConfig::default()
    });
    engine.set_submitted(true).await;

    let custom = Validator::with_config(
        AlwaysInvalid,
        json!(null),
        ValidatorConfig::default().with_message("Computer says no".to_string()),
    )
    .unwrap();
    engine
        .set_validators(vec![vp(MinLength, json!(5)), custom])
        .await
        .unwrap();
    engine.set_visible_messages(usize::MAX).await;
    engine.set_model_value(ModelValue::text("ab")).await;

    let feedback = engine.feedback();
    assert_eq!(feedback.len(), 2);
    assert_eq!(
        feedback[0].message,
        "Please enter a nickname of at least 5 characters."
    );
    assert_eq!(feedback[1].message, "Computer says no");
}

#[tokio::test]
async fn missing_message_degrades_to_guidance_placeholder() {
    let engine = ValidationEngine::new();
    engine.set_submitted(true).await;
    engine.set_validators(vec![v(AlwaysInvalid)]).await.unwrap();
    engine.set_model_value(ModelValue::text("x")).await;

    let feedback = engine.feedback();
    assert_eq!(feedback.len(), 1);
    assert!(feedback[0]
        .message
        .contains("Please configure an error message for \"AlwaysInvalid\""));
}

// ---------------------------------------------------------------------------
// Change notifications
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shows_feedback_event_fires_only_on_visibility_changes() {
    let engine = ValidationEngine::new();
    engine.set_submitted(true).await;
    engine
        .set_validators(vec![vp(MinLength, json!(7))])
        .await
        .unwrap();

    let mut events = engine.subscribe();
    let mut shows_changes = 0;

    engine.set_model_value(ModelValue::text("a")).await;
    engine.set_model_value(ModelValue::text("abc")).await;
    engine.set_model_value(ModelValue::text("abcdefg")).await;

    while let Ok(event) = events.try_recv() {
        if let EngineEvent::ShowsFeedbackForChanged { .. } = event {
            shows_changes += 1;
        }
    }
    // "a" made the error visible, "abc" kept it, "abcdefg" cleared it.
    assert_eq!(shows_changes, 2);
}

#[tokio::test]
async fn unchanged_cycles_do_not_re_emit_state_events() {
    let engine = ValidationEngine::new();
    engine
        .set_validators(vec![vp(MinLength, json!(3))])
        .await
        .unwrap();
    engine.set_model_value(ModelValue::text("ab")).await;

    let mut events = engine.subscribe();
    engine.validate(ValidateOptions::default()).await;
    engine.validate(ValidateOptions::default()).await;

    let mut performed = 0;
    let mut state_changes = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::ValidatePerformed { .. } => performed += 1,
            EngineEvent::ValidationStatesChanged { .. } => state_changes += 1,
            _ => {}
        }
    }
    assert_eq!(performed, 2);
    assert_eq!(state_changes, 0);
}

#[tokio::test]
async fn flag_changes_re_fire_visibility_without_a_cycle() {
    let engine = ValidationEngine::new();
    engine.set_validators(vec![v(AlwaysInvalid)]).await.unwrap();
    engine.set_model_value(ModelValue::text("x")).await;

    let mut events = engine.subscribe();
    engine
        .set_interaction(InteractionState {
            touched: true,
            dirty: true,
            ..Default::default()
        })
        .await;

    let mut saw_shows_change = false;
    let mut saw_cycle = false;
    while let Ok(event) = events.try_recv() {
        match event {
            EngineEvent::ShowsFeedbackForChanged { types } => {
                saw_shows_change = true;
                assert_eq!(types, vec!["error"]);
            }
            EngineEvent::ValidatePerformed { .. } => saw_cycle = true,
            _ => {}
        }
    }
    assert!(saw_shows_change);
    assert!(!saw_cycle);
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn undeclared_type_rejected_for_both_lists() {
    let engine = ValidationEngine::new();
    let warning = vt(AlwaysInvalid, json!(null), "warning");

    let err = engine.set_validators(vec![warning.clone()]).await.unwrap_err();
    assert!(err.is_type_configuration());

    let err = engine.set_default_validators(vec![warning]).await.unwrap_err();
    assert!(matches!(
        err,
        TrellisError::UnsupportedValidatorType { .. }
    ));

    // Nothing was installed; the engine still validates cleanly.
    engine.set_model_value(ModelValue::text("x")).await;
    assert!(engine.all_validators().is_empty());
    assert_eq!(engine.has_feedback_for(), Vec::<String>::new());
}

// ---------------------------------------------------------------------------
// Param-change observer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn param_change_revalidates_without_model_change() {
    let engine = ValidationEngine::new();
    let min_length = vp(MinLength, json!(3));
    engine
        .set_validators(vec![min_length.clone()])
        .await
        .unwrap();
    engine.set_model_value(ModelValue::text("ab")).await;
    assert!(engine.validation_states().is_active("error", "MinLength"));

    let mut events = engine.subscribe();
    min_length.set_param(json!(2));
    loop {
        if let EngineEvent::ValidationStatesChanged { .. } = events.recv().await.unwrap() {
            break;
        }
    }
    assert!(!engine.validation_states().is_active("error", "MinLength"));
}

#[tokio::test]
async fn default_validator_param_change_also_revalidates() {
    let engine = ValidationEngine::new();
    let preconfigured = vp(MinLength, json!(3));
    engine
        .set_default_validators(vec![preconfigured.clone()])
        .await
        .unwrap();
    engine.set_model_value(ModelValue::text("12")).await;
    assert!(engine.validation_states().is_active("error", "MinLength"));

    let mut events = engine.subscribe();
    preconfigured.set_param(json!(2));
    loop {
        if let EngineEvent::ValidationStatesChanged { .. } = events.recv().await.unwrap() {
            break;
        }
    }
    assert!(!engine.validation_states().is_active("error", "MinLength"));
}
