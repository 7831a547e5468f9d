//! The validation engine — the four-phase cycle pipeline.
//!
//! Every model-value or validator-list change runs one cycle: emptiness
//! check, synchronous phase, asynchronous phase, result phase. Cycles are
//! tagged with a monotonically increasing sequence number; results of a
//! superseded cycle are discarded, never merged into a newer cycle's state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tokio::sync::{broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};

use trellis_types::{
    FeedbackEntry, InteractionState, ModelValue, Result, TrellisError, ValidationStates,
    ValidatorKind, ValidatorOutcome,
};
use trellis_validators::{ExecuteMeta, Validator};

use crate::emptiness::{default_predicate, EmptinessPredicate};
use crate::events::{EngineEvent, EventEmitter};
use crate::feedback::{FeedbackSelector, FeedbackVisibility};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Options for a single validation cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateOptions {
    /// Reset the accumulated state before the cycle begins, preventing
    /// stale flicker of previously active messages.
    pub clear_current_result: bool,
}

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Recognized validation types, highest priority first.
    pub validation_types: Vec<String>,
    /// Cap on simultaneously visible feedback messages.
    pub visible_messages: usize,
    /// Field name woven into resolved messages.
    pub field_name: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            validation_types: vec!["error".to_string()],
            visible_messages: 1,
            field_name: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LastEmitted {
    states: ValidationStates,
    has_feedback_for: Vec<String>,
    shows_feedback_for: Vec<String>,
    feedback: Vec<FeedbackEntry>,
}

struct EngineState {
    model_value: ModelValue,
    validators: Vec<Validator>,
    default_validators: Vec<Validator>,
    interaction: InteractionState,

    // Committed snapshot of the last finalized cycle.
    states: ValidationStates,
    total_result: Vec<ValidatorOutcome>,
    prev_result: Vec<ValidatorOutcome>,
    has_feedback_for: Vec<String>,
    shows_feedback_for: Vec<String>,
    feedback: Vec<FeedbackEntry>,
    committed_validators: Vec<Validator>,
    committed_model: ModelValue,

    // Async validators of the in-flight cycle, for the abort advisory.
    pending_async: Vec<Validator>,
    // Param/config change listeners, one per registered validator.
    watch_tasks: Vec<JoinHandle<()>>,

    last_emitted: LastEmitted,
}

impl EngineState {
    fn new(declared: &[String]) -> Self {
        Self {
            model_value: ModelValue::none(),
            validators: Vec::new(),
            default_validators: Vec::new(),
            interaction: InteractionState::default(),
            states: ValidationStates::for_types(declared),
            total_result: Vec::new(),
            prev_result: Vec::new(),
            has_feedback_for: Vec::new(),
            shows_feedback_for: Vec::new(),
            feedback: Vec::new(),
            committed_validators: Vec::new(),
            committed_model: ModelValue::none(),
            pending_async: Vec::new(),
            watch_tasks: Vec::new(),
            last_emitted: LastEmitted::default(),
        }
    }

    fn effective_validators(&self) -> Vec<Validator> {
        self.validators
            .iter()
            .chain(self.default_validators.iter())
            .cloned()
            .collect()
    }
}

struct EngineInner {
    /// Sequence number of the newest cycle; stale async completions compare
    /// against this before committing anything.
    seq: AtomicU64,
    /// Sequence number of the last finalized cycle; backs `validate_complete`.
    completed: watch::Sender<u64>,
    pending: watch::Sender<bool>,
    events: EventEmitter,
    emptiness: RwLock<EmptinessPredicate>,
    selector: RwLock<FeedbackSelector>,
    field_name: RwLock<Option<String>>,
    state: Mutex<EngineState>,
}

impl EngineInner {
    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn selector_snapshot(&self) -> FeedbackSelector {
        self.selector
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn emptiness_snapshot(&self) -> EmptinessPredicate {
        self.emptiness
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn field_name_snapshot(&self) -> Option<String> {
        self.field_name
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_pending(&self, pending: bool) {
        let changed = self.pending.send_if_modified(|p| {
            if *p != pending {
                *p = pending;
                true
            } else {
                false
            }
        });
        if changed {
            self.events.emit(EngineEvent::IsPendingChanged { pending });
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        for task in state.watch_tasks.drain(..) {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// ValidationEngine
// ---------------------------------------------------------------------------

/// The validation engine handle.
///
/// Cloning yields another handle to the **same** engine, the way a host
/// control and its collaborators share one validation state.
#[derive(Clone)]
pub struct ValidationEngine {
    inner: Arc<EngineInner>,
}

impl ValidationEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let mut selector = FeedbackSelector::new(config.validation_types.clone());
        selector.set_visible_messages(config.visible_messages);
        let (completed, _) = watch::channel(0u64);
        let (pending, _) = watch::channel(false);
        Self {
            inner: Arc::new(EngineInner {
                seq: AtomicU64::new(0),
                completed,
                pending,
                events: EventEmitter::default(),
                emptiness: RwLock::new(default_predicate()),
                selector: RwLock::new(selector),
                field_name: RwLock::new(config.field_name),
                state: Mutex::new(EngineState::new(&config.validation_types)),
            }),
        }
    }

    // --- snapshots -----------------------------------------------------

    /// The per-type validation state of the last finalized cycle.
    pub fn validation_states(&self) -> ValidationStates {
        self.inner.state().states.clone()
    }

    /// The last finalized cycle's total result: active result validators
    /// first, then regular results (sync before async, list order within).
    pub fn total_validation_result(&self) -> Vec<ValidatorOutcome> {
        self.inner.state().total_result.clone()
    }

    /// Types with at least one active entry, declared priority order.
    pub fn has_feedback_for(&self) -> Vec<String> {
        self.inner.state().has_feedback_for.clone()
    }

    /// Types currently visible per the feedback selector.
    pub fn shows_feedback_for(&self) -> Vec<String> {
        self.inner.state().shows_feedback_for.clone()
    }

    /// The resolved, ordered, visibility-filtered feedback entries.
    pub fn feedback(&self) -> Vec<FeedbackEntry> {
        self.inner.state().feedback.clone()
    }

    pub fn model_value(&self) -> ModelValue {
        self.inner.state().model_value.clone()
    }

    pub fn interaction(&self) -> InteractionState {
        self.inner.state().interaction
    }

    pub fn validation_types(&self) -> Vec<String> {
        self.inner.selector_snapshot().validation_types().to_vec()
    }

    pub fn validators(&self) -> Vec<Validator> {
        self.inner.state().validators.clone()
    }

    pub fn default_validators(&self) -> Vec<Validator> {
        self.inner.state().default_validators.clone()
    }

    /// The effective list: `validators` followed by `default_validators`.
    pub fn all_validators(&self) -> Vec<Validator> {
        self.inner.state().effective_validators()
    }

    /// Whether any async validator of the current cycle is unresolved.
    pub fn is_pending(&self) -> bool {
        *self.inner.pending.borrow()
    }

    /// Observable form of [`is_pending`](ValidationEngine::is_pending).
    pub fn pending_changes(&self) -> watch::Receiver<bool> {
        self.inner.pending.subscribe()
    }

    /// Subscribe to engine change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// Resolves once the current cycle — including all pending async
    /// validators — has finalized. A cycle superseded mid-flight resolves
    /// when its replacement finalizes.
    pub async fn validate_complete(&self) {
        let target = self.inner.seq.load(Ordering::SeqCst);
        let mut rx = self.inner.completed.subscribe();
        while *rx.borrow_and_update() < target {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    // --- host inputs ---------------------------------------------------

    /// Record a new model value and run a cycle with cleared state.
    pub async fn set_model_value(&self, value: impl Into<ModelValue>) {
        {
            self.inner.state().model_value = value.into();
        }
        self.validate(ValidateOptions {
            clear_current_result: true,
        })
        .await;
    }

    /// Replace the host validator list. Fails fast — synchronously, before
    /// any cycle — when a validator's type is not declared.
    pub async fn set_validators(&self, validators: Vec<Validator>) -> Result<()> {
        self.check_supported(&validators)?;
        self.install(validators, false);
        self.validate(ValidateOptions {
            clear_current_result: true,
        })
        .await;
        Ok(())
    }

    /// Replace the control-preconfigured validator list; same checks as
    /// [`set_validators`](ValidationEngine::set_validators).
    pub async fn set_default_validators(&self, validators: Vec<Validator>) -> Result<()> {
        self.check_supported(&validators)?;
        self.install(validators, true);
        self.validate(ValidateOptions {
            clear_current_result: true,
        })
        .await;
        Ok(())
    }

    pub async fn set_touched(&self, touched: bool) {
        {
            self.inner.state().interaction.touched = touched;
        }
        self.refresh_feedback(None).await;
    }

    pub async fn set_dirty(&self, dirty: bool) {
        {
            self.inner.state().interaction.dirty = dirty;
        }
        self.refresh_feedback(None).await;
    }

    pub async fn set_prefilled(&self, prefilled: bool) {
        {
            self.inner.state().interaction.prefilled = prefilled;
        }
        self.refresh_feedback(None).await;
    }

    pub async fn set_submitted(&self, submitted: bool) {
        {
            self.inner.state().interaction.submitted = submitted;
        }
        self.refresh_feedback(None).await;
    }

    /// Replace all interaction flags at once.
    pub async fn set_interaction(&self, interaction: InteractionState) {
        {
            self.inner.state().interaction = interaction;
        }
        self.refresh_feedback(None).await;
    }

    /// Override the emptiness predicate. Takes effect on the next cycle.
    pub fn set_emptiness_predicate(
        &self,
        predicate: impl Fn(&ModelValue) -> bool + Send + Sync + 'static,
    ) {
        *self
            .inner
            .emptiness
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Arc::new(predicate);
    }

    /// Replace the per-type visibility policy and re-select feedback.
    pub async fn set_visibility_policy(&self, policy: impl FeedbackVisibility + 'static) {
        self.inner
            .selector
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .set_visibility(policy);
        self.refresh_feedback(None).await;
    }

    /// Change the visible message cap and re-select feedback.
    pub async fn set_visible_messages(&self, cap: usize) {
        self.inner
            .selector
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .set_visible_messages(cap);
        self.refresh_feedback(None).await;
    }

    pub fn set_field_name(&self, field_name: Option<String>) {
        *self
            .inner
            .field_name
            .write()
            .unwrap_or_else(|e| e.into_inner()) = field_name;
    }

    // --- the cycle -----------------------------------------------------

    /// Run one full validation cycle against the current inputs.
    pub async fn validate(&self, options: ValidateOptions) {
        let inner = &self.inner;
        let cycle = inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let selector = inner.selector_snapshot();
        let declared: Vec<String> = selector.validation_types().to_vec();

        // Snapshot inputs; advise superseded async work to abandon itself.
        let (model_value, effective, prev_result) = {
            let mut st = inner.state();
            for v in st.pending_async.drain(..) {
                v.abort_execution();
            }
            if options.clear_current_result {
                st.states = ValidationStates::for_types(&declared);
                st.total_result.clear();
                st.has_feedback_for.clear();
                st.shows_feedback_for.clear();
                st.feedback.clear();
            }
            (
                st.model_value.clone(),
                st.effective_validators(),
                st.prev_result.clone(),
            )
        };

        // Phase 1: emptiness.
        let is_empty = {
            let predicate = inner.emptiness_snapshot();
            predicate(&model_value)
        };
        let meta = ExecuteMeta {
            value_is_empty: is_empty,
            field_name: inner.field_name_snapshot(),
        };
        let exec_value = model_value.executable();

        tracing::debug!(
            cycle,
            empty = is_empty,
            validators = effective.len(),
            "validation cycle started"
        );

        // Phase 2: synchronous rules, list order. An active first rule does
        // not short-circuit the rest; every eligible rule runs.
        let mut sync_active: Vec<Validator> = Vec::new();
        for v in effective
            .iter()
            .filter(|v| v.kind() == ValidatorKind::Regular && !v.is_async())
        {
            if is_empty && !v.runs_on_empty() {
                continue;
            }
            match v.execute(&exec_value, &meta).await {
                Ok(true) => sync_active.push(v.clone()),
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    validator = v.name(),
                    error = %e,
                    "rule execution failed; treating as inactive"
                ),
            }
        }

        inner.events.emit(EngineEvent::ValidatePerformed { cycle });

        // Phase 3: asynchronous rules, gated by emptiness the same way.
        let async_eligible: Vec<(usize, Validator)> = effective
            .iter()
            .enumerate()
            .filter(|(_, v)| v.kind() == ValidatorKind::Regular && v.is_async())
            .filter(|(_, v)| !is_empty || v.runs_on_empty())
            .map(|(i, v)| (i, v.clone()))
            .collect();

        if async_eligible.is_empty() {
            inner.set_pending(false);
            self.finalize(cycle, effective, sync_active, Vec::new(), prev_result, model_value)
                .await;
            return;
        }

        inner.set_pending(true);
        {
            inner.state().pending_async =
                async_eligible.iter().map(|(_, v)| v.clone()).collect();
        }

        let engine = self.clone();
        tokio::spawn(async move {
            let mut join = JoinSet::new();
            for (pos, v) in async_eligible {
                let value = exec_value.clone();
                let meta = meta.clone();
                join.spawn(async move {
                    let outcome = v.execute(&value, &meta).await;
                    (pos, outcome, v)
                });
            }

            let mut settled: Vec<(usize, Validator)> = Vec::new();
            while let Some(res) = join.join_next().await {
                match res {
                    Ok((pos, Ok(true), v)) => settled.push((pos, v)),
                    Ok((_, Ok(false), _)) => {}
                    Ok((_, Err(e), v)) => tracing::warn!(
                        validator = v.name(),
                        error = %e,
                        "async rule execution failed; treating as inactive"
                    ),
                    Err(e) => tracing::warn!(error = %e, "async rule task failed"),
                }
            }
            // Promises settle out of order; the accumulation re-sorts by
            // original list position before finalizing.
            settled.sort_by_key(|(pos, _)| *pos);
            let async_active: Vec<Validator> = settled.into_iter().map(|(_, v)| v).collect();

            if engine.inner.seq.load(Ordering::SeqCst) != cycle {
                tracing::debug!(cycle, "discarding results of superseded cycle");
                return;
            }
            engine.inner.state().pending_async.clear();
            engine
                .finalize(cycle, effective, sync_active, async_active, prev_result, model_value)
                .await;
            if engine.inner.seq.load(Ordering::SeqCst) == cycle {
                engine.inner.set_pending(false);
            }
        });
    }

    // --- internals -----------------------------------------------------

    fn check_supported(&self, validators: &[Validator]) -> Result<()> {
        let selector = self.inner.selector_snapshot();
        for v in validators {
            let validator_type = v.validator_type();
            if !selector.is_supported_type(&validator_type) {
                let err = TrellisError::UnsupportedValidatorType {
                    validator: v.name().to_string(),
                    validator_type,
                };
                // Also logged: the host may swallow errors raised from its
                // property-change handlers.
                tracing::error!("{err}");
                return Err(err);
            }
        }
        Ok(())
    }

    /// Replace one of the two validator lists and resubscribe the
    /// param/config change listeners for the whole effective list.
    fn install(&self, list: Vec<Validator>, default_slot: bool) {
        let mut st = self.inner.state();
        if default_slot {
            st.default_validators = list;
        } else {
            st.validators = list;
        }
        for task in st.watch_tasks.drain(..) {
            task.abort();
        }
        let mut tasks = Vec::new();
        for v in st.effective_validators() {
            let mut rx = v.subscribe();
            let weak = Arc::downgrade(&self.inner);
            tasks.push(tokio::spawn(async move {
                loop {
                    if rx.changed().await.is_err() {
                        break;
                    }
                    match weak.upgrade() {
                        Some(inner) => {
                            ValidationEngine { inner }
                                .validate(ValidateOptions::default())
                                .await;
                        }
                        None => break,
                    }
                }
            }));
        }
        st.watch_tasks = tasks;
    }

    /// Phases 4–6: result rules, state rebuild, commit, completion.
    async fn finalize(
        &self,
        cycle: u64,
        effective: Vec<Validator>,
        sync_active: Vec<Validator>,
        async_active: Vec<Validator>,
        prev_result: Vec<ValidatorOutcome>,
        model_value: ModelValue,
    ) {
        let inner = &self.inner;
        let selector = inner.selector_snapshot();

        // Phase 4: result rules see the settled regular results plus the
        // previous cycle's total result.
        let regular: Vec<ValidatorOutcome> = sync_active
            .iter()
            .chain(async_active.iter())
            .map(Validator::outcome)
            .collect();
        let result_active: Vec<Validator> = effective
            .iter()
            .filter(|v| v.kind() == ValidatorKind::Result)
            .filter(|v| v.execute_on_results(&regular, &prev_result))
            .cloned()
            .collect();

        // Total result: result validators carry the highest priority.
        let total: Vec<ValidatorOutcome> = result_active
            .iter()
            .map(Validator::outcome)
            .chain(regular)
            .collect();

        // Phase 5: rebuild the per-type states from scratch.
        let mut states = ValidationStates::for_types(selector.validation_types());
        for o in &total {
            states.activate(&o.validator_type, &o.name);
        }
        let has_feedback = selector.has_feedback_for(&states);

        // Phase 6: commit (unless superseded), remember the total for the
        // next cycle's result phase, resolve the completion future.
        {
            let mut st = inner.state();
            if inner.seq.load(Ordering::SeqCst) != cycle {
                return;
            }
            st.states = states;
            st.total_result = total.clone();
            st.prev_result = total;
            st.committed_validators = effective;
            st.committed_model = model_value;
            st.has_feedback_for = has_feedback;

            if st.last_emitted.states != st.states {
                let states = st.states.clone();
                st.last_emitted.states = states.clone();
                inner
                    .events
                    .emit(EngineEvent::ValidationStatesChanged { states });
            }
            if st.last_emitted.has_feedback_for != st.has_feedback_for {
                let types = st.has_feedback_for.clone();
                st.last_emitted.has_feedback_for = types.clone();
                inner
                    .events
                    .emit(EngineEvent::HasFeedbackForChanged { types });
            }
        }
        inner.completed.send_if_modified(|done| {
            if cycle > *done {
                *done = cycle;
                true
            } else {
                false
            }
        });
        tracing::debug!(cycle, "validation cycle finalized");

        self.refresh_feedback(Some(cycle)).await;
    }

    /// Recompute the visible feedback subset from the committed state.
    /// Runs at cycle finalization and on interaction-flag changes; only the
    /// visible entries get their messages resolved.
    async fn refresh_feedback(&self, cycle: Option<u64>) {
        let inner = &self.inner;
        let selector = inner.selector_snapshot();
        let field_name = inner.field_name_snapshot();
        let (total, validators, interaction, model_value) = {
            let st = inner.state();
            (
                st.total_result.clone(),
                st.committed_validators.clone(),
                st.interaction,
                st.committed_model.clone(),
            )
        };

        let visible = selector.select(&total, &interaction);
        let mut entries = Vec::with_capacity(visible.len());
        for o in &visible {
            let found = validators
                .iter()
                .find(|v| v.name() == o.name && v.validator_type() == o.validator_type);
            let Some(v) = found else { continue };
            let data = v.message_data(&model_value, field_name.as_deref());
            let message = v.get_message(&data).await;
            entries.push(FeedbackEntry {
                message,
                validator_type: o.validator_type.clone(),
                validator: o.name.clone(),
            });
        }
        let shows = selector.shows_feedback_for(&visible);

        let mut st = inner.state();
        if let Some(cycle) = cycle {
            if inner.seq.load(Ordering::SeqCst) != cycle {
                return;
            }
        }
        st.shows_feedback_for = shows.clone();
        st.feedback = entries.clone();
        if st.last_emitted.shows_feedback_for != shows {
            st.last_emitted.shows_feedback_for = shows.clone();
            inner
                .events
                .emit(EngineEvent::ShowsFeedbackForChanged { types: shows });
        }
        if st.last_emitted.feedback != entries {
            st.last_emitted.feedback = entries.clone();
            inner.events.emit(EngineEvent::FeedbackChanged { entries });
        }
    }
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
