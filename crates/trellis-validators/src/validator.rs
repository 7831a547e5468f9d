//! Validator instances and the rule contracts they wrap.
//!
//! A [`Validator`] pairs a rule implementation with its per-instance mutable
//! `param` and [`ValidatorConfig`]. Mutating either bumps a revision channel
//! that the engine subscribes to at registration time, so a changed
//! parameter re-triggers validation without a model-value change.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::watch;

use trellis_types::{
    MessageData, ModelValue, Result, TrellisError, ValidatorKind, ValidatorOutcome,
};

// ---------------------------------------------------------------------------
// Rule contracts
// ---------------------------------------------------------------------------

/// Context handed to [`Rule::execute`] alongside the value and param.
#[derive(Debug, Clone, Default)]
pub struct ExecuteMeta {
    /// Verdict of the engine's emptiness predicate for the current value.
    pub value_is_empty: bool,
    /// Host-provided field name, when configured on the engine.
    pub field_name: Option<String>,
}

/// A regular validation rule, evaluated against the model value.
///
/// `execute` returns `Ok(true)` when the rule is active (the value is
/// invalid). An `Err` marks the rule inactive for the cycle; the engine logs
/// the failure and carries on with the remaining rules.
#[async_trait]
pub trait Rule: Send + Sync {
    /// Stable rule name; keys the per-type validation state.
    fn name(&self) -> &str;

    /// Whether `execute` crosses an async boundary. Async rules run in the
    /// asynchronous phase and contribute to the engine's pending state.
    fn is_async(&self) -> bool {
        false
    }

    /// Whether the rule still runs when the value is judged empty. Only
    /// required-style rules opt in; everything else is skipped on empty
    /// values and its prior active state cleared.
    fn runs_on_empty(&self) -> bool {
        false
    }

    /// Validation type used when the instance config does not override it.
    fn default_type(&self) -> &str {
        "error"
    }

    /// Evaluate the rule. `value` is the model value, unwrapped to the raw
    /// view string when the model is unparseable.
    async fn execute(
        &self,
        value: &serde_json::Value,
        param: &serde_json::Value,
        meta: &ExecuteMeta,
    ) -> Result<bool>;

    /// Default message for this rule, used when the instance has no
    /// `get_message` override. `None` falls through to the configuration
    /// guidance placeholder.
    async fn message(&self, _data: &MessageData) -> Option<String> {
        None
    }

    /// Advisory hook invoked when a pending execution was superseded by a
    /// newer cycle. Implementations may abandon in-flight work (e.g. cancel
    /// a network request); the engine discards late results either way.
    fn abort_execution(&self) {}
}

/// A meta-rule evaluated over the aggregate outcome of regular rules,
/// comparing the current cycle's results with the previous cycle's total
/// result. Never sees the raw model value.
#[async_trait]
pub trait ResultRule: Send + Sync {
    /// Stable rule name; keys the per-type validation state.
    fn name(&self) -> &str;

    /// Validation type used when the instance config does not override it.
    fn default_type(&self) -> &str {
        "error"
    }

    /// Decide the active state from the current regular results and the
    /// previous cycle's total result.
    fn execute_on_results(
        &self,
        regular_validation_result: &[ValidatorOutcome],
        prev_validation_result: &[ValidatorOutcome],
    ) -> bool;

    /// Default message for this rule; see [`Rule::message`].
    async fn message(&self, _data: &MessageData) -> Option<String> {
        None
    }
}

// ---------------------------------------------------------------------------
// Message resolution
// ---------------------------------------------------------------------------

/// Per-instance message override, configured via [`ValidatorConfig`].
#[async_trait]
pub trait MessageResolver: Send + Sync {
    async fn resolve(&self, data: &MessageData) -> String;
}

/// A fixed string resolves to itself.
#[async_trait]
impl MessageResolver for String {
    async fn resolve(&self, _data: &MessageData) -> String {
        self.clone()
    }
}

/// Plain functions over [`MessageData`] can serve as resolvers.
#[async_trait]
impl<F> MessageResolver for F
where
    F: Fn(&MessageData) -> String + Send + Sync,
{
    async fn resolve(&self, data: &MessageData) -> String {
        self(data)
    }
}

// ---------------------------------------------------------------------------
// ValidatorConfig
// ---------------------------------------------------------------------------

/// Per-instance configuration: the validation type this instance reports
/// under and an optional message override.
#[derive(Clone, Default)]
pub struct ValidatorConfig {
    /// Overrides the rule's default type ("error" for most rules).
    pub validator_type: Option<String>,
    pub get_message: Option<Arc<dyn MessageResolver>>,
}

impl ValidatorConfig {
    /// Config reporting under the given validation type.
    pub fn of_type(validator_type: impl Into<String>) -> Self {
        Self {
            validator_type: Some(validator_type.into()),
            get_message: None,
        }
    }

    /// Attach a message override.
    pub fn with_message(mut self, resolver: impl MessageResolver + 'static) -> Self {
        self.get_message = Some(Arc::new(resolver));
        self
    }
}

impl std::fmt::Debug for ValidatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorConfig")
            .field("validator_type", &self.validator_type)
            .field("get_message", &self.get_message.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Validator — a rule plus its mutable instance state
// ---------------------------------------------------------------------------

enum RuleHandle {
    Regular(Arc<dyn Rule>),
    Result(Arc<dyn ResultRule>),
}

struct MutableState {
    param: serde_json::Value,
    config: ValidatorConfig,
}

struct ValidatorInner {
    rule: RuleHandle,
    state: RwLock<MutableState>,
    revision: watch::Sender<u64>,
}

impl ValidatorInner {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, MutableState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MutableState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// A validator instance: a rule, a kind tag, and mutable `param`/`config`.
///
/// Cloning yields another handle to the **same** instance, so a host can
/// keep a handle, hand a clone to the engine, and later mutate the param to
/// re-trigger validation.
#[derive(Clone)]
pub struct Validator {
    inner: Arc<ValidatorInner>,
}

impl Validator {
    /// Wrap a regular rule with a null param and default config.
    pub fn new(rule: impl Rule + 'static) -> Result<Self> {
        Self::with_config(rule, serde_json::Value::Null, ValidatorConfig::default())
    }

    /// Wrap a regular rule with a param and default config.
    pub fn with_param(rule: impl Rule + 'static, param: serde_json::Value) -> Result<Self> {
        Self::with_config(rule, param, ValidatorConfig::default())
    }

    /// Wrap a regular rule with a param and explicit config.
    pub fn with_config(
        rule: impl Rule + 'static,
        param: serde_json::Value,
        config: ValidatorConfig,
    ) -> Result<Self> {
        check_name(rule.name())?;
        Ok(Self::from_handle(
            RuleHandle::Regular(Arc::new(rule)),
            param,
            config,
        ))
    }

    /// Wrap a result rule with default config.
    pub fn result(rule: impl ResultRule + 'static) -> Result<Self> {
        Self::result_with_config(rule, ValidatorConfig::default())
    }

    /// Wrap a result rule with explicit config.
    pub fn result_with_config(
        rule: impl ResultRule + 'static,
        config: ValidatorConfig,
    ) -> Result<Self> {
        check_name(rule.name())?;
        Ok(Self::from_handle(
            RuleHandle::Result(Arc::new(rule)),
            serde_json::Value::Null,
            config,
        ))
    }

    fn from_handle(rule: RuleHandle, param: serde_json::Value, config: ValidatorConfig) -> Self {
        let (revision, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(ValidatorInner {
                rule,
                state: RwLock::new(MutableState { param, config }),
                revision,
            }),
        }
    }

    pub fn name(&self) -> &str {
        match &self.inner.rule {
            RuleHandle::Regular(r) => r.name(),
            RuleHandle::Result(r) => r.name(),
        }
    }

    pub fn kind(&self) -> ValidatorKind {
        match &self.inner.rule {
            RuleHandle::Regular(_) => ValidatorKind::Regular,
            RuleHandle::Result(_) => ValidatorKind::Result,
        }
    }

    pub fn is_async(&self) -> bool {
        match &self.inner.rule {
            RuleHandle::Regular(r) => r.is_async(),
            RuleHandle::Result(_) => false,
        }
    }

    pub fn runs_on_empty(&self) -> bool {
        match &self.inner.rule {
            RuleHandle::Regular(r) => r.runs_on_empty(),
            RuleHandle::Result(_) => false,
        }
    }

    /// The validation type this instance reports under: the config override
    /// when present, the rule's default otherwise.
    pub fn validator_type(&self) -> String {
        let state = self.inner.read();
        if let Some(ref t) = state.config.validator_type {
            return t.clone();
        }
        match &self.inner.rule {
            RuleHandle::Regular(r) => r.default_type().to_string(),
            RuleHandle::Result(r) => r.default_type().to_string(),
        }
    }

    pub fn param(&self) -> serde_json::Value {
        self.inner.read().param.clone()
    }

    /// Replace the param and notify subscribers.
    pub fn set_param(&self, param: serde_json::Value) {
        self.inner.write().param = param;
        self.bump();
    }

    pub fn config(&self) -> ValidatorConfig {
        self.inner.read().config.clone()
    }

    /// Replace the config and notify subscribers.
    pub fn set_config(&self, config: ValidatorConfig) {
        self.inner.write().config = config;
        self.bump();
    }

    /// Subscribe to param/config changes. The engine registers one receiver
    /// per validator while it is in the active list and drops it on removal.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    fn bump(&self) {
        self.inner.revision.send_modify(|rev| *rev += 1);
    }

    /// Run a regular rule against a value. Returns `Ok(false)` for result
    /// validators, which are evaluated via [`execute_on_results`] instead.
    ///
    /// [`execute_on_results`]: Validator::execute_on_results
    pub async fn execute(&self, value: &serde_json::Value, meta: &ExecuteMeta) -> Result<bool> {
        match &self.inner.rule {
            RuleHandle::Regular(rule) => {
                let param = self.param();
                rule.execute(value, &param, meta).await
            }
            RuleHandle::Result(_) => Ok(false),
        }
    }

    /// Run a result rule against the cycle's aggregate results. Returns
    /// `false` for regular validators.
    pub fn execute_on_results(
        &self,
        regular_validation_result: &[ValidatorOutcome],
        prev_validation_result: &[ValidatorOutcome],
    ) -> bool {
        match &self.inner.rule {
            RuleHandle::Result(rule) => {
                rule.execute_on_results(regular_validation_result, prev_validation_result)
            }
            RuleHandle::Regular(_) => false,
        }
    }

    /// Advisory: a pending execution of this validator was superseded.
    pub fn abort_execution(&self) {
        if let RuleHandle::Regular(rule) = &self.inner.rule {
            rule.abort_execution();
        }
    }

    /// The outcome entry this validator contributes when active.
    pub fn outcome(&self) -> ValidatorOutcome {
        ValidatorOutcome::new(self.name(), self.kind(), self.validator_type())
    }

    /// Compose the data handed to message resolution for this instance.
    pub fn message_data(&self, model_value: &ModelValue, field_name: Option<&str>) -> MessageData {
        MessageData {
            name: self.name().to_string(),
            validator_type: self.validator_type(),
            param: self.param(),
            model_value: model_value.clone(),
            field_name: field_name.map(String::from),
        }
    }

    /// Resolve the feedback message for this instance: the config override
    /// first, the rule's default next, the configuration guidance
    /// placeholder last. Never fails — a missing message degrades to the
    /// placeholder so the feedback pipeline keeps working.
    pub async fn get_message(&self, data: &MessageData) -> String {
        let resolver = { self.inner.read().config.get_message.clone() };
        if let Some(resolver) = resolver {
            return resolver.resolve(data).await;
        }
        let default = match &self.inner.rule {
            RuleHandle::Regular(r) => r.message(data).await,
            RuleHandle::Result(r) => r.message(data).await,
        };
        default.unwrap_or_else(|| {
            format!(
                "Please configure an error message for \"{}\" by overriding the \
                 rule's message or setting one on the validator config",
                self.name()
            )
        })
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("type", &self.validator_type())
            .finish()
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        let err = TrellisError::MissingValidatorName;
        tracing::error!("{err}");
        return Err(err);
    }
    Ok(())
}
