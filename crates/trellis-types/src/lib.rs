//! Shared types, errors, model values, and validation state for Trellis.
//!
//! This crate provides the foundational types used across the other Trellis
//! crates:
//! - `TrellisError` — unified error taxonomy
//! - `ModelValue` — the value under validation, including the `Unparseable` sentinel
//! - `ValidationStates` — per-type, per-rule active map rebuilt every cycle
//! - `ValidatorOutcome` / `ValidatorKind` — tagged results of a validation cycle
//! - `FeedbackEntry` — one resolved, displayable feedback message
//! - `InteractionState` — the host control's interaction flags

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Unified error type for all Trellis subsystems.
#[derive(Debug, thiserror::Error)]
pub enum TrellisError {
    #[error("A validator needs a non-empty name; set it when constructing the rule")]
    MissingValidatorName,

    #[error(
        "This control does not support the validator type \"{validator_type}\" \
         used in \"{validator}\". Change the validator type or add it to the \
         declared validation types."
    )]
    UnsupportedValidatorType {
        validator: String,
        validator_type: String,
    },

    #[error("Validator \"{validator}\" failed to execute: {message}")]
    Execution { validator: String, message: String },

    #[error("{0}")]
    Other(String),
}

impl TrellisError {
    /// Returns `true` for configuration errors raised while mutating the
    /// validator list — the "TypeConfigurationError" family. These surface
    /// synchronously to the caller and are additionally logged, since the
    /// host may swallow errors thrown from property-change handlers.
    pub fn is_type_configuration(&self) -> bool {
        matches!(
            self,
            TrellisError::MissingValidatorName | TrellisError::UnsupportedValidatorType { .. }
        )
    }
}

/// A convenience alias for `Result<T, TrellisError>`.
pub type Result<T> = std::result::Result<T, TrellisError>;

// ---------------------------------------------------------------------------
// ModelValue — the value under validation
// ---------------------------------------------------------------------------

/// The current value under validation.
///
/// A model value is any JSON-shaped value, or the `Unparseable` sentinel that
/// carries the raw view-layer string when the host's view-to-model conversion
/// failed. The engine only ever reads it; ownership stays with the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ModelValue {
    Value(serde_json::Value),
    Unparseable { view_value: String },
}

impl ModelValue {
    /// A missing value (JSON null).
    pub fn none() -> Self {
        ModelValue::Value(serde_json::Value::Null)
    }

    /// A plain string value.
    pub fn text(s: impl Into<String>) -> Self {
        ModelValue::Value(serde_json::Value::String(s.into()))
    }

    /// An arbitrary JSON value.
    pub fn json(v: serde_json::Value) -> Self {
        ModelValue::Value(v)
    }

    /// The sentinel for a view string that could not be parsed into a model.
    pub fn unparseable(view_value: impl Into<String>) -> Self {
        ModelValue::Unparseable {
            view_value: view_value.into(),
        }
    }

    /// The value handed to `Rule::execute`: the model value itself, or the
    /// raw view string when the model is unparseable.
    pub fn executable(&self) -> serde_json::Value {
        match self {
            ModelValue::Value(v) => v.clone(),
            ModelValue::Unparseable { view_value } => {
                serde_json::Value::String(view_value.clone())
            }
        }
    }

    pub fn is_unparseable(&self) -> bool {
        matches!(self, ModelValue::Unparseable { .. })
    }
}

impl Default for ModelValue {
    fn default() -> Self {
        ModelValue::none()
    }
}

impl From<serde_json::Value> for ModelValue {
    fn from(v: serde_json::Value) -> Self {
        ModelValue::Value(v)
    }
}

impl From<&str> for ModelValue {
    fn from(s: &str) -> Self {
        ModelValue::text(s)
    }
}

// ---------------------------------------------------------------------------
// ValidatorKind / ValidatorOutcome — tagged cycle results
// ---------------------------------------------------------------------------

/// The dispatch tag of a validator: a regular rule evaluated against the
/// model value, or a result rule evaluated against the aggregate outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    Regular,
    Result,
}

/// One active validator in a cycle's result set.
///
/// `TotalValidationResult` is a `Vec<ValidatorOutcome>`: active result
/// validators first (in list order), then regular results with the
/// synchronous part ahead of the asynchronous part, list order preserved
/// within each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorOutcome {
    pub name: String,
    pub kind: ValidatorKind,
    #[serde(rename = "type")]
    pub validator_type: String,
}

impl ValidatorOutcome {
    pub fn new(
        name: impl Into<String>,
        kind: ValidatorKind,
        validator_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            validator_type: validator_type.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ValidationStates — per-type, per-rule active map
// ---------------------------------------------------------------------------

/// Mapping from validation type (e.g. "error", "warning") to the set of
/// rule names currently active under that type.
///
/// Only active entries are stored; absence means inactive. The map is
/// rebuilt from scratch every cycle — never patched across cycles — and
/// every declared type is present even when it has no active entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationStates {
    types: BTreeMap<String, BTreeSet<String>>,
}

impl ValidationStates {
    /// An empty state holding an entry for each declared type.
    pub fn for_types<S: AsRef<str>>(declared: &[S]) -> Self {
        let mut types = BTreeMap::new();
        for t in declared {
            types.insert(t.as_ref().to_string(), BTreeSet::new());
        }
        Self { types }
    }

    /// Mark `name` active under `validator_type`. The type entry is created
    /// if it was not declared up front.
    pub fn activate(&mut self, validator_type: &str, name: &str) {
        self.types
            .entry(validator_type.to_string())
            .or_default()
            .insert(name.to_string());
    }

    /// Whether `name` is active under `validator_type`.
    pub fn is_active(&self, validator_type: &str, name: &str) -> bool {
        self.types
            .get(validator_type)
            .map(|names| names.contains(name))
            .unwrap_or(false)
    }

    /// The active rule names under a type, in name order.
    pub fn active(&self, validator_type: &str) -> Vec<&str> {
        self.types
            .get(validator_type)
            .map(|names| names.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Whether a type has at least one active entry.
    pub fn has_active(&self, validator_type: &str) -> bool {
        self.types
            .get(validator_type)
            .map(|names| !names.is_empty())
            .unwrap_or(false)
    }

    /// All type names present in the map, in name order.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Total number of active entries across all types.
    pub fn active_count(&self) -> usize {
        self.types.values().map(BTreeSet::len).sum()
    }
}

// ---------------------------------------------------------------------------
// FeedbackEntry — one displayable message
// ---------------------------------------------------------------------------

/// One resolved feedback message, ready for a rendering collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub message: String,
    #[serde(rename = "type")]
    pub validator_type: String,
    /// Name of the rule that produced the message.
    pub validator: String,
}

// ---------------------------------------------------------------------------
// InteractionState — host interaction flags
// ---------------------------------------------------------------------------

/// The host control's interaction flags, read by the feedback selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionState {
    pub touched: bool,
    pub dirty: bool,
    pub prefilled: bool,
    pub submitted: bool,
}

// ---------------------------------------------------------------------------
// MessageData — input to message resolution
// ---------------------------------------------------------------------------

/// The composed data handed to message resolvers, mirroring what the rule
/// knew at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageData {
    pub name: String,
    #[serde(rename = "type")]
    pub validator_type: String,
    pub param: serde_json::Value,
    pub model_value: ModelValue,
    pub field_name: Option<String>,
}
