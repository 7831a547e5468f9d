//! Feedback selection: which active validators are visible, in what order.
//!
//! The selector is a pure policy over the cycle's total result and the
//! host's interaction flags — it never touches rendering. Ordering follows
//! the declared `validation_types` priority list; visibility is decided per
//! type by a pluggable [`FeedbackVisibility`]; the result is capped at a
//! configurable number of visible messages (default 1, so only the highest
//! priority active entry shows unless the host raises the cap).

use std::sync::Arc;

use trellis_types::{InteractionState, ValidationStates, ValidatorOutcome};

// ---------------------------------------------------------------------------
// Visibility policy
// ---------------------------------------------------------------------------

/// Per-type condition for showing feedback to the end user.
pub trait FeedbackVisibility: Send + Sync {
    fn show_feedback_for(&self, validator_type: &str, interaction: &InteractionState) -> bool;
}

/// The default policy: show once the control is touched and dirty, or was
/// submitted, or was prefilled (an invalid initial value should be visible
/// without further interaction). The type does not matter.
pub struct DefaultVisibility;

impl FeedbackVisibility for DefaultVisibility {
    fn show_feedback_for(&self, _validator_type: &str, interaction: &InteractionState) -> bool {
        (interaction.touched && interaction.dirty)
            || interaction.prefilled
            || interaction.submitted
    }
}

// ---------------------------------------------------------------------------
// FeedbackSelector
// ---------------------------------------------------------------------------

/// Visibility and ordering policy over a cycle's total validation result.
#[derive(Clone)]
pub struct FeedbackSelector {
    validation_types: Vec<String>,
    visible_messages: usize,
    visibility: Arc<dyn FeedbackVisibility>,
}

impl FeedbackSelector {
    /// A selector over the given type priority list ("error" first by
    /// convention), default cap of one visible message, default visibility.
    pub fn new(validation_types: Vec<String>) -> Self {
        Self {
            validation_types,
            visible_messages: 1,
            visibility: Arc::new(DefaultVisibility),
        }
    }

    /// The declared type priority list.
    pub fn validation_types(&self) -> &[String] {
        &self.validation_types
    }

    pub fn is_supported_type(&self, validator_type: &str) -> bool {
        self.validation_types.iter().any(|t| t == validator_type)
    }

    /// Raise or lower the visible message cap.
    pub fn set_visible_messages(&mut self, cap: usize) {
        self.visible_messages = cap;
    }

    /// Replace the visibility policy.
    pub fn set_visibility(&mut self, visibility: impl FeedbackVisibility + 'static) {
        self.visibility = Arc::new(visibility);
    }

    /// Types with at least one active entry, in declared priority order.
    pub fn has_feedback_for(&self, states: &ValidationStates) -> Vec<String> {
        self.validation_types
            .iter()
            .filter(|t| states.has_active(t))
            .cloned()
            .collect()
    }

    /// The total result reordered by type priority. Within a type, the
    /// cycle's result order (result validators first, then sync, then
    /// async) is preserved.
    pub fn prioritized(&self, total: &[ValidatorOutcome]) -> Vec<ValidatorOutcome> {
        let mut ordered = Vec::with_capacity(total.len());
        for t in &self.validation_types {
            ordered.extend(
                total
                    .iter()
                    .filter(|o| o.validator_type == *t)
                    .cloned(),
            );
        }
        ordered
    }

    /// The visible entries: prioritized, filtered by the per-type
    /// visibility policy, capped at the visible message count.
    pub fn select(
        &self,
        total: &[ValidatorOutcome],
        interaction: &InteractionState,
    ) -> Vec<ValidatorOutcome> {
        self.prioritized(total)
            .into_iter()
            .filter(|o| {
                self.visibility
                    .show_feedback_for(&o.validator_type, interaction)
            })
            .take(self.visible_messages)
            .collect()
    }

    /// Distinct types of a visible selection, priority order preserved.
    pub fn shows_feedback_for(&self, selection: &[ValidatorOutcome]) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for o in selection {
            if !types.contains(&o.validator_type) {
                types.push(o.validator_type.clone());
            }
        }
        types
    }
}
