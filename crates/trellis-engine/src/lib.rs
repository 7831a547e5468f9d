//! Validation cycle pipeline, feedback selection, and engine events.
//!
//! This crate implements the Trellis engine: the host control feeds it a
//! model value, validator lists, and interaction flags; the engine runs the
//! four-phase cycle (emptiness, sync, async, result), rebuilds the per-type
//! validation state, and publishes ordered, visibility-filtered feedback.

pub mod emptiness;
pub mod engine;
pub mod events;
pub mod feedback;

pub use emptiness::{default_is_empty, default_predicate, EmptinessPredicate};
pub use engine::{EngineConfig, ValidateOptions, ValidationEngine};
pub use events::{EngineEvent, EventEmitter};
pub use feedback::{DefaultVisibility, FeedbackSelector, FeedbackVisibility};
