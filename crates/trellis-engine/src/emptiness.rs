//! The emptiness predicate: decides whether a model value counts as
//! "no input", which gates every rule not marked `runs_on_empty`.

use std::sync::Arc;

use trellis_types::ModelValue;

/// Host-overridable emptiness decision.
pub type EmptinessPredicate = Arc<dyn Fn(&ModelValue) -> bool + Send + Sync>;

/// The default: falsy scalars and structurally empty containers count as
/// empty. An unparseable value is empty exactly when its view string is.
pub fn default_is_empty(value: &ModelValue) -> bool {
    match value {
        ModelValue::Unparseable { view_value } => view_value.is_empty(),
        ModelValue::Value(v) => match v {
            serde_json::Value::Null => true,
            serde_json::Value::Bool(b) => !b,
            serde_json::Value::Number(n) => n.as_f64() == Some(0.0),
            serde_json::Value::String(s) => s.is_empty(),
            serde_json::Value::Array(a) => a.is_empty(),
            serde_json::Value::Object(o) => o.is_empty(),
        },
    }
}

/// The default predicate, boxed for storage on the engine.
pub fn default_predicate() -> EmptinessPredicate {
    Arc::new(default_is_empty)
}
