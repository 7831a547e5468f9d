//! The required-style rule: the only built-in that runs on empty values.

use async_trait::async_trait;

use trellis_types::{MessageData, Result};

use crate::validator::{ExecuteMeta, Rule};

/// Active when the engine's emptiness predicate judged the value empty.
///
/// `Required` is the canonical `runs_on_empty` rule: the emptiness gate that
/// skips every other regular rule on empty values is exactly what lets this
/// one report them.
pub struct Required;

#[async_trait]
impl Rule for Required {
    fn name(&self) -> &str {
        "Required"
    }

    fn runs_on_empty(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _value: &serde_json::Value,
        _param: &serde_json::Value,
        meta: &ExecuteMeta,
    ) -> Result<bool> {
        Ok(meta.value_is_empty)
    }

    async fn message(&self, data: &MessageData) -> Option<String> {
        let field = data.field_name.as_deref().unwrap_or("value");
        Some(format!("Please enter a {field}."))
    }
}
