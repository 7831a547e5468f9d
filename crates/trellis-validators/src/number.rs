//! Number rules: type and bound checks. Non-numeric values are active.

use async_trait::async_trait;

use trellis_types::{MessageData, Result};

use crate::validator::{ExecuteMeta, Rule};

fn field(data: &MessageData) -> &str {
    data.field_name.as_deref().unwrap_or("value")
}

/// Active when the value is not a number.
pub struct IsNumber;

#[async_trait]
impl Rule for IsNumber {
    fn name(&self) -> &str {
        "IsNumber"
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        _param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        Ok(!value.is_number())
    }

    async fn message(&self, data: &MessageData) -> Option<String> {
        Some(format!("Please enter a valid {} (number).", field(data)))
    }
}

/// Active when the number is below the param.
pub struct MinNumber;

#[async_trait]
impl Rule for MinNumber {
    fn name(&self) -> &str {
        "MinNumber"
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        let min = param.as_f64().unwrap_or(f64::NEG_INFINITY);
        Ok(match value.as_f64() {
            Some(n) => n < min,
            None => true,
        })
    }

    async fn message(&self, data: &MessageData) -> Option<String> {
        Some(format!(
            "Please enter a {} of at least {}.",
            field(data),
            data.param
        ))
    }
}

/// Active when the number is above the param.
pub struct MaxNumber;

#[async_trait]
impl Rule for MaxNumber {
    fn name(&self) -> &str {
        "MaxNumber"
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        let max = param.as_f64().unwrap_or(f64::INFINITY);
        Ok(match value.as_f64() {
            Some(n) => n > max,
            None => true,
        })
    }

    async fn message(&self, data: &MessageData) -> Option<String> {
        Some(format!(
            "Please enter a {} of at most {}.",
            field(data),
            data.param
        ))
    }
}

/// Active when the number falls outside `{ "min": .., "max": .. }`.
pub struct MinMaxNumber;

#[async_trait]
impl Rule for MinMaxNumber {
    fn name(&self) -> &str {
        "MinMaxNumber"
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        let min = param
            .get("min")
            .and_then(|v| v.as_f64())
            .unwrap_or(f64::NEG_INFINITY);
        let max = param
            .get("max")
            .and_then(|v| v.as_f64())
            .unwrap_or(f64::INFINITY);
        Ok(match value.as_f64() {
            Some(n) => n < min || n > max,
            None => true,
        })
    }

    async fn message(&self, data: &MessageData) -> Option<String> {
        let min = data.param.get("min").cloned().unwrap_or_default();
        let max = data.param.get("max").cloned().unwrap_or_default();
        Some(format!(
            "Please enter a {} between {min} and {max}.",
            field(data)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::Validator;
    use serde_json::json;

    async fn active(
        rule: impl Rule + 'static,
        param: serde_json::Value,
        value: serde_json::Value,
    ) -> bool {
        let v = Validator::with_param(rule, param).unwrap();
        v.execute(&value, &ExecuteMeta::default()).await.unwrap()
    }

    #[tokio::test]
    async fn is_number_flags_non_numbers() {
        assert!(!active(IsNumber, json!(null), json!(4)).await);
        assert!(!active(IsNumber, json!(null), json!(4.5)).await);
        assert!(active(IsNumber, json!(null), json!("4")).await);
        assert!(active(IsNumber, json!(null), json!(null)).await);
    }

    #[tokio::test]
    async fn min_number_boundary() {
        assert!(active(MinNumber, json!(10), json!(9)).await);
        assert!(!active(MinNumber, json!(10), json!(10)).await);
        assert!(!active(MinNumber, json!(10), json!(11)).await);
    }

    #[tokio::test]
    async fn max_number_boundary() {
        assert!(!active(MaxNumber, json!(10), json!(10)).await);
        assert!(active(MaxNumber, json!(10), json!(10.5)).await);
    }

    #[tokio::test]
    async fn min_max_number_window() {
        let param = json!({ "min": 2, "max": 4 });
        assert!(active(MinMaxNumber, param.clone(), json!(1)).await);
        assert!(!active(MinMaxNumber, param.clone(), json!(3)).await);
        assert!(active(MinMaxNumber, param, json!(5)).await);
    }

    #[tokio::test]
    async fn non_number_value_is_active_for_bound_rules() {
        assert!(active(MinNumber, json!(1), json!("2")).await);
        assert!(active(MaxNumber, json!(1), json!("0")).await);
    }
}
