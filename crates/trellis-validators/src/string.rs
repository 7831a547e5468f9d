//! String rules: type, length, and pattern checks.
//!
//! All of these treat a non-string value as active (invalid) — a length or
//! pattern constraint on a number is a configuration smell the host should
//! see, not silently pass.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use trellis_types::{MessageData, Result, TrellisError};

use crate::validator::{ExecuteMeta, Rule};

fn as_str(value: &serde_json::Value) -> Option<&str> {
    value.as_str()
}

/// Character count of a string value; `None` for non-strings.
fn char_len(value: &serde_json::Value) -> Option<usize> {
    as_str(value).map(|s| s.chars().count())
}

fn field(data: &MessageData) -> &str {
    data.field_name.as_deref().unwrap_or("value")
}

// ---------------------------------------------------------------------------
// IsString
// ---------------------------------------------------------------------------

/// Active when the value is not a string.
pub struct IsString;

#[async_trait]
impl Rule for IsString {
    fn name(&self) -> &str {
        "IsString"
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        _param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        Ok(!value.is_string())
    }

    async fn message(&self, data: &MessageData) -> Option<String> {
        Some(format!("Please enter a valid {}.", field(data)))
    }
}

// ---------------------------------------------------------------------------
// Length rules
// ---------------------------------------------------------------------------

/// Active when the string's length differs from the param.
pub struct EqualsLength;

#[async_trait]
impl Rule for EqualsLength {
    fn name(&self) -> &str {
        "EqualsLength"
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        let expected = param.as_u64().unwrap_or(0) as usize;
        Ok(char_len(value) != Some(expected))
    }

    async fn message(&self, data: &MessageData) -> Option<String> {
        Some(format!(
            "Please enter a correct {} of exactly {} characters.",
            field(data),
            data.param
        ))
    }
}

/// Active when the string is shorter than the param.
pub struct MinLength;

#[async_trait]
impl Rule for MinLength {
    fn name(&self) -> &str {
        "MinLength"
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        let min = param.as_u64().unwrap_or(0) as usize;
        Ok(match char_len(value) {
            Some(len) => len < min,
            None => true,
        })
    }

    async fn message(&self, data: &MessageData) -> Option<String> {
        Some(format!(
            "Please enter a {} of at least {} characters.",
            field(data),
            data.param
        ))
    }
}

/// Active when the string is longer than the param.
pub struct MaxLength;

#[async_trait]
impl Rule for MaxLength {
    fn name(&self) -> &str {
        "MaxLength"
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        let max = param.as_u64().unwrap_or(u64::MAX) as usize;
        Ok(match char_len(value) {
            Some(len) => len > max,
            None => true,
        })
    }

    async fn message(&self, data: &MessageData) -> Option<String> {
        Some(format!(
            "Please enter a {} of at most {} characters.",
            field(data),
            data.param
        ))
    }
}

/// Active when the string's length falls outside `{ "min": .., "max": .. }`.
pub struct MinMaxLength;

#[async_trait]
impl Rule for MinMaxLength {
    fn name(&self) -> &str {
        "MinMaxLength"
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        let min = param.get("min").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let max = param
            .get("max")
            .and_then(|v| v.as_u64())
            .unwrap_or(u64::MAX) as usize;
        Ok(match char_len(value) {
            Some(len) => len < min || len > max,
            None => true,
        })
    }

    async fn message(&self, data: &MessageData) -> Option<String> {
        let min = data.param.get("min").cloned().unwrap_or_default();
        let max = data.param.get("max").cloned().unwrap_or_default();
        Some(format!(
            "Please enter a {} between {min} and {max} characters.",
            field(data)
        ))
    }
}

// ---------------------------------------------------------------------------
// Pattern / IsEmail
// ---------------------------------------------------------------------------

/// Active when the string does not match the regex given as param.
///
/// An invalid regex param is an execution failure, which the engine treats
/// as inactive and logs.
pub struct Pattern;

#[async_trait]
impl Rule for Pattern {
    fn name(&self) -> &str {
        "Pattern"
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        let pattern = param.as_str().ok_or_else(|| TrellisError::Execution {
            validator: self.name().to_string(),
            message: "param must be a regex string".to_string(),
        })?;
        let re = Regex::new(pattern).map_err(|e| TrellisError::Execution {
            validator: self.name().to_string(),
            message: format!("invalid pattern: {e}"),
        })?;
        Ok(match as_str(value) {
            Some(s) => !re.is_match(s),
            None => true,
        })
    }

    async fn message(&self, data: &MessageData) -> Option<String> {
        Some(format!("Please enter a valid {}.", field(data)))
    }
}

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

/// Active when the string is not a plausible email address.
pub struct IsEmail;

#[async_trait]
impl Rule for IsEmail {
    fn name(&self) -> &str {
        "IsEmail"
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        _param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        let re = EMAIL_RE.get_or_init(|| {
            Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)+$")
                .expect("email regex is constant and valid")
        });
        Ok(match as_str(value) {
            Some(s) => !re.is_match(s),
            None => true,
        })
    }

    async fn message(&self, data: &MessageData) -> Option<String> {
        Some(format!(
            "Please enter a valid {} in the format \"name@example.com\".",
            field(data)
        ))
    }
}
