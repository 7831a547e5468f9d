//! Date rules. Model values are ISO calendar dates (`"YYYY-MM-DD"` strings);
//! params carry the same format, or an array of them for
//! [`IsDateDisabled`].

use async_trait::async_trait;
use chrono::NaiveDate;

use trellis_types::{MessageData, Result};

use crate::validator::{ExecuteMeta, Rule};

const DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_date(value: &serde_json::Value) -> Option<NaiveDate> {
    value
        .as_str()
        .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
}

fn field(data: &MessageData) -> &str {
    data.field_name.as_deref().unwrap_or("value")
}

/// Active when the value does not parse as an ISO calendar date.
pub struct IsDate;

#[async_trait]
impl Rule for IsDate {
    fn name(&self) -> &str {
        "IsDate"
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        _param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        Ok(parse_date(value).is_none())
    }

    async fn message(&self, data: &MessageData) -> Option<String> {
        Some(format!("Please enter a valid {} (date).", field(data)))
    }
}

/// Active when the date lies before the param date.
pub struct MinDate;

#[async_trait]
impl Rule for MinDate {
    fn name(&self) -> &str {
        "MinDate"
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        let (Some(date), Some(min)) = (parse_date(value), parse_date(param)) else {
            return Ok(true);
        };
        Ok(date < min)
    }

    async fn message(&self, data: &MessageData) -> Option<String> {
        Some(format!(
            "Please enter a {} after or equal to {}.",
            field(data),
            data.param
        ))
    }
}

/// Active when the date lies after the param date.
pub struct MaxDate;

#[async_trait]
impl Rule for MaxDate {
    fn name(&self) -> &str {
        "MaxDate"
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        let (Some(date), Some(max)) = (parse_date(value), parse_date(param)) else {
            return Ok(true);
        };
        Ok(date > max)
    }

    async fn message(&self, data: &MessageData) -> Option<String> {
        Some(format!(
            "Please enter a {} before or equal to {}.",
            field(data),
            data.param
        ))
    }
}

/// Active when the date falls outside `{ "min": "..", "max": ".." }`.
pub struct MinMaxDate;

#[async_trait]
impl Rule for MinMaxDate {
    fn name(&self) -> &str {
        "MinMaxDate"
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        let Some(date) = parse_date(value) else {
            return Ok(true);
        };
        let min = param.get("min").and_then(parse_date);
        let max = param.get("max").and_then(parse_date);
        let below = min.map(|m| date < m).unwrap_or(false);
        let above = max.map(|m| date > m).unwrap_or(false);
        Ok(below || above)
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

/// Active when the date is one of the disabled dates given as param array.
pub struct IsDateDisabled;

#[async_trait]
impl Rule for IsDateDisabled {
    fn name(&self) -> &str {
        "IsDateDisabled"
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        let Some(date) = parse_date(value) else {
            return Ok(true);
        };
        let disabled = param
            .as_array()
            .map(|dates| dates.iter().filter_map(parse_date).any(|d| d == date))
            .unwrap_or(false);
        Ok(disabled)
    }

    async fn message(&self, data: &MessageData) -> Option<String> {
        Some(format!("This {} is not available.", field(data)))
    }
}
