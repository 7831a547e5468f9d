//! IBAN rules: ISO 13616 checksum plus per-country length validation.

use async_trait::async_trait;

use trellis_types::{MessageData, Result};

use crate::validator::{ExecuteMeta, Rule};

/// Registered IBAN lengths per ISO 3166 country code.
const COUNTRY_LENGTHS: &[(&str, usize)] = &[
    ("AD", 24), ("AE", 23), ("AT", 20), ("AZ", 28), ("BA", 20), ("BE", 16),
    ("BG", 22), ("BH", 22), ("BR", 29), ("CH", 21), ("CR", 22), ("CY", 28),
    ("CZ", 24), ("DE", 22), ("DK", 18), ("DO", 28), ("EE", 20), ("ES", 24),
    ("FI", 18), ("FO", 18), ("FR", 27), ("GB", 22), ("GE", 22), ("GI", 23),
    ("GL", 18), ("GR", 27), ("GT", 28), ("HR", 21), ("HU", 28), ("IE", 22),
    ("IL", 23), ("IS", 26), ("IT", 27), ("JO", 30), ("KW", 30), ("KZ", 20),
    ("LB", 28), ("LI", 21), ("LT", 20), ("LU", 20), ("LV", 21), ("MC", 27),
    ("MD", 24), ("ME", 22), ("MK", 19), ("MR", 27), ("MT", 31), ("MU", 30),
    ("NL", 18), ("NO", 15), ("PK", 24), ("PL", 28), ("PS", 29), ("PT", 25),
    ("QA", 29), ("RO", 24), ("RS", 22), ("SA", 24), ("SE", 24), ("SI", 19),
    ("SK", 24), ("SM", 27), ("TN", 24), ("TR", 26), ("UA", 29), ("VG", 24),
    ("XK", 20),
];

fn registered_length(country: &str) -> Option<usize> {
    COUNTRY_LENGTHS
        .iter()
        .find(|(code, _)| *code == country)
        .map(|(_, len)| *len)
}

/// Checksum of the rearranged IBAN, base-36 digits folded mod 97.
fn mod97(rearranged: &str) -> Option<u32> {
    let mut rem: u32 = 0;
    for c in rearranged.chars() {
        let digit = c.to_digit(36)?;
        rem = if digit < 10 {
            (rem * 10 + digit) % 97
        } else {
            (rem * 100 + digit) % 97
        };
    }
    Some(rem)
}

/// Full ISO 13616 check: characters, country length, and mod-97 == 1.
pub(crate) fn is_valid_iban(input: &str) -> bool {
    let compact: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if compact.len() < 5 || !compact.chars().all(|c| c.is_ascii_alphanumeric()) {
        return false;
    }
    let country = &compact[..2];
    if !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    match registered_length(country) {
        Some(len) if len == compact.len() => {}
        _ => return false,
    }
    let rearranged = format!("{}{}", &compact[4..], &compact[..4]);
    mod97(&rearranged) == Some(1)
}

/// Active when the value is not a valid IBAN.
pub struct IsIban;

#[async_trait]
impl Rule for IsIban {
    fn name(&self) -> &str {
        "IsIban"
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        _param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        Ok(match value.as_str() {
            Some(s) => !is_valid_iban(s),
            None => true,
        })
    }

    async fn message(&self, data: &MessageData) -> Option<String> {
        let field = data.field_name.as_deref().unwrap_or("IBAN");
        Some(format!("Please enter a valid {field}."))
    }
}

/// Active when the value is not a valid IBAN of the country given as param.
///
/// The country check layers on top of the base IBAN check: a wrong prefix is
/// an error even when the checksum holds.
pub struct IsCountryIban;

#[async_trait]
impl Rule for IsCountryIban {
    fn name(&self) -> &str {
        "IsCountryIban"
    }

    async fn execute(
        &self,
        value: &serde_json::Value,
        param: &serde_json::Value,
        _meta: &ExecuteMeta,
    ) -> Result<bool> {
        let Some(s) = value.as_str() else {
            return Ok(true);
        };
        let country = param.as_str().unwrap_or("");
        if !s.trim_start().to_ascii_uppercase().starts_with(country) {
            return Ok(true);
        }
        Ok(!is_valid_iban(s))
    }

    async fn message(&self, data: &MessageData) -> Option<String> {
        let country = data.param.as_str().unwrap_or("the requested country");
        Some(format!("Please enter a valid {country} IBAN."))
    }
}
