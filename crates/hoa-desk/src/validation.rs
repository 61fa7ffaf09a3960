//! Field-level validation errors reported with HTTP 422.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::money::Money;

/// Field name → messages, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn required(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.add(field, format!("The {} field is required.", label(field)));
        }
    }

    pub fn max_len(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.add(
                field,
                format!(
                    "The {} may not be greater than {max} characters.",
                    label(field)
                ),
            );
        }
    }

    /// `required` + `max_len`, the usual pair for names and titles.
    pub fn required_max(&mut self, field: &str, value: &str, max: usize) {
        self.required(field, value);
        self.max_len(field, value, max);
    }

    pub fn optional_max(&mut self, field: &str, value: Option<&str>, max: usize) {
        if let Some(value) = value {
            self.max_len(field, value, max);
        }
    }

    pub fn positive_amount(&mut self, field: &str, amount: Money) {
        if !amount.is_positive() {
            self.add(field, format!("The {} must be greater than 0.", label(field)));
        }
    }

    pub fn non_negative_amount(&mut self, field: &str, amount: Money) {
        if amount.is_negative() {
            self.add(field, format!("The {} must be at least 0.", label(field)));
        }
    }

    pub fn taken(&mut self, field: &str) {
        self.add(field, format!("The {} has already been taken.", label(field)));
    }

    pub fn missing_reference(&mut self, field: &str) {
        self.add(field, format!("The selected {} is invalid.", label(field)));
    }

    pub fn email(&mut self, field: &str, value: &str) {
        let trimmed = value.trim();
        let valid = match trimmed.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !trimmed.contains(char::is_whitespace)
            }
            None => false,
        };
        if !valid {
            self.add(
                field,
                format!("The {} must be a valid email address.", label(field)),
            );
        }
    }

    /// Lowercase slug such as a document category.
    pub fn slug(&mut self, field: &str, value: &str) {
        let valid = !value.is_empty()
            && value
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if !valid {
            self.add(
                field,
                format!(
                    "The {} may only contain lowercase letters, numbers, dashes and underscores.",
                    label(field)
                ),
            );
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.values().flatten().next() {
            Some(first) => write!(f, "{first}"),
            None => write!(f, "The given data was invalid."),
        }
    }
}

impl std::error::Error for ValidationErrors {}

/// Human label for a snake_case field name (`unit_id` → `unit id`).
pub fn label(field: &str) -> String {
    field.rsplit('.').next().unwrap_or(field).replace('_', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_messages_per_field() {
        let mut errors = ValidationErrors::new();
        errors.required_max("name", "  ", 10);
        errors.email("email", "not-an-address");
        errors.positive_amount("amount", Money::ZERO);

        assert_eq!(
            errors.messages("name"),
            &["The name field is required.".to_string()]
        );
        assert!(errors.has("email"));
        assert_eq!(
            errors.messages("amount"),
            &["The amount must be greater than 0.".to_string()]
        );
        assert_eq!(errors.to_string(), "The amount must be greater than 0.");
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn accepts_valid_values() {
        let mut errors = ValidationErrors::new();
        errors.required_max("name", "Cedar Court", 255);
        errors.email("email", "board@cedar.example");
        errors.slug("category", "lease_agreement");
        assert!(errors.into_result().is_ok());
    }

    #[test]
    fn serializes_as_field_map() {
        let mut errors = ValidationErrors::new();
        errors.taken("plate_number");
        let json = serde_json::to_value(&errors).expect("serialize");
        assert_eq!(
            json["plate_number"][0],
            "The plate number has already been taken."
        );
    }
}
