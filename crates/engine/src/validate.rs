//! Request field validation shared by the services.
//!
//! Errors are collected per field so a client sees every problem at once,
//! and surface as a single `AppError::Validation`.

use serde_json::Value;
use validator::validate_email;

use smartnotify_common::error::{AppError, FieldErrors};

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";

#[derive(Debug, Default)]
pub struct Errors(FieldErrors);

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` for `field` unless the field already has an error.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| Value::String(message.into()));
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<(), AppError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.0))
        }
    }
}

/// A required, non-blank string field. Records an error and returns `None`
/// when the field is missing or blank.
pub fn required_str<'a>(errors: &mut Errors, field: &str, value: &'a Option<String>) -> Option<&'a str> {
    match value.as_deref() {
        None => {
            errors.add(field, REQUIRED);
            None
        }
        Some(v) if v.trim().is_empty() => {
            errors.add(field, BLANK);
            None
        }
        Some(v) => Some(v),
    }
}

/// Record an error for `field` unless `email` is a deliverable-looking
/// address (HTML5 local part, hostname or IP-literal domain).
pub fn check_email(errors: &mut Errors, field: &str, email: &str) {
    if !validate_email(email) {
        errors.add(field, INVALID_EMAIL);
    }
}

/// Parse a primary-key reference given as a JSON integer or numeric string.
pub fn parse_pk(value: Option<&Value>) -> Result<i64, String> {
    match value {
        None | Some(Value::Null) => Err(REQUIRED.to_string()),
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| format!("Incorrect type. Expected pk value, received {}.", n)),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| "Incorrect type. Expected pk value, received str.".to_string()),
        Some(other) => Err(format!(
            "Incorrect type. Expected pk value, received {}.",
            json_type_name(other)
        )),
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}
