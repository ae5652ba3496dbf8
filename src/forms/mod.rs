//! Form Specifications
//!
//! A [`FormSpec`] is the typed list of inputs shown to the caller, either
//! synthesized from a routine signature ([`dynamic`]) or derived from a
//! table descriptor ([`table`]). Binding submitted data yields a
//! [`BoundForm`] carrying the cleaned values or the error annotations.

pub mod dynamic;
pub mod table;

pub use table::{edit_form, table_form};

use crate::error::AppError;
use crate::value::{CellValue, DATE_FORMAT, TIME_FORMAT};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Raw submitted form fields
pub type FormData = HashMap<String, String>;

const REQUIRED: &str = "This field is required.";

/// Input widget and its validation rule
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "widget", rename_all = "snake_case")]
pub enum FieldKind {
    Text { max_length: Option<usize> },
    Integer { min_value: Option<i64> },
    Choice { choices: Vec<&'static str> },
    Date,
    Time,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormField {
    pub name: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,
}

impl FormField {
    pub fn new(name: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind,
            required: true,
            placeholder: None,
            initial: None,
        }
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Validate one submitted value and convert it to a cell
    pub fn clean(&self, raw: Option<&str>) -> Result<CellValue, String> {
        let value = raw.map(str::trim).unwrap_or_default();
        if value.is_empty() {
            return if self.required {
                Err(REQUIRED.to_string())
            } else {
                Ok(CellValue::Null)
            };
        }

        match &self.kind {
            FieldKind::Text { max_length } => {
                let length = value.chars().count();
                match max_length {
                    Some(max) if length > *max => Err(format!(
                        "Ensure this value has at most {} characters (it has {}).",
                        max, length
                    )),
                    _ => Ok(CellValue::text(value)),
                }
            }
            FieldKind::Integer { min_value } => {
                let number: i64 = value
                    .parse()
                    .map_err(|_| "Enter a whole number.".to_string())?;
                match min_value {
                    Some(min) if number < *min => Err(format!(
                        "Ensure this value is greater than or equal to {}.",
                        min
                    )),
                    _ => Ok(CellValue::Int(number)),
                }
            }
            FieldKind::Choice { choices } => {
                if choices.iter().any(|c| *c == value) {
                    Ok(CellValue::text(value))
                } else {
                    Err(format!(
                        "Select a valid choice. {} is not one of the available choices.",
                        value
                    ))
                }
            }
            FieldKind::Date => NaiveDate::parse_from_str(value, DATE_FORMAT)
                .map(CellValue::Date)
                .map_err(|_| "Enter a valid date.".to_string()),
            FieldKind::Time => NaiveTime::parse_from_str(value, TIME_FORMAT)
                .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
                .map(CellValue::Time)
                .map_err(|_| "Enter a valid time.".to_string()),
        }
    }
}

/// Ordered set of input fields
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormSpec {
    pub fields: Vec<FormField>,
}

impl FormSpec {
    pub fn new(fields: Vec<FormField>) -> Self {
        Self { fields }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[cfg(test)]
    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Add a field, replacing an earlier one with the same name in place
    pub fn push(&mut self, field: FormField) {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// Clean every field against the submitted data
    pub fn bind(&self, data: &FormData) -> BoundForm {
        let mut form = BoundForm {
            fields: self.fields.clone(),
            data: data.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            errors: BTreeMap::new(),
            non_field_errors: Vec::new(),
            cleaned: Vec::with_capacity(self.fields.len()),
        };

        for field in &self.fields {
            match field.clean(data.get(&field.name).map(String::as_str)) {
                Ok(value) => form.cleaned.push(value),
                Err(message) => {
                    form.cleaned.push(CellValue::Null);
                    form.add_error(Some(field.name.as_str()), message);
                }
            }
        }
        form
    }

    /// Bind and return the cleaned values in field order
    pub fn validate(&self, data: &FormData) -> Result<Vec<CellValue>, AppError> {
        self.bind(data).into_values()
    }
}

/// A form together with the submission it was bound to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundForm {
    pub fields: Vec<FormField>,
    pub data: BTreeMap<String, String>,
    pub errors: BTreeMap<String, Vec<String>>,
    pub non_field_errors: Vec<String>,
    #[serde(skip)]
    cleaned: Vec<CellValue>,
}

impl BoundForm {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.non_field_errors.is_empty()
    }

    /// Annotate a field, or the whole form when `field` is `None`
    pub fn add_error(&mut self, field: Option<&str>, message: impl Into<String>) {
        match field {
            Some(name) => self
                .errors
                .entry(name.to_string())
                .or_default()
                .push(message.into()),
            None => self.non_field_errors.push(message.into()),
        }
    }

    /// Cleaned values in field order; fields that failed hold `Null`
    pub fn cleaned(&self) -> &[CellValue] {
        &self.cleaned
    }

    pub fn into_values(self) -> Result<Vec<CellValue>, AppError> {
        if self.is_valid() {
            Ok(self.cleaned)
        } else {
            Err(AppError::FormValidationFailed(Box::new(self)))
        }
    }
}
