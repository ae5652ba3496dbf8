//! Dynamic Form Synthesizer
//!
//! Turns a routine's textual parameter signature, as reported by
//! `pg_get_function_identity_arguments`, into input fields.

use super::{FieldKind, FormField, FormSpec};
use crate::error::AppError;
use crate::schema::STATUS_CHOICES;
use once_cell::sync::Lazy;
use regex::Regex;

/// Matches output cursor parameters the caller never supplies
static CURSOR_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"IN [a-zA-Z_]+ refcursor").expect("valid regex"));

const TIME_HINT: &str = "Format: hh:mm:ss";
const DATE_HINT: &str = "Format: DD.MM.YYYY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
    Unspecified,
}

/// One declared routine parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub direction: Direction,
    pub name: String,
    pub data_type: String,
}

impl ParamSpec {
    /// Parse a `[IN|OUT|INOUT] name type` token.
    ///
    /// Only the first word after the name is the type, so `character
    /// varying` classifies as `character`.
    pub fn parse(token: &str) -> Result<Self, AppError> {
        let words: Vec<&str> = token.split_whitespace().collect();
        let (direction, rest) = match words.first() {
            Some(&"IN") => (Direction::In, &words[1..]),
            Some(&"OUT") => (Direction::Out, &words[1..]),
            Some(&"INOUT") => (Direction::InOut, &words[1..]),
            _ => (Direction::Unspecified, &words[..]),
        };

        match rest {
            [name, data_type, ..] => Ok(Self {
                direction,
                name: name.to_string(),
                data_type: data_type.to_string(),
            }),
            _ => Err(AppError::MalformedParameterSpec(format!(
                "'{}' must name a parameter and its type",
                token.trim()
            ))),
        }
    }
}

/// Parse a comma-separated signature; an empty one has no parameters
pub fn parse_signature(param_spec: &str) -> Result<Vec<ParamSpec>, AppError> {
    if param_spec.trim().is_empty() {
        return Ok(Vec::new());
    }
    param_spec.split(',').map(ParamSpec::parse).collect()
}

/// True when the only parameters are output cursors
pub fn takes_no_arguments(param_spec: &str) -> bool {
    CURSOR_PARAM.replace_all(param_spec, "").trim().is_empty()
}

/// `peer_name` -> `Peer name`
fn label_for(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => spaced,
    }
}

/// Resolve the input field of one parameter; the first matching rule wins
/// and the order of the rules is observable
pub fn classify(param: &ParamSpec) -> Option<FormField> {
    let name = param.name.as_str();
    let data_type = param.data_type.as_str();
    let label = label_for(name);
    let text = FieldKind::Text { max_length: None };

    let field = if data_type == "character" && !name.contains("date") {
        FormField::new(name, label, text).placeholder(data_type)
    } else if data_type == "integer" {
        FormField::new(name, label, FieldKind::Integer { min_value: Some(0) }).placeholder(data_type)
    } else if data_type == "status" {
        FormField::new(
            name,
            label,
            FieldKind::Choice {
                choices: STATUS_CHOICES.to_vec(),
            },
        )
    } else if data_type == "time" {
        FormField::new(name, label, text).placeholder(TIME_HINT)
    } else if name.contains("date") {
        FormField::new(name, label, text).placeholder(DATE_HINT)
    } else if data_type.contains("refcursor") {
        return None;
    } else {
        FormField::new(name, label, text).placeholder(data_type)
    };
    Some(field)
}

/// Build the input form of a routine signature
pub fn build(param_spec: &str) -> Result<FormSpec, AppError> {
    let mut form = FormSpec::default();
    for param in parse_signature(param_spec)? {
        if let Some(field) = classify(&param) {
            form.push(field);
        }
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::FormData;
    use crate::value::CellValue;
    use pretty_assertions::assert_eq;

    fn submit(pairs: &[(&str, &str)]) -> FormData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_character_and_integer_parameters() {
        let form = build("IN peer_name character, grade integer").unwrap();
        assert_eq!(form.fields.len(), 2);

        let peer = &form.fields[0];
        assert_eq!(peer.name, "peer_name");
        assert_eq!(peer.label, "Peer name");
        assert_eq!(peer.kind, FieldKind::Text { max_length: None });
        assert_eq!(peer.placeholder.as_deref(), Some("character"));

        let grade = &form.fields[1];
        assert_eq!(grade.kind, FieldKind::Integer { min_value: Some(0) });

        assert!(form.validate(&submit(&[("peer_name", "alice"), ("grade", "-1")])).is_err());
        assert_eq!(
            form.validate(&submit(&[("peer_name", "alice"), ("grade", "3")])).unwrap(),
            vec![CellValue::text("alice"), CellValue::Int(3)]
        );
    }

    #[test]
    fn test_status_parameter_is_a_choice() {
        let form = build("status_field status").unwrap();
        assert_eq!(
            form.fields[0].kind,
            FieldKind::Choice {
                choices: vec!["Start", "Success", "Failure"]
            }
        );
        for state in ["Start", "Success", "Failure"] {
            assert!(form.validate(&submit(&[("status_field", state)])).is_ok());
        }
        assert!(form.validate(&submit(&[("status_field", "Done")])).is_err());
        assert!(form.validate(&submit(&[("status_field", "start")])).is_err());
    }

    #[test]
    fn test_date_in_name_beats_character_type() {
        let form = build("start_date character").unwrap();
        assert_eq!(form.fields[0].placeholder.as_deref(), Some(DATE_HINT));
        assert_eq!(form.fields[0].kind, FieldKind::Text { max_length: None });
    }

    #[test]
    fn test_time_beats_date_in_name() {
        let form = build("IN date_time time").unwrap();
        assert_eq!(form.fields[0].placeholder.as_deref(), Some(TIME_HINT));
    }

    #[test]
    fn test_cursor_parameters_are_skipped() {
        let form = build("IN peer character varying, IN ref refcursor").unwrap();
        assert_eq!(form.fields.len(), 1);
        assert_eq!(form.fields[0].placeholder.as_deref(), Some("character"));
    }

    #[test]
    fn test_unknown_type_uses_type_as_placeholder() {
        let form = build("amount numeric").unwrap();
        assert_eq!(form.fields[0].placeholder.as_deref(), Some("numeric"));
    }

    #[test]
    fn test_malformed_token_rejects_whole_spec() {
        match build("peer character, grade") {
            Err(AppError::MalformedParameterSpec(msg)) => assert!(msg.contains("grade")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(build("IN peer").is_err());
    }

    #[test]
    fn test_empty_signature_has_no_fields() {
        assert!(build("").unwrap().is_empty());
        assert!(build("   ").unwrap().is_empty());
    }

    #[test]
    fn test_zero_argument_detection() {
        assert!(takes_no_arguments(""));
        assert!(takes_no_arguments("IN ref refcursor"));
        assert!(!takes_no_arguments("IN peer character varying, IN ref refcursor"));
        assert!(!takes_no_arguments("checks_count integer"));
    }

    #[test]
    fn test_direction_is_recorded() {
        let params = parse_signature("IN a integer, OUT b integer, c text").unwrap();
        let directions: Vec<_> = params.iter().map(|p| p.direction).collect();
        assert_eq!(
            directions,
            vec![Direction::In, Direction::Out, Direction::Unspecified]
        );
    }
}
