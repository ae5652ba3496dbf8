//! Routine and query DTOs

use super::checkbox;
use crate::forms::FormSpec;
use crate::routines::{Routine, RoutineKind};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Ad-hoc SQL submission
#[derive(Debug, Deserialize, Validate)]
pub struct ExecuteSqlRequest {
    #[validate(length(min = 1, message = "SQL query is required"))]
    pub sql_query: String,

    #[serde(default)]
    pub save_results: Option<String>,
}

impl ExecuteSqlRequest {
    pub fn save_results(&self) -> bool {
        checkbox(&self.save_results)
    }
}

/// Submission of a routine without parameters
#[derive(Debug, Default, Deserialize)]
pub struct ExecuteRoutineRequest {
    #[serde(default)]
    pub export_csv: Option<String>,
}

impl ExecuteRoutineRequest {
    pub fn export_csv(&self) -> bool {
        checkbox(&self.export_csv)
    }
}

/// Every visible routine
#[derive(Debug, Serialize)]
pub struct RoutineListResponse {
    pub routines: Vec<Routine>,
}

/// Input form of a parameterized routine
#[derive(Debug, Serialize)]
pub struct RoutineFormResponse {
    #[serde(rename = "type")]
    pub kind: RoutineKind,
    pub name: String,
    pub parameters: String,
    pub form: FormSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query_is_rejected() {
        let request = ExecuteSqlRequest {
            sql_query: String::new(),
            save_results: None,
        };
        assert!(request.validate().is_err());
        assert!(!request.save_results());
    }

    #[test]
    fn test_ticked_checkbox() {
        let request = ExecuteRoutineRequest {
            export_csv: Some("on".to_string()),
        };
        assert!(request.export_csv());
    }
}
