//! Routine Invocation Pipeline
//!
//! Lists the stored functions and procedures, synthesizes their input
//! forms and runs them:
//! `Requested -> ParameterBound -> Executed -> (ResultAvailable | Failed)`.

pub mod catalog;
pub mod pipeline;
pub mod session;

use crate::config::SessionConfig;
use crate::db::store::Store;
use crate::error::AppError;
use crate::export;
use crate::forms::dynamic::{build, takes_no_arguments};
use crate::forms::{FormData, FormSpec};
use crate::value::ResultSet;
use catalog::Descriptions;
use serde::{Deserialize, Serialize};
use session::SessionStore;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// File the ad-hoc query result is saved to, without extension
pub const CUSTOM_SQL_EXPORT: &str = "custom_sql";

/// Call convention of a routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoutineKind {
    Function,
    Procedure,
}

impl fmt::Display for RoutineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutineKind::Function => write!(f, "FUNCTION"),
            RoutineKind::Procedure => write!(f, "PROCEDURE"),
        }
    }
}

impl FromStr for RoutineKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FUNCTION" => Ok(RoutineKind::Function),
            "PROCEDURE" => Ok(RoutineKind::Procedure),
            other => Err(AppError::Validation(format!(
                "Routine type must be FUNCTION or PROCEDURE, got '{}'",
                other
            ))),
        }
    }
}

/// One entry of the routine listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Routine {
    #[serde(rename = "type")]
    pub kind: RoutineKind,
    pub name: String,
    pub parameters: String,
    pub return_type: Option<String>,
    pub description: Option<String>,
}

/// Result of running a routine, with the file it was exported to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Execution {
    pub name: String,
    #[serde(flatten)]
    pub result: ResultSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_to: Option<PathBuf>,
}

pub struct RoutineService {
    store: Arc<dyn Store>,
    sessions: SessionStore,
    catalog_file: PathBuf,
    export_dir: PathBuf,
}

impl RoutineService {
    pub fn new(store: Arc<dyn Store>, catalog_file: impl Into<PathBuf>, export_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            sessions: SessionStore::new(SessionConfig::default().ttl),
            catalog_file: catalog_file.into(),
            export_dir: export_dir.into(),
        }
    }

    /// Drop session snapshots untouched for longer than `ttl`
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.sessions = SessionStore::new(ttl);
        self
    }

    pub fn session_ttl(&self) -> Duration {
        self.sessions.ttl()
    }

    /// Every visible routine with its description from the sidecar file
    pub async fn list(&self) -> Result<Vec<Routine>, AppError> {
        let descriptions = Descriptions::load(&self.catalog_file).await?;
        let entries = self.store.list_routines().await?;

        Ok(entries
            .into_iter()
            .map(|entry| Routine {
                description: descriptions.get(&entry.name).map(str::to_string),
                kind: entry.kind,
                name: entry.name,
                parameters: entry.parameters,
                return_type: entry.return_type,
            })
            .collect())
    }

    /// Run a raw query, optionally saving the result as `custom_sql.csv`
    pub async fn execute_sql(&self, query: &str, save_results: bool) -> Result<Execution, AppError> {
        let result = self.store.query(query).await.map_err(|e| {
            warn!("Error in execution custom sql query: {}", e);
            pipeline::execution_failed(e)
        })?;

        let exported_to = if save_results {
            Some(export::save_result(&self.export_dir, CUSTOM_SQL_EXPORT, &result).await?)
        } else {
            None
        };
        Ok(Execution {
            name: CUSTOM_SQL_EXPORT.to_string(),
            result,
            exported_to,
        })
    }

    /// Run a routine that takes no arguments
    pub async fn execute_direct(&self, kind: RoutineKind, name: &str, export_csv: bool) -> Result<Execution, AppError> {
        let result = pipeline::call(self.store.as_ref(), kind, name, Vec::new()).await?;
        self.finish(name, result, export_csv).await
    }

    /// Input form of a routine signature
    pub fn form_for(&self, params: &str) -> Result<FormSpec, AppError> {
        build(params)
    }

    /// Run a routine with a submitted form.
    ///
    /// Signatures without real parameters run directly. A valid submission
    /// runs the routine, replaces the session snapshot and returns it, so
    /// the shown result and a later export agree. An invalid one that asks
    /// for a CSV export exports the current snapshot instead.
    pub async fn execute(
        &self,
        session: Uuid,
        kind: RoutineKind,
        name: &str,
        params: &str,
        data: &FormData,
        export_csv: bool,
    ) -> Result<Execution, AppError> {
        if takes_no_arguments(params) {
            return self.execute_direct(kind, name, export_csv).await;
        }

        let bound = match build(params)?.validate(data) {
            Ok(args) => {
                let result = pipeline::call(self.store.as_ref(), kind, name, args).await?;
                let snapshot = self.sessions.save(session, result).await;
                info!("Executed {} {} for session {}", kind, name, session);
                return self.finish(name, snapshot, export_csv).await;
            }
            Err(AppError::FormValidationFailed(bound)) => bound,
            Err(e) => return Err(e),
        };

        if export_csv {
            if let Some(snapshot) = self.sessions.get(session).await {
                return self.finish(name, snapshot, true).await;
            }
        }
        warn!("Error in executing {} {}: incorrect form", kind, name);
        Err(AppError::FormValidationFailed(bound))
    }

    async fn finish(&self, name: &str, result: ResultSet, export_csv: bool) -> Result<Execution, AppError> {
        let exported_to = if export_csv {
            Some(export::save_result(&self.export_dir, name, &result).await?)
        } else {
            None
        };
        Ok(Execution {
            name: name.to_string(),
            result,
            exported_to,
        })
    }
}
