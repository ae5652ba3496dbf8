//! Call conventions for stored routines
//!
//! Functions are a single `SELECT * FROM name(..)`. Procedures write their
//! result into a named cursor, so the call and the fetch share one
//! transaction that is committed only after the fetch.

use super::RoutineKind;
use crate::db::queries::PROCEDURE_CURSOR;
use crate::db::store::{Store, StoreTransaction};
use crate::error::AppError;
use crate::value::{CellValue, ResultSet};
use tracing::{debug, warn};

/// Fold any store failure into one reportable execution failure
pub fn execution_failed(error: AppError) -> AppError {
    match error {
        AppError::Database(e) => AppError::RoutineExecutionFailed(
            e.as_db_error()
                .map(|db| db.message().to_string())
                .unwrap_or_else(|| e.to_string()),
        ),
        AppError::Internal(msg) | AppError::Conflict(msg) => AppError::RoutineExecutionFailed(msg),
        e @ AppError::RoutineExecutionFailed(_) => e,
        other => AppError::RoutineExecutionFailed(other.to_string()),
    }
}

/// Invoke a routine with already bound arguments
pub async fn call(store: &dyn Store, kind: RoutineKind, name: &str, args: Vec<CellValue>) -> Result<ResultSet, AppError> {
    debug!("Calling {} {} with {} arguments", kind, name, args.len());
    let result = match kind {
        RoutineKind::Function => store.call_function(name, &args).await,
        RoutineKind::Procedure => call_procedure(store, name, args).await,
    };
    result.map_err(execution_failed)
}

async fn call_procedure(store: &dyn Store, name: &str, mut args: Vec<CellValue>) -> Result<ResultSet, AppError> {
    args.push(CellValue::text(PROCEDURE_CURSOR));

    let mut tx = store.begin().await?;
    match call_and_fetch(tx.as_mut(), name, &args).await {
        Ok(result) => {
            tx.commit().await?;
            Ok(result)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!("Rollback after failed call of {} failed: {}", name, rollback);
            }
            Err(e)
        }
    }
}

async fn call_and_fetch(
    tx: &mut dyn StoreTransaction,
    name: &str,
    args: &[CellValue],
) -> Result<ResultSet, AppError> {
    tx.call_procedure(name, args).await?;
    tx.fetch_cursor(PROCEDURE_CURSOR).await
}
