//! Table data route handlers
//!
//! Every handler takes the table name from the path and dispatches through
//! the schema registry, so one set of handlers serves all tables.

use crate::crud::TableListing;
use crate::error::ApiResult;
use crate::forms::FormData;
use crate::import::ImportReport;
use crate::models::{
    ClearTableResponse, ImportAllResponse, MessageResponse, SuccessResponse, TableFormResponse,
    TableNamesResponse,
};
use crate::schema::{describe, table_names};
use crate::state::SharedState;
use crate::value::Record;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Form, Json,
};
use tracing::{debug, info};

/// Names of every administered table
pub async fn list_tables() -> Json<TableNamesResponse> {
    Json(TableNamesResponse {
        tables: table_names(),
    })
}

/// Every record of a table with its column labels
pub async fn read_table(
    State(state): State<SharedState>,
    Path(table): Path<String>,
) -> ApiResult<Json<SuccessResponse<TableListing>>> {
    let listing = state.records.list(&table).await?;
    Ok(Json(SuccessResponse::with_data(
        format!("Found {} records", listing.records.len()),
        listing,
    )))
}

pub async fn create_form(
    State(state): State<SharedState>,
    Path(table): Path<String>,
) -> ApiResult<Json<TableFormResponse>> {
    let form = state.records.form(&table)?;
    let table = describe(&table)?.name;
    Ok(Json(TableFormResponse {
        table,
        key: None,
        form,
    }))
}

pub async fn create_record(
    State(state): State<SharedState>,
    Path(table): Path<String>,
    Form(data): Form<FormData>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<Record>>)> {
    debug!("Creating {} record from {} fields", table, data.len());
    let record = state.records.create(&table, &data).await?;
    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data("Record created", record)),
    ))
}

/// Update form pre-populated from the stored record
pub async fn update_form(
    State(state): State<SharedState>,
    Path((table, pk)): Path<(String, String)>,
) -> ApiResult<Json<TableFormResponse>> {
    let form = state.records.edit_form(&table, &pk).await?;
    let table = describe(&table)?.name;
    Ok(Json(TableFormResponse {
        table,
        key: Some(pk),
        form,
    }))
}

pub async fn update_record(
    State(state): State<SharedState>,
    Path((table, pk)): Path<(String, String)>,
    Form(data): Form<FormData>,
) -> ApiResult<Json<SuccessResponse<Record>>> {
    let record = state.records.update(&table, &pk, &data).await?;
    Ok(Json(SuccessResponse::with_data("Record updated", record)))
}

pub async fn delete_record(
    State(state): State<SharedState>,
    Path((table, pk)): Path<(String, String)>,
) -> ApiResult<Json<MessageResponse>> {
    state.records.delete(&table, &pk).await?;
    Ok(Json(MessageResponse::new(format!("{} {} deleted", table, pk))))
}

/// Download a table as `<Table>.csv`
pub async fn export_table(
    State(state): State<SharedState>,
    Path(table): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let (name, bytes) = state.records.export(&table).await?;
    debug!("Exporting {} ({} bytes)", name, bytes.len());
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}.csv", name),
            ),
        ],
        bytes,
    ))
}

/// Ingest `<Table>.csv` from the data directory
pub async fn import_table(
    State(state): State<SharedState>,
    Path(table): Path<String>,
) -> ApiResult<Json<SuccessResponse<ImportReport>>> {
    let report = state.importer.import_table(&table).await?;
    Ok(Json(SuccessResponse::with_data(
        format!("Imported {} rows into {}", report.rows, report.table),
        report,
    )))
}

/// Remove every row of a table
pub async fn clear_table(
    State(state): State<SharedState>,
    Path(table): Path<String>,
) -> ApiResult<Json<SuccessResponse<ClearTableResponse>>> {
    let removed = state.records.clear(&table).await?;
    let table = describe(&table)?.name;
    Ok(Json(SuccessResponse::with_data(
        format!("{} cleared", table),
        ClearTableResponse { table, removed },
    )))
}

/// Ingest every fixture in dependency order, then run the bootstrap script
pub async fn import_all(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<ImportAllResponse>>> {
    let tables = state.importer.import_all().await?;
    info!("Imported {} tables and ran the bootstrap script", tables.len());
    Ok(Json(SuccessResponse::with_data(
        "Data imported",
        ImportAllResponse { tables },
    )))
}
