//! Stored routine and ad-hoc query route handlers

use crate::error::{validation_error, ApiResult};
use crate::forms::dynamic::takes_no_arguments;
use crate::forms::FormData;
use crate::models::{
    checkbox, ExecuteRoutineRequest, ExecuteSqlRequest, RoutineFormResponse, RoutineListResponse,
    SuccessResponse,
};
use crate::routines::{Execution, RoutineKind};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Form, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

const SESSION_COOKIE: &str = "sid";
const EXPORT_FIELD: &str = "export_csv";

/// Session id from the cookie jar, issuing a new one when missing or garbled.
/// The cookie lives as long as the session's snapshot.
fn session(jar: CookieJar, ttl: Duration) -> (CookieJar, Uuid) {
    if let Some(id) = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
    {
        return (jar, id);
    }

    let id = Uuid::new_v4();
    debug!("Issuing session {}", id);
    let cookie = Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::try_from(ttl).unwrap_or(time::Duration::MAX));
    (jar.add(cookie), id)
}

fn executed(execution: Execution) -> Json<SuccessResponse<Execution>> {
    let message = match &execution.exported_to {
        Some(path) => format!("{} exported to {}", execution.name, path.display()),
        None => format!("{} returned {} rows", execution.name, execution.result.rows.len()),
    };
    Json(SuccessResponse::with_data(message, execution))
}

/// Every stored function and procedure with its description
pub async fn list_routines(State(state): State<SharedState>) -> ApiResult<Json<RoutineListResponse>> {
    let routines = state.routines.list().await?;
    Ok(Json(RoutineListResponse { routines }))
}

/// Run an ad-hoc query
pub async fn execute_sql(
    State(state): State<SharedState>,
    Form(payload): Form<ExecuteSqlRequest>,
) -> ApiResult<Json<SuccessResponse<Execution>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let execution = state
        .routines
        .execute_sql(&payload.sql_query, payload.save_results())
        .await?;
    Ok(executed(execution))
}

/// Run a routine that takes no arguments
pub async fn execute_without_form(
    State(state): State<SharedState>,
    Path((kind, name)): Path<(String, String)>,
    Form(payload): Form<ExecuteRoutineRequest>,
) -> ApiResult<Json<SuccessResponse<Execution>>> {
    let kind: RoutineKind = kind.parse()?;
    let execution = state
        .routines
        .execute_direct(kind, &name, payload.export_csv())
        .await?;
    Ok(executed(execution))
}

/// Input form synthesized from a routine signature. A signature with
/// nothing to fill in runs straight away.
pub async fn routine_form(
    State(state): State<SharedState>,
    Path((kind, name, parameters)): Path<(String, String, String)>,
) -> ApiResult<Response> {
    let kind: RoutineKind = kind.parse()?;
    if takes_no_arguments(&parameters) {
        debug!("{} {} takes no arguments, running it", kind, name);
        let execution = state.routines.execute_direct(kind, &name, false).await?;
        return Ok(executed(execution).into_response());
    }

    let form = state.routines.form_for(&parameters)?;
    Ok(Json(RoutineFormResponse {
        kind,
        name,
        parameters,
        form,
    })
    .into_response())
}

/// Run a routine with a submitted form, keeping the result as the
/// session's snapshot
pub async fn execute_with_form(
    State(state): State<SharedState>,
    jar: CookieJar,
    Path((kind, name, parameters)): Path<(String, String, String)>,
    Form(mut data): Form<FormData>,
) -> ApiResult<(CookieJar, Json<SuccessResponse<Execution>>)> {
    let kind: RoutineKind = kind.parse()?;
    let (jar, session) = session(jar, state.routines.session_ttl());
    let export_csv = checkbox(&data.remove(EXPORT_FIELD));

    let execution = state
        .routines
        .execute(session, kind, &name, &parameters, &data, export_csv)
        .await?;
    Ok((jar, executed(execution)))
}
