use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AppState;
use crate::api_envelope::{
    ApiErrorTuple, GOAL_NOT_FOUND_MESSAGE, internal_error, invalid_body_error,
    missing_fields_error, not_found_error,
};
use crate::goal_store::{GoalDraft, GoalStoreError, ProgressUpdate};

pub const ROUTE_GOALS: &str = "/api/goals";
pub const ROUTE_GOALS_BY_ID: &str = "/api/goals/:id";
pub const ROUTE_GOALS_PROGRESS: &str = "/api/goals/:id/progress";

const INVALID_BODY_MESSAGE: &str = "Request body must be a valid JSON object";

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GoalListQuery {
    #[serde(default, rename = "studentId")]
    student_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GoalRequestPayload {
    #[serde(default)]
    student_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    specific_details: Option<String>,
    #[serde(default)]
    measurable: Option<String>,
    #[serde(default)]
    achievable: Option<String>,
    #[serde(default)]
    relevant: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    target_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProgressRequestPayload {
    // `null` and absent both land on `None`; `0`, `false` and `""` stay values.
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeleteGoalResponse {
    success: bool,
}

pub(crate) async fn list_goals(
    State(state): State<AppState>,
    Query(query): Query<GoalListQuery>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let student_id = query
        .student_id
        .filter(|student_id| !student_id.is_empty());

    let goals = state
        .goals
        .list_goals(student_id.as_deref())
        .await
        .map_err(|error| map_goal_store_error("list", None, error))?;

    tracing::debug!(
        target: "escola.goals",
        student_id = student_id.as_deref().unwrap_or("*"),
        count = goals.len(),
        "listed goals",
    );

    Ok((StatusCode::OK, Json(goals)))
}

pub(crate) async fn create_goal(
    State(state): State<AppState>,
    payload: Result<Json<GoalRequestPayload>, JsonRejection>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let draft = goal_draft_from_payload(payload)?;

    let goal = state
        .goals
        .create_goal(draft)
        .await
        .map_err(|error| map_goal_store_error("create", None, error))?;

    tracing::info!(target: "escola.goals", goal_id = %goal.id, "goal created");

    Ok((StatusCode::CREATED, Json(goal)))
}

pub(crate) async fn show_goal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let goal = state
        .goals
        .get_goal(&id)
        .await
        .map_err(|error| map_goal_store_error("show", Some(&id), error))?;

    Ok((StatusCode::OK, Json(goal)))
}

pub(crate) async fn update_goal(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<GoalRequestPayload>, JsonRejection>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let draft = goal_draft_from_payload(payload)?;

    let goal = state
        .goals
        .replace_goal(&id, draft)
        .await
        .map_err(|error| map_goal_store_error("update", Some(&id), error))?;

    tracing::info!(target: "escola.goals", goal_id = %goal.id, "goal replaced");

    Ok((StatusCode::OK, Json(goal)))
}

pub(crate) async fn delete_goal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    state
        .goals
        .delete_goal(&id)
        .await
        .map_err(|error| map_goal_store_error("delete", Some(&id), error))?;

    tracing::info!(target: "escola.goals", goal_id = %id, "goal deleted");

    Ok((StatusCode::OK, Json(DeleteGoalResponse { success: true })))
}

pub(crate) async fn update_goal_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ProgressRequestPayload>, JsonRejection>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let Json(payload) = payload.map_err(|rejection| reject_body(&rejection))?;
    let Some(value) = payload.value else {
        return Err(missing_fields_error(&["value"]));
    };

    let goal = state
        .goals
        .record_progress(
            &id,
            ProgressUpdate {
                value,
                notes: payload.notes,
            },
        )
        .await
        .map_err(|error| map_goal_store_error("progress", Some(&id), error))?;

    tracing::info!(target: "escola.goals", goal_id = %goal.id, "goal progress recorded");

    Ok((StatusCode::OK, Json(goal)))
}

fn goal_draft_from_payload(
    payload: Result<Json<GoalRequestPayload>, JsonRejection>,
) -> Result<GoalDraft, ApiErrorTuple> {
    let Json(payload) = payload.map_err(|rejection| reject_body(&rejection))?;

    let mut missing = Vec::new();
    let title = required_field(payload.title, "title", &mut missing);
    let specific_details =
        required_field(payload.specific_details, "specificDetails", &mut missing);
    let start_date = required_field(payload.start_date, "startDate", &mut missing);
    let target_date = required_field(payload.target_date, "targetDate", &mut missing);

    match (title, specific_details, start_date, target_date) {
        (Some(title), Some(specific_details), Some(start_date), Some(target_date)) => {
            Ok(GoalDraft {
                student_id: payload.student_id,
                title,
                specific_details,
                measurable: payload.measurable,
                achievable: payload.achievable,
                relevant: payload.relevant,
                start_date,
                target_date,
            })
        }
        _ => Err(missing_fields_error(&missing)),
    }
}

fn required_field(
    value: Option<String>,
    field: &'static str,
    missing: &mut Vec<&'static str>,
) -> Option<String> {
    match value {
        Some(value) if !value.is_empty() => Some(value),
        _ => {
            missing.push(field);
            None
        }
    }
}

fn reject_body(rejection: &JsonRejection) -> ApiErrorTuple {
    tracing::debug!(
        target: "escola.goals",
        reason = %rejection.body_text(),
        "rejected goal request body",
    );
    invalid_body_error(INVALID_BODY_MESSAGE)
}

fn map_goal_store_error(
    operation: &'static str,
    goal_id: Option<&str>,
    error: GoalStoreError,
) -> ApiErrorTuple {
    match error {
        GoalStoreError::NotFound => not_found_error(GOAL_NOT_FOUND_MESSAGE),
        GoalStoreError::Persistence { message } => {
            tracing::error!(
                target: "escola.goals",
                operation,
                goal_id = goal_id.unwrap_or("-"),
                error = %message,
                "goal store operation failed",
            );
            internal_error()
        }
    }
}
