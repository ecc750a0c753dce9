use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ServiceError, ServiceResultExt};
use crate::http::ApiClient;
use crate::query::QueryClient;
use crate::session::{SessionManager, observed};

pub const ROUTE_GOALS: &str = "/goals";
pub const GOALS_QUERY_KEY: &str = "goals";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartGoal {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    pub title: String,
    pub specific_details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevant: Option<String>,
    pub start_date: String,
    pub target_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<GoalProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
    pub value: Value,
    #[serde(default)]
    pub notes: Vec<ProgressNote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNote {
    pub note: String,
    pub recorded_at: DateTime<Utc>,
}

/// Fields a caller may set on create or full replace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    pub title: String,
    pub specific_details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achievable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevant: Option<String>,
    pub start_date: String,
    pub target_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ProgressUpdate {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            notes: None,
        }
    }

    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteGoalResponse {
    pub success: bool,
}

pub fn goals_query_key(student_id: Option<&str>) -> String {
    match student_id {
        Some(student_id) if !student_id.is_empty() => {
            format!("{GOALS_QUERY_KEY}?studentId={student_id}")
        }
        _ => GOALS_QUERY_KEY.to_string(),
    }
}

pub fn goal_query_key(id: &str) -> String {
    format!("{GOALS_QUERY_KEY}/{id}")
}

/// Goal ids are encoded as a single path segment.
fn goal_path(id: &str) -> String {
    format!("{ROUTE_GOALS}/{}", urlencoding::encode(id))
}

fn goal_progress_path(id: &str) -> String {
    format!("{}/progress", goal_path(id))
}

/// SMART-goal CRUD against `/goals`.
#[derive(Debug, Clone)]
pub struct SmartGoalsService {
    http: ApiClient,
    session: Option<SessionManager>,
}

impl SmartGoalsService {
    pub fn new(http: ApiClient) -> Self {
        Self {
            http,
            session: None,
        }
    }

    /// Routes every failed call through `session` before returning it.
    #[must_use]
    pub fn with_session(mut self, session: SessionManager) -> Self {
        self.session = Some(session);
        self
    }

    /// Lists goals, narrowed to one student when `student_id` is set.
    pub async fn list_goals(
        &self,
        student_id: Option<&str>,
    ) -> Result<Vec<SmartGoal>, ServiceError> {
        let query = match student_id {
            Some(student_id) if !student_id.is_empty() => vec![("studentId", student_id)],
            _ => Vec::new(),
        };
        let result = self
            .http
            .get_json_with_query(ROUTE_GOALS, &query)
            .await
            .or_service_error("Failed to fetch goals");
        observed(self.session.as_ref(), result)
    }

    pub async fn get_goal(&self, id: &str) -> Result<SmartGoal, ServiceError> {
        let result = self
            .http
            .get_json(&goal_path(id))
            .await
            .or_service_error("Failed to fetch goal");
        observed(self.session.as_ref(), result)
    }

    pub async fn create_goal(&self, draft: &GoalDraft) -> Result<SmartGoal, ServiceError> {
        let result = self
            .http
            .post_json(ROUTE_GOALS, draft)
            .await
            .or_service_error("Failed to create goal");
        observed(self.session.as_ref(), result)
    }

    pub async fn update_goal(&self, id: &str, draft: &GoalDraft) -> Result<SmartGoal, ServiceError> {
        let result = self
            .http
            .put_json(&goal_path(id), draft)
            .await
            .or_service_error("Failed to update goal");
        observed(self.session.as_ref(), result)
    }

    pub async fn delete_goal(&self, id: &str) -> Result<DeleteGoalResponse, ServiceError> {
        let result = self
            .http
            .delete_json(&goal_path(id))
            .await
            .or_service_error("Failed to delete goal");
        observed(self.session.as_ref(), result)
    }

    pub async fn update_progress(
        &self,
        id: &str,
        update: &ProgressUpdate,
    ) -> Result<SmartGoal, ServiceError> {
        let result = self
            .http
            .post_json(&goal_progress_path(id), update)
            .await
            .or_service_error("Failed to update goal progress");
        observed(self.session.as_ref(), result)
    }
}

/// [`SmartGoalsService`] behind a [`QueryClient`]: cached reads, retried writes
/// that invalidate every goal key.
#[derive(Debug, Clone)]
pub struct GoalQueries {
    service: SmartGoalsService,
    queries: QueryClient,
}

impl GoalQueries {
    pub fn new(service: SmartGoalsService, queries: QueryClient) -> Self {
        Self { service, queries }
    }

    pub async fn list_goals(
        &self,
        student_id: Option<&str>,
    ) -> Result<Vec<SmartGoal>, ServiceError> {
        let key = goals_query_key(student_id);
        self.queries
            .fetch_query(&key, || self.service.list_goals(student_id))
            .await
    }

    pub async fn get_goal(&self, id: &str) -> Result<SmartGoal, ServiceError> {
        self.queries
            .fetch_query(&goal_query_key(id), || self.service.get_goal(id))
            .await
    }

    pub async fn create_goal(&self, draft: &GoalDraft) -> Result<SmartGoal, ServiceError> {
        self.queries
            .mutate(&[GOALS_QUERY_KEY], || self.service.create_goal(draft))
            .await
    }

    pub async fn update_goal(&self, id: &str, draft: &GoalDraft) -> Result<SmartGoal, ServiceError> {
        let goal = self
            .queries
            .mutate(&[GOALS_QUERY_KEY], || self.service.update_goal(id, draft))
            .await?;
        self.queries.set_query_data(&goal_query_key(id), &goal).await;
        Ok(goal)
    }

    pub async fn delete_goal(&self, id: &str) -> Result<DeleteGoalResponse, ServiceError> {
        let response = self
            .queries
            .mutate(&[GOALS_QUERY_KEY], || self.service.delete_goal(id))
            .await?;
        self.queries.remove(&goal_query_key(id)).await;
        Ok(response)
    }

    pub async fn update_progress(
        &self,
        id: &str,
        update: &ProgressUpdate,
    ) -> Result<SmartGoal, ServiceError> {
        let goal = self
            .queries
            .mutate(&[GOALS_QUERY_KEY], || self.service.update_progress(id, update))
            .await?;
        self.queries.set_query_data(&goal_query_key(id), &goal).await;
        Ok(goal)
    }
}
