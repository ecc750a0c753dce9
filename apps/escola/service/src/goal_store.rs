use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum GoalStoreError {
    #[error("goal not found")]
    NotFound,
    #[error("{message}")]
    Persistence { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalRecord {
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
    pub value: Value,
    #[serde(default)]
    pub notes: Vec<ProgressNote>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNote {
    pub note: String,
    pub recorded_at: DateTime<Utc>,
}

/// Client-owned goal fields, already checked for the required ones.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalDraft {
    pub student_id: Option<String>,
    pub title: String,
    pub specific_details: String,
    pub measurable: Option<String>,
    pub achievable: Option<String>,
    pub relevant: Option<String>,
    pub start_date: String,
    pub target_date: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub value: Value,
    pub notes: Option<String>,
}

#[async_trait]
pub trait GoalRepository: Send + Sync {
    async fn list_goals(&self, student_id: Option<&str>)
    -> Result<Vec<GoalRecord>, GoalStoreError>;
    async fn create_goal(&self, draft: GoalDraft) -> Result<GoalRecord, GoalStoreError>;
    async fn get_goal(&self, id: &str) -> Result<GoalRecord, GoalStoreError>;
    async fn replace_goal(&self, id: &str, draft: GoalDraft)
    -> Result<GoalRecord, GoalStoreError>;
    async fn delete_goal(&self, id: &str) -> Result<(), GoalStoreError>;
    async fn record_progress(
        &self,
        id: &str,
        update: ProgressUpdate,
    ) -> Result<GoalRecord, GoalStoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GoalStoreState {
    #[serde(default)]
    goals: HashMap<String, GoalRecord>,
}

/// In-memory goal store with optional JSON snapshot persistence.
#[derive(Clone)]
pub struct GoalStore {
    state: Arc<RwLock<GoalStoreState>>,
    path: Option<PathBuf>,
}

impl GoalStore {
    pub fn from_config(config: &Config) -> Self {
        let path = config.goal_store_path.clone();
        let state = Self::load_state(path.as_ref());

        Self {
            state: Arc::new(RwLock::new(state)),
            path,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(RwLock::new(GoalStoreState::default())),
            path: None,
        }
    }

    fn load_state(path: Option<&PathBuf>) -> GoalStoreState {
        let Some(path) = path else {
            return GoalStoreState::default();
        };

        let raw = match std::fs::read_to_string(path) {
            Ok(value) => value,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return GoalStoreState::default();
            }
            Err(error) => {
                tracing::warn!(
                    target: "escola.goal_store",
                    path = %path.display(),
                    error = %error,
                    "failed to read goal store; booting with empty state",
                );
                return GoalStoreState::default();
            }
        };

        match serde_json::from_str::<GoalStoreState>(&raw) {
            Ok(state) => state,
            Err(error) => {
                tracing::warn!(
                    target: "escola.goal_store",
                    path = %path.display(),
                    error = %error,
                    "failed to parse goal store; booting with empty state",
                );
                GoalStoreState::default()
            }
        }
    }

    async fn persist_state(&self, snapshot: &GoalStoreState) -> Result<(), GoalStoreError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| GoalStoreError::Persistence {
                    message: format!("failed to prepare goal store directory: {error}"),
                })?;
        }

        let payload = serde_json::to_vec(snapshot).map_err(|error| GoalStoreError::Persistence {
            message: format!("failed to encode goal store payload: {error}"),
        })?;

        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&temp_path, payload)
            .await
            .map_err(|error| GoalStoreError::Persistence {
                message: format!("failed to write goal store payload: {error}"),
            })?;

        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|error| GoalStoreError::Persistence {
                message: format!("failed to finalize goal store payload: {error}"),
            })?;

        Ok(())
    }

    /// Applies `operation` to a copy of the state and publishes it only once the
    /// snapshot is on disk. The write lock is held across persistence so
    /// snapshots land in commit order.
    async fn mutate<T, F>(&self, operation: F) -> Result<T, GoalStoreError>
    where
        F: FnOnce(&mut GoalStoreState) -> Result<T, GoalStoreError>,
    {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let result = operation(&mut next)?;

        self.persist_state(&next).await?;
        *state = next;
        Ok(result)
    }
}

#[async_trait]
impl GoalRepository for GoalStore {
    async fn list_goals(
        &self,
        student_id: Option<&str>,
    ) -> Result<Vec<GoalRecord>, GoalStoreError> {
        let state = self.state.read().await;
        let mut goals = state
            .goals
            .values()
            .filter(|goal| match student_id {
                Some(student_id) => goal.student_id.as_deref() == Some(student_id),
                None => true,
            })
            .cloned()
            .collect::<Vec<_>>();
        goals.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(goals)
    }

    async fn create_goal(&self, draft: GoalDraft) -> Result<GoalRecord, GoalStoreError> {
        self.mutate(|state| {
            let now = Utc::now();
            let id = format!("goal_{}", Uuid::new_v4().simple());
            let goal = GoalRecord {
                id: id.clone(),
                student_id: draft.student_id,
                title: draft.title,
                specific_details: draft.specific_details,
                measurable: draft.measurable,
                achievable: draft.achievable,
                relevant: draft.relevant,
                start_date: draft.start_date,
                target_date: draft.target_date,
                progress: None,
                created_at: now,
                updated_at: now,
            };
            state.goals.insert(id, goal.clone());
            Ok(goal)
        })
        .await
    }

    async fn get_goal(&self, id: &str) -> Result<GoalRecord, GoalStoreError> {
        let state = self.state.read().await;
        state.goals.get(id).cloned().ok_or(GoalStoreError::NotFound)
    }

    async fn replace_goal(
        &self,
        id: &str,
        draft: GoalDraft,
    ) -> Result<GoalRecord, GoalStoreError> {
        self.mutate(|state| {
            let goal = state.goals.get_mut(id).ok_or(GoalStoreError::NotFound)?;
            goal.student_id = draft.student_id;
            goal.title = draft.title;
            goal.specific_details = draft.specific_details;
            goal.measurable = draft.measurable;
            goal.achievable = draft.achievable;
            goal.relevant = draft.relevant;
            goal.start_date = draft.start_date;
            goal.target_date = draft.target_date;
            goal.updated_at = Utc::now();
            Ok(goal.clone())
        })
        .await
    }

    async fn delete_goal(&self, id: &str) -> Result<(), GoalStoreError> {
        self.mutate(|state| {
            state
                .goals
                .remove(id)
                .map(|_| ())
                .ok_or(GoalStoreError::NotFound)
        })
        .await
    }

    async fn record_progress(
        &self,
        id: &str,
        update: ProgressUpdate,
    ) -> Result<GoalRecord, GoalStoreError> {
        self.mutate(|state| {
            let goal = state.goals.get_mut(id).ok_or(GoalStoreError::NotFound)?;
            let now = Utc::now();
            let mut notes = goal
                .progress
                .take()
                .map(|progress| progress.notes)
                .unwrap_or_default();
            if let Some(note) = update.notes.filter(|note| !note.trim().is_empty()) {
                notes.push(ProgressNote {
                    note,
                    recorded_at: now,
                });
            }
            goal.progress = Some(GoalProgress {
                value: update.value,
                notes,
                updated_at: now,
            });
            goal.updated_at = now;
            Ok(goal.clone())
        })
        .await
    }
}
