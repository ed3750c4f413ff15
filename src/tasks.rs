//! Ownership scoping and the completion rule for task updates.

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::{self, DbPool};
use crate::error::AppError;
use crate::models::{Task, TaskPatch, User};
use crate::validate::normalize_text;

/// The column values a `PATCH` writes.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskChanges {
    /// `None` keeps the stored text.
    pub text: Option<String>,
    pub completed: bool,
    pub completed_at: Option<OffsetDateTime>,
}

impl TaskPatch {
    /// Only a literal `true` marks a task done. Anything else, including
    /// leaving `completed` out, clears the completion state.
    pub fn resolve(self, clock: &dyn Clock) -> Result<TaskChanges, AppError> {
        let text = self.text.as_deref().map(normalize_text).transpose()?;

        let (completed, completed_at) = match self.completed {
            Some(Value::Bool(true)) => (true, Some(clock.now())),
            _ => (false, None),
        };

        Ok(TaskChanges {
            text,
            completed,
            completed_at,
        })
    }
}

/// Task access on behalf of one user. Nothing outside the owner's tasks is
/// reachable through it.
#[derive(Debug, Clone, Copy)]
pub struct OwnerScope {
    owner_id: Uuid,
}

impl OwnerScope {
    pub fn of(user: &User) -> Self {
        Self { owner_id: user.id }
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn list(&self, db: &DbPool) -> Result<Vec<Task>, AppError> {
        db::list_tasks(db, self.owner_id)
    }

    pub fn create(&self, db: &DbPool, text: &str) -> Result<Task, AppError> {
        let text = normalize_text(text)?;
        db::create_task(db, self.owner_id, &text)
    }

    pub fn fetch(&self, db: &DbPool, id: Uuid) -> Result<Task, AppError> {
        db::get_task(db, self.owner_id, id)?.ok_or(AppError::NotFound)
    }

    pub fn update(&self, db: &DbPool, id: Uuid, changes: &TaskChanges) -> Result<Task, AppError> {
        db::update_task(db, self.owner_id, id, changes)?.ok_or(AppError::NotFound)
    }

    pub fn delete(&self, db: &DbPool, id: Uuid) -> Result<Task, AppError> {
        db::delete_task(db, self.owner_id, id)?.ok_or(AppError::NotFound)
    }
}

/// A malformed id can never match a task, so it is reported as missing.
pub fn parse_task_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound)
}
