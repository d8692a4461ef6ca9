//! Task definitions and dispatch results

use crate::types::NodeName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generate a fresh task id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a task id from its string form
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of dispatchable generation work.
///
/// Tasks are created by callers and must be idempotent from the caller's
/// perspective: the router and the offline queue may race on the same
/// target, and a timed-out dispatch is treated as a failure even if the
/// node eventually completed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Originating caller (node name or client identity)
    pub origin: String,

    /// Model the task targets
    pub model: String,

    /// Prompt or task content
    pub payload: String,

    /// Estimated output size in abstract units, drives the cost model
    pub resource_hint: u32,

    /// Numeric priority, higher is more urgent
    pub priority: i32,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Maximum replay attempts once the task lands in the offline queue
    pub max_retries: u32,
}

impl Task {
    /// Create a task with a generated id and the current timestamp
    pub fn new(
        origin: impl Into<String>,
        model: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: TaskId::generate(),
            origin: origin.into(),
            model: model.into(),
            payload: payload.into(),
            resource_hint: 100,
            priority: 0,
            created_at: Utc::now(),
            max_retries: 5,
        }
    }

    /// Set the estimated output size
    pub fn with_resource_hint(mut self, units: u32) -> Self {
        self.resource_hint = units;
        self
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Result metadata for a successful dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchReceipt {
    /// The node that executed the task
    pub executed_on: NodeName,

    /// Cost-model estimate for the execution, in seconds
    pub estimated_seconds: f64,

    /// Measured wall-clock time for the execution, in seconds
    pub actual_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_builder() {
        let task = Task::new("client-7", "sonnet-large", "write a haiku")
            .with_resource_hint(400)
            .with_priority(3)
            .with_max_retries(2);

        assert_eq!(task.resource_hint, 400);
        assert_eq!(task.priority, 3);
        assert_eq!(task.max_retries, 2);
        assert_eq!(task.model, "sonnet-large");
    }

    #[test]
    fn test_task_ids_unique() {
        let a = Task::new("o", "m", "p");
        let b = Task::new("o", "m", "p");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_task_id_parse() {
        let id = TaskId::generate();
        assert_eq!(TaskId::parse(&id.to_string()), Some(id));
        assert_eq!(TaskId::parse("not-a-uuid"), None);
    }
}
