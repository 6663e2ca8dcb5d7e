use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Canceled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Submission request: which component to analyse and on whose behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSubmit {
    pub task_type: TaskType,
    pub component_key: String,
    pub component_uuid: Option<String>,
    pub branch: Option<String>,
    pub submitter: Option<String>,
}

impl TaskSubmit {
    pub fn report(component_key: impl Into<String>) -> Self {
        Self {
            task_type: TaskType::Report,
            component_key: component_key.into(),
            component_uuid: None,
            branch: None,
            submitter: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn with_submitter(mut self, submitter: impl Into<String>) -> Self {
        self.submitter = Some(submitter.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub uuid: String,
    pub task_type: TaskType,
    pub component_key: String,
    #[serde(default)]
    pub component_uuid: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub submitter: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub worker_uuid: Option<String>,
    pub execution_count: u32,
    pub submitted_at: i64,
    #[serde(default)]
    pub started_at: Option<i64>,
}

impl Task {
    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }
}

/// Terminal record of a task removed from the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub task: Task,
    pub status: TaskStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub analysis_uuid: Option<String>,
    pub executed_at: i64,
    #[serde(default)]
    pub execution_time_ms: Option<i64>,
}
