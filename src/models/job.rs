use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// State of an upscale job in the async pipeline.
///
/// Legal edges: `pending -> running`, `running -> succeeded`,
/// `running -> failed`, plus `pending -> failed` for jobs whose descriptor
/// never reached the queue. `succeeded` and `failed` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// Whether a transition from `self` to `next` is permitted.
    pub fn can_transition(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Running)
                | (JobState::Pending, JobState::Failed)
                | (JobState::Running, JobState::Succeeded)
                | (JobState::Running, JobState::Failed)
        )
    }

    /// States from which `next` may legally be entered. Used by the job
    /// store to guard transitions inside a single UPDATE.
    pub fn legal_prior(next: JobState) -> &'static [JobState] {
        match next {
            JobState::Pending => &[],
            JobState::Running => &[JobState::Pending],
            JobState::Succeeded => &[JobState::Running],
            JobState::Failed => &[JobState::Pending, JobState::Running],
        }
    }
}

/// An image upscale job tracked from submission to a terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpscaleJob {
    pub id: Uuid,
    pub state: JobState,
    pub original_filename: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Coarse progress indicator (0-100); written only by the worker.
    pub progress: Option<i16>,
    /// Present iff `state == Failed`.
    pub error: Option<String>,
    /// Opaque handle into the result store; present iff `state == Succeeded`.
    pub result_ref: Option<String>,
}
