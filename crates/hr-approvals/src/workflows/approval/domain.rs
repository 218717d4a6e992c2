use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a workflow template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkflowTemplateId(pub u64);

/// Identifier of a single step within a template. Retired steps keep their id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkflowStepId(pub u64);

/// Identifier of one approval tracking row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackingId(pub u64);

/// Opaque correlation key of the business request being approved.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// Identity of an employee acting in the workflow.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

/// Organizational position reference, never a specific person.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DepartmentId(pub String);

/// Job level used when matching templates (e.g. junior, senior, executive bands).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LevelId(pub String);

impl fmt::Display for WorkflowTemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for WorkflowStepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DepartmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of business request a template gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Offer,
    RecruitmentRequest,
}

impl RequestType {
    pub const fn label(self) -> &'static str {
        match self {
            RequestType::Offer => "OFFER",
            RequestType::RecruitmentRequest => "RECRUITMENT_REQUEST",
        }
    }
}

/// Matching criteria attached to a template. An absent field matches any value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<DepartmentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_id: Option<LevelId>,
}

impl ApplyConditions {
    pub fn matches(&self, department_id: &DepartmentId, level_id: &LevelId) -> bool {
        let department_ok = self
            .department_id
            .as_ref()
            .map_or(true, |expected| expected == department_id);
        let level_ok = self
            .level_id
            .as_ref()
            .map_or(true, |expected| expected == level_id);
        department_ok && level_ok
    }

    /// Number of constrained fields; higher wins when several templates match.
    pub fn specificity(&self) -> u8 {
        u8::from(self.department_id.is_some()) + u8::from(self.level_id.is_some())
    }
}

/// One position-bound approval gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: WorkflowStepId,
    pub template_id: WorkflowTemplateId,
    pub step_order: u32,
    pub step_name: String,
    pub required_approver_position: PositionId,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: WorkflowTemplateId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub request_type: RequestType,
    pub apply_conditions: ApplyConditions,
    pub is_active: bool,
    /// Active steps sorted by `step_order`.
    pub steps: Vec<WorkflowStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowTemplate {
    pub fn step_at(&self, step_order: u32) -> Option<&WorkflowStep> {
        self.steps.iter().find(|step| step.step_order == step_order)
    }
}

/// Step definition supplied by an administrator when creating or replacing steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub step_order: u32,
    pub step_name: String,
    pub required_approver_position: PositionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorkflowTemplate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub request_type: RequestType,
    #[serde(default)]
    pub apply_conditions: ApplyConditions,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

/// Partial template update. `steps`, when present, replaces the whole step set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub request_type: Option<RequestType>,
    #[serde(default)]
    pub apply_conditions: Option<ApplyConditions>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub steps: Option<Vec<StepDefinition>>,
}

/// Inputs used to pick a template for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchScope {
    #[serde(default)]
    pub request_type: Option<RequestType>,
    pub department_id: DepartmentId,
    pub level_id: LevelId,
}

impl MatchScope {
    pub fn new(department_id: DepartmentId, level_id: LevelId) -> Self {
        Self {
            request_type: None,
            department_id,
            level_id,
        }
    }

    pub fn of_type(mut self, request_type: RequestType) -> Self {
        self.request_type = Some(request_type);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingStatus {
    Pending,
    Approved,
    Rejected,
    /// Closed because the owning request was cancelled or withdrawn.
    Cancelled,
}

impl TrackingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            TrackingStatus::Pending => "PENDING",
            TrackingStatus::Approved => "APPROVED",
            TrackingStatus::Rejected => "REJECTED",
            TrackingStatus::Cancelled => "CANCELLED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, TrackingStatus::Pending)
    }
}

impl fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Runtime record of one step executed for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalTracking {
    pub id: TrackingId,
    pub request_id: RequestId,
    pub template_id: WorkflowTemplateId,
    pub step_id: WorkflowStepId,
    pub step_order: u32,
    pub step_name: String,
    /// Department scope used to resolve approvers for this and later steps.
    pub department_id: DepartmentId,
    pub status: TrackingStatus,
    pub assigned_approver_id: EmployeeId,
    pub acting_approver_id: Option<EmployeeId>,
    pub action_timestamp: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// Rejected only to send the request back to its requester for edits.
    #[serde(default)]
    pub returned_for_edit: bool,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

/// Row contents the engine hands to the tracking store; id and version are assigned there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTracking {
    pub request_id: RequestId,
    pub template_id: WorkflowTemplateId,
    pub step_id: WorkflowStepId,
    pub step_order: u32,
    pub step_name: String,
    pub department_id: DepartmentId,
    pub assigned_approver_id: EmployeeId,
    pub created_at: DateTime<Utc>,
}

impl NewTracking {
    pub fn for_step(
        request_id: RequestId,
        step: &WorkflowStep,
        department_id: DepartmentId,
        assigned_approver_id: EmployeeId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            template_id: step.template_id,
            step_id: step.id,
            step_order: step.step_order,
            step_name: step.step_name.clone(),
            department_id,
            assigned_approver_id,
            created_at,
        }
    }
}

/// Terminal outcome written onto a pending row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDecision {
    pub status: TrackingStatus,
    pub acting_approver_id: EmployeeId,
    pub action_timestamp: DateTime<Utc>,
    pub notes: Option<String>,
    pub returned_for_edit: bool,
}

/// Per-request state derived from its tracking rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowProgress {
    NotStarted,
    InProgress {
        step_order: u32,
        tracking_id: TrackingId,
    },
    Completed,
    RejectedAt {
        step_order: u32,
    },
    ReturnedAt {
        step_order: u32,
    },
    CancelledAt {
        step_order: u32,
    },
}

impl WorkflowProgress {
    /// Derive the state from a history ordered by step order.
    ///
    /// An approved last row means completion because the next pending row is
    /// always created together with the approval that unlocks it.
    pub fn derive(history: &[ApprovalTracking]) -> Self {
        match history.last() {
            None => WorkflowProgress::NotStarted,
            Some(last) => match last.status {
                TrackingStatus::Pending => WorkflowProgress::InProgress {
                    step_order: last.step_order,
                    tracking_id: last.id,
                },
                TrackingStatus::Approved => WorkflowProgress::Completed,
                TrackingStatus::Rejected if last.returned_for_edit => {
                    WorkflowProgress::ReturnedAt {
                        step_order: last.step_order,
                    }
                }
                TrackingStatus::Rejected => WorkflowProgress::RejectedAt {
                    step_order: last.step_order,
                },
                TrackingStatus::Cancelled => WorkflowProgress::CancelledAt {
                    step_order: last.step_order,
                },
            },
        }
    }
}
