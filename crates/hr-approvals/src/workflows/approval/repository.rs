use super::domain::{
    ApprovalTracking, EmployeeId, NewTracking, NewWorkflowTemplate, RecordedDecision, RequestId,
    StepDefinition, TemplatePatch, TrackingId, WorkflowStep, WorkflowStepId, WorkflowTemplate,
    WorkflowTemplateId,
};

/// Storage for workflow templates and their steps.
///
/// Implementations apply every write under a single isolation unit so that a
/// template and its step set are never observed half-written.
pub trait TemplateRepository: Send + Sync {
    /// Persist a template with its steps. Fails with `Conflict` when the name is taken.
    fn insert(&self, template: NewWorkflowTemplate) -> Result<WorkflowTemplate, RepositoryError>;

    /// Apply a partial update; a supplied step list retires the old steps and
    /// inserts the new ones with fresh ids.
    fn update(
        &self,
        id: WorkflowTemplateId,
        patch: TemplatePatch,
    ) -> Result<WorkflowTemplate, RepositoryError>;

    fn fetch(&self, id: WorkflowTemplateId) -> Result<Option<WorkflowTemplate>, RepositoryError>;

    fn list(&self) -> Result<Vec<WorkflowTemplate>, RepositoryError>;

    /// Resolve a step by id, including steps retired by a later update.
    fn step(&self, id: WorkflowStepId) -> Result<Option<WorkflowStep>, RepositoryError>;

    fn set_active(
        &self,
        id: WorkflowTemplateId,
        active: bool,
    ) -> Result<WorkflowTemplate, RepositoryError>;
}

/// Storage for approval tracking rows.
pub trait TrackingRepository: Send + Sync {
    /// Insert the first row of a request. Fails with `Conflict` if the request
    /// already has any row, pending or decided.
    fn insert_pending(&self, row: NewTracking) -> Result<ApprovalTracking, RepositoryError>;

    fn fetch(&self, id: TrackingId) -> Result<Option<ApprovalTracking>, RepositoryError>;

    /// Compare-and-swap a decision onto a pending row, optionally inserting the
    /// next pending row in the same isolation unit.
    ///
    /// Fails with `VersionConflict` when the stored version differs from
    /// `expected_version` or the row is no longer pending.
    fn record_decision(
        &self,
        id: TrackingId,
        expected_version: u64,
        decision: RecordedDecision,
        next: Option<NewTracking>,
    ) -> Result<(ApprovalTracking, Option<ApprovalTracking>), RepositoryError>;

    fn pending_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ApprovalTracking>, RepositoryError>;

    fn pending_for_approver(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<ApprovalTracking>, RepositoryError>;

    /// All rows for a request ordered by step order, then creation.
    fn history(&self, request_id: &RequestId) -> Result<Vec<ApprovalTracking>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record was modified concurrently")]
    VersionConflict,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Validate a step set: non-blank fields and orders forming 1..=n.
pub fn validate_steps(steps: &[StepDefinition]) -> Result<(), String> {
    let mut orders: Vec<u32> = Vec::with_capacity(steps.len());
    for step in steps {
        if step.step_order == 0 {
            return Err("step_order must be a positive integer".to_string());
        }
        if step.step_name.trim().is_empty() {
            return Err(format!("step {} is missing a step_name", step.step_order));
        }
        if step.required_approver_position.0.trim().is_empty() {
            return Err(format!(
                "step {} is missing a required_approver_position",
                step.step_order
            ));
        }
        orders.push(step.step_order);
    }

    orders.sort_unstable();
    for (index, order) in orders.iter().enumerate() {
        let expected = index as u32 + 1;
        if *order != expected {
            return Err(if index > 0 && orders[index - 1] == *order {
                format!("duplicate step_order {order}")
            } else {
                format!("step orders must be contiguous from 1; expected {expected}, found {order}")
            });
        }
    }

    Ok(())
}
