use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::definitions::{DefinitionError, WorkflowDefinitionStore};
use super::directory::{DirectoryError, DirectoryResolver};
use super::domain::{
    ApprovalTracking, DepartmentId, EmployeeId, MatchScope, NewTracking, PositionId,
    RecordedDecision, RequestId, TrackingId, TrackingStatus, WorkflowProgress, WorkflowStep,
    WorkflowTemplate, WorkflowTemplateId,
};
use super::repository::{RepositoryError, TemplateRepository, TrackingRepository};

/// Errors raised by the approval tracking engine.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error("workflow template {template_id} has no steps")]
    EmptyWorkflow { template_id: WorkflowTemplateId },
    #[error("no employee holds position '{position_id}' for department '{department_id}'")]
    NoApproverFound {
        position_id: PositionId,
        department_id: DepartmentId,
    },
    #[error("request '{request_id}' is already tracked")]
    AlreadyInitialized { request_id: RequestId },
    #[error("approval tracking {0} not found")]
    NotFound(TrackingId),
    #[error("employee '{actor_id}' is not the assigned approver of tracking {tracking_id}")]
    Forbidden {
        tracking_id: TrackingId,
        actor_id: EmployeeId,
    },
    #[error("approval tracking {tracking_id} was already decided ({status})")]
    AlreadyDecided {
        tracking_id: TrackingId,
        status: TrackingStatus,
    },
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ApprovalError {
    pub const fn code(&self) -> &'static str {
        match self {
            ApprovalError::Definition(inner) => inner.code(),
            ApprovalError::EmptyWorkflow { .. } => "EMPTY_WORKFLOW",
            ApprovalError::NoApproverFound { .. } => "NO_APPROVER_FOUND",
            ApprovalError::AlreadyInitialized { .. } => "ALREADY_INITIALIZED",
            ApprovalError::NotFound(_) => "TRACKING_NOT_FOUND",
            ApprovalError::Forbidden { .. } => "FORBIDDEN",
            ApprovalError::AlreadyDecided { .. } => "ALREADY_DECIDED",
            ApprovalError::Directory(_) => "DIRECTORY_UNAVAILABLE",
            ApprovalError::Repository(_) => "REPOSITORY_UNAVAILABLE",
        }
    }

    /// Configuration errors need an administrator to fix templates or the
    /// directory; retrying the call cannot succeed.
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            ApprovalError::Definition(DefinitionError::NoMatchingWorkflow { .. })
                | ApprovalError::EmptyWorkflow { .. }
                | ApprovalError::NoApproverFound { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Approve,
    Reject,
    Return,
}

/// Result of a decision: the closed row, the next pending row if the
/// workflow advanced, and the request's resulting progress.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionOutcome {
    pub decided: ApprovalTracking,
    pub next: Option<ApprovalTracking>,
    pub progress: WorkflowProgress,
}

/// Sequential, position-based approval engine.
///
/// The engine owns step progression only. It never touches the business
/// request; `RequestId` is an opaque correlation key.
pub struct ApprovalTrackingEngine<T, R> {
    definitions: Arc<WorkflowDefinitionStore<T>>,
    tracking: Arc<R>,
    directory: Arc<dyn DirectoryResolver>,
}

impl<T, R> ApprovalTrackingEngine<T, R>
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
{
    pub fn new(
        definitions: Arc<WorkflowDefinitionStore<T>>,
        tracking: Arc<R>,
        directory: Arc<dyn DirectoryResolver>,
    ) -> Self {
        Self {
            definitions,
            tracking,
            directory,
        }
    }

    pub fn definitions(&self) -> &Arc<WorkflowDefinitionStore<T>> {
        &self.definitions
    }

    /// Start tracking a request at step 1 of the template matching `scope`.
    pub fn initialize(
        &self,
        request_id: &RequestId,
        scope: &MatchScope,
    ) -> Result<ApprovalTracking, ApprovalError> {
        self.ensure_not_started(request_id)?;
        let template = self.definitions.find_matching(scope)?;
        self.start(request_id, &template, &scope.department_id)
    }

    /// Start tracking with a template the request already carries.
    pub fn initialize_with_template(
        &self,
        request_id: &RequestId,
        template_id: WorkflowTemplateId,
        department_id: &DepartmentId,
    ) -> Result<ApprovalTracking, ApprovalError> {
        self.ensure_not_started(request_id)?;
        let template = self.definitions.get_template(template_id)?;
        self.start(request_id, &template, department_id)
    }

    /// Approve or reject the pending row `tracking_id` on behalf of `actor_id`.
    ///
    /// Authorization and status are checked against one read of the row and
    /// the decision is compare-and-swapped on that read's version, so of two
    /// concurrent callers at most one succeeds.
    pub fn decide(
        &self,
        tracking_id: TrackingId,
        actor_id: &EmployeeId,
        approved: bool,
        notes: Option<String>,
    ) -> Result<DecisionOutcome, ApprovalError> {
        let verdict = if approved {
            Verdict::Approve
        } else {
            Verdict::Reject
        };
        self.settle(tracking_id, actor_id, verdict, notes)
    }

    /// Reject the pending row so the requester can edit and resubmit. The row
    /// is stored as REJECTED and flagged, and the request's progress reads
    /// `ReturnedAt` rather than `RejectedAt`.
    pub fn return_for_edit(
        &self,
        tracking_id: TrackingId,
        actor_id: &EmployeeId,
        notes: Option<String>,
    ) -> Result<DecisionOutcome, ApprovalError> {
        self.settle(tracking_id, actor_id, Verdict::Return, notes)
    }

    fn settle(
        &self,
        tracking_id: TrackingId,
        actor_id: &EmployeeId,
        verdict: Verdict,
        notes: Option<String>,
    ) -> Result<DecisionOutcome, ApprovalError> {
        let row = self
            .tracking
            .fetch(tracking_id)?
            .ok_or(ApprovalError::NotFound(tracking_id))?;

        if &row.assigned_approver_id != actor_id {
            return Err(ApprovalError::Forbidden {
                tracking_id,
                actor_id: actor_id.clone(),
            });
        }
        if row.status != TrackingStatus::Pending {
            return Err(ApprovalError::AlreadyDecided {
                tracking_id,
                status: row.status,
            });
        }

        // The next approver is resolved before anything is written, so a
        // directory gap leaves the current row pending.
        let next = match verdict {
            Verdict::Approve => self.next_tracking(&row)?,
            Verdict::Reject | Verdict::Return => None,
        };

        let decision = RecordedDecision {
            status: match verdict {
                Verdict::Approve => TrackingStatus::Approved,
                Verdict::Reject | Verdict::Return => TrackingStatus::Rejected,
            },
            acting_approver_id: actor_id.clone(),
            action_timestamp: Utc::now(),
            notes,
            returned_for_edit: verdict == Verdict::Return,
        };

        let (decided, next) = self
            .tracking
            .record_decision(tracking_id, row.version, decision, next)
            .map_err(|err| self.lost_race(tracking_id, err))?;

        let progress = match (&next, verdict) {
            (Some(next), _) => WorkflowProgress::InProgress {
                step_order: next.step_order,
                tracking_id: next.id,
            },
            (None, Verdict::Approve) => WorkflowProgress::Completed,
            (None, Verdict::Reject) => WorkflowProgress::RejectedAt {
                step_order: decided.step_order,
            },
            (None, Verdict::Return) => WorkflowProgress::ReturnedAt {
                step_order: decided.step_order,
            },
        };

        info!(
            tracking_id = tracking_id.0,
            request_id = %decided.request_id,
            step_order = decided.step_order,
            status = decided.status.label(),
            actor_id = %actor_id,
            next_tracking_id = next.as_ref().map(|row| row.id.0),
            "approval step decided"
        );

        Ok(DecisionOutcome {
            decided,
            next,
            progress,
        })
    }

    /// Close the request's pending row because the request left the engine.
    /// Returns `None` when nothing was pending.
    pub fn close(
        &self,
        request_id: &RequestId,
        actor_id: &EmployeeId,
        reason: Option<String>,
    ) -> Result<Option<ApprovalTracking>, ApprovalError> {
        const MAX_ATTEMPTS: usize = 3;

        for _ in 0..MAX_ATTEMPTS {
            let Some(pending) = self.tracking.pending_for_request(request_id)? else {
                return Ok(None);
            };

            let decision = RecordedDecision {
                status: TrackingStatus::Cancelled,
                acting_approver_id: actor_id.clone(),
                action_timestamp: Utc::now(),
                notes: reason.clone(),
                returned_for_edit: false,
            };
            match self
                .tracking
                .record_decision(pending.id, pending.version, decision, None)
            {
                Ok((closed, _)) => {
                    info!(
                        tracking_id = closed.id.0,
                        request_id = %request_id,
                        step_order = closed.step_order,
                        "pending approval step closed"
                    );
                    return Ok(Some(closed));
                }
                Err(RepositoryError::VersionConflict) => {
                    warn!(
                        tracking_id = pending.id.0,
                        request_id = %request_id,
                        "pending step changed while closing, re-reading"
                    );
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(RepositoryError::VersionConflict.into())
    }

    /// Pending rows assigned to one approver, for their task inbox.
    pub fn list_pending_for(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<ApprovalTracking>, ApprovalError> {
        Ok(self.tracking.pending_for_approver(approver_id)?)
    }

    /// Audit trail of a request ordered by step order.
    pub fn get_history(&self, request_id: &RequestId) -> Result<Vec<ApprovalTracking>, ApprovalError> {
        Ok(self.tracking.history(request_id)?)
    }

    pub fn current_step(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ApprovalTracking>, ApprovalError> {
        Ok(self.tracking.pending_for_request(request_id)?)
    }

    pub fn progress(&self, request_id: &RequestId) -> Result<WorkflowProgress, ApprovalError> {
        let history = self.tracking.history(request_id)?;
        Ok(WorkflowProgress::derive(&history))
    }

    fn ensure_not_started(&self, request_id: &RequestId) -> Result<(), ApprovalError> {
        if !self.tracking.history(request_id)?.is_empty() {
            return Err(ApprovalError::AlreadyInitialized {
                request_id: request_id.clone(),
            });
        }
        Ok(())
    }

    fn start(
        &self,
        request_id: &RequestId,
        template: &WorkflowTemplate,
        department_id: &DepartmentId,
    ) -> Result<ApprovalTracking, ApprovalError> {
        let first = template.step_at(1).ok_or(ApprovalError::EmptyWorkflow {
            template_id: template.id,
        })?;
        let approver = self.resolve_approver(first, department_id)?;

        let row = NewTracking::for_step(
            request_id.clone(),
            first,
            department_id.clone(),
            approver,
            Utc::now(),
        );
        let created = self
            .tracking
            .insert_pending(row)
            .map_err(|err| match err {
                RepositoryError::Conflict => ApprovalError::AlreadyInitialized {
                    request_id: request_id.clone(),
                },
                other => ApprovalError::Repository(other),
            })?;

        info!(
            tracking_id = created.id.0,
            request_id = %request_id,
            template_id = template.id.0,
            approver_id = %created.assigned_approver_id,
            "approval tracking initialized"
        );
        Ok(created)
    }

    fn next_tracking(&self, row: &ApprovalTracking) -> Result<Option<NewTracking>, ApprovalError> {
        let template = self.definitions.get_template(row.template_id)?;
        let Some(next_step) = template.step_at(row.step_order + 1) else {
            return Ok(None);
        };

        let approver = self.resolve_approver(next_step, &row.department_id)?;
        Ok(Some(NewTracking::for_step(
            row.request_id.clone(),
            next_step,
            row.department_id.clone(),
            approver,
            Utc::now(),
        )))
    }

    /// First holder of the step's position, in resolver order.
    fn resolve_approver(
        &self,
        step: &WorkflowStep,
        department_id: &DepartmentId,
    ) -> Result<EmployeeId, ApprovalError> {
        let holders = self
            .directory
            .resolve_approvers_for_position(&step.required_approver_position, Some(department_id))?;

        holders
            .into_iter()
            .next()
            .ok_or_else(|| ApprovalError::NoApproverFound {
                position_id: step.required_approver_position.clone(),
                department_id: department_id.clone(),
            })
    }

    fn lost_race(&self, tracking_id: TrackingId, err: RepositoryError) -> ApprovalError {
        match err {
            RepositoryError::VersionConflict => match self.tracking.fetch(tracking_id) {
                Ok(Some(row)) => ApprovalError::AlreadyDecided {
                    tracking_id,
                    status: row.status,
                },
                Ok(None) => ApprovalError::NotFound(tracking_id),
                Err(err) => ApprovalError::Repository(err),
            },
            RepositoryError::NotFound => ApprovalError::NotFound(tracking_id),
            other => ApprovalError::Repository(other),
        }
    }
}
