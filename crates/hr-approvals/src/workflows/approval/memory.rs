use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::domain::{
    ApprovalTracking, EmployeeId, NewTracking, NewWorkflowTemplate, RecordedDecision, RequestId,
    StepDefinition, TemplatePatch, TrackingId, TrackingStatus, WorkflowStep, WorkflowStepId,
    WorkflowTemplate, WorkflowTemplateId,
};
use super::repository::{RepositoryError, TemplateRepository, TrackingRepository};

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable(format!("{what} lock poisoned")))
}

#[derive(Debug, Default)]
struct TemplateState {
    templates: BTreeMap<WorkflowTemplateId, WorkflowTemplate>,
    retired_steps: HashMap<WorkflowStepId, WorkflowStep>,
    next_template_id: u64,
    next_step_id: u64,
}

impl TemplateState {
    fn allocate_template_id(&mut self) -> WorkflowTemplateId {
        self.next_template_id += 1;
        WorkflowTemplateId(self.next_template_id)
    }

    fn build_steps(
        &mut self,
        template_id: WorkflowTemplateId,
        definitions: Vec<StepDefinition>,
    ) -> Vec<WorkflowStep> {
        let mut steps: Vec<WorkflowStep> = definitions
            .into_iter()
            .map(|definition| {
                self.next_step_id += 1;
                WorkflowStep {
                    id: WorkflowStepId(self.next_step_id),
                    template_id,
                    step_order: definition.step_order,
                    step_name: definition.step_name,
                    required_approver_position: definition.required_approver_position,
                    is_active: true,
                }
            })
            .collect();
        steps.sort_by_key(|step| step.step_order);
        steps
    }

    fn name_taken(&self, name: &str, except: Option<WorkflowTemplateId>) -> bool {
        self.templates
            .values()
            .any(|template| template.name == name && Some(template.id) != except)
    }
}

/// Template store holding everything behind one mutex, so each write is atomic.
#[derive(Debug, Default)]
pub struct InMemoryTemplateRepository {
    state: Mutex<TemplateState>,
}

impl TemplateRepository for InMemoryTemplateRepository {
    fn insert(&self, template: NewWorkflowTemplate) -> Result<WorkflowTemplate, RepositoryError> {
        let mut state = lock(&self.state, "template repository")?;
        if state.name_taken(&template.name, None) {
            return Err(RepositoryError::Conflict);
        }

        let id = state.allocate_template_id();
        let steps = state.build_steps(id, template.steps);
        let now = Utc::now();
        let stored = WorkflowTemplate {
            id,
            name: template.name,
            description: template.description,
            request_type: template.request_type,
            apply_conditions: template.apply_conditions,
            is_active: true,
            steps,
            created_at: now,
            updated_at: now,
        };
        state.templates.insert(id, stored.clone());
        Ok(stored)
    }

    fn update(
        &self,
        id: WorkflowTemplateId,
        patch: TemplatePatch,
    ) -> Result<WorkflowTemplate, RepositoryError> {
        let mut state = lock(&self.state, "template repository")?;
        let mut template = state
            .templates
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)?;

        if let Some(name) = patch.name {
            if state.name_taken(&name, Some(id)) {
                return Err(RepositoryError::Conflict);
            }
            template.name = name;
        }
        if let Some(description) = patch.description {
            template.description = Some(description);
        }
        if let Some(request_type) = patch.request_type {
            template.request_type = request_type;
        }
        if let Some(conditions) = patch.apply_conditions {
            template.apply_conditions = conditions;
        }
        if let Some(active) = patch.is_active {
            template.is_active = active;
        }
        if let Some(definitions) = patch.steps {
            let replacement = state.build_steps(id, definitions);
            let retired = std::mem::replace(&mut template.steps, replacement);
            for mut step in retired {
                step.is_active = false;
                state.retired_steps.insert(step.id, step);
            }
        }
        template.updated_at = Utc::now();

        state.templates.insert(id, template.clone());
        Ok(template)
    }

    fn fetch(&self, id: WorkflowTemplateId) -> Result<Option<WorkflowTemplate>, RepositoryError> {
        let state = lock(&self.state, "template repository")?;
        Ok(state.templates.get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<WorkflowTemplate>, RepositoryError> {
        let state = lock(&self.state, "template repository")?;
        Ok(state.templates.values().cloned().collect())
    }

    fn step(&self, id: WorkflowStepId) -> Result<Option<WorkflowStep>, RepositoryError> {
        let state = lock(&self.state, "template repository")?;
        let live = state
            .templates
            .values()
            .flat_map(|template| template.steps.iter())
            .find(|step| step.id == id)
            .cloned();
        Ok(live.or_else(|| state.retired_steps.get(&id).cloned()))
    }

    fn set_active(
        &self,
        id: WorkflowTemplateId,
        active: bool,
    ) -> Result<WorkflowTemplate, RepositoryError> {
        let mut state = lock(&self.state, "template repository")?;
        let template = state
            .templates
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        template.is_active = active;
        template.updated_at = Utc::now();
        Ok(template.clone())
    }
}

#[derive(Debug, Default)]
struct TrackingState {
    rows: BTreeMap<TrackingId, ApprovalTracking>,
    next_id: u64,
}

impl TrackingState {
    fn is_tracked(&self, request_id: &RequestId) -> bool {
        self.rows.values().any(|row| &row.request_id == request_id)
    }

    fn insert(&mut self, row: NewTracking) -> ApprovalTracking {
        self.next_id += 1;
        let stored = ApprovalTracking {
            id: TrackingId(self.next_id),
            request_id: row.request_id,
            template_id: row.template_id,
            step_id: row.step_id,
            step_order: row.step_order,
            step_name: row.step_name,
            department_id: row.department_id,
            status: TrackingStatus::Pending,
            assigned_approver_id: row.assigned_approver_id,
            acting_approver_id: None,
            action_timestamp: None,
            notes: None,
            returned_for_edit: false,
            created_at: row.created_at,
            version: 1,
        };
        self.rows.insert(stored.id, stored.clone());
        stored
    }
}

/// Tracking store; the mutex stands in for row-level locking, and decisions
/// are compare-and-swapped on `version`.
#[derive(Debug, Default)]
pub struct InMemoryTrackingRepository {
    state: Mutex<TrackingState>,
}

impl TrackingRepository for InMemoryTrackingRepository {
    fn insert_pending(&self, row: NewTracking) -> Result<ApprovalTracking, RepositoryError> {
        let mut state = lock(&self.state, "tracking repository")?;
        if state.is_tracked(&row.request_id) {
            return Err(RepositoryError::Conflict);
        }
        Ok(state.insert(row))
    }

    fn fetch(&self, id: TrackingId) -> Result<Option<ApprovalTracking>, RepositoryError> {
        let state = lock(&self.state, "tracking repository")?;
        Ok(state.rows.get(&id).cloned())
    }

    fn record_decision(
        &self,
        id: TrackingId,
        expected_version: u64,
        decision: RecordedDecision,
        next: Option<NewTracking>,
    ) -> Result<(ApprovalTracking, Option<ApprovalTracking>), RepositoryError> {
        let mut state = lock(&self.state, "tracking repository")?;
        let row = state.rows.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if row.version != expected_version || row.status != TrackingStatus::Pending {
            return Err(RepositoryError::VersionConflict);
        }

        row.status = decision.status;
        row.acting_approver_id = Some(decision.acting_approver_id);
        row.action_timestamp = Some(decision.action_timestamp);
        row.notes = decision.notes;
        row.returned_for_edit = decision.returned_for_edit;
        row.version += 1;
        let decided = row.clone();

        let next = next.map(|row| state.insert(row));
        Ok((decided, next))
    }

    fn pending_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ApprovalTracking>, RepositoryError> {
        let state = lock(&self.state, "tracking repository")?;
        Ok(state
            .rows
            .values()
            .find(|row| &row.request_id == request_id && row.status == TrackingStatus::Pending)
            .cloned())
    }

    fn pending_for_approver(
        &self,
        approver_id: &EmployeeId,
    ) -> Result<Vec<ApprovalTracking>, RepositoryError> {
        let state = lock(&self.state, "tracking repository")?;
        Ok(state
            .rows
            .values()
            .filter(|row| {
                &row.assigned_approver_id == approver_id && row.status == TrackingStatus::Pending
            })
            .cloned()
            .collect())
    }

    fn history(&self, request_id: &RequestId) -> Result<Vec<ApprovalTracking>, RepositoryError> {
        let state = lock(&self.state, "tracking repository")?;
        let mut rows: Vec<ApprovalTracking> = state
            .rows
            .values()
            .filter(|row| &row.request_id == request_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| (row.step_order, row.id));
        Ok(rows)
    }
}
