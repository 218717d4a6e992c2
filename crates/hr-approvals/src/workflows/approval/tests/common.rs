use std::sync::Arc;

use axum::response::Response;
use serde_json::Value;

use crate::workflows::approval::domain::{
    ApplyConditions, DepartmentId, EmployeeId, LevelId, MatchScope, NewWorkflowTemplate,
    PositionId, RequestId, RequestType, StepDefinition,
};
use crate::workflows::approval::{
    ApprovalTrackingEngine, InMemoryTemplateRepository, InMemoryTrackingRepository,
    StaticDirectory, WorkflowDefinitionStore,
};

pub(super) type TestEngine =
    ApprovalTrackingEngine<InMemoryTemplateRepository, InMemoryTrackingRepository>;

pub(super) fn department(value: &str) -> DepartmentId {
    DepartmentId(value.to_string())
}

pub(super) fn level(value: &str) -> LevelId {
    LevelId(value.to_string())
}

pub(super) fn employee(value: &str) -> EmployeeId {
    EmployeeId(value.to_string())
}

pub(super) fn request(value: &str) -> RequestId {
    RequestId(value.to_string())
}

pub(super) fn scope(department_id: &str, level_id: &str) -> MatchScope {
    MatchScope::new(department(department_id), level(level_id))
}

pub(super) fn step(order: u32, name: &str, position: &str) -> StepDefinition {
    StepDefinition {
        step_order: order,
        step_name: name.to_string(),
        required_approver_position: PositionId(position.to_string()),
    }
}

pub(super) fn template(
    name: &str,
    department_id: Option<&str>,
    level_id: Option<&str>,
    steps: Vec<StepDefinition>,
) -> NewWorkflowTemplate {
    NewWorkflowTemplate {
        name: name.to_string(),
        description: None,
        request_type: RequestType::Offer,
        apply_conditions: ApplyConditions {
            department_id: department_id.map(department),
            level_id: level_id.map(level),
        },
        steps,
    }
}

/// Two-step offer template for department 5, level 2 (positions P1 then P2).
pub(super) fn two_step_template() -> NewWorkflowTemplate {
    template(
        "Offer approval / dept 5 / level 2",
        Some("5"),
        Some("2"),
        vec![
            step(1, "Department head review", "P1"),
            step(2, "HR director sign-off", "P2"),
        ],
    )
}

/// P1 and P2 are held in department 5; P1 also has an organization-wide holder.
pub(super) fn directory() -> StaticDirectory {
    StaticDirectory::new()
        .with_assignment("P1", Some("5"), "emp-p1-dept5")
        .with_assignment("P2", Some("5"), "emp-p2-dept5")
        .with_assignment("P1", None, "emp-p1-global")
        .with_assignment("P3", None, "emp-p3-global")
}

pub(super) struct Harness {
    pub(super) engine: Arc<TestEngine>,
    pub(super) definitions: Arc<WorkflowDefinitionStore<InMemoryTemplateRepository>>,
    pub(super) directory: Arc<StaticDirectory>,
}

pub(super) fn harness() -> Harness {
    let definitions = Arc::new(WorkflowDefinitionStore::new(Arc::new(
        InMemoryTemplateRepository::default(),
    )));
    let directory = Arc::new(directory());
    let engine = Arc::new(ApprovalTrackingEngine::new(
        definitions.clone(),
        Arc::new(InMemoryTrackingRepository::default()),
        directory.clone(),
    ));
    Harness {
        engine,
        definitions,
        directory,
    }
}

/// Harness with the two-step template already registered.
pub(super) fn seeded_harness() -> Harness {
    let harness = harness();
    harness
        .definitions
        .create_template(two_step_template())
        .expect("template created");
    harness
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
